//! Theia builds versioned component libraries from their source repositories
//! and renders their components server-side.
//!
//! A [`Core`] owns the configured libraries, a per-library manifest cache and
//! the lifecycle hooks plugins attach to. Storage, source control, the build
//! toolchain and component loading all sit behind traits, with bundled
//! implementations for a local directory, `git`, `yarn`/`webpack` and an
//! external renderer process.

pub mod builder;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod hooks;
pub mod host;
pub mod manifest;
pub mod plugins;
pub mod render;
pub mod storage;

pub use crate::core::{Core, CoreParts};
pub use error::{Result, TheiaError};
