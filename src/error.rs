use thiserror::Error;

#[derive(Error, Debug)]
pub enum TheiaError {
    #[error("{0} is not a registered component library")]
    LibraryNotRegistered(String),

    #[error("{component} is not a registered component of {library}")]
    ComponentNotRegistered { library: String, component: String },

    #[error("{0} has no successful build")]
    NoSuccessfulBuild(String),

    #[error("Source sync error for {library}: {message}")]
    SourceSync { library: String, message: String },

    #[error("Build tool error for {library}: {message}")]
    BuildTool { library: String, message: String },

    #[error("Building {library} did not emit {artifact}")]
    MissingArtifact { library: String, artifact: String },

    #[error("Storage error for {library}/{basename}: {message}")]
    Storage {
        library: String,
        basename: String,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Component loader error for {library}: {message}")]
    Loader { library: String, message: String },

    #[error("Render error for {library}/{component}: {message}")]
    Render {
        library: String,
        component: String,
        message: String,
    },

    #[error("Hook error: {0}")]
    Hook(#[from] crate::hooks::HookError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("YAML serialization error: {0}")]
    YamlSerialization(#[from] serde_yaml_ng::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl TheiaError {
    /// Whether this error means "nothing to serve" rather than a failure
    pub fn is_not_registered(&self) -> bool {
        matches!(
            self,
            TheiaError::LibraryNotRegistered(_) | TheiaError::ComponentNotRegistered { .. }
        )
    }

    pub(crate) fn storage(library: &str, basename: &str, message: impl ToString) -> Self {
        TheiaError::Storage {
            library: library.to_string(),
            basename: basename.to_string(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TheiaError>;
