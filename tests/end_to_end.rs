//! Build, serve and rebuild a library the way a deployment does

mod common;

use common::{greeting_input, TestBed};
use pretty_assertions::assert_eq;
use serde_json::json;
use theia::builder::BuildOutcome;
use theia::TheiaError;

#[tokio::test]
async fn test_build_render_rebuild() {
    let bed = TestBed::new();

    let report = bed.core.build("widgets").await.unwrap();
    assert_eq!(report.revision(), "abc123");

    let result = bed
        .core
        .render("widgets", "Greeting", greeting_input())
        .await
        .unwrap();
    assert_eq!(result.markup, "<div>Hello <em>Theia</em>!!!</div>");

    let again = bed.core.build("widgets").await.unwrap();
    assert!(matches!(again.outcome, BuildOutcome::UpToDate(_)));
    assert_eq!(bed.store.manifest("widgets").unwrap().len(), 1);

    let err = bed
        .core
        .render("ghost", "Greeting", greeting_input())
        .await
        .unwrap_err();
    assert!(err.is_not_registered());
}

#[tokio::test]
async fn test_new_component_ships_with_next_revision() {
    let bed = TestBed::new();
    bed.core.build("widgets").await.unwrap();
    let err = bed
        .core
        .render("widgets", "Farewell", json!({"name": "Theia"}))
        .await
        .unwrap_err();
    assert!(matches!(err, TheiaError::ComponentNotRegistered { .. }));

    bed.toolchain.add_component("Farewell", "<p>Bye {{name}}</p>");
    bed.source.set_head("def456");
    bed.core.build("widgets").await.unwrap();

    let result = bed
        .core
        .render("widgets", "Farewell", json!({"name": "Theia"}))
        .await
        .unwrap();
    assert_eq!(result.markup, "<p>Bye Theia</p>");
    assert_eq!(result.assets.scripts, vec!["Farewell.def456.js"]);
    assert_eq!(result.assets.stylesheets, vec!["Farewell.def456.css"]);
}
