//! Tests for rill-notebook: cells, outputs, templates, orchestration, imports

use async_trait::async_trait;
use rill_core::{
    CellId, CellKind, CellSource, Error, NotebookId, NotebookLoader, NotebookSource, Result,
};
use rill_lang::{ExprCompiler, StatementParser};
use rill_notebook::{CellOutput, CellPatch, Notebook};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// ===========================================================================
// Fixtures
// ===========================================================================

/// In-memory loader over canned notebook sources, logging every fetch.
#[derive(Default)]
struct MapLoader {
    notebooks: HashMap<NotebookId, NotebookSource>,
    fetch_log: Mutex<Vec<NotebookId>>,
}

impl MapLoader {
    fn with(mut self, id: &str, cells: &[(&str, &str)]) -> Self {
        let source = NotebookSource {
            title: id.to_string(),
            description: String::new(),
            cells: cells
                .iter()
                .map(|(cell_id, value)| CellSource {
                    id: CellId::new(*cell_id),
                    kind: CellKind::Code,
                    value: value.to_string(),
                })
                .collect(),
        };
        self.notebooks.insert(NotebookId::new(id), source);
        self
    }

    fn fetches_of(&self, id: &str) -> usize {
        let id = NotebookId::new(id);
        self.fetch_log
            .lock()
            .unwrap()
            .iter()
            .filter(|fetched| **fetched == id)
            .count()
    }
}

#[async_trait]
impl NotebookLoader for MapLoader {
    async fn fetch(&self, notebook_id: &NotebookId) -> Result<NotebookSource> {
        self.fetch_log.lock().unwrap().push(notebook_id.clone());
        self.notebooks
            .get(notebook_id)
            .cloned()
            .ok_or_else(|| Error::notebook_load(notebook_id.clone(), "unknown notebook"))
    }
}

fn notebook_with(loader: Arc<MapLoader>) -> Notebook {
    Notebook::new(
        NotebookId::new("main"),
        Arc::new(StatementParser),
        Arc::new(ExprCompiler),
        loader,
    )
}

fn notebook() -> Notebook {
    notebook_with(Arc::new(MapLoader::default()))
}

async fn add_code(nb: &Notebook, id: &str, source: &str) -> Arc<rill_notebook::Cell> {
    nb.add_cell(CellId::new(id), CellKind::Code, source, None, false)
        .await
        .unwrap()
}

// ===========================================================================
// Code cells
// ===========================================================================

#[tokio::test]
async fn assignment_cell_evaluates() {
    let nb = notebook();
    let cell = add_code(&nb, "c1", "x = 1 + 2").await;
    assert_eq!(cell.value(), Some(json!(3)));
    assert_eq!(cell.bound_names(), vec!["x".to_string()]);
    assert!(cell.error().is_none());
    assert_eq!(nb.module().value("x").await.unwrap(), json!(3));
}

#[tokio::test]
async fn dependent_cell_follows_redefinition() {
    let nb = notebook();
    add_code(&nb, "c1", "x = 1 + 2").await;
    let dependent = add_code(&nb, "c2", "x + 1").await;
    assert_eq!(dependent.value(), Some(json!(4)));

    let patch = CellPatch {
        kind: None,
        value: Some("x = 10".to_string()),
    };
    assert!(nb.update_cell(&CellId::new("c1"), &patch).await.unwrap());
    assert_eq!(dependent.value(), Some(json!(11)));
}

#[tokio::test]
async fn forward_reference_heals_across_cells() {
    let nb = notebook();
    let early = add_code(&nb, "c1", "y + 1").await;
    assert!(early.error().is_some());
    assert_eq!(early.value(), None);

    add_code(&nb, "c2", "y = 5").await;
    assert_eq!(early.value(), Some(json!(6)));
    assert!(early.error().is_none());
}

#[tokio::test]
async fn parse_error_becomes_cell_error() {
    let nb = notebook();
    let cell = add_code(&nb, "c1", "x = 1 +").await;
    assert!(cell.error().is_some());
    assert_eq!(cell.value(), None);
    assert!(cell.bound_names().is_empty());
}

#[tokio::test]
async fn undefined_dependency_is_reported() {
    let nb = notebook();
    let cell = add_code(&nb, "c1", "nope + 1").await;
    let error = cell.error().unwrap();
    assert!(error.to_string().contains("nope is not defined"));
}

#[tokio::test]
async fn rebinding_to_a_new_name_releases_the_old() {
    let nb = notebook();
    add_code(&nb, "c1", "x = 1").await;
    let dependent = add_code(&nb, "c2", "x + 1").await;
    assert_eq!(dependent.value(), Some(json!(2)));

    let patch = CellPatch {
        kind: None,
        value: Some("y = 2".to_string()),
    };
    nb.update_cell(&CellId::new("c1"), &patch).await.unwrap();
    assert_eq!(nb.cell(&CellId::new("c1")).unwrap().bound_names(), vec!["y".to_string()]);
    assert_eq!(nb.module().value("y").await.unwrap(), json!(2));
    assert!(dependent.error().is_some());
    assert_eq!(dependent.value(), None);
}

#[tokio::test]
async fn removing_a_cell_disposes_its_bindings() {
    let nb = notebook();
    add_code(&nb, "c1", "x = 1").await;
    let dependent = add_code(&nb, "c2", "x + 1").await;
    assert_eq!(dependent.value(), Some(json!(2)));

    assert!(nb.remove_cell(&CellId::new("c1")));
    assert!(dependent.error().is_some());
    assert!(!nb.remove_cell(&CellId::new("c1")));
}

#[tokio::test]
async fn reexecution_with_unchanged_source_is_idempotent() {
    let nb = notebook();
    let cell = add_code(&nb, "c1", "viewof gain = 3").await;
    let names = cell.bound_names();
    let value = cell.value();
    cell.execute().await;
    assert_eq!(cell.bound_names(), names);
    assert_eq!(cell.value(), value);
}

#[tokio::test]
async fn narrowing_the_binding_set_silences_dropped_names() {
    let nb = notebook();
    let cell = add_code(&nb, "c1", "viewof gain = 3").await;
    assert_eq!(cell.bound_names().len(), 2);
    let view_observers = nb.module().observers_of("viewof gain");

    let patch = CellPatch {
        kind: None,
        value: Some("gain = 1".to_string()),
    };
    nb.update_cell(&CellId::new("c1"), &patch).await.unwrap();
    assert_eq!(cell.bound_names(), vec!["gain".to_string()]);
    assert_eq!(nb.module().value("gain").await.unwrap(), json!(1));
    assert!(view_observers.state().is_pending());
    assert_eq!(view_observers.observer_count(), 0);
}

#[tokio::test]
async fn unchanged_patch_does_not_reexecute() {
    let nb = notebook();
    add_code(&nb, "c1", "x = 1").await;
    let version = nb.version();
    let patch = CellPatch {
        kind: None,
        value: Some("x = 1".to_string()),
    };
    assert!(!nb.update_cell(&CellId::new("c1"), &patch).await.unwrap());
    assert_eq!(nb.version(), version);
}

// ===========================================================================
// viewof and combined outputs
// ===========================================================================

#[tokio::test]
async fn viewof_binds_a_view_and_a_value() {
    let nb = notebook();
    let cell = add_code(&nb, "c1", "viewof gain = 3").await;
    assert_eq!(
        cell.bound_names(),
        vec!["viewof gain".to_string(), "gain".to_string()]
    );
    assert_eq!(nb.module().value("gain").await.unwrap(), json!(3));
    assert_eq!(nb.module().value("viewof gain").await.unwrap(), json!(3));
}

#[tokio::test]
async fn multi_binding_cell_combines_outputs() {
    let nb = notebook();
    let cell = add_code(&nb, "c1", "viewof gain = 3").await;
    match cell.output().unwrap() {
        CellOutput::Combined { names, .. } => {
            assert_eq!(names, vec!["viewof gain".to_string(), "gain".to_string()]);
        }
        CellOutput::Single(_) => panic!("expected combined output"),
    }
    assert_eq!(cell.value(), Some(json!([3, 3])));
}

#[tokio::test]
async fn single_binding_cell_exposes_its_observers() {
    let nb = notebook();
    let cell = add_code(&nb, "c1", "x = 1").await;
    assert!(matches!(cell.output(), Some(CellOutput::Single(_))));
}

// ===========================================================================
// Markdown and markup cells
// ===========================================================================

#[tokio::test]
async fn markdown_interpolates_and_renders_html() {
    let nb = notebook();
    add_code(&nb, "c1", "t = 2").await;
    let md = nb
        .add_cell(
            CellId::new("c2"),
            CellKind::Markdown,
            "# Total {t}",
            None,
            false,
        )
        .await
        .unwrap();
    assert_eq!(md.value(), Some(json!("# Total 2")));
    assert!(md.html().unwrap().contains("<h1>Total 2</h1>"));
}

#[tokio::test]
async fn markdown_with_constant_expression() {
    let nb = notebook();
    let md = nb
        .add_cell(
            CellId::new("c1"),
            CellKind::Markdown,
            "# T\n\nv={1+1}",
            None,
            false,
        )
        .await
        .unwrap();
    let html = md.html().unwrap();
    assert!(html.contains("<h1>T</h1>"));
    assert!(html.contains("v=2"));
}

#[tokio::test]
async fn markdown_follows_upstream_changes() {
    let nb = notebook();
    add_code(&nb, "c1", "t = 2").await;
    let md = nb
        .add_cell(CellId::new("c2"), CellKind::Markdown, "n is {t}", None, false)
        .await
        .unwrap();
    assert_eq!(md.value(), Some(json!("n is 2")));

    let patch = CellPatch {
        kind: None,
        value: Some("t = 9".to_string()),
    };
    nb.update_cell(&CellId::new("c1"), &patch).await.unwrap();
    assert_eq!(md.value(), Some(json!("n is 9")));
}

#[tokio::test]
async fn markup_uses_dollar_brace_and_raw_html() {
    let nb = notebook();
    add_code(&nb, "c1", "t = 2").await;
    let markup = nb
        .add_cell(
            CellId::new("c2"),
            CellKind::Markup,
            "<b>${t}</b> and {t}",
            None,
            false,
        )
        .await
        .unwrap();
    // Only `${...}` interpolates in markup; bare braces are literal.
    assert_eq!(markup.value(), Some(json!("<b>2</b> and {t}")));
    assert_eq!(markup.html(), Some("<b>2</b> and {t}".to_string()));
}

#[tokio::test]
async fn bad_embedded_expression_degrades_inline() {
    let nb = notebook();
    let md = nb
        .add_cell(CellId::new("c1"), CellKind::Markdown, "value: {1 +}", None, false)
        .await
        .unwrap();
    let text = md.value().unwrap();
    assert!(text.as_str().unwrap().contains("[Error:"));
    assert!(md.error().is_none());
}

#[tokio::test]
async fn code_cells_have_no_html() {
    let nb = notebook();
    let cell = add_code(&nb, "c1", "x = 1").await;
    assert_eq!(cell.html(), None);
}

// ===========================================================================
// Notebook orchestration
// ===========================================================================

#[tokio::test]
async fn duplicate_cell_ids_are_rejected() {
    let nb = notebook();
    add_code(&nb, "c1", "x = 1").await;
    let err = nb
        .add_cell(CellId::new("c1"), CellKind::Code, "y = 2", None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateCell(_)));
}

#[tokio::test]
async fn positions_insert_and_clamp() {
    let nb = notebook();
    add_code(&nb, "a", "1").await;
    add_code(&nb, "b", "2").await;
    add_code(&nb, "c", "3").await;
    nb.add_cell(CellId::new("d"), CellKind::Code, "4", Some(1), false)
        .await
        .unwrap();
    nb.add_cell(CellId::new("e"), CellKind::Code, "5", Some(99), false)
        .await
        .unwrap();
    let order: Vec<String> = nb.cells().iter().map(|c| c.id().to_string()).collect();
    assert_eq!(order, vec!["a", "d", "b", "c", "e"]);
}

#[tokio::test]
async fn move_cell_reorders_within_bounds() {
    let nb = notebook();
    add_code(&nb, "a", "1").await;
    add_code(&nb, "b", "2").await;
    add_code(&nb, "c", "3").await;

    assert!(nb.move_cell(&CellId::new("c"), 0));
    let order: Vec<String> = nb.cells().iter().map(|c| c.id().to_string()).collect();
    assert_eq!(order, vec!["c", "a", "b"]);

    assert!(!nb.move_cell(&CellId::new("a"), 3));
    assert!(!nb.move_cell(&CellId::new("ghost"), 0));

    // Moving to the current index is a no-op that still succeeds.
    assert!(nb.move_cell(&CellId::new("c"), 0));
    assert_eq!(nb.cells().len(), 3);
}

#[tokio::test]
async fn duplicate_cell_clones_source_under_fresh_id() {
    let nb = notebook();
    add_code(&nb, "a", "x = 1").await;
    add_code(&nb, "b", "x + 1").await;
    let copy = nb.duplicate_cell(&CellId::new("a")).await.unwrap();
    assert_ne!(copy.id().as_str(), "a");
    assert_eq!(copy.source(), "x = 1");

    let order: Vec<String> = nb.cells().iter().map(|c| c.id().to_string()).collect();
    assert_eq!(order[0], "a");
    assert_eq!(order[1], copy.id().to_string());
    assert_eq!(order[2], "b");
    assert_eq!(copy.value(), Some(json!(1)));
}

#[tokio::test]
async fn at_most_one_cell_is_focused() {
    let nb = notebook();
    add_code(&nb, "a", "1").await;
    add_code(&nb, "b", "2").await;
    nb.add_cell(CellId::new("c"), CellKind::Code, "3", None, true)
        .await
        .unwrap();
    assert_eq!(nb.focused_cell().unwrap().id().as_str(), "c");

    assert!(nb.set_focus(&CellId::new("a")));
    assert_eq!(nb.focused_cell().unwrap().id().as_str(), "a");
    assert_eq!(nb.cells().iter().filter(|c| c.is_focused()).count(), 1);

    assert!(!nb.set_focus(&CellId::new("ghost")));
    nb.clear_focus();
    assert!(nb.focused_cell().is_none());
}

#[tokio::test]
async fn toggle_closed_flips_state() {
    let nb = notebook();
    add_code(&nb, "a", "1").await;
    assert_eq!(nb.toggle_closed(&CellId::new("a")), Some(true));
    assert_eq!(nb.toggle_closed(&CellId::new("a")), Some(false));
    assert_eq!(nb.toggle_closed(&CellId::new("ghost")), None);
}

#[tokio::test]
async fn version_bumps_on_every_mutation() {
    let nb = notebook();
    assert_eq!(nb.version(), 0);
    add_code(&nb, "a", "1").await;
    assert_eq!(nb.version(), 1);
    add_code(&nb, "b", "2").await;
    let patch = CellPatch {
        kind: None,
        value: Some("9".to_string()),
    };
    nb.update_cell(&CellId::new("a"), &patch).await.unwrap();
    assert_eq!(nb.version(), 3);
    nb.move_cell(&CellId::new("b"), 0);
    assert_eq!(nb.version(), 4);
    nb.remove_cell(&CellId::new("b"));
    assert_eq!(nb.version(), 5);
    nb.set_focus(&CellId::new("a"));
    assert_eq!(nb.version(), 6);
    nb.toggle_closed(&CellId::new("a"));
    assert_eq!(nb.version(), 7);
    nb.clear_focus();
    assert_eq!(nb.version(), 8);

    // Failed mutations leave the counter alone.
    nb.set_focus(&CellId::new("ghost"));
    nb.toggle_closed(&CellId::new("ghost"));
    nb.move_cell(&CellId::new("ghost"), 0);
    assert_eq!(nb.version(), 8);
}

#[tokio::test]
async fn from_source_builds_and_executes() {
    let source = NotebookSource {
        title: "Demo".to_string(),
        description: "a demo".to_string(),
        cells: vec![
            CellSource {
                id: CellId::new("c1"),
                kind: CellKind::Code,
                value: "x = 1".to_string(),
            },
            CellSource {
                id: CellId::new("c2"),
                kind: CellKind::Markdown,
                value: "val {x}".to_string(),
            },
        ],
    };
    let nb = Notebook::from_source(
        NotebookId::new("main"),
        source,
        Arc::new(StatementParser),
        Arc::new(ExprCompiler),
        Arc::new(MapLoader::default()),
    )
    .await
    .unwrap();
    assert_eq!(nb.title(), "Demo");
    assert_eq!(nb.cells()[1].value(), Some(json!("val 1")));
}

#[tokio::test]
async fn disposed_notebook_refuses_edits() {
    let nb = notebook();
    add_code(&nb, "a", "x = 1").await;
    nb.dispose();
    nb.dispose();
    let err = nb
        .add_cell(CellId::new("b"), CellKind::Code, "2", None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Disposed(_)));
}

// ===========================================================================
// Imports
// ===========================================================================

#[tokio::test]
async fn import_resolves_across_notebooks() {
    let loader = Arc::new(MapLoader::default().with("lib", &[("l1", "shared = 40")]));
    let nb = notebook_with(loader);
    let import = add_code(&nb, "c1", r#"import { shared } from "lib""#).await;
    assert!(import.error().is_none());
    assert_eq!(import.bound_names(), vec!["shared".to_string()]);

    let user = add_code(&nb, "c2", "shared + 2").await;
    assert_eq!(user.value(), Some(json!(42)));
}

#[tokio::test]
async fn import_alias_binds_the_local_name() {
    let loader = Arc::new(MapLoader::default().with("lib", &[("l1", "shared = 40")]));
    let nb = notebook_with(loader);
    add_code(&nb, "c1", r#"import { shared as s } from "lib""#).await;
    let user = add_code(&nb, "c2", "s + 2").await;
    assert_eq!(user.value(), Some(json!(42)));
}

#[tokio::test]
async fn diamond_import_loads_shared_notebook_once() {
    let loader = Arc::new(
        MapLoader::default()
            .with("c", &[("c1", "base = 1")])
            .with(
                "a",
                &[("a1", r#"import { base } from "c""#), ("a2", "ax = base + 1")],
            )
            .with(
                "b",
                &[("b1", r#"import { base } from "c""#), ("b2", "bx = base + 2")],
            ),
    );
    let nb = notebook_with(loader.clone());
    add_code(&nb, "m1", r#"import { ax } from "a""#).await;
    add_code(&nb, "m2", r#"import { bx } from "b""#).await;
    let sum = add_code(&nb, "m3", "ax + bx").await;
    assert_eq!(sum.value(), Some(json!(5)));
    assert_eq!(loader.fetches_of("c"), 1);
}

#[tokio::test]
async fn self_import_cycle_is_detected() {
    let loader = Arc::new(MapLoader::default().with("a", &[("a1", r#"import { x } from "a""#)]));
    let nb = notebook_with(loader);
    let cell = add_code(&nb, "c1", r#"import { x } from "a""#).await;
    let error = cell.error().unwrap();
    assert!(error.to_string().contains("circular import"));
}

#[tokio::test]
async fn three_notebook_cycle_is_detected() {
    let loader = Arc::new(
        MapLoader::default()
            .with("a", &[("a1", r#"import { y } from "b""#)])
            .with("b", &[("b1", r#"import { z } from "c""#)])
            .with("c", &[("c1", r#"import { x } from "a""#)]),
    );
    let nb = notebook_with(loader);
    let cell = add_code(&nb, "c1", r#"import { y } from "a""#).await;
    let error = cell.error().unwrap();
    assert!(error.to_string().contains("circular import"));
    assert!(error.to_string().contains('a'));
}

#[tokio::test]
async fn two_notebook_cycle_is_detected() {
    let loader = Arc::new(
        MapLoader::default()
            .with("a", &[("a1", r#"import { y } from "b""#)])
            .with("b", &[("b1", r#"import { x } from "a""#)]),
    );
    let nb = notebook_with(loader);
    let cell = add_code(&nb, "c1", r#"import { y } from "a""#).await;
    let error = cell.error().unwrap();
    assert!(error.to_string().contains("circular import"));
}

#[tokio::test]
async fn unknown_notebook_fails_the_import_cell() {
    let nb = notebook();
    let cell = add_code(&nb, "c1", r#"import { x } from "nope""#).await;
    let error = cell.error().unwrap();
    assert!(error.to_string().contains("failed to load notebook"));
}

#[tokio::test]
async fn imported_viewof_exports_both_names() {
    let loader = Arc::new(MapLoader::default().with("lib", &[("l1", "viewof gain = 3")]));
    let nb = notebook_with(loader);
    add_code(&nb, "c1", r#"import { gain } from "lib""#).await;
    let user = add_code(&nb, "c2", "gain * 2").await;
    assert_eq!(user.value(), Some(json!(6)));
}
