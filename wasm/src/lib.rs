use phylo_graph::layout::NoopObserver;
use phylo_graph::layout_dump::LayoutDump;
use phylo_graph::{LayoutConfig, compute_layout_with, parse_config, parse_document, path, relationship_report};
use serde::Serialize;
use wasm_bindgen::prelude::*;

fn to_js_error(error: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn layout_json(document_json: &str, config_json: Option<&str>) -> Result<String, String> {
    let graph = parse_document(document_json).map_err(|error| format!("{error:#}"))?;
    let config = match config_json {
        Some(raw) => parse_config(raw).map_err(|error| error.to_string())?,
        None => LayoutConfig::default(),
    };
    let layout = compute_layout_with(&graph, &config, &mut NoopObserver);
    let dump = LayoutDump::from_layout(&layout, &graph);
    serde_json::to_string(&dump).map_err(|error| error.to_string())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Relation {
    label: String,
    path: Vec<String>,
}

fn relate_json(document_json: &str, from: &str, to: &str) -> Result<String, String> {
    let graph = parse_document(document_json).map_err(|error| format!("{error:#}"))?;
    let report = relationship_report(&graph, from, to);
    serde_json::to_string(&Relation {
        label: report.label,
        path: report.path,
    })
    .map_err(|error| error.to_string())
}

fn path_json(document_json: &str, from: &str, to: &str) -> Result<String, String> {
    let graph = parse_document(document_json).map_err(|error| format!("{error:#}"))?;
    serde_json::to_string(&path(&graph, from, to)).map_err(|error| error.to_string())
}

/// Lays out a family document; `config_json` uses the JSON5 config keys.
#[wasm_bindgen]
pub fn layout_family(document_json: &str, config_json: Option<String>) -> Result<String, JsValue> {
    layout_json(document_json, config_json.as_deref()).map_err(to_js_error)
}

#[wasm_bindgen]
pub fn relate_members(document_json: &str, from: &str, to: &str) -> Result<String, JsValue> {
    relate_json(document_json, from, to).map_err(to_js_error)
}

#[wasm_bindgen]
pub fn member_path(document_json: &str, from: &str, to: &str) -> Result<String, JsValue> {
    path_json(document_json, from, to).map_err(to_js_error)
}

#[cfg(test)]
mod tests {
    use crate::{layout_json, path_json, relate_json};

    const FAMILY: &str = r#"{
        "members": [
            {"id": "gp", "name": "Grandpa"},
            {"id": "dad", "name": "Dad"},
            {"id": "kid", "name": "Kid"}
        ],
        "relationships": [
            {"type": "parent-child", "a_member_id": "gp", "b_member_id": "dad"},
            {"type": "parent-child", "a_member_id": "dad", "b_member_id": "kid"}
        ]
    }"#;

    #[test]
    fn lays_out_a_document() {
        let json = layout_json(FAMILY, Some("{ verticalSpacing: 100 }")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["nodes"].as_array().unwrap().len(), 3);
        assert_eq!(value["height"], 200.0);
    }

    #[test]
    fn relates_and_paths() {
        let relation = relate_json(FAMILY, "gp", "kid").unwrap();
        assert!(relation.contains("Grandparent"));
        let route = path_json(FAMILY, "kid", "gp").unwrap();
        assert_eq!(route, r#"["kid","dad","gp"]"#);
    }

    #[test]
    fn malformed_documents_are_errors() {
        assert!(layout_json("not json", None).is_err());
    }
}
