//! Built-in renderer run inside worker processes

use anyhow::{bail, Context};
use carto_render::{Category, Renderer, TaskDescriptor};
use carto_territory::{Layer, MapDocument, MapSync, ParserConfig, TerritoryCatalog, TreeSerializer};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct BuilderPayload {
    #[serde(flatten)]
    document: MapDocument,
    #[serde(default)]
    predefined_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CodePayload {
    code: String,
    #[serde(default)]
    predefined_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LibraryPayload {
    #[serde(default)]
    predefined_code: String,
}

/// Renders map tasks into code, builder documents and library listings
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct MapRenderer {
    sync: MapSync,
}

impl MapRenderer {
    pub(crate) fn new(config: ParserConfig) -> Self {
        Self {
            sync: MapSync::with_config(config),
        }
    }

    /// Builder elements to code, with each flag's expression
    fn render_builder(&self, payload: Value) -> anyhow::Result<Value> {
        let payload: BuilderPayload = serde_json::from_value(payload).context("invalid builder payload")?;
        let catalog = library_catalog(payload.predefined_code.as_deref())?;
        let code = self.sync.document_to_code(&payload.document)?;

        let serializer = TreeSerializer::new();
        let mut layers = Vec::new();
        for layer in &payload.document.layers {
            if let Layer::Flag { label, value, .. } = layer {
                layers.push(json!({
                    "label": label,
                    "expression": serializer.serialize(value)?,
                    "unresolved": catalog.as_ref().map(|c| c.unresolved(value)).unwrap_or_default(),
                }));
            }
        }
        Ok(json!({ "code": code, "layers": layers }))
    }

    /// Code to builder elements
    fn render_code(&self, payload: Value) -> anyhow::Result<Value> {
        let payload: CodePayload = serde_json::from_value(payload).context("invalid code payload")?;
        let catalog = library_catalog(payload.predefined_code.as_deref())?;
        let synced = self.sync.code_to_document(&payload.code)?;

        let unresolved: Vec<String> = match &catalog {
            Some(catalog) => {
                let mut names: Vec<String> = synced
                    .document
                    .layers
                    .iter()
                    .filter_map(|layer| match layer {
                        Layer::Flag { value, .. } => Some(catalog.unresolved(value)),
                        Layer::Python { .. } => None,
                    })
                    .flatten()
                    .collect();
                names.sort();
                names.dedup();
                names
            }
            None => Vec::new(),
        };
        let warnings: Vec<String> = synced.warnings.iter().map(ToString::to_string).collect();
        Ok(json!({
            "imports": synced.document.imports,
            "elements": synced.document.layers,
            "warnings": warnings,
            "unresolved": unresolved,
        }))
    }

    /// Names a territory library defines
    fn render_library(payload: Value) -> anyhow::Result<Value> {
        let payload: LibraryPayload =
            serde_json::from_value(payload).context("invalid territory library payload")?;
        let catalog = TerritoryCatalog::from_library_code(&payload.predefined_code)?;
        Ok(json!({
            "available_names": catalog.available_names(),
            "index_names": catalog.index_names(),
        }))
    }
}

fn library_catalog(code: Option<&str>) -> anyhow::Result<Option<TerritoryCatalog>> {
    code.map(|code| TerritoryCatalog::from_library_code(code).context("invalid territory library"))
        .transpose()
}

impl Renderer for MapRenderer {
    fn render(&self, task: &TaskDescriptor) -> Result<Value, String> {
        let payload = task.payload.clone();
        let result = match task.category.as_str() {
            Category::BUILDER => self.render_builder(payload),
            Category::CODE => self.render_code(payload),
            Category::TERRITORY_LIBRARY => Self::render_library(payload),
            Category::PICKER => Err(anyhow::anyhow!("picker maps need a plotting backend")),
            other => Err(anyhow::anyhow!("unknown task category `{other}`")),
        };
        result.map_err(|e| {
            tracing::warn!(category = %task.category, error = %e, "render failed");
            format!("{e:#}")
        })
    }
}

/// Validate a payload before it is sent to a worker
pub(crate) fn check_payload(category: &Category, payload: &Value) -> anyhow::Result<()> {
    if !Category::well_known().contains(category) {
        bail!("unknown task category `{category}`");
    }
    if !(payload.is_object() || payload.is_null()) {
        bail!("payload must be a JSON object");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn render(category: &str, payload: Value) -> Result<Value, String> {
        MapRenderer::default().render(&TaskDescriptor::new(category, payload))
    }

    #[test]
    fn builder_renders_code_and_layers() {
        let out = render(
            Category::BUILDER,
            json!({
                "imports": ["import xatra"],
                "elements": [{
                    "type": "flag",
                    "label": "Kuru",
                    "value": [
                        {"op": "union", "type": "gadm", "value": "IND.12"},
                        {"op": "difference", "type": "predefined", "value": "PANCALA"},
                    ],
                }],
                "predefined_code": "KURU = gadm(\"IND.12\")\n",
            }),
        )
        .unwrap();

        assert_eq!(
            out["code"],
            json!("import xatra\n\nxatra.Flag(label=\"Kuru\", value=gadm(\"IND.12\") - PANCALA)\n")
        );
        assert_eq!(out["layers"][0]["expression"], json!("gadm(\"IND.12\") - PANCALA"));
        assert_eq!(out["layers"][0]["unresolved"], json!(["PANCALA"]));
    }

    #[test]
    fn code_renders_builder_elements() {
        let out = render(
            Category::CODE,
            json!({"code": "import xatra\nxatra.Flag(label=\"A\", value=gadm(\"IND\") | KURU)\nprint(1)\n"}),
        )
        .unwrap();
        assert_eq!(out["imports"], json!(["import xatra"]));
        assert_eq!(out["elements"][0]["type"], json!("flag"));
        assert_eq!(
            out["elements"][0]["value"],
            json!([
                {"op": "union", "type": "gadm", "value": "IND"},
                {"op": "union", "type": "predefined", "value": "KURU"},
            ])
        );
        assert_eq!(out["elements"][1], json!({"type": "python", "value": "print(1)"}));
        assert_eq!(out["unresolved"], json!([]));
    }

    #[test]
    fn library_lists_names() {
        let out = render(
            Category::TERRITORY_LIBRARY,
            json!({"predefined_code": "KURU = gadm(\"IND.12\")\n_TMP = 1\n__TERRITORY_INDEX__ = [\"KURU\"]\n"}),
        )
        .unwrap();
        assert_eq!(out["available_names"], json!(["KURU"]));
        assert_eq!(out["index_names"], json!(["KURU"]));
    }

    #[test]
    fn picker_and_unknown_categories_fail() {
        assert!(render(Category::PICKER, json!({})).unwrap_err().contains("plotting"));
        assert!(render("globe", json!({})).unwrap_err().contains("`globe`"));
    }

    #[test]
    fn bad_payload_reports_context() {
        let err = render(Category::CODE, json!({"source": 1})).unwrap_err();
        assert!(err.starts_with("invalid code payload"), "{err}");
    }

    #[test]
    fn payload_checks() {
        assert!(check_payload(&Category::new(Category::CODE), &json!({})).is_ok());
        assert!(check_payload(&Category::new(Category::CODE), &json!([1])).is_err());
        assert!(check_payload(&Category::new("globe"), &json!({})).is_err());
    }
}
