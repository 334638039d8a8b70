//! Schema catalog loading (`schema_summary.yaml` or JSON).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use jsonschema::Draft;
use serde_json::Value;
use tracing::debug;

use crate::core::schema::SchemaCatalog;

const CATALOG_SCHEMA: &str = include_str!("../../schemas/catalog.schema.json");

/// Load and validate the catalog. YAML is chosen by `.yaml`/`.yml` extension.
pub fn load_catalog(path: &Path) -> Result<SchemaCatalog> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read catalog {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    );
    let catalog = parse_catalog(&contents, is_yaml)
        .with_context(|| format!("load catalog {}", path.display()))?;
    debug!(
        path = %path.display(),
        tables = catalog.tables.len(),
        joins = catalog.common_joins.len(),
        "catalog loaded"
    );
    Ok(catalog)
}

/// Parse catalog text, validating it against the embedded JSON Schema first.
pub fn parse_catalog(contents: &str, is_yaml: bool) -> Result<SchemaCatalog> {
    let document: Value = if is_yaml {
        serde_yaml::from_str(contents).context("parse catalog yaml")?
    } else {
        serde_json::from_str(contents).context("parse catalog json")?
    };
    validate_document(&document)?;
    let catalog: SchemaCatalog =
        serde_json::from_value(document).context("parse catalog as struct")?;
    Ok(catalog)
}

fn validate_document(document: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(CATALOG_SCHEMA).context("parse catalog schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile catalog schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(document)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("catalog validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}
