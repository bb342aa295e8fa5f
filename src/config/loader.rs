//! Configuration and schema document loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::builder::{build_config_tree, build_schema_tree};
use crate::tree::{Tree, TreeError};

/// Error type for document loading.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("schema contract violation: {}", .0.join("; "))]
    Contract(Vec<String>),
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// The result of a successful load: both trees plus the raw schema
/// document kept for later contract checks on candidates.
pub struct LoadedConfig {
    pub schema_doc: serde_json::Value,
    pub schema: Tree,
    pub running: Tree,
}

/// Load and validate a configuration/schema document pair from disk.
pub fn load_from_files(config_path: &Path, schema_path: &Path) -> Result<LoadedConfig, LoadError> {
    let config_raw = fs::read_to_string(config_path)?;
    let schema_raw = fs::read_to_string(schema_path)?;
    let config_doc: serde_json::Value = serde_json::from_str(&config_raw)?;
    let schema_doc: serde_json::Value = serde_json::from_str(&schema_raw)?;
    load_documents(config_doc, schema_doc)
}

/// Check the config against the schema contract, then build both trees.
pub fn load_documents(
    config_doc: serde_json::Value,
    schema_doc: serde_json::Value,
) -> Result<LoadedConfig, LoadError> {
    contract_check(&schema_doc, &config_doc)?;
    let schema = build_schema_tree(&schema_doc)?;
    let running = build_config_tree(&config_doc, &schema)?;
    Ok(LoadedConfig {
        schema_doc,
        schema,
        running,
    })
}

/// External contract check: the configuration document must satisfy the
/// schema document before any tree is built.
pub fn contract_check(
    schema_doc: &serde_json::Value,
    config_doc: &serde_json::Value,
) -> Result<(), LoadError> {
    let compiled = jsonschema::JSONSchema::compile(schema_doc)
        .map_err(|e| LoadError::Contract(vec![e.to_string()]))?;
    if let Err(errors) = compiled.validate(config_doc) {
        let messages: Vec<String> = errors.map(|e| e.to_string()).collect();
        return Err(LoadError::Contract(messages));
    }
    Ok(())
}
