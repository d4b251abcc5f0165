// Notebook document (nbformat v4 JSON)

use crate::error::{AppError, Result};
use serde_json::{json, Map, Value};
use std::path::Path;

/// A notebook held as raw JSON so unknown fields survive a load/save cycle
#[derive(Debug, Clone)]
pub struct NotebookDocument {
    root: Map<String, Value>,
    cells: Vec<Value>,
}

impl NotebookDocument {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| AppError::io_at(path, e))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(mut root) = value else {
            return Err(AppError::Validation(
                "notebook document is not a JSON object".to_string(),
            ));
        };
        let cells = match root.remove("cells") {
            Some(Value::Array(cells)) => cells,
            _ => {
                return Err(AppError::Validation(
                    "notebook document has no cells array".to_string(),
                ))
            }
        };
        if let Some(major) = root.get("nbformat").and_then(Value::as_u64) {
            if major < 4 {
                return Err(AppError::Validation(format!(
                    "unsupported nbformat version {major}"
                )));
            }
        }
        Ok(Self { root, cells })
    }

    /// Cell ids exist from nbformat 4.5 on; older minors reject the field
    fn supports_cell_ids(&self) -> bool {
        self.root
            .get("nbformat_minor")
            .and_then(Value::as_u64)
            .map_or(true, |minor| minor >= 5)
    }

    /// Insert a code cell so it runs before everything else
    pub fn prepend_code_cell(&mut self, source: &str, cell_id: &str) {
        let mut cell = json!({
            "cell_type": "code",
            "execution_count": null,
            "metadata": {},
            "outputs": [],
            "source": source,
        });
        if self.supports_cell_ids() {
            cell["id"] = Value::String(cell_id.to_string());
        }
        self.cells.insert(0, cell);
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn code_cell_count(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| c.get("cell_type").and_then(Value::as_str) == Some("code"))
            .count()
    }

    /// Source of the first cell, joining list-form sources
    pub fn first_source(&self) -> Option<String> {
        match self.cells.first()?.get("source")? {
            Value::String(s) => Some(s.clone()),
            Value::Array(parts) => Some(parts.iter().filter_map(Value::as_str).collect()),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        let mut root = self.root.clone();
        root.insert("cells".to_string(), Value::Array(self.cells.clone()));
        Ok(serde_json::to_string_pretty(&root)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| AppError::io_at(parent, e))?;
            }
        }
        let mut body = self.to_json()?;
        body.push('\n');
        std::fs::write(path, body).map_err(|e| AppError::io_at(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r##"{
      "cells": [
        {"cell_type": "markdown", "id": "m1", "metadata": {}, "source": ["# KPI"]},
        {"cell_type": "code", "id": "c1", "execution_count": 3, "metadata": {},
         "outputs": [], "source": ["import pandas as pd\n", "df = pd.read_csv('x.csv')"]}
      ],
      "metadata": {"kernelspec": {"name": "python3"}},
      "nbformat": 4,
      "nbformat_minor": 5
    }"##;

    #[test]
    fn test_prepend_code_cell() {
        let mut nb = NotebookDocument::from_json(MINIMAL).unwrap();
        assert_eq!(nb.cell_count(), 2);
        assert_eq!(nb.code_cell_count(), 1);

        nb.prepend_code_cell("print('hook')\n", "harvest-1");
        assert_eq!(nb.cell_count(), 3);
        assert_eq!(nb.code_cell_count(), 2);
        assert_eq!(nb.first_source().as_deref(), Some("print('hook')\n"));
    }

    #[test]
    fn test_round_trip_keeps_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive").join("kpi__executed.ipynb");

        let mut nb = NotebookDocument::from_json(MINIMAL).unwrap();
        nb.prepend_code_cell("x = 1", "id-1");
        nb.save(&path).unwrap();

        let reloaded = NotebookDocument::load(&path).unwrap();
        assert_eq!(reloaded.cell_count(), 3);
        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["metadata"]["kernelspec"]["name"], "python3");
        assert_eq!(raw["cells"][0]["id"], "id-1");
        assert!(raw["cells"][0]["execution_count"].is_null());
    }

    #[test]
    fn test_no_cell_id_before_4_5() {
        let mut nb =
            NotebookDocument::from_json(r#"{"cells": [], "nbformat": 4, "nbformat_minor": 4}"#)
                .unwrap();
        nb.prepend_code_cell("x = 1", "id-1");
        let raw: Value = serde_json::from_str(&nb.to_json().unwrap()).unwrap();
        assert!(raw["cells"][0].get("id").is_none());
    }

    #[test]
    fn test_rejects_invalid_documents() {
        assert!(NotebookDocument::from_json("[]").is_err());
        assert!(NotebookDocument::from_json(r#"{"metadata": {}}"#).is_err());
        assert!(NotebookDocument::from_json(r#"{"cells": [], "nbformat": 3}"#).is_err());
        assert!(NotebookDocument::from_json("not json").is_err());
    }
}
