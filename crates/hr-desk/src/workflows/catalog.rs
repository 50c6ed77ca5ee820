//! Static catalog of parameterized queries and reports, loaded once at startup.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::database::ScriptProvider;
use crate::forms::FieldSpec;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("catalog is malformed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{kind} '{id}' is declared more than once")]
    DuplicateId { kind: &'static str, id: String },
    #[error("{kind} '{id}' references unknown script '{script}'")]
    MissingScript {
        kind: &'static str,
        id: String,
        script: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDefinition {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing)]
    pub script: String,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDefinition {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing)]
    pub build_procedure: String,
    #[serde(skip_serializing)]
    pub exists_script: String,
    #[serde(skip_serializing)]
    pub select_script: String,
    /// Field names in the order the build procedure takes them.
    #[serde(skip_serializing)]
    pub arg_order: Vec<String>,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    queries: Vec<QueryDefinition>,
    #[serde(default)]
    reports: Vec<ReportDefinition>,
}

impl Catalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let catalog: Self = serde_json::from_str(raw)?;
        catalog.check_unique()?;
        Ok(catalog)
    }

    fn check_unique(&self) -> Result<(), CatalogError> {
        let mut seen = HashSet::new();
        for query in &self.queries {
            if !seen.insert(query.id.as_str()) {
                return Err(CatalogError::DuplicateId {
                    kind: "query",
                    id: query.id.clone(),
                });
            }
        }
        seen.clear();
        for report in &self.reports {
            if !seen.insert(report.id.as_str()) {
                return Err(CatalogError::DuplicateId {
                    kind: "report",
                    id: report.id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Every script an entry names must be registered.
    pub fn verify(&self, scripts: &ScriptProvider) -> Result<(), CatalogError> {
        let query_scripts = self
            .queries
            .iter()
            .map(|query| ("query", &query.id, &query.script));
        let report_scripts = self.reports.iter().flat_map(|report| {
            [
                &report.build_procedure,
                &report.exists_script,
                &report.select_script,
            ]
            .into_iter()
            .map(move |script| ("report", &report.id, script))
        });

        for (kind, id, script) in query_scripts.chain(report_scripts) {
            if !scripts.contains(script) {
                return Err(CatalogError::MissingScript {
                    kind,
                    id: id.clone(),
                    script: script.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn queries(&self) -> &[QueryDefinition] {
        &self.queries
    }

    pub fn reports(&self) -> &[ReportDefinition] {
        &self.reports
    }

    pub fn query(&self, id: &str) -> Option<&QueryDefinition> {
        self.queries.iter().find(|query| query.id == id)
    }

    pub fn report(&self, id: &str) -> Option<&ReportDefinition> {
        self.reports.iter().find(|report| report.id == id)
    }
}
