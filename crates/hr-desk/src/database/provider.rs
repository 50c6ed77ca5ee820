use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::SqlError;

/// Failures while loading the script tree. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("sql script directory not found: {0}")]
    MissingRoot(PathBuf),
    #[error("duplicate sql script '{name}' ({first} and {second})")]
    Duplicate {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Immutable, flat namespace of named SQL scripts keyed by file name.
#[derive(Debug, Clone, Default)]
pub struct ScriptProvider {
    scripts: HashMap<String, Script>,
}

#[derive(Debug, Clone)]
struct Script {
    path: PathBuf,
    text: String,
}

impl ScriptProvider {
    /// Walk `root` recursively and register every `*.sql` file by its file name.
    pub fn load(root: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(ScriptError::MissingRoot(root.to_path_buf()));
        }

        let mut provider = Self::default();
        provider.walk(root)?;
        debug!(root = %root.display(), scripts = provider.scripts.len(), "sql scripts loaded");
        Ok(provider)
    }

    /// Build a provider from in-memory scripts.
    pub fn from_scripts<I, N, T>(scripts: I) -> Result<Self, ScriptError>
    where
        I: IntoIterator<Item = (N, T)>,
        N: Into<String>,
        T: Into<String>,
    {
        let mut provider = Self::default();
        for (name, text) in scripts {
            let name = name.into();
            provider.register(name.clone(), PathBuf::from(&name), text.into())?;
        }
        Ok(provider)
    }

    fn walk(&mut self, dir: &Path) -> Result<(), ScriptError> {
        let io_error = |source| ScriptError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut entries = fs::read_dir(dir)
            .map_err(io_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(io_error)?;
        // deterministic duplicate reporting
        entries.sort_by_key(|entry| entry.path());

        for entry in entries {
            let path = entry.path();
            if path.is_dir() {
                self.walk(&path)?;
                continue;
            }
            if path.extension().and_then(|ext| ext.to_str()) != Some("sql") {
                continue;
            }
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let text = fs::read_to_string(&path).map_err(|source| ScriptError::Io {
                path: path.clone(),
                source,
            })?;
            self.register(name.to_string(), path.clone(), text)?;
        }
        Ok(())
    }

    fn register(&mut self, name: String, path: PathBuf, text: String) -> Result<(), ScriptError> {
        if let Some(existing) = self.scripts.get(&name) {
            return Err(ScriptError::Duplicate {
                name,
                first: existing.path.clone(),
                second: path,
            });
        }
        self.scripts.insert(name, Script { path, text });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&str, SqlError> {
        self.scripts
            .get(name)
            .map(|script| script.text.as_str())
            .ok_or_else(|| SqlError::UnknownScript(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scripts.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}
