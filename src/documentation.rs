use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::IrdsError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Documentation {
    #[serde(default)]
    pub pretty_name: Option<String>,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub bibtex: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

/// Per-namespace documentation entries keyed by subset (`_` for the root).
#[derive(Debug, Clone, Default)]
pub struct DocumentationCatalog {
    entries: BTreeMap<String, Documentation>,
}

impl DocumentationCatalog {
    pub fn from_json(content: &str) -> Result<Self, IrdsError> {
        let entries = serde_json::from_str(content)
            .map_err(|err| IrdsError::ConfigParse(format!("documentation catalog: {err}")))?;
        Ok(Self { entries })
    }

    /// Entry for `subset`; a subset without an entry gets an empty one.
    pub fn entry(&self, subset: &str) -> Documentation {
        self.entries.get(subset).cloned().unwrap_or_default()
    }
}
