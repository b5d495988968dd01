use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::documentation::Documentation;
use crate::error::IrdsError;
use crate::records::{Doc, Query, TrecQrel};
use crate::resource::SharedNode;

pub type DocIter = Box<dyn Iterator<Item = Result<Doc, IrdsError>> + Send>;
pub type QueryIter = Box<dyn Iterator<Item = Result<Query, IrdsError>> + Send>;
pub type QrelIter = Box<dyn Iterator<Item = Result<TrecQrel, IrdsError>> + Send>;

pub trait DocsProvider: Send + Sync {
    fn docs_iter(&self) -> Result<DocIter, IrdsError>;
    fn docs_schema(&self) -> &'static str;
    fn docs_lang(&self) -> Option<&str>;
    fn docs_resource(&self) -> &SharedNode;
}

pub trait QueriesProvider: Send + Sync {
    fn queries_iter(&self) -> Result<QueryIter, IrdsError>;
    fn queries_schema(&self) -> &'static str;
    fn queries_lang(&self) -> Option<&str>;
    fn queries_resource(&self) -> &SharedNode;
}

pub trait QrelsProvider: Send + Sync {
    fn qrels_iter(&self) -> Result<QrelIter, IrdsError>;
    fn qrels_defs(&self) -> &BTreeMap<i32, String>;
    fn qrels_resource(&self) -> &SharedNode;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Docs,
    Queries,
    Qrels,
    Documentation,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Docs => write!(f, "docs"),
            Capability::Queries => write!(f, "queries"),
            Capability::Qrels => write!(f, "qrels"),
            Capability::Documentation => write!(f, "documentation"),
        }
    }
}

/// Immutable bundle of the capabilities a dataset was built with.
///
/// Components are shared by reference: sibling datasets built from the same
/// `Arc` resolve the same upstream nodes and therefore materialize once.
#[derive(Clone, Default)]
pub struct Dataset {
    id: String,
    docs: Option<Arc<dyn DocsProvider>>,
    queries: Option<Arc<dyn QueriesProvider>>,
    qrels: Option<Arc<dyn QrelsProvider>>,
    documentation: Option<Documentation>,
}

impl Dataset {
    pub fn builder() -> DatasetBuilder {
        DatasetBuilder::default()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::Docs => self.docs.is_some(),
            Capability::Queries => self.queries.is_some(),
            Capability::Qrels => self.qrels.is_some(),
            Capability::Documentation => self.documentation.is_some(),
        }
    }

    pub fn provides(&self) -> Vec<Capability> {
        [
            Capability::Docs,
            Capability::Queries,
            Capability::Qrels,
            Capability::Documentation,
        ]
        .into_iter()
        .filter(|capability| self.has(*capability))
        .collect()
    }

    fn missing(&self, capability: Capability) -> IrdsError {
        IrdsError::Capability {
            dataset: self.id.clone(),
            capability: capability.to_string(),
        }
    }

    pub fn docs(&self) -> Result<&Arc<dyn DocsProvider>, IrdsError> {
        self.docs
            .as_ref()
            .ok_or_else(|| self.missing(Capability::Docs))
    }

    pub fn queries(&self) -> Result<&Arc<dyn QueriesProvider>, IrdsError> {
        self.queries
            .as_ref()
            .ok_or_else(|| self.missing(Capability::Queries))
    }

    pub fn qrels(&self) -> Result<&Arc<dyn QrelsProvider>, IrdsError> {
        self.qrels
            .as_ref()
            .ok_or_else(|| self.missing(Capability::Qrels))
    }

    pub fn documentation(&self) -> Result<&Documentation, IrdsError> {
        self.documentation
            .as_ref()
            .ok_or_else(|| self.missing(Capability::Documentation))
    }

    pub fn docs_iter(&self) -> Result<DocIter, IrdsError> {
        self.docs()?.docs_iter()
    }

    pub fn queries_iter(&self) -> Result<QueryIter, IrdsError> {
        self.queries()?.queries_iter()
    }

    pub fn qrels_iter(&self) -> Result<QrelIter, IrdsError> {
        self.qrels()?.qrels_iter()
    }

    /// Every resource node backing a data capability, in capability order.
    pub fn resources(&self) -> Vec<(Capability, SharedNode)> {
        let mut resources = Vec::new();
        if let Some(docs) = &self.docs {
            resources.push((Capability::Docs, Arc::clone(docs.docs_resource())));
        }
        if let Some(queries) = &self.queries {
            resources.push((Capability::Queries, Arc::clone(queries.queries_resource())));
        }
        if let Some(qrels) = &self.qrels {
            resources.push((Capability::Qrels, Arc::clone(qrels.qrels_resource())));
        }
        resources
    }
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("id", &self.id)
            .field("provides", &self.provides())
            .finish()
    }
}

#[derive(Default)]
pub struct DatasetBuilder {
    dataset: Dataset,
}

impl DatasetBuilder {
    pub fn docs(mut self, docs: Arc<dyn DocsProvider>) -> Self {
        self.dataset.docs = Some(docs);
        self
    }

    pub fn queries(mut self, queries: Arc<dyn QueriesProvider>) -> Self {
        self.dataset.queries = Some(queries);
        self
    }

    pub fn qrels(mut self, qrels: Arc<dyn QrelsProvider>) -> Self {
        self.dataset.qrels = Some(qrels);
        self
    }

    pub fn documentation(mut self, documentation: Documentation) -> Self {
        self.dataset.documentation = Some(documentation);
        self
    }

    pub fn build(self) -> Dataset {
        self.dataset
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn absent_capability_is_named() {
        let dataset = Dataset::builder()
            .documentation(Documentation::default())
            .build()
            .with_id("trec-tot");
        assert_eq!(dataset.provides(), vec![Capability::Documentation]);

        let err = dataset.queries().err().unwrap();
        assert_matches!(
            err,
            IrdsError::Capability { ref dataset, ref capability }
                if dataset == "trec-tot" && capability == "queries"
        );
        assert!(dataset.resources().is_empty());
    }
}
