use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::dataset::Capability;
use crate::documentation::Documentation;
use crate::error::IrdsError;
use crate::registry::Registry;
use crate::resource::CancelToken;

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub datasets: Vec<ListEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub id: String,
    pub provides: Vec<Capability>,
    pub pretty_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoResult {
    pub id: String,
    pub provides: Vec<Capability>,
    pub docs_schema: Option<String>,
    pub queries_schema: Option<String>,
    pub qrels_defs: Option<BTreeMap<i32, String>>,
    pub documentation: Option<Documentation>,
    pub resources: Vec<ResourceEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceEntry {
    pub capability: Capability,
    pub key: String,
    pub materialized: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub items: Vec<FetchItemResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchItemResult {
    pub dataset: String,
    pub capability: Capability,
    pub key: String,
    pub action: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportResult {
    pub dataset: String,
    pub capability: Capability,
    pub records: usize,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App {
    registry: Registry,
}

impl App {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn list(&self, sink: &dyn ProgressSink) -> Result<ListResult, IrdsError> {
        sink.event(ProgressEvent {
            message: "phase=Resolve; listing registry".to_string(),
            elapsed: None,
        });
        let datasets = self
            .registry
            .list_ids()
            .into_iter()
            .map(|id| -> Result<ListEntry, IrdsError> {
                let dataset = self.registry.get(&id)?;
                Ok(ListEntry {
                    provides: dataset.provides(),
                    pretty_name: dataset
                        .documentation()
                        .ok()
                        .and_then(|doc| doc.pretty_name.clone()),
                    id,
                })
            })
            .collect::<Result<Vec<_>, IrdsError>>()?;
        Ok(ListResult { datasets })
    }

    pub fn info(&self, id: &str, sink: &dyn ProgressSink) -> Result<InfoResult, IrdsError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; looking up {id}"),
            elapsed: None,
        });
        let dataset = self.registry.get(id)?;
        let resources = dataset
            .resources()
            .into_iter()
            .map(|(capability, node)| ResourceEntry {
                capability,
                key: node.key().to_string(),
                materialized: node.is_materialized(),
            })
            .collect();

        Ok(InfoResult {
            id: dataset.id().to_string(),
            provides: dataset.provides(),
            docs_schema: dataset
                .docs()
                .ok()
                .map(|docs| docs.docs_schema().to_string()),
            queries_schema: dataset
                .queries()
                .ok()
                .map(|queries| queries.queries_schema().to_string()),
            qrels_defs: dataset.qrels().ok().map(|qrels| qrels.qrels_defs().clone()),
            documentation: dataset.documentation().ok().cloned(),
            resources,
        })
    }

    /// Materializes every data component of the given datasets. Components
    /// shared between datasets are visited once.
    pub fn fetch(
        &self,
        ids: &[String],
        cancel: &CancelToken,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, IrdsError> {
        let mut seen = HashSet::new();
        let mut items = Vec::new();
        for id in ids {
            let dataset = self.registry.get(id)?;
            for (capability, node) in dataset.resources() {
                if !seen.insert(node.key().clone()) {
                    continue;
                }
                let action = if node.is_materialized() {
                    "cache"
                } else {
                    "materialized"
                };
                sink.event(ProgressEvent {
                    message: format!("phase=Fetch; {id} {capability} ({})", node.key()),
                    elapsed: None,
                });
                let start = Instant::now();
                let path = node.resolve_with(cancel)?;
                sink.event(ProgressEvent {
                    message: format!("phase=Store; {path}"),
                    elapsed: Some(start.elapsed()),
                });
                items.push(FetchItemResult {
                    dataset: id.clone(),
                    capability,
                    key: node.key().to_string(),
                    action: action.to_string(),
                    path: path.to_string(),
                });
            }
        }
        Ok(FetchResult { items })
    }

    /// Writes records of one capability as JSON lines.
    pub fn export(
        &self,
        id: &str,
        capability: Capability,
        limit: Option<usize>,
        writer: &mut dyn Write,
        sink: &dyn ProgressSink,
    ) -> Result<ExportResult, IrdsError> {
        let dataset = self.registry.get(id)?;
        sink.event(ProgressEvent {
            message: format!("phase=Export; {id} {capability}"),
            elapsed: None,
        });
        let limit = limit.unwrap_or(usize::MAX);
        let records = match capability {
            Capability::Docs => write_jsonl(dataset.docs_iter()?, limit, writer)?,
            Capability::Queries => write_jsonl(dataset.queries_iter()?, limit, writer)?,
            Capability::Qrels => write_jsonl(dataset.qrels_iter()?, limit, writer)?,
            Capability::Documentation => write_jsonl(
                std::iter::once(Ok(dataset.documentation()?.clone())),
                limit,
                writer,
            )?,
        };
        Ok(ExportResult {
            dataset: id.to_string(),
            capability,
            records,
        })
    }
}

fn write_jsonl<T, I>(records: I, limit: usize, writer: &mut dyn Write) -> Result<usize, IrdsError>
where
    T: Serialize,
    I: Iterator<Item = Result<T, IrdsError>>,
{
    let mut count = 0;
    for record in records.take(limit) {
        let record = record?;
        serde_json::to_writer(&mut *writer, &record)
            .map_err(|err| IrdsError::Filesystem(err.to_string()))?;
        writer
            .write_all(b"\n")
            .map_err(|err| IrdsError::Filesystem(err.to_string()))?;
        count += 1;
    }
    Ok(count)
}
