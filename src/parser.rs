use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::marker::PhantomData;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use serde::de::DeserializeOwned;

use crate::dataset::{
    DocIter, DocsProvider, QrelIter, QrelsProvider, QueriesProvider, QueryIter,
};
use crate::error::IrdsError;
use crate::records::{Doc, Query, Schema, TrecQrel};
use crate::resource::SharedNode;

pub type LineParser<R> = Box<dyn Fn(&str) -> Result<R, String> + Send>;

/// Lazy, line-at-a-time stream of records from a resolved file.
///
/// Whitespace-only lines carry no record and are passed over. The first line
/// that fails to parse ends the stream with `MalformedRecord`.
pub struct RecordStream<R> {
    path: Utf8PathBuf,
    reader: BufReader<File>,
    parse: LineParser<R>,
    line: usize,
    buf: String,
    finished: bool,
}

impl<R> RecordStream<R> {
    pub fn open(path: &Utf8Path, parse: LineParser<R>) -> Result<Self, IrdsError> {
        let file = File::open(path.as_std_path())
            .map_err(|err| IrdsError::Filesystem(format!("open {path}: {err}")))?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            parse,
            line: 0,
            buf: String::new(),
            finished: false,
        })
    }

    fn malformed(&mut self, line: usize, raw: &str, reason: String) -> IrdsError {
        self.finished = true;
        IrdsError::MalformedRecord {
            path: self.path.to_string(),
            line,
            raw: raw.to_string(),
            reason,
        }
    }
}

impl<R> Iterator for RecordStream<R> {
    type Item = Result<R, IrdsError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => {
                    self.finished = true;
                    return None;
                }
                Ok(_) => {
                    self.line += 1;
                    let raw = self.buf.trim_end_matches(['\n', '\r']);
                    if raw.trim().is_empty() {
                        continue;
                    }
                    return match (self.parse)(raw) {
                        Ok(record) => Some(Ok(record)),
                        Err(reason) => {
                            let raw = raw.to_string();
                            Some(Err(self.malformed(self.line, &raw, reason)))
                        }
                    };
                }
                Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                    let line = self.line + 1;
                    return Some(Err(self.malformed(
                        line,
                        "<invalid utf-8>",
                        err.to_string(),
                    )));
                }
                Err(err) => {
                    self.finished = true;
                    return Some(Err(IrdsError::Filesystem(format!(
                        "read {}: {err}",
                        self.path
                    ))));
                }
            }
        }
    }
}

pub fn jsonl_parser<R: DeserializeOwned>() -> LineParser<R> {
    Box::new(|line| serde_json::from_str::<R>(line).map_err(|err| err.to_string()))
}

/// Parses `query_id iteration doc_id relevance`, rejecting relevance codes
/// missing from `defs`.
pub fn trec_qrels_parser(defs: Arc<BTreeMap<i32, String>>) -> LineParser<TrecQrel> {
    Box::new(move |line| {
        let fields = line.split_whitespace().collect::<Vec<_>>();
        let [query_id, iteration, doc_id, relevance] = fields.as_slice() else {
            return Err(format!("expected 4 columns, found {}", fields.len()));
        };
        let relevance = relevance
            .parse::<i32>()
            .map_err(|err| format!("invalid relevance {relevance:?}: {err}"))?;
        if !defs.contains_key(&relevance) {
            return Err(format!("relevance {relevance} has no defined label"));
        }
        Ok(TrecQrel {
            query_id: query_id.to_string(),
            doc_id: doc_id.to_string(),
            relevance,
            iteration: iteration.to_string(),
        })
    })
}

pub struct JsonlDocs<R> {
    source: SharedNode,
    lang: Option<String>,
    schema: PhantomData<fn() -> R>,
}

impl<R: DeserializeOwned + Schema + 'static> JsonlDocs<R> {
    pub fn new(source: SharedNode, lang: Option<&str>) -> Self {
        Self {
            source,
            lang: lang.map(str::to_string),
            schema: PhantomData,
        }
    }

    /// Typed stream; each call resolves the source and starts from the top.
    pub fn stream(&self) -> Result<RecordStream<R>, IrdsError> {
        let path = self.source.resolve()?;
        RecordStream::open(&path, jsonl_parser())
    }
}

impl<R> DocsProvider for JsonlDocs<R>
where
    R: DeserializeOwned + Schema + Into<Doc> + 'static,
{
    fn docs_iter(&self) -> Result<DocIter, IrdsError> {
        Ok(Box::new(self.stream()?.map(|record| record.map(Into::into))))
    }

    fn docs_schema(&self) -> &'static str {
        R::NAME
    }

    fn docs_lang(&self) -> Option<&str> {
        self.lang.as_deref()
    }

    fn docs_resource(&self) -> &SharedNode {
        &self.source
    }
}

pub struct JsonlQueries<R> {
    source: SharedNode,
    lang: Option<String>,
    schema: PhantomData<fn() -> R>,
}

impl<R: DeserializeOwned + Schema + 'static> JsonlQueries<R> {
    pub fn new(source: SharedNode, lang: Option<&str>) -> Self {
        Self {
            source,
            lang: lang.map(str::to_string),
            schema: PhantomData,
        }
    }

    pub fn stream(&self) -> Result<RecordStream<R>, IrdsError> {
        let path = self.source.resolve()?;
        RecordStream::open(&path, jsonl_parser())
    }
}

impl<R> QueriesProvider for JsonlQueries<R>
where
    R: DeserializeOwned + Schema + Into<Query> + 'static,
{
    fn queries_iter(&self) -> Result<QueryIter, IrdsError> {
        Ok(Box::new(self.stream()?.map(|record| record.map(Into::into))))
    }

    fn queries_schema(&self) -> &'static str {
        R::NAME
    }

    fn queries_lang(&self) -> Option<&str> {
        self.lang.as_deref()
    }

    fn queries_resource(&self) -> &SharedNode {
        &self.source
    }
}

pub struct TrecQrels {
    source: SharedNode,
    defs: Arc<BTreeMap<i32, String>>,
}

impl TrecQrels {
    pub fn new<I, S>(source: SharedNode, defs: I) -> Self
    where
        I: IntoIterator<Item = (i32, S)>,
        S: Into<String>,
    {
        Self {
            source,
            defs: Arc::new(
                defs.into_iter()
                    .map(|(code, label)| (code, label.into()))
                    .collect(),
            ),
        }
    }

    pub fn stream(&self) -> Result<RecordStream<TrecQrel>, IrdsError> {
        let path = self.source.resolve()?;
        RecordStream::open(&path, trec_qrels_parser(Arc::clone(&self.defs)))
    }
}

impl QrelsProvider for TrecQrels {
    fn qrels_iter(&self) -> Result<QrelIter, IrdsError> {
        Ok(Box::new(self.stream()?))
    }

    fn qrels_defs(&self) -> &BTreeMap<i32, String> {
        &self.defs
    }

    fn qrels_resource(&self) -> &SharedNode {
        &self.source
    }
}
