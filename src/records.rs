//! Record schemas, one struct per dataset format version.
//!
//! Field names and order are part of the public output contract. The 2023
//! and 2024 TREC Tip-of-the-Tongue corpora have different document shapes
//! and are kept as distinct types; [`Doc`] and [`Query`] tag them rather
//! than merging them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipOfTheTongueDoc {
    pub doc_id: String,
    pub page_title: String,
    pub wikidata_id: String,
    pub wikidata_classes: Vec<Value>,
    pub text: String,
    pub sections: BTreeMap<String, String>,
    /// Free-form infobox objects, kept as they appear in the corpus.
    pub infoboxes: Vec<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipOfTheTongueDoc2024 {
    pub doc_id: String,
    pub title: String,
    pub wikidata_id: String,
    pub text: String,
    pub sections: BTreeMap<String, String>,
}

/// 2023 query; the source files carry the query id under `id`. Annotation
/// objects are free-form and their values are not restricted to strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipOfTheTongueQuery {
    #[serde(rename(deserialize = "id"))]
    pub query_id: String,
    pub url: String,
    pub domain: String,
    pub title: String,
    pub text: String,
    pub sentence_annotations: Vec<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipOfTheTongueQuery2024 {
    pub query_id: String,
    pub query: String,
}

/// One line of a TREC qrels file: `query_id iteration doc_id relevance`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrecQrel {
    pub query_id: String,
    pub doc_id: String,
    pub relevance: i32,
    pub iteration: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Doc {
    TipOfTheTongue(TipOfTheTongueDoc),
    TipOfTheTongue2024(TipOfTheTongueDoc2024),
}

impl Doc {
    pub fn doc_id(&self) -> &str {
        match self {
            Doc::TipOfTheTongue(doc) => &doc.doc_id,
            Doc::TipOfTheTongue2024(doc) => &doc.doc_id,
        }
    }
}

impl From<TipOfTheTongueDoc> for Doc {
    fn from(value: TipOfTheTongueDoc) -> Self {
        Doc::TipOfTheTongue(value)
    }
}

impl From<TipOfTheTongueDoc2024> for Doc {
    fn from(value: TipOfTheTongueDoc2024) -> Self {
        Doc::TipOfTheTongue2024(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Query {
    TipOfTheTongue(TipOfTheTongueQuery),
    TipOfTheTongue2024(TipOfTheTongueQuery2024),
}

impl Query {
    pub fn query_id(&self) -> &str {
        match self {
            Query::TipOfTheTongue(query) => &query.query_id,
            Query::TipOfTheTongue2024(query) => &query.query_id,
        }
    }
}

impl From<TipOfTheTongueQuery> for Query {
    fn from(value: TipOfTheTongueQuery) -> Self {
        Query::TipOfTheTongue(value)
    }
}

impl From<TipOfTheTongueQuery2024> for Query {
    fn from(value: TipOfTheTongueQuery2024) -> Self {
        Query::TipOfTheTongue2024(value)
    }
}

/// Schema identity reported by handlers and the CLI.
pub trait Schema {
    const NAME: &'static str;
}

impl Schema for TipOfTheTongueDoc {
    const NAME: &'static str = "TipOfTheTongueDoc";
}

impl Schema for TipOfTheTongueDoc2024 {
    const NAME: &'static str = "TipOfTheTongueDoc2024";
}

impl Schema for TipOfTheTongueQuery {
    const NAME: &'static str = "TipOfTheTongueQuery";
}

impl Schema for TipOfTheTongueQuery2024 {
    const NAME: &'static str = "TipOfTheTongueQuery2024";
}

impl Schema for TrecQrel {
    const NAME: &'static str = "TrecQrel";
}
