//! Lazy, deduplicated acquisition of IR benchmark datasets.
//!
//! Datasets are looked up by id in a [`registry::Registry`]; each exposes
//! docs, queries and qrels components backed by resource-node chains
//! (download, archive member, cache) that resolve on first use and stream
//! typed records from the materialized files.

pub mod app;
pub mod archive;
pub mod cache;
pub mod config;
pub mod dataset;
pub mod descriptor;
pub mod documentation;
pub mod error;
pub mod fetch;
pub mod fs_util;
pub mod lock;
pub mod output;
pub mod parser;
pub mod records;
pub mod registry;
pub mod resource;
pub mod store;
pub mod text;
pub mod trec_tot;
