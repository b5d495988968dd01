use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ExportResult, FetchResult, InfoResult, ListResult, ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_list(result: &ListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_info(result: &InfoResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_fetch(result: &FetchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Reports progress as log events on stderr.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::info!(
                elapsed_ms = elapsed.as_millis() as u64,
                "{}",
                event.message
            ),
            None => tracing::info!("{}", event.message),
        }
    }
}

pub struct HumanOutput;

impl HumanOutput {
    pub fn print_list(result: &ListResult) {
        for entry in &result.datasets {
            let provides = entry
                .provides
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            match &entry.pretty_name {
                Some(name) => println!("{:<24} {name} [{provides}]", entry.id),
                None => println!("{:<24} [{provides}]", entry.id),
            }
        }
    }

    pub fn print_info(result: &InfoResult) {
        println!("{}", result.id);
        if let Some(doc) = &result.documentation {
            if let Some(name) = &doc.pretty_name {
                println!("  {name}");
            }
            if let Some(desc) = &doc.desc {
                println!("  {desc}");
            }
        }
        if let Some(schema) = &result.docs_schema {
            println!("  docs:    {schema}");
        }
        if let Some(schema) = &result.queries_schema {
            println!("  queries: {schema}");
        }
        if let Some(defs) = &result.qrels_defs {
            let defs = defs
                .iter()
                .map(|(code, label)| format!("{code}={label}"))
                .collect::<Vec<_>>()
                .join(", ");
            println!("  qrels:   {defs}");
        }
        for resource in &result.resources {
            let state = if resource.materialized {
                "cached"
            } else {
                "not cached"
            };
            println!("  {} {} ({state})", resource.capability, resource.key);
        }
    }

    pub fn print_fetch(result: &FetchResult) {
        for item in &result.items {
            println!(
                "{} {} ({}) {}",
                item.dataset, item.capability, item.action, item.path
            );
        }
    }

    pub fn print_export(result: &ExportResult) {
        eprintln!(
            "{} {}: {} records",
            result.dataset, result.capability, result.records
        );
    }
}
