//! TREC Tip-of-the-Tongue dataset family.
//!
//! | id                     | docs     | queries | qrels |
//! |------------------------|----------|---------|-------|
//! | `trec-tot`             |          |         |       |
//! | `trec-tot/2023`        | 2023     |         |       |
//! | `trec-tot/2023/train`  | 2023     | train   | train |
//! | `trec-tot/2023/dev`    | 2023     | dev     | dev   |
//! | `trec-tot/2024`        | 2024     |         |       |
//! | `trec-tot/2024/test`   | 2024     | test    |       |
//!
//! Every subset of a year reuses that year's docs handler, so the corpus is
//! extracted once no matter how many subsets read it.

use std::sync::Arc;

use crate::dataset::{Dataset, DocsProvider};
use crate::documentation::DocumentationCatalog;
use crate::error::IrdsError;
use crate::parser::{JsonlDocs, JsonlQueries, TrecQrels};
use crate::records::{
    TipOfTheTongueDoc, TipOfTheTongueDoc2024, TipOfTheTongueQuery, TipOfTheTongueQuery2024,
};
use crate::registry::{Registry, ResourceFactory};

pub const NAME: &str = "trec-tot";

const DOCUMENTATION: &str = include_str!("../docs/trec-tot.json");

pub const QREL_DEFS: [(i32, &str); 2] = [(0, "Not Relevant"), (1, "Relevant")];

pub fn register(registry: &mut Registry, factory: &ResourceFactory) -> Result<(), IrdsError> {
    let documentation = DocumentationCatalog::from_json(DOCUMENTATION)?;
    let subset_id = |subset: &str| format!("{NAME}/{subset}");

    registry.register(
        NAME,
        Dataset::builder()
            .documentation(documentation.entry("_"))
            .build(),
    )?;

    let archive_2023 = factory.download(NAME, "2023");
    let docs_2023: Arc<dyn DocsProvider> = Arc::new(JsonlDocs::<TipOfTheTongueDoc>::new(
        factory.cached(
            factory.zip_member(&archive_2023, "TREC-TOT/corpus.jsonl"),
            NAME,
            "2023/corpus.jsonl",
        ),
        Some("en"),
    ));
    registry.register(
        &subset_id("2023"),
        Dataset::builder()
            .docs(Arc::clone(&docs_2023))
            .documentation(documentation.entry("2023"))
            .build(),
    )?;

    for split in ["train", "dev"] {
        let queries = JsonlQueries::<TipOfTheTongueQuery>::new(
            factory.cached(
                factory.zip_member(&archive_2023, &format!("TREC-TOT/{split}/queries.jsonl")),
                NAME,
                &format!("2023/{split}/queries.jsonl"),
            ),
            Some("en"),
        );
        let qrels = TrecQrels::new(
            factory.cached(
                factory.zip_member(&archive_2023, &format!("TREC-TOT/{split}/qrel.txt")),
                NAME,
                &format!("2023/{split}/qrel.txt"),
            ),
            QREL_DEFS,
        );
        let subset = format!("2023/{split}");
        registry.register(
            &subset_id(&subset),
            Dataset::builder()
                .docs(Arc::clone(&docs_2023))
                .queries(Arc::new(queries))
                .qrels(Arc::new(qrels))
                .documentation(documentation.entry(&subset))
                .build(),
        )?;
    }

    let archive_2024 = factory.download(NAME, "2024");
    let docs_2024: Arc<dyn DocsProvider> = Arc::new(JsonlDocs::<TipOfTheTongueDoc2024>::new(
        factory.cached(
            factory.zip_member(&archive_2024, "corpus.jsonl"),
            NAME,
            "2024/corpus.jsonl",
        ),
        Some("en"),
    ));
    registry.register(
        &subset_id("2024"),
        Dataset::builder()
            .docs(Arc::clone(&docs_2024))
            .documentation(documentation.entry("2024"))
            .build(),
    )?;

    for split in ["test"] {
        let archive = factory.download(NAME, &format!("2024-{split}"));
        let queries = JsonlQueries::<TipOfTheTongueQuery2024>::new(
            factory.cached(
                factory.zip_member(&archive, &format!("{split}-2024/queries.jsonl")),
                NAME,
                &format!("2024/{split}-2024/queries.jsonl"),
            ),
            Some("en"),
        );
        let subset = format!("2024/{split}");
        registry.register(
            &subset_id(&subset),
            Dataset::builder()
                .docs(Arc::clone(&docs_2024))
                .queries(Arc::new(queries))
                .documentation(documentation.entry(&subset))
                .build(),
        )?;
    }

    Ok(())
}
