mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use assert_matches::assert_matches;
use ir_datasets::dataset::{Capability, Dataset};
use ir_datasets::error::IrdsError;
use ir_datasets::records::{Doc, Query};
use ir_datasets::registry::Registry;

use common::{TrecTotFixture, trec_tot_client, utf8_tempdir};

#[test]
fn bootstrap_registers_trec_tot_family() {
    let (_temp, root) = utf8_tempdir();
    let fixture = TrecTotFixture::new(&root);
    let registry = Registry::bootstrap(&fixture.factory).unwrap();

    assert_eq!(
        registry.list_ids(),
        [
            "trec-tot",
            "trec-tot/2023",
            "trec-tot/2023/dev",
            "trec-tot/2023/train",
            "trec-tot/2024",
            "trec-tot/2024/test",
        ]
    );
    // Registration is lazy: nothing is downloaded yet.
    assert_eq!(fixture.client.calls("mem://2023"), 0);
    assert!(!fixture.store.namespace_dir("trec-tot").as_std_path().exists());
}

#[test]
fn duplicate_registration_is_rejected() {
    let (_temp, root) = utf8_tempdir();
    let fixture = TrecTotFixture::new(&root);
    let mut registry = Registry::bootstrap(&fixture.factory).unwrap();

    let err = registry
        .register("trec-tot/2023", Dataset::builder().build())
        .unwrap_err();
    assert_matches!(err, IrdsError::DuplicateId(id) if id == "trec-tot/2023");
    assert_matches!(registry.get("trec-tot/2025"), Err(IrdsError::UnknownId(_)));
}

#[test]
fn subsets_share_the_year_docs_handler() {
    let (_temp, root) = utf8_tempdir();
    let fixture = TrecTotFixture::new(&root);
    let registry = Registry::bootstrap(&fixture.factory).unwrap();

    let base = registry.get("trec-tot/2023").unwrap();
    let train = registry.get("trec-tot/2023/train").unwrap();
    let dev = registry.get("trec-tot/2023/dev").unwrap();
    assert!(Arc::ptr_eq(train.docs().unwrap(), dev.docs().unwrap()));
    assert!(Arc::ptr_eq(base.docs().unwrap(), train.docs().unwrap()));
    assert!(!Arc::ptr_eq(
        train.queries().unwrap(),
        dev.queries().unwrap()
    ));
}

#[test]
fn archive_is_downloaded_once_for_every_component() {
    let (_temp, root) = utf8_tempdir();
    let fixture = TrecTotFixture::new(&root);
    let registry = Registry::bootstrap(&fixture.factory).unwrap();

    for id in ["trec-tot/2023", "trec-tot/2023/train", "trec-tot/2023/dev"] {
        let dataset = registry.get(id).unwrap();
        let docs = dataset.docs_iter().unwrap().collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(docs.len(), 2);
        if dataset.has(Capability::Queries) {
            dataset.queries_iter().unwrap().collect::<Result<Vec<_>, _>>().unwrap();
            dataset.qrels_iter().unwrap().collect::<Result<Vec<_>, _>>().unwrap();
        }
    }
    assert_eq!(fixture.client.calls("mem://2023"), 1);

    let corpus = fixture.store.materialized_path("trec-tot", "2023/corpus.jsonl");
    assert!(corpus.as_std_path().is_file());
    // The extracted member was moved into place, not copied.
    let scratch = fixture.store.namespace_dir("trec-tot").join(".scratch");
    let leftovers = std::fs::read_dir(scratch.as_std_path())
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[test]
fn concurrent_registries_share_one_archive_download() {
    let (_temp, root) = utf8_tempdir();
    let client = Arc::new(trec_tot_client().with_delay(Duration::from_millis(500)));

    // Separate cache tables on one root behave like separate processes.
    let spawn = |capability: Capability| {
        let root = root.clone();
        let client = Arc::clone(&client);
        thread::spawn(move || {
            let fixture = TrecTotFixture::with_client(&root, client);
            let registry = Registry::bootstrap(&fixture.factory).unwrap();
            match capability {
                Capability::Docs => registry
                    .get("trec-tot/2023")
                    .unwrap()
                    .docs_iter()
                    .unwrap()
                    .count(),
                _ => registry
                    .get("trec-tot/2023/train")
                    .unwrap()
                    .queries_iter()
                    .unwrap()
                    .count(),
            }
        })
    };
    let docs = spawn(Capability::Docs);
    let queries = spawn(Capability::Queries);

    assert_eq!(docs.join().unwrap(), 2);
    assert_eq!(queries.join().unwrap(), 2);
    assert_eq!(client.calls("mem://2023"), 1);
}

#[test]
fn records_carry_their_year_schema() {
    let (_temp, root) = utf8_tempdir();
    let fixture = TrecTotFixture::new(&root);
    let registry = Registry::bootstrap(&fixture.factory).unwrap();

    let dev = registry.get("trec-tot/2023/dev").unwrap();
    let queries = dev.queries_iter().unwrap().collect::<Result<Vec<_>, _>>().unwrap();
    assert_matches!(&queries[0], Query::TipOfTheTongue(query) if query.query_id == "201");

    let qrels = dev.qrels_iter().unwrap().collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(qrels.len(), 2);
    assert_eq!(qrels[0].doc_id, "2");
    assert_eq!(qrels[1].relevance, 0);
    let defs = dev.qrels().unwrap().qrels_defs();
    assert_eq!(defs.get(&0).map(String::as_str), Some("Not Relevant"));
    assert_eq!(defs.get(&1).map(String::as_str), Some("Relevant"));

    let test = registry.get("trec-tot/2024/test").unwrap();
    let docs = test.docs_iter().unwrap().collect::<Result<Vec<_>, _>>().unwrap();
    assert_matches!(&docs[0], Doc::TipOfTheTongue2024(doc) if doc.title == "Eiffel Tower");
    let queries = test.queries_iter().unwrap().collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(queries[0].query_id(), "2001");
    assert_eq!(test.docs().unwrap().docs_schema(), "TipOfTheTongueDoc2024");
}

#[test]
fn absent_capabilities_are_errors() {
    let (_temp, root) = utf8_tempdir();
    let fixture = TrecTotFixture::new(&root);
    let registry = Registry::bootstrap(&fixture.factory).unwrap();

    let test = registry.get("trec-tot/2024/test").unwrap();
    assert!(!test.has(Capability::Qrels));
    assert_matches!(
        test.qrels_iter().err(),
        Some(IrdsError::Capability { capability, .. }) if capability == "qrels"
    );

    let base = registry.get("trec-tot").unwrap();
    assert_eq!(base.provides(), [Capability::Documentation]);
    assert!(base.docs().is_err());
    assert!(base.documentation().unwrap().pretty_name.is_some());
    assert!(base.resources().is_empty());
}

#[test]
fn split_queries_do_not_fetch_the_corpus_archive() {
    let (_temp, root) = utf8_tempdir();
    let fixture = TrecTotFixture::new(&root);
    let registry = Registry::bootstrap(&fixture.factory).unwrap();

    let test = registry.get("trec-tot/2024/test").unwrap();
    test.queries_iter().unwrap().count();
    let target = fixture
        .store
        .materialized_path("trec-tot", "2024/test-2024/queries.jsonl");
    assert!(target.as_std_path().is_file());
    assert_eq!(fixture.client.calls("mem://2024-test"), 1);
    assert_eq!(fixture.client.calls("mem://2024"), 0);
}
