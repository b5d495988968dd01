//! Single-blob text projections of records, kept apart from parsing.

use crate::records::{
    Doc, Query, TipOfTheTongueDoc, TipOfTheTongueDoc2024, TipOfTheTongueQuery,
    TipOfTheTongueQuery2024,
};

pub trait DefaultText {
    fn default_text(&self) -> String;
}

pub fn default_text<R: DefaultText + ?Sized>(record: &R) -> String {
    record.default_text()
}

impl DefaultText for TipOfTheTongueDoc {
    fn default_text(&self) -> String {
        format!("{} {}", self.page_title, self.text)
    }
}

impl DefaultText for TipOfTheTongueDoc2024 {
    fn default_text(&self) -> String {
        format!("{} {}", self.title, self.text)
    }
}

impl DefaultText for TipOfTheTongueQuery {
    fn default_text(&self) -> String {
        format!("{} {}", self.title, self.text)
    }
}

impl DefaultText for TipOfTheTongueQuery2024 {
    fn default_text(&self) -> String {
        self.query.clone()
    }
}

impl DefaultText for Doc {
    fn default_text(&self) -> String {
        match self {
            Doc::TipOfTheTongue(doc) => doc.default_text(),
            Doc::TipOfTheTongue2024(doc) => doc.default_text(),
        }
    }
}

impl DefaultText for Query {
    fn default_text(&self) -> String {
        match self {
            Query::TipOfTheTongue(query) => query.default_text(),
            Query::TipOfTheTongue2024(query) => query.default_text(),
        }
    }
}
