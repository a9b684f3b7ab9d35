use chrono::NaiveDateTime;
use mongodb::bson::{doc, Document};

use crate::dates;

/// Placeholder for a country the source does not provide
pub const UNKNOWN_COUNTRY: &str = "Unknown";

/// `_source` tag written on legacy documents
pub const LEGACY_SOURCE: &str = "openlibrary_works";

/// A canonical book document that can be persisted
pub trait BookDocument {
    fn to_document(&self) -> Document;
}

/// Book built from the works dump, keeping every resolved author
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkBook {
    /// Work key from the dump, e.g. "/works/OL45804W"
    pub key: Option<String>,
    pub title: String,
    /// Resolved author display names, in reference order
    pub authors: Vec<String>,
    pub subjects: Vec<String>,
}

impl BookDocument for WorkBook {
    fn to_document(&self) -> Document {
        doc! {
            "key": self.key.clone(),
            "title": self.title.clone(),
            "authors": self.authors.clone(),
            "subjects": self.subjects.clone(),
        }
    }
}

/// Book from the simplified JSON sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBook {
    pub title: String,
    pub authors: Vec<String>,
    pub subjects: Vec<String>,
}

impl BookDocument for SampleBook {
    fn to_document(&self) -> Document {
        doc! {
            "title": self.title.clone(),
            "authors": self.authors.clone(),
            "subjects": self.subjects.clone(),
        }
    }
}

/// Legacy shape: first author only, split into first/last name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyBook {
    pub title: String,
    pub author_first_name: Option<String>,
    pub author_last_name: Option<String>,
    pub country: String,
    pub published_date: Option<NaiveDateTime>,
    pub out_of_print_date: Option<NaiveDateTime>,
    /// Written as `_source`
    pub source: String,
}

impl BookDocument for LegacyBook {
    fn to_document(&self) -> Document {
        doc! {
            "title": self.title.clone(),
            "author_first_name": self.author_first_name.clone(),
            "author_last_name": self.author_last_name.clone(),
            "country": self.country.clone(),
            "published_date": dates::to_bson(self.published_date),
            "out_of_print_date": dates::to_bson(self.out_of_print_date),
            "_source": self.source.clone(),
        }
    }
}
