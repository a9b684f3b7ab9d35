//! Canonical book documents and the logic that builds them
//!
//! - **authors**: author key → name index built from the authors dump
//! - **mapper**: work/sample record → document, or the reason it is ineligible
//! - **types**: the stored document shapes

pub mod authors;
pub mod mapper;
pub mod types;

pub use authors::{build_author_index, split_name, AuthorIndex, AuthorScan};
pub use mapper::{coerce_sample_book, map_work, map_work_legacy, Ineligible};
pub use types::{BookDocument, LegacyBook, SampleBook, WorkBook, UNKNOWN_COUNTRY};
