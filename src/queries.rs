//! Cleanup and analytical queries over the legacy document shape
//!
//! All writes are single-document or filter deletes; nothing here relies on
//! a bulk-update operation.

use mongodb::bson::{doc, Bson, Document};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::books::UNKNOWN_COUNTRY;
use crate::dates;
use crate::store::{BookStore, FindSpec, StoreError, StoreResult};

/// Fields holding dates in the legacy shape
pub const DATE_FIELDS: &[&str] = &["published_date", "out_of_print_date"];

pub const DEFAULT_OLDEST_LIMIT: i64 = 10;

/// Delete documents whose `author_last_name` is empty, null or missing.
pub fn remove_empty_or_null_author_last_name<S: BookStore + ?Sized>(store: &S) -> StoreResult<u64> {
    let deleted = store.delete_many(doc! {
        "$or": [{"author_last_name": ""}, {"author_last_name": Bson::Null}]
    })?;
    info!(deleted, "removed documents without an author last name");
    Ok(deleted)
}

/// Non-empty first names, deduplicated ignoring case, sorted by lowercase form.
pub fn distinct_author_first_names<S: BookStore + ?Sized>(store: &S) -> StoreResult<Vec<String>> {
    let mut names: Vec<String> = store
        .distinct("author_first_name", Document::new())?
        .into_iter()
        .filter_map(|value| match value {
            Bson::String(name) if !name.is_empty() => Some(name),
            _ => None,
        })
        .collect();

    names.sort_by(|a, b| {
        a.to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| a.cmp(b))
    });
    names.dedup_by(|a, b| a.to_lowercase() == b.to_lowercase());
    Ok(names)
}

/// Rewrite string values of `fields` as true dates, one `update_one` per
/// document. Unparseable strings become null. Returns the number of
/// modified documents; a second run finds nothing left to convert.
pub fn convert_date_fields<S: BookStore + ?Sized>(store: &S, fields: &[&str]) -> StoreResult<u64> {
    let mut modified = 0;

    for field in fields {
        let pending = store
            .find(
                doc! {*field: {"$type": "string"}},
                FindSpec::new().projection(doc! {"_id": 1, *field: 1}),
            )?
            .collect::<StoreResult<Vec<Document>>>()?;

        let mut field_modified = 0;
        for found in pending {
            let id = found
                .get("_id")
                .cloned()
                .ok_or_else(|| StoreError::InvalidQuery("document without _id".to_string()))?;
            let converted = dates::to_bson(found.get(*field).and_then(dates::normalize_bson));
            field_modified += store.update_one(
                doc! {"_id": id},
                doc! {"$set": {*field: converted}},
            )?;
        }

        debug!(field = *field, modified = field_modified, "converted date field");
        modified += field_modified;
    }

    Ok(modified)
}

/// Documents with a true `published_date`, oldest first.
pub fn oldest_by_published_date<S: BookStore + ?Sized>(
    store: &S,
    limit: i64,
) -> StoreResult<Vec<Document>> {
    let spec = FindSpec::new()
        .projection(doc! {
            "_id": 0,
            "title": 1,
            "author_first_name": 1,
            "author_last_name": 1,
            "country": 1,
            "published_date": 1,
        })
        .sort(doc! {"published_date": 1})
        .limit(limit);

    store
        .find(doc! {"published_date": {"$type": "date"}}, spec)?
        .collect()
}

pub fn ten_oldest_books<S: BookStore + ?Sized>(store: &S) -> StoreResult<Vec<Document>> {
    oldest_by_published_date(store, DEFAULT_OLDEST_LIMIT)
}

/// Country label for a stored value; missing and null fold into "Unknown".
fn country_label(value: Option<&Bson>) -> String {
    match value {
        None | Some(Bson::Null) | Some(Bson::Undefined) => UNKNOWN_COUNTRY.to_string(),
        Some(Bson::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Tally countries in-process.
pub fn count_by_country_local<S: BookStore + ?Sized>(
    store: &S,
) -> StoreResult<BTreeMap<String, u64>> {
    let mut counts = BTreeMap::new();
    let docs = store.find(
        Document::new(),
        FindSpec::new().projection(doc! {"country": 1}),
    )?;
    for found in docs {
        let found = found?;
        *counts.entry(country_label(found.get("country"))).or_insert(0) += 1;
    }
    Ok(counts)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryCount {
    pub country: String,
    pub count: u64,
}

fn count_value(value: Option<&Bson>) -> u64 {
    match value {
        Some(Bson::Int32(n)) => u64::try_from(*n).unwrap_or(0),
        Some(Bson::Int64(n)) => u64::try_from(*n).unwrap_or(0),
        Some(Bson::Double(f)) if *f >= 0.0 => *f as u64,
        _ => 0,
    }
}

/// Tally countries with a store aggregation, count descending then country
/// ascending.
///
/// The store groups by raw value, so `"5"` and `5` arrive as separate rows;
/// rows sharing a label are merged to agree with [`count_by_country_local`].
pub fn count_by_country_pipeline<S: BookStore + ?Sized>(
    store: &S,
) -> StoreResult<Vec<CountryCount>> {
    let pipeline = vec![
        doc! {"$group": {"_id": {"$ifNull": ["$country", UNKNOWN_COUNTRY]}, "count": {"$sum": 1}}},
    ];

    let mut merged: BTreeMap<String, u64> = BTreeMap::new();
    for row in store.aggregate(pipeline)? {
        let row = row?;
        *merged.entry(country_label(row.get("_id"))).or_insert(0) += count_value(row.get("count"));
    }

    let mut rows: Vec<CountryCount> = merged
        .into_iter()
        .map(|(country, count)| CountryCount { country, count })
        .collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.country.cmp(&b.country)));
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;

    fn seed() -> Vec<Document> {
        vec![
            doc! {"title": "The Hobbit", "author_first_name": "J.R.R.", "author_last_name": "Tolkien", "country": "UK", "published_date": "1937-09-21", "out_of_print_date": Bson::Null},
            doc! {"title": "The Little Prince", "author_first_name": "Antoine", "author_last_name": "de Saint-Exupéry", "country": "France", "published_date": "1943-04-06", "out_of_print_date": Bson::Null},
            doc! {"title": "Things Fall Apart", "author_first_name": "Chinua", "author_last_name": "Achebe", "country": "Nigeria", "published_date": "1958-06-17", "out_of_print_date": Bson::Null},
            doc! {"title": "One Hundred Years of Solitude", "author_first_name": "Gabriel", "author_last_name": "García Márquez", "country": "Colombia", "published_date": "1967-05-30", "out_of_print_date": Bson::Null},
            doc! {"title": "The Trial", "author_first_name": "Franz", "author_last_name": "Kafka", "country": "Czechia", "published_date": "1925-04-26", "out_of_print_date": Bson::Null},
            doc! {"title": "Untitled Draft", "author_first_name": "Ada", "author_last_name": "", "country": "UK", "published_date": "1815-12-10", "out_of_print_date": "1852-11-27"},
            doc! {"title": "Placeholder", "author_first_name": "Test", "author_last_name": Bson::Null, "country": "Nowhere", "published_date": "2000-01-01", "out_of_print_date": Bson::Null},
        ]
    }

    fn store() -> MemoryStore {
        MemoryStore::with_documents(seed())
    }

    #[test]
    fn test_prune() {
        let store = store();
        assert_eq!(remove_empty_or_null_author_last_name(&store).unwrap(), 2);
        assert_eq!(
            store
                .count_documents(doc! {"author_last_name": {"$in": ["", Bson::Null]}})
                .unwrap(),
            0
        );
        assert_eq!(remove_empty_or_null_author_last_name(&store).unwrap(), 0);
    }

    #[test]
    fn test_distinct_first_names() {
        let store = store();
        remove_empty_or_null_author_last_name(&store).unwrap();
        store
            .insert_many_unordered(&[
                doc! {"author_first_name": "franz", "author_last_name": "K"},
                doc! {"author_first_name": "", "author_last_name": "X"},
            ])
            .unwrap();

        let names = distinct_author_first_names(&store).unwrap();
        assert_eq!(names, vec!["Antoine", "Chinua", "Franz", "Gabriel", "J.R.R."]);
        assert!(!names.contains(&"Ada".to_string()));
    }

    #[test]
    fn test_convert_is_idempotent() {
        let store = store();
        remove_empty_or_null_author_last_name(&store).unwrap();

        assert_eq!(convert_date_fields(&store, DATE_FIELDS).unwrap(), 5);
        assert_eq!(convert_date_fields(&store, DATE_FIELDS).unwrap(), 0);
        assert_eq!(
            store
                .count_documents(doc! {"published_date": {"$type": "date"}})
                .unwrap(),
            5
        );
    }

    #[test]
    fn test_unparseable_dates_become_null() {
        let store = MemoryStore::with_documents(vec![
            doc! {"title": "Odd", "published_date": "sometime"},
            doc! {"title": "Year", "published_date": "1925"},
        ]);
        assert_eq!(convert_date_fields(&store, &["published_date"]).unwrap(), 2);
        let odd = store.find_one(doc! {"title": "Odd"}, None).unwrap().unwrap();
        assert_eq!(odd.get("published_date"), Some(&Bson::Null));
    }

    #[test]
    fn test_oldest_after_prune_and_convert() {
        let store = store();
        remove_empty_or_null_author_last_name(&store).unwrap();
        convert_date_fields(&store, DATE_FIELDS).unwrap();

        let oldest = ten_oldest_books(&store).unwrap();
        let titles: Vec<&str> = oldest
            .iter()
            .map(|d| d.get_str("title").unwrap())
            .collect();
        assert_eq!(
            titles,
            vec![
                "The Trial",
                "The Hobbit",
                "The Little Prince",
                "Things Fall Apart",
                "One Hundred Years of Solitude"
            ]
        );
        assert!(!oldest[0].contains_key("_id"));
        assert!(!oldest[0].contains_key("out_of_print_date"));

        let first = oldest[0].get_datetime("published_date").unwrap();
        assert_eq!(
            dates::from_bson_datetime(*first).map(|d| d.date()),
            NaiveDate::from_ymd_opt(1925, 4, 26)
        );
    }

    #[test]
    fn test_oldest_without_prune_and_string_dates_excluded() {
        let store = store();
        assert!(oldest_by_published_date(&store, 3).unwrap().is_empty());

        convert_date_fields(&store, DATE_FIELDS).unwrap();
        let oldest = oldest_by_published_date(&store, 3).unwrap();
        let titles: Vec<&str> = oldest
            .iter()
            .map(|d| d.get_str("title").unwrap())
            .collect();
        assert_eq!(titles, vec!["Untitled Draft", "The Trial", "The Hobbit"]);
    }

    #[test]
    fn test_country_counts_agree() {
        let store = store();
        remove_empty_or_null_author_last_name(&store).unwrap();
        store
            .insert_many_unordered(&[
                doc! {"title": "No country"},
                doc! {"title": "Null country", "country": Bson::Null},
                doc! {"title": "Blank country", "country": ""},
            ])
            .unwrap();

        let local = count_by_country_local(&store).unwrap();
        let pipeline = count_by_country_pipeline(&store).unwrap();

        assert_eq!(local.get("Unknown"), Some(&2));
        assert_eq!(local.get(""), Some(&1));
        assert_eq!(pipeline[0], CountryCount { country: "Unknown".to_string(), count: 2 });

        let from_pipeline: BTreeMap<String, u64> = pipeline
            .into_iter()
            .map(|row| (row.country, row.count))
            .collect();
        assert_eq!(local, from_pipeline);
    }

    #[test]
    fn test_country_counts_merge_mixed_types() {
        let store = MemoryStore::with_documents(vec![
            doc! {"title": "A", "country": "5"},
            doc! {"title": "B", "country": 5},
            doc! {"title": "C", "country": "UK"},
        ]);

        let local = count_by_country_local(&store).unwrap();
        let pipeline = count_by_country_pipeline(&store).unwrap();

        assert_eq!(local.get("5"), Some(&2));
        assert_eq!(
            pipeline,
            vec![
                CountryCount { country: "5".to_string(), count: 2 },
                CountryCount { country: "UK".to_string(), count: 1 },
            ]
        );
    }
}
