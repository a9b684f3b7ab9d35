use mongodb::bson::{doc, Bson, Document};
use tracing::info;

use crate::store::{BookStore, StoreResult};

fn is_text_index(keys: &Document) -> bool {
    keys.contains_key("_fts") || keys.values().any(|v| matches!(v, Bson::String(s) if s == "text"))
}

/// Single-field ascending index on `field`
fn is_ascending_on(keys: &Document, field: &str) -> bool {
    keys.len() == 1
        && match keys.get(field) {
            Some(Bson::Int32(1)) | Some(Bson::Int64(1)) => true,
            Some(Bson::Double(d)) => *d == 1.0,
            _ => false,
        }
}

/// Text index on `title` and ascending index on `authors`, each created
/// only when the collection does not already list one.
pub fn ensure_indexes<S: BookStore + ?Sized>(store: &S) -> StoreResult<Vec<Document>> {
    let existing = store.list_index_keys()?;
    let mut created = Vec::new();

    if !existing.iter().any(is_text_index) {
        created.push(doc! {"title": "text"});
    }
    if !existing.iter().any(|keys| is_ascending_on(keys, "authors")) {
        created.push(doc! {"authors": 1});
    }

    for keys in &created {
        store.create_index(keys.clone())?;
        info!(namespace = %store.namespace(), keys = %keys, "created index");
    }
    Ok(created)
}

/// Indexes for the first-author document shape
pub fn ensure_legacy_indexes<S: BookStore + ?Sized>(store: &S) -> StoreResult<Vec<Document>> {
    let wanted = vec![
        doc! {"published_date": 1},
        doc! {"country": 1},
        doc! {"author_last_name": 1, "author_first_name": 1},
    ];
    for keys in &wanted {
        store.create_index(keys.clone())?;
    }
    info!(namespace = %store.namespace(), count = wanted.len(), "ensured legacy indexes");
    Ok(wanted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_indexes_created_once() {
        let store = MemoryStore::default();
        assert_eq!(ensure_indexes(&store).unwrap().len(), 2);
        assert!(ensure_indexes(&store).unwrap().is_empty());
        assert_eq!(store.list_index_keys().unwrap().len(), 3);
    }

    #[test]
    fn test_server_style_text_index_is_recognized() {
        let store = MemoryStore::default();
        store
            .create_index(doc! {"_fts": "text", "_ftsx": 1})
            .unwrap();
        let created = ensure_indexes(&store).unwrap();
        assert_eq!(created, vec![doc! {"authors": 1}]);
    }

    #[test]
    fn test_legacy_indexes() {
        let store = MemoryStore::default();
        ensure_legacy_indexes(&store).unwrap();
        ensure_legacy_indexes(&store).unwrap();
        let keys = store.list_index_keys().unwrap();
        assert_eq!(keys.len(), 4);
        assert!(keys.contains(&doc! {"author_last_name": 1, "author_first_name": 1}));
    }
}
