//! In-process collection
//!
//! Holds documents in insertion order and evaluates filters, projections,
//! sorts and a small aggregation subset (`$match`, `$group` with `$sum`,
//! `$sort`, `$limit`, `$project`) through [`super::matcher`]. Backs the
//! unit and integration tests, and the crate-level example.

use mongodb::bson::{oid::ObjectId, Bson, Document};
use std::cell::RefCell;

use super::matcher::{self, lookup, values_equal};
use super::{BookStore, DocumentIter, FindSpec, InsertOutcome, StoreError, StoreResult};

#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    docs: RefCell<Vec<Document>>,
    indexes: RefCell<Vec<Document>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new("memory.books")
    }
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            docs: RefCell::new(Vec::new()),
            indexes: RefCell::new(vec![id_index()]),
        }
    }

    /// A store pre-loaded with `docs`, assigning `_id` where absent.
    pub fn with_documents(docs: impl IntoIterator<Item = Document>) -> Self {
        let store = Self::default();
        {
            let mut stored = store.docs.borrow_mut();
            for mut doc in docs {
                ensure_id(&mut doc);
                stored.push(doc);
            }
        }
        store
    }

    /// Snapshot of the stored documents in insertion order
    pub fn documents(&self) -> Vec<Document> {
        self.docs.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.docs.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.borrow().is_empty()
    }

    fn filtered(&self, filter: &Document) -> StoreResult<Vec<Document>> {
        let docs = self.docs.borrow();
        let mut out = Vec::new();
        for doc in docs.iter() {
            if matcher::matches(doc, filter)? {
                out.push(doc.clone());
            }
        }
        Ok(out)
    }
}

fn id_index() -> Document {
    let mut keys = Document::new();
    keys.insert("_id", 1);
    keys
}

fn ensure_id(doc: &mut Document) {
    if !doc.contains_key("_id") {
        doc.insert("_id", ObjectId::new());
    }
}

fn into_iter(docs: Vec<Document>) -> DocumentIter<'static> {
    Box::new(docs.into_iter().map(Ok))
}

fn apply_limit(docs: &mut Vec<Document>, limit: i64) {
    // Negative limits mean "single batch of |n|" on a server.
    let limit = limit.unsigned_abs() as usize;
    if limit > 0 {
        docs.truncate(limit);
    }
}

impl BookStore for MemoryStore {
    fn namespace(&self) -> String {
        self.name.clone()
    }

    fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    fn insert_many_unordered(&self, docs: &[Document]) -> StoreResult<InsertOutcome> {
        let mut stored = self.docs.borrow_mut();
        let mut outcome = InsertOutcome {
            attempted: docs.len(),
            inserted: 0,
        };

        for doc in docs {
            let mut doc = doc.clone();
            ensure_id(&mut doc);
            let id = doc.get("_id");
            let duplicate = stored
                .iter()
                .any(|existing| match (existing.get("_id"), id) {
                    (Some(a), Some(b)) => values_equal(a, b),
                    _ => false,
                });
            if duplicate {
                continue;
            }
            stored.push(doc);
            outcome.inserted += 1;
        }

        Ok(outcome)
    }

    fn delete_many(&self, filter: Document) -> StoreResult<u64> {
        let mut stored = self.docs.borrow_mut();
        let doomed = stored
            .iter()
            .map(|doc| matcher::matches(doc, &filter))
            .collect::<StoreResult<Vec<bool>>>()?;

        let mut flags = doomed.iter();
        stored.retain(|_| !flags.next().copied().unwrap_or(false));
        Ok(doomed.iter().filter(|d| **d).count() as u64)
    }

    fn distinct(&self, field: &str, filter: Document) -> StoreResult<Vec<Bson>> {
        let mut values: Vec<Bson> = Vec::new();
        for doc in self.filtered(&filter)? {
            let candidates = match lookup(&doc, field) {
                Some(Bson::Array(items)) => items.clone(),
                Some(value) => vec![value.clone()],
                None => continue,
            };
            for value in candidates {
                if !values.iter().any(|seen| values_equal(seen, &value)) {
                    values.push(value);
                }
            }
        }
        Ok(values)
    }

    fn find(&self, filter: Document, spec: FindSpec) -> StoreResult<DocumentIter<'_>> {
        let mut docs = self.filtered(&filter)?;
        if let Some(sort) = &spec.sort {
            matcher::sort_documents(&mut docs, sort)?;
        }
        if let Some(limit) = spec.limit {
            apply_limit(&mut docs, limit);
        }
        if let Some(projection) = &spec.projection {
            docs = docs
                .iter()
                .map(|doc| matcher::project(doc, projection))
                .collect::<StoreResult<_>>()?;
        }
        Ok(into_iter(docs))
    }

    fn update_one(&self, filter: Document, update: Document) -> StoreResult<u64> {
        let mut stored = self.docs.borrow_mut();
        for doc in stored.iter_mut() {
            if matcher::matches(doc, &filter)? {
                let changed = matcher::apply_update(doc, &update)?;
                return Ok(u64::from(changed));
            }
        }
        Ok(0)
    }

    fn aggregate(&self, pipeline: Vec<Document>) -> StoreResult<DocumentIter<'_>> {
        let docs = self.docs.borrow().clone();
        Ok(into_iter(run_pipeline(docs, &pipeline)?))
    }

    fn create_index(&self, keys: Document) -> StoreResult<()> {
        let mut indexes = self.indexes.borrow_mut();
        if !indexes.contains(&keys) {
            indexes.push(keys);
        }
        Ok(())
    }

    fn list_index_keys(&self) -> StoreResult<Vec<Document>> {
        Ok(self.indexes.borrow().clone())
    }

    fn count_documents(&self, filter: Document) -> StoreResult<u64> {
        Ok(self.filtered(&filter)?.len() as u64)
    }

    fn drop_collection(&self) -> StoreResult<()> {
        self.docs.borrow_mut().clear();
        *self.indexes.borrow_mut() = vec![id_index()];
        Ok(())
    }
}

/// Evaluate an aggregation pipeline over `docs`.
pub fn run_pipeline(docs: Vec<Document>, pipeline: &[Document]) -> StoreResult<Vec<Document>> {
    let mut current = docs;
    for stage in pipeline {
        let mut entries = stage.iter();
        let (name, spec) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(StoreError::InvalidQuery(
                    "pipeline stage must have exactly one operator".to_string(),
                ))
            }
        };

        current = match (name.as_str(), spec) {
            ("$match", Bson::Document(filter)) => {
                let mut kept = Vec::new();
                for doc in current {
                    if matcher::matches(&doc, filter)? {
                        kept.push(doc);
                    }
                }
                kept
            }
            ("$group", Bson::Document(spec)) => group(&current, spec)?,
            ("$sort", Bson::Document(sort)) => {
                matcher::sort_documents(&mut current, sort)?;
                current
            }
            ("$limit", limit) => {
                let n = match limit {
                    Bson::Int32(n) => i64::from(*n),
                    Bson::Int64(n) => *n,
                    _ => return Err(StoreError::InvalidQuery("$limit expects an integer".to_string())),
                };
                apply_limit(&mut current, n);
                current
            }
            ("$project", Bson::Document(projection)) => current
                .iter()
                .map(|doc| matcher::project(doc, projection))
                .collect::<StoreResult<_>>()?,
            (other, _) => {
                return Err(StoreError::Unsupported(format!("pipeline stage {}", other)));
            }
        };
    }
    Ok(current)
}

/// Evaluate an aggregation expression: `"$path"`, `{"$ifNull": [expr, alt]}`,
/// an object of expressions, or a literal.
fn eval_expr(doc: &Document, expr: &Bson) -> StoreResult<Bson> {
    match expr {
        Bson::String(path) if path.starts_with('$') => {
            Ok(lookup(doc, &path[1..]).cloned().unwrap_or(Bson::Null))
        }
        Bson::Document(spec) => {
            let mut entries = spec.iter();
            match (entries.next(), entries.next()) {
                (Some((op, args)), None) if op.starts_with('$') => match op.as_str() {
                    "$ifNull" => {
                        let args = match args {
                            Bson::Array(args) if args.len() == 2 => args,
                            _ => {
                                return Err(StoreError::InvalidQuery(
                                    "$ifNull expects two arguments".to_string(),
                                ))
                            }
                        };
                        match eval_expr(doc, &args[0])? {
                            Bson::Null | Bson::Undefined => eval_expr(doc, &args[1]),
                            value => Ok(value),
                        }
                    }
                    other => Err(StoreError::Unsupported(format!("expression {}", other))),
                },
                _ => {
                    let mut out = Document::new();
                    for (key, value) in spec {
                        out.insert(key.clone(), eval_expr(doc, value)?);
                    }
                    Ok(Bson::Document(out))
                }
            }
        }
        literal => Ok(literal.clone()),
    }
}

/// Running `$sum`; integers stay integers until a double arrives.
#[derive(Debug, Clone, Copy)]
enum Sum {
    Int(i64),
    Float(f64),
}

impl Sum {
    fn add(self, value: &Bson) -> Self {
        let int = match value {
            Bson::Int32(n) => Some(i64::from(*n)),
            Bson::Int64(n) => Some(*n),
            _ => None,
        };
        match (self, int, value) {
            (Sum::Int(total), Some(n), _) => Sum::Int(total.saturating_add(n)),
            (Sum::Float(total), Some(n), _) => Sum::Float(total + n as f64),
            (Sum::Int(total), None, Bson::Double(f)) => Sum::Float(total as f64 + f),
            (Sum::Float(total), None, Bson::Double(f)) => Sum::Float(total + f),
            // Non-numeric values are ignored
            (sum, None, _) => sum,
        }
    }

    fn into_bson(self) -> Bson {
        match self {
            Sum::Int(n) => match i32::try_from(n) {
                Ok(small) => Bson::Int32(small),
                Err(_) => Bson::Int64(n),
            },
            Sum::Float(f) => Bson::Double(f),
        }
    }
}

fn group(docs: &[Document], spec: &Document) -> StoreResult<Vec<Document>> {
    let id_expr = spec
        .get("_id")
        .ok_or_else(|| StoreError::InvalidQuery("$group requires _id".to_string()))?;

    let mut accumulators = Vec::new();
    for (field, acc) in spec.iter().filter(|(k, _)| k.as_str() != "_id") {
        let summed = match acc {
            Bson::Document(acc) if acc.len() == 1 => acc.get("$sum"),
            _ => None,
        };
        match summed {
            Some(expr) => accumulators.push((field.as_str(), expr)),
            None => {
                return Err(StoreError::Unsupported(format!(
                    "accumulator for {} (only $sum is available)",
                    field
                )))
            }
        }
    }

    // First-seen order
    let mut groups: Vec<(Bson, Vec<Sum>)> = Vec::new();
    for doc in docs {
        let key = eval_expr(doc, id_expr)?;
        let slot = match groups.iter().position(|(k, _)| values_equal(k, &key)) {
            Some(slot) => slot,
            None => {
                groups.push((key, vec![Sum::Int(0); accumulators.len()]));
                groups.len() - 1
            }
        };
        for (i, (_, expr)) in accumulators.iter().enumerate() {
            let value = eval_expr(doc, expr)?;
            let sums = &mut groups[slot].1;
            sums[i] = sums[i].add(&value);
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, sums)| {
            let mut out = Document::new();
            out.insert("_id", key);
            for ((field, _), sum) in accumulators.iter().zip(sums) {
                out.insert(*field, sum.into_bson());
            }
            out
        })
        .collect())
}
