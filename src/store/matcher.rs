//! Evaluation of MongoDB query documents against in-memory documents
//!
//! Covers what the ingester and query helpers issue: equality (with `null`
//! matching missing fields), `$or`/`$and`, `$eq`, `$ne`, `$in`, `$nin`,
//! `$exists`, `$type`, range comparisons, dotted paths, projections,
//! sorts and `$set`/`$unset` updates.

use mongodb::bson::{Bson, Document};
use std::cmp::Ordering;

use super::{StoreError, StoreResult};

const MISSING: &Bson = &Bson::Null;

/// Resolve a dotted field path.
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Truthiness as used by projection flags and `$exists`
pub fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(f) => *f != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Double(f) => Some(*f),
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        _ => None,
    }
}

/// Position in MongoDB's cross-type sort order
fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Double(_) | Bson::Int32(_) | Bson::Int64(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 13,
        _ => 12,
    }
}

/// Total order over BSON values, numbers compared across types
pub fn compare_values(a: &Bson, b: &Bson) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::Array(x), Bson::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(l, r)| compare_values(l, r))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Bson::Document(x), Bson::Document(y)) => x
            .iter()
            .zip(y.iter())
            .map(|((lk, lv), (rk, rv))| lk.cmp(rk).then_with(|| compare_values(lv, rv)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => match (as_f64(a), as_f64(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
    }
}

pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Equality as a query sees it: `null` matches missing, scalars match
/// array elements.
fn query_equals(value: Option<&Bson>, target: &Bson) -> bool {
    match (value, target) {
        (None, Bson::Null) | (Some(Bson::Null), Bson::Null) => true,
        (None, _) => false,
        (Some(Bson::Array(items)), t) if !matches!(t, Bson::Array(_)) => {
            items.iter().any(|item| values_equal(item, t))
        }
        (Some(v), t) => values_equal(v, t),
    }
}

/// A sub-document made only of `$` operators
fn operator_doc(condition: &Bson) -> Option<&Document> {
    match condition {
        Bson::Document(d) if !d.is_empty() && d.keys().all(|k| k.starts_with('$')) => Some(d),
        _ => None,
    }
}

fn sub_filters<'a>(op: &str, value: &'a Bson) -> StoreResult<Vec<&'a Document>> {
    let items = match value {
        Bson::Array(items) => items,
        _ => return Err(StoreError::InvalidQuery(format!("{} expects an array", op))),
    };
    items
        .iter()
        .map(|item| match item {
            Bson::Document(d) => Ok(d),
            _ => Err(StoreError::InvalidQuery(format!("{} expects documents", op))),
        })
        .collect()
}

/// Does `doc` satisfy `filter`?
pub fn matches(doc: &Document, filter: &Document) -> StoreResult<bool> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$or" => {
                let mut any = false;
                for sub in sub_filters("$or", condition)? {
                    if matches(doc, sub)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$and" => {
                let mut all = true;
                for sub in sub_filters("$and", condition)? {
                    if !matches(doc, sub)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            op if op.starts_with('$') => {
                return Err(StoreError::Unsupported(format!("top-level operator {}", op)));
            }
            field => field_matches(lookup(doc, field), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> StoreResult<bool> {
    match operator_doc(condition) {
        Some(ops) => {
            for (op, arg) in ops {
                if !apply_operator(value, op, arg)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        None => Ok(query_equals(value, condition)),
    }
}

fn array_arg<'a>(op: &str, arg: &'a Bson) -> StoreResult<&'a Vec<Bson>> {
    match arg {
        Bson::Array(items) => Ok(items),
        _ => Err(StoreError::InvalidQuery(format!("{} expects an array", op))),
    }
}

fn apply_operator(value: Option<&Bson>, op: &str, arg: &Bson) -> StoreResult<bool> {
    match op {
        "$eq" => Ok(query_equals(value, arg)),
        "$ne" => Ok(!query_equals(value, arg)),
        "$in" => Ok(array_arg(op, arg)?.iter().any(|t| query_equals(value, t))),
        "$nin" => Ok(!array_arg(op, arg)?.iter().any(|t| query_equals(value, t))),
        "$exists" => Ok(value.is_some() == truthy(arg)),
        "$type" => type_matches(value, arg),
        "$gt" | "$gte" | "$lt" | "$lte" => {
            let Some(value) = value else {
                return Ok(false);
            };
            if type_rank(value) != type_rank(arg) {
                return Ok(false);
            }
            let ord = compare_values(value, arg);
            Ok(match op {
                "$gt" => ord == Ordering::Greater,
                "$gte" => ord != Ordering::Less,
                "$lt" => ord == Ordering::Less,
                _ => ord != Ordering::Greater,
            })
        }
        other => Err(StoreError::Unsupported(format!("query operator {}", other))),
    }
}

fn type_matches(value: Option<&Bson>, arg: &Bson) -> StoreResult<bool> {
    let Some(value) = value else {
        return Ok(false);
    };
    match arg {
        Bson::String(name) => type_name_matches(value, name),
        Bson::Array(names) => {
            for name in names {
                let Bson::String(name) = name else {
                    return Err(StoreError::InvalidQuery("$type expects names".to_string()));
                };
                if type_name_matches(value, name)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Err(StoreError::Unsupported("numeric $type codes".to_string())),
    }
}

fn type_name_matches(value: &Bson, name: &str) -> StoreResult<bool> {
    Ok(match name {
        "double" => matches!(value, Bson::Double(_)),
        "string" => matches!(value, Bson::String(_)),
        "object" => matches!(value, Bson::Document(_)),
        "array" => matches!(value, Bson::Array(_)),
        "objectId" => matches!(value, Bson::ObjectId(_)),
        "bool" => matches!(value, Bson::Boolean(_)),
        "date" => matches!(value, Bson::DateTime(_)),
        "null" => matches!(value, Bson::Null),
        "int" => matches!(value, Bson::Int32(_)),
        "long" => matches!(value, Bson::Int64(_)),
        "decimal" => matches!(value, Bson::Decimal128(_)),
        "number" => matches!(
            value,
            Bson::Double(_) | Bson::Int32(_) | Bson::Int64(_) | Bson::Decimal128(_)
        ),
        other => return Err(StoreError::Unsupported(format!("$type alias {}", other))),
    })
}

/// Apply an inclusion or exclusion projection to a top-level document.
pub fn project(doc: &Document, projection: &Document) -> StoreResult<Document> {
    let include_id = projection.get("_id").map_or(true, truthy);
    let fields: Vec<(&str, bool)> = projection
        .iter()
        .filter(|(k, _)| k.as_str() != "_id")
        .map(|(k, v)| (k.as_str(), truthy(v)))
        .collect();

    if let Some((field, _)) = fields.iter().find(|(f, _)| f.contains('.')) {
        return Err(StoreError::Unsupported(format!("dotted projection {}", field)));
    }

    let inclusive = fields.iter().any(|(_, include)| *include);
    if inclusive && fields.iter().any(|(_, include)| !*include) {
        return Err(StoreError::InvalidQuery(
            "projection mixes inclusion and exclusion".to_string(),
        ));
    }

    let mut out = Document::new();
    for (key, value) in doc {
        let keep = if key == "_id" {
            include_id
        } else {
            let listed = fields.iter().any(|(f, _)| f == key);
            if inclusive {
                listed
            } else {
                !listed
            }
        };
        if keep {
            out.insert(key.clone(), value.clone());
        }
    }
    Ok(out)
}

fn sort_direction(value: &Bson) -> StoreResult<Ordering> {
    match as_f64(value) {
        Some(d) if d > 0.0 => Ok(Ordering::Less),
        Some(d) if d < 0.0 => Ok(Ordering::Greater),
        _ => Err(StoreError::InvalidQuery(format!("bad sort direction {}", value))),
    }
}

/// Stable multi-key sort; ties keep their current order.
pub fn sort_documents(docs: &mut [Document], sort: &Document) -> StoreResult<()> {
    let keys = sort
        .iter()
        .map(|(field, dir)| Ok((field.as_str(), sort_direction(dir)? == Ordering::Less)))
        .collect::<StoreResult<Vec<(&str, bool)>>>()?;

    docs.sort_by(|a, b| {
        for (field, ascending) in &keys {
            let left = lookup(a, field).unwrap_or(MISSING);
            let right = lookup(b, field).unwrap_or(MISSING);
            let ord = compare_values(left, right);
            let ord = if *ascending { ord } else { ord.reverse() };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    Ok(())
}

/// Apply `$set` / `$unset` to top-level fields. Returns whether anything changed.
pub fn apply_update(doc: &mut Document, update: &Document) -> StoreResult<bool> {
    let mut changed = false;
    for (op, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(StoreError::InvalidQuery(format!("{} expects a document", op)));
        };
        for (field, value) in fields {
            if field.contains('.') {
                return Err(StoreError::Unsupported(format!("dotted update path {}", field)));
            }
            match op.as_str() {
                "$set" => {
                    if doc.get(field) != Some(value) {
                        doc.insert(field.clone(), value.clone());
                        changed = true;
                    }
                }
                "$unset" => {
                    changed |= doc.remove(field).is_some();
                }
                other => {
                    return Err(StoreError::Unsupported(format!("update operator {}", other)));
                }
            }
        }
    }
    Ok(changed)
}
