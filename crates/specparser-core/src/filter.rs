//! Projecting a document onto a selection of operations.

use std::collections::HashSet;

use serde_json::Value as JsonValue;

use crate::error::{Error, Stage};
use crate::openapi::document::HTTP_METHODS;
use crate::openapi::operations::{normalize_key, operation_key};
use crate::openapi::SpecDocument;

/// Restrict a document to the selected `"{METHOD} {PATH}"` keys.
///
/// Unselected operations are removed, and so is every path item that had operations
/// but has none left. Everything else (info, servers, components, tags, path-level
/// parameters) is kept. The dereferenced view of the result is rebuilt from the
/// filtered unresolved view.
pub fn filter_spec(
    doc: &SpecDocument,
    selected: &[String],
    max_operations: Option<usize>,
) -> crate::Result<SpecDocument> {
    let wanted: HashSet<String> = selected.iter().map(|key| normalize_key(key)).collect();
    if let Some(max) = max_operations {
        if wanted.len() > max {
            return Err(Error::stage(
                Stage::GetSpec,
                format!("{} operations selected but at most {} are allowed", wanted.len(), max),
            ));
        }
    }

    let mut unresolved = doc.unresolved().clone();
    let mut matched = HashSet::new();
    if let Some(paths) = unresolved.get_mut("paths").and_then(JsonValue::as_object_mut) {
        paths.retain(|path, item| {
            let Some(item) = item.as_object_mut() else {
                return true;
            };
            let had_operation = HTTP_METHODS.iter().any(|m| item.contains_key(*m));
            item.retain(|name, _| {
                if !HTTP_METHODS.contains(&name.as_str()) {
                    return true;
                }
                let key = operation_key(name, path);
                let keep = wanted.contains(&key);
                if keep {
                    matched.insert(key);
                }
                keep
            });
            !had_operation || HTTP_METHODS.iter().any(|m| item.contains_key(*m))
        });
    }

    for key in wanted.difference(&matched) {
        log::debug!("Selected operation not found in document: {}", key);
    }

    Ok(SpecDocument::new(unresolved, doc.is_legacy()))
}
