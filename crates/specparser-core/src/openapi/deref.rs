//! Internal `$ref` resolution.
//!
//! Inlines every `#/...` reference of a document. A reference that points back into
//! its own expansion chain is left in place as a `$ref` object and reported through
//! [`Dereferenced::circular`], so callers can branch on it instead of recursing forever.
//! References to other documents are never followed; see [`remote_refs`].

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value as JsonValue};

/// Result of dereferencing a document
#[derive(Debug, Clone, PartialEq)]
pub struct Dereferenced {
    /// The document with internal references inlined
    pub value: JsonValue,
    /// Whether at least one reference cycle was found
    pub circular: bool,
}

/// Inline every internal reference of `root`
pub fn dereference(root: &JsonValue) -> Dereferenced {
    let mut resolver = Resolver {
        root,
        stack: Vec::new(),
        cache: HashMap::new(),
        cycles: 0,
    };
    let value = resolver.resolve(root);
    Dereferenced {
        value,
        circular: resolver.cycles > 0,
    }
}

/// Collect every `$ref` that points outside the document, in first-seen order
pub fn remote_refs(value: &JsonValue) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut refs = Vec::new();
    collect_remote_refs(value, &mut seen, &mut refs);
    refs
}

fn collect_remote_refs(value: &JsonValue, seen: &mut HashSet<String>, refs: &mut Vec<String>) {
    match value {
        JsonValue::Object(map) => {
            if let Some(r) = map.get("$ref").and_then(JsonValue::as_str) {
                if !r.starts_with('#') && seen.insert(r.to_string()) {
                    refs.push(r.to_string());
                }
            }
            for v in map.values() {
                collect_remote_refs(v, seen, refs);
            }
        }
        JsonValue::Array(arr) => {
            for v in arr {
                collect_remote_refs(v, seen, refs);
            }
        }
        _ => {}
    }
}

/// Look up a `#/a/b` fragment in a document
pub fn lookup_fragment<'a>(root: &'a JsonValue, reference: &str) -> Option<&'a JsonValue> {
    let pointer = reference.strip_prefix('#')?;
    if pointer.is_empty() {
        return Some(root);
    }
    root.pointer(pointer)
}

struct Resolver<'a> {
    root: &'a JsonValue,
    /// References currently being expanded
    stack: Vec<String>,
    /// Expansions that completed without meeting a cycle
    cache: HashMap<String, JsonValue>,
    cycles: usize,
}

impl Resolver<'_> {
    fn resolve(&mut self, node: &JsonValue) -> JsonValue {
        match node {
            JsonValue::Object(map) => {
                if let Some(reference) = map.get("$ref").and_then(JsonValue::as_str) {
                    if reference.starts_with('#') {
                        return self.resolve_ref(reference, map);
                    }
                }
                let resolved: Map<String, JsonValue> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), self.resolve(v)))
                    .collect();
                JsonValue::Object(resolved)
            }
            JsonValue::Array(arr) => JsonValue::Array(arr.iter().map(|v| self.resolve(v)).collect()),
            other => other.clone(),
        }
    }

    fn resolve_ref(&mut self, reference: &str, node: &Map<String, JsonValue>) -> JsonValue {
        if self.stack.iter().any(|r| r == reference) {
            log::debug!("Circular reference left unresolved: {}", reference);
            self.cycles += 1;
            return JsonValue::Object(node.clone());
        }

        let target = if let Some(cached) = self.cache.get(reference) {
            cached.clone()
        } else {
            let Some(raw) = lookup_fragment(self.root, reference) else {
                log::debug!("Reference target not found: {}", reference);
                return JsonValue::Object(node.clone());
            };
            let cycles_before = self.cycles;
            self.stack.push(reference.to_string());
            let resolved = self.resolve(raw);
            self.stack.pop();
            if self.cycles == cycles_before {
                self.cache.insert(reference.to_string(), resolved.clone());
            }
            resolved
        };

        // Sibling keys next to a $ref (e.g. description) override the target's
        match target {
            JsonValue::Object(mut target_map) => {
                for (k, v) in node.iter().filter(|(k, _)| k.as_str() != "$ref") {
                    let value = self.resolve(v);
                    target_map.insert(k.clone(), value);
                }
                JsonValue::Object(target_map)
            }
            other => other,
        }
    }
}
