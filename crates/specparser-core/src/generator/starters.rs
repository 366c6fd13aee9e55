//! Conversation starters for declarative agents.

use std::collections::HashSet;

use serde_json::{json, Value as JsonValue};

use super::plugin::{ConversationStarter, PluginManifest};
use crate::error::{Error, Stage};
use crate::openapi::OperationIndex;

/// Most starters a declarative agent may carry
pub const MAX_CONVERSATION_STARTERS: usize = 6;

/// Starters offered by a plugin.
///
/// Declared `capabilities.conversation_starters` win. Otherwise one starter is derived
/// per function bound to a runtime whose operation is valid and has a summary (or,
/// failing that, a description).
pub fn plugin_starters(plugin: &PluginManifest, index: &OperationIndex) -> Vec<ConversationStarter> {
    let declared = plugin.conversation_starters();
    if !declared.is_empty() {
        return declared.to_vec();
    }

    plugin
        .runtimes
        .iter()
        .flat_map(|runtime| runtime.run_for_functions.iter())
        .filter_map(|name| index.by_operation_id(name))
        .filter(|entry| entry.is_valid)
        .filter_map(|entry| entry.summary.clone().or_else(|| entry.description.clone()))
        .map(|text| ConversationStarter { text, title: None })
        .collect()
}

/// Merge candidates into the agent's `conversation_starters`.
///
/// The merged list is the existing starters followed by the candidates, with exact-text
/// duplicates dropped in first-seen order and cut to [`MAX_CONVERSATION_STARTERS`].
/// Returns how many candidates made it into the merged list.
pub fn merge_starters(agent: &mut JsonValue, candidates: &[ConversationStarter]) -> crate::Result<usize> {
    let root = agent
        .as_object_mut()
        .ok_or_else(|| Error::stage(Stage::Generate, "declarative agent manifest is not an object"))?;
    let starters = root
        .entry("conversation_starters")
        .or_insert_with(|| json!([]))
        .as_array_mut()
        .ok_or_else(|| Error::stage(Stage::Generate, "'conversation_starters' is not an array"))?;

    let mut seen = HashSet::new();
    let mut merged: Vec<JsonValue> = Vec::with_capacity(MAX_CONVERSATION_STARTERS);
    for existing in std::mem::take(starters) {
        let text = existing.get("text").and_then(JsonValue::as_str).map(String::from);
        if text.is_some_and(|t| !seen.insert(t)) {
            continue;
        }
        merged.push(existing);
    }
    merged.truncate(MAX_CONVERSATION_STARTERS);

    let mut added = 0;
    for candidate in candidates {
        if merged.len() >= MAX_CONVERSATION_STARTERS {
            break;
        }
        if seen.insert(candidate.text.clone()) {
            merged.push(serde_json::to_value(candidate)?);
            added += 1;
        }
    }

    *starters = merged;
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParseOptions;
    use crate::generator::plugin::{PluginRuntime, RuntimeAuth, RuntimeSpec};
    use crate::openapi::{index_operations, SpecDocument};
    use crate::validator::policy::policy_for;

    fn starter(text: &str) -> ConversationStarter {
        ConversationStarter {
            text: text.to_string(),
            title: None,
        }
    }

    #[test]
    fn test_merge_caps_at_six_in_order() -> crate::Result<()> {
        let mut agent = json!({"conversation_starters": [{"text": "a"}, {"text": "b"}]});
        let candidates: Vec<_> = ["b", "c", "c", "d", "e", "f", "g", "h"]
            .into_iter()
            .map(starter)
            .collect();
        let added = merge_starters(&mut agent, &candidates)?;
        assert_eq!(added, 4);
        let texts: Vec<_> = agent["conversation_starters"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["text"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(texts, vec!["a", "b", "c", "d", "e", "f"]);
        Ok(())
    }

    fn texts(agent: &JsonValue) -> Vec<String> {
        agent["conversation_starters"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["text"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_merge_trims_oversized_agent() -> crate::Result<()> {
        let existing: Vec<_> = (0..7).map(|i| json!({"text": i.to_string()})).collect();
        let mut agent = json!({"conversation_starters": existing});
        assert_eq!(merge_starters(&mut agent, &[starter("new")])?, 0);
        assert_eq!(texts(&agent), vec!["0", "1", "2", "3", "4", "5"]);
        Ok(())
    }

    #[test]
    fn test_merge_drops_existing_duplicates() -> crate::Result<()> {
        let existing: Vec<_> = ["a", "a", "b", "c", "d", "e", "f"]
            .into_iter()
            .map(|t| json!({"text": t}))
            .collect();
        let mut agent = json!({"conversation_starters": existing});
        assert_eq!(merge_starters(&mut agent, &[starter("g")])?, 0);
        assert_eq!(texts(&agent), vec!["a", "b", "c", "d", "e", "f"]);

        let mut agent = json!({"conversation_starters": [{"text": "a"}, {"text": "a", "title": "A"}]});
        assert_eq!(merge_starters(&mut agent, &[starter("b")])?, 1);
        assert_eq!(texts(&agent), vec!["a", "b"]);
        Ok(())
    }

    #[test]
    fn test_derived_from_valid_bound_functions() {
        let doc = SpecDocument::new(
            json!({
                "openapi": "3.0.3",
                "info": {"title": "T", "version": "1"},
                "servers": [{"url": "https://api.example.com"}],
                "paths": {
                    "/a": {"get": {"operationId": "getA", "summary": "Show A"}},
                    "/b": {"get": {"operationId": "getB", "description": "Show B"}},
                    "/c": {"delete": {"operationId": "deleteC", "summary": "Drop C"}},
                    "/d": {"get": {"operationId": "getD"}}
                }
            }),
            false,
        );
        let options = ParseOptions {
            project_type: crate::config::ProjectType::TeamsAi,
            ..Default::default()
        };
        let policy = policy_for(options.project_type);
        let index = index_operations(&doc, &options, policy.as_ref());
        let plugin = PluginManifest {
            runtimes: vec![PluginRuntime {
                kind: "OpenApi".into(),
                auth: RuntimeAuth {
                    kind: "None".into(),
                    ..Default::default()
                },
                spec: RuntimeSpec {
                    url: "openapi.yaml".into(),
                    ..Default::default()
                },
                run_for_functions: vec!["getA".into(), "getB".into(), "deleteC".into(), "getD".into()],
                ..Default::default()
            }],
            ..Default::default()
        };

        let texts: Vec<_> = plugin_starters(&plugin, &index)
            .into_iter()
            .map(|s| s.text)
            .collect();
        assert_eq!(texts, vec!["Show A", "Show B"]);
    }
}
