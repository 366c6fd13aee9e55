//! Adaptive card templates rendered from an operation's success response.

use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value as JsonValue};
use tokio::fs;

use super::CardStorage;
use crate::error::{Error, Stage};
use crate::openapi::operations::json_response_schema;

const ADAPTIVE_CARD_SCHEMA: &str = "http://adaptivecards.io/schemas/adaptive-card.json";
const ADAPTIVE_CARD_VERSION: &str = "1.5";

/// A card template with the JSON path of the data it binds to
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedCard {
    pub card: JsonValue,
    /// `$` for the whole response, else the property holding the rendered array
    pub json_path: String,
    pub sample_data: JsonValue,
}

/// Renders a card for a dereferenced operation
pub trait CardGenerator: Send + Sync {
    fn generate(&self, operation: &JsonValue) -> crate::Result<GeneratedCard>;
}

/// Default generator producing Adaptive Cards
#[derive(Debug, Clone, Copy, Default)]
pub struct AdaptiveCardGenerator;

impl CardGenerator for AdaptiveCardGenerator {
    fn generate(&self, operation: &JsonValue) -> crate::Result<GeneratedCard> {
        let Some(schema) = json_response_schema(operation).0 else {
            return Ok(GeneratedCard {
                card: wrap_card(vec![text_block("success")]),
                json_path: "$".to_string(),
                sample_data: JsonValue::Object(Map::new()),
            });
        };
        check_supported(schema)?;

        let (json_path, body_schema) = match wrapped_array(schema) {
            Some((name, array)) => (name.to_string(), array),
            None => ("$".to_string(), schema),
        };

        let body = if is_array(body_schema) {
            let items = body_schema.get("items").unwrap_or(&JsonValue::Null);
            vec![json!({
                "type": "Container",
                "$data": "${$root}",
                "items": elements(items, "")?,
            })]
        } else if is_object(body_schema) {
            elements(body_schema, "")?
        } else {
            primitive_type(body_schema)?;
            vec![text_block("${$root}")]
        };

        Ok(GeneratedCard {
            card: wrap_card(body),
            json_path,
            sample_data: sample_value(schema),
        })
    }
}

fn wrap_card(body: Vec<JsonValue>) -> JsonValue {
    json!({
        "type": "AdaptiveCard",
        "$schema": ADAPTIVE_CARD_SCHEMA,
        "version": ADAPTIVE_CARD_VERSION,
        "body": body,
    })
}

fn text_block(text: &str) -> JsonValue {
    json!({"type": "TextBlock", "text": text, "wrap": true})
}

fn schema_type(schema: &JsonValue) -> Option<&str> {
    schema.get("type").and_then(JsonValue::as_str)
}

fn is_array(schema: &JsonValue) -> bool {
    schema_type(schema) == Some("array")
}

fn is_object(schema: &JsonValue) -> bool {
    schema_type(schema) == Some("object")
        || (schema_type(schema).is_none()
            && (schema.get("properties").is_some() || schema.get("allOf").is_some()))
}

fn check_supported(schema: &JsonValue) -> crate::Result<()> {
    for keyword in ["oneOf", "anyOf", "not"] {
        if schema.get(keyword).is_some() {
            return Err(Error::stage(
                Stage::GenerateAdaptiveCard,
                format!("'{}' schemas are not supported", keyword),
            ));
        }
    }
    Ok(())
}

fn primitive_type(schema: &JsonValue) -> crate::Result<&str> {
    match schema_type(schema) {
        Some(t @ ("string" | "integer" | "number" | "boolean")) => Ok(t),
        other => Err(Error::stage(
            Stage::GenerateAdaptiveCard,
            format!("unknown schema type: {}", other.unwrap_or("<missing>")),
        )),
    }
}

/// Properties of an object schema, with `allOf` members merged in
fn properties(schema: &JsonValue) -> Map<String, JsonValue> {
    let mut merged = Map::new();
    for part in schema
        .get("allOf")
        .and_then(JsonValue::as_array)
        .into_iter()
        .flatten()
    {
        merged.extend(properties(part));
    }
    if let Some(own) = schema.get("properties").and_then(JsonValue::as_object) {
        merged.extend(own.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}

/// An object with exactly one array property renders that array
fn wrapped_array(schema: &JsonValue) -> Option<(String, &JsonValue)> {
    if !is_object(schema) {
        return None;
    }
    let props = schema.get("properties")?.as_object()?;
    let mut arrays = props.iter().filter(|(_, p)| is_array(p));
    let (name, array) = arrays.next()?;
    arrays.next().is_none().then(|| (name.clone(), array))
}

fn elements(schema: &JsonValue, path: &str) -> crate::Result<Vec<JsonValue>> {
    check_supported(schema)?;
    if is_array(schema) {
        let items = schema.get("items").unwrap_or(&JsonValue::Null);
        return Ok(vec![json!({
            "type": "Container",
            "$data": format!("${{{}}}", path),
            "items": elements(items, "")?,
        })]);
    }
    if is_object(schema) {
        let mut out = Vec::new();
        for (name, prop) in properties(schema) {
            let child = if path.is_empty() {
                name
            } else {
                format!("{}.{}", path, name)
            };
            out.extend(elements(&prop, &child)?);
        }
        return Ok(out);
    }
    primitive_type(schema)?;
    if path.is_empty() {
        Ok(vec![text_block("${$data}")])
    } else {
        Ok(vec![text_block(&format!(
            "{}: ${{if({}, {}, 'N/A')}}",
            path, path, path
        ))])
    }
}

/// Build sample data from `example`, `default` or the first `enum` value
pub fn sample_value(schema: &JsonValue) -> JsonValue {
    if let Some(value) = schema
        .get("example")
        .or_else(|| schema.get("default"))
        .or_else(|| schema.get("enum").and_then(|e| e.get(0)))
    {
        return value.clone();
    }
    if is_array(schema) {
        let items = schema.get("items").unwrap_or(&JsonValue::Null);
        return json!([sample_value(items)]);
    }
    if is_object(schema) {
        let map: Map<String, JsonValue> = properties(schema)
            .iter()
            .map(|(name, prop)| (name.clone(), sample_value(prop)))
            .collect();
        return JsonValue::Object(map);
    }
    match schema_type(schema) {
        Some("string") => json!("string"),
        Some("integer") => json!(0),
        Some("number") => json!(0.0),
        Some("boolean") => json!(true),
        _ => JsonValue::Null,
    }
}

/// Write a card and its sample data into `folder`, returning the card file path.
///
/// With [`CardStorage::KeepExisting`] an existing `<name>.json` is reused untouched.
/// With [`CardStorage::CreateNew`] the first free name of `name`, `name1`, `name2`...
/// is used.
pub async fn write_card(
    folder: &Path,
    name: &str,
    card: &GeneratedCard,
    storage: CardStorage,
) -> crate::Result<PathBuf> {
    fs::create_dir_all(folder).await?;

    let card_path = folder.join(format!("{}.json", name));
    if storage == CardStorage::KeepExisting && fs::try_exists(&card_path).await? {
        log::debug!("Reusing existing card: {}", card_path.display());
        return Ok(card_path);
    }

    let mut stem = name.to_string();
    let mut suffix = 0u32;
    while storage == CardStorage::CreateNew
        && fs::try_exists(folder.join(format!("{}.json", stem))).await?
    {
        suffix += 1;
        stem = format!("{}{}", name, suffix);
    }

    let card_path = folder.join(format!("{}.json", stem));
    let data_path = folder.join(format!("{}.data.json", stem));
    fs::write(&card_path, serde_json::to_string_pretty(&card.card)?).await?;
    if let Err(e) = fs::write(&data_path, serde_json::to_string_pretty(&card.sample_data)?).await {
        // A card without its sample data is never referenced
        if let Err(cleanup) = fs::remove_file(&card_path).await {
            log::debug!("Could not remove {}: {}", card_path.display(), cleanup);
        }
        return Err(e.into());
    }
    log::debug!("Wrote card: {}", card_path.display());
    Ok(card_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::tempdir;

    fn op(schema: JsonValue) -> JsonValue {
        json!({"responses": {"200": {"description": "ok", "content": {"application/json": {"schema": schema}}}}})
    }

    #[test]
    fn test_array_response() -> crate::Result<()> {
        let card = AdaptiveCardGenerator.generate(&op(json!({
            "type": "array",
            "items": {"type": "object", "properties": {
                "name": {"type": "string", "example": "Rex"},
                "age": {"type": "integer"}
            }}
        })))?;
        assert_eq!(card.json_path, "$");
        let container = &card.card["body"][0];
        assert_eq!(container["$data"], "${$root}");
        assert_eq!(
            container["items"][0]["text"],
            "name: ${if(name, name, 'N/A')}"
        );
        assert_eq!(card.sample_data, json!([{"name": "Rex", "age": 0}]));
        Ok(())
    }

    #[test]
    fn test_object_wrapping_one_array() -> crate::Result<()> {
        let card = AdaptiveCardGenerator.generate(&op(json!({
            "type": "object",
            "properties": {
                "total": {"type": "integer"},
                "results": {"type": "array", "items": {"type": "string"}}
            }
        })))?;
        assert_eq!(card.json_path, "results");
        assert_eq!(card.card["body"][0]["items"][0]["text"], "${$data}");
        Ok(())
    }

    #[test]
    fn test_plain_object_and_primitive() -> crate::Result<()> {
        let card = AdaptiveCardGenerator.generate(&op(json!({
            "type": "object",
            "properties": {"owner": {"type": "object", "properties": {"email": {"type": "string"}}}}
        })))?;
        assert_eq!(
            card.card["body"][0]["text"],
            "owner.email: ${if(owner.email, owner.email, 'N/A')}"
        );

        let card = AdaptiveCardGenerator.generate(&op(json!({"type": "string"})))?;
        assert_eq!(card.card["body"][0]["text"], "${$root}");
        Ok(())
    }

    #[test]
    fn test_no_json_response_is_success_card() -> crate::Result<()> {
        let card = AdaptiveCardGenerator.generate(&json!({"responses": {"204": {"description": "gone"}}}))?;
        assert_eq!(card.json_path, "$");
        assert_eq!(card.card["body"][0]["text"], "success");
        Ok(())
    }

    #[test]
    fn test_unsupported_schemas() {
        for schema in [
            json!({"oneOf": [{"type": "string"}, {"type": "integer"}]}),
            json!({"type": "object", "properties": {"a": {"anyOf": []}}}),
            json!({"type": "file"}),
        ] {
            let err = AdaptiveCardGenerator.generate(&op(schema)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::GenerateAdaptiveCardFailed);
        }
    }

    #[tokio::test]
    async fn test_card_storage() -> crate::Result<()> {
        let dir = tempdir()?;
        let card = AdaptiveCardGenerator.generate(&op(json!({"type": "string"})))?;

        let first = write_card(dir.path(), "getPets", &card, CardStorage::CreateNew).await?;
        let second = write_card(dir.path(), "getPets", &card, CardStorage::CreateNew).await?;
        assert_eq!(first.file_name().unwrap(), "getPets.json");
        assert_eq!(second.file_name().unwrap(), "getPets1.json");
        assert!(dir.path().join("getPets1.data.json").exists());

        tokio::fs::write(&first, "{\"custom\": true}").await?;
        let kept = write_card(dir.path(), "getPets", &card, CardStorage::KeepExisting).await?;
        assert_eq!(kept, first);
        assert_eq!(tokio::fs::read_to_string(&first).await?, "{\"custom\": true}");
        Ok(())
    }
}
