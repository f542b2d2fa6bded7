use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use tera::{Context as TeraContext, Tera};
use tracing::{debug, info, warn};

use crate::providers::{self, Provider, ProviderImpl, ToolSpec};
use crate::region::RegionId;

pub const TOOL_NAME: &str = "deliver_translations";

const SYSTEM_PROMPT_TEMPLATE: &str = include_str!("templates/system_prompt.tera");

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationItem {
    pub id: RegionId,
    pub original_text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranslationBatch {
    pub items: Vec<TranslationItem>,
    pub source_language: String,
    pub target_language: String,
}

/// Translated text keyed by region id. A region without an entry keeps
/// whatever translation it already had.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslationMap(HashMap<RegionId, String>);

impl TranslationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: RegionId) -> Option<&str> {
        self.0.get(&id).map(String::as_str)
    }

    pub fn insert(&mut self, id: RegionId, text: impl Into<String>) {
        self.0.insert(id, text.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RegionId, &str)> {
        self.0.iter().map(|(id, text)| (*id, text.as_str()))
    }
}

impl FromIterator<(RegionId, String)> for TranslationMap {
    fn from_iter<I: IntoIterator<Item = (RegionId, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

pub type TranslationFuture<'a> =
    Pin<Box<dyn Future<Output = Result<TranslationMap>> + Send + 'a>>;

pub trait TranslationService: Send + Sync {
    fn translate<'a>(&'a self, batch: &'a TranslationBatch) -> TranslationFuture<'a>;
}

/// Batch translation through a tool-calling chat model.
///
/// Every failure mode (no credentials, transport errors, a response that does
/// not parse) is logged and turned into an empty map, so a translation pass
/// through this service never fails.
#[derive(Debug, Clone)]
pub struct LlmTranslator {
    provider: Option<ProviderImpl>,
}

impl LlmTranslator {
    pub fn new(provider: ProviderImpl) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    pub fn unconfigured() -> Self {
        Self { provider: None }
    }

    pub fn from_model_arg(model_arg: Option<&str>, key: Option<&str>) -> Self {
        let selection = match providers::resolve_provider_selection(model_arg, key) {
            Ok(selection) => selection,
            Err(err) => {
                warn!("translation disabled: {}", err);
                return Self::unconfigured();
            }
        };
        let Some(api_key) = providers::resolve_key(selection.provider, key) else {
            warn!(
                "translation disabled: no API key for provider {}",
                selection.provider.as_str()
            );
            return Self::unconfigured();
        };
        info!(
            provider = selection.provider.as_str(),
            model = selection.requested_model.as_deref().unwrap_or("default"),
            "translation provider selected"
        );
        Self::new(providers::build_provider(
            selection.provider,
            api_key,
            selection.requested_model,
        ))
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    async fn request(
        &self,
        provider: ProviderImpl,
        batch: &TranslationBatch,
    ) -> Result<TranslationMap> {
        let system_prompt = render_system_prompt(batch, TOOL_NAME)?;
        let user_input = render_user_input(batch)?;
        let response = provider
            .register_tool(tool_spec(TOOL_NAME))
            .append_system_input(system_prompt)
            .append_user_input(user_input)
            .call_tool(TOOL_NAME)
            .await?;
        if let Some(usage) = response.usage.as_ref() {
            debug!(
                model = response.model.as_deref().unwrap_or("unknown"),
                total_tokens = usage.total_tokens.unwrap_or(0),
                "translation usage"
            );
        }
        parse_translations(response.args)
    }
}

impl TranslationService for LlmTranslator {
    fn translate<'a>(&'a self, batch: &'a TranslationBatch) -> TranslationFuture<'a> {
        Box::pin(async move {
            if batch.items.is_empty() {
                return Ok(TranslationMap::new());
            }
            let Some(provider) = self.provider.clone() else {
                warn!("no translation credentials configured; leaving translations unchanged");
                return Ok(TranslationMap::new());
            };
            let kind = provider.kind();
            match self.request(provider, batch).await {
                Ok(map) => {
                    info!(
                        provider = kind.as_str(),
                        requested = batch.items.len(),
                        returned = map.len(),
                        "translation batch finished"
                    );
                    Ok(map)
                }
                Err(err) => {
                    warn!("translation via {} failed: {:#}", kind.as_str(), err);
                    Ok(TranslationMap::new())
                }
            }
        })
    }
}

pub fn tool_spec(tool_name: &str) -> ToolSpec {
    let parameters = json!({
        "type": "object",
        "properties": {
            "translations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "integer"},
                        "translatedText": {"type": "string"}
                    },
                    "required": ["id", "translatedText"]
                }
            }
        },
        "required": ["translations"]
    });

    ToolSpec {
        name: tool_name.to_string(),
        description: "Return the translated text for every region id.".to_string(),
        parameters,
    }
}

pub fn render_system_prompt(batch: &TranslationBatch, tool_name: &str) -> Result<String> {
    let mut context = TeraContext::new();
    context.insert("source_language", batch.source_language.trim());
    context.insert("target_language", batch.target_language.trim());
    context.insert("tool_name", tool_name);
    let rendered = Tera::one_off(SYSTEM_PROMPT_TEMPLATE, &context, false)
        .with_context(|| "failed to render translation prompt")?;
    Ok(rendered.trim().to_string())
}

pub fn render_user_input(batch: &TranslationBatch) -> Result<String> {
    let payload = serde_json::to_string_pretty(&batch.items)?;
    Ok(format!("Regions (JSON):\n{}", payload))
}

/// Accepts either `{"translations": [...]}` or a bare array of
/// `{id, translatedText}` entries. Blank translations are dropped.
pub fn parse_translations(value: Value) -> Result<TranslationMap> {
    let entries = match value {
        Value::Array(items) => Value::Array(items),
        Value::Object(mut object) => object
            .remove("translations")
            .ok_or_else(|| anyhow!("translation response has no 'translations' field"))?,
        Value::String(text) => serde_json::from_str(&text)
            .with_context(|| "translation response string is not JSON")
            .and_then(|inner: Value| match inner {
                Value::Object(mut object) => object
                    .remove("translations")
                    .ok_or_else(|| anyhow!("translation response has no 'translations' field")),
                other => Ok(other),
            })?,
        other => return Err(anyhow!("unexpected translation response: {}", other)),
    };
    let entries: Vec<TranslationEntry> =
        serde_json::from_value(entries).with_context(|| "malformed translation entries")?;

    let mut map = TranslationMap::new();
    for entry in entries {
        let Some(id) = entry.id.as_region_id() else {
            continue;
        };
        let text = entry.translated_text.trim();
        if !text.is_empty() {
            map.insert(id, text);
        }
    }
    Ok(map)
}

#[derive(Debug, Deserialize)]
struct TranslationEntry {
    id: EntryId,
    #[serde(rename = "translatedText", alias = "translated_text", alias = "translation")]
    translated_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EntryId {
    Number(u64),
    Text(String),
}

impl EntryId {
    fn as_region_id(&self) -> Option<RegionId> {
        match self {
            EntryId::Number(value) => Some(RegionId(*value)),
            EntryId::Text(value) => value.trim().parse().ok().map(RegionId),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> TranslationBatch {
        TranslationBatch {
            items: vec![
                TranslationItem {
                    id: RegionId(4),
                    original_text: "어디 가?".to_string(),
                },
                TranslationItem {
                    id: RegionId(9),
                    original_text: "기다려!".to_string(),
                },
            ],
            source_language: "Korean".to_string(),
            target_language: "English".to_string(),
        }
    }

    #[test]
    fn wrapped_and_bare_arrays_parse() {
        let wrapped = json!({"translations": [{"id": 4, "translatedText": " Going where? "}]});
        let map = parse_translations(wrapped).unwrap();
        assert_eq!(map.get(RegionId(4)), Some("Going where?"));

        let bare = json!([{"id": "9", "translated_text": "Wait!"}, {"id": "x", "translatedText": "?"}]);
        let map = parse_translations(bare).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(RegionId(9)), Some("Wait!"));
    }

    #[test]
    fn stringified_payloads_parse() {
        let value = Value::String(r#"{"translations":[{"id":1,"translatedText":"Hi"}]}"#.into());
        assert_eq!(parse_translations(value).unwrap().get(RegionId(1)), Some("Hi"));
    }

    #[test]
    fn malformed_payloads_are_errors() {
        assert!(parse_translations(json!({"items": []})).is_err());
        assert!(parse_translations(json!([{"id": 1}])).is_err());
        assert!(parse_translations(json!(42)).is_err());
    }

    #[test]
    fn blank_translations_are_dropped() {
        let map = parse_translations(json!([{"id": 1, "translatedText": "   "}])).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn user_input_lists_ids_and_text() {
        let input = render_user_input(&batch()).unwrap();
        insta::assert_snapshot!(input, @r#"
        Regions (JSON):
        [
          {
            "id": 4,
            "originalText": "어디 가?"
          },
          {
            "id": 9,
            "originalText": "기다려!"
          }
        ]
        "#);
    }

    #[test]
    fn system_prompt_names_languages_and_tool() {
        let prompt = render_system_prompt(&batch(), TOOL_NAME).unwrap();
        assert!(prompt.contains("Source language: Korean"));
        assert!(prompt.contains("Target language: English"));
        assert!(prompt.contains("`deliver_translations`"));
    }

    #[tokio::test]
    async fn unconfigured_translator_returns_nothing() {
        let translator = LlmTranslator::unconfigured();
        let map = translator.translate(&batch()).await.unwrap();
        assert!(map.is_empty());
        assert!(!translator.is_configured());
    }
}
