use anyhow::{Result, anyhow};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

mod gemini;
mod openai;

pub use gemini::Gemini;
pub use openai::OpenAI;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAI,
    Gemini,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Gemini => "gemini",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSelection {
    pub provider: ProviderKind,
    pub requested_model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderResponse {
    pub args: serde_json::Value,
    pub model: Option<String>,
    pub usage: Option<ProviderUsage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: MessageRole,
    pub text: String,
}

impl Message {
    pub fn system(text: String) -> Self {
        Self {
            role: MessageRole::System,
            text,
        }
    }

    pub fn user(text: String) -> Self {
        Self {
            role: MessageRole::User,
            text,
        }
    }
}

pub type ProviderFuture = Pin<Box<dyn Future<Output = Result<ProviderResponse>> + Send>>;

/// Builder-style chat client that forces a single tool call.
pub trait Provider: Clone + Send + Sync {
    fn append_system_input(self, input: String) -> Self;
    fn append_user_input(self, input: String) -> Self;
    fn register_tool(self, tool: ToolSpec) -> Self;
    fn call_tool(self, tool_name: &str) -> ProviderFuture;
}

#[derive(Debug, Clone)]
pub enum ProviderImpl {
    OpenAI(OpenAI),
    Gemini(Gemini),
}

impl ProviderImpl {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderImpl::OpenAI(_) => ProviderKind::OpenAI,
            ProviderImpl::Gemini(_) => ProviderKind::Gemini,
        }
    }
}

impl Provider for ProviderImpl {
    fn append_system_input(self, input: String) -> Self {
        match self {
            ProviderImpl::OpenAI(provider) => {
                ProviderImpl::OpenAI(provider.append_system_input(input))
            }
            ProviderImpl::Gemini(provider) => {
                ProviderImpl::Gemini(provider.append_system_input(input))
            }
        }
    }

    fn append_user_input(self, input: String) -> Self {
        match self {
            ProviderImpl::OpenAI(provider) => {
                ProviderImpl::OpenAI(provider.append_user_input(input))
            }
            ProviderImpl::Gemini(provider) => {
                ProviderImpl::Gemini(provider.append_user_input(input))
            }
        }
    }

    fn register_tool(self, tool: ToolSpec) -> Self {
        match self {
            ProviderImpl::OpenAI(provider) => ProviderImpl::OpenAI(provider.register_tool(tool)),
            ProviderImpl::Gemini(provider) => ProviderImpl::Gemini(provider.register_tool(tool)),
        }
    }

    fn call_tool(self, tool_name: &str) -> ProviderFuture {
        match self {
            ProviderImpl::OpenAI(provider) => provider.call_tool(tool_name),
            ProviderImpl::Gemini(provider) => provider.call_tool(tool_name),
        }
    }
}

pub fn build_provider(provider: ProviderKind, key: String, model: Option<String>) -> ProviderImpl {
    match provider {
        ProviderKind::OpenAI => {
            let client = OpenAI::new(key);
            ProviderImpl::OpenAI(match model {
                Some(model) => client.with_model(model),
                None => client,
            })
        }
        ProviderKind::Gemini => {
            let client = Gemini::new(key);
            ProviderImpl::Gemini(match model {
                Some(model) => client.with_model(model),
                None => client,
            })
        }
    }
}

/// Picks the provider from an explicit `provider[:model]` argument, or from
/// whichever API key is configured.
pub fn resolve_provider_selection(
    model_arg: Option<&str>,
    override_key: Option<&str>,
) -> Result<ProviderSelection> {
    match model_arg.map(str::trim).filter(|value| !value.is_empty()) {
        Some(model) => parse_model_arg(model),
        None => default_provider_selection(override_key),
    }
}

/// API key for the provider, from the override or the environment.
pub fn resolve_key(provider: ProviderKind, override_key: Option<&str>) -> Option<String> {
    if let Some(key) = override_key.filter(|key| !key.trim().is_empty()) {
        return Some(key.to_string());
    }

    match provider {
        ProviderKind::OpenAI => get_env("OPENAI_API_KEY"),
        ProviderKind::Gemini => get_env("GEMINI_API_KEY").or_else(|| get_env("GOOGLE_API_KEY")),
    }
}

fn default_provider_selection(override_key: Option<&str>) -> Result<ProviderSelection> {
    if get_env("GEMINI_API_KEY").is_some() || get_env("GOOGLE_API_KEY").is_some() {
        return Ok(ProviderSelection {
            provider: ProviderKind::Gemini,
            requested_model: None,
        });
    }

    if get_env("OPENAI_API_KEY").is_some() || override_key.is_some() {
        return Ok(ProviderSelection {
            provider: ProviderKind::OpenAI,
            requested_model: None,
        });
    }

    Err(anyhow!(
        "no API keys found (checked GEMINI_API_KEY/GOOGLE_API_KEY, OPENAI_API_KEY)"
    ))
}

fn parse_model_arg(model_arg: &str) -> Result<ProviderSelection> {
    let lower = model_arg.to_lowercase();
    if let Some(provider) = provider_from_name(&lower) {
        return Ok(ProviderSelection {
            provider,
            requested_model: None,
        });
    }

    if let Some((provider_part, model_part)) = model_arg.split_once(':')
        && let Some(provider) = provider_from_name(&provider_part.trim().to_lowercase())
    {
        let model = model_part.trim();
        return Ok(ProviderSelection {
            provider,
            requested_model: (!model.is_empty()).then(|| model.to_string()),
        });
    }

    if lower.starts_with("gemini") {
        return Ok(ProviderSelection {
            provider: ProviderKind::Gemini,
            requested_model: Some(model_arg.to_string()),
        });
    }
    if lower.starts_with("gpt-") || lower.starts_with("o1") || lower.starts_with("o3") {
        return Ok(ProviderSelection {
            provider: ProviderKind::OpenAI,
            requested_model: Some(model_arg.to_string()),
        });
    }

    Err(anyhow!(
        "unable to infer provider from model '{}'. Use provider:model (openai:, gemini:)",
        model_arg
    ))
}

fn provider_from_name(name: &str) -> Option<ProviderKind> {
    match name {
        "openai" => Some(ProviderKind::OpenAI),
        "gemini" | "google" => Some(ProviderKind::Gemini),
        _ => None,
    }
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

pub(crate) fn format_error_parts(
    message: Option<String>,
    kind: Option<String>,
    code: Option<String>,
) -> String {
    let mut parts = Vec::new();
    if let Some(message) = message.filter(|value| !value.trim().is_empty()) {
        parts.push(message);
    }
    if let Some(kind) = kind.filter(|value| !value.trim().is_empty()) {
        parts.push(format!("type: {}", kind));
    }
    if let Some(code) = code.filter(|value| !value.trim().is_empty()) {
        parts.push(format!("code: {}", code));
    }
    if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join(" | ")
    }
}
