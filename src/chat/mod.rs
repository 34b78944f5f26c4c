//! Chat completions over the Ark `/chat/completions` endpoint.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, VolcError};
use crate::provider::ArkClient;

pub const DEFAULT_CHAT_MODEL: &str = "doubao-seed-1-6-250615";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl FromStr for Role {
    type Err = VolcError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(VolcError::InvalidArgument(format!("Unknown role: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Optional sampling settings; unset fields are left out of the body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_logprobs: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(flatten)]
    pub options: ChatOptions,
    /// Return `{success, data, model, usage}` instead of the raw body.
    #[serde(skip)]
    pub simplify_output: bool,
}

impl ChatCompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            options: ChatOptions::default(),
            simplify_output: true,
        }
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    pub fn raw_output(mut self) -> Self {
        self.simplify_output = false;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(VolcError::InvalidArgument("Model cannot be empty".into()));
        }
        if self.messages.is_empty() {
            return Err(VolcError::InvalidArgument(
                "At least one message is required".into(),
            ));
        }
        let opts = &self.options;
        for (name, value) in [
            ("frequency_penalty", opts.frequency_penalty),
            ("presence_penalty", opts.presence_penalty),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || !(-2.0..=2.0).contains(&v) {
                    return Err(VolcError::InvalidArgument(format!(
                        "{name} must be between -2 and 2"
                    )));
                }
            }
        }
        if let Some(t) = opts.temperature {
            if !t.is_finite() || !(0.0..=2.0).contains(&t) {
                return Err(VolcError::InvalidArgument(
                    "temperature must be between 0 and 2".into(),
                ));
            }
        }
        if let Some(p) = opts.top_p {
            if !p.is_finite() || !(0.0..=1.0).contains(&p) {
                return Err(VolcError::InvalidArgument(
                    "top_p must be between 0 and 1".into(),
                ));
            }
        }
        if let Some(n) = opts.top_logprobs {
            if n > 20 {
                return Err(VolcError::InvalidArgument(
                    "top_logprobs must be between 0 and 20".into(),
                ));
            }
            if opts.logprobs != Some(true) {
                return Err(VolcError::InvalidArgument(
                    "top_logprobs requires logprobs".into(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimplifiedChat {
    pub success: bool,
    pub data: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChatCompletionOutput {
    Simplified(SimplifiedChat),
    Raw(Value),
}

impl ChatCompletionOutput {
    /// Content of the first choice's message.
    pub fn first_content(&self) -> Option<&str> {
        let choice = match self {
            Self::Simplified(simplified) => simplified.data.first()?,
            Self::Raw(raw) => raw.get("choices")?.get(0)?,
        };
        choice.get("message")?.get("content")?.as_str()
    }
}

#[derive(Debug, Clone)]
pub struct ChatClient {
    ark: ArkClient,
}

impl ChatClient {
    pub fn new(ark: ArkClient) -> Self {
        Self { ark }
    }

    pub async fn complete(&self, request: &ChatCompletionRequest) -> Result<ChatCompletionOutput> {
        request.validate()?;
        debug!(model = %request.model, messages = request.messages.len(), "chat completion");
        let response = self.ark.post_json("chat/completions", request).await?;
        Ok(shape_output(response, request.simplify_output))
    }
}

fn shape_output(response: Value, simplify: bool) -> ChatCompletionOutput {
    if !simplify {
        return ChatCompletionOutput::Raw(response);
    }
    match response.get("choices").and_then(Value::as_array) {
        Some(choices) => ChatCompletionOutput::Simplified(SimplifiedChat {
            success: true,
            data: choices.clone(),
            model: response
                .get("model")
                .and_then(Value::as_str)
                .map(str::to_string),
            usage: response.get("usage").cloned(),
        }),
        None => ChatCompletionOutput::Raw(response),
    }
}
