use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::borrow::Cow;

/// Reply from the analysis API.
///
/// Serializes back to the exact payload that was received, whichever
/// variant it was classified as.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    ChatCompletion(ChatCompletion),
    Opaque(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletion {
    content: String,
    raw: Value,
}

impl ChatCompletion {
    pub fn content(&self) -> &str {
        &self.content
    }
}

#[derive(Deserialize)]
struct CompletionShape {
    choices: Vec<ChoiceShape>,
}

#[derive(Deserialize)]
struct ChoiceShape {
    message: MessageShape,
}

#[derive(Deserialize)]
struct MessageShape {
    content: String,
}

fn first_choice_content(raw: &Value) -> Option<String> {
    let shape = CompletionShape::deserialize(raw).ok()?;
    shape
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
}

impl ApiResponse {
    pub fn from_value(raw: Value) -> Self {
        match first_choice_content(&raw) {
            Some(content) => ApiResponse::ChatCompletion(ChatCompletion { content, raw }),
            None => ApiResponse::Opaque(raw),
        }
    }

    pub fn raw(&self) -> &Value {
        match self {
            ApiResponse::ChatCompletion(completion) => &completion.raw,
            ApiResponse::Opaque(raw) => raw,
        }
    }

    /// First choice's message text, only for chat-completion payloads.
    pub fn content(&self) -> Option<&str> {
        match self {
            ApiResponse::ChatCompletion(completion) => Some(completion.content()),
            ApiResponse::Opaque(_) => None,
        }
    }

    /// Narrative text for display or prompting. Payloads without the
    /// chat-completion shape fall back to their compact JSON rendering,
    /// which is never empty.
    pub fn narrative(&self) -> Cow<'_, str> {
        match self {
            ApiResponse::ChatCompletion(completion) => Cow::Borrowed(completion.content()),
            ApiResponse::Opaque(raw) => Cow::Owned(raw.to_string()),
        }
    }
}

impl Serialize for ApiResponse {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.raw().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ApiResponse {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(ApiResponse::from_value)
    }
}
