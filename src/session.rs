use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Keys one chat round trip: its thinking placeholder, its background tasks
/// and the action that eventually settles it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRatings {
    pub stars: f32,
    pub downloads: u64,
    pub accuracy: f32,
    pub last_update: String,
    #[serde(default)]
    pub verified: Option<bool>,
}

/// A backend analysis capability the user can pick before attaching data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub key: String,
    pub name: String,
    pub description: String,
    /// MIME pattern such as `image/*`; only the major type is enforced.
    pub input_type: String,
    pub ratings: ToolRatings,
}

impl Tool {
    pub fn input_major_type(&self) -> &str {
        self.input_type.split('/').next().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub url: String,
    pub info: String,
}

/// A reference URL the user trusts; sent to the backend as a preferred link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUrl {
    pub id: Uuid,
    pub url: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thinking {
    pub request_id: RequestId,
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub tools: Option<Vec<Tool>>,
    pub sources: Option<Vec<Source>>,
    pub thinking: Option<Thinking>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Message {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            tools: None,
            sources: None,
            thinking: None,
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::new(Role::Assistant, content)
    }

    /// Transient assistant placeholder shown while `request_id` is in flight.
    pub fn thinking(request_id: RequestId) -> Self {
        let mut message = Message::new(Role::Assistant, String::new());
        message.thinking = Some(Thinking { request_id, steps: Vec::new() });
        message
    }

    pub fn is_thinking(&self) -> bool {
        self.thinking.is_some()
    }

    pub fn is_placeholder_for(&self, request_id: RequestId) -> bool {
        self.thinking.as_ref().is_some_and(|t| t.request_id == request_id)
    }
}
