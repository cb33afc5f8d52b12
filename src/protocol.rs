//! Wire protocol for the session manager backend.
//!
//! One outbound shape (`ChatRequest`) and one inbound shape (`ChatResponse`)
//! travel over a persistent duplex connection. Responses are discriminated by
//! a single classification pass in [`crate::session::router`], never by ad hoc
//! field sniffing at the call sites.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Unique-per-attempt identifier for one request/response exchange.
/// Regenerated on retry; an abandoned id is never reused.
pub type DialogId = Uuid;

/// Outbound request sent over the connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub dialog_id: DialogId,
    pub conversation_id: Uuid,
    pub user_id: String,
    pub message: UserPrompt,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_profile: Option<UserProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overrides: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPrompt {
    pub payload: Vec<PayloadItem>,
}

/// One item of user input. Tagged on the wire as
/// `{ "type": "text" | "image" | "product", "value": ..., "locale"?: ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PayloadItem {
    Text {
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        locale: Option<String>,
    },
    /// Base64-encoded image content.
    Image { value: String },
    /// Reference to a product by article id.
    Product { value: String },
}

impl PayloadItem {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text {
            value: value.into(),
            locale: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub user_name: String,
    pub gender: String,
    pub age: u32,
    pub description: String,
}

/// Inbound response for a dialog. `error` and `answer` are both optional,
/// which is exactly why classification is centralized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub dialog_id: DialogId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<Answer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DialogError>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Answer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_string: Option<String>,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_points: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps_execution: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_metadata: Option<Value>,
}

/// Structured backend error for a specific dialog. Recorded on the dialog,
/// never fatal to the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogError {
    pub error_str: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl DialogError {
    /// Whether the dialog may be automatically resubmitted. `default` applies
    /// when the payload carries no `retry` flag.
    pub fn is_retryable(&self, default: bool) -> bool {
        self.retry.unwrap_or(default)
    }
}

/// Which answer field signals "this response is final". Deployments disagree
/// (some set `is_final`, others return `data_points` or `steps_execution`
/// only on the terminal message), so the rule is an explicit per-session
/// policy instead of something inferred per message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionMarker {
    /// `answer.is_final == true` ends the dialog.
    #[default]
    IsFinalFlag,
    /// A non-empty `answer.data_points` ends the dialog.
    DataPoints,
    /// A present `answer.steps_execution` ends the dialog.
    StepsExecution,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_item_wire_tagging() {
        let item = PayloadItem::Text {
            value: "hello".to_string(),
            locale: Some("en-US".to_string()),
        };
        let wire = serde_json::to_value(&item).unwrap();
        assert_eq!(
            wire,
            json!({"type": "text", "value": "hello", "locale": "en-US"})
        );

        let product: PayloadItem =
            serde_json::from_value(json!({"type": "product", "value": "A123"})).unwrap();
        assert_eq!(
            product,
            PayloadItem::Product {
                value: "A123".to_string()
            }
        );
    }

    #[test]
    fn test_response_with_error_only() {
        let raw = json!({
            "dialog_id": Uuid::new_v4(),
            "error": {"error_str": "backend unavailable", "retry": true, "status_code": 503}
        });
        let response: ChatResponse = serde_json::from_value(raw).unwrap();
        let error = response.error.unwrap();
        assert!(error.is_retryable(false));
        assert_eq!(error.status_code, Some(503));
        assert!(response.answer.is_none());
    }

    #[test]
    fn test_retry_flag_defaults() {
        let error = DialogError {
            error_str: "boom".to_string(),
            retry: None,
            status_code: None,
        };
        assert!(!error.is_retryable(false));
        assert!(error.is_retryable(true));
    }

    #[test]
    fn test_answer_defaults_are_lenient() {
        // Intermediate responses often carry nothing but an answer_string.
        let raw = json!({
            "dialog_id": Uuid::new_v4(),
            "answer": {"answer_string": "thinking..."}
        });
        let response: ChatResponse = serde_json::from_value(raw).unwrap();
        let answer = response.answer.unwrap();
        assert!(!answer.is_final);
        assert!(answer.data_points.is_empty());
        assert!(answer.steps_execution.is_none());
    }

    #[test]
    fn test_request_omits_empty_optionals() {
        let request = ChatRequest {
            dialog_id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            user_id: "anonymous".to_string(),
            message: UserPrompt {
                payload: vec![PayloadItem::text("hi")],
            },
            user_profile: None,
            overrides: None,
        };
        let wire = serde_json::to_value(&request).unwrap();
        assert!(wire.get("user_profile").is_none());
        assert!(wire.get("overrides").is_none());
    }
}
