//! Telegram Bot API wire types.
//!
//! Only the subset of fields the monitor reads is modelled; unknown
//! fields are ignored during deserialization.

use serde::{Deserialize, Serialize};

/// Envelope wrapping every Bot API response.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

/// One entry returned by `getUpdates`.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
}

/// A chat message attached to an [`Update`].
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    /// Forum topic the message was posted in.
    #[serde(default)]
    pub message_thread_id: Option<i64>,
}

/// Chat the message was posted in.
#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub tpe: ChatType,
}

/// Kind of chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatType {
    Private,
    Group,
    Supergroup,
    Channel,
    #[serde(other)]
    Unknown,
}

/// Sender of a message.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
}

/// Destination chat, either a numeric id or an `@channelusername`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChatId {
    Id(i64),
    Username(String),
}

impl std::str::FromStr for ChatId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().parse::<i64>() {
            Ok(id) => Self::Id(id),
            Err(_) => Self::Username(s.trim().to_string()),
        })
    }
}

/// Body of a `sendMessage` request.
#[derive(Debug, Serialize)]
pub struct SendMessageRequest<'a> {
    pub chat_id: &'a ChatId,
    pub text: &'a str,
    pub parse_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_thread_id: Option<i64>,
    pub disable_web_page_preview: bool,
}

impl<'a> SendMessageRequest<'a> {
    /// Creates an HTML-formatted message request.
    pub fn html(chat_id: &'a ChatId, text: &'a str, topic_id: Option<i64>) -> Self {
        Self {
            chat_id,
            text,
            parse_mode: "HTML",
            message_thread_id: topic_id,
            disable_web_page_preview: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_group_command_update() {
        let json = r#"{
            "ok": true,
            "result": [{
                "update_id": 815,
                "message": {
                    "message_id": 3,
                    "message_thread_id": 12,
                    "from": { "id": 395803228, "is_bot": false, "first_name": "Jay" },
                    "chat": { "id": -1001234, "title": "Alerts", "type": "supergroup" },
                    "date": 1709985600,
                    "text": "/status@volwatch_bot"
                }
            }]
        }"#;
        let response: ApiResponse<Vec<Update>> = serde_json::from_str(json).unwrap();
        assert!(response.ok);
        let update = &response.result.unwrap()[0];
        assert_eq!(update.update_id, 815);
        let message = update.message.as_ref().unwrap();
        assert_eq!(message.chat.tpe, ChatType::Supergroup);
        assert_eq!(message.from.as_ref().unwrap().id, 395803228);
        assert_eq!(message.message_thread_id, Some(12));
        assert_eq!(message.text.as_deref(), Some("/status@volwatch_bot"));
    }

    #[test]
    fn unknown_chat_type_and_missing_text() {
        let json = r#"{ "update_id": 1, "message": { "chat": { "id": 5, "type": "forum" } } }"#;
        let update: Update = serde_json::from_str(json).unwrap();
        let message = update.message.unwrap();
        assert_eq!(message.chat.tpe, ChatType::Unknown);
        assert!(message.text.is_none());
        assert!(message.from.is_none());
    }

    #[test]
    fn error_envelope_has_description() {
        let json = r#"{
            "ok": false,
            "error_code": 409,
            "description": "Conflict: terminated by other getUpdates request"
        }"#;
        let response: ApiResponse<Vec<Update>> = serde_json::from_str(json).unwrap();
        assert!(!response.ok);
        assert!(response.result.is_none());
        assert!(response.description.unwrap().starts_with("Conflict"));
    }

    #[test]
    fn chat_id_parses_numeric_or_username() {
        assert_eq!("-100123".parse::<ChatId>().unwrap(), ChatId::Id(-100123));
        assert_eq!(
            " @alerts ".parse::<ChatId>().unwrap(),
            ChatId::Username("@alerts".to_string())
        );
        assert_eq!(serde_json::to_string(&ChatId::Id(7)).unwrap(), "7");
    }
}
