//! Inbound webhook payloads and their normalized form.

use serde::Deserialize;

/// Top-level webhook body: a batch of events.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

/// One raw platform event. Unknown event types deserialize fine and are
/// dropped during normalization.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "replyToken")]
    pub reply_token: Option<String>,
    pub source: Option<EventSource>,
    pub message: Option<EventMessage>,
    pub postback: Option<EventPostback>,
}

#[derive(Debug, Deserialize)]
pub struct EventSource {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventPostback {
    pub data: String,
    #[serde(default)]
    pub params: PostbackParams,
}

#[derive(Debug, Default, Deserialize)]
pub struct PostbackParams {
    pub date: Option<String>,
}

/// Normalized event the engine consumes. Everything else is discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub user_id: String,
    pub reply_token: Option<String>,
    pub kind: InboundKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundKind {
    Text(String),
    /// Image content is fetched later by message id.
    Image { message_id: String },
    Postback {
        data: String,
        /// Date picked in a date-picker action, when present.
        date: Option<String>,
    },
}

impl WebhookEvent {
    /// Reduce a raw event to the normalized form. Returns `None` for event
    /// types and message types the engine does not handle (stickers, video,
    /// follow/unfollow, membership events).
    #[must_use]
    pub fn normalize(self) -> Option<InboundEvent> {
        let user_id = self.source.and_then(|s| s.user_id)?;
        let kind = match self.event_type.as_str() {
            "message" => {
                let message = self.message?;
                match message.message_type.as_str() {
                    "text" => InboundKind::Text(message.text?),
                    "image" => InboundKind::Image {
                        message_id: message.id,
                    },
                    _ => return None,
                }
            },
            "postback" => {
                let postback = self.postback?;
                InboundKind::Postback {
                    data: postback.data,
                    date: postback.params.date,
                }
            },
            _ => return None,
        };
        Some(InboundEvent {
            user_id,
            reply_token: self.reply_token,
            kind,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(body: &str) -> WebhookEnvelope {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn text_message_normalizes() {
        let envelope = parse(
            r#"{"events":[{"type":"message","replyToken":"rt1",
                "source":{"userId":"U123"},
                "message":{"id":"m1","type":"text","text":"pay"}}]}"#,
        );
        let event = envelope.events.into_iter().next().unwrap().normalize().unwrap();
        assert_eq!(event.user_id, "U123");
        assert_eq!(event.reply_token.as_deref(), Some("rt1"));
        assert_eq!(event.kind, InboundKind::Text("pay".into()));
    }

    #[test]
    fn image_message_carries_id_only() {
        let envelope = parse(
            r#"{"events":[{"type":"message","replyToken":"rt1",
                "source":{"userId":"U123"},
                "message":{"id":"m42","type":"image"}}]}"#,
        );
        let event = envelope.events.into_iter().next().unwrap().normalize().unwrap();
        assert_eq!(event.kind, InboundKind::Image {
            message_id: "m42".into()
        });
    }

    #[test]
    fn postback_with_picked_date() {
        let envelope = parse(
            r#"{"events":[{"type":"postback","replyToken":"rt1",
                "source":{"userId":"U123"},
                "postback":{"data":"TENANT_MOVEOUT_DATE","params":{"date":"2026-09-30"}}}]}"#,
        );
        let event = envelope.events.into_iter().next().unwrap().normalize().unwrap();
        assert_eq!(event.kind, InboundKind::Postback {
            data: "TENANT_MOVEOUT_DATE".into(),
            date: Some("2026-09-30".into()),
        });
    }

    #[test]
    fn unhandled_events_drop_silently() {
        let envelope = parse(
            r#"{"events":[
                {"type":"follow","source":{"userId":"U1"}},
                {"type":"message","source":{"userId":"U2"},
                 "message":{"id":"m1","type":"sticker"}},
                {"type":"message","message":{"id":"m2","type":"text","text":"hi"}}
            ]}"#,
        );
        let normalized: Vec<_> = envelope
            .events
            .into_iter()
            .filter_map(WebhookEvent::normalize)
            .collect();
        assert!(normalized.is_empty());
    }

    #[test]
    fn empty_body_is_no_events() {
        let envelope = parse("{}");
        assert!(envelope.events.is_empty());
    }
}
