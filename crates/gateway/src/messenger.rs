//! HTTP client for the messaging platform: sends replies and pushes,
//! fetches message content.

use {
    async_trait::async_trait,
    dormbot_channel::{Outbound, OutboundMessage, QuickAction},
    dormbot_media::ContentSource,
    secrecy::{ExposeSecret, Secret},
    serde_json::{Value, json},
    tracing::debug,
};

pub struct HttpMessenger {
    client: reqwest::Client,
    api_base: String,
    access_token: Secret<String>,
}

impl HttpMessenger {
    #[must_use]
    pub fn new(api_base: impl Into<String>, access_token: Secret<String>) -> Self {
        let mut api_base = api_base.into();
        while api_base.ends_with('/') {
            api_base.pop();
        }
        Self {
            client: reqwest::Client::new(),
            api_base,
            access_token,
        }
    }

    async fn post(&self, path: &str, body: Value) -> dormbot_channel::Result<()> {
        let response = self
            .client
            .post(format!("{}{path}", self.api_base))
            .bearer_auth(self.access_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| dormbot_channel::Error::message(format!("send failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(dormbot_channel::Error::message(format!(
                "platform returned {status}: {text}"
            )));
        }
        debug!(path, "message sent");
        Ok(())
    }
}

#[async_trait]
impl Outbound for HttpMessenger {
    async fn reply(
        &self,
        reply_token: &str,
        messages: Vec<OutboundMessage>,
    ) -> dormbot_channel::Result<()> {
        self.post("/messages/reply", json!({
            "replyToken": reply_token,
            "messages": to_wire(&messages),
        }))
        .await
    }

    async fn push(
        &self,
        user_id: &str,
        messages: Vec<OutboundMessage>,
    ) -> dormbot_channel::Result<()> {
        self.post("/messages/push", json!({
            "to": user_id,
            "messages": to_wire(&messages),
        }))
        .await
    }
}

#[async_trait]
impl ContentSource for HttpMessenger {
    async fn fetch(&self, message_id: &str) -> dormbot_media::Result<Vec<u8>> {
        let response = self
            .client
            .get(format!("{}/content/{message_id}", self.api_base))
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| dormbot_media::Error::message(format!("content fetch failed: {e}")))?;
        if !response.status().is_success() {
            return Err(dormbot_media::Error::message(format!(
                "content fetch returned {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| dormbot_media::Error::message(format!("content read failed: {e}")))?;
        Ok(bytes.to_vec())
    }
}

/// Platform wire format for a message batch.
fn to_wire(messages: &[OutboundMessage]) -> Value {
    Value::Array(messages.iter().map(message_to_wire).collect())
}

fn message_to_wire(message: &OutboundMessage) -> Value {
    match message {
        OutboundMessage::Text(text) => json!({ "type": "text", "text": text }),
        OutboundMessage::TextWithQuickReplies { text, actions } => json!({
            "type": "text",
            "text": text,
            "quickReply": { "items": actions.iter().map(action_to_wire).collect::<Vec<_>>() },
        }),
        OutboundMessage::Card(card) => json!({
            "type": "template",
            "altText": card.title,
            "template": {
                "type": "buttons",
                "title": card.title,
                "text": card.body,
                "actions": card
                    .buttons
                    .iter()
                    .map(|b| action_to_wire(&b.action))
                    .collect::<Vec<_>>(),
            },
        }),
    }
}

fn action_to_wire(action: &QuickAction) -> Value {
    match action {
        QuickAction::SendText { label, text } => json!({
            "type": "action",
            "action": { "type": "message", "label": label, "text": text },
        }),
        QuickAction::Postback { label, data } => json!({
            "type": "action",
            "action": { "type": "postback", "label": label, "data": data },
        }),
        QuickAction::DatePicker { label, data } => json!({
            "type": "action",
            "action": { "type": "datetimepicker", "label": label, "data": data, "mode": "date" },
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reply_posts_wire_format_with_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/messages/reply")
            .match_header("authorization", "Bearer tok")
            .match_body(mockito::Matcher::PartialJson(json!({
                "replyToken": "rt1",
                "messages": [{ "type": "text", "text": "hi" }],
            })))
            .with_status(200)
            .create_async()
            .await;

        let messenger = HttpMessenger::new(server.url(), Secret::new("tok".to_string()));
        messenger
            .reply("rt1", vec![OutboundMessage::text("hi")])
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn failed_push_surfaces_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/messages/push")
            .with_status(429)
            .with_body("quota exceeded")
            .create_async()
            .await;

        let messenger = HttpMessenger::new(server.url(), Secret::new("tok".to_string()));
        let err = messenger
            .push("U1", vec![OutboundMessage::text("hi")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn content_fetch_returns_bytes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/content/m42")
            .with_status(200)
            .with_body(vec![1u8, 2, 3])
            .create_async()
            .await;

        let messenger = HttpMessenger::new(server.url(), Secret::new("tok".to_string()));
        let bytes = messenger.fetch("m42").await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[test]
    fn card_serializes_to_button_template() {
        let card = dormbot_channel::Card::new("Link request", "Ploy (0812345678)")
            .button("Approve", QuickAction::postback("Approve", "LINK_ACCEPT=U1"));
        let wire = message_to_wire(&OutboundMessage::Card(card));
        assert_eq!(wire["type"], "template");
        assert_eq!(wire["template"]["actions"][0]["action"]["data"], "LINK_ACCEPT=U1");
    }
}
