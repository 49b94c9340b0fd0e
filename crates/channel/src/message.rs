//! Outbound message model, serialized to the platform wire format by the
//! gateway messenger.

use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub enum OutboundMessage {
    Text(String),
    TextWithQuickReplies {
        text: String,
        actions: Vec<QuickAction>,
    },
    Card(Card),
}

impl OutboundMessage {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    #[must_use]
    pub fn with_quick_replies(text: impl Into<String>, actions: Vec<QuickAction>) -> Self {
        Self::TextWithQuickReplies {
            text: text.into(),
            actions,
        }
    }
}

/// One tappable quick-reply chip under a message.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub enum QuickAction {
    /// Sends the given text back as if the user typed it.
    SendText { label: String, text: String },
    /// Fires a postback event carrying `data`.
    Postback { label: String, data: String },
    /// Opens the platform date picker; the picked date arrives as a
    /// postback with `data` plus a date param.
    DatePicker { label: String, data: String },
}

impl QuickAction {
    #[must_use]
    pub fn send_text(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self::SendText {
            label: label.into(),
            text: text.into(),
        }
    }

    #[must_use]
    pub fn postback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Postback {
            label: label.into(),
            data: data.into(),
        }
    }

    #[must_use]
    pub fn date_picker(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self::DatePicker {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// A button card (approval cards, maintenance notifications).
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Card {
    pub title: String,
    pub body: String,
    pub buttons: Vec<CardButton>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CardButton {
    pub label: String,
    pub action: QuickAction,
}

impl Card {
    #[must_use]
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            buttons: Vec::new(),
        }
    }

    #[must_use]
    pub fn button(mut self, label: impl Into<String>, action: QuickAction) -> Self {
        self.buttons.push(CardButton {
            label: label.into(),
            action,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_builder_keeps_button_order() {
        let card = Card::new("Link request", "0812345678")
            .button("Accept", QuickAction::postback("Accept", "LINK_ACCEPT=U1"))
            .button("Reject", QuickAction::postback("Reject", "LINK_REJECT=U1"));
        assert_eq!(card.buttons.len(), 2);
        assert_eq!(card.buttons[0].label, "Accept");
        assert_eq!(card.buttons[1].label, "Reject");
    }
}
