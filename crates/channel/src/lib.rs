//! Channel abstraction: inbound webhook events, outbound message model,
//! and the send dispatcher.

pub mod error;
pub mod event;
pub mod message;
pub mod outbound;

pub use {
    error::{Error, Result},
    event::{InboundEvent, InboundKind, WebhookEnvelope, WebhookEvent},
    message::{Card, CardButton, OutboundMessage, QuickAction},
    outbound::{Dispatcher, Outbound, QuotaLedger},
};
