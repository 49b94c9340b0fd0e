//! The conversational session engine: role resolution, command routing, and
//! the flow state machines.

pub mod access;
pub mod commands;
pub mod engine;
pub mod error;
mod flows;
mod router;

#[cfg(test)]
mod tests;

pub use {
    access::RoleSet,
    commands::{PostbackCommand, TextCommand, classify_text, parse_postback},
    engine::Engine,
    error::{Error, Result},
};
