//! Process edge: configuration, the platform HTTP client, and the axum
//! server that feeds webhook events to the engine.

pub mod config;
mod env_subst;
pub mod error;
pub mod messenger;
pub mod server;

pub use {
    config::{Config, RolesConfig},
    error::{Error, Result},
    messenger::HttpMessenger,
    server::serve,
};
