//! Per-user conversational session state.
//!
//! Each live flow is one entry keyed by (user id, flow kind) with its own
//! single-shot expiry timer. The [`flow::FlowSession`] enum makes a session
//! without a step unrepresentable: every variant embeds a mandatory step enum.

pub mod error;
pub mod flow;
pub mod linking;
pub mod store;

pub use {
    error::{Error, Result},
    flow::{
        ACK_TTL, FLOW_TTL, FlowKind, FlowSession, MaintenanceAckSession, MaintenanceAckStep,
        MaintenanceSession, MaintenanceStep, PaymentSession, PaymentStep, RegistrationSession,
        RegistrationStep, StaffMoveOutSession, StaffMoveOutStep, TenantMoveOutSession,
        TenantMoveOutStep,
    },
    linking::{LinkCodes, LinkRedeem, LinkRequest, LinkRequests},
    store::{ExpiryNotify, PaymentContexts, PaymentTarget, SessionStore},
};
