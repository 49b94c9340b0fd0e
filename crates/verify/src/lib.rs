//! Payment-slip verification against the external verifier service.

pub mod error;
pub mod verdict;
pub mod verifier;

pub use {
    error::{Error, Result},
    verdict::{DUPLICATE_CODE, Verdict, extract_verdict},
    verifier::{HttpSlipVerifier, SlipPayload, SlipVerifier},
};
