//! Account-linking state: pending admin approvals and staff-issued codes.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use {rand::Rng, tracing::debug};

/// Staff-issued link codes stay redeemable this long.
pub const CODE_TTL: Duration = Duration::from_secs(300);

/// A tenant's request to bind their chat account, waiting on admin approval.
#[derive(Debug, Clone)]
pub struct LinkRequest {
    pub user_id: String,
    pub phone: String,
    pub tenant_id: String,
    pub requested_at: Instant,
}

/// Pending link requests keyed by requesting chat user. A user holds at most
/// one pending request; re-submitting replaces it.
#[derive(Clone, Default)]
pub struct LinkRequests {
    pending: Arc<Mutex<HashMap<String, LinkRequest>>>,
}

impl LinkRequests {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&self, user_id: &str, phone: &str, tenant_id: &str) {
        let request = LinkRequest {
            user_id: user_id.to_string(),
            phone: phone.to_string(),
            tenant_id: tenant_id.to_string(),
            requested_at: Instant::now(),
        };
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.insert(user_id.to_string(), request);
    }

    #[must_use]
    pub fn get(&self, user_id: &str) -> Option<LinkRequest> {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.get(user_id).cloned()
    }

    /// Remove and return the pending request, if any. Called on both accept
    /// and reject; a second admin acting on the same card gets `None`.
    pub fn resolve(&self, user_id: &str) -> Option<LinkRequest> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.remove(user_id)
    }
}

struct CodeEntry {
    tenant_id: String,
    phone: String,
    expires_at: Instant,
}

/// Outcome of redeeming a link code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkRedeem {
    /// Code valid; bind the redeeming chat user to this tenant.
    Accepted { tenant_id: String, phone: String },
    /// Unknown or already-redeemed code.
    Unknown,
    /// Code existed but its window has passed.
    Expired,
}

/// Six-digit one-shot codes minted by staff for a tenant. Redeeming consumes
/// the code; expired entries are evicted lazily on access.
#[derive(Clone, Default)]
pub struct LinkCodes {
    codes: Arc<Mutex<HashMap<String, CodeEntry>>>,
}

impl LinkCodes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh code for the tenant. Any earlier code for the same tenant
    /// is invalidated.
    pub fn issue(&self, tenant_id: &str, phone: &str) -> String {
        let code = format!("{:06}", rand::rng().random_range(0..1_000_000u32));
        let mut codes = self.codes.lock().unwrap_or_else(|e| e.into_inner());
        codes.retain(|_, entry| entry.tenant_id != tenant_id);
        codes.insert(code.clone(), CodeEntry {
            tenant_id: tenant_id.to_string(),
            phone: phone.to_string(),
            expires_at: Instant::now() + CODE_TTL,
        });
        debug!(tenant_id, "link code issued");
        code
    }

    pub fn redeem(&self, code: &str) -> LinkRedeem {
        let mut codes = self.codes.lock().unwrap_or_else(|e| e.into_inner());
        match codes.remove(code) {
            Some(entry) if entry.expires_at > Instant::now() => LinkRedeem::Accepted {
                tenant_id: entry.tenant_id,
                phone: entry.phone,
            },
            Some(_) => LinkRedeem::Expired,
            None => LinkRedeem::Unknown,
        }
    }

    pub fn evict_expired(&self) {
        let now = Instant::now();
        let mut codes = self.codes.lock().unwrap_or_else(|e| e.into_inner());
        codes.retain(|_, entry| entry.expires_at > now);
    }
}
