//! Role resolution for staff and admin commands.

use std::{
    collections::HashSet,
    sync::RwLock,
};

use {
    dormbot_store::{AccountRole, DormStore},
    tracing::info,
};

use crate::Result;

/// Admin and staff membership, seeded from config and persisted accounts.
///
/// Membership only grows over a process lifetime; a revoked admin keeps
/// access until restart. There is deliberately no removal API.
#[derive(Debug, Default)]
pub struct RoleSet {
    admins: RwLock<HashSet<String>>,
    staff: RwLock<HashSet<String>>,
}

/// Case-fold and strip the platform's leading `U` so configured ids and
/// webhook ids compare equal regardless of form.
fn normalize(id: &str) -> String {
    let lower = id.trim().to_lowercase();
    match lower.strip_prefix('u') {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => lower,
    }
}

impl RoleSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_admin(&self, id: &str) {
        let mut admins = self.admins.write().unwrap_or_else(|e| e.into_inner());
        admins.insert(normalize(id));
    }

    pub fn add_staff(&self, id: &str) {
        let mut staff = self.staff.write().unwrap_or_else(|e| e.into_inner());
        staff.insert(normalize(id));
    }

    #[must_use]
    pub fn is_admin(&self, id: &str) -> bool {
        let admins = self.admins.read().unwrap_or_else(|e| e.into_inner());
        admins.contains(&normalize(id))
    }

    /// Admin implies staff.
    #[must_use]
    pub fn is_staff(&self, id: &str) -> bool {
        if self.is_admin(id) {
            return true;
        }
        let staff = self.staff.read().unwrap_or_else(|e| e.into_inner());
        staff.contains(&normalize(id))
    }

    /// One-time startup pass over persisted accounts: admin and owner
    /// accounts with a linked chat identity become admins, staff accounts
    /// become staff.
    pub async fn seed_from_store(&self, store: &dyn DormStore) -> Result<()> {
        let accounts = store.accounts().await?;
        let mut added = 0usize;
        for account in accounts {
            let Some(chat_user_id) = account.chat_user_id else {
                continue;
            };
            match account.role {
                AccountRole::Admin | AccountRole::Owner => self.add_admin(&chat_user_id),
                AccountRole::Staff => self.add_staff(&chat_user_id),
            }
            added += 1;
        }
        info!(accounts = added, "role sets seeded from store");
        Ok(())
    }
}
