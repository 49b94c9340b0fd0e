//! Engine wiring: shared state and helpers used by every flow handler.

use std::sync::Arc;

use {
    async_trait::async_trait,
    dormbot_channel::{Dispatcher, OutboundMessage},
    dormbot_media::{ContentSource, MediaIngest},
    dormbot_sessions::{
        ExpiryNotify, FlowKind, LinkCodes, LinkRequests, PaymentContexts, SessionStore,
    },
    dormbot_store::{Building, Contract, DormStore, Room},
    dormbot_verify::SlipVerifier,
    tracing::warn,
};

use crate::{Result, access::RoleSet};

/// The conversational session engine. One instance serves every user; all
/// per-user state lives in the session maps.
pub struct Engine {
    pub(crate) store: Arc<dyn DormStore>,
    pub(crate) sessions: SessionStore,
    pub(crate) contexts: PaymentContexts,
    pub(crate) link_requests: LinkRequests,
    pub(crate) link_codes: LinkCodes,
    pub(crate) roles: Arc<RoleSet>,
    pub(crate) media: MediaIngest,
    pub(crate) content: Arc<dyn ContentSource>,
    pub(crate) verifier: Arc<dyn SlipVerifier>,
    pub(crate) dispatch: Dispatcher,
}

impl Engine {
    pub fn new(
        store: Arc<dyn DormStore>,
        roles: Arc<RoleSet>,
        media: MediaIngest,
        content: Arc<dyn ContentSource>,
        verifier: Arc<dyn SlipVerifier>,
        dispatch: Dispatcher,
    ) -> Arc<Self> {
        let engine = Arc::new(Self {
            store,
            sessions: SessionStore::new(),
            contexts: PaymentContexts::new(),
            link_requests: LinkRequests::new(),
            link_codes: LinkCodes::new(),
            roles,
            media,
            content,
            verifier,
            dispatch: dispatch.clone(),
        });
        engine
            .sessions
            .set_notifier(Arc::new(ExpiryNotifier { dispatch }));
        engine
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// One-line text reply, push fallback included.
    pub(crate) async fn respond(
        &self,
        user_id: &str,
        reply_token: Option<&str>,
        text: impl Into<String>,
    ) {
        self.dispatch
            .respond(user_id, reply_token, vec![OutboundMessage::text(text)])
            .await;
    }

    pub(crate) async fn respond_with(
        &self,
        user_id: &str,
        reply_token: Option<&str>,
        messages: Vec<OutboundMessage>,
    ) {
        self.dispatch.respond(user_id, reply_token, messages).await;
    }

    /// The user's active contract, with its room and building. Direct tenant
    /// link wins; the room-contact proxy covers a payer who is not the tenant.
    pub(crate) async fn resolve_contract(
        &self,
        user_id: &str,
    ) -> Result<Option<(Contract, Room, Building)>> {
        if let Some(tenant) = self.store.tenant_by_chat_user(user_id).await? {
            if let Some(contract) = self
                .store
                .active_contracts_for_tenant(&tenant.id)
                .await?
                .into_iter()
                .next()
            {
                return self.with_room(contract).await;
            }
        }
        for room in self.store.rooms_with_contact(user_id).await? {
            if let Some(contract) = self.store.active_contract_for_room(&room.id).await? {
                return self.with_room(contract).await;
            }
        }
        Ok(None)
    }

    async fn with_room(&self, contract: Contract) -> Result<Option<(Contract, Room, Building)>> {
        let Some(room) = self.store.room(&contract.room_id).await? else {
            return Ok(None);
        };
        let Some(building) = self.store.building(&room.building_id).await? else {
            return Ok(None);
        };
        Ok(Some((contract, room, building)))
    }

    pub(crate) async fn room_label(&self, room: &Room) -> String {
        match self.store.building(&room.building_id).await {
            Ok(Some(building)) => room.label(&building.name),
            _ => room.label("?"),
        }
    }

    /// Push the same messages to every admin account with a linked identity.
    pub(crate) async fn push_to_admins(&self, messages: Vec<OutboundMessage>) {
        let accounts = match self.store.accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!(error = %e, "admin lookup failed, notification dropped");
                return;
            },
        };
        for account in accounts {
            let is_admin = matches!(
                account.role,
                dormbot_store::AccountRole::Admin | dormbot_store::AccountRole::Owner
            );
            if let (true, Some(chat_user_id)) = (is_admin, account.chat_user_id) {
                self.dispatch.push(&chat_user_id, messages.clone()).await;
            }
        }
    }
}

/// Pushes a timeout notice when a blocking-flow session expires.
/// Acknowledgment windows lapse silently.
struct ExpiryNotifier {
    dispatch: Dispatcher,
}

#[async_trait]
impl ExpiryNotify for ExpiryNotifier {
    async fn session_expired(&self, user_id: &str, kind: FlowKind) {
        if kind == FlowKind::MaintenanceAck {
            return;
        }
        let text = format!("Your {kind} session timed out. Start again whenever you are ready.");
        self.dispatch
            .push(user_id, vec![OutboundMessage::text(text)])
            .await;
    }
}
