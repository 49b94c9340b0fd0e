//! Account linking: admin-approved phone requests and staff-issued codes.

use {
    dormbot_channel::{Card, OutboundMessage, QuickAction},
    dormbot_sessions::{
        FLOW_TTL, FlowKind, FlowSession, LinkRedeem, RegistrationSession, RegistrationStep,
    },
    tracing::info,
};

use crate::{Result, engine::Engine};

impl Engine {
    /// A bare phone number from an unlinked user opens a link request.
    pub(crate) async fn phone_received(
        &self,
        user: &str,
        token: Option<&str>,
        phone: &str,
    ) -> Result<()> {
        if self.store.tenant_by_chat_user(user).await?.is_some() {
            // Already linked; a stray phone number means nothing.
            return Ok(());
        }
        let Some(tenant) = self.store.tenant_by_phone(phone).await? else {
            self.respond(user, token, "No tenant with that phone number was found.").await;
            return Ok(());
        };
        if tenant.chat_user_id.is_some() {
            self.respond(user, token, "That tenant is already linked to another account.").await;
            return Ok(());
        }

        self.link_requests.submit(user, phone, &tenant.id);
        self.sessions.start(
            user,
            FlowSession::Registration(RegistrationSession {
                phone: phone.to_string(),
                tenant_id: tenant.id.clone(),
                step: RegistrationStep::AwaitApproval,
            }),
            FLOW_TTL,
        );

        let room_line = match self
            .store
            .active_contracts_for_tenant(&tenant.id)
            .await?
            .into_iter()
            .next()
        {
            Some(contract) => match self.store.room(&contract.room_id).await? {
                Some(room) => format!("\nRoom {}", self.room_label(&room).await),
                None => String::new(),
            },
            None => String::new(),
        };
        let card = Card::new(
            "Account link request",
            format!("{} ({phone}){room_line}", tenant.name),
        )
        .button("Approve", QuickAction::postback("Approve", format!("LINK_ACCEPT={user}")))
        .button("Reject", QuickAction::postback("Reject", format!("LINK_REJECT={user}")));
        self.push_to_admins(vec![OutboundMessage::Card(card)]).await;

        self.respond(user, token, "Request sent. An admin will review it shortly.").await;
        Ok(())
    }

    /// `LINK_ACCEPT` / `LINK_REJECT` from an admin card.
    pub(crate) async fn link_decision(
        &self,
        actor: &str,
        token: Option<&str>,
        requester_id: &str,
        accept: bool,
    ) -> Result<()> {
        if !self.roles.is_admin(actor) {
            self.respond(actor, token, "Only an admin can act on link requests.").await;
            return Ok(());
        }
        let Some(request) = self.link_requests.resolve(requester_id) else {
            self.respond(actor, token, "That request was already handled.").await;
            return Ok(());
        };
        self.sessions.clear(requester_id, FlowKind::Registration);

        if accept {
            self.store.link_chat_user(&request.tenant_id, requester_id).await?;
            info!(tenant_id = %request.tenant_id, user_id = %requester_id, "account linked");
            self.dispatch
                .push(
                    requester_id,
                    vec![OutboundMessage::text("Your account is now linked. Welcome!")],
                )
                .await;
            self.respond(actor, token, format!("Linked {} to the tenant account.", request.phone))
                .await;
        } else {
            self.dispatch
                .push(
                    requester_id,
                    vec![OutboundMessage::text("Your link request was declined.")],
                )
                .await;
            self.respond(actor, token, "Request rejected.").await;
        }
        Ok(())
    }

    /// `code <phone>` (staff): mint a one-time link code for the tenant.
    pub(crate) async fn issue_link_code(
        &self,
        user: &str,
        token: Option<&str>,
        phone: &str,
    ) -> Result<()> {
        let Some(tenant) = self.store.tenant_by_phone(phone).await? else {
            self.respond(user, token, "No tenant with that phone number was found.").await;
            return Ok(());
        };
        let code = self.link_codes.issue(&tenant.id, phone);
        self.respond(
            user,
            token,
            format!("Link code for {phone}: {code} (valid for 5 minutes)."),
        )
        .await;
        Ok(())
    }

    /// A six-digit code redeems a staff-issued link code immediately, no
    /// admin approval involved.
    pub(crate) async fn redeem_link_code(
        &self,
        user: &str,
        token: Option<&str>,
        code: &str,
    ) -> Result<()> {
        if self.store.tenant_by_chat_user(user).await?.is_some() {
            return Ok(());
        }
        match self.link_codes.redeem(code) {
            LinkRedeem::Accepted { tenant_id, .. } => {
                self.store.link_chat_user(&tenant_id, user).await?;
                self.sessions.clear(user, FlowKind::Registration);
                info!(tenant_id = %tenant_id, user_id = %user, "account linked via code");
                self.respond(user, token, "Your account is now linked. Welcome!").await;
            },
            LinkRedeem::Expired => {
                self.respond(user, token, "That code has expired. Ask staff for a new one.").await;
            },
            LinkRedeem::Unknown => {
                self.respond(user, token, "That code is not valid.").await;
            },
        }
        Ok(())
    }
}
