//! Event routing: live-flow continuation first, then global commands.

use {
    dormbot_channel::{InboundEvent, InboundKind},
    dormbot_sessions::{
        FlowKind, FlowSession, MaintenanceStep, PaymentStep, StaffMoveOutStep,
    },
    tracing::{debug, warn},
};

use crate::{
    Result,
    commands::{PostbackCommand, TextCommand, classify_text, parse_postback},
    engine::Engine,
};

const BUSY_HINT: &str = "first, or wait for it to time out.";

impl Engine {
    /// Entry point for one normalized webhook event. Never returns an error;
    /// failures degrade to a reply and a log line.
    pub async fn handle_event(&self, event: InboundEvent) {
        let user_id = event.user_id.clone();
        let reply_token = event.reply_token.clone();
        if let Err(e) = self.route(event).await {
            warn!(user_id = %user_id, error = %e, "event handling failed");
            self.respond(
                &user_id,
                reply_token.as_deref(),
                "Something went wrong on our side. Please try again.",
            )
            .await;
        }
    }

    async fn route(&self, event: InboundEvent) -> Result<()> {
        let user = event.user_id.as_str();
        let token = event.reply_token.as_deref();
        match event.kind {
            InboundKind::Image { ref message_id } => self.route_image(user, token, message_id).await,
            InboundKind::Text(ref text) => self.route_text(user, token, text).await,
            InboundKind::Postback { ref data, ref date } => {
                self.route_postback(user, token, data, date.as_deref()).await
            },
        }
    }

    /// Images go to the flow that is waiting for one; with no such flow the
    /// image is treated as a payment slip.
    async fn route_image(&self, user: &str, token: Option<&str>, message_id: &str) -> Result<()> {
        if let Some(FlowSession::StaffMoveOut(session)) =
            self.sessions.get(user, FlowKind::StaffMoveOut)
        {
            if matches!(
                session.step,
                StaffMoveOutStep::AwaitWaterImage | StaffMoveOutStep::AwaitElectricImage
            ) {
                return self.staff_moveout_image(user, token, message_id).await;
            }
        }
        if let Some(FlowSession::Maintenance(session)) =
            self.sessions.get(user, FlowKind::Maintenance)
        {
            if session.step == MaintenanceStep::AwaitImages {
                return self.maintenance_image(user, token, message_id).await;
            }
        }
        self.payment_slip(user, token, message_id).await
    }

    async fn route_text(&self, user: &str, token: Option<&str>, text: &str) -> Result<()> {
        // Continuations of live flows win over global commands.
        if self.sessions.get(user, FlowKind::TenantMoveOut).is_some() {
            return self.tenant_moveout_text(user, token, text).await;
        }
        if self.sessions.get(user, FlowKind::Maintenance).is_some() {
            return self.maintenance_text(user, token, text).await;
        }
        if let Some(FlowSession::Payment(session)) = self.sessions.get(user, FlowKind::Payment) {
            if session.step != PaymentStep::AwaitSlip
                && self.payment_nav_text(user, token, &session, text).await?
            {
                return Ok(());
            }
        }
        if let Some(FlowSession::StaffMoveOut(session)) =
            self.sessions.get(user, FlowKind::StaffMoveOut)
        {
            if self.staff_moveout_nav_text(user, token, &session, text).await? {
                return Ok(());
            }
        }

        let Some(command) = classify_text(text) else {
            debug!(user_id = %user, "unrecognized text, staying silent");
            return Ok(());
        };

        match command {
            TextCommand::Pay { period } => {
                if self.reject_if_busy(user, token, FlowKind::Payment).await {
                    return Ok(());
                }
                self.start_payment(user, token, period).await
            },
            TextCommand::MoveOut => {
                if self.reject_if_busy(user, token, FlowKind::TenantMoveOut).await {
                    return Ok(());
                }
                self.start_tenant_moveout(user, token).await
            },
            TextCommand::Maintenance => {
                if self.reject_if_busy(user, token, FlowKind::Maintenance).await {
                    return Ok(());
                }
                self.start_maintenance(user, token).await
            },
            TextCommand::StaffPayments => {
                if !self.roles.is_staff(user) {
                    self.respond(user, token, "That command is for dormitory staff.")
                        .await;
                    return Ok(());
                }
                if self.reject_if_busy(user, token, FlowKind::Payment).await {
                    return Ok(());
                }
                self.start_payment_browser(user, token).await
            },
            TextCommand::StaffCheckouts => {
                if !self.roles.is_staff(user) {
                    self.respond(user, token, "That command is for dormitory staff.")
                        .await;
                    return Ok(());
                }
                if self.reject_if_busy(user, token, FlowKind::StaffMoveOut).await {
                    return Ok(());
                }
                self.start_staff_moveout(user, token).await
            },
            TextCommand::IssueCode { phone } => {
                if !self.roles.is_staff(user) {
                    self.respond(user, token, "That command is for dormitory staff.")
                        .await;
                    return Ok(());
                }
                self.issue_link_code(user, token, &phone).await
            },
            TextCommand::Phone(phone) => {
                if self.reject_if_busy(user, token, FlowKind::Registration).await {
                    return Ok(());
                }
                self.phone_received(user, token, &phone).await
            },
            TextCommand::LinkCode(code) => self.redeem_link_code(user, token, &code).await,
        }
    }

    async fn route_postback(
        &self,
        user: &str,
        token: Option<&str>,
        data: &str,
        date: Option<&str>,
    ) -> Result<()> {
        let Some(command) = parse_postback(data) else {
            debug!(user_id = %user, data, "unknown postback key, staying silent");
            return Ok(());
        };

        match command {
            PostbackCommand::MoveOutDays(days) => {
                self.tenant_moveout_days(user, token, days).await
            },
            PostbackCommand::MoveOutDate => {
                self.tenant_moveout_picked_date(user, token, date).await
            },
            PostbackCommand::LinkAccept { user_id } => {
                self.link_decision(user, token, &user_id, true).await
            },
            PostbackCommand::LinkReject { user_id } => {
                self.link_decision(user, token, &user_id, false).await
            },
            PostbackCommand::PayBuilding { building_id } => {
                self.payment_pick_building(user, token, &building_id).await
            },
            PostbackCommand::PayFloor { building_id, floor } => {
                self.payment_pick_floor(user, token, &building_id, &floor).await
            },
            PostbackCommand::PayRoom { room_id } => {
                self.payment_pick_room(user, token, &room_id).await
            },
            PostbackCommand::PayBack => self.payment_back(user, token).await,
            PostbackCommand::MoBuilding { building_id } => {
                self.staff_moveout_pick_building(user, token, &building_id).await
            },
            PostbackCommand::MoFloor { building_id, floor } => {
                self.staff_moveout_pick_floor(user, token, &building_id, &floor).await
            },
            PostbackCommand::MoRoom { room_id } => {
                self.staff_moveout_pick_room(user, token, &room_id).await
            },
            PostbackCommand::MaintDone { request_id } => {
                self.maintenance_ack(user, token, &request_id, true).await
            },
            PostbackCommand::MaintNotDone { request_id } => {
                self.maintenance_ack(user, token, &request_id, false).await
            },
        }
    }

    /// Flow-entry gate: a live blocking session of a different kind rejects
    /// the new flow with guidance.
    async fn reject_if_busy(&self, user: &str, token: Option<&str>, kind: FlowKind) -> bool {
        match self.sessions.is_busy_with_other(user, kind) {
            Some(other) => {
                self.respond(
                    user,
                    token,
                    format!("Please finish your {other} {BUSY_HINT}"),
                )
                .await;
                true
            },
            None => false,
        }
    }
}
