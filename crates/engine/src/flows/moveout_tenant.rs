//! Tenant move-out notice: plan (preset days, end of month, or picked date)
//! followed by a free-text reason.

use {
    chrono::{Duration as ChronoDuration, Utc},
    dormbot_channel::{OutboundMessage, QuickAction},
    dormbot_sessions::{
        FLOW_TTL, FlowKind, FlowSession, TenantMoveOutSession, TenantMoveOutStep,
    },
    dormbot_store::NewMaintenanceRequest,
    tracing::info,
};

use crate::{Result, engine::Engine};

pub(crate) const MOVEOUT_TITLE: &str = "Move-out notice";

const END_OF_MONTH: &str = "end of month";
const PLAN_PROMPT: &str =
    "When do you plan to move out? Pick an option, type a number of days, or \"end of month\".";

impl Engine {
    pub(crate) async fn start_tenant_moveout(&self, user: &str, token: Option<&str>) -> Result<()> {
        let Some((contract, room, building)) = self.resolve_contract(user).await? else {
            self.respond(user, token, "No active contract is linked to your account.").await;
            return Ok(());
        };
        let label = room.label(&building.name);
        self.sessions.start(
            user,
            FlowSession::TenantMoveOut(TenantMoveOutSession::new(&contract.id, &label)),
            FLOW_TTL,
        );
        self.respond_with(user, token, vec![plan_menu()]).await;
        Ok(())
    }

    /// Text while a move-out session is live: a plan, then a reason.
    pub(crate) async fn tenant_moveout_text(
        &self,
        user: &str,
        token: Option<&str>,
        text: &str,
    ) -> Result<()> {
        let Some(FlowSession::TenantMoveOut(session)) =
            self.sessions.get(user, FlowKind::TenantMoveOut)
        else {
            return Ok(());
        };
        match session.step {
            TenantMoveOutStep::AwaitPlan => match parse_plan(text) {
                Some(plan) => self.accept_plan(user, token, plan).await,
                // Invalid input re-prompts without advancing the step.
                None => {
                    self.respond_with(user, token, vec![plan_menu()]).await;
                    Ok(())
                },
            },
            TenantMoveOutStep::AwaitReason => {
                self.finish_tenant_moveout(user, token, &session, text.trim()).await
            },
        }
    }

    /// `MOVEOUT_DAYS=n` preset.
    pub(crate) async fn tenant_moveout_days(
        &self,
        user: &str,
        token: Option<&str>,
        days: u32,
    ) -> Result<()> {
        if !self.awaiting_plan(user) {
            self.respond(user, token, "Type \"move out\" to start a move-out notice.").await;
            return Ok(());
        }
        self.accept_plan(user, token, date_in_days(days)).await
    }

    /// `TENANT_MOVEOUT_DATE` with a calendar result.
    pub(crate) async fn tenant_moveout_picked_date(
        &self,
        user: &str,
        token: Option<&str>,
        date: Option<&str>,
    ) -> Result<()> {
        if !self.awaiting_plan(user) {
            self.respond(user, token, "Type \"move out\" to start a move-out notice.").await;
            return Ok(());
        }
        match date {
            Some(date) => self.accept_plan(user, token, date.to_string()).await,
            None => {
                self.respond_with(user, token, vec![plan_menu()]).await;
                Ok(())
            },
        }
    }

    async fn accept_plan(&self, user: &str, token: Option<&str>, plan: String) -> Result<()> {
        let advanced = self.sessions.update(user, FlowKind::TenantMoveOut, |s| {
            if let FlowSession::TenantMoveOut(m) = s {
                m.planned_date = Some(plan.clone());
                m.step = TenantMoveOutStep::AwaitReason;
            }
        });
        if !advanced {
            // Session expired under us; normal abort.
            return Ok(());
        }
        self.respond(
            user,
            token,
            format!("Noted: {plan}. What is the reason for moving out?"),
        )
        .await;
        Ok(())
    }

    async fn finish_tenant_moveout(
        &self,
        user: &str,
        token: Option<&str>,
        session: &TenantMoveOutSession,
        reason: &str,
    ) -> Result<()> {
        let Some(contract) = self.store.contract(&session.contract_id).await? else {
            self.sessions.clear(user, FlowKind::TenantMoveOut);
            self.respond(user, token, "Your contract could not be found.").await;
            return Ok(());
        };
        let planned = session.planned_date.as_deref().unwrap_or(END_OF_MONTH);
        let description = format!(
            "Room: {}\nPlanned date: {planned}\nReason: {reason}",
            session.room_label
        );
        let request = self
            .store
            .insert_maintenance_request(NewMaintenanceRequest {
                room_id: contract.room_id,
                contract_id: Some(contract.id),
                title: MOVEOUT_TITLE.to_string(),
                description,
                reported_by: user.to_string(),
            })
            .await?;
        info!(user_id = %user, request_id = %request.id, "move-out notice recorded");

        self.sessions.clear(user, FlowKind::TenantMoveOut);
        self.respond(
            user,
            token,
            "Your move-out notice is recorded. Staff will contact you about the checkout.",
        )
        .await;

        let notice = format!(
            "Move-out notice for room {}: {planned}. Reason: {reason}",
            session.room_label
        );
        if let Ok(staff) = self.store.notify_staff_accounts().await {
            for account in staff {
                if let Some(chat_user_id) = account.chat_user_id {
                    self.dispatch
                        .push(&chat_user_id, vec![OutboundMessage::text(notice.clone())])
                        .await;
                }
            }
        }
        Ok(())
    }

    fn awaiting_plan(&self, user: &str) -> bool {
        matches!(
            self.sessions.get(user, FlowKind::TenantMoveOut),
            Some(FlowSession::TenantMoveOut(TenantMoveOutSession {
                step: TenantMoveOutStep::AwaitPlan,
                ..
            }))
        )
    }
}

fn plan_menu() -> OutboundMessage {
    OutboundMessage::with_quick_replies(PLAN_PROMPT, vec![
        QuickAction::postback("In 7 days", "MOVEOUT_DAYS=7"),
        QuickAction::postback("In 15 days", "MOVEOUT_DAYS=15"),
        QuickAction::postback("In 30 days", "MOVEOUT_DAYS=30"),
        QuickAction::send_text("End of month", END_OF_MONTH),
        QuickAction::date_picker("Pick a date", "TENANT_MOVEOUT_DATE"),
    ])
}

/// A plan is a day count ("7", "in 7 days"), the end-of-month phrase, or
/// nothing recognizable.
fn parse_plan(text: &str) -> Option<String> {
    let lower = text.trim().to_lowercase();
    if lower == END_OF_MONTH {
        return Some(END_OF_MONTH.to_string());
    }
    let digits: String = lower.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() || !lower.chars().all(|c| c.is_ascii_digit() || c.is_whitespace() || c.is_ascii_alphabetic()) {
        return None;
    }
    let days: u32 = digits.parse().ok()?;
    if (1..=365).contains(&days) {
        Some(date_in_days(days))
    } else {
        None
    }
}

fn date_in_days(days: u32) -> String {
    (Utc::now() + ChronoDuration::days(i64::from(days)))
        .format("%Y-%m-%d")
        .to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn end_of_month_phrase_is_a_plan() {
        assert_eq!(parse_plan(" End of Month "), Some(END_OF_MONTH.to_string()));
    }

    #[test]
    fn day_counts_become_dates() {
        let plan = parse_plan("in 7 days").unwrap();
        assert_eq!(plan.len(), 10);
        assert_eq!(parse_plan("15").unwrap().len(), 10);
    }

    #[test]
    fn junk_is_not_a_plan() {
        assert!(parse_plan("someday").is_none());
        assert!(parse_plan("999").is_none());
        assert!(parse_plan("").is_none());
    }
}
