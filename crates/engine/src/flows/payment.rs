//! Rent payment: tenant slip upload and the staff room drill-down.

use std::time::Duration;

use {
    dormbot_sessions::{FLOW_TTL, FlowSession, PaymentSession, PaymentStep, PaymentTarget},
    dormbot_store::{Invoice, NewPayment, PaymentStatus},
    dormbot_verify::{SlipPayload, Verdict},
    tracing::{info, warn},
};

use crate::{Result, engine::Engine};

/// Delay before the verdict push, so it lands after the synchronous reply.
const VERDICT_PUSH_DELAY: Duration = Duration::from_secs(1);

/// Amount tolerance when matching an invoice to a verified transfer.
const AMOUNT_TOLERANCE: f64 = 1.0;

const SLIP_SAVE_FAILED: &str = "Could not save your slip. Please send it again.";
const VERIFIER_DOWN: &str =
    "The verification service is unavailable right now. Please try again in a moment.";
const SLIP_INVALID: &str = "The slip could not be verified. Check the image and send it again.";
const SLIP_DUPLICATE: &str = "This slip was already submitted. No new payment was recorded.";

impl Engine {
    /// `pay [MM/YYYY]` from a tenant or room contact.
    pub(crate) async fn start_payment(
        &self,
        user: &str,
        token: Option<&str>,
        period: Option<(u32, i32)>,
    ) -> Result<()> {
        let Some((contract, room, building)) = self.resolve_contract(user).await? else {
            self.respond(
                user,
                token,
                "No active contract is linked to your account. Send your phone number to link it first.",
            )
            .await;
            return Ok(());
        };

        let unpaid = self.store.unpaid_invoices_for_contract(&contract.id).await?;
        let invoice = match period {
            Some((month, year)) => {
                match unpaid.iter().find(|i| i.month == month && i.year == year) {
                    Some(invoice) => invoice.clone(),
                    None => {
                        self.respond(
                            user,
                            token,
                            format!("No unpaid invoice for {month:02}/{year}."),
                        )
                        .await;
                        return Ok(());
                    },
                }
            },
            None => match unpaid.into_iter().next() {
                Some(invoice) => invoice,
                None => {
                    self.respond(
                        user,
                        token,
                        format!("Nothing to pay. Room {} has no unpaid invoices.", room.label(&building.name)),
                    )
                    .await;
                    return Ok(());
                },
            },
        };

        let remaining = self.invoice_remaining(&invoice).await?;
        self.contexts.arm(
            user,
            PaymentTarget {
                invoice_id: invoice.id.clone(),
                contract_id: contract.id.clone(),
                explicit: period.is_some(),
            },
            FLOW_TTL,
        );
        self.sessions
            .start(user, FlowSession::Payment(PaymentSession::await_slip()), FLOW_TTL);

        self.respond(
            user,
            token,
            format!(
                "Invoice {} for room {}: {remaining:.2} due. Send your payment slip as an image within 3 minutes.",
                invoice.period(),
                room.label(&building.name),
            ),
        )
        .await;
        Ok(())
    }

    /// An uploaded image with no flow waiting for one: treat it as a slip.
    pub(crate) async fn payment_slip(
        &self,
        user: &str,
        token: Option<&str>,
        message_id: &str,
    ) -> Result<()> {
        self.respond(user, token, "Checking your slip...").await;

        let saved = match self.media.save_image(self.content.as_ref(), message_id).await {
            Ok(saved) => saved,
            Err(e) => {
                warn!(user_id = %user, error = %e, "slip download failed");
                self.dispatch
                    .push(user, vec![dormbot_channel::OutboundMessage::text(SLIP_SAVE_FAILED)])
                    .await;
                return Ok(());
            },
        };

        let context = self.contexts.get(user);
        let mut target: Option<Invoice> = match &context {
            Some(ctx) => self.store.invoice(&ctx.invoice_id).await?,
            None => None,
        };
        let expected = match &target {
            Some(invoice) => Some(self.invoice_remaining(invoice).await?),
            None => None,
        };

        let mut verdict = match self
            .verifier
            .verify(SlipPayload::Url(saved.url.clone()), expected)
            .await
        {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(user_id = %user, error = %e, "verifier call failed");
                self.push_verdict(user, VERIFIER_DOWN.to_string());
                return Ok(());
            },
        };

        // Fallback chain for a failed amount-bound verification. Precedence:
        // explicit context, then amount match scoped to the selected contract
        // or the user's own, then (staff only) any unpaid invoice. Reordering
        // this changes which invoice silently receives a payment.
        let explicit = context.as_ref().is_some_and(|c| c.explicit);
        if !verdict.ok && !verdict.duplicate && !explicit {
            match self
                .verifier
                .verify(SlipPayload::Url(saved.url.clone()), None)
                .await
            {
                Ok(retry) if retry.ok => {
                    if let Some(amount) = retry.amount {
                        if let Some(matched) =
                            self.match_invoice_by_amount(user, context.as_ref(), amount).await?
                        {
                            target = Some(matched);
                        }
                    }
                    verdict = retry;
                },
                Ok(_) => {},
                Err(e) => {
                    warn!(user_id = %user, error = %e, "verifier retry failed");
                },
            }
        }

        let Some(invoice) = target else {
            self.push_verdict(
                user,
                "I couldn't match this slip to an invoice. Type \"pay\" to start a payment first."
                    .to_string(),
            );
            return Ok(());
        };

        let amount = match (verdict.amount, verdict.ok) {
            (Some(amount), _) => amount,
            (None, true) => expected.unwrap_or(invoice.total),
            (None, false) => 0.0,
        };
        let status = if verdict.ok {
            PaymentStatus::Verified
        } else {
            PaymentStatus::Unverified
        };
        self.store
            .insert_payment(NewPayment {
                invoice_id: invoice.id.clone(),
                amount,
                status,
                slip_url: saved.url,
                bank_ref: verdict.trans_ref.clone(),
            })
            .await?;

        let remaining = self.invoice_remaining(&invoice).await?;
        if verdict.ok && remaining <= AMOUNT_TOLERANCE {
            self.store
                .set_invoice_status(&invoice.id, dormbot_store::InvoiceStatus::Paid)
                .await?;
        }
        info!(
            user_id = %user,
            invoice_id = %invoice.id,
            ok = verdict.ok,
            duplicate = verdict.duplicate,
            amount,
            remaining,
            "slip processed"
        );

        self.push_verdict(user, self.verdict_copy(&verdict, &invoice, amount, remaining));

        if verdict.ok && remaining <= AMOUNT_TOLERANCE {
            self.sessions.clear(user, dormbot_sessions::FlowKind::Payment);
            self.contexts.clear(user);
        } else if verdict.duplicate {
            self.sessions.clear(user, dormbot_sessions::FlowKind::Payment);
        }
        // Invalid slips keep both session and context so a resend resumes.
        Ok(())
    }

    fn verdict_copy(&self, verdict: &Verdict, invoice: &Invoice, amount: f64, remaining: f64) -> String {
        if verdict.duplicate {
            return SLIP_DUPLICATE.to_string();
        }
        if !verdict.ok {
            return SLIP_INVALID.to_string();
        }
        if remaining <= AMOUNT_TOLERANCE {
            format!(
                "Payment of {amount:.2} confirmed. Invoice {} is now paid in full. Thank you!",
                invoice.period()
            )
        } else {
            format!(
                "Payment of {amount:.2} recorded. {remaining:.2} remains on invoice {}.",
                invoice.period()
            )
        }
    }

    fn push_verdict(&self, user: &str, text: String) {
        self.dispatch.push_later(
            user,
            vec![dormbot_channel::OutboundMessage::text(text)],
            VERDICT_PUSH_DELAY,
        );
    }

    /// Unpaid invoice whose total is within tolerance of the verified amount.
    /// Scope: the context's contract if one is armed, else the user's own
    /// contracts, else (staff only) every unpaid invoice.
    async fn match_invoice_by_amount(
        &self,
        user: &str,
        context: Option<&PaymentTarget>,
        amount: f64,
    ) -> Result<Option<Invoice>> {
        let matches = |i: &Invoice| (i.total - amount).abs() <= AMOUNT_TOLERANCE;

        if let Some(ctx) = context {
            let scoped = self.store.unpaid_invoices_for_contract(&ctx.contract_id).await?;
            if let Some(found) = scoped.into_iter().find(|i| matches(i)) {
                return Ok(Some(found));
            }
        }
        if let Some(tenant) = self.store.tenant_by_chat_user(user).await? {
            for contract in self.store.active_contracts_for_tenant(&tenant.id).await? {
                let unpaid = self.store.unpaid_invoices_for_contract(&contract.id).await?;
                if let Some(found) = unpaid.into_iter().find(|i| matches(i)) {
                    return Ok(Some(found));
                }
            }
        }
        if self.roles.is_staff(user) {
            let all = self.store.all_unpaid_invoices().await?;
            return Ok(all.into_iter().find(|i| matches(i)));
        }
        Ok(None)
    }

    pub(crate) async fn invoice_remaining(&self, invoice: &Invoice) -> Result<f64> {
        let paid: f64 = self
            .store
            .payments_for_invoice(&invoice.id)
            .await?
            .iter()
            .map(|p| p.amount)
            .sum();
        Ok(invoice.total - paid)
    }

    // ── Staff drill-down ────────────────────────────────────────────────────

    /// `payments` (staff): browse rooms to collect a payment in person.
    pub(crate) async fn start_payment_browser(&self, user: &str, token: Option<&str>) -> Result<()> {
        let menu = self.building_menu("PAY").await?;
        self.sessions.start(
            user,
            FlowSession::Payment(PaymentSession::drill_down()),
            FLOW_TTL,
        );
        self.respond_with(user, token, menu).await;
        Ok(())
    }

    pub(crate) async fn payment_pick_building(
        &self,
        user: &str,
        token: Option<&str>,
        building_id: &str,
    ) -> Result<()> {
        if !self.roles.is_staff(user) {
            self.respond(user, token, "That command is for dormitory staff.").await;
            return Ok(());
        }
        if self.payment_drill_down(user).is_none() {
            self.respond(user, token, "Type \"payments\" to start browsing rooms.").await;
            return Ok(());
        }
        if self.store.building(building_id).await?.is_none() {
            self.respond(user, token, "That building was not found.").await;
            return Ok(());
        }
        let Some(menu) = self.floor_menu(building_id, "PAY").await? else {
            self.respond(user, token, "That building has no rooms registered.").await;
            return Ok(());
        };
        self.sessions.update(user, dormbot_sessions::FlowKind::Payment, |s| {
            if let FlowSession::Payment(p) = s {
                p.building_id = Some(building_id.to_string());
                p.floor = None;
                p.room_id = None;
                p.step = PaymentStep::ChooseFloor;
            }
        });
        self.respond_with(user, token, menu).await;
        Ok(())
    }

    pub(crate) async fn payment_pick_floor(
        &self,
        user: &str,
        token: Option<&str>,
        building_id: &str,
        floor: &str,
    ) -> Result<()> {
        if !self.roles.is_staff(user) {
            self.respond(user, token, "That command is for dormitory staff.").await;
            return Ok(());
        }
        // Out-of-order postback: floor selection without the matching
        // building in session writes nothing.
        let parent_ok = self
            .payment_drill_down(user)
            .is_some_and(|p| p.building_id.as_deref() == Some(building_id));
        if !parent_ok {
            self.respond(user, token, "Pick a building first.").await;
            return Ok(());
        }
        let menu = self.room_menu(building_id, floor, "PAY").await?;
        self.sessions.update(user, dormbot_sessions::FlowKind::Payment, |s| {
            if let FlowSession::Payment(p) = s {
                p.floor = Some(floor.to_string());
                p.room_id = None;
                p.step = PaymentStep::ChooseRoom;
            }
        });
        self.respond_with(user, token, menu).await;
        Ok(())
    }

    pub(crate) async fn payment_pick_room(
        &self,
        user: &str,
        token: Option<&str>,
        room_id: &str,
    ) -> Result<()> {
        if !self.roles.is_staff(user) {
            self.respond(user, token, "That command is for dormitory staff.").await;
            return Ok(());
        }
        let parent_ok = self
            .payment_drill_down(user)
            .is_some_and(|p| p.building_id.is_some() && p.floor.is_some());
        if !parent_ok {
            self.respond(user, token, "Pick a building and floor first.").await;
            return Ok(());
        }
        let Some(room) = self.store.room(room_id).await? else {
            self.respond(user, token, "That room was not found.").await;
            return Ok(());
        };
        let label = self.room_label(&room).await;
        let Some(contract) = self.store.active_contract_for_room(room_id).await? else {
            self.respond(user, token, format!("Room {label} has no active contract.")).await;
            return Ok(());
        };
        let Some(invoice) = self
            .store
            .unpaid_invoices_for_contract(&contract.id)
            .await?
            .into_iter()
            .next()
        else {
            self.respond(user, token, format!("Room {label} has no unpaid invoices.")).await;
            return Ok(());
        };

        let remaining = self.invoice_remaining(&invoice).await?;
        self.contexts.arm(
            user,
            PaymentTarget {
                invoice_id: invoice.id.clone(),
                contract_id: contract.id,
                explicit: false,
            },
            FLOW_TTL,
        );
        self.sessions.update(user, dormbot_sessions::FlowKind::Payment, |s| {
            if let FlowSession::Payment(p) = s {
                p.room_id = Some(room_id.to_string());
                p.step = PaymentStep::AwaitSlip;
            }
        });
        self.respond(
            user,
            token,
            format!(
                "Room {label} owes {remaining:.2} for {}. Send the payment slip as an image.",
                invoice.period()
            ),
        )
        .await;
        Ok(())
    }

    /// `PAY_BACK`: one level up in the drill-down.
    pub(crate) async fn payment_back(&self, user: &str, token: Option<&str>) -> Result<()> {
        let Some(session) = self.payment_drill_down(user) else {
            return Ok(());
        };
        match session.step {
            PaymentStep::AwaitSlip | PaymentStep::ChooseRoom => {
                let (Some(building_id), true) = (session.building_id.clone(), session.floor.is_some())
                else {
                    return Ok(());
                };
                self.contexts.clear(user);
                let Some(menu) = self.floor_menu(&building_id, "PAY").await? else {
                    self.respond(user, token, "That building has no rooms registered.").await;
                    return Ok(());
                };
                self.sessions.update(user, dormbot_sessions::FlowKind::Payment, |s| {
                    if let FlowSession::Payment(p) = s {
                        p.floor = None;
                        p.room_id = None;
                        p.step = PaymentStep::ChooseFloor;
                    }
                });
                self.respond_with(user, token, menu).await;
            },
            PaymentStep::ChooseFloor => {
                let menu = self.building_menu("PAY").await?;
                self.sessions.update(user, dormbot_sessions::FlowKind::Payment, |s| {
                    if let FlowSession::Payment(p) = s {
                        p.building_id = None;
                        p.floor = None;
                        p.step = PaymentStep::ChooseBuilding;
                    }
                });
                self.respond_with(user, token, menu).await;
            },
            PaymentStep::ChooseBuilding => {
                self.sessions.clear(user, dormbot_sessions::FlowKind::Payment);
                self.respond(user, token, "Cancelled.").await;
            },
        }
        Ok(())
    }

    /// Staff typed a building name, floor, or room number instead of tapping
    /// the menu. Returns true when the text was consumed as navigation.
    pub(crate) async fn payment_nav_text(
        &self,
        user: &str,
        token: Option<&str>,
        session: &PaymentSession,
        text: &str,
    ) -> Result<bool> {
        let trimmed = text.trim();
        match session.step {
            PaymentStep::ChooseBuilding => {
                let buildings = self.store.buildings().await?;
                if let Some(b) = buildings
                    .into_iter()
                    .find(|b| b.name.eq_ignore_ascii_case(trimmed))
                {
                    self.payment_pick_building(user, token, &b.id).await?;
                    return Ok(true);
                }
                Ok(false)
            },
            PaymentStep::ChooseFloor => {
                let Some(building_id) = session.building_id.clone() else {
                    return Ok(false);
                };
                let rooms = self.store.rooms_in_building(&building_id).await?;
                if rooms.iter().any(|r| r.floor == trimmed) {
                    self.payment_pick_floor(user, token, &building_id, trimmed).await?;
                    return Ok(true);
                }
                Ok(false)
            },
            PaymentStep::ChooseRoom => {
                let (Some(building_id), Some(floor)) =
                    (session.building_id.clone(), session.floor.clone())
                else {
                    return Ok(false);
                };
                let rooms = self.store.rooms_in_building(&building_id).await?;
                if let Some(room) = rooms
                    .into_iter()
                    .find(|r| r.floor == floor && r.number == trimmed)
                {
                    self.payment_pick_room(user, token, &room.id).await?;
                    return Ok(true);
                }
                Ok(false)
            },
            PaymentStep::AwaitSlip => Ok(false),
        }
    }

    fn payment_drill_down(&self, user: &str) -> Option<PaymentSession> {
        match self.sessions.get(user, dormbot_sessions::FlowKind::Payment) {
            Some(FlowSession::Payment(p)) => Some(p),
            _ => None,
        }
    }
}
