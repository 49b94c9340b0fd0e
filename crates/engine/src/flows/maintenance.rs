//! Maintenance intake: detail, optional photo sequence, staff notification
//! with per-recipient acknowledgment windows.

use {
    dormbot_channel::{Card, OutboundMessage, QuickAction},
    dormbot_sessions::{
        ACK_TTL, FLOW_TTL, FlowKind, FlowSession, MaintenanceAckSession, MaintenanceAckStep,
        MaintenanceSession, MaintenanceStep,
    },
    dormbot_store::{MaintenanceStatus, NewMaintenanceRequest},
    tracing::{info, warn},
};

use crate::{Result, engine::Engine};

pub(crate) const MAINTENANCE_TITLE: &str = "Maintenance request";

const DONE_KEYWORD: &str = "done";
const ACK_REJECTED: &str = "That notification has expired or was not addressed to you.";

impl Engine {
    /// `repair` from a tenant or room contact.
    pub(crate) async fn start_maintenance(&self, user: &str, token: Option<&str>) -> Result<()> {
        let Some((contract, room, building)) = self.resolve_contract(user).await? else {
            self.respond(user, token, "No active contract is linked to your account.").await;
            return Ok(());
        };
        let label = room.label(&building.name);
        self.sessions.start(
            user,
            FlowSession::Maintenance(MaintenanceSession::new(&contract.id, &room.id, &label)),
            FLOW_TTL,
        );
        self.respond(user, token, "What needs repair? Describe the problem.").await;
        Ok(())
    }

    pub(crate) async fn maintenance_text(
        &self,
        user: &str,
        token: Option<&str>,
        text: &str,
    ) -> Result<()> {
        let Some(FlowSession::Maintenance(session)) =
            self.sessions.get(user, FlowKind::Maintenance)
        else {
            return Ok(());
        };
        match session.step {
            MaintenanceStep::AwaitDetail => {
                let detail = text.trim().to_string();
                if detail.is_empty() {
                    self.respond(user, token, "What needs repair? Describe the problem.").await;
                    return Ok(());
                }
                self.sessions.update(user, FlowKind::Maintenance, |s| {
                    if let FlowSession::Maintenance(m) = s {
                        m.detail = Some(detail.clone());
                        m.step = MaintenanceStep::AskPhotos;
                    }
                });
                self.respond_with(
                    user,
                    token,
                    vec![OutboundMessage::with_quick_replies(
                        "Would you like to attach photos?",
                        vec![
                            QuickAction::send_text("Yes", "yes"),
                            QuickAction::send_text("No", "no"),
                        ],
                    )],
                )
                .await;
                Ok(())
            },
            MaintenanceStep::AskPhotos => match text.trim().to_lowercase().as_str() {
                "yes" => {
                    self.sessions.update(user, FlowKind::Maintenance, |s| {
                        if let FlowSession::Maintenance(m) = s {
                            m.step = MaintenanceStep::AwaitImages;
                        }
                    });
                    self.respond(
                        user,
                        token,
                        format!("Send the photos now. Type \"{DONE_KEYWORD}\" when finished."),
                    )
                    .await;
                    Ok(())
                },
                "no" => self.finish_maintenance(user, token, &session).await,
                _ => {
                    self.respond(user, token, "Please answer \"yes\" or \"no\".").await;
                    Ok(())
                },
            },
            MaintenanceStep::AwaitImages => {
                if text.trim().to_lowercase() == DONE_KEYWORD {
                    // Re-read: images may have landed while we classified.
                    match self.sessions.get(user, FlowKind::Maintenance) {
                        Some(FlowSession::Maintenance(current)) => {
                            self.finish_maintenance(user, token, &current).await
                        },
                        _ => Ok(()),
                    }
                } else {
                    self.respond(
                        user,
                        token,
                        format!("Send photos, or type \"{DONE_KEYWORD}\" to finish."),
                    )
                    .await;
                    Ok(())
                }
            },
        }
    }

    /// Image while the session is collecting photos.
    pub(crate) async fn maintenance_image(
        &self,
        user: &str,
        token: Option<&str>,
        message_id: &str,
    ) -> Result<()> {
        let saved = match self.media.save_image(self.content.as_ref(), message_id).await {
            Ok(saved) => saved,
            Err(e) => {
                warn!(user_id = %user, error = %e, "maintenance photo download failed");
                self.respond(user, token, "Could not save the photo. Please send it again.").await;
                return Ok(());
            },
        };
        let mut count = 0usize;
        let live = self.sessions.update(user, FlowKind::Maintenance, |s| {
            if let FlowSession::Maintenance(m) = s {
                m.image_urls.push(saved.url.clone());
                count = m.image_urls.len();
            }
        });
        if !live {
            // Expired during the download; the photo stays on disk, unreferenced.
            return Ok(());
        }
        self.respond(
            user,
            token,
            format!("Photo {count} added. Send more, or type \"{DONE_KEYWORD}\"."),
        )
        .await;
        Ok(())
    }

    async fn finish_maintenance(
        &self,
        user: &str,
        token: Option<&str>,
        session: &MaintenanceSession,
    ) -> Result<()> {
        let detail = session.detail.as_deref().unwrap_or("(no description)");
        let mut description = format!("Room: {}\nProblem: {detail}", session.room_label);
        for (index, url) in session.image_urls.iter().enumerate() {
            description.push_str(&format!("\nPhoto {}: {url}", index + 1));
        }
        let request = self
            .store
            .insert_maintenance_request(NewMaintenanceRequest {
                room_id: session.room_id.clone(),
                contract_id: Some(session.contract_id.clone()),
                title: MAINTENANCE_TITLE.to_string(),
                description,
                reported_by: user.to_string(),
            })
            .await?;
        info!(
            user_id = %user,
            request_id = %request.id,
            photos = session.image_urls.len(),
            "maintenance request filed"
        );

        self.sessions.clear(user, FlowKind::Maintenance);
        self.respond(user, token, "Your request is filed. Staff have been notified.").await;
        self.notify_maintenance_staff(&request.id, &session.room_label, detail).await;
        Ok(())
    }

    /// Card to every staff account with the notification permission; each
    /// recipient gets their own acknowledgment window.
    async fn notify_maintenance_staff(&self, request_id: &str, room_label: &str, detail: &str) {
        let accounts = match self.store.notify_staff_accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!(error = %e, "staff lookup failed, maintenance notification dropped");
                return;
            },
        };
        let card = Card::new(MAINTENANCE_TITLE, format!("{room_label}: {detail}"))
            .button("Done", QuickAction::postback("Done", format!("MAINT_DONE={request_id}")))
            .button(
                "Can't handle",
                QuickAction::postback("Can't handle", format!("MAINT_NOT_DONE={request_id}")),
            );
        for account in accounts {
            let Some(chat_user_id) = account.chat_user_id else {
                continue;
            };
            self.sessions.start(
                &chat_user_id,
                FlowSession::MaintenanceAck(MaintenanceAckSession {
                    request_id: request_id.to_string(),
                    room_label: room_label.to_string(),
                    step: MaintenanceAckStep::AwaitDecision,
                }),
                ACK_TTL,
            );
            self.dispatch
                .push(&chat_user_id, vec![OutboundMessage::Card(card.clone())])
                .await;
        }
    }

    /// `MAINT_DONE` / `MAINT_NOT_DONE`. Only a notified recipient holding a
    /// live acknowledgment session for this request may act.
    pub(crate) async fn maintenance_ack(
        &self,
        user: &str,
        token: Option<&str>,
        request_id: &str,
        done: bool,
    ) -> Result<()> {
        let holds_window = matches!(
            self.sessions.get(user, FlowKind::MaintenanceAck),
            Some(FlowSession::MaintenanceAck(ack)) if ack.request_id == request_id
        );
        if !holds_window {
            self.respond(user, token, ACK_REJECTED).await;
            return Ok(());
        }
        if self.store.maintenance_request(request_id).await?.is_none() {
            self.sessions.clear(user, FlowKind::MaintenanceAck);
            self.respond(user, token, "That request no longer exists.").await;
            return Ok(());
        }

        let status = if done {
            MaintenanceStatus::Acknowledged
        } else {
            MaintenanceStatus::Declined
        };
        self.store
            .set_maintenance_status(request_id, status, Some(user))
            .await?;
        self.sessions.clear(user, FlowKind::MaintenanceAck);
        let copy = if done {
            "Marked as handled. Thank you."
        } else {
            "Noted. The request stays open for someone else."
        };
        self.respond(user, token, copy).await;
        Ok(())
    }
}
