//! Staff room checkout: drill-down to a room, then water and electric meter
//! photos, persisted as one combined record.

use {
    dormbot_sessions::{
        FLOW_TTL, FlowKind, FlowSession, StaffMoveOutSession, StaffMoveOutStep,
    },
    dormbot_store::NewMaintenanceRequest,
    tracing::{info, warn},
};

use crate::{Result, engine::Engine};

pub(crate) const CHECKOUT_TITLE: &str = "Move-out meter record";

impl Engine {
    /// `checkouts` (staff).
    pub(crate) async fn start_staff_moveout(&self, user: &str, token: Option<&str>) -> Result<()> {
        let menu = self.building_menu("MO").await?;
        self.sessions.start(
            user,
            FlowSession::StaffMoveOut(StaffMoveOutSession::drill_down()),
            FLOW_TTL,
        );
        self.respond_with(user, token, menu).await;
        Ok(())
    }

    pub(crate) async fn staff_moveout_pick_building(
        &self,
        user: &str,
        token: Option<&str>,
        building_id: &str,
    ) -> Result<()> {
        if !self.roles.is_staff(user) {
            self.respond(user, token, "That command is for dormitory staff.").await;
            return Ok(());
        }
        if self.staff_moveout_session(user).is_none() {
            self.respond(user, token, "Type \"checkouts\" to start a room checkout.").await;
            return Ok(());
        }
        if self.store.building(building_id).await?.is_none() {
            self.respond(user, token, "That building was not found.").await;
            return Ok(());
        }
        let Some(menu) = self.floor_menu(building_id, "MO").await? else {
            self.respond(user, token, "That building has no rooms registered.").await;
            return Ok(());
        };
        self.sessions.update(user, FlowKind::StaffMoveOut, |s| {
            if let FlowSession::StaffMoveOut(m) = s {
                m.building_id = Some(building_id.to_string());
                m.floor = None;
                m.room_id = None;
                m.step = StaffMoveOutStep::ChooseFloor;
            }
        });
        self.respond_with(user, token, menu).await;
        Ok(())
    }

    pub(crate) async fn staff_moveout_pick_floor(
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
        let parent_ok = self
            .staff_moveout_session(user)
            .is_some_and(|m| m.building_id.as_deref() == Some(building_id));
        if !parent_ok {
            self.respond(user, token, "Pick a building first.").await;
            return Ok(());
        }
        let menu = self.room_menu(building_id, floor, "MO").await?;
        self.sessions.update(user, FlowKind::StaffMoveOut, |s| {
            if let FlowSession::StaffMoveOut(m) = s {
                m.floor = Some(floor.to_string());
                m.room_id = None;
                m.step = StaffMoveOutStep::ChooseRoom;
            }
        });
        self.respond_with(user, token, menu).await;
        Ok(())
    }

    pub(crate) async fn staff_moveout_pick_room(
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
            .staff_moveout_session(user)
            .is_some_and(|m| m.building_id.is_some() && m.floor.is_some());
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
        let tenant_name = match self.store.tenant(&contract.tenant_id).await? {
            Some(tenant) => tenant.name,
            None => "unknown tenant".to_string(),
        };

        self.sessions.update(user, FlowKind::StaffMoveOut, |s| {
            if let FlowSession::StaffMoveOut(m) = s {
                m.room_id = Some(room_id.to_string());
                m.contract_id = Some(contract.id.clone());
                m.tenant_name = Some(tenant_name.clone());
                m.step = StaffMoveOutStep::AwaitWaterImage;
            }
        });
        self.respond(
            user,
            token,
            format!("Room {label}, tenant {tenant_name}. Send a photo of the WATER meter."),
        )
        .await;
        Ok(())
    }

    /// Image while the session sits at a meter step.
    pub(crate) async fn staff_moveout_image(
        &self,
        user: &str,
        token: Option<&str>,
        message_id: &str,
    ) -> Result<()> {
        let Some(session) = self.staff_moveout_session(user) else {
            return Ok(());
        };

        let saved = match self.media.save_image(self.content.as_ref(), message_id).await {
            Ok(saved) => saved,
            Err(e) => {
                warn!(user_id = %user, error = %e, "meter photo download failed");
                self.respond(user, token, "Could not save the photo. Please send it again.").await;
                return Ok(());
            },
        };

        match session.step {
            StaffMoveOutStep::AwaitWaterImage => {
                let advanced = self.sessions.update(user, FlowKind::StaffMoveOut, |s| {
                    if let FlowSession::StaffMoveOut(m) = s {
                        m.water_image_url = Some(saved.url.clone());
                        m.step = StaffMoveOutStep::AwaitElectricImage;
                    }
                });
                if advanced {
                    self.respond(user, token, "Water meter saved. Now send the ELECTRIC meter photo.")
                        .await;
                }
                Ok(())
            },
            StaffMoveOutStep::AwaitElectricImage => {
                // Session may have expired during the download.
                let Some(current) = self.staff_moveout_session(user) else {
                    return Ok(());
                };
                self.finish_checkout(user, token, &current, &saved.url).await
            },
            _ => Ok(()),
        }
    }

    async fn finish_checkout(
        &self,
        user: &str,
        token: Option<&str>,
        session: &StaffMoveOutSession,
        electric_url: &str,
    ) -> Result<()> {
        let (Some(room_id), Some(water_url)) =
            (session.room_id.clone(), session.water_image_url.clone())
        else {
            self.respond(user, token, "Pick a room and send the water meter photo first.").await;
            return Ok(());
        };
        let tenant_name = session.tenant_name.as_deref().unwrap_or("unknown tenant");
        let label = match self.store.room(&room_id).await? {
            Some(room) => self.room_label(&room).await,
            None => room_id.clone(),
        };
        let description = format!(
            "Room: {label}\nTenant: {tenant_name}\nWater meter: {water_url}\nElectric meter: {electric_url}"
        );
        let request = self
            .store
            .insert_maintenance_request(NewMaintenanceRequest {
                room_id,
                contract_id: session.contract_id.clone(),
                title: CHECKOUT_TITLE.to_string(),
                description,
                reported_by: user.to_string(),
            })
            .await?;
        info!(user_id = %user, request_id = %request.id, "checkout record stored");

        self.sessions.clear(user, FlowKind::StaffMoveOut);
        self.respond(
            user,
            token,
            format!("Checkout recorded for room {label} ({tenant_name}), both meter photos attached."),
        )
        .await;
        Ok(())
    }

    /// Staff typed navigation instead of tapping the menu.
    pub(crate) async fn staff_moveout_nav_text(
        &self,
        user: &str,
        token: Option<&str>,
        session: &StaffMoveOutSession,
        text: &str,
    ) -> Result<bool> {
        let trimmed = text.trim();
        match session.step {
            StaffMoveOutStep::ChooseBuilding => {
                let buildings = self.store.buildings().await?;
                if let Some(b) = buildings
                    .into_iter()
                    .find(|b| b.name.eq_ignore_ascii_case(trimmed))
                {
                    self.staff_moveout_pick_building(user, token, &b.id).await?;
                    return Ok(true);
                }
                Ok(false)
            },
            StaffMoveOutStep::ChooseFloor => {
                let Some(building_id) = session.building_id.clone() else {
                    return Ok(false);
                };
                let rooms = self.store.rooms_in_building(&building_id).await?;
                if rooms.iter().any(|r| r.floor == trimmed) {
                    self.staff_moveout_pick_floor(user, token, &building_id, trimmed).await?;
                    return Ok(true);
                }
                Ok(false)
            },
            StaffMoveOutStep::ChooseRoom => {
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
                    self.staff_moveout_pick_room(user, token, &room.id).await?;
                    return Ok(true);
                }
                Ok(false)
            },
            _ => Ok(false),
        }
    }

    fn staff_moveout_session(&self, user: &str) -> Option<StaffMoveOutSession> {
        match self.sessions.get(user, FlowKind::StaffMoveOut) {
            Some(FlowSession::StaffMoveOut(m)) => Some(m),
            _ => None,
        }
    }
}
