//! Building/floor/room drill-down menus, shared by the staff payment and
//! staff move-out flows. `prefix` selects the postback key family
//! (`PAY_*` or `MO_*`).

use dormbot_channel::{OutboundMessage, QuickAction};

use crate::{Result, engine::Engine};

impl Engine {
    pub(crate) async fn building_menu(&self, prefix: &str) -> Result<Vec<OutboundMessage>> {
        let buildings = self.store.buildings().await?;
        if buildings.is_empty() {
            return Ok(vec![OutboundMessage::text("No buildings are registered.")]);
        }
        let actions = buildings
            .into_iter()
            .map(|b| QuickAction::postback(b.name, format!("{prefix}_BUILDING={}", b.id)))
            .collect();
        Ok(vec![OutboundMessage::with_quick_replies(
            "Pick a building:",
            actions,
        )])
    }

    /// `None` means the building has no rooms; callers reply with guidance
    /// and leave the session where it was.
    pub(crate) async fn floor_menu(
        &self,
        building_id: &str,
        prefix: &str,
    ) -> Result<Option<Vec<OutboundMessage>>> {
        let rooms = self.store.rooms_in_building(building_id).await?;
        let mut floors: Vec<String> = Vec::new();
        for room in &rooms {
            if !floors.contains(&room.floor) {
                floors.push(room.floor.clone());
            }
        }
        if floors.is_empty() {
            return Ok(None);
        }
        let actions = floors
            .into_iter()
            .map(|floor| {
                QuickAction::postback(
                    format!("Floor {floor}"),
                    format!("{prefix}_FLOOR={building_id}:{floor}"),
                )
            })
            .collect();
        Ok(Some(vec![OutboundMessage::with_quick_replies(
            "Pick a floor:",
            actions,
        )]))
    }

    pub(crate) async fn room_menu(
        &self,
        building_id: &str,
        floor: &str,
        prefix: &str,
    ) -> Result<Vec<OutboundMessage>> {
        let rooms = self.store.rooms_in_building(building_id).await?;
        let actions: Vec<QuickAction> = rooms
            .into_iter()
            .filter(|r| r.floor == floor)
            .map(|r| QuickAction::postback(r.number, format!("{prefix}_ROOM={}", r.id)))
            .collect();
        if actions.is_empty() {
            return Ok(vec![OutboundMessage::text("No rooms on that floor.")]);
        }
        Ok(vec![OutboundMessage::with_quick_replies(
            "Pick a room:",
            actions,
        )])
    }
}
