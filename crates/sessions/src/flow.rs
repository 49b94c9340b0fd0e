//! Flow kinds and per-flow session state.

use std::time::Duration;

/// Default session lifetime.
pub const FLOW_TTL: Duration = Duration::from_secs(180);

/// Lifetime of a staff maintenance-acknowledgment session.
pub const ACK_TTL: Duration = Duration::from_secs(120);

/// One business flow per variant. A user holds at most one live session per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    Payment,
    TenantMoveOut,
    StaffMoveOut,
    Maintenance,
    Registration,
    /// Per-staff acknowledgment window for a maintenance notification.
    MaintenanceAck,
}

impl FlowKind {
    /// Kinds whose live session marks the user as busy: a flow-entry command
    /// for a different kind is rejected until completion or expiry.
    /// Acknowledgment windows never block.
    pub const BLOCKING: &[FlowKind] = &[
        FlowKind::Payment,
        FlowKind::TenantMoveOut,
        FlowKind::StaffMoveOut,
        FlowKind::Maintenance,
        FlowKind::Registration,
    ];

    /// Short label for logs and expiry notices.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Payment => "payment",
            Self::TenantMoveOut => "move-out",
            Self::StaffMoveOut => "room checkout",
            Self::Maintenance => "maintenance",
            Self::Registration => "account linking",
            Self::MaintenanceAck => "maintenance acknowledgment",
        }
    }
}

impl std::fmt::Display for FlowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Live session state. Every variant carries a mandatory step enum, so a
/// session with fields but no step cannot be constructed.
#[derive(Debug, Clone)]
pub enum FlowSession {
    Payment(PaymentSession),
    TenantMoveOut(TenantMoveOutSession),
    StaffMoveOut(StaffMoveOutSession),
    Maintenance(MaintenanceSession),
    Registration(RegistrationSession),
    MaintenanceAck(MaintenanceAckSession),
}

impl FlowSession {
    #[must_use]
    pub fn kind(&self) -> FlowKind {
        match self {
            Self::Payment(_) => FlowKind::Payment,
            Self::TenantMoveOut(_) => FlowKind::TenantMoveOut,
            Self::StaffMoveOut(_) => FlowKind::StaffMoveOut,
            Self::Maintenance(_) => FlowKind::Maintenance,
            Self::Registration(_) => FlowKind::Registration,
            Self::MaintenanceAck(_) => FlowKind::MaintenanceAck,
        }
    }
}

// ── Payment ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStep {
    /// Staff drill-down: pick a building.
    ChooseBuilding,
    /// Staff drill-down: pick a floor within the selected building.
    ChooseFloor,
    /// Staff drill-down: pick a room on the selected floor.
    ChooseRoom,
    /// Waiting for the slip image.
    AwaitSlip,
}

/// Payment flow session. Tenants start directly at [`PaymentStep::AwaitSlip`];
/// staff walk the building/floor/room drill-down first, and their selection
/// scopes the amount-match fallback when a slip arrives.
#[derive(Debug, Clone)]
pub struct PaymentSession {
    pub building_id: Option<String>,
    pub floor: Option<String>,
    pub room_id: Option<String>,
    pub step: PaymentStep,
}

impl PaymentSession {
    /// Fresh tenant session: no drill-down, slip expected next.
    #[must_use]
    pub fn await_slip() -> Self {
        Self {
            building_id: None,
            floor: None,
            room_id: None,
            step: PaymentStep::AwaitSlip,
        }
    }

    /// Fresh staff drill-down session.
    #[must_use]
    pub fn drill_down() -> Self {
        Self {
            building_id: None,
            floor: None,
            room_id: None,
            step: PaymentStep::ChooseBuilding,
        }
    }
}

// ── Tenant move-out ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantMoveOutStep {
    /// Waiting for a day-offset, the end-of-month phrase, or a picked date.
    AwaitPlan,
    /// Plan captured; waiting for the free-text reason.
    AwaitReason,
}

#[derive(Debug, Clone)]
pub struct TenantMoveOutSession {
    pub contract_id: String,
    pub room_label: String,
    /// Set when the plan step completes ("2026-09-30" or "end of month").
    pub planned_date: Option<String>,
    pub step: TenantMoveOutStep,
}

impl TenantMoveOutSession {
    #[must_use]
    pub fn new(contract_id: impl Into<String>, room_label: impl Into<String>) -> Self {
        Self {
            contract_id: contract_id.into(),
            room_label: room_label.into(),
            planned_date: None,
            step: TenantMoveOutStep::AwaitPlan,
        }
    }
}

// ── Staff move-out (room checkout) ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaffMoveOutStep {
    ChooseBuilding,
    ChooseFloor,
    ChooseRoom,
    /// Waiting for the water-meter photo.
    AwaitWaterImage,
    /// Water captured; waiting for the electric-meter photo.
    AwaitElectricImage,
}

#[derive(Debug, Clone)]
pub struct StaffMoveOutSession {
    pub building_id: Option<String>,
    pub floor: Option<String>,
    pub room_id: Option<String>,
    pub contract_id: Option<String>,
    pub tenant_name: Option<String>,
    pub water_image_url: Option<String>,
    pub step: StaffMoveOutStep,
}

impl StaffMoveOutSession {
    #[must_use]
    pub fn drill_down() -> Self {
        Self {
            building_id: None,
            floor: None,
            room_id: None,
            contract_id: None,
            tenant_name: None,
            water_image_url: None,
            step: StaffMoveOutStep::ChooseBuilding,
        }
    }
}

// ── Maintenance ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceStep {
    /// Waiting for the free-text problem description.
    AwaitDetail,
    /// Detail captured; waiting for the yes/no photo answer.
    AskPhotos,
    /// Collecting photos until the completion keyword.
    AwaitImages,
}

#[derive(Debug, Clone)]
pub struct MaintenanceSession {
    pub contract_id: String,
    pub room_id: String,
    pub room_label: String,
    pub detail: Option<String>,
    /// Uploaded photo URLs, in upload order.
    pub image_urls: Vec<String>,
    pub step: MaintenanceStep,
}

impl MaintenanceSession {
    #[must_use]
    pub fn new(
        contract_id: impl Into<String>,
        room_id: impl Into<String>,
        room_label: impl Into<String>,
    ) -> Self {
        Self {
            contract_id: contract_id.into(),
            room_id: room_id.into(),
            room_label: room_label.into(),
            detail: None,
            image_urls: Vec::new(),
            step: MaintenanceStep::AwaitDetail,
        }
    }
}

/// Acknowledgment window held by one notified staff member for one
/// maintenance request. Only a holder of this session may act on the card.
#[derive(Debug, Clone)]
pub struct MaintenanceAckSession {
    pub request_id: String,
    pub room_label: String,
    pub step: MaintenanceAckStep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceAckStep {
    AwaitDecision,
}

// ── Registration (account linking) ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStep {
    /// Link request queued; waiting for an admin accept/reject.
    AwaitApproval,
}

#[derive(Debug, Clone)]
pub struct RegistrationSession {
    pub phone: String,
    pub tenant_id: String,
    pub step: RegistrationStep,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let s = FlowSession::Payment(PaymentSession::await_slip());
        assert_eq!(s.kind(), FlowKind::Payment);
        let s = FlowSession::MaintenanceAck(MaintenanceAckSession {
            request_id: "r1".into(),
            room_label: "A/3/304".into(),
            step: MaintenanceAckStep::AwaitDecision,
        });
        assert_eq!(s.kind(), FlowKind::MaintenanceAck);
    }

    #[test]
    fn ack_kind_never_blocks() {
        assert!(!FlowKind::BLOCKING.contains(&FlowKind::MaintenanceAck));
        for kind in [
            FlowKind::Payment,
            FlowKind::TenantMoveOut,
            FlowKind::StaffMoveOut,
            FlowKind::Maintenance,
            FlowKind::Registration,
        ] {
            assert!(FlowKind::BLOCKING.contains(&kind));
        }
    }
}
