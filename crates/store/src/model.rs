//! Entity model owned by the persistence collaborator.
//!
//! These records are read and written per operation, never cached across
//! inbound events.

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Building {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub building_id: String,
    /// Floor label as shown to staff ("1", "2", "M").
    pub floor: String,
    /// Room number within the building ("304").
    pub number: String,
    /// Chat identity registered as the room's contact person, if any.
    /// Lets a non-tenant (a parent paying rent, typically) use the payment flow.
    pub contact_chat_user: Option<String>,
}

impl Room {
    /// Human-facing label ("A/3/304").
    #[must_use]
    pub fn label(&self, building_name: &str) -> String {
        format!("{building_name}/{}/{}", self.floor, self.number)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub phone: String,
    /// Messaging-platform identity, set once linking completes.
    pub chat_user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub id: String,
    pub room_id: String,
    pub tenant_id: String,
    pub monthly_rent: f64,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Unpaid,
    Paid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub contract_id: String,
    pub month: u32,
    pub year: i32,
    pub total: f64,
    pub status: InvoiceStatus,
}

impl Invoice {
    /// Billing period as shown to users ("03/2026").
    #[must_use]
    pub fn period(&self) -> String {
        format!("{:02}/{}", self.month, self.year)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Verified,
    Unverified,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub invoice_id: String,
    pub amount: f64,
    pub status: PaymentStatus,
    pub slip_url: String,
    pub bank_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for [`crate::DormStore::insert_payment`]; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub invoice_id: String,
    pub amount: f64,
    pub status: PaymentStatus,
    pub slip_url: String,
    pub bank_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaintenanceStatus {
    Open,
    Acknowledged,
    Declined,
}

/// Maintenance-request entity. Also carries move-out records (tenant notices and
/// staff meter captures) under distinguishing titles; the persistence collaborator
/// has no dedicated move-out table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceRequest {
    pub id: String,
    pub room_id: String,
    pub contract_id: Option<String>,
    pub title: String,
    pub description: String,
    pub reported_by: String,
    pub status: MaintenanceStatus,
    pub acknowledged_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for [`crate::DormStore::insert_maintenance_request`].
#[derive(Debug, Clone)]
pub struct NewMaintenanceRequest {
    pub room_id: String,
    pub contract_id: Option<String>,
    pub title: String,
    pub description: String,
    pub reported_by: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountRole {
    Admin,
    Owner,
    Staff,
}

/// Back-office account (dorm owner, admin, maintenance staff).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub role: AccountRole,
    /// Messaging-platform identity, if the account linked one.
    pub chat_user_id: Option<String>,
    /// Whether this account receives maintenance notifications over chat.
    pub notify_maintenance: bool,
}
