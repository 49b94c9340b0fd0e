//! Persistence seam for the dormitory backend.
//!
//! The production store is an ORM-backed service owned by the REST side of the
//! deployment; the session engine only ever talks to the [`DormStore`] trait.
//! [`MemoryStore`] implements the same seam for tests and local runs.

pub mod error;
pub mod memory;
pub mod model;

pub use {
    error::{Error, Result},
    memory::MemoryStore,
    model::{
        Account, AccountRole, Building, Contract, Invoice, InvoiceStatus, MaintenanceRequest,
        MaintenanceStatus, NewMaintenanceRequest, NewPayment, Payment, PaymentStatus, Room, Tenant,
    },
};

use async_trait::async_trait;

/// CRUD/query seam over dormitory records.
///
/// Every method is a point read or filter; callers must not cache results
/// across inbound events.
#[async_trait]
pub trait DormStore: Send + Sync {
    async fn buildings(&self) -> Result<Vec<Building>>;
    async fn building(&self, id: &str) -> Result<Option<Building>>;

    async fn room(&self, id: &str) -> Result<Option<Room>>;
    async fn rooms_in_building(&self, building_id: &str) -> Result<Vec<Room>>;
    /// Rooms whose registered contact is the given chat identity.
    async fn rooms_with_contact(&self, chat_user_id: &str) -> Result<Vec<Room>>;

    async fn tenant(&self, id: &str) -> Result<Option<Tenant>>;
    async fn tenant_by_phone(&self, phone: &str) -> Result<Option<Tenant>>;
    async fn tenant_by_chat_user(&self, chat_user_id: &str) -> Result<Option<Tenant>>;
    /// Bind a messaging identity to a tenant (account-linking acceptance).
    async fn link_chat_user(&self, tenant_id: &str, chat_user_id: &str) -> Result<()>;

    async fn contract(&self, id: &str) -> Result<Option<Contract>>;
    async fn active_contract_for_room(&self, room_id: &str) -> Result<Option<Contract>>;
    async fn active_contracts_for_tenant(&self, tenant_id: &str) -> Result<Vec<Contract>>;

    async fn invoice(&self, id: &str) -> Result<Option<Invoice>>;
    /// Unpaid invoices for a contract, newest billing period first.
    async fn unpaid_invoices_for_contract(&self, contract_id: &str) -> Result<Vec<Invoice>>;
    /// Every unpaid invoice in the system (staff-only slip fallback).
    async fn all_unpaid_invoices(&self) -> Result<Vec<Invoice>>;
    async fn set_invoice_status(&self, id: &str, status: InvoiceStatus) -> Result<()>;

    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment>;
    async fn payments_for_invoice(&self, invoice_id: &str) -> Result<Vec<Payment>>;

    async fn insert_maintenance_request(
        &self,
        request: NewMaintenanceRequest,
    ) -> Result<MaintenanceRequest>;
    async fn maintenance_request(&self, id: &str) -> Result<Option<MaintenanceRequest>>;
    async fn set_maintenance_status(
        &self,
        id: &str,
        status: MaintenanceStatus,
        acknowledged_by: Option<&str>,
    ) -> Result<()>;

    async fn accounts(&self) -> Result<Vec<Account>>;
    /// Accounts that hold the messaging-notification permission and have a
    /// linked chat identity.
    async fn notify_staff_accounts(&self) -> Result<Vec<Account>>;
}
