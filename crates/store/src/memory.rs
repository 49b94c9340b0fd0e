//! In-memory [`DormStore`] implementation.
//!
//! Backs tests and local runs. All state lives behind one `RwLock`; guards are
//! never held across await points.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use {async_trait::async_trait, chrono::Utc, uuid::Uuid};

use crate::{
    DormStore,
    error::Result,
    model::{
        Account, Building, Contract, Invoice, InvoiceStatus, MaintenanceRequest,
        MaintenanceStatus, NewMaintenanceRequest, NewPayment, Payment, Room, Tenant,
    },
};

#[derive(Default)]
struct Inner {
    buildings: HashMap<String, Building>,
    rooms: HashMap<String, Room>,
    tenants: HashMap<String, Tenant>,
    contracts: HashMap<String, Contract>,
    invoices: HashMap<String, Invoice>,
    payments: Vec<Payment>,
    maintenance: HashMap<String, MaintenanceRequest>,
    accounts: Vec<Account>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    // Seed helpers, used by tests and the local binary.

    pub fn add_building(&self, building: Building) {
        self.write().buildings.insert(building.id.clone(), building);
    }

    pub fn add_room(&self, room: Room) {
        self.write().rooms.insert(room.id.clone(), room);
    }

    pub fn add_tenant(&self, tenant: Tenant) {
        self.write().tenants.insert(tenant.id.clone(), tenant);
    }

    pub fn add_contract(&self, contract: Contract) {
        self.write().contracts.insert(contract.id.clone(), contract);
    }

    pub fn add_invoice(&self, invoice: Invoice) {
        self.write().invoices.insert(invoice.id.clone(), invoice);
    }

    pub fn add_account(&self, account: Account) {
        self.write().accounts.push(account);
    }
}

#[async_trait]
impl DormStore for MemoryStore {
    async fn buildings(&self) -> Result<Vec<Building>> {
        let mut out: Vec<_> = self.read().buildings.values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn building(&self, id: &str) -> Result<Option<Building>> {
        Ok(self.read().buildings.get(id).cloned())
    }

    async fn room(&self, id: &str) -> Result<Option<Room>> {
        Ok(self.read().rooms.get(id).cloned())
    }

    async fn rooms_in_building(&self, building_id: &str) -> Result<Vec<Room>> {
        let mut out: Vec<_> = self
            .read()
            .rooms
            .values()
            .filter(|r| r.building_id == building_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| (a.floor.clone(), a.number.clone()).cmp(&(b.floor.clone(), b.number.clone())));
        Ok(out)
    }

    async fn rooms_with_contact(&self, chat_user_id: &str) -> Result<Vec<Room>> {
        Ok(self
            .read()
            .rooms
            .values()
            .filter(|r| r.contact_chat_user.as_deref() == Some(chat_user_id))
            .cloned()
            .collect())
    }

    async fn tenant(&self, id: &str) -> Result<Option<Tenant>> {
        Ok(self.read().tenants.get(id).cloned())
    }

    async fn tenant_by_phone(&self, phone: &str) -> Result<Option<Tenant>> {
        Ok(self
            .read()
            .tenants
            .values()
            .find(|t| t.phone == phone)
            .cloned())
    }

    async fn tenant_by_chat_user(&self, chat_user_id: &str) -> Result<Option<Tenant>> {
        Ok(self
            .read()
            .tenants
            .values()
            .find(|t| t.chat_user_id.as_deref() == Some(chat_user_id))
            .cloned())
    }

    async fn link_chat_user(&self, tenant_id: &str, chat_user_id: &str) -> Result<()> {
        let mut inner = self.write();
        match inner.tenants.get_mut(tenant_id) {
            Some(t) => {
                t.chat_user_id = Some(chat_user_id.to_string());
                Ok(())
            },
            None => Err(crate::Error::not_found("tenant", tenant_id)),
        }
    }

    async fn contract(&self, id: &str) -> Result<Option<Contract>> {
        Ok(self.read().contracts.get(id).cloned())
    }

    async fn active_contract_for_room(&self, room_id: &str) -> Result<Option<Contract>> {
        Ok(self
            .read()
            .contracts
            .values()
            .find(|c| c.room_id == room_id && c.active)
            .cloned())
    }

    async fn active_contracts_for_tenant(&self, tenant_id: &str) -> Result<Vec<Contract>> {
        Ok(self
            .read()
            .contracts
            .values()
            .filter(|c| c.tenant_id == tenant_id && c.active)
            .cloned()
            .collect())
    }

    async fn invoice(&self, id: &str) -> Result<Option<Invoice>> {
        Ok(self.read().invoices.get(id).cloned())
    }

    async fn unpaid_invoices_for_contract(&self, contract_id: &str) -> Result<Vec<Invoice>> {
        let mut out: Vec<_> = self
            .read()
            .invoices
            .values()
            .filter(|i| i.contract_id == contract_id && i.status == InvoiceStatus::Unpaid)
            .cloned()
            .collect();
        // Newest billing period first.
        out.sort_by(|a, b| (b.year, b.month).cmp(&(a.year, a.month)));
        Ok(out)
    }

    async fn all_unpaid_invoices(&self) -> Result<Vec<Invoice>> {
        let mut out: Vec<_> = self
            .read()
            .invoices
            .values()
            .filter(|i| i.status == InvoiceStatus::Unpaid)
            .cloned()
            .collect();
        out.sort_by(|a, b| (b.year, b.month).cmp(&(a.year, a.month)));
        Ok(out)
    }

    async fn set_invoice_status(&self, id: &str, status: InvoiceStatus) -> Result<()> {
        let mut inner = self.write();
        match inner.invoices.get_mut(id) {
            Some(i) => {
                i.status = status;
                Ok(())
            },
            None => Err(crate::Error::not_found("invoice", id)),
        }
    }

    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment> {
        let row = Payment {
            id: Uuid::new_v4().to_string(),
            invoice_id: payment.invoice_id,
            amount: payment.amount,
            status: payment.status,
            slip_url: payment.slip_url,
            bank_ref: payment.bank_ref,
            created_at: Utc::now(),
        };
        self.write().payments.push(row.clone());
        Ok(row)
    }

    async fn payments_for_invoice(&self, invoice_id: &str) -> Result<Vec<Payment>> {
        Ok(self
            .read()
            .payments
            .iter()
            .filter(|p| p.invoice_id == invoice_id)
            .cloned()
            .collect())
    }

    async fn insert_maintenance_request(
        &self,
        request: NewMaintenanceRequest,
    ) -> Result<MaintenanceRequest> {
        let row = MaintenanceRequest {
            id: Uuid::new_v4().to_string(),
            room_id: request.room_id,
            contract_id: request.contract_id,
            title: request.title,
            description: request.description,
            reported_by: request.reported_by,
            status: MaintenanceStatus::Open,
            acknowledged_by: None,
            created_at: Utc::now(),
        };
        self.write().maintenance.insert(row.id.clone(), row.clone());
        Ok(row)
    }

    async fn maintenance_request(&self, id: &str) -> Result<Option<MaintenanceRequest>> {
        Ok(self.read().maintenance.get(id).cloned())
    }

    async fn set_maintenance_status(
        &self,
        id: &str,
        status: MaintenanceStatus,
        acknowledged_by: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.write();
        match inner.maintenance.get_mut(id) {
            Some(m) => {
                m.status = status;
                m.acknowledged_by = acknowledged_by.map(String::from);
                Ok(())
            },
            None => Err(crate::Error::not_found("maintenance request", id)),
        }
    }

    async fn accounts(&self) -> Result<Vec<Account>> {
        Ok(self.read().accounts.clone())
    }

    async fn notify_staff_accounts(&self) -> Result<Vec<Account>> {
        Ok(self
            .read()
            .accounts
            .iter()
            .filter(|a| a.notify_maintenance && a.chat_user_id.is_some())
            .cloned()
            .collect())
    }
}
