#![allow(clippy::unwrap_used)]
//! End-to-end flow scenarios against the in-memory store.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    async_trait::async_trait,
    dormbot_channel::{
        Card, Dispatcher, InboundEvent, InboundKind, Outbound, OutboundMessage, QuickAction,
    },
    dormbot_media::{ContentSource, MediaIngest},
    dormbot_sessions::{FlowKind, FlowSession, PaymentStep, TenantMoveOutStep},
    dormbot_store::{
        Account, AccountRole, Building, Contract, DormStore, Invoice, InvoiceStatus,
        MaintenanceStatus, MemoryStore, PaymentStatus, Room, Tenant,
    },
    dormbot_verify::{SlipPayload, SlipVerifier, Verdict},
};

use crate::{Engine, RoleSet};

#[derive(Default)]
struct Recorder {
    pushes: Mutex<Vec<(String, OutboundMessage)>>,
}

#[async_trait]
impl Outbound for Recorder {
    async fn reply(
        &self,
        reply_token: &str,
        messages: Vec<OutboundMessage>,
    ) -> dormbot_channel::Result<()> {
        let mut pushes = self.pushes.lock().unwrap();
        for message in messages {
            pushes.push((reply_token.to_string(), message));
        }
        Ok(())
    }

    async fn push(
        &self,
        user_id: &str,
        messages: Vec<OutboundMessage>,
    ) -> dormbot_channel::Result<()> {
        let mut pushes = self.pushes.lock().unwrap();
        for message in messages {
            pushes.push((user_id.to_string(), message));
        }
        Ok(())
    }
}

impl Recorder {
    fn texts(&self, user: &str) -> Vec<String> {
        self.pushes
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| to == user)
            .filter_map(|(_, m)| match m {
                OutboundMessage::Text(t) => Some(t.clone()),
                OutboundMessage::TextWithQuickReplies { text, .. } => Some(text.clone()),
                OutboundMessage::Card(_) => None,
            })
            .collect()
    }

    fn card_for(&self, user: &str) -> Option<Card> {
        self.pushes
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| to == user)
            .find_map(|(_, m)| match m {
                OutboundMessage::Card(card) => Some(card.clone()),
                _ => None,
            })
    }
}

struct MapContent;

#[async_trait]
impl ContentSource for MapContent {
    async fn fetch(&self, _message_id: &str) -> dormbot_media::Result<Vec<u8>> {
        Ok(vec![0xFF, 0xD8, 0x00, 0x01])
    }
}

#[derive(Default)]
struct ScriptedVerifier {
    script: Mutex<VecDeque<Verdict>>,
    calls: Mutex<Vec<Option<f64>>>,
}

impl ScriptedVerifier {
    fn enqueue(&self, verdict: Verdict) {
        self.script.lock().unwrap().push_back(verdict);
    }

    fn calls(&self) -> Vec<Option<f64>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SlipVerifier for ScriptedVerifier {
    async fn verify(
        &self,
        _payload: SlipPayload,
        expected_amount: Option<f64>,
    ) -> dormbot_verify::Result<Verdict> {
        self.calls.lock().unwrap().push(expected_amount);
        Ok(self.script.lock().unwrap().pop_front().unwrap_or_default())
    }
}

struct Harness {
    engine: Arc<Engine>,
    store: MemoryStore,
    out: Arc<Recorder>,
    verifier: Arc<ScriptedVerifier>,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryStore::new();
    seed(&store);

    let roles = Arc::new(RoleSet::new());
    roles.add_staff("Ustaff");
    roles.add_staff("Ustaff2");
    roles.add_admin("Uadmin");

    let out = Arc::new(Recorder::default());
    let verifier = Arc::new(ScriptedVerifier::default());
    let engine = Engine::new(
        Arc::new(store.clone()),
        roles,
        MediaIngest::new(dir.path(), "http://media.test"),
        Arc::new(MapContent),
        verifier.clone(),
        Dispatcher::new(out.clone()),
    );
    Harness {
        engine,
        store,
        out,
        verifier,
        _dir: dir,
    }
}

fn seed(store: &MemoryStore) {
    store.add_building(Building {
        id: "bld1".into(),
        name: "A".into(),
    });
    store.add_room(Room {
        id: "room1".into(),
        building_id: "bld1".into(),
        floor: "3".into(),
        number: "304".into(),
        contact_chat_user: None,
    });
    store.add_room(Room {
        id: "room2".into(),
        building_id: "bld1".into(),
        floor: "3".into(),
        number: "305".into(),
        contact_chat_user: None,
    });
    store.add_tenant(Tenant {
        id: "t1".into(),
        name: "Ploy".into(),
        phone: "0812345678".into(),
        chat_user_id: Some("Utenant".into()),
    });
    store.add_tenant(Tenant {
        id: "t2".into(),
        name: "Nok".into(),
        phone: "0899999999".into(),
        chat_user_id: None,
    });
    store.add_contract(Contract {
        id: "c1".into(),
        room_id: "room1".into(),
        tenant_id: "t1".into(),
        monthly_rent: 2500.0,
        active: true,
    });
    store.add_invoice(Invoice {
        id: "i1".into(),
        contract_id: "c1".into(),
        month: 8,
        year: 2026,
        total: 2500.0,
        status: InvoiceStatus::Unpaid,
    });
    store.add_account(Account {
        id: "a1".into(),
        name: "Mook".into(),
        role: AccountRole::Staff,
        chat_user_id: Some("Ustaff".into()),
        notify_maintenance: true,
    });
    store.add_account(Account {
        id: "a2".into(),
        name: "Beam".into(),
        role: AccountRole::Staff,
        chat_user_id: Some("Ustaff2".into()),
        notify_maintenance: false,
    });
    store.add_account(Account {
        id: "a3".into(),
        name: "Owner".into(),
        role: AccountRole::Admin,
        chat_user_id: Some("Uadmin".into()),
        notify_maintenance: false,
    });
}

fn text(user: &str, body: &str) -> InboundEvent {
    InboundEvent {
        user_id: user.to_string(),
        reply_token: None,
        kind: InboundKind::Text(body.to_string()),
    }
}

fn image(user: &str, message_id: &str) -> InboundEvent {
    InboundEvent {
        user_id: user.to_string(),
        reply_token: None,
        kind: InboundKind::Image {
            message_id: message_id.to_string(),
        },
    }
}

fn postback(user: &str, data: &str) -> InboundEvent {
    InboundEvent {
        user_id: user.to_string(),
        reply_token: None,
        kind: InboundKind::Postback {
            data: data.to_string(),
            date: None,
        },
    }
}

async fn settle() {
    // Verdict pushes trail the reply by one second.
    tokio::time::sleep(Duration::from_millis(1300)).await;
}

#[tokio::test]
async fn full_payment_marks_invoice_paid() {
    let h = harness();
    h.engine.handle_event(text("Utenant", "pay")).await;
    assert!(h.out.texts("Utenant").iter().any(|t| t.contains("08/2026")));

    h.verifier.enqueue(Verdict {
        ok: true,
        amount: Some(2500.0),
        ..Verdict::default()
    });
    h.engine.handle_event(image("Utenant", "m1")).await;
    settle().await;

    let invoice = h.store.invoice("i1").await.unwrap().unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Paid);
    let payments = h.store.payments_for_invoice("i1").await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Verified);
    assert!((payments[0].amount - 2500.0).abs() < f64::EPSILON);
    assert!(h.out.texts("Utenant").iter().any(|t| t.contains("paid in full")));
    // The invoice's outstanding amount rode along to the verifier.
    assert_eq!(h.verifier.calls(), vec![Some(2500.0)]);
    assert!(h.engine.sessions().get("Utenant", FlowKind::Payment).is_none());
}

#[tokio::test]
async fn partial_payment_reports_remaining() {
    let h = harness();
    h.engine.handle_event(text("Utenant", "pay")).await;

    // Amount-bound verification fails; the amount-free retry confirms 1500.
    h.verifier.enqueue(Verdict::default());
    h.verifier.enqueue(Verdict {
        ok: true,
        amount: Some(1500.0),
        ..Verdict::default()
    });
    h.engine.handle_event(image("Utenant", "m1")).await;
    settle().await;

    let invoice = h.store.invoice("i1").await.unwrap().unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Unpaid);
    let payments = h.store.payments_for_invoice("i1").await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Verified);
    assert!(h.out.texts("Utenant").iter().any(|t| t.contains("1000.00 remains")));
    assert_eq!(h.verifier.calls(), vec![Some(2500.0), None]);
}

#[tokio::test]
async fn duplicate_slip_gets_distinct_copy() {
    let h = harness();
    h.engine.handle_event(text("Utenant", "pay")).await;
    h.verifier.enqueue(Verdict {
        duplicate: true,
        ..Verdict::default()
    });
    h.engine.handle_event(image("Utenant", "m1")).await;
    settle().await;

    let texts = h.out.texts("Utenant");
    assert!(texts.iter().any(|t| t.contains("already submitted")));
    assert!(!texts.iter().any(|t| t.contains("could not be verified")));
    let invoice = h.store.invoice("i1").await.unwrap().unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Unpaid);
    let payments = h.store.payments_for_invoice("i1").await.unwrap();
    assert_eq!(payments[0].status, PaymentStatus::Unverified);
}

#[tokio::test]
async fn floor_postback_without_building_writes_nothing() {
    let h = harness();
    h.engine.handle_event(postback("Ustaff", "PAY_FLOOR=bld1:3")).await;
    assert!(h.out.texts("Ustaff").iter().any(|t| t.contains("Pick a building first")));
    assert!(h.engine.sessions().get("Ustaff", FlowKind::Payment).is_none());
}

#[tokio::test]
async fn staff_drill_down_reaches_room_and_collects() {
    let h = harness();
    h.engine.handle_event(text("Ustaff", "payments")).await;
    h.engine.handle_event(postback("Ustaff", "PAY_BUILDING=bld1")).await;
    h.engine.handle_event(postback("Ustaff", "PAY_FLOOR=bld1:3")).await;
    h.engine.handle_event(postback("Ustaff", "PAY_ROOM=room1")).await;
    assert!(h.out.texts("Ustaff").iter().any(|t| t.contains("owes 2500.00")));

    h.verifier.enqueue(Verdict {
        ok: true,
        amount: Some(2500.0),
        ..Verdict::default()
    });
    h.engine.handle_event(image("Ustaff", "m2")).await;
    settle().await;
    let invoice = h.store.invoice("i1").await.unwrap().unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Paid);
}

#[tokio::test]
async fn drill_down_postbacks_reject_non_staff() {
    let h = harness();
    h.engine.handle_event(postback("Utenant", "PAY_BUILDING=bld1")).await;
    assert!(h.out.texts("Utenant").iter().any(|t| t.contains("dormitory staff")));
}

#[tokio::test]
async fn invalid_moveout_plan_reprompts_without_advancing() {
    let h = harness();
    h.engine.handle_event(text("Utenant", "move out")).await;
    h.engine.handle_event(text("Utenant", "someday")).await;
    h.engine.handle_event(text("Utenant", "someday")).await;

    let prompts = h
        .out
        .texts("Utenant")
        .iter()
        .filter(|t| t.contains("When do you plan to move out?"))
        .count();
    assert_eq!(prompts, 3);
    match h.engine.sessions().get("Utenant", FlowKind::TenantMoveOut) {
        Some(FlowSession::TenantMoveOut(m)) => assert_eq!(m.step, TenantMoveOutStep::AwaitPlan),
        other => panic!("expected live move-out session, got {other:?}"),
    }
}

#[tokio::test]
async fn moveout_days_preset_then_reason_persists_record() {
    let h = harness();
    h.engine.handle_event(text("Utenant", "move out")).await;
    h.engine.handle_event(postback("Utenant", "MOVEOUT_DAYS=15")).await;
    h.engine.handle_event(text("Utenant", "moving to another city")).await;

    assert!(h.engine.sessions().get("Utenant", FlowKind::TenantMoveOut).is_none());
    assert!(h.out.texts("Utenant").iter().any(|t| t.contains("recorded")));
    // Staff with the notification permission heard about it.
    assert!(h.out.texts("Ustaff").iter().any(|t| t.contains("Move-out notice")));
    assert!(h.out.texts("Ustaff2").is_empty());
}

#[tokio::test]
async fn busy_user_cannot_enter_second_flow() {
    let h = harness();
    h.engine.handle_event(text("Utenant", "pay")).await;
    h.engine.handle_event(text("Utenant", "repair")).await;
    assert!(h.out.texts("Utenant").iter().any(|t| t.contains("finish your payment")));
    assert!(h.engine.sessions().get("Utenant", FlowKind::Maintenance).is_none());
}

#[tokio::test]
async fn phone_number_mid_payment_does_not_open_linking() {
    let h = harness();
    // An unlinked room contact can pay without a tenant link.
    h.store.add_room(Room {
        id: "room3".into(),
        building_id: "bld1".into(),
        floor: "4".into(),
        number: "401".into(),
        contact_chat_user: Some("Uproxy".into()),
    });
    h.store.add_contract(Contract {
        id: "c2".into(),
        room_id: "room3".into(),
        tenant_id: "t2".into(),
        monthly_rent: 3000.0,
        active: true,
    });
    h.store.add_invoice(Invoice {
        id: "i2".into(),
        contract_id: "c2".into(),
        month: 8,
        year: 2026,
        total: 3000.0,
        status: InvoiceStatus::Unpaid,
    });

    h.engine.handle_event(text("Uproxy", "pay")).await;
    assert!(h.engine.sessions().get("Uproxy", FlowKind::Payment).is_some());

    h.engine.handle_event(text("Uproxy", "0899999999")).await;
    assert!(h.out.texts("Uproxy").iter().any(|t| t.contains("finish your payment")));
    assert!(h.engine.sessions().get("Uproxy", FlowKind::Registration).is_none());
    assert!(h.out.card_for("Uadmin").is_none());
}

#[tokio::test]
async fn empty_building_pick_keeps_browsing_session() {
    let h = harness();
    h.store.add_building(Building {
        id: "bld2".into(),
        name: "B".into(),
    });
    h.engine.handle_event(text("Ustaff", "payments")).await;
    h.engine.handle_event(postback("Ustaff", "PAY_BUILDING=bld2")).await;

    let texts = h.out.texts("Ustaff");
    assert!(texts.iter().any(|t| t.contains("no rooms registered")));
    assert!(!texts.iter().any(|t| t.contains("went wrong")));
    match h.engine.sessions().get("Ustaff", FlowKind::Payment) {
        Some(FlowSession::Payment(p)) => {
            assert_eq!(p.step, PaymentStep::ChooseBuilding);
            assert!(p.building_id.is_none());
        },
        other => panic!("expected live drill-down session, got {other:?}"),
    }
}

#[tokio::test]
async fn maintenance_two_images_ack_gating() {
    let h = harness();
    h.engine.handle_event(text("Utenant", "repair")).await;
    h.engine.handle_event(text("Utenant", "Aircon is leaking")).await;
    h.engine.handle_event(text("Utenant", "yes")).await;
    h.engine.handle_event(image("Utenant", "p1")).await;
    h.engine.handle_event(image("Utenant", "p2")).await;
    h.engine.handle_event(text("Utenant", "done")).await;

    let card = h.out.card_for("Ustaff").expect("notified staff gets a card");
    let data = match &card.buttons[0].action {
        QuickAction::Postback { data, .. } => data.clone(),
        other => panic!("expected postback button, got {other:?}"),
    };
    let request_id = data.strip_prefix("MAINT_DONE=").unwrap().to_string();

    let request = h.store.maintenance_request(&request_id).await.unwrap().unwrap();
    assert_eq!(request.description.matches("http://media.test/").count(), 2);
    let first = request.description.find("Photo 1:").unwrap();
    let second = request.description.find("Photo 2:").unwrap();
    assert!(first < second);

    // Only the notified recipient holds an acknowledgment window.
    assert!(h.engine.sessions().get("Ustaff", FlowKind::MaintenanceAck).is_some());
    assert!(h.engine.sessions().get("Ustaff2", FlowKind::MaintenanceAck).is_none());

    h.engine
        .handle_event(postback("Ustaff2", &format!("MAINT_DONE={request_id}")))
        .await;
    let request = h.store.maintenance_request(&request_id).await.unwrap().unwrap();
    assert_eq!(request.status, MaintenanceStatus::Open);
    assert!(h.out.texts("Ustaff2").iter().any(|t| t.contains("not addressed to you")));

    h.engine
        .handle_event(postback("Ustaff", &format!("MAINT_DONE={request_id}")))
        .await;
    let request = h.store.maintenance_request(&request_id).await.unwrap().unwrap();
    assert_eq!(request.status, MaintenanceStatus::Acknowledged);
    assert_eq!(request.acknowledged_by.as_deref(), Some("Ustaff"));
}

#[tokio::test]
async fn maintenance_without_photos_persists_immediately() {
    let h = harness();
    h.engine.handle_event(text("Utenant", "repair")).await;
    h.engine.handle_event(text("Utenant", "Door lock is broken")).await;
    h.engine.handle_event(text("Utenant", "no")).await;

    assert!(h.engine.sessions().get("Utenant", FlowKind::Maintenance).is_none());
    let card = h.out.card_for("Ustaff").unwrap();
    assert!(card.body.contains("Door lock is broken"));
}

#[tokio::test]
async fn link_request_needs_admin_approval() {
    let h = harness();
    h.engine.handle_event(text("Unew", "0899999999")).await;
    assert!(h.out.card_for("Uadmin").is_some());
    assert!(h.out.texts("Unew").iter().any(|t| t.contains("Request sent")));

    // Staff is not admin; the request stays pending.
    h.engine.handle_event(postback("Ustaff", "LINK_ACCEPT=Unew")).await;
    assert!(h.store.tenant_by_chat_user("Unew").await.unwrap().is_none());

    h.engine.handle_event(postback("Uadmin", "LINK_ACCEPT=Unew")).await;
    let tenant = h.store.tenant_by_chat_user("Unew").await.unwrap().unwrap();
    assert_eq!(tenant.id, "t2");
    assert!(h.out.texts("Unew").iter().any(|t| t.contains("now linked")));

    // Acting twice on the same card is a no-op.
    h.engine.handle_event(postback("Uadmin", "LINK_ACCEPT=Unew")).await;
    assert!(h.out.texts("Uadmin").iter().any(|t| t.contains("already handled")));
}

#[tokio::test]
async fn staff_issued_code_links_immediately() {
    let h = harness();
    h.engine.handle_event(text("Ustaff", "code 0899999999")).await;
    let issued = h
        .out
        .texts("Ustaff")
        .into_iter()
        .find(|t| t.contains("Link code"))
        .unwrap();
    let code = issued
        .split(": ")
        .nth(1)
        .unwrap()
        .split_whitespace()
        .next()
        .unwrap()
        .to_string();

    h.engine.handle_event(text("Unew2", &code)).await;
    let tenant = h.store.tenant_by_chat_user("Unew2").await.unwrap().unwrap();
    assert_eq!(tenant.id, "t2");
}

#[tokio::test]
async fn unknown_text_stays_silent() {
    let h = harness();
    h.engine.handle_event(text("Utenant", "hello there")).await;
    assert!(h.out.texts("Utenant").is_empty());
}

#[tokio::test]
async fn unlinked_user_gets_guidance_on_pay() {
    let h = harness();
    h.engine.handle_event(text("Unew", "pay")).await;
    assert!(h.out.texts("Unew").iter().any(|t| t.contains("phone number")));
}
