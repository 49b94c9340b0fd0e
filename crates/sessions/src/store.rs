//! Session store with single-shot expiry timers.
//!
//! Entries live in a std mutex map (guards are never held across await
//! points). Each `start` spawns one timer task; replacing or clearing a
//! session aborts its timer, and a generation counter keeps a stale timer
//! that already passed its sleep from clearing a replacement session.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {async_trait::async_trait, tokio::task::AbortHandle, tracing::debug};

use crate::flow::{FlowKind, FlowSession};

/// Best-effort expiry notification seam. Implementations must swallow their
/// own send failures; the store never propagates them.
#[async_trait]
pub trait ExpiryNotify: Send + Sync {
    async fn session_expired(&self, user_id: &str, kind: FlowKind);
}

struct Entry {
    session: FlowSession,
    generation: u64,
    timer: AbortHandle,
}

type EntryMap = Arc<Mutex<HashMap<(String, FlowKind), Entry>>>;

/// Per-user, per-flow session store.
#[derive(Clone)]
pub struct SessionStore {
    entries: EntryMap,
    notify: Arc<Mutex<Option<Arc<dyn ExpiryNotify>>>>,
    generation: Arc<AtomicU64>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            notify: Arc::new(Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Install the expiry notifier. Called once at wiring time; the engine
    /// needs the store to exist before it can construct the notifier.
    pub fn set_notifier(&self, notifier: Arc<dyn ExpiryNotify>) {
        *self.notify.lock().unwrap_or_else(|e| e.into_inner()) = Some(notifier);
    }

    /// Start (or restart) a session. Any prior session of the same kind is
    /// replaced and its timer aborted; the new timer runs the full `ttl`.
    pub fn start(&self, user_id: &str, session: FlowSession, ttl: Duration) {
        let kind = session.kind();
        self.arm(user_id, kind, session, ttl);
    }

    /// Snapshot of the live session, if any.
    #[must_use]
    pub fn get(&self, user_id: &str, kind: FlowKind) -> Option<FlowSession> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(&(user_id.to_string(), kind))
            .map(|e| e.session.clone())
    }

    /// Mutate the live session in place without touching its timer.
    /// Returns false when the session is gone (expired or replaced).
    pub fn update(
        &self,
        user_id: &str,
        kind: FlowKind,
        mutate: impl FnOnce(&mut FlowSession),
    ) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get_mut(&(user_id.to_string(), kind)) {
            Some(entry) => {
                mutate(&mut entry.session);
                true
            },
            None => false,
        }
    }

    /// Re-arm the timer of a live session, keeping its state.
    pub fn extend(&self, user_id: &str, kind: FlowKind, ttl: Duration) -> bool {
        let session = match self.get(user_id, kind) {
            Some(s) => s,
            None => return false,
        };
        self.arm(user_id, kind, session, ttl);
        true
    }

    /// Remove a session and cancel its pending timer. Clearing an
    /// already-fired (or absent) session is a no-op.
    pub fn clear(&self, user_id: &str, kind: FlowKind) -> Option<FlowSession> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(&(user_id.to_string(), kind)).map(|entry| {
            entry.timer.abort();
            entry.session
        })
    }

    /// Blocking-flow predicate: does the user hold a live session of a
    /// blocking kind other than `kind`?
    #[must_use]
    pub fn is_busy_with_other(&self, user_id: &str, kind: FlowKind) -> Option<FlowKind> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        FlowKind::BLOCKING
            .iter()
            .copied()
            .find(|k| *k != kind && entries.contains_key(&(user_id.to_string(), *k)))
    }

    /// Number of live sessions across all users (diagnostics).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn arm(&self, user_id: &str, kind: FlowKind, session: FlowSession, ttl: Duration) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let key = (user_id.to_string(), kind);

        let entries = Arc::clone(&self.entries);
        let notify = Arc::clone(&self.notify);
        let timer_key = key.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let removed = {
                let mut entries = entries.lock().unwrap_or_else(|e| e.into_inner());
                match entries.get(&timer_key) {
                    Some(entry) if entry.generation == generation => {
                        entries.remove(&timer_key);
                        true
                    },
                    // Replaced while we slept; the new timer owns the entry.
                    _ => false,
                }
            };
            if removed {
                debug!(user_id = %timer_key.0, flow = %timer_key.1, "session expired");
                let notifier = notify.lock().unwrap_or_else(|e| e.into_inner()).clone();
                if let Some(notifier) = notifier {
                    notifier.session_expired(&timer_key.0, timer_key.1).await;
                }
            }
        })
        .abort_handle();

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = entries.insert(key, Entry {
            session,
            generation,
            timer,
        }) {
            old.timer.abort();
        }
    }
}

// ── Payment context ─────────────────────────────────────────────────────────

/// Which invoice an uploaded slip pays.
#[derive(Debug, Clone)]
pub struct PaymentTarget {
    pub invoice_id: String,
    pub contract_id: String,
    /// True when the user named the billing period; an explicit target is
    /// never second-guessed by the amount-match fallback.
    pub explicit: bool,
}

struct CtxEntry {
    target: PaymentTarget,
    generation: u64,
    timer: AbortHandle,
}

/// TTL map from user id to payment target. Same expiry discipline as
/// [`SessionStore`], but expiry is silent.
#[derive(Clone)]
pub struct PaymentContexts {
    entries: Arc<Mutex<HashMap<String, CtxEntry>>>,
    generation: Arc<AtomicU64>,
}

impl Default for PaymentContexts {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentContexts {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn arm(&self, user_id: &str, target: PaymentTarget, ttl: Duration) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let entries = Arc::clone(&self.entries);
        let timer_user = user_id.to_string();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let mut entries = entries.lock().unwrap_or_else(|e| e.into_inner());
            if entries.get(&timer_user).is_some_and(|e| e.generation == generation) {
                entries.remove(&timer_user);
                debug!(user_id = %timer_user, "payment context expired");
            }
        })
        .abort_handle();

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = entries.insert(user_id.to_string(), CtxEntry {
            target,
            generation,
            timer,
        }) {
            old.timer.abort();
        }
    }

    #[must_use]
    pub fn get(&self, user_id: &str) -> Option<PaymentTarget> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(user_id).map(|e| e.target.clone())
    }

    pub fn clear(&self, user_id: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.remove(user_id) {
            entry.timer.abort();
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use {
        super::*,
        crate::flow::{PaymentSession, TenantMoveOutSession},
    };

    fn payment() -> FlowSession {
        FlowSession::Payment(PaymentSession::await_slip())
    }

    fn moveout() -> FlowSession {
        FlowSession::TenantMoveOut(TenantMoveOutSession::new("c1", "A/3/304"))
    }

    #[derive(Default)]
    struct CountingNotify {
        fired: AtomicUsize,
    }

    #[async_trait]
    impl ExpiryNotify for CountingNotify {
        async fn session_expired(&self, _user_id: &str, _kind: FlowKind) {
            self.fired.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn session_expires_and_notifies() {
        let store = SessionStore::new();
        let notify = Arc::new(CountingNotify::default());
        store.set_notifier(Arc::clone(&notify) as Arc<dyn ExpiryNotify>);

        store.start("u1", payment(), Duration::from_secs(180));
        assert!(store.get("u1", FlowKind::Payment).is_some());

        tokio::time::sleep(Duration::from_secs(181)).await;
        assert!(store.get("u1", FlowKind::Payment).is_none());
        assert_eq!(notify.fired.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_session_and_resets_timer() {
        let store = SessionStore::new();
        let notify = Arc::new(CountingNotify::default());
        store.set_notifier(Arc::clone(&notify) as Arc<dyn ExpiryNotify>);

        store.start("u1", payment(), Duration::from_secs(180));
        tokio::time::sleep(Duration::from_secs(170)).await;
        // Re-entering replaces, not extends: the fresh timer runs a full TTL.
        store.start("u1", payment(), Duration::from_secs(180));
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(
            store.get("u1", FlowKind::Payment).is_some(),
            "replacement session must survive past the old deadline"
        );
        // The replaced timer must not have fired a notification.
        assert_eq!(notify.fired.load(Ordering::Relaxed), 0);

        tokio::time::sleep(Duration::from_secs(180)).await;
        assert!(store.get("u1", FlowKind::Payment).is_none());
        assert_eq!(notify.fired.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn at_most_one_session_per_kind() {
        let store = SessionStore::new();
        store.start("u1", payment(), Duration::from_secs(180));
        store.start("u1", payment(), Duration::from_secs(180));
        store.start("u1", moveout(), Duration::from_secs(180));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_cancels_timer_without_notify() {
        let store = SessionStore::new();
        let notify = Arc::new(CountingNotify::default());
        store.set_notifier(Arc::clone(&notify) as Arc<dyn ExpiryNotify>);

        store.start("u1", payment(), Duration::from_secs(180));
        assert!(store.clear("u1", FlowKind::Payment).is_some());
        // Clearing again (already fired or absent) is a no-op.
        assert!(store.clear("u1", FlowKind::Payment).is_none());

        tokio::time::sleep(Duration::from_secs(200)).await;
        assert_eq!(notify.fired.load(Ordering::Relaxed), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn update_mutates_without_rearming() {
        let store = SessionStore::new();
        store.start("u1", moveout(), Duration::from_secs(180));
        tokio::time::sleep(Duration::from_secs(100)).await;

        let updated = store.update("u1", FlowKind::TenantMoveOut, |s| {
            if let FlowSession::TenantMoveOut(m) = s {
                m.planned_date = Some("end of month".into());
            }
        });
        assert!(updated);

        // Timer untouched: the original deadline still applies.
        tokio::time::sleep(Duration::from_secs(81)).await;
        assert!(store.get("u1", FlowKind::TenantMoveOut).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn busy_predicate_ignores_ack_sessions() {
        let store = SessionStore::new();
        store.start("u1", payment(), Duration::from_secs(180));
        assert_eq!(
            store.is_busy_with_other("u1", FlowKind::Maintenance),
            Some(FlowKind::Payment)
        );
        assert_eq!(store.is_busy_with_other("u1", FlowKind::Payment), None);

        let ack = FlowSession::MaintenanceAck(crate::flow::MaintenanceAckSession {
            request_id: "r1".into(),
            room_label: "A/3/304".into(),
            step: crate::flow::MaintenanceAckStep::AwaitDecision,
        });
        let store2 = SessionStore::new();
        store2.start("u2", ack, Duration::from_secs(120));
        assert_eq!(store2.is_busy_with_other("u2", FlowKind::Payment), None);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_users_never_contend() {
        let store = SessionStore::new();
        store.start("u1", payment(), Duration::from_secs(180));
        store.start("u2", payment(), Duration::from_secs(180));
        store.clear("u1", FlowKind::Payment);
        assert!(store.get("u2", FlowKind::Payment).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn payment_context_expires_silently() {
        let contexts = PaymentContexts::new();
        contexts.arm(
            "u1",
            PaymentTarget {
                invoice_id: "i1".into(),
                contract_id: "c1".into(),
                explicit: true,
            },
            Duration::from_secs(180),
        );
        assert!(contexts.get("u1").is_some());
        tokio::time::sleep(Duration::from_secs(181)).await;
        assert!(contexts.get("u1").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn payment_context_rearm_replaces_timer() {
        let contexts = PaymentContexts::new();
        let target = PaymentTarget {
            invoice_id: "i1".into(),
            contract_id: "c1".into(),
            explicit: false,
        };
        contexts.arm("u1", target.clone(), Duration::from_secs(180));
        tokio::time::sleep(Duration::from_secs(170)).await;
        contexts.arm("u1", target, Duration::from_secs(180));
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(contexts.get("u1").is_some());
    }
}
