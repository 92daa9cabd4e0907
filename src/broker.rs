//! Offer/response broker
//!
//! Correlates the single outstanding offer per agent with the decision that
//! eventually arrives on the decision bus. Waiters are one-shot: the first
//! decision for an agent resolves and removes the registration, so a second
//! decision is a no-op.

use crate::transport::DecisionSubscription;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

struct Waiter {
    registration: u64,
    customer_id: Option<String>,
    tx: oneshot::Sender<bool>,
}

/// Waiter registry keyed by agent id
#[derive(Default)]
pub struct OfferBroker {
    waiters: Mutex<HashMap<String, Waiter>>,
    next_registration: AtomicU64,
}

/// A registered wait for one agent's decision
///
/// Dropping it without waiting withdraws the registration.
pub struct PendingOffer<'a> {
    broker: &'a OfferBroker,
    agent_id: String,
    registration: u64,
    rx: oneshot::Receiver<bool>,
}

impl OfferBroker {
    pub fn new() -> Self {
        Self::default()
    }

    // Critical sections never panic while holding the lock, so a poisoned
    // map is still consistent.
    fn waiters(&self) -> MutexGuard<'_, HashMap<String, Waiter>> {
        self.waiters.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register interest in `agent_id`'s next decision
    ///
    /// A registration already pending for the agent is replaced; its
    /// holder is never resolved and runs out its own timeout.
    pub fn register(&self, agent_id: &str, customer_id: Option<&str>) -> PendingOffer<'_> {
        let registration = self.next_registration.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        let previous = self.waiters().insert(
            agent_id.to_string(),
            Waiter {
                registration,
                customer_id: customer_id.map(str::to_string),
                tx,
            },
        );
        if previous.is_some() {
            tracing::warn!(
                agent_id = %agent_id,
                "Offer already pending for agent, replacing stale registration"
            );
        }

        PendingOffer {
            broker: self,
            agent_id: agent_id.to_string(),
            registration,
            rx,
        }
    }

    /// Wait up to `timeout` for `agent_id`'s decision
    ///
    /// Resolves `true` only on an accepting decision; a rejection or the
    /// timeout resolves `false`.
    pub async fn await_decision(&self, agent_id: &str, timeout: Duration) -> bool {
        self.register(agent_id, None).wait(timeout).await
    }

    /// Resolve the pending waiter for `agent_id`, if any
    ///
    /// Returns whether a waiter was resolved. Late or unsolicited decisions
    /// are logged and dropped.
    pub fn deliver_decision(
        &self,
        agent_id: &str,
        accepted: bool,
        customer_id: Option<&str>,
    ) -> bool {
        let waiter = self.waiters().remove(agent_id);
        let Some(waiter) = waiter else {
            tracing::debug!(
                agent_id = %agent_id,
                customer_id = ?customer_id,
                accepted,
                "No pending offer for decision, dropped"
            );
            return false;
        };

        if let (Some(expected), Some(got)) = (waiter.customer_id.as_deref(), customer_id) {
            if expected != got {
                tracing::warn!(
                    agent_id = %agent_id,
                    expected = %expected,
                    got = %got,
                    "Decision names a different customer than the pending offer"
                );
            }
        }

        waiter.tx.send(accepted).is_ok()
    }

    /// Number of registered waiters
    pub fn pending(&self) -> usize {
        self.waiters().len()
    }

    /// Whether a waiter is registered for `agent_id`
    pub fn is_pending(&self, agent_id: &str) -> bool {
        self.waiters().contains_key(agent_id)
    }

    /// Route every decision from `subscription` into this broker
    ///
    /// The task ends when the subscription closes.
    pub fn spawn_listener(
        self: &Arc<Self>,
        mut subscription: Box<dyn DecisionSubscription>,
    ) -> JoinHandle<()> {
        let broker = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match subscription.next().await {
                    Ok(Some(decision)) => {
                        tracing::info!(
                            agent_id = %decision.agent_id,
                            customer_id = ?decision.customer_id,
                            accepted = decision.accepted,
                            "Agent decision received"
                        );
                        broker.deliver_decision(
                            &decision.agent_id,
                            decision.accepted,
                            decision.customer_id.as_deref(),
                        );
                    }
                    Ok(None) => {
                        tracing::info!("Decision subscription closed, listener stopping");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read agent decision");
                    }
                }
            }
        })
    }
}

impl PendingOffer<'_> {
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Wait for the decision, resolving `false` on rejection or timeout
    pub async fn wait(mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        match tokio::time::timeout_at(deadline, &mut self.rx).await {
            Ok(Ok(accepted)) => accepted,
            Ok(Err(_)) => {
                // Replaced by a newer registration: run out the clock
                tokio::time::sleep_until(deadline).await;
                false
            }
            Err(_) => {
                tracing::debug!(
                    agent_id = %self.agent_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Offer timed out"
                );
                false
            }
        }
    }
}

impl Drop for PendingOffer<'_> {
    fn drop(&mut self) {
        let mut waiters = self.broker.waiters();
        if waiters
            .get(&self.agent_id)
            .is_some_and(|w| w.registration == self.registration)
        {
            waiters.remove(&self.agent_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryTransport;
    use crate::transport::DecisionBus;
    use crate::types::AgentDecision;

    const TIMEOUT: Duration = Duration::from_secs(30);

    fn spawn_wait(broker: &Arc<OfferBroker>, agent_id: &'static str) -> JoinHandle<bool> {
        let broker = broker.clone();
        tokio::spawn(async move { broker.await_decision(agent_id, TIMEOUT).await })
    }

    #[tokio::test(start_paused = true)]
    async fn test_accepting_decision_resolves_true() {
        let broker = Arc::new(OfferBroker::new());
        let waiter = spawn_wait(&broker, "a");
        tokio::task::yield_now().await;
        assert!(broker.is_pending("a"));

        assert!(broker.deliver_decision("a", true, Some("c1")));
        assert!(waiter.await.unwrap());
        assert_eq!(broker.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejecting_decision_resolves_false() {
        let broker = Arc::new(OfferBroker::new());
        let waiter = spawn_wait(&broker, "a");
        tokio::task::yield_now().await;

        let started = Instant::now();
        assert!(broker.deliver_decision("a", false, None));
        assert!(!waiter.await.unwrap());
        assert!(started.elapsed() < TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_resolves_false_within_deadline() {
        let broker = OfferBroker::new();
        let started = Instant::now();
        assert!(!broker.await_decision("a", TIMEOUT).await);

        let elapsed = started.elapsed();
        assert!(elapsed >= TIMEOUT);
        assert!(elapsed < TIMEOUT + Duration::from_millis(10));
        assert_eq!(broker.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_decision_is_noop() {
        let broker = Arc::new(OfferBroker::new());
        let waiter = spawn_wait(&broker, "a");
        tokio::task::yield_now().await;

        assert!(broker.deliver_decision("a", true, None));
        assert!(!broker.deliver_decision("a", false, None));
        assert!(waiter.await.unwrap());
    }

    #[test]
    fn test_unsolicited_decision_is_dropped() {
        let broker = OfferBroker::new();
        assert!(!broker.deliver_decision("ghost", true, Some("c1")));
        assert_eq!(broker.pending(), 0);
    }

    #[test]
    fn test_dropped_registration_is_withdrawn() {
        let broker = OfferBroker::new();
        let pending = broker.register("a", Some("c1"));
        assert_eq!(pending.agent_id(), "a");
        assert!(broker.is_pending("a"));

        drop(pending);
        assert!(!broker.is_pending("a"));
        assert!(!broker.deliver_decision("a", true, Some("c1")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_registration_last_wins() {
        let broker = Arc::new(OfferBroker::new());
        let started = Instant::now();

        let stale = spawn_wait(&broker, "a");
        tokio::task::yield_now().await;
        let fresh = spawn_wait(&broker, "a");
        tokio::task::yield_now().await;
        assert_eq!(broker.pending(), 1);

        assert!(broker.deliver_decision("a", true, None));
        assert!(fresh.await.unwrap());

        // The stale waiter is not resolved by the decision; it times out
        assert!(!stale.await.unwrap());
        assert!(started.elapsed() >= TIMEOUT);
    }

    #[test]
    fn test_stale_drop_keeps_newer_registration() {
        let broker = OfferBroker::new();
        let stale = broker.register("a", None);
        let fresh = broker.register("a", None);

        drop(stale);
        assert!(broker.is_pending("a"));
        drop(fresh);
        assert!(!broker.is_pending("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_are_independent_per_agent() {
        let broker = Arc::new(OfferBroker::new());
        let a = spawn_wait(&broker, "a");
        let b = spawn_wait(&broker, "b");
        tokio::task::yield_now().await;
        assert_eq!(broker.pending(), 2);

        broker.deliver_decision("b", true, None);
        assert!(b.await.unwrap());
        assert!(!a.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_listener_routes_bus_decisions() {
        let transport = MemoryTransport::default();
        let broker = Arc::new(OfferBroker::new());
        let listener = broker.spawn_listener(transport.subscribe().await.unwrap());

        let pending = broker.register("a", Some("c1"));
        transport
            .publish(&AgentDecision::accepted("a", "c1"))
            .await
            .unwrap();
        assert!(pending.wait(TIMEOUT).await);

        drop(transport);
        listener.await.unwrap();
    }
}
