//! Aggregation state and the serialized update path.
//!
//! Every mutation happens through [`Summary::update`], called from the
//! monitor's single consumer task while holding the summary lock.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::check::{Check, CheckResult, Metadata, Report};
use crate::clock::Clock;
use crate::report::{CheckSnapshot, HealthReport};
use crate::state::State;

/// Live subscriber queue.
struct Subscriber {
    tx: mpsc::Sender<Report>,
    dropped: u64,
}

pub(crate) struct Summary {
    clock: Arc<dyn Clock>,

    // health
    total_hp: f64,
    hp: f64,

    // state
    system: CheckResult,
    registered: Vec<Metadata>,
    last_results: HashMap<String, CheckResult>,
    last_known_results: HashMap<String, CheckResult>,

    // fan-out
    subscribers: HashMap<Uuid, Subscriber>,
    subscriber_capacity: usize,
    dropped: u64,
    closed: bool,
}

impl Summary {
    pub(crate) fn new(
        checks: &[Arc<dyn Check>],
        subscriber_capacity: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let registered: Vec<Metadata> = checks.iter().map(|c| c.metadata().clone()).collect();
        let total_weight: u64 = registered.iter().map(|m| u64::from(m.weight)).sum();

        let mut system = CheckResult::unknown();
        system.current_hp = Some(0.0);

        Self {
            clock,
            total_hp: total_weight as f64,
            hp: 0.0,
            system,
            registered,
            last_results: HashMap::new(),
            last_known_results: HashMap::new(),
            subscribers: HashMap::new(),
            subscriber_capacity,
            dropped: 0,
            closed: false,
        }
    }

    pub(crate) fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock = clock;
    }

    /// Fold one report into the aggregate and broadcast any transitions.
    pub(crate) fn update(&mut self, report: Report) {
        let Some(check) = report.check.as_ref() else {
            warn!("Ignoring report without an originating check");
            return;
        };

        let meta = check.metadata();
        let weight = f64::from(meta.weight);
        let new_state = report.result.state;

        let previous = self
            .last_results
            .insert(meta.name.clone(), report.result.clone());

        if let Some(prev) = &previous {
            self.hp -= prev.state.score() * weight;
        }
        self.hp += new_state.score() * weight;

        let changed = previous.as_ref().map_or(true, |prev| prev.state != new_state);

        if let Some(prev) = previous.filter(|prev| prev.state.is_known()) {
            self.last_known_results.insert(meta.name.clone(), prev);
        }

        if changed {
            debug!(check = %meta.name, state = %new_state, "Check state changed");
            self.broadcast(&report);
        }

        let (candidate, fraction) = if self.total_hp > 0.0 {
            let fraction = self.hp / self.total_hp;
            (State::for_score(fraction), fraction)
        } else {
            (State::Unknown, 0.0)
        };

        if candidate != self.system.state {
            info!(
                old_state = %self.system.state,
                new_state = %candidate,
                current_hp = fraction,
                "System state changed"
            );

            self.system = CheckResult {
                state: candidate,
                current_hp: Some(fraction),
                error: None,
                timestamp: self.clock.now(),
            };

            let system = Report::system(self.system.clone());
            self.broadcast(&system);
        }
    }

    /// Deliver a report to every subscriber without blocking.
    ///
    /// Full queues lose this report; closed queues are pruned.
    fn broadcast(&mut self, report: &Report) {
        let mut closed = Vec::new();

        for (id, subscriber) in self.subscribers.iter_mut() {
            match subscriber.tx.try_send(report.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    subscriber.dropped += 1;
                    self.dropped += 1;
                    warn!(
                        subscription = %id,
                        dropped = subscriber.dropped,
                        "Subscriber queue full, dropping report"
                    );
                }
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        for id in closed {
            debug!(subscription = %id, "Pruning closed subscriber");
            self.subscribers.remove(&id);
        }
    }

    pub(crate) fn subscribe(&mut self) -> (Uuid, mpsc::Receiver<Report>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.subscriber_capacity);

        if self.closed {
            // monitor already stopped: hand out a queue that is already at its end
            debug!(subscription = %id, "Subscriber registered after shutdown");
            return (id, rx);
        }

        self.subscribers.insert(id, Subscriber { tx, dropped: 0 });
        debug!(subscription = %id, "Subscriber registered");

        (id, rx)
    }

    /// Remove a subscriber, closing its queue. Returns whether it was live.
    pub(crate) fn unsubscribe(&mut self, id: &Uuid) -> bool {
        let removed = self.subscribers.remove(id).is_some();
        if removed {
            debug!(subscription = %id, "Subscriber removed");
        }
        removed
    }

    /// Close every subscriber queue, including any registered later.
    pub(crate) fn close_subscribers(&mut self) {
        self.closed = true;
        self.subscribers.clear();
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub(crate) fn dropped_reports(&self) -> u64 {
        self.dropped
    }

    pub(crate) fn report(&self) -> HealthReport {
        let results = self
            .registered
            .iter()
            .map(|meta| {
                let last_check = self
                    .last_results
                    .get(&meta.name)
                    .cloned()
                    .unwrap_or_default();
                let last_known_check = self
                    .last_known_results
                    .get(&meta.name)
                    .cloned()
                    .unwrap_or_else(|| last_check.clone());

                let snapshot = CheckSnapshot {
                    metadata: meta.clone(),
                    last_check,
                    last_known_check,
                };
                (meta.name.clone(), snapshot)
            })
            .collect();

        HealthReport {
            system: self.system.clone(),
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{DateTime, Utc};

    use super::*;
    use crate::check::Evaluation;
    use crate::clock::ManualClock;
    use crate::shutdown::Shutdown;

    struct StaticCheck {
        metadata: Metadata,
    }

    impl StaticCheck {
        fn new(name: &str, weight: u32) -> Arc<dyn Check> {
            Arc::new(Self {
                metadata: Metadata::new(name, weight),
            })
        }
    }

    impl Check for StaticCheck {
        fn metadata(&self) -> &Metadata {
            &self.metadata
        }

        fn watch(self: Arc<Self>, _shutdown: Shutdown, _reports: mpsc::Sender<Report>) {}
    }

    fn summary(checks: &[Arc<dyn Check>]) -> Summary {
        Summary::new(checks, checks.len() + 1, Arc::new(ManualClock::default()))
    }

    fn report(check: &Arc<dyn Check>, state: State) -> Report {
        Report::for_check(
            Arc::clone(check),
            Evaluation::new(state).at(DateTime::<Utc>::UNIX_EPOCH),
        )
    }

    fn drain(rx: &mut mpsc::Receiver<Report>) -> Vec<(bool, State)> {
        let mut seen = Vec::new();
        while let Ok(report) = rx.try_recv() {
            seen.push((report.is_system(), report.result.state));
        }
        seen
    }

    #[test]
    fn test_state_changes_broadcast_once() {
        // each state change yields one check event and one system event;
        // re-emissions of the same state propagate nothing
        let cases = [
            (State::Outage, vec![(false, State::Outage), (true, State::Outage)]),
            (State::Outage, vec![]),
            (State::Major, vec![(false, State::Major), (true, State::Major)]),
            (State::Major, vec![]),
            (State::Minor, vec![(false, State::Minor), (true, State::Minor)]),
            (State::Minor, vec![]),
            (State::Ok, vec![(false, State::Ok), (true, State::Ok)]),
            (State::Ok, vec![]),
        ];

        let check = StaticCheck::new("static", 100);
        let mut s = summary(&[Arc::clone(&check)]);
        let (_, mut rx) = s.subscribe();

        for (input, expected) in cases {
            s.update(report(&check, input));
            assert_eq!(drain(&mut rx), expected, "after feeding {input}");
        }
    }

    #[test]
    fn test_weighted_hp() {
        let db = StaticCheck::new("db", 30);
        let cache = StaticCheck::new("cache", 10);
        let mut s = summary(&[Arc::clone(&db), Arc::clone(&cache)]);

        s.update(report(&db, State::Ok));
        // 30 / 40
        assert_eq!(s.report().state(), State::Minor);
        assert_eq!(s.report().system.current_hp, Some(0.75));

        s.update(report(&cache, State::Ok));
        assert_eq!(s.report().state(), State::Ok);

        s.update(report(&db, State::Outage));
        // (7.5 + 10) / 40 = 0.4375
        assert_eq!(s.report().state(), State::Major);
        assert_eq!(s.report().system.current_hp, Some(0.4375));
    }

    #[test]
    fn test_late_subscriber_misses_earlier_reports() {
        let check = StaticCheck::new("static", 1);
        let mut s = summary(&[Arc::clone(&check)]);

        s.update(report(&check, State::Major));

        let (_, mut rx) = s.subscribe();
        assert!(drain(&mut rx).is_empty());

        s.update(report(&check, State::Ok));
        assert_eq!(drain(&mut rx), vec![(false, State::Ok), (true, State::Ok)]);
    }

    #[test]
    fn test_unsubscribe_closes_queue_and_frees_slot() {
        let check = StaticCheck::new("static", 1);
        let mut s = summary(&[Arc::clone(&check)]);

        let (id, mut rx) = s.subscribe();
        assert_eq!(s.subscriber_count(), 1);

        assert!(s.unsubscribe(&id));
        assert!(!s.unsubscribe(&id));
        assert_eq!(s.subscriber_count(), 0);

        s.update(report(&check, State::Ok));
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));

        let (_, mut replacement) = s.subscribe();
        s.update(report(&check, State::Minor));
        assert_eq!(drain(&mut replacement).len(), 2);
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let check = StaticCheck::new("static", 1);
        let mut s = summary(&[Arc::clone(&check)]);

        let (_, rx) = s.subscribe();
        drop(rx);

        s.update(report(&check, State::Ok));
        assert_eq!(s.subscriber_count(), 0);
    }

    #[test]
    fn test_full_subscriber_does_not_block() {
        let check = StaticCheck::new("static", 1);
        // capacity 2 fits exactly one transition
        let mut s = Summary::new(&[Arc::clone(&check)], 2, Arc::new(ManualClock::default()));
        let (_, mut slow) = s.subscribe();

        s.update(report(&check, State::Outage));
        s.update(report(&check, State::Ok));

        assert_eq!(s.dropped_reports(), 2);
        assert_eq!(s.subscriber_count(), 1);
        assert_eq!(
            drain(&mut slow),
            vec![(false, State::Outage), (true, State::Outage)]
        );
    }

    #[test]
    fn test_zero_weight_check_does_not_move_system() {
        let heavy = StaticCheck::new("heavy", 10);
        let free = StaticCheck::new("free", 0);
        let mut s = summary(&[Arc::clone(&heavy), Arc::clone(&free)]);

        s.update(report(&heavy, State::Ok));
        let (_, mut rx) = s.subscribe();

        s.update(report(&free, State::Outage));
        assert_eq!(drain(&mut rx), vec![(false, State::Outage)]);
        assert_eq!(s.report().state(), State::Ok);
        assert_eq!(s.report().system.current_hp, Some(1.0));
    }

    #[test]
    fn test_zero_total_weight_stays_unknown() {
        let free = StaticCheck::new("free", 0);
        let mut s = summary(&[Arc::clone(&free)]);
        let (_, mut rx) = s.subscribe();

        s.update(report(&free, State::Ok));

        assert_eq!(drain(&mut rx), vec![(false, State::Ok)]);
        assert_eq!(s.report().state(), State::Unknown);
    }

    #[test]
    fn test_system_timestamp_uses_clock() {
        let clock = Arc::new(ManualClock::default());
        let check = StaticCheck::new("static", 1);
        let mut s = Summary::new(&[Arc::clone(&check)], 2, clock.clone());

        clock.advance(chrono::Duration::minutes(5));
        s.update(report(&check, State::Ok));

        let system = s.report().system;
        assert_eq!(system.timestamp.timestamp(), 300);
    }

    #[test]
    fn test_report_last_known() {
        let check = StaticCheck::new("db", 1);
        let idle = StaticCheck::new("idle", 1);
        let mut s = summary(&[Arc::clone(&check), Arc::clone(&idle)]);

        let fresh = s.report();
        let never = fresh.check("db").unwrap();
        assert_eq!(never.last_check.state, State::Unknown);
        assert_eq!(never.last_known_check.state, State::Unknown);

        s.update(report(&check, State::Minor));
        let first = s.report();
        let snapshot = first.check("db").unwrap();
        assert_eq!(snapshot.last_check.state, State::Minor);
        // falls back to the last result until something known is replaced
        assert_eq!(snapshot.last_known_check.state, State::Minor);

        s.update(Report::for_check(
            Arc::clone(&check),
            Evaluation::with_error(State::Unknown, crate::ProbeError::Timeout(Duration::from_secs(1)))
                .at(DateTime::<Utc>::UNIX_EPOCH),
        ));
        let second = s.report();
        let snapshot = second.check("db").unwrap();
        assert_eq!(snapshot.last_check.state, State::Unknown);
        assert!(snapshot.last_check.error.is_some());
        assert_eq!(snapshot.last_known_check.state, State::Minor);

        s.update(report(&check, State::Unknown));
        let third = s.report();
        assert_eq!(third.check("db").unwrap().last_known_check.state, State::Minor);

        assert_eq!(third.check("idle").unwrap().last_check.state, State::Unknown);
    }

    #[test]
    fn test_system_report_ignored_as_input() {
        let check = StaticCheck::new("static", 1);
        let mut s = summary(&[Arc::clone(&check)]);
        let (_, mut rx) = s.subscribe();

        s.update(Report::system(Evaluation::new(State::Ok).at(DateTime::<Utc>::UNIX_EPOCH)));

        assert!(drain(&mut rx).is_empty());
        assert_eq!(s.report().state(), State::Unknown);
    }

    #[test]
    fn test_subscribe_after_close_is_already_closed() {
        let check = StaticCheck::new("static", 1);
        let mut s = summary(&[Arc::clone(&check)]);

        let (_, mut early) = s.subscribe();
        s.close_subscribers();
        assert!(matches!(
            early.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));

        let (_, mut late) = s.subscribe();
        assert_eq!(s.subscriber_count(), 0);
        assert!(matches!(
            late.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
