//! End-to-end trade cycle scenarios against recording fakes

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use fxbot::broker::{CloseOutcome, OrderAck, PositionStore};
    use fxbot::cycle::TradeCycle;
    use fxbot::execution::{ExecutionOutcome, Executor};
    use fxbot::ml_engine::SignalProvider;
    use fxbot::notify::Notifier;
    use fxbot::persistence::{CsvPersistence, TradeJournal};
    use fxbot::scheduler::{spawn_guarded_interval, TaskGuard};
    use fxbot::state::SharedState;
    use fxbot::strategy::SkipReason;
    use fxbot::types::{Direction, OpenPosition, Signal};
    use fxbot::{TradeError, TradeResult};

    // ============================================================================
    // Fakes
    // ============================================================================

    /// Position store that records every call in order
    struct RecordingStore {
        positions: Vec<OpenPosition>,
        fail_close: bool,
        fail_open: bool,
        read_delay: Option<Duration>,
        calls: Mutex<Vec<String>>,
    }

    impl RecordingStore {
        fn holding(units: i64) -> Self {
            let positions = if units == 0 {
                Vec::new()
            } else {
                vec![OpenPosition {
                    instrument: "GBP_USD".to_string(),
                    signed_units: units,
                }]
            };
            Self {
                positions,
                fail_close: false,
                fail_open: false,
                read_delay: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn mutations(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|c| c != "get_open_positions")
                .collect()
        }
    }

    #[async_trait]
    impl PositionStore for RecordingStore {
        async fn get_open_positions(&self) -> TradeResult<Vec<OpenPosition>> {
            self.calls.lock().unwrap().push("get_open_positions".to_string());
            if let Some(delay) = self.read_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.positions.clone())
        }

        async fn open(&self, instrument: &str, signed_units: i64) -> TradeResult<OrderAck> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("open {} {}", instrument, signed_units));
            if self.fail_open {
                return Err(TradeError::transport(Some(503), "service unavailable"));
            }
            Ok(OrderAck {
                transaction_id: Some("100".to_string()),
                fill_price: Some(1.2712),
                units: signed_units,
            })
        }

        async fn close_all(&self, instrument: &str) -> TradeResult<CloseOutcome> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("close_all {}", instrument));
            if self.fail_close {
                return Err(TradeError::transport(Some(502), "bad gateway"));
            }
            Ok(CloseOutcome::Closed {
                long_units: 0,
                short_units: -1000,
            })
        }
    }

    struct FixedSignal(Signal);

    #[async_trait]
    impl SignalProvider for FixedSignal {
        async fn predict(&self) -> TradeResult<Signal> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier(Mutex<Vec<String>>);

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, text: &str) {
            self.0.lock().unwrap().push(text.to_string());
        }
    }

    // ============================================================================
    // Harness
    // ============================================================================

    fn wednesday_noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap()
    }

    fn temp_data_dir(test_name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "fxbot_scenario_{}_{}",
            test_name,
            uuid::Uuid::new_v4()
        ))
    }

    struct Scenario {
        cycle: TradeCycle,
        store: Arc<RecordingStore>,
        journal: Arc<CsvPersistence>,
        notifier: Arc<RecordingNotifier>,
        dir: PathBuf,
    }

    fn scenario(name: &str, store: RecordingStore, signal: Signal) -> Scenario {
        let dir = temp_data_dir(name);
        let store = Arc::new(store);
        let journal =
            Arc::new(CsvPersistence::new(&dir, "trade_log.csv", "skipped_trades.csv").unwrap());
        let notifier = Arc::new(RecordingNotifier::default());
        let journal_dyn: Arc<dyn TradeJournal> = journal.clone();
        let cycle = TradeCycle::new(
            "GBP_USD",
            0.55,
            SharedState::handle(),
            Arc::new(FixedSignal(signal)),
            Executor::new(store.clone(), 1000),
            journal_dyn,
            notifier.clone(),
        )
        .with_clock(wednesday_noon);
        Scenario {
            cycle,
            store,
            journal,
            notifier,
            dir,
        }
    }

    // ============================================================================
    // Scenarios
    // ============================================================================

    #[test]
    fn test_low_confidence_logs_one_skip_and_never_mutates() {
        let s = scenario(
            "low_confidence",
            RecordingStore::holding(0),
            Signal::new(Direction::Long, 0.40),
        );

        let outcome = tokio_test::block_on(s.cycle.run()).unwrap();
        assert_eq!(outcome, ExecutionOutcome::Skipped(SkipReason::LowConfidence));
        assert!(s.store.mutations().is_empty());

        let skipped = s.journal.load_skipped().unwrap();
        assert_eq!(skipped.len(), 1);
        assert!(skipped[0].reason_skipped.contains("0.40"));
        assert_eq!(skipped[0].confidence, Some(0.40));
        assert!(s.journal.load_trades().unwrap().is_empty());

        let _ = std::fs::remove_dir_all(&s.dir);
    }

    #[tokio::test]
    async fn test_opposite_exposure_flips_close_then_open() {
        let s = scenario(
            "flip",
            RecordingStore::holding(-1000),
            Signal::new(Direction::Long, 0.70),
        );

        let outcome = s.cycle.run().await.unwrap();
        assert!(matches!(
            outcome,
            ExecutionOutcome::Flipped {
                direction: Direction::Long,
                units: 1000,
                closed: true,
                ..
            }
        ));
        assert_eq!(
            s.store.mutations(),
            vec!["close_all GBP_USD".to_string(), "open GBP_USD 1000".to_string()]
        );

        let trades = s.journal.load_trades().unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].action, "FLIP");
        assert_eq!(trades[0].units, 1000);
        assert!(s.journal.load_skipped().unwrap().is_empty());

        let sent = s.notifier.0.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("FLIP signal"));

        let _ = std::fs::remove_dir_all(&s.dir);
    }

    #[tokio::test]
    async fn test_failed_flip_close_never_opens_and_logs_no_row() {
        let mut store = RecordingStore::holding(-1000);
        store.fail_close = true;
        let s = scenario("flip_close_fails", store, Signal::new(Direction::Long, 0.70));

        let err = s.cycle.run().await.unwrap_err();
        assert!(matches!(err, TradeError::State(_)));
        assert_eq!(s.store.mutations(), vec!["close_all GBP_USD".to_string()]);

        assert!(s.journal.load_trades().unwrap().is_empty());
        assert!(s.journal.load_skipped().unwrap().is_empty());
        let sent = s.notifier.0.lock().unwrap().clone();
        assert!(sent[0].starts_with("❌ Trade error"));

        let _ = std::fs::remove_dir_all(&s.dir);
    }

    #[tokio::test]
    async fn test_failed_flip_open_is_notified_and_logs_no_row() {
        let mut store = RecordingStore::holding(-1000);
        store.fail_open = true;
        let s = scenario("flip_open_fails", store, Signal::new(Direction::Long, 0.70));

        let err = s.cycle.run().await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(
            s.store.mutations(),
            vec!["close_all GBP_USD".to_string(), "open GBP_USD 1000".to_string()]
        );

        assert!(s.journal.load_trades().unwrap().is_empty());
        assert!(s.journal.load_skipped().unwrap().is_empty());
        let sent = s.notifier.0.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("❌ Trade error"));
        assert!(sent[0].contains("503"));

        let _ = std::fs::remove_dir_all(&s.dir);
    }

    #[tokio::test]
    async fn test_failed_enter_is_notified_and_logs_no_row() {
        let mut store = RecordingStore::holding(0);
        store.fail_open = true;
        let s = scenario("enter_fails", store, Signal::new(Direction::Short, 0.80));

        let err = s.cycle.run().await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(s.store.mutations(), vec!["open GBP_USD -1000".to_string()]);

        assert!(s.journal.load_trades().unwrap().is_empty());
        assert!(s.journal.load_skipped().unwrap().is_empty());
        let sent = s.notifier.0.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("❌ Trade error"));

        let _ = std::fs::remove_dir_all(&s.dir);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_cycle_drops_the_next_tick() {
        let mut store = RecordingStore::holding(0);
        // the exposure read outlasts the 15 minute interval
        store.read_delay = Some(Duration::from_secs(20 * 60));
        let s = scenario("overlap", store, Signal::new(Direction::Short, 0.80));

        let cycle = Arc::new(s.cycle);
        let handle = spawn_guarded_interval(
            "trade_cycle",
            Duration::from_secs(15 * 60),
            TaskGuard::new(),
            move || {
                let cycle = cycle.clone();
                async move {
                    let _ = cycle.run().await;
                }
            },
        );

        // tick at 15m starts cycle 1 (finishes at 35m); tick at 30m is dropped
        tokio::time::sleep(Duration::from_secs(36 * 60)).await;
        handle.abort();

        let calls = s.store.calls();
        assert_eq!(
            calls.iter().filter(|c| *c == "get_open_positions").count(),
            1
        );
        assert_eq!(s.store.mutations(), vec!["open GBP_USD -1000".to_string()]);
        assert_eq!(s.journal.load_trades().unwrap().len(), 1);

        let _ = std::fs::remove_dir_all(&s.dir);
    }
}
