//! One trade cycle: gate -> predict -> read exposure -> decide -> execute -> log -> notify
//!
//! Every completed cycle leaves exactly one row in the trade or skipped log.
//! A cycle that fails leaves no row; the failure goes to the notifier instead.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::TradeResult;
use crate::execution::{ExecutionOutcome, Executor};
use crate::ml_engine::SignalProvider;
use crate::notify::{messages, Notifier};
use crate::persistence::{format_timestamp, SkippedRecord, TradeJournal, TradeRecord};
use crate::state::SharedStateHandle;
use crate::strategy::{decide, gate, is_market_open, SkipReason};
use crate::types::{Exposure, Signal};

/// Wall clock source, swappable so cycles can be run at a fixed instant
pub type Clock = fn() -> DateTime<Utc>;

pub struct TradeCycle {
    instrument: String,
    min_confidence: f64,
    state: SharedStateHandle,
    signals: Arc<dyn SignalProvider>,
    executor: Executor,
    journal: Arc<dyn TradeJournal>,
    notifier: Arc<dyn Notifier>,
    clock: Clock,
}

impl TradeCycle {
    pub fn new(
        instrument: &str,
        min_confidence: f64,
        state: SharedStateHandle,
        signals: Arc<dyn SignalProvider>,
        executor: Executor,
        journal: Arc<dyn TradeJournal>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            instrument: instrument.to_string(),
            min_confidence,
            state,
            signals,
            executor,
            journal,
            notifier,
            clock: Utc::now,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Run one cycle. Errors are logged and notified here; the returned
    /// result is informational for the caller.
    pub async fn run(&self) -> TradeResult<ExecutionOutcome> {
        let span = info_span!(
            "trade_cycle",
            cycle_id = %Uuid::new_v4(),
            instrument = %self.instrument
        );
        async {
            let result = self.run_inner().await;
            if let Err(e) = &result {
                error!(error = %e, "Trade cycle failed");
                self.notifier.send(&messages::trade_error(&e.to_string())).await;
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_inner(&self) -> TradeResult<ExecutionOutcome> {
        let now = (self.clock)();
        let market_open = is_market_open(now);

        if let Some(reason) = gate(self.state.is_paused().await, market_open) {
            self.record_skip(now, None, reason, reason.as_str().to_string())
                .await;
            return Ok(ExecutionOutcome::Skipped(reason));
        }

        let signal = self.signals.predict().await?;
        self.state.record_prediction(signal.clone()).await;
        info!(
            direction = %signal.direction,
            confidence = signal.confidence,
            "Signal received"
        );

        let positions = self.executor.store().get_open_positions().await?;
        let exposure = Exposure::from_positions(&self.instrument, &positions);

        // The operator may have paused while the prediction was in flight.
        let paused = self.state.is_paused().await;
        let decision = decide(paused, market_open, &signal, &exposure, self.min_confidence);
        info!(
            decision = %decision,
            net_units = exposure.net_units,
            "Decision made"
        );

        let outcome = self.executor.execute(&decision, &self.instrument).await?;
        match &outcome {
            ExecutionOutcome::Skipped(reason) => {
                let detail = self.skip_detail(*reason, &signal, &exposure);
                self.record_skip(now, Some(&signal), *reason, detail).await;
            }
            ExecutionOutcome::Entered {
                direction, units, ..
            }
            | ExecutionOutcome::Flipped {
                direction, units, ..
            } => {
                let action = outcome.action().unwrap_or("ENTER");
                let record = TradeRecord {
                    timestamp: format_timestamp(now),
                    direction: direction.to_string(),
                    confidence: signal.confidence,
                    action: action.to_string(),
                    units: *units,
                    indicators: signal.features_json(),
                };
                if let Err(e) = self.journal.append_trade(record).await {
                    warn!(error = %format!("{:#}", e), "Failed to append trade record");
                }
                self.notifier
                    .send(&messages::trade_alert(
                        *direction,
                        signal.confidence,
                        action,
                        *units,
                    ))
                    .await;
            }
        }
        Ok(outcome)
    }

    fn skip_detail(&self, reason: SkipReason, signal: &Signal, exposure: &Exposure) -> String {
        match reason {
            SkipReason::LowConfidence => format!(
                "{} ({:.2} < {:.2})",
                reason, signal.confidence, self.min_confidence
            ),
            SkipReason::AlreadyHolding => {
                format!("{} ({} units {})", reason, exposure.net_units, signal.direction)
            }
            _ => reason.as_str().to_string(),
        }
    }

    async fn record_skip(
        &self,
        now: DateTime<Utc>,
        signal: Option<&Signal>,
        reason: SkipReason,
        detail: String,
    ) {
        info!(reason = %reason, detail = %detail, "Trade skipped");
        let record = SkippedRecord {
            timestamp: format_timestamp(now),
            direction: signal.map(|s| s.direction.to_string()),
            confidence: signal.map(|s| s.confidence),
            reason_skipped: detail.clone(),
            indicators: signal
                .map(|s| s.features_json())
                .unwrap_or_else(|| "{}".to_string()),
        };
        if let Err(e) = self.journal.append_skipped(record).await {
            warn!(error = %format!("{:#}", e), "Failed to append skipped record");
        }
        self.notifier.send(&messages::skipped(&detail)).await;
    }
}
