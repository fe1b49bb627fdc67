//! Reconciliation Executor
//!
//! Applies one `Decision` to the position store. A flip is always
//! close-then-open, strictly sequential: the open is only issued once the
//! close has succeeded or reported there was nothing to close.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::broker::{CloseOutcome, OrderAck, PositionStore};
use crate::error::{TradeError, TradeResult};
use crate::strategy::{Decision, SkipReason};
use crate::types::Direction;

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Skipped(SkipReason),
    Entered {
        direction: Direction,
        units: i64,
        ack: OrderAck,
    },
    Flipped {
        direction: Direction,
        units: i64,
        /// False when the venue was already flat at close time
        closed: bool,
        ack: OrderAck,
    },
}

impl ExecutionOutcome {
    /// Action label for the trade log; `None` for skips
    pub fn action(&self) -> Option<&'static str> {
        match self {
            Self::Skipped(_) => None,
            Self::Entered { .. } => Some("ENTER"),
            Self::Flipped { .. } => Some("FLIP"),
        }
    }
}

pub struct Executor {
    store: Arc<dyn PositionStore>,
    units: i64,
}

impl Executor {
    /// `units` is the unsigned order size; direction supplies the sign
    pub fn new(store: Arc<dyn PositionStore>, units: i64) -> Self {
        Self {
            store,
            units: units.abs(),
        }
    }

    pub fn store(&self) -> &Arc<dyn PositionStore> {
        &self.store
    }

    pub async fn execute(&self, decision: &Decision, instrument: &str) -> TradeResult<ExecutionOutcome> {
        match *decision {
            Decision::Skip { reason } => Ok(ExecutionOutcome::Skipped(reason)),
            Decision::Enter { direction } => {
                let units = self.units * direction.sign();
                let ack = self.store.open(instrument, units).await?;
                info!(instrument = %instrument, direction = %direction, units, "Entered position");
                Ok(ExecutionOutcome::Entered {
                    direction,
                    units,
                    ack,
                })
            }
            Decision::Flip { direction } => {
                let closed = match self.store.close_all(instrument).await {
                    Ok(CloseOutcome::Closed { .. }) => true,
                    Ok(CloseOutcome::NothingToClose) => {
                        warn!(instrument = %instrument, "Flip found no position to close, opening anyway");
                        false
                    }
                    Err(e) => {
                        error!(instrument = %instrument, error = %e, "Flip close failed, open not attempted");
                        return Err(TradeError::State(format!(
                            "flip aborted, close of {} failed: {}",
                            instrument, e
                        )));
                    }
                };

                let units = self.units * direction.sign();
                let ack = self.store.open(instrument, units).await?;
                info!(instrument = %instrument, direction = %direction, units, "Flipped position");
                Ok(ExecutionOutcome::Flipped {
                    direction,
                    units,
                    closed,
                    ack,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MockPositionStore;
    use mockall::predicate::eq;
    use mockall::Sequence;

    fn ack(units: i64) -> OrderAck {
        OrderAck {
            transaction_id: Some("1".to_string()),
            fill_price: Some(1.27),
            units,
        }
    }

    #[tokio::test]
    async fn test_skip_touches_nothing() {
        let mut store = MockPositionStore::new();
        store.expect_open().times(0);
        store.expect_close_all().times(0);
        store.expect_get_open_positions().times(0);

        let executor = Executor::new(Arc::new(store), 1000);
        let outcome = executor
            .execute(&Decision::skip(SkipReason::LowConfidence), "GBP_USD")
            .await
            .unwrap();
        assert_eq!(outcome, ExecutionOutcome::Skipped(SkipReason::LowConfidence));
        assert_eq!(outcome.action(), None);
    }

    #[tokio::test]
    async fn test_enter_short_opens_negative_units_once() {
        let mut store = MockPositionStore::new();
        store.expect_close_all().times(0);
        store
            .expect_open()
            .with(eq("GBP_USD"), eq(-1000))
            .times(1)
            .returning(|_, u| Ok(ack(u)));

        let executor = Executor::new(Arc::new(store), 1000);
        let outcome = executor
            .execute(&Decision::Enter { direction: Direction::Short }, "GBP_USD")
            .await
            .unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Entered { units: -1000, .. }));
    }

    #[tokio::test]
    async fn test_flip_closes_before_opening() {
        let mut seq = Sequence::new();
        let mut store = MockPositionStore::new();
        store
            .expect_close_all()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(CloseOutcome::Closed {
                    long_units: 0,
                    short_units: -1000,
                })
            });
        store
            .expect_open()
            .with(eq("GBP_USD"), eq(1000))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, u| Ok(ack(u)));

        let executor = Executor::new(Arc::new(store), 1000);
        let outcome = executor
            .execute(&Decision::Flip { direction: Direction::Long }, "GBP_USD")
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            ExecutionOutcome::Flipped { closed: true, units: 1000, .. }
        ));
        assert_eq!(outcome.action(), Some("FLIP"));
    }

    #[tokio::test]
    async fn test_flip_close_transport_failure_never_opens() {
        let mut store = MockPositionStore::new();
        store
            .expect_close_all()
            .times(1)
            .returning(|_| Err(TradeError::transport(Some(503), "unavailable")));
        store.expect_open().times(0);

        let executor = Executor::new(Arc::new(store), 1000);
        let err = executor
            .execute(&Decision::Flip { direction: Direction::Long }, "GBP_USD")
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::State(_)));
    }

    #[tokio::test]
    async fn test_flip_with_nothing_to_close_still_opens_once() {
        let mut store = MockPositionStore::new();
        store
            .expect_close_all()
            .times(1)
            .returning(|_| Ok(CloseOutcome::NothingToClose));
        store
            .expect_open()
            .with(eq("GBP_USD"), eq(-1000))
            .times(1)
            .returning(|_, u| Ok(ack(u)));

        let executor = Executor::new(Arc::new(store), 1000);
        let outcome = executor
            .execute(&Decision::Flip { direction: Direction::Short }, "GBP_USD")
            .await
            .unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Flipped { closed: false, .. }));
    }

    #[tokio::test]
    async fn test_open_failure_surfaces_transport_error() {
        let mut store = MockPositionStore::new();
        store
            .expect_open()
            .times(1)
            .returning(|_, _| Err(TradeError::transport(Some(400), "INSUFFICIENT_MARGIN")));

        let executor = Executor::new(Arc::new(store), 1000);
        let err = executor
            .execute(&Decision::Enter { direction: Direction::Long }, "GBP_USD")
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }
}
