//! ML Engine - Signal Provider for the trade cycle
//!
//! This module implements:
//! - `model`: logistic regression over standardized multi-timeframe features
//! - `predictor`: live prediction from the persisted model, and daily retraining
//!
//! The trade cycle only sees the `SignalProvider` trait.

pub mod model;
pub mod predictor;

pub use model::TrainedModel;
pub use predictor::{signal_from_probability, ModelSignalProvider, Retrainer};

use async_trait::async_trait;

use crate::error::TradeResult;
use crate::types::Signal;

/// Produces one directional signal per call from the latest market history
#[async_trait]
pub trait SignalProvider: Send + Sync {
    async fn predict(&self) -> TradeResult<Signal>;
}
