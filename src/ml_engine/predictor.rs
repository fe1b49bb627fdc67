//! Model-backed signal provider and retrainer

use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use super::model::TrainedModel;
use super::SignalProvider;
use crate::broker::MarketData;
use crate::error::{TradeError, TradeResult};
use crate::features::{FeatureMatrix, MODEL_TIMEFRAMES};
use crate::state::SharedStateHandle;
use crate::types::{Candle, Direction, Granularity, Signal};

/// Fetch every model timeframe, one request at a time
async fn fetch_history(
    market: &dyn MarketData,
    instrument: &str,
    count: usize,
) -> TradeResult<Vec<(Granularity, Vec<Candle>)>> {
    let mut history = Vec::with_capacity(MODEL_TIMEFRAMES.len());
    for granularity in MODEL_TIMEFRAMES {
        let candles = market.get_candles(instrument, granularity, count).await?;
        history.push((granularity, candles));
    }
    Ok(history)
}

/// Map P(up) to a signal: direction of the more likely class, confidence its probability.
///
/// Confidence is `max(p, 1 - p)`, not the raw P(up) for both directions; with
/// raw P(up) a Short signal could never clear a threshold above 0.5.
pub fn signal_from_probability(p_up: f64) -> Signal {
    if p_up > 0.5 {
        Signal::new(Direction::Long, p_up)
    } else {
        Signal::new(Direction::Short, 1.0 - p_up)
    }
}

/// Predicts from the model file on disk, reloaded every call so a retrain
/// takes effect on the next cycle
pub struct ModelSignalProvider {
    market: Arc<dyn MarketData>,
    instrument: String,
    candle_count: usize,
    model_path: PathBuf,
}

impl ModelSignalProvider {
    pub fn new(
        market: Arc<dyn MarketData>,
        instrument: &str,
        candle_count: usize,
        model_path: PathBuf,
    ) -> Self {
        Self {
            market,
            instrument: instrument.to_string(),
            candle_count,
            model_path,
        }
    }
}

#[async_trait]
impl SignalProvider for ModelSignalProvider {
    async fn predict(&self) -> TradeResult<Signal> {
        let model = TrainedModel::load(&self.model_path)?;
        let history = fetch_history(self.market.as_ref(), &self.instrument, self.candle_count).await?;
        let matrix = FeatureMatrix::build(&history)?;

        if matrix.names != model.feature_names {
            return Err(TradeError::Prediction(
                "model feature layout does not match computed features".to_string(),
            ));
        }
        let row = matrix
            .latest()
            .ok_or_else(|| TradeError::Data("no aligned feature row".to_string()))?;
        let p_up = model.probability_up(row)?;
        let features = matrix.latest_named().unwrap_or_default();

        let signal = signal_from_probability(p_up).with_features(features);
        debug!(
            direction = %signal.direction,
            confidence = signal.confidence,
            p_up,
            "Prediction computed"
        );
        Ok(signal)
    }
}

/// Fits a fresh model from recent history and replaces the model file
pub struct Retrainer {
    market: Arc<dyn MarketData>,
    instrument: String,
    candle_count: usize,
    model_path: PathBuf,
    state: SharedStateHandle,
}

impl Retrainer {
    pub fn new(
        market: Arc<dyn MarketData>,
        instrument: &str,
        candle_count: usize,
        model_path: PathBuf,
        state: SharedStateHandle,
    ) -> Self {
        Self {
            market,
            instrument: instrument.to_string(),
            candle_count,
            model_path,
            state,
        }
    }

    pub async fn retrain(&self) -> TradeResult<TrainedModel> {
        info!(instrument = %self.instrument, "Retraining model");
        let history = fetch_history(self.market.as_ref(), &self.instrument, self.candle_count).await?;
        let matrix = FeatureMatrix::build(&history)?;
        let model = TrainedModel::train(&matrix)?;
        model
            .save(&self.model_path)
            .map_err(|e| TradeError::Persistence(format!("failed to save model: {:#}", e)))?;
        self.state.record_retrain(Utc::now()).await;
        Ok(model)
    }
}
