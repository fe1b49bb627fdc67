//! Feature Engine - Technical indicators over multi-timeframe candles
//!
//! Computes, per timeframe (5m, 15m, 1h):
//! - RSI (14)
//! - SMA (5) and SMA (15)
//! - ROC (5)
//! - Volatility (rolling 10 std dev)
//!
//! Timeframes are aligned from the most recent candle backwards, so the
//! last aligned row always describes "now" on every timeframe.

pub mod indicators;

use std::collections::BTreeMap;

use crate::error::{TradeError, TradeResult};
use crate::types::{Candle, Granularity};

const RSI_PERIOD: usize = 14;
const SMA_FAST: usize = 5;
const SMA_SLOW: usize = 15;
const ROC_PERIOD: usize = 5;
const VOLATILITY_PERIOD: usize = 10;

/// Per-timeframe feature suffixes, in column order
pub const FEATURE_SUFFIXES: [&str; 5] = ["rsi", "sma_5", "sma_15", "roc", "volatility"];

/// Timeframes fed to the model, in column order
pub const MODEL_TIMEFRAMES: [Granularity; 3] = [Granularity::M5, Granularity::M15, Granularity::H1];

/// Timeframe whose next close defines the training label
pub const LABEL_TIMEFRAME: Granularity = Granularity::M15;

/// Fully warmed-up indicator row for one candle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureRow {
    pub close: f64,
    pub rsi: f64,
    pub sma_5: f64,
    pub sma_15: f64,
    pub roc: f64,
    pub volatility: f64,
}

impl FeatureRow {
    fn values(&self) -> [f64; 5] {
        [self.rsi, self.sma_5, self.sma_15, self.roc, self.volatility]
    }
}

/// Indicator rows for one timeframe, oldest first
#[derive(Debug, Clone)]
pub struct FeatureFrame {
    pub granularity: Granularity,
    pub rows: Vec<FeatureRow>,
}

impl FeatureFrame {
    /// Compute indicators and drop rows without a full window
    pub fn compute(granularity: Granularity, candles: &[Candle]) -> Self {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let rsi = indicators::rsi(&closes, RSI_PERIOD);
        let sma_5 = indicators::sma(&closes, SMA_FAST);
        let sma_15 = indicators::sma(&closes, SMA_SLOW);
        let roc = indicators::rate_of_change(&closes, ROC_PERIOD);
        let vol = indicators::rolling_std(&closes, VOLATILITY_PERIOD);

        let rows = (0..closes.len())
            .filter_map(|i| {
                Some(FeatureRow {
                    close: closes[i],
                    rsi: rsi[i]?,
                    sma_5: sma_5[i]?,
                    sma_15: sma_15[i]?,
                    roc: roc[i]?,
                    volatility: vol[i]?,
                })
            })
            .collect();

        Self { granularity, rows }
    }

    pub fn column_names(&self) -> Vec<String> {
        FEATURE_SUFFIXES
            .iter()
            .map(|s| format!("{}_{}", self.granularity.prefix(), s))
            .collect()
    }
}

/// Feature matrix aligned across timeframes
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub names: Vec<String>,
    /// One row per aligned step, oldest first
    pub rows: Vec<Vec<f64>>,
    /// Close of the label timeframe for each row
    pub label_closes: Vec<f64>,
}

impl FeatureMatrix {
    /// Compute and align frames. `candles` must contain every `MODEL_TIMEFRAMES` entry.
    pub fn build(candles: &[(Granularity, Vec<Candle>)]) -> TradeResult<Self> {
        let mut frames = Vec::with_capacity(MODEL_TIMEFRAMES.len());
        for granularity in MODEL_TIMEFRAMES {
            let series = candles
                .iter()
                .find(|(g, _)| *g == granularity)
                .map(|(_, c)| c.as_slice())
                .ok_or_else(|| TradeError::Data(format!("no {} candles supplied", granularity)))?;
            let frame = FeatureFrame::compute(granularity, series);
            if frame.rows.is_empty() {
                return Err(TradeError::Data(format!(
                    "insufficient {} history: {} candles, need more than {}",
                    granularity,
                    series.len(),
                    RSI_PERIOD.max(SMA_SLOW)
                )));
            }
            frames.push(frame);
        }

        let depth = frames.iter().map(|f| f.rows.len()).min().unwrap_or(0);
        let names = frames.iter().flat_map(|f| f.column_names()).collect();

        let mut rows = Vec::with_capacity(depth);
        let mut label_closes = Vec::with_capacity(depth);
        for k in 0..depth {
            let mut row = Vec::with_capacity(frames.len() * FEATURE_SUFFIXES.len());
            for frame in &frames {
                let idx = frame.rows.len() - depth + k;
                row.extend_from_slice(&frame.rows[idx].values());
                if frame.granularity == LABEL_TIMEFRAME {
                    label_closes.push(frame.rows[idx].close);
                }
            }
            rows.push(row);
        }

        Ok(Self {
            names,
            rows,
            label_closes,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Most recent aligned row
    pub fn latest(&self) -> Option<&[f64]> {
        self.rows.last().map(|r| r.as_slice())
    }

    /// Most recent row as a name -> value map
    pub fn latest_named(&self) -> Option<BTreeMap<String, f64>> {
        self.latest().map(|row| {
            self.names
                .iter()
                .cloned()
                .zip(row.iter().copied())
                .collect()
        })
    }

    /// Supervised pairs: row `i` labelled 1 when the next label close is higher.
    /// The last row has no future close and is excluded.
    pub fn labelled(&self) -> (Vec<Vec<f64>>, Vec<i64>) {
        let n = self.rows.len().saturating_sub(1);
        let x = self.rows[..n].to_vec();
        let y = (0..n)
            .map(|i| i64::from(self.label_closes[i + 1] > self.label_closes[i]))
            .collect();
        (x, y)
    }
}
