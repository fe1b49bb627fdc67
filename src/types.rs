//! Core types used throughout FxBot
//!
//! Defines directions, signals, exposure snapshots and candles.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Trading direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Sign applied to order units
    pub fn sign(&self) -> i64 {
        match self {
            Direction::Long => 1,
            Direction::Short => -1,
        }
    }

    /// Human label used in notifications
    pub fn label(&self) -> &'static str {
        match self {
            Direction::Long => "Buy",
            Direction::Short => "Sell",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Directional model output for one cycle. Never persisted, only logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub direction: Direction,
    /// Probability of the predicted class, expected in [0, 1]
    pub confidence: f64,
    /// Indicator values that produced the prediction
    pub features: BTreeMap<String, f64>,
}

impl Signal {
    pub fn new(direction: Direction, confidence: f64) -> Self {
        Self {
            direction,
            confidence,
            features: BTreeMap::new(),
        }
    }

    pub fn with_features(mut self, features: BTreeMap<String, f64>) -> Self {
        self.features = features;
        self
    }

    /// Indicators rendered as a compact JSON object for CSV rows
    pub fn features_json(&self) -> String {
        serde_json::to_string(&self.features).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Net exposure snapshot for one instrument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exposure {
    pub instrument: String,
    /// Positive = long, negative = short, zero = flat
    pub net_units: i64,
}

impl Exposure {
    /// Net exposure for `instrument` from a list of open positions.
    /// Multiple rows for the same instrument are summed.
    pub fn from_positions(instrument: &str, positions: &[OpenPosition]) -> Self {
        let net_units = positions
            .iter()
            .filter(|p| p.instrument == instrument)
            .map(|p| p.signed_units)
            .sum();
        Self {
            instrument: instrument.to_string(),
            net_units,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.net_units == 0
    }

    /// Direction of the held position, `None` when flat
    pub fn direction(&self) -> Option<Direction> {
        match self.net_units {
            0 => None,
            u if u > 0 => Some(Direction::Long),
            _ => Some(Direction::Short),
        }
    }
}

/// One open position row as reported by the position store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub instrument: String,
    pub signed_units: i64,
}

/// Candle granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    M5,
    M15,
    H1,
}

impl Granularity {
    /// Value used by the broker API
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::M5 => "M5",
            Granularity::M15 => "M15",
            Granularity::H1 => "H1",
        }
    }

    /// Feature name prefix
    pub fn prefix(&self) -> &'static str {
        match self {
            Granularity::M5 => "5m",
            Granularity::M15 => "15m",
            Granularity::H1 => "1h",
        }
    }

    pub fn duration_secs(&self) -> u64 {
        match self {
            Granularity::M5 => 5 * 60,
            Granularity::M15 => 15 * 60,
            Granularity::H1 => 60 * 60,
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mid-price OHLC candle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// RFC3339 open time as reported by the broker
    pub time: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exposure_sums_rows_for_instrument_only() {
        let positions = vec![
            OpenPosition {
                instrument: "GBP_USD".to_string(),
                signed_units: -600,
            },
            OpenPosition {
                instrument: "EUR_USD".to_string(),
                signed_units: 5000,
            },
            OpenPosition {
                instrument: "GBP_USD".to_string(),
                signed_units: -400,
            },
        ];

        let exposure = Exposure::from_positions("GBP_USD", &positions);
        assert_eq!(exposure.net_units, -1000);
        assert_eq!(exposure.direction(), Some(Direction::Short));
    }

    #[test]
    fn test_flat_exposure_has_no_direction() {
        let exposure = Exposure::from_positions("GBP_USD", &[]);
        assert!(exposure.is_flat());
        assert_eq!(exposure.direction(), None);
    }

    #[test]
    fn test_direction_sign_and_label() {
        assert_eq!(Direction::Long.sign(), 1);
        assert_eq!(Direction::Short.sign(), -1);
        assert_eq!(Direction::Long.label(), "Buy");
        assert_eq!(Direction::Short.to_string(), "SHORT");
    }
}
