//! OANDA v20 wire types
//!
//! Every response is deserialized into an explicit type and validated here,
//! so the rest of the crate never looks up fields ad hoc.

use serde::{Deserialize, Serialize};

use crate::error::{TradeError, TradeResult};
use crate::types::{Candle, OpenPosition};

// ============================================================================
// Candles
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CandlesResponse {
    pub candles: Vec<CandleEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CandleEntry {
    pub complete: bool,
    pub time: String,
    #[serde(default)]
    pub volume: u64,
    pub mid: Option<CandleMid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CandleMid {
    pub o: String,
    pub h: String,
    pub l: String,
    pub c: String,
}

impl CandlesResponse {
    /// Complete candles only, in broker order (oldest first)
    pub fn into_candles(self) -> TradeResult<Vec<Candle>> {
        self.candles
            .into_iter()
            .filter(|c| c.complete)
            .map(|c| {
                let mid = c.mid.ok_or_else(|| {
                    TradeError::Data(format!("candle {} has no mid prices", c.time))
                })?;
                Ok(Candle {
                    open: parse_price(&mid.o, "mid.o")?,
                    high: parse_price(&mid.h, "mid.h")?,
                    low: parse_price(&mid.l, "mid.l")?,
                    close: parse_price(&mid.c, "mid.c")?,
                    volume: c.volume,
                    time: c.time,
                })
            })
            .collect()
    }
}

// ============================================================================
// Trades
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct TradesResponse {
    #[serde(default)]
    pub trades: Vec<TradeEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeEntry {
    pub id: String,
    pub instrument: String,
    #[serde(default)]
    pub current_units: Option<String>,
    #[serde(default)]
    pub initial_units: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default, rename = "realizedPL")]
    pub realized_pl: Option<String>,
}

impl TradeEntry {
    pub fn to_open_position(&self) -> TradeResult<OpenPosition> {
        let units = self.current_units.as_deref().ok_or_else(|| {
            TradeError::Data(format!("open trade {} missing currentUnits", self.id))
        })?;
        Ok(OpenPosition {
            instrument: self.instrument.clone(),
            signed_units: parse_units(units)?,
        })
    }

    pub fn to_closed_trade(&self) -> TradeResult<ClosedTrade> {
        let realized_pl = match self.realized_pl.as_deref() {
            Some(v) => parse_price(v, "realizedPL")?,
            None => 0.0,
        };
        Ok(ClosedTrade {
            id: self.id.clone(),
            instrument: self.instrument.clone(),
            realized_pl,
        })
    }
}

/// Closed trade as used by the performance summary
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub id: String,
    pub instrument: String,
    pub realized_pl: f64,
}

// ============================================================================
// Positions
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct PositionResponse {
    pub position: PositionEntry,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PositionEntry {
    pub instrument: String,
    pub long: PositionSide,
    pub short: PositionSide,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PositionSide {
    pub units: String,
}

impl PositionEntry {
    /// (long units, short units); short is reported negative by the venue
    pub fn side_units(&self) -> TradeResult<(i64, i64)> {
        Ok((parse_units(&self.long.units)?, parse_units(&self.short.units)?))
    }
}

/// Body for `PUT positions/{instrument}/close`
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClosePositionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long_units: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_units: Option<String>,
}

impl ClosePositionRequest {
    /// Close every non-zero side. `None` when there is nothing to close.
    pub fn close_all(long_units: i64, short_units: i64) -> Option<Self> {
        let req = Self {
            long_units: (long_units != 0).then(|| "ALL".to_string()),
            short_units: (short_units != 0).then(|| "ALL".to_string()),
        };
        if req.long_units.is_none() && req.short_units.is_none() {
            None
        } else {
            Some(req)
        }
    }
}

// ============================================================================
// Orders
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    pub order: MarketOrder,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketOrder {
    pub instrument: String,
    pub units: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub position_fill: String,
}

impl OrderRequest {
    pub fn market(instrument: &str, signed_units: i64) -> Self {
        Self {
            order: MarketOrder {
                instrument: instrument.to_string(),
                units: signed_units.to_string(),
                order_type: "MARKET".to_string(),
                position_fill: "DEFAULT".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    #[serde(default)]
    pub order_fill_transaction: Option<FillTransaction>,
    #[serde(default)]
    pub order_cancel_transaction: Option<CancelTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FillTransaction {
    pub id: String,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub units: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelTransaction {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Acknowledgement of an accepted order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub transaction_id: Option<String>,
    pub fill_price: Option<f64>,
    pub units: i64,
}

impl OrderResponse {
    /// A cancel transaction means the venue accepted the request but did not fill it
    pub fn into_ack(self, requested_units: i64) -> TradeResult<OrderAck> {
        if let Some(cancel) = self.order_cancel_transaction {
            return Err(TradeError::transport(
                None,
                format!(
                    "order cancelled: {}",
                    cancel.reason.unwrap_or_else(|| "unknown reason".to_string())
                ),
            ));
        }
        match self.order_fill_transaction {
            Some(fill) => Ok(OrderAck {
                fill_price: fill
                    .price
                    .as_deref()
                    .map(|p| parse_price(p, "fill price"))
                    .transpose()?,
                units: fill
                    .units
                    .as_deref()
                    .map(parse_units)
                    .transpose()?
                    .unwrap_or(requested_units),
                transaction_id: Some(fill.id),
            }),
            None => Ok(OrderAck {
                transaction_id: None,
                fill_price: None,
                units: requested_units,
            }),
        }
    }
}

// ============================================================================
// Parsing helpers
// ============================================================================

/// Units arrive as decimal strings ("-1000", "1000.0"); reject fractions
pub fn parse_units(raw: &str) -> TradeResult<i64> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| TradeError::Data(format!("invalid units '{}'", raw)))?;
    if !value.is_finite() || value.fract() != 0.0 {
        return Err(TradeError::Data(format!("invalid units '{}'", raw)));
    }
    Ok(value as i64)
}

pub fn parse_price(raw: &str, field: &str) -> TradeResult<f64> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| TradeError::Data(format!("invalid {} '{}'", field, raw)))?;
    if !value.is_finite() {
        return Err(TradeError::Data(format!("invalid {} '{}'", field, raw)));
    }
    Ok(value)
}
