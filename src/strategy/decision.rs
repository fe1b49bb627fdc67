//! Decision Engine
//!
//! Pure mapping from {pause flag, market-open flag, signal, current exposure}
//! to a single `Decision`. First matching rule wins:
//!
//! 1. paused                       -> Skip(PausedByOperator)
//! 2. market closed                -> Skip(MarketClosed)
//! 3. confidence below threshold   -> Skip(LowConfidence)
//! 4. exposure already same side   -> Skip(AlreadyHolding)
//! 5. exposure opposite side       -> Flip(direction)
//!    flat                         -> Enter(direction)

use std::fmt;

use crate::types::{Direction, Exposure, Signal};

/// Why a cycle did not trade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    PausedByOperator,
    MarketClosed,
    LowConfidence,
    AlreadyHolding,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::PausedByOperator => "PAUSED_BY_OPERATOR",
            SkipReason::MarketClosed => "MARKET_CLOSED",
            SkipReason::LowConfidence => "LOW_CONFIDENCE",
            SkipReason::AlreadyHolding => "ALREADY_HOLDING",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one Decision Engine evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Skip { reason: SkipReason },
    /// Open a new position from flat
    Enter { direction: Direction },
    /// Close the opposite position, then open `direction`
    Flip { direction: Direction },
}

impl Decision {
    pub fn skip(reason: SkipReason) -> Self {
        Decision::Skip { reason }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Decision::Skip { .. })
    }

    pub fn direction(&self) -> Option<Direction> {
        match self {
            Decision::Skip { .. } => None,
            Decision::Enter { direction } | Decision::Flip { direction } => Some(*direction),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Skip { reason } => write!(f, "SKIP({})", reason),
            Decision::Enter { direction } => write!(f, "ENTER({})", direction),
            Decision::Flip { direction } => write!(f, "FLIP({})", direction),
        }
    }
}

/// Rules 1-2. They need no signal, so the cycle evaluates them before
/// paying for a prediction.
pub fn gate(paused: bool, market_open: bool) -> Option<SkipReason> {
    if paused {
        return Some(SkipReason::PausedByOperator);
    }
    if !market_open {
        return Some(SkipReason::MarketClosed);
    }
    None
}

/// Threshold is an inclusive lower bound. NaN, infinite and non-positive
/// confidence always fail.
pub fn passes_confidence(confidence: f64, threshold: f64) -> bool {
    confidence.is_finite() && confidence > 0.0 && confidence >= threshold
}

/// Full evaluation. Total over all inputs, no side effects.
pub fn decide(
    paused: bool,
    market_open: bool,
    signal: &Signal,
    exposure: &Exposure,
    confidence_threshold: f64,
) -> Decision {
    if let Some(reason) = gate(paused, market_open) {
        return Decision::skip(reason);
    }

    if !passes_confidence(signal.confidence, confidence_threshold) {
        return Decision::skip(SkipReason::LowConfidence);
    }

    // Same-side exposure of any size satisfies the direction: no scale-in.
    match exposure.direction() {
        Some(held) if held == signal.direction => Decision::skip(SkipReason::AlreadyHolding),
        Some(_) => Decision::Flip {
            direction: signal.direction,
        },
        None => Decision::Enter {
            direction: signal.direction,
        },
    }
}
