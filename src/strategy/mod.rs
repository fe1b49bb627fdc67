//! Trading decision logic
//!
//! - `decision`: the pure Decision Engine
//! - `market_hours`: FX weekly session calendar

pub mod decision;
pub mod market_hours;

pub use decision::{decide, gate, passes_confidence, Decision, SkipReason};
pub use market_hours::is_market_open;
