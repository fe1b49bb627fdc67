//! FxBot Library
//!
//! Single-instrument forex trading agent: model signal, decision engine,
//! position reconciliation and scheduled retraining

pub mod broker;
pub mod commands;
pub mod config;
pub mod cycle;
pub mod error;
pub mod execution;
pub mod features;
pub mod ml_engine;
pub mod notify;
pub mod persistence;
pub mod scheduler;
pub mod state;
pub mod strategy;
pub mod types;

pub use error::{TradeError, TradeResult};
