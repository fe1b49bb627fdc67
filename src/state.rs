//! Process-wide mutable state shared between the scheduler tasks and the
//! command surface.
//!
//! Holds the operator pause flag, the last prediction and the last retrain
//! time. Each field is an independent scalar: last writer wins.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::types::Signal;

/// Shared bot state
#[derive(Debug, Default)]
pub struct SharedState {
    paused: RwLock<bool>,
    last_prediction: RwLock<Option<Signal>>,
    last_retrain: RwLock<Option<DateTime<Utc>>>,
}

pub type SharedStateHandle = Arc<SharedState>;

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle() -> SharedStateHandle {
        Arc::new(Self::new())
    }

    pub async fn is_paused(&self) -> bool {
        *self.paused.read().await
    }

    /// Set the pause flag, returning the previous value
    pub async fn set_paused(&self, paused: bool) -> bool {
        let mut guard = self.paused.write().await;
        std::mem::replace(&mut *guard, paused)
    }

    pub async fn last_prediction(&self) -> Option<Signal> {
        self.last_prediction.read().await.clone()
    }

    pub async fn record_prediction(&self, signal: Signal) {
        *self.last_prediction.write().await = Some(signal);
    }

    pub async fn last_retrain(&self) -> Option<DateTime<Utc>> {
        *self.last_retrain.read().await
    }

    pub async fn record_retrain(&self, at: DateTime<Utc>) {
        *self.last_retrain.write().await = Some(at);
    }
}
