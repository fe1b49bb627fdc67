//! CSV Persistence Module
//!
//! Append-only decision logs (executed trades, skipped cycles), the scheduler
//! heartbeat log, and the closed-trade performance summary.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock as AsyncRwLock;
use tracing::{debug, info};

use crate::broker::ClosedTrade;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Executed trade row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeRecord {
    pub timestamp: String,
    pub direction: String,
    pub confidence: f64,
    /// ENTER or FLIP
    pub action: String,
    pub units: i64,
    /// JSON object of feature values
    pub indicators: String,
}

/// Skipped cycle row. Direction and confidence are empty when the cycle
/// stopped before a prediction was made.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedRecord {
    pub timestamp: String,
    pub direction: Option<String>,
    pub confidence: Option<f64>,
    pub reason_skipped: String,
    pub indicators: String,
}

/// Durable sink for cycle outcomes
#[async_trait]
pub trait TradeJournal: Send + Sync {
    async fn append_trade(&self, record: TradeRecord) -> Result<()>;
    async fn append_skipped(&self, record: SkippedRecord) -> Result<()>;
}

/// CSV persistence manager
pub struct CsvPersistence {
    trade_path: PathBuf,
    skipped_path: PathBuf,
    trade_writer: Arc<AsyncRwLock<csv::Writer<fs::File>>>,
    skipped_writer: Arc<AsyncRwLock<csv::Writer<fs::File>>>,
}

impl CsvPersistence {
    pub fn new(data_dir: &Path, trade_file: &str, skipped_file: &str) -> Result<Self> {
        fs::create_dir_all(data_dir).context("Failed to create data directory")?;

        let trade_path = data_dir.join(trade_file);
        let skipped_path = data_dir.join(skipped_file);
        let trade_writer = Self::create_writer(&trade_path)?;
        let skipped_writer = Self::create_writer(&skipped_path)?;

        info!(
            trades = %trade_path.display(),
            skipped = %skipped_path.display(),
            "CSV persistence ready"
        );

        Ok(Self {
            trade_path,
            skipped_path,
            trade_writer: Arc::new(AsyncRwLock::new(trade_writer)),
            skipped_writer: Arc::new(AsyncRwLock::new(skipped_writer)),
        })
    }

    /// Header is written only when the file is new or empty
    fn create_writer(path: &Path) -> Result<csv::Writer<fs::File>> {
        let file_has_data =
            path.exists() && fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open CSV file {}", path.display()))?;

        Ok(WriterBuilder::new()
            .has_headers(!file_has_data)
            .from_writer(file))
    }

    pub fn trade_path(&self) -> &Path {
        &self.trade_path
    }

    pub fn skipped_path(&self) -> &Path {
        &self.skipped_path
    }

    pub fn load_trades(&self) -> Result<Vec<TradeRecord>> {
        Self::load_records(&self.trade_path)
    }

    pub fn load_skipped(&self) -> Result<Vec<SkippedRecord>> {
        Self::load_records(&self.skipped_path)
    }

    fn load_records<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let mut records = Vec::new();
        for row in reader.deserialize() {
            records.push(row.with_context(|| format!("Malformed row in {}", path.display()))?);
        }
        Ok(records)
    }
}

#[async_trait]
impl TradeJournal for CsvPersistence {
    async fn append_trade(&self, record: TradeRecord) -> Result<()> {
        let mut writer = self.trade_writer.write().await;
        writer
            .serialize(&record)
            .context("Failed to write trade record")?;
        writer.flush().context("Failed to flush trade writer")?;
        Ok(())
    }

    async fn append_skipped(&self, record: SkippedRecord) -> Result<()> {
        let mut writer = self.skipped_writer.write().await;
        writer
            .serialize(&record)
            .context("Failed to write skipped record")?;
        writer.flush().context("Failed to flush skipped writer")?;
        Ok(())
    }
}

/// Scheduler liveness log, truncated once a day
pub struct HeartbeatLog {
    path: PathBuf,
}

impl HeartbeatLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn line(at: DateTime<Utc>) -> String {
        format!("{} - [SCHEDULER] Checked tasks", format_timestamp(at))
    }

    pub fn beat(&self, at: DateTime<Utc>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        writeln!(file, "{}", Self::line(at)).context("Failed to append heartbeat")?;
        debug!("Heartbeat written");
        Ok(())
    }

    pub fn truncate(&self) -> Result<()> {
        fs::write(&self.path, b"")
            .with_context(|| format!("Failed to truncate {}", self.path.display()))?;
        info!(path = %self.path.display(), "Scheduler log cleared");
        Ok(())
    }
}

/// Performance over closed trades
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeSummary {
    pub total: usize,
    pub wins: usize,
    pub losses: usize,
    /// Percent of all closed trades
    pub win_rate: f64,
    pub total_pl: f64,
}

impl TradeSummary {
    pub fn from_closed_trades(trades: &[ClosedTrade]) -> Self {
        let total = trades.len();
        let wins = trades.iter().filter(|t| t.realized_pl > 0.0).count();
        let losses = trades.iter().filter(|t| t.realized_pl < 0.0).count();
        let total_pl = trades.iter().map(|t| t.realized_pl).sum();
        let win_rate = if total > 0 {
            wins as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Self {
            total,
            wins,
            losses,
            win_rate,
            total_pl,
        }
    }
}
