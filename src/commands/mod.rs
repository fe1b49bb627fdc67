//! Command surface - operator chat commands
//!
//! The only external mutators of the pause flag and the retrain timestamp.
//! Updates arrive either by Telegram long polling or, with the `http`
//! feature, through the webhook route in `http`.

#[cfg(feature = "http")]
pub mod http;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::broker::{AccountHistory, MarketData, PositionStore};
use crate::error::{TradeError, TradeResult};
use crate::notify::telegram::Update;
use crate::notify::{format_gbp, messages, TelegramClient};
use crate::persistence::TradeSummary;
use crate::scheduler::{RetrainJob, RetrainOutcome};
use crate::state::SharedStateHandle;
use crate::strategy::is_market_open;
use crate::types::Granularity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Status,
    Pause,
    Resume,
    Retrain,
    Stats,
    Help,
}

impl Command {
    /// Parse `/name` or `/name@botname`; other text is not a command
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.split_whitespace().next()?;
        let name = first.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);
        Some(match name.to_ascii_lowercase().as_str() {
            "start" => Command::Start,
            "status" => Command::Status,
            "pause" => Command::Pause,
            "resume" => Command::Resume,
            "retrain" => Command::Retrain,
            "stats" => Command::Stats,
            _ => Command::Help,
        })
    }

    /// Command carried by a Telegram update, if any
    pub fn from_update(update: &Update) -> Option<Self> {
        Self::parse(update.message.as_ref()?.text.as_deref()?)
    }

    /// Long-running commands are answered off the polling loop
    pub fn runs_detached(&self) -> bool {
        matches!(self, Command::Retrain)
    }
}

const HELP: &str = "Commands:\n\
/status - bot and market status\n\
/pause - stop trading\n\
/resume - resume trading\n\
/retrain - retrain the model now\n\
/stats - closed trade performance";

/// Everything a command may read or mutate
pub struct CommandContext {
    pub state: SharedStateHandle,
    pub store: Arc<dyn PositionStore>,
    pub market: Arc<dyn MarketData>,
    pub history: Arc<dyn AccountHistory>,
    pub retrain: Arc<RetrainJob>,
    pub instrument: String,
    pub units: i64,
}

impl CommandContext {
    /// Reply text for `command`. Collaborator failures become error replies.
    pub async fn dispatch(&self, command: Command) -> String {
        info!(command = ?command, "Handling command");
        match command {
            Command::Start => "👋 Bot is online and ready to trade!".to_string(),
            Command::Help => HELP.to_string(),
            Command::Pause => {
                let was_paused = self.state.set_paused(true).await;
                if was_paused {
                    "⏸️ Trading is already paused.".to_string()
                } else {
                    "⏸️ Trading paused.".to_string()
                }
            }
            Command::Resume => {
                let was_paused = self.state.set_paused(false).await;
                if was_paused {
                    "▶️ Trading resumed.".to_string()
                } else {
                    "▶️ Trading is already active.".to_string()
                }
            }
            Command::Retrain => match self.retrain.run().await {
                RetrainOutcome::Finished(model) => messages::retrained(&model),
                RetrainOutcome::Failed(e) => messages::retrain_failed(&e),
                RetrainOutcome::AlreadyRunning => "🧠 A retrain is already running.".to_string(),
            },
            Command::Stats => match self.history.get_closed_trades().await {
                Ok(trades) => messages::stats(&TradeSummary::from_closed_trades(&trades)),
                Err(e) => format!("❌ Error: {}", e),
            },
            Command::Status => match self.status(Utc::now()).await {
                Ok(text) => text,
                Err(e) => format!("❌ Error: {}", e),
            },
        }
    }

    async fn status(&self, now: DateTime<Utc>) -> TradeResult<String> {
        let positions = self.store.get_open_positions().await?;
        let open_trades = positions
            .iter()
            .filter(|p| p.instrument == self.instrument && p.signed_units != 0)
            .count();

        // the newest candle may be incomplete and filtered out
        let candles = self
            .market
            .get_candles(&self.instrument, Granularity::M5, 2)
            .await?;
        let price = candles
            .last()
            .map(|c| c.close)
            .ok_or_else(|| TradeError::Data("no recent candle for price".to_string()))?;
        let value = self.units as f64 * price * open_trades as f64;

        let paused = self.state.is_paused().await;
        let mut text = format!(
            "📊 Bot Status\n\
             • 🔄 Status: {}\n\
             • 🕒 Market Open: {}\n\
             • 📈 Open Trades: {}\n\
             • 💷 Trade Value: {} GBP\n\
             • 🧠 Last Retrain: {}\n\n",
            if paused { "⏸️ Paused" } else { "▶️ Active" },
            if is_market_open(now) { "✅ Yes" } else { "❌ No" },
            open_trades,
            format_gbp(value),
            self.state
                .last_retrain()
                .await
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "Never".to_string()),
        );
        match self.state.last_prediction().await {
            Some(signal) => text.push_str(&format!(
                "🤖 Last Prediction\n• Direction: {}\n• Confidence: {:.2}",
                signal.direction.label(),
                signal.confidence
            )),
            None => text.push_str("🤖 Last Prediction: None yet."),
        }
        Ok(text)
    }

    /// Reply for one update, `None` when the update carries no command
    pub async fn handle_update(&self, update: &Update) -> Option<(String, String)> {
        let message = update.message.as_ref()?;
        let command = Command::from_update(update)?;
        let reply = self.dispatch(command).await;
        Some((message.chat.id.to_string(), reply))
    }
}

/// Handle one update and send the reply, logging delivery failures
pub async fn process_update(ctx: &CommandContext, client: &TelegramClient, update: &Update) {
    if let Some((chat_id, reply)) = ctx.handle_update(update).await {
        if let Err(e) = client.send_message(&chat_id, &reply).await {
            warn!(error = %format!("{:#}", e), "Failed to send command reply");
        }
    }
}

/// `getUpdates` long-polling loop; runs until the task is aborted
pub async fn run_polling(ctx: Arc<CommandContext>, client: Arc<TelegramClient>, poll_timeout_secs: u64) {
    info!("Telegram long polling started");
    let mut offset = 0i64;
    loop {
        match client.get_updates(offset, poll_timeout_secs).await {
            Ok(updates) => {
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    debug!(update_id = update.update_id, "Update received");
                    if Command::from_update(&update).is_some_and(|c| c.runs_detached()) {
                        let (ctx, client) = (ctx.clone(), client.clone());
                        tokio::spawn(async move {
                            process_update(&ctx, &client, &update).await;
                        });
                    } else {
                        process_update(&ctx, &client, &update).await;
                    }
                }
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "getUpdates failed, backing off");
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}
