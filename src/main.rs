//! FxBot - forex trading agent
//!
//! Wires the broker, model, logs and Telegram surface together, spawns the
//! scheduler tasks and the command surface, then waits for Ctrl-C.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fxbot::broker::{AccountHistory, MarketData, OandaClient, PaperPositionStore, PositionStore};
use fxbot::commands::{self, CommandContext};
use fxbot::config::AppConfig;
use fxbot::cycle::TradeCycle;
use fxbot::execution::Executor;
use fxbot::ml_engine::{ModelSignalProvider, Retrainer};
use fxbot::notify::{Notifier, TelegramClient};
use fxbot::persistence::{CsvPersistence, HeartbeatLog};
use fxbot::scheduler::{RetrainJob, Schedule, Scheduler};
use fxbot::state::SharedState;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Fatal: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

async fn run() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(config.logging.json);
    let secrets = config.validate_env()?;

    info!("✅ FxBot {} starting: {}", config.bot.tag, config.digest());
    if config.bot.dry_run {
        warn!("DRY RUN: orders are logged, never sent");
    }

    let state = SharedState::handle();
    let oanda = Arc::new(OandaClient::new(
        &config.broker.base_url,
        &secrets.oanda_account_id,
        &secrets.oanda_api_key,
        Duration::from_secs(config.broker.request_timeout_secs),
    )?);
    let market: Arc<dyn MarketData> = oanda.clone();
    let history: Arc<dyn AccountHistory> = oanda.clone();
    let store: Arc<dyn PositionStore> = if config.bot.dry_run {
        Arc::new(PaperPositionStore::new(oanda))
    } else {
        oanda
    };

    // request timeout must outlive the long-poll window
    let telegram = Arc::new(TelegramClient::new(
        &config.telegram.api_url,
        &secrets.telegram_token,
        &secrets.telegram_chat_id,
        Duration::from_secs(config.telegram.poll_timeout_secs + 10),
    )?);
    let notifier: Arc<dyn Notifier> = telegram.clone();

    let journal = Arc::new(
        CsvPersistence::new(
            Path::new(&config.persistence.data_dir),
            &config.persistence.trade_log,
            &config.persistence.skipped_log,
        )
        .context("Failed to open trade logs")?,
    );
    let heartbeat = Arc::new(HeartbeatLog::new(
        config.persistence.data_path(&config.persistence.scheduler_log),
    ));

    let signals = Arc::new(ModelSignalProvider::new(
        market.clone(),
        &config.bot.instrument,
        config.broker.candle_count,
        config.persistence.model_path(),
    ));
    let retrain = Arc::new(RetrainJob::new(Retrainer::new(
        market.clone(),
        &config.bot.instrument,
        config.broker.candle_count,
        config.persistence.model_path(),
        state.clone(),
    )));

    let cycle = Arc::new(TradeCycle::new(
        &config.bot.instrument,
        config.strategy.min_confidence,
        state.clone(),
        signals,
        Executor::new(store.clone(), config.bot.units),
        journal,
        notifier.clone(),
    ));

    let schedule = Schedule::from_config(&config.schedule)?;
    let tasks = Scheduler::new(schedule, cycle, retrain.clone(), heartbeat, notifier.clone()).spawn();

    let ctx = Arc::new(CommandContext {
        state,
        store,
        market,
        history,
        retrain,
        instrument: config.bot.instrument.clone(),
        units: config.bot.units,
    });
    let surface = spawn_command_surface(&config, &secrets.telegram_token, ctx, telegram).await?;

    notifier
        .send(&format!("✅ Bot is live: {}", config.digest()))
        .await;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutdown requested, stopping tasks");
    for handle in &surface {
        handle.abort();
    }
    futures_util::future::join_all(surface).await;
    tasks.shutdown().await;
    info!("FxBot stopped");
    Ok(())
}

#[cfg(feature = "http")]
async fn spawn_command_surface(
    config: &AppConfig,
    token: &str,
    ctx: Arc<CommandContext>,
    telegram: Arc<TelegramClient>,
) -> Result<Vec<tokio::task::JoinHandle<()>>> {
    use commands::http::{create_router, serve, WebhookState};

    let mut handles = Vec::new();
    let router = create_router(WebhookState {
        ctx: ctx.clone(),
        client: telegram.clone(),
        token: Arc::from(token),
    });
    let port = config.server.port;
    handles.push(tokio::spawn(async move {
        if let Err(e) = serve(port, router).await {
            error!(error = %format!("{:#}", e), "HTTP server stopped");
        }
    }));

    if config.telegram.use_webhook {
        let url = format!(
            "{}/webhook/{}",
            config.telegram.webhook_host.trim_end_matches('/'),
            token
        );
        telegram
            .set_webhook(&url)
            .await
            .context("Failed to register Telegram webhook")?;
        info!("Telegram webhook registered");
    } else {
        let poll_timeout = config.telegram.poll_timeout_secs;
        handles.push(tokio::spawn(commands::run_polling(ctx, telegram, poll_timeout)));
    }
    Ok(handles)
}

#[cfg(not(feature = "http"))]
async fn spawn_command_surface(
    config: &AppConfig,
    _token: &str,
    ctx: Arc<CommandContext>,
    telegram: Arc<TelegramClient>,
) -> Result<Vec<tokio::task::JoinHandle<()>>> {
    if config.telegram.use_webhook {
        anyhow::bail!("telegram.use_webhook requires the `http` feature");
    }
    let poll_timeout = config.telegram.poll_timeout_secs;
    Ok(vec![tokio::spawn(commands::run_polling(ctx, telegram, poll_timeout))])
}
