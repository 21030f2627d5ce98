use anyhow::{anyhow, Result};
use dotenvy::dotenv;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use nudge::core::{Clock, Config, RecordStore, SystemClock};
use nudge::database::Database;
use nudge::features::calendar::{serialize, CalendarSyncEngine, HttpFetcher};
use nudge::features::escalation::{
    load_custom_policies, run_delivery, seed_presets, EscalationEngine, LocalAlertScheduler,
};

/// Capacity of the alert command channel
const COMMAND_BUFFER: usize = 64;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    let database = Database::new(&config.database_path).await?;
    seed_presets(&database).await?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("run") => run(config, database).await,
        Some("export") => export(&database, args.get(1).map(String::as_str)).await,
        Some(other) => Err(anyhow!("Unknown command '{other}' (expected 'run' or 'export [path]')")),
    }
}

async fn run(config: Config, database: Database) -> Result<()> {
    info!("Starting nudge...");

    if let Some(path) = &config.policies_path {
        match load_custom_policies(path, &database).await {
            Ok(count) => info!("📄 Loaded {count} custom policies from {path}"),
            Err(e) => error!("❌ Failed to load policies from {path}: {e}"),
        }
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(database);
    let scheduler = Arc::new(LocalAlertScheduler::new(config.scheduler_capacity, clock.clone()));
    let engine = Arc::new(
        EscalationEngine::new(clock.clone()).with_max_repeat_alerts(config.max_repeat_alerts),
    );

    restore_alerts(&engine, store.as_ref(), scheduler.as_ref()).await?;

    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
    tokio::spawn(run_delivery(
        scheduler.clone(),
        clock.clone(),
        Duration::from_secs(config.delivery_tick_seconds),
        commands_tx,
    ));

    {
        let engine = engine.clone();
        let store = store.clone();
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            engine
                .run_commands(commands_rx, store.as_ref(), scheduler.as_ref())
                .await;
        });
    }

    let fetcher = HttpFetcher::new(config.fetch_timeout_seconds)?;
    let sync = CalendarSyncEngine::new(clock.clone(), engine.clone());
    let mut interval = tokio::time::interval(Duration::from_secs(config.sync_tick_seconds));

    info!(
        "🔔 nudge running (scheduler capacity {}, sync every {}s)",
        scheduler.capacity(),
        config.sync_tick_seconds
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = sync.sync_all(store.as_ref(), &fetcher, scheduler.as_ref()).await;
                if let Some(last_error) = report.last_error {
                    warn!("Last sync error: {last_error}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// The scheduler is in-memory, so active reminders are rescheduled at
/// startup from wherever their escalation had reached
async fn restore_alerts(
    engine: &EscalationEngine,
    store: &Database,
    scheduler: &LocalAlertScheduler,
) -> Result<()> {
    let mut restored = 0;

    for mut reminder in store.list_reminders().await? {
        if !reminder.is_active() {
            continue;
        }

        match engine.restore(&mut reminder, store, scheduler).await {
            Ok(report) if !report.scheduled.is_empty() => restored += 1,
            Ok(_) => {}
            Err(e) => error!("Failed to restore alerts for reminder {}: {e}", reminder.id),
        }
    }

    if restored > 0 {
        info!("Restored alerts for {restored} active reminder(s)");
    }
    Ok(())
}

async fn export(store: &Database, path: Option<&str>) -> Result<()> {
    let reminders = store.list_reminders().await?;
    let text = serialize(&reminders, SystemClock.now());

    match path {
        Some(path) => {
            std::fs::write(path, text)?;
            info!("Exported {} reminder(s) to {path}", reminders.len());
        }
        None => println!("{text}"),
    }
    Ok(())
}
