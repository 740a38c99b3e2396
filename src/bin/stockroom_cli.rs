use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use stockroom_api::{
    config,
    db::{self, DbPool},
    events::{process_events, Event, EventSender},
    notifications::{DbNotificationSink, LoggingReceiptDispatcher},
    services::{sweeps::run_periodically, AppServices},
};
use tokio::sync::mpsc;
use tracing::info;

#[derive(Parser)]
#[command(name = "stockroom", about = "Operator tasks for the stockroom database", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,
    /// Expire reservations, leads, unpaid orders and old carts
    Sweep {
        /// Evaluate expiry as of this instant instead of now (RFC 3339)
        #[arg(long, value_parser = parse_instant)]
        as_of: Option<DateTime<Utc>>,
        /// Keep running, sweeping every N seconds until interrupted
        #[arg(long)]
        every: Option<u64>,
    },
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load_config().context("failed to load application config")?;
    config::init_tracing(config.log_level(), config.log_json);

    let pool = db::establish_connection_from_app_config(&config)
        .await
        .context("failed to connect to database")?;
    let db: Arc<DbPool> = Arc::new(pool);

    match cli.command {
        Commands::Migrate => {
            db::run_migrations(&db).await.context("migration failed")?;
            info!("migrations applied");
            if cli.json {
                print_json(&serde_json::json!({ "migrated": true }))?;
            } else {
                println!("Migrations applied");
            }
        }
        Commands::Sweep { as_of, every } => {
            if config.auto_migrate {
                db::run_migrations(&db).await.context("migration failed")?;
            }
            let (event_tx, event_rx) = mpsc::channel::<Event>(config.event_channel_capacity);
            tokio::spawn(process_events(event_rx));

            let services = AppServices::new(
                db.clone(),
                Arc::new(config),
                Arc::new(EventSender::new(event_tx)),
                Arc::new(DbNotificationSink::new(db.clone())),
                Arc::new(LoggingReceiptDispatcher),
            );

            match every {
                Some(secs) => {
                    let shutdown = async {
                        let _ = tokio::signal::ctrl_c().await;
                    };
                    run_periodically(
                        services.sweeps.clone(),
                        Duration::from_secs(secs.max(1)),
                        shutdown,
                    )
                    .await;
                }
                None => {
                    let report = services
                        .sweeps
                        .run(as_of.unwrap_or_else(Utc::now))
                        .await
                        .context("sweep failed")?;
                    if cli.json {
                        print_json(&report)?;
                    } else {
                        println!("Sweep as of {}", report.as_of.to_rfc3339());
                        println!("  reservations expired: {}", report.reservations_expired);
                        println!("  leads expired:        {}", report.leads_expired);
                        println!("  orders expired:       {}", report.orders_expired);
                        println!("  carts deleted:        {}", report.carts_deleted);
                        println!("  stale carts deleted:  {}", report.stale_carts_deleted);
                        println!("  failures:             {}", report.failures);
                    }
                }
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
