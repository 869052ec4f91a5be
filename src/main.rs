//! Campus Admin Console Binary

use campus_console::{AdminConsole, Config, ConsoleError, EntityKind, Result, ServiceKey};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "campus-console", version, about = "Admin console for the campus services")]
struct Cli {
    /// Human-readable log output instead of JSON
    #[arg(long, global = true, env = "CONSOLE_PRETTY_LOGS")]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Probe every service and print the status board
    Status,
    /// Probe a single service
    Probe { service: ServiceKey },
    /// Aggregate the cross-service dashboard counts
    Dashboard,
    /// Fetch a collection and print one page of it
    List {
        entity: EntityKind,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 0)]
        page: usize,
        #[arg(long)]
        page_size: Option<usize>,
    },
    /// Count graded and ungraded submissions
    Grading,
    /// Show or change the persisted refresh settings
    Settings {
        #[arg(long)]
        auto_refresh: Option<bool>,
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Refresh the status board and dashboard until interrupted
    Watch,
}

#[derive(Serialize)]
struct ListOutput<'a> {
    entity: EntityKind,
    #[serde(flatten)]
    load: &'a campus_console::LoadState,
    query: campus_console::QueryState,
    records: Vec<&'a serde_json::Value>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    initialize_tracing(cli.pretty);

    info!("Starting campus console v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::from_env();
    if let Command::List {
        page_size: Some(size),
        ..
    } = &cli.command
    {
        config.default_page_size = *size;
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    let console = AdminConsole::from_config(config)?;

    match cli.command {
        Command::Status => {
            console.probe_all().await;
            print_json(&console.status_board().await)?;
        }
        Command::Probe { service } => {
            print_json(&console.probe_one(service).await?)?;
        }
        Command::Dashboard => {
            print_json(&console.aggregate_dashboard().await)?;
        }
        Command::List {
            entity,
            search,
            page,
            ..
        } => {
            let mut view = console.open_list(entity).await;
            let engine = view.engine_mut();
            if let Some(term) = search {
                engine.set_raw_term(term, std::time::Instant::now());
                engine.flush_term();
            }
            engine.set_page(page);

            print_json(&ListOutput {
                entity,
                load: view.state(),
                query: view.engine().state(),
                records: view.engine().visible_page(),
            })?;
        }
        Command::Grading => {
            print_json(&console.grading_summary().await?)?;
        }
        Command::Settings {
            auto_refresh,
            interval_ms,
        } => {
            let settings = console.settings();
            if let Some(enabled) = auto_refresh {
                settings.set_auto_refresh(enabled)?;
            }
            if let Some(ms) = interval_ms {
                settings.set_refresh_interval(Duration::from_millis(ms))?;
            }
            print_json(&settings.current())?;
        }
        Command::Watch => watch(Arc::new(console)).await?,
    }

    Ok(())
}

async fn watch(console: Arc<AdminConsole>) -> Result<()> {
    let scheduler = console.start_auto_refresh();
    scheduler.trigger();

    info!(
        "Watching {} services, refresh every {}ms (auto refresh {})",
        console.config().services.len(),
        console.settings().current().refresh_interval_ms,
        console.settings().current().auto_refresh
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down after {} refreshes", scheduler.fire_count());
    scheduler.shutdown().await;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).map_err(ConsoleError::from)?;
    println!("{}", rendered);
    Ok(())
}

/// Initialize structured logging
fn initialize_tracing(pretty: bool) {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);

    let registry = tracing_subscriber::registry().with(filter_layer);
    if pretty {
        registry.with(fmt_layer).init();
    } else {
        registry.with(fmt_layer.json()).init();
    }
}
