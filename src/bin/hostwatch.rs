use std::sync::Arc;

use clap::Parser;
use hostwatch::{
    actors::{messages::MonitorEvent, view_sync::TracingViewSink},
    app::{App, AppParts},
    config::{StorageConfig, read_config_file},
    monitors::TcpProbe,
    storage::open_store,
    util::{get_config_path, get_storage_path},
};
use tokio::sync::broadcast::{Receiver, error::RecvError};
use tracing::{debug, error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (defaults to $HOSTWATCH_CONFIG or ./hostwatch.json)
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![("hostwatch", LevelFilter::DEBUG)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let path = args.file.unwrap_or_else(get_config_path);
    let mut config = read_config_file(&path)?;

    if let Some(path) = get_storage_path() {
        debug!("snapshot path overridden by environment: {}", path.display());
        config.storage = StorageConfig::Json { path };
    }

    let parts = AppParts {
        store: open_store(&config.storage),
        probe: Arc::new(TcpProbe::new(
            config.monitor.probe_port,
            config.monitor.timeout(),
        )),
        view_sink: Box::new(TracingViewSink),
    };

    let app = App::start(&config, parts).await?;
    let notifications = tokio::spawn(log_monitor_events(app.monitor().subscribe()));

    tokio::signal::ctrl_c().await?;
    info!("received ctrl-c, shutting down");

    let flushed = app.shutdown().await;
    notifications.abort();

    if let Err(e) = flushed {
        error!("final snapshot was not written: {e}");
        return Err(e.into());
    }

    Ok(())
}

async fn log_monitor_events(mut events: Receiver<MonitorEvent>) {
    loop {
        match events.recv().await {
            Ok(MonitorEvent::ScanStarted { targets }) => trace!("scanning {targets} targets"),
            Ok(MonitorEvent::ScanFinished { report }) => debug!(
                "scan finished: {}/{} reachable, {} changes",
                report.reachable, report.probed, report.applied
            ),
            Ok(MonitorEvent::HostsOffline { names }) => {
                warn!("hosts went offline: {}", names.join(", "))
            }
            Err(RecvError::Lagged(skipped)) => warn!("missed {skipped} monitor events"),
            Err(RecvError::Closed) => break,
        }
    }
}
