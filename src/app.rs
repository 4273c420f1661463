//! Composition root
//!
//! [`App`] owns the repository and every actor handle. Start order:
//!
//! 1. read the persisted snapshot (a broken snapshot aborts startup before any
//!    actor is spawned, so nothing overwrites it)
//! 2. channel and repository
//! 3. monitor, then the consumers (probe list pushes into the monitor)
//! 4. load the snapshot into the repository, add missing seed hosts
//!
//! Shutdown stops the monitor first, so its last batch is committed before
//! the final flush, then stops the remaining consumers.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::actors::aggregate::AggregateHandle;
use crate::actors::messages::FlushOutcome;
use crate::actors::monitor::{MonitorHandle, MonitorSettings};
use crate::actors::persistence::PersistenceHandle;
use crate::actors::probe_list::ProbeListHandle;
use crate::actors::view_sync::{ViewSink, ViewSyncHandle};
use crate::channel::EventChannel;
use crate::config::Config;
use crate::monitors::probe::Probe;
use crate::repository::HostRepository;
use crate::storage::{PersistenceResult, SnapshotStore};

/// Outer-world pieces the application is wired to
pub struct AppParts {
    pub store: Arc<dyn SnapshotStore>,
    pub probe: Arc<dyn Probe>,
    pub view_sink: Box<dyn ViewSink>,
}

pub struct App {
    repository: Arc<HostRepository>,
    monitor: MonitorHandle,
    probe_list: ProbeListHandle,
    view: ViewSyncHandle,
    aggregate: AggregateHandle,
    persistence: PersistenceHandle,
}

impl App {
    #[instrument(skip_all)]
    pub async fn start(config: &Config, parts: AppParts) -> Result<Self> {
        let AppParts {
            store,
            probe,
            view_sink,
        } = parts;

        let snapshot = store
            .load()
            .await
            .with_context(|| format!("failed to load snapshot from {}", store.describe()))?;
        debug!("read {} hosts from {}", snapshot.len(), store.describe());

        let channel = Arc::new(EventChannel::new());
        let repository = Arc::new(HostRepository::new(channel));
        let timing = &config.timing;

        let monitor = MonitorHandle::spawn(
            MonitorSettings::from(&config.monitor),
            repository.clone(),
            probe,
        );
        let probe_list = ProbeListHandle::spawn(
            &repository,
            Arc::new(monitor.clone()),
            timing.probe_list_window(),
        );
        let view = ViewSyncHandle::spawn(repository.clone(), view_sink, timing.view_window());
        let aggregate = AggregateHandle::spawn(&repository, timing.aggregate_window());
        let persistence = PersistenceHandle::spawn(
            repository.clone(),
            store,
            timing.flush_interval(),
            timing.force_flush_timeout(),
        );

        let loaded = repository.load(snapshot);

        let app = Self {
            repository,
            monitor,
            probe_list,
            view,
            aggregate,
            persistence,
        };
        let seeded = app.add_seed_hosts(config);

        info!("started with {loaded} stored and {seeded} seeded hosts");
        Ok(app)
    }

    /// Add configured hosts that are not present yet
    ///
    /// A seed with an id is matched by id, one without by address.
    fn add_seed_hosts(&self, config: &Config) -> usize {
        let known_addresses: HashSet<String> = self
            .repository
            .get_all()
            .into_iter()
            .map(|host| host.address)
            .collect();

        let missing = config
            .hosts
            .iter()
            .filter(|seed| match &seed.id {
                Some(id) => !self.repository.contains(id),
                None => !known_addresses.contains(&seed.address),
            })
            .map(|seed| seed.to_host())
            .collect::<Vec<_>>();

        if missing.is_empty() {
            return 0;
        }

        let report = self.repository.add_many(missing);
        for (host, e) in &report.failed {
            warn!("failed to add seed host '{}': {e}", host.address);
        }
        report.added.len()
    }

    pub fn repository(&self) -> &Arc<HostRepository> {
        &self.repository
    }

    pub fn monitor(&self) -> &MonitorHandle {
        &self.monitor
    }

    pub fn probe_list(&self) -> &ProbeListHandle {
        &self.probe_list
    }

    pub fn view(&self) -> &ViewSyncHandle {
        &self.view
    }

    pub fn aggregate(&self) -> &AggregateHandle {
        &self.aggregate
    }

    pub fn persistence(&self) -> &PersistenceHandle {
        &self.persistence
    }

    /// Stop everything, returning the result of the final flush
    #[instrument(skip_all)]
    pub async fn shutdown(self) -> PersistenceResult<FlushOutcome> {
        if let Err(e) = self.monitor.shutdown().await {
            warn!("monitor did not stop cleanly: {e:#}");
        }

        let flushed = self.persistence.shutdown().await;
        match &flushed {
            Ok(outcome) => debug!("final flush: {outcome:?}"),
            Err(e) => warn!("final flush failed: {e}"),
        }

        if let Err(e) = self.probe_list.shutdown().await {
            warn!("probe list did not stop cleanly: {e:#}");
        }
        if let Err(e) = self.view.shutdown().await {
            warn!("view sync did not stop cleanly: {e:#}");
        }
        if let Err(e) = self.aggregate.shutdown().await {
            warn!("aggregate did not stop cleanly: {e:#}");
        }

        info!("shut down");
        flushed
    }
}
