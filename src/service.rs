use anyhow::{anyhow, Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::computations::default_computables;
use crate::config::{MetricTable, ServerConfig};
use crate::engine::ComputationEngine;
use crate::hub::DatapointHub;
use crate::listener::{
    report_connections, serve_tcp, serve_udp, ConnectionMonitor, ConnectionRegistry, DownlinkBroadcaster, Ingest,
};
use crate::protocol::CarMessenger;
use crate::storage::{DatapointStore, MemoryStore, Recorder};
use crate::track::{TrackStore, TrackUploader};

pub struct TelemetryServer {
    hub: DatapointHub,
    engine: ComputationEngine,
    uploader: Arc<TrackUploader>,
    messenger: CarMessenger,
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn DatapointStore>,
    tcp_addr: SocketAddr,
    udp_addr: SocketAddr,
    tcp_task: JoinHandle<Result<()>>,
    udp_task: JoinHandle<Result<()>>,
    background: Vec<JoinHandle<()>>,
}

impl TelemetryServer {
    pub async fn start(config: ServerConfig) -> Result<Self> {
        let store = Arc::new(MemoryStore::with_retention(config.storage.max_points_per_metric));
        Self::start_with_store(config, store).await
    }

    /// Like [`start`](Self::start), recording into `store` instead of the
    /// built-in memory store.
    pub async fn start_with_store(config: ServerConfig, store: Arc<dyn DatapointStore>) -> Result<Self> {
        config.validate()?;
        let table = Arc::new(MetricTable::load_dir(&config.metric_config_dir)?);
        info!(rules = table.len(), dir = ?config.metric_config_dir, "metric configs loaded");

        let hub = DatapointHub::start(&config.hub);

        let mut engine = ComputationEngine::builder(config.engine.clone())
            .register_all(default_computables())
            .build()
            .context("Invalid computation graph")?;
        engine.start(&hub)?;

        let registry = Arc::new(ConnectionRegistry::with_write_timeout(config.listener.write_timeout()));
        let (broadcaster, writer_task) = DownlinkBroadcaster::start(registry.clone(), config.listener.downlink_queue);
        let messenger = CarMessenger::new(config.preamble.as_bytes().to_vec(), Arc::new(broadcaster));

        let uploader = Arc::new(TrackUploader::start(
            TrackStore::new(&config.track_dir)?,
            hub.clone(),
            messenger.clone(),
            config.uploader.retry_timeout(),
        )?);

        let recorder = Recorder::new(&hub, store.clone(), config.storage.flush_interval())?;
        let monitor = ConnectionMonitor::new(hub.clone(), config.listener.connection_timeout())?;

        let tcp = TcpListener::bind(&config.tcp_addr)
            .await
            .with_context(|| format!("Failed to bind TCP {}", config.tcp_addr))?;
        let udp = UdpSocket::bind(&config.udp_addr)
            .await
            .with_context(|| format!("Failed to bind UDP {}", config.udp_addr))?;
        let tcp_addr = tcp.local_addr()?;
        let udp_addr = udp.local_addr()?;

        let ingest = Ingest::new(table, hub.clone(), config.frame_layout());
        let tcp_task = tokio::spawn(serve_tcp(
            tcp,
            ingest.clone(),
            registry.clone(),
            config.listener.max_accept_failures,
        ));
        let udp_task = tokio::spawn(serve_udp(udp, ingest));

        let background = vec![
            writer_task,
            tokio::spawn(recorder.run()),
            tokio::spawn(async move {
                if let Err(e) = monitor.run().await {
                    error!(error = %e, "connection monitor stopped");
                }
            }),
            tokio::spawn(report_connections(
                registry.clone(),
                hub.clone(),
                config.listener.report_interval(),
            )),
        ];

        info!(%tcp_addr, %udp_addr, "telemetry server running");
        Ok(Self {
            hub,
            engine,
            uploader,
            messenger,
            registry,
            store,
            tcp_addr,
            udp_addr,
            tcp_task,
            udp_task,
            background,
        })
    }

    pub fn hub(&self) -> &DatapointHub {
        &self.hub
    }

    pub fn uploader(&self) -> &Arc<TrackUploader> {
        &self.uploader
    }

    pub fn messenger(&self) -> &CarMessenger {
        &self.messenger
    }

    pub fn store(&self) -> &Arc<dyn DatapointStore> {
        &self.store
    }

    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn tcp_addr(&self) -> SocketAddr {
        self.tcp_addr
    }

    pub fn udp_addr(&self) -> SocketAddr {
        self.udp_addr
    }

    pub fn engine_report(&self) -> String {
        self.engine.monitor().generate_report()
    }

    /// Resolves when a listener stops. Always an error: the listeners only
    /// return on a fatal failure.
    pub async fn wait(&mut self) -> Result<()> {
        let (which, joined) = tokio::select! {
            r = &mut self.tcp_task => ("TCP", r),
            r = &mut self.udp_task => ("UDP", r),
        };
        match joined {
            Ok(Ok(())) => Err(anyhow!("{} listener exited", which)),
            Ok(Err(e)) => Err(e.context(format!("{} listener failed", which))),
            Err(e) => Err(anyhow!("{} listener task failed: {}", which, e)),
        }
    }

    pub async fn shutdown(mut self) {
        self.tcp_task.abort();
        self.udp_task.abort();
        self.uploader.close().await;
        if let Err(e) = self.engine.stop().await {
            error!(error = %e, "failed to stop computation engine");
        }
        self.hub.close().await;
        for task in self.background.drain(..) {
            task.abort();
        }
        info!("telemetry server stopped");
    }
}
