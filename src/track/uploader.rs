use anyhow::{anyhow, bail, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use super::progress::{UploadProgress, UploadState, BEGIN_ACK_METRIC, PACKET_ACK_METRIC};
use super::store::TrackStore;
use crate::core::{critical_points, Route, Waypoint, CONNECTION_STATUS_METRIC};
use crate::hub::{DatapointHub, MetricFilter, Subscription};
use crate::protocol::CarMessenger;

/// The downlink index field is one byte wide
pub const MAX_CRITICAL_POINTS: usize = 255;

#[derive(Debug, Clone, PartialEq)]
pub struct UploadStatus {
    pub state: UploadState,
    pub connected: bool,
    /// Most recent persistence or send loop failure, cleared by the next
    /// successful commit
    pub last_error: Option<String>,
}

enum Command {
    Submit {
        route: Route,
        reply: oneshot::Sender<Result<()>>,
    },
    Close,
}

#[derive(Clone)]
struct JobContext {
    store: Arc<TrackStore>,
    hub: DatapointHub,
    messenger: CarMessenger,
    retry_timeout: Duration,
    status: Arc<watch::Sender<UploadStatus>>,
}

impl JobContext {
    /// Persist `progress`. A failure is logged and published on the status
    /// channel; the caller keeps going with the in-memory state.
    fn commit(&self, progress: &UploadProgress) -> Result<()> {
        let result = self.store.save_progress(progress);
        let state = progress.state();
        match &result {
            Ok(()) => self.status.send_modify(|s| {
                s.state = state;
                s.last_error = None;
            }),
            Err(e) => {
                error!(error = %e, %state, "failed to persist upload progress");
                let message = format!("{:#}", e);
                self.status.send_modify(|s| {
                    s.state = state;
                    s.last_error = Some(message);
                });
            }
        }
        result
    }
}

struct RunningJob {
    cancel: oneshot::Sender<()>,
    handle: JoinHandle<UploadProgress>,
}

/// Owns the current job. The send loop holds the progress while it runs and
/// hands it back on exit, so only one task ever writes the progress record.
struct Supervisor {
    ctx: JobContext,
    commands: mpsc::Receiver<Command>,
    connection: Subscription,
    route: Arc<Vec<Waypoint>>,
    /// `None` until the first route is submitted; held by the send loop while it runs
    progress: Option<UploadProgress>,
    job: Option<RunningJob>,
    connected: bool,
}

impl Supervisor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                point = self.connection.recv() => match point {
                    Some(point) if point.value == 0.0 => {
                        self.cancel_job().await;
                        self.set_connected(false);
                    }
                    Some(_) => {
                        self.set_connected(true);
                        self.ensure_job();
                    }
                    None => break,
                },
                command = self.commands.recv() => match command {
                    Some(Command::Submit { route, reply }) => {
                        let result = self.replace_job(route).await;
                        let _ = reply.send(result);
                    }
                    Some(Command::Close) | None => break,
                },
                joined = Self::join(&mut self.job), if self.job.is_some() => {
                    self.job = None;
                    let progress = match joined {
                        Ok(progress) => progress,
                        Err(e) => self.recover(e),
                    };
                    self.progress = Some(progress);
                    if progress.complete {
                        info!(points = self.route.len(), "route upload complete");
                    }
                }
            }
        }
        self.cancel_job().await;
        debug!("track uploader stopped");
    }

    async fn join(job: &mut Option<RunningJob>) -> Result<UploadProgress, JoinError> {
        match job.as_mut() {
            Some(running) => (&mut running.handle).await,
            None => std::future::pending().await,
        }
    }

    /// Fall back to the last committed progress when a send loop dies without
    /// handing its progress back. The job restarts only if nothing can be read.
    fn recover(&self, failure: JoinError) -> UploadProgress {
        error!(error = %failure, "upload send loop failed");
        let message = format!("upload send loop failed: {}", failure);
        self.ctx.status.send_modify(|s| s.last_error = Some(message));

        match self.ctx.store.load_progress() {
            Ok(Some(progress)) => progress.normalize(self.route.len()),
            Ok(None) => UploadProgress::new_job(),
            Err(e) => {
                error!(error = %e, "cannot reload upload progress, restarting job");
                UploadProgress::new_job()
            }
        }
    }

    fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
        self.ctx.status.send_modify(|s| s.connected = connected);
    }

    fn ensure_job(&mut self) {
        if self.job.is_some() {
            return;
        }
        let Some(progress) = self.progress.take() else {
            return;
        };
        if progress.complete {
            self.progress = Some(progress);
            return;
        }

        info!(state = %progress.state(), points = self.route.len(), "resuming route upload");
        let (cancel, cancelled) = oneshot::channel();
        let handle = tokio::spawn(send_loop(self.ctx.clone(), progress, self.route.clone(), cancelled));
        self.job = Some(RunningJob { cancel, handle });
    }

    /// Signal the send loop and wait for it to hand back its progress.
    async fn cancel_job(&mut self) {
        let Some(job) = self.job.take() else {
            return;
        };
        let _ = job.cancel.send(());
        let progress = match job.handle.await {
            Ok(progress) => progress,
            Err(e) => self.recover(e),
        };
        self.progress = Some(progress);
    }

    async fn replace_job(&mut self, route: Route) -> Result<()> {
        self.cancel_job().await;

        let critical = critical_points(&route);
        info!(points = route.len(), critical = critical.len(), "new route submitted");

        let progress = UploadProgress::new_job();
        self.route = Arc::new(critical);
        self.progress = Some(progress);

        // progress first: a crash in between re-sends the old route in full
        // instead of resuming the new one at a stale index
        let committed = self.ctx.commit(&progress);
        let saved = self.ctx.store.save_route(&route);
        if let Err(e) = &saved {
            error!(error = %e, "failed to persist route");
            let message = format!("{:#}", e);
            self.ctx.status.send_modify(|s| s.last_error = Some(message));
        }

        if self.connected {
            self.ensure_job();
        }
        committed.and(saved)
    }
}

async fn send_loop(
    ctx: JobContext,
    mut progress: UploadProgress,
    route: Arc<Vec<Waypoint>>,
    mut cancelled: oneshot::Receiver<()>,
) -> UploadProgress {
    let mut acks = match ctx
        .hub
        .subscribe(MetricFilter::only([BEGIN_ACK_METRIC, PACKET_ACK_METRIC]))
    {
        Ok(acks) => acks,
        Err(e) => {
            warn!(error = %e, "cannot listen for ACKs");
            return progress;
        }
    };

    'send: while !progress.complete {
        let state = progress.state();
        if matches!(state, UploadState::Idle | UploadState::Complete) {
            break;
        }
        let send = async {
            match state {
                UploadState::SendingHeader => ctx.messenger.send_route_begin(route.len()).await,
                UploadState::SendingPoint(i) => match route.get(i) {
                    Some(point) => ctx.messenger.send_waypoint(i, point).await,
                    None => Err(anyhow!("waypoint {} missing from a {}-point route", i, route.len())),
                },
                UploadState::Idle | UploadState::Complete => Ok(()),
            }
        };
        // a full downlink queue must not delay cancellation
        let sent = tokio::select! {
            _ = &mut cancelled => break 'send,
            sent = send => sent,
        };
        match sent {
            Ok(()) => debug!(%state, "packet sent"),
            Err(e) => warn!(%state, error = %e, "failed to send packet, will retry"),
        }

        let retry = tokio::time::sleep(ctx.retry_timeout);
        tokio::pin!(retry);
        loop {
            tokio::select! {
                _ = &mut cancelled => break 'send,
                _ = &mut retry => {
                    debug!(%state, "no ACK before timeout, resending");
                    continue 'send;
                }
                ack = acks.recv() => {
                    let Some(ack) = ack else { break 'send };
                    if progress.apply_ack(&ack, route.len()) {
                        let _ = ctx.commit(&progress);
                        continue 'send;
                    }
                    debug!(metric = %ack.metric, value = ack.value, %state, "ignoring unexpected ACK");
                }
            }
        }
    }

    let _ = ctx.hub.unsubscribe(acks.id());
    progress
}

pub struct TrackUploader {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<UploadStatus>,
    store: Arc<TrackStore>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl TrackUploader {
    /// Restore any persisted job and start the supervisor. Upload resumes
    /// once a `Connection_Status = 1` point arrives.
    pub fn start(
        store: TrackStore,
        hub: DatapointHub,
        messenger: CarMessenger,
        retry_timeout: Duration,
    ) -> Result<Self> {
        let store = Arc::new(store);
        let (route, progress) = match store.load_route()? {
            Some(route) => {
                let critical = critical_points(&route);
                let progress = match store.load_progress()? {
                    Some(p) => p.normalize(critical.len()),
                    None => {
                        let p = UploadProgress::new_job();
                        store.save_progress(&p)?;
                        p
                    }
                };
                (critical, Some(progress))
            }
            None => (Vec::new(), None),
        };

        let initial = UploadStatus {
            state: progress.map_or(UploadState::Idle, |p| p.state()),
            connected: false,
            last_error: None,
        };
        info!(state = %initial.state, points = route.len(), "track uploader starting");

        let (status_tx, status) = watch::channel(initial);
        let (commands, command_rx) = mpsc::channel(8);
        let connection = hub.subscribe(MetricFilter::only([CONNECTION_STATUS_METRIC]))?;

        let supervisor = Supervisor {
            ctx: JobContext {
                store: store.clone(),
                hub,
                messenger,
                retry_timeout,
                status: Arc::new(status_tx),
            },
            commands: command_rx,
            connection,
            route: Arc::new(route),
            progress,
            job: None,
            connected: false,
        };
        let handle = tokio::spawn(supervisor.run());

        Ok(Self {
            commands,
            status,
            store,
            supervisor: Mutex::new(Some(handle)),
        })
    }

    /// Persist `route` and start uploading its critical points from the
    /// beginning, abandoning any job in flight.
    pub async fn submit_route(&self, route: Route) -> Result<()> {
        let critical = route.iter().filter(|p| p.critical).count();
        if critical > MAX_CRITICAL_POINTS {
            bail!("route has {} critical points, limit is {}", critical, MAX_CRITICAL_POINTS);
        }

        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Submit { route, reply })
            .await
            .map_err(|_| anyhow!("track uploader has stopped"))?;
        response.await.map_err(|_| anyhow!("track uploader has stopped"))?
    }

    /// The full persisted route, including non-critical points
    pub fn current_route(&self) -> Result<Option<Route>> {
        self.store.load_route()
    }

    pub fn status(&self) -> UploadStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<UploadStatus> {
        self.status.clone()
    }

    /// Stop the send loop (between packets) and the supervisor.
    pub async fn close(&self) {
        let _ = self.commands.send(Command::Close).await;
        if let Some(handle) = self.supervisor.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "track uploader task ended abnormally");
            }
        }
    }
}
