/*
Copyright (c) 2021 VMware, Inc.
SPDX-License-Identifier: MIT
Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:
The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.
THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
*/

//! A session owns one stream to the Runtime.
//!
//! Requests are serialized through the session's request slot.  A dispatcher task owns the
//! inbound half of the stream and routes what arrives on it: subscription and warm-init
//! responses complete the calls waiting for them, while digests, idle timeouts and port status
//! changes go to three bounded queues drained by [`Session::digest_get`], [`Session::idle_get`]
//! and [`Session::port_event_get`].

use futures::stream::StreamExt;

use proto::bfruntime::{
    self as pb,
    set_forwarding_pipeline_config_request::Action,
    stream_message_request,
    stream_message_response,
    subscribe,
    SetForwardingPipelineConfigResponseType as ResponseType,
};

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::fs;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::hashing::DynHash;
use crate::learn::Learn;
use crate::runtime::{GrpcRuntime, ResponseStream, Runtime};
use crate::schema::{Program, Registry, TableInfo};
use crate::table::{Table, WriteBatch};
use crate::target::{Target, PIPE_ALL};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Unconnected,
    Subscribed,
    Bound,
    ShuttingDown,
}

impl Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Unconnected => "unconnected",
            SessionState::Subscribed => "subscribed",
            SessionState::Bound => "bound",
            SessionState::ShuttingDown => "shutting down",
        };
        write!(f, "{}", s)
    }
}

/// How a drain waits for a notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wait {
    /// Return immediately.
    Poll,
    /// Block until a notification arrives or the timeout elapses.
    Timeout(Duration),
}

/// A digest list received from a learn filter.
#[derive(Clone, Debug, PartialEq)]
pub struct Digest {
    pub target: Target,
    pub learn_filter_id: u32,
    pub list_id: u32,
    pub sequence: u64,
    pub data: Vec<pb::TableData>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IdleTimeout {
    pub target: Target,
    pub table_id: u32,
    pub entry: pb::TableEntry,
    pub sequence: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PortStatus {
    pub port_key: Option<pb::TableKey>,
    pub up: bool,
    pub sequence: u64,
}

/// One profile of a compiled program.  Paths are read as opaque bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfileConfig {
    pub profile_name: String,
    pub context: PathBuf,
    pub binary: PathBuf,
    pub pipe_scope: Vec<u32>,
}

/// A program to install with `SetForwardingPipelineConfig`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    pub p4_name: String,
    pub bfruntime_info: PathBuf,
    pub profiles: Vec<ProfileConfig>,
}

impl PipelineConfig {
    fn to_proto(&self) -> Result<pb::ForwardingPipelineConfig> {
        let read = |path: &PathBuf| {
            fs::read(path).map_err(|e| {
                Error::Config(format!("{}: {}: {}", self.p4_name, path.display(), e))
            })
        };
        Ok(pb::ForwardingPipelineConfig {
            p4_name: self.p4_name.clone(),
            bfruntime_info: read(&self.bfruntime_info)?,
            profiles: self
                .profiles
                .iter()
                .map(|p| {
                    Ok(pb::forwarding_pipeline_config::Profile {
                        profile_name: p.profile_name.clone(),
                        context: read(&p.context)?,
                        binary: read(&p.binary)?,
                        pipe_scope: p.pipe_scope.clone(),
                    })
                })
                .collect::<Result<_>>()?,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Awaited {
    Subscribe,
    WarmInitStarted,
    WarmInitFinished,
}

struct Waiter {
    id: u64,
    awaited: Awaited,
    respond_to: oneshot::Sender<Result<()>>,
}

struct Inner {
    state: SessionState,
    bound: Option<String>,
    /// Why the stream broke, once it has.
    lost: Option<String>,
    waiters: Vec<Waiter>,
    next_waiter: u64,
}

/// State shared between a session and its dispatcher.
struct Shared {
    inner: Mutex<Inner>,
    lost: watch::Sender<bool>,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn expect(&self, awaited: Awaited) -> (u64, oneshot::Receiver<Result<()>>) {
        let (respond_to, recv) = oneshot::channel();
        let mut inner = self.lock();
        let id = inner.next_waiter;
        inner.next_waiter += 1;
        inner.waiters.push(Waiter {
            id,
            awaited,
            respond_to,
        });
        (id, recv)
    }

    fn forget(&self, id: u64) {
        self.lock().waiters.retain(|w| w.id != id);
    }

    /// Completes the oldest call waiting for `awaited`.
    fn complete(&self, awaited: Awaited, result: Result<()>) {
        let mut inner = self.lock();
        match inner.waiters.iter().position(|w| w.awaited == awaited) {
            Some(i) => {
                let waiter = inner.waiters.remove(i);
                let _ = waiter.respond_to.send(result);
            }
            None => debug!("dropping unsolicited {:?} response", awaited),
        }
    }

    fn disconnect(&self, reason: String) {
        let waiters = {
            let mut inner = self.lock();
            if inner.state == SessionState::ShuttingDown {
                debug!("session stream closed: {}", reason);
            } else {
                warn!("session lost its stream: {}", reason);
                inner.lost = Some(reason.clone());
            }
            inner.state = SessionState::Unconnected;
            inner.bound = None;
            std::mem::take(&mut inner.waiters)
        };
        for w in waiters {
            let _ = w.respond_to.send(Err(Error::ConnectionLost(reason.clone())));
        }
        let _ = self.lost.send(true);
    }
}

/// Resolves once the session's stream is gone.
async fn stream_lost(mut lost: watch::Receiver<bool>) {
    while !*lost.borrow_and_update() {
        if lost.changed().await.is_err() {
            return;
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum NotificationKind {
    Digest,
    IdleTimeout,
    PortStatus,
}

struct Dispatcher {
    inbound: ResponseStream<pb::StreamMessageResponse>,
    outbound: mpsc::Sender<pb::StreamMessageRequest>,
    shared: Arc<Shared>,
    client_id: u32,
    digests: mpsc::Sender<Digest>,
    idle_timeouts: mpsc::Sender<IdleTimeout>,
    port_events: mpsc::Sender<PortStatus>,
    sequences: HashMap<(NotificationKind, u32), u64>,
}

fn enqueue<T>(queue: &mpsc::Sender<T>, what: &str, item: T) {
    match queue.try_send(item) {
        Ok(()) => (),
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!("{} queue is full, dropping notification", what)
        }
        Err(mpsc::error::TrySendError::Closed(_)) => (),
    }
}

impl Dispatcher {
    async fn run(mut self) {
        let reason = loop {
            match self.inbound.next().await {
                Some(Ok(msg)) => self.handle_message(msg).await,
                Some(Err(status)) => break format!("{:?}: {}", status.code(), status.message()),
                None => break "stream closed by runtime".to_string(),
            }
        };
        self.shared.disconnect(reason);
    }

    fn sequence(&mut self, kind: NotificationKind, pipe: u32) -> u64 {
        let next = self.sequences.entry((kind, pipe)).or_insert(0);
        *next += 1;
        *next
    }

    async fn handle_message(&mut self, msg: pb::StreamMessageResponse) {
        use stream_message_response::Update;

        match msg.update {
            Some(Update::Subscribe(s)) => {
                let result = match s.status {
                    Some(status) if status.code != 0 => Err(Error::RuntimeRejected {
                        code: tonic::Code::from_i32(status.code),
                        message: status.message,
                        sub_errors: Vec::new(),
                    }),
                    _ => Ok(()),
                };
                self.shared.complete(Awaited::Subscribe, result);
            }
            Some(Update::SetForwardingPipelineConfigResponse(r)) => {
                match ResponseType::try_from(r.set_forwarding_pipeline_config_response_type) {
                    Ok(ResponseType::WarmInitStarted) => {
                        self.shared.complete(Awaited::WarmInitStarted, Ok(()))
                    }
                    Ok(ResponseType::WarmInitFinished) => {
                        self.shared.complete(Awaited::WarmInitFinished, Ok(()))
                    }
                    Err(_) => warn!(
                        "unknown pipeline config response type {}",
                        r.set_forwarding_pipeline_config_response_type
                    ),
                }
            }
            Some(Update::Digest(d)) => {
                let target = d.target.as_ref().map(Target::from).unwrap_or_else(|| Target::new(0));
                let sequence = self.sequence(NotificationKind::Digest, target.pipe_id);
                debug!(
                    "digest {} list {} from {} ({} entries)",
                    d.digest_id,
                    d.list_id,
                    target,
                    d.data.len()
                );
                let ack = pb::StreamMessageRequest {
                    client_id: self.client_id,
                    update: Some(stream_message_request::Update::DigestAck(pb::DigestListAck {
                        digest_id: d.digest_id,
                        list_id: d.list_id,
                    })),
                };
                if self.outbound.send(ack).await.is_err() {
                    debug!("could not acknowledge digest list {}", d.list_id);
                }
                enqueue(
                    &self.digests,
                    "digest",
                    Digest {
                        target,
                        learn_filter_id: d.digest_id,
                        list_id: d.list_id,
                        sequence,
                        data: d.data,
                    },
                );
            }
            Some(Update::IdleTimeoutNotification(n)) => {
                let target = n.target.as_ref().map(Target::from).unwrap_or_else(|| Target::new(0));
                let entry = n.table_entry.unwrap_or_default();
                let sequence = self.sequence(NotificationKind::IdleTimeout, target.pipe_id);
                enqueue(
                    &self.idle_timeouts,
                    "idle timeout",
                    IdleTimeout {
                        target,
                        table_id: entry.table_id,
                        entry,
                        sequence,
                    },
                );
            }
            Some(Update::PortStatusChangeNotification(n)) => {
                let sequence = self.sequence(NotificationKind::PortStatus, PIPE_ALL);
                enqueue(
                    &self.port_events,
                    "port status",
                    PortStatus {
                        port_key: n.port_key,
                        up: n.port_up,
                        sequence,
                    },
                );
            }
            None => debug!("empty message on stream"),
        }
    }
}

/// A read in progress.  Holds the session's request slot until dropped.
pub(crate) struct ReadStream {
    _slot: OwnedMutexGuard<()>,
    responses: ResponseStream<pb::ReadResponse>,
    lost: watch::Receiver<bool>,
    deadline: Option<Duration>,
}

impl ReadStream {
    /// Next response of the read, or `None` at its end.
    pub(crate) async fn next(&mut self) -> Option<Result<pb::ReadResponse>> {
        let lost = stream_lost(self.lost.clone());
        let next = async {
            tokio::select! {
                r = self.responses.next() => r.map(|r| r.map_err(Error::from_status)),
                _ = lost => Some(Err(Error::ConnectionLost("stream lost during read".into()))),
            }
        };
        match self.deadline {
            Some(d) => match timeout(d, next).await {
                Ok(r) => r,
                Err(_) => Some(Err(Error::DeadlineExceeded)),
            },
            None => next.await,
        }
    }
}

/// A client session with the Runtime.
pub struct Session {
    config: SessionConfig,
    runtime: Arc<dyn Runtime>,
    registry: Arc<Registry>,
    shared: Arc<Shared>,
    slot: Arc<tokio::sync::Mutex<()>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    digests: tokio::sync::Mutex<mpsc::Receiver<Digest>>,
    idle_timeouts: tokio::sync::Mutex<mpsc::Receiver<IdleTimeout>>,
    port_events: tokio::sync::Mutex<mpsc::Receiver<PortStatus>>,
}

impl Session {
    /// Connects to the Runtime at `config.grpc_addr` and subscribes.
    pub async fn connect(config: SessionConfig, registry: Arc<Registry>) -> Result<Self> {
        let runtime = GrpcRuntime::connect(&config.grpc_addr).await?;
        Self::with_runtime(config, registry, Arc::new(runtime)).await
    }

    /// Opens a session over an already established transport and subscribes.
    pub async fn with_runtime(
        config: SessionConfig,
        registry: Arc<Registry>,
        runtime: Arc<dyn Runtime>,
    ) -> Result<Self> {
        let (lost, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                state: SessionState::Unconnected,
                bound: None,
                lost: None,
                waiters: Vec::new(),
                next_waiter: 0,
            }),
            lost,
        });

        let (outbound, requests) = mpsc::channel(config.queue_capacity.max(1));
        let inbound = runtime
            .stream_channel(requests)
            .await
            .map_err(Error::from_status)?;

        let (subscribed_id, subscribed) = shared.expect(Awaited::Subscribe);
        let subscribe = pb::StreamMessageRequest {
            client_id: config.client_id,
            update: Some(stream_message_request::Update::Subscribe(pb::Subscribe {
                is_master: config.is_master,
                device_id: config.device_id,
                notifications: Some(subscribe::Notifications {
                    enable_learn_notifications: config.notifications.learn,
                    enable_idletimeout_notifications: config.notifications.idle_timeout,
                    enable_port_status_change_notifications: config.notifications.port_status,
                }),
                status: None,
            })),
        };
        outbound
            .send(subscribe)
            .await
            .map_err(|_| Error::ConnectionLost("stream closed before subscribe".into()))?;

        let capacity = config.queue_capacity.max(1);
        let (digests_tx, digests) = mpsc::channel(capacity);
        let (idle_tx, idle_timeouts) = mpsc::channel(capacity);
        let (ports_tx, port_events) = mpsc::channel(capacity);
        let dispatcher = Dispatcher {
            inbound,
            outbound,
            shared: shared.clone(),
            client_id: config.client_id,
            digests: digests_tx,
            idle_timeouts: idle_tx,
            port_events: ports_tx,
            sequences: HashMap::new(),
        };
        let handle = tokio::spawn(dispatcher.run());

        let session = Session {
            config,
            runtime,
            registry,
            shared,
            slot: Arc::new(tokio::sync::Mutex::new(())),
            dispatcher: Mutex::new(Some(handle)),
            digests: tokio::sync::Mutex::new(digests),
            idle_timeouts: tokio::sync::Mutex::new(idle_timeouts),
            port_events: tokio::sync::Mutex::new(port_events),
        };
        session
            .await_response(subscribed_id, subscribed)
            .await?;
        session.shared.lock().state = SessionState::Subscribed;
        info!(
            "client {} subscribed to device {}",
            session.config.client_id, session.config.device_id
        );
        Ok(session)
    }

    pub fn client_id(&self) -> u32 {
        self.config.client_id
    }

    pub fn device_id(&self) -> u32 {
        self.config.device_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    /// A target on this session's device covering all pipes, directions and parsers.
    pub fn target(&self) -> Target {
        Target::new(self.config.device_id)
    }

    fn check_connected(&self) -> Result<()> {
        let inner = self.shared.lock();
        match (inner.state, &inner.lost) {
            (SessionState::Unconnected, Some(reason)) => {
                Err(Error::ConnectionLost(reason.clone()))
            }
            (SessionState::Unconnected, None) | (SessionState::ShuttingDown, _) => Err(
                Error::InvalidState(format!("session is {}", inner.state)),
            ),
            _ => Ok(()),
        }
    }

    async fn with_deadline<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.config.deadline() {
            Some(d) => timeout(d, fut).await.map_err(|_| Error::DeadlineExceeded)?,
            None => fut.await,
        }
    }

    /// Runs one RPC in the request slot, failing if the stream breaks or the deadline passes.
    async fn call<T, F>(&self, rpc: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, tonic::Status>>,
    {
        self.check_connected()?;
        let lost = stream_lost(self.shared.lost.subscribe());
        self.with_deadline(async {
            let _slot = self.slot.lock().await;
            tokio::select! {
                r = rpc => r.map_err(Error::from_status),
                _ = lost => Err(Error::ConnectionLost("stream lost during call".into())),
            }
        })
        .await
    }

    async fn await_response(
        &self,
        id: u64,
        response: oneshot::Receiver<Result<()>>,
    ) -> Result<()> {
        let result = self
            .with_deadline(async {
                response
                    .await
                    .unwrap_or_else(|_| Err(Error::ConnectionLost("dispatcher stopped".into())))
            })
            .await;
        if result.is_err() {
            self.shared.forget(id);
        }
        result
    }

    async fn set_forwarding_pipeline_config(
        &self,
        action: Action,
        base_path: &str,
        configs: &[PipelineConfig],
        awaited: Awaited,
    ) -> Result<()> {
        let config = configs
            .iter()
            .map(PipelineConfig::to_proto)
            .collect::<Result<Vec<_>>>()?;
        let blobs: Vec<(String, Vec<u8>)> = config
            .iter()
            .map(|c| (c.p4_name.clone(), c.bfruntime_info.clone()))
            .collect();
        let request = pb::SetForwardingPipelineConfigRequest {
            device_id: self.config.device_id,
            client_id: self.config.client_id,
            action: action as i32,
            dev_init_mode: 0,
            base_path: base_path.into(),
            config,
        };

        let (id, response) = self.shared.expect(awaited);
        let reply = match self
            .call(self.runtime.set_forwarding_pipeline_config(request))
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                self.shared.forget(id);
                return Err(e);
            }
        };
        let immediate = match awaited {
            Awaited::WarmInitStarted => ResponseType::WarmInitStarted as i32,
            _ => ResponseType::WarmInitFinished as i32,
        };
        if reply.set_forwarding_pipeline_config_response_type == immediate {
            self.shared.forget(id);
        } else {
            self.await_response(id, response).await?;
        }

        for (name, blob) in blobs {
            self.registry.load(&name, &blob)?;
        }
        if action != Action::WarmInitEnd {
            let mut inner = self.shared.lock();
            inner.state = SessionState::Subscribed;
            inner.bound = None;
        }
        info!("{:?} completed on device {}", action, self.config.device_id);
        Ok(())
    }

    /// Verifies and installs `configs`, waiting until the new pipeline is active.
    pub async fn verify_and_warm_init_begin_and_end(
        &self,
        base_path: &str,
        configs: &[PipelineConfig],
    ) -> Result<()> {
        self.set_forwarding_pipeline_config(
            Action::VerifyAndWarmInitBeginAndEnd,
            base_path,
            configs,
            Awaited::WarmInitFinished,
        )
        .await
    }

    /// Verifies `configs` and holds the new pipeline for replay.  Writes made before
    /// [`Session::warm_init_end`] populate the new pipeline and reads see the old one.
    pub async fn verify_and_warm_init_begin(
        &self,
        base_path: &str,
        configs: &[PipelineConfig],
    ) -> Result<()> {
        self.set_forwarding_pipeline_config(
            Action::VerifyAndWarmInitBegin,
            base_path,
            configs,
            Awaited::WarmInitStarted,
        )
        .await
    }

    /// Commits the replayed pipeline.
    pub async fn warm_init_end(&self) -> Result<()> {
        self.set_forwarding_pipeline_config(
            Action::WarmInitEnd,
            "",
            &[],
            Awaited::WarmInitFinished,
        )
        .await
    }

    /// Programs installed on the device, with their schemas.
    pub async fn get_forwarding_pipeline_config(&self) -> Result<Vec<pb::ForwardingPipelineConfig>> {
        let request = pb::GetForwardingPipelineConfigRequest {
            device_id: self.config.device_id,
            client_id: self.config.client_id,
        };
        let reply = self
            .call(self.runtime.get_forwarding_pipeline_config(request))
            .await?;
        Ok(reply.config)
    }

    /// Binds the session to `program`.  The program's schema is fetched from the Runtime if
    /// the registry does not have it yet.
    pub async fn bind(&self, program: &str) -> Result<()> {
        let request = pb::SetForwardingPipelineConfigRequest {
            device_id: self.config.device_id,
            client_id: self.config.client_id,
            action: Action::Bind as i32,
            dev_init_mode: 0,
            base_path: String::new(),
            config: vec![pb::ForwardingPipelineConfig {
                p4_name: program.into(),
                ..Default::default()
            }],
        };
        match self.call(self.runtime.set_forwarding_pipeline_config(request)).await {
            Err(Error::RuntimeRejected {
                code: tonic::Code::NotFound,
                ..
            }) => return Err(Error::unknown("program", program)),
            r => r?,
        };

        if !self.registry.contains(program) {
            debug!("fetching schema of {} from the runtime", program);
            let configs = self.get_forwarding_pipeline_config().await?;
            let config = configs
                .iter()
                .find(|c| c.p4_name == program)
                .ok_or_else(|| Error::unknown("program", program))?;
            self.registry.load(program, &config.bfruntime_info)?;
        }

        let mut inner = self.shared.lock();
        inner.state = SessionState::Bound;
        inner.bound = Some(program.into());
        info!("client {} bound to {}", self.config.client_id, program);
        Ok(())
    }

    /// Closes the stream.  The session is unconnected afterward.
    pub async fn tear_down(&self) -> Result<()> {
        let handle = {
            let mut inner = self.shared.lock();
            if inner.state == SessionState::Unconnected {
                return Ok(());
            }
            inner.state = SessionState::ShuttingDown;
            self.dispatcher
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
        };
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        self.shared.disconnect("session torn down".into());
        info!("client {} torn down", self.config.client_id);
        Ok(())
    }

    /// The bound program, with the annotations current at the time of the call.
    pub fn program(&self) -> Result<Program> {
        let bound = self.shared.lock().bound.clone();
        match bound {
            Some(name) => self.registry.get(&name),
            None => Err(Error::InvalidState(format!(
                "client {} is not bound to a program",
                self.config.client_id
            ))),
        }
    }

    pub fn table(&self, name: &str) -> Result<Table<'_>> {
        let program = self.program()?;
        let info = program.table(name)?.clone();
        Ok(Table::new(self, program, info))
    }

    pub fn learn(&self, name: &str) -> Result<Learn> {
        let program = self.program()?;
        let filter = program.learn_filter(name)?.clone();
        Ok(Learn::new(program, filter))
    }

    /// The dynamic hashing surface formed by a hash-configure table and its algorithm table.
    pub fn dyn_hash(&self, configure: &str, algorithm: &str) -> Result<DynHash<'_>> {
        DynHash::new(self.table(configure)?, self.table(algorithm)?)
    }

    pub fn write_batch(&self) -> WriteBatch<'_> {
        WriteBatch::new(self)
    }

    pub(crate) async fn write(&self, target: &Target, updates: Vec<pb::Update>) -> Result<()> {
        let request = pb::WriteRequest {
            target: Some(target.to_proto()),
            client_id: self.config.client_id,
            updates,
            atomicity: 0,
            p4_name: self.shared.lock().bound.clone().unwrap_or_default(),
        };
        debug!("client {}: write of {} updates", self.config.client_id, request.updates.len());
        self.call(self.runtime.write(request)).await?;
        Ok(())
    }

    /// Starts a read.  The returned stream keeps the request slot until dropped.
    pub(crate) async fn read(&self, target: &Target, entities: Vec<pb::Entity>) -> Result<ReadStream> {
        self.check_connected()?;
        let request = pb::ReadRequest {
            target: Some(target.to_proto()),
            client_id: self.config.client_id,
            entities,
            p4_name: self.shared.lock().bound.clone().unwrap_or_default(),
        };
        let lost = self.shared.lost.subscribe();
        let (slot, responses) = self
            .with_deadline(async {
                let slot = self.slot.clone().lock_owned().await;
                let responses = tokio::select! {
                    r = self.runtime.read(request) => r.map_err(Error::from_status)?,
                    _ = stream_lost(lost.clone()) => {
                        return Err(Error::ConnectionLost("stream lost during read".into()))
                    }
                };
                Ok((slot, responses))
            })
            .await?;
        Ok(ReadStream {
            _slot: slot,
            responses,
            lost,
            deadline: self.config.deadline(),
        })
    }

    /// Reads `entities` to completion.  A response carrying a non-OK status fails the read.
    pub(crate) async fn read_all(&self, target: &Target, entities: Vec<pb::Entity>) -> Result<Vec<pb::Entity>> {
        let mut stream = self.read(target, entities).await?;
        let mut result = Vec::new();
        let mut index = 0;
        while let Some(response) = stream.next().await {
            let response = response?;
            if let Some(error) = crate::table::response_error(index, &response) {
                return Err(error);
            }
            result.extend(response.entities);
            index += 1;
        }
        Ok(result)
    }

    async fn drain<T>(queue: &tokio::sync::Mutex<mpsc::Receiver<T>>, wait: Wait) -> Option<T> {
        let mut queue = queue.lock().await;
        match wait {
            Wait::Poll => queue.try_recv().ok(),
            Wait::Timeout(d) => timeout(d, queue.recv()).await.ok().flatten(),
        }
    }

    pub async fn digest_get(&self, wait: Wait) -> Option<Digest> {
        Self::drain(&self.digests, wait).await
    }

    pub async fn idle_get(&self, wait: Wait) -> Option<IdleTimeout> {
        Self::drain(&self.idle_timeouts, wait).await
    }

    pub async fn port_event_get(&self, wait: Wait) -> Option<PortStatus> {
        Self::drain(&self.port_events, wait).await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(handle) = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

/// The tables of each session's bound program, keyed by client id.
pub fn all_tables(sessions: &[&Session]) -> Result<Vec<(u32, Vec<Arc<TableInfo>>)>> {
    sessions
        .iter()
        .map(|s| Ok((s.client_id(), s.program()?.tables().cloned().collect())))
        .collect()
}
