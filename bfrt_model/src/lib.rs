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

//! An in-memory BF Runtime.
//!
//! [`Model`] implements [`bfrt::Runtime`] without a switch.  It installs programs, keeps
//! table entries per entry-scope instance, answers reads, and reports per-update failures the
//! way the Runtime does.  Tests drive the data plane side through hooks: counting hits,
//! looking up packets, hashing, and emitting notifications.

mod hash;
mod pipeline;

pub use hash::crc;
pub use pipeline::{Hit, COUNTER_BYTES, COUNTER_PKTS};

use async_trait::async_trait;

use bfrt::runtime::{ResponseStream, Runtime};
use bfrt::table::Key;
use bfrt::target::Target;

use futures::stream::{self, StreamExt};

use prost::Message;

use proto::bfruntime::{
    self as pb,
    set_forwarding_pipeline_config_request::Action,
    stream_message_request,
    stream_message_response,
    subscribe,
    update,
    GetForwardingPipelineConfigRequest,
    GetForwardingPipelineConfigResponse,
    ReadRequest,
    ReadResponse,
    SetForwardingPipelineConfigRequest,
    SetForwardingPipelineConfigResponse,
    SetForwardingPipelineConfigResponseType,
    StreamMessageRequest,
    StreamMessageResponse,
    WriteRequest,
    WriteResponse,
};

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;

use tokio_stream::wrappers::UnboundedReceiverStream;

use tonic::{Code, Status};

use tracing::{debug, info, warn};

use crate::pipeline::Pipeline;

pub const DEFAULT_NUM_PIPES: u32 = 4;

type Outbound = mpsc::UnboundedSender<Result<StreamMessageResponse, Status>>;

struct Client {
    device_id: u32,
    sender: Outbound,
    notifications: subscribe::Notifications,
}

#[derive(Default)]
struct Device {
    active: BTreeMap<String, Pipeline>,
    /// Programs installed by a warm init that has not ended yet.
    staged: Option<BTreeMap<String, Pipeline>>,
}

impl Device {
    /// Reads see the active program.  A program that only exists staged is read there.
    fn program(&self, name: &str) -> Result<&Pipeline, Status> {
        self.active
            .get(name)
            .or_else(|| self.staged.as_ref().and_then(|s| s.get(name)))
            .ok_or_else(|| Status::not_found(format!("program {} is not installed", name)))
    }

    /// Writes go to the staged program while a warm init is in progress.
    fn program_for_write(&mut self, name: &str) -> Result<&mut Pipeline, Status> {
        if let Some(p) = self.staged.as_mut().and_then(|s| s.get_mut(name)) {
            return Ok(p);
        }
        self.active
            .get_mut(name)
            .ok_or_else(|| Status::not_found(format!("program {} is not installed", name)))
    }
}

#[derive(Default)]
struct State {
    devices: HashMap<u32, Device>,
    clients: HashMap<u32, Client>,
    acked: Vec<(u32, u32)>,
    delay: Option<Duration>,
}

impl State {
    fn device(&self, id: u32) -> Result<&Device, Status> {
        self.devices
            .get(&id)
            .ok_or_else(|| Status::not_found(format!("device {} has no program", id)))
    }

    fn notify<F>(&mut self, device_id: u32, wants: F, message: StreamMessageResponse) -> usize
    where
        F: Fn(&subscribe::Notifications) -> bool,
    {
        let mut sent = 0;
        for (id, c) in self.clients.iter() {
            if c.device_id == device_id && wants(&c.notifications) {
                if c.sender.send(Ok(message.clone())).is_ok() {
                    sent += 1;
                } else {
                    debug!("client {} stream is closed", id);
                }
            }
        }
        sent
    }
}

fn update_message(update: stream_message_response::Update) -> StreamMessageResponse {
    StreamMessageResponse {
        update: Some(update),
    }
}

fn ok_status() -> proto::status::Status {
    proto::status::Status {
        code: Code::Ok as i32,
        message: String::new(),
        details: Vec::new(),
    }
}

/// Packs per-update results into the details of a failed write.
fn write_failure(results: &[Result<(), Status>]) -> Status {
    let details = results
        .iter()
        .map(|r| {
            let (code, message) = match r {
                Ok(()) => (Code::Ok, String::new()),
                Err(s) => (s.code(), s.message().to_string()),
            };
            prost_types::Any {
                type_url: pb::ERROR_TYPE_URL.into(),
                value: pb::Error {
                    canonical_code: code as i32,
                    message,
                    ..Default::default()
                }
                .encode_to_vec(),
            }
        })
        .collect();
    let message = results
        .iter()
        .find_map(|r| r.as_ref().err().map(|s| s.message().to_string()))
        .unwrap_or_default();
    let status = proto::status::Status {
        code: Code::Unknown as i32,
        message: message.clone(),
        details,
    };
    Status::with_details(Code::Unknown, message, status.encode_to_vec().into())
}

/// An in-memory BF Runtime.  Clones share state.
#[derive(Clone)]
pub struct Model {
    state: Arc<Mutex<State>>,
    num_pipes: u32,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    pub fn new() -> Self {
        Self::with_pipes(DEFAULT_NUM_PIPES)
    }

    pub fn with_pipes(num_pipes: u32) -> Self {
        Model {
            state: Arc::new(Mutex::new(State::default())),
            num_pipes,
        }
    }

    pub fn num_pipes(&self) -> u32 {
        self.num_pipes
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn pause(&self) {
        let delay = self.lock().delay;
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
    }

    /// Delays every reply by `delay`.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.lock().delay = delay;
    }

    fn with_pipeline<T, F>(&self, device: u32, program: &str, f: F) -> Result<T, Status>
    where
        F: FnOnce(&Pipeline) -> Result<T, Status>,
    {
        let state = self.lock();
        f(state.device(device)?.program(program)?)
    }

    fn with_pipeline_mut<T, F>(&self, device: u32, program: &str, f: F) -> Result<T, Status>
    where
        F: FnOnce(&mut Pipeline) -> Result<T, Status>,
    {
        let mut state = self.lock();
        let device = state
            .devices
            .get_mut(&device)
            .ok_or_else(|| Status::not_found(format!("device {} has no program", device)))?;
        f(device.program_for_write(program)?)
    }

    /// Counts `packets` hits of `bytes` bytes on the entry with `key`.  The counts reach
    /// software reads after a sync.
    pub fn record_hits(
        &self,
        device: u32,
        program: &str,
        table: &str,
        target: &Target,
        key: &Key,
        packets: u64,
        bytes: u64,
    ) -> Result<(), Status> {
        self.with_pipeline_mut(device, program, |p| {
            p.table_by_name_mut(table)?
                .record_hits(target, key, packets, bytes)
        })
    }

    /// Sets the hardware value of a register cell.
    pub fn set_register(
        &self,
        device: u32,
        program: &str,
        table: &str,
        target: &Target,
        key: &Key,
        field: &str,
        value: u32,
    ) -> Result<(), Status> {
        self.with_pipeline_mut(device, program, |p| {
            p.table_by_name_mut(table)?
                .set_register(target, key, field, value)
        })
    }

    /// The entry a packet with header values `packet` hits in `table`.
    pub fn lookup(
        &self,
        device: u32,
        program: &str,
        table: &str,
        target: &Target,
        packet: &[(&str, Vec<u8>)],
    ) -> Result<Hit, Status> {
        self.with_pipeline(device, program, |p| {
            let t = p.table_by_name(table)?;
            let packet = packet
                .iter()
                .map(|(name, value)| {
                    t.info
                        .key_field(name)
                        .map(|f| (f.preamble.id, value.clone()))
                        .map_err(|e| Status::invalid_argument(e.to_string()))
                })
                .collect::<Result<Vec<_>, Status>>()?;
            t.lookup(target, &packet)
        })
    }

    /// The hash the unit formed by `configure` and `algorithm` computes over `inputs`.
    pub fn hash(
        &self,
        device: u32,
        program: &str,
        configure: &str,
        algorithm: &str,
        target: &Target,
        inputs: &[(&str, Vec<u8>)],
    ) -> Result<u64, Status> {
        self.with_pipeline(device, program, |p| {
            hash::compute(p, configure, algorithm, target, inputs)
        })
    }

    /// Number of entries installed across all tables of `program`.
    pub fn entry_count(&self, device: u32, program: &str) -> Result<usize, Status> {
        self.with_pipeline(device, program, |p| Ok(p.entry_count()))
    }

    /// Sends a digest list to the subscribers of `device` with learning enabled.  Returns the
    /// number of clients reached.
    pub fn emit_digest(
        &self,
        device: u32,
        target: &Target,
        learn_filter_id: u32,
        list_id: u32,
        data: Vec<pb::TableData>,
    ) -> usize {
        let message = update_message(stream_message_response::Update::Digest(pb::DigestList {
            target: Some(target.to_proto()),
            digest_id: learn_filter_id,
            list_id,
            data,
        }));
        self.lock()
            .notify(device, |n| n.enable_learn_notifications, message)
    }

    pub fn emit_idle_timeout(&self, device: u32, target: &Target, entry: pb::TableEntry) -> usize {
        let message = update_message(stream_message_response::Update::IdleTimeoutNotification(
            pb::IdleTimeoutNotification {
                target: Some(target.to_proto()),
                table_entry: Some(entry),
            },
        ));
        self.lock()
            .notify(device, |n| n.enable_idletimeout_notifications, message)
    }

    pub fn emit_port_status(&self, device: u32, port_key: pb::TableKey, up: bool) -> usize {
        let message = update_message(stream_message_response::Update::PortStatusChangeNotification(
            pb::PortStatusChgNotification {
                port_key: Some(port_key),
                port_up: up,
            },
        ));
        self.lock().notify(
            device,
            |n| n.enable_port_status_change_notifications,
            message,
        )
    }

    /// Fails the stream of `client_id` as a lost connection would.
    pub fn break_stream(&self, client_id: u32) -> bool {
        match self.lock().clients.remove(&client_id) {
            Some(client) => {
                warn!("breaking stream of client {}", client_id);
                let _ = client
                    .sender
                    .send(Err(Status::unavailable("connection reset")));
                true
            }
            None => false,
        }
    }

    /// `(learn filter id, list id)` of every digest list acknowledged so far.
    pub fn acked_digests(&self) -> Vec<(u32, u32)> {
        self.lock().acked.clone()
    }

    pub fn subscribed_clients(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.lock().clients.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn subscribe(&self, client_id: u32, s: pb::Subscribe, sender: &Outbound) {
        let mut state = self.lock();
        let status = if state.clients.contains_key(&client_id) {
            proto::status::Status {
                code: Code::AlreadyExists as i32,
                message: format!("client {} is already subscribed", client_id),
                details: Vec::new(),
            }
        } else {
            state.clients.insert(
                client_id,
                Client {
                    device_id: s.device_id,
                    sender: sender.clone(),
                    notifications: s.notifications.clone().unwrap_or_default(),
                },
            );
            info!("client {} subscribed to device {}", client_id, s.device_id);
            ok_status()
        };
        let reply = update_message(stream_message_response::Update::Subscribe(pb::Subscribe {
            status: Some(status),
            ..s
        }));
        let _ = sender.send(Ok(reply));
    }

    fn unsubscribe(&self, client_id: Option<u32>, sender: &Outbound) {
        let mut state = self.lock();
        if let Some(id) = client_id {
            if state
                .clients
                .get(&id)
                .map_or(false, |c| c.sender.same_channel(sender))
            {
                state.clients.remove(&id);
                debug!("client {} stream closed", id);
            }
        }
    }

    fn install(&self, configs: &[pb::ForwardingPipelineConfig]) -> Result<BTreeMap<String, Pipeline>, Status> {
        if configs.is_empty() {
            return Err(Status::invalid_argument("no program to install"));
        }
        configs
            .iter()
            .map(|c| Ok((c.p4_name.clone(), Pipeline::new(c.clone(), self.num_pipes)?)))
            .collect()
    }

    fn send_to(&self, client_id: u32, message: StreamMessageResponse) -> bool {
        match self.lock().clients.get(&client_id) {
            Some(c) => c.sender.send(Ok(message)).is_ok(),
            None => false,
        }
    }
}

fn pipeline_response(kind: SetForwardingPipelineConfigResponseType) -> SetForwardingPipelineConfigResponse {
    SetForwardingPipelineConfigResponse {
        set_forwarding_pipeline_config_response_type: kind as i32,
    }
}

#[async_trait]
impl Runtime for Model {
    async fn stream_channel(
        &self,
        mut requests: mpsc::Receiver<StreamMessageRequest>,
    ) -> Result<ResponseStream<StreamMessageResponse>, Status> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let model = self.clone();
        tokio::spawn(async move {
            let mut client_id = None;
            while let Some(request) = requests.recv().await {
                match request.update {
                    Some(stream_message_request::Update::Subscribe(s)) => {
                        model.subscribe(request.client_id, s, &sender);
                        client_id = Some(request.client_id);
                    }
                    Some(stream_message_request::Update::DigestAck(ack)) => {
                        model.lock().acked.push((ack.digest_id, ack.list_id));
                    }
                    None => debug!("empty stream request from client {}", request.client_id),
                }
            }
            model.unsubscribe(client_id, &sender);
        });
        Ok(UnboundedReceiverStream::new(receiver).boxed())
    }

    async fn write(&self, request: WriteRequest) -> Result<WriteResponse, Status> {
        self.pause().await;
        let target = request
            .target
            .as_ref()
            .map(Target::from)
            .ok_or_else(|| Status::invalid_argument("write without target"))?;
        let results: Vec<Result<(), Status>> = {
            let mut state = self.lock();
            let device = state
                .devices
                .get_mut(&target.device_id)
                .ok_or_else(|| Status::not_found(format!("device {} has no program", target.device_id)))?;
            let pipeline = device.program_for_write(&request.p4_name)?;
            request
                .updates
                .iter()
                .map(|u| {
                    let kind = update::Type::try_from(u.r#type)
                        .map_err(|_| Status::invalid_argument(format!("update type {}", u.r#type)))?;
                    let entity = u
                        .entity
                        .as_ref()
                        .ok_or_else(|| Status::invalid_argument("update without entity"))?;
                    pipeline.write(kind, entity, &target)
                })
                .collect()
        };
        if results.iter().all(Result::is_ok) {
            Ok(WriteResponse {})
        } else {
            debug!(
                "client {}: {} of {} updates failed",
                request.client_id,
                results.iter().filter(|r| r.is_err()).count(),
                results.len()
            );
            Err(write_failure(&results))
        }
    }

    async fn read(&self, request: ReadRequest) -> Result<ResponseStream<ReadResponse>, Status> {
        self.pause().await;
        let target = request
            .target
            .as_ref()
            .map(Target::from)
            .ok_or_else(|| Status::invalid_argument("read without target"))?;
        let responses: Vec<Result<ReadResponse, Status>> = {
            let state = self.lock();
            let pipeline = state.device(target.device_id)?.program(&request.p4_name)?;
            request
                .entities
                .iter()
                .map(|e| {
                    Ok(match pipeline.read(e, &target) {
                        Ok(entities) => ReadResponse {
                            entities,
                            status: Some(ok_status()),
                        },
                        Err(s) => ReadResponse {
                            entities: Vec::new(),
                            status: Some(proto::status::Status {
                                code: s.code() as i32,
                                message: s.message().to_string(),
                                details: Vec::new(),
                            }),
                        },
                    })
                })
                .collect()
        };
        Ok(stream::iter(responses).boxed())
    }

    async fn set_forwarding_pipeline_config(
        &self,
        request: SetForwardingPipelineConfigRequest,
    ) -> Result<SetForwardingPipelineConfigResponse, Status> {
        use SetForwardingPipelineConfigResponseType::{WarmInitFinished, WarmInitStarted};

        self.pause().await;
        let action = Action::try_from(request.action)
            .map_err(|_| Status::invalid_argument(format!("action {}", request.action)))?;
        let device_id = request.device_id;
        match action {
            Action::Bind => {
                let name = request
                    .config
                    .first()
                    .map(|c| c.p4_name.as_str())
                    .ok_or_else(|| Status::invalid_argument("bind without program"))?;
                let state = self.lock();
                let device = state.device(device_id)?;
                let staged = device
                    .staged
                    .as_ref()
                    .map_or(false, |s| s.contains_key(name));
                if !staged {
                    device.program(name)?;
                }
                debug!("client {} bound to {}", request.client_id, name);
                Ok(pipeline_response(WarmInitFinished))
            }
            Action::Verify => {
                self.install(&request.config)?;
                Ok(pipeline_response(WarmInitFinished))
            }
            Action::VerifyAndWarmInitBeginAndEnd => {
                let programs = self.install(&request.config)?;
                {
                    let mut state = self.lock();
                    let device = state.devices.entry(device_id).or_default();
                    device.active = programs;
                    device.staged = None;
                }
                info!("device {}: pipeline replaced", device_id);
                let finished = update_message(
                    stream_message_response::Update::SetForwardingPipelineConfigResponse(
                        pipeline_response(WarmInitFinished),
                    ),
                );
                if self.send_to(request.client_id, finished) {
                    Ok(pipeline_response(WarmInitStarted))
                } else {
                    Ok(pipeline_response(WarmInitFinished))
                }
            }
            Action::VerifyAndWarmInitBegin => {
                let programs = self.install(&request.config)?;
                self.lock().devices.entry(device_id).or_default().staged = Some(programs);
                info!("device {}: pipeline staged", device_id);
                Ok(pipeline_response(WarmInitStarted))
            }
            Action::WarmInitEnd => {
                let mut state = self.lock();
                let device = state
                    .devices
                    .get_mut(&device_id)
                    .ok_or_else(|| Status::failed_precondition("no warm init in progress"))?;
                let staged = device
                    .staged
                    .take()
                    .ok_or_else(|| Status::failed_precondition("no warm init in progress"))?;
                device.active = staged;
                info!("device {}: warm init ended", device_id);
                Ok(pipeline_response(WarmInitFinished))
            }
            Action::ReconcileAndWarmInitEnd => {
                Err(Status::unimplemented("reconcile is not supported"))
            }
        }
    }

    async fn get_forwarding_pipeline_config(
        &self,
        request: GetForwardingPipelineConfigRequest,
    ) -> Result<GetForwardingPipelineConfigResponse, Status> {
        self.pause().await;
        let state = self.lock();
        let config = state
            .device(request.device_id)?
            .active
            .values()
            .map(|p| p.config.clone())
            .collect();
        Ok(GetForwardingPipelineConfigResponse {
            config,
            non_p4_config: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    const PROGRAM: &str = r#"{
      "tables": [
        {"name": "pipe.SwitchIngress.forward", "id": 1, "table_type": "MatchAction_Direct",
         "key": [
           {"id": 1, "name": "hdr.ethernet.dst_addr", "match_type": "Exact",
            "type": {"type": "bytes", "width": 48}}
         ],
         "action_specs": [
           {"id": 10, "name": "SwitchIngress.hit",
            "data": [{"id": 1, "name": "port", "type": {"type": "bytes", "width": 9}}]}
         ]}
      ]
    }"#;

    fn config() -> pb::ForwardingPipelineConfig {
        pb::ForwardingPipelineConfig {
            p4_name: "tna_exact_match".into(),
            bfruntime_info: PROGRAM.as_bytes().to_vec(),
            profiles: Vec::new(),
        }
    }

    fn insert(mac: u8) -> pb::Update {
        pb::Update {
            r#type: update::Type::Insert as i32,
            entity: Some(pb::Entity {
                entity: Some(pb::entity::Entity::TableEntry(pb::TableEntry {
                    table_id: 1,
                    data: Some(pb::TableData {
                        action_id: 10,
                        fields: vec![pb::DataField {
                            field_id: 1,
                            value: Some(pb::data_field::Value::Stream(vec![0, 1])),
                        }],
                    }),
                    value: Some(pb::table_entry::Value::Key(pb::TableKey {
                        fields: vec![pb::KeyField {
                            field_id: 1,
                            match_type: Some(pb::key_field::MatchType::Exact(
                                pb::key_field::Exact {
                                    value: vec![0, 0, 0, 0, 0, mac],
                                },
                            )),
                        }],
                    })),
                    ..Default::default()
                })),
            }),
        }
    }

    async fn installed() -> Model {
        let model = Model::new();
        model
            .set_forwarding_pipeline_config(SetForwardingPipelineConfigRequest {
                device_id: 0,
                client_id: 1,
                action: Action::VerifyAndWarmInitBeginAndEnd as i32,
                config: vec![config()],
                ..Default::default()
            })
            .await
            .unwrap();
        model
    }

    fn write_request(updates: Vec<pb::Update>) -> WriteRequest {
        WriteRequest {
            target: Some(Target::new(0).to_proto()),
            client_id: 1,
            updates,
            atomicity: 0,
            p4_name: "tna_exact_match".into(),
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_updates_carry_per_update_status() {
        let model = installed().await;
        model.write(write_request(vec![insert(1)])).await.unwrap();

        let status = model
            .write(write_request(vec![insert(2), insert(1)]))
            .await
            .unwrap_err();
        let details = proto::status::Status::decode(status.details()).unwrap();
        let codes: Vec<i32> = details
            .details
            .iter()
            .map(|any| pb::Error::decode(any.value.as_slice()).unwrap().canonical_code)
            .collect();
        assert_eq!(codes, vec![Code::Ok as i32, Code::AlreadyExists as i32]);
        assert_eq!(model.entry_count(0, "tna_exact_match").unwrap(), 2);
    }

    #[tokio::test]
    #[traced_test]
    async fn unknown_program_is_not_found() {
        let model = installed().await;
        let mut request = write_request(vec![insert(1)]);
        request.p4_name = "tna_missing".into();
        assert_eq!(model.write(request).await.unwrap_err().code(), Code::NotFound);
    }

    #[tokio::test]
    #[traced_test]
    async fn subscribe_twice_is_rejected() {
        let model = Model::new();
        let mut replies = Vec::new();
        let mut senders = Vec::new();
        for _ in 0..2 {
            let (tx, rx) = mpsc::channel(4);
            let mut responses = model.stream_channel(rx).await.unwrap();
            tx.send(StreamMessageRequest {
                client_id: 7,
                update: Some(stream_message_request::Update::Subscribe(pb::Subscribe {
                    device_id: 0,
                    ..Default::default()
                })),
            })
            .await
            .unwrap();
            match responses.next().await {
                Some(Ok(StreamMessageResponse {
                    update: Some(stream_message_response::Update::Subscribe(s)),
                })) => replies.push(s.status.unwrap().code),
                other => panic!("unexpected {:?}", other),
            }
            senders.push(tx);
        }
        assert_eq!(replies, vec![Code::Ok as i32, Code::AlreadyExists as i32]);
        assert_eq!(model.subscribed_clients(), vec![7]);
    }
}
