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

//! The transport between a session and the Runtime.

use async_trait::async_trait;

use futures::stream::{BoxStream, StreamExt};

use proto::bfruntime::{
    GetForwardingPipelineConfigRequest,
    GetForwardingPipelineConfigResponse,
    ReadRequest,
    ReadResponse,
    SetForwardingPipelineConfigRequest,
    SetForwardingPipelineConfigResponse,
    StreamMessageRequest,
    StreamMessageResponse,
    WriteRequest,
    WriteResponse,
};
use proto::bfruntime_grpc::BfRuntimeClient;

use tokio::sync::mpsc;

use tokio_stream::wrappers::ReceiverStream;

use tonic::transport::Channel;
use tonic::Status;

use tracing::info;

use crate::error::{Error, Result};

/// Schema blobs routinely exceed tonic's default 4 MiB message limit.
const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

pub type ResponseStream<T> = BoxStream<'static, std::result::Result<T, Status>>;

/// The RPCs of the `bfrt_proto.BfRuntime` service.
///
/// [`GrpcRuntime`] implements this over a gRPC channel.  Anything else that speaks the same
/// messages, such as an in-process model of a switch, can stand in for it.
#[async_trait]
pub trait Runtime: Send + Sync + 'static {
    /// Opens the bidirectional stream.  Requests are taken from `requests` until it closes.
    async fn stream_channel(
        &self,
        requests: mpsc::Receiver<StreamMessageRequest>,
    ) -> std::result::Result<ResponseStream<StreamMessageResponse>, Status>;

    async fn write(&self, request: WriteRequest) -> std::result::Result<WriteResponse, Status>;

    async fn read(
        &self,
        request: ReadRequest,
    ) -> std::result::Result<ResponseStream<ReadResponse>, Status>;

    async fn set_forwarding_pipeline_config(
        &self,
        request: SetForwardingPipelineConfigRequest,
    ) -> std::result::Result<SetForwardingPipelineConfigResponse, Status>;

    async fn get_forwarding_pipeline_config(
        &self,
        request: GetForwardingPipelineConfigRequest,
    ) -> std::result::Result<GetForwardingPipelineConfigResponse, Status>;
}

/// A Runtime reached over gRPC.
#[derive(Clone, Debug)]
pub struct GrpcRuntime {
    client: BfRuntimeClient<Channel>,
}

impl GrpcRuntime {
    pub async fn connect(addr: &str) -> Result<Self> {
        info!("connecting to {}", addr);
        let client = BfRuntimeClient::connect(addr.to_string())
            .await
            .map_err(|e| Error::ConnectionLost(format!("{}: {}", addr, e)))?
            .max_decoding_message_size(MAX_MESSAGE_SIZE)
            .max_encoding_message_size(MAX_MESSAGE_SIZE);
        Ok(GrpcRuntime { client })
    }
}

#[async_trait]
impl Runtime for GrpcRuntime {
    async fn stream_channel(
        &self,
        requests: mpsc::Receiver<StreamMessageRequest>,
    ) -> std::result::Result<ResponseStream<StreamMessageResponse>, Status> {
        let response = self
            .client
            .clone()
            .stream_channel(ReceiverStream::new(requests))
            .await?;
        Ok(response.into_inner().boxed())
    }

    async fn write(&self, request: WriteRequest) -> std::result::Result<WriteResponse, Status> {
        Ok(self.client.clone().write(request).await?.into_inner())
    }

    async fn read(
        &self,
        request: ReadRequest,
    ) -> std::result::Result<ResponseStream<ReadResponse>, Status> {
        Ok(self.client.clone().read(request).await?.into_inner().boxed())
    }

    async fn set_forwarding_pipeline_config(
        &self,
        request: SetForwardingPipelineConfigRequest,
    ) -> std::result::Result<SetForwardingPipelineConfigResponse, Status> {
        Ok(self
            .client
            .clone()
            .set_forwarding_pipeline_config(request)
            .await?
            .into_inner())
    }

    async fn get_forwarding_pipeline_config(
        &self,
        request: GetForwardingPipelineConfigRequest,
    ) -> std::result::Result<GetForwardingPipelineConfigResponse, Status> {
        Ok(self
            .client
            .clone()
            .get_forwarding_pipeline_config(request)
            .await?
            .into_inner())
    }
}
