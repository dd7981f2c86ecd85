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

// Client stub for service bfrt_proto.BfRuntime.

use tonic::codegen::*;

use crate::bfruntime::*;

const SERVICE: &str = "bfrt_proto.BfRuntime";

#[derive(Debug, Clone)]
pub struct BfRuntimeClient<T> {
    inner: tonic::client::Grpc<T>,
}

impl BfRuntimeClient<tonic::transport::Channel> {
    /// Attempt to create a new client by connecting to a given endpoint.
    pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
    where
        D: TryInto<tonic::transport::Endpoint>,
        D::Error: Into<StdError>,
    {
        let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
        Ok(Self::new(conn))
    }
}

impl<T> BfRuntimeClient<T>
where
    T: tonic::client::GrpcService<tonic::body::BoxBody>,
    T::Error: Into<StdError>,
    T::ResponseBody: Body<Data = Bytes> + std::marker::Send + 'static,
    <T::ResponseBody as Body>::Error: Into<StdError> + std::marker::Send,
{
    pub fn new(inner: T) -> Self {
        let inner = tonic::client::Grpc::new(inner);
        Self { inner }
    }

    /// Limits the maximum size of a decoded message.  `bfrt.json` blobs returned by
    /// GetForwardingPipelineConfig routinely exceed the 4 MiB default.
    #[must_use]
    pub fn max_decoding_message_size(mut self, limit: usize) -> Self {
        self.inner = self.inner.max_decoding_message_size(limit);
        self
    }

    #[must_use]
    pub fn max_encoding_message_size(mut self, limit: usize) -> Self {
        self.inner = self.inner.max_encoding_message_size(limit);
        self
    }

    async fn ready(&mut self) -> Result<(), tonic::Status> {
        self.inner.ready().await.map_err(|e| {
            tonic::Status::new(
                tonic::Code::Unknown,
                format!("Service was not ready: {}", e.into()),
            )
        })
    }

    pub async fn write(
        &mut self,
        request: impl tonic::IntoRequest<WriteRequest>,
    ) -> std::result::Result<tonic::Response<WriteResponse>, tonic::Status> {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        let path = http::uri::PathAndQuery::from_static("/bfrt_proto.BfRuntime/Write");
        let mut req = request.into_request();
        req.extensions_mut().insert(GrpcMethod::new(SERVICE, "Write"));
        self.inner.unary(req, path, codec).await
    }

    pub async fn read(
        &mut self,
        request: impl tonic::IntoRequest<ReadRequest>,
    ) -> std::result::Result<tonic::Response<tonic::codec::Streaming<ReadResponse>>, tonic::Status>
    {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        let path = http::uri::PathAndQuery::from_static("/bfrt_proto.BfRuntime/Read");
        let mut req = request.into_request();
        req.extensions_mut().insert(GrpcMethod::new(SERVICE, "Read"));
        self.inner.server_streaming(req, path, codec).await
    }

    pub async fn set_forwarding_pipeline_config(
        &mut self,
        request: impl tonic::IntoRequest<SetForwardingPipelineConfigRequest>,
    ) -> std::result::Result<tonic::Response<SetForwardingPipelineConfigResponse>, tonic::Status>
    {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        let path = http::uri::PathAndQuery::from_static(
            "/bfrt_proto.BfRuntime/SetForwardingPipelineConfig",
        );
        let mut req = request.into_request();
        req.extensions_mut()
            .insert(GrpcMethod::new(SERVICE, "SetForwardingPipelineConfig"));
        self.inner.unary(req, path, codec).await
    }

    pub async fn get_forwarding_pipeline_config(
        &mut self,
        request: impl tonic::IntoRequest<GetForwardingPipelineConfigRequest>,
    ) -> std::result::Result<tonic::Response<GetForwardingPipelineConfigResponse>, tonic::Status>
    {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        let path = http::uri::PathAndQuery::from_static(
            "/bfrt_proto.BfRuntime/GetForwardingPipelineConfig",
        );
        let mut req = request.into_request();
        req.extensions_mut()
            .insert(GrpcMethod::new(SERVICE, "GetForwardingPipelineConfig"));
        self.inner.unary(req, path, codec).await
    }

    pub async fn stream_channel(
        &mut self,
        request: impl tonic::IntoStreamingRequest<Message = StreamMessageRequest>,
    ) -> std::result::Result<
        tonic::Response<tonic::codec::Streaming<StreamMessageResponse>>,
        tonic::Status,
    > {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        let path = http::uri::PathAndQuery::from_static("/bfrt_proto.BfRuntime/StreamChannel");
        let mut req = request.into_streaming_request();
        req.extensions_mut()
            .insert(GrpcMethod::new(SERVICE, "StreamChannel"));
        self.inner.streaming(req, path, codec).await
    }
}
