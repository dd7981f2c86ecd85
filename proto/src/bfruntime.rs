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

// Package bfrt_proto.  Only the subset of messages the harness sends or receives is declared;
// field numbers follow bfruntime.proto so the encoding stays wire compatible.

#![allow(clippy::derive_partial_eq_without_eq)]

use crate::status::Status;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WriteRequest {
    #[prost(message, optional, tag = "1")]
    pub target: ::core::option::Option<TargetDevice>,
    #[prost(uint32, tag = "2")]
    pub client_id: u32,
    #[prost(message, repeated, tag = "3")]
    pub updates: ::prost::alloc::vec::Vec<Update>,
    #[prost(enumeration = "write_request::Atomicity", tag = "4")]
    pub atomicity: i32,
    #[prost(string, tag = "5")]
    pub p4_name: ::prost::alloc::string::String,
}

pub mod write_request {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Atomicity {
        ContinueOnError = 0,
        RollbackOnError = 1,
        DataplaneAtomic = 2,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WriteResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadRequest {
    #[prost(message, optional, tag = "1")]
    pub target: ::core::option::Option<TargetDevice>,
    #[prost(uint32, tag = "2")]
    pub client_id: u32,
    #[prost(message, repeated, tag = "3")]
    pub entities: ::prost::alloc::vec::Vec<Entity>,
    #[prost(string, tag = "4")]
    pub p4_name: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadResponse {
    #[prost(message, repeated, tag = "1")]
    pub entities: ::prost::alloc::vec::Vec<Entity>,
    #[prost(message, optional, tag = "2")]
    pub status: ::core::option::Option<Status>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TargetDevice {
    #[prost(uint32, tag = "1")]
    pub device_id: u32,
    #[prost(uint32, tag = "2")]
    pub pipe_id: u32,
    #[prost(uint32, tag = "3")]
    pub direction: u32,
    #[prost(uint32, tag = "4")]
    pub prsr_id: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Update {
    #[prost(enumeration = "update::Type", tag = "1")]
    pub r#type: i32,
    #[prost(message, optional, tag = "2")]
    pub entity: ::core::option::Option<Entity>,
}

pub mod update {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        Unspecified = 0,
        Insert = 1,
        Modify = 2,
        ModifyInc = 3,
        Delete = 4,
        InsertOrModify = 5,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Entity {
    #[prost(oneof = "entity::Entity", tags = "1, 2, 3, 4")]
    pub entity: ::core::option::Option<entity::Entity>,
}

pub mod entity {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Entity {
        #[prost(message, tag = "1")]
        TableEntry(super::TableEntry),
        #[prost(message, tag = "2")]
        TableUsage(super::TableUsage),
        #[prost(message, tag = "3")]
        TableAttribute(super::TableAttribute),
        #[prost(message, tag = "4")]
        TableOperation(super::TableOperation),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TableEntry {
    #[prost(uint32, tag = "1")]
    pub table_id: u32,
    #[prost(message, optional, tag = "3")]
    pub data: ::core::option::Option<TableData>,
    #[prost(bool, tag = "4")]
    pub is_default_entry: bool,
    #[prost(message, optional, tag = "6")]
    pub entry_tgt: ::core::option::Option<TargetDevice>,
    #[prost(message, optional, tag = "8")]
    pub table_flags: ::core::option::Option<TableFlags>,
    #[prost(oneof = "table_entry::Value", tags = "2, 7")]
    pub value: ::core::option::Option<table_entry::Value>,
}

pub mod table_entry {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Value {
        #[prost(message, tag = "2")]
        Key(super::TableKey),
        #[prost(uint32, tag = "7")]
        HandleId(u32),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TableFlags {
    #[prost(bool, tag = "1")]
    pub from_hw: bool,
    #[prost(bool, tag = "2")]
    pub key_only: bool,
    #[prost(bool, tag = "3")]
    pub mod_del: bool,
    #[prost(bool, tag = "4")]
    pub reset_ttl: bool,
    #[prost(bool, tag = "5")]
    pub reset_stats: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TableUsage {
    #[prost(uint32, tag = "1")]
    pub table_id: u32,
    #[prost(uint32, tag = "2")]
    pub usage: u32,
    #[prost(message, optional, tag = "3")]
    pub table_flags: ::core::option::Option<TableFlags>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TableAttribute {
    #[prost(uint32, tag = "1")]
    pub table_id: u32,
    #[prost(oneof = "table_attribute::Attribute", tags = "2, 3, 4, 5, 6")]
    pub attribute: ::core::option::Option<table_attribute::Attribute>,
}

pub mod table_attribute {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Attribute {
        #[prost(message, tag = "2")]
        IdleTable(super::IdleTable),
        #[prost(message, tag = "3")]
        EntryScope(super::EntryScope),
        #[prost(message, tag = "4")]
        DynKeyMask(super::DynKeyMask),
        #[prost(message, tag = "5")]
        DynHashing(super::DynHashing),
        #[prost(message, tag = "6")]
        ByteCountAdj(super::ByteCountAdj),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IdleTable {
    #[prost(uint32, tag = "1")]
    pub ttl_query_interval: u32,
    #[prost(uint32, tag = "2")]
    pub max_ttl: u32,
    #[prost(uint32, tag = "3")]
    pub min_ttl: u32,
    #[prost(enumeration = "idle_table::IdleTableMode", tag = "4")]
    pub idle_table_mode: i32,
    #[prost(bool, tag = "5")]
    pub enable: bool,
}

pub mod idle_table {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum IdleTableMode {
        IdlePollMode = 0,
        IdleNotifyMode = 1,
        InvalidMode = 2,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EntryScope {
    #[prost(message, optional, tag = "1")]
    pub gress_scope: ::core::option::Option<Mode>,
    #[prost(message, optional, tag = "2")]
    pub pipe_scope: ::core::option::Option<Mode>,
    #[prost(message, optional, tag = "3")]
    pub prsr_scope: ::core::option::Option<Mode>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Mode {
    #[prost(oneof = "mode::Scope", tags = "1, 2")]
    pub scope: ::core::option::Option<mode::Scope>,
}

pub mod mode {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum PredefinedMode {
        All = 0,
        Single = 1,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Scope {
        #[prost(enumeration = "PredefinedMode", tag = "1")]
        Predef(i32),
        #[prost(uint32, tag = "2")]
        UserDefined(u32),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DynKeyMask {
    #[prost(message, repeated, tag = "1")]
    pub fields: ::prost::alloc::vec::Vec<KeyField>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DynHashing {
    #[prost(uint32, tag = "1")]
    pub alg: u32,
    #[prost(uint64, tag = "2")]
    pub seed: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ByteCountAdj {
    #[prost(int32, tag = "1")]
    pub byte_count_adjust: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TableOperation {
    #[prost(uint32, tag = "1")]
    pub table_id: u32,
    #[prost(string, tag = "2")]
    pub table_operations_type: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TableKey {
    #[prost(message, repeated, tag = "1")]
    pub fields: ::prost::alloc::vec::Vec<KeyField>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeyField {
    #[prost(uint32, tag = "1")]
    pub field_id: u32,
    #[prost(oneof = "key_field::MatchType", tags = "2, 3, 4, 5, 6")]
    pub match_type: ::core::option::Option<key_field::MatchType>,
}

pub mod key_field {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Exact {
        #[prost(bytes = "vec", tag = "1")]
        pub value: ::prost::alloc::vec::Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Ternary {
        #[prost(bytes = "vec", tag = "1")]
        pub value: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", tag = "2")]
        pub mask: ::prost::alloc::vec::Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Lpm {
        #[prost(bytes = "vec", tag = "1")]
        pub value: ::prost::alloc::vec::Vec<u8>,
        #[prost(int32, tag = "2")]
        pub prefix_len: i32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Range {
        #[prost(bytes = "vec", tag = "1")]
        pub low: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", tag = "2")]
        pub high: ::prost::alloc::vec::Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Optional {
        #[prost(bytes = "vec", tag = "1")]
        pub value: ::prost::alloc::vec::Vec<u8>,
        #[prost(bool, tag = "2")]
        pub is_valid: bool,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum MatchType {
        #[prost(message, tag = "2")]
        Exact(Exact),
        #[prost(message, tag = "3")]
        Ternary(Ternary),
        #[prost(message, tag = "4")]
        Lpm(Lpm),
        #[prost(message, tag = "5")]
        Range(Range),
        #[prost(message, tag = "6")]
        Optional(Optional),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TableData {
    #[prost(uint32, tag = "1")]
    pub action_id: u32,
    #[prost(message, repeated, tag = "2")]
    pub fields: ::prost::alloc::vec::Vec<DataField>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataField {
    #[prost(uint32, tag = "1")]
    pub field_id: u32,
    #[prost(oneof = "data_field::Value", tags = "2, 3, 4, 5, 6, 8, 9")]
    pub value: ::core::option::Option<data_field::Value>,
}

pub mod data_field {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct IntArray {
        #[prost(uint32, repeated, tag = "1")]
        pub val: ::prost::alloc::vec::Vec<u32>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct BoolArray {
        #[prost(bool, repeated, tag = "1")]
        pub val: ::prost::alloc::vec::Vec<bool>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct StrArray {
        #[prost(string, repeated, tag = "1")]
        pub val: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Value {
        #[prost(bytes, tag = "2")]
        Stream(::prost::alloc::vec::Vec<u8>),
        #[prost(float, tag = "3")]
        FloatVal(f32),
        #[prost(string, tag = "4")]
        StrVal(::prost::alloc::string::String),
        #[prost(message, tag = "5")]
        IntArrVal(IntArray),
        #[prost(message, tag = "6")]
        BoolArrVal(BoolArray),
        #[prost(bool, tag = "8")]
        BoolVal(bool),
        #[prost(message, tag = "9")]
        StrArrVal(StrArray),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StreamMessageRequest {
    #[prost(uint32, tag = "1")]
    pub client_id: u32,
    #[prost(oneof = "stream_message_request::Update", tags = "2, 3")]
    pub update: ::core::option::Option<stream_message_request::Update>,
}

pub mod stream_message_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Update {
        #[prost(message, tag = "2")]
        Subscribe(super::Subscribe),
        #[prost(message, tag = "3")]
        DigestAck(super::DigestListAck),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Subscribe {
    #[prost(bool, tag = "1")]
    pub is_master: bool,
    #[prost(uint32, tag = "2")]
    pub device_id: u32,
    #[prost(message, optional, tag = "3")]
    pub notifications: ::core::option::Option<subscribe::Notifications>,
    #[prost(message, optional, tag = "4")]
    pub status: ::core::option::Option<Status>,
}

pub mod subscribe {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Notifications {
        #[prost(bool, tag = "1")]
        pub enable_learn_notifications: bool,
        #[prost(bool, tag = "2")]
        pub enable_idletimeout_notifications: bool,
        #[prost(bool, tag = "3")]
        pub enable_port_status_change_notifications: bool,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DigestListAck {
    #[prost(uint32, tag = "1")]
    pub digest_id: u32,
    #[prost(uint32, tag = "2")]
    pub list_id: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StreamMessageResponse {
    #[prost(oneof = "stream_message_response::Update", tags = "1, 2, 3, 4, 5")]
    pub update: ::core::option::Option<stream_message_response::Update>,
}

pub mod stream_message_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Update {
        #[prost(message, tag = "1")]
        Subscribe(super::Subscribe),
        #[prost(message, tag = "2")]
        Digest(super::DigestList),
        #[prost(message, tag = "3")]
        IdleTimeoutNotification(super::IdleTimeoutNotification),
        #[prost(message, tag = "4")]
        PortStatusChangeNotification(super::PortStatusChgNotification),
        #[prost(message, tag = "5")]
        SetForwardingPipelineConfigResponse(super::SetForwardingPipelineConfigResponse),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DigestList {
    #[prost(message, optional, tag = "1")]
    pub target: ::core::option::Option<TargetDevice>,
    #[prost(uint32, tag = "2")]
    pub digest_id: u32,
    #[prost(uint32, tag = "3")]
    pub list_id: u32,
    #[prost(message, repeated, tag = "4")]
    pub data: ::prost::alloc::vec::Vec<TableData>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IdleTimeoutNotification {
    #[prost(message, optional, tag = "1")]
    pub target: ::core::option::Option<TargetDevice>,
    #[prost(message, optional, tag = "2")]
    pub table_entry: ::core::option::Option<TableEntry>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PortStatusChgNotification {
    #[prost(message, optional, tag = "1")]
    pub port_key: ::core::option::Option<TableKey>,
    #[prost(bool, tag = "2")]
    pub port_up: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetForwardingPipelineConfigRequest {
    #[prost(uint32, tag = "1")]
    pub device_id: u32,
    #[prost(uint32, tag = "2")]
    pub client_id: u32,
    #[prost(enumeration = "set_forwarding_pipeline_config_request::Action", tag = "3")]
    pub action: i32,
    #[prost(enumeration = "set_forwarding_pipeline_config_request::DevInitMode", tag = "4")]
    pub dev_init_mode: i32,
    #[prost(string, tag = "5")]
    pub base_path: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "6")]
    pub config: ::prost::alloc::vec::Vec<ForwardingPipelineConfig>,
}

pub mod set_forwarding_pipeline_config_request {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Action {
        Bind = 0,
        Verify = 1,
        VerifyAndWarmInitBegin = 2,
        VerifyAndWarmInitBeginAndEnd = 3,
        WarmInitEnd = 4,
        ReconcileAndWarmInitEnd = 5,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum DevInitMode {
        FastReconfig = 0,
        Hitless = 1,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetForwardingPipelineConfigResponse {
    #[prost(enumeration = "SetForwardingPipelineConfigResponseType", tag = "1")]
    pub set_forwarding_pipeline_config_response_type: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum SetForwardingPipelineConfigResponseType {
    WarmInitStarted = 0,
    WarmInitFinished = 1,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ForwardingPipelineConfig {
    #[prost(string, tag = "1")]
    pub p4_name: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "2")]
    pub bfruntime_info: ::prost::alloc::vec::Vec<u8>,
    #[prost(message, repeated, tag = "3")]
    pub profiles: ::prost::alloc::vec::Vec<forwarding_pipeline_config::Profile>,
}

pub mod forwarding_pipeline_config {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Profile {
        #[prost(string, tag = "1")]
        pub profile_name: ::prost::alloc::string::String,
        #[prost(bytes = "vec", tag = "2")]
        pub context: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", tag = "3")]
        pub binary: ::prost::alloc::vec::Vec<u8>,
        #[prost(uint32, repeated, tag = "4")]
        pub pipe_scope: ::prost::alloc::vec::Vec<u32>,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetForwardingPipelineConfigRequest {
    #[prost(uint32, tag = "1")]
    pub device_id: u32,
    #[prost(uint32, tag = "2")]
    pub client_id: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetForwardingPipelineConfigResponse {
    #[prost(message, repeated, tag = "1")]
    pub config: ::prost::alloc::vec::Vec<ForwardingPipelineConfig>,
    #[prost(message, optional, tag = "2")]
    pub non_p4_config: ::core::option::Option<NonP4Config>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NonP4Config {
    #[prost(bytes = "vec", tag = "1")]
    pub bfruntime_info: ::prost::alloc::vec::Vec<u8>,
}

/// Per-update error, packed into `google.rpc.Status.details` of a failed Write.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Error {
    #[prost(int32, tag = "1")]
    pub canonical_code: i32,
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub space: ::prost::alloc::string::String,
    #[prost(int32, tag = "4")]
    pub code: i32,
    #[prost(message, optional, tag = "5")]
    pub details: ::core::option::Option<::prost_types::Any>,
}

/// Type URL used when packing [`Error`] into an `Any`.
pub const ERROR_TYPE_URL: &str = "type.googleapis.com/bfrt_proto.Error";
