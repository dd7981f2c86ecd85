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

//! Client library for testing a switch through the BF Runtime gRPC API.
//!
//! A test opens a [`Session`], installs a program, binds to it, and then works on its tables by
//! name:
//!
//! ```no_run
//! # async fn example() -> bfrt::Result<()> {
//! use std::sync::Arc;
//! use bfrt::{KeyTuple, Registry, Session, SessionConfig};
//!
//! let session = Session::connect(SessionConfig::new(1), Arc::new(Registry::new())).await?;
//! session.bind("tna_exact_match").await?;
//! let forward = session.table("SwitchIngress.forward")?;
//! let key = forward.make_key(&[KeyTuple::exact("hdr.ethernet.dst_addr", 0x222222222222u64)])?;
//! let data = forward.make_data(&[("port", 5u16.into())], Some("SwitchIngress.hit"))?;
//! forward.entry_add(&session.target(), &[key], &[data]).await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod hashing;
pub mod learn;
pub mod runtime;
pub mod schema;
pub mod session;
pub mod table;
pub mod target;

pub use codec::{Annotation, Value};
pub use config::{Notifications, SessionConfig};
pub use error::{Error, Result, SubError};
pub use hashing::{Algorithm, DynHash};
pub use learn::Learn;
pub use runtime::{GrpcRuntime, Runtime};
pub use schema::{Program, Registry};
pub use session::{
    all_tables,
    Digest,
    IdleTimeout,
    PipelineConfig,
    PortStatus,
    ProfileConfig,
    Session,
    SessionState,
    Wait,
};
pub use table::{
    Attribute,
    EntryData,
    EntryStream,
    Key,
    KeyMask,
    KeyTuple,
    ReadFlags,
    Table,
    WriteBatch,
};
pub use target::{Direction, EntryScope, ScopeMode, Target};
