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

use prost::Message;

use std::fmt::{self, Display};

use thiserror::Error;

use tonic::Code;

/// Status of one sub-operation of a batch that the Runtime did not accept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubError {
    /// Position of the sub-operation within its batch.
    pub index: usize,
    pub code: Code,
    pub message: String,
}

impl Display for SubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}: {:?}", self.index, self.code)?;
        if !self.message.is_empty() {
            write!(f, " ({})", self.message)?;
        }
        Ok(())
    }
}

struct SubErrors<'a>(&'a [SubError]);

impl Display for SubErrors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", e)?;
        }
        write!(f, "]")
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown {kind} {name}")]
    UnknownName { kind: &'static str, name: String },

    #[error("{kind} name {name} is ambiguous (matches {})", .candidates.join(", "))]
    AmbiguousName {
        kind: &'static str,
        name: String,
        candidates: Vec<String>,
    },

    #[error("schema error: {0}")]
    Schema(String),

    #[error("field {field}: value out of range ({reason})")]
    ValueOutOfRange { field: String, reason: String },

    #[error("field {field}: invalid range ({reason})")]
    InvalidRange { field: String, reason: String },

    #[error("table {table}: {reason}")]
    ScopeMismatch { table: String, reason: String },

    #[error("table {table}: entry scope cannot change while entries are installed")]
    ScopeChangeWithEntries { table: String },

    #[error("table {table}: operation not allowed while entries are installed")]
    EntriesPresent { table: String },

    #[error("duplicate key {}", SubErrors(.sub_errors))]
    DuplicateKey { sub_errors: Vec<SubError> },

    #[error("key not found {}", SubErrors(.sub_errors))]
    KeyNotFound { sub_errors: Vec<SubError> },

    #[error("connection to runtime lost: {0}")]
    ConnectionLost(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("runtime rejected request with {code:?}: {message} {}", SubErrors(.sub_errors))]
    RuntimeRejected {
        code: Code,
        message: String,
        sub_errors: Vec<SubError>,
    },

    #[error("invalid session state: {0}")]
    InvalidState(String),

    #[error("configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed schema: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Per-sub-operation statuses carried by a batch failure.  Empty for other kinds.
    pub fn sub_errors(&self) -> &[SubError] {
        match self {
            Error::DuplicateKey { sub_errors }
            | Error::KeyNotFound { sub_errors }
            | Error::RuntimeRejected { sub_errors, .. } => sub_errors,
            _ => &[],
        }
    }

    /// True for the kinds grouped as schema errors: unknown or ambiguous names and schema
    /// mismatches.
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownName { .. } | Error::AmbiguousName { .. } | Error::Schema(_)
        )
    }

    pub(crate) fn unknown(kind: &'static str, name: &str) -> Self {
        Error::UnknownName {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn out_of_range<S: Into<String>>(field: &str, reason: S) -> Self {
        Error::ValueOutOfRange {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Classifies a failed RPC.  Transport failures become `ConnectionLost`, an expired deadline
    /// becomes `DeadlineExceeded`, and anything else is decoded into per-sub-operation statuses.
    pub fn from_status(status: tonic::Status) -> Self {
        match status.code() {
            Code::DeadlineExceeded => Error::DeadlineExceeded,
            Code::Unavailable | Code::Cancelled => {
                Error::ConnectionLost(status.message().to_string())
            }
            code => {
                let sub_errors = decode_sub_errors(status.details());
                classify(code, status.message().to_string(), sub_errors)
            }
        }
    }
}

/// Unpacks the `google.rpc.Status` carried in a failed write's details.  Each detail holds one
/// `bfrt_proto.Error`, in update order; OK entries are dropped.
pub(crate) fn decode_sub_errors(details: &[u8]) -> Vec<SubError> {
    if details.is_empty() {
        return Vec::new();
    }
    let status = match proto::status::Status::decode(details) {
        Ok(status) => status,
        Err(_) => return Vec::new(),
    };
    status
        .details
        .iter()
        .enumerate()
        .filter_map(|(index, any)| {
            let error = proto::bfruntime::Error::decode(any.value.as_slice()).ok()?;
            if error.canonical_code == Code::Ok as i32 {
                return None;
            }
            Some(SubError {
                index,
                code: Code::from_i32(error.canonical_code),
                message: error.message,
            })
        })
        .collect()
}

/// A batch whose failures are all `ALREADY_EXISTS` is a duplicate key, all `NOT_FOUND` is a
/// missing key, and anything else is a rejection.  A rejection whose sub-operations all failed
/// with one code carries that code.  Without per-update statuses the failure concerns the request
/// as a whole and is always a rejection.
pub(crate) fn classify(code: Code, message: String, sub_errors: Vec<SubError>) -> Error {
    let all = |c: Code| !sub_errors.is_empty() && sub_errors.iter().all(|e| e.code == c);
    if all(Code::AlreadyExists) {
        Error::DuplicateKey { sub_errors }
    } else if all(Code::NotFound) {
        Error::KeyNotFound { sub_errors }
    } else {
        let code = match sub_errors.split_first() {
            Some((first, rest)) if rest.iter().all(|e| e.code == first.code) => first.code,
            _ => code,
        };
        Error::RuntimeRejected {
            code,
            message,
            sub_errors,
        }
    }
}
