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

//! Operations on the tables of a bound program.
//!
//! Keys and data are built locally from named fields and validated against the table's schema
//! before anything is sent.  Everything else goes through the session that produced the table.

use itertools::Itertools;

use proto::bfruntime::{
    self as pb,
    entity,
    idle_table::IdleTableMode,
    key_field,
    table_attribute,
    table_entry,
    update,
};

use std::collections::{HashSet, VecDeque};
use std::fmt::{self, Display};
use std::sync::Arc;

use tonic::Code;

use tracing::debug;

use crate::codec::{self, Format, Value};
use crate::error::{classify, Error, Result, SubError};
use crate::schema::{KeyField, MatchType, Program, TableInfo, MATCH_PRIORITY_ID};
use crate::session::{ReadStream, Session};
use crate::target::{EntryScope, Target};

/// The match-kind part of a key field as given by a caller.
#[derive(Clone, Debug, PartialEq)]
pub enum MatchAux {
    /// A bare value.  On a ternary field the mask is all ones, on an LPM field the prefix is
    /// the full width, on a range field the range is the single value, and on an optional field
    /// the value is active.
    Exact,
    Ternary { mask: Value },
    Lpm { prefix_len: u32 },
    Range { high: Value },
    Optional { is_valid: bool },
}

/// One named field of a key.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyTuple {
    pub name: String,
    pub value: Value,
    pub aux: MatchAux,
}

impl KeyTuple {
    pub fn exact<V: Into<Value>>(name: &str, value: V) -> Self {
        KeyTuple {
            name: name.into(),
            value: value.into(),
            aux: MatchAux::Exact,
        }
    }

    pub fn ternary<V: Into<Value>, M: Into<Value>>(name: &str, value: V, mask: M) -> Self {
        KeyTuple {
            name: name.into(),
            value: value.into(),
            aux: MatchAux::Ternary { mask: mask.into() },
        }
    }

    pub fn lpm<V: Into<Value>>(name: &str, value: V, prefix_len: u32) -> Self {
        KeyTuple {
            name: name.into(),
            value: value.into(),
            aux: MatchAux::Lpm { prefix_len },
        }
    }

    pub fn range<V: Into<Value>, W: Into<Value>>(name: &str, low: V, high: W) -> Self {
        KeyTuple {
            name: name.into(),
            value: low.into(),
            aux: MatchAux::Range { high: high.into() },
        }
    }

    pub fn optional<V: Into<Value>>(name: &str, value: V, is_valid: bool) -> Self {
        KeyTuple {
            name: name.into(),
            value: value.into(),
            aux: MatchAux::Optional { is_valid },
        }
    }
}

/// Canonical encoded match of one key field.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Match {
    Exact(Vec<u8>),
    Ternary { value: Vec<u8>, mask: Vec<u8> },
    Lpm { value: Vec<u8>, prefix_len: u32 },
    Range { low: Vec<u8>, high: Vec<u8> },
    Optional { value: Vec<u8>, is_valid: bool },
}

impl Match {
    fn to_proto(&self) -> key_field::MatchType {
        use key_field::MatchType as Wire;
        match self {
            Match::Exact(value) => Wire::Exact(key_field::Exact {
                value: value.clone(),
            }),
            Match::Ternary { value, mask } => Wire::Ternary(key_field::Ternary {
                value: value.clone(),
                mask: mask.clone(),
            }),
            Match::Lpm { value, prefix_len } => Wire::Lpm(key_field::Lpm {
                value: value.clone(),
                prefix_len: *prefix_len as i32,
            }),
            Match::Range { low, high } => Wire::Range(key_field::Range {
                low: low.clone(),
                high: high.clone(),
            }),
            Match::Optional { value, is_valid } => Wire::Optional(key_field::Optional {
                value: value.clone(),
                is_valid: *is_valid,
            }),
        }
    }

    fn from_proto(m: &key_field::MatchType) -> Self {
        use key_field::MatchType as Wire;
        match m {
            Wire::Exact(e) => Match::Exact(e.value.clone()),
            Wire::Ternary(t) => Match::Ternary {
                value: t.value.clone(),
                mask: t.mask.clone(),
            },
            Wire::Lpm(l) => Match::Lpm {
                value: l.value.clone(),
                prefix_len: l.prefix_len.max(0) as u32,
            },
            Wire::Range(r) => Match::Range {
                low: r.low.clone(),
                high: r.high.clone(),
            },
            Wire::Optional(o) => Match::Optional {
                value: o.value.clone(),
                is_valid: o.is_valid,
            },
        }
    }

    /// Applies the masking rules of the field's match kind.
    fn canonical(self, bit_width: u32) -> Self {
        match self {
            Match::Ternary { value, mask } => Match::Ternary {
                value: codec::and(&value, &mask),
                mask,
            },
            Match::Lpm { value, prefix_len } => Match::Lpm {
                value: codec::apply_mask(&value, bit_width, prefix_len),
                prefix_len,
            },
            Match::Optional { value, is_valid: false } => Match::Optional {
                value: vec![0; value.len()],
                is_valid: false,
            },
            m => m,
        }
    }
}

/// An encoded key.  Two keys are equal iff they are byte-identical after masking.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    table_id: u32,
    fields: Vec<(u32, Match)>,
}

impl Key {
    pub fn table_id(&self) -> u32 {
        self.table_id
    }

    /// Fields sorted by id.
    pub fn fields(&self) -> &[(u32, Match)] {
        &self.fields
    }

    pub fn get(&self, field_id: u32) -> Option<&Match> {
        self.fields
            .iter()
            .find(|(id, _)| *id == field_id)
            .map(|(_, m)| m)
    }

    pub fn to_proto(&self) -> pb::TableKey {
        pb::TableKey {
            fields: self
                .fields
                .iter()
                .map(|(id, m)| pb::KeyField {
                    field_id: *id,
                    match_type: Some(m.to_proto()),
                })
                .collect(),
        }
    }

    pub fn from_proto(table_id: u32, key: &pb::TableKey) -> Self {
        let fields = key
            .fields
            .iter()
            .filter_map(|f| f.match_type.as_ref().map(|m| (f.field_id, Match::from_proto(m))))
            .sorted_by_key(|(id, _)| *id)
            .collect();
        Key { table_id, fields }
    }

    /// Reapplies the masking rules using the field widths of `table`.
    pub fn canonical(self, table: &TableInfo) -> Self {
        let fields = self
            .fields
            .into_iter()
            .map(|(id, m)| match table.key_field_by_id(id) {
                Some(f) => (id, m.canonical(f.bit_width)),
                None => (id, m),
            })
            .collect();
        Key {
            table_id: self.table_id,
            fields,
        }
    }
}

fn match_kind_error(field: &KeyField, aux: &MatchAux) -> Error {
    Error::Schema(format!(
        "{} is a {}-match field, not {:?}",
        field.preamble.name, field.match_type, aux
    ))
}

/// Encodes one key field, or its don't-care form when `tuple` is absent.
pub(crate) fn encode_key_field(
    field: &KeyField,
    fmt: &Format,
    tuple: Option<&KeyTuple>,
) -> Result<Match> {
    let name = field.preamble.name.as_str();
    let bits = field.bit_width;
    let zeros = vec![0u8; fmt.n_bytes()];
    let tuple = match tuple {
        Some(t) => t,
        None => {
            return match field.match_type {
                MatchType::Exact if field.preamble.id == MATCH_PRIORITY_ID => {
                    Ok(Match::Exact(zeros))
                }
                MatchType::Exact => Err(Error::Schema(format!(
                    "key field {} is exact-match and must be given",
                    name
                ))),
                MatchType::Ternary => Ok(Match::Ternary {
                    value: zeros.clone(),
                    mask: zeros,
                }),
                MatchType::Lpm => Ok(Match::Lpm {
                    value: zeros,
                    prefix_len: 0,
                }),
                MatchType::Range => Ok(Match::Range {
                    low: zeros,
                    high: codec::all_ones(bits),
                }),
                MatchType::Optional => Ok(Match::Optional {
                    value: zeros,
                    is_valid: false,
                }),
            }
        }
    };

    let value = codec::encode_bytes(name, &tuple.value, fmt)?;
    let m = match (field.match_type, &tuple.aux) {
        (MatchType::Exact, MatchAux::Exact) => Match::Exact(value),
        (MatchType::Ternary, MatchAux::Exact) => Match::Ternary {
            value,
            mask: codec::all_ones(bits),
        },
        (MatchType::Ternary, MatchAux::Ternary { mask }) => Match::Ternary {
            value,
            mask: codec::encode_bytes(name, mask, fmt)?,
        },
        (MatchType::Lpm, MatchAux::Exact) => Match::Lpm {
            value,
            prefix_len: bits,
        },
        (MatchType::Lpm, MatchAux::Lpm { prefix_len }) => {
            if *prefix_len > bits {
                return Err(Error::out_of_range(
                    name,
                    format!("prefix length {} exceeds {} bits", prefix_len, bits),
                ));
            }
            Match::Lpm {
                value,
                prefix_len: *prefix_len,
            }
        }
        (MatchType::Range, MatchAux::Exact) => Match::Range {
            low: value.clone(),
            high: value,
        },
        (MatchType::Range, MatchAux::Range { high }) => {
            let high = codec::encode_bytes(name, high, fmt)?;
            // Equal-length big-endian strings order like the integers they encode.
            if value > high {
                return Err(Error::InvalidRange {
                    field: name.into(),
                    reason: format!("low {} is above high {}", tuple.value, codec::decode_bytes(&high, fmt)),
                });
            }
            Match::Range { low: value, high }
        }
        (MatchType::Optional, MatchAux::Exact) => Match::Optional {
            value,
            is_valid: true,
        },
        (MatchType::Optional, MatchAux::Optional { is_valid }) => Match::Optional {
            value,
            is_valid: *is_valid,
        },
        (_, aux) => return Err(match_kind_error(field, aux)),
    };
    Ok(m.canonical(bits))
}

/// Inverse of [`encode_key_field`].
pub(crate) fn decode_key_field(field: &KeyField, fmt: &Format, m: &Match) -> KeyTuple {
    let name = field.preamble.name.clone();
    let decode = |bytes: &[u8]| codec::decode_bytes(bytes, fmt);
    let (value, aux) = match m {
        Match::Exact(v) => (decode(v), MatchAux::Exact),
        Match::Ternary { value, mask } => (decode(value), MatchAux::Ternary { mask: decode(mask) }),
        Match::Lpm { value, prefix_len } => (
            decode(value),
            MatchAux::Lpm {
                prefix_len: *prefix_len,
            },
        ),
        Match::Range { low, high } => (decode(low), MatchAux::Range { high: decode(high) }),
        Match::Optional { value, is_valid } => (
            decode(value),
            MatchAux::Optional {
                is_valid: *is_valid,
            },
        ),
    };
    KeyTuple { name, value, aux }
}

/// One decoded data field.
#[derive(Clone, Debug, PartialEq)]
pub struct DataValue {
    pub id: u32,
    pub name: String,
    pub value: Value,
}

/// Data of an entry: an action with its parameters, action-independent fields, or both.
#[derive(Clone, Debug, Default)]
pub struct EntryData {
    action_id: Option<u32>,
    action: Option<String>,
    fields: Vec<DataValue>,
    wire: Vec<pb::DataField>,
}

impl PartialEq for EntryData {
    fn eq(&self, other: &Self) -> bool {
        self.action_id == other.action_id && self.fields == other.fields
    }
}

impl EntryData {
    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn action_id(&self) -> Option<u32> {
        self.action_id
    }

    /// Fields sorted by id.
    pub fn fields(&self) -> &[DataValue] {
        &self.fields
    }

    /// Value of the field named `name`, or ending in `.name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        crate::schema::resolve(
            "data field",
            name,
            self.fields.iter().map(|f| (f.name.as_str(), &f.value)),
        )
        .ok()
    }

    pub fn to_proto(&self) -> pb::TableData {
        pb::TableData {
            action_id: self.action_id.unwrap_or(0),
            fields: self.wire.clone(),
        }
    }

    pub(crate) fn from_parts(
        action_id: Option<u32>,
        action: Option<String>,
        mut parts: Vec<(DataValue, pb::DataField)>,
    ) -> Self {
        parts.sort_by_key(|(v, _)| v.id);
        let (fields, wire) = parts.into_iter().unzip();
        EntryData {
            action_id,
            action,
            fields,
            wire,
        }
    }
}

impl Display for EntryData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.action.as_deref().unwrap_or(""))?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", field.name, field.value)?;
        }
        write!(f, ")")
    }
}

/// Flags of a read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadFlags {
    /// Synchronize from hardware before reading.
    pub from_hw: bool,
    pub key_only: bool,
}

impl ReadFlags {
    pub fn from_hw() -> Self {
        ReadFlags {
            from_hw: true,
            key_only: false,
        }
    }

    fn to_proto(self) -> pb::TableFlags {
        pb::TableFlags {
            from_hw: self.from_hw,
            key_only: self.key_only,
            ..Default::default()
        }
    }
}

/// A key-shaped mask.  Every key field of the table has an entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyMask {
    fields: Vec<(u32, Vec<u8>)>,
}

impl KeyMask {
    pub fn get(&self, field_id: u32) -> Option<&[u8]> {
        self.fields
            .iter()
            .find(|(id, _)| *id == field_id)
            .map(|(_, m)| m.as_slice())
    }

    fn to_proto(&self) -> pb::DynKeyMask {
        pb::DynKeyMask {
            fields: self
                .fields
                .iter()
                .map(|(id, mask)| pb::KeyField {
                    field_id: *id,
                    match_type: Some(key_field::MatchType::Exact(key_field::Exact {
                        value: mask.clone(),
                    })),
                })
                .collect(),
        }
    }

    fn from_proto(m: &pb::DynKeyMask) -> Self {
        let fields = m
            .fields
            .iter()
            .filter_map(|f| match &f.match_type {
                Some(key_field::MatchType::Exact(e)) => Some((f.field_id, e.value.clone())),
                _ => None,
            })
            .sorted_by_key(|(id, _)| *id)
            .collect();
        KeyMask { fields }
    }
}

/// What happens to installed entries when a table's dynamic key mask changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaskChangePolicy {
    /// The change is refused with [`Error::EntriesPresent`] while the table has entries.
    RejectWithEntries,
    /// Installed entries are re-projected under the new mask.
    Reproject,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DynamicKeyMask {
    pub mask: KeyMask,
    pub policy: MaskChangePolicy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdleMode {
    Poll,
    Notify,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdleTimeoutConfig {
    pub enable: bool,
    pub mode: IdleMode,
    pub ttl_query_interval: u32,
    pub max_ttl: u32,
    pub min_ttl: u32,
}

/// A table attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Attribute {
    EntryScope(EntryScope),
    DynamicKeyMask(KeyMask),
    DynamicHashing { alg: u32, seed: u64 },
    MeterByteCountAdjust(i32),
    IdleTimeout(IdleTimeoutConfig),
}

pub const ENTRY_SCOPE: &str = "EntryScope";
pub const DYNAMIC_KEY_MASK: &str = "DynamicKeyMask";
pub const DYNAMIC_HASHING: &str = "DynamicHashing";
pub const METER_BYTE_COUNT_ADJUST: &str = "MeterByteCountAdjust";
pub const IDLE_TIMEOUT: &str = "IdleTimeout";

impl Attribute {
    pub fn name(&self) -> &'static str {
        match self {
            Attribute::EntryScope(_) => ENTRY_SCOPE,
            Attribute::DynamicKeyMask(_) => DYNAMIC_KEY_MASK,
            Attribute::DynamicHashing { .. } => DYNAMIC_HASHING,
            Attribute::MeterByteCountAdjust(_) => METER_BYTE_COUNT_ADJUST,
            Attribute::IdleTimeout(_) => IDLE_TIMEOUT,
        }
    }

    fn to_proto(&self) -> table_attribute::Attribute {
        use table_attribute::Attribute as Wire;
        match self {
            Attribute::EntryScope(s) => Wire::EntryScope(s.to_proto()),
            Attribute::DynamicKeyMask(m) => Wire::DynKeyMask(m.to_proto()),
            Attribute::DynamicHashing { alg, seed } => Wire::DynHashing(pb::DynHashing {
                alg: *alg,
                seed: *seed,
            }),
            Attribute::MeterByteCountAdjust(adjust) => Wire::ByteCountAdj(pb::ByteCountAdj {
                byte_count_adjust: *adjust,
            }),
            Attribute::IdleTimeout(c) => Wire::IdleTable(pb::IdleTable {
                ttl_query_interval: c.ttl_query_interval,
                max_ttl: c.max_ttl,
                min_ttl: c.min_ttl,
                idle_table_mode: match c.mode {
                    IdleMode::Poll => IdleTableMode::IdlePollMode as i32,
                    IdleMode::Notify => IdleTableMode::IdleNotifyMode as i32,
                },
                enable: c.enable,
            }),
        }
    }

    fn from_proto(a: &table_attribute::Attribute) -> Self {
        use table_attribute::Attribute as Wire;
        match a {
            Wire::EntryScope(s) => Attribute::EntryScope(s.into()),
            Wire::DynKeyMask(m) => Attribute::DynamicKeyMask(KeyMask::from_proto(m)),
            Wire::DynHashing(h) => Attribute::DynamicHashing {
                alg: h.alg,
                seed: h.seed,
            },
            Wire::ByteCountAdj(b) => Attribute::MeterByteCountAdjust(b.byte_count_adjust),
            Wire::IdleTable(t) => Attribute::IdleTimeout(IdleTimeoutConfig {
                enable: t.enable,
                mode: if t.idle_table_mode == IdleTableMode::IdleNotifyMode as i32 {
                    IdleMode::Notify
                } else {
                    IdleMode::Poll
                },
                ttl_query_interval: t.ttl_query_interval,
                max_ttl: t.max_ttl,
                min_ttl: t.min_ttl,
            }),
        }
    }

    /// The wire form used to ask for attribute `name`.
    fn query(name: &str) -> Result<table_attribute::Attribute> {
        use table_attribute::Attribute as Wire;
        match name {
            ENTRY_SCOPE => Ok(Wire::EntryScope(Default::default())),
            DYNAMIC_KEY_MASK => Ok(Wire::DynKeyMask(Default::default())),
            DYNAMIC_HASHING => Ok(Wire::DynHashing(Default::default())),
            METER_BYTE_COUNT_ADJUST => Ok(Wire::ByteCountAdj(Default::default())),
            IDLE_TIMEOUT => Ok(Wire::IdleTable(Default::default())),
            _ => Err(Error::unknown("attribute", name)),
        }
    }
}

/// The error carried by a read response, if its status is not OK.  `index` is the position of
/// the response within its read.
pub(crate) fn response_error(index: usize, response: &pb::ReadResponse) -> Option<Error> {
    let status = response.status.as_ref().filter(|s| s.code != Code::Ok as i32)?;
    let code = Code::from_i32(status.code);
    let sub_errors = vec![SubError {
        index,
        code,
        message: status.message.clone(),
    }];
    Some(classify(code, status.message.clone(), sub_errors))
}

fn make_update(kind: update::Type, entity: entity::Entity) -> pb::Update {
    pb::Update {
        r#type: kind as i32,
        entity: Some(pb::Entity {
            entity: Some(entity),
        }),
    }
}

/// Entries streamed back by [`Table::entry_get`].  Dropping the stream cancels the read.
pub struct EntryStream {
    read: ReadStream,
    program: Program,
    info: Arc<TableInfo>,
    buffered: VecDeque<Result<(EntryData, Key)>>,
    index: usize,
    done: bool,
}

impl EntryStream {
    /// The next `(data, key)` pair.  A key that was asked for but is not installed yields a
    /// `KeyNotFound` item and the stream goes on.
    pub async fn next(&mut self) -> Option<Result<(EntryData, Key)>> {
        loop {
            if let Some(item) = self.buffered.pop_front() {
                return Some(item);
            }
            if self.done {
                return None;
            }
            match self.read.next().await {
                None => self.done = true,
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Some(Ok(response)) => {
                    if let Some(error) = response_error(self.index, &response) {
                        self.buffered.push_back(Err(error));
                    }
                    for e in response.entities {
                        match e.entity {
                            Some(entity::Entity::TableEntry(te)) => {
                                let item = decode_entry(&self.program, &self.info, &te);
                                self.buffered.push_back(item);
                            }
                            other => debug!("ignoring {:?} in table read", other),
                        }
                    }
                    self.index += 1;
                }
            }
        }
    }

    /// Collects the remaining entries.  Per-key failures are aggregated into one error.
    pub async fn entries(mut self) -> Result<Vec<(EntryData, Key)>> {
        let mut entries = Vec::new();
        let mut sub_errors = Vec::new();
        while let Some(item) = self.next().await {
            match item {
                Ok(entry) => entries.push(entry),
                Err(e @ Error::DuplicateKey { .. })
                | Err(e @ Error::KeyNotFound { .. })
                | Err(e @ Error::RuntimeRejected { .. }) => {
                    sub_errors.extend_from_slice(e.sub_errors())
                }
                Err(e) => return Err(e),
            }
        }
        if sub_errors.is_empty() {
            Ok(entries)
        } else {
            Err(classify(Code::Unknown, "read failed".into(), sub_errors))
        }
    }
}

fn decode_data(program: &Program, info: &TableInfo, data: &pb::TableData) -> Result<EntryData> {
    let action_id = (data.action_id != 0).then(|| data.action_id);
    let action = match action_id {
        Some(id) => Some(info.action_by_id(id).ok_or_else(|| {
            Error::Schema(format!("table {} has no action with id {}", info.name(), id))
        })?),
        None => None,
    };
    let mut parts = Vec::new();
    for f in &data.fields {
        let value = match &f.value {
            Some(value) => value,
            None => continue,
        };
        let (owner, field) = info.data_field_by_id(action_id, f.field_id).ok_or_else(|| {
            Error::Schema(format!(
                "table {} has no data field with id {}",
                info.name(),
                f.field_id
            ))
        })?;
        let fmt = program.data_format(info, owner, field);
        parts.push((
            DataValue {
                id: f.field_id,
                name: field.preamble.name.clone(),
                value: codec::decode_data(value, &fmt),
            },
            f.clone(),
        ));
    }
    Ok(EntryData::from_parts(
        action_id,
        action.map(|a| a.preamble.name.clone()),
        parts,
    ))
}

fn decode_entry(
    program: &Program,
    info: &TableInfo,
    entry: &pb::TableEntry,
) -> Result<(EntryData, Key)> {
    let key = match &entry.value {
        Some(table_entry::Value::Key(k)) => Key::from_proto(entry.table_id, k),
        _ => Key {
            table_id: entry.table_id,
            fields: Vec::new(),
        },
    };
    let data = match &entry.data {
        Some(d) => decode_data(program, info, d)?,
        None => EntryData::default(),
    };
    Ok((data, key))
}

/// A table of the program a session is bound to.
#[derive(Clone)]
pub struct Table<'a> {
    session: &'a Session,
    program: Program,
    info: Arc<TableInfo>,
}

impl<'a> Table<'a> {
    pub(crate) fn new(session: &'a Session, program: Program, info: Arc<TableInfo>) -> Self {
        Table {
            session,
            program,
            info,
        }
    }

    pub fn name(&self) -> &str {
        self.info.name()
    }

    pub fn id(&self) -> u32 {
        self.info.id()
    }

    pub fn info(&self) -> &Arc<TableInfo> {
        &self.info
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn make_key(&self, tuples: &[KeyTuple]) -> Result<Key> {
        let mut given = Vec::with_capacity(tuples.len());
        for t in tuples {
            let field = self.info.key_field(&t.name)?;
            if given.iter().any(|(id, _)| *id == field.preamble.id) {
                return Err(Error::Schema(format!(
                    "key field {} given twice",
                    field.preamble.name
                )));
            }
            given.push((field.preamble.id, t));
        }
        let fields = self
            .info
            .key_fields
            .iter()
            .map(|field| {
                let tuple = given
                    .iter()
                    .find(|(id, _)| *id == field.preamble.id)
                    .map(|(_, t)| *t);
                let fmt = self.program.key_format(&self.info, field);
                Ok((field.preamble.id, encode_key_field(field, &fmt, tuple)?))
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .sorted_by_key(|(id, _)| *id)
            .collect();
        Ok(Key {
            table_id: self.info.id(),
            fields,
        })
    }

    /// Decodes `key` back into named fields, honoring annotations.
    pub fn key_tuples(&self, key: &Key) -> Result<Vec<KeyTuple>> {
        key.fields
            .iter()
            .map(|(id, m)| {
                let field = self.info.key_field_by_id(*id).ok_or_else(|| {
                    Error::Schema(format!("table {} has no key field {}", self.name(), id))
                })?;
                let fmt = self.program.key_format(&self.info, field);
                Ok(decode_key_field(field, &fmt, m))
            })
            .collect()
    }

    /// Builds entry data.  With `action`, `fields` are that action's parameters plus any
    /// action-independent fields; without, they are action-independent fields only.
    pub fn make_data(&self, fields: &[(&str, Value)], action: Option<&str>) -> Result<EntryData> {
        let action = action.map(|a| self.info.action(a)).transpose()?;
        let mut parts: Vec<(DataValue, pb::DataField)> = Vec::with_capacity(fields.len());
        let mut seen = HashSet::new();
        for (name, value) in fields {
            let (owner, field) = self.info.data_field(action, name)?;
            if !seen.insert((owner, field.preamble.id)) {
                return Err(Error::Schema(format!(
                    "data field {} given twice",
                    field.preamble.name
                )));
            }
            let fmt = self.program.data_format(&self.info, owner, field);
            let wire = codec::encode_data(&field.preamble.name, value, &fmt)?;
            parts.push((
                DataValue {
                    id: field.preamble.id,
                    name: field.preamble.name.clone(),
                    value: codec::decode_data(&wire, &fmt),
                },
                pb::DataField {
                    field_id: field.preamble.id,
                    value: Some(wire),
                },
            ));
        }
        if let Some(a) = action {
            if let Some(missing) = a
                .params
                .iter()
                .find(|p| p.mandatory && !seen.contains(&(Some(a.preamble.id), p.preamble.id)))
            {
                return Err(Error::Schema(format!(
                    "action {} needs parameter {}",
                    a.preamble.name, missing.preamble.name
                )));
            }
        }
        Ok(EntryData::from_parts(
            action.map(|a| a.preamble.id),
            action.map(|a| a.preamble.name.clone()),
            parts,
        ))
    }

    /// Decodes data as read from the Runtime.
    pub fn decode_data(&self, data: &pb::TableData) -> Result<EntryData> {
        decode_data(&self.program, &self.info, data)
    }

    fn check_key(&self, key: &Key) -> Result<()> {
        if key.table_id != self.info.id() {
            return Err(Error::Schema(format!(
                "key of table id {} used with table {}",
                key.table_id,
                self.name()
            )));
        }
        Ok(())
    }

    fn check_entry_data(&self, data: &EntryData) -> Result<()> {
        match data.action_id.and_then(|id| self.info.action_by_id(id)) {
            Some(a) if !a.may_be_entry => Err(Error::Schema(format!(
                "action {} may only be the default action of {}",
                a.preamble.name,
                self.name()
            ))),
            _ => Ok(()),
        }
    }

    fn check_default_data(&self, data: &EntryData) -> Result<()> {
        if !self.info.default_allowed() {
            return Err(Error::Schema(format!(
                "table {} does not allow setting its default entry",
                self.name()
            )));
        }
        match data.action_id.and_then(|id| self.info.action_by_id(id)) {
            Some(a) if !a.may_be_default => Err(Error::Schema(format!(
                "action {} may not be the default action of {}",
                a.preamble.name,
                self.name()
            ))),
            _ => Ok(()),
        }
    }

    fn table_entry(&self, key: Option<&Key>, data: Option<&EntryData>) -> pb::TableEntry {
        pb::TableEntry {
            table_id: self.info.id(),
            data: data.map(EntryData::to_proto),
            value: key.map(|k| table_entry::Value::Key(k.to_proto())),
            ..Default::default()
        }
    }

    pub(crate) fn entry_update(
        &self,
        kind: update::Type,
        key: Option<&Key>,
        data: Option<&EntryData>,
    ) -> Result<pb::Update> {
        if let Some(key) = key {
            self.check_key(key)?;
        }
        if let Some(data) = data {
            self.check_entry_data(data)?;
        }
        Ok(make_update(
            kind,
            entity::Entity::TableEntry(self.table_entry(key, data)),
        ))
    }

    /// The table's entry scope, as the device currently has it.
    pub async fn get_entry_scope(&self, target: &Target) -> Result<EntryScope> {
        if !self.info.supports_attribute(ENTRY_SCOPE) {
            return Ok(EntryScope::default());
        }
        match self
            .attribute_get(&Target::new(target.device_id), ENTRY_SCOPE)
            .await?
        {
            Attribute::EntryScope(scope) => Ok(scope),
            other => Err(Error::Schema(format!(
                "table {}: expected an entry scope, got {:?}",
                self.name(),
                other
            ))),
        }
    }

    pub async fn set_entry_scope(&self, target: &Target, scope: EntryScope) -> Result<()> {
        self.attribute_set(target, &Attribute::EntryScope(scope)).await
    }

    /// Checks `target` against the table's entry scope.
    pub async fn validate(&self, target: &Target) -> Result<()> {
        self.get_entry_scope(target)
            .await?
            .validate(target, self.name())
    }

    /// Sends `updates` to `target`.  When the runtime refuses the batch as invalid, the target is
    /// checked again so that a scope changed meanwhile is reported as `ScopeMismatch`.
    async fn write(&self, target: &Target, updates: Vec<pb::Update>) -> Result<()> {
        match self.session.write(target, updates).await {
            Err(e @ Error::RuntimeRejected {
                code: Code::InvalidArgument,
                ..
            }) => {
                self.validate(target).await?;
                Err(e)
            }
            r => r,
        }
    }

    fn check_lengths(&self, keys: &[Key], datas: &[EntryData]) -> Result<()> {
        if keys.len() != datas.len() {
            return Err(Error::Schema(format!(
                "table {}: {} keys but {} data",
                self.name(),
                keys.len(),
                datas.len()
            )));
        }
        Ok(())
    }

    pub async fn entry_add(&self, target: &Target, keys: &[Key], datas: &[EntryData]) -> Result<()> {
        self.check_lengths(keys, datas)?;
        let updates = keys
            .iter()
            .zip(datas)
            .map(|(k, d)| self.entry_update(update::Type::Insert, Some(k), Some(d)))
            .collect::<Result<Vec<_>>>()?;
        self.validate(target).await?;
        self.write(target, updates).await
    }

    pub async fn entry_modify(&self, target: &Target, keys: &[Key], datas: &[EntryData]) -> Result<()> {
        self.check_lengths(keys, datas)?;
        let updates = keys
            .iter()
            .zip(datas)
            .map(|(k, d)| self.entry_update(update::Type::Modify, Some(k), Some(d)))
            .collect::<Result<Vec<_>>>()?;
        self.validate(target).await?;
        self.write(target, updates).await
    }

    /// Deletes the entries with `keys`, or every entry in `target`'s scope when `keys` is
    /// `None`.
    pub async fn entry_delete(&self, target: &Target, keys: Option<&[Key]>) -> Result<()> {
        let updates = match keys {
            Some(keys) => keys
                .iter()
                .map(|k| self.entry_update(update::Type::Delete, Some(k), None))
                .collect::<Result<Vec<_>>>()?,
            None => vec![self.entry_update(update::Type::Delete, None, None)?],
        };
        if updates.is_empty() {
            return Ok(());
        }
        self.validate(target).await?;
        self.write(target, updates).await
    }

    /// Reads the entries with `keys`, or every entry in `target`'s scope when `keys` is `None`.
    /// `projection` limits the data fields returned.
    pub async fn entry_get(
        &self,
        target: &Target,
        keys: Option<&[Key]>,
        flags: ReadFlags,
        projection: Option<&[&str]>,
    ) -> Result<EntryStream> {
        if let Some(keys) = keys {
            for k in keys {
                self.check_key(k)?;
            }
        }
        let projection = match projection {
            Some(names) => Some(pb::TableData {
                action_id: 0,
                fields: names
                    .iter()
                    .map(|name| {
                        let (_, field) = self.info.param_owner(name)?;
                        Ok(pb::DataField {
                            field_id: field.preamble.id,
                            value: None,
                        })
                    })
                    .collect::<Result<_>>()?,
            }),
            None => None,
        };
        let entry = |key: Option<&Key>| pb::Entity {
            entity: Some(entity::Entity::TableEntry(pb::TableEntry {
                table_id: self.info.id(),
                data: projection.clone(),
                table_flags: Some(flags.to_proto()),
                value: key.map(|k| table_entry::Value::Key(k.to_proto())),
                ..Default::default()
            })),
        };
        let entities = match keys {
            Some(keys) => keys.iter().map(|k| entry(Some(k))).collect(),
            None => vec![entry(None)],
        };
        self.validate(target).await?;
        let read = self.session.read(target, entities).await?;
        Ok(EntryStream {
            read,
            program: self.program.clone(),
            info: self.info.clone(),
            buffered: VecDeque::new(),
            index: 0,
            done: false,
        })
    }

    pub async fn default_entry_set(&self, target: &Target, data: &EntryData) -> Result<()> {
        self.check_default_data(data)?;
        self.validate(target).await?;
        let mut entry = self.table_entry(None, Some(data));
        entry.is_default_entry = true;
        let update = make_update(update::Type::Modify, entity::Entity::TableEntry(entry));
        self.write(target, vec![update]).await
    }

    pub async fn default_entry_get(&self, target: &Target, flags: ReadFlags) -> Result<EntryData> {
        self.validate(target).await?;
        let entry = pb::TableEntry {
            table_id: self.info.id(),
            is_default_entry: true,
            table_flags: Some(flags.to_proto()),
            ..Default::default()
        };
        let entities = self
            .session
            .read_all(
                target,
                vec![pb::Entity {
                    entity: Some(entity::Entity::TableEntry(entry)),
                }],
            )
            .await?;
        entities
            .into_iter()
            .find_map(|e| match e.entity {
                Some(entity::Entity::TableEntry(te)) => Some(te),
                _ => None,
            })
            .map(|te| match &te.data {
                Some(d) => self.decode_data(d),
                None => Ok(EntryData::default()),
            })
            .unwrap_or_else(|| Err(Error::KeyNotFound { sub_errors: Vec::new() }))
    }

    /// Reverts the default entry to the program's initial default.
    pub async fn default_entry_reset(&self, target: &Target) -> Result<()> {
        self.validate(target).await?;
        let mut entry = self.table_entry(None, None);
        entry.is_default_entry = true;
        let update = make_update(update::Type::Delete, entity::Entity::TableEntry(entry));
        self.write(target, vec![update]).await
    }

    /// Runs a table operation such as `Sync`, `SyncCounters` or `SyncRegisters`.
    pub async fn operations_execute(&self, target: &Target, operation: &str) -> Result<()> {
        if !self.info.supports_operation(operation) {
            return Err(Error::unknown("operation", operation));
        }
        self.validate(target).await?;
        let update = make_update(
            update::Type::Insert,
            entity::Entity::TableOperation(pb::TableOperation {
                table_id: self.info.id(),
                table_operations_type: operation.into(),
            }),
        );
        self.write(target, vec![update]).await
    }

    /// Number of entries installed in `target`'s scope.
    pub async fn usage_get(&self, target: &Target) -> Result<u32> {
        self.validate(target).await?;
        let entities = self
            .session
            .read_all(
                target,
                vec![pb::Entity {
                    entity: Some(entity::Entity::TableUsage(pb::TableUsage {
                        table_id: self.info.id(),
                        ..Default::default()
                    })),
                }],
            )
            .await?;
        entities
            .into_iter()
            .find_map(|e| match e.entity {
                Some(entity::Entity::TableUsage(u)) if u.table_id == self.info.id() => {
                    Some(u.usage)
                }
                _ => None,
            })
            .ok_or_else(|| Error::Schema(format!("no usage returned for table {}", self.name())))
    }

    fn check_attribute(&self, name: &str) -> Result<()> {
        if !self.info.supports_attribute(name) {
            return Err(Error::unknown("attribute", &format!("{}.{}", self.name(), name)));
        }
        Ok(())
    }

    pub async fn attribute_set(&self, target: &Target, attribute: &Attribute) -> Result<()> {
        self.check_attribute(attribute.name())?;
        let update = make_update(
            update::Type::Insert,
            entity::Entity::TableAttribute(pb::TableAttribute {
                table_id: self.info.id(),
                attribute: Some(attribute.to_proto()),
            }),
        );
        match self.session.write(target, vec![update]).await {
            Ok(()) => Ok(()),
            Err(Error::RuntimeRejected {
                code: Code::FailedPrecondition,
                ..
            }) if matches!(attribute, Attribute::EntryScope(_)) => {
                Err(Error::ScopeChangeWithEntries {
                    table: self.name().into(),
                })
            }
            Err(Error::RuntimeRejected {
                code: Code::FailedPrecondition,
                ..
            }) if matches!(attribute, Attribute::DynamicKeyMask(_)) => {
                Err(Error::EntriesPresent {
                    table: self.name().into(),
                })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn attribute_get(&self, target: &Target, name: &str) -> Result<Attribute> {
        self.check_attribute(name)?;
        let query = Attribute::query(name)?;
        let entities = self
            .session
            .read_all(
                target,
                vec![pb::Entity {
                    entity: Some(entity::Entity::TableAttribute(pb::TableAttribute {
                        table_id: self.info.id(),
                        attribute: Some(query),
                    })),
                }],
            )
            .await?;
        entities
            .into_iter()
            .find_map(|e| match e.entity {
                Some(entity::Entity::TableAttribute(pb::TableAttribute {
                    attribute: Some(a),
                    ..
                })) => Some(Attribute::from_proto(&a)),
                _ => None,
            })
            .filter(|a| a.name() == name)
            .ok_or_else(|| {
                Error::Schema(format!("no {} attribute returned for table {}", name, self.name()))
            })
    }

    /// Builds a key mask from named field masks.  Fields not named are not masked.
    pub fn make_key_mask(&self, fields: &[(&str, Value)]) -> Result<KeyMask> {
        let mut given = Vec::with_capacity(fields.len());
        for (name, value) in fields {
            let field = self.info.key_field(name)?;
            let fmt = self.program.key_format(&self.info, field);
            given.push((
                field.preamble.id,
                codec::encode_bytes(&field.preamble.name, value, &fmt)?,
            ));
        }
        let fields = self
            .info
            .key_fields
            .iter()
            .filter(|f| f.preamble.id != MATCH_PRIORITY_ID)
            .map(|f| {
                let mask = given
                    .iter()
                    .find(|(id, _)| *id == f.preamble.id)
                    .map(|(_, m)| m.clone())
                    .unwrap_or_else(|| codec::all_ones(f.bit_width));
                (f.preamble.id, mask)
            })
            .collect();
        Ok(KeyMask { fields })
    }

    /// The change policy of this table's dynamic key mask.
    pub fn mask_change_policy(&self) -> MaskChangePolicy {
        MaskChangePolicy::RejectWithEntries
    }

    pub async fn set_dynamic_key_mask(&self, target: &Target, mask: &KeyMask) -> Result<()> {
        self.attribute_set(target, &Attribute::DynamicKeyMask(mask.clone()))
            .await
    }

    pub async fn get_dynamic_key_mask(&self, target: &Target) -> Result<DynamicKeyMask> {
        match self.attribute_get(target, DYNAMIC_KEY_MASK).await? {
            Attribute::DynamicKeyMask(mask) => Ok(DynamicKeyMask {
                mask,
                policy: self.mask_change_policy(),
            }),
            other => Err(Error::Schema(format!(
                "table {}: expected a key mask, got {:?}",
                self.name(),
                other
            ))),
        }
    }
}

/// Entry updates across tables, sent as one write.
pub struct WriteBatch<'a> {
    session: &'a Session,
    target: Target,
    tables: Vec<Table<'a>>,
    updates: Vec<pb::Update>,
}

impl<'a> WriteBatch<'a> {
    pub(crate) fn new(session: &'a Session) -> Self {
        WriteBatch {
            session,
            target: session.target(),
            tables: Vec::new(),
            updates: Vec::new(),
        }
    }

    pub fn target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    fn push(&mut self, table: &Table<'a>, update: pb::Update) -> &mut Self {
        if !self.tables.iter().any(|t| t.id() == table.id()) {
            self.tables.push(table.clone());
        }
        self.updates.push(update);
        self
    }

    pub fn add(&mut self, table: &Table<'a>, key: &Key, data: &EntryData) -> Result<&mut Self> {
        let update = table.entry_update(update::Type::Insert, Some(key), Some(data))?;
        Ok(self.push(table, update))
    }

    pub fn modify(&mut self, table: &Table<'a>, key: &Key, data: &EntryData) -> Result<&mut Self> {
        let update = table.entry_update(update::Type::Modify, Some(key), Some(data))?;
        Ok(self.push(table, update))
    }

    pub fn delete(&mut self, table: &Table<'a>, key: &Key) -> Result<&mut Self> {
        let update = table.entry_update(update::Type::Delete, Some(key), None)?;
        Ok(self.push(table, update))
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Sends the batch.  A failure carries the status of every failed update, indexed by its
    /// position in the batch.
    pub async fn send(self) -> Result<()> {
        if self.updates.is_empty() {
            return Ok(());
        }
        for table in &self.tables {
            table.validate(&self.target).await?;
        }
        self.session.write(&self.target, self.updates).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    const SCHEMA: &str = r#"{
      "tables": [
        {
          "name": "pipe.SwitchIngress.mixed",
          "id": 77,
          "key": [
            {"id": 1, "name": "hdr.ethernet.dst_addr", "match_type": "Ternary",
             "type": {"type": "bytes", "width": 48}},
            {"id": 2, "name": "hdr.ipv4.dst_addr", "match_type": "LPM",
             "type": {"type": "bytes", "width": 32}},
            {"id": 3, "name": "hdr.udp.dst_port", "match_type": "Range",
             "type": {"type": "bytes", "width": 16}},
            {"id": 4, "name": "ig_intr_md.ingress_port", "match_type": "Exact",
             "type": {"type": "bytes", "width": 9}}
          ]
        }
      ]
    }"#;

    fn field(name: &str) -> KeyField {
        let schema = Schema::parse("p", SCHEMA.as_bytes()).unwrap();
        let table = schema.table("mixed").unwrap();
        table.key_field(name).unwrap().clone()
    }

    fn encode(name: &str, tuple: Option<&KeyTuple>) -> Result<Match> {
        let f = field(name);
        encode_key_field(&f, &f.format(None), tuple)
    }

    #[test]
    fn ternary_mask_defaults_to_all_ones() {
        let m = encode(
            "ethernet.dst_addr",
            Some(&KeyTuple::exact("ethernet.dst_addr", 0x222222222222u64)),
        )
        .unwrap();
        assert_eq!(
            m,
            Match::Ternary {
                value: vec![0x22; 6],
                mask: vec![0xff; 6]
            }
        );
        let m = encode(
            "ethernet.dst_addr",
            Some(&KeyTuple::ternary("ethernet.dst_addr", 0x222222222222u64, 0xfffffffffff0u64)),
        )
        .unwrap();
        assert_eq!(
            m,
            Match::Ternary {
                value: vec![0x22, 0x22, 0x22, 0x22, 0x22, 0x20],
                mask: vec![0xff, 0xff, 0xff, 0xff, 0xff, 0xf0]
            }
        );
    }

    #[test]
    fn lpm_keys_are_masked() {
        let m = encode("ipv4.dst_addr", Some(&KeyTuple::lpm("ipv4.dst_addr", 0x0a0b0c0du32, 16)))
            .unwrap();
        assert_eq!(
            m,
            Match::Lpm {
                value: vec![0x0a, 0x0b, 0, 0],
                prefix_len: 16
            }
        );
        assert!(matches!(
            encode("ipv4.dst_addr", Some(&KeyTuple::lpm("ipv4.dst_addr", 1u32, 33))),
            Err(Error::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn missing_fields_are_dont_care() {
        assert_eq!(
            encode("udp.dst_port", None).unwrap(),
            Match::Range {
                low: vec![0, 0],
                high: vec![0xff, 0xff]
            }
        );
        assert_eq!(
            encode("ipv4.dst_addr", None).unwrap(),
            Match::Lpm {
                value: vec![0; 4],
                prefix_len: 0
            }
        );
        assert!(matches!(encode("ingress_port", None), Err(Error::Schema(_))));
        assert_eq!(
            encode("$MATCH_PRIORITY", None).unwrap(),
            Match::Exact(vec![0; 4])
        );
    }

    #[test]
    fn range_and_kind_errors() {
        assert!(matches!(
            encode("udp.dst_port", Some(&KeyTuple::range("udp.dst_port", 100u16, 10u16))),
            Err(Error::InvalidRange { .. })
        ));
        assert!(matches!(
            encode("ingress_port", Some(&KeyTuple::lpm("ingress_port", 1u16, 3))),
            Err(Error::Schema(_))
        ));
        assert!(matches!(
            encode("ingress_port", Some(&KeyTuple::exact("ingress_port", 512u16))),
            Err(Error::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn decode_inverts_encode() {
        let f = field("udp.dst_port");
        let fmt = f.format(None);
        let tuple = KeyTuple::range("hdr.udp.dst_port", 10u16, 100u16);
        let m = encode_key_field(&f, &fmt, Some(&tuple)).unwrap();
        let back = decode_key_field(&f, &fmt, &m);
        assert_eq!(back.value, Value::Int(10));
        assert_eq!(back.aux, MatchAux::Range { high: Value::Int(100) });
    }

    #[test]
    fn proto_keys_sort_by_id() {
        let key = pb::TableKey {
            fields: vec![
                pb::KeyField {
                    field_id: 4,
                    match_type: Some(Match::Exact(vec![0, 1]).to_proto()),
                },
                pb::KeyField {
                    field_id: 1,
                    match_type: Some(
                        Match::Ternary {
                            value: vec![0x0f; 6],
                            mask: vec![0xf0; 6],
                        }
                        .to_proto(),
                    ),
                },
            ],
        };
        let schema = Schema::parse("p", SCHEMA.as_bytes()).unwrap();
        let key = Key::from_proto(77, &key).canonical(schema.table("mixed").unwrap());
        assert_eq!(key.fields()[0].0, 1);
        assert_eq!(
            key.get(1),
            Some(&Match::Ternary {
                value: vec![0; 6],
                mask: vec![0xf0; 6]
            })
        );
        assert_eq!(Key::from_proto(77, &key.to_proto()), key);
    }
}
