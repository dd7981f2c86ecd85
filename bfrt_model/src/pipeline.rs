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

//! Table state of one installed program.

use bfrt::codec;
use bfrt::schema::{Schema, TableInfo, MATCH_PRIORITY_ID};
use bfrt::table::{Key, Match};
use bfrt::target::{EntryScope, ScopeMode, Target};

use proto::bfruntime::{
    self as pb,
    data_field,
    entity,
    table_attribute,
    table_entry,
    update,
};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tonic::Status;

use tracing::debug;

pub(crate) type Result<T> = std::result::Result<T, Status>;

pub const COUNTER_PKTS: &str = "$COUNTER_SPEC_PKTS";
pub const COUNTER_BYTES: &str = "$COUNTER_SPEC_BYTES";

const REGISTER_TABLE_TYPE: &str = "Register";
const SYNC_OPERATIONS: [&str; 3] = ["Sync", "SyncCounters", "SyncRegisters"];

/// Which copy of the entries' state a group of pipes shares.  One component per scope
/// dimension; `u32::MAX` stands for "shared by all".
type Instance = (u32, u32, u32);

fn instance_of(scope: &EntryScope, target: &Target) -> Instance {
    let one = |mode: ScopeMode, id: u32| match mode {
        ScopeMode::All => u32::MAX,
        ScopeMode::Single => id,
        ScopeMode::UserDefined(_) => mode.group_of(id).map(u32::from).unwrap_or(id),
    };
    (
        one(scope.gress, target.direction.to_wire()),
        one(scope.pipe, target.pipe_id),
        one(scope.parser, target.parser_id),
    )
}

#[derive(Clone, Debug)]
struct Entry {
    /// What software reads return.
    shadow: pb::TableData,
    /// What the hardware holds.  Copied to `shadow` by a sync operation.
    hw: pb::TableData,
}

/// Sets field `id` of `data` to `value`, adding it if absent.
fn set_field(data: &mut pb::TableData, id: u32, value: data_field::Value) {
    match data.fields.iter_mut().find(|f| f.field_id == id) {
        Some(f) => f.value = Some(value),
        None => data.fields.push(pb::DataField {
            field_id: id,
            value: Some(value),
        }),
    }
}

pub(crate) fn field_int(data: &pb::TableData, id: u32) -> u128 {
    match data
        .fields
        .iter()
        .find(|f| f.field_id == id)
        .and_then(|f| f.value.as_ref())
    {
        Some(data_field::Value::Stream(bytes)) => codec::decode_int(bytes),
        _ => 0,
    }
}

/// Header values of a packet, by key field id.
pub type Packet = [(u32, Vec<u8>)];

/// True if `packet` hits `entry` under the dynamic key `mask`.
fn matches(info: &TableInfo, entry: &Key, packet: &Packet, mask: Option<&pb::DynKeyMask>) -> bool {
    entry.fields().iter().all(|(id, m)| {
        if *id == MATCH_PRIORITY_ID {
            return true;
        }
        let p = match packet.iter().find(|(f, _)| f == id) {
            Some((_, v)) => v.as_slice(),
            None => return false,
        };
        let width = info.key_field_by_id(*id).map(|f| f.bit_width).unwrap_or(0);
        let dynamic = mask
            .and_then(|m| m.fields.iter().find(|f| f.field_id == *id))
            .and_then(|f| match &f.match_type {
                Some(pb::key_field::MatchType::Exact(e)) => Some(e.value.clone()),
                _ => None,
            })
            .unwrap_or_else(|| codec::all_ones(width));
        let masked_eq = |v: &[u8], m: &[u8]| {
            let m = codec::and(m, &dynamic);
            codec::decode_int(&codec::and(p, &m)) == codec::decode_int(&codec::and(v, &m))
        };
        match m {
            Match::Exact(v) => masked_eq(v, &codec::all_ones(width)),
            Match::Ternary { value, mask } => masked_eq(value, mask),
            Match::Lpm { value, prefix_len } => {
                masked_eq(value, &codec::prefix_mask(width, *prefix_len))
            }
            Match::Range { low, high } => {
                let p = codec::decode_int(p);
                codec::decode_int(low) <= p && p <= codec::decode_int(high)
            }
            Match::Optional { value, is_valid } => {
                !*is_valid || masked_eq(value, &codec::all_ones(width))
            }
        }
    })
}

/// Result of a lookup: the entry hit, or `None` for the default entry, and its data.
#[derive(Clone, Debug, PartialEq)]
pub struct Hit {
    pub key: Option<Key>,
    pub data: pb::TableData,
}

#[derive(Clone, Debug)]
pub(crate) struct TableState {
    pub(crate) info: Arc<TableInfo>,
    pub(crate) scope: EntryScope,
    entries: BTreeMap<(Instance, Key), Entry>,
    defaults: HashMap<Instance, pb::TableData>,
    key_mask: Option<pb::DynKeyMask>,
    hashing: pb::DynHashing,
    byte_count_adjust: i32,
    idle: pb::IdleTable,
    num_pipes: u32,
}

impl TableState {
    fn new(info: Arc<TableInfo>, num_pipes: u32) -> Self {
        TableState {
            info,
            num_pipes,
            scope: EntryScope::default(),
            entries: BTreeMap::new(),
            defaults: HashMap::new(),
            key_mask: None,
            hashing: pb::DynHashing::default(),
            byte_count_adjust: 0,
            idle: pb::IdleTable::default(),
        }
    }

    fn name(&self) -> &str {
        self.info.name()
    }

    fn check_target(&self, target: &Target) -> Result<Instance> {
        self.scope
            .validate(target, self.name())
            .map_err(|e| Status::invalid_argument(e.to_string()))?;
        Ok(instance_of(&self.scope, target))
    }

    fn field_id(&self, name: &str) -> Option<u32> {
        self.info.data_field(None, name).ok().map(|(_, f)| f.preamble.id)
    }

    fn is_register(&self) -> bool {
        self.info.table_type == REGISTER_TABLE_TYPE
    }

    /// The program's initial default entry.
    pub(crate) fn initial_default(&self) -> pb::TableData {
        if self.info.table_type == bfrt::hashing::ALGORITHM_TABLE_TYPE {
            if let Ok(action) = self.info.action("pre_defined") {
                if let Ok(param) = action.param("algorithm_name") {
                    return pb::TableData {
                        action_id: action.preamble.id,
                        fields: vec![pb::DataField {
                            field_id: param.preamble.id,
                            value: Some(data_field::Value::StrVal("CRC_32".into())),
                        }],
                    };
                }
            }
        }
        pb::TableData::default()
    }

    pub(crate) fn default_data(&self, target: &Target) -> pb::TableData {
        self.defaults
            .get(&instance_of(&self.scope, target))
            .cloned()
            .unwrap_or_else(|| self.initial_default())
    }

    pub(crate) fn hashing(&self) -> &pb::DynHashing {
        &self.hashing
    }

    fn has_entries(&self) -> bool {
        !self.entries.is_empty()
    }

    fn key(&self, key: &pb::TableKey) -> Result<Key> {
        for f in &key.fields {
            if self.info.key_field_by_id(f.field_id).is_none() {
                return Err(Status::invalid_argument(format!(
                    "table {} has no key field {}",
                    self.name(),
                    f.field_id
                )));
            }
        }
        Ok(Key::from_proto(self.info.id(), key).canonical(&self.info))
    }

    /// Adds zero values for the action-independent fields `data` lacks.
    fn complete(&self, mut data: pb::TableData) -> pb::TableData {
        for f in &self.info.data_fields {
            if !data.fields.iter().any(|d| d.field_id == f.preamble.id) && !f.repeated {
                let value = match f.class {
                    codec::TypeClass::Bool => data_field::Value::BoolVal(false),
                    codec::TypeClass::Str => data_field::Value::StrVal(String::new()),
                    codec::TypeClass::Float => data_field::Value::FloatVal(0.0),
                    _ => data_field::Value::Stream(vec![0; codec::n_bytes(f.bit_width)]),
                };
                set_field(&mut data, f.preamble.id, value);
            }
        }
        data
    }

    fn check_action(&self, data: &pb::TableData, default: bool) -> Result<()> {
        if data.action_id == 0 {
            return Ok(());
        }
        match self.info.action_by_id(data.action_id) {
            None => Err(Status::invalid_argument(format!(
                "table {} has no action {}",
                self.name(),
                data.action_id
            ))),
            Some(a) if default && !a.may_be_default => Err(Status::invalid_argument(format!(
                "{} cannot be a default action",
                a.preamble.name
            ))),
            Some(a) if !default && !a.may_be_entry => Err(Status::invalid_argument(format!(
                "{} can only be a default action",
                a.preamble.name
            ))),
            Some(_) => Ok(()),
        }
    }

    fn write_entry(&mut self, kind: update::Type, te: &pb::TableEntry, target: &Target) -> Result<()> {
        let instance = self.check_target(target)?;
        let data = te.data.clone().unwrap_or_default();
        if te.is_default_entry {
            return match kind {
                update::Type::Modify | update::Type::InsertOrModify => {
                    self.check_action(&data, true)?;
                    self.defaults.insert(instance, data);
                    Ok(())
                }
                update::Type::Delete => {
                    self.defaults.remove(&instance);
                    Ok(())
                }
                _ => Err(Status::invalid_argument("default entries are modified, not inserted")),
            };
        }

        let key = match &te.value {
            Some(table_entry::Value::Key(k)) => self.key(k)?,
            Some(table_entry::Value::HandleId(_)) => {
                return Err(Status::unimplemented("entry handles"))
            }
            None if kind == update::Type::Delete => {
                let before = self.entries.len();
                self.entries.retain(|(i, _), _| *i != instance);
                debug!("{}: deleted {} entries", self.name(), before - self.entries.len());
                return Ok(());
            }
            None => return Err(Status::invalid_argument("entry without key")),
        };
        let slot = (instance, key);
        let exists = self.entries.contains_key(&slot);
        match (kind, exists) {
            (update::Type::Insert, true) => Err(Status::already_exists(format!(
                "{}: entry already exists",
                self.name()
            ))),
            (update::Type::Modify, false) | (update::Type::Delete, false) => Err(
                Status::not_found(format!("{}: no such entry", self.name())),
            ),
            (update::Type::Insert, false) | (update::Type::InsertOrModify, false) => {
                self.check_action(&data, false)?;
                let data = self.complete(data);
                self.entries.insert(
                    slot,
                    Entry {
                        shadow: data.clone(),
                        hw: data,
                    },
                );
                Ok(())
            }
            (update::Type::Modify, true) | (update::Type::InsertOrModify, true) => {
                self.check_action(&data, false)?;
                if let Some(entry) = self.entries.get_mut(&slot) {
                    for copy in [&mut entry.shadow, &mut entry.hw] {
                        if data.action_id != 0 && data.action_id != copy.action_id {
                            copy.action_id = data.action_id;
                            copy.fields.retain(|f| {
                                self.info.data_fields.iter().any(|d| d.preamble.id == f.field_id)
                            });
                        }
                        for f in &data.fields {
                            if let Some(v) = &f.value {
                                set_field(copy, f.field_id, v.clone());
                            }
                        }
                    }
                }
                Ok(())
            }
            (update::Type::Delete, true) => {
                self.entries.remove(&slot);
                Ok(())
            }
            (update::Type::Unspecified, _) | (update::Type::ModifyInc, _) => {
                Err(Status::invalid_argument(format!("unsupported update {:?}", kind)))
            }
        }
    }

    fn write_attribute(&mut self, attribute: &table_attribute::Attribute) -> Result<()> {
        use table_attribute::Attribute as A;
        let name = match attribute {
            A::EntryScope(_) => bfrt::table::ENTRY_SCOPE,
            A::DynKeyMask(_) => bfrt::table::DYNAMIC_KEY_MASK,
            A::DynHashing(_) => bfrt::table::DYNAMIC_HASHING,
            A::ByteCountAdj(_) => bfrt::table::METER_BYTE_COUNT_ADJUST,
            A::IdleTable(_) => bfrt::table::IDLE_TIMEOUT,
        };
        if !self.info.supports_attribute(name) {
            return Err(Status::invalid_argument(format!(
                "table {} has no attribute {}",
                self.name(),
                name
            )));
        }
        match attribute {
            A::EntryScope(s) => {
                if self.has_entries() {
                    return Err(Status::failed_precondition(format!(
                        "{}: entry scope cannot change while entries are installed",
                        self.name()
                    )));
                }
                self.scope = s.into();
                self.defaults.clear();
                debug!("{}: entry scope {}", self.name(), self.scope);
            }
            A::DynKeyMask(m) => {
                if self.has_entries() {
                    return Err(Status::failed_precondition(format!(
                        "{}: key mask cannot change while entries are installed",
                        self.name()
                    )));
                }
                self.key_mask = Some(m.clone());
            }
            A::DynHashing(h) => self.hashing = h.clone(),
            A::ByteCountAdj(b) => self.byte_count_adjust = b.byte_count_adjust,
            A::IdleTable(t) => self.idle = t.clone(),
        }
        Ok(())
    }

    fn execute(&mut self, operation: &str) -> Result<()> {
        if !self.info.supports_operation(operation) {
            return Err(Status::invalid_argument(format!(
                "table {} does not support {}",
                self.name(),
                operation
            )));
        }
        if SYNC_OPERATIONS.contains(&operation) {
            for entry in self.entries.values_mut() {
                entry.shadow = entry.hw.clone();
            }
            debug!("{}: {} on {} entries", self.name(), operation, self.entries.len());
        }
        Ok(())
    }

    /// Shapes stored data for a read.
    fn present(&self, data: &pb::TableData, projection: Option<&pb::TableData>, target: &Target) -> pb::TableData {
        let mut data = data.clone();
        if let Some(projection) = projection.filter(|p| !p.fields.is_empty()) {
            data.fields
                .retain(|f| projection.fields.iter().any(|p| p.field_id == f.field_id));
        }
        if self.is_register() {
            let pipes = self.scope.pipes(target, self.num_pipes).len().max(1);
            for f in data.fields.iter_mut() {
                if let Some(data_field::Value::Stream(bytes)) = &f.value {
                    let repeated = self
                        .info
                        .data_fields
                        .iter()
                        .any(|d| d.preamble.id == f.field_id && d.repeated);
                    if repeated {
                        let v = codec::decode_int(bytes) as u32;
                        f.value = Some(data_field::Value::IntArrVal(data_field::IntArray {
                            val: vec![v; pipes],
                        }));
                    }
                }
            }
        }
        data
    }

    fn read_entries(&self, te: &pb::TableEntry, target: &Target) -> Result<Vec<pb::TableEntry>> {
        let instance = self.check_target(target)?;
        let flags = te.table_flags.clone().unwrap_or_default();
        let projection = te.data.as_ref();
        let entry = |key: Option<&Key>, data: &pb::TableData, default: bool| pb::TableEntry {
            table_id: self.info.id(),
            data: if flags.key_only {
                None
            } else {
                Some(self.present(data, projection, target))
            },
            is_default_entry: default,
            value: key.map(|k| table_entry::Value::Key(k.to_proto())),
            ..Default::default()
        };
        if te.is_default_entry {
            let data = self.default_data(target);
            return Ok(vec![entry(None, &data, true)]);
        }
        let pick = |e: &Entry| if flags.from_hw { e.hw.clone() } else { e.shadow.clone() };
        match &te.value {
            Some(table_entry::Value::Key(k)) => {
                let key = self.key(k)?;
                match self.entries.get(&(instance, key.clone())) {
                    Some(e) => Ok(vec![entry(Some(&key), &pick(e), false)]),
                    None => Err(Status::not_found(format!("{}: no such entry", self.name()))),
                }
            }
            Some(table_entry::Value::HandleId(_)) => Err(Status::unimplemented("entry handles")),
            None => Ok(self
                .entries
                .iter()
                .filter(|((i, _), _)| *i == instance)
                .map(|((_, k), e)| entry(Some(k), &pick(e), false))
                .collect()),
        }
    }

    fn read_attribute(&self, attribute: &table_attribute::Attribute) -> table_attribute::Attribute {
        use table_attribute::Attribute as A;
        match attribute {
            A::EntryScope(_) => A::EntryScope(self.scope.to_proto()),
            A::DynKeyMask(_) => A::DynKeyMask(self.key_mask.clone().unwrap_or_else(|| {
                pb::DynKeyMask {
                    fields: self
                        .info
                        .key_fields
                        .iter()
                        .filter(|f| f.preamble.id != MATCH_PRIORITY_ID)
                        .map(|f| pb::KeyField {
                            field_id: f.preamble.id,
                            match_type: Some(pb::key_field::MatchType::Exact(
                                pb::key_field::Exact {
                                    value: codec::all_ones(f.bit_width),
                                },
                            )),
                        })
                        .collect(),
                }
            })),
            A::DynHashing(_) => A::DynHashing(self.hashing.clone()),
            A::ByteCountAdj(_) => A::ByteCountAdj(pb::ByteCountAdj {
                byte_count_adjust: self.byte_count_adjust,
            }),
            A::IdleTable(_) => A::IdleTable(self.idle.clone()),
        }
    }

    pub(crate) fn record_hits(&mut self, target: &Target, key: &Key, packets: u64, bytes: u64) -> Result<()> {
        let instance = self.check_target(target)?;
        let key = key.clone().canonical(&self.info);
        let (pkts_id, bytes_id) = (self.field_id(COUNTER_PKTS), self.field_id(COUNTER_BYTES));
        let widths: Vec<(Option<u32>, u64)> = vec![(pkts_id, packets), (bytes_id, bytes)];
        let info = self.info.clone();
        let entry = self
            .entries
            .get_mut(&(instance, key))
            .ok_or_else(|| Status::not_found("no such entry"))?;
        for (id, n) in widths {
            if let Some(id) = id {
                let width = info
                    .data_fields
                    .iter()
                    .find(|f| f.preamble.id == id)
                    .map(|f| f.bit_width)
                    .unwrap_or(64);
                let total = field_int(&entry.hw, id) + n as u128;
                let bytes = codec::encode_int("counter", total, width)
                    .map_err(|e| Status::out_of_range(e.to_string()))?;
                set_field(&mut entry.hw, id, data_field::Value::Stream(bytes));
            }
        }
        Ok(())
    }

    /// Finds the entry `packet` hits in `target`'s instance.
    pub(crate) fn lookup(&self, target: &Target, packet: &Packet) -> Result<Hit> {
        let instance = self.check_target(target)?;
        let mask = self.key_mask.as_ref();
        let rank = |key: &Key| -> (u128, i64) {
            let priority = match key.get(MATCH_PRIORITY_ID) {
                Some(Match::Exact(p)) => codec::decode_int(p),
                _ => 0,
            };
            let prefix: i64 = key
                .fields()
                .iter()
                .map(|(_, m)| match m {
                    Match::Lpm { prefix_len, .. } => *prefix_len as i64,
                    _ => 0,
                })
                .sum();
            (priority, -prefix)
        };
        let best = self
            .entries
            .iter()
            .filter(|((i, k), _)| *i == instance && matches(&self.info, k, packet, mask))
            .min_by_key(|((_, k), _)| rank(k));
        Ok(match best {
            Some(((_, k), e)) => Hit {
                key: Some(k.clone()),
                data: e.hw.clone(),
            },
            None => Hit {
                key: None,
                data: self.default_data(target),
            },
        })
    }

    /// Sets hardware register values of one pipe.
    pub(crate) fn set_register(&mut self, target: &Target, key: &Key, field: &str, value: u32) -> Result<()> {
        let instance = self.check_target(target)?;
        let id = self
            .field_id(field)
            .ok_or_else(|| Status::not_found(format!("no field {}", field)))?;
        let key = key.clone().canonical(&self.info);
        let entry = self
            .entries
            .get_mut(&(instance, key))
            .ok_or_else(|| Status::not_found("no such entry"))?;
        set_field(
            &mut entry.hw,
            id,
            data_field::Value::Stream(value.to_be_bytes().to_vec()),
        );
        Ok(())
    }
}

/// An installed program.
#[derive(Clone, Debug)]
pub(crate) struct Pipeline {
    pub(crate) config: pb::ForwardingPipelineConfig,
    pub(crate) schema: Arc<Schema>,
    tables: HashMap<u32, TableState>,
}

impl Pipeline {
    pub(crate) fn new(config: pb::ForwardingPipelineConfig, num_pipes: u32) -> Result<Self> {
        let schema = Schema::parse(&config.p4_name, &config.bfruntime_info)
            .map_err(|e| Status::invalid_argument(format!("{}: {}", config.p4_name, e)))?;
        let tables = schema
            .tables
            .iter()
            .map(|t| (t.id(), TableState::new(t.clone(), num_pipes)))
            .collect();
        Ok(Pipeline {
            config,
            schema: Arc::new(schema),
            tables,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.config.p4_name
    }

    pub(crate) fn table(&self, id: u32) -> Result<&TableState> {
        self.tables
            .get(&id)
            .ok_or_else(|| Status::not_found(format!("{}: no table {}", self.name(), id)))
    }

    fn table_mut(&mut self, id: u32) -> Result<&mut TableState> {
        let name = self.config.p4_name.clone();
        self.tables
            .get_mut(&id)
            .ok_or_else(|| Status::not_found(format!("{}: no table {}", name, id)))
    }

    pub(crate) fn table_by_name(&self, name: &str) -> Result<&TableState> {
        let id = self
            .schema
            .table(name)
            .map_err(|e| Status::not_found(e.to_string()))?
            .id();
        self.table(id)
    }

    pub(crate) fn table_by_name_mut(&mut self, name: &str) -> Result<&mut TableState> {
        let id = self
            .schema
            .table(name)
            .map_err(|e| Status::not_found(e.to_string()))?
            .id();
        self.table_mut(id)
    }

    pub(crate) fn write(&mut self, kind: update::Type, entity: &pb::Entity, target: &Target) -> Result<()> {
        match &entity.entity {
            Some(entity::Entity::TableEntry(te)) => {
                self.table_mut(te.table_id)?.write_entry(kind, te, target)
            }
            Some(entity::Entity::TableAttribute(ta)) => {
                let attribute = ta
                    .attribute
                    .as_ref()
                    .ok_or_else(|| Status::invalid_argument("attribute missing"))?;
                self.table_mut(ta.table_id)?.write_attribute(attribute)
            }
            Some(entity::Entity::TableOperation(op)) => self
                .table_mut(op.table_id)?
                .execute(&op.table_operations_type),
            Some(entity::Entity::TableUsage(_)) => {
                Err(Status::invalid_argument("table usage is read-only"))
            }
            None => Err(Status::invalid_argument("empty entity")),
        }
    }

    /// Reads one requested entity.  A missing entry is a per-entity NOT_FOUND.
    pub(crate) fn read(&self, entity: &pb::Entity, target: &Target) -> Result<Vec<pb::Entity>> {
        let wrap = |e: entity::Entity| pb::Entity { entity: Some(e) };
        match &entity.entity {
            Some(entity::Entity::TableEntry(te)) => Ok(self
                .table(te.table_id)?
                .read_entries(te, target)?
                .into_iter()
                .map(|te| wrap(entity::Entity::TableEntry(te)))
                .collect()),
            Some(entity::Entity::TableUsage(u)) => {
                let table = self.table(u.table_id)?;
                let instance = table.check_target(target)?;
                let usage = table.entries.keys().filter(|(i, _)| *i == instance).count();
                Ok(vec![wrap(entity::Entity::TableUsage(pb::TableUsage {
                    table_id: u.table_id,
                    usage: usage as u32,
                    table_flags: None,
                }))])
            }
            Some(entity::Entity::TableAttribute(ta)) => {
                let table = self.table(ta.table_id)?;
                let attribute = ta
                    .attribute
                    .as_ref()
                    .ok_or_else(|| Status::invalid_argument("attribute missing"))?;
                Ok(vec![wrap(entity::Entity::TableAttribute(pb::TableAttribute {
                    table_id: ta.table_id,
                    attribute: Some(table.read_attribute(attribute)),
                }))])
            }
            Some(entity::Entity::TableOperation(_)) | None => {
                Err(Status::invalid_argument("entity cannot be read"))
            }
        }
    }

    pub(crate) fn entry_count(&self) -> usize {
        self.tables.values().map(|t| t.entries.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"{
      "tables": [
        {"name": "pipe.SwitchIngress.forward", "id": 1, "table_type": "MatchAction_Direct",
         "key": [
           {"id": 1, "name": "hdr.ethernet.dst_addr", "match_type": "Ternary",
            "type": {"type": "bytes", "width": 48}}
         ],
         "action_specs": [
           {"id": 10, "name": "SwitchIngress.hit",
            "data": [{"id": 1, "name": "port", "type": {"type": "bytes", "width": 9}}]}
         ],
         "attributes": ["EntryScope", "DynamicKeyMask"]}
      ]
    }"#;

    fn ternary(value: u64, mask: u64, priority: u32) -> Key {
        let key = pb::TableKey {
            fields: vec![
                pb::KeyField {
                    field_id: 1,
                    match_type: Some(pb::key_field::MatchType::Ternary(pb::key_field::Ternary {
                        value: value.to_be_bytes()[2..].to_vec(),
                        mask: mask.to_be_bytes()[2..].to_vec(),
                    })),
                },
                pb::KeyField {
                    field_id: MATCH_PRIORITY_ID,
                    match_type: Some(pb::key_field::MatchType::Exact(pb::key_field::Exact {
                        value: priority.to_be_bytes().to_vec(),
                    })),
                },
            ],
        };
        Key::from_proto(1, &key)
    }

    fn insert(p: &mut Pipeline, key: &Key, port: u8) -> Result<()> {
        let entity = pb::Entity {
            entity: Some(entity::Entity::TableEntry(pb::TableEntry {
                table_id: 1,
                data: Some(pb::TableData {
                    action_id: 10,
                    fields: vec![pb::DataField {
                        field_id: 1,
                        value: Some(data_field::Value::Stream(vec![0, port])),
                    }],
                }),
                value: Some(table_entry::Value::Key(key.to_proto())),
                ..Default::default()
            })),
        };
        p.write(update::Type::Insert, &entity, &Target::new(0))
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(pb::ForwardingPipelineConfig {
            p4_name: "tna_ternary".into(),
            bfruntime_info: SCHEMA.as_bytes().to_vec(),
            profiles: Vec::new(),
        }, 4)
        .unwrap()
    }

    #[test]
    fn lowest_priority_value_wins() {
        let mut p = pipeline();
        insert(&mut p, &ternary(0x222222222222, 0xffffffffffff, 5), 1).unwrap();
        insert(&mut p, &ternary(0x222222222200, 0xffffffffff00, 1), 2).unwrap();
        let table = p.table(1).unwrap();
        let packet = |mac: u64| vec![(1, mac.to_be_bytes()[2..].to_vec())];
        let hit = table.lookup(&Target::new(0), &packet(0x222222222222)).unwrap();
        assert_eq!(hit.data.fields[0].value, Some(data_field::Value::Stream(vec![0, 2])));
        let miss = table.lookup(&Target::new(0), &packet(0x333333333333)).unwrap();
        assert_eq!(miss.key, None);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut p = pipeline();
        let key = ternary(0x1, 0xff, 0);
        insert(&mut p, &key, 1).unwrap();
        assert_eq!(insert(&mut p, &key, 2).unwrap_err().code(), tonic::Code::AlreadyExists);
        assert_eq!(p.entry_count(), 1);
    }
}
