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

//! Program schemas parsed from `bfrt.json`, and the registry that caches them.
//!
//! A [`Schema`] is immutable once parsed.  Client-side format hints live in an [`Overlay`]
//! layered on top of it; annotating a field swaps in a new overlay and never touches the schema.

use itertools::Itertools;

use serde::Deserialize;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::{self, Display};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::codec::{Annotation, Format, TypeClass};
use crate::error::{Error, Result};

/// Id of the `$MATCH_PRIORITY` key field.
pub const MATCH_PRIORITY_ID: u32 = 65537;
pub const MATCH_PRIORITY: &str = "$MATCH_PRIORITY";

/// Field annotation declaring the number of significant bits of a left-aligned value.
pub const PAYLOAD_WIDTH: &str = "$payload_width";

#[derive(Deserialize)]
struct RawProgram {
    #[serde(default)]
    tables: Vec<RawTable>,
    #[serde(default)]
    learn_filters: Vec<RawLearnFilter>,
}

#[derive(Deserialize)]
struct RawAnnotation {
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Deserialize)]
struct RawType {
    #[serde(rename = "type")]
    kind: String,
    width: Option<u32>,
    #[serde(default)]
    choices: Vec<String>,
}

#[derive(Deserialize)]
struct RawField {
    id: u32,
    name: String,
    #[serde(default)]
    repeated: bool,
    #[serde(default)]
    mandatory: bool,
    #[serde(default)]
    read_only: bool,
    #[serde(default)]
    annotations: Vec<RawAnnotation>,
    #[serde(rename = "type")]
    ty: Option<RawType>,
}

#[derive(Deserialize)]
struct RawKeyField {
    id: u32,
    name: String,
    match_type: String,
    #[serde(default)]
    mandatory: bool,
    #[serde(default)]
    annotations: Vec<RawAnnotation>,
    #[serde(rename = "type")]
    ty: RawType,
}

#[derive(Deserialize)]
struct RawAction {
    id: u32,
    name: String,
    #[serde(default)]
    action_scope: Option<String>,
    #[serde(default)]
    annotations: Vec<RawAnnotation>,
    #[serde(default)]
    data: Vec<RawField>,
}

#[derive(Deserialize)]
struct RawDataEntry {
    #[serde(default)]
    mandatory: bool,
    #[serde(default)]
    read_only: bool,
    singleton: Option<RawField>,
}

#[derive(Deserialize)]
struct RawTable {
    name: String,
    id: u32,
    #[serde(default)]
    table_type: String,
    #[serde(default)]
    size: u32,
    #[serde(default)]
    annotations: Vec<RawAnnotation>,
    #[serde(default)]
    has_const_default_action: bool,
    #[serde(default)]
    key: Vec<RawKeyField>,
    #[serde(default)]
    action_specs: Vec<RawAction>,
    #[serde(default)]
    data: Vec<RawDataEntry>,
    #[serde(default)]
    supported_operations: Vec<String>,
    #[serde(default)]
    attributes: Vec<String>,
}

#[derive(Deserialize)]
struct RawLearnFilter {
    name: String,
    id: u32,
    #[serde(default)]
    annotations: Vec<RawAnnotation>,
    #[serde(default)]
    fields: Vec<RawField>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Annotations(BTreeMap<String, String>);

impl Annotations {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<RawAnnotation>> for Annotations {
    fn from(v: Vec<RawAnnotation>) -> Self {
        Annotations(v.into_iter().map(|a| (a.name, a.value)).collect())
    }
}

impl Display for Annotations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "@{}", k)?;
            if !v.is_empty() {
                write!(f, "({})", v.escape_debug())?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct Preamble {
    pub id: u32,
    pub name: String,
    pub annotations: Annotations,
}

impl Preamble {
    fn new(id: u32, name: String, annotations: Vec<RawAnnotation>) -> Self {
        Preamble {
            id,
            name,
            annotations: annotations.into(),
        }
    }

    fn payload_width(&self) -> Result<Option<u32>> {
        self.annotations
            .get(PAYLOAD_WIDTH)
            .map(|w| match w.parse::<u32>() {
                Ok(width) if width > 0 => Ok(width),
                _ => Err(Error::Schema(format!(
                    "field {}: bad {} {:?}",
                    self.name, PAYLOAD_WIDTH, w
                ))),
            })
            .transpose()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MatchType {
    Exact,
    Ternary,
    Lpm,
    Range,
    Optional,
}

impl MatchType {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "Exact" => Ok(MatchType::Exact),
            "Ternary" => Ok(MatchType::Ternary),
            "LPM" | "Lpm" => Ok(MatchType::Lpm),
            "Range" => Ok(MatchType::Range),
            "Optional" => Ok(MatchType::Optional),
            _ => Err(Error::Schema(format!("unknown match type {}", s))),
        }
    }

    /// True for match kinds whose entries may overlap and therefore need a priority.
    pub fn overlaps(self) -> bool {
        matches!(self, MatchType::Ternary | MatchType::Range | MatchType::Optional)
    }
}

impl Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchType::Exact => "exact",
            MatchType::Ternary => "ternary",
            MatchType::Lpm => "LPM",
            MatchType::Range => "range",
            MatchType::Optional => "optional",
        };
        write!(f, "{}", s)
    }
}

fn parse_type(field: &str, ty: Option<&RawType>) -> Result<(TypeClass, u32)> {
    let ty = match ty {
        Some(ty) => ty,
        None => return Err(Error::Schema(format!("field {} has no type", field))),
    };
    match ty.kind.as_str() {
        "bytes" => match ty.width {
            Some(width) if width > 0 => Ok((TypeClass::Bytes, width)),
            _ => Err(Error::Schema(format!("field {}: bytes without width", field))),
        },
        "uint8" => Ok((TypeClass::Int, 8)),
        "uint16" => Ok((TypeClass::Int, 16)),
        "uint32" | "int32" => Ok((TypeClass::Int, 32)),
        "uint64" | "int64" => Ok((TypeClass::Int, 64)),
        "bool" => Ok((TypeClass::Bool, 1)),
        "string" => Ok((TypeClass::Str, 0)),
        "float" => Ok((TypeClass::Float, 32)),
        other => Err(Error::Schema(format!("field {}: unknown type {}", field, other))),
    }
}

#[derive(Clone, Debug)]
pub struct KeyField {
    pub preamble: Preamble,
    pub bit_width: u32,
    pub match_type: MatchType,
    pub mandatory: bool,
    pub class: TypeClass,
    pub payload_width: Option<u32>,
}

impl KeyField {
    fn new(raw: RawKeyField) -> Result<Self> {
        let (class, bit_width) = parse_type(&raw.name, Some(&raw.ty))?;
        let preamble = Preamble::new(raw.id, raw.name, raw.annotations);
        Ok(KeyField {
            payload_width: preamble.payload_width()?,
            match_type: MatchType::parse(&raw.match_type)?,
            mandatory: raw.mandatory,
            preamble,
            bit_width,
            class,
        })
    }

    fn match_priority() -> Self {
        KeyField {
            preamble: Preamble {
                id: MATCH_PRIORITY_ID,
                name: MATCH_PRIORITY.into(),
                annotations: Annotations::default(),
            },
            bit_width: 32,
            match_type: MatchType::Exact,
            mandatory: false,
            class: TypeClass::Int,
            payload_width: None,
        }
    }

    pub fn format(&self, annotation: Option<Annotation>) -> Format {
        Format {
            bit_width: self.bit_width,
            class: self.class,
            repeated: false,
            annotation,
            payload_width: self.payload_width,
        }
    }
}

impl Display for KeyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "field {}: bit<{}> {}-match",
            self.preamble.name, self.bit_width, self.match_type
        )?;
        if !self.preamble.annotations.is_empty() {
            write!(f, " {}", self.preamble.annotations)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct DataField {
    pub preamble: Preamble,
    pub bit_width: u32,
    pub class: TypeClass,
    pub repeated: bool,
    pub read_only: bool,
    pub mandatory: bool,
    pub choices: Vec<String>,
    pub payload_width: Option<u32>,
}

impl DataField {
    fn new(raw: RawField, outer_mandatory: bool, outer_read_only: bool) -> Result<Self> {
        let (class, bit_width) = parse_type(&raw.name, raw.ty.as_ref())?;
        let choices = raw.ty.map(|t| t.choices).unwrap_or_default();
        let preamble = Preamble::new(raw.id, raw.name, raw.annotations);
        Ok(DataField {
            payload_width: preamble.payload_width()?,
            preamble,
            bit_width,
            class,
            repeated: raw.repeated,
            read_only: raw.read_only || outer_read_only,
            mandatory: raw.mandatory || outer_mandatory,
            choices,
        })
    }

    pub fn format(&self, annotation: Option<Annotation>) -> Format {
        Format {
            bit_width: self.bit_width,
            class: self.class,
            repeated: self.repeated,
            annotation,
            payload_width: self.payload_width,
        }
    }
}

impl Display for DataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.preamble.name)?;
        match self.class {
            TypeClass::Int | TypeClass::Bytes => write!(f, "bit<{}>", self.bit_width)?,
            TypeClass::Bool => write!(f, "bool")?,
            TypeClass::Str => write!(f, "string")?,
            TypeClass::Float => write!(f, "float")?,
        }
        if self.repeated {
            write!(f, "[]")?;
        }
        if !self.choices.is_empty() {
            write!(f, " {{{}}}", self.choices.join(", "))?;
        }
        if self.read_only {
            write!(f, " read-only")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct ActionInfo {
    pub preamble: Preamble,
    pub params: Vec<DataField>,
    pub may_be_default: bool, // Allowed as the default action?
    pub may_be_entry: bool,   // Allowed as an entry's action?
}

impl ActionInfo {
    fn new(raw: RawAction) -> Result<Self> {
        let scope = raw.action_scope.unwrap_or_else(|| "TableAndDefault".into());
        let (may_be_default, may_be_entry) = match scope.as_str() {
            "TableAndDefault" => (true, true),
            "TableOnly" => (false, true),
            "DefaultOnly" => (true, false),
            other => {
                return Err(Error::Schema(format!(
                    "action {}: unknown action scope {}",
                    raw.name, other
                )))
            }
        };
        Ok(ActionInfo {
            params: raw
                .data
                .into_iter()
                .map(|f| DataField::new(f, false, false))
                .collect::<Result<_>>()?,
            preamble: Preamble::new(raw.id, raw.name, raw.annotations),
            may_be_default,
            may_be_entry,
        })
    }

    pub fn param(&self, name: &str) -> Result<&DataField> {
        resolve(
            "action parameter",
            name,
            self.params.iter().map(|p| (p.preamble.name.as_str(), p)),
        )
    }
}

impl Display for ActionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.may_be_entry {
            write!(f, "default-only ")?;
        } else if !self.may_be_default {
            write!(f, "not-default ")?;
        }
        write!(f, "action {}(", self.preamble.name)?;
        for (p_index, p) in self.params.iter().enumerate() {
            if p_index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, ")")
    }
}

#[derive(Clone, Debug)]
pub struct TableInfo {
    pub preamble: Preamble,
    pub table_type: String,
    pub size: u32,
    pub key_fields: Vec<KeyField>,
    pub actions: Vec<ActionInfo>,
    /// Action-independent data fields.
    pub data_fields: Vec<DataField>,
    pub attributes: Vec<String>,
    pub operations: Vec<String>,
    pub has_const_default_action: bool,
}

impl TableInfo {
    fn new(raw: RawTable) -> Result<Self> {
        let mut key_fields = raw
            .key
            .into_iter()
            .map(KeyField::new)
            .collect::<Result<Vec<_>>>()?;
        if key_fields.iter().any(|k| k.match_type.overlaps())
            && !key_fields.iter().any(|k| k.preamble.name == MATCH_PRIORITY)
        {
            key_fields.push(KeyField::match_priority());
        }
        let data_fields = raw
            .data
            .into_iter()
            .filter_map(|d| {
                d.singleton
                    .map(|f| DataField::new(f, d.mandatory, d.read_only))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(TableInfo {
            actions: raw
                .action_specs
                .into_iter()
                .map(ActionInfo::new)
                .collect::<Result<_>>()?,
            preamble: Preamble::new(raw.id, raw.name, raw.annotations),
            table_type: raw.table_type,
            size: raw.size,
            key_fields,
            data_fields,
            attributes: raw.attributes,
            operations: raw.supported_operations,
            has_const_default_action: raw.has_const_default_action,
        })
    }

    pub fn id(&self) -> u32 {
        self.preamble.id
    }

    pub fn name(&self) -> &str {
        &self.preamble.name
    }

    /// Whether a default entry may be set on this table.
    pub fn default_allowed(&self) -> bool {
        !self.has_const_default_action
            && (self.actions.is_empty() || self.actions.iter().any(|a| a.may_be_default))
    }

    pub fn key_field(&self, name: &str) -> Result<&KeyField> {
        resolve(
            "key field",
            name,
            self.key_fields.iter().map(|k| (k.preamble.name.as_str(), k)),
        )
    }

    pub fn key_field_by_id(&self, id: u32) -> Option<&KeyField> {
        self.key_fields.iter().find(|k| k.preamble.id == id)
    }

    pub fn action(&self, name: &str) -> Result<&ActionInfo> {
        resolve(
            "action",
            name,
            self.actions.iter().map(|a| (a.preamble.name.as_str(), a)),
        )
    }

    pub fn action_by_id(&self, id: u32) -> Option<&ActionInfo> {
        self.actions.iter().find(|a| a.preamble.id == id)
    }

    /// Finds a data field by name among `action`'s parameters and the action-independent
    /// fields.  Returns the id of the action that owns the field, if any.
    pub fn data_field<'a>(
        &'a self,
        action: Option<&'a ActionInfo>,
        name: &str,
    ) -> Result<(Option<u32>, &'a DataField)> {
        let params = action
            .into_iter()
            .flat_map(|a| a.params.iter().map(move |p| (Some(a.preamble.id), p)));
        let common = self.data_fields.iter().map(|f| (None, f));
        resolve(
            "data field",
            name,
            params
                .chain(common)
                .map(|(owner, f)| (f.preamble.name.as_str(), (owner, f))),
        )
    }

    /// Looks up a data field by id, first among `action`'s parameters.
    pub fn data_field_by_id(&self, action: Option<u32>, id: u32) -> Option<(Option<u32>, &DataField)> {
        action
            .and_then(|a| self.action_by_id(a))
            .and_then(|a| {
                a.params
                    .iter()
                    .find(|p| p.preamble.id == id)
                    .map(|p| (Some(a.preamble.id), p))
            })
            .or_else(|| {
                self.data_fields
                    .iter()
                    .find(|f| f.preamble.id == id)
                    .map(|f| (None, f))
            })
    }

    /// Finds a data field when no action is named.  Action-independent fields come first; an
    /// action parameter is found only when a single action owns a parameter of that name.
    pub(crate) fn param_owner(&self, name: &str) -> Result<(Option<u32>, &DataField)> {
        match resolve(
            "data field",
            name,
            self.data_fields.iter().map(|f| (f.preamble.name.as_str(), f)),
        ) {
            Ok(f) => return Ok((None, f)),
            Err(Error::UnknownName { .. }) => (),
            Err(e) => return Err(e),
        }
        let (owner, field) = resolve(
            "data field",
            name,
            self.actions
                .iter()
                .flat_map(|a| a.params.iter().map(move |p| (Some(a.preamble.id), p)))
                .map(|(owner, f)| (f.preamble.name.as_str(), (owner, f))),
        )?;
        let owners: Vec<String> = self
            .actions
            .iter()
            .filter(|a| a.params.iter().any(|p| p.preamble.name == field.preamble.name))
            .map(|a| format!("{}.{}", a.preamble.name, field.preamble.name))
            .collect();
        if owners.len() > 1 {
            return Err(Error::AmbiguousName {
                kind: "data field",
                name: name.into(),
                candidates: owners,
            });
        }
        Ok((owner, field))
    }

    pub fn has_priority(&self) -> bool {
        self.key_field_by_id(MATCH_PRIORITY_ID).is_some()
    }

    pub fn supports_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a == name)
    }

    pub fn supports_operation(&self, name: &str) -> bool {
        self.operations.iter().any(|o| o == name)
    }
}

impl Display for TableInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table {}:", self.preamble.name)?;
        if !self.table_type.is_empty() {
            write!(f, "\ttype: {}", self.table_type)?;
        }
        for kf in &self.key_fields {
            write!(f, "\t{}", kf)?;
        }
        for a in &self.actions {
            write!(f, "\t{}", a)?;
        }
        for df in &self.data_fields {
            write!(f, "\tdata {}", df)?;
        }
        if self.size > 0 {
            write!(f, "\tsize: {}", self.size)?;
        }
        if !self.attributes.is_empty() {
            write!(f, "\tattributes: {}", self.attributes.iter().sorted().join(", "))?;
        }
        if !self.operations.is_empty() {
            write!(f, "\toperations: {}", self.operations.iter().sorted().join(", "))?;
        }
        if self.has_const_default_action {
            write!(f, "\tconst default action")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct LearnFilter {
    pub preamble: Preamble,
    pub fields: Vec<DataField>,
}

impl LearnFilter {
    fn new(raw: RawLearnFilter) -> Result<Self> {
        Ok(LearnFilter {
            fields: raw
                .fields
                .into_iter()
                .map(|f| DataField::new(f, false, false))
                .collect::<Result<_>>()?,
            preamble: Preamble::new(raw.id, raw.name, raw.annotations),
        })
    }

    pub fn id(&self) -> u32 {
        self.preamble.id
    }

    pub fn field(&self, name: &str) -> Result<&DataField> {
        resolve(
            "learn field",
            name,
            self.fields.iter().map(|f| (f.preamble.name.as_str(), f)),
        )
    }

    pub fn field_by_id(&self, id: u32) -> Option<&DataField> {
        self.fields.iter().find(|f| f.preamble.id == id)
    }
}

impl Display for LearnFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "learn filter {}:", self.preamble.name)?;
        for field in &self.fields {
            write!(f, "\t{}", field)?;
        }
        Ok(())
    }
}

/// True if `full` is `name` or ends in `.name`.
fn name_matches(full: &str, name: &str) -> bool {
    full == name
        || (full.len() > name.len()
            && full.ends_with(name)
            && full.as_bytes()[full.len() - name.len() - 1] == b'.')
}

/// Resolves `name` among `candidates`, accepting any dot-separated suffix of a full name as
/// long as it is unambiguous.  An exact full-name match always wins.
pub(crate) fn resolve<'a, T: Copy>(
    kind: &'static str,
    name: &str,
    candidates: impl Iterator<Item = (&'a str, T)>,
) -> Result<T> {
    let matches: Vec<(&str, T)> = candidates.filter(|(full, _)| name_matches(full, name)).collect();
    if let Some((_, t)) = matches.iter().find(|(full, _)| *full == name) {
        return Ok(*t);
    }
    match matches.len() {
        0 => Err(Error::unknown(kind, name)),
        1 => Ok(matches[0].1),
        _ => Err(Error::AmbiguousName {
            kind,
            name: name.into(),
            candidates: matches.iter().map(|(full, _)| full.to_string()).collect(),
        }),
    }
}

/// The parsed schema of one program.
#[derive(Debug)]
pub struct Schema {
    pub name: String,
    pub blob: Vec<u8>,
    pub tables: Vec<Arc<TableInfo>>,
    pub learn_filters: Vec<Arc<LearnFilter>>,
}

impl Schema {
    pub fn parse(name: &str, blob: &[u8]) -> Result<Self> {
        let raw: RawProgram = serde_json::from_slice(blob)?;
        let tables = raw
            .tables
            .into_iter()
            .map(|t| TableInfo::new(t).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        let learn_filters = raw
            .learn_filters
            .into_iter()
            .map(|l| LearnFilter::new(l).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        let mut ids = HashSet::new();
        if let Some(t) = tables.iter().find(|t| !ids.insert(t.id())) {
            return Err(Error::Schema(format!(
                "program {}: duplicate table id {}",
                name,
                t.id()
            )));
        }
        Ok(Schema {
            name: name.into(),
            blob: blob.to_vec(),
            tables,
            learn_filters,
        })
    }

    pub fn table(&self, name: &str) -> Result<&Arc<TableInfo>> {
        resolve(
            "table",
            name,
            self.tables.iter().map(|t| (t.preamble.name.as_str(), t)),
        )
    }

    pub fn table_by_id(&self, id: u32) -> Option<&Arc<TableInfo>> {
        self.tables.iter().find(|t| t.id() == id)
    }

    pub fn learn_filter(&self, name: &str) -> Result<&Arc<LearnFilter>> {
        resolve(
            "learn filter",
            name,
            self.learn_filters.iter().map(|l| (l.preamble.name.as_str(), l)),
        )
    }

    pub fn learn_filter_by_id(&self, id: u32) -> Option<&Arc<LearnFilter>> {
        self.learn_filters.iter().find(|l| l.id() == id)
    }
}

/// Where an annotation applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldSite {
    Key { table: u32, field: u32 },
    Data { table: u32, action: Option<u32>, field: u32 },
    Learn { filter: u32, field: u32 },
}

/// Client-side format hints layered over a schema.
#[derive(Clone, Debug, Default)]
pub struct Overlay(HashMap<FieldSite, Annotation>);

impl Overlay {
    /// Returns a copy of this overlay with `site` annotated.
    pub fn with(&self, site: FieldSite, annotation: Annotation) -> Overlay {
        let mut fields = self.0.clone();
        fields.insert(site, annotation);
        Overlay(fields)
    }

    pub fn get(&self, site: FieldSite) -> Option<Annotation> {
        self.0.get(&site).copied()
    }
}

/// A snapshot of a loaded program: its schema plus the annotations current when it was taken.
#[derive(Clone, Debug)]
pub struct Program {
    schema: Arc<Schema>,
    overlay: Arc<Overlay>,
}

impl Program {
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn table(&self, name: &str) -> Result<&Arc<TableInfo>> {
        self.schema.table(name)
    }

    pub fn learn_filter(&self, name: &str) -> Result<&Arc<LearnFilter>> {
        self.schema.learn_filter(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Arc<TableInfo>> {
        self.schema.tables.iter()
    }

    pub fn key_format(&self, table: &TableInfo, field: &KeyField) -> Format {
        field.format(self.overlay.get(FieldSite::Key {
            table: table.id(),
            field: field.preamble.id,
        }))
    }

    pub fn data_format(&self, table: &TableInfo, action: Option<u32>, field: &DataField) -> Format {
        field.format(self.overlay.get(FieldSite::Data {
            table: table.id(),
            action,
            field: field.preamble.id,
        }))
    }

    pub fn learn_format(&self, filter: &LearnFilter, field: &DataField) -> Format {
        field.format(self.overlay.get(FieldSite::Learn {
            filter: filter.id(),
            field: field.preamble.id,
        }))
    }
}

/// Schemas of the loaded programs, keyed by program name.  Shared between sessions.
#[derive(Debug, Default)]
pub struct Registry {
    programs: RwLock<HashMap<String, Program>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `blob` as the schema of `name`, replacing any schema previously loaded under that
    /// name.  Annotations on the replaced schema are discarded.
    pub fn load(&self, name: &str, blob: &[u8]) -> Result<Program> {
        let program = Program {
            schema: Arc::new(Schema::parse(name, blob)?),
            overlay: Arc::default(),
        };
        debug!(
            "loaded program {} ({} tables, {} learn filters)",
            name,
            program.schema.tables.len(),
            program.schema.learn_filters.len()
        );
        self.programs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), program.clone());
        Ok(program)
    }

    pub fn unload(&self, name: &str) -> Option<Program> {
        self.programs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.programs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.programs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .sorted()
            .cloned()
            .collect()
    }

    pub fn get(&self, name: &str) -> Result<Program> {
        self.programs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| Error::unknown("program", name))
    }

    pub fn get_table(&self, program: &str, name: &str) -> Result<Arc<TableInfo>> {
        self.get(program)?.table(name).cloned()
    }

    pub fn get_learn(&self, program: &str, name: &str) -> Result<Arc<LearnFilter>> {
        self.get(program)?.learn_filter(name).cloned()
    }

    fn annotate<F>(&self, program: &str, site: F, annotation: Annotation) -> Result<()>
    where
        F: FnOnce(&Schema) -> Result<FieldSite>,
    {
        let mut programs = self.programs.write().unwrap_or_else(PoisonError::into_inner);
        let p = programs
            .get_mut(program)
            .ok_or_else(|| Error::unknown("program", program))?;
        let site = site(&p.schema)?;
        debug!("program {}: annotating {:?} as {}", program, site, annotation);
        p.overlay = Arc::new(p.overlay.with(site, annotation));
        Ok(())
    }

    pub fn annotate_key(
        &self,
        program: &str,
        table: &str,
        field: &str,
        annotation: Annotation,
    ) -> Result<()> {
        self.annotate(
            program,
            |schema| {
                let t = schema.table(table)?;
                let k = t.key_field(field)?;
                Ok(FieldSite::Key {
                    table: t.id(),
                    field: k.preamble.id,
                })
            },
            annotation,
        )
    }

    pub fn annotate_data(
        &self,
        program: &str,
        table: &str,
        action: Option<&str>,
        field: &str,
        annotation: Annotation,
    ) -> Result<()> {
        self.annotate(
            program,
            |schema| {
                let t = schema.table(table)?;
                let (owner, f) = match action {
                    Some(a) => t.data_field(Some(t.action(a)?), field)?,
                    None => t.param_owner(field)?,
                };
                Ok(FieldSite::Data {
                    table: t.id(),
                    action: owner,
                    field: f.preamble.id,
                })
            },
            annotation,
        )
    }

    pub fn annotate_learn(
        &self,
        program: &str,
        filter: &str,
        field: &str,
        annotation: Annotation,
    ) -> Result<()> {
        self.annotate(
            program,
            |schema| {
                let l = schema.learn_filter(filter)?;
                let f = l.field(field)?;
                Ok(FieldSite::Learn {
                    filter: l.id(),
                    field: f.preamble.id,
                })
            },
            annotation,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"{
      "schema_version": "1.0.0",
      "tables": [
        {
          "name": "pipe.SwitchIngress.forward",
          "id": 1001,
          "table_type": "MatchAction_Direct",
          "size": 1024,
          "key": [
            {"id": 1, "name": "hdr.ethernet.dst_addr", "match_type": "Ternary",
             "type": {"type": "bytes", "width": 48}}
          ],
          "action_specs": [
            {"id": 11, "name": "SwitchIngress.hit", "action_scope": "TableOnly",
             "data": [{"id": 1, "name": "port", "type": {"type": "bytes", "width": 9}}]},
            {"id": 12, "name": "SwitchIngress.miss", "action_scope": "DefaultOnly", "data": []}
          ],
          "data": [],
          "attributes": ["EntryScope", "DynamicKeyMask"],
          "supported_operations": []
        },
        {
          "name": "pipe.SwitchEgress.forward",
          "id": 1002,
          "key": [
            {"id": 1, "name": "hdr.ethernet.dst_addr", "match_type": "Exact",
             "type": {"type": "bytes", "width": 48}}
          ]
        },
        {
          "name": "pipe.SwitchIngress.ipv4_lpm",
          "id": 1003,
          "key": [
            {"id": 1, "name": "hdr.ipv4.dst_addr", "match_type": "LPM",
             "type": {"type": "bytes", "width": 32}}
          ],
          "data": [
            {"mandatory": false, "read_only": false,
             "singleton": {"id": 65553, "name": "$COUNTER_SPEC_BYTES", "type": {"type": "uint64"}}}
          ]
        }
      ],
      "learn_filters": [
        {"name": "pipe.SwitchIngressDeparser.digest_a", "id": 2001,
         "fields": [{"id": 1, "name": "src_addr", "type": {"type": "bytes", "width": 48}}]}
      ]
    }"#;

    #[test]
    fn shorthand_resolution() {
        let registry = Registry::new();
        registry.load("tna_ternary", SCHEMA.as_bytes()).unwrap();

        let t = registry.get_table("tna_ternary", "SwitchIngress.forward").unwrap();
        assert_eq!(t.id(), 1001);
        let t = registry.get_table("tna_ternary", "ipv4_lpm").unwrap();
        assert_eq!(t.id(), 1003);
        assert!(matches!(
            registry.get_table("tna_ternary", "forward"),
            Err(Error::AmbiguousName { .. })
        ));
        assert!(matches!(
            registry.get_table("tna_ternary", "ward"),
            Err(Error::UnknownName { .. })
        ));
        assert!(registry.get_learn("tna_ternary", "digest_a").is_ok());
        assert!(registry.get("nonexistent").unwrap_err().is_schema_error());
    }

    #[test]
    fn match_priority_is_synthesized() {
        let registry = Registry::new();
        let program = registry.load("tna_ternary", SCHEMA.as_bytes()).unwrap();
        let forward = program.table("SwitchIngress.forward").unwrap();
        assert!(forward.has_priority());
        assert_eq!(forward.key_field(MATCH_PRIORITY).unwrap().bit_width, 32);
        let egress = program.table("SwitchEgress.forward").unwrap();
        assert!(!egress.has_priority());
    }

    #[test]
    fn action_scope_and_data_fields() {
        let schema = Schema::parse("p", SCHEMA.as_bytes()).unwrap();
        let forward = schema.table("SwitchIngress.forward").unwrap();
        let hit = forward.action("hit").unwrap();
        assert!(hit.may_be_entry && !hit.may_be_default);
        assert!(forward.action("miss").unwrap().may_be_default);
        assert!(forward.default_allowed());
        let (owner, port) = forward.data_field(Some(hit), "port").unwrap();
        assert_eq!((owner, port.bit_width), (Some(11), 9));

        let lpm = schema.table("ipv4_lpm").unwrap();
        let (owner, bytes) = lpm.data_field(None, "$COUNTER_SPEC_BYTES").unwrap();
        assert_eq!((owner, bytes.bit_width), (None, 64));
        assert_eq!(
            format!("{}", forward.key_fields[0]),
            "field hdr.ethernet.dst_addr: bit<48> ternary-match"
        );
    }

    #[test]
    fn annotations_are_overlays() {
        let registry = Registry::new();
        let before = registry.load("tna_ternary", SCHEMA.as_bytes()).unwrap();
        registry
            .annotate_key("tna_ternary", "SwitchIngress.forward", "dst_addr", Annotation::Mac)
            .unwrap();
        registry
            .annotate_learn("tna_ternary", "digest_a", "src_addr", Annotation::Mac)
            .unwrap();
        let after = registry.get("tna_ternary").unwrap();

        let table = after.table("SwitchIngress.forward").unwrap();
        let field = table.key_field("dst_addr").unwrap();
        assert_eq!(after.key_format(table, field).annotation, Some(Annotation::Mac));
        // The earlier snapshot and the schema itself are untouched.
        assert_eq!(before.key_format(table, field).annotation, None);
        assert!(Arc::ptr_eq(before.schema(), after.schema()));

        assert!(registry
            .annotate_data("tna_ternary", "SwitchIngress.forward", Some("hit"), "nope", Annotation::Mac)
            .is_err());
    }

    #[test]
    fn zero_payload_width_is_rejected() {
        let blob = br#"{"tables": [{
          "name": "pipe.SwitchIngress.md", "id": 1,
          "key": [{"id": 1, "name": "meta", "match_type": "Exact",
                   "type": {"type": "bytes", "width": 128},
                   "annotations": [{"name": "$payload_width", "value": "0"}]}]
        }]}"#;
        assert!(matches!(Schema::parse("p", blob), Err(Error::Schema(_))));
    }

    #[test]
    fn shared_parameter_names_need_an_action() {
        let blob = br#"{"tables": [{
          "name": "pipe.SwitchIngress.route", "id": 1,
          "key": [{"id": 1, "name": "dst", "match_type": "Exact",
                   "type": {"type": "bytes", "width": 32}}],
          "action_specs": [
            {"id": 11, "name": "SwitchIngress.send", "data": [
              {"id": 1, "name": "port", "type": {"type": "bytes", "width": 9}}]},
            {"id": 12, "name": "SwitchIngress.mirror", "data": [
              {"id": 1, "name": "port", "type": {"type": "bytes", "width": 9}},
              {"id": 2, "name": "session", "type": {"type": "bytes", "width": 10}}]}
          ],
          "data": [
            {"mandatory": false, "read_only": false,
             "singleton": {"id": 65553, "name": "$COUNTER_SPEC_BYTES", "type": {"type": "uint64"}}}
          ]
        }]}"#;
        let registry = Registry::new();
        registry.load("p", blob).unwrap();
        let t = registry.get_table("p", "route").unwrap();

        match t.param_owner("port") {
            Err(Error::AmbiguousName { candidates, .. }) => assert_eq!(candidates.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(t.param_owner("session").unwrap().0, Some(12));
        assert_eq!(t.param_owner("$COUNTER_SPEC_BYTES").unwrap().0, None);
        assert!(registry
            .annotate_data("p", "route", None, "port", Annotation::Bytes)
            .is_err());
        registry
            .annotate_data("p", "route", Some("send"), "port", Annotation::Bytes)
            .unwrap();
    }

    #[test]
    fn reload_replaces() {
        let registry = Registry::new();
        registry.load("p", SCHEMA.as_bytes()).unwrap();
        registry.load("p", br#"{"tables": []}"#).unwrap();
        assert!(registry.get_table("p", "ipv4_lpm").is_err());
        assert!(registry.unload("p").is_some());
        assert!(!registry.contains("p"));
        assert!(matches!(registry.load("q", b"not json"), Err(Error::Json(_))));
    }
}
