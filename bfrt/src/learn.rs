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

use proto::bfruntime as pb;

use std::sync::Arc;

use tracing::warn;

use crate::codec;
use crate::error::{Error, Result};
use crate::schema::{LearnFilter, Program};
use crate::session::Digest;
use crate::table::{DataValue, EntryData};

/// A learn filter of the bound program.
#[derive(Clone, Debug)]
pub struct Learn {
    program: Program,
    filter: Arc<LearnFilter>,
}

impl Learn {
    pub(crate) fn new(program: Program, filter: Arc<LearnFilter>) -> Self {
        Learn { program, filter }
    }

    pub fn name(&self) -> &str {
        &self.filter.preamble.name
    }

    pub fn id(&self) -> u32 {
        self.filter.id()
    }

    pub fn info(&self) -> &Arc<LearnFilter> {
        &self.filter
    }

    fn decode(&self, data: &pb::TableData) -> Result<EntryData> {
        let mut parts = Vec::with_capacity(data.fields.len());
        for f in &data.fields {
            let value = match &f.value {
                Some(value) => value,
                None => continue,
            };
            let field = self.filter.field_by_id(f.field_id).ok_or_else(|| {
                Error::Schema(format!(
                    "learn filter {} has no field with id {}",
                    self.name(),
                    f.field_id
                ))
            })?;
            let fmt = self.program.learn_format(&self.filter, field);
            parts.push((
                DataValue {
                    id: field.preamble.id,
                    name: field.preamble.name.clone(),
                    value: codec::decode_data(value, &fmt),
                },
                f.clone(),
            ));
        }
        Ok(EntryData::from_parts(None, None, parts))
    }

    /// Decodes every tuple of `digest` into named fields.
    pub fn make_data_list(&self, digest: &Digest) -> Result<Vec<EntryData>> {
        if digest.learn_filter_id != self.id() {
            warn!(
                "digest of learn filter {} decoded with {}",
                digest.learn_filter_id,
                self.name()
            );
            return Err(Error::Schema(format!(
                "digest is from learn filter {}, not {} ({})",
                digest.learn_filter_id,
                self.id(),
                self.name()
            )));
        }
        digest.data.iter().map(|d| self.decode(d)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Annotation, Value};
    use crate::schema::Registry;
    use crate::target::Target;

    const SCHEMA: &str = r#"{
      "learn_filters": [
        {"name": "pipe.SwitchIngressDeparser.digest_a", "id": 2001,
         "fields": [
           {"id": 1, "name": "src_addr", "type": {"type": "bytes", "width": 48}},
           {"id": 2, "name": "port", "type": {"type": "bytes", "width": 9}}
         ]}
      ]
    }"#;

    fn digest(filter: u32) -> Digest {
        let field = |id, bytes: &[u8]| pb::DataField {
            field_id: id,
            value: Some(pb::data_field::Value::Stream(bytes.to_vec())),
        };
        Digest {
            target: Target::new(0),
            learn_filter_id: filter,
            list_id: 1,
            sequence: 1,
            data: vec![pb::TableData {
                action_id: 0,
                fields: vec![
                    field(2, &[0x01, 0x04]),
                    field(1, &[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
                ],
            }],
        }
    }

    #[test]
    fn digests_decode_by_name() {
        let registry = Registry::new();
        registry.load("tna_digest", SCHEMA.as_bytes()).unwrap();
        registry
            .annotate_learn("tna_digest", "digest_a", "src_addr", Annotation::Mac)
            .unwrap();
        let program = registry.get("tna_digest").unwrap();
        let learn = Learn::new(program.clone(), program.learn_filter("digest_a").unwrap().clone());

        let list = learn.make_data_list(&digest(2001)).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].get("src_addr"), Some(&Value::from("00:11:22:33:44:55")));
        assert_eq!(list[0].get("port"), Some(&Value::Int(0x104)));
        assert_eq!(list[0].fields()[0].name, "src_addr");

        assert!(learn.make_data_list(&digest(7)).is_err());
    }
}
