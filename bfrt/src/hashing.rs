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

//! Dynamic hashing.
//!
//! A hash unit is configured through two keyless tables.  The configure table's default entry
//! holds one priority per hash input: inputs with equal priority are combined by XOR before
//! hashing, which is how symmetric hashes are built, and priority 0 leaves an input out.  The
//! algorithm table's default entry selects the algorithm.

use std::fmt::{self, Display};

use tracing::debug;

use crate::codec::Value;
use crate::error::{Error, Result};
use crate::table::{Attribute, EntryData, ReadFlags, Table, DYNAMIC_HASHING};
use crate::target::Target;

pub const CONFIGURE_TABLE_TYPE: &str = "DynHashConfigure";
pub const ALGORITHM_TABLE_TYPE: &str = "DynHashAlgorithm";

const PRE_DEFINED: &str = "pre_defined";
const USER_DEFINED: &str = "user_defined";

/// A hash algorithm.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    Crc16,
    Crc32,
    Identity,
    Xor,
    Random,
    UserDefinedCrc {
        polynomial: u64,
        init: u64,
        final_xor: u64,
        /// Reflect input bytes and the result.
        reverse: bool,
        hash_bit_width: u32,
    },
}

impl Algorithm {
    pub fn predefined_name(&self) -> Option<&'static str> {
        match self {
            Algorithm::Crc16 => Some("CRC_16"),
            Algorithm::Crc32 => Some("CRC_32"),
            Algorithm::Identity => Some("IDENTITY"),
            Algorithm::Xor => Some("XOR"),
            Algorithm::Random => Some("RANDOM"),
            Algorithm::UserDefinedCrc { .. } => None,
        }
    }

    pub fn from_predefined_name(name: &str) -> Result<Self> {
        match name {
            "CRC_16" => Ok(Algorithm::Crc16),
            "CRC_32" => Ok(Algorithm::Crc32),
            "IDENTITY" => Ok(Algorithm::Identity),
            "XOR" => Ok(Algorithm::Xor),
            "RANDOM" => Ok(Algorithm::Random),
            _ => Err(Error::unknown("hash algorithm", name)),
        }
    }

    fn to_fields(self) -> (&'static str, Vec<(&'static str, Value)>) {
        match self {
            Algorithm::UserDefinedCrc {
                polynomial,
                init,
                final_xor,
                reverse,
                hash_bit_width,
            } => (
                USER_DEFINED,
                vec![
                    ("polynome", polynomial.into()),
                    ("init", init.into()),
                    ("final_xor", final_xor.into()),
                    ("reverse", reverse.into()),
                    ("hash_bit_width", hash_bit_width.into()),
                ],
            ),
            predefined => (
                PRE_DEFINED,
                vec![(
                    "algorithm_name",
                    predefined.predefined_name().unwrap_or_default().into(),
                )],
            ),
        }
    }

    /// Parses the default entry of an algorithm table.
    pub fn from_data(data: &EntryData) -> Result<Self> {
        let missing = |field: &str| {
            Error::Schema(format!("hash algorithm data {} lacks {}", data, field))
        };
        let int = |field: &str| -> Result<u128> {
            data.get(field)
                .and_then(Value::as_int)
                .ok_or_else(|| missing(field))
        };
        match data.action() {
            Some(a) if a.ends_with(PRE_DEFINED) => {
                let name = data
                    .get("algorithm_name")
                    .and_then(Value::as_text)
                    .ok_or_else(|| missing("algorithm_name"))?;
                Self::from_predefined_name(name)
            }
            Some(a) if a.ends_with(USER_DEFINED) => Ok(Algorithm::UserDefinedCrc {
                polynomial: int("polynome")? as u64,
                init: int("init")? as u64,
                final_xor: int("final_xor")? as u64,
                reverse: data
                    .get("reverse")
                    .and_then(Value::as_bool)
                    .ok_or_else(|| missing("reverse"))?,
                hash_bit_width: int("hash_bit_width")? as u32,
            }),
            _ => Err(missing("an algorithm action")),
        }
    }
}

impl Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::UserDefinedCrc {
                polynomial,
                init,
                final_xor,
                reverse,
                hash_bit_width,
            } => write!(
                f,
                "crc_{}(poly={:#x}, init={:#x}, xor={:#x}, reverse={})",
                hash_bit_width, polynomial, init, final_xor, reverse
            ),
            predefined => write!(f, "{}", predefined.predefined_name().unwrap_or_default()),
        }
    }
}

/// A dynamic hash unit: its configure table and its algorithm table.
#[derive(Clone)]
pub struct DynHash<'a> {
    configure: Table<'a>,
    algorithm: Table<'a>,
}

impl<'a> DynHash<'a> {
    pub(crate) fn new(configure: Table<'a>, algorithm: Table<'a>) -> Result<Self> {
        if configure.info().table_type != CONFIGURE_TABLE_TYPE {
            return Err(Error::Schema(format!(
                "{} is a {:?} table, not {}",
                configure.name(),
                configure.info().table_type,
                CONFIGURE_TABLE_TYPE
            )));
        }
        if algorithm.info().table_type != ALGORITHM_TABLE_TYPE {
            return Err(Error::Schema(format!(
                "{} is a {:?} table, not {}",
                algorithm.name(),
                algorithm.info().table_type,
                ALGORITHM_TABLE_TYPE
            )));
        }
        algorithm.info().action(PRE_DEFINED)?;
        algorithm.info().action(USER_DEFINED)?;
        Ok(DynHash {
            configure,
            algorithm,
        })
    }

    pub fn configure_table(&self) -> &Table<'a> {
        &self.configure
    }

    pub fn algorithm_table(&self) -> &Table<'a> {
        &self.algorithm
    }

    /// Assigns each named hash input its priority.  Inputs not named keep priority 0.
    pub async fn set_field_priorities(&self, target: &Target, priorities: &[(&str, u32)]) -> Result<()> {
        let fields: Vec<(&str, Value)> = priorities
            .iter()
            .map(|(name, priority)| (*name, Value::from(*priority)))
            .collect();
        let data = self.configure.make_data(&fields, None)?;
        debug!("{}: field priorities {}", self.configure.name(), data);
        self.configure.default_entry_set(target, &data).await
    }

    pub async fn field_priorities(&self, target: &Target) -> Result<Vec<(String, u32)>> {
        let data = self
            .configure
            .default_entry_get(target, ReadFlags::default())
            .await?;
        Ok(data
            .fields()
            .iter()
            .filter_map(|f| f.value.as_int().map(|p| (f.name.clone(), p as u32)))
            .collect())
    }

    /// Sets the `DynamicHashing` attribute of the configure table.
    pub async fn set_hashing(&self, target: &Target, alg: u32, seed: u64) -> Result<()> {
        self.configure
            .attribute_set(target, &Attribute::DynamicHashing { alg, seed })
            .await
    }

    pub async fn hashing(&self, target: &Target) -> Result<(u32, u64)> {
        match self.configure.attribute_get(target, DYNAMIC_HASHING).await? {
            Attribute::DynamicHashing { alg, seed } => Ok((alg, seed)),
            other => Err(Error::Schema(format!(
                "{}: expected dynamic hashing, got {:?}",
                self.configure.name(),
                other
            ))),
        }
    }

    pub async fn set_algorithm(&self, target: &Target, algorithm: Algorithm) -> Result<()> {
        let (action, fields) = algorithm.to_fields();
        let data = self.algorithm.make_data(&fields, Some(action))?;
        debug!("{}: algorithm {}", self.algorithm.name(), algorithm);
        self.algorithm.default_entry_set(target, &data).await
    }

    pub async fn algorithm(&self, target: &Target) -> Result<Algorithm> {
        let data = self
            .algorithm
            .default_entry_get(target, ReadFlags::default())
            .await?;
        Algorithm::from_data(&data)
    }

    /// Reverts priorities and algorithm to the program's defaults.
    pub async fn reset(&self, target: &Target) -> Result<()> {
        self.configure.default_entry_reset(target).await?;
        self.algorithm.default_entry_reset(target).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::DataValue;
    use proto::bfruntime as pb;

    fn data(action: &str, fields: Vec<(&str, Value)>) -> EntryData {
        let parts = fields
            .into_iter()
            .enumerate()
            .map(|(i, (name, value))| {
                (
                    DataValue {
                        id: i as u32 + 1,
                        name: name.into(),
                        value,
                    },
                    pb::DataField::default(),
                )
            })
            .collect();
        EntryData::from_parts(Some(1), Some(action.into()), parts)
    }

    #[test]
    fn predefined_names() {
        for a in [
            Algorithm::Crc16,
            Algorithm::Crc32,
            Algorithm::Identity,
            Algorithm::Xor,
            Algorithm::Random,
        ] {
            let name = a.predefined_name().unwrap();
            assert_eq!(Algorithm::from_predefined_name(name).unwrap(), a);
        }
        assert!(Algorithm::from_predefined_name("CRC_64").is_err());
    }

    #[test]
    fn algorithm_from_default_entry() {
        let d = data("pre_defined", vec![("algorithm_name", Value::from("CRC_32"))]);
        assert_eq!(Algorithm::from_data(&d).unwrap(), Algorithm::Crc32);

        let d = data(
            "user_defined",
            vec![
                ("polynome", Value::Int(0x8005)),
                ("init", Value::Int(0)),
                ("final_xor", Value::Int(0)),
                ("reverse", Value::Bool(true)),
                ("hash_bit_width", Value::Int(16)),
            ],
        );
        assert_eq!(
            Algorithm::from_data(&d).unwrap(),
            Algorithm::UserDefinedCrc {
                polynomial: 0x8005,
                init: 0,
                final_xor: 0,
                reverse: true,
                hash_bit_width: 16
            }
        );

        let d = data("user_defined", vec![("polynome", Value::Int(0x8005))]);
        assert!(Algorithm::from_data(&d).is_err());
    }
}
