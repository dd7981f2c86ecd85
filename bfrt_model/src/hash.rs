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

//! Hash units configured by the dynamic hashing tables.

use bfrt::codec;
use bfrt::target::Target;

use crc::{Crc, CRC_16_ARC, CRC_32_ISO_HDLC};

use proto::bfruntime::{self as pb, data_field};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use std::collections::BTreeMap;

use tonic::Status;

use crate::pipeline::{field_int, Pipeline, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Unit {
    Crc16,
    Crc32,
    Identity,
    Xor,
    Random,
    Crc {
        width: u32,
        polynomial: u64,
        init: u64,
        final_xor: u64,
        reflect: bool,
    },
}

fn str_param<'a>(data: &'a pb::TableData, id: u32) -> Option<&'a str> {
    data.fields
        .iter()
        .find(|f| f.field_id == id)
        .and_then(|f| match &f.value {
            Some(data_field::Value::StrVal(s)) => Some(s.as_str()),
            _ => None,
        })
}

fn bool_param(data: &pb::TableData, id: u32) -> bool {
    data.fields.iter().any(|f| {
        f.field_id == id
            && match &f.value {
                Some(data_field::Value::BoolVal(b)) => *b,
                Some(data_field::Value::Stream(s)) => codec::decode_int(s) != 0,
                _ => false,
            }
    })
}

fn unit(pipeline: &Pipeline, algorithm: &str, target: &Target) -> Result<Unit> {
    let table = pipeline.table_by_name(algorithm)?;
    let data = table.default_data(target);
    let action = table
        .info
        .action_by_id(data.action_id)
        .ok_or_else(|| Status::failed_precondition(format!("{}: no algorithm selected", algorithm)))?;
    let param = |name: &str| {
        action
            .param(name)
            .map(|p| p.preamble.id)
            .map_err(|e| Status::internal(e.to_string()))
    };
    if action.preamble.name.ends_with("pre_defined") {
        let name = str_param(&data, param("algorithm_name")?).unwrap_or_default();
        return match name {
            "CRC_16" => Ok(Unit::Crc16),
            "CRC_32" => Ok(Unit::Crc32),
            "IDENTITY" => Ok(Unit::Identity),
            "XOR" => Ok(Unit::Xor),
            "RANDOM" => Ok(Unit::Random),
            other => Err(Status::invalid_argument(format!("unknown algorithm {:?}", other))),
        };
    }
    let width = field_int(&data, param("hash_bit_width")?) as u32;
    if !(8..=64).contains(&width) {
        return Err(Status::invalid_argument(format!("unsupported crc width {}", width)));
    }
    Ok(Unit::Crc {
        width,
        polynomial: field_int(&data, param("polynome")?) as u64,
        init: field_int(&data, param("init")?) as u64,
        final_xor: field_int(&data, param("final_xor")?) as u64,
        reflect: bool_param(&data, param("reverse")?),
    })
}

/// Bitwise CRC of `width` bits, `8 <= width <= 64`.
pub fn crc(message: &[u8], width: u32, polynomial: u64, init: u64, final_xor: u64, reflect: bool) -> u64 {
    let mask = if width == 64 { u64::MAX } else { (1u64 << width) - 1 };
    let top = 1u64 << (width - 1);
    let mut reg = init & mask;
    for &byte in message {
        let byte = if reflect { byte.reverse_bits() } else { byte };
        reg ^= (byte as u64) << (width - 8);
        for _ in 0..8 {
            let shifted = if reg & top != 0 {
                (reg << 1) ^ polynomial
            } else {
                reg << 1
            };
            reg = shifted & mask;
        }
    }
    if reflect {
        reg = reg.reverse_bits() >> (64 - width);
    }
    (reg ^ final_xor) & mask
}

fn xor_into(acc: &mut Vec<u8>, value: &[u8]) {
    if value.len() > acc.len() {
        let mut wider = vec![0u8; value.len() - acc.len()];
        wider.append(acc);
        *acc = wider;
    }
    let offset = acc.len() - value.len();
    for (a, v) in acc[offset..].iter_mut().zip(value) {
        *a ^= v;
    }
}

/// The bytes hashed for `inputs`: inputs of equal priority are XORed and the groups are
/// concatenated in ascending priority.  Priority 0 leaves an input out.
fn message(pipeline: &Pipeline, configure: &str, target: &Target, inputs: &[(&str, Vec<u8>)]) -> Result<Vec<u8>> {
    let table = pipeline.table_by_name(configure)?;
    let data = table.default_data(target);
    let mut groups: BTreeMap<u128, Vec<u8>> = BTreeMap::new();
    for (name, value) in inputs {
        let (_, field) = table
            .info
            .data_field(None, name)
            .map_err(|e| Status::invalid_argument(e.to_string()))?;
        let priority = field_int(&data, field.preamble.id);
        if priority != 0 {
            xor_into(groups.entry(priority).or_default(), value);
        }
    }
    Ok(groups.into_values().flatten().collect())
}

/// Hashes `inputs` as the unit formed by tables `configure` and `algorithm` would.
pub(crate) fn compute(
    pipeline: &Pipeline,
    configure: &str,
    algorithm: &str,
    target: &Target,
    inputs: &[(&str, Vec<u8>)],
) -> Result<u64> {
    let message = message(pipeline, configure, target, inputs)?;
    let seed = pipeline.table_by_name(configure)?.hashing().seed;
    let crc32 = || Crc::<u32>::new(&CRC_32_ISO_HDLC).checksum(&message) as u64;
    Ok(match unit(pipeline, algorithm, target)? {
        Unit::Crc16 => Crc::<u16>::new(&CRC_16_ARC).checksum(&message) as u64,
        Unit::Crc32 => crc32(),
        Unit::Identity => codec::decode_int(&message) as u64,
        Unit::Xor => {
            let mut padded = vec![0u8; (4 - message.len() % 4) % 4];
            padded.extend_from_slice(&message);
            padded
                .chunks(4)
                .fold(0u32, |acc, w| acc ^ u32::from_be_bytes([w[0], w[1], w[2], w[3]]))
                as u64
        }
        Unit::Random => StdRng::seed_from_u64(seed ^ crc32()).gen(),
        Unit::Crc {
            width,
            polynomial,
            init,
            final_xor,
            reflect,
        } => crc(&message, width, polynomial, init, final_xor, reflect),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECK: &[u8] = b"123456789";

    #[test]
    fn generic_crc_matches_catalog() {
        let arc = crc(CHECK, 16, 0x8005, 0, 0, true);
        assert_eq!(arc, 0xbb3d);
        assert_eq!(arc, Crc::<u16>::new(&CRC_16_ARC).checksum(CHECK) as u64);

        let iso = crc(CHECK, 32, 0x04c1_1db7, 0xffff_ffff, 0xffff_ffff, true);
        assert_eq!(iso, 0xcbf4_3926);

        // CRC-16/XMODEM, not reflected.
        assert_eq!(crc(CHECK, 16, 0x1021, 0, 0, false), 0x31c3);
    }

    #[test]
    fn xor_aligns_right() {
        let mut acc = vec![0x0f];
        xor_into(&mut acc, &[0x01, 0xf0]);
        assert_eq!(acc, vec![0x01, 0xff]);
    }
}
