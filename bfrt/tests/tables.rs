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

//! Entry-level behavior of a single exact-match table.

mod common;

use anyhow::Result;
use bfrt::{EntryData, Error, Key, KeyTuple, ReadFlags, Table, Value};
use common::{setup, DEVICE};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use tonic::Code;
use tracing_test::traced_test;

fn mac_key(table: &Table<'_>, mac: u64) -> bfrt::Result<Key> {
    table.make_key(&[KeyTuple::exact("src_addr", mac)])
}

fn hit(table: &Table<'_>, port: u16) -> bfrt::Result<EntryData> {
    table.make_data(&[("port", port.into())], Some("hit"))
}

#[tokio::test]
#[traced_test]
async fn added_entries_read_back() -> Result<()> {
    let (_model, session) = setup(&["tna_counter"]).await?;
    let forward = session.table("forward")?;
    let target = session.target();

    let mut rng = StdRng::seed_from_u64(7);
    let mut macs = HashSet::new();
    while macs.len() < 16 {
        macs.insert(rng.gen::<u64>() & 0xffff_ffff_ffff);
    }
    let entries: Vec<(u64, u16)> = macs.into_iter().map(|mac| (mac, rng.gen_range(0..512))).collect();
    for &(mac, port) in &entries {
        forward.entry_add(&target, &[mac_key(&forward, mac)?], &[hit(&forward, port)?]).await?;
    }
    for &(mac, port) in &entries {
        let key = mac_key(&forward, mac)?;
        let mut read = forward
            .entry_get(&target, Some(&[key.clone()]), ReadFlags::default(), None)
            .await?
            .entries()
            .await?;
        assert_eq!(read.len(), 1);
        let (data, read_key) = read.remove(0);
        assert_eq!(read_key, key);
        assert_eq!(data.action(), Some("SwitchIngress.hit"));
        assert_eq!(data.get("port"), Some(&Value::Int(port as u128)));
    }
    assert_eq!(forward.usage_get(&target).await?, 16);
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn duplicate_add_keeps_first_data() -> Result<()> {
    let (_model, session) = setup(&["tna_counter"]).await?;
    let forward = session.table("forward")?;
    let target = session.target();
    let key = mac_key(&forward, 0x0000_1111_2222)?;

    forward.entry_add(&target, &[key.clone()], &[hit(&forward, 1)?]).await?;
    match forward.entry_add(&target, &[key.clone()], &[hit(&forward, 2)?]).await {
        Err(Error::DuplicateKey { sub_errors }) => {
            assert_eq!(sub_errors.len(), 1);
            assert_eq!(sub_errors[0].index, 0);
            assert_eq!(sub_errors[0].code, Code::AlreadyExists);
        }
        other => panic!("second add: {:?}", other),
    }

    let (data, _) = forward
        .entry_get(&target, Some(&[key]), ReadFlags::default(), None)
        .await?
        .entries()
        .await?
        .remove(0);
    assert_eq!(data.get("port"), Some(&Value::Int(1)));
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn deleted_entry_is_gone() -> Result<()> {
    let (model, session) = setup(&["tna_counter"]).await?;
    let forward = session.table("forward")?;
    let target = session.target();
    let key = mac_key(&forward, 0x0000_3333_4444)?;

    forward.entry_add(&target, &[key.clone()], &[hit(&forward, 3)?]).await?;
    forward.entry_delete(&target, Some(&[key.clone()])).await?;
    assert_eq!(model.entry_count(DEVICE, "tna_counter")?, 0);

    let read = forward
        .entry_get(&target, Some(&[key.clone()]), ReadFlags::default(), None)
        .await?
        .entries()
        .await;
    assert!(matches!(read, Err(Error::KeyNotFound { .. })));
    assert!(matches!(
        forward.entry_delete(&target, Some(&[key.clone()])).await,
        Err(Error::KeyNotFound { .. })
    ));
    assert!(matches!(
        forward.entry_modify(&target, &[key], &[hit(&forward, 4)?]).await,
        Err(Error::KeyNotFound { .. })
    ));
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn modify_replaces_action_data() -> Result<()> {
    let (_model, session) = setup(&["tna_counter"]).await?;
    let forward = session.table("forward")?;
    let target = session.target();
    let key = mac_key(&forward, 0x0000_5555_6666)?;

    forward.entry_add(&target, &[key.clone()], &[hit(&forward, 5)?]).await?;
    forward.entry_modify(&target, &[key.clone()], &[hit(&forward, 6)?]).await?;
    let (data, _) = forward
        .entry_get(&target, Some(&[key]), ReadFlags::default(), None)
        .await?
        .entries()
        .await?
        .remove(0);
    assert_eq!(data.get("port"), Some(&Value::Int(6)));
    Ok(())
}

/// A keyed read of several keys reports the missing ones by position.
#[tokio::test]
#[traced_test]
async fn missing_keys_are_reported_by_index() -> Result<()> {
    let (_model, session) = setup(&["tna_counter"]).await?;
    let forward = session.table("forward")?;
    let target = session.target();
    let present = mac_key(&forward, 0x0000_0000_0001)?;
    let absent = mac_key(&forward, 0x0000_0000_0002)?;
    forward.entry_add(&target, &[present.clone()], &[hit(&forward, 1)?]).await?;

    let mut stream = forward
        .entry_get(&target, Some(&[present, absent]), ReadFlags::default(), None)
        .await?;
    assert!(matches!(stream.next().await, Some(Ok(_))));
    match stream.entries().await {
        Err(Error::KeyNotFound { sub_errors }) => {
            assert_eq!(sub_errors.len(), 1);
            assert_eq!(sub_errors[0].index, 1);
        }
        other => panic!("unexpected {:?}", other),
    }
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn batch_reports_failed_updates() -> Result<()> {
    let (model, session) = setup(&["tna_counter"]).await?;
    let forward = session.table("forward")?;
    let existing = mac_key(&forward, 0x0000_0a0a_0a0a)?;
    forward
        .entry_add(&session.target(), &[existing.clone()], &[hit(&forward, 1)?])
        .await?;

    let mut batch = session.write_batch();
    batch.add(&forward, &mac_key(&forward, 0x0000_0b0b_0b0b)?, &hit(&forward, 2)?)?;
    batch.add(&forward, &existing, &hit(&forward, 3)?)?;
    batch.add(&forward, &mac_key(&forward, 0x0000_0c0c_0c0c)?, &hit(&forward, 4)?)?;
    assert_eq!(batch.len(), 3);
    match batch.send().await {
        Err(Error::DuplicateKey { sub_errors }) => {
            assert_eq!(sub_errors.iter().map(|e| e.index).collect::<Vec<_>>(), vec![1]);
        }
        other => panic!("batch: {:?}", other),
    }
    assert_eq!(model.entry_count(DEVICE, "tna_counter")?, 3);
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn default_entry_lifecycle() -> Result<()> {
    let (_model, session) = setup(&["tna_counter"]).await?;
    let forward = session.table("forward")?;
    let target = session.target();

    let miss = forward.make_data(&[], Some("miss"))?;
    forward.default_entry_set(&target, &miss).await?;
    let data = forward.default_entry_get(&target, ReadFlags::default()).await?;
    assert_eq!(data.action(), Some("SwitchIngress.miss"));

    forward.default_entry_set(&target, &hit(&forward, 9)?).await?;
    let data = forward.default_entry_get(&target, ReadFlags::default()).await?;
    assert_eq!(data.get("port"), Some(&Value::Int(9)));

    forward.default_entry_reset(&target).await?;
    let data = forward.default_entry_get(&target, ReadFlags::default()).await?;
    assert_eq!(data.action(), None);

    // A default-only action cannot be an entry's action.
    let key = mac_key(&forward, 0x0000_0d0d_0d0d)?;
    assert!(forward.entry_add(&target, &[key], &[miss]).await.is_err());
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn projections_and_key_only_reads() -> Result<()> {
    let (_model, session) = setup(&["tna_counter"]).await?;
    let forward = session.table("forward")?;
    let target = session.target();
    let key = mac_key(&forward, 0x0000_0e0e_0e0e)?;
    forward.entry_add(&target, &[key.clone()], &[hit(&forward, 7)?]).await?;

    let (data, _) = forward
        .entry_get(&target, Some(&[key.clone()]), ReadFlags::default(), Some(&["$COUNTER_SPEC_PKTS"]))
        .await?
        .entries()
        .await?
        .remove(0);
    assert_eq!(data.fields().len(), 1);
    assert_eq!(data.get("$COUNTER_SPEC_PKTS"), Some(&Value::Int(0)));

    let flags = ReadFlags {
        key_only: true,
        ..Default::default()
    };
    let entries = forward.entry_get(&target, None, flags, None).await?.entries().await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].1, key);
    assert!(entries[0].0.fields().is_empty());
    Ok(())
}

/// Bad names and out-of-range values are caught before anything is sent.
#[tokio::test]
#[traced_test]
async fn invalid_input_is_rejected_locally() -> Result<()> {
    let (model, session) = setup(&["tna_counter"]).await?;
    let forward = session.table("forward")?;

    assert!(matches!(
        forward.make_data(&[("port", 512u16.into())], Some("hit")),
        Err(Error::ValueOutOfRange { .. })
    ));
    assert!(matches!(
        forward.make_data(&[("no_such_field", 1u8.into())], Some("hit")),
        Err(Error::UnknownName { .. })
    ));
    assert!(matches!(
        forward.make_key(&[KeyTuple::exact("src_addr", 1u64 << 48)]),
        Err(Error::ValueOutOfRange { .. })
    ));
    assert!(matches!(session.table("no_such_table"), Err(Error::UnknownName { .. })));
    assert_eq!(model.entry_count(DEVICE, "tna_counter")?, 0);
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn wildcard_delete_and_abandoned_reads() -> Result<()> {
    let (_model, session) = setup(&["tna_counter"]).await?;
    let forward = session.table("forward")?;
    let target = session.target();
    for mac in 1..=8u64 {
        forward.entry_add(&target, &[mac_key(&forward, mac)?], &[hit(&forward, mac as u16)?]).await?;
    }

    // Stop after the first entry; the session stays usable.
    let mut stream = forward.entry_get(&target, None, ReadFlags::default(), None).await?;
    assert!(matches!(stream.next().await, Some(Ok(_))));
    drop(stream);

    assert_eq!(forward.usage_get(&target).await?, 8);
    forward.entry_delete(&target, None).await?;
    assert_eq!(forward.usage_get(&target).await?, 0);
    let entries = forward.entry_get(&target, None, ReadFlags::default(), None).await?.entries().await?;
    assert!(entries.is_empty());
    Ok(())
}
