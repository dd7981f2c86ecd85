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

//! Session lifecycle: program installation, notifications, deadlines and lost streams.

mod common;

use anyhow::Result;
use bfrt::{
    all_tables, EntryData, EntryScope, Error, Key, KeyTuple, Notifications, ReadFlags,
    ScopeMode, SessionConfig, SessionState, Table, Target, Value, Wait,
};
use bfrt_model::Model;
use common::{connect, program, setup, wait_until, Complete, Incomplete, DEVICE};
use proto::bfruntime as pb;
use std::time::Duration;
use tonic::Code;
use tracing_test::traced_test;

const WAIT: Wait = Wait::Timeout(Duration::from_secs(1));

fn digest_tuple(mac: u64, port: u16) -> pb::TableData {
    pb::TableData {
        action_id: 0,
        fields: vec![
            pb::DataField {
                field_id: 1,
                value: Some(pb::data_field::Value::Stream(mac.to_be_bytes()[2..].to_vec())),
            },
            pb::DataField {
                field_id: 2,
                value: Some(pb::data_field::Value::Stream(port.to_be_bytes().to_vec())),
            },
        ],
    }
}

async fn read(table: &Table<'_>, target: &Target, key: Key) -> bfrt::Result<Vec<(EntryData, Key)>> {
    table
        .entry_get(target, Some(&[key]), ReadFlags::default(), None)
        .await?
        .entries()
        .await
}

#[tokio::test]
#[traced_test]
async fn tables_need_a_bound_program() -> Result<()> {
    let model = Model::new();
    let session = connect(&model, SessionConfig::new(1)).await?;
    assert_eq!(session.state(), SessionState::Subscribed);
    assert!(matches!(session.table("forward"), Err(Error::InvalidState(_))));
    assert!(session.bind("tna_counter").await.is_err());

    session
        .verify_and_warm_init_begin_and_end("", &[program("tna_counter")])
        .await?;
    assert_eq!(session.state(), SessionState::Subscribed);
    session.bind("tna_counter").await?;
    assert_eq!(session.state(), SessionState::Bound);
    session.table("forward")?;

    session.tear_down().await?;
    assert_eq!(session.state(), SessionState::Unconnected);
    assert!(matches!(
        session.get_forwarding_pipeline_config().await,
        Err(Error::InvalidState(_))
    ));
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn client_ids_are_unique() -> Result<()> {
    let (model, _session) = setup(&["tna_counter"]).await?;
    match connect(&model, SessionConfig::new(1)).await {
        Err(e) => match e.downcast_ref::<Error>() {
            Some(Error::RuntimeRejected { code, .. }) => assert_eq!(*code, Code::AlreadyExists),
            other => panic!("second subscription: {:?}", other),
        },
        Ok(_) => panic!("second subscription with the same client id succeeded"),
    }
    assert_eq!(model.subscribed_clients(), vec![1]);
    Ok(())
}

/// Until a warm init ends, reads see the old pipeline and writes land in the new one.
#[tokio::test]
#[traced_test]
async fn warm_init_swaps_pipelines_at_end() -> Result<()> {
    let (_model, session) = setup(&["tna_counter"]).await?;
    let target = session.target();
    let (old_key, new_key) = {
        let forward = session.table("forward")?;
        let old_key = forward.make_key(&[KeyTuple::exact("src_addr", 1u64)])?;
        let new_key = forward.make_key(&[KeyTuple::exact("src_addr", 2u64)])?;
        let data = forward.make_data(&[("port", 1u16.into())], Some("hit"))?;
        forward.entry_add(&target, &[old_key.clone()], &[data]).await?;
        (old_key, new_key)
    };

    session
        .verify_and_warm_init_begin("", &[program("tna_counter")])
        .await?;
    assert!(matches!(session.table("forward"), Err(Error::InvalidState(_))));
    session.bind("tna_counter").await?;
    let forward = session.table("forward")?;
    let data = forward.make_data(&[("port", 2u16.into())], Some("hit"))?;
    forward.entry_add(&target, &[new_key.clone()], &[data]).await?;

    assert!(read(&forward, &target, old_key.clone()).await.is_ok());
    assert!(matches!(
        read(&forward, &target, new_key.clone()).await,
        Err(Error::KeyNotFound { .. })
    ));

    session.warm_init_end().await?;
    assert!(matches!(
        read(&forward, &target, old_key).await,
        Err(Error::KeyNotFound { .. })
    ));
    assert!(read(&forward, &target, new_key).await.is_ok());
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn sessions_share_device_state() -> Result<()> {
    let (model, first) = setup(&["tna_counter", "tna_alpm"]).await?;
    let second = connect(&model, SessionConfig::new(2)).await?;
    second.bind("tna_alpm").await?;
    let third = connect(&model, SessionConfig::new(3)).await?;
    third.bind("tna_counter").await?;

    let tables = all_tables(&[&first, &second])?;
    assert_eq!(tables.len(), 2);
    assert_eq!(tables[0].0, 1);
    assert!(tables[0].1.iter().any(|t| t.name().ends_with("forward")));
    assert_eq!(tables[1].0, 2);
    assert!(tables[1].1.iter().any(|t| t.name().ends_with("ipv4_alpm")));

    let forward = first.table("forward")?;
    let key = forward.make_key(&[KeyTuple::exact("src_addr", 0x42u64)])?;
    let data = forward.make_data(&[("port", 4u16.into())], Some("hit"))?;
    forward.entry_add(&first.target(), &[key.clone()], &[data]).await?;

    let (seen, _) = third
        .table("forward")?
        .entry_get(&third.target(), Some(&[key]), ReadFlags::default(), None)
        .await?
        .entries()
        .await?
        .remove(0);
    assert_eq!(seen.get("port"), Some(&Value::Int(4)));
    Ok(())
}

/// A scope set by one client governs the targets another client may write to.
#[tokio::test]
#[traced_test]
async fn scope_changes_reach_other_sessions() -> Result<()> {
    let (model, first) = setup(&["tna_register"]).await?;
    let second = connect(&model, SessionConfig::new(2)).await?;
    second.bind("tna_register").await?;
    let reg = first.table("test_reg")?;
    let other = second.table("test_reg")?;
    let all = first.target();

    let key = other.make_key(&[KeyTuple::exact("$REGISTER_INDEX", 3u32)])?;
    let data = other.make_data(&[("first", 5u32.into()), ("second", 6u32.into())], None)?;
    other.entry_add(&all, &[key.clone()], &[data.clone()]).await?;
    other.entry_delete(&all, Some(&[key.clone()])).await?;

    let single = EntryScope::new(ScopeMode::All, ScopeMode::Single, ScopeMode::All);
    reg.set_entry_scope(&all, single).await?;
    assert_eq!(other.get_entry_scope(&all).await?, single);

    other.entry_add(&all.pipe(1), &[key.clone()], &[data.clone()]).await?;
    assert_eq!(reg.usage_get(&all.pipe(1)).await?, 1);
    assert_eq!(reg.usage_get(&all.pipe(0)).await?, 0);

    match other.entry_add(&all, &[key.clone()], &[data]).await {
        Err(Error::ScopeMismatch { .. }) => (),
        other => panic!("write to all pipes under a single-pipe scope: {:?}", other),
    }
    assert!(matches!(
        other.usage_get(&all).await,
        Err(Error::ScopeMismatch { .. })
    ));
    assert!(matches!(
        other.operations_execute(&all, "Sync").await,
        Err(Error::ScopeMismatch { .. })
    ));
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn key_mask_changes_reach_other_sessions() -> Result<()> {
    let (model, first) = setup(&["tna_ternary"]).await?;
    let second = connect(&model, SessionConfig::new(2)).await?;
    second.bind("tna_ternary").await?;
    let forward = first.table("forward")?;
    let other = second.table("forward")?;
    let target = first.target();

    let key = other.make_key(&[
        KeyTuple::ternary("dst_addr", 0x2222u64, 0xffffu64),
        KeyTuple::ternary("ingress_port", 1u16, 0x1ffu16),
    ])?;
    let data = other.make_data(&[("port", 2u16.into())], Some("hit"))?;
    other.entry_add(&target, &[key.clone()], &[data]).await?;

    let mask = forward.make_key_mask(&[("dst_addr", 0xfff0u64.into()), ("ingress_port", 0u16.into())])?;
    match forward.set_dynamic_key_mask(&target, &mask).await {
        Err(Error::EntriesPresent { .. }) => (),
        other => panic!("mask change with another client's entry present: {:?}", other),
    }

    other.entry_delete(&target, Some(&[key])).await?;
    forward.set_dynamic_key_mask(&target, &mask).await?;
    assert_eq!(other.get_dynamic_key_mask(&target).await?.mask, mask);
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn binding_an_unknown_program_is_a_schema_error() -> Result<()> {
    let (_model, session) = setup(&["tna_counter"]).await?;
    match session.bind("tna_missing").await {
        Err(e @ Error::UnknownName { kind: "program", .. }) => assert!(e.is_schema_error()),
        other => panic!("bind to an unknown program: {:?}", other),
    }
    assert!(session.table("forward").is_ok());
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn notifications_are_queued_and_acknowledged() -> Result<()> {
    let (model, session) = setup(&["tna_counter"]).await?;
    let learn = session.learn("digest_a")?;
    let target = Target::new(DEVICE);

    assert!(session.digest_get(Wait::Poll).await.is_none());
    let data = vec![digest_tuple(0x0000_1111_2222, 5), digest_tuple(0x0000_3333_4444, 6)];
    assert_eq!(model.emit_digest(DEVICE, &target, learn.id(), 1, data), 1);
    assert_eq!(model.emit_digest(DEVICE, &target, learn.id(), 2, Vec::new()), 1);

    let digest = session.digest_get(WAIT).await.expect("first digest");
    assert_eq!(digest.list_id, 1);
    assert_eq!(digest.sequence, 1);
    let tuples = learn.make_data_list(&digest)?;
    assert_eq!(tuples.len(), 2);
    assert_eq!(tuples[0].get("src_addr"), Some(&Value::Int(0x1111_2222)));
    assert_eq!(tuples[1].get("port"), Some(&Value::Int(6)));
    let second = session.digest_get(WAIT).await.expect("second digest");
    assert_eq!(second.sequence, 2);

    let filter = learn.id();
    wait_until(|| {
        let acked = model.acked_digests();
        if acked.contains(&(filter, 1)) && acked.contains(&(filter, 2)) {
            Complete(())
        } else {
            Incomplete
        }
    })
    .await?;

    let entry = pb::TableEntry {
        table_id: session.table("forward")?.id(),
        ..Default::default()
    };
    assert_eq!(model.emit_idle_timeout(DEVICE, &target, entry), 1);
    let idle = session.idle_get(WAIT).await.expect("idle timeout");
    assert_eq!(idle.table_id, 200);

    assert_eq!(model.emit_port_status(DEVICE, pb::TableKey::default(), false), 1);
    let port = session.port_event_get(WAIT).await.expect("port status");
    assert!(!port.up);
    assert!(session.port_event_get(Wait::Poll).await.is_none());
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn disabled_notifications_are_not_sent() -> Result<()> {
    let (model, _session) = setup(&["tna_counter"]).await?;
    let config = SessionConfig {
        notifications: Notifications {
            learn: false,
            idle_timeout: true,
            port_status: false,
        },
        ..SessionConfig::new(2)
    };
    let quiet = connect(&model, config).await?;
    assert_eq!(model.emit_digest(DEVICE, &Target::new(DEVICE), 300, 1, Vec::new()), 1);
    assert_eq!(model.emit_port_status(DEVICE, pb::TableKey::default(), true), 1);
    assert_eq!(
        model.emit_idle_timeout(DEVICE, &Target::new(DEVICE), pb::TableEntry::default()),
        2
    );
    assert!(quiet.digest_get(Wait::Poll).await.is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn slow_runtime_hits_the_deadline() -> Result<()> {
    let model = Model::new();
    let config = SessionConfig {
        deadline_ms: Some(100),
        ..SessionConfig::new(1)
    };
    let session = connect(&model, config).await?;
    session
        .verify_and_warm_init_begin_and_end("", &[program("tna_counter")])
        .await?;
    session.bind("tna_counter").await?;
    let forward = session.table("forward")?;
    let key = forward.make_key(&[KeyTuple::exact("src_addr", 9u64)])?;
    let data = forward.make_data(&[("port", 9u16.into())], Some("hit"))?;

    model.set_delay(Some(Duration::from_secs(5)));
    assert!(matches!(
        forward.entry_add(&session.target(), &[key.clone()], &[data.clone()]).await,
        Err(Error::DeadlineExceeded)
    ));

    model.set_delay(None);
    forward.entry_add(&session.target(), &[key], &[data]).await?;
    assert_eq!(forward.usage_get(&session.target()).await?, 1);
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn lost_stream_fails_later_calls() -> Result<()> {
    let (model, session) = setup(&["tna_counter"]).await?;
    assert!(model.break_stream(1));
    wait_until(|| match session.state() {
        SessionState::Unconnected => Complete(()),
        _ => Incomplete,
    })
    .await?;

    assert!(matches!(
        session.get_forwarding_pipeline_config().await,
        Err(Error::ConnectionLost(_))
    ));
    assert!(matches!(session.table("forward"), Err(Error::InvalidState(_))));
    assert!(model.subscribed_clients().is_empty());
    Ok(())
}
