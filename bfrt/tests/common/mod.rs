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

//! Helpers shared by the integration tests.  Each test drives a [`Model`] through real sessions.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use bfrt::{PipelineConfig, Registry, Session, SessionConfig};
use bfrt_model::Model;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const DEVICE: u32 = 0;

/// The pipeline config of the fixture program `name` under `tests/programs`.
pub fn program(name: &str) -> PipelineConfig {
    PipelineConfig {
        p4_name: name.into(),
        bfruntime_info: PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("programs")
            .join(format!("{}.json", name)),
        profiles: Vec::new(),
    }
}

/// Opens a session to `model` with its own schema registry.
pub async fn connect(model: &Model, config: SessionConfig) -> Result<Session> {
    Ok(Session::with_runtime(config, Arc::new(Registry::new()), Arc::new(model.clone())).await?)
}

/// Installs `programs` on a fresh model through client 1 and binds to the first of them.
pub async fn setup(programs: &[&str]) -> Result<(Model, Session)> {
    let model = Model::new();
    let session = connect(&model, SessionConfig::new(1)).await?;
    let configs: Vec<PipelineConfig> = programs.iter().map(|p| program(p)).collect();
    session.verify_and_warm_init_begin_and_end("", &configs).await?;
    session.bind(programs[0]).await?;
    Ok((model, session))
}

pub enum Completion<T> {
    Incomplete,
    Complete(T),
}
pub use Completion::*;

/// Repeatedly evaluates `condition`, sleeping a bit between calls, until it yields
/// Complete(value), then returns Ok(value).  After a while, give up and return an error instead.
pub async fn wait_until<T, F>(mut condition: F) -> Result<T>
where
    F: FnMut() -> Completion<T>,
{
    for i in 0..10 {
        if let Complete(result) = condition() {
            return Ok(result);
        }
        let ms = match i {
            0 => 10,
            1 => 100,
            _ => 1000,
        };
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
    Err(anyhow!("wait_until timed out"))
}
