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

use serde::{Deserialize, Serialize};

use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

pub const GRPC_ADDR_VAR: &str = "BFRT_GRPC_ADDR";
pub const CLIENT_ID_VAR: &str = "BFRT_CLIENT_ID";
pub const DEVICE_ID_VAR: &str = "BFRT_DEVICE_ID";
pub const DEADLINE_MS_VAR: &str = "BFRT_DEADLINE_MS";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Notifications {
    pub learn: bool,
    pub idle_timeout: bool,
    pub port_status: bool,
}

impl Default for Notifications {
    fn default() -> Self {
        Notifications {
            learn: true,
            idle_timeout: true,
            port_status: true,
        }
    }
}

/// Parameters of one session.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    pub grpc_addr: String,
    pub client_id: u32,
    pub device_id: u32,
    pub is_master: bool,
    pub notifications: Notifications,
    /// Per-call deadline in milliseconds.  No deadline when absent.
    pub deadline_ms: Option<u64>,
    /// Capacity of each notification queue.  Notifications beyond it are dropped.
    pub queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            grpc_addr: "http://localhost:50052".into(),
            client_id: 0,
            device_id: 0,
            is_master: true,
            notifications: Notifications::default(),
            deadline_ms: None,
            queue_capacity: 1000,
        }
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("{}: cannot parse {:?}", name, value)))
}

impl SessionConfig {
    pub fn new(client_id: u32) -> Self {
        SessionConfig {
            client_id,
            ..Default::default()
        }
    }

    /// Reads a configuration from a JSON file.  Missing keys take their default values.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&s)?)
    }

    /// Overrides settings from the `BFRT_*` environment variables that are set.
    pub fn with_env(self) -> Result<Self> {
        self.with_vars(|name| env::var(name).ok())
    }

    fn with_vars<F: Fn(&str) -> Option<String>>(mut self, var: F) -> Result<Self> {
        if let Some(addr) = var(GRPC_ADDR_VAR) {
            self.grpc_addr = addr;
        }
        if let Some(v) = var(CLIENT_ID_VAR) {
            self.client_id = parse_var(CLIENT_ID_VAR, &v)?;
        }
        if let Some(v) = var(DEVICE_ID_VAR) {
            self.device_id = parse_var(DEVICE_ID_VAR, &v)?;
        }
        if let Some(v) = var(DEADLINE_MS_VAR) {
            self.deadline_ms = Some(parse_var(DEADLINE_MS_VAR, &v)?);
        }
        Ok(self)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_takes_defaults() {
        let c: SessionConfig =
            serde_json::from_str(r#"{"client_id": 3, "notifications": {"learn": false}}"#).unwrap();
        assert_eq!(c.client_id, 3);
        assert_eq!(c.grpc_addr, "http://localhost:50052");
        assert!(!c.notifications.learn);
        assert!(c.notifications.port_status);
        assert_eq!(c.deadline(), None);
    }

    #[test]
    fn environment_overrides() {
        let vars = |name: &str| match name {
            GRPC_ADDR_VAR => Some("http://switch:50052".to_string()),
            CLIENT_ID_VAR => Some("7".to_string()),
            DEADLINE_MS_VAR => Some("250".to_string()),
            _ => None,
        };
        let c = SessionConfig::default().with_vars(vars).unwrap();
        assert_eq!(c.grpc_addr, "http://switch:50052");
        assert_eq!(c.client_id, 7);
        assert_eq!(c.device_id, 0);
        assert_eq!(c.deadline(), Some(Duration::from_millis(250)));

        let bad = |name: &str| (name == DEVICE_ID_VAR).then(|| "zero".to_string());
        assert!(SessionConfig::default().with_vars(bad).is_err());
    }
}
