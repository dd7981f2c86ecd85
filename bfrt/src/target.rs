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

use proto::bfruntime::{self as pb, mode};

use std::fmt::{self, Display};

use crate::error::{Error, Result};

pub const PIPE_ALL: u32 = 0xffff;
pub const DIRECTION_ALL: u32 = 0xff;
pub const PARSER_ALL: u32 = 0xff;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Ingress,
    Egress,
    All,
}

impl Direction {
    pub fn to_wire(self) -> u32 {
        match self {
            Direction::Ingress => 0,
            Direction::Egress => 1,
            Direction::All => DIRECTION_ALL,
        }
    }

    pub fn from_wire(v: u32) -> Self {
        match v {
            0 => Direction::Ingress,
            1 => Direction::Egress,
            _ => Direction::All,
        }
    }
}

/// The scope a request applies to.  Unset parts default to the *all* sentinels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Target {
    pub device_id: u32,
    pub pipe_id: u32,
    pub direction: Direction,
    pub parser_id: u32,
}

impl Target {
    pub fn new(device_id: u32) -> Self {
        Target {
            device_id,
            pipe_id: PIPE_ALL,
            direction: Direction::All,
            parser_id: PARSER_ALL,
        }
    }

    pub fn pipe(mut self, pipe_id: u32) -> Self {
        self.pipe_id = pipe_id;
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn parser(mut self, parser_id: u32) -> Self {
        self.parser_id = parser_id;
        self
    }

    pub fn all_pipes(&self) -> bool {
        self.pipe_id == PIPE_ALL
    }

    pub fn to_proto(&self) -> pb::TargetDevice {
        pb::TargetDevice {
            device_id: self.device_id,
            pipe_id: self.pipe_id,
            direction: self.direction.to_wire(),
            prsr_id: self.parser_id,
        }
    }
}

impl From<&pb::TargetDevice> for Target {
    fn from(t: &pb::TargetDevice) -> Self {
        Target {
            device_id: t.device_id,
            pipe_id: t.pipe_id,
            direction: Direction::from_wire(t.direction),
            parser_id: t.prsr_id,
        }
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev {}", self.device_id)?;
        if self.all_pipes() {
            write!(f, " pipe all")?;
        } else {
            write!(f, " pipe {}", self.pipe_id)?;
        }
        match self.direction {
            Direction::Ingress => write!(f, " ingress")?,
            Direction::Egress => write!(f, " egress")?,
            Direction::All => (),
        }
        if self.parser_id != PARSER_ALL {
            write!(f, " parser {}", self.parser_id)?;
        }
        Ok(())
    }
}

/// How one dimension of a table's entries is shared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScopeMode {
    /// Each instance has its own entries; requests name a concrete instance.
    Single,
    /// All instances share one set of entries; requests use the *all* sentinel.
    All,
    /// Instances are partitioned into groups that share entries.  Each byte of the value is a
    /// bitmask of the instances in one group, e.g. `0x0c03` is `{0, 1}, {2, 3}`.
    UserDefined(u32),
}

impl ScopeMode {
    /// Builds a user-defined scope from its groups.  At most four groups of instances `0..8`.
    pub fn groups(groups: &[&[u32]]) -> Result<Self> {
        if groups.is_empty() || groups.len() > 4 {
            return Err(Error::Schema(format!(
                "a user-defined scope has 1 to 4 groups, not {}",
                groups.len()
            )));
        }
        let mut value = 0u32;
        let mut seen = 0u32;
        for (i, group) in groups.iter().enumerate() {
            let mut byte = 0u32;
            for &member in group.iter() {
                if member >= 8 {
                    return Err(Error::Schema(format!("scope member {} out of range", member)));
                }
                byte |= 1 << member;
            }
            if byte == 0 || byte & seen != 0 {
                return Err(Error::Schema(
                    "scope groups must be non-empty and disjoint".into(),
                ));
            }
            seen |= byte;
            value |= byte << (8 * i);
        }
        Ok(ScopeMode::UserDefined(value))
    }

    /// Bitmask of the group containing `instance`, for user-defined scopes.
    pub fn group_of(&self, instance: u32) -> Option<u8> {
        match self {
            ScopeMode::UserDefined(value) if instance < 8 => value
                .to_le_bytes()
                .iter()
                .copied()
                .find(|byte| byte & (1 << instance) != 0),
            _ => None,
        }
    }

    fn to_proto(self) -> pb::Mode {
        let scope = match self {
            ScopeMode::Single => mode::Scope::Predef(mode::PredefinedMode::Single as i32),
            ScopeMode::All => mode::Scope::Predef(mode::PredefinedMode::All as i32),
            ScopeMode::UserDefined(v) => mode::Scope::UserDefined(v),
        };
        pb::Mode { scope: Some(scope) }
    }

    fn from_proto(m: Option<&pb::Mode>) -> Self {
        match m.and_then(|m| m.scope.as_ref()) {
            Some(mode::Scope::Predef(p)) if *p == mode::PredefinedMode::Single as i32 => {
                ScopeMode::Single
            }
            Some(mode::Scope::UserDefined(v)) => ScopeMode::UserDefined(*v),
            _ => ScopeMode::All,
        }
    }

    fn check(&self, dimension: &str, id: u32, all: u32) -> std::result::Result<(), String> {
        match self {
            ScopeMode::Single if id == all => Err(format!(
                "{} scope is single but the target names all {}s",
                dimension, dimension
            )),
            ScopeMode::All if id != all => Err(format!(
                "{} scope is all but the target names {} {}",
                dimension, dimension, id
            )),
            ScopeMode::UserDefined(_) if id == all || self.group_of(id).is_none() => Err(format!(
                "{} {} is not in any group of the user-defined {} scope",
                dimension,
                if id == all { "all".to_string() } else { id.to_string() },
                dimension
            )),
            _ => Ok(()),
        }
    }
}

impl Display for ScopeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeMode::Single => write!(f, "single"),
            ScopeMode::All => write!(f, "all"),
            ScopeMode::UserDefined(v) => {
                write!(f, "user-defined")?;
                for byte in v.to_le_bytes().iter().filter(|&&b| b != 0) {
                    let members: Vec<String> =
                        (0..8).filter(|i| byte & (1 << i) != 0).map(|i| i.to_string()).collect();
                    write!(f, " {{{}}}", members.join(","))?;
                }
                Ok(())
            }
        }
    }
}

/// A table's entry scope: how its entries are shared across directions, pipes and parsers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntryScope {
    pub gress: ScopeMode,
    pub pipe: ScopeMode,
    pub parser: ScopeMode,
}

impl Default for EntryScope {
    fn default() -> Self {
        EntryScope {
            gress: ScopeMode::All,
            pipe: ScopeMode::All,
            parser: ScopeMode::All,
        }
    }
}

impl EntryScope {
    pub fn new(gress: ScopeMode, pipe: ScopeMode, parser: ScopeMode) -> Self {
        EntryScope { gress, pipe, parser }
    }

    /// Checks that `target` addresses exactly one instance of this scope.
    pub fn validate(&self, target: &Target, table: &str) -> Result<()> {
        let fail = |reason| Error::ScopeMismatch {
            table: table.into(),
            reason,
        };
        let gress = match target.direction {
            Direction::All => DIRECTION_ALL,
            d => d.to_wire(),
        };
        self.gress.check("direction", gress, DIRECTION_ALL).map_err(fail)?;
        self.pipe.check("pipe", target.pipe_id, PIPE_ALL).map_err(fail)?;
        self.parser.check("parser", target.parser_id, PARSER_ALL).map_err(fail)?;
        Ok(())
    }

    /// Pipes that share entries with `target` among `num_pipes`.  `target` must already have
    /// passed [`EntryScope::validate`].
    pub fn pipes(&self, target: &Target, num_pipes: u32) -> Vec<u32> {
        match self.pipe {
            ScopeMode::All => (0..num_pipes).collect(),
            ScopeMode::Single => vec![target.pipe_id],
            ScopeMode::UserDefined(_) => match self.pipe.group_of(target.pipe_id) {
                Some(group) => (0..num_pipes.min(8)).filter(|p| group & (1 << p) != 0).collect(),
                None => Vec::new(),
            },
        }
    }

    pub fn to_proto(&self) -> pb::EntryScope {
        pb::EntryScope {
            gress_scope: Some(self.gress.to_proto()),
            pipe_scope: Some(self.pipe.to_proto()),
            prsr_scope: Some(self.parser.to_proto()),
        }
    }
}

impl From<&pb::EntryScope> for EntryScope {
    fn from(s: &pb::EntryScope) -> Self {
        EntryScope {
            gress: ScopeMode::from_proto(s.gress_scope.as_ref()),
            pipe: ScopeMode::from_proto(s.pipe_scope.as_ref()),
            parser: ScopeMode::from_proto(s.prsr_scope.as_ref()),
        }
    }
}

impl Display for EntryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gress {}, pipe {}, parser {}",
            self.gress, self.pipe, self.parser
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_defaults_to_sentinels() {
        let t = Target::new(0).to_proto();
        assert_eq!((t.pipe_id, t.direction, t.prsr_id), (0xffff, 0xff, 0xff));
        let t = Target::new(0).pipe(2).direction(Direction::Egress);
        assert_eq!(Target::from(&t.to_proto()), t);
        assert_eq!(t.to_string(), "dev 0 pipe 2 egress");
    }

    #[test]
    fn user_defined_groups() {
        let mode = ScopeMode::groups(&[&[0, 1], &[2, 3]]).unwrap();
        assert_eq!(mode, ScopeMode::UserDefined(0x0c03));
        assert_eq!(mode.group_of(2), Some(0x0c));
        assert_eq!(mode.group_of(5), None);
        assert_eq!(mode.to_string(), "user-defined {0,1} {2,3}");
        assert!(ScopeMode::groups(&[&[0, 1], &[1, 2]]).is_err());
        assert!(ScopeMode::groups(&[]).is_err());
    }

    #[test]
    fn validation() {
        let symmetric = EntryScope::default();
        assert!(symmetric.validate(&Target::new(0), "t").is_ok());
        assert!(matches!(
            symmetric.validate(&Target::new(0).pipe(1), "t"),
            Err(Error::ScopeMismatch { .. })
        ));

        let asymmetric = EntryScope::new(ScopeMode::All, ScopeMode::Single, ScopeMode::All);
        assert!(asymmetric.validate(&Target::new(0).pipe(1), "t").is_ok());
        assert!(asymmetric.validate(&Target::new(0), "t").is_err());

        let grouped = EntryScope::new(
            ScopeMode::All,
            ScopeMode::groups(&[&[0, 1], &[2, 3]]).unwrap(),
            ScopeMode::All,
        );
        assert!(grouped.validate(&Target::new(0).pipe(2), "t").is_ok());
        assert!(grouped.validate(&Target::new(0), "t").is_err());
        assert!(grouped.validate(&Target::new(0).pipe(6), "t").is_err());
        assert_eq!(grouped.pipes(&Target::new(0).pipe(2), 4), vec![2, 3]);
        assert_eq!(symmetric.pipes(&Target::new(0), 4), vec![0, 1, 2, 3]);
    }

    #[test]
    fn proto_round_trip() {
        let scope = EntryScope::new(
            ScopeMode::Single,
            ScopeMode::UserDefined(0x0c03),
            ScopeMode::All,
        );
        assert_eq!(EntryScope::from(&scope.to_proto()), scope);
    }
}
