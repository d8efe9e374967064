//! Hierarchy helpers and resource patterns over PIDs.
//!
//! Patterns join levels with `-`, the same way addresses are written:
//!
//! | Pattern     | Matches                                          |
//! |-------------|--------------------------------------------------|
//! | `*`         | every PID                                        |
//! | `JP`        | PIDs at country precision in JP                  |
//! | `JP-*`      | every JP PID                                     |
//! | `JP-13`     | PIDs at admin1 precision under JP admin1 `13`    |
//! | `JP-13-*`   | every PID under JP admin1 `13`                   |
//! | `JP-*-101`  | admin2 `101` under any JP admin1, at that depth  |
//!
//! A component may itself contain `-` (`1-1` is a perfectly good chome).
//! Matching walks the PID's actual levels, so a literal level `1-1`
//! consumes the two pattern tokens `1` and `1`, while `*` stands for one
//! whole level.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::codec::Pid;
use super::PidError;

/// A pattern naming a subtree of the address hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourcePattern {
    /// `-`-separated tokens, country first. `None` is a single-level wildcard.
    segments: Vec<Option<String>>,
    /// Trailing `-*`: anything at or below the listed levels.
    open: bool,
}

impl ResourcePattern {
    /// The pattern that matches everything.
    pub fn any() -> Self {
        Self {
            segments: Vec::new(),
            open: true,
        }
    }

    pub fn parse(s: &str) -> Result<Self, PidError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PidError::Malformed("empty resource pattern".into()));
        }
        let mut parts: Vec<&str> = s.split('-').collect();
        let open = parts.last() == Some(&"*");
        if open {
            parts.pop();
        }
        let segments = parts
            .into_iter()
            .map(|p| match p {
                "*" => Ok(None),
                "" => Err(PidError::Malformed("empty pattern segment".into())),
                literal => Ok(Some(literal.to_ascii_uppercase())),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { segments, open })
    }

    /// Does `pid` fall inside this pattern? Undecodable PIDs never match.
    pub fn matches(&self, pid: &Pid) -> bool {
        let Ok(decoded) = pid.inspect() else {
            return false;
        };
        let mut path: Vec<Option<&str>> = vec![Some(decoded.address.country.as_str())];
        path.extend(decoded.address.disclosed(decoded.precision));

        let mut next = 0;
        for level in path {
            match self.segments.get(next) {
                // Pattern used up with levels left over.
                None => return self.open,
                Some(None) => next += 1,
                Some(Some(_)) => {
                    let Some(level) = level else {
                        return false;
                    };
                    for part in level.split('-') {
                        match self.segments.get(next) {
                            Some(Some(literal)) if literal == part => next += 1,
                            _ => return false,
                        }
                    }
                }
            }
        }
        next == self.segments.len()
    }
}

impl fmt::Display for ResourcePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<&str> = self
            .segments
            .iter()
            .map(|s| s.as_deref().unwrap_or("*"))
            .collect();
        if self.open {
            parts.push("*");
        }
        f.write_str(&parts.join("-"))
    }
}

impl FromStr for ResourcePattern {
    type Err = PidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ResourcePattern {
    type Error = PidError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ResourcePattern> for String {
    fn from(p: ResourcePattern) -> Self {
        p.to_string()
    }
}

/// Hierarchy depth of a PID: 1 for country only, up to 6 at block level.
pub fn depth(pid: &Pid) -> Result<usize, PidError> {
    Ok(pid.inspect()?.precision.depth() + 1)
}

/// `true` when `parent` is a strictly coarser PID whose disclosed levels
/// are a prefix of `child`'s.
pub fn is_parent_of(parent: &Pid, child: &Pid) -> Result<bool, PidError> {
    let p = parent.inspect()?;
    let c = child.inspect()?;
    if p.address.country != c.address.country || p.precision >= c.precision {
        return Ok(false);
    }
    let child_levels = c.address.disclosed(c.precision);
    Ok(p
        .address
        .disclosed(p.precision)
        .iter()
        .zip(child_levels.iter())
        .all(|(a, b)| a == b))
}
