//! Server version numbers.
//!
//! Versions are reported by nodes as free-form strings such as `"4.0.1"`,
//! `"3.11.4-SNAPSHOT"` or `"6.8.0-dse"`. Only the leading dotted numeric
//! part matters for feature detection, so parsing is prefix-based: the
//! scanner reads up to three `.`-separated integers from the start of the
//! string and ignores whatever follows.

use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// A `(major, minor, patch)` version triple ordered lexicographically.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct VersionNumber {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl VersionNumber {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse the leading `major.minor[.patch]` of `version`.
    ///
    /// At least major and minor must be present; patch defaults to 0.
    /// Trailing text after the last matched component is ignored.
    pub fn parse(version: &str) -> Result<Self> {
        let invalid = || Error::InvalidVersion(version.to_owned());

        let mut components = [0u32; 3];
        let mut matched = 0;
        let mut rest = version;

        for (index, slot) in components.iter_mut().enumerate() {
            if index > 0 {
                match rest.strip_prefix('.') {
                    Some(tail) => rest = tail,
                    None => break,
                }
            }
            let Some((digits, tail)) = split_number(rest) else {
                break;
            };
            *slot = digits.parse().map_err(|_| invalid())?;
            rest = tail;
            matched += 1;
        }

        if matched < 2 {
            return Err(invalid());
        }

        let [major, minor, patch] = components;
        Ok(Self::new(major, minor, patch))
    }
}

/// Split a run of ASCII digits (after optional leading whitespace) off the
/// front of `input`.
fn split_number(input: &str) -> Option<(&str, &str)> {
    let trimmed = input.trim_start();
    let end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    if end == 0 {
        return None;
    }
    Some(trimmed.split_at(end))
}

impl FromStr for VersionNumber {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
