//! `hostctl version`

use corelib::VersionNumber;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Serialize)]
pub struct VersionEntry {
    pub input: String,
    pub version: Option<VersionNumber>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VersionReport {
    pub entries: Vec<VersionEntry>,
}

impl VersionReport {
    pub fn all_parsed(&self) -> bool {
        self.entries.iter().all(|e| e.version.is_some())
    }
}

pub fn run(inputs: &[String]) -> VersionReport {
    let entries = inputs
        .iter()
        .map(|input| match VersionNumber::parse(input) {
            Ok(version) => VersionEntry {
                input: input.clone(),
                version: Some(version),
                error: None,
            },
            Err(err) => VersionEntry {
                input: input.clone(),
                version: None,
                error: Some(err.to_string()),
            },
        })
        .collect();
    VersionReport { entries }
}

impl fmt::Display for VersionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            match (&entry.version, &entry.error) {
                (Some(version), _) => writeln!(f, "{:?} -> {version}", entry.input)?,
                (None, Some(error)) => writeln!(f, "{:?} -> {error}", entry.input)?,
                (None, None) => writeln!(f, "{:?} -> ?", entry.input)?,
            }
        }
        Ok(())
    }
}
