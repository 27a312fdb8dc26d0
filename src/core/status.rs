//! core::status
//!
//! The closed status vocabulary shared by plans, tasks, and steps: `TODO`,
//! `ACTIVE`, `DONE`, plus the `UNKNOWN` sentinel that is returned for
//! unrecognized input but is never itself written back to a file.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("'{0}' is not a recognized status code")]
pub struct UnknownStatus(String);

/// A canonical status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Todo,
    Active,
    Done,
    /// Never persisted; returned only from [`Status::from_str_lossy`] when
    /// the input does not normalize to a canonical code.
    #[serde(skip)]
    Unknown,
}

impl Status {
    pub fn code(self) -> &'static str {
        match self {
            Status::Todo => "TODO",
            Status::Active => "ACTIVE",
            Status::Done => "DONE",
            Status::Unknown => "UNKNOWN",
        }
    }

    /// Normalize and parse, returning [`Status::Unknown`] instead of an
    /// error for unrecognized input.
    pub fn from_str_lossy(value: &str) -> Self {
        match normalize_status(value, true) {
            Ok(code) => match code.as_str() {
                "TODO" => Status::Todo,
                "ACTIVE" => Status::Active,
                "DONE" => Status::Done,
                _ => Status::Unknown,
            },
            Err(_) => Status::Unknown,
        }
    }

    /// Strict parse: unrecognized input is an error, matching the
    /// `allow_unknown=False` path used when a status is about to be
    /// written to disk.
    pub fn parse_strict(value: &str) -> Result<Self, UnknownStatus> {
        let code = normalize_status(value, false).map_err(|_| UnknownStatus(value.to_string()))?;
        match code.as_str() {
            "TODO" => Ok(Status::Todo),
            "ACTIVE" => Ok(Status::Active),
            "DONE" => Ok(Status::Done),
            _ => Err(UnknownStatus(value.to_string())),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Done)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Trim, uppercase, and map internal whitespace to underscores.
///
/// When `allow_unknown` is false, the normalized value must be one of the
/// three canonical codes or this returns an error; when true, any
/// normalized string is accepted (the caller decides what to do with a
/// non-canonical result).
pub fn normalize_status(value: &str, allow_unknown: bool) -> Result<String, UnknownStatus> {
    let normalized = value.trim().to_uppercase().replace(' ', "_");
    if allow_unknown {
        return Ok(normalized);
    }
    match normalized.as_str() {
        "TODO" | "ACTIVE" | "DONE" => Ok(normalized),
        _ => Err(UnknownStatus(value.to_string())),
    }
}

/// A human label for a status, falling back to the trimmed original text
/// if it does not normalize to a canonical code.
pub fn status_label(value: &str) -> String {
    match normalize_status(value, false) {
        Ok(code) => code,
        Err(_) => value.trim().to_string(),
    }
}
