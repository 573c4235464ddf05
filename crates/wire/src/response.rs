// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Response and error codes shared by both tiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Per-call domain response code, returned alongside every method reply.
///
/// Domain errors are never fatal; transport failures surface separately as
/// [`BusError`] / client error callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseCode {
    #[serde(rename = "LSF_OK")]
    Ok,
    #[serde(rename = "LSF_ERR_INVALID")]
    ErrInvalid,
    #[serde(rename = "LSF_ERR_UNEXPECTED")]
    ErrUnexpected,
    #[serde(rename = "LSF_ERR_DEPENDENCY")]
    ErrDependency,
    #[serde(rename = "LSF_ERR_DEPENDENCY_CYCLE")]
    ErrDependencyCycle,
    #[serde(rename = "LSF_ERR_CAPACITY")]
    ErrCapacity,
    #[serde(rename = "LSF_ERR_LAMP_UNREACHABLE")]
    ErrLampUnreachable,
    #[serde(rename = "LSF_ERR_NOT_FOUND")]
    ErrNotFound,
    #[serde(rename = "LSF_ERR_BUSY")]
    ErrBusy,
    #[serde(rename = "LSF_ERR_REJECTED")]
    ErrRejected,
}

impl ResponseCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "LSF_OK",
            Self::ErrInvalid => "LSF_ERR_INVALID",
            Self::ErrUnexpected => "LSF_ERR_UNEXPECTED",
            Self::ErrDependency => "LSF_ERR_DEPENDENCY",
            Self::ErrDependencyCycle => "LSF_ERR_DEPENDENCY_CYCLE",
            Self::ErrCapacity => "LSF_ERR_CAPACITY",
            Self::ErrLampUnreachable => "LSF_ERR_LAMP_UNREACHABLE",
            Self::ErrNotFound => "LSF_ERR_NOT_FOUND",
            Self::ErrBusy => "LSF_ERR_BUSY",
            Self::ErrRejected => "LSF_ERR_REJECTED",
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-level failure for a single bus operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// No reply arrived in time.
    Timeout,
    /// No live session to carry the operation.
    NotConnected,
    /// The remote end refused the operation.
    Refused,
    /// The session or transport went away mid-operation.
    Closed,
}

impl BusError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "TIMEOUT",
            Self::NotConnected => "NOT_CONNECTED",
            Self::Refused => "REFUSED",
            Self::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for BusError {}
