// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of handing a method call to the dispatcher.
///
/// This is the transport-layer verdict only; the domain answer arrives later
/// through the per-method reply event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    /// The call is in flight; a reply or error event will follow.
    Ok,
    /// No session with a controller service.
    NotConnected,
    /// The transport refused the call outright.
    Failure,
}

impl ClientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NotConnected => "NOT_CONNECTED",
            Self::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport error surfaced through the global error event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// A method call produced no reply in time.
    MethodCallTimeout,
    /// Announcement registration failed at startup.
    RegistrationFailed,
    /// The transport is beyond recovery; restart the client.
    Irrecoverable,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MethodCallTimeout => "METHOD_CALL_TIMEOUT",
            Self::RegistrationFailed => "REGISTRATION_FAILED",
            Self::Irrecoverable => "IRRECOVERABLE",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
