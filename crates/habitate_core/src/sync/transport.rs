//! Host-implemented push transport.
//!
//! # Invariants
//! - Transport ids are lowercase ASCII (`[a-z0-9_-]+`).
//! - A conflict error is never retried; the server copy wins.

use crate::model::sync::{SyncEntityType, SyncOperation, SyncOperationKind};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// One queued mutation shaped for a REST-style backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPushRequest {
    /// Remote collection, e.g. `habit-logs`.
    pub resource: String,
    pub entity_type: SyncEntityType,
    pub entity_id: String,
    pub operation: SyncOperationKind,
    pub payload: serde_json::Value,
}

impl SyncPushRequest {
    pub fn from_operation(op: &SyncOperation) -> Self {
        Self {
            resource: op.entity_type.resource().to_string(),
            entity_type: op.entity_type,
            entity_id: op.entity_id.clone(),
            operation: op.operation,
            payload: op.payload.clone(),
        }
    }

    /// HTTP verb a REST backend expects for this mutation.
    pub fn http_method(&self) -> &'static str {
        match self.operation {
            SyncOperationKind::Create => "POST",
            SyncOperationKind::Update => "PUT",
            SyncOperationKind::Delete => "DELETE",
        }
    }

    /// Relative path: the collection for creates, the item otherwise.
    pub fn path(&self) -> String {
        match self.operation {
            SyncOperationKind::Create => format!("/{}", self.resource),
            SyncOperationKind::Update | SyncOperationKind::Delete => {
                format!("/{}/{}", self.resource, self.entity_id)
            }
        }
    }
}

/// Failure reported by a transport for one push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTransportError {
    /// Stable machine code, e.g. `http_503` or `offline`.
    pub code: String,
    pub message: String,
    pub retryable: bool,
    /// Backend rejected the write because its copy differs.
    pub conflict: bool,
}

impl SyncTransportError {
    pub fn retryable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable: true,
            conflict: false,
        }
    }

    pub fn permanent(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable: false,
            conflict: false,
        }
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable: false,
            conflict: true,
        }
    }

    /// Classifies an HTTP failure status.
    ///
    /// `409` is a conflict; `408`, `429` and `5xx` are retryable; any other
    /// status is permanent.
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        let code = format!("http_{status}");
        match status {
            409 => Self::conflict(code, message),
            408 | 429 | 500..=599 => Self::retryable(code, message),
            _ => Self::permanent(code, message),
        }
    }
}

impl Display for SyncTransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for SyncTransportError {}

/// Backend adapter that delivers queued mutations.
pub trait SyncTransport {
    fn transport_id(&self) -> &str;
    /// Delivers one mutation; `Ok` means the backend acknowledged it.
    fn push(&self, request: &SyncPushRequest) -> Result<(), SyncTransportError>;
}

impl<T: SyncTransport + ?Sized> SyncTransport for &T {
    fn transport_id(&self) -> &str {
        (**self).transport_id()
    }

    fn push(&self, request: &SyncPushRequest) -> Result<(), SyncTransportError> {
        (**self).push(request)
    }
}

pub(crate) fn is_valid_transport_id(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}
