//! Outbound sync plumbing: dispatch configuration and the host transport seam.
//!
//! The core never talks to the network itself. A host either implements
//! [`transport::SyncTransport`] and lets `SyncService` drive the queue, or
//! claims batches and reports outcomes through the FFI layer.

pub mod config;
pub mod transport;
