//! podnet-admission - admission-time pod mutation for ENI networking
//!
//! When a pod is created, the webhook decides what network attachments it
//! needs before the scheduler sees it:
//! - which NetworkProfile applies, by pod and namespace label selectors or
//!   by explicit request annotation
//! - which zones it may run in, including the zone of ENIs it held before
//!   if its identity survives recreation
//! - how many ENIs it needs, and whether they are trunk members or
//!   dedicated
//!
//! # Modules
//!
//! - [`crd`] - NetworkProfile and AttachmentRecord custom resources
//! - [`selector`] - Label selector evaluation
//! - [`owner`] - Owner-kind taxonomy (stable, node-local, churning)
//! - [`network`] - Network requests and pod annotations
//! - [`store`] - Read access to cluster state
//! - [`mutation`] - The admission pipeline
//! - [`webhook`] - AdmissionReview HTTP handler
//! - [`config`] - Command-line configuration
//! - [`telemetry`], [`metrics`] - Logging, tracing and metrics
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod config;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod mutation;
pub mod network;
pub mod owner;
pub mod selector;
pub mod store;
pub mod telemetry;
pub mod webhook;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
