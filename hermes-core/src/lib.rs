//! Shared types for the hermes controller: the change/event wire model, the
//! desired-snapshot shape, canonicalization of opaque JSON payloads, and the
//! semantic configuration inputs described in the controller's design.
//!
//! This crate has no knowledge of HTTP or etcd — it is the client-less core
//! that both `hermes-client` and `hermes-kv` build on, and that
//! `hermes-runtime` wires together.

pub mod canon;
pub mod config;
pub mod error;
pub mod model;

pub use config::{AuthConfig, Config, ControlPlaneConfig, ElectionConfig, EtcdConfig};
pub use error::Error;
pub use model::{
    object_name, Action, ChangeEvent, ChangeResponse, ConfigEnvelope, ControllerStatus,
    ControllerStatusReport, DesiredSnapshot, InstanceRecord, InstancesReport, Kind, Revision,
    SharedRevision,
};

/// Convenience alias used throughout this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
