//! Control loops for the hermes controller.
//!
//! This crate has no knowledge of CLI parsing, config file loading, or
//! tracing initialization — see the `hermes` bin crate for process wiring.
//! It depends on `hermes-client::ControlPlane` and `hermes-kv::KvStore`
//! only through their trait objects, so every control loop here can be
//! driven in tests against fakes instead of live services.

pub mod applier;
pub mod elect;
pub mod error;
pub mod heartbeat;
pub mod instances;
pub mod poll;
pub mod reconcile;
pub mod supervisor;
pub mod writer;

pub use error::{Error, Result};
pub use supervisor::Pipeline;
