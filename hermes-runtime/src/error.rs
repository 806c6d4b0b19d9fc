//! Fatal errors from the controller runtime (`spec.md` §7). Everything else
//! — transient upstream failures, transient KV failures, session loss,
//! protocol mismatches — is logged and swallowed inside the relevant loop so
//! it can self-heal on the next tick; only conditions that leave the process
//! unable to make progress at all surface here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to construct KV client: {0}")]
    KvConnect(#[source] hermes_kv::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
