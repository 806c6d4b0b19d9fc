//! Loads the validated [`hermes_core::Config`] from a TOML file layered under
//! environment variables (`SPEC_FULL.md` §6: "Config file format").
//!
//! Env vars win over the file, matching the common operator pattern of
//! "ship a file, override a field for this one deployment" — e.g.
//! `HERMES_ETCD__ENDPOINTS` overrides `[etcd] endpoints` from the file.

use anyhow::Context;
use hermes_core::Config;

/// Loads configuration: `path` (if it exists) first, then `HERMES_*`
/// environment variables on top. `path` is not required to exist — a
/// deployment driven entirely by environment variables is valid.
pub fn load(path: &str) -> anyhow::Result<Config> {
    let raw = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(
            config::Environment::with_prefix("HERMES")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("failed to assemble configuration from {path} and HERMES_* env vars"))?;

    raw.try_deserialize()
        .context("failed to deserialize configuration into the expected shape")
}
