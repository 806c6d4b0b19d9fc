//! Process wiring for the hermes controller: CLI flags, configuration
//! loading, tracing initialization, and graceful shutdown
//! (`SPEC_FULL.md` §1, §6). Everything below this module is the core
//! described in `spec.md` — this file only assembles it and hands it a
//! cancellation token rooted at the process.

mod settings;

use anyhow::Context;
use clap::Parser;
use hermes_client::ControlPlaneClient;
use hermes_core::{Config, SharedRevision};
use hermes_kv::{EtcdKv, EtcdKvConfig};
use hermes_runtime::elect::LeaderFlag;
use hermes_runtime::Pipeline;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Configuration reconciliation controller bridging the control plane to
/// the gateway etcd registry.
#[derive(Parser, Debug)]
#[command(name = "hermes-controller", author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file (without the `.toml` extension is
    /// also accepted). Missing file is not an error if `HERMES_*`
    /// environment variables supply everything required.
    #[arg(long, env = "HERMES_CONFIG", default_value = "config/hermes")]
    config: String,

    /// Load configuration, print it, and exit without connecting to
    /// anything. Useful for verifying layered file/env configuration before
    /// a real rollout.
    #[arg(long)]
    print_config: bool,
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();
}

/// Process identity: used as the campaign value in leader election and as
/// the `id` field in heartbeat reports (`spec.md` §3, "Controller identity").
fn controller_identity() -> anyhow::Result<String> {
    let host = hostname::get().context("failed to read process hostname")?;
    Ok(host.to_string_lossy().into_owned())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // hyper-rustls needs a process-wide default crypto provider installed
    // before the first TLS connection; `rustls` is built with only the
    // `ring` feature enabled, so this never conflicts with another provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let args = Args::parse();

    if args.print_config {
        let mut config = settings::load(&args.config)?;
        if config.auth.secret_key.is_some() {
            config.auth.secret_key = Some("<redacted>".to_string());
        }
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    init_tracing();

    if let Err(err) = run(args).await {
        error!(error = %err, "controller exited with a fatal error");
        return Err(err);
    }
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = settings::load(&args.config)?;
    let identity = controller_identity()?;
    info!(%identity, url = %config.control_plane.url, "starting hermes controller");

    let pipeline = build_pipeline(config, identity).await?;

    let root = CancellationToken::new();
    let shutdown_root = root.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received, cancelling controller");
        shutdown_root.cancel();
    });

    hermes_runtime::supervisor::run(pipeline, root).await;
    info!("controller shut down cleanly");
    Ok(())
}

/// Builds the shared pipeline state: KV client, control-plane client, and
/// the two process-lifetime atomics (revision, leader flag).
async fn build_pipeline(config: Config, identity: String) -> anyhow::Result<Pipeline> {
    let etcd_config = EtcdKvConfig {
        endpoints: config.etcd.endpoints.clone(),
        username: config.etcd.username.clone(),
        password: config.etcd.password.clone(),
    };
    let kv = EtcdKv::connect(&etcd_config)
        .await
        .map_err(hermes_runtime::Error::KvConnect)
        .context("failed to connect to the etcd KV store")?;

    let control = ControlPlaneClient::new(&config.control_plane, config.auth.clone());

    Ok(Pipeline {
        config,
        kv: Arc::new(kv),
        control: Arc::new(control),
        identity,
        started_at: chrono::Utc::now(),
        revision: SharedRevision::new(),
        leader_flag: LeaderFlag::new(),
    })
}

/// Resolves on either Ctrl-C or, on Unix, SIGTERM — whichever arrives first.
/// Mirrors the teacher's habit of tying the root cancellation context to the
/// process's own signal handling rather than a bespoke shutdown channel.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let ctrl_c = tokio::signal::ctrl_c();
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler, falling back to ctrl_c only");
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
