//! warden-node — the governance decision engine binary.
//!
//! Startup sequence:
//!   1. Load (or generate) the node's Ed25519 signing identity
//!   2. Open the ledger database
//!   3. Parse, validate, and publish the policy document
//!   4. Record the policy_loaded control event
//!   5. Start the JSON-RPC 2.0 server and serve decisions until shutdown

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use warden_core::constants::{DEFAULT_APPEND_WAITERS_MAX, IDEMPOTENCY_RETENTION_SECS};
use warden_core::types::Ed25519PublicKey;
use warden_crypto::{KeyRing, NodeSigner};
use warden_engine::PolicyEngine;
use warden_ledger::{Ledger, LedgerDb};
use warden_policy::{load_document, parse_json, ActivePolicy};
use warden_rpc::RpcServer;
use warden_service::{DecisionService, MemoryCounters, RoleApprovals};

#[derive(Parser, Debug)]
#[command(
    name = "warden-node",
    version,
    about = "Warden node — governance decisions with a tamper-evident ledger"
)]
struct Args {
    /// Directory for the persistent ledger database.
    #[arg(long, default_value = "~/.warden/data")]
    data_dir: PathBuf,

    /// JSON-RPC listen address.
    #[arg(long, default_value = "127.0.0.1:8545")]
    rpc_addr: SocketAddr,

    /// Path to the policy document (JSON).
    #[arg(long)]
    policy: PathBuf,

    /// Path to the signer key file (JSON). Generated on first run if absent.
    #[arg(long, default_value = "~/.warden/signer.json")]
    key_file: PathBuf,

    /// Optional JSON file mapping approver roles to verification key hexes.
    #[arg(long)]
    approvers: Option<PathBuf>,

    /// Sliding window of the built-in rate counters, seconds.
    #[arg(long, default_value_t = 60)]
    rate_window_secs: u32,

    /// Queued append waiters allowed per tenant before decisions are shed.
    #[arg(long, default_value_t = DEFAULT_APPEND_WAITERS_MAX)]
    max_append_waiters: usize,

    /// Idempotency retention window, seconds.
    #[arg(long, default_value_t = IDEMPOTENCY_RETENTION_SECS)]
    idempotency_retention_secs: i64,
}

/// On-disk signer identity. The seed is expected to be protected by an
/// out-of-band mechanism (file permissions, volume encryption).
#[derive(Serialize, Deserialize)]
struct SignerKeyFile {
    seed_hex: String,
    public_key_hex: String,
}

fn load_or_generate_signer(path: &Path) -> anyhow::Result<NodeSigner> {
    if path.exists() {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading key file {}", path.display()))?;
        let file: SignerKeyFile = serde_json::from_str(&text).context("parsing key file")?;
        let seed = hex::decode(&file.seed_hex).context("decoding key seed hex")?;
        let signer = NodeSigner::from_seed_bytes(&seed).context("restoring signer")?;
        info!(public_key = %signer.public_key().to_hex(), "signer key loaded");
        return Ok(signer);
    }

    let signer = NodeSigner::generate();
    let file = SignerKeyFile {
        seed_hex: hex::encode(signer.seed_bytes().as_ref()),
        public_key_hex: signer.public_key().to_hex(),
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating key dir {}", parent.display()))?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&file)?)
        .with_context(|| format!("writing key file {}", path.display()))?;
    warn!(path = %path.display(), "no signer key found — generated a fresh one");
    Ok(signer)
}

fn load_approvers(path: &Path) -> anyhow::Result<RoleApprovals> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading approvers file {}", path.display()))?;
    let map: HashMap<String, Vec<String>> =
        serde_json::from_str(&text).context("parsing approvers file")?;

    let mut registry = RoleApprovals::new();
    for (role, key_hexes) in map {
        for key_hex in key_hexes {
            let key = Ed25519PublicKey::from_hex(&key_hex)
                .map_err(|e| anyhow::anyhow!("approver key for role {role}: {e}"))?;
            registry.add_approver(&role, key);
        }
    }
    Ok(registry)
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,warden=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("warden node starting");

    // ── Signer identity ───────────────────────────────────────────────────────
    let key_file = expand_tilde(&args.key_file);
    let signer = Arc::new(load_or_generate_signer(&key_file)?);
    let keyring = Arc::new(KeyRing::single(signer.public_key()));

    // ── Ledger database ───────────────────────────────────────────────────────
    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let db = Arc::new(LedgerDb::open(&data_dir).context("opening ledger database")?);
    let ledger = Arc::new(Ledger::new(
        db,
        Arc::clone(&signer),
        keyring,
        args.max_append_waiters,
    ));

    // ── Policy ────────────────────────────────────────────────────────────────
    let policy_text = std::fs::read_to_string(&args.policy)
        .with_context(|| format!("reading policy document {}", args.policy.display()))?;
    let loaded = load_document(parse_json(&policy_text)?).context("loading policy")?;
    for warning in &loaded.warnings {
        warn!(rule_id = %warning.rule_id, "policy warning: {}", warning.message);
    }
    info!(
        policy_id = %loaded.policy.policy_id,
        version = %loaded.policy.version_string,
        hash = %loaded.policy.version_hash,
        "policy loaded"
    );
    let active = Arc::new(ActivePolicy::new(Arc::clone(&loaded.policy)));

    // ── Condition collaborators ───────────────────────────────────────────────
    let counters = Arc::new(MemoryCounters::new(args.rate_window_secs));
    let approvals = match &args.approvers {
        Some(path) => Arc::new(load_approvers(path)?),
        None => Arc::new(RoleApprovals::new()),
    };

    // ── Decision service ──────────────────────────────────────────────────────
    let rate: Arc<dyn warden_engine::RateLimitObserver> = Arc::clone(&counters) as Arc<dyn warden_engine::RateLimitObserver>;
    let approvals: Arc<dyn warden_engine::ApprovalVerifier> = approvals;
    let engine = PolicyEngine::new(rate, approvals);
    let service = Arc::new(
        DecisionService::new(
            active,
            engine,
            Arc::clone(&signer),
            Arc::clone(&ledger),
            args.idempotency_retention_secs,
        )
        .with_counters(counters),
    );
    service
        .record_policy_loaded(&loaded.policy, None)
        .context("recording policy_loaded event")?;

    // ── RPC server ────────────────────────────────────────────────────────────
    let rpc_handle = RpcServer::new(Arc::clone(&service))
        .start(args.rpc_addr)
        .await
        .context("starting RPC server")?;

    info!(addr = %args.rpc_addr, "warden node ready");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;

    info!("shutting down");
    let _ = rpc_handle.stop();
    Ok(())
}
