//! End-to-end smoke test for warden-node.
//!
//! Starts a real node process with a fresh ledger and policy, submits
//! decisions via JSON-RPC, and asserts tokens, chain growth, and chain
//! verification.
//!
//! Run with:
//!   cargo test -p warden-node --test smoke

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

// ── Node lifecycle ────────────────────────────────────────────────────────────

struct NodeGuard {
    child: Child,
    data_dir: PathBuf,
}

impl Drop for NodeGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.data_dir);
    }
}

/// Find a free TCP port on loopback.
fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

const POLICY_JSON: &str = r#"{
    "policy_id": "smoke",
    "version": "v1.0.0",
    "mode": "strict",
    "actions": [
        {"id": "search_web", "risk_level": 1},
        {"id": "send_email", "risk_level": 3}
    ],
    "actors": [{"id": "model", "trust_level": 1}],
    "rules": [
        {"type": "permits", "id": "p1", "actor": "model", "action": "search_web"},
        {"type": "forbids", "id": "f1", "actor": "model", "action": "send_email", "reason": "maintenance"}
    ],
    "default_token_ttl_secs": 600
}"#;

// ── RPC helpers ───────────────────────────────────────────────────────────────

async fn rpc_call(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1
    });
    let resp = client
        .post(url)
        .json(&body)
        .send()
        .await
        .unwrap_or_else(|e| panic!("RPC call {method} failed: {e}"));
    let json: serde_json::Value = resp.json().await.expect("parse RPC JSON");
    if let Some(err) = json.get("error") {
        if !err.is_null() {
            panic!("RPC error from {method}: {err}");
        }
    }
    json["result"].clone()
}

/// Poll until the RPC server responds or the timeout elapses.
async fn wait_for_rpc(client: &reqwest::Client, url: &str, timeout: Duration) -> bool {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "method": "warden_getVersion",
        "params": [],
        "id": 1
    });
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Ok(resp) = client.post(url).json(&body).send().await {
            if resp.status().is_success() {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    false
}

// ── Smoke test ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn smoke_decide_and_verify_chain() {
    // ── 1. Prepare temp dir, policy document, key location ────────────────────
    let data_dir = std::env::temp_dir().join(format!("warden_e2e_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&data_dir);
    std::fs::create_dir_all(&data_dir).unwrap();

    let policy_path = data_dir.join("policy.json");
    std::fs::write(&policy_path, POLICY_JSON).unwrap();
    let key_path = data_dir.join("signer.json");

    // ── 2. Start node ─────────────────────────────────────────────────────────
    let rpc_port = free_port();
    let rpc_url = format!("http://127.0.0.1:{rpc_port}");

    let node_bin = env!("CARGO_BIN_EXE_warden-node");
    let child = Command::new(node_bin)
        .args([
            "--data-dir",
            data_dir.join("ledger").to_str().unwrap(),
            "--rpc-addr",
            &format!("127.0.0.1:{rpc_port}"),
            "--policy",
            policy_path.to_str().unwrap(),
            "--key-file",
            key_path.to_str().unwrap(),
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn warden-node");

    let _guard = NodeGuard { child, data_dir };

    // ── 3. Wait for RPC ready ─────────────────────────────────────────────────
    let http = reqwest::Client::new();
    assert!(
        wait_for_rpc(&http, &rpc_url, Duration::from_secs(20)).await,
        "warden-node did not become ready within 20 seconds"
    );

    // ── 4. Active policy is the one we wrote ──────────────────────────────────
    let info = rpc_call(&http, &rpc_url, "warden_getPolicyInfo", serde_json::json!([])).await;
    assert_eq!(info["policy_id"], "smoke");
    assert_eq!(info["mode"], "strict");
    let policy_hash = info["version_hash"].as_str().unwrap().to_string();

    // ── 5. Allowed action mints a token and appends entry 1 ───────────────────
    let decision = rpc_call(
        &http,
        &rpc_url,
        "warden_decide",
        serde_json::json!([{
            "tenant_id": "acme",
            "actor_id": "model",
            "action_id": "search_web"
        }]),
    )
    .await;
    assert_eq!(decision["verdict"], "allow");
    assert_eq!(decision["seq"], 1);
    assert_eq!(decision["policy_version_hash"], policy_hash.as_str());
    let token_wire = decision["token"]["wire_hex"].as_str().unwrap().to_string();

    // ── 6. The minted token verifies and pins the same policy version ─────────
    let verification = rpc_call(
        &http,
        &rpc_url,
        "warden_verifyToken",
        serde_json::json!([token_wire]),
    )
    .await;
    assert_eq!(verification["valid"], true);
    assert_eq!(verification["bound_policy_version_hash"], policy_hash.as_str());

    // ── 7. Forbidden action denies with the authored reason ───────────────────
    let denied = rpc_call(
        &http,
        &rpc_url,
        "warden_decide",
        serde_json::json!([{
            "tenant_id": "acme",
            "actor_id": "model",
            "action_id": "send_email"
        }]),
    )
    .await;
    assert_eq!(denied["verdict"], "deny");
    assert!(denied["token"].is_null());
    let trace = denied["reason_trace"].as_array().unwrap();
    assert!(trace
        .iter()
        .any(|s| s["detail"].as_str() == Some("maintenance")));

    // ── 8. The tenant chain verifies end to end ───────────────────────────────
    let report = rpc_call(
        &http,
        &rpc_url,
        "warden_ledgerVerify",
        serde_json::json!(["acme", 1, 2]),
    )
    .await;
    assert_eq!(report["ok"], true);
    assert_eq!(report["entries_checked"], 2);

    // ── 9. Entries chain: entry 2 links to entry 1 ────────────────────────────
    let e1 = rpc_call(
        &http,
        &rpc_url,
        "warden_getLedgerEntry",
        serde_json::json!(["acme", 1]),
    )
    .await;
    let e2 = rpc_call(
        &http,
        &rpc_url,
        "warden_getLedgerEntry",
        serde_json::json!(["acme", 2]),
    )
    .await;
    assert_eq!(e2["previous_hash"], e1["entry_hash"]);

    // ── 10. The control chain recorded the policy load ────────────────────────
    let system = rpc_call(
        &http,
        &rpc_url,
        "warden_getLedgerEntry",
        serde_json::json!(["system", 1]),
    )
    .await;
    assert_eq!(system["event_type"], "policy_loaded");
}
