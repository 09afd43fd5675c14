//! Shared test utilities for integration tests
//!
//! Scripted ledger and publisher collaborators, a throwaway workspace with
//! content to publish, and serialized access to process environment.

use async_trait::async_trait;
use parking_lot::Mutex;
use pinrelay::config::{Mode, RunConfig};
use pinrelay::context::PublishResult;
use pinrelay::error::{LedgerError, PublishError};
use pinrelay::ledger::{LedgerStatus, PaymentLedger};
use pinrelay::publish::{PublishRequest, StoragePublisher};
use pinrelay::types::TokenAmount;
use std::path::PathBuf;
use tempfile::TempDir;

/// Global mutex to serialize environment variable access across all tests
static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

pub fn amount(value: &str) -> TokenAmount {
    value.parse().unwrap()
}

#[derive(Debug, Default)]
struct LedgerState {
    balance: TokenAmount,
    status_calls: u32,
    deposits: Vec<TokenAmount>,
    releases: u32,
}

/// Ledger that keeps its balance in memory
pub struct FakeLedger {
    runway_rate: TokenAmount,
    failing: bool,
    state: Mutex<LedgerState>,
}

impl FakeLedger {
    pub fn new(balance: &str, runway_rate: &str) -> Self {
        Self {
            runway_rate: amount(runway_rate),
            failing: false,
            state: Mutex::new(LedgerState {
                balance: amount(balance),
                ..Default::default()
            }),
        }
    }

    /// Every call fails as if the gateway were down.
    pub fn unreachable() -> Self {
        Self {
            failing: true,
            ..Self::new("0", "0.01")
        }
    }

    pub fn balance(&self) -> TokenAmount {
        self.state.lock().balance
    }

    pub fn status_calls(&self) -> u32 {
        self.state.lock().status_calls
    }

    pub fn deposits(&self) -> Vec<TokenAmount> {
        self.state.lock().deposits.clone()
    }

    pub fn releases(&self) -> u32 {
        self.state.lock().releases
    }
}

#[async_trait]
impl PaymentLedger for FakeLedger {
    async fn current_status(&self) -> Result<LedgerStatus, LedgerError> {
        let mut state = self.state.lock();
        state.status_calls += 1;
        if self.failing {
            return Err(LedgerError::Request("Connection error: refused".to_string()));
        }
        Ok(LedgerStatus {
            balance: state.balance,
            runway_rate: self.runway_rate,
        })
    }

    async fn deposit(&self, amount: TokenAmount) -> Result<(), LedgerError> {
        if self.failing {
            return Err(LedgerError::Request("Connection error: refused".to_string()));
        }
        let mut state = self.state.lock();
        state.balance = state.balance.checked_add(amount).unwrap();
        state.deposits.push(amount);
        Ok(())
    }

    async fn release(&self) {
        self.state.lock().releases += 1;
    }
}

#[derive(Debug, Default)]
struct PublisherState {
    requests: Vec<PublishRequest>,
    releases: u32,
}

/// Storage publisher that records requests and answers with numbered pieces
#[derive(Default)]
pub struct FakePublisher {
    rejecting: bool,
    state: Mutex<PublisherState>,
}

impl FakePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting() -> Self {
        Self {
            rejecting: true,
            ..Self::default()
        }
    }

    pub fn publish_count(&self) -> usize {
        self.state.lock().requests.len()
    }

    pub fn requests(&self) -> Vec<PublishRequest> {
        self.state.lock().requests.clone()
    }

    pub fn releases(&self) -> u32 {
        self.state.lock().releases
    }
}

#[async_trait]
impl StoragePublisher for FakePublisher {
    async fn publish(&self, request: &PublishRequest) -> Result<PublishResult, PublishError> {
        let mut state = self.state.lock();
        state.requests.push(request.clone());
        if self.rejecting {
            return Err(PublishError::Rejected("400 Bad Request: no provider".to_string()));
        }
        Ok(PublishResult {
            content_hash: request.content_hash.clone(),
            piece_id: format!("piece-{}", state.requests.len()),
            dataset_id: "ds-1".to_string(),
            provider: request
                .provider
                .clone()
                .unwrap_or_else(|| "sp-1".to_string()),
            preview_locator: Some(format!("https://preview.test/{}", request.content_hash)),
        })
    }

    async fn release(&self) {
        self.state.lock().releases += 1;
    }
}

/// Temporary checkout with a small site under `site/`
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let workspace = Self {
            dir: TempDir::new().unwrap(),
        };
        workspace.write_site("<h1>hello</h1>");
        workspace
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn write_site(&self, index: &str) {
        let site = self.path("site");
        std::fs::create_dir_all(site.join("css")).unwrap();
        std::fs::write(site.join("index.html"), index).unwrap();
        std::fs::write(site.join("css/main.css"), "body { margin: 0 }").unwrap();
    }

    /// Config for `mode` with its own working area `work`.
    pub fn config(&self, mode: Mode, work: &str) -> RunConfig {
        RunConfig {
            mode,
            content_path: self.path("site"),
            work_dir: self.path(work),
            channel_dir: self.path("channel"),
            ledger_endpoint: Some("http://ledger.test".to_string()),
            storage_endpoint: Some("http://storage.test".to_string()),
            ..Default::default()
        }
    }
}

/// Restores the listed variables when dropped
struct EnvState {
    saved: Vec<(&'static str, Option<String>)>,
}

impl EnvState {
    fn capture(keys: &[&'static str]) -> Self {
        Self {
            saved: keys.iter().map(|k| (*k, std::env::var(k).ok())).collect(),
        }
    }
}

impl Drop for EnvState {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
        }
    }
}

/// Run `f` with HOME and XDG_CONFIG_HOME inside `test_dir` and the given
/// variables set. Everything is restored afterwards.
pub fn with_env<F, R>(test_dir: &TempDir, vars: &[(&'static str, &str)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let mut keys = vec!["HOME", "XDG_CONFIG_HOME"];
    keys.extend(vars.iter().map(|(k, _)| *k));
    let _state = EnvState::capture(&keys);

    let home = test_dir.path().join("home");
    std::fs::create_dir_all(&home).unwrap();
    std::env::set_var("HOME", &home);
    std::env::set_var("XDG_CONFIG_HOME", test_dir.path().join("xdg"));
    for (key, value) in vars {
        std::env::set_var(key, value);
    }

    f()
}
