//! Provider and API-key liveness tracking
//!
//! The monitor owns the master key list of every provider, the subset that is
//! currently usable, and the pool-wide round-robin cursor. A sweep pings a
//! representative sample of each pool and recomputes the active set; keys
//! that fail authentication are evicted from the master list for the life of
//! the process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::ModelBackend;
use crate::errors::ProviderError;
use crate::metrics;
use crate::types::ProviderMode;

/// Sweep interval used when none is configured.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Pools larger than this are sampled instead of pinged key by key.
const SAMPLE_THRESHOLD: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    Active,
    /// Not usable until the next sweep (quota hit, or the pool failed its ping)
    RateLimited,
    /// Rejected credentials; never reconsidered
    Dead,
}

/// A configured provider as seen by the router
#[derive(Clone)]
pub struct ProviderHandle {
    pub name: String,
    pub mode: ProviderMode,
    pub backend: Arc<dyn ModelBackend>,
}

impl ProviderHandle {
    pub fn new(name: impl Into<String>, mode: ProviderMode, backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            name: name.into(),
            mode,
            backend,
        }
    }
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("backend", &self.backend.name())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct HealthSettings {
    pub refresh_interval: Duration,
    pub ping_timeout: Duration,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            ping_timeout: Duration::from_secs(10),
        }
    }
}

/// Serializable view of one provider's health
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub provider: String,
    pub is_active: bool,
    pub active_keys: usize,
    pub total_keys: usize,
    pub dead_keys: usize,
    pub last_ping_time: Option<DateTime<Utc>>,
}

struct ProviderState {
    handle: ProviderHandle,
    master_keys: Vec<String>,
    active_keys: Vec<String>,
    statuses: HashMap<String, KeyStatus>,
    last_ping: Option<DateTime<Utc>>,
    swept_active: bool,
}

impl ProviderState {
    fn evict_active(&mut self, key: &str) -> bool {
        let before = self.active_keys.len();
        self.active_keys.retain(|candidate| candidate != key);
        before != self.active_keys.len()
    }
}

enum PingVerdict {
    Alive,
    Dead,
    Unreachable,
}

pub struct HealthMonitor {
    providers: RwLock<Vec<ProviderState>>,
    cursors: HashMap<String, AtomicUsize>,
    last_sweep: RwLock<Option<Instant>>,
    sweep_lock: Mutex<()>,
    settings: HealthSettings,
}

impl HealthMonitor {
    /// Build a monitor from `(provider, keys)` pairs in declaration order.
    ///
    /// Nothing is active until the first sweep.
    pub fn new(providers: Vec<(ProviderHandle, Vec<String>)>, settings: HealthSettings) -> Self {
        let cursors = providers
            .iter()
            .map(|(handle, _)| (handle.name.clone(), AtomicUsize::new(0)))
            .collect();
        let providers = providers
            .into_iter()
            .map(|(handle, keys)| {
                let mut master_keys: Vec<String> = keys
                    .into_iter()
                    .map(|key| key.trim().to_string())
                    .filter(|key| !key.is_empty())
                    .collect();
                master_keys.sort();
                master_keys.dedup();
                ProviderState {
                    handle,
                    master_keys,
                    active_keys: Vec::new(),
                    statuses: HashMap::new(),
                    last_ping: None,
                    swept_active: false,
                }
            })
            .collect();
        Self {
            providers: RwLock::new(providers),
            cursors,
            last_sweep: RwLock::new(None),
            sweep_lock: Mutex::new(()),
            settings,
        }
    }

    pub fn settings(&self) -> &HealthSettings {
        &self.settings
    }

    /// True when no sweep ran yet or the last one is older than the interval
    pub fn needs_refresh(&self) -> bool {
        match *self.last_sweep.read() {
            Some(at) => at.elapsed() > self.settings.refresh_interval,
            None => true,
        }
    }

    /// Run a sweep if the state is stale. Concurrent callers wait for the
    /// single in-flight sweep instead of starting their own.
    pub async fn ensure_initialized(&self) {
        if !self.needs_refresh() {
            return;
        }
        let _guard = self.sweep_lock.lock().await;
        if !self.needs_refresh() {
            return;
        }
        self.run_sweep().await;
    }

    /// Force a sweep regardless of staleness
    pub async fn refresh(&self) {
        let _guard = self.sweep_lock.lock().await;
        self.run_sweep().await;
    }

    async fn run_sweep(&self) {
        let plan: Vec<(String, Arc<dyn ModelBackend>, Vec<String>)> = self
            .providers
            .read()
            .iter()
            .map(|state| {
                (
                    state.handle.name.clone(),
                    state.handle.backend.clone(),
                    sample_keys(&state.master_keys),
                )
            })
            .collect();

        let mut results = Vec::with_capacity(plan.len());
        for (provider, backend, sample) in plan {
            let mut verdicts = Vec::with_capacity(sample.len());
            for key in sample {
                let verdict = self.ping_key(&provider, backend.as_ref(), &key).await;
                verdicts.push((key, verdict));
            }
            results.push((provider, verdicts));
        }

        let now = Utc::now();
        {
            let mut providers = self.providers.write();
            for (provider, verdicts) in results {
                let Some(state) = providers
                    .iter_mut()
                    .find(|state| state.handle.name == provider)
                else {
                    continue;
                };
                let mut alive = false;
                for (key, verdict) in verdicts {
                    match verdict {
                        PingVerdict::Alive => alive = true,
                        PingVerdict::Dead => {
                            state.master_keys.retain(|candidate| candidate != &key);
                            state.statuses.insert(key, KeyStatus::Dead);
                            metrics::record_eviction(&provider, "auth_failed");
                        }
                        PingVerdict::Unreachable => {}
                    }
                }

                let status = if alive {
                    KeyStatus::Active
                } else {
                    KeyStatus::RateLimited
                };
                for key in &state.master_keys {
                    state.statuses.insert(key.clone(), status);
                }
                state.active_keys = if alive {
                    state.master_keys.clone()
                } else {
                    Vec::new()
                };
                state.swept_active = alive;
                state.last_ping = Some(now);
                metrics::record_sweep(&provider, alive);
                info!(
                    target: "llm_gateway::health",
                    provider = %provider,
                    active = alive,
                    keys = state.master_keys.len(),
                    "provider health sweep finished"
                );
            }
        }
        *self.last_sweep.write() = Some(Instant::now());
    }

    async fn ping_key(&self, provider: &str, backend: &dyn ModelBackend, key: &str) -> PingVerdict {
        let outcome = tokio::time::timeout(self.settings.ping_timeout, backend.ping(key)).await;
        match outcome {
            Ok(Ok(())) => PingVerdict::Alive,
            Ok(Err(err)) if err.proves_key_alive() => {
                debug!(provider, key = %mask_key(key), "ping rate limited; key still authenticates");
                PingVerdict::Alive
            }
            Ok(Err(ProviderError::AuthFailed(reason))) => {
                warn!(provider, key = %mask_key(key), %reason, "ping rejected credentials; evicting key");
                PingVerdict::Dead
            }
            Ok(Err(err)) => {
                debug!(provider, key = %mask_key(key), %err, "ping failed");
                PingVerdict::Unreachable
            }
            Err(_) => {
                debug!(provider, key = %mask_key(key), "ping timed out");
                PingVerdict::Unreachable
            }
        }
    }

    /// Providers with at least one active key first, declaration order otherwise
    pub fn ordered_providers(&self) -> Vec<ProviderHandle> {
        let providers = self.providers.read();
        let mut ordered: Vec<(bool, ProviderHandle)> = providers
            .iter()
            .map(|state| (!state.active_keys.is_empty(), state.handle.clone()))
            .collect();
        ordered.sort_by_key(|(active, _)| !*active);
        ordered.into_iter().map(|(_, handle)| handle).collect()
    }

    pub fn is_active(&self, provider: &str) -> bool {
        self.active_key_count(provider) > 0
    }

    /// Whether the last sweep found the provider alive
    pub fn swept_active(&self, provider: &str) -> bool {
        self.with_state(provider, |state| state.swept_active)
            .unwrap_or(false)
    }

    pub fn active_key_count(&self, provider: &str) -> usize {
        self.with_state(provider, |state| state.active_keys.len())
            .unwrap_or(0)
    }

    pub fn active_keys(&self, provider: &str) -> Vec<String> {
        self.with_state(provider, |state| state.active_keys.clone())
            .unwrap_or_default()
    }

    pub fn master_keys(&self, provider: &str) -> Vec<String> {
        self.with_state(provider, |state| state.master_keys.clone())
            .unwrap_or_default()
    }

    /// First master key, whatever its status
    pub fn primary_key(&self, provider: &str) -> Option<String> {
        self.with_state(provider, |state| state.master_keys.first().cloned())
            .flatten()
    }

    pub fn key_status(&self, provider: &str, key: &str) -> Option<KeyStatus> {
        self.with_state(provider, |state| state.statuses.get(key).copied())
            .flatten()
    }

    /// Next active key using the provider-wide cursor
    pub fn next_key(&self, provider: &str) -> Option<String> {
        let providers = self.providers.read();
        let state = providers
            .iter()
            .find(|state| state.handle.name == provider)?;
        if state.active_keys.is_empty() {
            return None;
        }
        let cursor = self.cursors.get(provider)?;
        let index = cursor.fetch_add(1, Ordering::Relaxed) % state.active_keys.len();
        state.active_keys.get(index).cloned()
    }

    /// Remove a key from the active pool until the next sweep
    pub fn mark_rate_limited(&self, provider: &str, key: &str) {
        let mut providers = self.providers.write();
        if let Some(state) = providers
            .iter_mut()
            .find(|state| state.handle.name == provider)
        {
            if state.evict_active(key) {
                metrics::record_eviction(provider, "rate_limited");
            }
            if state.statuses.get(key) != Some(&KeyStatus::Dead) {
                state.statuses.insert(key.to_string(), KeyStatus::RateLimited);
            }
            info!(
                target: "llm_gateway::health",
                provider,
                key = %mask_key(key),
                remaining = state.active_keys.len(),
                "key rate limited; removed from active pool"
            );
        }
    }

    /// Remove a key from both pools for the life of the process
    pub fn mark_dead(&self, provider: &str, key: &str) {
        let mut providers = self.providers.write();
        if let Some(state) = providers
            .iter_mut()
            .find(|state| state.handle.name == provider)
        {
            state.evict_active(key);
            state.master_keys.retain(|candidate| candidate != key);
            state.statuses.insert(key.to_string(), KeyStatus::Dead);
            metrics::record_eviction(provider, "auth_failed");
            warn!(
                target: "llm_gateway::health",
                provider,
                key = %mask_key(key),
                remaining = state.master_keys.len(),
                "key permanently evicted"
            );
        }
    }

    pub fn snapshot(&self) -> Vec<ProviderHealth> {
        self.providers
            .read()
            .iter()
            .map(|state| ProviderHealth {
                provider: state.handle.name.clone(),
                is_active: !state.active_keys.is_empty(),
                active_keys: state.active_keys.len(),
                total_keys: state.master_keys.len(),
                dead_keys: state
                    .statuses
                    .values()
                    .filter(|status| **status == KeyStatus::Dead)
                    .count(),
                last_ping_time: state.last_ping,
            })
            .collect()
    }

    fn with_state<T>(&self, provider: &str, f: impl FnOnce(&ProviderState) -> T) -> Option<T> {
        let providers = self.providers.read();
        providers
            .iter()
            .find(|state| state.handle.name == provider)
            .map(f)
    }
}

/// First, middle and last key of a sorted pool; the whole pool when small
fn sample_keys(sorted: &[String]) -> Vec<String> {
    if sorted.len() <= SAMPLE_THRESHOLD {
        return sorted.to_vec();
    }
    let last = sorted.len() - 1;
    vec![
        sorted[0].clone(),
        sorted[sorted.len() / 2].clone(),
        sorted[last].clone(),
    ]
}

/// Log-safe rendering of a credential
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}
