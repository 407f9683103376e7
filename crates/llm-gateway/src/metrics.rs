use once_cell::sync::OnceCell;
use prometheus::{IntCounterVec, Opts, Registry};
use tracing::error;

static PROVIDER_ATTEMPTS: OnceCell<IntCounterVec> = OnceCell::new();
static KEY_EVICTIONS: OnceCell<IntCounterVec> = OnceCell::new();
static HEALTH_SWEEPS: OnceCell<IntCounterVec> = OnceCell::new();

pub fn register_metrics(registry: &Registry) {
    let attempts = IntCounterVec::new(
        Opts::new(
            "llm_gateway_provider_attempts_total",
            "Provider invocations by provider, model and outcome",
        ),
        &["provider", "model", "outcome"],
    )
    .expect("create provider attempts counter");
    if let Err(err) = registry.register(Box::new(attempts.clone())) {
        error!(?err, "failed to register provider attempts counter");
    }
    let _ = PROVIDER_ATTEMPTS.set(attempts);

    let evictions = IntCounterVec::new(
        Opts::new(
            "llm_gateway_key_evictions_total",
            "API keys removed from a provider pool, by reason",
        ),
        &["provider", "reason"],
    )
    .expect("create key eviction counter");
    if let Err(err) = registry.register(Box::new(evictions.clone())) {
        error!(?err, "failed to register key eviction counter");
    }
    let _ = KEY_EVICTIONS.set(evictions);

    let sweeps = IntCounterVec::new(
        Opts::new(
            "llm_gateway_health_sweeps_total",
            "Provider health sweeps by provider and resulting state",
        ),
        &["provider", "state"],
    )
    .expect("create health sweep counter");
    if let Err(err) = registry.register(Box::new(sweeps.clone())) {
        error!(?err, "failed to register health sweep counter");
    }
    let _ = HEALTH_SWEEPS.set(sweeps);
}

pub fn record_attempt(provider: &str, model: &str, outcome: &str) {
    if let Some(counter) = PROVIDER_ATTEMPTS.get() {
        counter
            .with_label_values(&[provider, model, outcome])
            .inc();
    }
}

pub fn record_eviction(provider: &str, reason: &str) {
    if let Some(counter) = KEY_EVICTIONS.get() {
        counter.with_label_values(&[provider, reason]).inc();
    }
}

pub fn record_sweep(provider: &str, active: bool) {
    if let Some(counter) = HEALTH_SWEEPS.get() {
        let state = if active { "active" } else { "inactive" };
        counter.with_label_values(&[provider, state]).inc();
    }
}
