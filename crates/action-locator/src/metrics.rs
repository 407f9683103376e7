use once_cell::sync::OnceCell;
use prometheus::{IntCounterVec, Opts, Registry};
use tracing::error;

static HEAL_OUTCOMES: OnceCell<IntCounterVec> = OnceCell::new();
static RESOLUTIONS: OnceCell<IntCounterVec> = OnceCell::new();

pub fn register_metrics(registry: &Registry) {
    let heals = IntCounterVec::new(
        Opts::new(
            "action_locator_heals_total",
            "Locator heal runs by context and outcome",
        ),
        &["context", "outcome"],
    )
    .expect("create heal outcome counter");
    if let Err(err) = registry.register(Box::new(heals.clone())) {
        error!(?err, "failed to register heal outcome counter");
    }
    let _ = HEAL_OUTCOMES.set(heals);

    let resolutions = IntCounterVec::new(
        Opts::new(
            "action_locator_resolutions_total",
            "Locator resolutions by path taken",
        ),
        &["path"],
    )
    .expect("create resolution counter");
    if let Err(err) = registry.register(Box::new(resolutions.clone())) {
        error!(?err, "failed to register resolution counter");
    }
    let _ = RESOLUTIONS.set(resolutions);
}

pub fn record_heal(context: &str, outcome: &str) {
    if let Some(counter) = HEAL_OUTCOMES.get() {
        counter.with_label_values(&[context, outcome]).inc();
    }
}

/// `path` is one of `cached`, `healed`, `unresolved`, `context_mismatch`
pub fn record_resolution(path: &str) {
    if let Some(counter) = RESOLUTIONS.get() {
        counter.with_label_values(&[path]).inc();
    }
}
