use std::sync::Arc;

use llm_gateway::{
    HealthMonitor, HealthSettings, KeyStatus, ProviderError, ProviderHandle, ProviderMode,
    ScriptedBackend,
};

fn keys(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{prefix}-{i:02}")).collect()
}

fn multi_key(name: &str, backend: &Arc<ScriptedBackend>) -> ProviderHandle {
    ProviderHandle::new(name, ProviderMode::MultiKey, backend.clone())
}

#[tokio::test]
async fn providers_with_active_keys_order_first() {
    let dead = Arc::new(ScriptedBackend::new("x"));
    dead.set_ping("x-00", Err(ProviderError::AuthFailed("revoked".into())));
    let alive = Arc::new(ScriptedBackend::new("y"));

    let monitor = HealthMonitor::new(
        vec![
            (multi_key("x", &dead), keys("x", 1)),
            (multi_key("y", &alive), keys("y", 2)),
        ],
        HealthSettings::default(),
    );
    monitor.ensure_initialized().await;

    let ordered: Vec<String> = monitor
        .ordered_providers()
        .into_iter()
        .map(|handle| handle.name)
        .collect();
    assert_eq!(ordered, vec!["y", "x"]);
    assert!(!monitor.is_active("x"));
    assert!(monitor.is_active("y"));
}

#[tokio::test]
async fn one_live_sample_activates_the_whole_pool() {
    let backend = Arc::new(ScriptedBackend::new("gemini"));
    backend
        .set_ping("g-00", Err(ProviderError::Unavailable("timeout".into())))
        .set_ping("g-09", Err(ProviderError::Other("bad gateway".into())));

    let monitor = HealthMonitor::new(
        vec![(multi_key("gemini", &backend), keys("g", 10))],
        HealthSettings::default(),
    );
    monitor.ensure_initialized().await;

    assert_eq!(backend.pinged_keys(), vec!["g-00", "g-05", "g-09"]);
    assert_eq!(monitor.active_key_count("gemini"), 10);
    assert_eq!(monitor.key_status("gemini", "g-03"), Some(KeyStatus::Active));
}

#[tokio::test]
async fn pool_is_inactive_when_every_sample_fails() {
    let backend = Arc::new(ScriptedBackend::new("gemini"));
    for key in ["g-00", "g-05", "g-09"] {
        backend.set_ping(key, Err(ProviderError::Unavailable("down".into())));
    }

    let monitor = HealthMonitor::new(
        vec![(multi_key("gemini", &backend), keys("g", 10))],
        HealthSettings::default(),
    );
    monitor.ensure_initialized().await;

    assert!(!monitor.is_active("gemini"));
    assert_eq!(monitor.master_keys("gemini").len(), 10);
    assert_eq!(
        monitor.key_status("gemini", "g-01"),
        Some(KeyStatus::RateLimited)
    );
}

#[tokio::test]
async fn rate_limited_ping_still_counts_as_alive() {
    let backend = Arc::new(ScriptedBackend::new("gemini"));
    backend.set_ping("g-00", Err(ProviderError::RateLimited("quota".into())));

    let monitor = HealthMonitor::new(
        vec![(multi_key("gemini", &backend), keys("g", 1))],
        HealthSettings::default(),
    );
    monitor.ensure_initialized().await;

    assert!(monitor.is_active("gemini"));
}

#[tokio::test]
async fn concurrent_callers_share_one_sweep() {
    let backend = Arc::new(ScriptedBackend::new("gemini"));
    let monitor = Arc::new(HealthMonitor::new(
        vec![(multi_key("gemini", &backend), keys("g", 2))],
        HealthSettings::default(),
    ));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.ensure_initialized().await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(backend.pinged_keys().len(), 2);
    assert!(!monitor.needs_refresh());
}

#[tokio::test]
async fn dead_keys_stay_evicted_across_sweeps() {
    let backend = Arc::new(ScriptedBackend::new("gemini"));
    backend.set_ping("g-01", Err(ProviderError::AuthFailed("revoked".into())));

    let monitor = HealthMonitor::new(
        vec![(multi_key("gemini", &backend), keys("g", 3))],
        HealthSettings::default(),
    );
    monitor.refresh().await;
    assert_eq!(monitor.master_keys("gemini"), vec!["g-00", "g-02"]);
    assert_eq!(monitor.key_status("gemini", "g-01"), Some(KeyStatus::Dead));

    monitor.refresh().await;
    let pinged = backend.pinged_keys();
    assert_eq!(pinged.iter().filter(|key| *key == "g-01").count(), 1);
    assert_eq!(monitor.active_keys("gemini"), vec!["g-00", "g-02"]);
}

#[tokio::test]
async fn rate_limited_keys_return_on_next_sweep() {
    let backend = Arc::new(ScriptedBackend::new("gemini"));
    let monitor = HealthMonitor::new(
        vec![(multi_key("gemini", &backend), keys("g", 3))],
        HealthSettings::default(),
    );
    monitor.refresh().await;

    monitor.mark_rate_limited("gemini", "g-00");
    assert_eq!(monitor.active_key_count("gemini"), 2);
    assert_eq!(
        monitor.key_status("gemini", "g-00"),
        Some(KeyStatus::RateLimited)
    );

    monitor.refresh().await;
    assert_eq!(monitor.active_key_count("gemini"), 3);
    assert_eq!(monitor.key_status("gemini", "g-00"), Some(KeyStatus::Active));
}

#[tokio::test]
async fn round_robin_cursor_is_shared_by_the_pool() {
    let backend = Arc::new(ScriptedBackend::new("gemini"));
    let monitor = HealthMonitor::new(
        vec![(multi_key("gemini", &backend), keys("g", 3))],
        HealthSettings::default(),
    );
    monitor.refresh().await;

    let picked: Vec<String> = (0..4)
        .filter_map(|_| monitor.next_key("gemini"))
        .collect();
    assert_eq!(picked, vec!["g-00", "g-01", "g-02", "g-00"]);
    assert!(monitor.next_key("unknown").is_none());
}

#[tokio::test]
async fn snapshot_reports_pool_sizes() {
    let backend = Arc::new(ScriptedBackend::new("gemini"));
    backend.set_ping("g-00", Err(ProviderError::AuthFailed("revoked".into())));
    let monitor = HealthMonitor::new(
        vec![(multi_key("gemini", &backend), keys("g", 3))],
        HealthSettings::default(),
    );
    assert!(monitor.snapshot()[0].last_ping_time.is_none());

    monitor.refresh().await;
    let report = &monitor.snapshot()[0];
    assert!(report.is_active);
    assert_eq!(report.active_keys, 2);
    assert_eq!(report.total_keys, 2);
    assert_eq!(report.dead_keys, 1);
    assert!(report.last_ping_time.is_some());
}
