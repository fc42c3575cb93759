//! Session lifecycle, connectivity events and the resync timer.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use shelflife_core::{Connectivity, ProductRecord, Severity, TransportError, ValidationError};
use shelflife_sync::{
    LoadOrchestrator, LoadOutcome, LoadSettings, ProbeResponse, ResyncScheduler, Session,
};
use shelflife_test_utils::{
    sample_records, CacheStore, DelayedSource, FetchScript, Harness, MemoryCacheBackend,
    RecordingUi, ScriptedSource,
};

const FETCH_DELAY: Duration = Duration::from_secs(5);

fn delayed_orchestrator(store: CacheStore, inner: ScriptedSource) -> Arc<LoadOrchestrator> {
    Arc::new(LoadOrchestrator::new(
        store,
        Arc::new(DelayedSource::new(inner, FETCH_DELAY)),
        Arc::new(RecordingUi::new()),
        LoadSettings::default(),
    ))
}

const PERIOD: Duration = Duration::from_secs(30 * 60);

fn session(h: &Harness) -> Session {
    Session::new(h.orchestrator.clone(), ResyncScheduler::new(PERIOD))
}

fn modified(etag: &str) -> Result<ProbeResponse, TransportError> {
    Ok(ProbeResponse::Modified {
        etag: Some(etag.to_string()),
    })
}

#[tokio::test(start_paused = true)]
async fn start_online_arms_resync() {
    let h = Harness::new(
        ScriptedSource::unchanged(&sample_records()),
        Connectivity::Online,
    );
    let session = session(&h);

    let report = session.start().await;

    assert_eq!(report.outcome, LoadOutcome::Fetched);
    assert!(session.is_resync_armed());
    session.stop();
    assert!(!session.is_resync_armed());
}

#[tokio::test(start_paused = true)]
async fn start_offline_does_not_arm() {
    let h = Harness::new(ScriptedSource::offline(), Connectivity::Offline);
    let session = session(&h);

    session.start().await;

    assert!(!session.is_resync_armed());
    assert!(!session.index().is_empty());
}

#[tokio::test(start_paused = true)]
async fn resync_tick_applies_update() {
    let h = Harness::new(
        ScriptedSource::unchanged(&sample_records()),
        Connectivity::Online,
    );
    let session = session(&h);
    session.start().await;
    assert_eq!(h.source.fetch_count(), 1);

    let updated = vec![ProductRecord::new("900900", "Yogurt", 21)];
    h.source.set_probe(modified("\"v2\""));
    h.source
        .push_fetch(FetchScript::json(&updated, Some("\"v2\"")));

    tokio::time::sleep(PERIOD + Duration::from_secs(1)).await;

    assert_eq!(h.source.fetch_count(), 2);
    assert!(session.lookup("900900").is_some());
    assert!(session.lookup("100200").is_none());
    assert!(h.ui.severities().contains(&Severity::Info));
}

#[tokio::test(start_paused = true)]
async fn resync_tick_without_update_fetches_nothing() {
    let h = Harness::new(
        ScriptedSource::unchanged(&sample_records()),
        Connectivity::Online,
    );
    let session = session(&h);
    session.start().await;

    tokio::time::sleep(PERIOD * 3 + Duration::from_secs(1)).await;

    assert_eq!(h.source.probe_count(), 3);
    assert_eq!(h.source.fetch_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn connectivity_lost_disarms_and_warns() {
    let h = Harness::new(
        ScriptedSource::unchanged(&sample_records()),
        Connectivity::Online,
    );
    let session = session(&h);
    session.start().await;
    h.ui.clear();

    session.on_connectivity_lost();

    assert!(!session.is_resync_armed());
    assert_eq!(h.orchestrator.connectivity(), Connectivity::Offline);
    assert_eq!(h.ui.severities(), vec![Severity::Warning]);

    let probes = h.source.probe_count();
    tokio::time::sleep(PERIOD * 2).await;
    assert_eq!(h.source.probe_count(), probes);
}

#[tokio::test(start_paused = true)]
async fn connectivity_restored_reloads_and_rearms() {
    let h = Harness::new(
        ScriptedSource::unchanged(&sample_records()),
        Connectivity::Offline,
    );
    let session = session(&h);
    session.start().await;
    assert!(!session.is_resync_armed());
    h.ui.clear();

    let report = session.on_connectivity_restored().await;

    assert_eq!(h.ui.severities().first(), Some(&Severity::Success));
    assert_eq!(h.ui.load_ends(), 1);
    assert_eq!(report.outcome, LoadOutcome::Fetched);
    assert!(session.is_resync_armed());
}

#[tokio::test(start_paused = true)]
async fn restarting_keeps_a_single_timer() {
    let h = Harness::new(
        ScriptedSource::unchanged(&sample_records()),
        Connectivity::Online,
    );
    let session = session(&h);
    session.start().await;
    session.on_connectivity_restored().await;
    session.on_connectivity_restored().await;

    let probes = h.source.probe_count();
    tokio::time::sleep(PERIOD + Duration::from_secs(1)).await;

    assert_eq!(h.source.probe_count(), probes + 1);
}

#[tokio::test(start_paused = true)]
async fn restore_during_load_arms_only_after_it_ends() {
    let store = CacheStore::new(Arc::new(MemoryCacheBackend::new()));
    let orchestrator = delayed_orchestrator(store, ScriptedSource::unchanged(&sample_records()));
    let session = Session::new(orchestrator.clone(), ResyncScheduler::new(PERIOD));

    let (first, (restored, loading_at_return, armed_at_return)) = tokio::join!(
        orchestrator.load(),
        async {
            let report = session.on_connectivity_restored().await;
            (report, orchestrator.is_loading(), session.is_resync_armed())
        }
    );

    assert_eq!(first.outcome, LoadOutcome::Fetched);
    assert_eq!(restored.outcome, LoadOutcome::Skipped);
    assert!(!loading_at_return);
    assert!(armed_at_return);
    session.stop();
}

#[tokio::test(start_paused = true)]
async fn force_refresh_during_load_keeps_cache() {
    let store = CacheStore::new(Arc::new(MemoryCacheBackend::new()));
    store
        .save(&sample_records(), Some("\"v1\""))
        .await
        .expect("seed cache");
    let updated = vec![ProductRecord::new("900900", "Yogurt", 21)];
    let orchestrator = delayed_orchestrator(
        store.clone(),
        ScriptedSource::new(modified("\"v2\""), FetchScript::json(&updated, Some("\"v2\""))),
    );
    let session = Session::new(orchestrator.clone(), ResyncScheduler::new(PERIOD));

    let (first, (refreshed, token_during_load)) = tokio::join!(orchestrator.load(), async {
        let report = session.force_refresh().await;
        (report, store.token().await)
    });

    assert_eq!(first.outcome, LoadOutcome::Fetched);
    assert_eq!(
        refreshed.map(|report| report.outcome),
        Some(LoadOutcome::Skipped)
    );
    assert_eq!(token_during_load.as_deref(), Some("\"v1\""));
    assert_eq!(store.token().await.as_deref(), Some("\"v2\""));
}

#[tokio::test]
async fn force_refresh_offline_is_refused() {
    let h = Harness::new(ScriptedSource::offline(), Connectivity::Offline);
    let session = session(&h);
    session.start().await;
    h.ui.clear();

    assert!(session.force_refresh().await.is_none());
    assert_eq!(h.ui.severities(), vec![Severity::Error]);
    assert_eq!(h.ui.load_starts(), 0);
}

#[tokio::test]
async fn force_refresh_refetches_even_when_unchanged() {
    let h = Harness::new(
        ScriptedSource::unchanged(&sample_records()),
        Connectivity::Online,
    );
    let session = session(&h);
    session.start().await;
    assert_eq!(h.source.fetch_count(), 1);

    let report = session.force_refresh().await.expect("online refresh runs");

    assert_eq!(report.outcome, LoadOutcome::Fetched);
    assert_eq!(h.source.fetch_count(), 2);
    session.stop();
}

#[tokio::test]
async fn lookup_search_and_expiry() {
    let h = Harness::new(
        ScriptedSource::unchanged(&sample_records()),
        Connectivity::Online,
    );
    let session = session(&h);
    session.start().await;

    let milk = session.lookup(" 100200 ").expect("milk is indexed");
    assert_eq!(milk.shelf_life_days, 10);

    let hits: Vec<String> = session.search("1003").into_iter().map(|r| r.code).collect();
    assert_eq!(hits, vec!["100300".to_string()]);

    let produced = NaiveDate::from_ymd_opt(2024, 1, 1);
    assert_eq!(
        session.expiry("100200", produced),
        Ok(NaiveDate::from_ymd_opt(2024, 1, 11).expect("valid date"))
    );
    assert!(matches!(
        session.expiry("999999", produced),
        Err(ValidationError::MissingInput { .. })
    ));
    assert!(matches!(
        session.expiry("100200", None),
        Err(ValidationError::MissingInput { .. })
    ));
    session.stop();
}
