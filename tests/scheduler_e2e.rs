//! Scheduler end-to-end scenarios, each driving `HarnessContext` +
//! `Scheduler` through test doubles for the VCS adapter and agent
//! transport rather than a real git repository or subprocess.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::watch;

use ada_harness::event_bus::{EventBus, HarnessEvent, MemorySink};
use ada_harness::scheduler::{ExitOutcome, HarnessContext, Scheduler};
use ada_harness::session::record::{SessionRecord, TokenUsage};
use ada_harness::session::transcript::TranscriptEvent;
use ada_harness::session::transport::TransportExit;
use ada_harness::telemetry::projections::build_cost_breakdown;
use ada_harness::types::{AgentKind, AlertSeverity, FeatureStatus, SessionOutcome};
use ada_harness::vcs::VcsAdapter;

use common::{
    sample_feature, single_feature_backlog, test_config, two_feature_backlog, wait_until,
    ConstantTransport, FakeVcs, SequencedTransport, Step,
};

fn no_shutdown() -> watch::Receiver<bool> {
    watch::channel(false).1
}

#[tokio::test]
async fn happy_path_completes_on_first_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let feature = sample_feature("feat-1", 5, &["tests pass"]);
    single_feature_backlog(dir.path(), feature).await;

    let vcs: Arc<dyn VcsAdapter> = Arc::new(FakeVcs::new());
    let transport = Arc::new(ConstantTransport::new(
        vec![
            TranscriptEvent::Message {
                role: "assistant".to_string(),
                content: "implementing the feature".to_string(),
            },
            TranscriptEvent::CompletionSignal {
                criteria_met: vec!["tests pass".to_string()],
            },
        ],
        TransportExit::default(),
    ));

    let ctx = Arc::new(
        HarnessContext::bootstrap(test_config(dir.path()), vcs, transport)
            .await
            .unwrap(),
    );
    let sink = MemorySink::new();
    ctx.event_bus.add_sink(sink.clone());

    let outcome = Scheduler::new(Arc::clone(&ctx), no_shutdown()).run().await;
    assert_eq!(outcome, ExitOutcome::Clean);

    let feature = ctx.backlog.feature("feat-1").await.unwrap();
    assert_eq!(feature.status, FeatureStatus::Completed);
    assert_eq!(feature.sessions_spent, 1);

    let events = sink.snapshot();
    assert!(events
        .iter()
        .any(|e| matches!(e, HarnessEvent::SessionStarted { feature_id, .. } if feature_id.as_deref() == Some("feat-1"))));
    assert!(events.iter().any(|e| matches!(
        e,
        HarnessEvent::SessionEnded { outcome, .. } if outcome == "success"
    )));
    assert!(events.iter().any(|e| matches!(e, HarnessEvent::CostUpdate { .. })));
}

#[tokio::test]
async fn handoff_carries_into_a_successful_second_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let feature = sample_feature("feat-2", 5, &["done"]);
    single_feature_backlog(dir.path(), feature).await;

    let vcs: Arc<dyn VcsAdapter> = Arc::new(FakeVcs::new());
    let transport = Arc::new(SequencedTransport::new(vec![
        Step::Frames(vec![TranscriptEvent::UsageUpdate {
            usage: TokenUsage {
                input: 150_000,
                output: 10_000,
                cache_read: 0,
                cache_write: 0,
            },
        }]),
        Step::Frames(vec![
            TranscriptEvent::Message {
                role: "assistant".to_string(),
                content: "done".to_string(),
            },
            TranscriptEvent::CompletionSignal {
                criteria_met: vec!["done".to_string()],
            },
        ]),
    ]));

    let ctx = Arc::new(
        HarnessContext::bootstrap(test_config(dir.path()), vcs, transport)
            .await
            .unwrap(),
    );

    let outcome = Scheduler::new(Arc::clone(&ctx), no_shutdown()).run().await;
    assert_eq!(outcome, ExitOutcome::Clean);

    let feature = ctx.backlog.feature("feat-2").await.unwrap();
    assert_eq!(feature.status, FeatureStatus::Completed);
    assert_eq!(feature.sessions_spent, 2);

    let entries = ctx.session_logger.list().await;
    let outcomes: Vec<_> = entries
        .iter()
        .filter(|e| e.feature_id.as_deref() == Some("feat-2"))
        .map(|e| e.outcome)
        .collect();
    assert_eq!(outcomes, vec![Some(SessionOutcome::Handoff), Some(SessionOutcome::Success)]);
}

#[tokio::test]
async fn transient_failure_is_retried_then_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let feature = sample_feature("feat-3", 5, &["ok"]);
    single_feature_backlog(dir.path(), feature).await;

    let vcs: Arc<dyn VcsAdapter> = Arc::new(FakeVcs::new());
    let transport = Arc::new(SequencedTransport::new(vec![
        Step::Error("connection reset by peer".to_string()),
        Step::Frames(vec![
            TranscriptEvent::Message {
                role: "assistant".to_string(),
                content: "done".to_string(),
            },
            TranscriptEvent::CompletionSignal {
                criteria_met: vec!["ok".to_string()],
            },
        ]),
    ]));

    let ctx = Arc::new(
        HarnessContext::bootstrap(test_config(dir.path()), vcs, transport)
            .await
            .unwrap(),
    );

    let outcome = Scheduler::new(Arc::clone(&ctx), no_shutdown()).run().await;
    assert_eq!(outcome, ExitOutcome::Clean);

    let feature = ctx.backlog.feature("feat-3").await.unwrap();
    assert_eq!(feature.status, FeatureStatus::Completed);
    assert!(!feature.implementation_notes.is_empty());
    assert_eq!(ctx.alerts.list(true).await.len(), 0);
}

#[tokio::test]
async fn retry_exhaustion_blocks_the_feature_and_raises_an_alert() {
    let dir = tempfile::tempdir().unwrap();
    let feature = sample_feature("feat-4", 5, &["ok"]);
    single_feature_backlog(dir.path(), feature).await;

    let vcs: Arc<dyn VcsAdapter> = Arc::new(FakeVcs::new());
    // An empty transcript every attempt: no completion signal is ever seen,
    // so every attempt crashes.
    let transport = Arc::new(ada_harness::session::transport::ScriptedTransport::new(
        vec![],
        TransportExit::default(),
    ));

    let mut config = test_config(dir.path());
    config.retry.max_retries = 3;
    let ctx = Arc::new(HarnessContext::bootstrap(config, vcs, transport).await.unwrap());

    let outcome = Scheduler::new(Arc::clone(&ctx), no_shutdown()).run().await;
    assert_eq!(outcome, ExitOutcome::Clean);

    let feature = ctx.backlog.feature("feat-4").await.unwrap();
    assert_eq!(feature.status, FeatureStatus::Blocked);

    let entries = ctx.session_logger.list().await;
    let crashed: Vec<_> = entries
        .iter()
        .filter(|e| e.feature_id.as_deref() == Some("feat-4"))
        .collect();
    assert_eq!(crashed.len(), 4);
    assert!(crashed.iter().all(|e| e.outcome == Some(SessionOutcome::Crashed)));

    let alerts = ctx.alerts.list(true).await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, AlertSeverity::Error);
    assert_eq!(alerts[0].alert_type, "retry_exhausted");
}

#[tokio::test]
async fn verification_gate_failure_keeps_retrying_until_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let feature = sample_feature("feat-5", 5, &["done"]);
    single_feature_backlog(dir.path(), feature).await;

    let vcs: Arc<dyn VcsAdapter> = Arc::new(FakeVcs::new());
    let transport = Arc::new(ConstantTransport::new(
        vec![
            TranscriptEvent::Message {
                role: "assistant".to_string(),
                content: "done".to_string(),
            },
            TranscriptEvent::CompletionSignal {
                criteria_met: vec!["done".to_string()],
            },
        ],
        TransportExit::default(),
    ));

    let mut config = test_config(dir.path());
    config.verification.enabled = true;
    // No shell-command gates are configured; requiring manual approval
    // appends `ManualApprovalGate(AlwaysDeny)`, which always denies, giving
    // a deterministic verification failure without a real external tool.
    config.verification.approval_required_globally = true;

    let ctx = Arc::new(HarnessContext::bootstrap(config, vcs, transport).await.unwrap());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_ctx = Arc::clone(&ctx);
    let handle = tokio::spawn(async move { Scheduler::new(scheduler_ctx, shutdown_rx).run().await });

    let seen = wait_until(Duration::from_secs(5), || {
        let ctx = Arc::clone(&ctx);
        async move {
            match ctx.backlog.feature("feat-5").await {
                Ok(f) => {
                    f.status == FeatureStatus::InProgress
                        && f.implementation_notes.iter().any(|n| n.contains("verification failed"))
                }
                Err(_) => false,
            }
        }
    })
    .await;
    assert!(seen, "expected to observe a verification failure before shutdown");

    shutdown_tx.send(true).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler task did not stop after shutdown")
        .expect("scheduler task panicked");
    assert_eq!(outcome, ExitOutcome::Interrupted);
}

#[tokio::test]
async fn dependency_ordering_runs_the_dependency_first() {
    let dir = tempfile::tempdir().unwrap();
    let mut downstream = sample_feature("feat-downstream", 10, &["done"]);
    downstream.depends_on = vec!["feat-dependency".to_string()];
    let dependency = sample_feature("feat-dependency", 1, &["done"]);
    two_feature_backlog(dir.path(), downstream, dependency).await;

    let vcs: Arc<dyn VcsAdapter> = Arc::new(FakeVcs::new());
    let transport = Arc::new(ConstantTransport::new(
        vec![
            TranscriptEvent::Message {
                role: "assistant".to_string(),
                content: "done".to_string(),
            },
            TranscriptEvent::CompletionSignal {
                criteria_met: vec!["done".to_string()],
            },
        ],
        TransportExit::default(),
    ));

    let ctx = Arc::new(
        HarnessContext::bootstrap(test_config(dir.path()), vcs, transport)
            .await
            .unwrap(),
    );

    let outcome = Scheduler::new(Arc::clone(&ctx), no_shutdown()).run().await;
    assert_eq!(outcome, ExitOutcome::Clean);

    let backlog = ctx.backlog.snapshot().await;
    assert!(backlog.features.iter().all(|f| f.status == FeatureStatus::Completed));

    let mut entries = ctx.session_logger.list().await;
    entries.sort_by_key(|e| e.session_id);
    let order: Vec<_> = entries.iter().map(|e| e.feature_id.clone()).collect();
    assert_eq!(
        order,
        vec![Some("feat-dependency".to_string()), Some("feat-downstream".to_string())]
    );
}

#[tokio::test]
async fn graceful_shutdown_mid_session_leaves_a_resumable_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let feature = sample_feature("feat-7", 5, &["done"]);
    single_feature_backlog(dir.path(), feature).await;

    let vcs: Arc<dyn VcsAdapter> = Arc::new(FakeVcs::new());
    let transport = Arc::new(
        ada_harness::session::transport::ScriptedTransport::new(
            vec![TranscriptEvent::Message {
                role: "assistant".to_string(),
                content: "still working".to_string(),
            }],
            TransportExit::default(),
        )
        .with_frame_delay(Duration::from_secs(5)),
    );

    let ctx = Arc::new(
        HarnessContext::bootstrap(test_config(dir.path()), vcs, transport)
            .await
            .unwrap(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_ctx = Arc::clone(&ctx);
    let handle = tokio::spawn(async move { Scheduler::new(scheduler_ctx, shutdown_rx).run().await });

    wait_until(Duration::from_secs(2), || {
        let ctx = Arc::clone(&ctx);
        async move { ctx.checkpoint.current().await.is_some() }
    })
    .await;

    shutdown_tx.send(true).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("scheduler task did not stop after shutdown")
        .expect("scheduler task panicked");
    assert_eq!(outcome, ExitOutcome::Interrupted);

    let checkpoint = ctx.checkpoint.current().await.expect("checkpoint saved before the attempt");
    assert_eq!(checkpoint.feature_id.as_deref(), Some("feat-7"));

    let feature = ctx.backlog.feature("feat-7").await.unwrap();
    assert_eq!(feature.status, FeatureStatus::InProgress);
}

#[tokio::test]
async fn cost_breakdown_aggregates_by_model_and_honors_the_days_filter() {
    let dir = tempfile::tempdir().unwrap();
    let feature = sample_feature("feat-8", 5, &[]);
    single_feature_backlog(dir.path(), feature).await;

    let vcs: Arc<dyn VcsAdapter> = Arc::new(FakeVcs::new());
    let transport = Arc::new(ConstantTransport::new(vec![], TransportExit::default()));
    let ctx = HarnessContext::bootstrap(test_config(dir.path()), vcs, transport)
        .await
        .unwrap();

    let mut recent = SessionRecord::new(1, "session-000001.jsonl", Some("feat-8".to_string()), AgentKind::Coding, "claude-sonnet");
    ctx.session_logger.start_session(&recent).await.unwrap();
    recent.finalize(
        SessionOutcome::Success,
        3,
        TokenUsage {
            input: 1_000_000,
            output: 200_000,
            cache_read: 0,
            cache_write: 0,
        },
        18.0,
        Vec::new(),
        None,
        None,
    );
    ctx.session_logger.finalize_session(&recent).await.unwrap();

    let mut stale = SessionRecord::new(2, "session-000002.jsonl", Some("feat-8".to_string()), AgentKind::Coding, "claude-haiku");
    stale.started_at = Utc::now() - ChronoDuration::days(30);
    ctx.session_logger.start_session(&stale).await.unwrap();
    stale.finalize(
        SessionOutcome::Success,
        1,
        TokenUsage {
            input: 10_000,
            output: 2_000,
            cache_read: 0,
            cache_write: 0,
        },
        0.02,
        Vec::new(),
        None,
        None,
    );
    ctx.session_logger.finalize_session(&stale).await.unwrap();

    let all_time = build_cost_breakdown(&ctx, None).await;
    assert_eq!(all_time.sessions_included, 2);
    assert!((all_time.total_cost_usd - 18.02).abs() < 1e-9);
    assert_eq!(all_time.per_model.len(), 2);

    let recent_only = build_cost_breakdown(&ctx, Some(7)).await;
    assert_eq!(recent_only.sessions_included, 1);
    assert!((recent_only.total_cost_usd - 18.0).abs() < 1e-9);
    assert_eq!(recent_only.per_model.len(), 1);
    assert_eq!(recent_only.per_model[0].model, "claude-sonnet");
}

#[tokio::test]
async fn event_bus_default_is_still_usable_alongside_a_memory_sink() {
    // Sanity check that adding an extra sink after bootstrap's
    // `listen_for_events()` call actually receives live events, since the
    // scenarios above rely on this to assert against `MemorySink`.
    let bus = EventBus::default();
    bus.listen_for_events();
    let sink = MemorySink::new();
    bus.add_sink(sink.clone());
    let emitter = bus.get_emitter();
    emitter.emit(HarnessEvent::StatusUpdated).unwrap();

    let seen = wait_until(Duration::from_secs(1), || {
        let sink = sink.clone();
        async move { !sink.snapshot().is_empty() }
    })
    .await;
    assert!(seen);
}
