// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the SSM lifecycle orchestrator.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use specific_manager_registry::engine::{EngineCall, MockEngine};
use specific_manager_registry::messages::{RegistrationResponse, UpdatePlan, Verdict};
use specific_manager_registry::registry::SsmStatus;
use specific_manager_registry::store::{SqliteRepository, SsmRepository};
use tokio::time::Instant;

fn plan(name: &str, target: Option<&str>) -> UpdatePlan {
    UpdatePlan {
        ssm: ssm_image("img:2", name),
        host_address: "10.0.0.7".to_string(),
        target: target.map(str::to_string),
    }
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_register_new_ssm() {
    let orch = orchestrator(&MockEngine::new());

    let response = orch.register(registration_command("ssm1")).await;

    let RegistrationResponse::Registered(ssm) = response else {
        panic!("expected a registered SSM, got {:?}", response);
    };
    assert_eq!(ssm.status, SsmStatus::Running);
    assert_eq!(ssm.name, "ssm1");
    assert_eq!(ssm.version, "1.0");
    assert!(ssm.error.is_none());
    assert_eq!(orch.registry().get("ssm1").unwrap().identifier, ssm.identifier);
}

#[tokio::test]
async fn test_register_duplicate_keeps_original() {
    let orch = orchestrator(&MockEngine::new());

    let first = orch.register(registration_command("ssm1")).await;
    let before = orch.registry().get("ssm1").unwrap();

    let second = orch.register(registration_command("ssm1")).await;

    assert_eq!(first.status(), SsmStatus::Running);
    assert_eq!(second, RegistrationResponse::failed());
    assert_eq!(orch.registry().get("ssm1").unwrap(), before);
}

#[tokio::test]
async fn test_register_assigns_distinct_identifiers() {
    let orch = orchestrator(&MockEngine::new());

    let mut ids = Vec::new();
    for name in ["a", "b", "c"] {
        match orch.register(registration_command(name)).await {
            RegistrationResponse::Registered(ssm) => ids.push(ssm.identifier),
            other => panic!("unexpected {:?}", other),
        }
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
}

// ============================================================================
// On-board
// ============================================================================

#[tokio::test]
async fn test_on_board_pulls_without_touching_registry() {
    let engine = MockEngine::new();
    let orch = orchestrator(&engine);

    let response = orch.on_board(&ssm_image("img:1", "ssm1")).await;

    assert_eq!(response.on_board, Verdict::Ok);
    assert!(engine.is_pulled("ssm1").await);
    assert!(orch.registry().is_empty());
}

#[tokio::test]
async fn test_on_board_pull_failure() {
    let orch = orchestrator(&MockEngine::failing_pull());

    let response = orch.on_board(&ssm_image("img:1", "ssm1")).await;

    assert_eq!(response.on_board, Verdict::Failed);
}

// ============================================================================
// Instantiate
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_instantiate_ok_when_registration_arrives() {
    let engine = MockEngine::new();
    let orch = orchestrator(&engine);

    let registrar = {
        let orch = orch.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            orch.register(registration_command("ssm1")).await
        })
    };

    let start = Instant::now();
    let response = orch.instantiate(&ssm_image("img:1", "ssm1")).await;

    assert_eq!(response.instantiation, Verdict::Ok);
    assert!(start.elapsed() < TIMEOUT);
    assert_eq!(registrar.await.unwrap().status(), SsmStatus::Running);
    assert_eq!(
        engine.calls().await,
        vec![EngineCall::Start {
            image: "img:1".to_string(),
            name: "ssm1".to_string(),
            host_ip: None,
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_instantiate_fails_without_registration() {
    let orch = orchestrator(&MockEngine::new());

    let start = Instant::now();
    let response = orch.instantiate(&ssm_image("img:2", "ssm2")).await;
    let elapsed = start.elapsed();

    assert_eq!(response.instantiation, Verdict::Failed);
    assert!(elapsed >= TIMEOUT);
    assert!(elapsed <= TIMEOUT + POLL);
    assert!(!orch.registry().contains("ssm2"));
}

#[tokio::test(start_paused = true)]
async fn test_instantiate_start_failure_skips_wait() {
    let orch = orchestrator(&MockEngine::failing_start());

    let start = Instant::now();
    let response = orch.instantiate(&ssm_image("img:1", "ssm1")).await;

    assert_eq!(response.instantiation, Verdict::Failed);
    assert!(start.elapsed() < POLL);
}

#[tokio::test(start_paused = true)]
async fn test_registration_not_blocked_by_pending_instantiate() {
    let orch = orchestrator(&MockEngine::new());

    let instantiate = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.instantiate(&ssm_image("img:1", "ssm1")).await })
    };

    tokio::time::sleep(Duration::from_millis(500)).await;
    let registered = orch.register(registration_command("ssm1")).await;

    assert_eq!(registered.status(), SsmStatus::Running);
    assert_eq!(instantiate.await.unwrap().instantiation, Verdict::Ok);
}

// ============================================================================
// Kill
// ============================================================================

#[tokio::test]
async fn test_kill_running_ssm() {
    let engine = MockEngine::new();
    let orch = orchestrator(&engine);
    orch.register(registration_command("ssm1")).await;

    let response = orch.kill("ssm1").await;

    assert_eq!(response.status, SsmStatus::Killed);
    assert_eq!(orch.registry().get("ssm1").unwrap().status, SsmStatus::Killed);
    assert_eq!(
        engine.calls().await,
        vec![EngineCall::Stop {
            name: "ssm1".to_string()
        }]
    );
}

#[tokio::test]
async fn test_kill_unknown_ssm_reports_failed_without_engine_call() {
    let engine = MockEngine::new();
    let orch = orchestrator(&engine);

    let response = orch.kill("ghost").await;

    assert_eq!(response.status, SsmStatus::Failed);
    assert!(engine.calls().await.is_empty());
    assert!(!orch.registry().contains("ghost"));
}

#[tokio::test]
async fn test_kill_twice_is_idempotent() {
    let engine = MockEngine::new();
    let orch = orchestrator(&engine);
    orch.register(registration_command("ssm1")).await;

    assert_eq!(orch.kill("ssm1").await.status, SsmStatus::Killed);
    assert_eq!(orch.kill("ssm1").await.status, SsmStatus::Killed);

    assert_eq!(engine.calls().await.len(), 1);
}

#[tokio::test]
async fn test_kill_stop_failure_keeps_status() {
    let orch = orchestrator(&MockEngine::failing_stop());
    orch.register(registration_command("ssm1")).await;

    let response = orch.kill("ssm1").await;

    assert_eq!(response.status, SsmStatus::Running);
    assert_eq!(orch.registry().get("ssm1").unwrap().status, SsmStatus::Running);
}

// ============================================================================
// Update
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_update_ok_kills_default_target() {
    let engine = MockEngine::new();
    let orch = orchestrator(&engine);
    orch.register(registration_command("ssm1")).await;

    let registrar = {
        let orch = orch.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            orch.register(registration_command("ssm2")).await;
        })
    };

    let response = orch.update(&plan("ssm2", None)).await;
    registrar.await.unwrap();

    assert_eq!(response.update, Verdict::Ok);
    assert_eq!(orch.registry().get("ssm1").unwrap().status, SsmStatus::Killed);
    assert_eq!(orch.registry().get("ssm2").unwrap().status, SsmStatus::Running);
    assert_eq!(
        engine.calls().await,
        vec![
            EngineCall::Pull {
                image: "img:2".to_string(),
                name: "ssm2".to_string(),
            },
            EngineCall::Start {
                image: "img:2".to_string(),
                name: "ssm2".to_string(),
                host_ip: Some("10.0.0.7".to_string()),
            },
            EngineCall::Stop {
                name: "ssm1".to_string(),
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_update_explicit_target() {
    let engine = MockEngine::new();
    let orch = orchestrator(&engine);
    orch.register(registration_command("old")).await;
    orch.register(registration_command("new")).await;

    let response = orch.update(&plan("new", Some("old"))).await;

    assert_eq!(response.update, Verdict::Ok);
    assert_eq!(orch.registry().get("old").unwrap().status, SsmStatus::Killed);
}

#[tokio::test(start_paused = true)]
async fn test_update_stop_failure_reports_failed() {
    let engine = MockEngine::failing_stop();
    let orch = orchestrator(&engine);
    orch.register(registration_command("ssm1")).await;
    orch.register(registration_command("ssm2")).await;

    let response = orch.update(&plan("ssm2", None)).await;

    assert_eq!(response.update, Verdict::Failed);
    assert_eq!(orch.registry().get("ssm1").unwrap().status, SsmStatus::Running);
}

#[tokio::test(start_paused = true)]
async fn test_update_runs_every_phase_after_pull_failure() {
    let engine = MockEngine::failing_pull();
    let orch = orchestrator(&engine);
    orch.register(registration_command("ssm1")).await;
    orch.register(registration_command("ssm2")).await;

    let response = orch.update(&plan("ssm2", None)).await;

    assert_eq!(response.update, Verdict::Failed);
    let calls = engine.calls().await;
    assert_eq!(calls.len(), 3);
    assert!(matches!(calls[1], EngineCall::Start { .. }));
    assert!(matches!(calls[2], EngineCall::Stop { .. }));
    // Kill still ran even though the update as a whole failed
    assert_eq!(orch.registry().get("ssm1").unwrap().status, SsmStatus::Killed);
}

#[tokio::test(start_paused = true)]
async fn test_update_registration_timeout_still_kills() {
    let engine = MockEngine::new();
    let orch = orchestrator(&engine);
    orch.register(registration_command("ssm1")).await;

    let response = orch.update(&plan("ssm2", None)).await;

    assert_eq!(response.update, Verdict::Failed);
    assert_eq!(orch.registry().get("ssm1").unwrap().status, SsmStatus::Killed);
}

#[tokio::test(start_paused = true)]
async fn test_update_unknown_target_fails() {
    let engine = MockEngine::new();
    let orch = orchestrator(&engine);
    orch.register(registration_command("ssm2")).await;

    let response = orch.update(&plan("ssm2", Some("ghost"))).await;

    assert_eq!(response.update, Verdict::Failed);
    assert!(
        !engine
            .calls()
            .await
            .iter()
            .any(|c| matches!(c, EngineCall::Stop { .. }))
    );
}

// ============================================================================
// Persistence mirroring
// ============================================================================

#[tokio::test]
async fn test_registration_and_kill_are_persisted() {
    let repository: Arc<dyn SsmRepository> = Arc::new(
        SqliteRepository::connect("sqlite::memory:")
            .await
            .expect("sqlite repository"),
    );
    let orch = orchestrator_with_repository(&MockEngine::new(), repository.clone());

    let RegistrationResponse::Registered(ssm) = orch.register(registration_command("ssm1")).await
    else {
        panic!("registration should succeed");
    };

    let row = repository.find_latest("ssm1").await.unwrap().unwrap();
    assert_eq!(row.identifier, ssm.identifier.to_string());
    assert_eq!(row.status.as_deref(), Some("running"));

    orch.kill("ssm1").await;

    let row = repository.find_latest("ssm1").await.unwrap().unwrap();
    assert_eq!(row.status.as_deref(), Some("killed"));
}
