// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end tests: requests over the in-process bus through the full
//! runtime (server, orchestrator, registry, mock engine).

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use specific_manager_registry::engine::MockEngine;
use specific_manager_registry::messages::{
    TOPIC_INSTANTIATE, TOPIC_KILL, TOPIC_ON_BOARD, TOPIC_PLUGIN_REGISTER, TOPIC_REGISTRATION,
    TOPIC_RESULT, TOPIC_UPDATE,
};
use specific_manager_registry::registry::SsmStatus;
use specific_manager_registry::runtime::{PLUGIN_NAME, RegistryRuntime};
use specific_manager_registry::transport::{LocalBus, Transport, TransportError};

#[tokio::test]
async fn test_register_over_bus() {
    let ctx = TestContext::new(MockEngine::new()).await;

    let reply = ctx
        .request(TOPIC_REGISTRATION, registration_payload("ssm1"))
        .await;

    assert_eq!(reply["status"].as_str(), Some("running"));
    assert_eq!(reply["name"].as_str(), Some("ssm1"));
    assert_eq!(reply["version"].as_str(), Some("1.0"));
    assert!(reply["error"].is_null());
    let identifier = reply["identifier"].as_str().expect("identifier");
    assert_eq!(
        ctx.registry().get("ssm1").unwrap().identifier.to_string(),
        identifier
    );

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_registration_over_bus() {
    let ctx = TestContext::new(MockEngine::new()).await;

    ctx.request(TOPIC_REGISTRATION, registration_payload("ssm1"))
        .await;
    let original = ctx.registry().get("ssm1").unwrap();

    let reply = ctx
        .request(TOPIC_REGISTRATION, registration_payload("ssm1"))
        .await;

    assert_eq!(reply["status"].as_str(), Some("failed"));
    assert!(reply.get("identifier").is_none());
    assert_eq!(ctx.registry().get("ssm1").unwrap(), original);

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_on_board_over_bus() {
    let ctx = TestContext::new(MockEngine::new()).await;

    let reply = ctx
        .request(TOPIC_ON_BOARD, on_board_payload("img:1", "ssm1"))
        .await;

    assert_eq!(reply["on-board"].as_str(), Some("OK"));
    assert!(ctx.engine.is_pulled("ssm1").await);

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_instantiate_with_registration_over_bus() {
    let ctx = TestContext::new(MockEngine::new()).await;
    let registrar = ctx.register_later("ssm1", Duration::from_secs(2));

    let reply = ctx
        .request(TOPIC_INSTANTIATE, instantiate_payload("img:1", "ssm1"))
        .await;
    registrar.await.unwrap();

    assert_eq!(reply["instantiation"].as_str(), Some("OK"));
    assert!(ctx.engine.is_running("ssm1").await);

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_instantiate_without_registration_over_bus() {
    let ctx = TestContext::new(MockEngine::new()).await;

    let start = tokio::time::Instant::now();
    let reply = ctx
        .request(TOPIC_INSTANTIATE, instantiate_payload("img:1", "ssm2"))
        .await;

    assert_eq!(reply["instantiation"].as_str(), Some("failed"));
    assert!(start.elapsed() >= TIMEOUT);

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_update_over_bus() {
    let ctx = TestContext::new(MockEngine::new()).await;
    ctx.request(TOPIC_REGISTRATION, registration_payload("ssm1"))
        .await;
    let registrar = ctx.register_later("ssm2", Duration::from_secs(1));

    let reply = ctx
        .request(
            TOPIC_UPDATE,
            update_payload("img:2", "ssm2", "10.0.0.7", None),
        )
        .await;
    registrar.await.unwrap();

    assert_eq!(reply["update"].as_str(), Some("OK"));
    assert_eq!(
        ctx.registry().get("ssm1").unwrap().status,
        SsmStatus::Killed
    );

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_update_stop_failure_over_bus() {
    let ctx = TestContext::new(MockEngine::failing_stop()).await;
    ctx.request(TOPIC_REGISTRATION, registration_payload("ssm1"))
        .await;
    ctx.request(TOPIC_REGISTRATION, registration_payload("ssm2"))
        .await;

    let reply = ctx
        .request(
            TOPIC_UPDATE,
            update_payload("img:2", "ssm2", "10.0.0.7", Some("ssm1")),
        )
        .await;

    assert_eq!(reply["update"].as_str(), Some("failed"));
    assert_eq!(
        ctx.registry().get("ssm1").unwrap().status,
        SsmStatus::Running
    );

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_kill_over_bus() {
    let ctx = TestContext::new(MockEngine::new()).await;
    ctx.request(TOPIC_REGISTRATION, registration_payload("ssm1"))
        .await;

    let reply = ctx.request(TOPIC_KILL, kill_payload("ssm1")).await;
    assert_eq!(reply["status"].as_str(), Some("killed"));

    let reply = ctx.request(TOPIC_KILL, kill_payload("ghost")).await;
    assert_eq!(reply["status"].as_str(), Some("failed"));

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_malformed_requests_over_bus() {
    let ctx = TestContext::new(MockEngine::new()).await;

    let reply = ctx
        .request(TOPIC_INSTANTIATE, "NSD:\n  service_specific_managers: []\n".to_string())
        .await;
    assert_eq!(reply["instantiation"].as_str(), Some("failed"));

    let reply = ctx
        .request(TOPIC_REGISTRATION, ":::".to_string())
        .await;
    assert_eq!(reply["status"].as_str(), Some("failed"));

    assert!(ctx.engine.calls().await.is_empty());
    assert!(ctx.registry().is_empty());

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_result_notification_is_consumed() {
    let ctx = TestContext::new(MockEngine::new()).await;

    ctx.bus
        .publish(TOPIC_RESULT, "result: scaling done\n".to_string())
        .await
        .unwrap();
    ctx.bus
        .publish(TOPIC_RESULT, "not a result".to_string())
        .await
        .unwrap();

    // The server keeps serving after a malformed notification
    let reply = ctx
        .request(TOPIC_REGISTRATION, registration_payload("ssm1"))
        .await;
    assert_eq!(reply["status"].as_str(), Some("running"));

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_registrations() {
    let ctx = TestContext::new(MockEngine::new()).await;

    let mut handles = Vec::new();
    for i in 0..20 {
        let bus = ctx.bus.clone();
        handles.push(tokio::spawn(async move {
            bus.request(TOPIC_REGISTRATION, registration_payload(&format!("ssm{}", i)))
                .await
                .unwrap()
        }));
    }
    let results: Vec<_> = futures::future::join_all(handles).await;
    for result in results {
        let reply = yaml(&result.unwrap());
        assert_eq!(reply["status"].as_str(), Some("running"));
    }

    assert_eq!(ctx.registry().len(), 20);

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_plugin_announcement_on_start() {
    let bus = Arc::new(LocalBus::default());
    let mut announcements = bus.subscribe(TOPIC_PLUGIN_REGISTER).await.unwrap();

    let runtime = RegistryRuntime::builder()
        .engine(Arc::new(MockEngine::new()))
        .transport(bus.clone())
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();

    let announcement = yaml(&announcements.recv().await.unwrap());
    assert_eq!(announcement["name"].as_str(), Some(PLUGIN_NAME));
    assert!(announcement["version"].as_str().is_some());

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_endpoints_closed_after_shutdown() {
    let ctx = TestContext::new(MockEngine::new()).await;
    let bus = ctx.bus.clone();

    ctx.shutdown().await;

    let result = bus
        .request(TOPIC_REGISTRATION, registration_payload("late"))
        .await;
    assert!(matches!(result, Err(TransportError::NoEndpoint(_))));
    assert!(!bus.has_endpoint(TOPIC_REGISTRATION));
}

#[tokio::test]
async fn test_builder_requires_engine_and_transport() {
    assert!(RegistryRuntime::builder().build().is_err());
    assert!(
        RegistryRuntime::builder()
            .engine(Arc::new(MockEngine::new()))
            .build()
            .is_err()
    );
}
