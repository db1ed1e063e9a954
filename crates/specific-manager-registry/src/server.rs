// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Topic server.
//!
//! Binds one endpoint per request topic, decodes each request, hands it to
//! the orchestrator and replies with the encoded response. Every request runs
//! on its own task so an instantiate waiting for registration never blocks
//! the registration itself.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::messages::{
    InstantiateRequest, InstantiateResponse, KillRequest, OnBoardRequest, OnBoardResponse,
    RegistrationRequest, RegistrationResponse, ResultNotification, StatusResponse, TOPIC_INSTANTIATE,
    TOPIC_KILL, TOPIC_ON_BOARD, TOPIC_REGISTRATION, TOPIC_RESULT, TOPIC_UPDATE, UpdateRequest,
    UpdateResponse, Verdict, decode_command, encode,
};
use crate::orchestrator::Orchestrator;
use crate::registry::SsmStatus;
use crate::transport::{InboundRequest, Transport};

/// Request topics served by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Pull an SSM image
    OnBoard,
    /// Start an SSM and wait for its registration
    Instantiate,
    /// SSM self-registration
    Registration,
    /// Replace an SSM
    Update,
    /// Stop an SSM
    Kill,
}

impl Endpoint {
    /// Every request topic.
    pub const ALL: [Endpoint; 5] = [
        Endpoint::OnBoard,
        Endpoint::Instantiate,
        Endpoint::Registration,
        Endpoint::Update,
        Endpoint::Kill,
    ];

    /// Topic name.
    pub fn topic(&self) -> &'static str {
        match self {
            Endpoint::OnBoard => TOPIC_ON_BOARD,
            Endpoint::Instantiate => TOPIC_INSTANTIATE,
            Endpoint::Registration => TOPIC_REGISTRATION,
            Endpoint::Update => TOPIC_UPDATE,
            Endpoint::Kill => TOPIC_KILL,
        }
    }
}

/// Handle one request payload and produce the encoded reply.
///
/// Malformed payloads get the failure response of their topic.
pub async fn handle_request(orchestrator: &Orchestrator, endpoint: Endpoint, payload: &str) -> String {
    let topic = endpoint.topic();
    match endpoint {
        Endpoint::OnBoard => {
            let response = match decode_command::<OnBoardRequest>(payload) {
                Ok(ssm) => orchestrator.on_board(&ssm).await,
                Err(e) => {
                    reject(topic, &e);
                    OnBoardResponse {
                        on_board: Verdict::Failed,
                    }
                }
            };
            encode_reply(topic, &response)
        }
        Endpoint::Instantiate => {
            let response = match decode_command::<InstantiateRequest>(payload) {
                Ok(ssm) => orchestrator.instantiate(&ssm).await,
                Err(e) => {
                    reject(topic, &e);
                    InstantiateResponse {
                        instantiation: Verdict::Failed,
                    }
                }
            };
            encode_reply(topic, &response)
        }
        Endpoint::Registration => {
            let response = match decode_command::<RegistrationRequest>(payload) {
                Ok(command) => orchestrator.register(command).await,
                Err(e) => {
                    reject(topic, &e);
                    RegistrationResponse::failed()
                }
            };
            encode_reply(topic, &response)
        }
        Endpoint::Update => {
            let response = match decode_command::<UpdateRequest>(payload) {
                Ok(plan) => orchestrator.update(&plan).await,
                Err(e) => {
                    reject(topic, &e);
                    UpdateResponse {
                        update: Verdict::Failed,
                    }
                }
            };
            encode_reply(topic, &response)
        }
        Endpoint::Kill => {
            let response = match decode_command::<KillRequest>(payload) {
                Ok(name) => orchestrator.kill(&name).await,
                Err(e) => {
                    reject(topic, &e);
                    StatusResponse {
                        status: SsmStatus::Failed,
                    }
                }
            };
            encode_reply(topic, &response)
        }
    }
}

fn reject(topic: &str, error: &crate::error::Error) {
    warn!(topic = %topic, error = %error, "Rejected malformed request");
}

fn encode_reply<T: Serialize>(topic: &str, response: &T) -> String {
    match encode(response) {
        Ok(body) => body,
        Err(e) => {
            error!(topic = %topic, error = %e, "Failed to encode response");
            String::new()
        }
    }
}

/// Registry server bound to a transport.
pub struct RegistryServer {
    orchestrator: Arc<Orchestrator>,
    endpoints: Vec<(Endpoint, mpsc::Receiver<InboundRequest>)>,
    results: mpsc::Receiver<String>,
}

impl RegistryServer {
    /// Register every request endpoint and the result subscription.
    ///
    /// Requests sent after this returns are queued until [`run`](Self::run).
    pub async fn bind(transport: &dyn Transport, orchestrator: Arc<Orchestrator>) -> Result<Self> {
        let mut endpoints = Vec::with_capacity(Endpoint::ALL.len());
        for endpoint in Endpoint::ALL {
            let rx = transport.register_endpoint(endpoint.topic()).await?;
            endpoints.push((endpoint, rx));
        }
        let results = transport.subscribe(TOPIC_RESULT).await?;

        info!(
            transport = transport.name(),
            endpoints = endpoints.len(),
            "Registry server bound"
        );

        Ok(Self {
            orchestrator,
            endpoints,
            results,
        })
    }

    /// Serve until `shutdown` flips to true or its sender is dropped.
    ///
    /// In-flight requests are awaited before returning.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut listeners = JoinSet::new();

        for (endpoint, rx) in self.endpoints {
            listeners.spawn(serve_endpoint(
                endpoint,
                rx,
                self.orchestrator.clone(),
                shutdown.clone(),
            ));
        }
        listeners.spawn(serve_results(
            self.results,
            self.orchestrator.clone(),
            shutdown.clone(),
        ));

        while let Some(joined) = listeners.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Listener task failed");
            }
        }

        info!("Registry server stopped");
        Ok(())
    }
}

async fn serve_endpoint(
    endpoint: Endpoint,
    mut rx: mpsc::Receiver<InboundRequest>,
    orchestrator: Arc<Orchestrator>,
    mut shutdown: watch::Receiver<bool>,
) {
    let topic = endpoint.topic();
    let mut in_flight = JoinSet::new();

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            request = rx.recv() => {
                let Some(request) = request else { break };
                debug!(topic = %topic, "Request received");

                let orchestrator = orchestrator.clone();
                in_flight.spawn(async move {
                    let reply = handle_request(&orchestrator, endpoint, &request.payload).await;
                    if let Err(e) = request.reply(reply) {
                        warn!(topic = %topic, error = %e, "Requester went away before reply");
                    }
                });
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = joined {
                    error!(topic = %topic, error = %e, "Request task failed");
                }
            }
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            error!(topic = %topic, error = %e, "Request task failed");
        }
    }
    debug!(topic = %topic, "Endpoint stopped");
}

async fn serve_results(
    mut rx: mpsc::Receiver<String>,
    orchestrator: Arc<Orchestrator>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            payload = rx.recv() => {
                let Some(payload) = payload else { break };
                match decode_command::<ResultNotification>(&payload) {
                    Ok(result) => orchestrator.registration_result(&result),
                    Err(e) => reject(TOPIC_RESULT, &e),
                }
            }
        }
    }
}
