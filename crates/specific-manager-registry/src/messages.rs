// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Topic payload schemas.
//!
//! Every inbound topic has an explicit request struct. Payloads are YAML
//! maps; decoding goes through [`decode_command`], which deserializes the
//! request and validates it into the typed command the orchestrator works
//! with. Malformed input never reaches the orchestrator.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::registry::{SsmRecord, SsmRegistration, SsmStatus};

/// Topic for pulling an SSM image.
pub const TOPIC_ON_BOARD: &str = "specific.manager.registry.ssm.on-board";
/// Topic for starting an SSM and waiting for it to register.
pub const TOPIC_INSTANTIATE: &str = "specific.manager.registry.ssm.instantiate";
/// Topic on which started SSMs announce themselves.
pub const TOPIC_REGISTRATION: &str = "specific.manager.registry.ssm.registration";
/// Topic for replacing a running SSM.
pub const TOPIC_UPDATE: &str = "specific.manager.registry.ssm.update";
/// Topic for stopping an SSM.
pub const TOPIC_KILL: &str = "specific.manager.registry.ssm.kill";
/// Notification topic carrying SSM trigger results.
pub const TOPIC_RESULT: &str = "specific.manager.registry.ssm.result";
/// Plugin manager registration topic.
pub const TOPIC_PLUGIN_REGISTER: &str = "platform.management.plugin.register";

/// A request payload that validates into an orchestrator command.
pub trait TopicRequest: DeserializeOwned {
    /// The validated command.
    type Command;

    /// Validate and convert.
    fn into_command(self) -> Result<Self::Command>;
}

/// Decode a YAML payload and validate it into a command.
pub fn decode_command<R: TopicRequest>(payload: &str) -> Result<R::Command> {
    let request: R = serde_yaml::from_str(payload)?;
    request.into_command()
}

/// Encode a response as YAML.
pub fn encode<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_yaml::to_string(value)?)
}

/// Accept any YAML scalar where a string is expected (`version: 1.0`).
fn scalar_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error as _;

    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Null => Ok(String::new()),
        _ => Err(D::Error::custom("expected a scalar value")),
    }
}

fn require(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidRequest(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

// ============================================================================
// Descriptors
// ============================================================================

/// SSM entry of a service descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsmDescriptor {
    /// Container image URI
    #[serde(default)]
    pub image: String,
    /// SSM name
    #[serde(default)]
    pub id: String,
}

/// The parts of a Network Service Descriptor the registry reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkServiceDescriptor {
    /// Service-specific managers of the service
    #[serde(default)]
    pub service_specific_managers: Vec<SsmDescriptor>,
}

impl NetworkServiceDescriptor {
    fn first_ssm(&self) -> Result<SsmImage> {
        first_ssm(&self.service_specific_managers)
    }
}

fn first_ssm(ssms: &[SsmDescriptor]) -> Result<SsmImage> {
    let ssm = ssms
        .first()
        .ok_or_else(|| Error::InvalidRequest("service_specific_managers is empty".to_string()))?;
    Ok(SsmImage {
        image: require("service_specific_managers[0].image", &ssm.image)?,
        name: require("service_specific_managers[0].id", &ssm.id)?,
    })
}

/// Connection point address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionPointType {
    /// Network address
    #[serde(default)]
    pub address: Option<String>,
}

/// Connection point of a VNFC instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionPoint {
    /// Connection point type carrying the address
    #[serde(default, rename = "type")]
    pub kind: Option<ConnectionPointType>,
}

/// VNFC instance of a deployment unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VnfcInstance {
    /// Connection points
    #[serde(default)]
    pub connection_points: Vec<ConnectionPoint>,
}

/// Virtual deployment unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualDeploymentUnit {
    /// Running VNFC instances
    #[serde(default)]
    pub vnfc_instance: Vec<VnfcInstance>,
}

/// One record of the Network Service Record list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Deployment units described by this record
    #[serde(default)]
    pub virtual_deployment_units: Vec<VirtualDeploymentUnit>,
}

/// First connection-point address found walking the records in order.
pub fn host_address(records: &[ServiceRecord]) -> Option<String> {
    records
        .iter()
        .flat_map(|r| &r.virtual_deployment_units)
        .flat_map(|vdu| &vdu.vnfc_instance)
        .flat_map(|vnfc| &vnfc.connection_points)
        .filter_map(|cp| cp.kind.as_ref()?.address.as_deref())
        .map(str::trim)
        .find(|addr| !addr.is_empty())
        .map(str::to_string)
}

// ============================================================================
// Commands
// ============================================================================

/// Image and name of an SSM to pull or start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsmImage {
    /// Container image URI
    pub image: String,
    /// SSM name
    pub name: String,
}

/// Optional audit details an SSM may report when registering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditInfo {
    /// Name of the managed service
    #[serde(default)]
    pub service_name: Option<String>,
    /// Manager type (e.g. "ssm", "fsm")
    #[serde(default)]
    pub specific_manager_type: Option<String>,
    /// Service function UUID
    #[serde(default)]
    pub sfuuid: Option<String>,
    /// Managed function name
    #[serde(default)]
    pub function_name: Option<String>,
}

/// A validated registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationCommand {
    /// Registry details
    pub registration: SsmRegistration,
    /// Audit details for persistence
    pub audit: AuditInfo,
}

/// A validated update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlan {
    /// The replacement SSM
    pub ssm: SsmImage,
    /// Address of the deployment unit the new SSM manages
    pub host_address: String,
    /// SSM to kill once the replacement has registered
    pub target: Option<String>,
}

// ============================================================================
// Requests
// ============================================================================

/// On-board request payload.
#[derive(Debug, Clone, Deserialize)]
pub struct OnBoardRequest {
    /// SSMs of the service; the first one is on-boarded
    #[serde(default)]
    pub service_specific_managers: Vec<SsmDescriptor>,
}

impl TopicRequest for OnBoardRequest {
    type Command = SsmImage;

    fn into_command(self) -> Result<SsmImage> {
        first_ssm(&self.service_specific_managers)
    }
}

/// Instantiate request payload.
#[derive(Debug, Clone, Deserialize)]
pub struct InstantiateRequest {
    /// Network service descriptor
    #[serde(rename = "NSD")]
    pub nsd: NetworkServiceDescriptor,
}

impl TopicRequest for InstantiateRequest {
    type Command = SsmImage;

    fn into_command(self) -> Result<SsmImage> {
        self.nsd.first_ssm()
    }
}

/// Registration payload sent by an SSM.
///
/// Identifier and status are assigned by the registry and not accepted here.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationRequest {
    /// Unique SSM name
    pub name: String,
    /// SSM version
    #[serde(deserialize_with = "scalar_string")]
    pub version: String,
    /// Free-text description
    #[serde(deserialize_with = "scalar_string")]
    pub description: String,
    /// Optional audit details
    #[serde(flatten)]
    pub audit: AuditInfo,
}

impl TopicRequest for RegistrationRequest {
    type Command = RegistrationCommand;

    fn into_command(self) -> Result<RegistrationCommand> {
        Ok(RegistrationCommand {
            registration: SsmRegistration {
                name: require("name", &self.name)?,
                version: self.version,
                description: self.description,
            },
            audit: self.audit,
        })
    }
}

/// Update request payload.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRequest {
    /// Descriptor of the replacement SSM
    #[serde(rename = "NSD")]
    pub nsd: NetworkServiceDescriptor,
    /// Network service records locating the host address
    #[serde(rename = "NSR", default)]
    pub nsr: Vec<ServiceRecord>,
    /// SSM being replaced
    #[serde(default)]
    pub target: Option<String>,
}

impl TopicRequest for UpdateRequest {
    type Command = UpdatePlan;

    fn into_command(self) -> Result<UpdatePlan> {
        let ssm = self.nsd.first_ssm()?;
        let host_address = host_address(&self.nsr).ok_or_else(|| {
            Error::InvalidRequest("NSR carries no connection point address".to_string())
        })?;
        let target = match self.target {
            Some(target) => Some(require("target", &target)?),
            None => None,
        };
        Ok(UpdatePlan {
            ssm,
            host_address,
            target,
        })
    }
}

/// Kill request payload.
#[derive(Debug, Clone, Deserialize)]
pub struct KillRequest {
    /// SSM to stop
    pub name: String,
}

impl TopicRequest for KillRequest {
    type Command = String;

    fn into_command(self) -> Result<String> {
        require("name", &self.name)
    }
}

/// Result notification payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultNotification {
    /// Free-form result
    pub result: serde_yaml::Value,
}

impl TopicRequest for ResultNotification {
    type Command = String;

    fn into_command(self) -> Result<String> {
        match self.result {
            serde_yaml::Value::String(text) => Ok(text),
            other => Ok(serde_yaml::to_string(&other)?.trim_end().to_string()),
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Success flag used by on-board, instantiate and update responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Operation succeeded
    #[serde(rename = "OK")]
    Ok,
    /// Operation failed
    #[serde(rename = "failed")]
    Failed,
}

impl Verdict {
    /// `Ok` when `success` is true.
    pub fn from_success(success: bool) -> Self {
        if success { Verdict::Ok } else { Verdict::Failed }
    }

    /// Whether this is `Ok`.
    pub fn is_ok(&self) -> bool {
        matches!(self, Verdict::Ok)
    }
}

/// On-board response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnBoardResponse {
    /// Pull outcome
    #[serde(rename = "on-board")]
    pub on_board: Verdict,
}

/// Instantiate response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstantiateResponse {
    /// Start-and-register outcome
    pub instantiation: Verdict,
}

/// Update response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResponse {
    /// Aggregated outcome
    pub update: Verdict,
}

/// Response carrying only a status, used by kill and failed registrations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Current status
    pub status: SsmStatus,
}

/// A successfully registered SSM as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredSsm {
    /// Status (running)
    pub status: SsmStatus,
    /// SSM name
    pub name: String,
    /// SSM version
    pub version: String,
    /// Description
    pub description: String,
    /// Server-assigned identifier
    pub identifier: Uuid,
    /// Diagnostic (always empty on success)
    pub error: Option<String>,
}

impl From<SsmRecord> for RegisteredSsm {
    fn from(record: SsmRecord) -> Self {
        Self {
            status: record.status,
            name: record.name,
            version: record.version,
            description: record.description,
            identifier: record.identifier,
            error: record.error,
        }
    }
}

/// Registration response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegistrationResponse {
    /// The SSM was registered
    Registered(RegisteredSsm),
    /// Registration failed
    Failed(StatusResponse),
}

impl RegistrationResponse {
    /// The failure response.
    pub fn failed() -> Self {
        RegistrationResponse::Failed(StatusResponse {
            status: SsmStatus::Failed,
        })
    }

    /// Reported status.
    pub fn status(&self) -> SsmStatus {
        match self {
            RegistrationResponse::Registered(ssm) => ssm.status,
            RegistrationResponse::Failed(resp) => resp.status,
        }
    }
}

/// Plugin announcement published on start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginAnnouncement {
    /// Plugin name
    pub name: String,
    /// Plugin version
    pub version: String,
    /// Plugin description
    pub description: String,
}
