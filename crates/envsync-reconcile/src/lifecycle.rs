//! Lifecycle handler for framework-driven units.
//!
//! Deployment frameworks deliver one request per (unit, event). Create and
//! Update apply the unit's key, Delete removes it. The response reports the
//! key as the stable physical id, so an Update that keeps the key keeps the
//! id, and an Update that changes the key makes the framework follow up with
//! a Delete for the old one.
//!
//! # Example
//!
//! ```ignore
//! let handler = LifecycleHandler::new(registry, &ReconcileConfig::default());
//! let response = handler.handle_json(&raw_request).await;
//! ```

use std::sync::Arc;
use std::time::Duration;

use envsync_core::{LifecycleEvent, ReconciliationUnit, StalenessToken, TargetId};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::ReconcileConfig;
use crate::error::ReconcileError;
use crate::executor::ReconcileOutcome;
use crate::registry::ExecutorRegistry;

/// Properties identifying one unit in a lifecycle request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UnitProperties {
    pub target_id: String,
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staleness_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// A lifecycle event for one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleRequest {
    pub request_type: LifecycleEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,
    pub resource_properties: UnitProperties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_resource_properties: Option<UnitProperties>,
}

impl LifecycleRequest {
    /// Builds the unit this request acts on.
    pub fn unit(&self) -> Result<ReconciliationUnit, ReconcileError> {
        let props = &self.resource_properties;
        let target = TargetId::new(props.target_id.as_str())?;
        let mut unit = ReconciliationUnit::new(
            target,
            props.key.as_str(),
            props.value.as_str(),
            self.request_type.operation(),
        )?;
        if let Some(token) = &props.staleness_token {
            unit = unit.with_staleness_token(StalenessToken::from(token.as_str()));
        }
        Ok(unit)
    }

    /// Whether an Update moves the unit to a different key.
    pub fn renames_key(&self) -> bool {
        self.request_type == LifecycleEvent::Update
            && self
                .old_resource_properties
                .as_ref()
                .is_some_and(|old| old.key != self.resource_properties.key)
    }

    fn fallback_physical_id(&self) -> String {
        self.physical_resource_id
            .clone()
            .unwrap_or_else(|| self.resource_properties.key.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseData {
    #[serde(rename = "outputKey", default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
}

/// Reply to a [`LifecycleRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleResponse {
    pub status: ResponseStatus,
    pub physical_resource_id: String,
    #[serde(default)]
    pub data: ResponseData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl LifecycleResponse {
    fn success(outcome: ReconcileOutcome) -> Self {
        Self {
            status: ResponseStatus::Success,
            physical_resource_id: outcome.physical_id,
            data: ResponseData {
                output_key: Some(outcome.output_key),
            },
            reason: None,
        }
    }

    fn failed(physical_resource_id: String, reason: String) -> Self {
        Self {
            status: ResponseStatus::Failed,
            physical_resource_id,
            data: ResponseData::default(),
            reason: Some(reason),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

/// Routes lifecycle requests to scoped executors.
#[derive(Debug)]
pub struct LifecycleHandler {
    registry: Arc<ExecutorRegistry>,
    default_scope: String,
    unit_timeout: Option<Duration>,
}

impl LifecycleHandler {
    pub fn new(registry: Arc<ExecutorRegistry>, config: &ReconcileConfig) -> Self {
        Self {
            registry,
            default_scope: config.default_scope.clone(),
            unit_timeout: config.unit_timeout(),
        }
    }

    pub fn registry(&self) -> &Arc<ExecutorRegistry> {
        &self.registry
    }

    /// Handles one request. Failures are reported in the response, never
    /// returned.
    pub async fn handle(&self, request: &LifecycleRequest) -> LifecycleResponse {
        match self.try_handle(request).await {
            Ok(outcome) => {
                info!(
                    event = %request.request_type,
                    physical_id = %outcome.physical_id,
                    renamed = request.renames_key(),
                    "Lifecycle request succeeded"
                );
                LifecycleResponse::success(outcome)
            }
            Err(e) => {
                error!(
                    event = %request.request_type,
                    category = %e.category(),
                    error = %e,
                    "Lifecycle request failed"
                );
                LifecycleResponse::failed(request.fallback_physical_id(), e.to_string())
            }
        }
    }

    /// Handles a JSON-encoded request and returns the JSON response.
    pub async fn handle_json(&self, raw: &str) -> Result<String, serde_json::Error> {
        let request: LifecycleRequest = serde_json::from_str(raw)?;
        let response = self.handle(&request).await;
        serde_json::to_string(&response)
    }

    async fn try_handle(&self, request: &LifecycleRequest) -> Result<ReconcileOutcome, ReconcileError> {
        let unit = request.unit()?;
        let scope = request
            .resource_properties
            .scope
            .as_deref()
            .unwrap_or(&self.default_scope);
        let executor = self.registry.get_or_create(scope);
        executor.execute_with_timeout(&unit, self.unit_timeout).await
    }
}
