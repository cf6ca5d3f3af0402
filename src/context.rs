use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const USER_ID_KEY: &str = "user_id";
pub const PROJECT_ID_KEY: &str = "project_id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub project_id: String,
}

/// The human's answer to an earlier confirmation request, handed back by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfirmation {
    pub confirmed: bool,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ToolConfirmation {
    pub fn approve(payload: serde_json::Value) -> Self {
        Self {
            confirmed: true,
            payload,
        }
    }

    pub fn decline(payload: serde_json::Value) -> Self {
        Self {
            confirmed: false,
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationRequest {
    pub tool_name: String,
    pub hint: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiComponentType {
    ActivityStatusDetail,
    ActivityCarousel,
}

impl UiComponentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ActivityStatusDetail => "activity_status_detail",
            Self::ActivityCarousel => "activity_carousel",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiEmission {
    pub component: UiComponentType,
    pub payload: serde_json::Value,
    pub requires_response: bool,
}

/// Per-call context supplied by the host: identity state, the confirmation slot and the
/// sink for emitted UI components. The engine keeps nothing between calls; the host
/// carries a pending confirmation over to the follow-up call.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    state: BTreeMap<String, String>,
    tool_confirmation: Option<ToolConfirmation>,
    requested_confirmation: Option<ConfirmationRequest>,
    emissions: Vec<UiEmission>,
}

impl ToolContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_identity(user_id: &str, project_id: &str) -> Self {
        let mut context = Self::new();
        context.set_state(USER_ID_KEY, user_id);
        context.set_state(PROJECT_ID_KEY, project_id);
        context
    }

    pub fn with_confirmation(mut self, confirmation: ToolConfirmation) -> Self {
        self.tool_confirmation = Some(confirmation);
        self
    }

    pub fn set_state(&mut self, key: &str, value: &str) {
        self.state.insert(key.to_string(), value.to_string());
    }

    pub fn state(&self, key: &str) -> Option<&str> {
        self.state.get(key).map(String::as_str)
    }

    pub fn identity(&self) -> AppResult<Identity> {
        let user_id = self.state(USER_ID_KEY).map(str::trim).unwrap_or_default();
        let project_id = self.state(PROJECT_ID_KEY).map(str::trim).unwrap_or_default();
        if user_id.is_empty() || project_id.is_empty() {
            return Err(AppError::ContextMissing(
                "User ID or Project ID missing from context.".to_string(),
            ));
        }
        Ok(Identity {
            user_id: user_id.to_string(),
            project_id: project_id.to_string(),
        })
    }

    pub fn tool_confirmation(&self) -> Option<&ToolConfirmation> {
        self.tool_confirmation.as_ref()
    }

    pub fn request_confirmation(&mut self, request: ConfirmationRequest) {
        self.requested_confirmation = Some(request);
    }

    pub fn requested_confirmation(&self) -> Option<&ConfirmationRequest> {
        self.requested_confirmation.as_ref()
    }

    pub fn take_requested_confirmation(&mut self) -> Option<ConfirmationRequest> {
        self.requested_confirmation.take()
    }

    pub fn emit_ui_component(
        &mut self,
        component: UiComponentType,
        payload: serde_json::Value,
        requires_response: bool,
    ) {
        self.emissions.push(UiEmission {
            component,
            payload,
            requires_response,
        });
    }

    pub fn emissions(&self) -> &[UiEmission] {
        &self.emissions
    }
}
