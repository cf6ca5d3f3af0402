use crate::errors::{AppError, AppResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityStatus {
    NotStarted,
    OnGoing,
    Completed,
}

impl ActivityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::OnGoing => "ON_GOING",
            Self::Completed => "COMPLETED",
        }
    }

    /// Unknown or missing values read as not started.
    pub fn from_db(value: Option<&str>) -> Self {
        match value {
            Some("ON_GOING") => Self::OnGoing,
            Some("COMPLETED") => Self::Completed,
            _ => Self::NotStarted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrentState {
    ReadyToWork,
    NextInLine,
    Completed,
}

impl CurrentState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadyToWork => "ready_to_work",
            Self::NextInLine => "next_in_line",
            Self::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskType {
    #[serde(rename = "ACTIVITY")]
    Activity,
    #[serde(rename = "CHECKPOINT")]
    Checkpoint,
    #[serde(rename = "SUB-CHECKPOINT")]
    SubCheckpoint,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Activity => "ACTIVITY",
            Self::Checkpoint => "CHECKPOINT",
            Self::SubCheckpoint => "SUB-CHECKPOINT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DrawingStatus {
    Uploaded,
    NotUploaded,
    RevisionInProgress,
}

impl DrawingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uploaded => "UPLOADED",
            Self::NotUploaded => "NOT_UPLOADED",
            Self::RevisionInProgress => "REVISION_IN_PROGRESS",
        }
    }
}

/// Sparse search criteria shared by every activity query. `None`, `false` and blank
/// strings mean "no predicate".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityFilters {
    #[serde(alias = "activity_id")]
    pub activity_id: Option<String>,
    #[serde(alias = "componentName", alias = "component_name", alias = "module_name")]
    pub module_name: Option<String>,
    #[serde(alias = "current_state")]
    pub current_state: Option<CurrentState>,
    pub status: Option<ActivityStatus>,
    #[serde(alias = "wbs")]
    pub code: Option<String>,
    #[serde(alias = "activity_name")]
    pub activity_name: Option<String>,
    #[serde(alias = "task_name")]
    pub task_name: Option<String>,
    pub priority: Option<Priority>,
    #[serde(alias = "quantity_manager_name")]
    pub quantity_manager_name: Option<String>,
    #[serde(alias = "is_delayed")]
    pub is_delayed: Option<bool>,
    #[serde(alias = "min_delay_days")]
    pub min_delay_days: Option<i64>,
    pub section: Option<String>,
    #[serde(alias = "assigned_to_me")]
    pub assigned_to_me: bool,
    #[serde(alias = "raised_by_me")]
    pub raised_by_me: bool,
    #[serde(alias = "drawing_status")]
    pub drawing_status: Option<DrawingStatus>,
    #[serde(alias = "task_type")]
    pub task_type: Option<TaskType>,
    #[serde(alias = "module_template_name")]
    pub module_template_name: Option<String>,
    #[serde(alias = "boq_name")]
    pub boq_name: Option<String>,
}

impl ActivityFilters {
    pub fn without_code(&self) -> Self {
        Self {
            code: None,
            ..self.clone()
        }
    }

    /// Name-type filters that narrow a search enough to want every match back.
    pub fn narrowing_name_filter_count(&self) -> usize {
        [
            &self.module_name,
            &self.activity_name,
            &self.task_name,
            &self.section,
            &self.module_template_name,
            &self.quantity_manager_name,
        ]
        .into_iter()
        .filter(|value| is_present(value.as_deref()))
        .count()
    }

    /// Parent-level filters that still make sense once the code filter is dropped.
    pub fn has_category_filter(&self) -> bool {
        is_present(self.module_name.as_deref())
            || is_present(self.module_template_name.as_deref())
            || is_present(self.boq_name.as_deref())
    }
}

pub(crate) fn is_present(value: Option<&str>) -> bool {
    value.is_some_and(|value| !value.trim().is_empty())
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| match value {
        serde_json::Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|n| n.is_finite()).map(|n| n as i64)),
        serde_json::Value::String(raw) => raw.trim().parse::<i64>().ok(),
        _ => None,
    }))
}

/// Decodes tool arguments handed over by the host as JSON.
pub fn parse_args<T: DeserializeOwned>(value: serde_json::Value) -> AppResult<T> {
    serde_json::from_value(value)
        .map_err(|error| AppError::InvalidInput(format!("Invalid input parameter: {}", error)))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryActivitiesArgs {
    #[serde(flatten)]
    pub filters: ActivityFilters,
    #[serde(alias = "group_by_module")]
    pub group_by_module: bool,
    #[serde(deserialize_with = "lenient_i64")]
    pub limit: Option<i64>,
    #[serde(deserialize_with = "lenient_i64")]
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceQueryArgs {
    #[serde(alias = "activity_id")]
    pub activity_id: Option<String>,
    #[serde(alias = "wbs")]
    pub code: Option<String>,
    #[serde(alias = "activity_name")]
    pub activity_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusLookupArgs {
    #[serde(alias = "activity_id")]
    pub activity_id: Option<String>,
    #[serde(alias = "wbs")]
    pub code: Option<String>,
    #[serde(alias = "activity_name")]
    pub activity_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CarouselArgs {
    #[serde(alias = "wbs")]
    pub code: Option<String>,
    #[serde(alias = "activity_name")]
    pub activity_name: Option<String>,
    #[serde(alias = "componentName", alias = "component_name", alias = "module_name")]
    pub module_name: Option<String>,
    #[serde(alias = "module_template_name")]
    pub module_template_name: Option<String>,
    pub status: Option<ActivityStatus>,
    #[serde(alias = "boq_name")]
    pub boq_name: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub limit: Option<i64>,
    #[serde(deserialize_with = "lenient_i64")]
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionEntry {
    #[serde(default, alias = "boq_item_resource_id")]
    pub boq_item_resource_id: Option<String>,
    #[serde(default, alias = "template_task_id")]
    pub template_task_id: Option<String>,
    #[serde(default, alias = "template_id")]
    pub template_id: Option<String>,
    #[serde(default, alias = "componentId", alias = "component_id", alias = "module_id")]
    pub module_id: Option<String>,
    pub consumption: f64,
    #[serde(default, alias = "consumption_percent")]
    pub consumption_percent: Option<f64>,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConsumptionArgs {
    #[serde(alias = "activity_id")]
    pub activity_id: String,
    #[serde(alias = "activity_name")]
    pub activity_name: String,
    pub entries: Vec<ConsumptionEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignActivityArgs {
    #[serde(alias = "activity_id")]
    pub activity_id: String,
    #[serde(alias = "activity_name")]
    pub activity_name: String,
    #[serde(alias = "new_assignee_id")]
    pub new_assignee_id: String,
    #[serde(alias = "new_assignee_name")]
    pub new_assignee_name: String,
    #[serde(default, alias = "current_assignee_id")]
    pub current_assignee_id: Option<String>,
    #[serde(default, alias = "current_assignee_name")]
    pub current_assignee_name: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

// Record shapes, one per query.

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummary {
    pub id: String,
    pub code: String,
    pub name: String,
    pub status: ActivityStatus,
    pub current_state: Option<String>,
    pub work_state: Option<String>,
    pub derived_status: Option<&'static str>,
    pub priority: Option<String>,
    pub task_type: Option<String>,
    pub task_name: Option<String>,
    pub section: Option<String>,
    /// Negative means behind schedule.
    pub delay: Option<i64>,
    pub actual_start_date: Option<String>,
    pub end_time: Option<String>,
    pub projected_end_date: Option<String>,
    pub module_id: Option<String>,
    pub module_name: Option<String>,
    pub module_template_name: Option<String>,
    pub drawing_status: Option<String>,
    pub quantity_manager_name: Option<String>,
    pub modified_by: Option<String>,
    pub modified_on: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleAggregate {
    pub module_id: String,
    pub module_name: String,
    pub activity_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDetailRow {
    pub id: String,
    pub name: String,
    pub code: String,
    pub status: ActivityStatus,
    pub current_state: Option<String>,
    pub priority: Option<String>,
    pub planned_duration: Option<i64>,
    pub planned_start_date: Option<String>,
    pub planned_end_date: Option<String>,
    pub projected_end_date: Option<String>,
    pub actual_start_date: Option<String>,
    pub end_time: Option<String>,
    pub delay: Option<i64>,
    pub module_id: Option<String>,
    pub module_name: Option<String>,
    pub module_template_name: Option<String>,
    pub started_by: Option<UserRef>,
    pub quantity_manager: Option<UserRef>,
    pub has_drawings: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRow {
    pub id: String,
    pub name: String,
    pub code: String,
    pub status: ActivityStatus,
    pub current_state: Option<String>,
    pub work_state: Option<String>,
    pub module_name: Option<String>,
    pub template_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceAllocationRow {
    pub activity_id: String,
    pub activity_name: String,
    pub code: Option<String>,
    pub resource_name: Option<String>,
    pub resource_type: Option<String>,
    pub unit: Option<String>,
    pub estimated_quantity: f64,
    pub contractor_name: Option<String>,
    pub boq_item_name: Option<String>,
    pub allocation_count: i64,
}

// UI payloads.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDates {
    pub planned_start_date: Option<String>,
    pub planned_end_date: Option<String>,
    pub projected_end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayInfo {
    pub is_delayed: bool,
    pub delay_days: Option<i64>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityAction {
    pub id: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStatusDetail {
    pub activity_id: String,
    pub activity_code: String,
    pub activity_name: String,
    pub module_id: Option<String>,
    pub module_name: Option<String>,
    pub module_path: Vec<String>,
    pub status: ActivityStatus,
    pub duration_days: Option<i64>,
    pub started_by: Option<UserRef>,
    pub quantity_manager: Option<UserRef>,
    pub assigned_to: Option<UserRef>,
    pub dates: ActivityDates,
    pub delay_info: Option<DelayInfo>,
    pub has_drawings: bool,
    pub available_actions: Vec<ActivityAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStatusDetailPayload {
    pub activity: ActivityStatusDetail,
    pub header_text: String,
    pub message_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CarouselItem {
    pub id: String,
    pub wbs_number: String,
    pub description: String,
    pub module_path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityCarouselPayload {
    pub activities: Vec<CarouselItem>,
    pub header_text: String,
    pub show_reasoning: bool,
    pub tier: String,
    pub total_count: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
    pub remaining_count: i64,
}

// Response envelope.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Error,
    NotFound,
    UiRendered,
    AwaitingConfirmation,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetadata {
    pub user_id: String,
    pub project_id: String,
    pub is_admin: bool,
    pub skip_role_filters: bool,
    pub lead_role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityListBody {
    pub activities: Vec<ActivitySummary>,
    pub record_count: usize,
    pub total_count: i64,
    pub has_more: bool,
    pub limit: i64,
    pub offset: i64,
    pub metadata: QueryMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleListBody {
    pub modules: Vec<ModuleAggregate>,
    pub total_modules: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceListBody {
    pub resources: Vec<ResourceAllocationRow>,
    pub distinct_resources: usize,
    pub total_allocations: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedBody {
    pub component: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_count: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationBody {
    pub tool_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Empty {},
    Activities(ActivityListBody),
    Modules(ModuleListBody),
    Resources(ResourceListBody),
    Rendered(RenderedBody),
    Mutation(MutationBody),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub status: ToolStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    #[serde(flatten)]
    pub body: ResponseBody,
}

impl ToolResponse {
    pub fn new(status: ToolStatus, message: impl Into<String>, body: ResponseBody) -> Self {
        Self {
            status,
            message: message.into(),
            error_code: None,
            body,
        }
    }

    pub fn success(message: impl Into<String>, body: ResponseBody) -> Self {
        Self::new(ToolStatus::Success, message, body)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ToolStatus::NotFound, message, ResponseBody::Empty {})
    }

    pub fn error(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            message: message.into(),
            error_code: Some(code),
            body: ResponseBody::Empty {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_args, ActivityFilters, CarouselArgs, QueryActivitiesArgs, ToolResponse};

    #[test]
    fn query_args_accept_aliases_and_lenient_pagination() {
        let args: QueryActivitiesArgs = parse_args(serde_json::json!({
            "wbs": "2.1.5",
            "componentName": "Tower A",
            "status": "ON_GOING",
            "limit": "25",
            "offset": "abc"
        }))
        .expect("args");
        assert_eq!(args.filters.code.as_deref(), Some("2.1.5"));
        assert_eq!(args.filters.module_name.as_deref(), Some("Tower A"));
        assert_eq!(args.limit, Some(25));
        assert_eq!(args.offset, None);
    }

    #[test]
    fn unknown_enum_values_are_invalid_input() {
        let result: Result<CarouselArgs, _> = parse_args(serde_json::json!({ "status": "DONE" }));
        assert!(result.is_err());
    }

    #[test]
    fn counts_narrowing_name_filters() {
        let filters = ActivityFilters {
            module_name: Some("Tower".to_string()),
            activity_name: Some("  ".to_string()),
            task_name: Some("Shuttering".to_string()),
            ..ActivityFilters::default()
        };
        assert_eq!(filters.narrowing_name_filter_count(), 2);
        assert!(filters.has_category_filter());
        assert!(!ActivityFilters::default().has_category_filter());
    }

    #[test]
    fn error_envelope_serializes_flat() {
        let response = ToolResponse::error("INVALID_INPUT", "bad limit");
        let value = serde_json::to_value(&response).expect("json");
        assert_eq!(value["status"], "error");
        assert_eq!(value["errorCode"], "INVALID_INPUT");
        assert_eq!(value["message"], "bad limit");
    }
}
