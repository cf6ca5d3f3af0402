use crate::access::{AccessProfile, PermissionResolver};
use crate::config::EngineConfig;
use crate::confirmation::{run_gated, GateOutcome, Mutation};
use crate::context::{Identity, ToolContext, UiComponentType};
use crate::db::{ensure_ready, DataStore};
use crate::errors::{AppError, AppResult};
use crate::fallback::{search_tiers, SearchTier};
use crate::models::{
    parse_args, ActivityCarouselPayload, ActivityDetailRow, ActivityFilters, ActivityListBody, AssignActivityArgs,
    CarouselArgs, LogConsumptionArgs, ModuleListBody, MutationBody, QueryActivitiesArgs,
    QueryMetadata, RenderedBody, ResourceListBody, ResourceQueryArgs, ResponseBody,
    StatusLookupArgs, ToolResponse, ToolStatus,
};
use crate::policy::{InputPolicy, Page};
use crate::query::QueryOrchestrator;
use crate::redaction::ErrorSummarizer;
use crate::shaping;
use serde::Serialize;
use std::sync::Arc;

pub const QUERY_ACTIVITIES: &str = "query_activities";
pub const QUERY_ACTIVITY_RESOURCES: &str = "query_activity_resources";
pub const GET_ACTIVITY_STATUS: &str = "get_activity_status";
pub const GET_ACTIVITY_CAROUSEL: &str = "get_activity_carousel";
pub const LOG_ACTIVITY_CONSUMPTION: &str = "log_activity_consumption";
pub const ASSIGN_ACTIVITY: &str = "assign_activity";

pub const TOOL_NAMES: [&str; 6] = [
    QUERY_ACTIVITIES,
    QUERY_ACTIVITY_RESOURCES,
    GET_ACTIVITY_STATUS,
    GET_ACTIVITY_CAROUSEL,
    LOG_ACTIVITY_CONSUMPTION,
    ASSIGN_ACTIVITY,
];

const NO_MATCHES: &str = "No activities found matching your criteria.";

/// The operation surface handed to the hosting agent. Each call is independent; nothing
/// is cached between calls.
pub struct ActivityEngine {
    store: Arc<dyn DataStore>,
    config: EngineConfig,
    policy: InputPolicy,
    resolver: PermissionResolver,
    summarizer: ErrorSummarizer,
}

impl ActivityEngine {
    pub fn new(store: Arc<dyn DataStore>, config: EngineConfig) -> Self {
        Self {
            policy: InputPolicy::new(&config),
            resolver: PermissionResolver::new(config.access.clone()),
            summarizer: ErrorSummarizer,
            store,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Dispatches a tool call by name with JSON arguments.
    pub async fn invoke(&self, tool_name: &str, context: &mut ToolContext, args: serde_json::Value) -> ToolResponse {
        let response = match tool_name {
            QUERY_ACTIVITIES => match parse_args(args) {
                Ok(args) => return self.query_activities(context, args).await,
                Err(error) => Err(error),
            },
            QUERY_ACTIVITY_RESOURCES => match parse_args(args) {
                Ok(args) => return self.query_activity_resources(context, args).await,
                Err(error) => Err(error),
            },
            GET_ACTIVITY_STATUS => match parse_args(args) {
                Ok(args) => return self.get_activity_status(context, args).await,
                Err(error) => Err(error),
            },
            GET_ACTIVITY_CAROUSEL => match parse_args(args) {
                Ok(args) => return self.get_activity_carousel(context, args).await,
                Err(error) => Err(error),
            },
            LOG_ACTIVITY_CONSUMPTION => match parse_args(args) {
                Ok(args) => return self.log_activity_consumption(context, args).await,
                Err(error) => Err(error),
            },
            ASSIGN_ACTIVITY => match parse_args(args) {
                Ok(args) => return self.assign_activity(context, args).await,
                Err(error) => Err(error),
            },
            other => Err(AppError::InvalidInput(format!("unknown tool '{}'", other))),
        };
        self.finish(tool_name, context, response)
    }

    pub async fn query_activities(&self, context: &mut ToolContext, args: QueryActivitiesArgs) -> ToolResponse {
        let response = self.run_query_activities(context, args).await;
        self.finish(QUERY_ACTIVITIES, context, response)
    }

    pub async fn query_activity_resources(&self, context: &mut ToolContext, args: ResourceQueryArgs) -> ToolResponse {
        let response = self.run_query_activity_resources(context, args).await;
        self.finish(QUERY_ACTIVITY_RESOURCES, context, response)
    }

    pub async fn get_activity_status(&self, context: &mut ToolContext, args: StatusLookupArgs) -> ToolResponse {
        let response = self.run_get_activity_status(context, args).await;
        self.finish(GET_ACTIVITY_STATUS, context, response)
    }

    pub async fn get_activity_carousel(&self, context: &mut ToolContext, args: CarouselArgs) -> ToolResponse {
        let response = self.run_get_activity_carousel(context, args).await;
        self.finish(GET_ACTIVITY_CAROUSEL, context, response)
    }

    pub async fn log_activity_consumption(&self, context: &mut ToolContext, args: LogConsumptionArgs) -> ToolResponse {
        let response = self.run_mutation(context, args).await.map(|outcome| match outcome {
            GateOutcome::AwaitingConfirmation(request) => awaiting(request.payload),
            GateOutcome::Rejected(_) => ToolResponse::new(
                ToolStatus::Rejected,
                "User cancelled the consumption logging.",
                ResponseBody::Empty {},
            ),
            GateOutcome::Committed { args, output } => ToolResponse::success(
                format!(
                    "Logged {} consumption entries for '{}'.",
                    output, args.activity_name
                ),
                ResponseBody::Mutation(MutationBody {
                    tool_name: LOG_ACTIVITY_CONSUMPTION.to_string(),
                    affected: Some(output),
                    payload: serde_json::to_value(&args.entries).ok(),
                }),
            ),
        });
        self.finish(LOG_ACTIVITY_CONSUMPTION, context, response)
    }

    pub async fn assign_activity(&self, context: &mut ToolContext, args: AssignActivityArgs) -> ToolResponse {
        let response = self.run_mutation(context, args).await.map(|outcome| match outcome {
            GateOutcome::AwaitingConfirmation(request) => awaiting(request.payload),
            GateOutcome::Rejected(_) => ToolResponse::new(
                ToolStatus::Rejected,
                "User cancelled the assignment.",
                ResponseBody::Empty {},
            ),
            GateOutcome::Committed { args, output } => ToolResponse::success(
                format!(
                    "Activity '{}' assigned to {}.",
                    args.activity_name, args.new_assignee_name
                ),
                ResponseBody::Mutation(MutationBody {
                    tool_name: ASSIGN_ACTIVITY.to_string(),
                    affected: Some(output),
                    payload: serde_json::to_value(&args).ok(),
                }),
            ),
        });
        self.finish(ASSIGN_ACTIVITY, context, response)
    }

    async fn run_mutation<M: Mutation>(
        &self,
        context: &mut ToolContext,
        args: M,
    ) -> AppResult<GateOutcome<M, M::Output>> {
        run_gated(context, self.store.as_ref(), &self.policy, args).await
    }

    /// Readiness, then the access profile. Callers check identity and validate input
    /// first so nothing touches the store before both pass.
    async fn open(&self, identity: &Identity) -> AppResult<AccessProfile> {
        ensure_ready(self.store.as_ref())?;
        self.resolver.resolve(self.store.as_ref(), identity).await
    }

    async fn run_query_activities(&self, context: &ToolContext, args: QueryActivitiesArgs) -> AppResult<ToolResponse> {
        let identity = context.identity()?;
        let filters = self.policy.sanitize_filters(&args.filters)?;
        let profile = self.open(&identity).await?;
        let orchestrator = QueryOrchestrator::new(self.store.as_ref(), &profile);
        let filter_msg = shaping::describe_filters(&filters);

        tracing::info!(
            user_id = %identity.user_id,
            project_id = %identity.project_id,
            grouped = args.group_by_module,
            skip_role_filters = profile.skips_role_filters(),
            "query activities"
        );

        if args.group_by_module {
            let modules = orchestrator.grouped(&filters).await?;
            let message = shaping::modules_message(modules.len(), &filter_msg);
            return Ok(ToolResponse::success(
                message,
                ResponseBody::Modules(ModuleListBody {
                    total_modules: modules.len(),
                    modules,
                }),
            ));
        }

        let page = self
            .policy
            .list_page(args.limit, args.offset, filters.narrowing_name_filter_count());
        let result = orchestrator.list(&filters, page).await?;
        let returned = result.activities.len();
        let message = shaping::list_message(result.total, &filter_msg, returned, page);
        Ok(ToolResponse::success(
            message,
            ResponseBody::Activities(ActivityListBody {
                record_count: returned,
                total_count: result.total,
                has_more: shaping::has_more(page, returned, result.total),
                limit: page.limit,
                offset: page.offset,
                activities: result.activities,
                metadata: QueryMetadata {
                    user_id: identity.user_id,
                    project_id: identity.project_id,
                    is_admin: profile.is_project_admin,
                    skip_role_filters: profile.skips_role_filters(),
                    lead_role: profile.lead_role_code().map(str::to_string),
                },
            }),
        ))
    }

    async fn run_query_activity_resources(
        &self,
        context: &ToolContext,
        args: ResourceQueryArgs,
    ) -> AppResult<ToolResponse> {
        let identity = context.identity()?;
        let filters = ActivityFilters {
            activity_id: self.policy.string_param("activity_id", args.activity_id.as_deref())?,
            code: self.policy.code_param("code", args.code.as_deref())?,
            activity_name: self.policy.string_param("activity_name", args.activity_name.as_deref())?,
            ..ActivityFilters::default()
        };
        if filters.activity_id.is_none() && filters.code.is_none() && filters.activity_name.is_none() {
            return Err(AppError::InvalidInput(
                "Please provide at least one filter: activity_id, wbs, or activity_name.".to_string(),
            ));
        }
        let profile = self.open(&identity).await?;
        let rows = QueryOrchestrator::new(self.store.as_ref(), &profile)
            .resources(&filters)
            .await?;
        let distinct = shaping::distinct_resources(&rows);
        let total_allocations = rows.iter().map(|row| row.allocation_count).sum();
        Ok(ToolResponse::success(
            shaping::resources_message(distinct, rows.len()),
            ResponseBody::Resources(ResourceListBody {
                resources: rows,
                distinct_resources: distinct,
                total_allocations,
            }),
        ))
    }

    async fn run_get_activity_status(
        &self,
        context: &mut ToolContext,
        args: StatusLookupArgs,
    ) -> AppResult<ToolResponse> {
        let identity = context.identity()?;
        if let Some(selected) = selected_activity_id(context) {
            let profile = self.open(&identity).await?;
            let filters = ActivityFilters {
                activity_id: Some(selected.clone()),
                ..ActivityFilters::default()
            };
            let rows = QueryOrchestrator::new(self.store.as_ref(), &profile)
                .detail(&filters, 1)
                .await?;
            let Some(row) = rows.first() else {
                return Ok(ToolResponse::not_found(format!(
                    "Activity with ID {} not found or you don't have access.",
                    selected
                )));
            };
            return self.emit_detail(context, row);
        }

        let filters = ActivityFilters {
            activity_id: self.policy.string_param("activity_id", args.activity_id.as_deref())?,
            code: self.policy.code_param("code", args.code.as_deref())?,
            activity_name: self.policy.string_param("activity_name", args.activity_name.as_deref())?,
            ..ActivityFilters::default()
        };
        if filters.activity_id.is_none() && filters.code.is_none() && filters.activity_name.is_none() {
            return Err(AppError::InvalidInput(
                "Please provide activity_id, wbs, or activity_name to search.".to_string(),
            ));
        }

        let profile = self.open(&identity).await?;
        let orchestrator = QueryOrchestrator::new(self.store.as_ref(), &profile);
        let match_limit = self.policy.detail_match_limit();
        let rows = orchestrator.detail(&filters, match_limit).await?;
        match rows.as_slice() {
            [] => Ok(ToolResponse::not_found(NO_MATCHES)),
            [row] => self.emit_detail(context, row),
            _ => {
                let total = orchestrator.count_lookup(&filters).await?.max(rows.len() as i64);
                let page = Page {
                    limit: match_limit,
                    offset: 0,
                };
                let payload = ActivityCarouselPayload {
                    activities: rows.iter().map(shaping::detail_selection_item).collect(),
                    header_text: shaping::LOOKUP_SELECTION_HEADER.to_string(),
                    show_reasoning: false,
                    tier: SearchTier::Exact.label(),
                    total_count: total,
                    limit: page.limit,
                    offset: page.offset,
                    has_more: shaping::has_more(page, rows.len(), total),
                    remaining_count: (total - rows.len() as i64).max(0),
                };
                emit(context, UiComponentType::ActivityCarousel, &payload, true)?;
                Ok(ToolResponse::new(
                    ToolStatus::UiRendered,
                    format!("Found {} matching activities; waiting for a selection.", total),
                    ResponseBody::Rendered(RenderedBody {
                        component: UiComponentType::ActivityCarousel.as_str().to_string(),
                        activity_name: None,
                        count: Some(rows.len()),
                        total_count: Some(total),
                        tier: Some(payload.tier.clone()),
                        remaining_count: Some(payload.remaining_count),
                    }),
                ))
            }
        }
    }

    fn emit_detail(&self, context: &mut ToolContext, row: &ActivityDetailRow) -> AppResult<ToolResponse> {
        let payload = shaping::status_detail(row);
        emit(context, UiComponentType::ActivityStatusDetail, &payload, false)?;
        Ok(ToolResponse::new(
            ToolStatus::UiRendered,
            payload.header_text.clone(),
            ResponseBody::Rendered(RenderedBody {
                component: UiComponentType::ActivityStatusDetail.as_str().to_string(),
                activity_name: Some(row.name.clone()),
                count: None,
                total_count: None,
                tier: None,
                remaining_count: None,
            }),
        ))
    }

    async fn run_get_activity_carousel(
        &self,
        context: &mut ToolContext,
        args: CarouselArgs,
    ) -> AppResult<ToolResponse> {
        let identity = context.identity()?;
        let filters = ActivityFilters {
            code: self.policy.code_param("code", args.code.as_deref())?,
            activity_name: self.policy.string_param("activity_name", args.activity_name.as_deref())?,
            module_name: self.policy.string_param("module_name", args.module_name.as_deref())?,
            module_template_name: self
                .policy
                .string_param("module_template_name", args.module_template_name.as_deref())?,
            status: args.status,
            boq_name: self.policy.string_param("boq_name", args.boq_name.as_deref())?,
            ..ActivityFilters::default()
        };
        let page = self.policy.selection_page(args.limit, args.offset);

        let profile = self.open(&identity).await?;
        let orchestrator = QueryOrchestrator::new(self.store.as_ref(), &profile);
        let matched = search_tiers(&orchestrator, &filters, page).await?;
        if matched.rows.is_empty() {
            tracing::info!(user_id = %identity.user_id, tier = %matched.tier.label(), "carousel found nothing");
            return Ok(ToolResponse::not_found(NO_MATCHES));
        }

        let header = shaping::carousel_header(&matched.tier, &filters, filters.code.as_deref());
        let payload = shaping::carousel_payload(&matched.rows, &matched.tier, header, matched.total, page);
        emit(context, UiComponentType::ActivityCarousel, &payload, true)?;
        let tier_name = if filters.code.is_some() {
            matched.tier.label()
        } else {
            "standard".to_string()
        };
        Ok(ToolResponse::new(
            ToolStatus::UiRendered,
            format!("Found {} activities using {} matching.", matched.total, tier_name),
            ResponseBody::Rendered(RenderedBody {
                component: UiComponentType::ActivityCarousel.as_str().to_string(),
                activity_name: None,
                count: Some(payload.activities.len()),
                total_count: Some(matched.total),
                tier: Some(payload.tier.clone()),
                remaining_count: Some(payload.remaining_count),
            }),
        ))
    }

    /// Converts the internal result into the response envelope. Failures are logged with
    /// the full cause; the caller only sees the summarized one.
    fn finish(&self, tool: &str, context: &ToolContext, response: AppResult<ToolResponse>) -> ToolResponse {
        match response {
            Ok(response) => response,
            Err(AppError::NotFound(message)) => ToolResponse::not_found(message),
            Err(error) => {
                tracing::error!(
                    tool,
                    code = error.code(),
                    user_id = ?context.state(crate::context::USER_ID_KEY),
                    project_id = ?context.state(crate::context::PROJECT_ID_KEY),
                    error = %error,
                    "tool call failed"
                );
                ToolResponse::error(error.code(), self.summarizer.user_message(&error))
            }
        }
    }
}

fn awaiting(payload: serde_json::Value) -> ToolResponse {
    ToolResponse::new(
        ToolStatus::AwaitingConfirmation,
        "Waiting for the user to confirm.",
        ResponseBody::Mutation(MutationBody {
            tool_name: payload
                .get("toolName")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string(),
            affected: None,
            payload: Some(payload),
        }),
    )
}

fn emit<T: Serialize>(
    context: &mut ToolContext,
    component: UiComponentType,
    payload: &T,
    requires_response: bool,
) -> AppResult<()> {
    let payload = serde_json::to_value(payload)
        .map_err(|error| AppError::Internal(format!("failed to encode {}: {}", component.as_str(), error)))?;
    context.emit_ui_component(component, payload, requires_response);
    Ok(())
}

/// A carousel pick handed back through the confirmation slot.
fn selected_activity_id(context: &ToolContext) -> Option<String> {
    let payload = &context.tool_confirmation()?.payload;
    let selected = payload
        .get("activityId")
        .or_else(|| payload.get("activity_id"))
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);
    if selected.is_none() {
        tracing::warn!("carousel confirmation carried no activity id; running a normal search");
    }
    selected
}
