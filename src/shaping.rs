use crate::fallback::SearchTier;
use crate::models::{
    ActivityAction, ActivityCarouselPayload, ActivityDates, ActivityDetailRow, ActivityFilters,
    ActivityStatus, ActivityStatusDetail, ActivityStatusDetailPayload, CarouselItem, DelayInfo,
    ResourceAllocationRow, SelectionRow,
};
use crate::policy::Page;
use std::collections::BTreeSet;

pub const SELECTION_HEADER: &str = "I found multiple matching activities. Select the correct one to continue so I can log consumption accurately.";
pub const LOOKUP_SELECTION_HEADER: &str =
    "I found multiple matching activities. Please select one to continue.";

/// Short status tag shown next to list rows. `None` when no tag applies.
pub fn derive_status(
    status: ActivityStatus,
    current_state: Option<&str>,
    work_state: Option<&str>,
) -> Option<&'static str> {
    match (status, current_state) {
        (ActivityStatus::OnGoing, _) => Some("ongoing"),
        (ActivityStatus::Completed, _) => Some("completed"),
        (ActivityStatus::NotStarted, Some("next_in_line")) => Some("next"),
        (ActivityStatus::NotStarted, Some("ready_to_work")) if work_state == Some("RELEASED") => {
            Some("ready")
        }
        _ => None,
    }
}

/// `delay` is the surfaced value: negative means behind schedule.
pub fn delay_info(delay: Option<i64>) -> Option<DelayInfo> {
    let delay = delay?;
    let is_delayed = delay < 0;
    let days = delay.abs();
    Some(DelayInfo {
        is_delayed,
        delay_days: is_delayed.then_some(days),
        message: is_delayed.then(|| format!("Delayed by {} days from the planned schedule", days)),
    })
}

pub fn available_actions(status: ActivityStatus, has_drawings: bool) -> Vec<ActivityAction> {
    let drawings = ActivityAction {
        id: "drawing_details",
        label: "Drawing Details",
    };
    let mut actions = Vec::new();
    match status {
        ActivityStatus::NotStarted => {
            actions.push(ActivityAction {
                id: "start_activity",
                label: "Start Activity",
            });
            if has_drawings {
                actions.push(drawings);
            }
        }
        ActivityStatus::OnGoing | ActivityStatus::Completed => {
            actions.push(ActivityAction {
                id: "boq_log",
                label: "BOQ Log",
            });
            if has_drawings {
                actions.push(drawings);
            }
            actions.push(ActivityAction {
                id: "view_report",
                label: "View Report",
            });
        }
    }
    actions
}

pub fn activity_message(name: &str, status: ActivityStatus, delay: Option<&DelayInfo>) -> String {
    let delayed_days = delay
        .filter(|info| info.is_delayed)
        .map(|info| info.delay_days.unwrap_or(0));
    match (status, delayed_days) {
        (ActivityStatus::Completed, _) => format!("{} has been completed and marked as closed.", name),
        (ActivityStatus::OnGoing, Some(days)) => {
            format!("{} is currently in progress but is delayed by {} days.", name, days)
        }
        (ActivityStatus::OnGoing, None) => {
            format!("{} is currently in progress with consumption being tracked.", name)
        }
        (ActivityStatus::NotStarted, Some(days)) => format!(
            "{} has not started and is currently delayed by {} days from the planned schedule.",
            name, days
        ),
        (ActivityStatus::NotStarted, None) => format!("{} is ready to start.", name),
    }
}

fn status_dates(row: &ActivityDetailRow) -> ActivityDates {
    let mut dates = ActivityDates {
        planned_start_date: row.planned_start_date.clone(),
        planned_end_date: row.planned_end_date.clone(),
        projected_end_date: row.projected_end_date.clone(),
        ..ActivityDates::default()
    };
    match row.status {
        ActivityStatus::OnGoing => {
            dates.start_date = row.actual_start_date.clone();
            dates.end_date = row
                .projected_end_date
                .clone()
                .or_else(|| row.planned_end_date.clone());
        }
        ActivityStatus::Completed => {
            dates.completed_date = row.end_time.clone();
        }
        ActivityStatus::NotStarted => {}
    }
    dates
}

fn module_path(template: Option<&str>, module: Option<&str>) -> Vec<String> {
    let mut path = Vec::new();
    if let Some(template) = template.filter(|template| Some(*template) != module) {
        path.push(template.to_string());
    }
    if let Some(module) = module {
        path.push(module.to_string());
    }
    path
}

pub fn status_detail(row: &ActivityDetailRow) -> ActivityStatusDetailPayload {
    let delay = delay_info(row.delay);
    let message_text = activity_message(&row.name, row.status, delay.as_ref());
    let assigned_to = row.started_by.clone().or_else(|| row.quantity_manager.clone());
    ActivityStatusDetailPayload {
        activity: ActivityStatusDetail {
            activity_id: row.id.clone(),
            activity_code: row.code.clone(),
            activity_name: row.name.clone(),
            module_id: row.module_id.clone(),
            module_name: row.module_name.clone(),
            module_path: module_path(row.module_template_name.as_deref(), row.module_name.as_deref()),
            status: row.status,
            duration_days: row.planned_duration.filter(|days| *days > 0),
            started_by: row.started_by.clone(),
            quantity_manager: row.quantity_manager.clone(),
            assigned_to,
            dates: status_dates(row),
            delay_info: delay,
            has_drawings: row.has_drawings,
            available_actions: available_actions(row.status, row.has_drawings),
        },
        header_text: format!("Here's the current status for {}", row.name),
        message_text,
    }
}

pub fn carousel_item(row: &SelectionRow) -> CarouselItem {
    CarouselItem {
        id: row.id.clone(),
        wbs_number: row.code.clone(),
        description: row.name.clone(),
        module_path: module_path(row.template_name.as_deref(), row.module_name.as_deref()),
    }
}

/// Detail rows that matched a lookup, offered for selection.
pub fn detail_selection_item(row: &ActivityDetailRow) -> CarouselItem {
    CarouselItem {
        id: row.id.clone(),
        wbs_number: row.code.clone(),
        description: row.name.clone(),
        module_path: module_path(row.module_template_name.as_deref(), row.module_name.as_deref()),
    }
}

/// Header naming how far the search broadened.
pub fn carousel_header(tier: &SearchTier, filters: &ActivityFilters, original_code: Option<&str>) -> String {
    let original = original_code.unwrap_or_default();
    match tier {
        SearchTier::Ancestor(parent) => format!(
            "No exact match for WBS '{}'. Showing activities under parent WBS '{}'.",
            original, parent
        ),
        SearchTier::CategoryOnly => {
            let mut parts = Vec::new();
            if let Some(template) = filters.module_template_name.as_deref() {
                parts.push(format!("Module Template '{}'", template));
            }
            if let Some(module) = filters.module_name.as_deref() {
                parts.push(format!("Module '{}'", module));
            }
            if let Some(boq) = filters.boq_name.as_deref() {
                parts.push(format!("BOQ '{}'", boq));
            }
            format!(
                "No exact match for WBS '{}'. Showing activities from {}.",
                original,
                parts.join(", ")
            )
        }
        SearchTier::Exact | SearchTier::None => SELECTION_HEADER.to_string(),
    }
}

pub fn has_more(page: Page, returned: usize, total: i64) -> bool {
    page.offset + (returned as i64) < total
}

pub fn carousel_payload(
    rows: &[SelectionRow],
    tier: &SearchTier,
    header_text: String,
    total: i64,
    page: Page,
) -> ActivityCarouselPayload {
    ActivityCarouselPayload {
        activities: rows.iter().map(carousel_item).collect(),
        header_text,
        show_reasoning: false,
        tier: tier.label(),
        total_count: total,
        limit: page.limit,
        offset: page.offset,
        has_more: has_more(page, rows.len(), total),
        remaining_count: (total - page.offset - rows.len() as i64).max(0),
    }
}

/// Human-readable summary of the applied filters, e.g. `" matching status 'ON_GOING'"`.
pub fn describe_filters(filters: &ActivityFilters) -> String {
    let mut parts = Vec::new();
    if let Some(module) = filters.module_name.as_deref() {
        parts.push(format!("component '{}'", module));
    }
    if let Some(state) = filters.current_state {
        parts.push(format!("state '{}'", state.as_str()));
    }
    if let Some(status) = filters.status {
        parts.push(format!("status '{}'", status.as_str()));
    }
    if let Some(code) = filters.code.as_deref() {
        parts.push(format!("WBS code '{}' or below", code));
    }
    if let Some(name) = filters.activity_name.as_deref() {
        parts.push(format!("name containing '{}'", name));
    }
    if let Some(task) = filters.task_name.as_deref() {
        parts.push(format!("task '{}'", task));
    }
    if let Some(priority) = filters.priority {
        parts.push(format!("priority '{}'", priority.as_str()));
    }
    if let Some(manager) = filters.quantity_manager_name.as_deref() {
        parts.push(format!("manager '{}'", manager));
    }
    match filters.is_delayed {
        Some(true) => parts.push("delayed activities".to_string()),
        Some(false) => parts.push("on-schedule activities".to_string()),
        None => {}
    }
    if let Some(days) = filters.min_delay_days {
        parts.push(format!("delayed by at least {} days", days));
    }
    if let Some(section) = filters.section.as_deref() {
        parts.push(format!("section '{}'", section));
    }
    if filters.assigned_to_me {
        parts.push("assigned to me".to_string());
    }
    if filters.raised_by_me {
        parts.push("raised by me".to_string());
    }
    if let Some(drawing) = filters.drawing_status {
        parts.push(format!("drawing status '{}'", drawing.as_str()));
    }
    if let Some(task_type) = filters.task_type {
        parts.push(format!("type '{}'", task_type.as_str()));
    }
    if let Some(template) = filters.module_template_name.as_deref() {
        parts.push(format!("module template '{}'", template));
    }
    if let Some(boq) = filters.boq_name.as_deref() {
        parts.push(format!("BOQ '{}'", boq));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" matching {}", parts.join(", "))
    }
}

pub fn list_message(total: i64, filter_msg: &str, returned: usize, page: Page) -> String {
    let mut message = format!("Found {} activities{}.", total, filter_msg);
    if has_more(page, returned, total) {
        message.push_str(&format!(
            " Showing {} of {}. Use offset={} to see more.",
            returned,
            total,
            page.offset + page.limit
        ));
    }
    message
}

pub fn modules_message(modules: usize, filter_msg: &str) -> String {
    if filter_msg.is_empty() {
        format!("Found {} modules.", modules)
    } else {
        format!("Found {} modules with activities{}.", modules, filter_msg)
    }
}

pub fn distinct_resources(rows: &[ResourceAllocationRow]) -> usize {
    rows.iter()
        .filter_map(|row| row.resource_name.as_deref())
        .collect::<BTreeSet<_>>()
        .len()
}

pub fn resources_message(distinct: usize, rows: usize) -> String {
    format!(
        "Found {} resource(s) with {} vendor allocation(s).",
        distinct, rows
    )
}
