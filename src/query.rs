use crate::access::AccessProfile;
use crate::db::{DataStore, Row};
use crate::errors::AppResult;
use crate::fallback::TierSource;
use crate::filters::{PredicateSet, USER_PARAM};
use crate::models::{
    ActivityDetailRow, ActivityFilters, ActivityStatus, ActivitySummary, ModuleAggregate,
    ResourceAllocationRow, SelectionRow, UserRef,
};
use crate::policy::Page;
use crate::shaping::derive_status;
use async_trait::async_trait;

const MODULE_DRAWINGS_CTE: &str = "WITH module_drawings AS (
    SELECT d.module_id AS module_id,
        CASE
            WHEN SUM(CASE WHEN d.status = 'UPLOADED' THEN 1 ELSE 0 END) > 0 THEN 'UPLOADED'
            WHEN SUM(CASE WHEN d.status = 'REVISION_IN_PROGRESS' THEN 1 ELSE 0 END) > 0 THEN 'REVISION_IN_PROGRESS'
            ELSE 'NOT_UPLOADED'
        END AS drawing_status,
        COUNT(d.id) AS drawing_count
    FROM drawings d
    WHERE d.deleted = 0
    GROUP BY d.module_id
)";

const ACTIVITY_FROM: &str = "FROM activities a
LEFT JOIN modules m ON m.id = a.module_id AND m.deleted = 0
LEFT JOIN module_templates mt ON mt.id = m.template_id AND mt.deleted = 0
LEFT JOIN users qm ON qm.id = m.quantity_manager_id
LEFT JOIN module_drawings md ON md.module_id = a.module_id";

/// Lists, carousels and resources only show released work (or paused work already
/// under way) in an actionable state.
const ACTIVITY_SCOPE: &str = "WHERE a.project_id = ?2
    AND a.deleted = 0
    AND a.task_type IN ('ACTIVITY', 'CHECKPOINT', 'SUB-CHECKPOINT')
    AND a.code IS NOT NULL
    AND a.current_state IN ('ready_to_work', 'next_in_line', 'completed')
    AND (a.work_state = 'RELEASED' OR (a.work_state = 'PAUSED' AND a.status = 'ON_GOING'))";

/// Status lookups reach any live activity, whatever its work state.
const LOOKUP_SCOPE: &str = "WHERE a.project_id = ?2
    AND a.deleted = 0
    AND a.task_type IN ('ACTIVITY', 'CHECKPOINT', 'SUB-CHECKPOINT')
    AND a.code IS NOT NULL";

const SUMMARY_COLUMNS: &str = "a.id AS id, a.code AS code, a.name AS name, a.status AS status,
    a.current_state AS current_state, a.work_state AS work_state, a.priority AS priority,
    a.task_type AS task_type, a.task_name AS task_name, a.section AS section, a.delay AS delay,
    a.start_time AS actual_start_date, a.end_time AS end_time, a.projected_end AS projected_end_date,
    a.module_id AS module_id, m.name AS module_name, mt.name AS module_template_name,
    md.drawing_status AS drawing_status,
    NULLIF(TRIM(COALESCE(qm.first_name, '') || ' ' || COALESCE(qm.last_name, '')), '') AS quantity_manager_name,
    a.modified_by AS modified_by, a.modified_on AS modified_on";

const DETAIL_COLUMNS: &str = "a.id AS id, a.name AS name, a.code AS code, a.status AS status,
    a.current_state AS current_state, a.priority AS priority, a.planned_duration AS planned_duration,
    bt.start_date AS planned_start_date,
    COALESCE(bt.end_date, CASE
        WHEN a.planned_duration IS NOT NULL AND a.start_time IS NOT NULL
            THEN date(a.start_time, '+' || a.planned_duration || ' days')
    END) AS planned_end_date,
    a.projected_end AS projected_end_date, a.start_time AS actual_start_date, a.end_time AS end_time,
    a.delay AS delay, a.module_id AS module_id, m.name AS module_name, mt.name AS module_template_name,
    mb.id AS started_by_id,
    NULLIF(TRIM(COALESCE(mb.first_name, '') || ' ' || COALESCE(mb.last_name, '')), '') AS started_by_name,
    mb.email AS started_by_email,
    qm.id AS qm_id,
    NULLIF(TRIM(COALESCE(qm.first_name, '') || ' ' || COALESCE(qm.last_name, '')), '') AS qm_name,
    qm.email AS qm_email,
    COALESCE(md.drawing_count, 0) > 0 AS has_drawings";

const DETAIL_JOINS: &str = "LEFT JOIN users mb ON mb.id = a.modified_by
LEFT JOIN baselines bl ON bl.id = (
    SELECT b.id FROM baselines b WHERE b.project_id = a.project_id AND b.active = 1 LIMIT 1
)
LEFT JOIN baseline_tasks bt ON bt.baseline_id = bl.id AND bt.activity_id = a.id";

const SELECTION_COLUMNS: &str = "a.id AS id, a.name AS name, a.code AS code, a.status AS status,
    a.current_state AS current_state, a.work_state AS work_state,
    m.name AS module_name, mt.name AS template_name";

const RESOURCE_COLUMNS: &str = "a.id AS activity_id, a.name AS activity_name, a.code AS code,
    r.name AS resource_name, r.type AS resource_type, r.unit AS unit,
    SUM(COALESCE(ra.estimate, 0)) AS estimated_quantity,
    c.name AS contractor_name, b.name AS boq_item_name,
    COUNT(ra.id) AS allocation_count";

const RESOURCE_JOINS: &str = "JOIN resource_allocations ra ON ra.activity_id = a.id AND ra.deleted = 0
LEFT JOIN resources r ON r.id = ra.resource_id
LEFT JOIN contractors c ON c.id = ra.contractor_id
LEFT JOIN boq_items b ON b.id = ra.boq_item_id";

#[derive(Debug, Clone, PartialEq)]
pub struct ActivityPage {
    pub activities: Vec<ActivitySummary>,
    pub total: i64,
}

/// Composes and runs every activity statement. Visibility and caller filters come from
/// one [`PredicateSet`], so all modes agree on what the user may see.
pub struct QueryOrchestrator<'a> {
    store: &'a dyn DataStore,
    profile: &'a AccessProfile,
}

impl<'a> QueryOrchestrator<'a> {
    pub fn new(store: &'a dyn DataStore, profile: &'a AccessProfile) -> Self {
        Self { store, profile }
    }

    pub fn predicates(&self, filters: &ActivityFilters) -> PredicateSet {
        let mut set = PredicateSet::new(&self.profile.user_id, &self.profile.project_id);
        push_visibility(&mut set, self.profile);
        set.apply_filters(filters);
        set
    }

    pub async fn list(&self, filters: &ActivityFilters, page: Page) -> AppResult<ActivityPage> {
        let total = self.count_matching(filters).await?;
        let mut set = self.predicates(filters);
        let limit = set.bind(page.limit);
        let offset = set.bind(page.offset);
        let sql = format!(
            "{}\nSELECT {}\n{}\n{}{}\nORDER BY a.modified_on DESC, a.id\nLIMIT {} OFFSET {}",
            MODULE_DRAWINGS_CTE,
            SUMMARY_COLUMNS,
            ACTIVITY_FROM,
            ACTIVITY_SCOPE,
            set.and_sql(),
            limit,
            offset
        );
        tracing::debug!(sql = %sql, params = set.params().len(), "list activities");
        let rows = self.store.fetch_all(&sql, set.params()).await?;
        let activities = rows.iter().map(parse_summary_row).collect::<AppResult<Vec<_>>>()?;
        Ok(ActivityPage { activities, total })
    }

    pub async fn count_matching(&self, filters: &ActivityFilters) -> AppResult<i64> {
        self.count_in(ACTIVITY_SCOPE, filters).await
    }

    /// Counts what [`Self::detail`] can reach.
    pub async fn count_lookup(&self, filters: &ActivityFilters) -> AppResult<i64> {
        self.count_in(LOOKUP_SCOPE, filters).await
    }

    async fn count_in(&self, scope: &str, filters: &ActivityFilters) -> AppResult<i64> {
        let set = self.predicates(filters);
        let sql = format!(
            "{}\nSELECT COUNT(DISTINCT a.id) AS total\n{}\n{}{}",
            MODULE_DRAWINGS_CTE,
            ACTIVITY_FROM,
            scope,
            set.and_sql()
        );
        let row = self.store.fetch_one(&sql, set.params()).await?;
        Ok(match row {
            Some(row) => row.opt_int("total")?.unwrap_or(0),
            None => 0,
        })
    }

    pub async fn grouped(&self, filters: &ActivityFilters) -> AppResult<Vec<ModuleAggregate>> {
        let set = self.predicates(filters);
        let sql = format!(
            "{}\nSELECT m.id AS module_id, m.name AS module_name, COUNT(DISTINCT a.id) AS activity_count\n{}\n{}{}\n\
             AND m.id IS NOT NULL\nGROUP BY m.id, m.name\nORDER BY m.name",
            MODULE_DRAWINGS_CTE,
            ACTIVITY_FROM,
            ACTIVITY_SCOPE,
            set.and_sql()
        );
        tracing::debug!(sql = %sql, "group activities by module");
        let rows = self.store.fetch_all(&sql, set.params()).await?;
        rows.iter().map(parse_module_row).collect()
    }

    /// Status rows for the detail view. An id lookup reads at most one row.
    pub async fn detail(&self, filters: &ActivityFilters, max_rows: i64) -> AppResult<Vec<ActivityDetailRow>> {
        let mut set = self.predicates(filters);
        let max_rows = if filters.activity_id.is_some() { 1 } else { max_rows.max(1) };
        let limit = set.bind(max_rows);
        let sql = format!(
            "{}\nSELECT {}\n{}\n{}\n{}{}\nORDER BY a.code, a.id\nLIMIT {}",
            MODULE_DRAWINGS_CTE,
            DETAIL_COLUMNS,
            ACTIVITY_FROM,
            DETAIL_JOINS,
            LOOKUP_SCOPE,
            set.and_sql(),
            limit
        );
        tracing::debug!(sql = %sql, "activity status lookup");
        let rows = self.store.fetch_all(&sql, set.params()).await?;
        rows.iter().map(parse_detail_row).collect()
    }

    pub async fn selection(&self, filters: &ActivityFilters, page: Page) -> AppResult<Vec<SelectionRow>> {
        let mut set = self.predicates(filters);
        let limit = set.bind(page.limit);
        let offset = set.bind(page.offset);
        let sql = format!(
            "{}\nSELECT {}\n{}\n{}{}\nORDER BY a.code, a.id\nLIMIT {} OFFSET {}",
            MODULE_DRAWINGS_CTE,
            SELECTION_COLUMNS,
            ACTIVITY_FROM,
            ACTIVITY_SCOPE,
            set.and_sql(),
            limit,
            offset
        );
        let rows = self.store.fetch_all(&sql, set.params()).await?;
        rows.iter().map(parse_selection_row).collect()
    }

    pub async fn resources(&self, filters: &ActivityFilters) -> AppResult<Vec<ResourceAllocationRow>> {
        let set = self.predicates(filters);
        let sql = format!(
            "{}\nSELECT {}\n{}\n{}\n{}{}\n\
             GROUP BY a.id, a.name, a.code, r.name, r.type, r.unit, c.name, b.name\n\
             ORDER BY a.code, r.name, c.name",
            MODULE_DRAWINGS_CTE,
            RESOURCE_COLUMNS,
            ACTIVITY_FROM,
            RESOURCE_JOINS,
            ACTIVITY_SCOPE,
            set.and_sql()
        );
        tracing::debug!(sql = %sql, "activity resources");
        let rows = self.store.fetch_all(&sql, set.params()).await?;
        rows.iter().map(parse_resource_row).collect()
    }
}

#[async_trait]
impl<'a> TierSource for QueryOrchestrator<'a> {
    type Row = SelectionRow;

    async fn count(&self, filters: &ActivityFilters) -> AppResult<i64> {
        self.count_matching(filters).await
    }

    async fn fetch(&self, filters: &ActivityFilters, page: Page) -> AppResult<Vec<SelectionRow>> {
        self.selection(filters, page).await
    }
}

/// Restricts rows to what a role-scoped user may see: a shared role, a request they
/// raised, or a workflow assignment to them or their lead role.
fn push_visibility(set: &mut PredicateSet, profile: &AccessProfile) {
    if profile.skips_role_filters() {
        return;
    }
    let mut branches = Vec::new();
    if !profile.role_ids.is_empty() {
        let placeholders: Vec<String> = profile
            .role_ids
            .iter()
            .map(|role_id| set.bind(role_id.as_str()))
            .collect();
        branches.push(format!(
            "EXISTS (SELECT 1 FROM activity_roles vis_ar WHERE vis_ar.activity_id = a.id \
             AND vis_ar.role_id IN ({}))",
            placeholders.join(", ")
        ));
    }
    branches.push(format!(
        "EXISTS (SELECT 1 FROM requests vis_r WHERE vis_r.activity_id = a.id \
         AND vis_r.deleted = 0 AND vis_r.raised_by = {})",
        USER_PARAM
    ));
    let assignees = match profile.lead_role_id() {
        Some(lead_role_id) => {
            let lead = set.bind(lead_role_id);
            format!("vis_wa.assigned_to IN ({}, {})", USER_PARAM, lead)
        }
        None => format!("vis_wa.assigned_to = {}", USER_PARAM),
    };
    branches.push(format!(
        "EXISTS (SELECT 1 FROM requests vis_wr \
         JOIN workflow_assignments vis_wa ON vis_wa.workflow_id = vis_wr.workflow_id \
         WHERE vis_wr.activity_id = a.id AND vis_wr.deleted = 0 AND {})",
        assignees
    ));
    set.push(format!("({})", branches.join(" OR ")));
}

/// Stored delay counts days behind schedule; callers see it negated.
fn surfaced_delay(row: &Row) -> AppResult<Option<i64>> {
    Ok(row.opt_int("delay")?.map(|delay| -delay))
}

fn parse_summary_row(row: &Row) -> AppResult<ActivitySummary> {
    let status = ActivityStatus::from_db(row.opt_text("status")?.as_deref());
    let current_state = row.opt_text("current_state")?;
    let work_state = row.opt_text("work_state")?;
    Ok(ActivitySummary {
        id: row.text("id")?,
        code: row.text("code")?,
        name: row.text("name")?,
        derived_status: derive_status(status, current_state.as_deref(), work_state.as_deref()),
        status,
        current_state,
        work_state,
        priority: row.opt_text("priority")?,
        task_type: row.opt_text("task_type")?,
        task_name: row.opt_text("task_name")?,
        section: row.opt_text("section")?,
        delay: surfaced_delay(row)?,
        actual_start_date: row.opt_text("actual_start_date")?,
        end_time: row.opt_text("end_time")?,
        projected_end_date: row.opt_text("projected_end_date")?,
        module_id: row.opt_text("module_id")?,
        module_name: row.opt_text("module_name")?,
        module_template_name: row.opt_text("module_template_name")?,
        drawing_status: row.opt_text("drawing_status")?,
        quantity_manager_name: row.opt_text("quantity_manager_name")?,
        modified_by: row.opt_text("modified_by")?,
        modified_on: row.opt_text("modified_on")?,
    })
}

fn parse_module_row(row: &Row) -> AppResult<ModuleAggregate> {
    Ok(ModuleAggregate {
        module_id: row.text("module_id")?,
        module_name: row.text("module_name")?,
        activity_count: row.int("activity_count")?,
    })
}

fn parse_user(row: &Row, prefix: &str) -> AppResult<Option<UserRef>> {
    let Some(id) = row.opt_text(&format!("{}_id", prefix))? else {
        return Ok(None);
    };
    Ok(Some(UserRef {
        id,
        name: row
            .opt_text(&format!("{}_name", prefix))?
            .unwrap_or_else(|| "Unknown".to_string()),
        email: row.opt_text(&format!("{}_email", prefix))?,
    }))
}

fn parse_detail_row(row: &Row) -> AppResult<ActivityDetailRow> {
    Ok(ActivityDetailRow {
        id: row.text("id")?,
        name: row.text("name")?,
        code: row.text("code")?,
        status: ActivityStatus::from_db(row.opt_text("status")?.as_deref()),
        current_state: row.opt_text("current_state")?,
        priority: row.opt_text("priority")?,
        planned_duration: row.opt_int("planned_duration")?,
        planned_start_date: row.opt_text("planned_start_date")?,
        planned_end_date: row.opt_text("planned_end_date")?,
        projected_end_date: row.opt_text("projected_end_date")?,
        actual_start_date: row.opt_text("actual_start_date")?,
        end_time: row.opt_text("end_time")?,
        delay: surfaced_delay(row)?,
        module_id: row.opt_text("module_id")?,
        module_name: row.opt_text("module_name")?,
        module_template_name: row.opt_text("module_template_name")?,
        started_by: parse_user(row, "started_by")?,
        quantity_manager: parse_user(row, "qm")?,
        has_drawings: row.flag("has_drawings")?,
    })
}

fn parse_selection_row(row: &Row) -> AppResult<SelectionRow> {
    Ok(SelectionRow {
        id: row.text("id")?,
        name: row.text("name")?,
        code: row.text("code")?,
        status: ActivityStatus::from_db(row.opt_text("status")?.as_deref()),
        current_state: row.opt_text("current_state")?,
        work_state: row.opt_text("work_state")?,
        module_name: row.opt_text("module_name")?,
        template_name: row.opt_text("template_name")?,
    })
}

fn parse_resource_row(row: &Row) -> AppResult<ResourceAllocationRow> {
    Ok(ResourceAllocationRow {
        activity_id: row.text("activity_id")?,
        activity_name: row.text("activity_name")?,
        code: row.opt_text("code")?,
        resource_name: row.opt_text("resource_name")?,
        resource_type: row.opt_text("resource_type")?,
        unit: row.opt_text("unit")?,
        estimated_quantity: row.opt_real("estimated_quantity")?.unwrap_or(0.0),
        contractor_name: row.opt_text("contractor_name")?,
        boq_item_name: row.opt_text("boq_item_name")?,
        allocation_count: row.opt_int("allocation_count")?.unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::{parse_detail_row, push_visibility};
    use crate::access::{AccessProfile, LeadRole};
    use crate::db::{Row, SqlValue};
    use crate::filters::PredicateSet;
    use crate::models::ActivityStatus;

    fn profile(broad: bool) -> AccessProfile {
        AccessProfile {
            user_id: "u-1".to_string(),
            project_id: "p-1".to_string(),
            organization_id: "org-1".to_string(),
            has_broad_access: broad,
            is_project_admin: false,
            lead_role: Some(LeadRole {
                role_id: "r-lead".to_string(),
                code_name: "RFI_LEAD_APPROVER".to_string(),
            }),
            role_ids: vec!["r-1".to_string(), "r-lead".to_string()],
        }
    }

    #[test]
    fn broad_access_adds_no_visibility_clause() {
        let mut set = PredicateSet::new("u-1", "p-1");
        push_visibility(&mut set, &profile(true));
        assert!(set.clauses().is_empty());
    }

    #[test]
    fn scoped_visibility_binds_roles_and_lead() {
        let mut set = PredicateSet::new("u-1", "p-1");
        push_visibility(&mut set, &profile(false));
        let clause = &set.clauses()[0];
        assert!(clause.contains("vis_ar.role_id IN (?3, ?4)"));
        assert!(clause.contains("vis_r.raised_by = ?1"));
        assert!(clause.contains("vis_wa.assigned_to IN (?1, ?5)"));
        assert_eq!(set.params()[4], SqlValue::from("r-lead"));
    }

    #[test]
    fn detail_rows_negate_stored_delay() {
        let row = Row::new()
            .with("id", "a-1")
            .with("name", "Slab casting")
            .with("code", "2.1.5")
            .with("status", "ON_GOING")
            .with("current_state", "ready_to_work")
            .with("priority", SqlValue::Null)
            .with("planned_duration", 4_i64)
            .with("planned_start_date", "2026-01-01")
            .with("planned_end_date", "2026-01-05")
            .with("projected_end_date", SqlValue::Null)
            .with("actual_start_date", "2026-01-02")
            .with("end_time", SqlValue::Null)
            .with("delay", 3_i64)
            .with("module_id", "m-1")
            .with("module_name", "Tower A")
            .with("module_template_name", "Tower")
            .with("started_by_id", SqlValue::Null)
            .with("started_by_name", SqlValue::Null)
            .with("started_by_email", SqlValue::Null)
            .with("qm_id", "u-9")
            .with("qm_name", SqlValue::Null)
            .with("qm_email", "qm@example.com")
            .with("has_drawings", 0_i64);
        let detail = parse_detail_row(&row).expect("detail");
        assert_eq!(detail.delay, Some(-3));
        assert_eq!(detail.status, ActivityStatus::OnGoing);
        assert!(detail.started_by.is_none());
        let qm = detail.quantity_manager.expect("qm");
        assert_eq!(qm.name, "Unknown");
    }
}
