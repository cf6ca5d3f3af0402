#![allow(dead_code)]

use activity_engine::db::SqlValue;
use activity_engine::{ActivityEngine, DataStore, EngineConfig, SqliteStore, ToolContext};
use std::sync::Arc;
use tempfile::TempDir;

pub const PROJECT: &str = "p-1";
pub const ADMIN: &str = "u-admin";
pub const BROAD: &str = "u-broad";
pub const CREW: &str = "u-crew";
pub const RAISER: &str = "u-raiser";
pub const WORKFLOW_USER: &str = "u-wf";
pub const LEAD: &str = "u-lead";
pub const NOBODY: &str = "u-none";
pub const QUANTITY_MANAGER: &str = "u-qm";

pub const BULK_ACTIVITIES: usize = 60;

pub struct Fixture {
    pub store: Arc<SqliteStore>,
    pub engine: ActivityEngine,
    _dir: TempDir,
}

impl Fixture {
    pub fn context(&self, user_id: &str) -> ToolContext {
        ToolContext::for_identity(user_id, PROJECT)
    }

    pub async fn count(&self, sql: &str) -> i64 {
        self.store
            .fetch_one(sql, &[])
            .await
            .expect("count query")
            .expect("count row")
            .int("total")
            .expect("total column")
    }
}

pub struct ActivitySeed {
    pub id: String,
    pub code: String,
    pub name: String,
    pub module_id: &'static str,
    pub status: &'static str,
    pub current_state: &'static str,
    pub work_state: &'static str,
    pub delay: Option<i64>,
    pub modified_by: Option<&'static str>,
    pub modified_on: String,
}

impl ActivitySeed {
    pub fn new(id: &str, code: &str, name: &str, module_id: &'static str) -> Self {
        Self {
            id: id.to_string(),
            code: code.to_string(),
            name: name.to_string(),
            module_id,
            status: "NOT_STARTED",
            current_state: "ready_to_work",
            work_state: "RELEASED",
            delay: None,
            modified_by: None,
            modified_on: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    pub fn status(mut self, status: &'static str) -> Self {
        self.status = status;
        self
    }

    pub fn work_state(mut self, work_state: &'static str) -> Self {
        self.work_state = work_state;
        self
    }

    pub fn delay(mut self, delay: i64) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn modified(mut self, by: &'static str, on: &str) -> Self {
        self.modified_by = Some(by);
        self.modified_on = on.to_string();
        self
    }
}

async fn exec(store: &SqliteStore, sql: &str, params: &[SqlValue]) {
    store.execute(sql, params).await.expect(sql);
}

pub async fn insert_activity(store: &SqliteStore, seed: ActivitySeed) {
    exec(
        store,
        "INSERT INTO activities (id, project_id, module_id, code, name, status, current_state, work_state, \
         delay, planned_duration, start_time, modified_by, modified_on, created_on) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 5, '2026-01-02', ?10, ?11, '2025-12-01')",
        &[
            seed.id.into(),
            PROJECT.into(),
            seed.module_id.into(),
            seed.code.into(),
            seed.name.into(),
            seed.status.into(),
            seed.current_state.into(),
            seed.work_state.into(),
            seed.delay.into(),
            seed.modified_by.into(),
            seed.modified_on.into(),
        ],
    )
    .await;
}

/// One organization, one project and a small set of users covering every way an
/// activity can become visible:
///
/// | activity | code         | visible to                     |
/// |----------|--------------|--------------------------------|
/// | a-1      | 2.1.5.1      | crew role                      |
/// | a-2      | 2.1.5.1.2    | broad/admin only               |
/// | a-4      | 3.1.1        | crew role                      |
/// | a-5      | 3.1.10       | broad/admin only               |
/// | a-6      | 3.1.1.2      | broad/admin only               |
/// | a-7      | 4.1          | status lookup by broad/admin   |
/// | a-8      | 4.2          | raiser (request)               |
/// | a-9      | 4.3          | lead role (workflow)           |
/// | a-10     | 4.4          | workflow user                  |
/// | bulk-N   | 9.1.N        | broad/admin only               |
pub async fn seed(store: &SqliteStore) {
    exec(store, "INSERT INTO organizations (id, name) VALUES ('org-1', 'Acme Build')", &[]).await;
    exec(
        store,
        "INSERT INTO projects (id, organization_id, name, admin_id) VALUES (?1, 'org-1', 'Plant 2', ?2)",
        &[PROJECT.into(), ADMIN.into()],
    )
    .await;

    for (id, first, last) in [
        (ADMIN, "Ada", "Admin"),
        (BROAD, "Bea", "Broad"),
        (CREW, "Cam", "Crew"),
        (RAISER, "Ray", "Raiser"),
        (WORKFLOW_USER, "Wes", "Flow"),
        (LEAD, "Lea", "Lead"),
        (NOBODY, "Ned", "None"),
        (QUANTITY_MANAGER, "Ravi", "Kumar"),
    ] {
        exec(
            store,
            "INSERT INTO users (id, first_name, last_name, email) VALUES (?1, ?2, ?3, ?4)",
            &[id.into(), first.into(), last.into(), format!("{}@example.com", id).into()],
        )
        .await;
    }

    for (permission_id, code) in [
        ("perm-full", "FULL_ACCESS"),
        ("perm-progress", "ACTIVITIES_PROGRESS_UPDATE"),
        ("perm-lead", "RFI_LEAD_APPROVER"),
    ] {
        exec(
            store,
            "INSERT INTO permissions (id, code_name) VALUES (?1, ?2)",
            &[permission_id.into(), code.into()],
        )
        .await;
    }

    for (role_id, name, permission_id, user_id) in [
        ("r-broad", "Planner", "perm-full", BROAD),
        ("r-crew", "Site crew", "perm-progress", CREW),
        ("r-lead", "RFI lead", "perm-lead", LEAD),
    ] {
        exec(
            store,
            "INSERT INTO roles (id, organization_id, name) VALUES (?1, 'org-1', ?2)",
            &[role_id.into(), name.into()],
        )
        .await;
        exec(
            store,
            "INSERT INTO role_permissions (role_id, permission_id) VALUES (?1, ?2)",
            &[role_id.into(), permission_id.into()],
        )
        .await;
        exec(
            store,
            "INSERT INTO user_organization_roles (id, user_id, organization_id, role_id) VALUES (?1, ?2, 'org-1', ?3)",
            &[format!("uor-{}", role_id).into(), user_id.into(), role_id.into()],
        )
        .await;
    }

    exec(store, "INSERT INTO module_templates (id, name) VALUES ('tpl-1', 'Tower')", &[]).await;
    exec(
        store,
        "INSERT INTO modules (id, project_id, name, template_id, quantity_manager_id) \
         VALUES ('m-a', ?1, 'Tower A', 'tpl-1', ?2), ('m-b', ?1, 'Tower B', 'tpl-1', NULL), \
                ('m-bulk', ?1, 'Podium', NULL, NULL)",
        &[PROJECT.into(), QUANTITY_MANAGER.into()],
    )
    .await;
    exec(
        store,
        "INSERT INTO drawings (id, module_id, name, status) VALUES \
         ('d-1', 'm-a', 'GA plan', 'NOT_UPLOADED'), ('d-2', 'm-a', 'Rebar schedule', 'UPLOADED')",
        &[],
    )
    .await;

    let seeds = [
        ActivitySeed::new("a-1", "2.1.5.1", "Slab casting", "m-a")
            .status("ON_GOING")
            .delay(3)
            .modified(CREW, "2026-02-10T08:00:00Z"),
        ActivitySeed::new("a-2", "2.1.5.1.2", "Slab curing", "m-a").modified(BROAD, "2026-02-09T08:00:00Z"),
        ActivitySeed::new("a-4", "3.1.1", "Column rebar", "m-b").modified(BROAD, "2026-02-08T08:00:00Z"),
        ActivitySeed::new("a-5", "3.1.10", "Column shuttering", "m-b").modified(BROAD, "2026-02-07T08:00:00Z"),
        ActivitySeed::new("a-6", "3.1.1.2", "Column pour", "m-b")
            .status("COMPLETED")
            .modified(BROAD, "2026-02-06T08:00:00Z"),
        ActivitySeed::new("a-7", "4.1", "Paused excavation", "m-b").work_state("PAUSED"),
        ActivitySeed::new("a-8", "4.2", "Waterproofing", "m-b"),
        ActivitySeed::new("a-9", "4.3", "Facade anchors", "m-b"),
        ActivitySeed::new("a-10", "4.4", "Lift pit", "m-b"),
    ];
    for seed in seeds {
        insert_activity(store, seed).await;
    }
    for index in 0..BULK_ACTIVITIES {
        insert_activity(
            store,
            ActivitySeed::new(
                &format!("bulk-{:02}", index),
                &format!("9.1.{}", index),
                &format!("Podium bay {}", index),
                "m-bulk",
            ),
        )
        .await;
    }

    exec(
        store,
        "INSERT INTO activity_roles (activity_id, role_id) VALUES ('a-1', 'r-crew'), ('a-4', 'r-crew')",
        &[],
    )
    .await;
    exec(
        store,
        "INSERT INTO requests (id, project_id, activity_id, raised_by, workflow_id, created_on) VALUES \
         ('req-1', ?1, 'a-8', ?2, NULL, '2026-01-10'), \
         ('req-2', ?1, 'a-9', ?3, 'wf-lead', '2026-01-11'), \
         ('req-3', ?1, 'a-10', ?3, 'wf-user', '2026-01-12')",
        &[PROJECT.into(), RAISER.into(), ADMIN.into()],
    )
    .await;
    exec(
        store,
        "INSERT INTO workflow_assignments (id, workflow_id, assigned_to) VALUES \
         ('wa-1', 'wf-lead', 'r-lead'), ('wa-2', 'wf-user', ?1)",
        &[WORKFLOW_USER.into()],
    )
    .await;

    exec(
        store,
        "INSERT INTO boq_items (id, project_id, name) VALUES ('boq-1', ?1, 'Concrete M25')",
        &[PROJECT.into()],
    )
    .await;
    exec(
        store,
        "INSERT INTO resources (id, name, type, unit) VALUES ('res-1', 'Cement', 'MATERIAL', 'bag')",
        &[],
    )
    .await;
    exec(store, "INSERT INTO contractors (id, name) VALUES ('c-1', 'Sharma Builders')", &[]).await;
    exec(
        store,
        "INSERT INTO resource_allocations (id, activity_id, boq_item_id, resource_id, contractor_id, estimate) VALUES \
         ('ra-1', 'a-1', 'boq-1', 'res-1', 'c-1', 40.0), \
         ('ra-2', 'a-1', 'boq-1', 'res-1', 'c-1', 10.0), \
         ('ra-3', 'a-5', 'boq-1', 'res-1', 'c-1', 5.0)",
        &[],
    )
    .await;
    exec(
        store,
        "INSERT INTO baselines (id, project_id, active) VALUES ('bl-1', ?1, 1)",
        &[PROJECT.into()],
    )
    .await;
    exec(
        store,
        "INSERT INTO baseline_tasks (baseline_id, activity_id, start_date, end_date) \
         VALUES ('bl-1', 'a-1', '2026-01-01', '2026-01-20')",
        &[],
    )
    .await;
}

pub async fn fixture() -> Fixture {
    fixture_with(EngineConfig::default()).await
}

pub async fn fixture_with(config: EngineConfig) -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(SqliteStore::open(&dir.path().join("activities.sqlite")).expect("store"));
    seed(&store).await;
    let engine = ActivityEngine::new(store.clone(), config);
    Fixture {
        store,
        engine,
        _dir: dir,
    }
}
