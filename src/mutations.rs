use crate::confirmation::Mutation;
use crate::context::Identity;
use crate::db::{DataStore, SqlValue, Statement};
use crate::errors::{AppError, AppResult};
use crate::models::{AssignActivityArgs, LogConsumptionArgs};
use crate::policy::InputPolicy;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

const ACTIVITY_EXISTS_SQL: &str =
    "SELECT a.id AS id FROM activities a WHERE a.id = ?1 AND a.project_id = ?2 AND a.deleted = 0";

const INSERT_CONSUMPTION_SQL: &str = "INSERT INTO consumption_entries (
    id, activity_id, project_id, boq_item_resource_id, template_task_id, template_id,
    module_id, consumption, consumption_percent, date, created_by, created_on
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)";

const TOUCH_ACTIVITY_SQL: &str = "UPDATE activities SET modified_by = ?1, modified_on = ?2
    WHERE id = ?3 AND project_id = ?4 AND deleted = 0";

const ADD_ASSIGNEE_SQL: &str =
    "INSERT OR IGNORE INTO activity_assignees (activity_id, user_id) VALUES (?1, ?2)";

const INSERT_COMMENT_SQL: &str =
    "INSERT INTO activity_comments (id, activity_id, user_id, text, created_on) VALUES (?1, ?2, ?3, ?4, ?5)";

fn not_found(activity_id: &str) -> AppError {
    AppError::NotFound(format!("Activity '{}' not found or access denied.", activity_id))
}

fn require(name: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidInput(format!("{} is required", name)));
    }
    Ok(())
}

#[async_trait]
impl Mutation for LogConsumptionArgs {
    const TOOL_NAME: &'static str = "log_activity_consumption";
    const HINT: &'static str = "Please confirm the consumption entries to log";

    /// Number of entries written.
    type Output = u64;

    fn validate(&self, policy: &InputPolicy) -> AppResult<()> {
        require("activity_id", &self.activity_id)?;
        policy.consumption_entries(&self.entries)
    }

    fn summary(&self) -> Map<String, Value> {
        let mut summary = Map::new();
        summary.insert("entryCount".to_string(), Value::from(self.entries.len()));
        summary
    }

    async fn apply(&self, store: &dyn DataStore, identity: &Identity) -> AppResult<u64> {
        let exists = store
            .fetch_one(
                ACTIVITY_EXISTS_SQL,
                &[self.activity_id.as_str().into(), identity.project_id.as_str().into()],
            )
            .await?;
        if exists.is_none() {
            return Err(not_found(&self.activity_id));
        }

        let now = Utc::now();
        let today = now.date_naive().to_string();
        let statements = self
            .entries
            .iter()
            .map(|entry| {
                Statement::new(
                    INSERT_CONSUMPTION_SQL,
                    vec![
                        SqlValue::from(Uuid::new_v4().to_string()),
                        SqlValue::from(&self.activity_id),
                        SqlValue::from(&identity.project_id),
                        SqlValue::from(entry.boq_item_resource_id.clone()),
                        SqlValue::from(entry.template_task_id.clone()),
                        SqlValue::from(entry.template_id.clone()),
                        SqlValue::from(entry.module_id.clone()),
                        SqlValue::from(entry.consumption),
                        SqlValue::from(entry.consumption_percent),
                        SqlValue::from(entry.date.clone().unwrap_or_else(|| today.clone())),
                        SqlValue::from(&identity.user_id),
                        SqlValue::from(now.to_rfc3339()),
                    ],
                )
                .required()
            })
            .collect();
        let logged: u64 = store
            .execute_in_transaction(statements)
            .await?
            .ok_or_else(|| AppError::Internal("consumption entry was not written".to_string()))?
            .iter()
            .sum();
        tracing::info!(
            activity_id = %self.activity_id,
            user_id = %identity.user_id,
            logged,
            "logged consumption entries"
        );
        Ok(logged)
    }
}

#[async_trait]
impl Mutation for AssignActivityArgs {
    const TOOL_NAME: &'static str = "assign_activity";
    const HINT: &'static str = "Please confirm the activity assignment";

    /// Rows touched on the activity record.
    type Output = u64;

    fn validate(&self, policy: &InputPolicy) -> AppResult<()> {
        require("activity_id", &self.activity_id)?;
        require("new_assignee_id", &self.new_assignee_id)?;
        policy.string_param("comment", self.comment.as_deref())?;
        Ok(())
    }

    async fn apply(&self, store: &dyn DataStore, identity: &Identity) -> AppResult<u64> {
        let now = Utc::now().to_rfc3339();
        let mut statements = vec![
            Statement::new(
                TOUCH_ACTIVITY_SQL,
                vec![
                    identity.user_id.as_str().into(),
                    now.as_str().into(),
                    self.activity_id.as_str().into(),
                    identity.project_id.as_str().into(),
                ],
            )
            .required(),
            Statement::new(
                ADD_ASSIGNEE_SQL,
                vec![self.activity_id.as_str().into(), self.new_assignee_id.as_str().into()],
            ),
        ];
        if let Some(comment) = self.comment.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            let text = format!("Assigned to {}: {}", self.new_assignee_name, comment);
            statements.push(Statement::new(
                INSERT_COMMENT_SQL,
                vec![
                    Uuid::new_v4().to_string().into(),
                    self.activity_id.as_str().into(),
                    identity.user_id.as_str().into(),
                    text.into(),
                    now.as_str().into(),
                ],
            ));
        }
        let Some(counts) = store.execute_in_transaction(statements).await? else {
            return Err(not_found(&self.activity_id));
        };
        let touched = counts.first().copied().unwrap_or_default();

        tracing::info!(
            activity_id = %self.activity_id,
            assignee = %self.new_assignee_id,
            user_id = %identity.user_id,
            "activity assigned"
        );
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use crate::confirmation::Mutation;
    use crate::context::Identity;
    use crate::db::{DataStore, SqliteStore};
    use crate::errors::AppError;
    use crate::models::{AssignActivityArgs, ConsumptionEntry, LogConsumptionArgs};

    fn identity() -> Identity {
        Identity {
            user_id: "u-1".to_string(),
            project_id: "p-1".to_string(),
        }
    }

    async fn store_with_activity() -> SqliteStore {
        let store = SqliteStore::open_in_memory().expect("store");
        store
            .execute(
                "INSERT INTO activities (id, project_id, code, name, modified_on, created_on) \
                 VALUES ('a-1', 'p-1', '2.1', 'Slab', '2026-01-01', '2026-01-01')",
                &[],
            )
            .await
            .expect("activity");
        store
    }

    #[tokio::test]
    async fn consumption_defaults_missing_dates() {
        let store = store_with_activity().await;
        let args = LogConsumptionArgs {
            activity_id: "a-1".to_string(),
            activity_name: "Slab".to_string(),
            entries: vec![
                ConsumptionEntry {
                    consumption: 12.5,
                    ..ConsumptionEntry::default()
                },
                ConsumptionEntry {
                    consumption: 3.0,
                    date: Some("2026-01-05".to_string()),
                    ..ConsumptionEntry::default()
                },
            ],
        };
        let logged = args.apply(&store, &identity()).await.expect("apply");
        assert_eq!(logged, 2);
        let rows = store
            .fetch_all("SELECT date FROM consumption_entries WHERE date IS NULL OR date = ''", &[])
            .await
            .expect("rows");
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn assignment_is_idempotent_and_records_comment() {
        let store = store_with_activity().await;
        let args = AssignActivityArgs {
            activity_id: "a-1".to_string(),
            activity_name: "Slab".to_string(),
            new_assignee_id: "u-2".to_string(),
            new_assignee_name: "Meera".to_string(),
            comment: Some("night shift".to_string()),
            ..AssignActivityArgs::default()
        };
        args.apply(&store, &identity()).await.expect("first");
        args.apply(&store, &identity()).await.expect("second");

        let assignees = store
            .fetch_all("SELECT user_id FROM activity_assignees WHERE activity_id = 'a-1'", &[])
            .await
            .expect("assignees");
        assert_eq!(assignees.len(), 1);
        let comment = store
            .fetch_one("SELECT text FROM activity_comments LIMIT 1", &[])
            .await
            .expect("comment")
            .expect("row");
        assert_eq!(comment.text("text").expect("text"), "Assigned to Meera: night shift");
    }

    #[tokio::test]
    async fn failed_comment_rolls_back_the_assignment() {
        let store = store_with_activity().await;
        store
            .execute("DROP TABLE activity_comments", &[])
            .await
            .expect("drop comments");
        let args = AssignActivityArgs {
            activity_id: "a-1".to_string(),
            activity_name: "Slab".to_string(),
            new_assignee_id: "u-2".to_string(),
            new_assignee_name: "Meera".to_string(),
            comment: Some("night shift".to_string()),
            ..AssignActivityArgs::default()
        };
        assert!(args.apply(&store, &identity()).await.is_err());

        let assignees = store
            .fetch_all("SELECT user_id FROM activity_assignees", &[])
            .await
            .expect("assignees");
        assert!(assignees.is_empty());
        let activity = store
            .fetch_one("SELECT modified_by FROM activities WHERE id = 'a-1'", &[])
            .await
            .expect("activity")
            .expect("row");
        assert_eq!(activity.opt_text("modified_by").expect("modified_by"), None);
    }

    #[tokio::test]
    async fn unknown_activity_is_not_found() {
        let store = SqliteStore::open_in_memory().expect("store");
        let args = AssignActivityArgs {
            activity_id: "missing".to_string(),
            new_assignee_id: "u-2".to_string(),
            ..AssignActivityArgs::default()
        };
        let result = args.apply(&store, &identity()).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
