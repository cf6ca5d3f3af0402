use crate::config::AccessConfig;
use crate::context::Identity;
use crate::db::{DataStore, Row};
use crate::errors::{AppError, AppResult};
use serde::Serialize;

const PROJECT_SQL: &str = "SELECT p.id AS id, p.organization_id AS organization_id, p.admin_id AS admin_id \
     FROM projects p WHERE p.id = ?1";

const USER_SQL: &str = "SELECT u.id AS id FROM users u WHERE u.id = ?1";

const ROLE_GRANTS_SQL: &str = "SELECT uor.role_id AS role_id, per.code_name AS code_name \
     FROM user_organization_roles uor \
     LEFT JOIN role_permissions rp ON rp.role_id = uor.role_id \
     LEFT JOIN permissions per ON per.id = rp.permission_id \
     WHERE uor.user_id = ?1 AND uor.organization_id = ?2 \
     ORDER BY uor.role_id, per.code_name";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRecord {
    pub id: String,
    pub organization_id: String,
    pub admin_id: Option<String>,
}

/// One (role, permission code) pair held by the user in the project's organization.
/// A role without permissions shows up once with `code_name = None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrant {
    pub role_id: String,
    pub code_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadRole {
    pub role_id: String,
    pub code_name: String,
}

/// What the user may see in one project, resolved fresh on every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessProfile {
    pub user_id: String,
    pub project_id: String,
    pub organization_id: String,
    pub has_broad_access: bool,
    pub is_project_admin: bool,
    pub lead_role: Option<LeadRole>,
    /// Roles whose membership in an activity's role set grants visibility.
    pub role_ids: Vec<String>,
}

impl AccessProfile {
    /// Project admins and holders of a broad-access code see every activity.
    pub fn skips_role_filters(&self) -> bool {
        self.is_project_admin || self.has_broad_access
    }

    pub fn lead_role_id(&self) -> Option<&str> {
        self.lead_role.as_ref().map(|lead| lead.role_id.as_str())
    }

    pub fn lead_role_code(&self) -> Option<&str> {
        self.lead_role.as_ref().map(|lead| lead.code_name.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PermissionResolver {
    config: AccessConfig,
}

impl PermissionResolver {
    pub fn new(config: AccessConfig) -> Self {
        Self { config }
    }

    pub async fn resolve(&self, store: &dyn DataStore, identity: &Identity) -> AppResult<AccessProfile> {
        let project = store
            .fetch_one(PROJECT_SQL, &[identity.project_id.as_str().into()])
            .await?
            .map(|row| parse_project_row(&row))
            .transpose()?
            .ok_or_else(|| {
                AppError::DataAccess(format!("project '{}' does not exist", identity.project_id))
            })?;

        if store
            .fetch_one(USER_SQL, &[identity.user_id.as_str().into()])
            .await?
            .is_none()
        {
            return Err(AppError::DataAccess(format!(
                "user '{}' does not exist",
                identity.user_id
            )));
        }

        let grants = store
            .fetch_all(
                ROLE_GRANTS_SQL,
                &[
                    identity.user_id.as_str().into(),
                    project.organization_id.as_str().into(),
                ],
            )
            .await?
            .iter()
            .map(parse_grant_row)
            .collect::<AppResult<Vec<_>>>()?;

        let profile = self.evaluate(identity, &project, &grants);
        tracing::debug!(
            user_id = %profile.user_id,
            project_id = %profile.project_id,
            broad = profile.has_broad_access,
            admin = profile.is_project_admin,
            lead_role = ?profile.lead_role_code(),
            roles = profile.role_ids.len(),
            "resolved access profile"
        );
        Ok(profile)
    }

    /// Pure evaluation over already fetched rows. `grants` must be ordered by
    /// (role id, code) so the lead role pick is stable.
    pub fn evaluate(&self, identity: &Identity, project: &ProjectRecord, grants: &[RoleGrant]) -> AccessProfile {
        let holds = |codes: &[String], grant: &RoleGrant| {
            grant
                .code_name
                .as_deref()
                .is_some_and(|code| codes.iter().any(|candidate| candidate == code))
        };

        let has_broad_access = grants
            .iter()
            .any(|grant| holds(&self.config.broad_access_codes, grant));
        let is_project_admin = project.admin_id.as_deref() == Some(identity.user_id.as_str());
        let lead_role = grants
            .iter()
            .find(|grant| holds(&self.config.lead_role_codes, grant))
            .and_then(|grant| {
                grant.code_name.as_ref().map(|code| LeadRole {
                    role_id: grant.role_id.clone(),
                    code_name: code.clone(),
                })
            });

        let mut role_ids: Vec<String> = Vec::new();
        for grant in grants {
            let qualifies = !self.config.require_progress_update_for_role_match
                || grant.code_name.as_deref() == Some(self.config.progress_update_code.as_str());
            if qualifies && !role_ids.contains(&grant.role_id) {
                role_ids.push(grant.role_id.clone());
            }
        }

        AccessProfile {
            user_id: identity.user_id.clone(),
            project_id: identity.project_id.clone(),
            organization_id: project.organization_id.clone(),
            has_broad_access,
            is_project_admin,
            lead_role,
            role_ids,
        }
    }
}

fn parse_project_row(row: &Row) -> AppResult<ProjectRecord> {
    Ok(ProjectRecord {
        id: row.text("id")?,
        organization_id: row.text("organization_id")?,
        admin_id: row.opt_text("admin_id")?,
    })
}

fn parse_grant_row(row: &Row) -> AppResult<RoleGrant> {
    Ok(RoleGrant {
        role_id: row.text("role_id")?,
        code_name: row.opt_text("code_name")?,
    })
}
