use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct PaginationConfig {
    pub list_default_limit: i64,
    pub list_max_limit: i64,
    pub selection_default_limit: i64,
    pub selection_max_limit: i64,
    /// Rows fetched by a status lookup before it falls back to a selection list.
    pub detail_match_limit: i64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            list_default_limit: 10,
            list_max_limit: 50,
            selection_default_limit: 6,
            selection_max_limit: 100,
            detail_match_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessConfig {
    pub broad_access_codes: Vec<String>,
    pub progress_update_code: String,
    pub lead_role_codes: Vec<String>,
    /// When set (the default), a role-set match only counts if the matched role also
    /// carries `progress_update_code`.
    pub require_progress_update_for_role_match: bool,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            broad_access_codes: vec![
                "PROJECT_ADMIN".to_string(),
                "FULL_ACCESS".to_string(),
                "ACTIVITIES_PROGRESS_UPDATE_ALL_CARDS".to_string(),
            ],
            progress_update_code: "ACTIVITIES_PROGRESS_UPDATE".to_string(),
            lead_role_codes: vec!["RFI_LEAD_REQUESTER".to_string(), "RFI_LEAD_APPROVER".to_string()],
            require_progress_update_for_role_match: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationConfig {
    pub max_string_param_len: usize,
    pub max_consumption_entries: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_string_param_len: 200,
            max_consumption_entries: 100,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub pagination: PaginationConfig,
    pub access: AccessConfig,
    pub validation: ValidationConfig,
}

impl EngineConfig {
    pub fn from_yaml_str(raw: &str) -> AppResult<Self> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(raw: &str) -> AppResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a config file, picking the format from the extension (`.json`, otherwise YAML).
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&raw)
        } else {
            Self::from_yaml_str(&raw)
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        let pagination = &self.pagination;
        for (label, default, max) in [
            ("list", pagination.list_default_limit, pagination.list_max_limit),
            (
                "selection",
                pagination.selection_default_limit,
                pagination.selection_max_limit,
            ),
        ] {
            if default < 1 || max < default {
                return Err(AppError::InvalidInput(format!(
                    "{} pagination requires 1 <= default ({}) <= max ({})",
                    label, default, max
                )));
            }
        }
        if pagination.detail_match_limit < 1 {
            return Err(AppError::InvalidInput(
                "detailMatchLimit must be at least 1".to_string(),
            ));
        }
        if self.access.broad_access_codes.iter().any(|code| code.trim().is_empty()) {
            return Err(AppError::InvalidInput(
                "broadAccessCodes cannot contain empty codes".to_string(),
            ));
        }
        if self.validation.max_string_param_len == 0 {
            return Err(AppError::InvalidInput(
                "maxStringParamLen must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::EngineConfig;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = EngineConfig::from_yaml_str(
            "pagination:\n  listMaxLimit: 80\naccess:\n  leadRoleCodes: [LEAD]\n",
        )
        .expect("config");
        assert_eq!(config.pagination.list_max_limit, 80);
        assert_eq!(config.pagination.list_default_limit, 10);
        assert_eq!(config.access.lead_role_codes, vec!["LEAD".to_string()]);
        assert_eq!(config.access.broad_access_codes.len(), 3);
    }

    #[test]
    fn rejects_default_above_max() {
        let result = EngineConfig::from_json_str(
            r#"{"pagination":{"selectionDefaultLimit":20,"selectionMaxLimit":10}}"#,
        );
        assert!(result.is_err());
    }
}
