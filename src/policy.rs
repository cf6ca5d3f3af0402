use crate::config::{EngineConfig, PaginationConfig};
use crate::errors::{AppError, AppResult};
use crate::models::{ActivityFilters, ConsumptionEntry};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

static CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9]+(\.[A-Za-z0-9]+)*$").expect("valid code regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone)]
pub struct InputPolicy {
    pagination: PaginationConfig,
    max_string_len: usize,
    max_entries: usize,
}

impl Default for InputPolicy {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl InputPolicy {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            pagination: config.pagination.clone(),
            max_string_len: config.validation.max_string_param_len,
            max_entries: config.validation.max_consumption_entries,
        }
    }

    pub fn string_param(&self, name: &str, value: Option<&str>) -> AppResult<Option<String>> {
        let Some(trimmed) = value.map(str::trim).filter(|value| !value.is_empty()) else {
            return Ok(None);
        };
        if trimmed.chars().count() > self.max_string_len {
            return Err(AppError::InvalidInput(format!(
                "{} exceeds the maximum length of {} characters",
                name, self.max_string_len
            )));
        }
        if trimmed.chars().any(|ch| ch.is_control()) {
            return Err(AppError::InvalidInput(format!(
                "{} contains unsupported control characters",
                name
            )));
        }
        Ok(Some(trimmed.to_string()))
    }

    pub fn code_param(&self, name: &str, value: Option<&str>) -> AppResult<Option<String>> {
        let Some(raw) = self.string_param(name, value)? else {
            return Ok(None);
        };
        let normalized = raw.trim_end_matches('.');
        if !CODE_RE.is_match(normalized) {
            return Err(AppError::InvalidInput(format!(
                "{} '{}' is not a dot-delimited code",
                name, raw
            )));
        }
        Ok(Some(normalized.to_string()))
    }

    pub fn sanitize_filters(&self, filters: &ActivityFilters) -> AppResult<ActivityFilters> {
        Ok(ActivityFilters {
            activity_id: self.string_param("activity_id", filters.activity_id.as_deref())?,
            module_name: self.string_param("module_name", filters.module_name.as_deref())?,
            code: self.code_param("code", filters.code.as_deref())?,
            activity_name: self.string_param("activity_name", filters.activity_name.as_deref())?,
            task_name: self.string_param("task_name", filters.task_name.as_deref())?,
            quantity_manager_name: self
                .string_param("quantity_manager_name", filters.quantity_manager_name.as_deref())?,
            section: self.string_param("section", filters.section.as_deref())?,
            module_template_name: self
                .string_param("module_template_name", filters.module_template_name.as_deref())?,
            boq_name: self.string_param("boq_name", filters.boq_name.as_deref())?,
            ..filters.clone()
        })
    }

    /// List paging. Two or more narrowing name filters with the default size return
    /// every match up to the cap.
    pub fn list_page(&self, limit: Option<i64>, offset: Option<i64>, narrowing_filters: usize) -> Page {
        let default = self.pagination.list_default_limit;
        let max = self.pagination.list_max_limit;
        let mut page = clamp_page(limit, offset, default, max);
        if narrowing_filters >= 2 && page.limit == default {
            page.limit = max;
        }
        page
    }

    pub fn selection_page(&self, limit: Option<i64>, offset: Option<i64>) -> Page {
        clamp_page(
            limit,
            offset,
            self.pagination.selection_default_limit,
            self.pagination.selection_max_limit,
        )
    }

    pub fn detail_match_limit(&self) -> i64 {
        self.pagination.detail_match_limit
    }

    pub fn consumption_entries(&self, entries: &[ConsumptionEntry]) -> AppResult<()> {
        if entries.is_empty() {
            return Err(AppError::InvalidInput(
                "At least one consumption entry is required.".to_string(),
            ));
        }
        if entries.len() > self.max_entries {
            return Err(AppError::InvalidInput(format!(
                "At most {} consumption entries can be logged at once.",
                self.max_entries
            )));
        }
        for (index, entry) in entries.iter().enumerate() {
            if !entry.consumption.is_finite() {
                return Err(AppError::InvalidInput(format!(
                    "entries[{}].consumption must be a finite number",
                    index
                )));
            }
            if entry.consumption_percent.is_some_and(|percent| !(0.0..=100.0).contains(&percent)) {
                return Err(AppError::InvalidInput(format!(
                    "entries[{}].consumptionPercent must be between 0 and 100",
                    index
                )));
            }
            if let Some(date) = entry.date.as_deref() {
                NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| {
                    AppError::InvalidInput(format!("entries[{}].date '{}' is not YYYY-MM-DD", index, date))
                })?;
            }
        }
        Ok(())
    }
}

fn clamp_page(limit: Option<i64>, offset: Option<i64>, default: i64, max: i64) -> Page {
    let limit = match limit {
        Some(limit) if limit >= 1 => limit.min(max),
        _ => default,
    };
    let offset = offset.filter(|offset| *offset >= 0).unwrap_or(0);
    Page { limit, offset }
}

#[cfg(test)]
mod tests {
    use super::{InputPolicy, Page};
    use crate::models::ConsumptionEntry;

    #[test]
    fn clamps_list_limit_to_hard_cap() {
        let policy = InputPolicy::default();
        assert_eq!(policy.list_page(Some(200), None, 0), Page { limit: 50, offset: 0 });
        assert_eq!(policy.list_page(Some(0), Some(-5), 0), Page { limit: 10, offset: 0 });
        assert_eq!(policy.list_page(None, Some(20), 0), Page { limit: 10, offset: 20 });
    }

    #[test]
    fn narrowed_search_raises_default_page_only() {
        let policy = InputPolicy::default();
        assert_eq!(policy.list_page(None, None, 2).limit, 50);
        assert_eq!(policy.list_page(Some(10), None, 3).limit, 50);
        assert_eq!(policy.list_page(Some(5), None, 2).limit, 5);
        assert_eq!(policy.list_page(None, None, 1).limit, 10);
    }

    #[test]
    fn selection_paging_uses_its_own_bounds() {
        let policy = InputPolicy::default();
        assert_eq!(policy.selection_page(None, None), Page { limit: 6, offset: 0 });
        assert_eq!(policy.selection_page(Some(500), Some(3)), Page { limit: 100, offset: 3 });
    }

    #[test]
    fn string_params_are_trimmed_and_checked() {
        let policy = InputPolicy::default();
        assert_eq!(policy.string_param("name", Some("  ")).expect("blank"), None);
        assert_eq!(
            policy.string_param("name", Some(" Slab ")).expect("trim"),
            Some("Slab".to_string())
        );
        assert!(policy.string_param("name", Some("a\u{0}b")).is_err());
        assert!(policy.string_param("name", Some(&"x".repeat(201))).is_err());
    }

    #[test]
    fn code_param_normalizes_trailing_dots() {
        let policy = InputPolicy::default();
        assert_eq!(
            policy.code_param("code", Some("1.1.1.1.5.5.")).expect("code"),
            Some("1.1.1.1.5.5".to_string())
        );
        assert!(policy.code_param("code", Some("2.1'; DROP TABLE activities;--")).is_err());
        assert!(policy.code_param("code", Some("2..1")).is_err());
    }

    #[test]
    fn rejects_empty_or_malformed_consumption() {
        let policy = InputPolicy::default();
        assert!(policy.consumption_entries(&[]).is_err());
        let bad_date = ConsumptionEntry {
            consumption: 4.0,
            date: Some("12/01/2026".to_string()),
            ..ConsumptionEntry::default()
        };
        assert!(policy.consumption_entries(&[bad_date]).is_err());
        let ok = ConsumptionEntry {
            consumption: 4.0,
            date: Some("2026-01-12".to_string()),
            ..ConsumptionEntry::default()
        };
        assert!(policy.consumption_entries(&[ok]).is_ok());
    }
}
