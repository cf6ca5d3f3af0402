use crate::db::SqlValue;
use crate::models::{is_present, ActivityFilters};

/// Placeholder reserved for the calling user's id in every composed statement. `?2` is
/// always the project id.
pub const USER_PARAM: &str = "?1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSemantics {
    Substring,
    Exact,
    /// The code itself or any descendant on a dot boundary.
    HierarchicalCode,
    DelayFlag,
    MinDelay,
    Ownership,
    /// Equality against a linked record; the column holds a fragment with `{value}`.
    LinkedExact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterValue<'a> {
    Absent,
    Text(&'a str),
    Flag(bool),
    Number(i64),
}

pub struct FilterSpec {
    pub name: &'static str,
    pub column: &'static str,
    pub semantics: MatchSemantics,
    read: fn(&ActivityFilters) -> FilterValue<'_>,
}

impl FilterSpec {
    pub fn value<'a>(&self, filters: &'a ActivityFilters) -> FilterValue<'a> {
        (self.read)(filters)
    }
}

fn text(value: &Option<String>) -> FilterValue<'_> {
    match value.as_deref() {
        Some(raw) if is_present(Some(raw)) => FilterValue::Text(raw.trim()),
        _ => FilterValue::Absent,
    }
}

fn label(value: Option<&'static str>) -> FilterValue<'static> {
    value.map(FilterValue::Text).unwrap_or(FilterValue::Absent)
}

const QUANTITY_MANAGER_NAME: &str =
    "TRIM(COALESCE(qm.first_name, '') || ' ' || COALESCE(qm.last_name, ''))";

/// Every filter the activity queries understand. List, grouped, detail, selection and
/// resource statements all compose their predicates from this table.
pub static ACTIVITY_FILTERS: &[FilterSpec] = &[
    FilterSpec {
        name: "activity_id",
        column: "a.id",
        semantics: MatchSemantics::Exact,
        read: |filters| text(&filters.activity_id),
    },
    FilterSpec {
        name: "module_name",
        column: "m.name",
        semantics: MatchSemantics::Substring,
        read: |filters| text(&filters.module_name),
    },
    FilterSpec {
        name: "current_state",
        column: "a.current_state",
        semantics: MatchSemantics::Exact,
        read: |filters| label(filters.current_state.map(|state| state.as_str())),
    },
    FilterSpec {
        name: "status",
        column: "a.status",
        semantics: MatchSemantics::Exact,
        read: |filters| label(filters.status.map(|status| status.as_str())),
    },
    FilterSpec {
        name: "code",
        column: "a.code",
        semantics: MatchSemantics::HierarchicalCode,
        read: |filters| text(&filters.code),
    },
    FilterSpec {
        name: "activity_name",
        column: "a.name",
        semantics: MatchSemantics::Substring,
        read: |filters| text(&filters.activity_name),
    },
    FilterSpec {
        name: "task_name",
        column: "a.task_name",
        semantics: MatchSemantics::Substring,
        read: |filters| text(&filters.task_name),
    },
    FilterSpec {
        name: "priority",
        column: "a.priority",
        semantics: MatchSemantics::Exact,
        read: |filters| label(filters.priority.map(|priority| priority.as_str())),
    },
    FilterSpec {
        name: "quantity_manager_name",
        column: QUANTITY_MANAGER_NAME,
        semantics: MatchSemantics::Substring,
        read: |filters| text(&filters.quantity_manager_name),
    },
    FilterSpec {
        name: "is_delayed",
        column: "a.delay",
        semantics: MatchSemantics::DelayFlag,
        read: |filters| {
            filters
                .is_delayed
                .map(FilterValue::Flag)
                .unwrap_or(FilterValue::Absent)
        },
    },
    FilterSpec {
        name: "min_delay_days",
        column: "a.delay",
        semantics: MatchSemantics::MinDelay,
        read: |filters| {
            filters
                .min_delay_days
                .map(FilterValue::Number)
                .unwrap_or(FilterValue::Absent)
        },
    },
    FilterSpec {
        name: "section",
        column: "a.section",
        semantics: MatchSemantics::Substring,
        read: |filters| text(&filters.section),
    },
    FilterSpec {
        name: "assigned_to_me",
        column: "EXISTS (SELECT 1 FROM activity_assignees own_aa \
                 WHERE own_aa.activity_id = a.id AND own_aa.user_id = ?1)",
        semantics: MatchSemantics::Ownership,
        read: |filters| FilterValue::Flag(filters.assigned_to_me),
    },
    FilterSpec {
        name: "raised_by_me",
        column: "EXISTS (SELECT 1 FROM requests own_r \
                 WHERE own_r.activity_id = a.id AND own_r.deleted = 0 AND own_r.raised_by = ?1)",
        semantics: MatchSemantics::Ownership,
        read: |filters| FilterValue::Flag(filters.raised_by_me),
    },
    FilterSpec {
        name: "drawing_status",
        column: "md.drawing_status",
        semantics: MatchSemantics::Exact,
        read: |filters| label(filters.drawing_status.map(|status| status.as_str())),
    },
    FilterSpec {
        name: "task_type",
        column: "a.task_type",
        semantics: MatchSemantics::Exact,
        read: |filters| label(filters.task_type.map(|task_type| task_type.as_str())),
    },
    FilterSpec {
        name: "module_template_name",
        column: "mt.name",
        semantics: MatchSemantics::Substring,
        read: |filters| text(&filters.module_template_name),
    },
    FilterSpec {
        name: "boq_name",
        column: "EXISTS (SELECT 1 FROM resource_allocations boq_ra \
                 JOIN boq_items boq_b ON boq_b.id = boq_ra.boq_item_id \
                 WHERE boq_ra.activity_id = a.id AND boq_ra.deleted = 0 AND boq_b.name = {value})",
        semantics: MatchSemantics::LinkedExact,
        read: |filters| text(&filters.boq_name),
    },
];

pub fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// WHERE-clause fragments and their positional parameters. Placeholders are only ever
/// produced by [`PredicateSet::bind`], so the two lists cannot drift apart.
#[derive(Debug, Clone, PartialEq)]
pub struct PredicateSet {
    clauses: Vec<String>,
    params: Vec<SqlValue>,
}

impl PredicateSet {
    pub fn new(user_id: &str, project_id: &str) -> Self {
        Self {
            clauses: Vec::new(),
            params: vec![SqlValue::from(user_id), SqlValue::from(project_id)],
        }
    }

    pub fn bind(&mut self, value: impl Into<SqlValue>) -> String {
        self.params.push(value.into());
        format!("?{}", self.params.len())
    }

    pub fn push(&mut self, clause: impl Into<String>) {
        self.clauses.push(clause.into());
    }

    pub fn clauses(&self) -> &[String] {
        &self.clauses
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    pub fn and_sql(&self) -> String {
        self.clauses
            .iter()
            .map(|clause| format!(" AND {}", clause))
            .collect()
    }

    /// Matches `code` and its descendants, never siblings sharing a textual prefix.
    pub fn code_subtree(&mut self, column: &str, code: &str) {
        let code = code.trim().trim_end_matches('.');
        let exact = self.bind(code);
        let children = self.bind(format!("{}.%", escape_like(code)));
        self.push(format!(
            "({column} = {exact} OR {column} LIKE {children} ESCAPE '\\')"
        ));
    }

    pub fn apply(&mut self, spec: &FilterSpec, value: FilterValue<'_>) {
        let column = spec.column;
        match (spec.semantics, value) {
            (_, FilterValue::Absent) => {}
            (MatchSemantics::Substring, FilterValue::Text(raw)) => {
                let placeholder = self.bind(format!("%{}%", escape_like(raw)));
                self.push(format!("{column} LIKE {placeholder} ESCAPE '\\'"));
            }
            (MatchSemantics::Exact, FilterValue::Text(raw)) => {
                let placeholder = self.bind(raw);
                self.push(format!("{column} = {placeholder}"));
            }
            (MatchSemantics::HierarchicalCode, FilterValue::Text(raw)) => {
                self.code_subtree(column, raw);
            }
            (MatchSemantics::DelayFlag, FilterValue::Flag(true)) => {
                self.push(format!("{column} > 0"));
            }
            (MatchSemantics::DelayFlag, FilterValue::Flag(false)) => {
                self.push(format!("({column} <= 0 OR {column} IS NULL)"));
            }
            (MatchSemantics::MinDelay, FilterValue::Number(days)) => {
                let placeholder = self.bind(days);
                self.push(format!("{column} >= {placeholder}"));
            }
            (MatchSemantics::Ownership, FilterValue::Flag(true)) => {
                self.push(column);
            }
            (MatchSemantics::Ownership, FilterValue::Flag(false)) => {}
            (MatchSemantics::LinkedExact, FilterValue::Text(raw)) => {
                let placeholder = self.bind(raw);
                self.push(column.replace("{value}", &placeholder));
            }
            (semantics, value) => {
                tracing::debug!(
                    filter = spec.name,
                    ?semantics,
                    ?value,
                    "filter value does not apply to its semantics"
                );
            }
        }
    }

    pub fn apply_filters(&mut self, filters: &ActivityFilters) {
        for spec in ACTIVITY_FILTERS {
            self.apply(spec, spec.value(filters));
        }
    }
}

pub fn build_predicates(user_id: &str, project_id: &str, filters: &ActivityFilters) -> PredicateSet {
    let mut set = PredicateSet::new(user_id, project_id);
    set.apply_filters(filters);
    set
}

#[cfg(test)]
mod tests {
    use super::{build_predicates, escape_like, PredicateSet};
    use crate::db::SqlValue;
    use crate::models::{ActivityFilters, ActivityStatus};
    use rusqlite::{params_from_iter, Connection};

    fn placeholder_count(sql: &str) -> usize {
        let mut highest = 0;
        let bytes = sql.as_bytes();
        let mut index = 0;
        while index < bytes.len() {
            if bytes[index] == b'?' {
                let digits: String = sql[index + 1..]
                    .chars()
                    .take_while(|ch| ch.is_ascii_digit())
                    .collect();
                if let Ok(value) = digits.parse::<usize>() {
                    highest = highest.max(value);
                }
                index += digits.len();
            }
            index += 1;
        }
        highest
    }

    #[test]
    fn empty_filters_add_no_clauses() {
        let filters = ActivityFilters {
            activity_name: Some("   ".to_string()),
            ..ActivityFilters::default()
        };
        let set = build_predicates("u-1", "p-1", &filters);
        assert!(set.clauses().is_empty());
        assert_eq!(set.params().len(), 2);
        assert_eq!(set.and_sql(), "");
    }

    #[test]
    fn placeholders_stay_aligned_with_params() {
        let filters = ActivityFilters {
            module_name: Some("Tower".to_string()),
            status: Some(ActivityStatus::OnGoing),
            code: Some("2.1.5".to_string()),
            min_delay_days: Some(3),
            is_delayed: Some(true),
            assigned_to_me: true,
            boq_name: Some("Concrete M25".to_string()),
            ..ActivityFilters::default()
        };
        let set = build_predicates("u-1", "p-1", &filters);
        let sql = set.and_sql();
        assert_eq!(placeholder_count(&sql), set.params().len());
        assert_eq!(set.params()[2], SqlValue::from("%Tower%"));
        assert!(sql.contains("a.delay > 0"));
        assert!(sql.contains("own_aa.user_id = ?1"));
        assert!(!sql.contains("Concrete"));
    }

    #[test]
    fn like_wildcards_in_caller_text_are_escaped() {
        assert_eq!(escape_like("50%_a\\b"), "50\\%\\_a\\\\b");
        let filters = ActivityFilters {
            activity_name: Some("100%".to_string()),
            ..ActivityFilters::default()
        };
        let set = build_predicates("u", "p", &filters);
        assert_eq!(set.params()[2], SqlValue::from("%100\\%%"));
    }

    #[test]
    fn delay_flag_false_includes_unscheduled_rows() {
        let filters = ActivityFilters {
            is_delayed: Some(false),
            ..ActivityFilters::default()
        };
        let set = build_predicates("u", "p", &filters);
        assert_eq!(set.clauses(), ["(a.delay <= 0 OR a.delay IS NULL)".to_string()]);
    }

    #[test]
    fn code_subtree_excludes_siblings() {
        let conn = Connection::open_in_memory().expect("conn");
        conn.execute_batch(
            "CREATE TABLE a (code TEXT);
             INSERT INTO a VALUES ('2.1.5.1.1'), ('2.1.5.1.10'), ('2.1.5.1.1.3'), ('2.1.5.1.2');",
        )
        .expect("seed");

        let mut set = PredicateSet::new("u", "p");
        set.code_subtree("a.code", "2.1.5.1.1");
        let sql = format!(
            "SELECT code FROM a WHERE ?1 IS NOT NULL AND ?2 IS NOT NULL{} ORDER BY code",
            set.and_sql()
        );
        let mut statement = conn.prepare(&sql).expect("prepare");
        let codes: Vec<String> = statement
            .query_map(params_from_iter(set.params().iter()), |row| row.get(0))
            .expect("query")
            .collect::<Result<_, _>>()
            .expect("rows");
        assert_eq!(codes, vec!["2.1.5.1.1".to_string(), "2.1.5.1.1.3".to_string()]);
    }
}
