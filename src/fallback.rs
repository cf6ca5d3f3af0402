use crate::errors::AppResult;
use crate::models::ActivityFilters;
use crate::policy::Page;
use async_trait::async_trait;

/// How far a selection search had to broaden before it found anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTier {
    /// The filters as given, code subtree included.
    Exact,
    /// The code was replaced by this ancestor.
    Ancestor(String),
    /// The code was dropped; module, template or BOQ filters still apply.
    CategoryOnly,
    None,
}

impl SearchTier {
    pub fn label(&self) -> String {
        match self {
            Self::Exact => "exact".to_string(),
            Self::Ancestor(code) => format!("parent_{}", code),
            Self::CategoryOnly => "parent_filters_only".to_string(),
            Self::None => "none".to_string(),
        }
    }
}

/// Ancestors of `code`, most specific first, stopping at two segments. The code itself
/// is not included. Trailing dots are ignored.
pub fn code_fallback_levels(code: &str) -> Vec<String> {
    let parts: Vec<&str> = code
        .trim()
        .trim_end_matches('.')
        .split('.')
        .filter(|part| !part.is_empty())
        .collect();
    (2..parts.len())
        .rev()
        .map(|len| parts[..len].join("."))
        .collect()
}

/// A search that can be counted and paged for a given filter set.
#[async_trait]
pub trait TierSource: Send + Sync {
    type Row: Send;

    async fn count(&self, filters: &ActivityFilters) -> AppResult<i64>;

    async fn fetch(&self, filters: &ActivityFilters, page: Page) -> AppResult<Vec<Self::Row>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TierMatch<R> {
    pub tier: SearchTier,
    pub total: i64,
    pub rows: Vec<R>,
}

impl<R> TierMatch<R> {
    fn none() -> Self {
        Self {
            tier: SearchTier::None,
            total: 0,
            rows: Vec::new(),
        }
    }
}

/// The tiers to try for `filters`, in order. Without a code there is a single tier with
/// the filters unchanged.
pub fn plan_tiers(filters: &ActivityFilters) -> Vec<(SearchTier, ActivityFilters)> {
    let Some(code) = filters.code.as_deref().filter(|code| !code.trim().is_empty()) else {
        return vec![(SearchTier::Exact, filters.clone())];
    };

    let mut tiers = vec![(SearchTier::Exact, filters.clone())];
    for ancestor in code_fallback_levels(code) {
        let broadened = ActivityFilters {
            code: Some(ancestor.clone()),
            ..filters.clone()
        };
        tiers.push((SearchTier::Ancestor(ancestor), broadened));
    }
    if filters.has_category_filter() {
        tiers.push((SearchTier::CategoryOnly, filters.without_code()));
    }
    tiers
}

/// Runs the tiers in order and stops at the first with a positive count. Each tier is
/// counted before anything is fetched.
pub async fn search_tiers<S>(source: &S, filters: &ActivityFilters, page: Page) -> AppResult<TierMatch<S::Row>>
where
    S: TierSource + ?Sized,
{
    for (tier, tier_filters) in plan_tiers(filters) {
        let total = source.count(&tier_filters).await?;
        if total <= 0 {
            tracing::debug!(tier = %tier.label(), "no rows at tier");
            continue;
        }
        let rows = source.fetch(&tier_filters, page).await?;
        tracing::info!(
            tier = %tier.label(),
            total,
            returned = rows.len(),
            "selection search matched"
        );
        return Ok(TierMatch { tier, total, rows });
    }
    Ok(TierMatch::none())
}

#[cfg(test)]
mod tests {
    use super::{code_fallback_levels, plan_tiers, search_tiers, SearchTier, TierSource};
    use crate::errors::AppResult;
    use crate::models::ActivityFilters;
    use crate::policy::Page;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers counts from a fixed table keyed by the code filter and records every call.
    struct ScriptedSource {
        counts: Vec<(Option<&'static str>, i64)>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedSource {
        fn new(counts: Vec<(Option<&'static str>, i64)>) -> Self {
            Self {
                counts,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls").clone()
        }
    }

    #[async_trait]
    impl TierSource for ScriptedSource {
        type Row = String;

        async fn count(&self, filters: &ActivityFilters) -> AppResult<i64> {
            let code = filters.code.clone();
            self.calls
                .lock()
                .expect("calls")
                .push(format!("count:{}", code.as_deref().unwrap_or("-")));
            Ok(self
                .counts
                .iter()
                .find(|(candidate, _)| candidate.map(str::to_string) == code)
                .map(|(_, count)| *count)
                .unwrap_or(0))
        }

        async fn fetch(&self, filters: &ActivityFilters, page: Page) -> AppResult<Vec<String>> {
            let code = filters.code.clone().unwrap_or_else(|| "-".to_string());
            self.calls.lock().expect("calls").push(format!("fetch:{}", code));
            Ok((0..page.limit.min(2)).map(|index| format!("{}#{}", code, index)).collect())
        }
    }

    fn page() -> Page {
        Page { limit: 6, offset: 0 }
    }

    #[test]
    fn fallback_levels_stop_at_two_segments() {
        assert_eq!(
            code_fallback_levels("2.1.5.1.1"),
            vec!["2.1.5.1", "2.1.5", "2.1"]
        );
        assert_eq!(code_fallback_levels("1.1.1.1.5.5."), vec!["1.1.1.1.5", "1.1.1.1", "1.1.1", "1.1"]);
        assert!(code_fallback_levels("2.1").is_empty());
        assert!(code_fallback_levels("7").is_empty());
    }

    #[test]
    fn category_tier_needs_a_category_filter() {
        let filters = ActivityFilters {
            code: Some("2.1.5".to_string()),
            ..ActivityFilters::default()
        };
        let tiers: Vec<SearchTier> = plan_tiers(&filters).into_iter().map(|(tier, _)| tier).collect();
        assert_eq!(
            tiers,
            vec![SearchTier::Exact, SearchTier::Ancestor("2.1".to_string())]
        );

        let with_module = ActivityFilters {
            module_name: Some("Tower A".to_string()),
            ..filters
        };
        let last = plan_tiers(&with_module).pop().expect("tier");
        assert_eq!(last.0, SearchTier::CategoryOnly);
        assert_eq!(last.1.code, None);
        assert_eq!(last.1.module_name.as_deref(), Some("Tower A"));
    }

    #[tokio::test]
    async fn first_positive_ancestor_wins_and_counts_precede_fetch() {
        let source = ScriptedSource::new(vec![(Some("2.1.5.1"), 2), (Some("2.1.5"), 9)]);
        let filters = ActivityFilters {
            code: Some("2.1.5.1.1".to_string()),
            ..ActivityFilters::default()
        };
        let found = search_tiers(&source, &filters, page()).await.expect("search");
        assert_eq!(found.tier, SearchTier::Ancestor("2.1.5.1".to_string()));
        assert_eq!(found.tier.label(), "parent_2.1.5.1");
        assert_eq!(found.total, 2);
        assert_eq!(found.rows.len(), 2);
        assert_eq!(
            source.calls(),
            vec!["count:2.1.5.1.1", "count:2.1.5.1", "fetch:2.1.5.1"]
        );
    }

    #[tokio::test]
    async fn exhausted_tiers_report_none_without_fetching() {
        let source = ScriptedSource::new(Vec::new());
        let filters = ActivityFilters {
            code: Some("9.9.9".to_string()),
            boq_name: Some("Rebar".to_string()),
            ..ActivityFilters::default()
        };
        let found = search_tiers(&source, &filters, page()).await.expect("search");
        assert_eq!(found.tier, SearchTier::None);
        assert!(found.rows.is_empty());
        assert!(source.calls().iter().all(|call| call.starts_with("count:")));
        assert_eq!(source.calls().len(), 3);
    }

    #[tokio::test]
    async fn no_code_runs_filters_directly() {
        let source = ScriptedSource::new(vec![(None, 4)]);
        let filters = ActivityFilters {
            activity_name: Some("Slab".to_string()),
            ..ActivityFilters::default()
        };
        let found = search_tiers(&source, &filters, page()).await.expect("search");
        assert_eq!(found.tier, SearchTier::Exact);
        assert_eq!(source.calls(), vec!["count:-", "fetch:-"]);
    }
}
