//! Common types for evidence search
//!
//! Strategies come in from the caller, tasks flow through the scheduler, and
//! every backend response is flattened into [`CanonicalResult`] before the
//! consolidator turns it into [`ConsolidatedResult`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{SearchError, SearchResult};

// ============================================================================
// Dates
// ============================================================================

/// A calendar month, written `YYYY-MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    first: NaiveDate,
    last: NaiveDate,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> SearchResult<Self> {
        let invalid = || SearchError::InvalidDateRange(format!("{:04}-{:02}", year, month));
        let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
        let last = first
            .checked_add_months(Months::new(1))
            .and_then(|d| d.pred_opt())
            .ok_or_else(invalid)?;
        Ok(Self { first, last })
    }

    /// Parse a `YYYY-MM` string
    pub fn parse(value: &str) -> SearchResult<Self> {
        let invalid = || SearchError::InvalidDateRange(format!("expected YYYY-MM, got '{}'", value));
        let (year, month) = value.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::new(year, month)
    }

    pub fn year(&self) -> i32 {
        self.first.year()
    }

    pub fn month(&self) -> u32 {
        self.first.month()
    }

    /// First day of the month
    pub fn first_day(&self) -> NaiveDate {
        self.first
    }

    /// Last day of the month, accounting for leap years
    pub fn last_day(&self) -> NaiveDate {
        self.last
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl TryFrom<String> for YearMonth {
    type Error = SearchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}

/// Inclusive month range used to restrict results by publication date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    pub start: YearMonth,
    pub end: YearMonth,
}

#[derive(Deserialize)]
struct RawDateRange {
    start: YearMonth,
    end: YearMonth,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = SearchError;

    fn try_from(raw: RawDateRange) -> Result<Self, Self::Error> {
        Self::new(raw.start, raw.end)
    }
}

impl DateRange {
    pub fn new(start: YearMonth, end: YearMonth) -> SearchResult<Self> {
        if start > end {
            return Err(SearchError::InvalidDateRange(format!(
                "start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Build from two `YYYY-MM` strings
    pub fn parse(start: &str, end: &str) -> SearchResult<Self> {
        Self::new(YearMonth::parse(start)?, YearMonth::parse(end)?)
    }

    /// First day covered by the range
    pub fn start_date(&self) -> NaiveDate {
        self.start.first_day()
    }

    /// Last day covered by the range
    pub fn end_date(&self) -> NaiveDate {
        self.end.last_day()
    }
}

// ============================================================================
// Strategy
// ============================================================================

/// An entity whose name drives task priority and result scoring
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityProfile {
    /// Name as supplied by the caller
    pub name: String,
    /// Canonical name confirmed by a prior verification step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_name: Option<String>,
    /// Official web domain, e.g. `acme.com`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Sector terms such as "aerospace" or "biotech"
    #[serde(default)]
    pub sectors: Vec<String>,
}

impl EntityProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_verified_name(mut self, verified: impl Into<String>) -> Self {
        self.verified_name = Some(verified.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_sectors<I, S>(mut self, sectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sectors = sectors.into_iter().map(Into::into).collect();
        self
    }

    /// Lowercased name matched in full against keywords
    pub fn full_name(&self) -> String {
        self.verified_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.name)
            .trim()
            .to_lowercase()
    }

    /// Lowercased words longer than three characters from every known name
    pub fn significant_words(&self) -> Vec<String> {
        let mut words = Vec::new();
        let names = std::iter::once(self.name.as_str()).chain(self.verified_name.as_deref());
        for name in names {
            for word in name.split_whitespace() {
                let word = word
                    .trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase();
                if word.chars().count() > 3 && !words.contains(&word) {
                    words.push(word);
                }
            }
        }
        words
    }
}

/// Seed for one orchestration run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchStrategy {
    /// Keyword phrases, in caller order
    pub keywords: Vec<String>,
    /// Backend identifiers; empty means the baseline backend
    #[serde(default)]
    pub backends: Vec<String>,
    /// Language hint, e.g. `en`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Country hint, e.g. `us`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub entities: Vec<EntityProfile>,
    /// Overrides the per-backend default result count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_cap: Option<u32>,
}

impl SearchStrategy {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_backends<I, S>(mut self, backends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.backends = backends.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_locale(mut self, language: Option<String>, country: Option<String>) -> Self {
        self.language = language;
        self.country = country;
        self
    }

    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    pub fn with_entity(mut self, entity: EntityProfile) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn with_result_cap(mut self, cap: u32) -> Self {
        self.result_cap = Some(cap);
        self
    }

    /// Significant entity-name words used to reward matching results
    pub fn priority_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = Vec::new();
        for word in self.entities.iter().flat_map(|e| e.significant_words()) {
            if !tokens.contains(&word) {
                tokens.push(word);
            }
        }
        tokens
    }

    /// Verified entity domains, lowercased
    pub fn verified_domains(&self) -> Vec<String> {
        self.entities
            .iter()
            .filter_map(|e| e.domain.as_deref())
            .map(|d| d.trim().trim_start_matches("www.").to_lowercase())
            .filter(|d| !d.is_empty())
            .collect()
    }
}

// ============================================================================
// Tasks
// ============================================================================

/// Per-task request options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOptions {
    /// Maximum number of results to keep from the response
    pub result_cap: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
}

/// One (keyword, backend) search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchTask {
    pub keyword: String,
    pub backend: String,
    /// Higher runs and retries first
    pub priority: i32,
    pub options: TaskOptions,
}

impl SearchTask {
    /// Copy of this task bound to another backend
    pub fn with_backend(&self, backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            ..self.clone()
        }
    }
}

// ============================================================================
// Results
// ============================================================================

/// A search result in the one shape every backend is translated into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// 1-based rank within the originating response
    pub position: u32,
    pub backend: String,
    pub keyword: String,
}

/// A deduplicated, scored result handed to the analysis stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedResult {
    pub title: String,
    pub url: String,
    /// Dedup key
    pub normalized_url: String,
    pub snippet: String,
    /// Best position among merged copies
    pub position: u32,
    /// Backends that returned this URL
    pub backends: Vec<String>,
    /// Keywords that surfaced this URL, in first-seen order
    pub keywords: Vec<String>,
    pub score: f64,
}

// ============================================================================
// Reports
// ============================================================================

/// Per-backend execution counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendStats {
    pub attempts: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub timed_out: u32,
    pub results: u32,
    /// Fraction of attempts that succeeded (0.0 - 1.0)
    pub success_rate: f64,
}

/// Outcome accounting for one scheduler run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Tasks generated by the planner
    pub total_tasks: u32,
    /// Successful attempts, primary or retry
    pub succeeded: u32,
    /// Failed attempts, primary or retry
    pub failed: u32,
    /// Retry attempts issued
    pub retried: u32,
    /// Tasks whose final attempt failed
    pub permanently_failed: u32,
    pub total_results: u32,
    pub backends_used: Vec<String>,
    pub wall_clock_ms: u64,
    pub per_backend: BTreeMap<String, BackendStats>,
}

/// What the consolidator did to the raw result set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationReport {
    pub original_count: usize,
    pub deduplicated_count: usize,
    pub final_count: usize,
    /// `final_count / original_count`, 0 for empty input
    pub compression_ratio: f64,
    pub processing_ms: u64,
    /// Stages applied, in order
    pub stages: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_month_bounds() {
        let feb = YearMonth::parse("2020-02").unwrap();
        assert_eq!(feb.first_day(), NaiveDate::from_ymd_opt(2020, 2, 1).unwrap());
        assert_eq!(feb.last_day(), NaiveDate::from_ymd_opt(2020, 2, 29).unwrap());

        let feb = YearMonth::parse("2021-02").unwrap();
        assert_eq!(feb.last_day(), NaiveDate::from_ymd_opt(2021, 2, 28).unwrap());

        let dec = YearMonth::parse("1999-12").unwrap();
        assert_eq!(dec.last_day(), NaiveDate::from_ymd_opt(1999, 12, 31).unwrap());
    }

    #[test]
    fn test_year_month_rejects_garbage() {
        assert!(YearMonth::parse("2020-13").is_err());
        assert!(YearMonth::parse("2020/01").is_err());
        assert!(YearMonth::parse("20-01").is_err());
        assert!(YearMonth::parse("").is_err());
    }

    #[test]
    fn test_date_range_order() {
        assert!(DateRange::parse("2020-03", "2020-01").is_err());
        let range = DateRange::parse("2020-01", "2020-02").unwrap();
        assert_eq!(range.start_date(), NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        assert_eq!(range.end_date(), NaiveDate::from_ymd_opt(2020, 2, 29).unwrap());
    }

    #[test]
    fn test_date_range_deserialize_validates() {
        let ok: DateRange =
            serde_json::from_str(r#"{"start": "2019-06", "end": "2019-07"}"#).unwrap();
        assert_eq!(ok.start.to_string(), "2019-06");

        let inverted = serde_json::from_str::<DateRange>(r#"{"start": "2019-08", "end": "2019-07"}"#);
        assert!(inverted.is_err());
    }

    #[test]
    fn test_entity_words() {
        let entity = EntityProfile::new("Acme Corp of Ohio").with_verified_name("Acme Corporation");
        assert_eq!(entity.full_name(), "acme corporation");
        assert_eq!(
            entity.significant_words(),
            vec!["acme", "corp", "ohio", "corporation"]
        );
    }

    #[test]
    fn test_strategy_tokens_dedup() {
        let strategy = SearchStrategy::new(["x"])
            .with_entity(EntityProfile::new("Acme Robotics"))
            .with_entity(EntityProfile::new("Robotics Institute").with_domain("www.Robo.EDU"));
        assert_eq!(strategy.priority_tokens(), vec!["acme", "robotics", "institute"]);
        assert_eq!(strategy.verified_domains(), vec!["robo.edu"]);
    }

    #[test]
    fn test_task_with_backend_copies() {
        let task = SearchTask {
            keyword: "acme".into(),
            backend: "bing".into(),
            priority: 7,
            options: TaskOptions {
                result_cap: 10,
                language: None,
                country: None,
                date_range: None,
            },
        };
        let retry = task.with_backend("google");
        assert_eq!(retry.backend, "google");
        assert_eq!(retry.keyword, task.keyword);
        assert_eq!(task.backend, "bing");
    }
}
