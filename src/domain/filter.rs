// Filter set domain model - date range plus categorical constraints
use super::recovery::IssueCategory;
use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("start date {start} is after end date {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },
    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("unknown period '{0}'")]
    UnknownPeriod(String),
    #[error("unknown issue type '{0}'")]
    UnknownIssueType(String),
}

/// Inclusive date range. Construction guarantees `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, FilterError> {
        if start > end {
            return Err(FilterError::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, FilterError> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of calendar days covered, both ends included
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, FilterError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| FilterError::InvalidDate(raw.to_string()))
}

/// Preset periods offered in the sidebar, relative to "today"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Last30Days,
    Last60Days,
    Last90Days,
    YearToDate,
}

impl Period {
    pub const ALL: [Period; 4] = [
        Period::Last30Days,
        Period::Last60Days,
        Period::Last90Days,
        Period::YearToDate,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            Period::Last30Days => "last_30_days",
            Period::Last60Days => "last_60_days",
            Period::Last90Days => "last_90_days",
            Period::YearToDate => "year_to_date",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Period::Last30Days => "Last 30 Days",
            Period::Last60Days => "Last 60 Days",
            Period::Last90Days => "Last 90 Days",
            Period::YearToDate => "Year to Date",
        }
    }

    pub fn range(self, today: NaiveDate) -> DateRange {
        let start = match self {
            Period::Last30Days => today - Duration::days(30),
            Period::Last60Days => today - Duration::days(60),
            Period::Last90Days => today - Duration::days(90),
            Period::YearToDate => NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today),
        };
        DateRange { start, end: today }
    }
}

impl FromStr for Period {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Period::ALL
            .into_iter()
            .find(|p| p.slug().eq_ignore_ascii_case(wanted) || p.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| FilterError::UnknownPeriod(s.to_string()))
    }
}

/// Viewer-selected constraints applied to every query on a page.
/// Empty platform, chain or issue lists mean "no filter".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FilterSet {
    pub range: DateRange,
    pub platforms: Vec<String>,
    pub chains: Vec<String>,
    pub issue_categories: Vec<IssueCategory>,
}

impl FilterSet {
    pub fn new(range: DateRange) -> Self {
        Self {
            range,
            platforms: Vec::new(),
            chains: Vec::new(),
            issue_categories: Vec::new(),
        }
    }

    /// Any blank entry is dropped; "all" anywhere in the list clears the filter.
    pub fn with_platforms<I, S>(mut self, platforms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.platforms = normalize_names(platforms);
        self
    }

    /// Same normalisation as platforms
    pub fn with_chains<I, S>(mut self, chains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.chains = normalize_names(chains);
        self
    }

    pub fn with_issue_categories<I>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = IssueCategory>,
    {
        let mut selected: Vec<IssueCategory> = categories.into_iter().collect();
        selected.sort();
        selected.dedup();
        // Selecting every category is the same as not filtering
        if selected.len() == IssueCategory::ALL.len() {
            selected.clear();
        }
        self.issue_categories = selected;
        self
    }

    pub fn all_platforms(&self) -> bool {
        self.platforms.is_empty()
    }

    pub fn all_chains(&self) -> bool {
        self.chains.is_empty()
    }

    pub fn all_issue_categories(&self) -> bool {
        self.issue_categories.is_empty()
    }
}

fn normalize_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut selected = Vec::new();
    for raw in names {
        let name = raw.as_ref().trim();
        if name.is_empty() {
            continue;
        }
        if is_all_marker(name) {
            return Vec::new();
        }
        selected.push(name.to_string());
    }
    selected.sort();
    selected.dedup();
    selected
}

pub fn is_all_marker(value: &str) -> bool {
    let lowered = value.trim().to_ascii_lowercase();
    matches!(lowered.as_str(), "all" | "all platforms" | "all chains" | "all issues")
}
