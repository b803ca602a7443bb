//! Data model shared across jobwatch crates.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// =============================================================================
// SEARCHES
// =============================================================================

/// Identity of a search definition, used as its seen-set partition key.
///
/// Rendered as `query` or `query:location`, trimmed and lowercased, so
/// `"Python Developer" / "Warszawa"` becomes `python developer:warszawa`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchKey(String);

impl SearchKey {
    /// Build the key for a query/location pair without validating it.
    pub fn from_parts(query: &str, location: Option<&str>) -> Self {
        let query = query.trim();
        let key = match location.map(str::trim).filter(|l| !l.is_empty()) {
            Some(location) => format!("{query}:{location}"),
            None => query.to_string(),
        };
        Self(key.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SearchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SearchKey {
    /// Parse a rendered key (`query[:location]`), normalizing case and whitespace.
    fn from(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((query, location)) => Self::from_parts(query, Some(location)),
            None => Self::from_parts(raw, None),
        }
    }
}

/// A registered (query, location) pair the monitor polls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDefinition {
    /// Position / keyword query, e.g. "DevOps Engineer".
    pub query: String,
    /// Optional location filter, e.g. "Warszawa". `None` means all locations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl SearchDefinition {
    /// Create a validated search definition.
    ///
    /// Both parts are trimmed; a blank location is treated as absent.
    pub fn new(query: impl AsRef<str>, location: Option<&str>) -> Result<Self> {
        let query = query.as_ref().trim();
        if query.is_empty() {
            return Err(Error::InvalidSearch("query must not be empty".into()));
        }
        if query.contains(':') {
            return Err(Error::InvalidSearch(format!(
                "query must not contain ':' (got {query:?})"
            )));
        }

        let location = location
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from);

        Ok(Self {
            query: query.to_string(),
            location,
        })
    }

    /// Seen-set partition key for this search.
    pub fn key(&self) -> SearchKey {
        SearchKey::from_parts(&self.query, self.location.as_deref())
    }
}

impl fmt::Display for SearchDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} in {}", self.query, location),
            None => f.write_str(&self.query),
        }
    }
}

// =============================================================================
// POSTINGS
// =============================================================================

/// A single job listing as returned by a fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// Stable, source-assigned identifier. Dedup correctness depends on it.
    pub id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    /// Seniority labels as reported by the source ("Mid", "Senior", ...).
    #[serde(default)]
    pub seniority: Vec<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary: Option<String>,
    /// Canonical offer URL.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl Posting {
    /// Create a posting with only the required fields set.
    pub fn new(id: impl Into<String>, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            company: String::new(),
            location: String::new(),
            seniority: Vec::new(),
            technologies: Vec::new(),
            salary: None,
            url: url.into(),
            published_at: None,
        }
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = company.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_seniority(mut self, levels: Vec<String>) -> Self {
        self.seniority = levels;
        self
    }

    /// Set technologies, dropping duplicates while keeping source order.
    pub fn with_technologies(mut self, technologies: Vec<String>) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(technologies.len());
        for tech in technologies {
            if !unique.contains(&tech) {
                unique.push(tech);
            }
        }
        self.technologies = unique;
        self
    }

    pub fn with_salary(mut self, salary: Option<String>) -> Self {
        self.salary = salary.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_published_at(mut self, published_at: Option<DateTime<Utc>>) -> Self {
        self.published_at = published_at;
        self
    }
}

// =============================================================================
// SEEN RECORDS
// =============================================================================

/// Persisted marker that a posting was already handled for a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenRecord {
    pub search: SearchKey,
    pub posting_id: String,
    /// When the posting was first marked, if the backend records it.
    pub first_seen: Option<DateTime<Utc>>,
}
