//! Event catalog: the tracked conferences and the pages watched for each.
//!
//! The catalog is produced by the site's event loader as JSON, either an
//! object keyed by abbreviation or a plain array of records. Only the fields
//! the drift checker needs are read; everything else is ignored. A record
//! that does not parse (say, a mistyped date) is logged and left out so the
//! rest of the catalog still gets checked.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::NaiveDate;
use drift_store::PageRole;
use serde::Deserialize;

use crate::error::CatalogError;
use crate::obs;

/// A calendar date that may not be announced yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum MaybeDate {
    Tbd,
    Date(NaiveDate),
}

impl TryFrom<String> for MaybeDate {
    type Error = CatalogError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("tbd") {
            return Ok(MaybeDate::Tbd);
        }
        NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y/%m/%d"))
            .map(MaybeDate::Date)
            .map_err(|_| CatalogError::InvalidDate { value })
    }
}

/// Start and end of an event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventDates {
    pub start: MaybeDate,
    pub end: MaybeDate,
}

impl Default for EventDates {
    fn default() -> Self {
        EventDates {
            start: MaybeDate::Tbd,
            end: MaybeDate::Tbd,
        }
    }
}

/// A conference, workshop or symposium whose pages are watched for drift.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEvent {
    /// Short unique code, e.g. `pldi`
    pub abbreviation: String,
    /// Full name, used in reports
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub date: EventDates,
    /// Main conference page
    #[serde(default)]
    pub url: Option<String>,
    /// Page listing the important dates
    #[serde(default)]
    pub important_date_url: Option<String>,
}

impl TrackedEvent {
    /// Minimal constructor, mostly for tests and tooling.
    pub fn new(abbreviation: &str) -> Self {
        TrackedEvent {
            abbreviation: abbreviation.to_string(),
            name: String::new(),
            date: EventDates::default(),
            url: None,
            important_date_url: None,
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    pub fn with_important_date_url(mut self, url: &str) -> Self {
        self.important_date_url = Some(url.to_string());
        self
    }

    pub fn with_end(mut self, end: MaybeDate) -> Self {
        self.date.end = end;
        self
    }

    /// An event is active while its end date is unknown or not yet past.
    pub fn is_active(&self, today: NaiveDate) -> bool {
        match self.date.end {
            MaybeDate::Tbd => true,
            MaybeDate::Date(end) => end >= today,
        }
    }

    /// The watched URL for a page role, if the event has one.
    pub fn page_url(&self, role: PageRole) -> Option<&str> {
        match role {
            PageRole::Main => self.url.as_deref(),
            PageRole::ImportantDates => self.important_date_url.as_deref(),
        }
    }

    /// Display name, falling back to the abbreviation.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.abbreviation
        } else {
            &self.name
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCatalog {
    Keyed(BTreeMap<String, serde_json::Value>),
    List(Vec<serde_json::Value>),
}

/// All tracked events, ordered by abbreviation.
#[derive(Debug, Clone, Default)]
pub struct EventCatalog {
    events: Vec<TrackedEvent>,
    skipped: Vec<String>,
}

impl EventCatalog {
    /// Build a catalog, rejecting empty or duplicate abbreviations.
    pub fn from_events(mut events: Vec<TrackedEvent>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for event in &events {
            if event.abbreviation.trim().is_empty() {
                return Err(CatalogError::EmptyAbbreviation);
            }
            if !seen.insert(event.abbreviation.clone()) {
                return Err(CatalogError::DuplicateEvent(event.abbreviation.clone()));
            }
        }
        events.sort_by(|a, b| a.abbreviation.cmp(&b.abbreviation));
        Ok(EventCatalog {
            events,
            skipped: Vec::new(),
        })
    }

    /// Parse a catalog from JSON text.
    ///
    /// Malformed records are skipped and listed in [`EventCatalog::skipped`];
    /// only text that is not a catalog at all is an error.
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let records: Vec<(String, serde_json::Value)> = match serde_json::from_str(json)? {
            RawCatalog::Keyed(map) => map.into_iter().collect(),
            RawCatalog::List(list) => list
                .into_iter()
                .enumerate()
                .map(|(i, record)| (record_label(i, &record), record))
                .collect(),
        };

        let mut events = Vec::with_capacity(records.len());
        let mut skipped = Vec::new();
        for (label, record) in records {
            match serde_json::from_value::<TrackedEvent>(record) {
                Ok(event) => events.push(event),
                Err(err) => {
                    obs::emit_catalog_record_skipped(&label, &err);
                    skipped.push(label);
                }
            }
        }

        let mut catalog = Self::from_events(events)?;
        catalog.skipped = skipped;
        Ok(catalog)
    }

    /// Read and parse a catalog file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn events(&self) -> &[TrackedEvent] {
        &self.events
    }

    /// Records left out because they did not parse, by key or abbreviation.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn get(&self, abbreviation: &str) -> Option<&TrackedEvent> {
        self.events
            .binary_search_by(|e| e.abbreviation.as_str().cmp(abbreviation))
            .ok()
            .map(|i| &self.events[i])
    }

    /// Events still worth watching on `today`.
    pub fn active(&self, today: NaiveDate) -> impl Iterator<Item = &TrackedEvent> {
        self.events.iter().filter(move |e| e.is_active(today))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// How to name a list record in logs: its abbreviation if readable,
/// otherwise its position.
fn record_label(index: usize, record: &serde_json::Value) -> String {
    record
        .get("abbreviation")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("#{index}"))
}
