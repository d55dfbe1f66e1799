//! Hosted-store record contracts + fixture-first directory adapters.
//!
//! Directory rows arrive loosely shaped: gift tags may be a native list, a
//! JSON-encoded list string, or a comma-separated string; availability is a
//! serialized list of bucket labels. Everything here normalizes into the
//! strict `engage-core` model and degrades to empty on malformed input.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use engage_core::{Candidate, NeedRequest, TimeBucket, Urgency};
use engage_store::BackendFetcher;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

pub const CRATE_NAME: &str = "engage-adapters";

/// How an organization's directory rows reach us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectoryAccess {
    HostedApi,
    Fixture,
    ManualExport,
}

/// A member-directory row as the hosted store returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawProfileRecord {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub gift_tags: JsonValue,
    #[serde(default)]
    pub availability: JsonValue,
}

/// A need row as the hosted store returns it. The description doubles as the
/// legacy schedule-hint carrier for needs created before structured
/// scheduling existed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawNeedRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required_tags: JsonValue,
    #[serde(default)]
    pub urgency: Option<String>,
    #[serde(default)]
    pub time_preference: Option<String>,
    #[serde(default)]
    pub scheduled_at: Option<String>,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub recurring_start_time: Option<String>,
}

/// One organization's directory read: profiles + open needs, with provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgBundle {
    pub org_id: String,
    pub captured_from_url: String,
    pub fetched_at: DateTime<Utc>,
    pub profiles: Vec<RawProfileRecord>,
    pub needs: Vec<RawNeedRecord>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Normalized output of a directory parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    pub candidates: Vec<Candidate>,
    pub needs: Vec<NeedRequest>,
}

#[derive(Debug, Clone, Copy)]
pub struct DirectoryContext {
    pub run_id: Uuid,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Per-organization directory access. Fixture-backed implementations return
/// `None` from the fetch and parse pre-captured bundles instead.
#[async_trait]
pub trait OrgDirectory: Send + Sync {
    fn org_id(&self) -> &'static str;
    fn access(&self) -> DirectoryAccess;

    async fn fetch_bundle(
        &self,
        _http: &BackendFetcher,
        _ctx: &DirectoryContext,
    ) -> Result<Option<OrgBundle>, AdapterError>;

    fn parse_bundle(&self, bundle: &OrgBundle) -> Result<DirectorySnapshot, AdapterError>;
}

pub fn load_org_bundle(path: impl AsRef<Path>) -> Result<OrgBundle> {
    read_json_file(path)
}

fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

/// Coerce a loosely shaped store field into a list of strings.
///
/// Accepts a native JSON list, a JSON-encoded list string, or a
/// comma-separated string; anything else yields an empty list.
pub fn string_list_value(value: &JsonValue) -> Vec<String> {
    match value {
        JsonValue::Array(items) => collect_strings(items),
        JsonValue::String(text) => {
            if let Ok(JsonValue::Array(items)) = serde_json::from_str::<JsonValue>(text) {
                return collect_strings(&items);
            }
            text.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect()
        }
        _ => Vec::new(),
    }
}

fn collect_strings(items: &[JsonValue]) -> Vec<String> {
    items
        .iter()
        .filter_map(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Parse availability labels, dropping anything outside the bucket vocabulary.
pub fn availability_value(value: &JsonValue) -> Vec<TimeBucket> {
    string_list_value(value)
        .iter()
        .filter_map(|label| TimeBucket::parse_label(label))
        .collect()
}

pub fn urgency_value(value: Option<&str>) -> Urgency {
    match value {
        Some(v) if v.eq_ignore_ascii_case("asap") => Urgency::Asap,
        Some(v) if v.eq_ignore_ascii_case("ongoing") => Urgency::Ongoing,
        _ => Urgency::Normal,
    }
}

/// Parse a store timestamp into local wall-clock time. Offsets are stripped;
/// malformed values yield `None` so resolution can fall through.
pub fn local_timestamp_value(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_local());
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M"))
        .ok()
}

pub fn candidate_from_record(record: &RawProfileRecord) -> Candidate {
    Candidate {
        id: record.id.clone(),
        display_name: record
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string),
        contact: record
            .email
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string),
        gift_tags: string_list_value(&record.gift_tags),
        availability: availability_value(&record.availability),
    }
}

pub fn need_from_record(record: &RawNeedRecord) -> NeedRequest {
    NeedRequest {
        id: record.id.clone(),
        title: record.title.clone(),
        description: record.description.clone(),
        required_tags: string_list_value(&record.required_tags),
        urgency: urgency_value(record.urgency.as_deref()),
        explicit_time_preference: record
            .time_preference
            .as_deref()
            .and_then(TimeBucket::parse_label),
        scheduled_at: record
            .scheduled_at
            .as_deref()
            .and_then(local_timestamp_value),
        is_recurring: record.is_recurring,
        recurring_start_time: record.recurring_start_time.clone(),
        schedule_hint: if record.description.trim().is_empty() {
            None
        } else {
            Some(record.description.clone())
        },
    }
}

#[derive(Debug, Clone, Copy)]
struct FixtureDirectory {
    org_id: &'static str,
    access: DirectoryAccess,
}

#[async_trait]
impl OrgDirectory for FixtureDirectory {
    fn org_id(&self) -> &'static str {
        self.org_id
    }

    fn access(&self) -> DirectoryAccess {
        self.access
    }

    async fn fetch_bundle(
        &self,
        _http: &BackendFetcher,
        _ctx: &DirectoryContext,
    ) -> Result<Option<OrgBundle>, AdapterError> {
        Ok(None)
    }

    fn parse_bundle(&self, bundle: &OrgBundle) -> Result<DirectorySnapshot, AdapterError> {
        if bundle.org_id != self.org_id {
            return Err(AdapterError::Message(format!(
                "bundle org_id={} does not match directory org_id={}",
                bundle.org_id, self.org_id
            )));
        }
        Ok(DirectorySnapshot {
            candidates: bundle.profiles.iter().map(candidate_from_record).collect(),
            needs: bundle.needs.iter().map(need_from_record).collect(),
        })
    }
}

pub fn grace_community_directory() -> impl OrgDirectory {
    FixtureDirectory {
        org_id: "grace-community",
        access: DirectoryAccess::Fixture,
    }
}

pub fn riverside_chapel_directory() -> impl OrgDirectory {
    FixtureDirectory {
        org_id: "riverside-chapel",
        access: DirectoryAccess::ManualExport,
    }
}

pub fn directory_for_org(org_id: &str) -> Option<Box<dyn OrgDirectory>> {
    match org_id {
        "grace-community" => Some(Box::new(FixtureDirectory {
            org_id: "grace-community",
            access: DirectoryAccess::Fixture,
        })),
        "riverside-chapel" => Some(Box::new(FixtureDirectory {
            org_id: "riverside-chapel",
            access: DirectoryAccess::ManualExport,
        })),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn native_list_passes_through() {
        let value = json!(["Cooking", " Teaching ", ""]);
        assert_eq!(string_list_value(&value), vec!["Cooking", "Teaching"]);
    }

    #[test]
    fn json_encoded_list_string_is_unwrapped() {
        let value = json!("[\"Music\", \"Hospitality\"]");
        assert_eq!(string_list_value(&value), vec!["Music", "Hospitality"]);
    }

    #[test]
    fn comma_separated_string_is_the_last_resort() {
        let value = json!("Prayer, Encouragement");
        assert_eq!(string_list_value(&value), vec!["Prayer", "Encouragement"]);
    }

    #[test]
    fn malformed_list_fields_degrade_to_empty() {
        assert!(string_list_value(&json!(42)).is_empty());
        assert!(string_list_value(&json!(null)).is_empty());
        assert!(string_list_value(&json!({"not": "a list"})).is_empty());
        assert!(string_list_value(&json!([1, 2, 3])).is_empty());
    }

    #[test]
    fn availability_drops_unknown_labels() {
        let value = json!("[\"Mornings\", \"Weekends\", \"anytime\"]");
        assert_eq!(
            availability_value(&value),
            vec![TimeBucket::Mornings, TimeBucket::Anytime]
        );
    }

    #[test]
    fn urgency_classifier_is_case_insensitive() {
        assert_eq!(urgency_value(Some("ASAP")), Urgency::Asap);
        assert_eq!(urgency_value(Some("ongoing")), Urgency::Ongoing);
        assert_eq!(urgency_value(Some("whenever")), Urgency::Normal);
        assert_eq!(urgency_value(None), Urgency::Normal);
    }

    #[test]
    fn timestamps_parse_with_and_without_offsets() {
        let naive = local_timestamp_value("2026-03-08T09:30:00").expect("naive");
        assert_eq!(naive.format("%H:%M").to_string(), "09:30");

        let offset = local_timestamp_value("2026-03-08T09:30:00-05:00").expect("offset");
        assert_eq!(offset.format("%H:%M").to_string(), "09:30");

        let spaced = local_timestamp_value("2026-03-08 14:00").expect("spaced");
        assert_eq!(spaced.format("%H:%M").to_string(), "14:00");

        assert!(local_timestamp_value("next tuesday").is_none());
    }

    #[test]
    fn profile_record_normalizes_defensively() {
        let record = RawProfileRecord {
            id: "p-9".into(),
            display_name: Some("  ".into()),
            email: Some("p9@example.org".into()),
            gift_tags: json!("Cooking, Meal Prep/Cooking"),
            availability: json!(42),
        };
        let candidate = candidate_from_record(&record);
        assert_eq!(candidate.display_name, None);
        assert_eq!(candidate.contact.as_deref(), Some("p9@example.org"));
        assert_eq!(candidate.gift_tags, vec!["Cooking", "Meal Prep/Cooking"]);
        assert!(candidate.availability.is_empty());
    }

    #[test]
    fn need_record_carries_description_as_schedule_hint() {
        let record = RawNeedRecord {
            id: "n-9".into(),
            title: "Greeter".into(),
            description: "Ongoing Schedule: Sundays at 08:30".into(),
            required_tags: json!(["hospitality"]),
            urgency: None,
            time_preference: None,
            scheduled_at: None,
            is_recurring: false,
            recurring_start_time: None,
        };
        let need = need_from_record(&record);
        assert_eq!(
            need.schedule_hint.as_deref(),
            Some("Ongoing Schedule: Sundays at 08:30")
        );
        assert_eq!(
            engage_core::resolve_effective_time_preference(&need),
            TimeBucket::Mornings
        );
    }

    #[test]
    fn parse_bundle_rejects_mismatched_org() {
        let directory = grace_community_directory();
        let bundle = OrgBundle {
            org_id: "riverside-chapel".into(),
            captured_from_url: "https://example.org".into(),
            fetched_at: Utc::now(),
            profiles: vec![],
            needs: vec![],
            notes: None,
        };
        assert!(directory.parse_bundle(&bundle).is_err());
    }
}
