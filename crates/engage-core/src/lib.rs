//! Core domain model, time-preference resolution, and volunteer matching for Engage.

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "engage-core";

/// Time-of-day bucket a member can serve in, or a need can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeBucket {
    Mornings,
    Afternoons,
    Nights,
    Anytime,
}

impl TimeBucket {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeBucket::Mornings => "Mornings",
            TimeBucket::Afternoons => "Afternoons",
            TimeBucket::Nights => "Nights",
            TimeBucket::Anytime => "Anytime",
        }
    }

    /// Parse a survey label. Unknown labels yield `None`; callers drop them.
    pub fn parse_label(label: &str) -> Option<Self> {
        let trimmed = label.trim();
        if trimmed.eq_ignore_ascii_case("mornings") {
            Some(TimeBucket::Mornings)
        } else if trimmed.eq_ignore_ascii_case("afternoons") {
            Some(TimeBucket::Afternoons)
        } else if trimmed.eq_ignore_ascii_case("nights") {
            Some(TimeBucket::Nights)
        } else if trimmed.eq_ignore_ascii_case("anytime") {
            Some(TimeBucket::Anytime)
        } else {
            None
        }
    }

    /// Bucket a local wall-clock hour: [5,12) mornings, [12,17) afternoons, else nights.
    pub fn for_hour(hour: u32) -> Self {
        if (5..12).contains(&hour) {
            TimeBucket::Mornings
        } else if (12..17).contains(&hour) {
            TimeBucket::Afternoons
        } else {
            TimeBucket::Nights
        }
    }
}

/// How urgently a need wants to be filled. Influences which time-preference
/// resolution branch applies, never the match score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Asap,
    Ongoing,
    #[default]
    Normal,
}

/// A volunteer profile as read from the member directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub display_name: Option<String>,
    pub contact: Option<String>,
    /// Free-text gift tags the member self-selected during onboarding.
    pub gift_tags: Vec<String>,
    /// Parsed availability windows. Malformed source data degrades to empty.
    pub availability: Vec<TimeBucket>,
}

/// A volunteer opportunity with its scheduling fields still unresolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeedRequest {
    pub id: String,
    pub title: String,
    pub description: String,
    pub required_tags: Vec<String>,
    pub urgency: Urgency,
    pub explicit_time_preference: Option<TimeBucket>,
    /// Local wall-clock timestamp for a single fixed occurrence.
    pub scheduled_at: Option<NaiveDateTime>,
    pub is_recurring: bool,
    /// Raw `HH:MM` start for recurring needs; parsed lazily so malformed
    /// values fall through the resolution cascade instead of erroring.
    pub recurring_start_time: Option<String>,
    /// Legacy free text that may embed an "Ongoing Schedule: ... at HH:MM" hint.
    pub schedule_hint: Option<String>,
}

/// A need plus its derived effective time preference. The matcher only
/// accepts resolved needs; resolution happens exactly once per invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedNeed {
    pub need: NeedRequest,
    pub effective_preference: TimeBucket,
}

impl ResolvedNeed {
    pub fn resolve(need: NeedRequest) -> Self {
        let effective_preference = resolve_effective_time_preference(&need);
        Self {
            need,
            effective_preference,
        }
    }
}

/// One ranked candidate/need pairing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub candidate: Candidate,
    pub gift_overlap_count: usize,
    /// The candidate tags that matched, case preserved for display.
    pub matching_tags: Vec<String>,
    /// 3 perfect, 2 flexible candidate, 1 flexible need, 0 incompatible.
    pub availability_score: u32,
    /// Hard inclusion filter; true exactly when the score is at least 1.
    pub availability_compatible: bool,
    pub total_score: u32,
}

/// Derive the single effective time bucket for a need.
///
/// Precedence, first applicable rule wins:
/// 1. asap urgency trusts the manual preference verbatim (default Anytime);
/// 2. a fixed occurrence buckets its local hour;
/// 3. a recurring start time buckets its parsed `HH:MM` hour;
/// 4. a legacy "Ongoing Schedule:" hint buckets its "at HH:MM" token;
/// 5. the manual preference if set, else Anytime.
///
/// Parse failures never raise; resolution falls through to the next rule.
pub fn resolve_effective_time_preference(need: &NeedRequest) -> TimeBucket {
    if need.urgency == Urgency::Asap {
        return need.explicit_time_preference.unwrap_or(TimeBucket::Anytime);
    }

    if let Some(at) = need.scheduled_at {
        return TimeBucket::for_hour(at.hour());
    }

    if need.is_recurring {
        if let Some(hour) = need
            .recurring_start_time
            .as_deref()
            .and_then(parse_hhmm_hour)
        {
            return TimeBucket::for_hour(hour);
        }
    }

    if let Some(hour) = need
        .schedule_hint
        .as_deref()
        .and_then(ongoing_schedule_hint_hour)
    {
        return TimeBucket::for_hour(hour);
    }

    need.explicit_time_preference.unwrap_or(TimeBucket::Anytime)
}

/// Rank a candidate pool against one resolved need.
///
/// Scores every candidate independently, keeps only those with gift overlap
/// and compatible availability, sorts by total score descending (stable on
/// input order for ties), and returns at most `max_results` entries.
pub fn find_matches(
    candidates: &[Candidate],
    need: &ResolvedNeed,
    max_results: usize,
) -> Vec<MatchResult> {
    let mut matches: Vec<MatchResult> = candidates
        .iter()
        .map(|candidate| score_candidate(candidate, need))
        .filter(|result| result.gift_overlap_count > 0 && result.availability_compatible)
        .collect();
    matches.sort_by(|a, b| b.total_score.cmp(&a.total_score));
    matches.truncate(max_results);
    matches
}

fn score_candidate(candidate: &Candidate, need: &ResolvedNeed) -> MatchResult {
    let matching_tags: Vec<String> = candidate
        .gift_tags
        .iter()
        .filter(|tag| {
            need.need
                .required_tags
                .iter()
                .any(|required| tags_overlap(tag, required))
        })
        .cloned()
        .collect();
    let gift_overlap_count = matching_tags.len();

    let availability_score =
        availability_score(&candidate.availability, need.effective_preference);
    let availability_compatible =
        availability_compatible(&candidate.availability, need.effective_preference);

    MatchResult {
        candidate: candidate.clone(),
        gift_overlap_count,
        matching_tags,
        availability_score,
        availability_compatible,
        total_score: gift_overlap_count as u32 * 2 + availability_score,
    }
}

/// Permissive free-text tag comparison: lower-cased substring containment in
/// either direction, so "Cooking" overlaps "Meal Prep/Cooking".
fn tags_overlap(candidate_tag: &str, required_tag: &str) -> bool {
    let candidate_tag = candidate_tag.to_lowercase();
    let required_tag = required_tag.to_lowercase();
    candidate_tag.contains(&required_tag) || required_tag.contains(&candidate_tag)
}

/// Ordered cascade; the first matching condition fixes the score.
fn availability_score(windows: &[TimeBucket], preference: TimeBucket) -> u32 {
    if windows.contains(&preference) {
        3
    } else if windows.contains(&TimeBucket::Anytime) {
        2
    } else if preference == TimeBucket::Anytime {
        1
    } else {
        0
    }
}

fn availability_compatible(windows: &[TimeBucket], preference: TimeBucket) -> bool {
    windows.contains(&preference)
        || windows.contains(&TimeBucket::Anytime)
        || preference == TimeBucket::Anytime
}

/// Parse `HH:MM` into the hour component. Anything non-conforming is `None`.
fn parse_hhmm_hour(value: &str) -> Option<u32> {
    let (hh, mm) = value.trim().split_once(':')?;
    let hour: u32 = hh.parse().ok()?;
    let minute: u32 = mm.parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some(hour)
}

/// Extract the hour from an "at HH:MM" token following an
/// "Ongoing Schedule:" marker in legacy description text.
fn ongoing_schedule_hint_hour(hint: &str) -> Option<u32> {
    let (_, tail) = hint.split_once("Ongoing Schedule:")?;
    let tokens: Vec<&str> = tail.split_whitespace().collect();
    tokens.windows(2).find_map(|pair| {
        if pair[0].eq_ignore_ascii_case("at") {
            parse_hhmm_hour(pair[1].trim_matches(|c: char| !c.is_ascii_digit() && c != ':'))
        } else {
            None
        }
    })
}
