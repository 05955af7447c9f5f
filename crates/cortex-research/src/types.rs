use serde::{Deserialize, Serialize};
use std::fmt;

/// TTL class drives both the cache-bus TTL and the default freshness
/// window a job asks the fetcher for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtlClass {
    News,
    Pricing,
    Releases,
    Docs,
    General,
}

impl TtlClass {
    /// Cache-bus TTL in seconds per class. News/pricing move fast and expire
    /// soon; docs/general are cheaper to keep around.
    pub fn ttl_secs(&self) -> u64 {
        match self {
            TtlClass::News => 15 * 60,
            TtlClass::Pricing => 30 * 60,
            TtlClass::Releases => 60 * 60,
            TtlClass::Docs => 6 * 60 * 60,
            TtlClass::General => 3 * 60 * 60,
        }
    }

    /// TTL for a negative-cache entry (empty fetch result) — shorter than
    /// the positive TTL so a transient empty result doesn't stick.
    pub fn negative_ttl_secs(&self) -> u64 {
        (self.ttl_secs() / 4).max(60)
    }
}

impl fmt::Display for TtlClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TtlClass::News => "news",
            TtlClass::Pricing => "pricing",
            TtlClass::Releases => "releases",
            TtlClass::Docs => "docs",
            TtlClass::General => "general",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecencyHint {
    Day,
    Week,
    Month,
}

impl fmt::Display for RecencyHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecencyHint::Day => "day",
            RecencyHint::Week => "week",
            RecencyHint::Month => "month",
        };
        write!(f, "{s}")
    }
}

/// Derive the freshness window from query keywords:
/// `latest/today/now/breaking` -> day; `this week/recently` -> week; else month.
pub fn freshness_from_query(query: &str) -> RecencyHint {
    let lower = query.to_lowercase();
    const DAY_WORDS: &[&str] = &["latest", "today", "now", "breaking"];
    const WEEK_WORDS: &[&str] = &["this week", "recently"];
    if DAY_WORDS.iter().any(|w| lower.contains(w)) {
        RecencyHint::Day
    } else if WEEK_WORDS.iter().any(|w| lower.contains(w)) {
        RecencyHint::Week
    } else {
        RecencyHint::Month
    }
}

/// A research job enqueued after a topic-stability check crosses its
/// threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchJob {
    pub user_id: String,
    pub thread_id: String,
    pub topic: String,
    pub ttl_class: TtlClass,
    pub recency_hint: RecencyHint,
    pub batch_id: String,
}

/// A single search hit returned by a `ResearchFetcher`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub host: String,
    pub date: String,
    pub title: String,
    pub snippet: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Med,
}

/// A `{host, date}` pair only — URLs and snippets are intentionally
/// stripped before publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub host: String,
    pub date: String,
}

/// The bundle published to `capsule:{threadId}:{batchId}` on the cache bus.
/// Hard-capped at 4 KB serialized; `compose_capsule` enforces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchCapsule {
    pub batch_id: String,
    pub topic: String,
    pub ttl_class: TtlClass,
    pub recency_hint: RecencyHint,
    /// Each claim is ≤160 chars; at most 4.
    pub claims: Vec<String>,
    /// At most 4.
    pub sources: Vec<Source>,
    pub confidence: Confidence,
}

pub const MAX_CLAIMS: usize = 4;
pub const MAX_SOURCES: usize = 4;
pub const MAX_CLAIM_CHARS: usize = 160;
pub const MAX_CAPSULE_BYTES: usize = 4096;
