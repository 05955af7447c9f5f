use std::collections::HashSet;

use cortex_bus::SqliteBus;
use cortex_core::Tier;
use tracing::debug;

use crate::error::Result;
use crate::store::MemoryStore;
use crate::types::{ProfilePayload, UserProfile};

/// Profile cache TTL: the profile is a derived
/// view over TIER1/TIER2 memories, recomputed lazily and invalidated on
/// every write at those tiers rather than kept fresh on a timer.
const PROFILE_CACHE_TTL_SECS: u64 = 3600;

const STACK_KEYWORDS: &[&str] = &[
    "rust", "python", "typescript", "javascript", "go", "golang", "java", "kotlin", "swift",
    "c++", "postgres", "postgresql", "mysql", "sqlite", "redis", "kafka", "docker", "kubernetes",
    "aws", "gcp", "azure", "react", "vue", "svelte", "node", "django", "flask", "axum", "tokio",
];

const DOMAIN_KEYWORDS: &[&str] = &[
    "fintech", "healthcare", "gaming", "e-commerce", "ecommerce", "logistics", "education",
    "security", "infrastructure", "devops", "data engineering", "machine learning", "ml", "ai",
    "robotics", "embedded", "mobile", "backend", "frontend",
];

/// Invalidate the cached profile for a user. Called after any TIER1/TIER2
/// write (explicit save, supersede, or audit persistence at those tiers) so
/// the next `GET /v1/profile` recomputes instead of serving a stale view.
pub fn invalidate(bus: &SqliteBus, user_id: &str) -> Result<()> {
    bus.delete(&cortex_bus::keys::profile(user_id))?;
    Ok(())
}

/// Load the cached profile, or derive and cache one if absent.
pub fn load_or_derive(store: &MemoryStore, bus: &SqliteBus, user_id: &str) -> Result<UserProfile> {
    let cache_key = cortex_bus::keys::profile(user_id);
    if let Some(cached) = bus.get_json::<UserProfile>(&cache_key)? {
        return Ok(cached);
    }

    let profile = derive(store, user_id)?;
    bus.set_json(&cache_key, &profile, PROFILE_CACHE_TTL_SECS)?;
    debug!(user_id = %user_id, "profile derived and cached");
    Ok(profile)
}

/// Derive a profile from a user's TIER1/TIER2 memories.
/// Persisted in `user_profiles` too, so a cold bus cache still returns the
/// last-derived profile until the next invalidation forces a recompute.
pub fn derive(store: &MemoryStore, user_id: &str) -> Result<UserProfile> {
    let memories = store.list_for_user(user_id)?;
    let relevant: Vec<_> = memories
        .iter()
        .filter(|m| matches!(m.tier, Tier::Tier1 | Tier::Tier2))
        .collect();

    let mut stack_keywords = HashSet::new();
    let mut domain_keywords = HashSet::new();
    let mut technical_signals = 0usize;
    let mut personal_signals = 0usize;

    for m in &relevant {
        let lower = m.content.to_lowercase();
        for kw in STACK_KEYWORDS {
            if lower.contains(kw) {
                stack_keywords.insert(kw.to_string());
                technical_signals += 1;
            }
        }
        for kw in DOMAIN_KEYWORDS {
            if lower.contains(kw) {
                domain_keywords.insert(kw.to_string());
            }
        }
        if lower.contains("i work") || lower.contains("i'm a") || lower.contains("i am a") {
            technical_signals += 1;
        }
        if lower.contains("i prefer") || lower.contains("i like") || lower.contains("i enjoy") {
            personal_signals += 1;
        }
    }

    let expertise = if technical_signals >= 4 {
        "expert".to_string()
    } else if technical_signals >= 1 {
        "intermediate".to_string()
    } else {
        "beginner".to_string()
    };

    let communication_style = if personal_signals > technical_signals {
        "balanced".to_string()
    } else if technical_signals > 0 {
        "detailed".to_string()
    } else {
        "concise".to_string()
    };

    let payload = ProfilePayload {
        stack_keywords: stack_keywords.into_iter().collect(),
        domain_keywords: domain_keywords.into_iter().collect(),
        expertise,
        communication_style,
    };

    let profile = UserProfile {
        user_id: user_id.to_string(),
        payload,
        updated_at: chrono::Utc::now().timestamp_millis(),
    };
    store.save_profile(&profile)?;
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_stack_keywords_from_tier1_memories() {
        let store = MemoryStore::open_in_memory().unwrap();
        store
            .save_explicit("u1", "t1", "I work as a backend engineer using rust and postgres", None, None)
            .unwrap();
        let profile = derive(&store, "u1").unwrap();
        assert!(profile.payload.stack_keywords.contains(&"rust".to_string()));
        assert!(profile.payload.stack_keywords.contains(&"postgres".to_string()));
        assert_eq!(profile.payload.expertise, "intermediate");
    }

    #[test]
    fn empty_user_gets_beginner_profile() {
        let store = MemoryStore::open_in_memory().unwrap();
        let profile = derive(&store, "ghost").unwrap();
        assert_eq!(profile.payload.expertise, "beginner");
        assert!(profile.payload.stack_keywords.is_empty());
    }

    #[test]
    fn cache_hit_skips_rederivation() {
        let store = MemoryStore::open_in_memory().unwrap();
        let bus = SqliteBus::open_in_memory().unwrap();
        store
            .save_explicit("u1", "t1", "I work as a backend engineer using rust", None, None)
            .unwrap();
        let first = load_or_derive(&store, &bus, "u1").unwrap();
        store.delete(&first.user_id).ok();
        let second = load_or_derive(&store, &bus, "u1").unwrap();
        assert_eq!(first.updated_at, second.updated_at);
    }

    #[test]
    fn invalidate_forces_rederivation() {
        let store = MemoryStore::open_in_memory().unwrap();
        let bus = SqliteBus::open_in_memory().unwrap();
        store
            .save_explicit("u1", "t1", "I work as a backend engineer using rust", None, None)
            .unwrap();
        let first = load_or_derive(&store, &bus, "u1").unwrap();
        invalidate(&bus, "u1").unwrap();
        store
            .save_explicit("u1", "t1", "I also use kubernetes", None, None)
            .unwrap();
        let second = load_or_derive(&store, &bus, "u1").unwrap();
        assert!(second.payload.stack_keywords.contains(&"kubernetes".to_string()));
        assert_ne!(first.updated_at, second.updated_at);
    }
}
