//! The Memory Actor: per-session conversation history (distinct from the
//! Context Store's authoritative session state — this is the orchestrator's
//! own rolling memory of what happened) and a cross-session cache of
//! successful plans ("skills") retrievable by similarity to a new query.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use qorch_core::model::{ConversationMessage, Skill};
use serde_json::Value;
use uuid::Uuid;

/// A session's rolling conversation record, bounded to `max_session_history`
/// entries.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub history: Vec<ConversationMessage>,
    pub metadata: HashMap<String, Value>,
}

impl SessionRecord {
    fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            created_at: now,
            updated_at: now,
            history: Vec::new(),
            metadata: HashMap::new(),
        }
    }
}

pub struct MemoryActor {
    sessions: DashMap<String, SessionRecord>,
    skills: RwLock<Vec<Skill>>,
    max_session_history: usize,
    max_skills: usize,
}

impl MemoryActor {
    #[must_use]
    pub fn new(max_session_history: usize, max_skills: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            skills: RwLock::new(Vec::new()),
            max_session_history,
            max_skills,
        }
    }

    /// Appends `message` to the session's history, creating the session
    /// record if it doesn't exist yet, and truncates to
    /// `max_session_history` entries (dropping the oldest).
    pub fn store_session(&self, session_id: &str, message: ConversationMessage) {
        let mut entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionRecord::new(session_id));
        entry.history.push(message);
        let overflow = entry.history.len().saturating_sub(self.max_session_history);
        if overflow > 0 {
            entry.history.drain(0..overflow);
        }
        entry.updated_at = Utc::now();
    }

    #[must_use]
    pub fn get_session(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions.get(session_id).map(|r| r.clone())
    }

    /// Appends `skill` to the skill cache; if the cache then exceeds
    /// `max_skills`, evicts the lowest-`success_count` entries until it
    /// fits.
    pub fn record_skill(&self, skill: Skill) {
        let mut skills = self.skills.write();
        skills.push(skill);
        if skills.len() > self.max_skills {
            skills.sort_by_key(|s| s.success_count);
            let overflow = skills.len() - self.max_skills;
            skills.drain(0..overflow);
        }
    }

    /// Scores every cached skill against `query` (+2 if the query appears in
    /// the skill name, +1 per trigger pattern that substring-matches the
    /// query in either direction, case-insensitively) and returns the
    /// top-`limit` skills with a positive score, best first.
    #[must_use]
    pub fn find_similar_skills(&self, query: &str, limit: usize) -> Vec<Skill> {
        let query_lower = query.to_lowercase();
        let skills = self.skills.read();

        let mut scored: Vec<(i64, Skill)> = skills
            .iter()
            .map(|skill| {
                let mut score: i64 = 0;
                if skill.name.to_lowercase().contains(&query_lower) {
                    score += 2;
                }
                for pattern in &skill.trigger_patterns {
                    let pattern_lower = pattern.to_lowercase();
                    if query_lower.contains(&pattern_lower) || pattern_lower.contains(&query_lower) {
                        score += 1;
                    }
                }
                (score, skill.clone())
            })
            .filter(|(score, _)| *score > 0)
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.truncate(limit);
        scored.into_iter().map(|(_, skill)| skill).collect()
    }

    /// Increments the success or failure counter for the skill with id
    /// `id` and touches `last_used`. A no-op if no such skill is cached.
    pub fn update_skill_stats(&self, id: Uuid, success: bool) {
        let mut skills = self.skills.write();
        if let Some(skill) = skills.iter_mut().find(|s| s.id == id) {
            if success {
                skill.success_count += 1;
            } else {
                skill.failure_count += 1;
            }
            skill.last_used = Utc::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    #[test]
    fn store_session_truncates_to_max_history() {
        let memory = MemoryActor::new(2, 10);
        for i in 0..5 {
            memory.store_session("s1", ConversationMessage::new("user", format!("m{i}")));
        }
        let session = memory.get_session("s1").unwrap();
        assert_eq!(session.history.len(), 2);
        assert_eq!(session.history[0].content, "m3");
        assert_eq!(session.history[1].content, "m4");
    }

    #[test]
    fn get_session_returns_none_for_unknown_session() {
        let memory = MemoryActor::new(10, 10);
        assert!(memory.get_session("missing").is_none());
    }

    #[test]
    fn record_skill_evicts_lowest_success_count_when_over_capacity() {
        let memory = MemoryActor::new(10, 2);
        let mut low = Skill::new("low", vec![], StdHashMap::new());
        low.success_count = 1;
        let mut mid = Skill::new("mid", vec![], StdHashMap::new());
        mid.success_count = 5;
        let mut high = Skill::new("high", vec![], StdHashMap::new());
        high.success_count = 10;

        memory.record_skill(low);
        memory.record_skill(mid);
        memory.record_skill(high);

        let remaining = memory.find_similar_skills("mid", 10);
        assert!(remaining.iter().any(|s| s.name == "mid"));
        let remaining_all = memory.find_similar_skills("high", 10);
        assert!(remaining_all.iter().any(|s| s.name == "high"));
        assert!(memory.find_similar_skills("low", 10).is_empty());
    }

    #[test]
    fn find_similar_skills_scores_name_and_trigger_matches() {
        let memory = MemoryActor::new(10, 10);
        memory.record_skill(Skill::new(
            "deploy service",
            vec!["deploy".to_string(), "release".to_string()],
            StdHashMap::new(),
        ));
        memory.record_skill(Skill::new("unrelated", vec![], StdHashMap::new()));

        let results = memory.find_similar_skills("please deploy the app", 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "deploy service");
    }

    #[test]
    fn update_skill_stats_increments_counters_and_touches_last_used() {
        let memory = MemoryActor::new(10, 10);
        let skill = Skill::new("s", vec![], StdHashMap::new());
        let id = skill.id;
        let created_last_used = skill.last_used;
        memory.record_skill(skill);

        memory.update_skill_stats(id, true);
        memory.update_skill_stats(id, false);

        let skills = memory.find_similar_skills("s", 10);
        let updated = &skills[0];
        assert_eq!(updated.success_count, 1);
        assert_eq!(updated.failure_count, 1);
        assert!(updated.last_used >= created_last_used);
    }
}
