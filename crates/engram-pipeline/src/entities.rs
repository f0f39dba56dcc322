//! Rule-based typed entity extraction.
//!
//! Recognizes the FILE / FUNCTION / BUG / FEATURE / TOOL / ERROR / DECISION
//! vocabulary from chunk text and canonicalizes every mention before
//! emission, so `(type, canonical_form)` identity holds. The recognizer is
//! deliberately simple pattern matching; the output schema is the contract,
//! and a smarter recognizer could be slotted in behind the same signature.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use engram_types::{Entity, EntityType, Memory};

use crate::artifacts;

const MAX_PHRASE_LEN: usize = 80;

fn function_def_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:fn|def|function)\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap()
    })
}

fn function_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`?\b([a-z_][a-z0-9_]{2,})\(\)`?").unwrap())
}

fn error_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b([A-Z][A-Za-z0-9]*(?:Error|Exception))\b").unwrap()
    })
}

fn bug_phrase_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:bug|issue|problem|regression)\s+(?:in|with)\s+([\w./\-`]+)").unwrap()
    })
}

fn feature_phrase_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:implemented|added|built|introduced)\s+([a-z0-9][a-z0-9 _\-]{4,60}?)(?:[.,;:]|$)")
            .unwrap()
    })
}

fn decision_phrase_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:decided to|chose|will use|going with|opted for)\s+([a-z0-9][a-z0-9 _\-./]{2,80}?)(?:[.,;:]|$)")
            .unwrap()
    })
}

fn backtick_tool_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`([a-z][a-z0-9_-]{2,30})`").unwrap())
}

/// Well-known tools matched bare, without backticks.
const KNOWN_TOOLS: &[&str] = &[
    "cargo", "git", "npm", "pnpm", "yarn", "pytest", "docker", "kubectl", "sqlite", "postgres",
    "redis", "jwt", "grep", "make", "bash", "curl", "webpack", "vite", "eslint", "clippy",
];

/// Extract all typed entities from a text, deduplicated by identity key.
pub fn extract(text: &str) -> Vec<Entity> {
    let mut seen: HashSet<(EntityType, String)> = HashSet::new();
    let mut entities = Vec::new();
    let mut push = |entity: Entity| {
        let key = (entity.entity_type, entity.canonical_form.clone());
        if !entity.canonical_form.is_empty() && seen.insert(key) {
            entities.push(entity);
        }
    };

    // FILE: reuse the artifact extractor's path recognition so graph and
    // artifacts agree on normalization.
    for path in artifacts::extract_file_paths(text) {
        push(Entity::new(EntityType::File, path));
    }

    // FUNCTION: definitions and call-sites.
    for cap in function_def_re().captures_iter(text) {
        push(Entity::new(EntityType::Function, &cap[1]));
    }
    for cap in function_call_re().captures_iter(text) {
        push(Entity::new(EntityType::Function, &cap[1]));
    }

    // ERROR: exception/error class names.
    for cap in error_name_re().captures_iter(text) {
        push(Entity::new(EntityType::Error, &cap[1]));
    }

    // BUG: "bug in X" style phrases.
    for cap in bug_phrase_re().captures_iter(text) {
        let target = cap[1].trim_matches('`');
        push(Entity::new(
            EntityType::Bug,
            clip(&format!("bug in {target}")),
        ));
    }

    // FEATURE: "implemented/added/built X".
    for cap in feature_phrase_re().captures_iter(text) {
        push(Entity::new(EntityType::Feature, clip(cap[1].trim())));
    }

    // DECISION: "decided to / chose / will use X".
    for cap in decision_phrase_re().captures_iter(text) {
        push(Entity::new(EntityType::Decision, clip(cap[1].trim())));
    }

    // TOOL: backticked package names and well-known bare names.
    for cap in backtick_tool_re().captures_iter(text) {
        let name = &cap[1];
        // Skip things already recognized as files or calls.
        if !name.contains('.') && !name.ends_with("()") {
            push(Entity::new(EntityType::Tool, name));
        }
    }
    let lower = text.to_lowercase();
    for tool in KNOWN_TOOLS {
        if word_present(&lower, tool) {
            push(Entity::new(EntityType::Tool, *tool));
        }
    }

    entities
}

/// Extract entities for a stored memory: its text plus its artifact files
/// (already normalized), so the graph sees every file the memory touched.
pub fn extract_from_memory(memory: &Memory) -> Vec<Entity> {
    let text = format!("{} {} {}", memory.intent, memory.action, memory.outcome);
    let mut entities = extract(&text);
    let mut seen: HashSet<(EntityType, String)> = entities
        .iter()
        .map(|e| (e.entity_type, e.canonical_form.clone()))
        .collect();
    for file in &memory.artifacts.files {
        let entity = Entity::new(EntityType::File, file.clone());
        if seen.insert((entity.entity_type, entity.canonical_form.clone())) {
            entities.push(entity);
        }
    }
    entities
}

fn clip(s: &str) -> String {
    if s.chars().count() > MAX_PHRASE_LEN {
        s.chars().take(MAX_PHRASE_LEN).collect()
    } else {
        s.to_string()
    }
}

/// Whole-word containment check without building a regex per tool.
fn word_present(haystack: &str, word: &str) -> bool {
    haystack.match_indices(word).any(|(i, _)| {
        let before_ok = i == 0
            || !haystack[..i]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric() || c == '_');
        let after = i + word.len();
        let after_ok = after >= haystack.len()
            || !haystack[after..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '.');
        before_ok && after_ok
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(entities: &[Entity], t: EntityType) -> Vec<&str> {
        entities
            .iter()
            .filter(|e| e.entity_type == t)
            .map(|e| e.canonical_form.as_str())
            .collect()
    }

    #[test]
    fn test_file_entities() {
        let entities = extract("modified src/Auth.py and tests\\test_auth.py");
        let files = kinds(&entities, EntityType::File);
        assert!(files.contains(&"src/auth.py"));
        assert!(files.contains(&"tests/test_auth.py"));
    }

    #[test]
    fn test_function_entities() {
        let entities = extract("added fn validate_token and called refresh_session()");
        let functions = kinds(&entities, EntityType::Function);
        assert!(functions.contains(&"validate_token"));
        assert!(functions.contains(&"refresh_session"));
    }

    #[test]
    fn test_error_entities() {
        let entities = extract("hit a TypeError and then a ConnectionError");
        let errors = kinds(&entities, EntityType::Error);
        assert!(errors.contains(&"typeerror"));
        assert!(errors.contains(&"connectionerror"));
    }

    #[test]
    fn test_bug_entities() {
        let entities = extract("there is a bug in auth.py somewhere");
        let bugs = kinds(&entities, EntityType::Bug);
        assert!(bugs.contains(&"bug in auth.py"));
    }

    #[test]
    fn test_decision_entities() {
        let entities = extract("We decided to use sqlite for storage.");
        let decisions = kinds(&entities, EntityType::Decision);
        assert_eq!(decisions.len(), 1);
        assert!(decisions[0].starts_with("use sqlite"));
    }

    #[test]
    fn test_feature_entities() {
        let entities = extract("Implemented adaptive retrieval, then moved on.");
        let features = kinds(&entities, EntityType::Feature);
        assert!(features.contains(&"adaptive retrieval"));
    }

    #[test]
    fn test_tool_entities() {
        let entities = extract("ran cargo test and used `serde_json` for parsing");
        let tools = kinds(&entities, EntityType::Tool);
        assert!(tools.contains(&"cargo"));
        assert!(tools.contains(&"serde_json"));
    }

    #[test]
    fn test_known_tool_word_boundary() {
        // "gitignore" must not produce a "git" tool entity.
        let entities = extract("updated the gitignore rules");
        let tools = kinds(&entities, EntityType::Tool);
        assert!(!tools.contains(&"git"));
    }

    #[test]
    fn test_dedup_by_identity() {
        let entities = extract("auth.py and AUTH.PY and auth.py");
        let files = kinds(&entities, EntityType::File);
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_empty_text() {
        assert!(extract("").is_empty());
    }

    #[test]
    fn test_extract_from_memory_includes_artifact_files() {
        use engram_types::{Artifacts, MemoryFlags};
        let memory = Memory {
            id: "m".into(),
            session_id: "s".into(),
            timestamp: engram_types::now(),
            chunk_index: 0,
            intent: "work on the cache".into(),
            action: "tuned eviction".into(),
            outcome: "done".into(),
            importance: 5.0,
            artifacts: Artifacts {
                files: vec!["src/cache.rs".into()],
                ..Default::default()
            },
            flags: MemoryFlags::default(),
            embedding: vec![],
            embedded_text: String::new(),
        };
        let entities = extract_from_memory(&memory);
        let files = kinds(&entities, EntityType::File);
        assert!(files.contains(&"src/cache.rs"));
    }
}
