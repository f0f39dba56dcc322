//! Typed entity mentions extracted from memories.
//!
//! Entities are pure values keyed by `(entity_type, canonical_form)`. The
//! knowledge graph holds them in an arena; nothing here owns anything.

use serde::{Deserialize, Serialize};

/// The typed entity vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    File,
    Function,
    Bug,
    Feature,
    Tool,
    Error,
    Decision,
    Other,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "FILE",
            Self::Function => "FUNCTION",
            Self::Bug => "BUG",
            Self::Feature => "FEATURE",
            Self::Tool => "TOOL",
            Self::Error => "ERROR",
            Self::Decision => "DECISION",
            Self::Other => "OTHER",
        }
    }
}

/// A typed, canonicalized mention.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: EntityType,
    /// The text as it appeared in the source.
    pub surface_form: String,
    /// Canonical form; `(entity_type, canonical_form)` is the identity.
    pub canonical_form: String,
}

impl Entity {
    /// Create an entity, canonicalizing the surface form.
    pub fn new(entity_type: EntityType, surface_form: impl Into<String>) -> Self {
        let surface_form = surface_form.into();
        let canonical_form = canonicalize(entity_type, &surface_form);
        Self {
            entity_type,
            surface_form,
            canonical_form,
        }
    }

    /// The identity key for dedup and graph lookup.
    pub fn key(&self) -> (EntityType, &str) {
        (self.entity_type, &self.canonical_form)
    }
}

/// Canonicalize a surface form for a given entity type.
///
/// Files are lowercased and path-normalized; functions are lowercased
/// identifiers with any trailing call parens stripped; everything else is
/// lowercased, whitespace-collapsed free text.
pub fn canonicalize(entity_type: EntityType, surface: &str) -> String {
    let trimmed = surface.trim();
    match entity_type {
        EntityType::File => {
            let mut path = trimmed.replace('\\', "/").to_lowercase();
            while let Some(rest) = path.strip_prefix("./") {
                path = rest.to_string();
            }
            path
        }
        EntityType::Function => trimmed
            .trim_end_matches("()")
            .trim_matches('`')
            .to_lowercase(),
        _ => trimmed
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_canonicalization() {
        let e = Entity::new(EntityType::File, "./Src\\Auth.PY");
        assert_eq!(e.canonical_form, "src/auth.py");
    }

    #[test]
    fn test_function_canonicalization() {
        let e = Entity::new(EntityType::Function, "`validate_token()`");
        assert_eq!(e.canonical_form, "validate_token");
    }

    #[test]
    fn test_free_text_canonicalization() {
        let e = Entity::new(EntityType::Decision, "  Decided To  use JWT  ");
        assert_eq!(e.canonical_form, "decided to use jwt");
    }

    #[test]
    fn test_identity_key() {
        let a = Entity::new(EntityType::File, "auth.py");
        let b = Entity::new(EntityType::File, "AUTH.PY");
        assert_eq!(a.key(), b.key());

        let c = Entity::new(EntityType::Tool, "auth.py");
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn test_entity_type_serde() {
        let json = serde_json::to_string(&EntityType::File).unwrap();
        assert_eq!(json, "\"FILE\"");
        let back: EntityType = serde_json::from_str("\"DECISION\"").unwrap();
        assert_eq!(back, EntityType::Decision);
    }
}
