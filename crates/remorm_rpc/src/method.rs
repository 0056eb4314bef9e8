//! Per-entity remote method resolution.

use std::collections::HashMap;
use std::fmt;

/// The six remote verbs the engine issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// Fetch one record by identifier.
    Find,
    /// Fetch records matching flat criteria.
    Search,
    /// Create a record, possibly returning a generated identifier.
    Create,
    /// Partially update a record.
    Patch,
    /// Delete a record.
    Remove,
    /// Count records matching flat criteria.
    Count,
}

impl Verb {
    /// All verbs, in a stable order.
    pub const ALL: [Verb; 6] = [
        Verb::Find,
        Verb::Search,
        Verb::Create,
        Verb::Patch,
        Verb::Remove,
        Verb::Count,
    ];

    /// The verb's wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Find => "find",
            Verb::Search => "search",
            Verb::Create => "create",
            Verb::Patch => "patch",
            Verb::Remove => "remove",
            Verb::Count => "count",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Method-name configuration for one entity class.
///
/// A verb resolves to its explicit override when one is declared, otherwise
/// to `{entity_path}{separator}{verb}`.
#[derive(Debug, Clone)]
pub struct EntityMethods {
    entity_path: String,
    separator: String,
    overrides: HashMap<Verb, String>,
}

impl EntityMethods {
    /// Default separator between entity path and verb.
    pub const DEFAULT_SEPARATOR: &'static str = "/";

    /// Creates a method configuration with the default separator.
    pub fn new(entity_path: impl Into<String>) -> Self {
        Self {
            entity_path: entity_path.into(),
            separator: Self::DEFAULT_SEPARATOR.to_string(),
            overrides: HashMap::new(),
        }
    }

    /// Sets the separator.
    #[must_use]
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Declares an explicit method name for one verb.
    #[must_use]
    pub fn with_override(mut self, verb: Verb, method: impl Into<String>) -> Self {
        self.overrides.insert(verb, method.into());
        self
    }

    /// Returns the entity path.
    #[must_use]
    pub fn entity_path(&self) -> &str {
        &self.entity_path
    }

    /// Resolves the remote method name for a verb.
    #[must_use]
    pub fn resolve(&self, verb: Verb) -> String {
        match self.overrides.get(&verb) {
            Some(method) => method.clone(),
            None => format!("{}{}{}", self.entity_path, self.separator, verb),
        }
    }
}
