//! Category catalog: internal category codes to display names.

use std::collections::BTreeMap;

use serde::Serialize;

/// Built-in categories. Config may extend or rename these.
const BUILTIN_CATEGORIES: &[(&str, &str)] = &[
    ("wos_accounts", "Whiteout Survival"),
    ("rok_accounts", "Rise of Kingdoms"),
    ("lastwar_accounts", "Last War: Survival"),
    ("cod_accounts", "Call of Duty"),
    ("other_accounts", "Other Games"),
];

/// Immutable mapping of category codes to display names.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct CategoryCatalog {
    entries: BTreeMap<String, String>,
}

impl CategoryCatalog {
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN_CATEGORIES
                .iter()
                .map(|(code, name)| (code.to_string(), name.to_string()))
                .collect(),
        }
    }

    /// Merge configured entries over the built-in ones.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, String>) -> Self {
        for (code, name) in overrides {
            self.entries.insert(code.clone(), name.clone());
        }
        self
    }

    /// Display name for a code, falling back to the code itself.
    pub fn display_name<'a>(&'a self, code: &'a str) -> &'a str {
        self.entries.get(code).map(String::as_str).unwrap_or(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl Default for CategoryCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
