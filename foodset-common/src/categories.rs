//! Category registry
//!
//! Closed set of food categories, loaded once at startup and shared
//! read-only (`Arc<CategoryRegistry>`) by every pipeline component.

use crate::config::CategoryConfig;
use crate::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;

/// Label assigned when no category can be resolved
pub const UNKNOWN_LABEL: &str = "unknown";

/// Minimum word length for prefix-based label inference
const PREFIX_LEN: usize = 3;

/// A single food category
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    /// Category key; also the storage subdirectory name
    pub key: String,
    /// Human display label
    pub label: String,
    /// Class index (position in the configured list)
    pub index: usize,
    /// Lowercase alternate names
    pub aliases: Vec<String>,
    query: Option<String>,
}

impl Category {
    /// Term sent to the image search provider
    pub fn search_term(&self) -> &str {
        self.query.as_deref().unwrap_or(&self.key)
    }
}

/// Immutable category registry
#[derive(Debug, Clone)]
pub struct CategoryRegistry {
    categories: Vec<Category>,
    by_key: HashMap<String, usize>,
}

impl CategoryRegistry {
    /// Build the registry from configured categories
    ///
    /// An empty list, blank keys, keys that are not usable as directory names,
    /// and duplicate keys are configuration errors.
    pub fn from_config(entries: &[CategoryConfig]) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::Config(
                "No categories configured (add [[categories]] entries)".to_string(),
            ));
        }

        let mut categories = Vec::with_capacity(entries.len());
        let mut by_key = HashMap::with_capacity(entries.len());

        for (index, entry) in entries.iter().enumerate() {
            let key = entry.key.trim().to_lowercase();
            if key.is_empty() {
                return Err(Error::Config(format!("Category #{} has an empty key", index)));
            }
            if key.contains(['/', '\\']) || key == "." || key == ".." {
                return Err(Error::Config(format!(
                    "Category key '{}' is not a valid directory name",
                    key
                )));
            }
            if by_key.insert(key.clone(), index).is_some() {
                return Err(Error::Config(format!("Duplicate category key '{}'", key)));
            }

            categories.push(Category {
                label: entry.label.clone().unwrap_or_else(|| key.clone()),
                aliases: entry
                    .aliases
                    .iter()
                    .map(|a| a.trim().to_lowercase())
                    .filter(|a| !a.is_empty())
                    .collect(),
                query: entry.query.clone().filter(|q| !q.trim().is_empty()),
                key,
                index,
            });
        }

        Ok(Self { categories, by_key })
    }

    /// Convenience constructor from plain keys (label = key)
    pub fn from_keys<I, S>(keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries: Vec<CategoryConfig> = keys
            .into_iter()
            .map(|key| CategoryConfig {
                key: key.into(),
                label: None,
                aliases: Vec::new(),
                query: None,
            })
            .collect();
        Self::from_config(&entries)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.key.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&Category> {
        self.by_key.get(key).map(|&i| &self.categories[i])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// Class index for a key
    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.by_key.get(key).copied()
    }

    /// Resolve a label from a category key or alias (case-insensitive)
    pub fn resolve(&self, name: &str) -> Option<&Category> {
        let needle = name.trim().to_lowercase();
        self.get(&needle)
            .or_else(|| self.categories.iter().find(|c| c.aliases.contains(&needle)))
    }

    /// Infer a category key from a free-text description
    ///
    /// 1. First category whose key or alias occurs as a substring
    /// 2. Otherwise first category whose key starts with the first three
    ///    letters of some word (words shorter than three letters are ignored)
    /// 3. Otherwise [`UNKNOWN_LABEL`]
    pub fn infer_label(&self, description: &str) -> &str {
        let lower = description.to_lowercase();

        for category in &self.categories {
            if lower.contains(category.key.as_str())
                || category.aliases.iter().any(|a| lower.contains(a.as_str()))
            {
                return &category.key;
            }
        }

        for word in lower.split(|c: char| !c.is_alphabetic()) {
            if word.chars().count() < PREFIX_LEN {
                continue;
            }
            let prefix: String = word.chars().take(PREFIX_LEN).collect();
            if let Some(category) = self.categories.iter().find(|c| c.key.starts_with(&prefix)) {
                return &category.key;
            }
        }

        UNKNOWN_LABEL
    }
}
