//! Canonical ingredient lists.
//!
//! Both typed pantry entries and the comma-separated text a vision model returns
//! for a photo end up here before anything else looks at them.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    /// First-seen casing, whitespace cleaned.
    pub display: String,
    /// Comparison key: lowercase display.
    pub key: String,
}

/// De-duplicated ingredients in first-seen order. Never contains two members
/// with the same key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientSet {
    items: Vec<Ingredient>,
}

/// Order-independent cache key for an [`IngredientSet`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl IngredientSet {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ingredient> {
        self.items.iter()
    }

    pub fn display_names(&self) -> Vec<String> {
        self.items.iter().map(|i| i.display.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        let key = comparison_key(&collapse_whitespace(name));
        self.items.iter().any(|i| i.key == key)
    }

    /// Sorted keys joined with `\n`, which whitespace collapsing keeps out of
    /// every key.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut keys: Vec<&str> = self.items.iter().map(|i| i.key.as_str()).collect();
        keys.sort_unstable();
        Fingerprint(keys.join("\n"))
    }
}

impl<'a> IntoIterator for &'a IngredientSet {
    type Item = &'a Ingredient;
    type IntoIter = std::slice::Iter<'a, Ingredient>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn comparison_key(cleaned: &str) -> String {
    cleaned.to_lowercase()
}

/// Build an [`IngredientSet`] from raw user or model text. Always succeeds;
/// blank entries are dropped and later duplicates (ignoring case) are skipped.
pub fn normalize<I, S>(raw_items: I) -> IngredientSet
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for raw in raw_items {
        let display = collapse_whitespace(raw.as_ref());
        if display.is_empty() {
            continue;
        }
        let key = comparison_key(&display);
        if seen.insert(key.clone()) {
            items.push(Ingredient { display, key });
        }
    }

    IngredientSet { items }
}

/// Split a vision model's answer into candidate ingredient names.
///
/// The model is asked for a comma-separated list but sometimes answers with one
/// item per line or a bulleted list.
pub fn split_extracted(text: &str) -> Vec<String> {
    text.split([',', '\n', ';'])
        .map(|part| {
            part.trim()
                .trim_start_matches(['-', '*', '•'])
                .trim()
                .trim_end_matches('.')
                .trim()
                .to_string()
        })
        .filter(|part| !part.is_empty())
        .collect()
}
