//! Category label normalization.
//!
//! Callers and providers spell categories in many ways ("Clubs & Nachtleben",
//! "clubs", "Discos"). Everything that keys on a category (signatures, cache
//! entries, job records) uses the canonical label produced here.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::CategoriesConfig;
use crate::traits::CategoryNormalizer;

/// Minimum Jaro-Winkler similarity for a fuzzy match.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.92;

/// Built-in canonical categories and their known aliases.
const BUILTIN_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "Clubs/Discos",
        &["clubs & nachtleben", "clubs", "club", "discos", "disco", "nightlife", "nachtleben"],
    ),
    (
        "Live Music",
        &["musik & nachtleben", "live musik", "konzerte", "konzert", "concerts", "gigs"],
    ),
    ("Electronic", &["electronic music", "elektronisch", "edm"]),
    ("Techno", &["techno music", "minimal techno"]),
    ("Underground", &["underground scene"]),
    ("Mixed", &["various", "verschiedenes", "misc"]),
    ("LGBTQ+", &["lgbtq", "lgbt", "queer", "gay", "pride"]),
    ("Theater", &["theatre", "theater & buehne", "bühne", "stage", "schauspiel"]),
    ("Comedy", &["stand-up", "standup", "kabarett"]),
    ("Art & Exhibitions", &["art", "kunst", "exhibitions", "ausstellungen", "galleries"]),
    ("Food & Drink", &["food", "kulinarik", "essen & trinken"]),
    ("Family", &["kids", "kinder", "familie"]),
    ("Film", &["kino", "cinema", "movies"]),
    ("Festivals", &["festival", "open air", "open-air"]),
    ("Sports", &["sport", "fitness"]),
];

/// Collapses inner whitespace and trims.
fn clean(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold(raw: &str) -> String {
    clean(raw).to_lowercase()
}

/// Alias table lookup with a Jaro-Winkler fallback.
///
/// Resolution order:
/// 1. exact match on the case-folded label against canonical names and aliases
/// 2. the closest name or alias with similarity ≥ the threshold
/// 3. the cleaned raw label (unknown categories pass through)
///
/// # Examples
///
/// ```
/// use scout_core::normalizer::AliasNormalizer;
/// use scout_core::traits::CategoryNormalizer;
///
/// let normalizer = AliasNormalizer::builtin();
/// assert_eq!(normalizer.normalize("Clubs & Nachtleben"), "Clubs/Discos");
/// assert_eq!(normalizer.normalize("  theatre "), "Theater");
/// assert_eq!(normalizer.normalize("Poetry  Slam"), "Poetry Slam");
/// ```
#[derive(Debug, Clone)]
pub struct AliasNormalizer {
    /// folded label -> canonical label
    table: Arc<HashMap<String, String>>,
    threshold: f64,
}

impl Default for AliasNormalizer {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AliasNormalizer {
    /// Normalizer with only the built-in categories.
    pub fn builtin() -> Self {
        let mut table = HashMap::new();
        for (name, aliases) in BUILTIN_CATEGORIES {
            table.insert(fold(name), name.to_string());
            for alias in *aliases {
                table.insert(fold(alias), name.to_string());
            }
        }
        Self {
            table: Arc::new(table),
            threshold: DEFAULT_FUZZY_THRESHOLD,
        }
    }

    /// Built-in categories extended (and overridden) by a categories file.
    pub fn with_config(config: &CategoriesConfig) -> Self {
        let builtin = Self::builtin();
        let mut table = (*builtin.table).clone();
        for entry in &config.categories {
            let name = clean(&entry.name);
            table.insert(fold(&name), name.clone());
            for alias in &entry.aliases {
                table.insert(fold(alias), name.clone());
            }
        }
        Self {
            table: Arc::new(table),
            threshold: builtin.threshold,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Closest known label above the threshold. Equal scores go to the
    /// lexicographically smallest label.
    fn fuzzy_match(&self, folded: &str) -> Option<&str> {
        self.table
            .iter()
            .map(|(key, canonical)| (strsim::jaro_winkler(folded, key), key, canonical))
            .filter(|(score, _, _)| *score >= self.threshold)
            .max_by(|a, b| a.0.total_cmp(&b.0).then_with(|| b.1.cmp(a.1)))
            .map(|(_, _, canonical)| canonical.as_str())
    }
}

impl CategoryNormalizer for AliasNormalizer {
    fn normalize(&self, raw: &str) -> String {
        let cleaned = clean(raw);
        if cleaned.is_empty() {
            return cleaned;
        }
        let folded = cleaned.to_lowercase();
        if let Some(canonical) = self.table.get(&folded) {
            return canonical.clone();
        }
        if let Some(canonical) = self.fuzzy_match(&folded) {
            tracing::debug!(raw = %raw, canonical = %canonical, "Fuzzy-matched category");
            return canonical.to_string();
        }
        cleaned
    }
}

/// Normalizer that only trims whitespace. Useful in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityNormalizer;

impl CategoryNormalizer for IdentityNormalizer {
    fn normalize(&self, raw: &str) -> String {
        clean(raw)
    }
}
