//! Standard category taxonomy and per-indexer category tables.
//!
//! The standard taxonomy follows the Newznab numbering: top-level groups are
//! multiples of 1000 and sub-categories share the group's thousand.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A category in the standard taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StandardCategory(pub u32);

impl StandardCategory {
    pub const CONSOLE: Self = Self(1000);
    pub const MOVIES: Self = Self(2000);
    pub const MOVIES_SD: Self = Self(2030);
    pub const MOVIES_HD: Self = Self(2040);
    pub const MOVIES_UHD: Self = Self(2045);
    pub const AUDIO: Self = Self(3000);
    pub const AUDIO_MP3: Self = Self(3010);
    pub const AUDIO_AUDIOBOOK: Self = Self(3030);
    pub const AUDIO_LOSSLESS: Self = Self(3040);
    pub const AUDIO_OTHER: Self = Self(3050);
    pub const PC: Self = Self(4000);
    pub const TV: Self = Self(5000);
    pub const TV_SD: Self = Self(5030);
    pub const TV_HD: Self = Self(5040);
    pub const TV_ANIME: Self = Self(5070);
    pub const XXX: Self = Self(6000);
    pub const BOOKS: Self = Self(7000);
    pub const BOOKS_EBOOK: Self = Self(7020);
    pub const BOOKS_COMICS: Self = Self(7030);
    pub const OTHER: Self = Self(8000);

    /// The top-level group this category belongs to.
    pub fn parent(self) -> Self {
        Self(self.0 / 1000 * 1000)
    }

    pub fn is_parent(self) -> bool {
        self.0 % 1000 == 0
    }

    /// Whether `self` is `other` or one of its sub-categories.
    pub fn is_within(self, other: Self) -> bool {
        self == other || (other.is_parent() && self.parent() == other)
    }

    pub fn name(self) -> &'static str {
        match self.0 {
            1000 => "Console",
            2000 => "Movies",
            2030 => "Movies/SD",
            2040 => "Movies/HD",
            2045 => "Movies/UHD",
            3000 => "Audio",
            3010 => "Audio/MP3",
            3030 => "Audio/Audiobook",
            3040 => "Audio/Lossless",
            3050 => "Audio/Other",
            4000 => "PC",
            5000 => "TV",
            5030 => "TV/SD",
            5040 => "TV/HD",
            5070 => "TV/Anime",
            6000 => "XXX",
            7000 => "Books",
            7020 => "Books/EBook",
            7030 => "Books/Comics",
            8000 => "Other",
            _ => "Custom",
        }
    }
}

impl fmt::Display for StandardCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

/// One row of an indexer's category table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMapping {
    /// Indexer-native identifier, numeric or free text.
    pub native: String,
    /// Standard category the native id maps into.
    pub standard: StandardCategory,
    /// Optional human label the indexer may echo instead of the id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl CategoryMapping {
    pub fn new(native: impl Into<String>, standard: StandardCategory) -> Self {
        Self {
            native: native.into(),
            standard,
            label: None,
        }
    }

    pub fn labelled(
        native: impl Into<String>,
        standard: StandardCategory,
        label: impl Into<String>,
    ) -> Self {
        Self {
            native: native.into(),
            standard,
            label: Some(label.into()),
        }
    }

    fn matches(&self, value: &str) -> bool {
        self.native.eq_ignore_ascii_case(value)
            || self
                .label
                .as_deref()
                .is_some_and(|l| l.eq_ignore_ascii_case(value))
    }
}

/// Labels some indexers echo back when the uploader never picked a category.
pub const DEFAULT_PLACEHOLDER_LABELS: &[&str] = &["select category", "none", "-"];

/// Immutable, table-driven mapping between native and standard categories.
#[derive(Debug, Clone)]
pub struct CategoryMap {
    mappings: Vec<CategoryMapping>,
    fallback: StandardCategory,
    placeholders: Vec<String>,
}

impl CategoryMap {
    /// Build a map with the default fallback (Movies).
    pub fn new(mappings: Vec<CategoryMapping>) -> Self {
        Self {
            mappings,
            fallback: StandardCategory::MOVIES,
            placeholders: DEFAULT_PLACEHOLDER_LABELS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub fn with_fallback(mut self, fallback: StandardCategory) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_placeholders(mut self, placeholders: Vec<String>) -> Self {
        self.placeholders = placeholders;
        self
    }

    pub fn fallback(&self) -> StandardCategory {
        self.fallback
    }

    pub fn mappings(&self) -> &[CategoryMapping] {
        &self.mappings
    }

    fn is_placeholder(&self, value: &str) -> bool {
        value.is_empty()
            || self
                .placeholders
                .iter()
                .any(|p| p.eq_ignore_ascii_case(value))
    }

    /// Map a native id or label into standard categories.
    ///
    /// Never returns an empty set: unknown, missing and placeholder values
    /// all map to the fallback category.
    pub fn map_native_to_standard(&self, native: &str) -> Vec<StandardCategory> {
        let native = native.trim();
        if self.is_placeholder(native) {
            return vec![self.fallback];
        }

        let mut found = Vec::new();
        for mapping in self.mappings.iter().filter(|m| m.matches(native)) {
            if !found.contains(&mapping.standard) {
                found.push(mapping.standard);
            }
        }

        if found.is_empty() {
            found.push(self.fallback);
        }
        found
    }

    /// Map every native value of one record, falling back when none is known.
    pub fn map_all_to_standard<'a, I>(&self, natives: I) -> Vec<StandardCategory>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut found = Vec::new();
        for native in natives {
            let native = native.trim();
            if self.is_placeholder(native) {
                continue;
            }
            for mapping in self.mappings.iter().filter(|m| m.matches(native)) {
                if !found.contains(&mapping.standard) {
                    found.push(mapping.standard);
                }
            }
        }

        if found.is_empty() {
            found.push(self.fallback);
        }
        found
    }

    /// Native ids to put in a query for the given standard category.
    ///
    /// Asking for a top-level group also selects natives mapped to any of
    /// its sub-categories.
    pub fn map_standard_to_native(&self, category: StandardCategory) -> Vec<String> {
        let mut natives = Vec::new();
        for mapping in &self.mappings {
            if mapping.standard.is_within(category) && !natives.contains(&mapping.native) {
                natives.push(mapping.native.clone());
            }
        }
        natives
    }

    /// Distinct standard categories this indexer can produce.
    pub fn standard_categories(&self) -> Vec<StandardCategory> {
        let mut categories: Vec<_> = self.mappings.iter().map(|m| m.standard).collect();
        categories.sort();
        categories.dedup();
        categories
    }
}
