//! Outcome of matching one index row against the inventory.

use std::fmt;

/// Resolution of an index row to a physical object.
///
/// Only the resolved variants carry a path, so an ambiguous or missing
/// match can never be mistaken for a located object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchResult {
    /// The stored locator points at an object that exists.
    ExactUri {
        path: String,
        generation: Option<i64>,
    },
    /// The locator did not match but exactly one object has this basename.
    UniqueBasename {
        path: String,
        generation: Option<i64>,
    },
    /// Several objects share the basename and none is pinned by the locator.
    Ambiguous { candidates: usize },
    /// No object has this basename.
    NotFound,
}

/// Variant tag of a [`MatchResult`], used for logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchStatus {
    ExactUri,
    UniqueBasename,
    Ambiguous,
    NotFound,
}

impl MatchResult {
    pub fn status(&self) -> MatchStatus {
        match self {
            Self::ExactUri { .. } => MatchStatus::ExactUri,
            Self::UniqueBasename { .. } => MatchStatus::UniqueBasename,
            Self::Ambiguous { .. } => MatchStatus::Ambiguous,
            Self::NotFound => MatchStatus::NotFound,
        }
    }

    /// Resolved object path and generation, for the two located variants.
    pub fn resolved(&self) -> Option<(&str, Option<i64>)> {
        match self {
            Self::ExactUri { path, generation } | Self::UniqueBasename { path, generation } => {
                Some((path.as_str(), *generation))
            }
            Self::Ambiguous { .. } | Self::NotFound => None,
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ExactUri => "exact_uri",
            Self::UniqueBasename => "unique_basename",
            Self::Ambiguous => "ambiguous",
            Self::NotFound => "not_found",
        };
        f.write_str(label)
    }
}
