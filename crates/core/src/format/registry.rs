//! Static capability table and route lookup.
//!
//! Format support is data: adding a conversion path is a new row in
//! [`CAPABILITIES`], not a new branch in the orchestrator. A missing route is
//! an ordinary [`Route::NotSupported`] outcome, not an error.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::tag::{known_tags, Family, FormatTag};

/// Identifies one concrete codec adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterId {
    Image,
    Document,
    Media,
    Compress,
}

impl AdapterId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Document => "document",
            Self::Media => "media",
            Self::Compress => "compress",
        }
    }
}

impl fmt::Display for AdapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which target tags of the target family a capability accepts.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetTags {
    Any,
    Only(&'static [&'static str]),
}

impl TargetTags {
    fn accepts(&self, target: &FormatTag) -> bool {
        match self {
            Self::Any => true,
            Self::Only(tags) => tags.contains(&target.as_str()),
        }
    }
}

/// One row of the capability table.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Capability {
    pub source: Family,
    pub target: Family,
    pub targets: TargetTags,
    pub adapter: AdapterId,
}

/// Document targets the document adapter can produce.
pub const TEXT_TARGETS: &[&str] = &["txt", "html", "md"];

const CAPABILITIES: &[Capability] = &[
    Capability {
        source: Family::Image,
        target: Family::Image,
        targets: TargetTags::Any,
        adapter: AdapterId::Image,
    },
    Capability {
        source: Family::Image,
        target: Family::Compress,
        targets: TargetTags::Any,
        adapter: AdapterId::Compress,
    },
    Capability {
        source: Family::Document,
        target: Family::Document,
        targets: TargetTags::Only(TEXT_TARGETS),
        adapter: AdapterId::Document,
    },
    Capability {
        source: Family::Video,
        target: Family::Video,
        targets: TargetTags::Any,
        adapter: AdapterId::Media,
    },
    Capability {
        source: Family::Video,
        target: Family::Audio,
        targets: TargetTags::Any,
        adapter: AdapterId::Media,
    },
    Capability {
        source: Family::Audio,
        target: Family::Audio,
        targets: TargetTags::Any,
        adapter: AdapterId::Media,
    },
];

/// Outcome of a route lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Adapter(AdapterId),
    NotSupported,
}

/// Returns the adapter able to convert `source` into `target`.
///
/// Both tags are expected to be normalized [`FormatTag`]s. Unknown tags
/// classify to [`Family::Unknown`], which appears in no row.
pub fn capable_adapter(source: &FormatTag, target: &FormatTag) -> Route {
    let source_family = source.family();
    let target_family = target.family();

    CAPABILITIES
        .iter()
        .find(|cap| {
            cap.source == source_family
                && cap.target == target_family
                && cap.targets.accepts(target)
        })
        .map(|cap| Route::Adapter(cap.adapter))
        .unwrap_or(Route::NotSupported)
}

/// The full capability table.
pub fn capabilities() -> &'static [Capability] {
    CAPABILITIES
}

/// Every known tag reachable from `source`.
pub fn targets_for(source: &FormatTag) -> Vec<FormatTag> {
    known_tags()
        .filter(|target| matches!(capable_adapter(source, target), Route::Adapter(_)))
        .collect()
}
