//! Format tags, family classification and the capability registry.

pub mod registry;
mod tag;

pub use registry::{
    capabilities, capable_adapter, targets_for, AdapterId, Capability, Route, TargetTags,
    TEXT_TARGETS,
};
pub use tag::{classify, known_tags, Family, FormatTag, COMPRESS_TAG};
