//! Filter layer: criterion model, compiler and predicate serialization.
//!
//! Raw, loosely-typed tool parameters go in; a validated [`FilterSet`] (or
//! [`SceneQuery`]) and finally a remote [`Predicate`] come out. Nothing here
//! performs I/O.

pub mod compiler;
pub mod criterion;
pub mod scene;

pub use compiler::{
    compile_performer_filters, criterion_predicate, performer_predicate,
    performer_scenes_predicate, FieldFilter, FilterSet, Predicate,
};
pub use criterion::{
    FilterCriterion, FilterError, FilterField, FilterModifier, FilterValue, ValueKind,
};
pub use scene::{compile_scene_filters, rating_criterion, SceneQuery, TagFilter, TagMode};
