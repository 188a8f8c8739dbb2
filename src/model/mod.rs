//! # Domain Model
//!
//! The caller-facing shapes: the JSON-shaped `ImportableObject` and the
//! `ImportConfiguration` that selects which object domains are active.
//!
//! Design rule: NO store types here. This module is pure data with
//! no I/O and no async.

pub mod object;
pub mod config;

pub use object::{ImportableObject, ID_FIELD, TYPE_FIELD};
pub use config::{ImportConfiguration, CoreVersion, AttackMatrix, MergePolicy};
