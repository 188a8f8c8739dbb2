//! # Store Statements
//!
//! The write protocol consumed by store backends: conjunctive patterns of
//! `isa` / `has` / relation clauses combined into `match … insert …` and
//! `match … delete …` statements.
//!
//! Pure data. Statements are built by the encoder, rendered to text for
//! logging and remote stores, and interpreted directly by `MemoryStore`.

pub mod literal;
pub mod pattern;
pub mod statement;

pub use literal::{Literal, ValueType};
pub use pattern::{Clause, Pattern, RolePlayer, Var};
pub use statement::{DeleteTarget, Statement};
