//! Complete write statements.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Pattern, Var};

/// A variable to remove in a delete statement: `$var isa <type>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteTarget {
    pub var: Var,
    pub type_name: String,
}

/// A statement the store executes atomically within a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    /// `match <matches> insert <inserts>`; the match part may be empty.
    Insert { matches: Pattern, inserts: Pattern },
    /// `match <matches> delete <targets>`
    Delete { matches: Pattern, deletes: Vec<DeleteTarget> },
    /// Remove every attribute no entity or relation still holds.
    PurgeOrphanAttributes,
}

impl Statement {
    /// The match pattern, if any.
    pub fn matches(&self) -> Option<&Pattern> {
        match self {
            Statement::Insert { matches, .. } | Statement::Delete { matches, .. } => Some(matches),
            Statement::PurgeOrphanAttributes => None,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Insert { matches, inserts } => {
                if !matches.is_empty() {
                    write!(f, "match {matches} ")?;
                }
                write!(f, "insert {inserts}")
            }
            Statement::Delete { matches, deletes } => {
                write!(f, "match {matches} delete")?;
                for target in deletes {
                    write!(f, " {} isa {};", target.var, target.type_name)?;
                }
                Ok(())
            }
            Statement::PurgeOrphanAttributes => write!(
                f,
                "match $a isa attribute; not {{ $owner has $a; }}; not {{ $rel ($a) isa relation; }}; delete $a isa attribute;"
            ),
        }
    }
}
