//! Pattern clauses.
//!
//! A `Pattern` is a conjunction of clauses over variables. The same clause
//! types serve both match patterns and insert patterns.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::Literal;

/// A pattern variable, rendered as `$name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Var(String);

impl Var {
    /// Create a variable; characters outside `[A-Za-z0-9_-]` become `_`.
    pub fn new(name: impl AsRef<str>) -> Self {
        let name: String = name
            .as_ref()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        Var(name)
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// One role play inside a relation clause: `role:$player`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolePlayer {
    pub role: String,
    pub player: Var,
}

impl RolePlayer {
    pub fn new(role: impl Into<String>, player: Var) -> Self {
        Self { role: role.into(), player }
    }
}

/// A single conjunct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Clause {
    /// `$var isa <type>`
    Isa { var: Var, type_name: String },
    /// `$var has <attribute> <literal>`
    Has { var: Var, attribute: String, value: Literal },
    /// `$var has $attribute`
    HasVar { var: Var, attribute: Var },
    /// `$var <literal> isa <attribute-type>`
    Attribute { var: Var, type_name: String, value: Literal },
    /// `$var (<role>:$player, ...) isa <relation-type>`
    Relation { var: Var, type_name: String, players: SmallVec<[RolePlayer; 4]> },
}

impl Clause {
    pub fn isa(var: &Var, type_name: impl Into<String>) -> Self {
        Clause::Isa { var: var.clone(), type_name: type_name.into() }
    }

    pub fn has(var: &Var, attribute: impl Into<String>, value: Literal) -> Self {
        Clause::Has { var: var.clone(), attribute: attribute.into(), value }
    }

    pub fn attribute(var: &Var, type_name: impl Into<String>, value: Literal) -> Self {
        Clause::Attribute { var: var.clone(), type_name: type_name.into(), value }
    }

    pub fn relation(
        var: &Var,
        type_name: impl Into<String>,
        players: impl IntoIterator<Item = RolePlayer>,
    ) -> Self {
        Clause::Relation {
            var: var.clone(),
            type_name: type_name.into(),
            players: players.into_iter().collect(),
        }
    }

    /// The variable this clause describes.
    pub fn subject(&self) -> &Var {
        match self {
            Clause::Isa { var, .. }
            | Clause::Has { var, .. }
            | Clause::HasVar { var, .. }
            | Clause::Attribute { var, .. }
            | Clause::Relation { var, .. } => var,
        }
    }

    /// Every variable referenced by this clause, subject first.
    pub fn vars(&self) -> SmallVec<[&Var; 4]> {
        let mut vars: SmallVec<[&Var; 4]> = SmallVec::new();
        vars.push(self.subject());
        match self {
            Clause::HasVar { attribute, .. } => vars.push(attribute),
            Clause::Relation { players, .. } => vars.extend(players.iter().map(|p| &p.player)),
            _ => {}
        }
        vars
    }

    pub fn mentions(&self, var: &Var) -> bool {
        self.vars().into_iter().any(|v| v == var)
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::Isa { var, type_name } => write!(f, "{var} isa {type_name};"),
            Clause::Has { var, attribute, value } => write!(f, "{var} has {attribute} {value};"),
            Clause::HasVar { var, attribute } => write!(f, "{var} has {attribute};"),
            Clause::Attribute { var, type_name, value } => write!(f, "{var} {value} isa {type_name};"),
            Clause::Relation { var, type_name, players } => {
                write!(f, "{var} (")?;
                for (i, p) in players.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}:{}", p.role, p.player)?;
                }
                write!(f, ") isa {type_name};")
            }
        }
    }
}

/// A conjunction of clauses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    clauses: Vec<Clause>,
}

impl Pattern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, clause: Clause) {
        self.clauses.push(clause);
    }

    pub fn extend(&mut self, other: &Pattern) {
        self.clauses.extend(other.clauses.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn iter(&self) -> impl Iterator<Item = &Clause> {
        self.clauses.iter()
    }

    /// Join two patterns into a new one, `self` first.
    pub fn concat(&self, other: &Pattern) -> Pattern {
        let mut joined = self.clone();
        joined.extend(other);
        joined
    }
}

impl FromIterator<Clause> for Pattern {
    fn from_iter<T: IntoIterator<Item = Clause>>(iter: T) -> Self {
        Self { clauses: iter.into_iter().collect() }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 { write!(f, " ")?; }
            write!(f, "{clause}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_sanitizes() {
        assert_eq!(Var::new("kill chain.0").name(), "kill_chain_0");
        assert_eq!(Var::new("x").to_string(), "$x");
    }

    #[test]
    fn test_render_clauses() {
        let x = Var::new("x");
        let r = Var::new("ref0");
        let rel = Var::new("rel0");
        let pattern: Pattern = vec![
            Clause::isa(&x, "indicator"),
            Clause::has(&x, "name", Literal::from("bad")),
            Clause::relation(&rel, "created-by", [
                RolePlayer::new("created", x.clone()),
                RolePlayer::new("creator", r.clone()),
            ]),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            pattern.to_string(),
            "$x isa indicator; $x has name \"bad\"; $rel0 (created:$x, creator:$ref0) isa created-by;"
        );
    }

    #[test]
    fn test_clause_vars() {
        let x = Var::new("x");
        let a = Var::new("a");
        let clause = Clause::relation(&Var::new("r"), "t", [RolePlayer::new("p", x.clone()), RolePlayer::new("q", a.clone())]);
        assert!(clause.mentions(&x));
        assert!(clause.mentions(&a));
        assert_eq!(clause.vars().len(), 3);
    }
}
