//! Typed read results.
//!
//! A `ThingRecord` is an entity or relation with its attributes and, for
//! every relation it plays a role in, the other role players of that
//! relation. Players that carry an object id are returned as references;
//! anonymous players (sub-objects, key/value entries, hashes) are described
//! recursively.

use serde::{Deserialize, Serialize};

use crate::query::Literal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThingKind {
    Entity,
    Relation,
    Attribute,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRecord {
    pub type_name: String,
    pub value: Literal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Player {
    /// A thing identified by its object id.
    Reference { type_name: String, id: String },
    /// An attribute playing a role directly.
    Attribute(AttributeRecord),
    /// An anonymous thing, described in full.
    Nested(Box<ThingRecord>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolePlayerRecord {
    pub role: String,
    pub player: Player,
}

/// A relation seen from one of its players.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationInstance {
    pub type_name: String,
    /// Role the describing thing plays in this relation.
    pub own_role: String,
    pub attributes: Vec<AttributeRecord>,
    /// Every other role play of the relation.
    pub players: Vec<RolePlayerRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThingRecord {
    pub type_name: String,
    pub kind: ThingKind,
    /// Owned attributes in insertion order.
    pub attributes: Vec<AttributeRecord>,
    /// Role players, when the thing is itself a relation.
    pub players: Vec<RolePlayerRecord>,
    pub relations: Vec<RelationInstance>,
}

impl ThingRecord {
    /// First value of an attribute type.
    pub fn attribute(&self, type_name: &str) -> Option<&Literal> {
        self.attributes.iter().find(|a| a.type_name == type_name).map(|a| &a.value)
    }
}
