//! The entity/relation/attribute graph behind `MemoryStore`.

use std::collections::BTreeSet;

use hashbrown::{HashMap, HashSet};

use crate::query::Literal;
use crate::storage::record::{AttributeRecord, Player, RelationInstance, RolePlayerRecord, ThingKind, ThingRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThingId(pub u64);

#[derive(Debug, Clone)]
pub(crate) enum ThingData {
    Entity,
    Relation { players: Vec<(String, ThingId)> },
    Attribute { value: Literal },
}

#[derive(Debug, Clone)]
pub(crate) struct Thing {
    pub type_name: String,
    pub data: ThingData,
    /// Owned attributes in insertion order.
    pub owned: Vec<ThingId>,
}

impl Thing {
    pub fn kind(&self) -> ThingKind {
        match self.data {
            ThingData::Entity => ThingKind::Entity,
            ThingData::Relation { .. } => ThingKind::Relation,
            ThingData::Attribute { .. } => ThingKind::Attribute,
        }
    }
}

/// Root types every stored type implicitly inherits from.
const ROOT_TYPES: [&str; 4] = ["thing", "entity", "relation", "attribute"];

#[derive(Debug, Clone, Default)]
pub(crate) struct Graph {
    things: HashMap<ThingId, Thing>,
    next_id: u64,
    /// (attribute type, literal key) → attribute
    attribute_index: HashMap<(String, String), ThingId>,
    /// attribute → owners
    owners: HashMap<ThingId, Vec<ThingId>>,
    /// player → relations it plays in
    plays: HashMap<ThingId, Vec<ThingId>>,
    type_index: HashMap<String, BTreeSet<ThingId>>,
}

impl Graph {
    // ========================================================================
    // Lookups
    // ========================================================================

    pub fn get(&self, id: ThingId) -> Option<&Thing> {
        self.things.get(&id)
    }

    pub fn len(&self) -> usize {
        self.things.len()
    }

    pub fn attribute(&self, type_name: &str, value: &Literal) -> Option<ThingId> {
        self.attribute_index.get(&(type_name.to_string(), value.key())).copied()
    }

    pub fn owners_of(&self, attribute: ThingId) -> &[ThingId] {
        self.owners.get(&attribute).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn relations_of(&self, player: ThingId) -> &[ThingId] {
        self.plays.get(&player).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Things whose type is `type_name` or one of its subtypes.
    pub fn of_type(&self, type_name: &str, hierarchy: &HashMap<String, String>) -> Vec<ThingId> {
        let mut ids: Vec<ThingId> = if ROOT_TYPES.contains(&type_name) {
            self.things
                .iter()
                .filter(|(_, t)| root_matches(t, type_name))
                .map(|(id, _)| *id)
                .collect()
        } else {
            self.type_index
                .iter()
                .filter(|(t, _)| is_subtype(t, type_name, hierarchy))
                .flat_map(|(_, ids)| ids.iter().copied())
                .collect()
        };
        ids.sort();
        ids
    }

    pub fn all(&self) -> Vec<ThingId> {
        let mut ids: Vec<ThingId> = self.things.keys().copied().collect();
        ids.sort();
        ids
    }

    /// `thing isa type_name`, walking the supertype chain.
    pub fn isa(&self, id: ThingId, type_name: &str, hierarchy: &HashMap<String, String>) -> bool {
        self.things.get(&id).is_some_and(|thing| {
            root_matches(thing, type_name) || is_subtype(&thing.type_name, type_name, hierarchy)
        })
    }

    /// The thing owning `id_attribute == id`.
    pub fn find_by_id(&self, id_attribute: &str, id: &str) -> Option<ThingId> {
        let attribute = self.attribute(id_attribute, &Literal::from(id))?;
        self.owners_of(attribute).first().copied()
    }

    // ========================================================================
    // Writes
    // ========================================================================

    fn allocate(&mut self, type_name: &str, data: ThingData) -> ThingId {
        let id = ThingId(self.next_id);
        self.next_id += 1;
        self.things.insert(id, Thing { type_name: type_name.to_string(), data, owned: Vec::new() });
        self.type_index.entry(type_name.to_string()).or_default().insert(id);
        id
    }

    pub fn insert_entity(&mut self, type_name: &str) -> ThingId {
        self.allocate(type_name, ThingData::Entity)
    }

    /// Attributes are unique per (type, value).
    pub fn put_attribute(&mut self, type_name: &str, value: Literal) -> ThingId {
        let key = (type_name.to_string(), value.key());
        if let Some(id) = self.attribute_index.get(&key) {
            return *id;
        }
        let id = self.allocate(type_name, ThingData::Attribute { value });
        self.attribute_index.insert(key, id);
        id
    }

    pub fn insert_relation(&mut self, type_name: &str, players: Vec<(String, ThingId)>) -> ThingId {
        let mut distinct: Vec<ThingId> = players.iter().map(|(_, p)| *p).collect();
        distinct.sort();
        distinct.dedup();
        let id = self.allocate(type_name, ThingData::Relation { players });
        for player in distinct {
            self.plays.entry(player).or_default().push(id);
        }
        id
    }

    pub fn add_ownership(&mut self, owner: ThingId, attribute: ThingId) {
        if let Some(thing) = self.things.get_mut(&owner) {
            if !thing.owned.contains(&attribute) {
                thing.owned.push(attribute);
                self.owners.entry(attribute).or_default().push(owner);
            }
        }
    }

    /// Remove a thing, its ownerships and its role plays. Relations left
    /// without players are removed as well.
    pub fn delete(&mut self, id: ThingId) {
        let Some(thing) = self.things.remove(&id) else {
            return;
        };
        if let Some(ids) = self.type_index.get_mut(&thing.type_name) {
            ids.remove(&id);
        }
        for attribute in &thing.owned {
            if let Some(owners) = self.owners.get_mut(attribute) {
                owners.retain(|o| *o != id);
            }
        }
        match &thing.data {
            ThingData::Relation { players } => {
                for (_, player) in players {
                    if let Some(relations) = self.plays.get_mut(player) {
                        relations.retain(|r| *r != id);
                    }
                }
            }
            ThingData::Attribute { value } => {
                self.attribute_index.remove(&(thing.type_name.clone(), value.key()));
                for owner in self.owners.remove(&id).unwrap_or_default() {
                    if let Some(o) = self.things.get_mut(&owner) {
                        o.owned.retain(|a| *a != id);
                    }
                }
            }
            ThingData::Entity => {}
        }
        let mut emptied = Vec::new();
        for relation in self.plays.remove(&id).unwrap_or_default() {
            if let Some(Thing { data: ThingData::Relation { players }, .. }) = self.things.get_mut(&relation) {
                players.retain(|(_, p)| *p != id);
                if players.is_empty() {
                    emptied.push(relation);
                }
            }
        }
        for relation in emptied {
            self.delete(relation);
        }
    }

    /// Remove every attribute with no owner and no role play.
    pub fn purge_orphan_attributes(&mut self) -> usize {
        let orphans: Vec<ThingId> = self
            .things
            .iter()
            .filter(|(id, t)| {
                matches!(t.data, ThingData::Attribute { .. })
                    && self.owners_of(**id).is_empty()
                    && self.relations_of(**id).is_empty()
            })
            .map(|(id, _)| *id)
            .collect();
        for id in &orphans {
            self.delete(*id);
        }
        orphans.len()
    }

    // ========================================================================
    // Describe
    // ========================================================================

    pub fn describe(&self, id: ThingId, id_attribute: &str) -> Option<ThingRecord> {
        let mut visited = HashSet::new();
        self.describe_from(id, None, id_attribute, &mut visited)
    }

    fn describe_from(
        &self,
        id: ThingId,
        via: Option<ThingId>,
        id_attribute: &str,
        visited: &mut HashSet<ThingId>,
    ) -> Option<ThingRecord> {
        let thing = self.things.get(&id)?;
        let attributes = self.attributes_of(thing);
        let players = match &thing.data {
            ThingData::Relation { players } => players
                .iter()
                .filter_map(|(role, p)| self.player_record(role, *p, Some(id), id_attribute, visited))
                .collect(),
            _ => Vec::new(),
        };

        let mut relations = Vec::new();
        for relation_id in self.relations_of(id) {
            if Some(*relation_id) == via || !visited.insert(*relation_id) {
                continue;
            }
            let Some(relation) = self.things.get(relation_id) else {
                continue;
            };
            let ThingData::Relation { players } = &relation.data else {
                continue;
            };
            let Some(own_index) = players.iter().position(|(_, p)| *p == id) else {
                continue;
            };
            let others = players
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != own_index)
                .filter_map(|(_, (role, p))| self.player_record(role, *p, Some(*relation_id), id_attribute, visited))
                .collect();
            relations.push(RelationInstance {
                type_name: relation.type_name.clone(),
                own_role: players[own_index].0.clone(),
                attributes: self.attributes_of(relation),
                players: others,
            });
        }

        Some(ThingRecord {
            type_name: thing.type_name.clone(),
            kind: thing.kind(),
            attributes,
            players,
            relations,
        })
    }

    fn player_record(
        &self,
        role: &str,
        player: ThingId,
        via: Option<ThingId>,
        id_attribute: &str,
        visited: &mut HashSet<ThingId>,
    ) -> Option<RolePlayerRecord> {
        let thing = self.things.get(&player)?;
        let record = match &thing.data {
            ThingData::Attribute { value } => Player::Attribute(AttributeRecord {
                type_name: thing.type_name.clone(),
                value: value.clone(),
            }),
            _ => match self.id_of(thing, id_attribute) {
                Some(object_id) => Player::Reference { type_name: thing.type_name.clone(), id: object_id },
                None => Player::Nested(Box::new(self.describe_from(player, via, id_attribute, visited)?)),
            },
        };
        Some(RolePlayerRecord { role: role.to_string(), player: record })
    }

    fn attributes_of(&self, thing: &Thing) -> Vec<AttributeRecord> {
        thing
            .owned
            .iter()
            .filter_map(|a| match self.things.get(a) {
                Some(Thing { type_name, data: ThingData::Attribute { value }, .. }) => {
                    Some(AttributeRecord { type_name: type_name.clone(), value: value.clone() })
                }
                _ => None,
            })
            .collect()
    }

    fn id_of(&self, thing: &Thing, id_attribute: &str) -> Option<String> {
        thing.owned.iter().find_map(|a| match self.things.get(a) {
            Some(Thing { type_name, data: ThingData::Attribute { value: Literal::String(s) }, .. })
                if type_name == id_attribute =>
            {
                Some(s.clone())
            }
            _ => None,
        })
    }
}

fn root_matches(thing: &Thing, type_name: &str) -> bool {
    match type_name {
        "thing" => true,
        "entity" => matches!(thing.data, ThingData::Entity),
        "relation" => matches!(thing.data, ThingData::Relation { .. }),
        "attribute" => matches!(thing.data, ThingData::Attribute { .. }),
        _ => false,
    }
}

/// `child` equals `ancestor` or inherits from it.
pub(crate) fn is_subtype(child: &str, ancestor: &str, hierarchy: &HashMap<String, String>) -> bool {
    let mut current = child;
    // bounded in case of a malformed cycle
    for _ in 0..=hierarchy.len() {
        if current == ancestor {
            return true;
        }
        match hierarchy.get(current) {
            Some(parent) => current = parent,
            None => return false,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_are_unique() {
        let mut g = Graph::default();
        let a = g.put_attribute("name", Literal::from("x"));
        let b = g.put_attribute("name", Literal::from("x"));
        let c = g.put_attribute("label", Literal::from("x"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_delete_prunes_empty_relations() {
        let mut g = Graph::default();
        let e = g.insert_entity("identity");
        let r = g.insert_relation("hashes", vec![("owner".into(), e)]);
        g.delete(e);
        assert!(g.get(r).is_none());
        assert_eq!(g.len(), 0);
    }

    #[test]
    fn test_purge_orphans() {
        let mut g = Graph::default();
        let e = g.insert_entity("identity");
        let kept = g.put_attribute("name", Literal::from("kept"));
        g.add_ownership(e, kept);
        g.put_attribute("name", Literal::from("orphan"));
        assert_eq!(g.purge_orphan_attributes(), 1);
        assert!(g.get(kept).is_some());
    }

    #[test]
    fn test_subtype_walk() {
        let mut h = HashMap::new();
        h.insert("uses".to_string(), "stix-core-relationship".to_string());
        h.insert("stix-core-relationship".to_string(), "stix-relationship-object".to_string());
        assert!(is_subtype("uses", "stix-relationship-object", &h));
        assert!(!is_subtype("stix-core-relationship", "uses", &h));
    }
}
