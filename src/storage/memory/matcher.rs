//! Conjunctive pattern matching over the in-memory graph.
//!
//! Backtracking search: at each step the unbound variable with the fewest
//! candidates is bound next, and every clause whose variables are all bound
//! is checked immediately.

use hashbrown::{HashMap, HashSet};

use super::graph::{Graph, ThingData, ThingId};
use crate::query::{Clause, Pattern, RolePlayer, Var};

pub(crate) type Bindings = HashMap<Var, ThingId>;

pub(crate) struct Matcher<'g> {
    graph: &'g Graph,
    hierarchy: &'g HashMap<String, String>,
    clauses: &'g [Clause],
    vars: Vec<&'g Var>,
}

impl<'g> Matcher<'g> {
    pub fn new(graph: &'g Graph, hierarchy: &'g HashMap<String, String>, pattern: &'g Pattern) -> Self {
        let mut seen = HashSet::new();
        let vars = pattern
            .iter()
            .flat_map(|clause| clause.vars())
            .filter(|var| seen.insert(*var))
            .collect();
        Self { graph, hierarchy, clauses: pattern.clauses(), vars }
    }

    /// Every answer to the pattern.
    pub fn answers(&self) -> Vec<Bindings> {
        let mut answers = Vec::new();
        let mut bindings = Bindings::new();
        self.search(&mut bindings, &mut answers);
        answers
    }

    fn search(&self, bindings: &mut Bindings, answers: &mut Vec<Bindings>) {
        let bound: &Bindings = bindings;
        let next = self
            .vars
            .iter()
            .copied()
            .filter(|var| !bound.contains_key(*var))
            .map(|var| (var, self.candidates(var, bound)))
            .min_by_key(|(_, candidates)| candidates.len());
        let Some((var, candidates)) = next else {
            answers.push(bindings.clone());
            return;
        };
        for candidate in candidates {
            bindings.insert(var.clone(), candidate);
            if self.consistent(var, bindings) {
                self.search(bindings, answers);
            }
            bindings.remove(var);
        }
    }

    /// Clauses mentioning `var` whose variables are now all bound must hold.
    fn consistent(&self, var: &Var, bindings: &Bindings) -> bool {
        self.clauses
            .iter()
            .filter(|clause| clause.mentions(var))
            .filter(|clause| clause.vars().iter().all(|v| bindings.contains_key(*v)))
            .all(|clause| self.holds(clause, bindings))
    }

    fn holds(&self, clause: &Clause, bindings: &Bindings) -> bool {
        let graph = self.graph;
        match clause {
            Clause::Isa { var, type_name } => graph.isa(bindings[var], type_name, self.hierarchy),
            Clause::Has { var, attribute, value } => match graph.attribute(attribute, value) {
                Some(attr) => graph.get(bindings[var]).is_some_and(|t| t.owned.contains(&attr)),
                None => false,
            },
            Clause::HasVar { var, attribute } => {
                graph.get(bindings[var]).is_some_and(|t| t.owned.contains(&bindings[attribute]))
            }
            Clause::Attribute { var, type_name, value } => graph.attribute(type_name, value) == Some(bindings[var]),
            Clause::Relation { var, type_name, players } => {
                let relation = bindings[var];
                graph.isa(relation, type_name, self.hierarchy) && self.plays_all(relation, players, bindings)
            }
        }
    }

    /// Every required role play is present, counted as a multiset.
    fn plays_all(&self, relation: ThingId, required: &[RolePlayer], bindings: &Bindings) -> bool {
        let Some(ThingData::Relation { players }) = self.graph.get(relation).map(|t| &t.data) else {
            return false;
        };
        let mut used = vec![false; players.len()];
        required.iter().all(|rp| {
            let player = bindings[&rp.player];
            let found = players
                .iter()
                .enumerate()
                .position(|(i, (role, p))| !used[i] && *role == rp.role && *p == player);
            match found {
                Some(i) => {
                    used[i] = true;
                    true
                }
                None => false,
            }
        })
    }

    /// A superset of the things `var` can bind to, given current bindings.
    fn candidates(&self, var: &Var, bindings: &Bindings) -> Vec<ThingId> {
        let graph = self.graph;
        let mut fallback = None;
        for clause in self.clauses {
            match clause {
                Clause::Has { var: v, attribute, value } if v == var => {
                    return match graph.attribute(attribute, value) {
                        Some(attr) => graph.owners_of(attr).to_vec(),
                        None => Vec::new(),
                    };
                }
                Clause::Attribute { var: v, type_name, value } if v == var => {
                    return graph.attribute(type_name, value).into_iter().collect();
                }
                Clause::Relation { var: v, players, .. } if v == var => {
                    if let Some(bound) = players.iter().find_map(|rp| bindings.get(&rp.player)) {
                        return graph.relations_of(*bound).to_vec();
                    }
                }
                Clause::Relation { var: relation, players, .. } if players.iter().any(|rp| rp.player == *var) => {
                    if let Some(Some(ThingData::Relation { players })) =
                        bindings.get(relation).map(|r| graph.get(*r).map(|t| &t.data))
                    {
                        let mut ids: Vec<ThingId> = players.iter().map(|(_, p)| *p).collect();
                        ids.sort();
                        ids.dedup();
                        return ids;
                    }
                }
                Clause::Isa { var: v, type_name } | Clause::Relation { var: v, type_name, .. }
                    if v == var && fallback.is_none() =>
                {
                    fallback = Some(graph.of_type(type_name, self.hierarchy));
                }
                _ => {}
            }
        }
        fallback.unwrap_or_else(|| graph.all())
    }
}
