//! Matching of mutation sets against rule conditions.

use std::collections::BTreeSet;

use crate::{
    algorithm::condition::{Condition, MutationPredicate, Select},
    mutations::MutationSet,
};

/// Outcome of matching one condition.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct MatchResult {
    /// Whether the condition holds.
    pub satisfied: bool,
    /// Positions consumed by the match; empty if not satisfied.
    pub positions: BTreeSet<u32>,
}

impl MatchResult {
    /// A failed match.
    pub fn unsatisfied() -> Self {
        Self::default()
    }

    /// A successful match consuming `positions`.
    pub fn satisfied_with(positions: BTreeSet<u32>) -> Self {
        Self {
            satisfied: true,
            positions,
        }
    }
}

/// Whether the set carries a residue of `predicate` at its position.
///
/// Mixtures match on any shared residue.  Predicates never contain `X`, so an
/// ambiguous call only matches through the other residues of its mixture.
pub fn predicate_matches(predicate: &MutationPredicate, mutations: &MutationSet) -> bool {
    mutations
        .get(predicate.position)
        .is_some_and(|m| m.intersects(&predicate.aas))
}

/// Match `condition` against `mutations`.
///
/// AND stops at the first unsatisfied child.  OR inspects all children and
/// consumes the positions of every satisfied one.  NOT consumes nothing.
pub fn matches(condition: &Condition, mutations: &MutationSet) -> MatchResult {
    match condition {
        Condition::Mutation(predicate) => {
            if predicate_matches(predicate, mutations) {
                MatchResult::satisfied_with(BTreeSet::from([predicate.position]))
            } else {
                MatchResult::unsatisfied()
            }
        }
        Condition::Select(select) => matches_select(select, mutations),
        Condition::And(children) => {
            let mut positions = BTreeSet::new();
            for child in children {
                let result = matches(child, mutations);
                if !result.satisfied {
                    return MatchResult::unsatisfied();
                }
                positions.extend(result.positions);
            }
            MatchResult::satisfied_with(positions)
        }
        Condition::Or(children) => {
            let mut satisfied = false;
            let mut positions = BTreeSet::new();
            for result in children.iter().map(|child| matches(child, mutations)) {
                if result.satisfied {
                    satisfied = true;
                    positions.extend(result.positions);
                }
            }
            if satisfied {
                MatchResult::satisfied_with(positions)
            } else {
                MatchResult::unsatisfied()
            }
        }
        Condition::Not(child) => MatchResult {
            satisfied: !matches(child, mutations).satisfied,
            positions: BTreeSet::new(),
        },
    }
}

fn matches_select(select: &Select, mutations: &MutationSet) -> MatchResult {
    let positions: BTreeSet<u32> = select
        .members
        .iter()
        .filter(|member| predicate_matches(member, mutations))
        .map(|member| member.position)
        .collect();
    let count = positions.len();
    if count >= select.min && select.max.map_or(true, |max| count <= max) {
        MatchResult::satisfied_with(positions)
    } else {
        MatchResult::unsatisfied()
    }
}
