// Rime: Runtime Verification of OpenFlow Forwarding Policies
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! # Rules
//!
//! The constraints DSL and the [`Requirements`] structure it parses into. A rules file is
//! line-oriented:
//!
//! ```text
//! # atoms, sets and aliases
//! Lan = { h4, h5 }
//! lan(Lan)
//! Web = h6
//!
//! # constraints, optionally grouped as :group:priority:
//! allow(F) <= Hs=h4 ^ Ht=h5
//! delay(F, 5.0) <= Hs=h4 ^ Ht=h5
//! :1:1:path(F, 's1,s2,s4', 0.5) <= Hs=h4 ^ Ht=h6
//! :1:2:path(F, 's1,s3,s4', 0.5) <= Hs=h4 ^ Ht=h6
//! ```
//!
//! `finalize` flattens the structure and deduplicates the condition tuples into
//! [`GroupCondition`]s. Each group condition receives a process-unique 16-bit id which is
//! carried in the `ip.id` field of every probe generated for it, bridging the generator to the
//! checker.

mod parser;
pub use parser::{parse_rules, parse_rules_file};

use crate::constraints::{ConstraintData, ConstraintKind};
use crate::fsm::RegexError;
use crate::NodeId;

use itertools::Itertools;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

/// The variable a condition constrains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CondSource {
    /// `Hs`, the source host of the flow
    SourceHost,
    /// `Ht`, the target host of the flow
    TargetHost,
    /// `Prot`, the protocol of the flow
    Protocol,
}

impl CondSource {
    /// Look up a variable by its DSL name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Hs" => Some(Self::SourceHost),
            "Ht" => Some(Self::TargetHost),
            "Prot" => Some(Self::Protocol),
            _ => None,
        }
    }

    /// The DSL name of the variable.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SourceHost => "Hs",
            Self::TargetHost => "Ht",
            Self::Protocol => "Prot",
        }
    }
}

impl fmt::Display for CondSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The shape of a single condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CondKind {
    /// `Var = literal`
    Equal,
    /// `atom(Var)`: the variable must be a member of the named atom
    Atom,
}

/// A single condition of a constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Condition {
    /// Shape of the condition
    pub kind: CondKind,
    /// The constrained variable
    pub source: CondSource,
    /// Equality target (a literal) or the atom name
    pub target: String,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            CondKind::Equal => write!(f, "{} = {}", self.source, self.target),
            CondKind::Atom => write!(f, "{}({})", self.target, self.source),
        }
    }
}

/// A deduplicated tuple of conditions, shared by one or more constraints. Its `iid` is the
/// on-wire flow identifier carried in `ip.id` of every probe generated for it.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupCondition {
    /// The conditions shared by the member constraints
    pub conds: Vec<Condition>,
    /// Indices into [`Requirements::constraints`] of the member constraints
    pub members: Vec<usize>,
    /// Process-unique 16-bit id of this group condition
    pub iid: u16,
}

/// A single policy assertion over the flows matching its conditions.
#[derive(Debug, Clone)]
pub struct SingleConstraint {
    /// Kind of the constraint
    pub kind: ConstraintKind,
    /// Conditions selecting the flows this constraint applies to
    pub conditions: Vec<Condition>,
    /// Kind-specific payload, parsed by the handler
    pub data: ConstraintData,
    /// Group label (0 if ungrouped)
    pub group: u32,
    /// Priority level inside the group (0 if ungrouped)
    pub prio: u32,
    /// Minimum fraction of traces that must satisfy the constraint
    pub srate: f64,
    /// Fraction of traces that did satisfy the constraint, set by the handler
    pub observed_rate: f64,
    /// Verdict, set by the handler
    pub verified: bool,
    /// Process-unique id of this constraint
    pub iid: u32,
}

impl SingleConstraint {
    /// Create a new constraint. The required success rate is taken from the payload for path
    /// constraints and defaults to 1 otherwise.
    pub fn new(
        iid: u32,
        kind: ConstraintKind,
        conditions: Vec<Condition>,
        data: ConstraintData,
        group: u32,
        prio: u32,
    ) -> Self {
        let srate = match &data {
            ConstraintData::Path { rate, .. } => *rate,
            _ => 1.0,
        };
        Self {
            kind,
            conditions,
            data,
            group,
            prio,
            srate,
            observed_rate: 0.0,
            verified: false,
            iid,
        }
    }

    /// True if the observed rate reaches the required success rate.
    pub fn check(&self) -> bool {
        self.observed_rate >= self.srate
    }

    /// Probe samples requested by the handler at generation time, if any.
    pub fn requested_samples(&self) -> Option<usize> {
        match &self.data {
            ConstraintData::Path { samples, .. } => *samples,
            _ => None,
        }
    }
}

impl fmt::Display for SingleConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group != 0 {
            write!(f, ":{}:{}:", self.group, self.prio)?;
        }
        write!(f, "{}({})", self.kind.keyword(), self.kind.handler().repr(&self.data))?;
        if !self.conditions.is_empty() {
            write!(f, " <= {}", self.conditions.iter().map(|c| c.to_string()).join(" ^ "))?;
        }
        Ok(())
    }
}

/// An ordered set of constraints at distinct priority levels. The group is satisfied iff
/// exactly one priority level has at least one verified member: priority levels express backup
/// semantics, so a traffic class must use its primary path or its fallback, never both.
#[derive(Debug, Clone)]
pub struct GroupConstraint {
    /// Group label
    pub id: u32,
    /// Indices into [`Requirements::constraints`] of the member constraints
    pub members: Vec<usize>,
    /// Verdict, set by group evaluation
    pub verified: bool,
}

/// Everything parsed from a rules file.
#[derive(Debug, Clone, Default)]
pub struct Requirements {
    /// Atom name to the hosts it applies to
    pub atoms: HashMap<String, Vec<String>>,
    /// Set name to its literals
    pub sets: HashMap<String, Vec<String>>,
    /// Alias name to its literal
    pub aliases: HashMap<String, String>,
    /// All single constraints, grouped and ungrouped
    pub constraints: Vec<SingleConstraint>,
    /// Group constraints by group label
    pub groups: BTreeMap<u32, GroupConstraint>,
    /// Deduplicated group conditions, populated by [`finalize`](Requirements::finalize)
    pub conditions: Vec<GroupCondition>,
    next_constraint_id: u32,
    next_condition_id: u16,
}

impl Requirements {
    /// Create an empty requirements structure.
    pub fn new() -> Self {
        Self { next_constraint_id: 1, next_condition_id: 1, ..Default::default() }
    }

    /// Register a host for an atom.
    pub fn add_atom(&mut self, atom: &str, target: &str) {
        self.atoms.entry(atom.to_string()).or_default().push(target.to_string());
    }

    /// Register an alias.
    pub fn add_alias(&mut self, var: &str, target: &str) {
        self.aliases.insert(var.to_string(), target.to_string());
    }

    /// Register a set.
    pub fn add_set(&mut self, var: &str, targets: Vec<String>) {
        self.sets.insert(var.to_string(), targets);
    }

    /// Add a constraint, allocating its id. Constraints with a non-zero group label are also
    /// registered in their group.
    pub fn add_constraint(
        &mut self,
        kind: ConstraintKind,
        conditions: Vec<Condition>,
        data: ConstraintData,
        group: u32,
        prio: u32,
    ) {
        let iid = self.next_constraint_id;
        self.next_constraint_id += 1;
        let idx = self.constraints.len();
        self.constraints.push(SingleConstraint::new(iid, kind, conditions, data, group, prio));
        if group != 0 {
            self.groups
                .entry(group)
                .or_insert_with(|| GroupConstraint { id: group, members: Vec::new(), verified: false })
                .members
                .push(idx);
        }
    }

    /// Deduplicate the condition tuples of all constraints into [`GroupCondition`]s, each
    /// receiving a process-unique id. Constraints sharing the same canonical condition tuple
    /// share one group condition, and therefore one probe flow.
    pub fn finalize(&mut self) {
        for idx in 0..self.constraints.len() {
            let canonical: Vec<String> = self.constraints[idx]
                .conditions
                .iter()
                .map(|c| c.to_string())
                .sorted()
                .collect();

            let existing = self.conditions.iter().position(|gc| {
                gc.conds.iter().map(|c| c.to_string()).sorted().eq(canonical.iter().cloned())
            });

            match existing {
                Some(pos) => self.conditions[pos].members.push(idx),
                None => {
                    let iid = self.next_condition_id;
                    self.next_condition_id += 1;
                    self.conditions.push(GroupCondition {
                        conds: self.constraints[idx].conditions.clone(),
                        members: vec![idx],
                        iid,
                    });
                }
            }
        }
    }

    /// Translate a host literal like `h4` to its node id, resolving aliases first. Returns
    /// `None` for anything that is not a host literal.
    pub fn host_to_node(&self, host: &str) -> Option<NodeId> {
        let host = self.aliases.get(host).map(|s| s.as_str()).unwrap_or(host);
        host.strip_prefix('h')?.parse().ok()
    }

    /// Evaluate all group constraints: a group is satisfied iff exactly one priority level has
    /// at least one verified member.
    pub fn evaluate_groups(&mut self) {
        let constraints = &self.constraints;
        for grp in self.groups.values_mut() {
            let mut prios: BTreeMap<u32, bool> = BTreeMap::new();
            for idx in &grp.members {
                let constr = &constraints[*idx];
                let satisfied = prios.entry(constr.prio).or_insert(false);
                *satisfied = *satisfied || constr.verified;
            }
            let cnt = prios.values().filter(|s| **s).count();
            grp.verified = cnt == 1;
        }
    }

    /// Number of unsatisfied top-level constraints: ungrouped single constraints that did not
    /// verify, plus groups that did not verify.
    pub fn unsatisfied_count(&self) -> usize {
        let singles = self
            .constraints
            .iter()
            .filter(|c| c.group == 0 && !c.verified)
            .count();
        let groups = self.groups.values().filter(|g| !g.verified).count();
        singles + groups
    }
}

/// Errors raised while parsing a rules file. All of them are fatal configuration errors;
/// unrecognised lines are merely logged and skipped.
#[derive(Debug, Error)]
pub enum RulesError {
    /// Io Error
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),
    /// The constraint keyword is not one of `allow`, `deny`, `delay`, `path`
    #[error("Unknown constraint keyword on line {line}: {keyword}")]
    UnknownKeyword {
        /// Line number of the offending line
        line: usize,
        /// The offending keyword
        keyword: String,
    },
    /// The argument string does not match the handler's grammar
    #[error("Invalid arguments for {keyword}: {args}")]
    InvalidArguments {
        /// Keyword of the handler that rejected the arguments
        keyword: &'static str,
        /// The offending argument string
        args: String,
    },
    /// A condition is neither `Var = literal` nor `atom(Var)`
    #[error("Invalid condition on line {line}: {cond}")]
    InvalidCondition {
        /// Line number of the offending line
        line: usize,
        /// The offending condition
        cond: String,
    },
    /// A condition references a variable outside `Hs`, `Ht`, `Prot`
    #[error("Unknown condition variable on line {line}: {var}")]
    UnknownVariable {
        /// Line number of the offending line
        line: usize,
        /// The offending variable
        var: String,
    },
    /// A path constraint carries a broken path expression
    #[error("Invalid path expression: {0}")]
    PathExpression(#[from] RegexError),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constraints::ConstraintData;

    fn cond(source: CondSource, target: &str) -> Condition {
        Condition { kind: CondKind::Equal, source, target: target.to_string() }
    }

    #[test]
    fn finalize_deduplicates_equal_tuples() {
        let mut reqs = Requirements::new();
        let conds =
            vec![cond(CondSource::SourceHost, "h4"), cond(CondSource::TargetHost, "h5")];
        let reversed: Vec<Condition> = conds.iter().rev().cloned().collect();
        reqs.add_constraint(ConstraintKind::Allow, conds.clone(), ConstraintData::Flow, 0, 0);
        reqs.add_constraint(ConstraintKind::Deny, reversed, ConstraintData::Flow, 0, 0);
        reqs.add_constraint(
            ConstraintKind::Allow,
            vec![cond(CondSource::SourceHost, "h4")],
            ConstraintData::Flow,
            0,
            0,
        );
        reqs.finalize();

        assert_eq!(reqs.conditions.len(), 2);
        assert_eq!(reqs.conditions[0].members, vec![0, 1]);
        assert_eq!(reqs.conditions[1].members, vec![2]);
    }

    #[test]
    fn finalize_assigns_unique_ids() {
        let mut reqs = Requirements::new();
        for i in 0..5u16 {
            reqs.add_constraint(
                ConstraintKind::Allow,
                vec![cond(CondSource::SourceHost, &format!("h{}", i))],
                ConstraintData::Flow,
                0,
                0,
            );
        }
        reqs.finalize();
        let mut ids: Vec<u16> = reqs.conditions.iter().map(|gc| gc.iid).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 5);
    }

    #[test]
    fn group_satisfied_with_one_level() {
        let mut reqs = Requirements::new();
        reqs.add_constraint(ConstraintKind::Allow, vec![], ConstraintData::Flow, 1, 1);
        reqs.add_constraint(ConstraintKind::Allow, vec![], ConstraintData::Flow, 1, 2);
        reqs.finalize();
        reqs.constraints[0].verified = true;
        reqs.evaluate_groups();
        assert!(reqs.groups.get(&1).unwrap().verified);
        assert_eq!(reqs.unsatisfied_count(), 0);
    }

    #[test]
    fn group_not_satisfied_with_two_levels() {
        // both the primary and the backup path carried traffic
        let mut reqs = Requirements::new();
        reqs.add_constraint(ConstraintKind::Allow, vec![], ConstraintData::Flow, 1, 1);
        reqs.add_constraint(ConstraintKind::Allow, vec![], ConstraintData::Flow, 1, 2);
        reqs.finalize();
        reqs.constraints[0].verified = true;
        reqs.constraints[1].verified = true;
        reqs.evaluate_groups();
        assert!(!reqs.groups.get(&1).unwrap().verified);
        assert_eq!(reqs.unsatisfied_count(), 1);
    }

    #[test]
    fn group_not_satisfied_with_zero_levels() {
        let mut reqs = Requirements::new();
        reqs.add_constraint(ConstraintKind::Allow, vec![], ConstraintData::Flow, 1, 1);
        reqs.add_constraint(ConstraintKind::Allow, vec![], ConstraintData::Flow, 1, 2);
        reqs.finalize();
        reqs.evaluate_groups();
        assert!(!reqs.groups.get(&1).unwrap().verified);
    }

    #[test]
    fn two_verified_members_on_one_level_count_once() {
        let mut reqs = Requirements::new();
        reqs.add_constraint(ConstraintKind::Allow, vec![], ConstraintData::Flow, 1, 1);
        reqs.add_constraint(ConstraintKind::Deny, vec![], ConstraintData::Flow, 1, 1);
        reqs.add_constraint(ConstraintKind::Allow, vec![], ConstraintData::Flow, 1, 2);
        reqs.finalize();
        reqs.constraints[0].verified = true;
        reqs.constraints[1].verified = true;
        reqs.evaluate_groups();
        assert!(reqs.groups.get(&1).unwrap().verified);
    }

    #[test]
    fn unsatisfied_count_mixes_singles_and_groups() {
        let mut reqs = Requirements::new();
        reqs.add_constraint(ConstraintKind::Allow, vec![], ConstraintData::Flow, 0, 0);
        reqs.add_constraint(ConstraintKind::Allow, vec![], ConstraintData::Flow, 1, 1);
        reqs.finalize();
        assert_eq!(reqs.unsatisfied_count(), 2);
        reqs.constraints[0].verified = true;
        reqs.constraints[1].verified = true;
        reqs.evaluate_groups();
        assert_eq!(reqs.unsatisfied_count(), 0);
    }

    #[test]
    fn host_resolution() {
        let mut reqs = Requirements::new();
        reqs.add_alias("Web", "h6");
        assert_eq!(reqs.host_to_node("h4"), Some(4));
        assert_eq!(reqs.host_to_node("Web"), Some(6));
        assert_eq!(reqs.host_to_node("s1"), None);
        assert_eq!(reqs.host_to_node("nonsense"), None);
    }

    #[test]
    fn display_round_trip() {
        let c = SingleConstraint::new(
            1,
            ConstraintKind::Allow,
            vec![cond(CondSource::SourceHost, "h4"), cond(CondSource::TargetHost, "h5")],
            ConstraintData::Flow,
            0,
            0,
        );
        assert_eq!(c.to_string(), "allow(F) <= Hs = h4 ^ Ht = h5");

        let c = SingleConstraint::new(
            2,
            ConstraintKind::Path,
            vec![cond(CondSource::SourceHost, "h4")],
            ConstraintData::Path { expr: "s1,s2".to_string(), rate: 0.5, samples: Some(10) },
            1,
            2,
        );
        assert_eq!(c.to_string(), ":1:2:path(F, 's1,s2', 0.5) <= Hs = h4");
    }
}
