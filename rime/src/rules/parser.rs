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

//! Parser for the constraints DSL. See the [module documentation](super) for the line grammar.

use super::{CondKind, CondSource, Condition, Requirements, RulesError};
use crate::constraints::ConstraintKind;

use log::*;
use regex::Regex;
use std::fs::read_to_string;

/// Read and parse a rules file. The returned [`Requirements`] is already finalized.
pub fn parse_rules_file(filename: impl AsRef<str>) -> Result<Requirements, RulesError> {
    parse_rules(&read_to_string(filename.as_ref())?)
}

/// Parse the constraints DSL from its textual representation. The returned [`Requirements`]
/// is already finalized.
///
/// Line shapes are tried in order: comments and blanks, `atom(X)`, `name = literal`,
/// `name = { a, b, c }`, and `[:group:prio:]keyword(args) <= cond ^ cond ^ …`. Anything else
/// is logged and skipped.
pub fn parse_rules(data: &str) -> Result<Requirements, RulesError> {
    let re_atom = Regex::new(r"^([A-Za-z0-9_]+)\(([A-Za-z0-9_]+)\)$").unwrap();
    let re_alias = Regex::new(r"^([A-Za-z0-9_]+) = ([A-Za-z0-9_]+)$").unwrap();
    let re_set = Regex::new(r"^([A-Za-z0-9_]+) = \{(.*)\}$").unwrap();
    let re_group = Regex::new(r"^:([0-9]+):([0-9]+):(.*)$").unwrap();
    let re_constraint = Regex::new(r"^([A-Za-z0-9_]+)\((.*)\) <= (.*)$").unwrap();

    let mut reqs = Requirements::new();

    for (i, line) in data.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(caps) = re_atom.captures(line) {
            let atom = &caps[1];
            let target = &caps[2];
            match reqs.sets.get(target) {
                // an atom applied to a set name applies to each of its elements
                Some(elements) => {
                    for e in elements.clone() {
                        reqs.add_atom(atom, &e);
                    }
                }
                None => reqs.add_atom(atom, target),
            }
            continue;
        }

        if let Some(caps) = re_alias.captures(line) {
            reqs.add_alias(&caps[1], &caps[2]);
            continue;
        }

        if let Some(caps) = re_set.captures(line) {
            let elements: Vec<String> = caps[2]
                .split(',')
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect();
            reqs.add_set(&caps[1], elements);
            continue;
        }

        // an optional `:group:prio:` prefix places the constraint into a group
        let (group, prio, rest) = match re_group.captures(line) {
            Some(caps) => {
                let group: u32 = caps[1].parse().unwrap_or(0);
                let prio: u32 = caps[2].parse().unwrap_or(0);
                (group, prio, caps.get(3).map(|m| m.as_str()).unwrap_or("").to_string())
            }
            None => (0, 0, line.to_string()),
        };

        if let Some(caps) = re_constraint.captures(&rest) {
            let keyword = &caps[1];
            let args = &caps[2];
            let conds = parse_conditions(i, &caps[3])?;

            let kind = ConstraintKind::from_keyword(keyword).ok_or_else(|| {
                RulesError::UnknownKeyword { line: i, keyword: keyword.to_string() }
            })?;
            let data = kind.handler().parse(args)?;

            reqs.add_constraint(kind, conds, data, group, prio);
            continue;
        }

        warn!("Skipping unknown line {}: {}", i, line);
    }

    reqs.finalize();
    Ok(reqs)
}

/// Parse the condition list of a constraint, `cond ^ cond ^ …`, with all whitespace removed.
fn parse_conditions(line: usize, conds: &str) -> Result<Vec<Condition>, RulesError> {
    let re_atom = Regex::new(r"^(.*)\((.*)\)$").unwrap();
    let re_equal = Regex::new(r"^(.*)=(.*)$").unwrap();

    let stripped: String = conds.chars().filter(|c| !c.is_whitespace()).collect();
    let mut result = Vec::new();

    for cond in stripped.split('^') {
        if let Some(caps) = re_atom.captures(cond) {
            let source = CondSource::from_name(&caps[2]).ok_or_else(|| {
                RulesError::UnknownVariable { line, var: caps[2].to_string() }
            })?;
            result.push(Condition { kind: CondKind::Atom, source, target: caps[1].to_string() });
        } else if let Some(caps) = re_equal.captures(cond) {
            let source = CondSource::from_name(&caps[1]).ok_or_else(|| {
                RulesError::UnknownVariable { line, var: caps[1].to_string() }
            })?;
            result.push(Condition { kind: CondKind::Equal, source, target: caps[2].to_string() });
        } else {
            return Err(RulesError::InvalidCondition { line, cond: cond.to_string() });
        }
    }

    Ok(result)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constraints::ConstraintData;

    const RULES: &str = "\
# sample policy
Lan = { h4, h5 }
lan(Lan)
lan(h6)
Web = h6

allow(F) <= Hs=h4 ^ Ht=h5
deny(F) <= Hs=h5 ^ Ht=h4
delay(F, 5.0) <= Hs=h4 ^ Ht=h5
path(F, 's1,s2') <= Hs=h4 ^ Ht=h5
:1:1:path(F, 's1,s2,s4', 0.5) <= Hs=h4 ^ Ht=h6
:1:2:path(F, 's1,s3,s4', 0.5) <= Hs=h4 ^ Ht=h6
";

    #[test]
    fn parse_full_file() {
        let reqs = parse_rules(RULES).unwrap();

        assert_eq!(reqs.sets.get("Lan").unwrap(), &vec!["h4".to_string(), "h5".to_string()]);
        assert_eq!(
            reqs.atoms.get("lan").unwrap(),
            &vec!["h4".to_string(), "h5".to_string(), "h6".to_string()]
        );
        assert_eq!(reqs.aliases.get("Web").unwrap(), "h6");

        assert_eq!(reqs.constraints.len(), 6);
        assert_eq!(reqs.groups.len(), 1);
        assert_eq!(reqs.groups.get(&1).unwrap().members.len(), 2);

        // allow and delay and the first path share (Hs=h4, Ht=h5); deny and the grouped pair
        // each have their own tuple
        assert_eq!(reqs.conditions.len(), 3);
        let shared = &reqs.conditions[0];
        assert_eq!(shared.members, vec![0, 2, 3]);
        let grouped = &reqs.conditions[2];
        assert_eq!(grouped.members, vec![4, 5]);
    }

    #[test]
    fn group_prefix_sets_priority() {
        let reqs = parse_rules(RULES).unwrap();
        let grp = reqs.groups.get(&1).unwrap();
        assert_eq!(reqs.constraints[grp.members[0]].prio, 1);
        assert_eq!(reqs.constraints[grp.members[1]].prio, 2);
        assert!((reqs.constraints[grp.members[0]].srate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn condition_shapes() {
        let reqs = parse_rules("allow(F) <= lan(Hs) ^ Ht=h5 ^ Prot=icmp").unwrap();
        let conds = &reqs.constraints[0].conditions;
        assert_eq!(
            conds[0],
            Condition {
                kind: CondKind::Atom,
                source: CondSource::SourceHost,
                target: "lan".to_string()
            }
        );
        assert_eq!(
            conds[1],
            Condition {
                kind: CondKind::Equal,
                source: CondSource::TargetHost,
                target: "h5".to_string()
            }
        );
        assert_eq!(
            conds[2],
            Condition {
                kind: CondKind::Equal,
                source: CondSource::Protocol,
                target: "icmp".to_string()
            }
        );
    }

    #[test]
    fn unknown_lines_are_skipped() {
        let reqs = parse_rules("this is not a rule\nallow(F) <= Hs=h4").unwrap();
        assert_eq!(reqs.constraints.len(), 1);
    }

    #[test]
    fn unknown_keyword_is_fatal() {
        assert!(matches!(
            parse_rules("forbid(F) <= Hs=h4"),
            Err(RulesError::UnknownKeyword { .. })
        ));
    }

    #[test]
    fn unknown_variable_is_fatal() {
        assert!(matches!(
            parse_rules("allow(F) <= Hx=h4"),
            Err(RulesError::UnknownVariable { .. })
        ));
    }

    #[test]
    fn bad_arguments_are_fatal() {
        assert!(matches!(
            parse_rules("delay(F, soon) <= Hs=h4"),
            Err(RulesError::InvalidArguments { .. })
        ));
        assert!(matches!(
            parse_rules("path(F, 's1,,s2') <= Hs=h4"),
            Err(RulesError::InvalidArguments { .. }) | Err(RulesError::PathExpression(_))
        ));
    }
}
