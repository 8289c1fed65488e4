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

//! # Path-Regex Engine
//!
//! Compiles a regular path expression (like `s1,.*,s4`) into a deterministic finite automaton
//! matching observed switch sequences. The pipeline is the textbook one:
//!
//! 1. [`parse`] the expression into an AST,
//! 2. translate the AST into an ε-NFA with Thompson's construction,
//! 3. eliminate ε-transitions by loop reduction,
//! 4. determinise with the Rabin-Scott subset construction.
//!
//! The wildcard `.` is a first-class symbol of the automaton: a state holding both a concrete
//! transition and a wildcard transition towards the same target keeps only the wildcard edge,
//! and at run time the wildcard edge is consulted only if no concrete edge applies.
//!
//! Use [`compile`] to run the whole pipeline, and [`Fsm::accepts`] to match a switch sequence.

mod parser;
pub use parser::{parse, Ast, RegexError};

use crate::NodeId;

use log::*;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;

/// A transition symbol of the automaton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Symbol {
    /// The empty word (only present in intermediate NFAs)
    Epsilon,
    /// The wildcard `.`, matching any single switch
    Wildcard,
    /// A concrete switch literal `sN`
    Switch(u16),
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Epsilon => write!(f, "ε"),
            Self::Wildcard => write!(f, "."),
            Self::Switch(id) => write!(f, "s{}", id),
        }
    }
}

/// Finite state machine over [`Symbol`]s. Represents an NFA or, after
/// [`to_dfa`](Fsm::to_dfa), a DFA. The start state is always state 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fsm {
    states: BTreeMap<usize, BTreeMap<Symbol, Vec<usize>>>,
    accepting: BTreeSet<usize>,
    dfa: bool,
    last_state: usize,
}

/// Compile a regular path expression into a DFA.
pub fn compile(expr: &str) -> Result<Fsm, RegexError> {
    let ast = parse(expr)?;
    let mut nfa = Fsm::from_ast(&ast);
    nfa.remove_epsilon();
    Ok(nfa.to_dfa())
}

impl Fsm {
    /// Create an empty automaton.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of states.
    pub fn state_size(&self) -> usize {
        self.states.len()
    }

    /// True if the automaton went through subset construction.
    pub fn is_dfa(&self) -> bool {
        self.dfa
    }

    /// Add a transition from `state` to `next_state` on `symbol`.
    ///
    /// A concrete transition and a wildcard transition of the same state targeting the same
    /// next state collapse to the wildcard edge, whichever of the two is added first.
    pub fn add_transition(&mut self, state: usize, symbol: Symbol, next_state: usize) {
        self.states.entry(next_state).or_insert_with(BTreeMap::new);
        let trans = self.states.entry(state).or_insert_with(BTreeMap::new);

        match symbol {
            Symbol::Wildcard => {
                // drop concrete edges to the same target, they are overridden by the wildcard
                let mut emptied = Vec::new();
                for (sym, targets) in trans.iter_mut() {
                    if let Symbol::Switch(_) = sym {
                        if let Some(pos) = targets.iter().position(|t| *t == next_state) {
                            targets.remove(pos);
                            trace!(
                                "Removing transition {} --{}--> {} overridden by wildcard",
                                state,
                                sym,
                                next_state
                            );
                            if targets.is_empty() {
                                emptied.push(*sym);
                            }
                        }
                    }
                }
                for sym in emptied {
                    trans.remove(&sym);
                }
            }
            Symbol::Switch(_) => {
                if trans.get(&Symbol::Wildcard).map(|t| t.contains(&next_state)).unwrap_or(false) {
                    // the wildcard already covers this edge
                    return;
                }
            }
            Symbol::Epsilon => {}
        }

        let targets = trans.entry(symbol).or_insert_with(Vec::new);
        if !targets.contains(&next_state) {
            targets.push(next_state);
        }
    }

    /// Mark the given states as accepting.
    pub fn set_accepting(&mut self, states: &[usize]) {
        self.accepting.extend(states.iter().copied());
    }

    /// All symbols on which any of the given states has a transition, in sorted order.
    pub fn get_transitions(&self, states: &[usize]) -> Vec<Symbol> {
        let mut symbols = BTreeSet::new();
        for q in states {
            if let Some(trans) = self.states.get(q) {
                symbols.extend(trans.keys().copied());
            }
        }
        symbols.into_iter().collect()
    }

    /// All states reachable from any of the given states on `symbol`, sorted and deduplicated.
    pub fn get_next_states(&self, states: &[usize], symbol: Symbol) -> Vec<usize> {
        let mut next = BTreeSet::new();
        for q in states {
            if let Some(targets) = self.states.get(q).and_then(|t| t.get(&symbol)) {
                next.extend(targets.iter().copied());
            }
        }
        next.into_iter().collect()
    }

    /// All transitions of the automaton as `(state, symbol, next state)` triples.
    pub fn get_all_transitions(&self) -> Vec<(usize, Symbol, usize)> {
        let mut result = Vec::new();
        for (q, trans) in &self.states {
            for (sym, targets) in trans {
                for t in targets {
                    result.push((*q, *sym, *t));
                }
            }
        }
        result
    }

    /// Replace all transitions of the automaton by the given ones.
    fn reset_transitions(&mut self, transitions: &[(usize, Symbol, usize)]) {
        self.states.clear();
        for (q, sym, t) in transitions {
            self.add_transition(*q, *sym, *t);
        }
    }

    /// Add all given transitions, with every state renumbered by `offset`.
    fn import_transitions(&mut self, transitions: &[(usize, Symbol, usize)], offset: usize) {
        for (q, sym, t) in transitions {
            self.add_transition(q + offset, *sym, t + offset);
        }
    }

    /// Translate an [`Ast`] into an ε-NFA with Thompson's construction.
    pub fn from_ast(ast: &Ast) -> Self {
        match ast {
            Ast::Symbol(sym) => Self::symbol_fsm(*sym),
            Ast::Kleene(inner) => Self::kleene_fsm(&Self::from_ast(inner)),
            Ast::Concat(l, r) => Self::concat_fsm(&Self::from_ast(l), &Self::from_ast(r)),
            Ast::Union(l, r) => Self::union_fsm(&Self::from_ast(l), &Self::from_ast(r)),
        }
    }

    /// The two-state automaton accepting exactly one symbol.
    fn symbol_fsm(sym: Symbol) -> Self {
        let mut fsm = Self::new();
        fsm.add_transition(0, sym, 1);
        fsm.set_accepting(&[1]);
        fsm.last_state = 1;
        fsm
    }

    /// Merge two automata with the union operator: a new start state branches into both via ε,
    /// and both accepts join a new accept state via ε.
    fn union_fsm(m1: &Self, m2: &Self) -> Self {
        let mut fsm = Self::new();
        let m1_init = 1;
        let m2_init = 1 + m1.state_size();
        let fstate = m2_init + m2.state_size();

        fsm.import_transitions(&m1.get_all_transitions(), m1_init);
        fsm.import_transitions(&m2.get_all_transitions(), m2_init);
        fsm.add_transition(0, Symbol::Epsilon, m1_init);
        fsm.add_transition(0, Symbol::Epsilon, m2_init);
        fsm.add_transition(m1.last_state + m1_init, Symbol::Epsilon, fstate);
        fsm.add_transition(m2.last_state + m2_init, Symbol::Epsilon, fstate);
        fsm.set_accepting(&[fstate]);
        fsm.last_state = fstate;
        fsm
    }

    /// Merge two automata with the concatenation operator: the accept state of the first is
    /// glued onto the start state of the second by renumbering.
    fn concat_fsm(m1: &Self, m2: &Self) -> Self {
        let mut fsm = Self::new();
        let m2_offset = m1.state_size() - 1;
        let fstate = m2.last_state + m2_offset;

        fsm.import_transitions(&m1.get_all_transitions(), 0);
        fsm.import_transitions(&m2.get_all_transitions(), m2_offset);
        fsm.set_accepting(&[fstate]);
        fsm.last_state = fstate;
        fsm
    }

    /// Apply the Kleene operator: ε-bypass from the new start to the new accept, and an ε-loop
    /// from the inner accept back to the inner start.
    fn kleene_fsm(m1: &Self) -> Self {
        let mut fsm = Self::new();
        let m1_offset = 1;
        let fstate = m1_offset + m1.state_size();

        fsm.import_transitions(&m1.get_all_transitions(), m1_offset);
        fsm.add_transition(0, Symbol::Epsilon, 1);
        fsm.add_transition(0, Symbol::Epsilon, fstate);
        fsm.add_transition(m1.last_state + m1_offset, Symbol::Epsilon, 1);
        fsm.add_transition(m1.last_state + m1_offset, Symbol::Epsilon, fstate);
        fsm.set_accepting(&[fstate]);
        fsm.last_state = fstate;
        fsm
    }

    /// Eliminate all ε-transitions by loop reduction.
    ///
    /// Repeatedly pick an ε-transition `p --ε--> q` and remove it; every outgoing transition
    /// `q --a--> r` is lifted to `p --a--> r` (for `a = ε` the new edge re-enters the queue),
    /// and if `q` is accepting, `p` becomes accepting. An ε-self-loop is dropped without any
    /// propagation. Terminates because the set of possible `(p, a, r)` triples is bounded and
    /// every triple is added at most once.
    pub fn remove_epsilon(&mut self) {
        let mut edges = self.get_all_transitions();
        let mut accepting = self.accepting.clone();

        let mut queue: VecDeque<(usize, usize)> = edges
            .iter()
            .filter(|(_, sym, _)| *sym == Symbol::Epsilon)
            .map(|(p, _, q)| (*p, *q))
            .collect();

        while let Some((p, q)) = queue.pop_front() {
            let pos = match edges.iter().position(|e| *e == (p, Symbol::Epsilon, q)) {
                Some(pos) => pos,
                None => continue, // already removed through another queue entry
            };
            edges.remove(pos);
            trace!("Removing ({}, ε) -> {}", p, q);

            if p == q {
                // self-loop: drop the edge with no propagation
                continue;
            }

            let outgoing: Vec<(usize, Symbol, usize)> =
                edges.iter().filter(|(s, _, _)| *s == q).copied().collect();
            for (_, a, r) in outgoing {
                if !edges.contains(&(p, a, r)) {
                    trace!("Adding connection ({}, {}) -> {}", p, a, r);
                    edges.push((p, a, r));
                    if a == Symbol::Epsilon {
                        queue.push_back((p, r));
                    }
                }
            }

            if accepting.contains(&q) {
                accepting.insert(p);
            }
        }

        self.reset_transitions(&edges);
        self.accepting = accepting;
    }

    /// Determinise the automaton with the Rabin-Scott subset construction. The automaton must
    /// be free of ε-transitions (see [`remove_epsilon`](Fsm::remove_epsilon)).
    ///
    /// Subsets are deduplicated through a table keyed by the sorted state list, so the
    /// resulting automaton cannot contain duplicate states.
    pub fn to_dfa(&self) -> Self {
        if self.dfa {
            return self.clone();
        }

        let start = vec![0];
        let mut subsets: Vec<Vec<usize>> = vec![start.clone()];
        let mut index: HashMap<Vec<usize>, usize> = HashMap::new();
        index.insert(start, 0);
        let mut worklist: VecDeque<usize> = VecDeque::new();
        worklist.push_back(0);

        let mut dfa = Self::new();
        dfa.dfa = true;
        dfa.states.entry(0).or_insert_with(BTreeMap::new);

        while let Some(i) = worklist.pop_front() {
            let subset = subsets[i].clone();

            if subset.iter().any(|q| self.accepting.contains(q)) {
                dfa.accepting.insert(i);
            }

            for sym in self.get_transitions(&subset) {
                debug_assert!(sym != Symbol::Epsilon, "ε-transition survived removal");
                let next = self.get_next_states(&subset, sym);
                if next.is_empty() {
                    continue;
                }
                let j = match index.get(&next) {
                    Some(j) => *j,
                    None => {
                        let j = subsets.len();
                        index.insert(next.clone(), j);
                        subsets.push(next);
                        worklist.push_back(j);
                        j
                    }
                };
                dfa.add_transition(i, sym, j);
            }
        }

        dfa.last_state = subsets.len() - 1;
        dfa
    }

    /// Run the DFA over a switch sequence, returning true if the sequence is accepted.
    ///
    /// At every step, the concrete transition is taken if it exists, the wildcard transition
    /// otherwise; if neither exists, the input is rejected. After the whole input is consumed,
    /// the sequence is accepted iff the current state is accepting.
    ///
    /// # Panics
    /// Panics when called on an automaton that was not determinised, or when a step yields
    /// more than one next state. Both indicate an implementation bug in the construction.
    pub fn accepts(&self, path: &[NodeId]) -> bool {
        assert!(self.dfa, "accepts() called on an automaton that was not determinised");

        let mut current = 0usize;
        for switch in path {
            let trans = match self.states.get(&current) {
                Some(t) => t,
                None => return false,
            };
            let sym = Symbol::Switch(*switch);
            let sym = if trans.contains_key(&sym) {
                sym
            } else if trans.contains_key(&Symbol::Wildcard) {
                Symbol::Wildcard
            } else {
                debug!("No transition available at state {}, rejecting input", current);
                return false;
            };
            let next = self.get_next_states(&[current], sym);
            match next.len() {
                1 => current = next[0],
                0 => return false,
                n => panic!(
                    "Unrecoverable error detected: {} next states for ({}, {}) in a DFA",
                    n, current, sym
                ),
            }
        }

        self.accepting.contains(&current)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wildcard_overrides_concrete() {
        // concrete first, wildcard second
        let mut fsm = Fsm::new();
        fsm.add_transition(0, Symbol::Switch(1), 1);
        fsm.add_transition(0, Symbol::Wildcard, 1);
        assert_eq!(fsm.get_transitions(&[0]), vec![Symbol::Wildcard]);

        // wildcard first, concrete second
        let mut fsm = Fsm::new();
        fsm.add_transition(0, Symbol::Wildcard, 1);
        fsm.add_transition(0, Symbol::Switch(1), 1);
        assert_eq!(fsm.get_transitions(&[0]), vec![Symbol::Wildcard]);

        // different targets are left alone
        let mut fsm = Fsm::new();
        fsm.add_transition(0, Symbol::Switch(1), 1);
        fsm.add_transition(0, Symbol::Wildcard, 2);
        assert_eq!(fsm.get_transitions(&[0]), vec![Symbol::Wildcard, Symbol::Switch(1)]);
    }

    #[test]
    fn single_literal() {
        let dfa = compile("s1").unwrap();
        assert!(dfa.is_dfa());
        assert!(dfa.accepts(&[1]));
        assert!(!dfa.accepts(&[2]));
        assert!(!dfa.accepts(&[]));
        assert!(!dfa.accepts(&[1, 1]));
    }

    #[test]
    fn concatenation() {
        let dfa = compile("s1,s2").unwrap();
        assert!(dfa.accepts(&[1, 2]));
        assert!(!dfa.accepts(&[1]));
        assert!(!dfa.accepts(&[2, 1]));
        assert!(!dfa.accepts(&[1, 2, 3]));
    }

    #[test]
    fn union_of_two_literals() {
        // regex `s1|s2`: NFA, then ε-removed, then determinised
        let ast = parse("s1|s2").unwrap();
        let mut nfa = Fsm::from_ast(&ast);
        nfa.remove_epsilon();
        assert!(nfa
            .get_all_transitions()
            .iter()
            .all(|(_, sym, _)| *sym != Symbol::Epsilon));
        let dfa = nfa.to_dfa();
        assert!(dfa.accepts(&[1]));
        assert!(dfa.accepts(&[2]));
        assert!(!dfa.accepts(&[1, 2]));
        assert!(!dfa.accepts(&[]));
    }

    #[test]
    fn wildcard_single() {
        let dfa = compile("s1,.,s2").unwrap();
        assert!(dfa.accepts(&[1, 3, 2]));
        assert!(dfa.accepts(&[1, 2, 2]));
        assert!(!dfa.accepts(&[1, 2]));
        assert!(!dfa.accepts(&[1, 3, 4, 2]));
    }

    #[test]
    fn wildcard_kleene_accepts_any_sequence() {
        let dfa = compile(".*").unwrap();
        assert!(dfa.accepts(&[1]));
        assert!(dfa.accepts(&[7]));
        assert!(dfa.accepts(&[1, 2, 3, 4, 5]));
    }

    #[test]
    fn kleene_literal() {
        let dfa = compile("s1,s2*,s3").unwrap();
        assert!(dfa.accepts(&[1, 3]));
        assert!(dfa.accepts(&[1, 2, 3]));
        assert!(dfa.accepts(&[1, 2, 2, 2, 3]));
        assert!(!dfa.accepts(&[1, 2]));
        assert!(!dfa.accepts(&[2, 3]));
    }

    #[test]
    fn union_of_paths() {
        let dfa = compile("s1,s2,s4|s1,s3,s4").unwrap();
        assert!(dfa.accepts(&[1, 2, 4]));
        assert!(dfa.accepts(&[1, 3, 4]));
        assert!(!dfa.accepts(&[1, 4]));
        assert!(!dfa.accepts(&[1, 2, 3, 4]));
    }

    #[test]
    fn detour_with_wildcard_prefix() {
        let dfa = compile(".*,s4").unwrap();
        assert!(dfa.accepts(&[4]));
        assert!(dfa.accepts(&[1, 4]));
        assert!(dfa.accepts(&[9, 8, 7, 4]));
        assert!(!dfa.accepts(&[4, 1]));
    }

    #[test]
    fn concrete_beats_wildcard_at_runtime() {
        // from state 0, `s1` leads down the left branch and anything else down the right one
        let dfa = compile("s1,s9|.,s8").unwrap();
        assert!(dfa.accepts(&[1, 9]));
        assert!(dfa.accepts(&[2, 8]));
        assert!(!dfa.accepts(&[2, 9]));
    }

    #[test]
    fn grouped_expressions() {
        let dfa = compile("(s1|s2),s3").unwrap();
        assert!(dfa.accepts(&[1, 3]));
        assert!(dfa.accepts(&[2, 3]));
        assert!(!dfa.accepts(&[3]));
        assert!(!dfa.accepts(&[1, 2, 3]));
    }

    #[test]
    fn dfa_has_single_next_state_per_symbol() {
        for expr in &["s1|s2", "s1,s2,s4|s1,s3,s4", ".*,s4", "(s1|s2)*,s3"] {
            let dfa = compile(expr).unwrap();
            for state in 0..dfa.state_size() {
                for sym in dfa.get_transitions(&[state]) {
                    assert_eq!(
                        dfa.get_next_states(&[state], sym).len(),
                        1,
                        "expr {} state {} symbol {}",
                        expr,
                        state,
                        sym
                    );
                }
            }
        }
    }

    #[test]
    #[should_panic(expected = "Unrecoverable error detected")]
    fn nondeterministic_step_panics() {
        let mut fsm = Fsm::new();
        fsm.add_transition(0, Symbol::Switch(1), 1);
        fsm.states.get_mut(&0).unwrap().get_mut(&Symbol::Switch(1)).unwrap().push(2);
        fsm.dfa = true;
        fsm.accepts(&[1]);
    }
}
