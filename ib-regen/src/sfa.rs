//! The segment-transducer automaton (SFA) and the parallel matcher.
//!
//! An SFA state is a mapping from "start state of the underlying automaton"
//! to "the states reachable after the bytes seen so far". Running a segment
//! through the SFA therefore summarizes the whole segment as one state id,
//! independent of where the segment sits in the input; composing the
//! summaries left to right and evaluating at the real start state
//! reconstructs exactly the state the sequential automaton would have
//! reached. Workers only ever read the SFA, one slice each; composition
//! happens in segment order on the calling thread after the joins.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::{
    dfa::{StateId, DFA, REJECT},
    expr::position::{PositionTable, StateSet},
    nfa::NFA,
};

/// Start state → reachable current states. Degenerates to single-element
/// sets when built from a DFA.
pub type SsTransition = BTreeMap<u32, BTreeSet<u32>>;

pub struct SFA {
    transitions: Vec<Box<[StateId; 256]>>,
    /// The mapping each SFA state stands for.
    sst: Vec<SsTransition>,
    start_states: BTreeSet<u32>,
    /// Accept flags of the underlying automaton's states.
    accepts: Vec<bool>,
    thread_num: usize,
    workers: rayon::ThreadPool,
}

impl SFA {
    /// Build the transducer straight from the position automaton.
    pub fn from_positions(table: &PositionTable, first: &StateSet, thread_num: usize) -> SFA {
        let accepts: Vec<bool> = (0..table.len() as u32).map(|i| table.is_eop(i)).collect();
        let (transitions, sst) = build(table.len(), |sst, byte| {
            let mut next = SsTransition::new();
            for (&start, currents) in sst {
                for &i in currents {
                    if table.bytes_of(i).test(byte) {
                        next.entry(start)
                            .or_default()
                            .extend(&table.positions[i as usize].follow);
                    }
                }
            }
            next
        });
        SFA::assemble(transitions, sst, first.clone(), accepts, thread_num)
    }

    /// Build the transducer from a completed DFA; the per-start sets stay
    /// singletons.
    pub fn from_dfa(dfa: &DFA, thread_num: usize) -> SFA {
        assert!(dfa.complete(), "segment transducer needs a complete DFA");
        let accepts: Vec<bool> = (0..dfa.len() as u32).map(|s| dfa.accept(s)).collect();
        let (transitions, sst) = build(dfa.len(), |sst, byte| {
            let mut next = SsTransition::new();
            for (&start, currents) in sst {
                for &cur in currents {
                    let t = dfa.row(cur)[byte as usize];
                    if t != REJECT {
                        next.entry(start).or_default().insert(t);
                    }
                }
            }
            next
        });
        SFA::assemble(
            transitions,
            sst,
            BTreeSet::from([0]),
            accepts,
            thread_num,
        )
    }

    pub fn from_nfa(nfa: &NFA, thread_num: usize) -> SFA {
        let accepts: Vec<bool> = (0..nfa.len() as u32).map(|q| nfa.accept(q)).collect();
        let (transitions, sst) = build(nfa.len(), |sst, byte| {
            let mut next = SsTransition::new();
            for (&start, currents) in sst {
                for &cur in currents {
                    let targets: Vec<u32> = nfa.next(cur, byte).collect();
                    if !targets.is_empty() {
                        next.entry(start).or_default().extend(targets);
                    }
                }
            }
            next
        });
        SFA::assemble(
            transitions,
            sst,
            nfa.start_states().clone(),
            accepts,
            thread_num,
        )
    }

    fn assemble(
        transitions: Vec<Box<[StateId; 256]>>,
        sst: Vec<SsTransition>,
        start_states: BTreeSet<u32>,
        accepts: Vec<bool>,
        thread_num: usize,
    ) -> SFA {
        let thread_num = thread_num.max(1);
        debug!("sfa constructed: {} states, {} workers", sst.len(), thread_num);
        SFA {
            transitions,
            sst,
            start_states,
            accepts,
            thread_num,
            workers: rayon::ThreadPoolBuilder::new()
                .num_threads(thread_num)
                .build()
                .expect("failed to build the worker pool"),
        }
    }

    pub fn len(&self) -> usize {
        self.sst.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sst.is_empty()
    }

    pub fn thread_num(&self) -> usize {
        self.thread_num
    }

    /// Summarize one segment: a pure function of the slice.
    fn run_segment(&self, segment: &[u8]) -> StateId {
        let mut state: StateId = 0;
        for &b in segment {
            state = self.transitions[state as usize][b as usize];
            if state == REJECT {
                return REJECT;
            }
        }
        state
    }

    /// Match the whole input with up to `thread_num` workers.
    pub fn is_match(&self, input: &[u8]) -> bool {
        let thread_num = if input.len() <= 2 {
            1
        } else {
            self.thread_num.min(input.len())
        };

        let segment_len = input.len() / thread_num;
        let mut segments: Vec<&[u8]> = Vec::with_capacity(thread_num);
        let mut begin = 0;
        for i in 0..thread_num {
            // remainder bytes go to the last segment
            let end = if i == thread_num - 1 {
                input.len()
            } else {
                begin + segment_len
            };
            segments.push(&input[begin..end]);
            begin = end;
        }

        let partials: Vec<StateId> = self
            .workers
            .install(|| segments.par_iter().map(|s| self.run_segment(s)).collect());

        // compose in segment order, regardless of worker completion order
        let mut states = self.start_states.clone();
        for partial in partials {
            if partial == REJECT {
                states.clear();
                break;
            }
            let mapping = &self.sst[partial as usize];
            let mut next = BTreeSet::new();
            for s in &states {
                if let Some(currents) = mapping.get(s) {
                    next.extend(currents);
                }
            }
            states = next;
            if states.is_empty() {
                break;
            }
        }

        states.iter().any(|&s| self.accepts[s as usize])
    }
}

/// Hash-consed subset construction over segment transducers, starting from
/// the identity mapping. The empty mapping is the reject sink and never
/// becomes a state.
fn build(
    domain: usize,
    step: impl Fn(&SsTransition, u8) -> SsTransition,
) -> (Vec<Box<[StateId; 256]>>, Vec<SsTransition>) {
    let identity: SsTransition = (0..domain as u32)
        .map(|i| (i, BTreeSet::from([i])))
        .collect();
    let mut map: FxHashMap<SsTransition, StateId> = FxHashMap::default();
    map.insert(identity.clone(), 0);
    let mut sst = vec![identity];
    let mut transitions: Vec<Box<[StateId; 256]>> = Vec::new();

    let mut s = 0;
    while s < sst.len() {
        let mut row = [REJECT; 256];
        for byte in 0..=255u8 {
            let next = step(&sst[s], byte);
            if next.is_empty() {
                continue;
            }
            let id = match map.get(&next) {
                Some(&id) => id,
                None => {
                    let id = sst.len() as StateId;
                    map.insert(next.clone(), id);
                    sst.push(next);
                    id
                }
            };
            row[byte as usize] = id;
        }
        transitions.push(Box::new(row));
        s += 1;
    }
    (transitions, sst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dfa::AcceptCond,
        expr::{position::analyze, ExprKind, ExprPool},
    };

    fn analyzed(
        build: impl FnOnce(&mut ExprPool) -> crate::expr::ExprId,
    ) -> (PositionTable, StateSet) {
        let mut pool = ExprPool::new();
        let root = build(&mut pool);
        let eop = pool.alloc(ExprKind::Eop);
        let root = pool.alloc(ExprKind::Concat(root, eop));
        let (table, info) = analyze(&pool, root, b'\n');
        (table, info.first)
    }

    fn star_union_c(pool: &mut ExprPool) -> crate::expr::ExprId {
        // (a|b)*c
        let a = pool.alloc(ExprKind::Literal(b'a'));
        let b = pool.alloc(ExprKind::Literal(b'b'));
        let u = pool.alloc(ExprKind::Union(a, b));
        let star = pool.alloc(ExprKind::Star {
            e: u,
            non_greedy: false,
        });
        let c = pool.alloc(ExprKind::Literal(b'c'));
        pool.alloc(ExprKind::Concat(star, c))
    }

    #[test]
    fn matches_like_the_dfa() {
        let (table, first) = analyzed(star_union_c);
        let dfa = DFA::construct(&table, &first, AcceptCond::All(1));
        let inputs: &[&[u8]] = &[
            b"c", b"ac", b"ababc", b"", b"ca", b"abd", b"aaabbbc", b"cc",
        ];
        for threads in 1..=5 {
            let sfa = SFA::from_positions(&table, &first, threads);
            for input in inputs {
                assert_eq!(
                    sfa.is_match(input),
                    dfa.full_match(input),
                    "T={threads}, input={:?}",
                    String::from_utf8_lossy(input)
                );
            }
        }
    }

    #[test]
    fn from_dfa_agrees_with_from_positions() {
        let (table, first) = analyzed(star_union_c);
        let dfa = DFA::construct(&table, &first, AcceptCond::All(1));
        let a = SFA::from_positions(&table, &first, 3);
        let b = SFA::from_dfa(&dfa, 3);
        for input in [&b"ababab"[..], b"ababc", b"", b"c", b"x"] {
            assert_eq!(a.is_match(input), b.is_match(input));
        }
    }

    #[test]
    fn from_nfa_matches() {
        // .*ab over {a,b}
        let mut nfa = NFA::new();
        let (s0, s1, s2) = (nfa.add_state(), nfa.add_state(), nfa.add_state());
        nfa.add_start(s0);
        nfa.set_accept(s2, true);
        for b in [b'a', b'b'] {
            nfa.add_transition(s0, b, s0);
        }
        nfa.add_transition(s0, b'a', s1);
        nfa.add_transition(s1, b'b', s2);
        let sfa = SFA::from_nfa(&nfa, 4);
        assert!(sfa.is_match(b"ab"));
        assert!(sfa.is_match(b"bbaab"));
        assert!(!sfa.is_match(b"ba"));
        assert!(!sfa.is_match(b"a"));
    }

    #[test]
    fn remainder_lands_in_last_segment() {
        let (table, first) = analyzed(star_union_c);
        let sfa = SFA::from_positions(&table, &first, 4);
        // length 7 over 4 workers: 1+1+1+4
        assert!(sfa.is_match(b"aababbc"));
        assert!(!sfa.is_match(b"aababbb"));
    }

    #[test]
    fn empty_and_tiny_inputs() {
        let (table, first) = analyzed(|pool| {
            let a = pool.alloc(ExprKind::Literal(b'a'));
            pool.alloc(ExprKind::Star {
                e: a,
                non_greedy: false,
            })
        });
        let sfa = SFA::from_positions(&table, &first, 8);
        assert!(sfa.is_match(b""));
        assert!(sfa.is_match(b"a"));
        assert!(sfa.is_match(b"aa"));
        assert!(!sfa.is_match(b"b"));
    }
}
