//! DFA → expression decompilation.
//!
//! Turns an automaton back into a syntax tree by GNFA state elimination, so
//! the result of a complement / intersection / xor rewrite can be spliced
//! into the surrounding parse. Two virtual states frame the automaton:
//! START with an epsilon edge to state 0, and ACCEPT fed by an epsilon edge
//! from every accepting state. States are eliminated in id order; an edge
//! holding `Option::None` is the epsilon edge.

use std::collections::BTreeMap;

use itertools::Itertools;

use crate::{
    dfa::{DFA, REJECT},
    expr::{class_to_leaf, combine_state_exprs, ByteSet, ExprId, ExprKind, ExprPool},
};

/// Decompile `dfa` into a fresh subtree of `pool` accepting the same
/// language (not necessarily with the same surface syntax).
pub fn expr_from_dfa(dfa: &DFA, pool: &mut ExprPool, delimiter: u8) -> ExprId {
    let gstart = dfa.len();
    let gaccept = gstart + 1;
    let mut edges: Vec<BTreeMap<usize, Option<ExprId>>> = vec![BTreeMap::new(); gstart + 1];

    // byte edges, contiguous ranges collapsed into single leaves
    for i in 0..gstart {
        let row = dfa.row(i as u32);
        let chunks = row.iter().enumerate().chunk_by(|&(_, &t)| t);
        for (t, mut group) in &chunks {
            if t == REJECT {
                continue;
            }
            let lo = group.next().unwrap().0 as u8;
            let hi = group.last().map_or(lo, |(b, _)| b as u8);
            let mut set = ByteSet::new();
            set.set_range(lo, hi);
            let leaf = pool.alloc(class_to_leaf(set));
            merge_edge(pool, &mut edges[i], t as usize, Some(leaf), delimiter);
        }
    }
    for i in 0..gstart {
        if dfa.accept(i as u32) {
            edges[i].insert(gaccept, None);
        }
    }
    edges[gstart].insert(0, None);

    for i in 0..gstart {
        let loop_expr = edges[i].remove(&i).map(|e| {
            let e = e.expect("byte edges are never epsilon");
            pool.alloc(ExprKind::Star {
                e,
                non_greedy: false,
            })
        });
        let outgoing: Vec<(usize, Option<ExprId>)> =
            edges[i].iter().map(|(&k, &v)| (k, v)).collect();
        for j in (i + 1)..=gstart {
            let Some(regex1) = edges[j].remove(&i) else {
                continue;
            };
            for &(k, regex2) in &outgoing {
                // regex1 · loop* · regex2, omitting absent factors
                let mut composed = regex2;
                if let Some(lp) = loop_expr {
                    composed = Some(match composed {
                        Some(r2) => pool.alloc(ExprKind::Concat(lp, r2)),
                        None => lp,
                    });
                }
                if let Some(r1) = regex1 {
                    composed = Some(match composed {
                        Some(r2) => pool.alloc(ExprKind::Concat(r1, r2)),
                        None => r1,
                    });
                }
                // every stored edge owns its tree
                let composed = composed.map(|e| pool.clone_expr(e));
                merge_edge(pool, &mut edges[j], k, composed, delimiter);
            }
        }
        edges[i].clear();
    }

    match edges[gstart].get(&gaccept) {
        Option::None => pool.alloc(ExprKind::None),
        Some(Option::None) => pool.alloc(ExprKind::Epsilon),
        Some(&Some(e)) => e,
    }
}

/// Union `edge` into `edges[k]`, treating the epsilon edge as an optional
/// factor: ε ∪ e is e?.
fn merge_edge(
    pool: &mut ExprPool,
    edges: &mut BTreeMap<usize, Option<ExprId>>,
    k: usize,
    edge: Option<ExprId>,
    delimiter: u8,
) {
    match edges.get(&k).copied() {
        Option::None => {
            edges.insert(k, edge);
        }
        Some(Some(existing)) => {
            let merged = match edge {
                Some(e) => combine_state_exprs(pool, existing, e, delimiter)
                    .unwrap_or_else(|| pool.alloc(ExprKind::Union(existing, e))),
                Option::None => pool.alloc(ExprKind::Qmark {
                    e: existing,
                    non_greedy: false,
                }),
            };
            edges.insert(k, Some(merged));
        }
        Some(Option::None) => {
            if let Some(e) = edge {
                let opt = pool.alloc(ExprKind::Qmark {
                    e,
                    non_greedy: false,
                });
                edges.insert(k, Some(opt));
            }
        }
    }
}
