//! Required-literal analysis.
//!
//! Computes a byte string every accepted input must contain, if one exists.
//! Filtered matching scans for it with `aho-corasick` before running the
//! automaton; an input without the literal cannot match.
//!
//! The join rules are deliberately conservative: exact strings survive
//! concatenation, alternation and unbounded repetition give up, and of two
//! competing candidates the longer one wins.

use crate::expr::{ExprId, ExprKind, ExprPool};

#[derive(Clone, Debug, PartialEq)]
enum Req {
    /// The subtree matches exactly this one string.
    Exact(Vec<u8>),
    /// Every match contains this string somewhere (possibly none known).
    Has(Option<Vec<u8>>),
}

impl Req {
    fn into_has(self) -> Option<Vec<u8>> {
        match self {
            Req::Exact(s) => (!s.is_empty()).then_some(s),
            Req::Has(s) => s,
        }
    }
}

fn longer(a: Option<Vec<u8>>, b: Option<Vec<u8>>) -> Option<Vec<u8>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if b.len() > a.len() { b } else { a }),
        (a, b) => a.or(b),
    }
}

/// The longest byte string every accepted input of the subtree must
/// contain, or `None` when no single literal is required.
pub fn required_literal(pool: &ExprPool, root: ExprId) -> Option<Vec<u8>> {
    visit(pool, root).into_has().filter(|s| !s.is_empty())
}

fn visit(pool: &ExprPool, id: ExprId) -> Req {
    match *pool.kind(id) {
        ExprKind::Literal(b) => Req::Exact(vec![b]),
        // ε and the end marker contribute nothing but keep concatenations exact
        ExprKind::Epsilon | ExprKind::Eop => Req::Exact(Vec::new()),
        // anything goes (or nothing at all): no requirement survives
        ExprKind::Class { .. }
        | ExprKind::Dot
        | ExprKind::BegLine
        | ExprKind::EndLine
        | ExprKind::None => Req::Has(None),
        ExprKind::Concat(l, r) => match (visit(pool, l), visit(pool, r)) {
            (Req::Exact(mut a), Req::Exact(b)) => {
                a.extend_from_slice(&b);
                Req::Exact(a)
            }
            (a, b) => Req::Has(longer(a.into_has(), b.into_has())),
        },
        ExprKind::Union(l, r) => match (visit(pool, l), visit(pool, r)) {
            (Req::Exact(a), Req::Exact(b)) if a == b => Req::Exact(a),
            _ => Req::Has(None),
        },
        ExprKind::Qmark { .. } | ExprKind::Star { .. } => Req::Has(None),
        ExprKind::Plus(e) => Req::Has(visit(pool, e).into_has()),
    }
}
