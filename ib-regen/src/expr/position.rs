//! The position automaton: numbering of state-bearing leaves, the
//! bottom-up attribute pass and the top-down `follow` pass.
//!
//! `first`/`last`/`follow`/`before` never hold node references; they are
//! sets of state ids into the flat [`PositionTable`], so the cyclic
//! follow/before relation between leaves stays clear of ownership.

use std::collections::BTreeSet;

use crate::expr::{involved_bytes, ByteSet, ExprId, ExprKind, ExprPool};

/// A set of Glushkov state ids.
pub type StateSet = BTreeSet<u32>;

/// How a position consumes a byte.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeafTest {
    Byte(u8),
    Class(ByteSet),
    AnyByte,
    /// `^`/`$`: the record delimiter.
    Delimiter,
    Eop,
    /// `None`: no byte at all.
    Never,
}

/// One state-bearing leaf.
#[derive(Clone, Debug)]
pub struct Position {
    pub expr: ExprId,
    pub test: LeafTest,
    pub follow: StateSet,
    pub before: StateSet,
}

/// The flat leaf table, indexed by state id.
#[derive(Clone, Debug, Default)]
pub struct PositionTable {
    pub delimiter: u8,
    pub positions: Vec<Position>,
}

impl PositionTable {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn is_eop(&self, id: u32) -> bool {
        self.positions[id as usize].test == LeafTest::Eop
    }

    /// The bytes position `id` consumes.
    pub fn bytes_of(&self, id: u32) -> ByteSet {
        let mut set = ByteSet::new();
        match &self.positions[id as usize].test {
            LeafTest::Byte(b) => set.set(*b),
            LeafTest::Class(table) => set = *table,
            LeafTest::AnyByte => set = ByteSet::full(),
            LeafTest::Delimiter => set.set(self.delimiter),
            LeafTest::Eop | LeafTest::Never => {}
        }
        set
    }
}

/// Synthesized attributes of the analyzed subtree root.
#[derive(Clone, Debug)]
pub struct ExprInfo {
    pub root: ExprId,
    pub min_length: usize,
    pub max_length: usize,
    pub nullable: bool,
    /// Union of all bytes any position can consume.
    pub involve: ByteSet,
    /// `first(root)`: the DFA start set.
    pub first: StateSet,
    pub last: StateSet,
}

struct NodeAttr {
    min: usize,
    max: usize,
    nullable: bool,
    first: StateSet,
    last: StateSet,
}

/// Run all three passes over the subtree at `root`: numbering in document
/// order, `fill_position` (lengths, nullability, first/last, involvement,
/// invariant verification) and `fill_transition` (follow/before).
pub fn analyze(pool: &ExprPool, root: ExprId, delimiter: u8) -> (PositionTable, ExprInfo) {
    let mut table = PositionTable {
        delimiter,
        positions: Vec::new(),
    };
    let mut ids = vec![None; pool.len()];
    number(pool, root, delimiter, &mut table, &mut ids);

    let mut attrs: Vec<Option<NodeAttr>> = (0..pool.len()).map(|_| None).collect();
    let mut involve = ByteSet::new();
    fill_position(pool, root, delimiter, &ids, &mut attrs, &mut involve);

    fill_transition(pool, root, &attrs, &mut table);

    let root_attr = attrs[root.idx()].take().expect("root was analyzed");
    let info = ExprInfo {
        root,
        min_length: root_attr.min,
        max_length: root_attr.max,
        nullable: root_attr.nullable,
        involve,
        first: root_attr.first,
        last: root_attr.last,
    };
    (table, info)
}

fn number(
    pool: &ExprPool,
    id: ExprId,
    delimiter: u8,
    table: &mut PositionTable,
    ids: &mut [Option<u32>],
) {
    match *pool.kind(id) {
        ExprKind::Concat(l, r) | ExprKind::Union(l, r) => {
            number(pool, l, delimiter, table, ids);
            number(pool, r, delimiter, table, ids);
        }
        ExprKind::Qmark { e, .. } | ExprKind::Star { e, .. } | ExprKind::Plus(e) => {
            number(pool, e, delimiter, table, ids)
        }
        ref leaf if leaf.is_state() => {
            let state = table.positions.len() as u32;
            ids[id.idx()] = Some(state);
            let test = match leaf {
                ExprKind::Literal(b) => LeafTest::Byte(*b),
                ExprKind::Class { .. } => LeafTest::Class(involved_bytes(leaf, delimiter)),
                ExprKind::Dot => LeafTest::AnyByte,
                ExprKind::BegLine | ExprKind::EndLine => LeafTest::Delimiter,
                ExprKind::Eop => LeafTest::Eop,
                ExprKind::None => LeafTest::Never,
                _ => unreachable!(),
            };
            table.positions.push(Position {
                expr: id,
                test,
                follow: StateSet::new(),
                before: StateSet::new(),
            });
        }
        _ => {} // Epsilon carries no state
    }
}

fn fill_position(
    pool: &ExprPool,
    id: ExprId,
    delimiter: u8,
    ids: &[Option<u32>],
    attrs: &mut [Option<NodeAttr>],
    involve: &mut ByteSet,
) {
    let attr = match *pool.kind(id) {
        ExprKind::Concat(l, r) => {
            fill_position(pool, l, delimiter, ids, attrs, involve);
            fill_position(pool, r, delimiter, ids, attrs, involve);
            let (la, ra) = (attrs[l.idx()].as_ref().unwrap(), attrs[r.idx()].as_ref().unwrap());
            let mut first = la.first.clone();
            if la.nullable {
                first.extend(&ra.first);
            }
            let mut last = ra.last.clone();
            if ra.nullable {
                last.extend(&la.last);
            }
            NodeAttr {
                min: la.min.saturating_add(ra.min),
                max: la.max.saturating_add(ra.max),
                nullable: la.nullable && ra.nullable,
                first,
                last,
            }
        }
        ExprKind::Union(l, r) => {
            fill_position(pool, l, delimiter, ids, attrs, involve);
            fill_position(pool, r, delimiter, ids, attrs, involve);
            let (la, ra) = (attrs[l.idx()].as_ref().unwrap(), attrs[r.idx()].as_ref().unwrap());
            let mut first = la.first.clone();
            first.extend(&ra.first);
            let mut last = la.last.clone();
            last.extend(&ra.last);
            NodeAttr {
                min: la.min.min(ra.min),
                max: la.max.max(ra.max),
                nullable: la.nullable || ra.nullable,
                first,
                last,
            }
        }
        ExprKind::Qmark { e, .. } => {
            fill_position(pool, e, delimiter, ids, attrs, involve);
            let ea = attrs[e.idx()].as_ref().unwrap();
            NodeAttr {
                min: 0,
                max: ea.max,
                nullable: true,
                first: ea.first.clone(),
                last: ea.last.clone(),
            }
        }
        ExprKind::Star { e, .. } => {
            fill_position(pool, e, delimiter, ids, attrs, involve);
            let ea = attrs[e.idx()].as_ref().unwrap();
            NodeAttr {
                min: 0,
                max: usize::MAX,
                nullable: true,
                first: ea.first.clone(),
                last: ea.last.clone(),
            }
        }
        ExprKind::Plus(e) => {
            fill_position(pool, e, delimiter, ids, attrs, involve);
            let ea = attrs[e.idx()].as_ref().unwrap();
            NodeAttr {
                min: ea.min,
                max: usize::MAX,
                nullable: ea.nullable,
                first: ea.first.clone(),
                last: ea.last.clone(),
            }
        }
        ref leaf => {
            let (min, max, nullable) = match leaf {
                ExprKind::Literal(_) | ExprKind::Class { .. } | ExprKind::Dot => (1, 1, false),
                // anchors consume the delimiter byte when they fire at all
                ExprKind::BegLine | ExprKind::EndLine => (1, 1, false),
                ExprKind::Eop | ExprKind::Epsilon => (0, 0, true),
                ExprKind::None => (0, 0, false),
                _ => unreachable!(),
            };
            involve.or(&involved_bytes(leaf, delimiter));
            let mut set = StateSet::new();
            if let Some(state) = ids[id.idx()] {
                set.insert(state);
            }
            NodeAttr {
                min,
                max,
                nullable,
                first: set.clone(),
                last: set,
            }
        }
    };

    debug_assert!(attr.min <= attr.max);
    // `None` is the one zero-length kind that is not nullable: it is the
    // empty language, not the empty string.
    debug_assert!(
        attr.nullable == (attr.min == 0) || matches!(pool.kind(id), ExprKind::None),
        "nullable must coincide with min_length == 0",
    );
    attrs[id.idx()] = Some(attr);
}

fn fill_transition(
    pool: &ExprPool,
    id: ExprId,
    attrs: &[Option<NodeAttr>],
    table: &mut PositionTable,
) {
    match *pool.kind(id) {
        ExprKind::Concat(l, r) => {
            let src = attrs[l.idx()].as_ref().unwrap().last.clone();
            let dst = attrs[r.idx()].as_ref().unwrap().first.clone();
            connect(&src, &dst, table);
            fill_transition(pool, r, attrs, table);
            fill_transition(pool, l, attrs, table);
        }
        ExprKind::Union(l, r) => {
            fill_transition(pool, r, attrs, table);
            fill_transition(pool, l, attrs, table);
        }
        ExprKind::Star { e, .. } | ExprKind::Plus(e) => {
            let attr = attrs[e.idx()].as_ref().unwrap();
            let (src, dst) = (attr.last.clone(), attr.first.clone());
            connect(&src, &dst, table);
            fill_transition(pool, e, attrs, table);
        }
        ExprKind::Qmark { e, .. } => fill_transition(pool, e, attrs, table),
        _ => {}
    }
}

/// Make every position of `dst` a possible successor of every position of
/// `src`, recording the symmetric `before` edge as well.
fn connect(src: &StateSet, dst: &StateSet, table: &mut PositionTable) {
    for &s in src {
        table.positions[s as usize].follow.extend(dst);
    }
    for &d in dst {
        table.positions[d as usize].before.extend(src);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::pattern_string;

    /// `(a|b)*c` with the end-of-pattern marker appended.
    fn sample() -> (ExprPool, ExprId) {
        let mut pool = ExprPool::new();
        let a = pool.alloc(ExprKind::Literal(b'a'));
        let b = pool.alloc(ExprKind::Literal(b'b'));
        let u = pool.alloc(ExprKind::Union(a, b));
        let star = pool.alloc(ExprKind::Star {
            e: u,
            non_greedy: false,
        });
        let c = pool.alloc(ExprKind::Literal(b'c'));
        let cat = pool.alloc(ExprKind::Concat(star, c));
        let eop = pool.alloc(ExprKind::Eop);
        let root = pool.alloc(ExprKind::Concat(cat, eop));
        (pool, root)
    }

    #[test]
    fn glushkov_sets() {
        let (pool, root) = sample();
        assert_eq!(pattern_string(&pool, root), "(a|b)*c");
        let (table, info) = analyze(&pool, root, b'\n');

        // document order: a=0, b=1, c=2, eop=3
        assert_eq!(table.len(), 4);
        assert_eq!(table.positions[0].test, LeafTest::Byte(b'a'));
        assert_eq!(table.positions[2].test, LeafTest::Byte(b'c'));
        assert!(table.is_eop(3));

        assert_eq!(info.first, StateSet::from([0, 1, 2]));
        assert_eq!(table.positions[0].follow, StateSet::from([0, 1, 2]));
        assert_eq!(table.positions[1].follow, StateSet::from([0, 1, 2]));
        assert_eq!(table.positions[2].follow, StateSet::from([3]));
        assert!(table.positions[3].follow.is_empty());

        assert_eq!(info.min_length, 1);
        assert_eq!(info.max_length, usize::MAX);
        assert!(!info.nullable);
        assert_eq!(info.involve.count(), 3);
    }

    #[test]
    fn before_mirrors_follow() {
        let (pool, root) = sample();
        let (table, _) = analyze(&pool, root, b'\n');
        for (s, pos) in table.positions.iter().enumerate() {
            for &f in &pos.follow {
                assert!(
                    table.positions[f as usize].before.contains(&(s as u32)),
                    "follow {s} -> {f} has no before edge"
                );
            }
            for &b in &pos.before {
                assert!(table.positions[b as usize].follow.contains(&(s as u32)));
            }
        }
    }

    #[test]
    fn lengths() {
        let mut pool = ExprPool::new();
        let a = pool.alloc(ExprKind::Literal(b'a'));
        let q = pool.alloc(ExprKind::Qmark {
            e: a,
            non_greedy: false,
        });
        let b = pool.alloc(ExprKind::Literal(b'b'));
        let root = pool.alloc(ExprKind::Concat(q, b));
        let (_, info) = analyze(&pool, root, b'\n');
        assert_eq!((info.min_length, info.max_length), (1, 2));
        assert!(!info.nullable);

        // a+ keeps the child minimum and an unbounded maximum
        let mut pool = ExprPool::new();
        let a = pool.alloc(ExprKind::Literal(b'a'));
        let plus = pool.alloc(ExprKind::Plus(a));
        let (_, info) = analyze(&pool, plus, b'\n');
        assert_eq!((info.min_length, info.max_length), (1, usize::MAX));
    }

    #[test]
    fn epsilon_is_stateless() {
        let mut pool = ExprPool::new();
        let eps = pool.alloc(ExprKind::Epsilon);
        let a = pool.alloc(ExprKind::Literal(b'a'));
        let root = pool.alloc(ExprKind::Concat(eps, a));
        let (table, info) = analyze(&pool, root, b'\n');
        assert_eq!(table.len(), 1);
        assert_eq!(info.first, StateSet::from([0]));
        assert!(!info.nullable);
    }

    #[test]
    fn none_emits_no_transitions() {
        let mut pool = ExprPool::new();
        let a = pool.alloc(ExprKind::Literal(b'a'));
        let none = pool.alloc(ExprKind::None);
        let root = pool.alloc(ExprKind::Concat(a, none));
        let (table, info) = analyze(&pool, root, b'\n');
        // `None` occupies a state but can never consume a byte.
        assert_eq!(table.len(), 2);
        assert!(table.bytes_of(1).is_empty());
        assert!(!info.nullable);
        assert_eq!(info.min_length, 1);
    }
}
