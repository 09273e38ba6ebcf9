//! The recursive descent parser.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! e0 := ex ('|' ex)*                     # union
//! ex := e1 ('&&' e1)*                    # xor
//! e1 := e2 ('&' e2)*                     # intersection
//! e2 := e3+                              # concatenation (implicit)
//! e3 := e4 ('?' | '*' | '+' | '{n,m}')*
//! e4 := ATOM | '(' e0 ')' | '!' e2 | '@' e2
//! ```
//!
//! `!` complements everything up to the next union/intersection/group
//! boundary, so `!abc` is the complement of `abc`, not `(!a)bc`. The `@`
//! reverse marker binds the same way: `@abc` matches `cba`.
//!
//! Nodes go straight into the caller's arena. Intersection, xor and
//! complement never materialize as nodes: each operand is wrapped with its
//! own end marker, the union of the wrapped branches is determinized with
//! the matching accept condition (all markers live / exactly one /
//! complemented), and the automaton is decompiled back into a subtree. The
//! abandoned operand trees stay behind in the arena.

use log::debug;

use crate::{
    dfa::{gnfa::expr_from_dfa, AcceptCond, DFA},
    error::CompileError,
    expr::{
        class_to_leaf, combine_state_exprs, position::analyze, ByteSet, ExprId, ExprKind, ExprPool,
    },
    options::Options,
    syntax::lexer::{Lexer, Token},
};

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    options: Options,
    /// Closed capture groups by opening order; `None` while still open.
    groups: Vec<Option<ExprId>>,
}

impl<'a> Parser<'a> {
    /// Parse `pattern` into `pool`, returning the root of the tree (without
    /// the end-of-pattern wrapping).
    pub fn parse(
        pattern: &'a [u8],
        pool: &mut ExprPool,
        options: &Options,
        recursive_limit: usize,
    ) -> Result<ExprId, CompileError> {
        let mut parser = Parser {
            lexer: Lexer::new(pattern, options, recursive_limit),
            options: *options,
            groups: Vec::new(),
        };
        parser.lexer.consume()?;
        let e = parser.e0(pool)?;
        if parser.lexer.token() != &Token::Eop {
            return Err(CompileError::parse(format!(
                "expected end of pattern, found {:?}",
                parser.lexer.token()
            )));
        }
        Ok(e)
    }

    fn e0(&mut self, pool: &mut ExprPool) -> Result<ExprId, CompileError> {
        let mut e = self.ex(pool)?;
        while self.lexer.token() == &Token::Union {
            self.lexer.consume()?;
            let f = self.ex(pool)?;
            e = match combine_state_exprs(pool, e, f, self.options.delimiter) {
                Some(combined) => combined,
                None => pool.alloc(ExprKind::Union(e, f)),
            };
        }
        Ok(e)
    }

    fn ex(&mut self, pool: &mut ExprPool) -> Result<ExprId, CompileError> {
        let mut e = self.e1(pool)?;
        while self.lexer.token() == &Token::Xor {
            if !self.options.xor_ext() {
                return Err(CompileError::ext("xor ('&&')"));
            }
            self.lexer.consume()?;
            let f = self.e1(pool)?;
            e = self.dfa_rewrite(pool, vec![e, f], AcceptCond::ExactlyOne);
        }
        Ok(e)
    }

    fn e1(&mut self, pool: &mut ExprPool) -> Result<ExprId, CompileError> {
        let e = self.e2(pool)?;
        if self.lexer.token() != &Token::Intersection {
            return Ok(e);
        }
        if !self.options.intersection_ext() {
            return Err(CompileError::ext("intersection ('&')"));
        }
        let mut operands = vec![e];
        while self.lexer.token() == &Token::Intersection {
            self.lexer.consume()?;
            operands.push(self.e2(pool)?);
        }
        let neop = operands.len();
        Ok(self.dfa_rewrite(pool, operands, AcceptCond::All(neop)))
    }

    fn e2(&mut self, pool: &mut ExprPool) -> Result<ExprId, CompileError> {
        let mut e = self.e3(pool)?;
        while self.lexer.concatenated() {
            let f = self.e3(pool)?;
            // the empty string is the concatenation identity
            if matches!(pool.kind(f), ExprKind::Epsilon) {
                continue;
            }
            if matches!(pool.kind(e), ExprKind::Epsilon) {
                e = f;
                continue;
            }
            e = pool.alloc(ExprKind::Concat(e, f));
        }
        Ok(e)
    }

    fn e3(&mut self, pool: &mut ExprPool) -> Result<ExprId, CompileError> {
        let mut e = self.e4(pool)?;
        loop {
            let mut infinity = false;
            let mut nullable = false;
            while self.lexer.quantifier() {
                match self.lexer.token() {
                    Token::Star => {
                        infinity = true;
                        nullable = true;
                    }
                    Token::Plus => infinity = true,
                    Token::Qmark => nullable = true,
                    Token::Repetition { .. } => break,
                    _ => unreachable!(),
                }
                self.lexer.consume()?;
            }
            e = match (infinity, nullable) {
                (true, true) => pool.alloc(ExprKind::Star {
                    e,
                    non_greedy: false,
                }),
                (true, false) => pool.alloc(ExprKind::Plus(e)),
                (false, true) => pool.alloc(ExprKind::Qmark {
                    e,
                    non_greedy: false,
                }),
                (false, false) => e,
            };
            if let Token::Repetition { lo, hi } = *self.lexer.token() {
                self.lexer.consume()?;
                e = expand_repetition(pool, e, lo, hi);
                continue;
            }
            break;
        }
        Ok(e)
    }

    fn e4(&mut self, pool: &mut ExprPool) -> Result<ExprId, CompileError> {
        let e = match self.lexer.token().clone() {
            Token::Literal(b) => pool.alloc(self.fold_literal(b)),
            Token::ByteRange(set) => pool.alloc(class_to_leaf(set)),
            Token::CharClass => {
                let leaf = self.lexer.lex_char_class()?;
                pool.alloc(leaf)
            }
            Token::Dot => {
                if self.options.encoding_utf8() {
                    utf8_any_char(pool)
                } else {
                    pool.alloc(ExprKind::Dot)
                }
            }
            Token::BegLine => pool.alloc(self.anchor(ExprKind::BegLine)),
            Token::EndLine => pool.alloc(self.anchor(ExprKind::EndLine)),
            Token::Empty => pool.alloc(ExprKind::Epsilon),
            Token::Lpar => {
                let group = self.groups.len();
                self.groups.push(None);
                self.lexer.consume()?;
                let e = self.e0(pool)?;
                if self.lexer.token() != &Token::Rpar {
                    return Err(CompileError::parse("expected a ')'"));
                }
                self.groups[group] = Some(e);
                e
            }
            Token::Complement => {
                if !self.options.complement_ext() {
                    return Err(CompileError::ext("complement ('!')"));
                }
                let mut negative = false;
                while self.lexer.token() == &Token::Complement {
                    negative = !negative;
                    self.lexer.consume()?;
                }
                // complement the rest of the concatenation; the operand
                // consumed its own trailing token
                let e = self.e2(pool)?;
                return Ok(if negative {
                    self.complement_rewrite(pool, e)
                } else {
                    e
                });
            }
            Token::BackRef { n, weak } => {
                if !weak {
                    return Err(CompileError::Unsupported(format!(
                        "exact backreference \\{} cannot be matched by a deterministic \
                         automaton; use the weak form \\_{}",
                        n + 1,
                        n + 1
                    )));
                }
                if !self.options.weak_backref_ext() {
                    return Err(CompileError::ext("weak backreferences ('\\_N')"));
                }
                match self.groups.get(n) {
                    Some(Some(group)) => {
                        let group = *group;
                        pool.clone_expr(group)
                    }
                    _ => return Err(CompileError::BackRefOutOfRange { n }),
                }
            }
            Token::Reverse => {
                if !self.options.reverse_ext() {
                    return Err(CompileError::ext("reverse ('@')"));
                }
                let mut reverse = false;
                while self.lexer.token() == &Token::Reverse {
                    reverse = !reverse;
                    self.lexer.consume()?;
                }
                // reverse the rest of the concatenation; the operand
                // consumed its own trailing token
                let e = self.e2(pool)?;
                if reverse {
                    pool.reverse_expr(e);
                }
                return Ok(e);
            }
            Token::Recursive => return Err(CompileError::ext("recursion ('(?R)')")),
            Token::Rpar => return Err(CompileError::parse("expected a '('")),
            Token::Eop => {
                return Err(CompileError::parse(
                    "expected an expression, found end of pattern",
                ))
            }
            token => {
                return Err(CompileError::parse(format!(
                    "expected an expression, found {token:?}"
                )))
            }
        };
        self.lexer.consume()?;
        Ok(e)
    }

    fn anchor(&self, kind: ExprKind) -> ExprKind {
        // whole-input matching is already anchored, so under ONE_LINE the
        // anchors carry no record structure
        if self.options.one_line() {
            ExprKind::Epsilon
        } else {
            kind
        }
    }

    fn fold_literal(&self, b: u8) -> ExprKind {
        if self.options.ignore_case() && b.is_ascii_alphabetic() {
            let mut set = ByteSet::new();
            set.set(b);
            set.set(b ^ 0x20);
            class_to_leaf(set)
        } else {
            ExprKind::Literal(b)
        }
    }

    /// Determinize the union of the operands (each wrapped with its own end
    /// marker) under `cond` and decompile the automaton back into a tree.
    fn dfa_rewrite(&self, pool: &mut ExprPool, operands: Vec<ExprId>, cond: AcceptCond) -> ExprId {
        let mut root: Option<ExprId> = None;
        for e in operands {
            let eop = pool.alloc(ExprKind::Eop);
            let wrapped = pool.alloc(ExprKind::Concat(e, eop));
            root = Some(match root {
                Some(u) => pool.alloc(ExprKind::Union(u, wrapped)),
                None => wrapped,
            });
        }
        let root = root.expect("at least one operand");
        let (table, info) = analyze(pool, root, self.options.delimiter);
        let dfa = DFA::construct(&table, &info.first, cond);
        let e = expr_from_dfa(&dfa, pool, self.options.delimiter);
        debug!(
            "operator rewrite: {} states decompiled ({cond:?})",
            dfa.len()
        );
        e
    }

    fn complement_rewrite(&self, pool: &mut ExprPool, e: ExprId) -> ExprId {
        let eop = pool.alloc(ExprKind::Eop);
        let wrapped = pool.alloc(ExprKind::Concat(e, eop));
        let (table, info) = analyze(pool, wrapped, self.options.delimiter);
        let mut dfa = DFA::construct(&table, &info.first, AcceptCond::All(1));
        dfa.complement();
        expr_from_dfa(&dfa, pool, self.options.delimiter)
    }
}

fn expand_repetition(pool: &mut ExprPool, e: ExprId, lo: usize, hi: Option<usize>) -> ExprId {
    // {0,inf}, {1,inf}, {0,1} and {1,1} never reach here; the lexer rewrote
    // them into the plain quantifier tokens
    let template = e;
    match hi {
        // zero copies of anything is the empty string
        Some(0) => pool.alloc(ExprKind::Epsilon),
        None => {
            let mut e = e;
            for _ in 0..lo.saturating_sub(2) {
                let copy = pool.clone_expr(template);
                e = pool.alloc(ExprKind::Concat(e, copy));
            }
            let copy = pool.clone_expr(template);
            let plus = pool.alloc(ExprKind::Plus(copy));
            pool.alloc(ExprKind::Concat(e, plus))
        }
        Some(hi) if hi == lo => {
            let mut e = e;
            for _ in 0..lo - 1 {
                let copy = pool.clone_expr(template);
                e = pool.alloc(ExprKind::Concat(e, copy));
            }
            e
        }
        Some(hi) => {
            let mut e = e;
            let mut lo = lo;
            for _ in 0..lo.saturating_sub(1) {
                let copy = pool.clone_expr(template);
                e = pool.alloc(ExprKind::Concat(e, copy));
            }
            if lo == 0 {
                e = pool.alloc(ExprKind::Qmark {
                    e,
                    non_greedy: false,
                });
                lo = 1;
            }
            for _ in 0..hi - lo {
                let copy = pool.clone_expr(template);
                let opt = pool.alloc(ExprKind::Qmark {
                    e: copy,
                    non_greedy: false,
                });
                e = pool.alloc(ExprKind::Concat(e, opt));
            }
            e
        }
    }
}

/// One UTF-8 encoded scalar value: the standard 1–4 byte sequence ranges,
/// surrogates and overlong forms excluded.
fn utf8_any_char(pool: &mut ExprPool) -> ExprId {
    const SEQS: &[&[(u8, u8)]] = &[
        &[(0x00, 0x7F)],
        &[(0xC2, 0xDF), (0x80, 0xBF)],
        &[(0xE0, 0xE0), (0xA0, 0xBF), (0x80, 0xBF)],
        &[(0xE1, 0xEC), (0x80, 0xBF), (0x80, 0xBF)],
        &[(0xED, 0xED), (0x80, 0x9F), (0x80, 0xBF)],
        &[(0xEE, 0xEF), (0x80, 0xBF), (0x80, 0xBF)],
        &[(0xF0, 0xF0), (0x90, 0xBF), (0x80, 0xBF), (0x80, 0xBF)],
        &[(0xF1, 0xF3), (0x80, 0xBF), (0x80, 0xBF), (0x80, 0xBF)],
        &[(0xF4, 0xF4), (0x80, 0x8F), (0x80, 0xBF), (0x80, 0xBF)],
    ];
    let mut union: Option<ExprId> = None;
    for seq in SEQS {
        let mut concat: Option<ExprId> = None;
        for &(lo, hi) in *seq {
            let mut set = ByteSet::new();
            set.set_range(lo, hi);
            let leaf = pool.alloc(class_to_leaf(set));
            concat = Some(match concat {
                Some(c) => pool.alloc(ExprKind::Concat(c, leaf)),
                None => leaf,
            });
        }
        let seq = concat.expect("sequences are nonempty");
        union = Some(match union {
            Some(u) => pool.alloc(ExprKind::Union(u, seq)),
            None => seq,
        });
    }
    union.expect("table is nonempty")
}
