//! The byte-cursor lexer.
//!
//! Produces one token at a time from the pattern bytes and owns all cursor
//! trickery: escape decoding with rewind, repetition-body scanning with a
//! literal `{` fallback, character-class scanning, and the re-entry stack
//! behind `(?R)` recursion. It never allocates expression nodes.

use crate::{
    error::CompileError,
    expr::{class_to_leaf, ByteSet, ExprKind},
    options::Options,
};

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Literal(u8),
    /// `[`: the class body is scanned separately by
    /// [`Lexer::lex_char_class`].
    CharClass,
    /// A predefined class escape (`\d`, `\w`, …), already resolved to its
    /// byte table.
    ByteRange(ByteSet),
    Dot,
    BegLine,
    EndLine,
    Union,
    Intersection,
    Xor,
    Qmark,
    Star,
    Plus,
    /// `{lo,hi}` after the trivial rewrites; `hi == None` is unbounded.
    Repetition { lo: usize, hi: Option<usize> },
    Lpar,
    Rpar,
    Complement,
    /// The `@` reverse marker.
    Reverse,
    /// A recursion marker seen while the extension is disabled; the parser
    /// turns this into an error.
    Recursive,
    /// The empty group `()`.
    Empty,
    BackRef { n: usize, weak: bool },
    /// End of pattern.
    Eop,
}

pub struct Lexer<'a> {
    pattern: &'a [u8],
    pos: usize,
    token: Token,
    /// Resume offsets of suspended `(?R)` re-entries, each sitting on the
    /// `)` that closes the recursion.
    stack: Vec<usize>,
    depth: usize,
    recursive_limit: usize,
    recursion_ext: bool,
    ignore_case: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(pattern: &'a [u8], options: &Options, recursive_limit: usize) -> Self {
        Lexer {
            pattern,
            pos: 0,
            token: Token::Eop,
            stack: Vec::new(),
            depth: 0,
            recursive_limit,
            recursion_ext: options.recursion_ext(),
            ignore_case: options.ignore_case(),
        }
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    fn peek(&self) -> Option<u8> {
        self.pattern.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.pattern.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    /// Advance to the next token.
    pub fn consume(&mut self) -> Result<&Token, CompileError> {
        let Some(b) = self.bump() else {
            if let Some(pos) = self.stack.pop() {
                self.pos = pos;
                self.depth -= 1;
                return self.consume();
            }
            self.token = Token::Eop;
            return Ok(&self.token);
        };

        self.token = match b {
            // extended operators
            b'@' => Token::Reverse,
            b'!' => Token::Complement,
            b'&' => {
                if self.peek() == Some(b'&') {
                    self.pos += 1;
                    Token::Xor
                } else {
                    Token::Intersection
                }
            }
            // ordinary metacharacters
            b'.' => Token::Dot,
            b'[' => Token::CharClass,
            b'|' => Token::Union,
            b'?' => Token::Qmark,
            b'+' => Token::Plus,
            b'*' => Token::Star,
            b')' => Token::Rpar,
            b'^' => Token::BegLine,
            b'$' => Token::EndLine,
            b'(' => {
                if self.peek() == Some(b')') {
                    self.pos += 1;
                    Token::Empty
                } else if self.peek() == Some(b'?')
                    && self.peek_at(1) == Some(b'R')
                    && self.peek_at(2) == Some(b')')
                {
                    self.pos += 2; // cursor now on ')'
                    self.recurse()
                } else {
                    Token::Lpar
                }
            }
            b'{' => self.lex_repetition()?,
            b'\\' => self.lex_metachar()?,
            b => Token::Literal(b),
        };
        Ok(&self.token)
    }

    /// Re-enter the pattern from the start, resuming at the `)` under the
    /// cursor once the re-read is exhausted; that `)` closes the `Lpar`
    /// emitted here.
    fn recurse(&mut self) -> Token {
        if !self.recursion_ext {
            return Token::Recursive;
        }
        if self.depth >= self.recursive_limit {
            self.pos += 1; // swallow the ')' of `(?R)`
            return Token::Empty;
        }
        self.stack.push(self.pos);
        self.depth += 1;
        self.pos = 0;
        Token::Lpar
    }

    fn lex_metachar(&mut self) -> Result<Token, CompileError> {
        // \N and \_N backreferences
        let mut weak = false;
        if self.peek() == Some(b'_') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
            weak = true;
        }
        if self.peek().is_some_and(|b| b.is_ascii_digit()) {
            let mut n = 0usize;
            while let Some(d) = self.peek().filter(u8::is_ascii_digit) {
                n = n * 10 + (d - b'0') as usize;
                self.pos += 1;
            }
            if n == 0 {
                return Err(CompileError::Lex("bad backreference \\0"));
            }
            return Ok(Token::BackRef { n: n - 1, weak });
        }

        let Some(b) = self.bump() else {
            return Err(CompileError::Lex("bad '\\' at end of pattern"));
        };
        Ok(match b {
            b'a' => Token::Literal(0x07),
            b'f' => Token::Literal(0x0c),
            b'n' => Token::Literal(b'\n'),
            b'r' => Token::Literal(b'\r'),
            b't' => Token::Literal(b'\t'),
            b'v' => Token::Literal(0x0b),
            b'd' | b'D' => {
                let mut set = ByteSet::new();
                set.set_range(b'0', b'9');
                if b == b'D' {
                    set.flip();
                }
                Token::ByteRange(set)
            }
            b's' | b'S' => {
                let mut set = ByteSet::new();
                for c in [b'\t', b'\n', 0x0c, b'\r', b' '] {
                    set.set(c);
                }
                if b == b'S' {
                    set.flip();
                }
                Token::ByteRange(set)
            }
            b'w' | b'W' => {
                let mut set = ByteSet::new();
                set.set_range(b'0', b'9');
                set.set_range(b'A', b'Z');
                set.set_range(b'a', b'z');
                set.set(b'_');
                if b == b'W' {
                    set.flip();
                }
                Token::ByteRange(set)
            }
            b'x' => {
                // 0..=2 hex digits; rewind on the first invalid one
                let mut hex = 0u8;
                for i in 0..2 {
                    let Some(d) = self.bump() else { break };
                    hex <<= 4;
                    match d {
                        b'0'..=b'9' => hex += d - b'0',
                        b'a'..=b'f' => hex += d - b'a' + 10,
                        b'A'..=b'F' => hex += d - b'A' + 10,
                        _ => {
                            if i == 0 {
                                hex = 0;
                            } else {
                                hex >>= 4;
                            }
                            self.pos -= 1;
                            break;
                        }
                    }
                }
                Token::Literal(hex)
            }
            b => Token::Literal(b),
        })
    }

    /// Scan `{...}`. Malformed bodies fall back to a literal `{` without
    /// consuming anything.
    fn lex_repetition(&mut self) -> Result<Token, CompileError> {
        let mut p = self.pos;
        let at = |p: usize| self.pattern.get(p).copied();

        let mut lo = 0usize;
        match at(p) {
            Some(d) if d.is_ascii_digit() => {
                while let Some(d) = at(p).filter(u8::is_ascii_digit) {
                    lo = lo * 10 + (d - b'0') as usize;
                    p += 1;
                }
            }
            Some(b',') => lo = 0,
            _ => return Ok(Token::Literal(b'{')),
        }
        let hi = match at(p) {
            Some(b',') => {
                p += 1;
                match at(p) {
                    Some(d) if d.is_ascii_digit() => {
                        let mut hi = 0usize;
                        while let Some(d) = at(p).filter(u8::is_ascii_digit) {
                            hi = hi * 10 + (d - b'0') as usize;
                            p += 1;
                        }
                        if at(p) != Some(b'}') {
                            return Ok(Token::Literal(b'{'));
                        }
                        Some(hi)
                    }
                    Some(b'}') => None,
                    _ => return Ok(Token::Literal(b'{')),
                }
            }
            Some(b'}') => Some(lo),
            _ => return Ok(Token::Literal(b'{')),
        };
        self.pos = p + 1;

        Ok(match (lo, hi) {
            (0, None) => Token::Star,
            (1, None) => Token::Plus,
            (0, Some(1)) => Token::Qmark,
            (1, Some(1)) => self.consume()?.clone(),
            (lo, Some(hi)) if hi < lo => {
                return Err(CompileError::RepetitionRange { lo, hi });
            }
            (lo, hi) => Token::Repetition { lo, hi },
        })
    }

    /// Scan a `[...]` body (the cursor sits just past the `[`) and return
    /// the canonical leaf for it.
    pub fn lex_char_class(&mut self) -> Result<ExprKind, CompileError> {
        const UNTERMINATED: CompileError = CompileError::Lex("[ ] imbalance");

        let mut set = ByteSet::new();
        let mut negative = false;
        if self.peek() == Some(b'^') {
            self.pos += 1;
            negative = true;
        }
        let mut last = 0u8;
        if let Some(b @ (b']' | b'-')) = self.peek() {
            set.set(b);
            last = b;
            self.pos += 1;
        }
        let mut range = false;
        loop {
            let b = match self.peek() {
                Option::None => return Err(UNTERMINATED),
                Some(b']') => break,
                Some(b) => b,
            };
            self.pos += 1;
            if !range && b == b'-' {
                range = true;
                continue;
            }
            let b = if b == b'\\' {
                self.bump().ok_or(UNTERMINATED)?
            } else {
                b
            };
            set.set(b);
            if range {
                for i in last.saturating_add(1)..b {
                    set.set(i);
                }
                range = false;
            }
            last = b;
        }
        self.pos += 1; // ']'
        if range {
            set.set(b'-');
        }

        // case-fold the written set, then negate: `[^a]` must exclude both
        // cases under IGNORE_CASE
        if self.ignore_case {
            for b in b'a'..=b'z' {
                if set.test(b) {
                    set.set(b ^ 0x20);
                } else if set.test(b ^ 0x20) {
                    set.set(b);
                }
            }
        }
        if negative {
            set.flip();
        }
        Ok(class_to_leaf(set))
    }

    /// Whether the current token can start a concatenation operand.
    pub fn concatenated(&self) -> bool {
        matches!(
            self.token,
            Token::Literal(_)
                | Token::CharClass
                | Token::ByteRange(_)
                | Token::Dot
                | Token::BegLine
                | Token::EndLine
                | Token::Empty
                | Token::Lpar
                | Token::Complement
                | Token::Reverse
                | Token::Recursive
                | Token::BackRef { .. }
        )
    }

    /// Whether the current token is a postfix quantifier.
    pub fn quantifier(&self) -> bool {
        matches!(
            self.token,
            Token::Star | Token::Plus | Token::Qmark | Token::Repetition { .. }
        )
    }
}
