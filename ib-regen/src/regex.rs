//! The compiled pattern and its matchers.
//!
//! Compilation runs the whole pipeline: parse into the arena, apply the
//! option-driven tree rewrites (reversal, `.*` un-anchoring, greediness),
//! append the end-of-pattern marker, run the position passes, determinize,
//! and finally the requested peephole stages. Matching borrows the
//! automata read-only; one `Regex` can serve any number of threads.

use aho_corasick::AhoCorasick;
use bon::bon;
use log::debug;

use crate::{
    dfa::{AcceptCond, DFA, REJECT},
    error::CompileError,
    expr::{
        must::required_literal,
        position::{analyze, ExprInfo, LeafTest, PositionTable},
        ExprId, ExprKind, ExprPool,
    },
    options::{CompileLevel, Options},
    syntax::Parser,
};
#[cfg(feature = "parallel")]
use crate::sfa::SFA;

/// The span of a match, reported when `CAPTURED_MATCH` is set.
///
/// Offsets index into the haystack passed to [`Regex::match_with`]. The
/// span refers to forward scans; under `REVERSE_MATCH` it is left empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchContext {
    span: Option<(usize, usize)>,
}

impl MatchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> Option<usize> {
        self.span.map(|(b, _)| b)
    }

    pub fn end(&self) -> Option<usize> {
        self.span.map(|(_, e)| e)
    }

    pub fn clear(&mut self) {
        self.span = None;
    }
}

/// A compiled extended regular expression.
///
/// # Example
///
/// ```
/// use ib_regen::{Flags, Options, Regex};
///
/// let re = Regex::new("a[0-9]+z").unwrap();
/// assert!(re.is_match(b"a2024z"));
/// assert!(!re.is_match(b"a2024z!"));
///
/// // `&` and `!` need their extension bits:
/// let re = Regex::builder()
///     .options(Options::new(Flags::EXTENDED))
///     .build(".*a.*&!.*z.*")
///     .unwrap();
/// assert!(re.is_match(b"abc"));
/// assert!(!re.is_match(b"az"));
/// ```
pub struct Regex {
    pattern: String,
    options: Options,
    pool: ExprPool,
    /// Root of the analyzed tree, end marker included.
    root: ExprId,
    table: PositionTable,
    info: ExprInfo,
    dfa: DFA,
    /// Automaton of the reversed expression, for recovering the match
    /// begin of captured scans.
    reverse_dfa: Option<DFA>,
    #[cfg(feature = "parallel")]
    sfa: Option<SFA>,
    prefilter: Option<AhoCorasick>,
    olevel: CompileLevel,
}

#[bon]
impl Regex {
    /// Compile `pattern` with default options.
    pub fn new(pattern: &str) -> Result<Regex, CompileError> {
        Self::builder().build(pattern)
    }

    /// Return a builder for configuring the compilation of a `Regex`.
    ///
    /// ```
    /// use ib_regen::{CompileLevel, Flags, Options, Regex};
    ///
    /// let re = Regex::builder()
    ///     .options(Options::new(Flags::IGNORE_CASE))
    ///     .level(CompileLevel::O3)
    ///     .build("foo|bar")
    ///     .unwrap();
    /// assert!(re.is_match(b"BAR"));
    /// ```
    #[builder(builder_type = Builder, finish_fn(name = build))]
    pub fn builder(
        #[builder(finish_fn)] pattern: &str,
        #[builder(default)] options: Options,
        /// Peephole/minimization stage to compile the automaton to.
        #[builder(default)]
        level: CompileLevel,
        /// Re-entry bound for `(?R)` / `@`.
        #[builder(default = 2)]
        recursive_limit: usize,
        /// Worker count of the parallel matcher (`PARALLEL_MATCH`).
        #[builder(default = 2)]
        thread_num: usize,
    ) -> Result<Regex, CompileError> {
        let mut pool = ExprPool::new();
        let parsed = Parser::parse(pattern.as_bytes(), &mut pool, &options, recursive_limit)?;

        if options.reverse_regex() {
            pool.reverse_expr(parsed);
        }

        // un-anchor the requested sides: partial matching is full matching
        // of `.*` · P · `.*`
        let mut root = parsed;
        if !options.prefix_match() {
            let pre = dot_star(&mut pool);
            root = pool.alloc(ExprKind::Concat(pre, root));
        }
        if !options.suffix_match() {
            let post = dot_star(&mut pool);
            root = pool.alloc(ExprKind::Concat(root, post));
        }
        if options.shortest_match() {
            pool.non_greedify(root);
        }

        let eop = pool.alloc(ExprKind::Eop);
        let root = pool.alloc(ExprKind::Concat(root, eop));
        let (table, info) = analyze(&pool, root, options.delimiter);
        debug_assert_eq!(
            table
                .positions
                .iter()
                .filter(|p| p.test == LeafTest::Eop)
                .count(),
            1,
            "exactly one end marker per compiled pattern"
        );
        debug_assert!(table.is_eop(table.len() as u32 - 1), "end marker is rightmost");

        if options.non_nullable() && info.nullable {
            return Err(CompileError::Unsupported(
                "the pattern accepts the empty string (NON_NULLABLE)".into(),
            ));
        }

        let mut dfa = DFA::construct(&table, &info.first, AcceptCond::All(1));
        dfa.compile(level);

        let prefilter = if options.filtered_match() {
            required_literal(&pool, parsed)
                .and_then(|word| AhoCorasick::new([word]).ok())
        } else {
            None
        };
        if prefilter.is_some() {
            debug!("filtered match: required literal prefilter installed");
        }

        let reverse_dfa = if options.captured_match() && !options.reverse_match() {
            let mut rev = pool.clone_expr(parsed);
            pool.reverse_expr(rev);
            if !options.suffix_match() {
                // trailing garbage of the forward scan is leading garbage here
                let pre = dot_star(&mut pool);
                rev = pool.alloc(ExprKind::Concat(pre, rev));
            }
            let eop = pool.alloc(ExprKind::Eop);
            let rev = pool.alloc(ExprKind::Concat(rev, eop));
            let (rev_table, rev_info) = analyze(&pool, rev, options.delimiter);
            let mut dfa = DFA::construct(&rev_table, &rev_info.first, AcceptCond::All(1));
            dfa.compile(level);
            Some(dfa)
        } else {
            None
        };

        #[cfg(not(feature = "parallel"))]
        if options.parallel_match() {
            return Err(CompileError::Unsupported(
                "parallel matching requires the `parallel` feature".into(),
            ));
        }
        #[cfg(feature = "parallel")]
        let sfa = options
            .parallel_match()
            .then(|| SFA::from_positions(&table, &info.first, thread_num));
        #[cfg(not(feature = "parallel"))]
        let _ = thread_num;

        Ok(Regex {
            pattern: pattern.to_owned(),
            options,
            pool,
            root,
            table,
            info,
            dfa,
            reverse_dfa,
            #[cfg(feature = "parallel")]
            sfa,
            prefilter,
            olevel: level,
        })
    }
}

impl Regex {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn olevel(&self) -> CompileLevel {
        self.olevel
    }

    /// Shortest input the compiled tree can accept.
    pub fn min_length(&self) -> usize {
        self.info.min_length
    }

    /// Longest input the compiled tree can accept (`usize::MAX` when
    /// unbounded).
    pub fn max_length(&self) -> usize {
        self.info.max_length
    }

    pub fn dfa(&self) -> &DFA {
        &self.dfa
    }

    /// The arena holding the compiled tree.
    pub fn pool(&self) -> &ExprPool {
        &self.pool
    }

    /// Root of the compiled tree (end marker included).
    pub fn root(&self) -> ExprId {
        self.root
    }

    /// The flat table of Glushkov positions.
    pub fn position_table(&self) -> &PositionTable {
        &self.table
    }

    /// Promote the automaton to a higher peephole/minimization stage.
    /// Levels never go back down.
    pub fn compile_level(&mut self, level: CompileLevel) {
        if level <= self.olevel {
            return;
        }
        self.dfa.compile(level);
        if let Some(rev) = &mut self.reverse_dfa {
            rev.compile(level);
        }
        self.olevel = level;
    }

    /// Whether the pattern matches `input`, honoring the compiled options.
    pub fn is_match(&self, input: &[u8]) -> bool {
        self.match_with(input, None)
    }

    /// Match `input`; when `CAPTURED_MATCH` is set and a context is given,
    /// it receives the span of the match.
    pub fn match_with(&self, input: &[u8], mut context: Option<&mut MatchContext>) -> bool {
        if let Some(ctx) = context.as_deref_mut() {
            ctx.clear();
        }
        if let Some(prefilter) = &self.prefilter {
            if !prefilter.is_match(input) {
                return false;
            }
        }

        #[cfg(feature = "parallel")]
        if let Some(sfa) = &self.sfa {
            if !self.options.captured_match() && !self.options.reverse_match() {
                return sfa.is_match(input);
            }
        }

        self.interpret(input, context)
    }

    /// The sequential interpreter loop.
    fn interpret(&self, input: &[u8], mut context: Option<&mut MatchContext>) -> bool {
        let shortest = self.options.shortest_match();
        let reverse = self.options.reverse_match();
        let n = input.len();

        let mut state = self.dfa.start_state();
        if shortest && self.dfa.accept(state) {
            self.capture(input, 0, context.as_deref_mut());
            return true;
        }
        for i in 0..n {
            let b = if reverse { input[n - 1 - i] } else { input[i] };
            state = self.dfa.next(state, b);
            if state == REJECT {
                return false;
            }
            if shortest && self.dfa.accept(state) {
                self.capture(input, i + 1, context.as_deref_mut());
                return true;
            }
        }
        if !self.dfa.accept(state) {
            return false;
        }
        self.capture(input, n, context);
        true
    }

    /// Populate the context span for a forward match ending at `end`: run
    /// the reversed automaton backwards from there and keep its furthest
    /// accept as the match begin.
    fn capture(&self, input: &[u8], end: usize, context: Option<&mut MatchContext>) {
        let Some(context) = context else { return };
        if !self.options.captured_match() || self.options.reverse_match() {
            return;
        }
        let Some(reverse_dfa) = &self.reverse_dfa else {
            context.span = Some((0, end));
            return;
        };
        let mut state = reverse_dfa.start_state();
        let mut begin = reverse_dfa.accept(state).then_some(end);
        for (k, &b) in input[..end].iter().rev().enumerate() {
            state = reverse_dfa.next(state, b);
            if state == REJECT {
                break;
            }
            if reverse_dfa.accept(state) {
                begin = Some(end - (k + 1));
            }
        }
        if let Some(begin) = begin {
            context.span = Some((begin, end));
        }
    }
}

fn dot_star(pool: &mut ExprPool) -> ExprId {
    let dot = pool.alloc(ExprKind::Dot);
    pool.alloc(ExprKind::Star {
        e: dot,
        non_greedy: false,
    })
}
