use bitflags::bitflags;

bitflags! {
    /// Parse and match behavior bits, threaded through the lexer, the
    /// parser, the DFA builder and the matchers.
    ///
    /// The `*_EXT` bits gate the extended surface syntax (`!`, `&`, `&&`,
    /// `@`/`(?R)`, `\_N`); using an operator whose bit is off is a parse
    /// error rather than a silent literal.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u32 {
        const IGNORE_CASE = 1 << 0;
        /// Anchors bind to the whole input instead of delimiter-separated
        /// records.
        const ONE_LINE = 1 << 1;
        /// Compile the reversed pattern (concatenation order flipped).
        const REVERSE_REGEX = 1 << 2;
        /// Report a match as soon as an accepting state is entered.
        const SHORTEST_MATCH = 1 << 3;
        /// Scan the input back to front.
        const REVERSE_MATCH = 1 << 4;
        const REVERSE = Self::REVERSE_REGEX.bits() | Self::REVERSE_MATCH.bits();
        /// Allow an arbitrary prefix before the match (prepends `.*`).
        const NO_PREFIX_MATCH = 1 << 5;
        /// Allow an arbitrary suffix after the match (appends `.*`).
        const NO_SUFFIX_MATCH = 1 << 6;
        const PARTIAL_MATCH = Self::NO_PREFIX_MATCH.bits() | Self::NO_SUFFIX_MATCH.bits();
        /// Match through the segment-transducer automaton (requires the
        /// `parallel` feature).
        const PARALLEL_MATCH = 1 << 7;
        /// Populate a [`MatchContext`](crate::MatchContext) with the match span.
        const CAPTURED_MATCH = 1 << 8;
        /// Reject inputs missing the required literal before running the DFA.
        const FILTERED_MATCH = 1 << 9;
        /* extended syntax (!, &, &&, @, \_N) */
        const COMPLEMENT_EXT = 1 << 10;
        const INTERSECTION_EXT = 1 << 11;
        /// Gates `(?R)` recursive inclusion.
        const RECURSION_EXT = 1 << 12;
        const XOR_EXT = 1 << 13;
        const SHUFFLE_EXT = 1 << 14;
        const PERMUTATION_EXT = 1 << 15;
        /// Gates the `@` reverse marker.
        const REVERSE_EXT = 1 << 16;
        const WEAK_BACKREF_EXT = 1 << 17;
        const EXTENDED = Self::COMPLEMENT_EXT.bits()
            | Self::INTERSECTION_EXT.bits()
            | Self::RECURSION_EXT.bits()
            | Self::XOR_EXT.bits()
            | Self::SHUFFLE_EXT.bits()
            | Self::PERMUTATION_EXT.bits()
            | Self::REVERSE_EXT.bits()
            | Self::WEAK_BACKREF_EXT.bits();
        /// `.` matches one UTF-8 encoded scalar instead of one byte.
        const ENCODING_UTF8 = 1 << 18;
        /// Reject patterns that accept the empty string.
        const NON_NULLABLE = 1 << 19;
    }
}

/// How much post-construction work to spend on the DFA.
///
/// `O1` collapses uniform transition rows into an unconditional fallthrough,
/// `O2` additionally derives range/other transition pairs the interpreter can
/// take with two compares, `O3` minimizes the automaton first. `Onone` and
/// `O0` leave the raw subset-construction output untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum CompileLevel {
    Onone,
    O0,
    O1,
    #[default]
    O2,
    O3,
}

/// The option bundle: behavior flags plus the record delimiter byte that
/// `^` and `$` consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    pub flags: Flags,
    pub delimiter: u8,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            flags: Flags::default(),
            delimiter: b'\n',
        }
    }
}

impl From<Flags> for Options {
    fn from(flags: Flags) -> Self {
        Options {
            flags,
            ..Default::default()
        }
    }
}

impl Options {
    pub fn new(flags: Flags) -> Self {
        flags.into()
    }

    pub fn ignore_case(&self) -> bool {
        self.flags.contains(Flags::IGNORE_CASE)
    }

    pub fn one_line(&self) -> bool {
        self.flags.contains(Flags::ONE_LINE)
    }

    pub fn shortest_match(&self) -> bool {
        self.flags.contains(Flags::SHORTEST_MATCH)
    }

    pub fn reverse_regex(&self) -> bool {
        self.flags.contains(Flags::REVERSE_REGEX)
    }

    pub fn reverse_match(&self) -> bool {
        self.flags.contains(Flags::REVERSE_MATCH)
    }

    pub fn reverse(&self) -> bool {
        self.reverse_regex() && self.reverse_match()
    }

    pub fn prefix_match(&self) -> bool {
        !self.flags.contains(Flags::NO_PREFIX_MATCH)
    }

    pub fn suffix_match(&self) -> bool {
        !self.flags.contains(Flags::NO_SUFFIX_MATCH)
    }

    pub fn full_match(&self) -> bool {
        self.prefix_match() && self.suffix_match()
    }

    pub fn partial_match(&self) -> bool {
        !self.full_match()
    }

    pub fn parallel_match(&self) -> bool {
        self.flags.contains(Flags::PARALLEL_MATCH)
    }

    pub fn captured_match(&self) -> bool {
        self.flags.contains(Flags::CAPTURED_MATCH)
    }

    /// A filtered match only makes sense when the match may start anywhere.
    pub fn filtered_match(&self) -> bool {
        self.flags.contains(Flags::FILTERED_MATCH) && !self.prefix_match()
    }

    pub fn complement_ext(&self) -> bool {
        self.flags.contains(Flags::COMPLEMENT_EXT)
    }

    pub fn intersection_ext(&self) -> bool {
        self.flags.contains(Flags::INTERSECTION_EXT)
    }

    pub fn recursion_ext(&self) -> bool {
        self.flags.contains(Flags::RECURSION_EXT)
    }

    pub fn xor_ext(&self) -> bool {
        self.flags.contains(Flags::XOR_EXT)
    }

    pub fn reverse_ext(&self) -> bool {
        self.flags.contains(Flags::REVERSE_EXT)
    }

    pub fn weak_backref_ext(&self) -> bool {
        self.flags.contains(Flags::WEAK_BACKREF_EXT)
    }

    pub fn encoding_utf8(&self) -> bool {
        self.flags.contains(Flags::ENCODING_UTF8)
    }

    pub fn non_nullable(&self) -> bool {
        self.flags.contains(Flags::NON_NULLABLE)
    }
}
