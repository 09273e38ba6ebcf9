use thiserror::Error;

/// The reasons compiling a pattern can fail.
///
/// Matching itself is total over the input and never fails; every error this
/// engine can produce is reported at compile time. There is no partial
/// "best effort" compile: the first error aborts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CompileError {
    /// Malformed escape, unterminated character class or unterminated
    /// repetition.
    #[error("lex error: {0}")]
    Lex(&'static str),

    /// Unbalanced parenthesis, a dangling operator, or an extended operator
    /// used without its [`Flags`](crate::Flags) bit.
    #[error("parse error: {0}")]
    Parse(String),

    /// `{n,m}` with `m < n`.
    #[error("invalid repetition quantifier {{{lo},{hi}}}")]
    RepetitionRange { lo: usize, hi: usize },

    /// `\N` or `\_N` referring to a group that does not exist (yet).
    #[error("backreference \\{} out of range", n + 1)]
    BackRefOutOfRange { n: usize },

    /// A request the DFA model cannot honor, e.g. exact backreferences or
    /// a nullable pattern under `NON_NULLABLE`.
    #[error("unsupported in the DFA model: {0}")]
    Unsupported(String),
}

impl CompileError {
    pub(crate) fn parse(msg: impl Into<String>) -> Self {
        CompileError::Parse(msg.into())
    }

    pub(crate) fn ext(name: &str) -> Self {
        CompileError::Parse(format!("{name} is not enabled by the parse flags"))
    }
}
