/*!
An extended regular expression engine with a deterministic byte-level core.

On top of the usual syntax (`.`, classes, `|`, `?`/`*`/`+`, `{n,m}`,
groups), the pattern language supports operators regular languages are
closed under but mainstream engines skip:

- `!e` (complement)
- `e&e` (intersection)
- `e&&e` (xor)
- `@e` (reversal)
- `(?R)` (bounded recursive inclusion)
- `\_N` (weak, same-language backreferences)

Patterns compile through a Glushkov position automaton into a complete
DFA over the byte alphabet `[0, 255]`; the extended operators are realized
during parsing by determinizing the operand branches and decompiling the
automaton back into the tree. Matching is a tight interpreter loop, or,
with the `parallel` feature and [`Flags::PARALLEL_MATCH`], a segment
transducer that summarizes fixed-length input segments on a worker pool
and composes the summaries in order.

## Usage
```
use ib_regen::{Flags, Options, Regex};

let re = Regex::new("(ab)+c?").unwrap();
assert!(re.is_match(b"ababc"));
assert!(!re.is_match(b"abca"));

// intersection and complement need their extension bits:
let re = Regex::builder()
    .options(Options::new(Flags::EXTENDED))
    .build(".*ing&!.*k.*")
    .unwrap();
assert!(re.is_match(b"matching"));
assert!(!re.is_match(b"marking"));
```

Matching always answers whole-input acceptance; set
[`Flags::NO_PREFIX_MATCH`] / [`Flags::NO_SUFFIX_MATCH`] (or the
`PARTIAL_MATCH` composite) to allow surrounding garbage, and
[`Flags::CAPTURED_MATCH`] plus a [`MatchContext`] to learn the span.
*/

pub mod dfa;
pub mod error;
pub mod expr;
pub mod nfa;
pub mod options;
pub mod regex;
#[cfg(feature = "parallel")]
pub mod sfa;
pub mod syntax;

pub use error::CompileError;
pub use options::{CompileLevel, Flags, Options};
pub use regex::{MatchContext, Regex};

#[cfg(test)]
mod tests {
    use super::*;

    fn compiled(pattern: &str, flags: Flags) -> Regex {
        Regex::builder()
            .options(Options::new(flags))
            .build(pattern)
            .unwrap_or_else(|e| panic!("compiling /{pattern}/: {e}"))
    }

    /// The classic acceptance table, whole-input semantics.
    #[test]
    fn acceptance_table() {
        let cases: &[(&str, &[u8], bool)] = &[
            ("abc", b"abc", true),
            ("abc", b"xbc", false),
            ("abc", b"axc", false),
            ("abc", b"abx", false),
            (".*abc.*", b"xabcy", true),
            (".*abc", b"ababc", true),
            ("ab*c", b"abc", true),
            ("ab*bc", b"abc", true),
            ("ab*bc", b"abbc", true),
            ("ab*bc", b"abbbbc", true),
            ("ab+bc", b"abbc", true),
            ("ab+bc", b"abc", false),
            ("ab+bc", b"abq", false),
            ("ab+bc", b"abbbbc", true),
            ("ab?bc", b"abbc", true),
            ("ab?bc", b"abc", true),
            ("ab?bc", b"abbbbc", false),
            ("ab?c", b"abc", true),
            ("a.c", b"abc", true),
            ("a.c", b"axc", true),
            ("a.*c", b"axyzc", true),
            ("a.*c", b"axyzd", false),
            ("a[bc]d", b"abc", false),
            ("a[bc]d", b"abd", true),
            ("a[b-d]e", b"abd", false),
            ("a[b-d]e", b"ace", true),
            (".*a[b-d]", b"aac", true),
            ("a[-b]", b"a-", true),
            ("a[b-]", b"a-", true),
            ("a]", b"a]", true),
            ("a[]]b", b"a]b", true),
            ("a[^bc]d", b"aed", true),
            ("a[^bc]d", b"abd", false),
            ("a[^-b]c", b"adc", true),
            ("a[^-b]c", b"a-c", false),
            ("a[^]b]c", b"a]c", false),
            ("a[^]b]c", b"adc", true),
            ("ab|cd", b"abc", false),
            ("ab|cd", b"abcd", false),
            ("$b", b"b", false),
            (r"a\(b", b"a(b", true),
            (r"a\(*b", b"ab", true),
            (r"a\(*b", b"a((b", true),
            (r"a\x", br"a\x", false),
            ("((a))", b"a", true),
            ("(a)b(c)", b"abc", true),
            ("a+b+c", b"aabbbc", true),
            ("a**", b"", true),
            ("a*?", b"", true),
            ("(a*)*", b"", true),
            ("(a*)+", b"", true),
            ("(a*|b)*", b"", true),
            ("(a+|b)*", b"ab", true),
            ("(a+|b)+", b"ab", true),
            (".*(a+|b)?", b"ab", true),
            ("[^ab]*", b"cde", true),
            ("abc", b"", false),
            ("a*", b"", true),
            ("([abc])*d", b"abbbcd", true),
            ("([abc])*bcd", b"abcd", true),
            ("a|b|c|d|e", b"e", true),
            ("(a|b|c|d|e)f", b"ef", true),
            ("((a*|b))*", b"", true),
            ("abcd*efg", b"abcdefg", true),
            ("ab*", b"xabyabbbz", false),
            ("ab*", b"xayabbbz", false),
            (".*(ab|cd)e", b"abcde", true),
            ("[abhgefdc]ij", b"hij", true),
            ("^(ab|cd)e", b"abcde", false),
            (".*(a|b)c*d", b"abcd", true),
            ("(ab|ab*)bc", b"abc", true),
            ("a([bc]*)c*", b"abc", true),
            ("a([bc]*)(c*d)", b"abcd", true),
            ("a([bc]+)(c*d)", b"abcd", true),
            ("a([bc]*)(c+d)", b"abcd", true),
            ("a[bcd]*dcdcde", b"adcdcde", true),
            ("a[bcd]+dcdcde", b"adcdcde", false),
            ("(ab|a)b*c", b"abc", true),
            ("((a)(b)c)(d)", b"abcd", true),
            ("[A-Za-z_][A-Za-z1-9_]*", b"alpha", true),
            ("(bc+d$|ef*g.|h?i(j|k))", b"effgz", true),
            ("(bc+d$|ef*g.|h?i(j|k))", b"ij", true),
            ("(bc+d$|ef*g.|h?i(j|k))", b"effg", false),
            ("(bc+d$|ef*g.|h?i(j|k))", b"bcdd", false),
            (".*(bc+d$|ef*g.|h?i(j|k))", b"reffgz", true),
            ("((((((((((a))))))))))", b"-", false),
            ("(((((((((a)))))))))", b"a", true),
            ("multiple words of text", b"uh-uh", false),
            ("multiple words.*", b"multiple words, yeah", true),
            ("(.*)c(.*)", b"abcde", true),
            ("[k]", b"ab", false),
            ("abcd", b"abcd", true),
            ("a(bc)d", b"abcd", true),
            ("a[-]?c", b"ac", true),
        ];
        for &(pattern, input, expected) in cases {
            let re = Regex::new(pattern)
                .unwrap_or_else(|e| panic!("compiling /{pattern}/: {e}"));
            assert_eq!(
                re.is_match(input),
                expected,
                "/{pattern}/ on {:?}",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[test]
    fn grouped_pattern() {
        let re = Regex::new("a(bc)d").unwrap();
        assert!(re.is_match(b"abcd"));
        assert!(!re.is_match(b"abd"));
    }

    #[test]
    fn complement_scenario() {
        let re = compiled("!abc", Flags::COMPLEMENT_EXT);
        assert!(re.is_match(b"abd"));
        assert!(re.is_match(b""));
        assert!(re.is_match(b"abcd"));
        assert!(!re.is_match(b"abc"));
    }

    #[test]
    fn intersection_scenario() {
        let re = compiled(".*a.*&.*b.*", Flags::INTERSECTION_EXT);
        assert!(re.is_match(b"ba"));
        assert!(re.is_match(b"xaxbx"));
        assert!(!re.is_match(b"aaa"));
        assert!(!re.is_match(b""));

        // three-way intersection requires all branch markers at once
        let re = compiled(".*a.*&.*b.*&.*c.*", Flags::INTERSECTION_EXT);
        assert!(re.is_match(b"cab"));
        assert!(!re.is_match(b"ab"));
    }

    #[test]
    fn xor_scenario() {
        let re = compiled(".*a.*&&.*b.*", Flags::XOR_EXT);
        assert!(re.is_match(b"xax"));
        assert!(re.is_match(b"xbx"));
        assert!(!re.is_match(b"ab"));
        assert!(!re.is_match(b"xx"));
    }

    #[test]
    fn complement_law() {
        let samples: &[&[u8]] = &[b"", b"a", b"ab", b"abc", b"abcd", b"ba", b"zzz"];
        for pattern in ["abc", "a*b", "(ab|cd)+", "a[0-9]b"] {
            let plain = Regex::new(pattern).unwrap();
            let negated = compiled(&format!("!({pattern})"), Flags::COMPLEMENT_EXT);
            for input in samples {
                assert_eq!(
                    negated.is_match(input),
                    !plain.is_match(input),
                    "complement law: /{pattern}/ on {:?}",
                    String::from_utf8_lossy(input)
                );
            }
        }
    }

    #[test]
    fn intersection_law() {
        let samples: &[&[u8]] = &[b"", b"ab", b"ba", b"aabb", b"abab", b"ccc", b"cab"];
        let pairs = [(".*a.*", ".*b.*"), ("(a|b)*", ".*ab.*"), ("a.*", ".*b")];
        for (p1, p2) in pairs {
            let e1 = Regex::new(p1).unwrap();
            let e2 = Regex::new(p2).unwrap();
            let both = compiled(&format!("{p1}&{p2}"), Flags::INTERSECTION_EXT);
            for input in samples {
                assert_eq!(
                    both.is_match(input),
                    e1.is_match(input) && e2.is_match(input),
                    "intersection law: /{p1}/ & /{p2}/ on {:?}",
                    String::from_utf8_lossy(input)
                );
            }
        }
    }

    #[test]
    fn xor_law() {
        let samples: &[&[u8]] = &[b"", b"a", b"b", b"ab", b"ba", b"zz"];
        let (p1, p2) = (".*a.*", ".*b.*");
        let e1 = Regex::new(p1).unwrap();
        let e2 = Regex::new(p2).unwrap();
        let either = compiled(&format!("{p1}&&{p2}"), Flags::XOR_EXT);
        for input in samples {
            assert_eq!(
                either.is_match(input),
                e1.is_match(input) ^ e2.is_match(input),
                "xor law on {:?}",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[test]
    fn minimization_preserves_language() {
        let samples: &[&[u8]] = &[b"", b"a", b"ab", b"abc", b"abcd", b"bc", b"aabc"];
        for pattern in ["a(b|c)*d|ab*", ".*abc", "(ab){2,4}"] {
            let raw = Regex::builder()
                .level(CompileLevel::O0)
                .build(pattern)
                .unwrap();
            let mut minimized = Regex::builder()
                .level(CompileLevel::O3)
                .build(pattern)
                .unwrap();
            assert!(minimized.dfa().len() <= raw.dfa().len());
            for input in samples {
                assert_eq!(raw.is_match(input), minimized.is_match(input), "/{pattern}/");
            }
            // idempotent up to renaming: a second pass changes nothing
            let size = minimized.dfa().len();
            minimized.compile_level(CompileLevel::O3);
            assert_eq!(minimized.dfa().len(), size);
        }
    }

    #[test]
    fn gnfa_round_trip_preserves_language() {
        use crate::dfa::{gnfa::expr_from_dfa, AcceptCond, DFA};
        use crate::expr::{position::analyze, ExprKind, ExprPool};

        let samples: &[&[u8]] = &[b"", b"a", b"ab", b"ba", b"aab", b"abab", b"x"];
        for pattern in ["a(a|b)*b", "a+b?", ".*ab"] {
            let re = Regex::new(pattern).unwrap();
            let mut pool = ExprPool::new();
            let decompiled = expr_from_dfa(re.dfa(), &mut pool, b'\n');
            let eop = pool.alloc(ExprKind::Eop);
            let root = pool.alloc(ExprKind::Concat(decompiled, eop));
            let (table, info) = analyze(&pool, root, b'\n');
            let rebuilt = DFA::construct(&table, &info.first, AcceptCond::All(1));
            for input in samples {
                assert_eq!(
                    re.is_match(input),
                    rebuilt.full_match(input),
                    "round trip of /{pattern}/ on {:?}",
                    String::from_utf8_lossy(input)
                );
            }
        }
    }

    /// Follow sets refer only to positions of the flat table, and every
    /// transition target of the automaton is a real state or the reject
    /// sentinel.
    #[test]
    fn automaton_is_well_formed() {
        let re = Regex::new("a(b|c)*d$").unwrap();
        let table = re.position_table();
        for position in &table.positions {
            for &f in &position.follow {
                assert!((f as usize) < table.len());
            }
        }
        let dfa = re.dfa();
        for s in 0..dfa.len() as u32 {
            for &t in dfa.row(s).iter() {
                assert!(t == crate::dfa::REJECT || (t as usize) < dfa.len());
            }
        }
        // the analyzed tree can be printed back as pattern text
        let printed = crate::expr::pattern_string(re.pool(), re.root());
        assert!(printed.contains('d'));
    }

    #[test]
    fn bounded_repetition_unoptimized() {
        let unit = "0123456789_?";
        let re = Regex::builder()
            .level(CompileLevel::O0)
            .build(&format!("({unit}){{100}}"))
            .unwrap();
        let rep = "0123456789_".repeat(100);
        assert!(re.is_match(rep.as_bytes()));
        let bare = "0123456789".repeat(100);
        assert!(re.is_match(bare.as_bytes()));
        let short = "0123456789_".repeat(99);
        assert!(!re.is_match(short.as_bytes()));
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn parallel_window_scan() {
        let mut input = vec![b'a'; 1024];
        input.extend_from_slice(&[b'b'; 10]);
        let re = Regex::builder()
            .options(Options::new(Flags::PARALLEL_MATCH))
            .thread_num(4)
            .build(".*b.{8}b")
            .unwrap();
        assert!(re.is_match(&input));
        input.push(b'a');
        assert!(!re.is_match(&input));
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn parallel_agrees_with_sequential_everywhere() {
        let patterns = [".*abc", "(a|b)*c", "a{2,5}b"];
        let inputs: &[&[u8]] = &[
            b"",
            b"abc",
            b"aabc",
            b"ababab",
            b"aaaaab",
            b"c",
            b"abcabcabc",
            b"xxxxxxxxxxxxxxxxxabc",
        ];
        for pattern in patterns {
            let seq = Regex::new(pattern).unwrap();
            for threads in 1..=5 {
                let par = Regex::builder()
                    .options(Options::new(Flags::PARALLEL_MATCH))
                    .thread_num(threads)
                    .build(pattern)
                    .unwrap();
                for input in inputs {
                    assert_eq!(
                        par.is_match(input),
                        seq.is_match(input),
                        "/{pattern}/ with {threads} workers on {:?}",
                        String::from_utf8_lossy(input)
                    );
                }
            }
        }
    }

    #[test]
    fn weak_backref_end_to_end() {
        let re = compiled(r"([ab]+)-\_1", Flags::WEAK_BACKREF_EXT);
        assert!(re.is_match(b"ab-ab"));
        // weak references repeat the language, not the captured string
        assert!(re.is_match(b"ab-ba"));
        assert!(!re.is_match(b"ab-"));
    }

    #[test]
    fn reverse_marker_end_to_end() {
        let re = compiled("@abc", Flags::REVERSE_EXT);
        assert!(re.is_match(b"cba"));
        assert!(!re.is_match(b"abc"));

        // only the marked tail is reversed
        let re = compiled("x@abc", Flags::REVERSE_EXT);
        assert!(re.is_match(b"xcba"));
        assert!(!re.is_match(b"xabc"));

        // `@` without its extension bit is rejected
        assert!(matches!(
            Regex::new("a@b"),
            Err(CompileError::Parse(_))
        ));
    }

    #[test]
    fn recursion_end_to_end() {
        // balanced nesting up to the re-entry bound
        let re = compiled(r"\((?R)?\)", Flags::RECURSION_EXT);
        assert!(re.is_match(b"()"));
        assert!(re.is_match(b"(())"));
        assert!(re.is_match(b"((()))"));
        assert!(!re.is_match(b"(((())))")); // beyond the default limit of 2
        assert!(!re.is_match(b"(()"));
    }
}
