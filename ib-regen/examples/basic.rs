use ib_regen::{Flags, MatchContext, Options, Regex};

fn main() {
    // RUST_LOG=debug shows the compile pipeline (dfa/sfa sizes)
    env_logger::init();

    let re = Regex::new("(ab)+c?").unwrap();
    assert!(re.is_match(b"ababc"));
    assert!(!re.is_match(b"abca"));

    // extended operators: strings over [ab] containing "ab" but not "ba"
    let re = Regex::builder()
        .options(Options::new(Flags::EXTENDED))
        .build("(a|b)*&.*ab.*&!.*ba.*")
        .unwrap();
    assert!(re.is_match(b"aab"));
    assert!(!re.is_match(b"aba"));

    // span reporting
    let re = Regex::builder()
        .options(Options::new(Flags::CAPTURED_MATCH | Flags::PARTIAL_MATCH))
        .build("[0-9]+")
        .unwrap();
    let mut ctx = MatchContext::new();
    assert!(re.match_with(b"build 1742 done", Some(&mut ctx)));
    assert_eq!(ctx.begin(), Some(6));

    // parallel matching over input segments
    #[cfg(feature = "parallel")]
    {
        let re = Regex::builder()
            .options(Options::new(Flags::PARALLEL_MATCH))
            .thread_num(4)
            .build(".*needle.*")
            .unwrap();
        let mut haystack = vec![b'x'; 1 << 16];
        haystack.extend_from_slice(b"needle");
        assert!(re.is_match(&haystack));
    }

    println!("all good");
}
