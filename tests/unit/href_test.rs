//! Unit tests for Href canonicalization and interning.

use std::cmp::Ordering;
use std::collections::HashSet;

use marksync::types::href::{Href, Protocol};
use rstest::rstest;

#[rstest]
#[case("http://www.example.com/a", "http://www.example.com/a")]
#[case("HTTP://WWW.Example.COM/Path", "http://www.example.com/Path")]
#[case("https://example.org", "https://example.org/")]
#[case("  https://example.org/x  ", "https://example.org/x")]
#[case("ftp://ftp.kernel.org/pub", "ftp://ftp.kernel.org/pub")]
#[case("http://localhost:8080/x", "http://localhost:8080/x")]
#[case("mailto:someone@example.com", "mailto:someone@example.com")]
#[case("javascript:void(0)", "javascript:void(0)")]
#[case("", "")]
fn test_format_is_canonical(#[case] raw: &str, #[case] expected: &str) {
    assert_eq!(Href::intern(raw).format(), expected);
}

#[rstest]
#[case("http://example.com/", Protocol::Http)]
#[case("https://example.com/", Protocol::Https)]
#[case("ftp://example.com/", Protocol::Ftp)]
#[case("file:///home/user/notes.txt", Protocol::File)]
#[case("mailto:x@example.com", Protocol::Mailto)]
#[case("news:comp.lang.rust", Protocol::News)]
#[case("gopher://example.com/", Protocol::Other)]
fn test_protocol_detection(#[case] raw: &str, #[case] protocol: Protocol) {
    assert_eq!(Href::intern(raw).protocol(), protocol);
}

#[test]
fn test_parts_are_split() {
    let href = Href::intern("https://www.docs.rs/serde");
    assert!(href.has_www());
    // unknown top-level domains stay in the host fragment
    assert_eq!(href.host_fragment(), "docs.rs");
    assert_eq!(href.tld(), "");
    assert_eq!(href.path(), "/serde");
}

#[test]
fn test_known_tld_is_packed() {
    let href = Href::intern("https://www.rust-lang.org/learn");
    assert!(href.has_www());
    assert_eq!(href.host_fragment(), "rust-lang");
    assert_eq!(href.tld(), "org");
    assert_eq!(href.path(), "/learn");
}

#[test]
fn test_equivalent_spellings_share_one_instance() {
    let a = Href::intern("http://intern-share.example.com");
    let b = Href::intern("HTTP://Intern-Share.Example.com/");
    assert!(Href::ptr_eq(&a, &b));
    assert_eq!(a, b);
}

#[test]
fn test_distinct_urls_do_not_share() {
    let a = Href::intern("http://distinct-a.example.com/");
    let b = Href::intern("http://distinct-b.example.com/");
    assert!(!Href::ptr_eq(&a, &b));
    assert_ne!(a, b);
}

#[test]
fn test_entry_released_with_last_reference() {
    let raw = "https://release-check.example.net/only-here";
    let first = Href::intern(raw);
    let second = first.clone();
    assert!(Href::is_interned(raw));
    drop(first);
    assert!(Href::is_interned(raw));
    drop(second);
    assert!(!Href::is_interned(raw));

    // interning again after release builds a fresh instance
    let again = Href::intern(raw);
    assert_eq!(again.format(), raw);
}

#[test]
fn test_empty_href() {
    let empty = Href::empty();
    assert!(empty.is_empty());
    assert_eq!(empty.protocol(), Protocol::Other);
    assert!(!Href::intern("http://example.com/").is_empty());
}

#[rstest]
#[case("http://a.example.com/", "http://b.example.com/", Ordering::Less)]
#[case("http://example.com/", "http://www.example.com/", Ordering::Less)]
#[case("http://example.com/", "https://example.com/", Ordering::Less)]
#[case("http://example.com/a", "http://example.com/b", Ordering::Less)]
#[case("https://example.com/", "http://example.com/", Ordering::Greater)]
#[case("http://example.com", "http://EXAMPLE.com/", Ordering::Equal)]
fn test_canonical_compare(#[case] a: &str, #[case] b: &str, #[case] expected: Ordering) {
    let (a, b) = (Href::intern(a), Href::intern(b));
    assert_eq!(Href::canonical_compare(&a, &b), expected);
    assert_eq!(Href::canonical_compare(&b, &a), expected.reverse());
}

#[test]
fn test_hash_agrees_with_eq() {
    let set: HashSet<Href> = ["http://example.com", "http://example.com/", "HTTP://example.com/"]
        .iter()
        .map(|raw| Href::intern(raw))
        .collect();
    assert_eq!(set.len(), 1);
}

#[test]
fn test_serde_uses_canonical_string() {
    let href = Href::intern("https://Example.org");
    let json = serde_json::to_string(&href).unwrap();
    assert_eq!(json, "\"https://example.org/\"");
    let back: Href = serde_json::from_str(&json).unwrap();
    assert!(Href::ptr_eq(&href, &back));
}
