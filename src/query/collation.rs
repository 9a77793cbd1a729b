//! Locale-aware text ordering for display lists.
//!
//! Byte order puts `"Bob"` before `"alice"` and `"Lesson 10"` before
//! `"Lesson 2"`, which is not what a person scanning a list expects. The
//! [`Collator`] compares character by character on the case-folded base
//! letter, ranks a plain letter before its accented forms (`a < å < b`), and
//! compares runs of digits by numeric value.

use std::cmp::Ordering;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Collator;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Letter { base: char, marks: Vec<char> },
    Digits(String),
}

impl Collator {
    /// Case-insensitive, numeric-aware collator.
    pub fn new() -> Self {
        Self
    }

    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        let left = self.tokenize(a);
        let right = self.tokenize(b);

        for (l, r) in left.iter().zip(right.iter()) {
            let ordering = compare_tokens(l, r);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        left.len().cmp(&right.len())
    }

    /// Stable in-place sort of `items` by the text `key` returns.
    pub fn sort_by_key<T>(&self, items: &mut [T], descending: bool, key: impl Fn(&T) -> &str) {
        items.sort_by(|a, b| {
            let ordering = self.compare(key(a), key(b));
            if descending { ordering.reverse() } else { ordering }
        });
    }

    fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::with_capacity(text.len());
        let mut chars = text.chars().peekable();

        while let Some(c) = chars.next() {
            if c.is_ascii_digit() {
                let mut digits = String::from(c);
                while let Some(next) = chars.peek().copied().filter(char::is_ascii_digit) {
                    digits.push(next);
                    chars.next();
                }
                tokens.push(Token::Digits(digits));
                continue;
            }

            let mut decomposed = std::iter::once(c).nfd();
            let base = decomposed.next().unwrap_or(c);
            let marks: Vec<char> = decomposed.filter(|m| is_combining_mark(*m)).collect();
            let base = base.to_lowercase().next().unwrap_or(base);
            tokens.push(Token::Letter { base, marks });
        }
        tokens
    }
}

fn compare_tokens(left: &Token, right: &Token) -> Ordering {
    match (left, right) {
        (Token::Letter { base: a, marks: ma }, Token::Letter { base: b, marks: mb }) => {
            a.cmp(b).then_with(|| ma.cmp(mb))
        }
        (Token::Digits(a), Token::Digits(b)) => compare_digit_runs(a, b),
        (Token::Digits(a), Token::Letter { base, .. }) => leading_char(a).cmp(base),
        (Token::Letter { base, .. }, Token::Digits(b)) => base.cmp(&leading_char(b)),
    }
}

fn leading_char(digits: &str) -> char {
    digits.chars().next().unwrap_or('0')
}

fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let ta = a.trim_start_matches('0');
    let tb = b.trim_start_matches('0');
    ta.len()
        .cmp(&tb.len())
        .then_with(|| ta.cmp(tb))
        .then_with(|| a.len().cmp(&b.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(input: &[&str]) -> Vec<String> {
        let mut items: Vec<String> = input.iter().map(|s| s.to_string()).collect();
        Collator::new().sort_by_key(&mut items, false, |s| s.as_str());
        items
    }

    #[test]
    fn test_case_insensitive_accent_aware_order() {
        assert_eq!(sorted(&["Bob", "alice", "Åke"]), vec!["alice", "Åke", "Bob"]);
    }

    #[test]
    fn test_numeric_runs_compare_by_value() {
        assert_eq!(
            sorted(&["Lesson 10", "Lesson 2", "Lesson 1"]),
            vec!["Lesson 1", "Lesson 2", "Lesson 10"]
        );
        assert_eq!(Collator::new().compare("track 007", "track 7"), Ordering::Greater);
    }

    #[test]
    fn test_case_only_difference_is_equal() {
        assert_eq!(Collator::new().compare("alice", "ALICE"), Ordering::Equal);
        // ties keep their original relative order
        assert_eq!(sorted(&["ALICE", "alice"]), vec!["ALICE", "alice"]);
    }

    #[test]
    fn test_descending() {
        let mut items = vec!["a", "c", "b"];
        Collator::new().sort_by_key(&mut items, true, |s| *s);
        assert_eq!(items, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_prefix_sorts_first() {
        assert_eq!(Collator::new().compare("Ann", "Anna"), Ordering::Less);
    }
}
