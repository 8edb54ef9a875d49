//! Fact-versus-fact contradiction check.
//!
//! Two statements contradict when they say the same thing and exactly one of
//! them is negated: "The bridge is standing" against "The bridge isn't
//! standing" or "The bridge is no longer standing". It is a lexical check and
//! knows nothing about synonyms.

/// Contractions expanded before comparison.
const CONTRACTIONS: &[(&str, &str)] = &[
    ("isn't", "is not"),
    ("aren't", "are not"),
    ("wasn't", "was not"),
    ("weren't", "were not"),
    ("doesn't", "does not"),
    ("don't", "do not"),
    ("didn't", "did not"),
    ("hasn't", "has not"),
    ("haven't", "have not"),
    ("hadn't", "had not"),
    ("can't", "can not"),
    ("cannot", "can not"),
    ("couldn't", "could not"),
    ("won't", "will not"),
    ("wouldn't", "would not"),
    ("shouldn't", "should not"),
];

/// A statement reduced to its content words plus a negation parity bit.
#[derive(Debug, PartialEq, Eq)]
struct Normalized {
    words: Vec<String>,
    negated: bool,
}

fn normalize(statement: &str) -> Normalized {
    let lowered: String = statement
        .to_lowercase()
        .chars()
        .map(|c| match c {
            '\u{2019}' => '\'',
            c if c.is_alphanumeric() || c == '\'' || c.is_whitespace() => c,
            _ => ' ',
        })
        .collect();

    let mut tokens: Vec<String> = Vec::new();
    for raw in lowered.split_whitespace() {
        let word = raw.trim_matches('\'');
        match CONTRACTIONS.iter().find(|(short, _)| *short == word) {
            Some((_, long)) => tokens.extend(long.split(' ').map(str::to_string)),
            None => tokens.push(word.to_string()),
        }
    }

    let mut words = Vec::with_capacity(tokens.len());
    let mut negations = 0usize;
    let mut iter = tokens.into_iter().peekable();
    while let Some(token) = iter.next() {
        if token == "not" || token == "never" {
            negations += 1;
        } else if token == "no" && iter.peek().map(String::as_str) == Some("longer") {
            iter.next();
            negations += 1;
        } else {
            words.push(token);
        }
    }

    Normalized {
        words,
        negated: negations % 2 == 1,
    }
}

/// Whether `a` and `b` assert opposite versions of the same statement.
///
/// Symmetric. Empty statements never contradict anything.
pub fn facts_contradict(a: &str, b: &str) -> bool {
    let a = normalize(a);
    let b = normalize(b);
    !a.words.is_empty() && a.negated != b.negated && a.words == b.words
}
