//! Rolling memory of recent generations.
//!
//! Keeps a sliding window of excerpts and the copula sentences ("X is Y")
//! found in them. It only feeds prompts; stored branches never read from it.

use std::collections::VecDeque;

/// Characters kept per excerpt.
const EXCERPT_CHARS: usize = 100;

/// Facts surfaced in a single prompt.
const PROMPT_FACTS: usize = 5;

/// Bounded memory of generated text.
#[derive(Debug, Clone)]
pub struct RollingMemory {
    excerpts: VecDeque<String>,
    facts: VecDeque<String>,
    excerpt_limit: usize,
    fact_limit: usize,
}

impl Default for RollingMemory {
    fn default() -> Self {
        Self::new(100, 200)
    }
}

impl RollingMemory {
    pub fn new(excerpt_limit: usize, fact_limit: usize) -> Self {
        Self {
            excerpts: VecDeque::new(),
            facts: VecDeque::new(),
            excerpt_limit,
            fact_limit,
        }
    }

    /// Remember a piece of generated text.
    pub fn record(&mut self, text: &str) {
        let excerpt: String = text.chars().take(EXCERPT_CHARS).collect();
        if !excerpt.trim().is_empty() {
            self.excerpts.push_back(excerpt);
        }

        for fact in extract_facts(text) {
            if !self.facts.contains(&fact) {
                self.facts.push_back(fact);
            }
        }

        self.trim();
    }

    fn trim(&mut self) {
        while self.excerpts.len() > self.excerpt_limit {
            self.excerpts.pop_front();
        }
        while self.facts.len() > self.fact_limit {
            self.facts.pop_front();
        }
    }

    pub fn excerpts(&self) -> impl Iterator<Item = &str> {
        self.excerpts.iter().map(String::as_str)
    }

    pub fn facts(&self) -> impl Iterator<Item = &str> {
        self.facts.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.excerpts.is_empty() && self.facts.is_empty()
    }

    /// Prompt section listing the most recent facts, or `None` when empty.
    pub fn prompt_section(&self) -> Option<String> {
        if self.facts.is_empty() {
            return None;
        }
        let skip = self.facts.len().saturating_sub(PROMPT_FACTS);
        let lines: Vec<String> = self
            .facts
            .iter()
            .skip(skip)
            .map(|f| format!("- {f}"))
            .collect();
        Some(format!("Established so far:\n{}", lines.join("\n")))
    }
}

/// Sentences containing " is ", " was " or " are ".
fn extract_facts(text: &str) -> Vec<String> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| {
            let padded = format!(" {s} ");
            padded.contains(" is ") || padded.contains(" was ") || padded.contains(" are ")
        })
        .map(str::to_string)
        .collect()
}
