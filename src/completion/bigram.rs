//! Default backend: greedy bigram continuation of the context window
//!
//! Builds successor counts from the tokens in the prompt and repeatedly
//! emits the most frequent successor of the last token. Ties go to the
//! lexicographically smallest token so output is deterministic.

use regex::Regex;
use std::collections::HashMap;
use tracing::trace;

use super::backend::{BackendError, CompletionBackend, Prompt};

#[derive(Debug)]
pub struct BigramBackend {
    /// Words, or single punctuation characters
    token_regex: Regex,
}

impl BigramBackend {
    pub fn new() -> Result<Self, BackendError> {
        Ok(Self {
            token_regex: Regex::new(r"\w+|[^\w\s]")
                .map_err(|e| BackendError::Initialization(e.to_string()))?,
        })
    }
}

impl CompletionBackend for BigramBackend {
    fn name(&self) -> &str {
        "bigram"
    }

    fn initialize(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn generate(&self, prompt: &Prompt) -> Result<String, BackendError> {
        let tokens: Vec<&str> = self
            .token_regex
            .find_iter(&prompt.text)
            .map(|m| m.as_str())
            .collect();

        let Some(&last) = tokens.last() else {
            return Ok(String::new());
        };

        let successors = successor_counts(&tokens);
        let mut current = last;
        let mut generated = Vec::with_capacity(prompt.max_words);

        while generated.len() < prompt.max_words {
            let Some(next) = successors.get(current).and_then(|counts| most_frequent(counts)) else {
                break;
            };
            generated.push(next);
            current = next;
        }

        trace!("Bigram continuation of {:?}: {:?}", last, generated);
        Ok(generated.join(" "))
    }
}

fn successor_counts<'a>(tokens: &[&'a str]) -> HashMap<&'a str, HashMap<&'a str, usize>> {
    let mut successors: HashMap<&str, HashMap<&str, usize>> = HashMap::new();
    for pair in tokens.windows(2) {
        *successors
            .entry(pair[0])
            .or_default()
            .entry(pair[1])
            .or_default() += 1;
    }
    successors
}

fn most_frequent<'a>(counts: &HashMap<&'a str, usize>) -> Option<&'a str> {
    counts
        .iter()
        .max_by(|(a_token, a_count), (b_token, b_count)| {
            a_count.cmp(b_count).then_with(|| b_token.cmp(a_token))
        })
        .map(|(token, _)| *token)
}
