// SPDX-License-Identifier: PMPL-1.0-or-later
//! Tab-completion for the steps REPL.
//!
//! Completes meta-commands at the start of the line and step-type names
//! elsewhere (useful when typing step ids such as `1:filter`).

use rustyline::completion::{Completer, Pair};
use rustyline::Context;
use stepwise_steps::StepType;

/// Meta-commands starting with backslash.
pub const META_COMMANDS: &[&str] = &[
    "\\load", "\\metadata", "\\steps", "\\open", "\\close", "\\preview", "\\revert",
    "\\update", "\\query", "\\save", "\\format", "\\help", "\\quit", "\\q",
];

pub struct StepsCompleter;

impl Completer for StepsCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let (start, prefix) = find_word_start(line, pos);
        Ok((start, candidates(prefix)))
    }
}

fn candidates(prefix: &str) -> Vec<Pair> {
    if prefix.is_empty() {
        return Vec::new();
    }

    if prefix.starts_with('\\') {
        let lower = prefix.to_lowercase();
        return META_COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(&lower))
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect();
    }

    // Inside a step id, complete the part after the stage number.
    let (stage, name) = match prefix.split_once(':') {
        Some((stage, name)) => (format!("{stage}:"), name),
        None => (String::new(), prefix),
    };
    StepType::ALL
        .iter()
        .filter(|t| t.as_str().starts_with(&name.to_lowercase()))
        .map(|t| Pair {
            display: t.to_string(),
            replacement: format!("{stage}{t}"),
        })
        .collect()
}

/// Find the start position and text of the word being completed.
fn find_word_start(line: &str, pos: usize) -> (usize, &str) {
    let bytes = line.as_bytes();
    let mut start = pos;

    while start > 0 {
        let ch = bytes[start - 1] as char;
        if ch.is_whitespace() || ch == '{' || ch == '"' || ch == ',' {
            break;
        }
        start -= 1;
    }

    (start, &line[start..pos])
}
