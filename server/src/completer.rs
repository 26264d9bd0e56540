use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};

use crate::input;

/// Tab completion and inline hints for the admin console.
pub struct ConsoleCompleter {
    commands: Vec<&'static str>,
}

impl ConsoleCompleter {
    pub fn new() -> Self {
        ConsoleCompleter {
            commands: input::completion_names(),
        }
    }

    fn candidates(&self, line: &str) -> Vec<&'static str> {
        let trimmed = line.trim_start();
        if !trimmed.starts_with('/') {
            return Vec::new();
        }
        self.commands
            .iter()
            .filter(|command| command.starts_with(trimmed))
            .copied()
            .collect()
    }
}

impl Completer for ConsoleCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let pairs = self
            .candidates(&line[..pos])
            .into_iter()
            .map(|candidate| Pair {
                display: candidate.to_string(),
                replacement: candidate.to_string(),
            })
            .collect();
        Ok((0, pairs))
    }
}

impl Hinter for ConsoleCompleter {
    type Hint = String;

    fn hint(&self, line: &str, _pos: usize, _ctx: &Context<'_>) -> Option<String> {
        match self.candidates(line).as_slice() {
            [only] if only.len() > line.len() => Some(only[line.len()..].to_string()),
            _ => None,
        }
    }
}

impl Highlighter for ConsoleCompleter {}

impl Validator for ConsoleCompleter {}

impl Helper for ConsoleCompleter {}
