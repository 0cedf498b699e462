//! Operator prompts on the terminal.

use cardgraph_core::{FixedPrompter, Prompter};
use std::io::{BufRead, Write};

/// Asks on stderr and reads one line from stdin.
///
/// End of input or a read error counts as no answer, which the guard
/// resolves to skip.
#[derive(Debug, Default)]
pub struct StdinPrompter;

impl StdinPrompter {
    fn ask_on(question: &str, out: &mut impl Write, input: &mut impl BufRead) -> Option<String> {
        if let Err(e) = write!(out, "{} ", question).and_then(|()| out.flush()) {
            tracing::debug!(error = %e, "cannot write prompt");
        }

        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line),
            Err(e) => {
                tracing::warn!(error = %e, "cannot read operator answer");
                None
            }
        }
    }
}

impl Prompter for StdinPrompter {
    fn ask(&self, question: &str) -> Option<String> {
        Self::ask_on(
            question,
            &mut std::io::stderr().lock(),
            &mut std::io::stdin().lock(),
        )
    }
}

/// Pick the prompter for this run: `--yes` and `--no` answer every prompt.
pub fn prompter(yes: bool, no: bool) -> Box<dyn Prompter + Send> {
    if yes {
        Box::new(FixedPrompter::yes())
    } else if no {
        Box::new(FixedPrompter::no())
    } else {
        Box::new(StdinPrompter)
    }
}
