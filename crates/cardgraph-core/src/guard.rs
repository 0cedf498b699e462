//! # Schema Guard
//!
//! Gates a loading step on what is already in the store.
//!
//! - Nothing there: proceed (and, for relationships, register the
//!   transaction-number uniqueness constraint first)
//! - Data there: ask the operator to reset or skip
//! - Unrecognized answers are re-asked a bounded number of times; running
//!   out of attempts or input always resolves to skip

use crate::graph::GraphStore;
use crate::primitives::TRANSACTION_NUMBER;
use crate::CardGraphError;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

// =============================================================================
// OPERATOR PROMPT
// =============================================================================

/// Source of operator answers.
pub trait Prompter {
    /// Ask `question`; `None` means no more input is available.
    fn ask(&self, question: &str) -> Option<String>;
}

/// Operator decision parsed from one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    /// Delete the existing data, then load.
    Reset,
    /// Leave the existing data and abort the step.
    Skip,
    /// Unrecognized input; ask again.
    Retry,
}

impl Answer {
    /// Parse `yes|y` / `no|n`, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        match input.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" => Self::Reset,
            "no" | "n" => Self::Skip,
            _ => Self::Retry,
        }
    }
}

/// Ask until the answer is `Reset` or `Skip`, at most `attempts` times.
///
/// Never returns `Retry`.
pub fn resolve(prompter: &dyn Prompter, question: &str, attempts: usize) -> Answer {
    for attempt in 1..=attempts {
        let Some(input) = prompter.ask(question) else {
            tracing::warn!("no operator input available, skipping");
            return Answer::Skip;
        };
        match Answer::parse(&input) {
            Answer::Retry => {
                tracing::warn!(attempt, attempts, input = %input.trim(), "unrecognized answer");
            }
            decided => return decided,
        }
    }
    tracing::warn!(attempts, "no valid answer, skipping");
    Answer::Skip
}

/// Answers every question the same way; used for `--yes` / `--no`.
#[derive(Debug, Clone)]
pub struct FixedPrompter(pub String);

impl FixedPrompter {
    #[must_use]
    pub fn yes() -> Self {
        Self("yes".to_string())
    }

    #[must_use]
    pub fn no() -> Self {
        Self("no".to_string())
    }
}

impl Prompter for FixedPrompter {
    fn ask(&self, question: &str) -> Option<String> {
        tracing::info!(question, answer = %self.0, "answering prompt non-interactively");
        Some(self.0.clone())
    }
}

/// Replays a fixed list of answers, then reports end of input.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<usize>,
}

impl ScriptedPrompter {
    #[must_use]
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            asked: Mutex::new(0),
        }
    }

    /// How many questions have been asked so far.
    #[must_use]
    pub fn asked(&self) -> usize {
        self.asked.lock().map(|n| *n).unwrap_or(0)
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&self, _question: &str) -> Option<String> {
        if let Ok(mut n) = self.asked.lock() {
            *n += 1;
        }
        self.answers.lock().ok()?.pop_front()
    }
}

// =============================================================================
// GUARDS
// =============================================================================

/// What the guard decided for a loading step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardOutcome {
    /// Nothing existed; load.
    Fresh,
    /// Existing data was deleted; load.
    Reset,
    /// Existing data was kept; do not load.
    Skip,
}

impl GuardOutcome {
    /// Whether the loading step should run.
    #[must_use]
    pub fn proceeds(self) -> bool {
        !matches!(self, Self::Skip)
    }
}

/// Guard node loading for `labels`.
///
/// Prompts only when every label already has nodes. A reset detach-deletes
/// all nodes of each label.
pub fn check_nodes(
    store: &dyn GraphStore,
    labels: &[&str],
    prompter: &dyn Prompter,
    attempts: usize,
) -> Result<GuardOutcome, CardGraphError> {
    let mut all_exist = !labels.is_empty();
    for label in labels {
        if !store.label_exists(label)? {
            all_exist = false;
            break;
        }
    }
    if !all_exist {
        return Ok(GuardOutcome::Fresh);
    }

    let question = format!(
        "Nodes labelled {} already exist. Delete them and reload? (yes/no)",
        labels.join(", ")
    );
    match resolve(prompter, &question, attempts) {
        Answer::Reset => {
            for label in labels {
                let deleted = store.delete_label(label)?;
                tracing::info!(label, deleted, "deleted existing nodes");
            }
            Ok(GuardOutcome::Reset)
        }
        Answer::Skip | Answer::Retry => {
            tracing::info!(labels = %labels.join(","), "keeping existing nodes, node load skipped");
            Ok(GuardOutcome::Skip)
        }
    }
}

/// Guard relationship linking for `(from)-[rel_type]->(to)`.
///
/// On a fresh store the uniqueness constraint on the transaction number is
/// registered; its failure is ignored. A reset deletes every relationship
/// between the two labels.
pub fn check_relationship(
    store: &dyn GraphStore,
    from: &str,
    rel_type: &str,
    to: &str,
    prompter: &dyn Prompter,
    attempts: usize,
) -> Result<GuardOutcome, CardGraphError> {
    if !store.relationship_exists(from, rel_type, to)? {
        if let Err(e) = store.create_relationship_constraint(rel_type, TRANSACTION_NUMBER) {
            tracing::debug!(rel_type, error = %e, "relationship constraint not created");
        }
        return Ok(GuardOutcome::Fresh);
    }

    let question = format!(
        "Relationships {} between {} and {} already exist. Delete them and relink? (yes/no)",
        rel_type, from, to
    );
    match resolve(prompter, &question, attempts) {
        Answer::Reset => {
            let deleted = store.delete_relationships(from, to)?;
            tracing::info!(from, to, deleted, "deleted existing relationships");
            Ok(GuardOutcome::Reset)
        }
        Answer::Skip | Answer::Retry => {
            tracing::info!(rel_type, "keeping existing relationships, linking skipped");
            Ok(GuardOutcome::Skip)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
