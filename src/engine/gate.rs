//! Confirmation gate
//!
//! Decides once per batch whether the executor may mutate remote state.
//! The gate never talks to the API; interactive confirmation goes through a
//! [`Confirmer`] so it can be scripted in tests.

use super::cancel::CancelSignal;
use crate::resource::action::{Action, ActionTarget};
use std::collections::{BTreeMap, VecDeque};
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Mutex;
use std::time::Duration;

/// Number of target identifiers shown in a confirmation prompt
pub const PROMPT_SAMPLE_SIZE: usize = 10;

/// How often a pending console prompt checks for an interrupt
const ANSWER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How a batch is gated
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Report what would happen; never mutate
    DryRun,
    /// Proceed without asking
    AutoConfirm,
    /// Ask the operator once per batch
    Interactive,
}

impl Mode {
    /// `--dry-run` wins over `--auto-confirm`
    pub fn from_flags(dry_run: bool, auto_confirm: bool) -> Self {
        match (dry_run, auto_confirm) {
            (true, _) => Self::DryRun,
            (false, true) => Self::AutoConfirm,
            (false, false) => Self::Interactive,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DryRun => "dry-run",
            Self::AutoConfirm => "auto-confirm",
            Self::Interactive => "interactive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Go ahead; `simulated` batches are reported but never sent
    Proceed { simulated: bool },
    /// Operator declined; nothing is dispatched
    Abort,
    /// The run was interrupted before dispatch; every target is reported cancelled
    Cancelled,
}

/// What the operator is asked to confirm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmPrompt {
    pub title: String,
    pub count: usize,
    /// Per-action target counts, for mixed batches
    pub breakdown: Vec<(Action, usize)>,
    pub sample: Vec<String>,
    pub destructive: bool,
}

impl ConfirmPrompt {
    pub fn for_targets(title: &str, targets: &[ActionTarget]) -> Self {
        let mut counts: BTreeMap<&'static str, (Action, usize)> = BTreeMap::new();
        for target in targets {
            let action = target.action();
            counts.entry(action.display_name()).or_insert((action, 0)).1 += 1;
        }

        Self {
            title: title.to_string(),
            count: targets.len(),
            breakdown: counts.into_values().collect(),
            sample: targets
                .iter()
                .take(PROMPT_SAMPLE_SIZE)
                .map(|t| t.resource().label())
                .collect(),
            destructive: targets.iter().any(|t| t.action().is_destructive()),
        }
    }

    pub fn render(&self) -> String {
        let mut out = format!("{}: {} target(s)\n", self.title, self.count);
        for (action, n) in &self.breakdown {
            out.push_str(&format!("  {} x{}\n", action.display_name(), n));
        }
        for label in &self.sample {
            out.push_str(&format!("  - {}\n", label));
        }
        if self.count > self.sample.len() {
            out.push_str(&format!("  ... and {} more\n", self.count - self.sample.len()));
        }
        if self.destructive {
            out.push_str("This cannot be undone.\n");
        }
        out
    }
}

/// Capability to ask the operator a single yes/no question
pub trait Confirmer: Send + Sync {
    fn confirm(&self, prompt: &ConfirmPrompt) -> io::Result<bool>;
}

/// Prompts on stdout and reads the answer from stdin; anything but `y`/`yes` declines.
///
/// An interrupt while the prompt is pending declines without waiting for input.
pub struct ConsoleConfirmer {
    cancel: CancelSignal,
}

impl ConsoleConfirmer {
    pub fn new(cancel: CancelSignal) -> Self {
        Self { cancel }
    }
}

impl Confirmer for ConsoleConfirmer {
    fn confirm(&self, prompt: &ConfirmPrompt) -> io::Result<bool> {
        {
            let mut stdout = io::stdout().lock();
            write!(stdout, "{}Proceed? [y/N] ", prompt.render())?;
            stdout.flush()?;
        }

        // stdin cannot be interrupted, so read it on its own thread
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut answer = String::new();
            let read = io::stdin().lock().read_line(&mut answer).map(|_| answer);
            let _ = tx.send(read);
        });

        loop {
            if self.cancel.is_cancelled() {
                println!();
                return Ok(false);
            }
            match rx.recv_timeout(ANSWER_POLL_INTERVAL) {
                Ok(answer) => return Ok(is_yes(&answer?)),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin reader stopped"))
                }
            }
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Answers prompts from a fixed script and remembers what was asked
#[derive(Debug, Default)]
pub struct ScriptedConfirmer {
    answers: Mutex<VecDeque<bool>>,
    asked: Mutex<Vec<ConfirmPrompt>>,
}

impl ScriptedConfirmer {
    pub fn answering(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            asked: Mutex::default(),
        }
    }

    /// Prompts shown so far
    pub fn asked(&self) -> Vec<ConfirmPrompt> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

impl Confirmer for ScriptedConfirmer {
    fn confirm(&self, prompt: &ConfirmPrompt) -> io::Result<bool> {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(prompt.clone());
        }
        let answer = self.answers.lock().ok().and_then(|mut a| a.pop_front());
        // An exhausted script declines
        Ok(answer.unwrap_or(false))
    }
}

pub struct Gate<'a> {
    mode: Mode,
    confirmer: &'a dyn Confirmer,
}

impl<'a> Gate<'a> {
    pub fn new(mode: Mode, confirmer: &'a dyn Confirmer) -> Self {
        Self { mode, confirmer }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Decide for a whole batch. Call once per batch, never per target.
    pub fn decide(&self, title: &str, targets: &[ActionTarget]) -> Decision {
        match self.mode {
            Mode::DryRun => {
                tracing::info!("Dry run: {} target(s) for {}", targets.len(), title);
                Decision::Proceed { simulated: true }
            }
            Mode::AutoConfirm => {
                tracing::info!("Auto-confirmed {} target(s) for {}", targets.len(), title);
                Decision::Proceed { simulated: false }
            }
            Mode::Interactive if targets.is_empty() => Decision::Proceed { simulated: false },
            Mode::Interactive => {
                let prompt = ConfirmPrompt::for_targets(title, targets);
                match self.confirmer.confirm(&prompt) {
                    Ok(true) => {
                        tracing::info!("Operator confirmed {} target(s) for {}", targets.len(), title);
                        Decision::Proceed { simulated: false }
                    }
                    Ok(false) => {
                        tracing::info!("Operator declined {}", title);
                        Decision::Abort
                    }
                    Err(e) => {
                        tracing::warn!("Could not read confirmation ({}); treating as decline", e);
                        Decision::Abort
                    }
                }
            }
        }
    }
}
