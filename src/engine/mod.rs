//! Orchestration engine
//!
//! - [`gate`] - Dry-run / confirmation decision, once per batch
//! - [`executor`] - Bounded-concurrency dispatch and outcome mapping
//! - [`report`] - Outcome aggregation and summaries
//! - [`cancel`] - Cooperative cancellation signal

pub mod cancel;
pub mod executor;
pub mod gate;
pub mod report;

pub use cancel::CancelSignal;
pub use executor::{Executor, Throttle};
pub use gate::{Confirmer, ConsoleConfirmer, Decision, Gate, Mode, ScriptedConfirmer};
pub use report::{OperationResult, Outcome, Reporter, SkipReason, Summary};

use crate::resource::action::ActionTarget;
use futures::StreamExt;

/// Gate a batch, then execute it into `reporter`.
///
/// Returns the gate's decision; on [`Decision::Abort`] nothing is executed
/// and nothing is recorded. If the run is interrupted before or during the
/// prompt the gate is bypassed and the decision is [`Decision::Cancelled`]:
/// every target is still recorded, as `skipped(cancelled)`.
pub async fn run_batch(
    gate: &Gate<'_>,
    executor: &Executor<'_>,
    throttle: &Throttle,
    reporter: &Reporter,
    title: &str,
    targets: Vec<ActionTarget>,
) -> Decision {
    let decision = if executor.is_cancelled() {
        Decision::Cancelled
    } else {
        match gate.decide(title, &targets) {
            Decision::Abort if executor.is_cancelled() => Decision::Cancelled,
            other => other,
        }
    };

    let simulated = match decision {
        Decision::Abort => return decision,
        Decision::Cancelled => {
            tracing::warn!("{}: interrupted before dispatch; {} target(s) not sent", title, targets.len());
            false
        }
        Decision::Proceed { simulated } => simulated,
    };

    let submitted = targets.len();
    let before = reporter.len();
    let mut results = executor.apply(targets, throttle, simulated);
    while let Some(result) = results.next().await {
        reporter.record(result);
    }

    let recorded = reporter.len() - before;
    if recorded != submitted {
        tracing::error!("{}: {} targets submitted but {} results recorded", title, submitted, recorded);
    }
    decision
}
