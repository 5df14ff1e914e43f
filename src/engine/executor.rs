//! Batch executor
//!
//! Applies actions to targets with a bounded number of requests in flight.
//! Every submitted target yields exactly one [`OperationResult`], whether it
//! was sent, simulated, or never dispatched because the run was cancelled.

use super::cancel::CancelSignal;
use super::report::{OperationResult, Outcome, SkipReason};
use crate::api::client::ApiClient;
use crate::api::http::{ApiResponse, AttemptCounter};
use crate::error::TransportError;
use crate::resource::action::{Action, ActionTarget};
use futures::stream::{self, Stream, StreamExt};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Shared dispatch cooldown, tripped when a target ends rate limited.
///
/// Passed explicitly to [`Executor::apply`]; workers wait it out before
/// sending anything new.
#[derive(Debug)]
pub struct Throttle {
    cooldown: Duration,
    until: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            until: Mutex::new(None),
        }
    }

    /// Push the resume time `cooldown` into the future
    pub fn trip(&self) {
        let resume = Instant::now() + self.cooldown;
        if let Ok(mut until) = self.until.lock() {
            if until.map_or(true, |t| t < resume) {
                *until = Some(resume);
            }
        }
        tracing::warn!("Rate limited: pausing dispatch for {:?}", self.cooldown);
    }

    pub fn resume_at(&self) -> Option<Instant> {
        self.until.lock().ok().and_then(|u| *u)
    }

    /// Sleep until the cooldown (if any) has passed
    pub async fn wait(&self) {
        while let Some(resume) = self.resume_at() {
            if resume <= Instant::now() {
                break;
            }
            tokio::time::sleep_until(resume).await;
        }
    }
}

/// Map a transport result for `action` to an outcome
pub fn outcome_for(action: Action, result: &Result<ApiResponse, TransportError>) -> Outcome {
    match result {
        Ok(_) => Outcome::Succeeded,
        Err(e) if e.is_not_found() && action != Action::Invite => Outcome::Skipped(SkipReason::AlreadyGone),
        Err(e) if e.is_conflict() && action == Action::Invite => Outcome::Skipped(SkipReason::AlreadyExists),
        Err(e) => Outcome::Failed(e.reason()),
    }
}

pub struct Executor<'a> {
    client: &'a ApiClient,
    concurrency: usize,
    cancel: CancelSignal,
}

impl<'a> Executor<'a> {
    pub fn new(client: &'a ApiClient, concurrency: usize, cancel: CancelSignal) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Lazily apply each target's action, yielding results as they complete.
    ///
    /// Targets are dispatched in submission order with at most `concurrency`
    /// in flight; completion order is arbitrary. When `simulated`, nothing is
    /// sent and every target is reported as `skipped(dry-run)`.
    pub fn apply(
        &'a self,
        targets: Vec<ActionTarget>,
        throttle: &'a Throttle,
        simulated: bool,
    ) -> impl Stream<Item = OperationResult> + 'a {
        stream::iter(targets.into_iter().enumerate())
            .map(move |(seq, target)| self.dispatch(seq, target, throttle, simulated))
            .buffer_unordered(self.concurrency)
    }

    async fn dispatch(
        &self,
        seq: usize,
        target: ActionTarget,
        throttle: &Throttle,
        simulated: bool,
    ) -> OperationResult {
        let label = target.resource().label();

        if simulated {
            tracing::info!("[dry-run] Would {}: {}", target.action().display_name().to_lowercase(), label);
            return OperationResult::new(seq, &target, Outcome::Skipped(SkipReason::DryRun), 0, Duration::ZERO);
        }

        throttle.wait().await;
        if self.cancel.is_cancelled() {
            tracing::info!("Not dispatching {} (cancelled)", label);
            return OperationResult::new(seq, &target, Outcome::Skipped(SkipReason::Cancelled), 0, Duration::ZERO);
        }

        let started = Instant::now();
        let attempts = AttemptCounter::default();
        let request = target.request(self.client);
        let result = self.client.send(&request, &attempts).await;

        if matches!(result, Err(TransportError::RateLimited { .. })) {
            throttle.trip();
        }

        let outcome = outcome_for(target.action(), &result);
        match &outcome {
            Outcome::Succeeded => tracing::info!("{} {}", target.action().past_tense(), label),
            Outcome::Skipped(reason) => tracing::info!("Skipped {}: {}", label, reason.as_str()),
            Outcome::Failed(reason) => tracing::error!("Failed to {} {}: {}", target.action().display_name().to_lowercase(), label, reason),
        }

        OperationResult::new(seq, &target, outcome, attempts.count(), started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> Result<ApiResponse, TransportError> {
        Err(TransportError::Api {
            status,
            body: String::new(),
        })
    }

    #[test]
    fn test_outcome_mapping() {
        let ok = Ok(ApiResponse {
            status: 202,
            body: serde_json::Value::Null,
        });
        assert_eq!(outcome_for(Action::DeleteCluster, &ok), Outcome::Succeeded);
        assert_eq!(
            outcome_for(Action::DeleteCluster, &api(404)),
            Outcome::Skipped(SkipReason::AlreadyGone)
        );
        assert_eq!(
            outcome_for(Action::Invite, &api(409)),
            Outcome::Skipped(SkipReason::AlreadyExists)
        );
        assert_eq!(
            outcome_for(Action::DeleteProject, &api(409)),
            Outcome::Failed("api-error 409".into())
        );
        assert_eq!(
            outcome_for(Action::Invite, &api(404)),
            Outcome::Failed("api-error 404".into())
        );
        assert_eq!(
            outcome_for(Action::PauseCluster, &Err(TransportError::RateLimited { attempts: 4 })),
            Outcome::Failed("rate-limited".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_delays_until_cooldown_passes() {
        let throttle = Throttle::new(Duration::from_secs(2));
        let start = Instant::now();
        throttle.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        throttle.trip();
        throttle.wait().await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
