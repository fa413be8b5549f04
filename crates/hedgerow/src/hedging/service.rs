// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyspawn::Spawner;
use futures_util::FutureExt;
use futures_util::future::{Either, select};
use futures_util::stream::{FuturesUnordered, StreamExt};
use layered::Service;
use tick::Clock;

use super::args::{CloneArgs, DeadlineArgs, OnHedgeArgs, RecoveryArgs};
use super::callbacks::{CloneInput, DeadlineOutput, OnHedge, ShouldRecover};
use crate::listener::{AttemptOutcome, AttemptReport, HedgeListener, notify_listeners};
use crate::policy::HedgeDecision;
use crate::resolver::{HedgingResolver, Resolution};
use crate::telemetry::{HEDGE_EVENT, HEDGE_EXHAUSTED_EVENT};
use crate::utils::{EnableIf, TelemetryHelper};
use crate::{Attempt, HedgingContext, NotSet, PolicyError, RecoveryKind};

/// Hedging middleware that races copies of a request and returns the first success.
///
/// `Hedging` wraps an inner [`Service`]. For every request it asks the configured
/// [`HedgingResolver`] for a policy, issues the original attempt, then issues hedged copies
/// on the schedule the policy decided until one attempt succeeds. Attempts that are still
/// running when the winner arrives are drained on the configured
/// [`Spawner`][anyspawn::Spawner], or cancelled when no spawner is set.
///
/// Hedging is configured by calling [`Hedging::layer`] and using the builder methods on the
/// returned [`HedgingLayer`][crate::hedging::HedgingLayer] instance.
///
/// For comprehensive examples, see the [hedging module][crate::hedging] documentation.
#[derive(Debug)]
pub struct Hedging<In, Out, S> {
    pub(super) shared: Arc<HedgingShared<In, Out>>,
    pub(super) inner: Arc<S>,
}

/// Configuration shared by a [`Hedging`] service, its clones and its straggler tasks.
pub(crate) struct HedgingShared<In, Out> {
    pub(crate) clock: Clock,
    pub(crate) resolver: Arc<dyn HedgingResolver<In, Out>>,
    pub(crate) clone_input: CloneInput<In>,
    pub(crate) should_recover: ShouldRecover<Out>,
    pub(crate) handle_unavailable: bool,
    pub(crate) on_hedge: Option<OnHedge>,
    pub(crate) deadline: Option<Deadline<Out>>,
    pub(crate) spawner: Option<Spawner>,
    pub(crate) enable_if: EnableIf<In>,
    pub(crate) telemetry: TelemetryHelper,
}

impl<In, Out> std::fmt::Debug for HedgingShared<In, Out> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HedgingShared")
            .field("clock", &self.clock)
            .field("handle_unavailable", &self.handle_unavailable)
            .field("deadline", &self.deadline.as_ref().map(|deadline| deadline.after))
            .field("spawner", &self.spawner)
            .field("telemetry", &self.telemetry)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub(crate) struct Deadline<Out> {
    pub(crate) after: Duration,
    pub(crate) output: DeadlineOutput<Out>,
}

impl<Out> Clone for Deadline<Out> {
    fn clone(&self) -> Self {
        Self {
            after: self.after,
            output: self.output.clone(),
        }
    }
}

impl<In, Out, S> Clone for Hedging<In, Out, S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<In, Out> Hedging<In, Out, ()> {
    /// Creates a new hedging layer with the specified name and context.
    ///
    /// Returns a [`HedgingLayer`][crate::hedging::HedgingLayer] that must be configured with
    /// required parameters before it can be used to build a hedging service.
    pub fn layer(
        name: impl Into<Cow<'static, str>>,
        context: &HedgingContext<In, Out>,
    ) -> crate::hedging::HedgingLayer<In, Out, NotSet, NotSet> {
        crate::hedging::HedgingLayer::new(name.into(), context)
    }
}

/// An attempt that ran to completion.
struct Completed<Out> {
    output: Out,
    attempt: Attempt,
    elapsed: Duration,
}

/// The hedge due after hedge `last`, with its offset from the start of the race.
fn next_scheduled(decision: HedgeDecision, last: u32) -> Option<(u32, Duration)> {
    let index = last.checked_add(1)?;
    decision.hedge_offset(index).map(|offset| (index, offset))
}

/// What the race loop learned while waiting.
enum Step<Out> {
    Completed(Completed<Out>),
    HedgeDue(u32),
    Exhausted,
}

impl<In, Out, S> Service<In> for Hedging<In, Out, S>
where
    In: Send + 'static,
    Out: Send + 'static,
    S: Service<In, Out = Out> + 'static,
{
    type Out = Out;

    async fn execute(&self, input: In) -> Self::Out {
        if !self.shared.enable_if.call(&input) {
            return self.inner.execute(input).await;
        }

        let Some(deadline) = &self.shared.deadline else {
            return self.race(input, &AtomicU32::new(0)).await;
        };

        let stopwatch = self.shared.clock.stopwatch();
        let issued = AtomicU32::new(0);
        let race = pin!(self.race(input, &issued));
        let timer = pin!(self.shared.clock.delay(deadline.after));

        match select(race, timer).await {
            Either::Left((output, _)) => output,
            Either::Right(((), _)) => {
                let args = DeadlineArgs {
                    elapsed: stopwatch.elapsed(),
                    attempts_issued: issued.load(Ordering::Relaxed),
                };

                if self.shared.telemetry.logs_enabled {
                    tracing::event!(
                        name: "hedgerow.deadline",
                        tracing::Level::DEBUG,
                        pipeline.name = %self.shared.telemetry.pipeline_name,
                        strategy.name = %self.shared.telemetry.strategy_name,
                        hedgerow.attempts_issued = args.attempts_issued,
                    );
                }

                deadline.output.call(args)
            }
        }
    }
}

impl<In, Out, S> Hedging<In, Out, S>
where
    In: Send + 'static,
    Out: Send + 'static,
    S: Service<In, Out = Out> + 'static,
{
    async fn race(&self, mut input: In, issued: &AtomicU32) -> Out {
        let shared = &self.shared;
        let resolution = shared.resolve(&input);
        let decision = shared.decide(&resolution, &input);
        let max_hedges = decision.max_hedges();

        // A refused original runs unhedged and unobserved.
        let original = Attempt::planned(0, max_hedges);
        let Some(cloned) = shared.clone_input.call(&mut input, CloneArgs { attempt: original }) else {
            return self.inner.execute(input).await;
        };

        let started = shared.clock.stopwatch();
        let mut futs = FuturesUnordered::new();
        futs.push(self.start_attempt(original, cloned));
        issued.store(1, Ordering::Relaxed);

        let mut last_hedge = 0_u32;
        let mut original_output = None;

        loop {
            let step = match next_scheduled(decision, last_hedge) {
                Some((index, offset)) => {
                    let wait = offset.saturating_sub(started.elapsed());
                    if wait.is_zero() {
                        // Only hedge if nothing has succeeded in the meantime.
                        match futs.next().now_or_never() {
                            Some(Some(completed)) => Step::Completed(completed),
                            _ => Step::HedgeDue(index),
                        }
                    } else if futs.is_empty() {
                        shared.clock.delay(wait).await;
                        Step::HedgeDue(index)
                    } else {
                        let next = pin!(futs.next());
                        let delay = pin!(shared.clock.delay(wait));
                        match select(next, delay).await {
                            Either::Left((Some(completed), _)) => Step::Completed(completed),
                            Either::Left((None, _)) | Either::Right(((), _)) => Step::HedgeDue(index),
                        }
                    }
                }
                None => futs.next().await.map_or(Step::Exhausted, Step::Completed),
            };

            match step {
                Step::Completed(completed) => {
                    let outcome = shared.classify(&completed.output, completed.attempt);
                    shared.report(resolution.listeners(), &input, &completed, outcome);

                    if outcome.is_success() {
                        shared.log_race(completed.attempt, issued.load(Ordering::Relaxed), outcome);
                        shared.abandon(futs, input, &resolution);
                        return completed.output;
                    }

                    if completed.attempt.is_original() {
                        original_output = Some(completed.output);
                    }
                }
                Step::HedgeDue(index) => {
                    let attempt = Attempt::planned(index, max_hedges);
                    last_hedge = index;

                    if let Some(cloned) = shared.clone_input.call(&mut input, CloneArgs { attempt }) {
                        shared.on_hedge_issued(attempt, decision);
                        futs.push(self.start_attempt(attempt, cloned));
                        issued.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Step::Exhausted => {
                    let issued = issued.load(Ordering::Relaxed);
                    shared.telemetry.report_event(HEDGE_EXHAUSTED_EVENT, issued.saturating_sub(1));
                    shared.log_race(Attempt::new(0, max_hedges == 0), issued, AttemptOutcome::Failure);

                    return original_output.expect("the original attempt completes before the race is exhausted");
                }
            }
        }
    }

    fn start_attempt(&self, attempt: Attempt, input: In) -> impl Future<Output = Completed<Out>> + Send + use<In, Out, S> {
        let inner = Arc::clone(&self.inner);
        let stopwatch = self.shared.clock.stopwatch();

        async move {
            let output = inner.execute(input).await;
            Completed {
                output,
                attempt,
                elapsed: stopwatch.elapsed(),
            }
        }
    }
}

impl<In, Out> HedgingShared<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    fn resolve(&self, input: &In) -> Resolution<In, Out> {
        catch_unwind(AssertUnwindSafe(|| self.resolver.resolve(input))).unwrap_or_else(|_| {
            tracing::event!(
                name: "hedgerow.resolver_panicked",
                tracing::Level::WARN,
                pipeline.name = %self.telemetry.pipeline_name,
                strategy.name = %self.telemetry.strategy_name,
                "hedging resolver panicked, sending the request without hedges",
            );

            Resolution::disabled()
        })
    }

    fn decide(&self, resolution: &Resolution<In, Out>, input: &In) -> HedgeDecision {
        let decision = catch_unwind(AssertUnwindSafe(|| resolution.policy().decide(input)))
            .unwrap_or_else(|_| Err(PolicyError::caused_by("hedge policy panicked")));

        decision.unwrap_or_else(|error| {
            tracing::event!(
                name: "hedgerow.policy_failed",
                tracing::Level::WARN,
                pipeline.name = %self.telemetry.pipeline_name,
                strategy.name = %self.telemetry.strategy_name,
                error = %error,
                "hedge policy failed, sending the request without hedges",
            );

            HedgeDecision::disabled()
        })
    }

    fn classify(&self, output: &Out, attempt: Attempt) -> AttemptOutcome {
        let recovery = self.should_recover.call(output, RecoveryArgs { clock: &self.clock, attempt });

        match recovery.kind() {
            RecoveryKind::Retry => AttemptOutcome::Failure,
            RecoveryKind::Unavailable if self.handle_unavailable => AttemptOutcome::Failure,
            _ => AttemptOutcome::Success,
        }
    }

    fn report(&self, listeners: &[Arc<dyn HedgeListener<In, Out>>], input: &In, completed: &Completed<Out>, outcome: AttemptOutcome) {
        let report = AttemptReport::new(input, &completed.output, outcome, completed.elapsed, completed.attempt);
        notify_listeners(listeners, &report, &self.telemetry);
    }

    fn on_hedge_issued(&self, attempt: Attempt, decision: HedgeDecision) {
        if let Some(on_hedge) = &self.on_hedge {
            on_hedge.call(OnHedgeArgs {
                attempt,
                delay: decision.delay().unwrap_or_default(),
            });
        }

        if self.telemetry.logs_enabled {
            tracing::event!(
                name: "hedgerow.hedge",
                tracing::Level::INFO,
                pipeline.name = %self.telemetry.pipeline_name,
                strategy.name = %self.telemetry.strategy_name,
                resilience.attempt.index = attempt.index(),
            );
        }

        self.telemetry.report_event(HEDGE_EVENT, attempt.index());
    }

    fn log_race(&self, attempt: Attempt, issued: u32, outcome: AttemptOutcome) {
        if self.telemetry.logs_enabled {
            tracing::event!(
                name: "hedgerow.race",
                tracing::Level::DEBUG,
                pipeline.name = %self.telemetry.pipeline_name,
                strategy.name = %self.telemetry.strategy_name,
                resilience.attempt.index = attempt.index(),
                hedgerow.attempts_issued = issued,
                hedgerow.outcome = %outcome,
            );
        }
    }

    /// Hands the attempts still in flight to the spawner so their outcomes reach the listeners.
    fn abandon<F>(self: &Arc<Self>, mut futs: FuturesUnordered<F>, input: In, resolution: &Resolution<In, Out>)
    where
        F: Future<Output = Completed<Out>> + Send + 'static,
    {
        let Some(spawner) = &self.spawner else {
            return;
        };

        if futs.is_empty() {
            return;
        }

        let shared = Arc::clone(self);
        let listeners = resolution.shared_listeners();

        // Dropping the handle detaches the task.
        drop(spawner.spawn(async move {
            while let Some(completed) = futs.next().await {
                let outcome = shared.classify(&completed.output, completed.attempt);
                shared.report(&listeners, &input, &completed, outcome);
            }
        }));
    }
}
