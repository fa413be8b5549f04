// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(missing_docs, reason = "This is a test module")]

//! Integration tests for the hedging middleware using only the public API.
//!
//! Time is driven by hand: every attempt follows a scripted plan measured on a
//! [`ClockControl`], and the race future is polled explicitly after each advance.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use anyspawn::Spawner;
use futures::FutureExt;
use hedgerow::hedging::{Hedging, HedgingLayer};
use hedgerow::listener::{AttemptOutcome, AttemptReport, ListenerFn};
use hedgerow::policy::{FixedPolicy, HedgeDecision, HedgePolicy};
use hedgerow::{HedgingContext, ListenerError, PolicyError, RecoveryInfo};
use layered::{Execute, Layer, Service};
use rstest::rstest;
use tick::ClockControl;

type Output = Result<u32, u32>;
type Reports = Arc<Mutex<Vec<(u32, AttemptOutcome, Duration)>>>;
type Straggler = Pin<Box<dyn Future<Output = ()> + Send>>;

/// How a single attempt behaves, keyed by attempt index.
#[derive(Debug, Clone, Copy)]
enum Plan {
    Succeed(Duration),
    Fail(Duration),
    Hang,
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

fn poll<F: Future + Unpin>(future: &mut F) -> Poll<F::Output> {
    future.poll_unpin(&mut Context::from_waker(Waker::noop()))
}

struct Harness {
    control: ClockControl,
    calls: Arc<AtomicU32>,
    reports: Reports,
    stragglers: Arc<Mutex<Vec<Straggler>>>,
}

impl Harness {
    fn new() -> Self {
        Self {
            control: ClockControl::new(),
            calls: Arc::default(),
            reports: Reports::default(),
            stragglers: Arc::default(),
        }
    }

    /// Layer whose attempts receive their own index as input.
    fn layer(&self, policy: impl HedgePolicy<u32> + 'static) -> HedgingLayer<u32, Output> {
        let reports = Arc::clone(&self.reports);
        let context = HedgingContext::new(self.control.to_clock()).name("integration");

        Hedging::layer("hedging", &context)
            .clone_input_with(|_input, args| Some(args.attempt().index()))
            .recovery_with(|output: &Output, _args| match output {
                Ok(_) => RecoveryInfo::never(),
                Err(_) => RecoveryInfo::retry(),
            })
            .policy(policy)
            .listener(ListenerFn::new(move |report: &AttemptReport<'_, u32, Output>| {
                reports
                    .lock()
                    .unwrap()
                    .push((report.attempt().index(), report.outcome(), report.elapsed()));
                Ok(())
            }))
    }

    fn spawner(&self) -> Spawner {
        let stragglers = Arc::clone(&self.stragglers);
        Spawner::new_custom("stragglers", move |task| stragglers.lock().unwrap().push(task))
    }

    fn backend(&self, plans: Vec<Plan>) -> impl Service<u32, Out = Output> + 'static {
        let clock = self.control.to_clock();
        let calls = Arc::clone(&self.calls);

        Execute::new(move |attempt: u32| {
            calls.fetch_add(1, Ordering::SeqCst);
            let clock = clock.clone();
            let plan = plans[usize::try_from(attempt).unwrap()];

            async move {
                match plan {
                    Plan::Succeed(after) => {
                        clock.delay(after).await;
                        Ok(attempt)
                    }
                    Plan::Fail(after) => {
                        clock.delay(after).await;
                        Err(attempt)
                    }
                    Plan::Hang => std::future::pending().await,
                }
            }
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn reports(&self) -> Vec<(u32, AttemptOutcome, Duration)> {
        self.reports.lock().unwrap().clone()
    }

    /// Polls every captured straggler task once.
    fn drive_stragglers(&self) -> usize {
        let mut stragglers = self.stragglers.lock().unwrap();
        stragglers.retain_mut(|task| poll(task).is_pending());
        stragglers.len()
    }
}

#[test]
fn zero_max_hedges_runs_one_attempt() {
    let harness = Harness::new();
    let service = harness
        .layer(FixedPolicy::new(0, ms(10)))
        .layer(harness.backend(vec![Plan::Fail(ms(50))]));

    let mut future = Box::pin(service.execute(0));
    assert!(poll(&mut future).is_pending());

    harness.control.advance(ms(50));
    assert_eq!(poll(&mut future), Poll::Ready(Err(0)));
    assert_eq!(harness.calls(), 1);
    assert_eq!(harness.reports(), [(0, AttemptOutcome::Failure, ms(50))]);
}

#[rstest]
#[case::no_delay(FixedPolicy::new(3, None))]
#[case::disabled(FixedPolicy::disabled())]
fn disabled_delay_runs_one_attempt(#[case] policy: FixedPolicy) {
    let harness = Harness::new();
    let service = harness.layer(policy).layer(harness.backend(vec![Plan::Succeed(ms(500))]));

    let mut future = Box::pin(service.execute(0));
    for _ in 0..5 {
        assert!(poll(&mut future).is_pending());
        harness.control.advance(ms(100));
    }

    assert_eq!(poll(&mut future), Poll::Ready(Ok(0)));
    assert_eq!(harness.calls(), 1);
}

#[test]
fn hedge_wins_over_hanging_original() {
    let harness = Harness::new();
    let service = harness
        .layer(FixedPolicy::new(1, ms(100)))
        .spawner(harness.spawner())
        .layer(harness.backend(vec![Plan::Hang, Plan::Succeed(ms(150))]));

    let mut future = Box::pin(service.execute(0));
    assert!(poll(&mut future).is_pending());
    assert_eq!(harness.calls(), 1);

    harness.control.advance(ms(100));
    assert!(poll(&mut future).is_pending());
    assert_eq!(harness.calls(), 2);

    harness.control.advance(ms(149));
    assert!(poll(&mut future).is_pending());

    harness.control.advance(ms(1));
    assert_eq!(poll(&mut future), Poll::Ready(Ok(1)));
    assert_eq!(harness.reports(), [(1, AttemptOutcome::Success, ms(150))]);

    // The original keeps hanging on the spawner and is never reported.
    assert_eq!(harness.drive_stragglers(), 1);
    assert_eq!(harness.reports().len(), 1);
}

#[test]
fn fast_original_issues_no_hedges() {
    let harness = Harness::new();
    let service = harness
        .layer(FixedPolicy::new(2, ms(50)))
        .layer(harness.backend(vec![Plan::Succeed(ms(30)), Plan::Hang, Plan::Hang]));

    let mut future = Box::pin(service.execute(0));
    assert!(poll(&mut future).is_pending());

    harness.control.advance(ms(30));
    assert_eq!(poll(&mut future), Poll::Ready(Ok(0)));
    drop(future);

    harness.control.advance(ms(200));
    assert_eq!(harness.calls(), 1);
    assert_eq!(harness.reports(), [(0, AttemptOutcome::Success, ms(30))]);
}

#[test]
fn all_failures_return_original_output() {
    let harness = Harness::new();
    let service = harness
        .layer(FixedPolicy::new(2, ms(10)))
        .layer(harness.backend(vec![Plan::Fail(ms(5)); 3]));

    let mut future = Box::pin(service.execute(0));
    for _ in 0..5 {
        assert!(poll(&mut future).is_pending());
        harness.control.advance(ms(5));
    }

    assert_eq!(poll(&mut future), Poll::Ready(Err(0)));
    assert_eq!(harness.calls(), 3);
    assert_eq!(
        harness.reports(),
        [
            (0, AttemptOutcome::Failure, ms(5)),
            (1, AttemptOutcome::Failure, ms(5)),
            (2, AttemptOutcome::Failure, ms(5)),
        ]
    );
}

#[test]
fn early_failure_keeps_hedge_schedule() {
    let harness = Harness::new();
    let service = harness
        .layer(FixedPolicy::new(1, ms(100)))
        .layer(harness.backend(vec![Plan::Fail(ms(10)), Plan::Succeed(ms(10))]));

    let mut future = Box::pin(service.execute(0));
    assert!(poll(&mut future).is_pending());

    harness.control.advance(ms(10));
    assert!(poll(&mut future).is_pending());
    assert_eq!(harness.calls(), 1, "the hedge must wait for its scheduled time");

    harness.control.advance(ms(90));
    assert!(poll(&mut future).is_pending());
    assert_eq!(harness.calls(), 2);

    harness.control.advance(ms(10));
    assert_eq!(poll(&mut future), Poll::Ready(Ok(1)));
}

#[test]
fn hedges_follow_absolute_schedule() {
    let harness = Harness::new();
    let service = harness
        .layer(FixedPolicy::new(3, ms(40)))
        .layer(harness.backend(vec![Plan::Hang, Plan::Hang, Plan::Hang, Plan::Succeed(ms(1))]));

    let mut future = Box::pin(service.execute(0));
    let mut issued = Vec::new();
    for _ in 0..=12 {
        assert!(poll(&mut future).is_pending());
        issued.push(harness.calls());
        harness.control.advance(ms(10));
    }

    // Hedges start at 40ms, 80ms and 120ms.
    assert_eq!(issued, [1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4]);

    harness.control.advance(ms(1));
    assert_eq!(poll(&mut future), Poll::Ready(Ok(3)));
}

#[test]
fn same_tick_completions_deliver_one_winner() {
    let harness = Harness::new();
    let service = harness
        .layer(FixedPolicy::new(1, ms(10)))
        .spawner(harness.spawner())
        .layer(harness.backend(vec![Plan::Succeed(ms(20)), Plan::Succeed(ms(10))]));

    let mut future = Box::pin(service.execute(0));
    assert!(poll(&mut future).is_pending());
    harness.control.advance(ms(10));
    assert!(poll(&mut future).is_pending());
    harness.control.advance(ms(10));

    let Poll::Ready(Ok(winner)) = poll(&mut future) else {
        panic!("one of the attempts must win");
    };
    assert!(winner <= 1);
    assert_eq!(harness.reports().len(), 1);

    // The loser is drained on the spawner and still reported.
    assert_eq!(harness.drive_stragglers(), 0);
    let mut reported: Vec<_> = harness.reports().iter().map(|(index, outcome, _)| (*index, *outcome)).collect();
    reported.sort_by_key(|(index, _)| *index);
    assert_eq!(reported, [(0, AttemptOutcome::Success), (1, AttemptOutcome::Success)]);
}

#[test]
fn stragglers_reported_after_win() {
    let harness = Harness::new();
    let service = harness
        .layer(FixedPolicy::new(2, ms(10)))
        .spawner(harness.spawner())
        .layer(harness.backend(vec![Plan::Fail(ms(100)), Plan::Succeed(ms(5)), Plan::Hang]));

    let mut future = Box::pin(service.execute(0));
    assert!(poll(&mut future).is_pending());
    harness.control.advance(ms(10));
    assert!(poll(&mut future).is_pending());
    harness.control.advance(ms(5));

    assert_eq!(poll(&mut future), Poll::Ready(Ok(1)));
    assert_eq!(harness.calls(), 2, "the second hedge was never due");

    harness.control.advance(ms(85));
    assert_eq!(harness.drive_stragglers(), 0);
    assert_eq!(
        harness.reports(),
        [(1, AttemptOutcome::Success, ms(5)), (0, AttemptOutcome::Failure, ms(100))]
    );
}

#[test]
fn without_spawner_losers_are_cancelled() {
    let harness = Harness::new();
    let service = harness
        .layer(FixedPolicy::new(1, ms(10)))
        .layer(harness.backend(vec![Plan::Succeed(ms(100)), Plan::Succeed(ms(5))]));

    let mut future = Box::pin(service.execute(0));
    assert!(poll(&mut future).is_pending());
    harness.control.advance(ms(10));
    assert!(poll(&mut future).is_pending());
    harness.control.advance(ms(5));
    assert_eq!(poll(&mut future), Poll::Ready(Ok(1)));

    harness.control.advance(ms(100));
    assert_eq!(harness.drive_stragglers(), 0);
    assert_eq!(harness.reports(), [(1, AttemptOutcome::Success, ms(5))]);
}

#[test]
fn dropping_the_race_cancels_everything() {
    let harness = Harness::new();
    let service = harness
        .layer(FixedPolicy::new(2, ms(10)))
        .spawner(harness.spawner())
        .layer(harness.backend(vec![Plan::Succeed(ms(50)); 3]));

    let mut future = Box::pin(service.execute(0));
    assert!(poll(&mut future).is_pending());
    harness.control.advance(ms(10));
    assert!(poll(&mut future).is_pending());
    drop(future);

    harness.control.advance(ms(100));
    assert_eq!(harness.calls(), 2);
    assert_eq!(harness.drive_stragglers(), 0);
    assert!(harness.reports().is_empty());
}

#[test]
fn deadline_returns_fallback_output() {
    let harness = Harness::new();
    let attempts_seen = Arc::new(AtomicU32::new(0));
    let attempts_clone = Arc::clone(&attempts_seen);

    let service = harness
        .layer(FixedPolicy::new(1, ms(50)))
        .deadline(ms(80), move |args| {
            attempts_clone.store(args.attempts_issued(), Ordering::SeqCst);
            assert_eq!(args.elapsed(), ms(80));
            Err(u32::MAX)
        })
        .layer(harness.backend(vec![Plan::Hang, Plan::Succeed(ms(100))]));

    let mut future = Box::pin(service.execute(0));
    assert!(poll(&mut future).is_pending());
    harness.control.advance(ms(50));
    assert!(poll(&mut future).is_pending());
    harness.control.advance(ms(30));

    assert_eq!(poll(&mut future), Poll::Ready(Err(u32::MAX)));
    assert_eq!(attempts_seen.load(Ordering::SeqCst), 2);
    assert!(harness.reports().is_empty());
}

#[test]
fn failing_and_panicking_listeners_are_isolated() {
    let harness = Harness::new();
    let seen = Arc::new(AtomicU32::new(0));
    let seen_clone = Arc::clone(&seen);

    let service = harness
        .layer(FixedPolicy::new(1, ms(10)))
        .listener(ListenerFn::new(|_: &AttemptReport<'_, u32, Output>| {
            Err(ListenerError::caused_by("sink offline"))
        }))
        .listener(ListenerFn::new(|_: &AttemptReport<'_, u32, Output>| -> Result<(), ListenerError> {
            panic!("listener bug")
        }))
        .listener(ListenerFn::new(move |_: &AttemptReport<'_, u32, Output>| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
        .layer(harness.backend(vec![Plan::Succeed(ms(5))]));

    let mut future = Box::pin(service.execute(0));
    assert!(poll(&mut future).is_pending());
    harness.control.advance(ms(5));

    assert_eq!(poll(&mut future), Poll::Ready(Ok(0)));
    assert_eq!(harness.reports().len(), 1);
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

/// Policy backed by a store that is currently unreachable.
#[derive(Debug)]
struct OfflinePolicy;

impl HedgePolicy<u32> for OfflinePolicy {
    fn decide(&self, _input: &u32) -> Result<HedgeDecision, PolicyError> {
        Err(PolicyError::caused_by("latency store offline"))
    }
}

#[test]
fn failing_policy_sends_request_unhedged() {
    let harness = Harness::new();
    let service = harness
        .layer(OfflinePolicy)
        .layer(harness.backend(vec![Plan::Succeed(ms(500))]));

    let mut future = Box::pin(service.execute(0));
    assert!(poll(&mut future).is_pending());
    harness.control.advance(ms(499));
    assert!(poll(&mut future).is_pending());
    harness.control.advance(ms(1));

    assert_eq!(poll(&mut future), Poll::Ready(Ok(0)));
    assert_eq!(harness.calls(), 1);
    assert_eq!(harness.reports(), vec![(0, AttemptOutcome::Success, ms(500))]);
}

#[test]
fn public_error_constructors() {
    assert!(PolicyError::caused_by("no data").to_string().contains("no data"));
    assert!(ListenerError::caused_by("sink offline").to_string().contains("sink offline"));
    assert!(!PolicyError::new().to_string().is_empty());
    assert!(!ListenerError::new().to_string().is_empty());
}

#[tokio::test]
async fn tokio_runtime_end_to_end() {
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = Arc::clone(&calls);
    let reports = Reports::default();
    let reports_clone = Arc::clone(&reports);

    let clock = tick::Clock::new_tokio();
    let context = HedgingContext::new(&clock).name("tokio");
    let service = Hedging::layer("hedging", &context)
        .clone_input()
        .recovery_with(|output: &Result<String, String>, _| match output {
            Ok(_) => RecoveryInfo::never(),
            Err(_) => RecoveryInfo::retry(),
        })
        .policy(FixedPolicy::new(2, Duration::ZERO))
        .listener(ListenerFn::new(move |report: &AttemptReport<'_, String, Result<String, String>>| {
            reports_clone
                .lock()
                .unwrap()
                .push((report.attempt().index(), report.outcome(), report.elapsed()));
            Ok(())
        }))
        .spawner(Spawner::new_tokio())
        .layer(Execute::new(move |input: String| {
            let call = calls_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 2 {
                    Ok(format!("{input}:{call}"))
                } else {
                    Err(format!("busy:{call}"))
                }
            }
        }));

    let output = service.execute("request".to_string()).await;

    assert_eq!(output, Ok("request:2".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let mut outcomes: Vec<_> = reports.lock().unwrap().iter().map(|(index, outcome, _)| (*index, *outcome)).collect();
    outcomes.sort_by_key(|(index, _)| *index);
    assert_eq!(
        outcomes,
        [
            (0, AttemptOutcome::Failure),
            (1, AttemptOutcome::Failure),
            (2, AttemptOutcome::Success)
        ]
    );
}
