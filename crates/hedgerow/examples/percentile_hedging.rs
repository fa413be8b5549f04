// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Percentile hedging example against a backend with a long latency tail.
//!
//! Nine requests out of ten answer in about 20ms; every tenth request stalls for 400ms.
//! The first requests are sent without hedges while the estimator warms up. Once it holds
//! enough samples, requests that run past the observed p90 are hedged and the stalls
//! disappear from the caller's view.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyspawn::Spawner;
use hedgerow::estimator::{EstimatorOptions, LatencyEstimator};
use hedgerow::hedging::Hedging;
use hedgerow::policy::PercentilePolicy;
use hedgerow::{HedgingContext, RecoveryInfo};
use layered::{Execute, Service, Stack};
use ohno::AppError;
use tick::Clock;

static CALL_COUNT: AtomicU32 = AtomicU32::new(0);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), AppError> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    let clock = Clock::new_tokio();
    let context = HedgingContext::new(&clock).name("example_backend").enable_logs();

    let estimator = Arc::new(LatencyEstimator::new(
        &clock,
        EstimatorOptions::default().window(Duration::from_secs(30)),
    ));
    let policy = PercentilePolicy::new(Arc::clone(&estimator), 0.9)?.min_samples(20);

    let backend_clock = clock.clone();
    let stack = (
        Hedging::layer("p90_hedging", &context)
            .clone_input()
            .recovery_with(|output: &Result<String, String>, _args| match output {
                Ok(_) => RecoveryInfo::never(),
                Err(_) => RecoveryInfo::retry(),
            })
            .policy(policy)
            .listener(Arc::clone(&estimator))
            // Losing attempts finish in the background so their latency is still recorded.
            .spawner(Spawner::new_tokio())
            .on_hedge(|args| println!("[hedge] attempt {} after {:?}", args.attempt(), args.delay())),
        Execute::new(move |request: u32| backend(backend_clock.clone(), request)),
    );

    let service = stack.into_service();

    for request in 0..60 {
        let started = clock.stopwatch();
        let output = service.execute(request).await;

        match output {
            Ok(body) => println!("[main] {body} in {:?}", started.elapsed()),
            Err(error) => println!("[main] request {request} failed: {error}"),
        }
    }

    println!(
        "[main] p90 = {:?} over {} samples",
        estimator.percentile(0.9),
        estimator.sample_count()
    );

    Ok(())
}

/// Every tenth call stalls, the others answer quickly.
async fn backend(clock: Clock, request: u32) -> Result<String, String> {
    let call = CALL_COUNT.fetch_add(1, Ordering::Relaxed);
    let latency = if call % 10 == 9 {
        Duration::from_millis(400)
    } else {
        Duration::from_millis(20)
    };

    clock.delay(latency).await;
    Ok(format!("response to request {request} (call {call})"))
}
