// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use anyspawn::Spawner;
use layered::Layer;

use super::args::{CloneArgs, DeadlineArgs, OnHedgeArgs, RecoveryArgs};
use super::callbacks::{CloneInput, DeadlineOutput, OnHedge, ShouldRecover};
use super::service::{Deadline, Hedging, HedgingShared};
use crate::listener::HedgeListener;
use crate::policy::{FixedPolicy, HedgePolicy};
use crate::resolver::{HedgingResolver, Resolution};
use crate::utils::{EnableIf, TelemetryHelper};
use crate::{HedgingContext, NotSet, Recovery, RecoveryInfo, Set};

/// Builder for the hedging middleware.
///
/// Created by [`Hedging::layer`]. The type-state pattern makes sure the two required
/// properties are configured before the layer can wrap a service:
///
/// - [`clone_input`][HedgingLayer::clone_input]: how to produce an input for every attempt
/// - [`recovery`][HedgingLayer::recovery]: which outputs end the race
///
/// Everything else is optional. Without a [`policy`][HedgingLayer::policy] or
/// [`resolver`][HedgingLayer::resolver], requests get one hedge after two seconds.
///
/// For comprehensive examples, see the [hedging module][crate::hedging] documentation.
///
/// # Type State
///
/// - `S1`: Tracks whether [`clone_input`][HedgingLayer::clone_input] has been set
/// - `S2`: Tracks whether [`recovery`][HedgingLayer::recovery] has been set
pub struct HedgingLayer<In, Out, S1 = Set, S2 = Set> {
    context: HedgingContext<In, Out>,
    resolution: Resolution<In, Out>,
    resolver: Option<Arc<dyn HedgingResolver<In, Out>>>,
    clone_input: Option<CloneInput<In>>,
    should_recover: Option<ShouldRecover<Out>>,
    on_hedge: Option<OnHedge>,
    handle_unavailable: bool,
    spawner: Option<Spawner>,
    deadline: Option<Deadline<Out>>,
    enable_if: EnableIf<In>,
    telemetry: TelemetryHelper,
    _state: PhantomData<fn(In, S1, S2) -> Out>,
}

impl<In, Out> HedgingLayer<In, Out, NotSet, NotSet> {
    #[must_use]
    pub(crate) fn new(name: Cow<'static, str>, context: &HedgingContext<In, Out>) -> Self {
        Self {
            context: context.clone(),
            resolution: Resolution::new(FixedPolicy::default()),
            resolver: None,
            clone_input: None,
            should_recover: None,
            on_hedge: None,
            handle_unavailable: false,
            spawner: None,
            deadline: None,
            enable_if: EnableIf::always(),
            telemetry: context.create_telemetry(name),
            _state: PhantomData,
        }
    }
}

impl<In, Out, S1, S2> HedgingLayer<In, Out, S1, S2> {
    /// Sets the input cloning function.
    ///
    /// Called once per attempt, the original included, to produce the input that attempt runs
    /// with. The `clone_fn` receives a mutable reference to the caller's input and
    /// [`CloneArgs`] describing the attempt. Returning `None` skips a hedge; returning `None`
    /// for the original sends the caller's input through the inner service unhedged.
    #[must_use]
    pub fn clone_input_with(
        mut self,
        clone_fn: impl Fn(&mut In, CloneArgs) -> Option<In> + Send + Sync + 'static,
    ) -> HedgingLayer<In, Out, Set, S2> {
        self.clone_input = Some(CloneInput::new(clone_fn));
        self.into_state::<Set, S2>()
    }

    /// Clones inputs with their [`Clone`] implementation.
    ///
    /// Equivalent to `clone_input_with(|input, _args| Some(input.clone()))`.
    #[must_use]
    pub fn clone_input(self) -> HedgingLayer<In, Out, Set, S2>
    where
        In: Clone,
    {
        self.clone_input_with(|input, _args| Some(input.clone()))
    }

    /// Sets the function that classifies attempt outputs.
    ///
    /// - [`RecoveryInfo::never()`]: the output is final and wins the race
    /// - [`RecoveryInfo::retry()`]: the attempt failed, keep waiting for the others
    /// - [`RecoveryInfo::unavailable()`]: final by default, treated as a failure when
    ///   [`handle_unavailable(true)`][HedgingLayer::handle_unavailable] is configured
    ///
    /// The same classification is reported to listeners as the attempt outcome.
    #[must_use]
    pub fn recovery_with(
        mut self,
        recover_fn: impl Fn(&Out, RecoveryArgs<'_>) -> RecoveryInfo + Send + Sync + 'static,
    ) -> HedgingLayer<In, Out, S1, Set> {
        self.should_recover = Some(ShouldRecover::new(recover_fn));
        self.into_state::<S1, Set>()
    }

    /// Classifies outputs with their [`Recovery`] implementation.
    #[must_use]
    pub fn recovery(self) -> HedgingLayer<In, Out, S1, Set>
    where
        Out: Recovery,
    {
        self.recovery_with(|out, _args| out.recovery())
    }

    /// Sets the policy that decides how every request is hedged.
    ///
    /// Listeners added with [`listener`][HedgingLayer::listener] are kept. Ignored when a
    /// [`resolver`][HedgingLayer::resolver] is configured.
    ///
    /// **Default**: [`FixedPolicy::default()`], one hedge after two seconds
    #[must_use]
    pub fn policy(mut self, policy: impl HedgePolicy<In> + 'static) -> Self {
        self.resolution = Resolution::from_parts(Arc::new(policy), self.resolution.listeners().to_vec());
        self
    }

    /// Adds a listener notified about every completed attempt.
    ///
    /// Ignored when a [`resolver`][HedgingLayer::resolver] is configured; register listeners
    /// with the resolver instead.
    #[must_use]
    pub fn listener(mut self, listener: impl HedgeListener<In, Out> + 'static) -> Self {
        self.resolution = self.resolution.listener(listener);
        self
    }

    /// Resolves the policy and listeners per request, replacing
    /// [`policy`][HedgingLayer::policy] and [`listener`][HedgingLayer::listener].
    #[must_use]
    pub fn resolver(mut self, resolver: impl HedgingResolver<In, Out> + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Configures a callback invoked right before a hedge is issued.
    ///
    /// Purely observational. Hedges skipped because their input could not be cloned do not
    /// invoke the callback.
    ///
    /// **Default**: None
    #[must_use]
    pub fn on_hedge(mut self, hedge_fn: impl Fn(OnHedgeArgs) + Send + Sync + 'static) -> Self {
        self.on_hedge = Some(OnHedge::new(hedge_fn));
        self
    }

    /// Configures whether [`RecoveryInfo::unavailable()`] outputs count as failed attempts.
    ///
    /// **Default**: false, unavailable outputs are returned immediately
    #[must_use]
    pub fn handle_unavailable(mut self, enable: bool) -> Self {
        self.handle_unavailable = enable;
        self
    }

    /// Lets attempts that lost the race run to completion on `spawner`.
    ///
    /// The drained attempts are classified and reported to the listeners, which keeps latency
    /// estimators fed with the slow samples a race would otherwise hide.
    ///
    /// **Default**: None, losing attempts are cancelled when the race ends
    #[must_use]
    pub fn spawner(mut self, spawner: Spawner) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Bounds the whole race by `after`.
    ///
    /// When the deadline elapses before an attempt succeeds, every attempt in flight is
    /// cancelled and `output_fn` produces the result.
    ///
    /// **Default**: None, the race waits for the attempts
    #[must_use]
    pub fn deadline(mut self, after: Duration, output_fn: impl Fn(DeadlineArgs) -> Out + Send + Sync + 'static) -> Self {
        self.deadline = Some(Deadline {
            after,
            output: DeadlineOutput::new(output_fn),
        });
        self
    }

    /// Optionally enables the hedging middleware based on a condition.
    ///
    /// Disabled requests pass straight through to the inner service without being reported.
    ///
    /// **Default**: Always enabled
    #[must_use]
    pub fn enable_if(mut self, is_enabled: impl Fn(&In) -> bool + Send + Sync + 'static) -> Self {
        self.enable_if = EnableIf::new(is_enabled);
        self
    }

    /// Enables the hedging middleware unconditionally.
    #[must_use]
    pub fn enable_always(mut self) -> Self {
        self.enable_if = EnableIf::always();
        self
    }

    /// Disables the hedging middleware completely.
    #[must_use]
    pub fn disable(mut self) -> Self {
        self.enable_if = EnableIf::never();
        self
    }

    fn into_state<T1, T2>(self) -> HedgingLayer<In, Out, T1, T2> {
        HedgingLayer {
            context: self.context,
            resolution: self.resolution,
            resolver: self.resolver,
            clone_input: self.clone_input,
            should_recover: self.should_recover,
            on_hedge: self.on_hedge,
            handle_unavailable: self.handle_unavailable,
            spawner: self.spawner,
            deadline: self.deadline,
            enable_if: self.enable_if,
            telemetry: self.telemetry,
            _state: PhantomData,
        }
    }
}

impl<In, Out, S1, S2> Debug for HedgingLayer<In, Out, S1, S2> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HedgingLayer")
            .field("resolution", &self.resolution)
            .field("has_resolver", &self.resolver.is_some())
            .field("handle_unavailable", &self.handle_unavailable)
            .field("deadline", &self.deadline.as_ref().map(|deadline| deadline.after))
            .field("spawner", &self.spawner)
            .field("telemetry", &self.telemetry)
            .finish_non_exhaustive()
    }
}

impl<In, Out, S> Layer<S> for HedgingLayer<In, Out, Set, Set>
where
    In: 'static,
    Out: 'static,
{
    type Service = Hedging<In, Out, S>;

    fn layer(&self, inner: S) -> Self::Service {
        let resolver = self
            .resolver
            .clone()
            .unwrap_or_else(|| Arc::new(self.resolution.clone()));

        let shared = HedgingShared {
            clock: self.context.get_clock().clone(),
            resolver,
            clone_input: self.clone_input.clone().expect("clone_input must be set in Ready state"),
            should_recover: self.should_recover.clone().expect("should_recover must be set in Ready state"),
            handle_unavailable: self.handle_unavailable,
            on_hedge: self.on_hedge.clone(),
            deadline: self.deadline.clone(),
            spawner: self.spawner.clone(),
            enable_if: self.enable_if.clone(),
            telemetry: self.telemetry.clone(),
        };

        Hedging {
            shared: Arc::new(shared),
            inner: Arc::new(inner),
        }
    }
}
