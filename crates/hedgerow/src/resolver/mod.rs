// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Selects the policy and listeners that govern a request.
//!
//! At the start of every race the hedging middleware asks its [`HedgingResolver`] for a
//! [`Resolution`]: the [`HedgePolicy`] that decides how the request is hedged and the ordered
//! list of [`HedgeListener`]s that observe its attempts.
//!
//! A [`Resolution`] is itself a resolver that returns the same configuration for every
//! request. [`RouteRegistry`] picks a configuration per route, falling back to global
//! defaults for unknown routes.

use std::fmt::Debug;
use std::sync::Arc;

mod registry;

pub use registry::{Route, RouteRegistry};

use crate::listener::HedgeListener;
use crate::policy::{FixedPolicy, HedgePolicy};

/// Provides the [`Resolution`] for a request.
pub trait HedgingResolver<In, Out>: Send + Sync {
    /// Returns the policy and listeners for `input`.
    fn resolve(&self, input: &In) -> Resolution<In, Out>;
}

impl<In, Out, R: HedgingResolver<In, Out> + ?Sized> HedgingResolver<In, Out> for Arc<R> {
    fn resolve(&self, input: &In) -> Resolution<In, Out> {
        (**self).resolve(input)
    }
}

/// A policy and the listeners that observe the attempts it schedules.
///
/// Cloning is cheap: the policy and the listener list are reference counted.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use hedgerow::estimator::{EstimatorOptions, LatencyEstimator};
/// use hedgerow::policy::FixedPolicy;
/// use hedgerow::resolver::{HedgingResolver, Resolution};
/// use tick::Clock;
///
/// let estimator = Arc::new(LatencyEstimator::new(&Clock::new_frozen(), EstimatorOptions::default()));
/// let resolution = Resolution::<String, String>::new(FixedPolicy::new(1, Duration::from_millis(50)))
///     .listener(estimator);
///
/// let resolved = resolution.resolve(&"any request".to_string());
/// assert_eq!(resolved.listeners().len(), 1);
/// ```
pub struct Resolution<In, Out> {
    policy: Arc<dyn HedgePolicy<In>>,
    listeners: Arc<[Arc<dyn HedgeListener<In, Out>>]>,
}

impl<In, Out> Resolution<In, Out> {
    /// Creates a resolution with `policy` and no listeners.
    #[must_use]
    pub fn new(policy: impl HedgePolicy<In> + 'static) -> Self {
        Self::from_parts(Arc::new(policy), Vec::new())
    }

    /// A resolution that never hedges and notifies nobody.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(FixedPolicy::disabled())
    }

    /// Appends a listener. Listeners are notified in the order they were added.
    #[must_use]
    pub fn listener(self, listener: impl HedgeListener<In, Out> + 'static) -> Self {
        let mut listeners = self.listeners.to_vec();
        listeners.push(Arc::new(listener));
        Self::from_parts(self.policy, listeners)
    }

    /// The policy that decides how requests are hedged.
    #[must_use]
    pub fn policy(&self) -> &dyn HedgePolicy<In> {
        &*self.policy
    }

    /// The listeners, in notification order.
    #[must_use]
    pub fn listeners(&self) -> &[Arc<dyn HedgeListener<In, Out>>] {
        &self.listeners
    }

    pub(crate) fn shared_listeners(&self) -> Arc<[Arc<dyn HedgeListener<In, Out>>]> {
        Arc::clone(&self.listeners)
    }

    pub(crate) fn from_parts(policy: Arc<dyn HedgePolicy<In>>, listeners: Vec<Arc<dyn HedgeListener<In, Out>>>) -> Self {
        Self {
            policy,
            listeners: listeners.into(),
        }
    }
}

impl<In, Out> Clone for Resolution<In, Out> {
    fn clone(&self) -> Self {
        Self {
            policy: Arc::clone(&self.policy),
            listeners: Arc::clone(&self.listeners),
        }
    }
}

impl<In, Out> Default for Resolution<In, Out> {
    fn default() -> Self {
        Self::disabled()
    }
}

impl<In, Out> Debug for Resolution<In, Out> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolution")
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl<In, Out> HedgingResolver<In, Out> for Resolution<In, Out> {
    fn resolve(&self, _input: &In) -> Self {
        self.clone()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::listener::{AttemptReport, ListenerFn};
    use crate::policy::HedgeDecision;

    #[test]
    fn disabled_by_default() {
        let resolution = Resolution::<(), ()>::default();

        assert_eq!(resolution.policy().decide(&()).unwrap(), HedgeDecision::disabled());
        assert!(resolution.listeners().is_empty());
    }

    #[test]
    fn listeners_keep_order_and_clone_shares() {
        let resolution = Resolution::<(), ()>::new(FixedPolicy::new(1, Duration::from_millis(5)))
            .listener(ListenerFn::new(|_: &AttemptReport<'_, (), ()>| Ok(())))
            .listener(ListenerFn::new(|_: &AttemptReport<'_, (), ()>| Ok(())));

        let resolved = resolution.resolve(&());
        assert_eq!(resolved.listeners().len(), 2);
        assert!(Arc::ptr_eq(&resolved.listeners[0], &resolution.listeners[0]));
        assert!(format!("{resolved:?}").contains("listeners: 2"));
    }

    #[test]
    fn arc_resolver_forwards() {
        let resolver: Arc<dyn HedgingResolver<(), ()>> = Arc::new(Resolution::new(FixedPolicy::new(2, Duration::ZERO)));
        assert_eq!(resolver.resolve(&()).policy().decide(&()).unwrap().max_hedges(), 2);
    }

    #[test]
    fn static_assertions() {
        static_assertions::assert_impl_all!(Resolution<String, String>: Send, Sync, Clone, HedgingResolver<String, String>);
    }
}
