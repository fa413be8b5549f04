// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, OnceLock};

use super::{HedgingResolver, Resolution};
use crate::listener::HedgeListener;
use crate::policy::{FixedPolicy, HedgePolicy};
use crate::utils::define_fn_wrapper;

define_fn_wrapper!(RouteKey<In, K>(Fn(input: &In) -> Option<K>));

/// Per-route overrides registered with a [`RouteRegistry`].
///
/// A route without its own policy uses the registry's global policy.
pub struct Route<In, Out> {
    policy: Option<Arc<dyn HedgePolicy<In>>>,
    listeners: Vec<Arc<dyn HedgeListener<In, Out>>>,
}

impl<In, Out> Route<In, Out> {
    /// Creates a route governed by `policy`.
    #[must_use]
    pub fn new(policy: impl HedgePolicy<In> + 'static) -> Self {
        Self {
            policy: Some(Arc::new(policy)),
            listeners: Vec::new(),
        }
    }

    /// Creates a route that keeps the global policy and only adds listeners.
    #[must_use]
    pub fn inherit() -> Self {
        Self {
            policy: None,
            listeners: Vec::new(),
        }
    }

    /// Adds a listener notified after the global listeners.
    #[must_use]
    pub fn listener(mut self, listener: impl HedgeListener<In, Out> + 'static) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }
}

impl<In, Out> Debug for Route<In, Out> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("has_policy", &self.policy.is_some())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Resolves policies and listeners per route.
///
/// The registry extracts a route key from every request. Requests whose key matches a
/// registered [`Route`] use the route's policy, or the global policy when the route has none.
/// Other requests, including those without a key, use the global policy. Without a global
/// policy they are not hedged.
///
/// Listeners accumulate: global listeners are notified first, then the route's own.
///
/// The first request resolved through the registry precomputes the [`Resolution`] of each
/// route. From then on, resolving a request is a single map lookup and two reference count
/// increments.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use hedgerow::policy::{FixedPolicy, HedgePolicy};
/// use hedgerow::resolver::{HedgingResolver, Route, RouteRegistry};
///
/// let registry = RouteRegistry::<http::Request<()>, String, String>::new(|request| {
///     Some(request.uri().path().to_string())
/// })
/// .global_policy(FixedPolicy::new(1, Duration::from_millis(200)))
/// .route("/search", Route::new(FixedPolicy::new(2, Duration::from_millis(40))));
///
/// let search = http::Request::get("/search").body(())?;
/// let orders = http::Request::get("/orders").body(())?;
///
/// assert_eq!(registry.resolve(&search).policy().decide(&search)?.max_hedges(), 2);
/// assert_eq!(registry.resolve(&orders).policy().decide(&orders)?.max_hedges(), 1);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct RouteRegistry<In, Out, K> {
    key: RouteKey<In, K>,
    global_policy: Option<Arc<dyn HedgePolicy<In>>>,
    global_listeners: Vec<Arc<dyn HedgeListener<In, Out>>>,
    routes: HashMap<K, Route<In, Out>>,
    resolved: OnceLock<Resolved<In, Out, K>>,
}

struct Resolved<In, Out, K> {
    fallback: Resolution<In, Out>,
    routes: HashMap<K, Resolution<In, Out>>,
}

impl<In, Out, K> RouteRegistry<In, Out, K>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty registry that derives route keys with `key`.
    #[must_use]
    pub fn new(key: impl Fn(&In) -> Option<K> + Send + Sync + 'static) -> Self {
        Self {
            key: RouteKey::new(key),
            global_policy: None,
            global_listeners: Vec::new(),
            routes: HashMap::new(),
            resolved: OnceLock::new(),
        }
    }

    /// Sets the policy for requests whose route has no policy of its own.
    #[must_use]
    pub fn global_policy(mut self, policy: impl HedgePolicy<In> + 'static) -> Self {
        self.global_policy = Some(Arc::new(policy));
        self.resolved = OnceLock::new();
        self
    }

    /// Adds a listener notified for every request, before any route listener.
    #[must_use]
    pub fn global_listener(mut self, listener: impl HedgeListener<In, Out> + 'static) -> Self {
        self.global_listeners.push(Arc::new(listener));
        self.resolved = OnceLock::new();
        self
    }

    /// Registers `route` under `key`, replacing any route previously registered there.
    #[must_use]
    pub fn route(mut self, key: impl Into<K>, route: Route<In, Out>) -> Self {
        self.routes.insert(key.into(), route);
        self.resolved = OnceLock::new();
        self
    }

    fn resolved(&self) -> &Resolved<In, Out, K> {
        self.resolved.get_or_init(|| {
            let global_policy = self
                .global_policy
                .clone()
                .unwrap_or_else(|| Arc::new(FixedPolicy::disabled()));

            let routes = self
                .routes
                .iter()
                .map(|(key, route)| {
                    let policy = route.policy.clone().unwrap_or_else(|| Arc::clone(&global_policy));
                    let listeners = self.global_listeners.iter().chain(&route.listeners).cloned().collect();

                    (key.clone(), Resolution::from_parts(policy, listeners))
                })
                .collect();

            Resolved {
                fallback: Resolution::from_parts(global_policy, self.global_listeners.clone()),
                routes,
            }
        })
    }

    #[cfg(test)]
    fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }
}

impl<In, Out, K> HedgingResolver<In, Out> for RouteRegistry<In, Out, K>
where
    K: Eq + Hash + Clone + Send + Sync,
{
    fn resolve(&self, input: &In) -> Resolution<In, Out> {
        let resolved = self.resolved();

        self.key
            .call(input)
            .and_then(|key| resolved.routes.get(&key))
            .unwrap_or(&resolved.fallback)
            .clone()
    }
}

impl<In, Out, K: Debug> Debug for RouteRegistry<In, Out, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteRegistry")
            .field("has_global_policy", &self.global_policy.is_some())
            .field("global_listeners", &self.global_listeners.len())
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
