//! Route Resolver
//!
//! Decides whether a transfer needs a route, fetches routes from the routing
//! service, enforces the custodial RFQ-only policy, and caches routes by
//! request shape.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::clients::routing::{RouteRequest, RoutingService};
use crate::clients::wallet::WalletKind;
use crate::clock::Clock;
use crate::error::FlowError;
use crate::types::{Route, RouteType, TokenLocation};

/// Which route types a flow accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutePolicy {
    /// Any route, including slippage-bearing swaps
    AnyRoute,
    /// Only guaranteed-rate (RFQ) routes
    RfqOnly,
}

impl RoutePolicy {
    /// Custodial wallets only move funds at a guaranteed rate.
    pub fn for_wallet(kind: WalletKind) -> Self {
        match kind {
            WalletKind::Custodial => RoutePolicy::RfqOnly,
            WalletKind::External => RoutePolicy::AnyRoute,
        }
    }

    fn allows(&self, route: &Route) -> bool {
        !(matches!(self, RoutePolicy::RfqOnly) && route.route_type == RouteType::Swap)
    }
}

/// True unless source and destination are the same token on the same chain.
pub fn needs_route(source: &TokenLocation, destination: &TokenLocation) -> bool {
    !source.same_asset(destination)
}

#[derive(Debug, Clone)]
struct CachedRoute {
    route: Route,
    fetched_at: DateTime<Utc>,
}

/// Fetches and caches routes.
#[derive(Debug)]
pub struct RouteResolver {
    routing: Arc<dyn RoutingService>,
    clock: Arc<dyn Clock>,
    /// Map of serialized request -> cached route
    cache: RwLock<HashMap<String, CachedRoute>>,
    /// Cached routes younger than this are reused
    freshness: chrono::Duration,
    /// Cached routes older than this are dropped
    cache_ttl: chrono::Duration,
    /// Extra attempts after a failed lookup
    max_retries: u32,
}

impl RouteResolver {
    /// Creates a resolver.
    ///
    /// # Arguments
    ///
    /// * `routing` - Routing service
    /// * `clock` - Clock used for cache ages
    /// * `freshness_secs` - Reuse window for cached routes
    /// * `cache_ttl_secs` - Lifetime of cached routes
    /// * `max_retries` - Extra attempts after a failed lookup
    pub fn new(
        routing: Arc<dyn RoutingService>,
        clock: Arc<dyn Clock>,
        freshness_secs: u64,
        cache_ttl_secs: u64,
        max_retries: u32,
    ) -> Self {
        Self {
            routing,
            clock,
            cache: RwLock::new(HashMap::new()),
            freshness: chrono::Duration::seconds(freshness_secs as i64),
            cache_ttl: chrono::Duration::seconds(cache_ttl_secs as i64),
            max_retries,
        }
    }

    /// Returns a route for `request` under `policy`.
    ///
    /// A fresh, unexpired cached route is reused; otherwise the routing service
    /// is queried. Lookup failures are retried up to `max_retries` times. A swap route under
    /// `RfqOnly` fails with `RouteNotFound` immediately and is never cached.
    ///
    /// # Returns
    ///
    /// * `Ok(Route)` - Route allowed by the policy
    /// * `Err(FlowError::RouteNotFound)` - Only a swap route exists for an RFQ-only flow
    /// * `Err(FlowError::RouteUnavailable)` - Routing service failed on every attempt
    pub async fn resolve(&self, request: &RouteRequest, policy: RoutePolicy) -> Result<Route, FlowError> {
        let key = request.cache_key();
        let now = self.clock.now();

        {
            let mut cache = self.cache.write().await;
            cache.retain(|_, cached| now - cached.fetched_at < self.cache_ttl);
            if let Some(cached) = cache.get(&key) {
                if cached.route.is_expired(now) {
                    debug!("Cached route expired at {}, refetching", cached.route.expiry);
                } else if now - cached.fetched_at < self.freshness {
                    if !policy.allows(&cached.route) {
                        return Err(FlowError::RouteNotFound);
                    }
                    debug!("Reusing cached route fetched at {}", cached.fetched_at);
                    return Ok(cached.route.clone());
                } else {
                    debug!("Cached route is stale, refetching");
                }
            }
        }

        let route = self.fetch(request, policy).await?;
        self.cache.write().await.insert(
            key,
            CachedRoute {
                route: route.clone(),
                fetched_at: self.clock.now(),
            },
        );
        Ok(route)
    }

    async fn fetch(&self, request: &RouteRequest, policy: RoutePolicy) -> Result<Route, FlowError> {
        let mut attempt = 0;
        loop {
            match self.routing.get_route(request).await {
                Ok(route) => {
                    if !policy.allows(&route) {
                        warn!(
                            "Rejecting swap route {}:{} -> {}:{} for RFQ-only flow",
                            request.from.chain_id,
                            request.from.token_address,
                            request.to.chain_id,
                            request.to.token_address
                        );
                        return Err(FlowError::RouteNotFound);
                    }
                    info!(
                        "Resolved {:?} route with {} transaction(s), fees ${:.2}, expiry {}",
                        route.route_type,
                        route.transactions.len(),
                        route.fee_costs_usd,
                        route.expiry
                    );
                    return Ok(route);
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!("Route lookup failed (retry {}/{}): {}", attempt, self.max_retries, e);
                }
                Err(e) => return Err(FlowError::RouteUnavailable(e.to_string())),
            }
        }
    }

    /// Cached route for `request` regardless of freshness, if not yet evicted.
    ///
    /// Expired routes are still returned so callers can report the expiry;
    /// `resolve` never hands one out.
    pub async fn cached(&self, request: &RouteRequest) -> Option<Route> {
        let now = self.clock.now();
        let cache = self.cache.read().await;
        cache
            .get(&request.cache_key())
            .filter(|cached| now - cached.fetched_at < self.cache_ttl)
            .map(|cached| cached.route.clone())
    }

    /// Drops the cached route for `request`.
    pub async fn invalidate(&self, request: &RouteRequest) {
        self.cache.write().await.remove(&request.cache_key());
    }

    /// Invalidates then refetches the route for `request`.
    pub async fn refresh(&self, request: &RouteRequest, policy: RoutePolicy) -> Result<Route, FlowError> {
        self.invalidate(request).await;
        self.resolve(request, policy).await
    }

    /// Drops every cached route.
    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }
}
