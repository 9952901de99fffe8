// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Concurrent expansion of the graph from a set of roots.
//!
//! Grounded on `engine::level_by_level`'s fan-out shape (`tokio::spawn` + `Semaphore` +
//! joining handles in order, first failure aborts) generalized from a fixed processor
//! pipeline to recursive, caller-driven neighbor discovery, and on `traits::processor`'s
//! `#[async_trait] trait Foo: Send + Sync` shape for the two callback capabilities.

mod rendezvous;

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::concurrency::ConcurrentDag;
use crate::errors::GraphError;
use crate::observability::messages::discovery as msg;
use crate::store::DiscoveryState;
use rendezvous::{RendezvousMap, Role};

type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Resolves a vertex key to its value. Must be safe to call concurrently; the engine never
/// calls it twice for the same key within one [`GraphDiscoverer::discover`] run.
#[async_trait]
pub trait Resolver<K, V>: Send + Sync {
    async fn resolve(&self, cancel: &CancellationToken, key: &K) -> Result<V, CallbackError>;
}

/// Enumerates a value's ordered children. Must be safe to call concurrently and must not
/// mutate shared state; the returned order is preserved via `dag/order-index`.
#[async_trait]
pub trait NeighborDiscoverer<K, V>: Send + Sync {
    async fn discover(&self, cancel: &CancellationToken, value: &V) -> Result<Vec<K>, CallbackError>;
}

/// Tuning knobs for a discovery run, independent of the root set (which varies per call).
/// `concurrency <= 0` (the default) resolves to the host's logical CPU count, matching
/// `engine::level_by_level::LevelByLevelExecutor::default()`.
#[derive(Debug, Clone)]
pub struct DiscovererConfig {
    pub concurrency: usize,
}

impl DiscovererConfig {
    pub fn new() -> Self {
        DiscovererConfig { concurrency: default_concurrency() }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = if concurrency == 0 { default_concurrency() } else { concurrency };
        self
    }
}

impl Default for DiscovererConfig {
    fn default() -> Self {
        DiscovererConfig::new()
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

/// Drives concurrent expansion of a [`crate::Dag`] from a set of root keys.
pub struct GraphDiscoverer<K, V> {
    resolver: Arc<dyn Resolver<K, V>>,
    neighbor_discoverer: Arc<dyn NeighborDiscoverer<K, V>>,
    config: DiscovererConfig,
}

impl<K, V> GraphDiscoverer<K, V>
where
    K: Ord + Hash + Clone + std::fmt::Display + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new(
        resolver: Arc<dyn Resolver<K, V>>,
        neighbor_discoverer: Arc<dyn NeighborDiscoverer<K, V>>,
        config: DiscovererConfig,
    ) -> Self {
        GraphDiscoverer { resolver, neighbor_discoverer, config }
    }

    /// Drives discovery to completion from `roots`, returning the first encountered error if
    /// any. Panics in callbacks or internal steps are recovered here and surfaced as
    /// [`GraphError::Panic`].
    pub async fn discover(
        &self,
        roots: Vec<K>,
        wrapper: Arc<ConcurrentDag<K, V>>,
        cancel: CancellationToken,
    ) -> Result<(), GraphError> {
        if roots.is_empty() {
            return Err(GraphError::NoRoots);
        }
        let run_cancel = cancel.child_token();
        let span = tracing::info_span!("discover", roots = roots.len());
        let _entered = span.enter();
        msg::DiscoveryStarted { root_count: roots.len() }.log();

        let ctx = DiscoverCtx {
            wrapper,
            resolver: self.resolver.clone(),
            neighbor_discoverer: self.neighbor_discoverer.clone(),
            rendezvous: Arc::new(RendezvousMap::new()),
            semaphore: Arc::new(Semaphore::new(self.config.concurrency)),
            cancel: run_cancel.clone(),
        };

        let outcome = tokio::spawn(async move {
            let mut join_set = JoinSet::new();
            for root in roots {
                let ctx = ctx.clone();
                join_set.spawn(async move { discover_key(ctx, root).await });
            }
            let mut first_err: Option<GraphError> = None;
            while let Some(joined) = join_set.join_next().await {
                let result = match joined {
                    Ok(result) => result,
                    Err(join_err) => Err(GraphError::Panic {
                        phase: "discover",
                        message: join_err.to_string(),
                    }),
                };
                if let Err(e) = result {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
            match first_err {
                Some(e) => Err(e),
                None => Ok(()),
            }
        })
        .await;

        match outcome {
            Ok(result) => {
                if let Err(ref e) = result {
                    msg::DiscoveryFailed { error: e }.log();
                } else {
                    msg::DiscoveryCompleted.log();
                }
                result
            }
            Err(join_err) => Err(GraphError::Panic {
                phase: "discover",
                message: join_err.to_string(),
            }),
        }
    }
}

struct DiscoverCtx<K, V> {
    wrapper: Arc<ConcurrentDag<K, V>>,
    resolver: Arc<dyn Resolver<K, V>>,
    neighbor_discoverer: Arc<dyn NeighborDiscoverer<K, V>>,
    rendezvous: Arc<RendezvousMap<K>>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl<K, V> Clone for DiscoverCtx<K, V> {
    fn clone(&self) -> Self {
        DiscoverCtx {
            wrapper: self.wrapper.clone(),
            resolver: self.resolver.clone(),
            neighbor_discoverer: self.neighbor_discoverer.clone(),
            rendezvous: self.rendezvous.clone(),
            semaphore: self.semaphore.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Enters the per-key rendezvous protocol: becomes the single author for `id`, or waits on
/// whichever task already is one. Recursion here is budgeted onto freshly spawned tasks
/// (each child discovery is a `JoinSet` entry, not a direct call-stack frame), so depth is
/// bounded by scheduler capacity rather than native stack size.
fn discover_key<K, V>(ctx: DiscoverCtx<K, V>, id: K) -> BoxFuture<'static, Result<(), GraphError>>
where
    K: Ord + Hash + Clone + std::fmt::Display + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    Box::pin(async move {
        if ctx.cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        match ctx.rendezvous.enter(&id) {
            Role::Waiter(entry) => RendezvousMap::<K>::wait(&entry, &ctx.cancel).await,
            Role::Author(ticket) => author(ctx, id, ticket).await,
        }
    })
}

async fn author<K, V>(
    ctx: DiscoverCtx<K, V>,
    id: K,
    _ticket: rendezvous::AuthorTicket,
) -> Result<(), GraphError>
where
    K: Ord + Hash + Clone + std::fmt::Display + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    // `_ticket` is held for the lifetime of this function; its `Drop` closes the rendezvous
    // signal on every exit path below, including the early returns on callback failure.
    ctx.wrapper.with_write(|dag| {
        dag.add_vertex(id.clone(), vec![]);
        dag.set_discovery_state(&id, DiscoveryState::Discovering);
    });
    msg::VertexDiscovering { key: &id }.log();

    let permit = ctx
        .semaphore
        .clone()
        .acquire_owned()
        .await
        .expect("discovery semaphore never closes");
    let resolved = ctx.resolver.resolve(&ctx.cancel, &id).await;
    drop(permit);

    let value = match resolved {
        Ok(v) => v,
        Err(e) => {
            ctx.wrapper.with_write(|dag| dag.set_discovery_state(&id, DiscoveryState::Error));
            ctx.cancel.cancel();
            let err = GraphError::resolver_failure(id.to_string(), CallbackErrorWrapper(e));
            msg::VertexDiscoveryFailed { key: &id, error: &err }.log();
            return Err(err);
        }
    };
    let value = Arc::new(value);
    ctx.wrapper.with_write(|dag| {
        dag.set_value(&id, value.clone());
        dag.set_discovery_state(&id, DiscoveryState::Discovered);
    });

    let permit = ctx
        .semaphore
        .clone()
        .acquire_owned()
        .await
        .expect("discovery semaphore never closes");
    let neighbors = ctx.neighbor_discoverer.discover(&ctx.cancel, &value).await;
    drop(permit);

    let neighbors = match neighbors {
        Ok(n) => n,
        Err(e) => {
            ctx.wrapper.with_write(|dag| {
                dag.clear_value(&id);
                dag.set_discovery_state(&id, DiscoveryState::Error);
            });
            ctx.cancel.cancel();
            let err = GraphError::discoverer_failure(id.to_string(), CallbackErrorWrapper(e));
            msg::VertexDiscoveryFailed { key: &id, error: &err }.log();
            return Err(err);
        }
    };

    let mut join_set = JoinSet::new();
    for (i, n) in neighbors.iter().cloned().enumerate() {
        let child_ctx = ctx.clone();
        join_set.spawn(async move {
            let result = discover_key(child_ctx, n).await;
            (i, result)
        });
    }

    let mut slots: Vec<Option<Result<(), GraphError>>> = vec![None; neighbors.len()];
    let mut panic_err: Option<GraphError> = None;
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((i, result)) => slots[i] = Some(result),
            Err(join_err) => {
                if panic_err.is_none() {
                    panic_err = Some(GraphError::Panic {
                        phase: "discover",
                        message: join_err.to_string(),
                    });
                }
            }
        }
    }

    let mut first_err: Option<GraphError> = None;
    for (i, neighbor) in neighbors.into_iter().enumerate() {
        match slots[i].take() {
            Some(Ok(())) => {
                let edge = ctx
                    .wrapper
                    .with_write(|dag| dag.add_edge(&id, &neighbor, Some(i), vec![HashMap::new()]));
                if let Err(e) = edge {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
            Some(Err(e)) => {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
            None => {}
        }
    }
    if first_err.is_none() {
        first_err = panic_err;
    }

    match first_err {
        Some(e) => {
            ctx.wrapper.with_write(|dag| dag.set_discovery_state(&id, DiscoveryState::Error));
            Err(e)
        }
        None => {
            ctx.wrapper.with_write(|dag| dag.set_discovery_state(&id, DiscoveryState::Completed));
            msg::VertexDiscoveryCompleted { key: &id }.log();
            Ok(())
        }
    }
}

/// `CallbackError` is already `Box<dyn Error + Send + Sync>`; this newtype lets us hand it to
/// `GraphError::resolver_failure`/`discoverer_failure`, which take `impl std::error::Error`
/// by value to stay uniform with callers constructing those errors directly from a concrete
/// error type.
#[derive(Debug)]
struct CallbackErrorWrapper(CallbackError);

impl std::fmt::Display for CallbackErrorWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CallbackErrorWrapper {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}
