//! Handler and middleware abstractions

use crate::context::Context;
use crate::error::Result;
use async_trait::async_trait;
use logfront_core::{IndexStats, Request, Response};
use std::future::Future;
use std::sync::Arc;

/// Serves a query request
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: &Context, req: Request) -> Result<Response>;
}

/// Serves index statistics for a selector over a time range
#[async_trait]
pub trait StatsHandler: Send + Sync {
    async fn estimate(&self, ctx: &Context, req: Request) -> Result<IndexStats>;
}

/// Wraps a handler with additional behavior
pub trait Middleware: Send + Sync {
    fn name(&self) -> &'static str;

    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler>;
}

/// Ordered list of middlewares. The first one added is the outermost.
#[derive(Default, Clone)]
pub struct MiddlewareChain {
    layers: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, layer: impl Middleware + 'static) -> Self {
        self.layers.push(Arc::new(layer));
        self
    }

    pub fn push(&mut self, layer: Arc<dyn Middleware>) {
        self.layers.push(layer);
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|l| l.name()).collect()
    }

    /// Compose the chain around `handler`
    pub fn wrap(&self, handler: Arc<dyn Handler>) -> Arc<dyn Handler> {
        self.layers
            .iter()
            .rev()
            .fold(handler, |next, layer| layer.wrap(next))
    }
}

/// Handler backed by an async closure
pub struct HandlerFn<F>(F);

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Context, Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response>> + Send,
{
    async fn handle(&self, ctx: &Context, req: Request) -> Result<Response> {
        (self.0)(ctx.clone(), req).await
    }
}

pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Context, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    Arc::new(HandlerFn(f))
}

/// Stats handler backed by an async closure
pub struct StatsFn<F>(F);

#[async_trait]
impl<F, Fut> StatsHandler for StatsFn<F>
where
    F: Fn(Context, Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<IndexStats>> + Send,
{
    async fn estimate(&self, ctx: &Context, req: Request) -> Result<IndexStats> {
        (self.0)(ctx.clone(), req).await
    }
}

pub fn stats_fn<F, Fut>(f: F) -> Arc<dyn StatsHandler>
where
    F: Fn(Context, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<IndexStats>> + Send + 'static,
{
    Arc::new(StatsFn(f))
}
