//! Handler contracts.
//!
//! Every handler receives the owning [`Agent`] as an explicit parameter.
//! That is how a capability reaches shared resources (bus, config, vars,
//! library) no matter where the call originates — there is no hidden
//! execution context to rebind.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use loka_bus::BusEvent;
use loka_protocol::Packet;
use serde_json::Value;

use crate::agent::Agent;

/// What a capability hands back: an optional user-facing line plus free-form
/// result data. The dispatcher folds both into the answer envelope.
#[derive(Debug, Clone, Default)]
pub struct MethodReply {
    pub text: Option<String>,
    pub data: Value,
}

impl MethodReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            data: Value::Null,
        }
    }

    pub fn data(data: Value) -> Self {
        Self { text: None, data }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// A named capability an agent can dispatch a question to.
#[async_trait]
pub trait Method: Send + Sync {
    async fn call(&self, agent: Agent, packet: Packet) -> Result<MethodReply>;
}

/// A custom bus listener bound to an agent.
#[async_trait]
pub trait Listener: Send + Sync {
    async fn on_event(&self, agent: Agent, event: BusEvent) -> Result<()>;
}

/// A lifecycle hook (`on_init`, `on_start`, `on_stop`, `on_loaded`,
/// `on_logout`).
#[async_trait]
pub trait Hook: Send + Sync {
    async fn run(&self, agent: Agent) -> Result<()>;
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

struct FnMethod(Box<dyn Fn(Agent, Packet) -> BoxFuture<Result<MethodReply>> + Send + Sync>);

#[async_trait]
impl Method for FnMethod {
    async fn call(&self, agent: Agent, packet: Packet) -> Result<MethodReply> {
        (self.0)(agent, packet).await
    }
}

/// Lift a plain async closure into a [`Method`].
pub fn method_fn<F, Fut>(f: F) -> Arc<dyn Method>
where
    F: Fn(Agent, Packet) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<MethodReply>> + Send + 'static,
{
    Arc::new(FnMethod(Box::new(move |agent, packet| {
        Box::pin(f(agent, packet))
    })))
}

struct FnListener(Box<dyn Fn(Agent, BusEvent) -> BoxFuture<Result<()>> + Send + Sync>);

#[async_trait]
impl Listener for FnListener {
    async fn on_event(&self, agent: Agent, event: BusEvent) -> Result<()> {
        (self.0)(agent, event).await
    }
}

/// Lift a plain async closure into a [`Listener`].
pub fn listener_fn<F, Fut>(f: F) -> Arc<dyn Listener>
where
    F: Fn(Agent, BusEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnListener(Box::new(move |agent, event| {
        Box::pin(f(agent, event))
    })))
}

struct FnHook(Box<dyn Fn(Agent) -> BoxFuture<Result<()>> + Send + Sync>);

#[async_trait]
impl Hook for FnHook {
    async fn run(&self, agent: Agent) -> Result<()> {
        (self.0)(agent).await
    }
}

/// Lift a plain async closure into a [`Hook`].
pub fn hook_fn<F, Fut>(f: F) -> Arc<dyn Hook>
where
    F: Fn(Agent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnHook(Box::new(move |agent| Box::pin(f(agent)))))
}
