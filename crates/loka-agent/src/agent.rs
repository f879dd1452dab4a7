//! The agent: a composable unit exposing named capabilities over the bus.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use chrono::Utc;
use indexmap::IndexMap;
use loka_bus::{BusEvent, BusStream, EventBus};
use loka_protocol::{
    AgentProfile, Answer, AnswerMeta, BusPayload, Command, CommandError, ErrorReport, Packet,
    ProtocolError, StatusReport, TextFilter, channels,
};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::builder::Hooks;
use crate::registry::MethodRegistry;
use crate::state::{Library, Store};
use crate::traits::{Listener, Method, MethodReply};

/// The one method that is dispatchable even while stopped, so a stopped
/// agent can be told to start through the same question protocol as
/// everything else.
const METHOD_START: &str = "start";

/// Cheap-to-clone handle to one agent. Handlers receive a clone of this as
/// their execution context; all clones share the same state.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

pub(crate) struct AgentParts {
    pub(crate) profile: AgentProfile,
    pub(crate) translate: Option<Arc<dyn TextFilter>>,
    pub(crate) parse: Option<Arc<dyn TextFilter>>,
    pub(crate) bus: EventBus,
    pub(crate) config: Store,
    pub(crate) vars: Store,
    pub(crate) lib: Library,
    pub(crate) methods: MethodRegistry,
    pub(crate) listeners: Vec<(String, Arc<dyn Listener>)>,
    pub(crate) hooks: Hooks,
    pub(crate) children: IndexMap<String, Agent>,
}

struct AgentInner {
    profile: AgentProfile,
    translate: Option<Arc<dyn TextFilter>>,
    parse: Option<Arc<dyn TextFilter>>,
    // Overwritten by the parent's inherit pass; hence behind locks.
    bus: Mutex<EventBus>,
    config: Mutex<Store>,
    lib: Mutex<Library>,
    vars: Store,
    methods: MethodRegistry,
    listeners: Mutex<Vec<(String, Arc<dyn Listener>)>>,
    hooks: Hooks,
    children: Mutex<IndexMap<String, Agent>>,
    running: AtomicBool,
    initialized: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for AgentInner {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

/// Everything a question can resolve to short of invoking a capability.
enum Resolution {
    EmptyQuestion,
    MethodNotFound(String),
    NotRunning(String),
}

impl Agent {
    pub(crate) fn assemble(parts: AgentParts) -> Self {
        Self {
            inner: Arc::new(AgentInner {
                profile: parts.profile,
                translate: parts.translate,
                parse: parts.parse,
                bus: Mutex::new(parts.bus),
                config: Mutex::new(parts.config),
                lib: Mutex::new(parts.lib),
                vars: parts.vars,
                methods: parts.methods,
                listeners: Mutex::new(parts.listeners),
                hooks: parts.hooks,
                children: Mutex::new(parts.children),
                running: AtomicBool::new(false),
                initialized: AtomicBool::new(false),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    // --- identity & shared resources -------------------------------------

    pub fn key(&self) -> &str {
        &self.inner.profile.key
    }

    pub fn name(&self) -> &str {
        &self.inner.profile.name
    }

    pub fn profile(&self) -> AgentProfile {
        self.inner.profile.clone()
    }

    pub fn bus(&self) -> EventBus {
        self.inner.bus.lock().clone()
    }

    pub fn config(&self) -> Store {
        self.inner.config.lock().clone()
    }

    pub fn vars(&self) -> Store {
        self.inner.vars.clone()
    }

    pub fn lib(&self) -> Library {
        self.inner.lib.lock().clone()
    }

    /// Run input through the profile's `translate` filter, if any.
    pub fn translate(&self, input: &str) -> String {
        match &self.inner.translate {
            Some(filter) => filter.filter(input),
            None => input.to_owned(),
        }
    }

    /// Run input through the profile's `parse` filter, if any.
    pub fn parse_text(&self, input: &str) -> String {
        match &self.inner.parse {
            Some(filter) => filter.filter(input),
            None => input.to_owned(),
        }
    }

    pub fn register_method(&self, name: impl Into<String>, method: Arc<dyn Method>) -> Result<()> {
        self.inner.methods.register(name, method)
    }

    pub fn method_names(&self) -> Vec<String> {
        self.inner.methods.names()
    }

    // --- bus façade -------------------------------------------------------

    /// Publish on a bus channel. Returns the number of receivers reached.
    pub fn talk(&self, channel: &str, payload: impl Into<BusPayload>) -> usize {
        self.bus().emit(channel, payload)
    }

    /// Bind `listener` to a channel with this agent as its context. The
    /// returned guard can later be passed to [`ignore`](Self::ignore);
    /// dropping it leaves the listener attached.
    pub fn listen(&self, channel: &str, listener: Arc<dyn Listener>) -> ListenerGuard {
        let abort = self.spawn_route(channel, move |agent, event| {
            let listener = listener.clone();
            async move {
                if let Err(err) = listener.on_event(agent.clone(), event).await {
                    warn!(key = %agent.key(), error = %format!("{err:#}"), "listener failed");
                }
            }
        });
        ListenerGuard { abort }
    }

    /// Wait for a single event on a channel.
    pub async fn once(&self, channel: &str) -> Result<BusEvent> {
        Ok(self.bus().next(channel).await?)
    }

    /// Detach a listener previously attached with [`listen`](Self::listen).
    pub fn ignore(&self, guard: ListenerGuard) {
        guard.abort.abort();
    }

    // --- children ---------------------------------------------------------

    /// Attach a child under `name`. No wiring happens here; shared resources
    /// reach the child only through `init`.
    pub fn add_child(&self, name: impl Into<String>, child: Agent) {
        self.inner.children.lock().insert(name.into(), child);
    }

    pub fn remove_child(&self, name: &str) -> Option<Agent> {
        self.inner.children.lock().shift_remove(name)
    }

    pub fn child(&self, name: &str) -> Option<Agent> {
        self.inner.children.lock().get(name).cloned()
    }

    pub fn child_names(&self) -> Vec<String> {
        self.inner.children.lock().keys().cloned().collect()
    }

    // --- lifecycle --------------------------------------------------------

    pub fn running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Flip to RUNNING. Publishes exactly one status event, strictly before
    /// the `on_start` hook runs. No-op when already running.
    #[instrument(skip(self), fields(key = %self.key()))]
    pub async fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.status();
        self.run_hook(self.inner.hooks.on_start.clone(), "start").await;
    }

    /// Flip to STOPPED. Publishes exactly one status event, strictly before
    /// the `on_stop` hook runs. No-op when already stopped.
    #[instrument(skip(self), fields(key = %self.key()))]
    pub async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.status();
        self.run_hook(self.inner.hooks.on_stop.clone(), "stop").await;
    }

    /// Publish a status snapshot on the bus-wide `status` channel and return
    /// the current flag. Pure observer.
    pub fn status(&self) -> bool {
        let running = self.running();
        self.talk(channels::STATUS, StatusReport::new(self.key(), running));
        running
    }

    async fn run_hook(&self, hook: Option<Arc<dyn crate::traits::Hook>>, phase: &str) {
        let Some(hook) = hook else { return };
        if let Err(err) = hook.run(self.clone()).await {
            let message = format!("{err:#}");
            warn!(key = %self.key(), phase, error = %message, "lifecycle hook failed");
            self.talk(
                channels::ERROR,
                ErrorReport::new(format!("#{}:{phase}", self.key()), message),
            );
        }
    }

    // --- dispatch ---------------------------------------------------------

    /// Consume a question packet and publish exactly one answer on the
    /// packet's correlation channel.
    ///
    /// Questions are handled in call order up to the point the capability is
    /// invoked; the invocation itself runs in its own task, so concurrent
    /// questions complete in their own order on their own correlation
    /// channels. Resolution failures (unknown method, not running, empty
    /// question) are also answered from a spawned task — callers observe
    /// asynchronous delivery on every path.
    #[instrument(skip(self, packet), fields(key = %self.key(), packet_id = %packet.id))]
    pub async fn question(&self, mut packet: Packet) {
        packet.asked = Some(Utc::now());

        let command = match Command::parse(&packet.q.text, self.key(), &packet.id) {
            Ok(command) => command,
            Err(CommandError::EmptyQuestion) => {
                self.defer_resolution(packet, Resolution::EmptyQuestion);
                return;
            }
        };
        packet.q.text = command.text;
        packet.q.params = command.params;

        let Some(method) = self.inner.methods.get(&command.method) else {
            self.defer_resolution(packet, Resolution::MethodNotFound(command.method));
            return;
        };

        if !self.running() && command.method != METHOD_START {
            self.defer_resolution(packet, Resolution::NotRunning(command.method));
            return;
        }

        debug!(method = %command.method, "capability invoked");
        let agent = self.clone();
        let name = command.method;
        let _ = tokio::spawn(async move {
            let outcome = method.call(agent.clone(), packet.clone()).await;
            agent.publish_outcome(packet, &name, outcome);
        });
    }

    /// Ask this agent a question over the bus and resolve once the
    /// correlated answer is observed. The agent must have been initialized;
    /// nothing bounds the wait.
    pub async fn ask(&self, text: impl Into<String>) -> Result<Packet> {
        self.ask_packet(Packet::new(text)).await
    }

    pub async fn ask_packet(&self, packet: Packet) -> Result<Packet> {
        let reply = channels::answer(self.key(), &packet.id);
        let event = self
            .bus()
            .call(
                &channels::question(self.key()),
                &reply,
                BusPayload::packet(packet),
            )
            .await?;
        event
            .payload
            .into_packet()
            .ok_or_else(|| ProtocolError::UnexpectedPayload { channel: reply }.into())
    }

    fn defer_resolution(&self, packet: Packet, resolution: Resolution) {
        let agent = self.clone();
        let _ = tokio::spawn(async move {
            let key = agent.key();
            let (text, kind) = match &resolution {
                Resolution::EmptyQuestion => {
                    (format!("{key} cannot answer an empty question"), "empty")
                }
                Resolution::MethodNotFound(method) => {
                    (format!("{key} {method} is not a valid method"), method.as_str())
                }
                Resolution::NotRunning(method) => {
                    (format!("{} is OFFLINE", agent.name()), method.as_str())
                }
            };
            debug!(key, text = %text, "question resolved without capability");
            let answer = Answer::new(agent.profile(), text, AnswerMeta::new(key, kind));
            agent.publish_answer(packet, answer);
        });
    }

    fn publish_outcome(&self, packet: Packet, method: &str, outcome: Result<MethodReply>) {
        let key = self.key();
        let meta = AnswerMeta::new(key, method);
        let answer = match outcome {
            Ok(reply) => {
                let text = reply
                    .text
                    .unwrap_or_else(|| format!("{}{key} {method}", channels::ADDRESS_MARKER));
                Answer::new(self.profile(), text, meta).data(reply.data)
            }
            Err(err) => {
                let message = format!("{err:#}");
                warn!(key, method, error = %message, "capability failed");
                let origin = format!("{}{key}:question", channels::ADDRESS_MARKER);
                self.talk(
                    channels::ERROR,
                    ErrorReport::new(origin, message.clone()).packet(packet.clone()),
                );
                let text = format!("{}{key} {method}", channels::ADDRESS_MARKER);
                Answer::new(self.profile(), text, meta).error(message)
            }
        };
        self.publish_answer(packet, answer);
    }

    fn publish_answer(&self, mut packet: Packet, answer: Answer) {
        packet.answered = Some(Utc::now());
        packet.a = Some(answer);
        let channel = channels::answer(self.key(), &packet.id);
        self.talk(&channel, BusPayload::packet(packet));
    }

    // --- composition ------------------------------------------------------

    /// Idempotent orchestration entrypoint: inherit pass, bind pass,
    /// standard channel subscriptions, optional recursion into children,
    /// `on_init` hook.
    ///
    /// Failures are contained: they are broadcast on the `error` channel and
    /// logged, never propagated to the caller (best-effort startup).
    pub fn init(&self, recurse: bool) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>> {
        let agent = self.clone();
        Box::pin(async move { agent.run_init(recurse).await })
    }

    async fn run_init(&self, recurse: bool) {
        if self.inner.initialized.swap(true, Ordering::SeqCst) {
            debug!(key = %self.key(), "init skipped, already initialized");
            return;
        }
        if let Err(err) = self.wire(recurse).await {
            let message = format!("{err:#}");
            error!(key = %self.key(), error = %message, "agent initialization failed");
            self.talk(
                channels::ERROR,
                ErrorReport::new(format!("#{}:init", self.key()), message),
            );
        }
    }

    async fn wire(&self, recurse: bool) -> Result<()> {
        self.assign_inherit();
        self.assign_listeners();
        if recurse {
            let children: Vec<Agent> = self.inner.children.lock().values().cloned().collect();
            for child in children {
                child.init(true).await;
            }
        }
        if let Some(hook) = self.inner.hooks.on_init.clone() {
            hook.run(self.clone()).await?;
        }
        debug!(key = %self.key(), "agent initialized");
        Ok(())
    }

    /// Inherit pass: push reference-copies of this agent's bus, config and
    /// library onto every child, overwriting whatever the child had.
    fn assign_inherit(&self) {
        let bus = self.bus();
        let config = self.config();
        let lib = self.lib();
        for child in self.inner.children.lock().values() {
            child.adopt(bus.clone(), config.clone(), lib.clone());
        }
    }

    pub(crate) fn adopt(&self, bus: EventBus, config: Store, lib: Library) {
        *self.inner.bus.lock() = bus;
        *self.inner.config.lock() = config;
        *self.inner.lib.lock() = lib;
    }

    /// Bind pass: subscribe the standard channels and every custom listener,
    /// each serviced by a task holding this agent as its pinned context.
    fn assign_listeners(&self) {
        let key = self.key();

        self.spawn_route(&channels::question(key), |agent, event| async move {
            match event.payload.into_packet() {
                Some(packet) => agent.question(packet).await,
                None => {
                    warn!(key = %agent.key(), "non-packet payload on question channel");
                }
            }
        });
        self.spawn_route(&channels::start(key), |agent, _event| async move {
            agent.start().await;
        });
        self.spawn_route(&channels::stop(key), |agent, _event| async move {
            agent.stop().await;
        });
        self.spawn_route(&channels::status(key), |agent, _event| async move {
            let _ = agent.status();
        });
        self.spawn_route(channels::LOADED, |agent, _event| async move {
            agent
                .run_hook(agent.inner.hooks.on_loaded.clone(), "loaded")
                .await;
        });
        self.spawn_route(channels::LOGOUT, |agent, _event| async move {
            agent
                .run_hook(agent.inner.hooks.on_logout.clone(), "logout")
                .await;
            if agent.running() {
                agent.stop().await;
            }
        });

        let custom: Vec<(String, Arc<dyn Listener>)> =
            self.inner.listeners.lock().iter().cloned().collect();
        for (channel, listener) in custom {
            let guard = self.listen(&channel, listener);
            // Standard teardown covers these; the guard is only for ignore().
            drop(guard);
        }
    }

    /// Subscribe a channel and service it from a spawned task. The task
    /// holds only a weak reference between events, so an abandoned agent
    /// winds down instead of leaking.
    fn spawn_route<F, Fut>(&self, channel: &str, handler: F) -> tokio::task::AbortHandle
    where
        F: Fn(Agent, BusEvent) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut stream: BusStream = self.bus().subscribe(channel);
        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            while let Some(event) = stream.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                handler(Agent { inner }, event).await;
            }
        });
        let abort = task.abort_handle();
        self.inner.tasks.lock().push(task);
        abort
    }
}

/// Handle to one attached listener; pass to [`Agent::ignore`] to detach it.
pub struct ListenerGuard {
    abort: tokio::task::AbortHandle,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::AgentBuilder;
    use crate::traits::{MethodReply, hook_fn, listener_fn, method_fn};
    use anyhow::{Result, bail};
    use loka_protocol::PacketId;
    use serde_json::json;
    use std::time::Duration;

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    fn hello_builder(bus: &EventBus) -> AgentBuilder {
        AgentBuilder::new(AgentProfile::new("hello", "Hello World").describe("greets the bus"))
            .bus(bus.clone())
            .vars(json!({"greeting": "Hello World"}))
            .method(
                "hello",
                method_fn(|agent: Agent, _packet| async move {
                    let greeting = agent
                        .vars()
                        .pointer("/greeting")
                        .and_then(|value| value.as_str().map(str::to_owned))
                        .unwrap_or_default();
                    Ok(MethodReply::text(greeting))
                }),
            )
            .method(
                "start",
                method_fn(|agent: Agent, _packet| async move {
                    agent.start().await;
                    Ok(MethodReply::text("starting"))
                }),
            )
            .method(
                "fail",
                method_fn(|_agent, _packet| async { bail!("exploded") }),
            )
    }

    async fn hello_agent(bus: &EventBus) -> Result<Agent> {
        let agent = hello_builder(bus).build()?;
        agent.init(false).await;
        Ok(agent)
    }

    #[tokio::test]
    async fn running_agent_answers_on_the_correlation_channel() -> Result<()> {
        let bus = EventBus::new();
        let agent = hello_agent(&bus).await?;
        agent.start().await;

        let packet = Packet::with_id(PacketId::from_string("42"), "hello");
        let reply = channels::answer("hello", &packet.id);
        let event = bus
            .call(&channels::question("hello"), &reply, BusPayload::packet(packet))
            .await?;
        assert_eq!(event.channel, "hello:question:42");

        let answered = event.payload.into_packet().expect("packet payload");
        let answer = answered.a.expect("answer populated");
        assert_eq!(answer.text, "Hello World");
        assert!(answer.error.is_none());
        assert!(answered.asked.is_some());
        assert!(answered.answered.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn unknown_method_is_a_normal_answer_not_an_error() -> Result<()> {
        let bus = EventBus::new();
        let agent = hello_agent(&bus).await?;
        agent.start().await;

        let answered = agent.ask("bogus arg1").await?;
        let answer = answered.a.expect("answer populated");
        assert_eq!(answer.text, "hello bogus is not a valid method");
        assert!(answer.error.is_none());
        assert!(answer.data.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn stopped_agent_answers_offline_without_error() -> Result<()> {
        let bus = EventBus::new();
        let agent = hello_agent(&bus).await?;

        let answered = agent.ask("hello").await?;
        let answer = answered.a.expect("answer populated");
        assert_eq!(answer.text, "Hello World is OFFLINE");
        assert!(answer.error.is_none());
        assert!(answer.data.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn start_method_is_dispatchable_while_stopped() -> Result<()> {
        let bus = EventBus::new();
        let agent = hello_agent(&bus).await?;
        assert!(!agent.running());

        let answered = agent.ask("start").await?;
        assert_eq!(answered.a.expect("answer populated").text, "starting");
        assert!(agent.running());
        Ok(())
    }

    #[tokio::test]
    async fn empty_question_is_a_distinct_normal_outcome() -> Result<()> {
        let bus = EventBus::new();
        let agent = hello_agent(&bus).await?;
        agent.start().await;

        let answered = agent.ask("   ").await?;
        let answer = answered.a.expect("answer populated");
        assert_eq!(answer.text, "hello cannot answer an empty question");
        assert!(answer.error.is_none());
        assert!(answer.data.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn handler_failure_sets_error_and_broadcasts_a_report() -> Result<()> {
        let bus = EventBus::new();
        let agent = hello_agent(&bus).await?;
        agent.start().await;

        let mut errors = bus.subscribe(channels::ERROR);
        let answered = agent.ask("fail boom").await?;
        let answer = answered.a.expect("answer populated");
        assert!(answer.data.is_none());
        assert_eq!(answer.text, "#hello fail");
        let message = answer.error.expect("handler failure recorded");
        assert!(message.contains("exploded"));

        let event = errors.recv().await.expect("error broadcast");
        let report = event.payload.as_error().expect("error report");
        assert_eq!(report.origin, "#hello:question");
        assert_eq!(report.id, Some(answered.id.clone()));
        assert!(report.packet.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn start_emits_one_status_before_the_on_start_hook() -> Result<()> {
        let bus = EventBus::new();
        let agent = hello_builder(&bus)
            .on_start(hook_fn(|agent: Agent| async move {
                agent.talk(channels::STATUS, json!("hook-ran"));
                Ok(())
            }))
            .build()?;
        agent.init(false).await;

        let mut status = bus.subscribe(channels::STATUS);
        agent.start().await;

        let first = status.recv().await.expect("status event");
        let report = first.payload.as_status().expect("status report");
        assert!(report.running);
        assert_eq!(report.text, "hello RUNNING");
        let second = status.recv().await.expect("hook sentinel");
        assert!(matches!(second.payload, BusPayload::Value(ref v) if v == "hook-ran"));

        // Repeated start is a no-op: the next event is our own fence, not a
        // duplicate status report.
        agent.start().await;
        bus.emit(channels::STATUS, json!("fence"));
        let third = status.recv().await.expect("fence");
        assert!(matches!(third.payload, BusPayload::Value(ref v) if v == "fence"));
        Ok(())
    }

    #[tokio::test]
    async fn stop_start_round_trip_restores_dispatch() -> Result<()> {
        let bus = EventBus::new();
        let agent = hello_agent(&bus).await?;

        agent.start().await;
        agent.stop().await;
        assert!(!agent.running());

        let offline = agent.ask("hello").await?;
        assert_eq!(offline.a.expect("answer").text, "Hello World is OFFLINE");

        agent.start().await;
        assert!(agent.running());
        let answered = agent.ask("hello").await?;
        assert_eq!(answered.a.expect("answer").text, "Hello World");
        Ok(())
    }

    #[tokio::test]
    async fn init_shares_parent_resources_and_binds_child_context() -> Result<()> {
        let bus = EventBus::new();
        let child = AgentBuilder::new(AgentProfile::new("child", "Child"))
            .method(
                "who",
                method_fn(|agent: Agent, _packet| async move {
                    Ok(MethodReply::data(json!({
                        "key": agent.key(),
                        "api": agent.config().pointer("/ports/api"),
                    })))
                }),
            )
            .build()?;
        let parent = AgentBuilder::new(AgentProfile::new("parent", "Parent"))
            .bus(bus.clone())
            .config(json!({}))
            .child("child", child.clone())
            .build()?;

        // Mutations through the shared handle before init must be visible to
        // the child afterwards.
        parent.config().replace(json!({"ports": {"api": 8080}}));
        parent.init(true).await;

        assert!(child.config().shares_with(&parent.config()));
        child.start().await;
        let answered = child.ask("who").await?;
        let data = answered.a.expect("answer").data.expect("data");
        assert_eq!(data["key"], "child");
        assert_eq!(data["api"], 8080);
        Ok(())
    }

    #[tokio::test]
    async fn init_failure_is_contained_and_reported() -> Result<()> {
        let bus = EventBus::new();
        let agent = hello_builder(&bus)
            .on_init(hook_fn(|_agent: Agent| async { bail!("bad wiring") }))
            .build()?;

        let mut errors = bus.subscribe(channels::ERROR);
        agent.init(false).await;

        let event = errors.recv().await.expect("init failure broadcast");
        let report = event.payload.as_error().expect("error report");
        assert_eq!(report.origin, "#hello:init");
        assert!(report.error.contains("bad wiring"));

        // The channel subscriptions made before the failing hook survive.
        agent.start().await;
        let answered = agent.ask("hello").await?;
        assert_eq!(answered.a.expect("answer").text, "Hello World");
        Ok(())
    }

    #[tokio::test]
    async fn repeated_init_does_not_double_subscribe() -> Result<()> {
        let bus = EventBus::new();
        let agent = hello_agent(&bus).await?;
        agent.init(false).await;
        agent.start().await;

        let packet = Packet::with_id(PacketId::from_string("7"), "hello");
        let reply = channels::answer("hello", &packet.id);
        let mut replies = bus.subscribe(&reply);
        bus.emit(&channels::question("hello"), BusPayload::packet(packet));

        let first = replies.recv().await.expect("one answer");
        assert!(first.payload.into_packet().expect("packet").is_answered());

        // A second subscription would produce a second answer; give it time
        // to show up, then prove the next event is our fence.
        tokio::time::sleep(Duration::from_millis(50)).await;
        bus.emit(&reply, json!("fence"));
        let next = replies.recv().await.expect("fence");
        assert!(matches!(next.payload, BusPayload::Value(ref v) if v == "fence"));
        Ok(())
    }

    #[tokio::test]
    async fn logout_runs_the_hook_and_stops_a_running_agent() -> Result<()> {
        let bus = EventBus::new();
        let agent = hello_builder(&bus)
            .on_logout(hook_fn(|agent: Agent| async move {
                agent.vars().insert("logged_out", json!(true));
                Ok(())
            }))
            .build()?;
        agent.init(false).await;
        agent.start().await;

        bus.emit(channels::LOGOUT, BusPayload::Empty);
        let probe = agent.clone();
        wait_until(move || !probe.running()).await;
        assert_eq!(agent.vars().pointer("/logged_out"), Some(json!(true)));
        Ok(())
    }

    #[tokio::test]
    async fn per_key_lifecycle_channels_drive_the_state_machine() -> Result<()> {
        let bus = EventBus::new();
        let agent = hello_agent(&bus).await?;

        bus.emit(&channels::start("hello"), BusPayload::Empty);
        let probe = agent.clone();
        wait_until(move || probe.running()).await;

        let mut status = bus.subscribe(channels::STATUS);
        bus.emit(&channels::status("hello"), BusPayload::Empty);
        let event = status.recv().await.expect("status snapshot");
        assert!(event.payload.as_status().expect("status report").running);

        bus.emit(&channels::stop("hello"), BusPayload::Empty);
        let probe = agent.clone();
        wait_until(move || !probe.running()).await;
        Ok(())
    }

    #[tokio::test]
    async fn custom_listeners_run_with_the_agent_as_context() -> Result<()> {
        let bus = EventBus::new();
        let agent = hello_builder(&bus)
            .listener(
                "newsfeed",
                listener_fn(|agent: Agent, event| async move {
                    if let BusPayload::Value(value) = event.payload {
                        agent.vars().insert("last_news", value);
                    }
                    Ok(())
                }),
            )
            .build()?;
        agent.init(false).await;

        assert_eq!(bus.emit("newsfeed", json!("breaking")), 1);
        let probe = agent.clone();
        wait_until(move || probe.vars().pointer("/last_news") == Some(json!("breaking"))).await;
        Ok(())
    }

    #[tokio::test]
    async fn ignored_listeners_detach_from_the_channel() -> Result<()> {
        let bus = EventBus::new();
        let agent = hello_agent(&bus).await?;

        let guard = agent.listen(
            "pings",
            listener_fn(|agent: Agent, _event| async move {
                agent.vars().insert("pinged", json!(true));
                Ok(())
            }),
        );
        assert_eq!(bus.emit("pings", BusPayload::Empty), 1);
        let probe = agent.clone();
        wait_until(move || probe.vars().pointer("/pinged") == Some(json!(true))).await;

        agent.ignore(guard);
        wait_until(move || bus.emit("pings", BusPayload::Empty) == 0).await;
        Ok(())
    }
}
