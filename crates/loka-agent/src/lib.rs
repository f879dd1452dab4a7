//! # loka-agent — the agent runtime
//!
//! An [`Agent`] is a long-lived, addressable unit: it exposes named
//! capabilities ("methods"), shares one [`EventBus`](loka_bus::EventBus)
//! with the rest of its tree, and answers question packets asynchronously
//! on per-packet correlation channels.
//!
//! ## Module overview
//!
//! - [`agent`] — the Agent itself: lifecycle, question dispatch, composition
//! - [`builder`] — [`AgentBuilder`] and the lifecycle [`Hooks`]
//! - [`registry`] — [`MethodRegistry`], the capability table
//! - [`state`] — [`Store`] and [`Library`], the reference-shared resources
//! - [`traits`] — the [`Method`]/[`Listener`]/[`Hook`] handler contracts
//!
//! ## A minimal agent
//!
//! ```no_run
//! use loka_agent::{AgentBuilder, MethodReply, method_fn};
//! use loka_bus::EventBus;
//! use loka_protocol::AgentProfile;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let bus = EventBus::new();
//! let agent = AgentBuilder::new(AgentProfile::new("hello", "Hello World"))
//!     .bus(bus.clone())
//!     .method(
//!         "hello",
//!         method_fn(|_agent, _packet| async { Ok(MethodReply::text("Hello World")) }),
//!     )
//!     .build()?;
//! agent.init(false).await;
//! agent.start().await;
//!
//! let answered = agent.ask("hello").await?;
//! assert_eq!(answered.a.unwrap().text, "Hello World");
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod builder;
pub mod registry;
pub mod state;
pub mod traits;

pub use agent::{Agent, ListenerGuard};
pub use builder::{AgentBuilder, Hooks};
pub use registry::MethodRegistry;
pub use state::{Helper, Library, Store};
pub use traits::{Hook, Listener, Method, MethodReply, hook_fn, listener_fn, method_fn};
