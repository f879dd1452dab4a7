use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use loka_agent::{Agent, AgentBuilder, MethodReply, hook_fn, method_fn};
use loka_bus::EventBus;
use loka_protocol::{AgentProfile, channels};
use serde_json::json;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "loka-hello")]
#[command(about = "loka agent tree demo")]
struct Cli {
    /// Name used in the greeting answers.
    #[arg(long, default_value = "World")]
    greet: String,
}

fn hello_agent(bus: &EventBus, greet: &str) -> Result<Agent> {
    AgentBuilder::new(
        AgentProfile::new("hello", format!("Hello {greet}")).describe("answers greetings"),
    )
    .bus(bus.clone())
    .vars(json!({ "greet": greet }))
    .method(
        "hello",
        method_fn(|agent: Agent, _packet| async move {
            let who = agent
                .vars()
                .pointer("/greet")
                .and_then(|v| v.as_str().map(str::to_owned))
                .unwrap_or_else(|| "World".to_owned());
            Ok(MethodReply::text(format!("Hello {who}")))
        }),
    )
    .method(
        "uptime",
        method_fn(|agent: Agent, _packet| async move {
            Ok(MethodReply::data(json!({
                "key": agent.key(),
                "running": agent.running(),
            })))
        }),
    )
    .build()
}

fn clock_agent(greet_key: &str) -> Result<Agent> {
    // Child agent: no bus of its own, the parent's inherit pass hands one
    // down at init time.
    let parent_key = greet_key.to_owned();
    AgentBuilder::new(AgentProfile::new("clock", "Clock").describe("tells the time"))
        .method(
            "now",
            method_fn(|_agent: Agent, _packet| async move {
                Ok(MethodReply::text(Utc::now().to_rfc3339()))
            }),
        )
        .on_init(hook_fn(move |agent: Agent| {
            let parent_key = parent_key.clone();
            async move {
                info!(key = %agent.key(), parent = %parent_key, "clock wired");
                Ok(())
            }
        }))
        .build()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .compact()
        .init();

    let cli = Cli::parse();
    let bus = EventBus::new();

    let hello = hello_agent(&bus, &cli.greet)?;
    let clock = clock_agent(hello.key())?;
    hello.add_child("clock", clock.clone());

    // Observe bus-wide status and error traffic while the demo runs.
    let mut status = bus.subscribe(channels::STATUS);
    let status_task = tokio::spawn(async move {
        while let Some(event) = status.recv().await {
            if let Some(report) = event.payload.as_status() {
                info!(text = %report.text, "status");
            }
        }
    });
    let mut errors = bus.subscribe(channels::ERROR);
    let error_task = tokio::spawn(async move {
        while let Some(event) = errors.recv().await {
            if let Some(report) = event.payload.as_error() {
                warn!(origin = %report.origin, error = %report.error, "error");
            }
        }
    });

    hello.init(true).await;
    hello.start().await;
    clock.start().await;

    let answered = hello.ask("hello").await?;
    if let Some(answer) = &answered.a {
        info!(id = %answered.id, text = %answer.text, "hello answered");
    }

    let answered = hello.ask("uptime").await?;
    if let Some(answer) = &answered.a {
        info!(data = %answer.data.clone().unwrap_or_default(), "uptime answered");
    }

    // The child shares the parent's bus, so it is addressable the same way.
    let answered = clock.ask("now").await?;
    if let Some(answer) = &answered.a {
        info!(text = %answer.text, "clock answered");
    }

    // Unknown method: answered normally, error stays unset.
    let answered = hello.ask("bogus").await?;
    if let Some(answer) = &answered.a {
        info!(text = %answer.text, error = ?answer.error, "bogus answered");
    }

    hello.stop().await;
    clock.stop().await;

    tokio::time::sleep(Duration::from_millis(150)).await;
    status_task.abort();
    error_task.abort();

    Ok(())
}
