//! Hive - 命令行对话入口
//!
//! 初始化日志、加载配置并构建 Agent，然后逐行读取标准输入。
//! 每轮对话有独立的取消令牌，回合进行中按 Ctrl+C 只取消当前回合；在提示符处按 Ctrl+C 退出。

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use futures_util::StreamExt;
use hive::agent::Agent;
use hive::config::{load_config, AgentMode};
use hive::core::AgentError;
use hive::memory::{ConversationMemory, Message};
use hive::observability;
use hive::react::ReactEvent;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    let agent = Agent::from_config(&cfg).context("Failed to create agent")?;
    let max_turns = cfg.app.max_context_turns;
    let name = cfg.app.name.clone().unwrap_or_else(|| "hive".to_string());

    println!(
        "{name} chatbot [{} mode] (type 'quit' to exit)",
        match agent.mode() {
            AgentMode::Pipeline => "pipeline",
            AgentMode::React => "react",
        }
    );

    let mut memory = ConversationMemory::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("You: ");
        std::io::stdout().flush().context("Failed to flush stdout")?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input.to_lowercase().as_str(), "quit" | "exit") {
            println!("Exiting. Goodbye!");
            break;
        }

        memory.push(Message::user(input));

        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let span = tracing::info_span!("turn", turn_id = %uuid::Uuid::new_v4());
        let reply = run_turn(&agent, input, memory.recent(max_turns), &cancel)
            .instrument(span)
            .await;
        watcher.abort();

        memory.push(Message::assistant(reply));
        println!("{}", "-".repeat(40));
    }

    Ok(())
}

async fn run_turn(
    agent: &Agent,
    input: &str,
    history: &[Message],
    cancel: &CancellationToken,
) -> String {
    match agent.mode() {
        AgentMode::React => react_turn(agent, input, history, cancel).await,
        AgentMode::Pipeline if agent.settings().stream_answers => {
            streamed_pipeline_turn(agent, input, history, cancel).await
        }
        AgentMode::Pipeline => {
            let answer = agent.respond(input, history, cancel).await;
            println!("Bot: {answer}");
            answer
        }
    }
}

async fn react_turn(
    agent: &Agent,
    input: &str,
    history: &[Message],
    cancel: &CancellationToken,
) -> String {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(ev) = rx.recv().await {
            print_event(&ev);
        }
    });

    let result = agent
        .run_react_turn_with_events(input, history, cancel, &tx)
        .await;
    drop(tx);
    let _ = printer.await;

    let answer = match result {
        Ok(outcome) => outcome.answer,
        Err(e) => user_facing(e),
    };
    println!("Bot: {answer}");
    answer
}

fn print_event(ev: &ReactEvent) {
    match ev {
        ReactEvent::Step { step, max_steps } => println!("[step {step}/{max_steps}]"),
        ReactEvent::ToolCall { tool, args } => println!("[tool] {tool} {args}"),
        ReactEvent::Observation { text, .. } => println!("[observation] {text}"),
        ReactEvent::ToolFailure { tool, reason } => println!("[tool failed] {tool}: {reason}"),
        ReactEvent::Decision { preview } => tracing::debug!(%preview, "decision"),
        ReactEvent::Finished { .. } => {}
    }
}

/// 两阶段模式：计划、执行后逐片打印回答
async fn streamed_pipeline_turn(
    agent: &Agent,
    input: &str,
    history: &[Message],
    cancel: &CancellationToken,
) -> String {
    let execution = match agent.plan_turn(input, history, cancel).await {
        Ok(plan) if plan.needs_tools() => {
            tracing::info!(?plan, "plan");
            match agent.execute_plan(&plan, cancel).await {
                Ok(exec) => Some(exec),
                Err(e) => return print_failure(e),
            }
        }
        Ok(_) => None,
        Err(e) => return print_failure(e),
    };
    if let Some(exec) = &execution {
        tracing::info!(summary = %exec.summary, "tool output");
    }

    let mut stream = match agent
        .synthesize_answer_stream(input, execution.as_ref(), history, cancel.clone())
        .await
    {
        Ok(s) => s,
        Err(e) => return print_failure(e),
    };

    print!("Bot: ");
    let mut answer = String::new();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(text) => {
                print!("{text}");
                let _ = std::io::stdout().flush();
                answer.push_str(&text);
            }
            Err(e) => {
                let message = user_facing(e.into());
                println!();
                println!("{message}");
                return if answer.is_empty() { message } else { answer };
            }
        }
    }
    println!();
    answer
}

fn print_failure(e: AgentError) -> String {
    let message = user_facing(e);
    println!("Bot: {message}");
    message
}

fn user_facing(e: AgentError) -> String {
    tracing::warn!(error = %e, "turn failed");
    e.user_message()
}
