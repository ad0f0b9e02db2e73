//! Jarvis Sync - drive the Jarvis engine and cloud backends from a terminal.
//!
//! Every command builds one [`AppContext`] from the configuration, runs a
//! store action against the backends and prints the resulting snapshot.
//!
//!   jarvis-sync status                  # Reachability of both backends
//!   jarvis-sync login me@example.com    # Sign in (password from JARVIS_PASSWORD)
//!   jarvis-sync runs -f json            # Recent workflow runs as JSON
//!   jarvis-sync watch-runs              # Live run updates over WebSocket
//!   jarvis-sync chat <conv> "hello"     # Stream an assistant reply

mod cli;

use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands, ConfigAction};
use jarvis_sync::application::{
    format_agents_table, format_bases_table, format_calls_table, format_connections_table,
    format_json, format_metrics, format_results_table, format_run_line, format_runs_table,
    format_session, format_tasks_table, format_tools_table, format_workflows_table, AppContext, OutputFormat,
};
use jarvis_sync::domain::{AuthCredentials, ChatEvent, ExecutionEvent, Priority};
use jarvis_sync::infrastructure::{
    connect_ws, default_config_path, ensure_config_exists, load_config, StreamSignal, WORKFLOW_WS_PATH,
};

fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Main application logic.
fn run(cli: Cli) -> anyhow::Result<()> {
    let format = cli.output_format().map_err(|e| anyhow!(e))?;

    if let Commands::Config { action } = &cli.command {
        return cmd_config(action);
    }

    let config = load_config().context("loading configuration")?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;

    runtime.block_on(async {
        let ctx = AppContext::open(config).context("opening local state")?;
        let result = dispatch(&ctx, cli.command, format).await;
        ctx.shutdown().await;
        result
    })
}

async fn dispatch(ctx: &AppContext, command: Commands, format: OutputFormat) -> anyhow::Result<()> {
    // Commands other than login need the stored token.
    if !matches!(command, Commands::Login { .. }) {
        ctx.auth.restore_session().await;
    }

    match command {
        Commands::Status => cmd_status(ctx, format).await,
        Commands::Monitor { interval } => cmd_monitor(ctx, interval).await,
        Commands::Login {
            identifier,
            password,
            remember,
        } => cmd_login(ctx, identifier, password, remember).await,
        Commands::Logout => {
            ctx.auth.logout().await?;
            println!("{} Signed out", "✓".green().bold());
            Ok(())
        }
        Commands::Whoami => {
            let session = ctx.auth.session();
            match format {
                OutputFormat::Json => println!("{}", format_json(&session.profile)?),
                OutputFormat::Table => println!("{}", format_session(&session)),
            }
            Ok(())
        }
        Commands::Workflows => {
            ctx.workflows.hydrate().await?;
            let workflows = ctx.workflows.snapshot().workflows;
            print_list(format, &workflows, format_workflows_table)
        }
        Commands::Runs { start } => cmd_runs(ctx, start, format).await,
        Commands::WatchRuns => cmd_watch_runs(ctx).await,
        Commands::Record { mode } => cmd_record(ctx, mode.into(), format).await,
        Commands::Tasks => {
            ctx.assistant.hydrate().await?;
            let tasks = ctx.assistant.snapshot().tasks;
            print_list(format, &tasks, format_tasks_table)
        }
        Commands::Plan { query } => {
            let task = ctx.assistant.plan(&query).await?;
            print_list(format, std::slice::from_ref(&task), format_tasks_table)?;
            if format == OutputFormat::Table {
                for (i, step) in task.steps.iter().enumerate() {
                    println!("  {}. [{}] {}", i + 1, step.target_type.cyan(), step.description);
                }
            }
            Ok(())
        }
        Commands::Tools => {
            ctx.tools.hydrate().await?;
            let tools = ctx.tools.snapshot().tools;
            print_list(format, &tools, format_tools_table)
        }
        Commands::Calls => {
            ctx.voice.hydrate().await?;
            let calls = ctx.voice.snapshot().calls;
            print_list(format, &calls, format_calls_table)
        }
        Commands::Agents => {
            ctx.agents.hydrate().await?;
            let agents = ctx.agents.snapshot().agents;
            print_list(format, &agents, format_agents_table)
        }
        Commands::System { scan } => cmd_system(ctx, scan, format).await,
        Commands::Knowledge { query, base } => cmd_knowledge(ctx, query, base, format).await,
        Commands::Chat {
            conversation,
            message,
        } => cmd_chat(ctx, &conversation, &message).await,
        Commands::Config { .. } => Ok(()),
    }
}

fn print_list<T: serde::Serialize>(
    format: OutputFormat,
    items: &[T],
    table: fn(&[T]) -> String,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", format_json(items)?),
        OutputFormat::Table => println!("{}", table(items)),
    }
    Ok(())
}

/// Check both backends once.
async fn cmd_status(ctx: &AppContext, format: OutputFormat) -> anyhow::Result<()> {
    let states = ctx.monitor.recheck_now().await;
    print_list(format, &states, format_connections_table)?;

    if format == OutputFormat::Table {
        let session = ctx.auth.session();
        println!();
        println!("{}", format_session(&session));
    }
    Ok(())
}

fn monitor_banner(interval: Duration) -> String {
    format!("{} Monitoring every {interval:?} (Ctrl-C to stop)", "📡".bold())
}

/// Print reachability changes until Ctrl-C.
async fn cmd_monitor(ctx: &AppContext, interval: Option<u64>) -> anyhow::Result<()> {
    let interval = interval.map_or_else(
        || Duration::from_millis(ctx.config.monitor.interval_ms),
        Duration::from_secs,
    );
    let mut changes = ctx.monitor.subscribe();
    ctx.monitor.start_monitoring(interval).await;
    println!("{}", monitor_banner(interval));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            change = changes.recv() => match change {
                Ok(change) if change.reachable => {
                    println!("{} {} recovered", "✓".green().bold(), change.id);
                }
                Ok(change) => {
                    println!("{} {} unreachable", "✗".red().bold(), change.id);
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    ctx.monitor.stop_monitoring().await;
    println!("{}", format_connections_table(&ctx.monitor.status()));
    Ok(())
}

async fn cmd_login(
    ctx: &AppContext,
    identifier: String,
    password: String,
    remember: bool,
) -> anyhow::Result<()> {
    let credentials = AuthCredentials {
        identifier,
        password,
        remember_me: remember,
    };
    let profile = ctx.auth.login(&credentials).await?;
    println!(
        "{} Signed in as {} <{}>",
        "✓".green().bold(),
        profile.name.cyan(),
        profile.email
    );
    Ok(())
}

async fn cmd_runs(
    ctx: &AppContext,
    start: Option<String>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let Some(workflow_id) = start else {
        ctx.executions.hydrate().await?;
        let runs = ctx.executions.snapshot().runs;
        return print_list(format, &runs, format_runs_table);
    };

    ctx.workflows.hydrate().await?;
    let workflow = ctx
        .workflows
        .snapshot()
        .workflows
        .into_iter()
        .find(|w| w.id == workflow_id)
        .ok_or_else(|| anyhow!("Workflow not found: {workflow_id}"))?;

    match ctx
        .executions
        .start_run(&workflow, HashMap::new(), Priority::default())
        .await?
    {
        Some(run) => println!("{} Started {}", "✓".green().bold(), format_run_line(&run)),
        None => println!("{} Run of {} accepted", "✓".green().bold(), workflow.name),
    }
    Ok(())
}

/// Follow the workflow channel and print each run update.
async fn cmd_watch_runs(ctx: &AppContext) -> anyhow::Result<()> {
    let url = format!("{}{WORKFLOW_WS_PATH}", ctx.config.engine_ws_base());
    let mut events = connect_ws::<ExecutionEvent>(&url).await?;
    println!("{} Watching runs (Ctrl-C to stop)", "👀".bold());

    loop {
        let signal = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            signal = events.next() => signal,
        };
        match signal {
            Some(StreamSignal::Event(event)) => {
                match &event {
                    ExecutionEvent::Run(run) => println!("{}", format_run_line(run)),
                    ExecutionEvent::Log(log) => {
                        println!("  {} {} {}", log.node_id.dimmed(), log.status, log.message);
                    }
                }
                ctx.executions.apply_event(event);
            }
            Some(StreamSignal::Failed(reason)) => return Err(anyhow!("run channel failed: {reason}")),
            Some(StreamSignal::Completed) | None => break,
        }
    }

    events.shutdown().await;
    Ok(())
}

/// Record until Enter, then print the captured steps.
async fn cmd_record(
    ctx: &AppContext,
    mode: jarvis_sync::domain::RecorderMode,
    format: OutputFormat,
) -> anyhow::Result<()> {
    ctx.recorder.start_recording(mode).await?;
    let listener = match ctx.recorder.watch(&ctx.config.engine_ws_base()).await {
        Ok(listener) => Some(listener),
        Err(e) => {
            tracing::warn!(error = %e, "Live recorder events unavailable");
            None
        }
    };

    println!("{} Recording... press Enter to stop", "⏺".red().bold());
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)
    })
    .await
    .context("waiting for input")?
    .context("reading stdin")?;

    let stopped = ctx.recorder.stop_recording().await;
    if let Some(listener) = listener {
        listener.stop();
        listener.join().await;
    }
    let steps = stopped?;

    match format {
        OutputFormat::Json => println!("{}", format_json(&steps)?),
        OutputFormat::Table => {
            println!("{} Captured {} step(s)", "✓".green().bold(), steps.len());
            for (i, step) in steps.iter().enumerate() {
                println!("  {}. {} {}", i + 1, step.action.cyan(), step.target);
            }
        }
    }
    Ok(())
}

async fn cmd_system(ctx: &AppContext, scan: bool, format: OutputFormat) -> anyhow::Result<()> {
    let metrics = ctx.system.load_status().await?;
    if !scan {
        match format {
            OutputFormat::Json => println!("{}", format_json(&metrics)?),
            OutputFormat::Table => println!("{}", format_metrics(&metrics)),
        }
        return Ok(());
    }

    let software = ctx.system.scan_software().await?;
    match format {
        OutputFormat::Json => println!("{}", format_json(&software)?),
        OutputFormat::Table => {
            println!("{}", format_metrics(&metrics));
            println!();
            for item in &software {
                println!("  {} {} ({})", item.name.cyan(), item.version, item.publisher);
            }
        }
    }
    Ok(())
}

async fn cmd_knowledge(
    ctx: &AppContext,
    query: Option<String>,
    bases: Vec<String>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let Some(query) = query else {
        ctx.knowledge.hydrate().await?;
        let bases = ctx.knowledge.snapshot().bases;
        return print_list(format, &bases, format_bases_table);
    };

    let bases = if bases.is_empty() {
        ctx.knowledge.hydrate().await?;
        ctx.knowledge
            .snapshot()
            .bases
            .into_iter()
            .map(|b| b.id)
            .collect()
    } else {
        bases
    };
    let results = ctx.knowledge.search(&bases, &query).await?;
    print_list(format, &results, format_results_table)
}

/// Stream a chat reply to stdout token by token.
async fn cmd_chat(ctx: &AppContext, conversation: &str, message: &str) -> anyhow::Result<()> {
    let mut reply = ctx.stream_chat(conversation, message);
    let mut stdout = std::io::stdout();

    loop {
        let signal = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            signal = reply.next() => signal,
        };
        match signal {
            Some(StreamSignal::Event(ChatEvent::Token { content })) => {
                print!("{content}");
                stdout.flush().context("writing to stdout")?;
            }
            Some(StreamSignal::Event(ChatEvent::Error { message })) => {
                return Err(anyhow!(message.unwrap_or_else(|| "chat failed".to_string())));
            }
            Some(StreamSignal::Event(ChatEvent::Done { .. }) | StreamSignal::Completed) | None => {
                break;
            }
            Some(StreamSignal::Event(ChatEvent::Start { .. })) => {}
            Some(StreamSignal::Failed(reason)) => return Err(anyhow!("chat stream failed: {reason}")),
        }
    }

    println!();
    reply.shutdown().await;
    Ok(())
}

fn cmd_config(action: &ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            if ensure_config_exists()? {
                println!("{} Wrote default configuration", "✓".green().bold());
            } else {
                println!("Configuration already exists");
            }
        }
        ConfigAction::Show => {
            let config = load_config()?;
            println!(
                "{} {}",
                "#".dimmed(),
                default_config_path().display().to_string().dimmed()
            );
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

/// Setup tracing/logging based on verbosity level.
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr).without_time())
        .with(filter)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_banner_keeps_sub_second_intervals() {
        assert!(monitor_banner(Duration::from_millis(500)).contains("every 500ms"));
        assert!(monitor_banner(Duration::from_secs(30)).contains("every 30s"));
    }
}
