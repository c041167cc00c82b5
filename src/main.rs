//! syswork - run external processes under supervision.

use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use syswork::command::{CommandSpec, CommandSpecBuilder};
use syswork::worker::{
    exec, EventQueue, StartupStatus, SystemWorker, WorkerEvent, WorkerOptions, WorkerRegistry,
};

#[derive(Parser)]
#[command(
    name = "syswork",
    about = "Run external processes under supervision",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommandArgs {
    /// Working directory for the child.
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Environment overrides, as NAME=VALUE. Repeatable.
    #[arg(long = "env", value_name = "NAME=VALUE")]
    env: Vec<String>,

    /// Kill the child's whole process group on termination.
    #[arg(long)]
    kill_tree: bool,

    /// Quote arguments in the reported command line.
    #[arg(long)]
    quote: bool,

    /// The command to run and its arguments, after `--`.
    #[arg(required = true, last = true)]
    command: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command under supervision, streaming its output.
    Run {
        #[command(flatten)]
        args: CommandArgs,
    },
    /// Run a command to completion and print a JSON report.
    Exec {
        #[command(flatten)]
        args: CommandArgs,

        /// Text fed to the child's stdin before it is closed.
        #[arg(long)]
        stdin: Option<String>,
    },
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run { args } => run_command(args).await,
        Commands::Exec { args, stdin } => exec_command(args, stdin).await,
    }
}

fn build_spec(args: &CommandArgs) -> Result<CommandSpec, String> {
    let mut parts = args.command.iter();
    let Some(program) = parts.next() else {
        return Err("no command given".to_string());
    };
    let mut builder = CommandSpecBuilder::new(program)
        .args(parts.map(String::as_str))
        .quote_arguments_if_needed(args.quote);
    if let Some(dir) = &args.cwd {
        builder = builder.working_dir(dir);
    }
    for entry in &args.env {
        let Some((name, value)) = entry.split_once('=') else {
            return Err(format!("invalid --env \"{entry}\", expected NAME=VALUE"));
        };
        builder = builder.env(name, value);
    }
    Ok(builder.build())
}

fn spawn_kill_on_ctrl_c(registry: &WorkerRegistry) {
    let registry = registry.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, killing all workers");
            registry.kill_all().await;
        }
    });
}

/// Forward one event to the terminal. Returns the exit status once the
/// terminal event arrives.
fn handle_event(event: WorkerEvent) -> Option<Option<i32>> {
    match event {
        WorkerEvent::StdoutData { data, .. } => {
            let mut stdout = std::io::stdout();
            let _ = stdout.write_all(&data);
            let _ = stdout.flush();
            None
        }
        WorkerEvent::StderrData { data, .. } => {
            let mut stderr = std::io::stderr();
            let _ = stderr.write_all(&data);
            let _ = stderr.flush();
            None
        }
        WorkerEvent::Termination { termination, .. } => Some(termination.exit_status),
    }
}

async fn run_command(args: CommandArgs) -> ExitCode {
    let spec = match build_spec(&args) {
        Ok(spec) => spec,
        Err(err) => {
            eprintln!("syswork: {err}");
            return ExitCode::FAILURE;
        }
    };

    let registry = WorkerRegistry::new();
    let (queue, mut events) = EventQueue::channel();
    let options = WorkerOptions {
        kill_process_tree: args.kill_tree,
    };
    let worker = SystemWorker::create(spec, options, &registry, Arc::new(queue));

    spawn_kill_on_ctrl_c(&registry);

    if worker.start().await != StartupStatus::Started {
        eprintln!(
            "syswork: failed to start {}",
            worker.spec().command_line()
        );
        return ExitCode::FAILURE;
    }

    let mut exit_status = None;
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if let Some(status) = handle_event(event) {
                    exit_status = status;
                    break;
                }
            }
            _ = worker.wait(Duration::MAX) => break,
        }
    }
    // Events can still be queued behind the terminal state; flush them.
    while let Ok(event) = events.try_recv() {
        if let Some(status) = handle_event(event) {
            exit_status = status;
        }
    }

    match exit_status {
        Some(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        None => ExitCode::FAILURE,
    }
}

async fn exec_command(args: CommandArgs, stdin: Option<String>) -> ExitCode {
    let spec = match build_spec(&args) {
        Ok(spec) => spec,
        Err(err) => {
            eprintln!("syswork: {err}");
            return ExitCode::FAILURE;
        }
    };

    let registry = WorkerRegistry::new();
    spawn_kill_on_ctrl_c(&registry);
    let options = WorkerOptions {
        kill_process_tree: args.kill_tree,
    };

    match exec(&spec, options, stdin.as_deref().map(str::as_bytes), &registry).await {
        Ok(outcome) => {
            let report = serde_json::json!({
                "command": spec.command_line(),
                "exit_status": outcome.exit_status,
                "stdout": String::from_utf8_lossy(&outcome.stdout),
                "stderr": String::from_utf8_lossy(&outcome.stderr),
            });
            println!("{report:#}");
            match outcome.exit_status {
                Some(0) => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            }
        }
        Err(err) => {
            eprintln!("syswork: {err}");
            ExitCode::FAILURE
        }
    }
}
