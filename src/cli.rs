use crate::console::{spawn_stdin_listener, Console};
use crate::error::LaunchError;
use crate::model::{now_rfc3339, ProbeReport, Readiness, SupervisorConfig};
use crate::orchestrator::{run_controller, spawn_shutdown_hook, SessionEnd};
use crate::supervisor::{wait_until_ready, HealthProbe, ReadinessParams, Supervisor};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "devmatch-launcher",
    version,
    about = "Starts the DevMatch AI worker, waits for it to answer HTTP, and supervises it"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Worker script, relative to --workdir
    #[arg(long, default_value = "app.py", global = true)]
    pub entry_point: PathBuf,

    /// Interpreter of the project-local isolated environment, preferred when present
    #[arg(long, default_value = ".venv/bin/python", global = true)]
    pub venv_interpreter: PathBuf,

    /// Interpreter used when no isolated environment exists
    #[arg(long, default_value = "python3", global = true)]
    pub interpreter: String,

    /// Directory the worker runs in
    #[arg(long, default_value = ".", global = true)]
    pub workdir: PathBuf,

    /// Host the worker listens on
    #[arg(long, default_value = "localhost", global = true)]
    pub host: String,

    /// Port the worker listens on
    #[arg(long, env = "PORT", default_value_t = 3000, global = true)]
    pub port: u16,

    /// Health checks before giving up on startup
    #[arg(long, default_value_t = 30, global = true)]
    pub startup_attempts: u32,

    /// Delay between health checks
    #[arg(long, default_value = "1s", global = true)]
    pub poll_interval: humantime::Duration,

    /// Timeout of a single health check
    #[arg(long, default_value = "2s", global = true)]
    pub probe_timeout: humantime::Duration,

    /// Time a worker gets to exit after a termination request before it is killed
    #[arg(long, default_value = "5s", global = true)]
    pub grace_period: humantime::Duration,

    /// Pause between stopping and relaunching on restart
    #[arg(long, default_value = "2s", global = true)]
    pub restart_cooldown: humantime::Duration,

    /// Log file (defaults to the user's local data directory)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Skip the startup banner
    #[arg(long)]
    pub no_banner: bool,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Check whether the worker answers HTTP, without launching it
    Probe {
        /// Print a JSON report
        #[arg(long)]
        json: bool,

        /// Keep probing up to --startup-attempts times instead of once
        #[arg(long)]
        wait: bool,
    },
    /// Signal leftover worker processes
    Kill {
        #[command(subcommand)]
        target: KillTarget,
    },
}

#[derive(Debug, Subcommand, Clone)]
pub enum KillTarget {
    /// Ask a process to exit (SIGTERM)
    Pid { pid: u32 },
    /// Kill a process immediately (SIGKILL)
    Force { pid: u32 },
    /// SIGTERM every process whose command line matches a pattern
    Name { pattern: String },
}

impl Cli {
    pub fn health_url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }
}

/// Build a `SupervisorConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> SupervisorConfig {
    SupervisorConfig {
        entry_point: args.entry_point.clone(),
        venv_interpreter: args.venv_interpreter.clone(),
        system_interpreter: args.interpreter.clone(),
        working_dir: args.workdir.clone(),
        health_url: args.health_url(),
        startup_attempts: args.startup_attempts,
        poll_interval: Duration::from(args.poll_interval),
        probe_timeout: Duration::from(args.probe_timeout),
        grace_period: Duration::from(args.grace_period),
        restart_cooldown: Duration::from(args.restart_cooldown),
    }
}

const WRITER_DRAIN: Duration = Duration::from_secs(2);

pub async fn run(args: Cli, log_path: Option<PathBuf>) -> Result<()> {
    match args.command.clone() {
        Some(Command::Probe { json, wait }) => run_probe(&args, json, wait).await,
        Some(Command::Kill { target }) => run_kill(target),
        None => {
            let (console, writer) = Console::spawn();
            let res = run_supervisor(&args, log_path, &console).await;
            if let Err(e) = &res {
                tracing::error!(error = %format!("{e:#}"), "launcher failed");
            }
            console.flush().await;
            drop(console);
            // Relay tasks of a worker whose pipes are inherited elsewhere can keep the writer
            // open; don't wait on them forever.
            if tokio::time::timeout(WRITER_DRAIN, writer).await.is_err() {
                tracing::warn!("console writer still open at exit");
            }
            res
        }
    }
}

fn print_banner(console: &Console, log_path: Option<&PathBuf>) {
    console.out("===========================================");
    console.out(format!(
        "   DevMatch AI - Worker Launcher v{}",
        env!("CARGO_PKG_VERSION")
    ));
    if let Some(p) = log_path {
        console.out(format!("   Log: {}", p.display()));
    }
    console.out("===========================================");
    console.out("");
}

async fn run_supervisor(args: &Cli, log_path: Option<PathBuf>, console: &Console) -> Result<()> {
    let cfg = build_config(args);
    tracing::info!(config = ?cfg, "launcher starting");
    if !args.no_banner {
        print_banner(console, log_path.as_ref());
    }

    let shutdown = CancellationToken::new();
    let supervisor = Arc::new(
        Supervisor::new(cfg, console.clone(), shutdown.clone())
            .context("failed to initialize supervisor")?,
    );
    let hook = spawn_shutdown_hook(supervisor.clone(), console.clone(), shutdown.clone());

    let res = start_and_serve(supervisor, console, shutdown).await;
    // `start_and_serve` leaves no worker behind, so the hook has nothing left to finish.
    // Awaiting the aborted task releases its console and supervisor handles.
    hook.abort();
    let _ = hook.await;
    res
}

async fn start_and_serve(
    supervisor: Arc<Supervisor>,
    console: &Console,
    shutdown: CancellationToken,
) -> Result<()> {
    console.out("Starting worker...");
    match supervisor.launch().await {
        Ok(_) => {}
        // A signal arrived before the worker was started; nothing to clean up.
        Err(LaunchError::Interrupted) => return Ok(()),
        Err(e) => return Err(e).context("could not start the worker"),
    }

    console.out("Waiting for the worker to become ready");
    let url = supervisor.config().health_url.clone();
    match supervisor
        .wait_until_ready(supervisor.config().startup_attempts)
        .await
    {
        Readiness::Ready { .. } => {
            console.out("Worker is up!");
            console.out(format!("Open: {url}"));
        }
        Readiness::TimedOut { attempts } => {
            supervisor.stop().await;
            bail!("worker did not answer {url} after {attempts} attempt(s)");
        }
        Readiness::WorkerExited { .. } => {
            supervisor.stop().await;
            bail!(
                "{url} answers but the launched worker exited; another process holds the port. \
                 Stop stray workers with `devmatch-launcher kill name {}`",
                supervisor.config().entry_point.display()
            );
        }
        Readiness::Interrupted => {
            // The hook is stopping the worker; wait for it to finish before exiting.
            supervisor.stop().await;
            return Ok(());
        }
    }

    let input = spawn_stdin_listener();
    let end = run_controller(supervisor, console.clone(), input, shutdown).await;
    if end == SessionEnd::InputClosed {
        console.out("Input closed, worker stopped.");
    }
    Ok(())
}

async fn run_probe(args: &Cli, json: bool, wait: bool) -> Result<()> {
    let cfg = build_config(args);
    let probe = HealthProbe::new(cfg.health_url.clone(), cfg.probe_timeout)?;

    let (responding, attempts) = if wait {
        let shutdown = CancellationToken::new();
        let ctrl_c = shutdown.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            ctrl_c.cancel();
        });
        let outcome = wait_until_ready(
            ReadinessParams {
                probe: &probe,
                attempts: cfg.startup_attempts,
                interval: cfg.poll_interval,
                shutdown: &shutdown,
            },
            |_| {},
        )
        .await;
        match outcome {
            Readiness::Ready { attempts } => (true, Some(attempts)),
            Readiness::TimedOut { attempts } | Readiness::WorkerExited { attempts } => {
                (false, Some(attempts))
            }
            Readiness::Interrupted => bail!("probe interrupted"),
        }
    } else {
        (probe.is_responding().await, None)
    };

    let report = ProbeReport {
        url: cfg.health_url,
        responding,
        attempts,
        checked_at: now_rfc3339(),
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in crate::text_summary::build_probe_summary(&report).lines {
            println!("{line}");
        }
    }

    if !responding {
        bail!("worker is not responding at {}", report.url);
    }
    Ok(())
}

fn run_kill(target: KillTarget) -> Result<()> {
    match target {
        KillTarget::Pid { pid } => {
            crate::reaper::terminate(pid)?;
            println!("Process {pid} asked to terminate");
        }
        KillTarget::Force { pid } => {
            crate::reaper::force_kill(pid)?;
            println!("Process {pid} killed");
        }
        KillTarget::Name { pattern } => {
            let result = crate::reaper::terminate_matching(&pattern)?;
            for (pid, e) in &result.failed {
                eprintln!("PID {pid}: {e}");
            }
            if result.terminated.is_empty() && result.failed.is_empty() {
                bail!("no processes match '{pattern}'");
            }
            println!(
                "Terminated {} process(es) matching '{pattern}'",
                result.terminated.len()
            );
            if result.terminated.is_empty() {
                bail!("no matching process could be terminated");
            }
        }
    }
    Ok(())
}
