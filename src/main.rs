mod cli;
mod cluster;
mod config;
mod coordinator;
mod error;
mod launch;
mod log_reader;
mod notify;
mod orchestrator;
mod picker;
mod resolver;
mod selection;
mod tasks;
#[cfg(test)]
mod testing;
mod types;
mod ui;
mod utils;
mod watch;

use anyhow::Context as _;
use clap::Parser;
use crossterm::style::Stylize;
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, error, info, warn};

use cli::{Backend, Cli, Command};
use cluster::{ClusterQuery, KubeApiQuery, KubectlQuery};
use config::Settings;
use coordinator::{ProcessCoordinator, Readiness, default_scratch_dir};
use error::AttachError;
use launch::{DebugConfiguration, DebugLauncher, FileLauncher, StdoutLauncher};
use crate::notify::{ConsoleNotifier, Notifier};
use orchestrator::{AttachOrchestrator, ReadinessGate};
use picker::{Picker, PromptPicker};
use resolver::Resolver;
use selection::SelectionCache;
use tasks::{ShellTaskRunner, TaskRunner};
use types::Stage;
use ui::TuiPicker;

/// How long a terminated task gets to report its exit before cleanup runs anyway.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Everything a command needs, built once and shared by reference.
struct Services {
    settings: Settings,
    query: Arc<dyn ClusterQuery>,
    cache: Arc<SelectionCache>,
    notifier: Arc<dyn Notifier>,
    resolver: Arc<Resolver>,
    runner: Arc<dyn TaskRunner>,
    coordinator: Arc<ProcessCoordinator>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // The full-screen picker needs an interactive terminal on both ends
    let use_tui =
        !cli.no_tui && std::io::stdout().is_terminal() && std::io::stdin().is_terminal();

    // Initialize tracing subscriber - configure differently for TUI vs stdout mode
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if use_tui {
        // In TUI mode: write logs to a file to avoid corrupting the display
        let log_path = std::env::temp_dir().join("kuba.log");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
        {
            Ok(log_file) => tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(log_file))
                .init(),
            Err(e) => {
                eprintln!(
                    "Warning: Could not open {} for logging: {}",
                    log_path.display(),
                    e
                );
            }
        }
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let settings = Settings::load(&cli.config)?;
    let workspace = std::env::current_dir().context("resolving the working directory")?;

    if let Command::LaunchConfig = cli.command {
        let template = DebugConfiguration::template(&settings.debug.debugger_path);
        return StdoutLauncher.launch(&template).await;
    }

    let services = build_services(&cli, settings, &workspace, use_tui);
    let exit_listener = services.coordinator.spawn_exit_listener();

    let result = match cli.command {
        Command::Attach { launch_file, no_up } => {
            run_attach(&services, launch_file.as_deref(), no_up).await
        }
        Command::Pick { from } => run_pick(&services, from).await,
        Command::Show => {
            run_show(&services).await;
            Ok(())
        }
        Command::Reset => {
            attach_orchestrator(&services, Arc::new(StdoutLauncher), None).reset_selection();
            services.notifier.info("Selection cleared");
            Ok(())
        }
        Command::Up { wait } => run_up(&services, wait).await,
        Command::Build => run_build(&services).await,
        Command::LaunchConfig => Ok(()),
    };

    exit_listener.abort();
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

fn build_services(cli: &Cli, settings: Settings, workspace: &Path, use_tui: bool) -> Services {
    let query: Arc<dyn ClusterQuery> = match cli.backend {
        Backend::Kubectl => Arc::new(KubectlQuery::new()),
        Backend::Api => Arc::new(KubeApiQuery::new()),
    };
    let picker: Arc<dyn Picker> = if use_tui {
        Arc::new(TuiPicker)
    } else {
        Arc::new(PromptPicker)
    };
    let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);
    let cache = Arc::new(SelectionCache::load(&cli.state));
    let resolver = Arc::new(Resolver::new(
        query.clone(),
        picker,
        cache.clone(),
        notifier.clone(),
        settings.resolver_settings(),
    ));
    let runner: Arc<dyn TaskRunner> = Arc::new(ShellTaskRunner::new(
        settings.task_definitions(workspace),
        workspace,
    ));
    let coordinator = Arc::new(ProcessCoordinator::new(
        runner.clone(),
        default_scratch_dir(),
        settings.start_timeout(),
    ));
    debug!("Workspace {}, backend {:?}", workspace.display(), cli.backend);

    Services {
        settings,
        query,
        cache,
        notifier,
        resolver,
        runner,
        coordinator,
    }
}

fn attach_orchestrator(
    services: &Services,
    launcher: Arc<dyn DebugLauncher>,
    gate: Option<ReadinessGate>,
) -> AttachOrchestrator {
    AttachOrchestrator::new(
        services.query.clone(),
        services.cache.clone(),
        services.resolver.clone(),
        services.coordinator.clone(),
        launcher,
        services.notifier.clone(),
        DebugConfiguration::template(&services.settings.debug.debugger_path),
        gate,
    )
}

async fn run_attach(
    services: &Services,
    launch_file: Option<&Path>,
    no_up: bool,
) -> anyhow::Result<()> {
    let launcher: Arc<dyn DebugLauncher> = match launch_file {
        Some(path) => Arc::new(FileLauncher::new(path)),
        None => Arc::new(StdoutLauncher),
    };
    let gate = if services.settings.tilt.up_before_attach && !no_up {
        Some(ReadinessGate {
            task_name: services.settings.tilt.task_name.clone(),
            ready_pattern: services.settings.ready_pattern()?,
            poll_timeout: services.settings.poll_interval(),
        })
    } else {
        None
    };
    let orchestrator = attach_orchestrator(services, launcher, gate);

    let outcome = match orchestrator.attach().await {
        Ok(outcome) => outcome,
        Err(AttachError::ResolutionCancelled) => {
            services.notifier.info("Resolution cancelled");
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };
    info!(
        "Attach configuration ready for {} (cached: {}, deploy ready: {})",
        outcome.target,
        outcome.from_cache,
        outcome.readiness.as_ref().is_some_and(Readiness::is_ready)
    );

    if outcome.launched_task {
        supervise(services, &services.settings.tilt.task_name).await?;
    }
    Ok(())
}

async fn run_pick(services: &Services, from: Stage) -> anyhow::Result<()> {
    match services.resolver.resolve(from).await {
        Ok(target) => {
            println!("{}", target);
            Ok(())
        }
        Err(e) => {
            services.notifier.info(&e.to_string());
            std::process::exit(1);
        }
    }
}

async fn run_show(services: &Services) {
    let selection = services.cache.snapshot();
    for stage in Stage::ALL {
        match selection.get(stage) {
            Some(value) => println!("{:<10} {}", format!("{}:", stage), value),
            None => println!("{:<10} {}", format!("{}:", stage), "(not set)".dark_grey()),
        }
    }
    if let Some(updated_at) = selection.updated_at {
        println!("{:<10} {}", "updated:", updated_at.to_rfc3339());
    }
    match services.query.current_context().await {
        Ok(current) => println!("{:<10} {}", "active:", current),
        Err(e) => debug!("Could not read the active context: {}", e),
    }
}

async fn run_up(services: &Services, wait: bool) -> anyhow::Result<()> {
    let task_name = services.settings.tilt.task_name.clone();
    let launched = services.coordinator.ensure_running(&task_name).await?;
    if !launched {
        services
            .notifier
            .info(&format!("{} is already running", task_name));
        return Ok(());
    }

    if wait {
        let pattern = services.settings.ready_pattern()?;
        match services
            .coordinator
            .await_ready(&pattern, services.settings.poll_interval())
            .await
        {
            Readiness::Ready { line } => services.notifier.info(&format!("Ready: {}", line.trim())),
            Readiness::TimedOut => services
                .notifier
                .info(&format!("{} did not report ready in time, assuming ready", task_name)),
            Readiness::Exited => {
                services
                    .notifier
                    .error(&format!("{} exited before reporting ready", task_name));
                services.coordinator.on_exited(&task_name).await;
                return Ok(());
            }
            Readiness::NotLaunched => {}
        }
    }

    supervise(services, &task_name).await
}

async fn run_build(services: &Services) -> anyhow::Result<()> {
    let task_name = &services.settings.build.task_name;
    let task = services
        .runner
        .fetch_task(task_name)
        .await
        .with_context(|| format!("task '{}' is not defined", task_name))?;

    let mut ended = services.runner.subscribe_ended();
    services.runner.execute(task).await?;
    wait_for_end(&mut ended, task_name).await;
    services.notifier.info(&format!("{} finished", task_name));
    Ok(())
}

/// Keep a launched task running until it exits or the user interrupts, then
/// clean up its scratch log.
async fn supervise(services: &Services, task_name: &str) -> anyhow::Result<()> {
    let mut ended = services.runner.subscribe_ended();
    let mut terminate = signal(SignalKind::terminate())?;
    info!("Supervising {}; press Ctrl-C to stop", task_name);

    let interrupted = tokio::select! {
        _ = wait_for_end(&mut ended, task_name) => false,
        res = tokio::signal::ctrl_c() => {
            res?;
            true
        }
        _ = terminate.recv() => true,
    };

    if interrupted {
        info!("Stopping {}", task_name);
        services.runner.terminate(task_name).await?;
        if tokio::time::timeout(SHUTDOWN_GRACE, wait_for_end(&mut ended, task_name))
            .await
            .is_err()
        {
            warn!("{} did not report its exit in time", task_name);
        }
    }
    services.coordinator.on_exited(task_name).await;
    debug!("{} is now {:?}", task_name, services.coordinator.phase());
    Ok(())
}

async fn wait_for_end(ended: &mut tokio::sync::broadcast::Receiver<String>, task_name: &str) {
    use tokio::sync::broadcast::error::RecvError;
    loop {
        match ended.recv().await {
            Ok(name) if name == task_name => return,
            Ok(_) | Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return,
        }
    }
}
