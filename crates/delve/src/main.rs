//! # delve
//!
//! Deep-research client binary. Streams research runs from the backend,
//! mirrors them into the local snapshot cache, and exposes session history
//! and persona management from the terminal.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use delve_bus::{BusEvent, EventBus, NoticeLevel};
use delve_core::events::ResearchEvent;
use delve_core::ids::SessionId;
use delve_core::state::{ResearchState, ResearchStatus};
use delve_core::user_model::{ResearchDepth, UserModel};
use delve_session::{RunParams, SessionManager};
use delve_settings::types::DelveSettings;
use delve_store::{RemoteStore, StateService};
use delve_stream::{ResearchStreamClient, RunOptions, StreamRunner};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Deep-research client.
#[derive(Parser, Debug)]
#[command(name = "delve", about = "Deep-research client")]
struct Cli {
    /// Path to the settings file (defaults to `~/.delve/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a research objective and stream results.
    Run {
        /// The research objective.
        objective: String,

        /// Backend model override.
        #[arg(long)]
        model: Option<String>,

        /// Persona (user model) id to research as.
        #[arg(long)]
        user_model: Option<String>,

        /// Continue an existing session instead of starting fresh.
        #[arg(long)]
        session: Option<String>,
    },

    /// Inspect research sessions.
    Sessions {
        #[command(subcommand)]
        command: SessionsCommand,
    },

    /// Manage research personas.
    Models {
        #[command(subcommand)]
        command: ModelsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum SessionsCommand {
    /// List sessions, most recently active first.
    List {
        /// Maximum sessions to show.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show the freshest snapshot for a session.
    Show {
        /// Session id.
        session_id: String,
    },
    /// Delete a session's cached state and history.
    Clear {
        /// Session id.
        session_id: String,
    },
}

#[derive(Subcommand, Debug)]
enum ModelsCommand {
    /// List personas.
    List,
    /// Create a persona.
    Create {
        /// Display name.
        name: String,
        /// Research depth: shallow, moderate, or deep.
        #[arg(long, default_value = "moderate")]
        depth: String,
        /// Free-text cognitive style.
        #[arg(long)]
        style: Option<String>,
    },
    /// Delete a persona.
    Delete {
        /// Persona id.
        id: String,
    },
    /// Make a persona the default.
    SetDefault {
        /// Persona id.
        id: String,
    },
}

fn init_logging(settings: &DelveSettings) {
    let filter = tracing_subscriber::EnvFilter::try_from_env("DELVE_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if settings.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_settings(cli: &Cli) -> DelveSettings {
    let path = match cli.settings.clone() {
        Some(path) => path,
        None => match delve_settings::settings_path() {
            Ok(path) => path,
            Err(e) => {
                eprintln!("warning: could not resolve settings path ({e}), using defaults");
                return DelveSettings::default();
            }
        },
    };
    match delve_settings::load_settings_from_path(&path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("warning: failed to load settings ({e}), using defaults");
            DelveSettings::default()
        }
    }
}

fn build_service(settings: &DelveSettings) -> Result<StateService> {
    let pool = delve_store::open_pool(settings).context("failed to open snapshot cache")?;
    let remote =
        RemoteStore::new(settings.endpoints.clone()).context("failed to build remote client")?;
    Ok(StateService::new(
        remote,
        pool,
        EventBus::new(settings.client.bus_capacity),
    ))
}

fn parse_depth(s: &str) -> Result<ResearchDepth> {
    match s {
        "shallow" => Ok(ResearchDepth::Shallow),
        "moderate" => Ok(ResearchDepth::Moderate),
        "deep" => Ok(ResearchDepth::Deep),
        other => anyhow::bail!("unknown depth {other:?} (expected shallow, moderate, or deep)"),
    }
}

/// Print live progress from the bus until the receiver closes.
async fn print_progress(mut rx: delve_bus::BusReceiver) {
    use tokio::sync::broadcast::error::RecvError;
    loop {
        match rx.recv().await {
            Ok(BusEvent::Stream { event, .. }) => match event {
                ResearchEvent::Start { stage, .. } => {
                    if let Some(stage) = stage {
                        println!("▸ {stage}");
                    }
                }
                ResearchEvent::Reasoning { step, .. } => println!("▸ {step}"),
                ResearchEvent::Source { source, .. } => println!("  source: {source}"),
                ResearchEvent::Finding { finding, .. } => {
                    let title = finding
                        .detail
                        .as_ref()
                        .and_then(|d| d.title.as_deref())
                        .unwrap_or("finding");
                    println!("  finding: {title} ({})", finding.source);
                }
                _ => {}
            },
            Ok(BusEvent::Notice { level, message }) => {
                let tag = match level {
                    NoticeLevel::Info => "info",
                    NoticeLevel::Warning => "warning",
                    NoticeLevel::Error => "error",
                };
                eprintln!("[{tag}] {message}");
            }
            Ok(_) => {}
            Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => return,
        }
    }
}

fn print_state(state: &ResearchState) {
    let status = match state.status {
        ResearchStatus::Completed => "completed",
        ResearchStatus::InProgress => "in progress",
        ResearchStatus::Error => "error",
        ResearchStatus::AwaitingHumanInput => "awaiting input",
    };
    println!("session:  {}", state.identity.session_id);
    println!("status:   {status}");
    if let Some(stage) = &state.stage {
        println!("stage:    {stage}");
    }
    println!("query:    {}", state.query);
    if !state.reasoning_path.is_empty() {
        println!("reasoning: {} steps", state.reasoning_path.len());
    }
    if !state.sources.is_empty() {
        println!("sources:");
        for source in &state.sources {
            println!("  - {source}");
        }
    }
    if !state.findings.is_empty() {
        println!("findings: {}", state.findings.len());
    }
    if !state.answer.is_empty() {
        println!("\n{}", state.answer);
    }
}

async fn cmd_run(
    settings: &DelveSettings,
    service: StateService,
    objective: String,
    model: Option<String>,
    user_model: Option<String>,
    session: Option<String>,
) -> Result<()> {
    let user_model = match user_model {
        Some(id) => Some(
            service
                .get_user_model(&id)?
                .with_context(|| format!("no persona with id {id}"))?,
        ),
        None => service.default_user_model()?,
    };

    let runner = StreamRunner::new(
        ResearchStreamClient::new(settings.endpoints.clone())
            .context("failed to build stream client")?,
        service.clone(),
        RunOptions::from_settings(settings),
    );
    let manager = SessionManager::new(service, runner);
    if let Some(session) = session {
        let _ = manager.select_session(SessionId::new(session)).await?;
    }

    let printer = tokio::spawn(print_progress(manager.bus_subscribe()));
    let handle = manager.start_research(
        objective,
        RunParams {
            user_model,
            model: model.or_else(|| settings.client.model.clone()),
            user_id: None,
        },
    );

    let run = tokio::select! {
        run = handle => run,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\ninterrupted, saving what was received");
            let _ = manager.new_chat();
            return Ok(());
        }
    };
    let state = run.context("run task panicked")??;
    printer.abort();

    println!();
    print_state(&state);
    Ok(())
}

async fn cmd_sessions(service: StateService, command: SessionsCommand) -> Result<()> {
    match command {
        SessionsCommand::List { limit } => {
            let sessions = service.list_sessions(limit)?;
            if sessions.is_empty() {
                println!("no sessions yet");
                return Ok(());
            }
            for entry in sessions {
                println!(
                    "{}  {}  {}",
                    entry.session_id, entry.last_activity_at, entry.query
                );
            }
        }
        SessionsCommand::Show { session_id } => {
            match service.get_research_state(&session_id, None).await? {
                Some(state) => print_state(&state),
                None => println!("no state for session {session_id}"),
            }
        }
        SessionsCommand::Clear { session_id } => {
            service.clear_session(&session_id)?;
            println!("cleared {session_id}");
        }
    }
    Ok(())
}

async fn cmd_models(service: StateService, command: ModelsCommand) -> Result<()> {
    match command {
        ModelsCommand::List => {
            let models = service.list_user_models().await?;
            if models.is_empty() {
                println!("no personas yet");
                return Ok(());
            }
            for model in models {
                let marker = if model.is_default { "*" } else { " " };
                println!(
                    "{marker} {}  {}  {:?}",
                    model.id, model.name, model.research_depth
                );
            }
        }
        ModelsCommand::Create { name, depth, style } => {
            let mut model = UserModel::new(name);
            model.research_depth = parse_depth(&depth)?;
            model.cognitive_style = style;
            service.save_user_model(&model, true).await?;
            println!("created {}", model.id);
        }
        ModelsCommand::Delete { id } => {
            service.delete_user_model(&id).await?;
            println!("deleted {id}");
        }
        ModelsCommand::SetDefault { id } => {
            service.set_default_user_model(&id)?;
            println!("default persona is now {id}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli);
    init_logging(&settings);

    let service = build_service(&settings)?;
    match cli.command {
        Command::Run {
            objective,
            model,
            user_model,
            session,
        } => cmd_run(&settings, service, objective, model, user_model, session).await,
        Command::Sessions { command } => cmd_sessions(service, command).await,
        Command::Models { command } => cmd_models(service, command).await,
    }
}
