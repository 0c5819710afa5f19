use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use lifesim_autonomy::{
    service::console::run_command, ActorId, ActorRef, AutonomousActor, AutonomyConfig, AutonomyMode,
    AutonomyRandomization, AutonomyService, AutonomyTelemetry, CandidateSpec, DecisionOptions,
    SimActor, StaticMode,
};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use shared_event_bus::FileEventPublisher;
use tokio::{runtime::Runtime, sync::mpsc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEMO_KINDS: [&str; 7] = ["eat", "sleep", "socialize", "read", "watch_tv", "shower", "cook"];

#[derive(Parser, Debug)]
#[command(name = "autonomy", version, about = "LifeSim autonomy engine driver")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs a demo world for a number of ticks.
    Simulate(SimulateArgs),
    /// Loads and validates a tuning file.
    CheckConfig {
        /// TOML file to validate.
        config: PathBuf,
    },
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Tuning file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Number of simulated actors.
    #[arg(long, default_value_t = 8)]
    actors: u64,
    /// Number of simulation ticks to run.
    #[arg(long, default_value_t = 30)]
    ticks: u64,
    /// Selection and world seed.
    #[arg(long)]
    seed: Option<u64>,
    /// Console commands run before the first tick, e.g. "autonomy.randomization on".
    #[arg(long = "command")]
    commands: Vec<String>,
    /// JSON-lines event log.
    #[arg(long)]
    event_log: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Simulate(args) => {
            let runtime = Runtime::new().context("starting tokio runtime")?;
            runtime.block_on(simulate(args))
        }
        Commands::CheckConfig { config } => {
            let loaded = AutonomyConfig::load(&config)?;
            println!("{} is valid", config.display());
            println!("{}", serde_json::to_string_pretty(&loaded)?);
            Ok(())
        }
    }
}

async fn simulate(args: SimulateArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => AutonomyConfig::load(path)?,
        None => AutonomyConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.rng_seed = Some(seed);
    }
    let world_seed = config.rng_seed.unwrap_or_else(rand::random);
    let tick_period = config.tick_period();

    let mut telemetry = AutonomyTelemetry::builder("autonomy");
    if let Some(path) = &config.log_path {
        telemetry = telemetry.log_path(path);
    }
    if let Some(path) = &args.event_log {
        telemetry = telemetry.event_publisher(Arc::new(FileEventPublisher::new(path)?));
    }
    let service = AutonomyService::builder()
        .config(config)
        .telemetry(telemetry.build()?)
        .build()?;

    for line in &args.commands {
        match run_command(&service, line) {
            Ok(output) => println!("> {line}\n{output}"),
            Err(err) => warn!(%line, %err, "console command rejected"),
        }
    }

    let mut rng = SmallRng::seed_from_u64(world_seed);
    let actors: Vec<Arc<SimActor>> = (1..=args.actors)
        .map(|id| {
            let randomization = if id % 2 == 0 {
                AutonomyRandomization::Enabled
            } else {
                AutonomyRandomization::Default
            };
            Arc::new(SimActor::new(id, format!("sim-{id}")).with_randomization(randomization))
        })
        .collect();
    let mode: Arc<dyn AutonomyMode> = Arc::new(demo_world(&actors, &mut rng));

    info!(actors = actors.len(), ticks = args.ticks, seed = world_seed, "simulation starting");
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(ActorId, String)>();
    let mut waiting = vec![false; actors.len()];
    let mut ticks = service.clock().subscribe();
    let driver = service.clock().drive(tick_period);

    for _ in 0..args.ticks {
        for (slot, actor) in actors.iter().enumerate() {
            if waiting[slot] {
                continue;
            }
            actor.reroll_multitasking(&mut rng);
            let handle = service.enqueue_decision(
                ActorRef::new(actor),
                Arc::clone(&mode),
                DecisionOptions::default(),
            )?;
            waiting[slot] = true;
            let done = done_tx.clone();
            let actor_id = actor.id();
            tokio::spawn(async move {
                let summary = match handle.outcome().await {
                    Ok(Some(chosen)) => format!("{} (target {:?})", chosen.kind(), chosen.target()),
                    Ok(None) => "nothing".to_owned(),
                    Err(err) => format!("error: {err}"),
                };
                let _ = done.send((actor_id, summary));
            });
        }

        if ticks.changed().await.is_err() {
            break;
        }
        let now = *ticks.borrow_and_update();
        while let Ok((actor_id, summary)) = done_rx.try_recv() {
            println!("tick {now:>4} | actor {actor_id:>3} | {summary}");
            if let Some(slot) = actors.iter().position(|a| a.id() == actor_id) {
                waiting[slot] = false;
            }
        }
        info!(tick = now, queued = service.queue_depth(), "tick advanced");
    }

    driver.abort();
    service.stop();
    println!("{}", serde_json::to_string_pretty(&service.metrics())?);
    Ok(())
}

/// Random candidate table: a few affordances per actor, some with variants
/// on other targets, some scoring below zero with a route to walk.
fn demo_world(actors: &[Arc<SimActor>], rng: &mut SmallRng) -> StaticMode {
    let mut mode = StaticMode::new("demo");
    for actor in actors {
        let count = rng.gen_range(2..=DEMO_KINDS.len());
        let rows = DEMO_KINDS
            .iter()
            .take(count)
            .enumerate()
            .map(|(index, kind)| {
                let target = 100 + index as u64;
                let mut row = CandidateSpec::new(*kind, Some(target), rng.gen_range(-2.0..8.0))
                    .route_time(rng.gen_range(0.0..20.0))
                    .multitasking(rng.gen_range(0.2..1.0));
                if rng.gen_bool(0.3) {
                    row = row.variant(Some(target + 50), rng.gen_range(0.0..8.0));
                }
                row
            })
            .collect();
        mode = mode.with_candidates(actor.id(), rows);
    }
    mode
}
