// narayana-talk host simulator
// Drives the bridge from a command script against in-memory collaborators and
// prints every host notification as one JSON line on stdout

use anyhow::{bail, Context};
use clap::Parser;
use narayana_talk::emitter::{HostCallbacks, WireMessage};
use narayana_talk::sim::{CallLog, SimDecoder, SimScene};
use narayana_talk::{Bridge, BridgeConfig};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "narayana-talk")]
#[command(about = "Talk-motion bridge host simulator", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Command script; reads stdin when omitted
    #[arg(long, short)]
    script: Option<PathBuf>,

    /// Avatar already present in the scene at startup
    #[arg(long, default_value = "default")]
    scene_avatar: String,

    /// Start with an empty scene (the configured initial avatar is instantiated)
    #[arg(long)]
    empty_scene: bool,

    /// Engine only answers calls and never raises events on its own
    #[arg(long)]
    manual_engine: bool,

    /// Ticks to keep running after the last script line
    #[arg(long, default_value = "120")]
    drain_ticks: u32,

    /// Log level (error, warn, info, debug, trace) when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Host side of the callback boundary: one JSON line per notification
struct StdoutHost;

impl HostCallbacks for StdoutHost {
    fn deliver(&self, message: WireMessage) {
        match serde_json::to_string(&message) {
            Ok(line) => println!("{}", line),
            Err(e) => error!("Failed to serialize {}: {}", message.method, e),
        }
    }
}

/// One script line
#[derive(Debug, PartialEq)]
enum Step {
    /// `@audio <seconds>`: host pushes raw audio bytes
    QueueAudio(f64),
    /// `@wait <ticks>`
    Wait(u32),
    /// `Method <payload>`
    Call { method: String, payload: String },
}

fn parse_script(script: &str) -> anyhow::Result<Vec<Step>> {
    let mut steps = Vec::new();
    for (n, line) in script.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };
        let step = match head {
            "@audio" => Step::QueueAudio(
                rest.parse()
                    .with_context(|| format!("line {}: invalid audio length '{}'", n + 1, rest))?,
            ),
            "@wait" => Step::Wait(
                rest.parse()
                    .with_context(|| format!("line {}: invalid tick count '{}'", n + 1, rest))?,
            ),
            directive if directive.starts_with('@') => {
                bail!("line {}: unknown directive {}", n + 1, directive)
            }
            method => Step::Call {
                method: method.to_string(),
                payload: rest.to_string(),
            },
        };
        steps.push(step);
    }
    Ok(steps)
}

async fn run_ticks(bridge: &mut Bridge, ticker: &mut Interval, ticks: u32, dt: f64) {
    for _ in 0..ticks {
        ticker.tick().await;
        bridge.update(dt);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = BridgeConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    let script = match cli.script {
        Some(ref path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read script from stdin")?;
            buf
        }
    };
    let steps = parse_script(&script)?;

    let log = CallLog::new();
    let scene = if cli.empty_scene {
        SimScene::new(log.clone())
    } else {
        SimScene::with_avatar(log.clone(), &cli.scene_avatar)
    };
    scene.set_auto_respond(!cli.manual_engine);
    let decoder = SimDecoder::new(log.clone());

    let dt = config.tick_seconds();
    let mut ticker = interval(Duration::from_secs_f64(dt));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

    let mut bridge = Bridge::new(config, Box::new(scene), Arc::new(decoder.clone()), Arc::new(StdoutHost))?;
    bridge.start();
    info!("Running {} script steps", steps.len());

    for step in steps {
        match step {
            Step::QueueAudio(seconds) => decoder.queue_audio(seconds),
            Step::Wait(ticks) => run_ticks(&mut bridge, &mut ticker, ticks, dt).await,
            Step::Call { method, payload } => {
                bridge.handle(&method, &payload);
                run_ticks(&mut bridge, &mut ticker, 1, dt).await;
            }
        }
    }
    run_ticks(&mut bridge, &mut ticker, cli.drain_ticks, dt).await;

    bridge.shutdown();
    info!("Simulator finished ({} collaborator calls)", log.entries().len());
    Ok(())
}
