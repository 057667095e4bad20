//! Marionette - procedural avatar animation driver
//!
//! Runs an animator against an in-memory humanoid rig, feeding it JSON
//! commands from a script file or stdin.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use marionette::{
    avatar::CharacterProfile, command::CommandSender, config::Config, rig::MemoryRig, Animator,
};

/// Marionette - drive a humanoid avatar from a command stream
#[derive(Parser, Debug)]
#[command(name = "marionette", version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Character profile (TOML)
    #[arg(short, long)]
    profile: Option<PathBuf>,

    /// Command script, one JSON command per line (stdin when omitted)
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Ticks per second
    #[arg(long, default_value_t = 60)]
    fps: u32,

    /// Stop after this many seconds (runs until Ctrl+C otherwise)
    #[arg(long)]
    seconds: Option<f32>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(log_level.into())
                .from_env_lossy(),
        )
        .init();

    info!("Starting {} v{}", marionette::NAME, marionette::VERSION);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(args))?;

    info!("Marionette stopped");
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    let profile = match &args.profile {
        Some(path) => CharacterProfile::from_file(path)?,
        None => {
            info!("No profile given, using the default character");
            CharacterProfile::default()
        }
    };

    let mut animator = Animator::new(config, profile)?;
    let mut rig = MemoryRig::humanoid();
    animator.attach(&rig);

    let sender = animator.command_sender();
    let script = args.script.clone();
    let reader = tokio::spawn(async move {
        let result = match script {
            Some(path) => match tokio::fs::File::open(&path).await {
                Ok(file) => feed_commands(BufReader::new(file), sender).await,
                Err(e) => Err(anyhow::anyhow!("{}: {}", path.display(), e)),
            },
            None => feed_commands(BufReader::new(tokio::io::stdin()), sender).await,
        };
        if let Err(e) = result {
            warn!("Command reader stopped: {}", e);
        }
    });

    let fps = args.fps.clamp(1, 1000);
    let dt = 1.0 / fps as f32;
    let max_ticks = args
        .seconds
        .filter(|s| s.is_finite() && *s > 0.0)
        .map(|s| (s * fps as f32).ceil() as u64);
    info!("Ticking at {} fps", fps);

    let mut interval = tokio::time::interval(Duration::from_secs_f32(dt));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut ticks: u64 = 0;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            _ = interval.tick() => {
                animator.tick(dt, &mut rig);
                ticks += 1;

                if ticks % fps as u64 == 0 {
                    info!("{}", animator.status().summary());
                }
                if max_ticks.is_some_and(|max| ticks >= max) {
                    break;
                }
            }
        }
    }

    reader.abort();
    info!("Final state: {}", serde_json::to_string(&animator.status())?);
    Ok(())
}

/// Forward JSON command lines to the animator.
///
/// Blank lines and lines starting with `#` are skipped; `sleep <seconds>`
/// pauses the feed so scripts can space commands out in time.
async fn feed_commands<R>(reader: R, sender: CommandSender) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(secs) = line.strip_prefix("sleep") {
            match secs.trim().parse::<f32>() {
                Ok(secs) if secs.is_finite() && secs >= 0.0 => {
                    tokio::time::sleep(Duration::from_secs_f32(secs)).await;
                }
                _ => warn!("line {}: bad sleep duration '{}'", line_no, secs.trim()),
            }
            continue;
        }

        match sender.send_json(line) {
            Ok(()) => debug!("line {}: queued", line_no),
            Err(e) => warn!("line {}: {}", line_no, e),
        }
    }

    info!("Command input finished after {} line(s)", line_no);
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
