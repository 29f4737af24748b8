mod capture;
mod console;

use anyhow::{Context, Result};
use capture::OpenCvCapture;
use clap::{Parser, Subcommand};
use ember_vision::{
    AlarmDispatcher, ChromaDetector, ControlHandle, EmberConfig, RunOutcome, Session,
    SoundFileAlarm, StillImage,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_ALARM_SOUND: &str = "alarm.mp3";

#[derive(Parser)]
#[command(
    name = "ember_tester",
    about = "Runs fire and smoke detection over images, video files, and cameras"
)]
struct Cli {
    /// YAML config file. `EMBER_*` environment variables are applied on top.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides the configured confidence threshold.
    #[arg(long, global = true)]
    threshold: Option<f32>,

    /// Alarm sound file. Must exist unless `--silent` is set.
    #[arg(long, global = true)]
    alarm_sound: Option<PathBuf>,

    /// Log alarms instead of playing a sound.
    #[arg(long, global = true)]
    silent: bool,

    /// Print events as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze one or more still images.
    Image {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Analyze a recorded video until it ends or Ctrl-C is pressed.
    Video { path: PathBuf },
    /// Watch a live camera until Ctrl-C is pressed.
    Camera {
        #[arg(long, default_value_t = 0)]
        device: i32,
        /// Stop automatically after this many seconds.
        #[arg(long)]
        seconds: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let alarm = if cli.silent {
        AlarmDispatcher::logging()
    } else {
        let sound = cli
            .alarm_sound
            .clone()
            .or_else(|| config.alarm_sound.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ALARM_SOUND));
        AlarmDispatcher::new(Arc::new(SoundFileAlarm::new(sound)))
    };

    let session = Session::new(config, Arc::new(ChromaDetector::default()), alarm);
    let render = tokio::spawn(console::render(session.subscribe(), cli.json));

    let outcome = run_command(&session, cli.command).await;
    let history = session.history();
    // Closing the bus lets the renderer drain and exit.
    drop(session);
    render.await.context("console task failed")?;
    outcome?;

    if !cli.json {
        console::print_history(&history);
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<EmberConfig> {
    let config = match &cli.config {
        Some(path) => EmberConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EmberConfig::default(),
    };
    let mut config = config.with_env().context("applying environment overrides")?;
    if let Some(threshold) = cli.threshold {
        config.confidence_threshold = threshold;
        config.validate()?;
    }
    Ok(config)
}

async fn run_command(session: &Session, command: Command) -> Result<()> {
    match command {
        Command::Image { paths } => {
            let runs = paths.iter().map(|path| async move {
                let result = session.analyze_image(StillImage::from_path(path)).await;
                (path, result)
            });
            let mut failed = 0;
            for (path, result) in futures::future::join_all(runs).await {
                if let Err(e) = result {
                    log::error!("{}: {e}", path.display());
                    failed += 1;
                }
            }
            if failed > 0 {
                anyhow::bail!("{failed} of {} images could not be analyzed", paths.len());
            }
        }
        Command::Video { path } => {
            let run = session.start_video(OpenCvCapture::video(&path))?;
            report(run.wait_or_stop(ctrl_c()).await?);
        }
        Command::Camera { device, seconds } => {
            let (control, toggle) = ControlHandle::channel();
            let run = session.start_camera(OpenCvCapture::camera(device), toggle)?;
            let stop = async move {
                match seconds {
                    Some(seconds) => {
                        tokio::select! {
                            _ = ctrl_c() => {}
                            _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
                        }
                    }
                    None => ctrl_c().await,
                }
                control.stop();
            };
            report(run.wait_or_stop(stop).await?);
        }
    }
    Ok(())
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}

fn report(outcome: RunOutcome) {
    log::info!(
        "{} frames, {} alarms, final status: {}",
        outcome.record.frame_count,
        outcome.alarms_fired,
        outcome.final_status
    );
}
