mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use rc_av::Tool;
use rc_core::events::{Event, EventPayload};
use rc_parser::ParsedTitle;
use rc_pipeline::{DeviceProfile, Receiver, SubtitleSelection};
use rc_probe::MediaInfo;
use reelcast::receiver::{CommandReceiver, LoggingReceiver};
use reelcast::{app, config, App};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

/// `probe --json` output: the stream inventory plus the title guessed from
/// the file name.
#[derive(Serialize)]
struct ProbeReport<'a> {
    title: ParsedTitle,
    #[serde(flatten)]
    info: &'a MediaInfo,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "reelcast=trace,rc_pipeline=trace,rc_server=debug,rc_av=debug,rc_probe=debug,tower_http=debug"
    } else {
        "reelcast=info,rc_pipeline=info,rc_server=info,rc_av=info,tower_http=info"
    };
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_owned());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let load = || config::load_config_or_default(cli.config.as_deref());

    match cli.command {
        Commands::Play {
            files,
            host,
            port,
            device_model,
            start,
        } => {
            let mut config = load()?;
            config.server.host = host.unwrap_or(config.server.host);
            config.server.port = port.unwrap_or(config.server.port);
            config.device.model = device_model.or(config.device.model);
            block_on(play(config, files, start))
        }
        Commands::Probe { file, json } => {
            let config = load()?;
            block_on(probe_file(&config, &file, json))
        }
        Commands::Plan {
            file,
            audio,
            device_model,
        } => {
            let mut config = load()?;
            config.device.model = device_model.or(config.device.model);
            block_on(plan_file(&config, &file, audio))
        }
        Commands::CheckTools => check_tools(&load()?),
        Commands::Validate { config } => validate_config(config.or(cli.config).as_deref()),
        Commands::Version => {
            println!("reelcast {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn block_on<F: std::future::Future<Output = Result<()>>>(future: F) -> Result<()> {
    tokio::runtime::Runtime::new()
        .context("Failed to start the async runtime")?
        .block_on(future)
}

async fn play(config: rc_core::config::Config, files: Vec<PathBuf>, start: usize) -> Result<()> {
    let mut paths = Vec::with_capacity(files.len());
    for file in &files {
        let path = file
            .canonicalize()
            .with_context(|| format!("Cannot open {}", file.display()))?;
        paths.push(path);
    }
    if start >= paths.len() {
        anyhow::bail!("--start {start} is past the end of {} queued files", paths.len());
    }

    let app = App::start(&config).await?;
    let receiver: Arc<dyn Receiver> = match config.player.command.clone() {
        Some(command) => Arc::new(CommandReceiver::new(command, app.queue.playback_sink())?),
        None => {
            println!("No player configured; media URLs are logged for an external controller.");
            Arc::new(LoggingReceiver)
        }
    };

    let mut events = app.events.subscribe();
    let mut last_seq = app.events.last_seq();
    app.queue.attach_receiver(receiver).await?;
    app.queue.add_files(paths).await?;
    app.queue.set_current(start).await?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) if event.seq <= last_seq => {}
                Ok(event) => {
                    last_seq = event.seq;
                    if report(&event) {
                        break;
                    }
                }
                Err(RecvError::Lagged(_)) => {
                    let missed = app.events.since(last_seq);
                    let mut finished = false;
                    for event in &missed {
                        last_seq = event.seq;
                        finished |= report(event);
                    }
                    if finished {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            },
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                println!("Interrupted");
                break;
            }
        }
    }

    app.shutdown().await
}

/// Print user-facing events. Returns `true` once the queue is finished.
fn report(event: &Event) -> bool {
    match &event.payload {
        EventPayload::Preparing { item_id } => println!("Preparing {item_id}..."),
        EventPayload::PlaybackStarted { url, .. } => println!("Playing {url}"),
        EventPayload::ItemError { message, .. } => eprintln!("Error: {message}"),
        EventPayload::QueueFinished => {
            println!("Queue finished");
            return true;
        }
        _ => {}
    }
    false
}

async fn probe_file(config: &rc_core::config::Config, file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {}", file.display());
    }
    let (prober, _) = app::discover_prober(config)?;
    let info = prober.probe(file).await?;
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let title = rc_parser::parse_title(&name);

    if json {
        let report = ProbeReport { title, info: &info };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("File: {}", info.file_path.display());
    println!("Title: {}", title.display_title(&name));
    println!("Container: {}", info.container);
    println!("Size: {} bytes", info.file_size);
    if let Some(duration) = info.duration {
        let secs = duration.as_secs();
        println!("Duration: {:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60);
    }
    println!("\nStreams: {}", info.streams.len());
    for stream in &info.streams {
        print!("  [{}] {} {}", stream.index, stream.kind, stream.label());
        if stream.is_default {
            print!(" [default]");
        }
        println!();
    }
    Ok(())
}

async fn plan_file(config: &rc_core::config::Config, file: &Path, audio: Option<u32>) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {}", file.display());
    }
    let (prober, _) = app::discover_prober(config)?;
    let info = prober.probe(file).await?;
    let device = DeviceProfile::resolve(&config.device);
    let plan = rc_pipeline::plan(&info, audio, &SubtitleSelection::None, &device)?;

    println!("Device: {}", device.name);
    println!("Video: {}", plan.video_action);
    println!("Audio: {}", plan.audio_action);
    if let Some(ref target) = plan.audio_target {
        println!("Audio target: {target}");
    }
    println!("Container: {}", plan.container_action);
    if plan.requires_job() {
        println!("A transcode job is required.");
    } else {
        println!("Direct play: the file is served as is.");
    }
    Ok(())
}

fn check_tools(config: &rc_core::config::Config) -> Result<()> {
    let mut ffmpeg_found = false;
    for info in rc_av::ToolRegistry::discover(&config.tools).check_all() {
        let mark = if info.available { "✓" } else { "✗" };
        let role = match info.tool {
            Tool::Ffmpeg => {
                ffmpeg_found = info.available;
                "required"
            }
            Tool::Ffprobe => "optional",
        };
        let location = info
            .path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "not found".into());
        println!("{mark} {} ({role}): {location}", info.tool);
        if let Some(version) = info.version {
            println!("    {version}");
        }
    }

    if ffmpeg_found {
        println!("\nReady to cast.");
    } else {
        println!("\nffmpeg is missing; install it or set tools.ffmpeg_path.");
    }
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid: {}", p.display());
            for warning in config.validate() {
                println!("  warning: {warning}");
            }
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!(
                "  Device: {}",
                config.device.model.as_deref().unwrap_or("baseline")
            );
            println!(
                "  Queue: autoplay={}, lookahead={}, start lead={}s",
                config.queue.autoplay, config.queue.max_lookahead, config.queue.start_lead_secs
            );
        }
        None => {
            println!("# No config file given; these are the defaults.");
            print!("{}", toml::to_string_pretty(&rc_core::config::Config::default())?);
        }
    }

    Ok(())
}
