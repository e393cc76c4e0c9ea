mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use reelforge::{bridge, host};
use rf_av::{build_args, describe, ToolRegistry};
use rf_core::config::Config;
use rf_core::events::{EventBus, JobEvent};
use rf_core::{JobOptions, JobRequest};
use rf_jobs::JobSupervisor;
use tokio::sync::broadcast::error::RecvError;

fn build_supervisor(config: &Config) -> JobSupervisor {
    let tools = ToolRegistry::discover(&config.tools);
    let bus = Arc::new(EventBus::new(config.events.capacity));
    JobSupervisor::new(config, tools, bus)
}

fn load_config(path: Option<&Path>) -> Config {
    let config = Config::load_or_default(path);
    for warning in config.validate() {
        tracing::warn!("{warning}");
    }
    config
}

async fn serve(config: Config) -> Result<()> {
    let supervisor = build_supervisor(&config);
    tracing::info!("Serving JSON-lines bridge on stdio");

    let input = tokio::io::BufReader::new(tokio::io::stdin());
    bridge::serve(supervisor, input, tokio::io::stdout()).await?;
    Ok(())
}

async fn run_job(config: Config, request: JobRequest, dry_run: bool) -> Result<()> {
    if dry_run {
        let mut request = request;
        request
            .options
            .quality
            .get_or_insert(config.jobs.default_quality);
        println!("{}", describe(&build_args(&request)?));
        return Ok(());
    }

    let supervisor = build_supervisor(&config);
    let mut events = supervisor.bus().subscribe();
    let job_id = supervisor.start(request)?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut stopping = false;

    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !stopping => {
                eprintln!();
                tracing::info!(job_id = %job_id, "Interrupted; stopping job");
                stopping = true;
                supervisor.stop().await;
            }
            received = events.recv() => {
                let event = match received {
                    Ok(event) => event,
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!("Missed {n} job events");
                        continue;
                    }
                    Err(RecvError::Closed) => anyhow::bail!("event bus closed unexpectedly"),
                };
                if event.job_id != job_id {
                    continue;
                }

                match event.payload {
                    JobEvent::Started { command } => eprintln!("Running: {command}"),
                    JobEvent::Progress(p) => eprint!(
                        "\r{:>6.2}%  {:>5}s  speed {:<8} size {:<10}",
                        p.percent, p.elapsed_secs, p.speed, p.estimated_size
                    ),
                    JobEvent::Completed { output_path } => {
                        eprintln!();
                        println!("Output: {}", output_path.display());
                        return Ok(());
                    }
                    JobEvent::Error { message } => {
                        eprintln!();
                        anyhow::bail!("Job failed: {message}");
                    }
                    JobEvent::Stopped => anyhow::bail!("Job stopped"),
                }
            }
        }
    }
}

async fn probe_file(config: Config, file: &Path, json: bool) -> Result<()> {
    let supervisor = build_supervisor(&config);
    let info = supervisor.probe(file).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    let secs = info.duration as u64;
    println!("File: {}", file.display());
    println!(
        "Duration: {:02}:{:02}:{:02} ({:.2}s)",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        info.duration
    );
    println!("Size: {}", info.size);
    println!("Bitrate: {} bit/s", info.bitrate);
    println!("Video: {} {} @ {} fps", info.codec, info.resolution, info.fps);
    if info.estimated {
        println!("\nNote: ffprobe could not read this file; values are estimates.");
    }
    Ok(())
}

fn check_tools(config: &Config) -> Result<()> {
    println!("Checking external tools...\n");

    let status = host::host_status(&ToolRegistry::discover(&config.tools));
    for tool in &status.tools {
        print!("{} {}", if tool.available { "✓" } else { "✗" }, tool.name);
        if let Some(ref version) = tool.version {
            print!(" ({version})");
        }
        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    println!();
    if status.engine_ready() {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Jobs need ffmpeg; probing falls back to estimates without ffprobe.");
    }
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let contents = std::fs::read_to_string(p)?;
            Config::from_json(&contents)?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("✓ Configuration is valid");
    } else {
        println!("Configuration parsed with {} warning(s):", warnings.len());
        for w in &warnings {
            println!("  - {w}");
        }
    }
    println!("  Probe timeout: {}s", config.probe.timeout_secs);
    println!("  Default quality: {}", config.jobs.default_quality);
    println!("  Failure log lines: {}", config.jobs.stderr_tail_lines);
    println!("  Event buffer: {}", config.events.capacity);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults from the verbose flag.
    // Logs go to stderr; stdout carries bridge and command output.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "reelforge=debug,rf_jobs=debug,rf_av=debug,rf_core=debug".to_string()
        } else {
            "reelforge=info,rf_jobs=info,rf_av=warn,rf_core=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve => {
            let config = load_config(cli.config.as_deref());
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(serve(config))
        }
        Commands::Run {
            operation,
            inputs,
            output,
            format,
            quality,
            resolution,
            fps,
            offset,
            audio_codec,
            dry_run,
        } => {
            let config = load_config(cli.config.as_deref());
            let request = JobRequest::new(operation, inputs, output).with_options(JobOptions {
                format,
                quality,
                resolution,
                fps,
                time_offset: offset,
                audio_codec,
            });
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_job(config, request, dry_run))
        }
        Commands::Probe { file, json } => {
            let config = load_config(cli.config.as_deref());
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(config, &file, json))
        }
        Commands::CheckTools => check_tools(&load_config(cli.config.as_deref())),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("reelforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
