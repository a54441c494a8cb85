mod cli;

use clipforged::{
    config,
    engine::{Engine, FfmpegBackend},
    output::ArtifactStore,
    probe::{probe_with_timeout, FfprobeDurationProbe},
    queue::{JobQueue, JobStatus},
};
use clipforged_av::{build_args, ToolRegistry};
use clipforged_core::events::{Event, EventBus, EventPayload};
use clipforged_core::plan_encode;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "clipforged=trace,clipforged_av=trace,clipforged_core=debug".to_string()
        } else {
            "clipforged=debug,clipforged_av=debug,clipforged_core=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Compress { files, out } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(compress(files, out, cli.config.as_deref()))
        }
        Commands::Plan {
            duration,
            budget_mb,
        } => plan(duration, budget_mb, cli.config.as_deref()),
        Commands::Probe { file, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&file, json, cli.config.as_deref()))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Version => {
            println!("clipforged {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn compress(files: Vec<PathBuf>, out: Option<PathBuf>, config_path: Option<&Path>) -> Result<()> {
    let config = Arc::new(config::load_config_or_default(config_path)?);
    let tools = ToolRegistry::discover(&config.tools);
    let events = Arc::new(EventBus::default());

    let backend = Arc::new(FfmpegBackend::new(&tools, config.engine.encode_timeout()));
    let engine = Arc::new(
        Engine::new(backend, config.engine.clone()).with_events(Arc::clone(&events)),
    );
    let probe = Arc::new(FfprobeDurationProbe::from_registry(
        &tools,
        config.probe.timeout(),
    )?);
    let store = Arc::new(ArtifactStore::new(config.output.clone()));
    let queue = Arc::new(JobQueue::new(
        Arc::clone(&engine),
        probe,
        Arc::clone(&store),
        Arc::clone(&config),
        Arc::clone(&events),
    ));

    // Load while the user's files are being validated.
    let loading = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.initialize().await })
    };

    let mut rejected = 0;
    for file in &files {
        if let Err(e) = queue.submit(file) {
            eprintln!("Skipping {}: {}", file.display(), e);
            rejected += 1;
        }
    }

    let events_rx = queue.subscribe();

    // The outcome is also observed through the engine state in run_queue.
    let _ = loading.await;
    let result = run_with_progress(&queue, events_rx).await;

    if let Err(e) = result {
        anyhow::bail!("{}", e);
    }

    let jobs = queue.jobs();
    println!();
    for job in &jobs {
        match (&job.status, &job.artifact) {
            (JobStatus::Completed, Some(artifact)) => println!(
                "✓ {} -> {} ({:.2} MB)",
                job.file_name,
                artifact.path.display(),
                artifact.size_bytes as f64 / (1024.0 * 1024.0)
            ),
            _ => println!(
                "✗ {}: {}",
                job.file_name,
                job.error.as_deref().unwrap_or("not processed")
            ),
        }
    }

    if let Some(out) = out {
        let fetched = store.fetch_all(&jobs, &out).await?;
        println!("\nCopied {} file(s) to {}", fetched.len(), out.display());
    }

    let counts = queue.counts();
    if counts.failed > 0 || rejected > 0 {
        anyhow::bail!(
            "{} job(s) failed, {} file(s) rejected",
            counts.failed,
            rejected
        );
    }

    Ok(())
}

/// Run the queue, printing job events as they arrive.
async fn run_with_progress(
    queue: &JobQueue,
    mut rx: broadcast::Receiver<Event>,
) -> clipforged_core::Result<()> {
    let run = queue.run_queue();
    tokio::pin!(run);

    let result = loop {
        tokio::select! {
            biased;
            event = rx.recv() => match event {
                Ok(event) => print_event(&event.payload),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break (&mut run).await,
            },
            result = &mut run => break result,
        }
    };

    for line in pending_lines(&mut rx) {
        println!("{}", line);
    }
    result
}

/// Lines for events already buffered in `rx`.
fn pending_lines(rx: &mut broadcast::Receiver<Event>) -> Vec<String> {
    let mut lines = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => lines.extend(event_line(&event.payload)),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
    lines
}

fn print_event(payload: &EventPayload) {
    if let Some(line) = event_line(payload) {
        println!("{}", line);
    }
}

fn event_line(payload: &EventPayload) -> Option<String> {
    match payload {
        EventPayload::JobStarted { index } => Some(format!("[{}] started", index)),
        EventPayload::JobPlanned {
            index,
            duration_secs,
            bitrate_kbps,
            resolution,
        } => Some(format!(
            "[{}] {:.1}s -> {}k @ {}",
            index, duration_secs, bitrate_kbps, resolution
        )),
        EventPayload::JobProgress { index, progress } if progress % 10 == 0 => {
            Some(format!("[{}] {}%", index, progress))
        }
        EventPayload::JobCompleted { index, .. } => Some(format!("[{}] done", index)),
        EventPayload::JobFailed { index, error } => {
            Some(format!("[{}] failed: {}", index, error))
        }
        _ => None,
    }
}

fn plan(duration: f64, budget_mb: Option<f64>, config_path: Option<&Path>) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;
    if let Some(budget) = budget_mb {
        config.compression.size_budget_mb = budget;
    }

    let params = plan_encode(duration, &config.compression)?;

    println!("Duration: {:.3}s", params.duration_secs);
    println!("Budget: {} MB", config.compression.size_budget_mb);
    println!("Video bitrate: {}k", params.video_bitrate_kbps);
    println!("Resolution: {}", params.resolution);
    println!("Audio bitrate: {}k", params.audio_bitrate_kbps);
    println!(
        "Estimated size: {:.2} MB",
        params.estimated_size_bytes() as f64 / (1024.0 * 1024.0)
    );

    let args = build_args(Path::new("<input>"), Path::new("<output>"), &params);
    println!("\nffmpeg {}", args.join(" "));

    Ok(())
}

async fn probe_file(file: &Path, json: bool, config_path: Option<&Path>) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = config::load_config_or_default(config_path)?;
    let tools = ToolRegistry::discover(&config.tools);
    let probe = FfprobeDurationProbe::from_registry(&tools, config.probe.timeout())?;

    let duration = probe_with_timeout(&probe, file, config.probe.timeout()).await?;
    let planned = plan_encode(duration, &config.compression);

    if json {
        let report = serde_json::json!({
            "file": file,
            "duration_secs": duration,
            "plan": planned.as_ref().ok(),
            "plan_error": planned.as_ref().err().map(|e| e.to_string()),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("File: {}", file.display());
    println!("Duration: {:.3}s", duration);

    match planned {
        Ok(params) => println!(
            "Planned: {}k @ {}",
            params.video_bitrate_kbps, params.resolution
        ),
        Err(e) => println!("Planned: {}", e),
    }

    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg to compress videos.");
    }

    Ok(())
}
