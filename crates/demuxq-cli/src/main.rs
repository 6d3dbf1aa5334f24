//! demuxq CLI entry point.
//!
//! Usage:
//!   demuxq compile <runfolder> [OPTIONS]   # Print the command that would run
//!   demuxq run <runfolder> [OPTIONS]       # Run it on the local queue and wait
//!   demuxq versions                        # List configured tool versions
//!   demuxq logs <runfolder>                # Print the runfolder's tool log

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use demuxq_kernel::{DemuxService, LocalQueue, RunRequest, ServiceConfig};
use demuxq_types::JobState;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> ExitCode {
    // RUST_LOG overrides the default filter
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("demuxq=info,demuxq_kernel=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = env::args().skip(1).collect();
    let (config_path, args) = take_config_flag(args)?;

    match args.first().map(|s| s.as_str()) {
        None | Some("--help" | "-h" | "help") => {
            print_help();
            Ok(ExitCode::SUCCESS)
        }

        Some("--version" | "-V") => {
            println!("demuxq {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }

        Some("compile") => {
            let (runfolder, request) = parse_run_args(&args[1..])?;
            run_compile(config_path, &runfolder, request)
        }

        Some("run") => {
            let (runfolder, request) = parse_run_args(&args[1..])?;
            run_job(config_path, &runfolder, request)
        }

        Some("versions") => run_versions(config_path),

        Some("logs") => {
            let runfolder = args.get(1).context("logs requires a runfolder name")?;
            run_logs(config_path, runfolder)
        }

        Some(unknown) => {
            eprintln!("Unknown command: {unknown}");
            eprintln!("Run 'demuxq --help' for usage.");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_help() {
    println!(
        r#"demuxq v{}

Usage:
  demuxq [--config <path>] <command> [ARGS]

Commands:
  compile <runfolder> [OPTIONS]   Print the demultiplexing command without running it
  run <runfolder> [OPTIONS]       Run the command on the local queue and wait for it
  versions                        List configured tool versions
  logs <runfolder>                Print the tool log for a runfolder
  help                            Show this help

Options:
  --config <path>                 Config file (default: ~/.config/demuxq/config.toml)
  -h, --help                      Show this help
  -V, --version                   Show version

Run Options:
  --tool-version <version>        Tool version (default: derived from the instrument)
  --output <dir>                  Output directory (default: <default_output_path>/<runfolder>)
  --sample-sheet <file>           Use this sample sheet instead of the runfolder's
  --barcode-mismatches <n>        Allowed index mismatches
  --tiles <pattern>               Only process matching tiles
  --base-mask <mask>              Base mask override, passed to the tool as given
  --create-index-fastqs           Also write FASTQ files for index reads
  --extra-args <args>             Appended verbatim to the command line
  --cores <n>                     Cores to use (default: all)

Examples:
  demuxq compile 150415_ST-E00215_0091_AC6281ANXX
  demuxq run 150415_ST-E00215_0091_AC6281ANXX --barcode-mismatches 0
  demuxq logs 150415_ST-E00215_0091_AC6281ANXX
"#,
        env!("CARGO_PKG_VERSION")
    );
}

/// Remove `--config <path>` / `--config=<path>` from anywhere in `args`.
fn take_config_flag(args: Vec<String>) -> Result<(Option<PathBuf>, Vec<String>)> {
    let mut config = None;
    let mut rest = Vec::with_capacity(args.len());
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        if let Some(path) = arg.strip_prefix("--config=") {
            config = Some(PathBuf::from(path));
        } else if arg == "--config" {
            let path = iter.next().context("--config requires a path")?;
            config = Some(PathBuf::from(path));
        } else {
            rest.push(arg);
        }
    }
    Ok((config, rest))
}

/// Parse `<runfolder> [OPTIONS]` into a runfolder name and a request.
fn parse_run_args(args: &[String]) -> Result<(String, RunRequest)> {
    let mut runfolder: Option<String> = None;
    let mut request = RunRequest::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag, Some(value.to_string())),
            _ => (arg.as_str(), None),
        };
        let mut value = |name: &str| -> Result<String> {
            match &inline {
                Some(v) => Ok(v.clone()),
                None => iter
                    .next()
                    .cloned()
                    .with_context(|| format!("{name} requires a value")),
            }
        };

        match flag {
            "--tool-version" => request.tool_version = Some(value(flag)?),
            "--output" => request.output = Some(PathBuf::from(value(flag)?)),
            "--sample-sheet" => {
                let path = value(flag)?;
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read sample sheet: {path}"))?;
                request.sample_sheet = Some(content);
            }
            "--barcode-mismatches" => {
                let n = value(flag)?;
                request.barcode_mismatches =
                    Some(n.parse().with_context(|| format!("invalid mismatch count: {n}"))?);
            }
            "--tiles" => request.tiles = Some(value(flag)?),
            "--base-mask" => request.base_mask = Some(value(flag)?),
            "--create-index-fastqs" => request.create_index_fastqs = true,
            "--extra-args" => request.extra_args = Some(value(flag)?),
            "--cores" => {
                let n = value(flag)?;
                request.core_count =
                    Some(n.parse().with_context(|| format!("invalid core count: {n}"))?);
            }
            other if other.starts_with('-') => bail!("unknown option: {other}"),
            name => {
                if runfolder.replace(name.to_string()).is_some() {
                    bail!("only one runfolder may be given");
                }
            }
        }
    }

    let runfolder = runfolder.context("a runfolder name is required")?;
    Ok((runfolder, request))
}

fn load_settings(config_path: Option<PathBuf>) -> Result<ServiceConfig> {
    match config_path {
        Some(path) => ServiceConfig::load_from(&path)
            .with_context(|| format!("Failed to load config: {}", path.display())),
        None => ServiceConfig::load().context("Failed to load config"),
    }
}

fn build_service(settings: ServiceConfig) -> Result<DemuxService> {
    let queue = Arc::new(LocalQueue::new(settings.total_cores()));
    DemuxService::new(settings, queue).context("Invalid configuration")
}

/// Print the compiled command.
fn run_compile(config_path: Option<PathBuf>, runfolder: &str, request: RunRequest) -> Result<ExitCode> {
    let service = build_service(load_settings(config_path)?)?;
    let compiled = service.compile(runfolder, request)?;
    println!("{}", compiled.command);
    Ok(ExitCode::SUCCESS)
}

/// Start a job on the local queue and wait until it reaches a terminal state.
fn run_job(config_path: Option<PathBuf>, runfolder: &str, request: RunRequest) -> Result<ExitCode> {
    let settings = load_settings(config_path)?;
    let poll = Duration::from_millis(settings.poll_interval_ms.max(1));
    let service = build_service(settings)?;

    let rt = tokio::runtime::Runtime::new()?;
    let state = rt.block_on(async {
        let started = service.start(runfolder, request).await?;
        println!("{}", serde_json::to_string_pretty(&started)?);

        loop {
            let state = service.status(started.job_id).await;
            if state.is_terminal() {
                tracing::info!("Job {} finished: {}", started.job_id, state);
                return Ok::<_, anyhow::Error>(state);
            }
            tokio::time::sleep(poll).await;
        }
    })?;

    println!("{state}");
    if state == JobState::Done {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn run_versions(config_path: Option<PathBuf>) -> Result<ExitCode> {
    let settings = load_settings(config_path)?;
    settings.validate().context("Invalid configuration")?;
    for version in settings.version_names() {
        println!("{version}");
    }
    Ok(ExitCode::SUCCESS)
}

fn run_logs(config_path: Option<PathBuf>, runfolder: &str) -> Result<ExitCode> {
    let service = build_service(load_settings(config_path)?)?;
    let rt = tokio::runtime::Runtime::new()?;
    let log = rt.block_on(service.read_log(runfolder))?;
    print!("{log}");
    Ok(ExitCode::SUCCESS)
}
