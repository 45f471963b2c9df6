//! Fixtape CLI

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context};
use bytes::Bytes;
use fixtape::storage::{list_fixtures, FIXTURE_EXTENSION};
use fixtape::{Config, Interceptor, Mode, Recorder};
use http_body_util::{BodyExt, Empty};
use hyper::Request;
use tracing_subscriber::EnvFilter;

fn usage() -> ! {
    eprintln!("Fixtape v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: fixtape <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  fetch <url> [--mode <mode>] [--config <file>]   GET a URL through the recorder");
    eprintln!("  stats <fixtures-dir>                            Count fixtures per host");
    eprintln!();
    eprintln!("Modes: record, replay, rerecord, bypass (alias: ignore)");
    process::exit(1);
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        usage();
    }

    let result = match args[1].as_str() {
        "fetch" => fetch(&args[2..]).await,
        "stats" => match args.get(2) {
            Some(dir) => show_stats(Path::new(dir)),
            None => {
                eprintln!("Usage: fixtape stats <fixtures-dir>");
                process::exit(1);
            }
        },
        command => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'fixtape' for usage information.");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn fetch(args: &[String]) -> anyhow::Result<()> {
    let mut url = None;
    let mut mode = None;
    let mut config_path = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--mode" => {
                let value = iter.next().context("--mode needs a value")?;
                mode = Some(value.parse::<Mode>()?);
            }
            "--config" => {
                let value = iter.next().context("--config needs a value")?;
                config_path = Some(PathBuf::from(value));
            }
            other if other.starts_with("--") => bail!("Unknown option: {other}"),
            other => url = Some(other.to_string()),
        }
    }

    let Some(url) = url else {
        bail!("Usage: fixtape fetch <url> [--mode <mode>] [--config <file>]");
    };

    let mut config = match config_path {
        Some(path) => Config::from_file(&path)?,
        None => Config::discover(&std::env::current_dir()?)?,
    };
    if mode.is_some() {
        config.mode = mode;
    }

    let recorder = fixtape::install(Recorder::new(config)?);
    let interceptor = Interceptor::new(recorder.clone());

    let request = Request::get(url.as_str())
        .header(hyper::header::USER_AGENT, concat!("fixtape/", env!("CARGO_PKG_VERSION")))
        .body(Empty::<Bytes>::new())
        .with_context(|| format!("Invalid URL: {url}"))?;

    let response = interceptor.send(request).await?;
    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .map(http_body_util::Collected::to_bytes)
        .unwrap_or_default();

    recorder.flush().await;

    println!("{status} {url} ({} bytes, mode: {})", body.len(), recorder.mode());
    Ok(())
}

fn show_stats(dir: &Path) -> anyhow::Result<()> {
    if !dir.exists() {
        bail!("Directory not found: {}", dir.display());
    }

    let fixtures = list_fixtures(dir)?;
    let mut per_host: BTreeMap<String, usize> = BTreeMap::new();

    for fixture in &fixtures {
        let host = fixture
            .strip_prefix(dir)
            .ok()
            .and_then(|rel| rel.components().next())
            .map_or_else(
                || "<root>".to_string(),
                |c| c.as_os_str().to_string_lossy().into_owned(),
            );
        *per_host.entry(host).or_default() += 1;
    }

    println!("Fixtures directory: {}", dir.display());
    println!();
    for (host, count) in &per_host {
        println!("  {host:<40} {count:>6}");
    }
    println!();
    println!(
        "{} .{FIXTURE_EXTENSION} fixtures across {} hosts",
        fixtures.len(),
        per_host.len()
    );

    Ok(())
}
