//! Wirecord CLI

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use wirecord::context::META_TEST_METHOD;
use wirecord::engine::{EngineConfig, HttpMockEngine, MockEngine, RecordSpec};
use wirecord::mapping::{load_mappings, MAPPINGS_DIR};
use wirecord::ConsoleNotifier;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wirecord=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "serve" => serve(&args[2..]).await,
        "record" => record(&args[2..]).await,
        "stats" => stats(&args[2..]),
        command => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'wirecord' for usage information.");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    eprintln!("Wirecord v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: wirecord <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  serve  <root> [port]           Replay mappings from <root>/mappings");
    eprintln!("  record <target> <root> [port]  Record traffic to <target>, Ctrl-C to save");
    eprintln!("  stats  <root>                  Show mapping counts per test");
}

fn parse_port(arg: Option<&String>) -> Result<Option<u16>> {
    arg.map(|p| p.parse::<u16>().with_context(|| format!("invalid port '{p}'")))
        .transpose()
}

async fn start_engine(root: &Path, port: Option<u16>) -> Result<HttpMockEngine> {
    let config = EngineConfig::new(root)
        .with_port(port)
        .with_notifier(Arc::new(ConsoleNotifier::new(true)))
        .with_response_templating(true);

    let engine = HttpMockEngine::start(config)
        .await
        .with_context(|| format!("starting mock engine for {}", root.display()))?;
    println!("Listening on {}", engine.base_url());
    Ok(engine)
}

async fn serve(args: &[String]) -> Result<()> {
    let Some(root) = args.first() else {
        bail!("Usage: wirecord serve <root> [port]");
    };

    let engine = start_engine(Path::new(root), parse_port(args.get(1))?).await?;
    println!("Serving {} stub mapping(s)", engine.stub_mappings().len());

    tokio::signal::ctrl_c().await?;
    engine.stop().await;
    Ok(())
}

async fn record(args: &[String]) -> Result<()> {
    let (Some(target), Some(root)) = (args.first(), args.get(1)) else {
        bail!("Usage: wirecord record <target> <root> [port]");
    };

    let engine = start_engine(Path::new(root), parse_port(args.get(2))?).await?;
    engine
        .start_recording(RecordSpec::for_target(target).make_stubs_persistent(true))
        .await?;
    println!("Recording {target}, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    let records = engine.stop_recording().await?;
    println!("Captured {} stub mapping(s)", records.len());
    engine.stop().await;
    Ok(())
}

fn stats(args: &[String]) -> Result<()> {
    let Some(root) = args.first() else {
        bail!("Usage: wirecord stats <root>");
    };

    let dir = PathBuf::from(root).join(MAPPINGS_DIR);
    if !dir.is_dir() {
        bail!("Directory not found: {}", dir.display());
    }

    let mappings = load_mappings(&dir)?;
    let mut per_test: BTreeMap<String, usize> = BTreeMap::new();
    for (_, record) in &mappings {
        let test = record
            .metadata_value(META_TEST_METHOD)
            .unwrap_or("<untagged>")
            .to_string();
        *per_test.entry(test).or_default() += 1;
    }

    println!("Mappings directory: {}", dir.display());
    println!("Total mappings: {}", mappings.len());
    println!();
    for (test, count) in &per_test {
        println!("  {test}: {count}");
    }

    Ok(())
}
