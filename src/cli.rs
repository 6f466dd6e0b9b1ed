use crate::cache::LayoutCache;
use crate::config::{Config, StrategyKind, load_config};
use crate::engine::LayoutEngine;
use crate::ir::{Direction, SystemData};
use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "archlayout",
    version,
    about = "Lay out a nested component/connection tree as positioned boxes and routed edges"
)]
pub struct Args {
    /// Input file (system JSON) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file for the layout JSON. Defaults to stdout.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Config JSON file (layout options, camelCase)
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Layout strategy, overriding the config file
    #[arg(short = 's', long = "strategy", value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Flow direction, overriding the config file
    #[arg(short = 'd', long = "direction", value_enum)]
    pub direction: Option<DirectionArg>,

    /// Layout cache file, loaded before and saved after the run
    #[arg(long = "cacheFile")]
    pub cache_file: Option<PathBuf>,

    /// Emit single-line JSON
    #[arg(long = "compact")]
    pub compact: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum StrategyArg {
    Hierarchical,
    Concentric,
}

impl From<StrategyArg> for StrategyKind {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Hierarchical => StrategyKind::Hierarchical,
            StrategyArg::Concentric => StrategyKind::Concentric,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum DirectionArg {
    #[value(name = "LR", alias = "lr")]
    LeftRight,
    #[value(name = "TD", alias = "td", alias = "TB")]
    TopDown,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::LeftRight => Direction::LeftRight,
            DirectionArg::TopDown => Direction::TopDown,
        }
    }
}

pub fn run() -> Result<()> {
    // RUST_LOG controls verbosity; library records arrive via tracing's log bridge.
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .try_init();

    let args = Args::parse();
    let config = resolve_config(&args)?;

    let input = read_input(args.input.as_deref())?;
    let data = SystemData::from_json(&input)?;

    let cache_path = args.cache_file.clone().or_else(|| config.cache.path.clone());
    let mut engine = LayoutEngine::new(config.layout.clone());
    let cache = if config.cache.enabled {
        let cache = match cache_path.as_deref() {
            Some(path) => LayoutCache::load(path),
            None => LayoutCache::new(),
        };
        let cache = Arc::new(cache);
        engine = engine.with_cache(Arc::clone(&cache));
        Some(cache)
    } else {
        None
    };

    let layout = engine.layout_sync(&data)?;
    let json = if args.compact {
        serde_json::to_string(&layout)?
    } else {
        serde_json::to_string_pretty(&layout)?
    };
    write_output(&json, args.output.as_deref())?;

    if let (Some(cache), Some(path)) = (cache, cache_path.as_deref()) {
        cache.save(path)?;
    }
    Ok(())
}

fn resolve_config(args: &Args) -> Result<Config> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(strategy) = args.strategy {
        config.layout.strategy = strategy.into();
    }
    if let Some(direction) = args.direction {
        config.layout.direction = direction.into();
    }
    Ok(config)
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path {
        if path != Path::new("-") {
            return std::fs::read_to_string(path)
                .map_err(|err| anyhow::anyhow!("reading {}: {err}", path.display()));
        }
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn write_output(json: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, json)?,
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(json.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }
    Ok(())
}
