//! `stencil` - render templates or warm the program cache from the shell.
//!
//! ```text
//! stencil render users/list.html --data users.json
//! stencil --strategy registry compile users/list.html users/show.html
//! ```
//!
//! Logging goes to stderr and follows `RUST_LOG`; `-v` and `-vv` raise it to
//! debug and trace.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use stencil::{CacheKind, DataPool, Engine, EngineConfig};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stencil", version, about = "Compile and render stencil templates")]
struct Cli {
    /// YAML engine configuration
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Base directory for template paths
    #[arg(long, global = true, value_name = "DIR")]
    template_dir: Option<PathBuf>,

    /// Where compiled programs are stored
    #[arg(long, global = true, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Cache strategy: directory or registry
    #[arg(long, global = true)]
    strategy: Option<CacheKind>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a template to stdout
    Render {
        template: PathBuf,
        /// JSON object used as the data pool
        #[arg(long, value_name = "FILE")]
        data: Option<PathBuf>,
    },
    /// Compile templates into the cache
    Compile {
        #[arg(required = true)]
        templates: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    run(cli, &mut out)
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("stencil=debug"),
        _ => EnvFilter::new("stencil=trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli, out: &mut impl Write) -> Result<()> {
    let config = load_config(&cli)?;
    let engine = Engine::new(config).context("failed to set up the engine")?;

    match &cli.command {
        Command::Render { template, data } => {
            let pool = match data {
                Some(path) => load_pool(path)?,
                None => DataPool::new(),
            };
            let html = engine
                .render_template(template, &pool)
                .with_context(|| format!("failed to render {}", template.display()))?;
            out.write_all(html.as_bytes())?;
        }
        Command::Compile { templates } => {
            for template in templates {
                let before = engine.compile_count();
                let program = engine
                    .compile_file(template)
                    .with_context(|| format!("failed to compile {}", template.display()))?;
                let status = if engine.compile_count() > before {
                    "compiled"
                } else {
                    "cached"
                };
                writeln!(
                    out,
                    "{:<8} {} ({} instructions)",
                    status,
                    template.display(),
                    program.len()
                )?;
            }
        }
    }

    engine.flush().context("failed to flush the cache")?;
    Ok(())
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_yaml_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = &cli.template_dir {
        config = config.with_template_dir(dir);
    }
    if let Some(dir) = &cli.cache_dir {
        config = config.with_cache_dir(dir);
    }
    if let Some(strategy) = cli.strategy {
        config = config.with_strategy(strategy);
    }
    debug!(?config, "resolved configuration");
    Ok(config)
}

fn load_pool(path: &Path) -> Result<DataPool> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read data file {}", path.display()))?;
    let json: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    DataPool::from_json(json).with_context(|| format!("{} is not a usable data pool", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("stencil").chain(args.iter().copied())).unwrap()
    }

    fn site() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("views")).unwrap();
        fs::write(
            dir.path().join("views/hello.html"),
            "<p>Hi <tpl:var name=\"name\" escape=\"html\"/></p>",
        )
        .unwrap();
        fs::write(dir.path().join("data.json"), r#"{"name": "<Ada>"}"#).unwrap();
        dir
    }

    fn run_to_string(cli: Cli) -> Result<String> {
        let mut out = Vec::new();
        run(cli, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    // ========================================================================
    // Argument parsing
    // ========================================================================

    #[test]
    fn test_global_flags_after_subcommand() {
        let parsed = cli(&["render", "a.html", "--strategy", "registry", "-vv"]);
        assert_eq!(parsed.strategy, Some(CacheKind::Registry));
        assert_eq!(parsed.verbose, 2);
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        let parsed = Cli::try_parse_from(["stencil", "--strategy", "redis", "render", "a.html"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_compile_requires_a_template() {
        assert!(Cli::try_parse_from(["stencil", "compile"]).is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = site();
        let config_path = dir.path().join("stencil.yaml");
        fs::write(&config_path, "template_dir: views\ncache:\n  dir: from-file\n").unwrap();
        let parsed = cli(&[
            "--config",
            config_path.to_str().unwrap(),
            "--cache-dir",
            "elsewhere",
            "render",
            "hello.html",
        ]);

        let config = load_config(&parsed).unwrap();
        assert_eq!(config.template_dir, dir.path().join("views"));
        assert_eq!(config.cache.dir, PathBuf::from("elsewhere"));
    }

    // ========================================================================
    // Commands
    // ========================================================================

    #[test]
    fn test_render_with_data() {
        let dir = site();
        let root = dir.path().to_str().unwrap();
        let out = run_to_string(cli(&[
            "--template-dir",
            &format!("{root}/views"),
            "--cache-dir",
            &format!("{root}/cache"),
            "render",
            "hello.html",
            "--data",
            &format!("{root}/data.json"),
        ]))
        .unwrap();
        assert_eq!(out, "<p>Hi &lt;Ada&gt;</p>");
    }

    #[test]
    fn test_render_missing_key_reports_template() {
        let dir = site();
        let root = dir.path().to_str().unwrap();
        let err = run_to_string(cli(&[
            "--template-dir",
            &format!("{root}/views"),
            "--cache-dir",
            &format!("{root}/cache"),
            "render",
            "hello.html",
        ]))
        .unwrap_err();
        assert!(format!("{err:#}").contains("hello.html"), "{err:#}");
    }

    #[test]
    fn test_compile_reports_cache_state() {
        let dir = site();
        let root = dir.path().to_str().unwrap();
        let args = [
            "--template-dir",
            &format!("{root}/views"),
            "--cache-dir",
            &format!("{root}/cache"),
            "--strategy",
            "registry",
            "compile",
            "hello.html",
        ];

        let first = run_to_string(cli(&args)).unwrap();
        assert!(first.starts_with("compiled hello.html"), "{first}");
        assert!(dir.path().join("cache/registry.json").is_file());

        let second = run_to_string(cli(&args)).unwrap();
        assert!(second.starts_with("cached   hello.html"), "{second}");
    }

    #[test]
    fn test_bad_data_file() {
        let dir = site();
        fs::write(dir.path().join("data.json"), "[1, 2]").unwrap();
        let err = load_pool(&dir.path().join("data.json")).unwrap_err();
        assert!(format!("{err:#}").contains("data.json"));
    }
}
