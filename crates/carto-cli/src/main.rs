//! Carto command line
//!
//! Territory expression tools, render submission, and the isolated worker
//! entry point that `render` launches for every task.

mod config;
mod renderer;

use anyhow::{bail, Context};
use carto_render::{run_worker, Category, TaskDescriptor, TaskOrchestrator};
use carto_territory::{ExpressionTree, MapDocument, MapSync, TreeParser, TreeSerializer};
use clap::{value_parser, Arg, ArgMatches, Command};
use config::{CartoConfig, LogFormat};
use renderer::{check_payload, MapRenderer};
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn input_arg() -> Arg {
    Arg::new("input")
        .value_parser(value_parser!(PathBuf))
        .help("Input file, or `-` for stdin (default)")
}

fn cli() -> Command {
    Command::new("carto")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Territory expressions and isolated map rendering")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .subcommand(Command::new("worker").about("Render one task from stdin (started by `render`)"))
        .subcommand(
            Command::new("render")
                .about("Render a task in an isolated worker and print the artifact")
                .arg(
                    Arg::new("category")
                        .long("category")
                        .required(true)
                        .help("Task category: picker, territory_library, code or builder"),
                )
                .arg(
                    Arg::new("payload")
                        .long("payload")
                        .value_parser(value_parser!(PathBuf))
                        .help("JSON payload file, or `-` for stdin"),
                ),
        )
        .subcommand(
            Command::new("parse")
                .about("Parse a territory expression into builder JSON")
                .arg(Arg::new("expression").required(true)),
        )
        .subcommand(
            Command::new("serialize")
                .about("Serialize builder JSON into a territory expression")
                .arg(input_arg()),
        )
        .subcommand(
            Command::new("sync")
                .about("Convert between map code and builder documents")
                .subcommand_required(true)
                .subcommand(Command::new("code-to-builder").arg(input_arg()))
                .subcommand(Command::new("builder-to-code").arg(input_arg())),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    let config_path = matches.get_one::<PathBuf>("config").cloned();
    let config = CartoConfig::load(config_path.as_deref())?;
    init_tracing(&config)?;

    match matches.subcommand() {
        Some(("worker", _)) => worker(&config),
        Some(("render", args)) => render(&config, config_path.as_deref(), args).await,
        Some(("parse", args)) => parse(&config, args),
        Some(("serialize", args)) => serialize(&config, args),
        Some(("sync", args)) => match args.subcommand() {
            Some(("code-to-builder", args)) => code_to_builder(&config, args),
            Some(("builder-to-code", args)) => builder_to_code(&config, args),
            _ => bail!("unknown sync direction"),
        },
        _ => bail!("unknown command"),
    }
}

/// Log to stderr; stdout is reserved for command output
fn init_tracing(config: &CartoConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_filter)
            .with_context(|| format!("invalid log filter `{}`", config.log_filter))?,
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = match config.log_format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install logger: {e}"))
}

fn worker(config: &CartoConfig) -> anyhow::Result<()> {
    let renderer = MapRenderer::new(config.territory);
    let message = run_worker(std::io::stdin().lock(), std::io::stdout().lock(), &renderer)?;
    tracing::debug!(?message, "worker finished");
    Ok(())
}

async fn render(config: &CartoConfig, config_path: Option<&Path>, args: &ArgMatches) -> anyhow::Result<()> {
    let category = args
        .get_one::<String>("category")
        .map(|c| Category::new(c.as_str()))
        .context("missing --category")?;
    let payload = match args.get_one::<PathBuf>("payload") {
        Some(path) => read_json(Some(path))?,
        None => Value::Null,
    };
    check_payload(&category, &payload)?;

    let mut render_config = config.render.clone();
    // Workers re-read the same configuration file
    if let Some(path) = config_path {
        if render_config.worker.program.is_none() {
            let mut args = vec!["--config".to_string(), path.display().to_string()];
            args.append(&mut render_config.worker.args);
            render_config.worker.args = args;
        }
    }

    let orchestrator = TaskOrchestrator::new(render_config);
    let outcome = orchestrator.submit(TaskDescriptor::new(category, payload)).await?;
    tracing::info!(fingerprint = %outcome.fingerprint.short(), "render finished");
    println!("{}", serde_json::to_string_pretty(&*outcome.artifact)?);
    Ok(())
}

fn parse(config: &CartoConfig, args: &ArgMatches) -> anyhow::Result<()> {
    let Some(expression) = args.get_one::<String>("expression") else {
        bail!("missing expression");
    };
    let parsed = TreeParser::with_config(config.territory).parse_expression(expression)?;
    for warning in &parsed.warnings {
        eprintln!("warning: {warning}");
    }
    println!("{}", serde_json::to_string_pretty(&parsed.tree.to_builder_json())?);
    Ok(())
}

fn serialize(config: &CartoConfig, args: &ArgMatches) -> anyhow::Result<()> {
    let builder = read_json(args.get_one::<PathBuf>("input"))?;
    let tree = ExpressionTree::from_builder_json_with_depth(&builder, config.territory.max_depth)?;
    println!("{}", TreeSerializer::new().serialize(&tree)?);
    Ok(())
}

fn code_to_builder(config: &CartoConfig, args: &ArgMatches) -> anyhow::Result<()> {
    let code = read_input(args.get_one::<PathBuf>("input"))?;
    let synced = MapSync::with_config(config.territory).code_to_document(&code)?;
    for warning in &synced.warnings {
        eprintln!("warning: {warning}");
    }
    println!("{}", serde_json::to_string_pretty(&synced.document)?);
    Ok(())
}

fn builder_to_code(config: &CartoConfig, args: &ArgMatches) -> anyhow::Result<()> {
    let document: MapDocument =
        serde_json::from_value(read_json(args.get_one::<PathBuf>("input"))?).context("invalid builder document")?;
    print!("{}", MapSync::with_config(config.territory).document_to_code(&document)?);
    Ok(())
}

fn read_input(path: Option<&PathBuf>) -> anyhow::Result<String> {
    match path {
        Some(path) if path.as_os_str() != "-" => {
            std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
        }
        _ => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text).context("failed to read stdin")?;
            Ok(text)
        }
    }
}

fn read_json(path: Option<&PathBuf>) -> anyhow::Result<Value> {
    let text = read_input(path)?;
    serde_json::from_str(&text).context("input is not valid JSON")
}
