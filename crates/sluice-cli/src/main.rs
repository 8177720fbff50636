//! Sluice CLI - run record pipelines over JSON lines

mod config;
mod io;

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use config::Config;
use indicatif::{ProgressBar, ProgressStyle};
use io::JsonLinesSink;
use sluice_core::{
    BreakerPort, CircuitBreaker, Culture, Node, OverflowPolicy, PortSink, Record, RecordSink,
    SchemaRef, Step, Workflow,
};
use sluice_tools::{ToolContext, build_tool};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Parse --overflow argument.
fn parse_overflow(s: &str) -> Result<OverflowPolicy, String> {
    match s.to_lowercase().as_str() {
        "reject" => Ok(OverflowPolicy::Reject),
        "truncate" => Ok(OverflowPolicy::Truncate),
        _ => Err(format!(
            "Invalid overflow policy '{}'. Use: reject, truncate",
            s
        )),
    }
}

/// Parse --culture argument.
fn parse_culture(s: &str) -> Result<Culture, String> {
    Culture::from_name(s).map_err(|e| e.to_string())
}

/// Output verbosity level.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    fn from_flags(verbose: bool, quiet: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }

    /// Default log filter when `RUST_LOG` is unset.
    fn filter(self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "debug",
        }
    }

    /// Summary lines go to stderr; stdout may carry records.
    fn result(self, msg: &str) {
        if !matches!(self, Verbosity::Quiet) {
            eprintln!("{msg}");
        }
    }
}

fn init_tracing(v: Verbosity) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(v.filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[derive(Parser)]
#[command(name = "sluice")]
#[command(about = "Record pipelines over typed tabular data", long_about = None)]
struct Cli {
    /// Verbose output (show debug info)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet output (only errors)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to config file (default: ~/.config/sluice/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow over JSON-lines records
    Run {
        /// Workflow file (YAML, TOML, or JSON)
        workflow: PathBuf,
        /// Input records, one JSON object per line
        #[arg(short, long)]
        input: PathBuf,
        /// Breaker records; any record here blocks the main stream
        #[arg(long)]
        breaker: Option<PathBuf>,
        /// Output file (use "-" or omit for stdout)
        #[arg(short, long)]
        output: Option<String>,
        /// Culture for parsing and formatting (e.g. en-US, de-DE)
        #[arg(long, value_parser = parse_culture)]
        culture: Option<Culture>,
        /// What to do with values too long for their field: reject, truncate
        #[arg(long, value_parser = parse_overflow)]
        overflow: Option<OverflowPolicy>,
    },

    /// List available tools
    Tools,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Generate man page
    Manpage,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config file
    let config = if let Some(ref path) = cli.config {
        Config::load_from_path(Some(path.clone()))
    } else {
        Config::load()
    };

    // Apply config defaults, CLI flags override
    let verbose = cli.verbose || config.defaults.verbose;
    let quiet = cli.quiet || config.defaults.quiet;
    let verbosity = Verbosity::from_flags(verbose, quiet);
    init_tracing(verbosity);

    match cli.command {
        Commands::Run {
            workflow,
            input,
            breaker,
            output,
            culture,
            overflow,
        } => {
            let args = RunArgs {
                workflow,
                input,
                breaker,
                output,
                culture,
                overflow,
            };
            cmd_run(&config, args, verbosity)
        }
        Commands::Tools => cmd_tools(verbosity),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "sluice", &mut std::io::stdout());
            Ok(())
        }
        Commands::Manpage => {
            let cmd = Cli::command();
            let man = clap_mangen::Man::new(cmd);
            man.render(&mut std::io::stdout())?;
            Ok(())
        }
    }
}

fn cmd_tools(v: Verbosity) -> Result<()> {
    let tools = sluice_tools::tools();
    if !matches!(v, Verbosity::Quiet) {
        println!("Available tools ({}):", tools.len());
        println!();
    }
    for tool in tools {
        println!("  {:<20} {}", tool.id, tool.description);
    }
    Ok(())
}

struct RunArgs {
    workflow: PathBuf,
    input: PathBuf,
    breaker: Option<PathBuf>,
    output: Option<String>,
    culture: Option<Culture>,
    overflow: Option<OverflowPolicy>,
}

fn cmd_run(config: &Config, args: RunArgs, v: Verbosity) -> Result<()> {
    let data = std::fs::read(&args.workflow)
        .with_context(|| format!("Failed to read workflow {}", args.workflow.display()))?;
    let workflow = Workflow::from_bytes(&data, args.workflow.to_str())
        .with_context(|| format!("Invalid workflow {}", args.workflow.display()))?;
    workflow.validate()?;

    // CLI flags, then the workflow, then the config file
    let context = ToolContext {
        culture: args
            .culture
            .or_else(|| workflow.culture.clone())
            .or_else(|| config.defaults.culture.clone())
            .unwrap_or_default(),
        overflow: args
            .overflow
            .or(workflow.overflow)
            .or(config.defaults.overflow)
            .unwrap_or_default(),
    };
    info!(
        workflow = %args.workflow.display(),
        steps = workflow.steps.len(),
        culture = context.culture.name(),
        "running workflow"
    );

    let schema = workflow.schema()?.into_ref();
    let breaker = match (workflow.breaker_schema()?, args.breaker) {
        (Some(schema), Some(path)) => Some((schema.into_ref(), path)),
        (Some(_), None) => bail!("Workflow declares a breaker stream; pass --breaker"),
        (None, Some(_)) => bail!("Workflow declares no breaker fields"),
        (None, None) => None,
    };

    let records = io::read_records(&args.input, &schema, &context.culture, context.overflow)?;

    let writer: Box<dyn Write> = match args.output.as_deref() {
        None | Some("-") => Box::new(BufWriter::new(std::io::stdout())),
        Some(path) => Box::new(BufWriter::new(
            std::fs::File::create(path).with_context(|| format!("Failed to create {path}"))?,
        )),
    };
    let sink = JsonLinesSink::new(writer, progress_bar(v)?);
    let report = sink.report();
    let chain = build_chain(&workflow.steps, &context, Box::new(sink))?;

    let accepted = match breaker {
        None => {
            let mut chain = chain;
            feed(&mut chain, schema, &records)?
        }
        Some((breaker_schema, path)) => {
            let alerts = io::read_records(&path, &breaker_schema, &context.culture, context.overflow)?;
            let mut node = CircuitBreaker::new(chain)
                .on_complete(|| debug!("breaker stage complete"));
            {
                let mut port = node.inbound(BreakerPort::Breaker);
                port.init(breaker_schema)?;
                for record in &alerts {
                    port.push(record)?;
                }
                port.close();
            }
            if node.is_tripped() {
                warn!(alerts = alerts.len(), "breaker tripped; main stream discarded");
            }
            let mut main = PortSink::new(node, BreakerPort::Main);
            feed(&mut main, schema, &records)?
        }
    };

    let mut report = report.borrow_mut();
    if let Some(err) = report.error.take() {
        return Err(err).context("Failed to write output");
    }
    v.result(&format!(
        "Completed: {} of {} records accepted, {} written",
        accepted,
        records.len(),
        report.written
    ));
    Ok(())
}

/// Chain the workflow's tools in front of `sink`, last step first.
fn build_chain(
    steps: &[Step],
    context: &ToolContext,
    sink: Box<dyn RecordSink>,
) -> Result<Box<dyn RecordSink>> {
    steps.iter().rev().try_fold(sink, |downstream, step| {
        build_tool(step, context, downstream)
            .with_context(|| format!("Failed to build step {}", step.label()))
    })
}

/// Push every record through `sink`, reporting progress, then close it.
/// Returns how many records were accepted.
fn feed(sink: &mut impl RecordSink, schema: SchemaRef, records: &[Record]) -> Result<usize> {
    if !sink.init(schema) {
        sink.close();
        bail!("Pipeline rejected the input schema");
    }
    let total = records.len();
    let mut accepted = 0;
    for (i, record) in records.iter().enumerate() {
        if sink.push(record) {
            accepted += 1;
        }
        sink.update_progress((i + 1) as f64 / total as f64);
    }
    sink.close();
    Ok(accepted)
}

fn progress_bar(v: Verbosity) -> Result<Option<ProgressBar>> {
    if matches!(v, Verbosity::Quiet) {
        return Ok(None);
    }
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {percent}%")?
            .progress_chars("=> "),
    );
    Ok(Some(pb))
}
