use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufWriter, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use vulnreport::{config::Config, Report, Severity};

/// Exit codes for CI integration
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const ERROR: u8 = 1;
}

#[derive(Parser)]
#[command(name = "vulnreport")]
#[command(author, version, about = "Render vulnerability scan reports")]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a JSON scan report
    Render(RenderArgs),

    /// Show or create config file
    Config {
        /// Generate default config file
        #[arg(long)]
        init: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

#[derive(Args, Debug, Default)]
struct RenderArgs {
    /// JSON report to read; stdin when omitted or "-"
    input: Option<PathBuf>,

    /// Output format (table, json, template)
    #[arg(short, long)]
    format: Option<String>,

    /// Comma separated severities to show in tables, e.g. HIGH,CRITICAL
    #[arg(short, long, value_delimiter = ',')]
    severity: Option<Vec<Severity>>,

    /// Compact tables without the title column
    #[arg(long)]
    light: bool,

    /// Template text, or @path to a template file
    #[arg(short, long)]
    template: Option<String>,

    /// Write output to file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Exit code when vulnerabilities are found
    #[arg(long)]
    exit_code: Option<u8>,
}

/// Render settings after applying flags over the config file.
#[derive(Debug, PartialEq)]
struct RenderOptions {
    format: String,
    severities: Vec<Severity>,
    light: bool,
    template: String,
    exit_code: u8,
}

impl RenderOptions {
    fn resolve(args: &RenderArgs, config: &Config) -> Self {
        Self {
            format: args
                .format
                .clone()
                .unwrap_or_else(|| config.default_format.clone()),
            severities: args
                .severity
                .clone()
                .unwrap_or_else(|| config.severities.clone()),
            light: args.light || config.light,
            template: args
                .template
                .clone()
                .or_else(|| config.template.clone())
                .unwrap_or_default(),
            exit_code: args.exit_code.unwrap_or(config.exit_code),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr) // Log to stderr, results to stdout
        .init();
}

fn run(cli: Cli) -> Result<u8> {
    match cli.command {
        Commands::Render(args) => {
            let config = Config::load().context("failed to load config")?;
            render(&args, &config)
        }
        Commands::Config { init, path } => {
            handle_config(init, path)?;
            Ok(exit_codes::SUCCESS)
        }
    }
}

fn render(args: &RenderArgs, config: &Config) -> Result<u8> {
    let options = RenderOptions::resolve(args, config);
    debug!(?options, "resolved render options");

    if options.format == "template" && options.template.is_empty() {
        warn!("template format selected without a template; output will be empty");
    }

    let report = read_report(args.input.as_deref())?;

    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create output file {}", path.display()))?;
            write_report(&options, BufWriter::new(file), &report)?;
        }
        None => write_report(&options, io::stdout().lock(), &report)?,
    }

    Ok(exit_code(&options, &report))
}

fn write_report<W: io::Write>(options: &RenderOptions, output: W, report: &Report) -> Result<()> {
    vulnreport::write(
        &options.format,
        output,
        &options.severities,
        report,
        &options.template,
        options.light,
    )?;
    Ok(())
}

fn exit_code(options: &RenderOptions, report: &Report) -> u8 {
    if options.exit_code != 0 && report.results.failed() {
        options.exit_code
    } else {
        exit_codes::SUCCESS
    }
}

fn read_report(input: Option<&std::path::Path>) -> Result<Report> {
    let mut content = String::new();
    match input {
        Some(path) if path.as_os_str() != "-" => {
            File::open(path)
                .and_then(|mut f| f.read_to_string(&mut content))
                .with_context(|| format!("failed to read report {}", path.display()))?;
        }
        _ => {
            io::stdin()
                .read_to_string(&mut content)
                .context("failed to read report from stdin")?;
        }
    }
    serde_json::from_str(&content).context("failed to parse report JSON")
}

fn handle_config(init: bool, show_path: bool) -> Result<()> {
    let config_path = Config::config_path();

    if show_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config file already exists at: {}", config_path.display());
            return Ok(());
        }

        Config::default().save()?;
        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Default configuration:");
        println!("{}", Config::generate_default_config());
        return Ok(());
    }

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        println!("Config file: {}", config_path.display());
        println!();
        println!("{}", content);
    } else {
        println!("No config file found.");
        println!("Run 'vulnreport config --init' to create one.");
        println!();
        println!("Config path: {}", config_path.display());
    }

    Ok(())
}
