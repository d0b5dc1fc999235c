//! blastpool - parallel BLAST query runner

mod cli;

use anyhow::{Context, Result};
use blastpool::logging::{self, LogConfig};
use blastpool::{LaunchSpec, ResultRecord, RunConfig};
use clap::Parser;
use owo_colors::{OwoColorize, Stream::Stderr};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use tracing::Level;

use cli::{Cli, OutputFormat};

fn main() {
    let cli = Cli::parse();

    if cli.no_color {
        owo_colors::set_override(false);
    }
    init_logging(&cli);

    if let Err(e) = run(&cli) {
        eprintln!(
            "{}: {}",
            "error"
                .if_supports_color(Stderr, |text| text.red())
                .if_supports_color(Stderr, |text| text.bold()),
            e
        );
        for cause in e.chain().skip(1) {
            eprintln!(
                "  {}: {}",
                "caused by".if_supports_color(Stderr, |text| text.yellow()),
                cause
            );
        }
        std::process::exit(1);
    }
}

fn init_logging(cli: &Cli) {
    let mut config = LogConfig::new();
    if cli.quiet {
        config = config.with_filter("error".to_string());
    } else if cli.verbose > 0 {
        let level = match cli.verbose {
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };
        config = config.with_filter(level.to_string().to_lowercase());
    }
    if let Some(format) = cli.log_format {
        config = config.with_format(format);
    }
    if let Some(ref path) = cli.log_file {
        config = config.with_file(path.clone());
    }
    logging::init(config.with_env_overrides());
}

fn open_query(cli: &Cli) -> Result<Box<dyn BufRead>> {
    if cli.query.as_os_str() == "-" {
        return Ok(Box::new(io::stdin().lock()));
    }
    let file = File::open(&cli.query)
        .with_context(|| format!("Failed to open query file {}", cli.query.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

fn launch_spec(cli: &Cli) -> LaunchSpec {
    let mut launch = LaunchSpec::new(&cli.program);
    for arg in &cli.worker_args {
        launch = launch.arg(arg);
    }
    for flag in &cli.flags {
        launch = launch.flag(flag);
    }
    for (name, value) in &cli.options {
        launch = launch.option(name, value);
    }
    launch
}

fn run(cli: &Cli) -> Result<()> {
    let config = RunConfig::new()
        .with_workers(cli.workers)
        .with_fields(cli.fields.iter().cloned())
        .with_header_prefix(&cli.header_prefix);
    let launch = launch_spec(cli);
    let input = open_query(cli)?;

    let mut results = blastpool::run(&launch, input, &config)
        .with_context(|| format!("Failed to start {} workers", cli.program))?;

    let mut out = BufWriter::new(io::stdout().lock());
    for result in results.by_ref() {
        let record = result?;
        match write_record(&mut out, &record, cli.format).and_then(|_| out.flush()) {
            Ok(()) => {}
            // Downstream closed (e.g. `| head`); dropping the stream stops the workers.
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => return Ok(()),
            Err(e) => return Err(e).context("Failed to write results"),
        }
    }

    let stats = results.stats();
    tracing::info!(
        workers = stats.workers,
        queries = stats.queries_sent,
        records = stats.records_received,
        "Run complete"
    );
    Ok(())
}

fn write_record(out: &mut impl Write, record: &ResultRecord, format: OutputFormat) -> io::Result<()> {
    let id = record.id.as_deref().unwrap_or("");
    match format {
        OutputFormat::Json => {
            serde_json::to_writer(&mut *out, record)?;
            writeln!(out)
        }
        OutputFormat::Tsv => {
            for hit in &record.hits {
                writeln!(out, "{}\t{}", id, hit.to_line())?;
            }
            Ok(())
        }
        OutputFormat::Summary => writeln!(
            out,
            "{}\t{}\t{}",
            id,
            record.description.as_deref().unwrap_or(""),
            record.hits.len()
        ),
    }
}
