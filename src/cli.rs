//! Command-line interface definitions using clap.

use blastpool::config::{DEFAULT_HIT_FIELDS, default_worker_count};
use blastpool::logging::LogFormat;
use blastpool::parser::DEFAULT_HEADER_PREFIX;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Run BLAST-style alignment queries across a pool of worker processes.
#[derive(Parser, Debug)]
#[command(name = "blastpool")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Worker program to run (e.g. blastn, blastp, blastx).
    pub program: String,

    /// Query file in FASTA format ("-" for stdin).
    #[arg(short = 'i', long, default_value = "-")]
    pub query: PathBuf,

    /// Number of worker processes.
    #[arg(short = 'j', long, env = "BLASTPOOL_WORKERS", default_value_t = default_worker_count())]
    pub workers: usize,

    /// Comma-separated hit fields to request from the worker.
    #[arg(
        long,
        env = "BLASTPOOL_FIELDS",
        value_delimiter = ',',
        default_values_t = DEFAULT_HIT_FIELDS.iter().map(|s| s.to_string())
    )]
    pub fields: Vec<String>,

    /// Valueless worker switch, passed as -NAME (repeatable).
    #[arg(long = "flag", value_name = "NAME")]
    pub flags: Vec<String>,

    /// Worker option, passed as -NAME VALUE (repeatable).
    #[arg(short = 'o', long = "opt", value_name = "NAME=VALUE", value_parser = parse_option)]
    pub options: Vec<(String, String)>,

    /// Prefix of the first line of each worker output block.
    #[arg(long, default_value = DEFAULT_HEADER_PREFIX)]
    pub header_prefix: String,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Enable verbose logging (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all log output except errors.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log format.
    #[arg(long, value_parser = parse_log_format)]
    pub log_format: Option<LogFormat>,

    /// Also write logs to this file (rotated daily).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Disable colored output.
    #[arg(long, env = "NO_COLOR")]
    pub no_color: bool,

    /// Raw arguments placed before the generated worker options.
    #[arg(last = true)]
    pub worker_args: Vec<String>,
}

/// Result output format.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// One JSON object per query result.
    #[default]
    Json,
    /// Query id followed by the raw tab-separated hit line.
    Tsv,
    /// Query id, description and hit count.
    Summary,
}

fn parse_option(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{}'", s)),
    }
}

fn parse_log_format(s: &str) -> Result<LogFormat, String> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["blastpool", "blastn"]).unwrap();
        assert_eq!(cli.program, "blastn");
        assert_eq!(cli.query, PathBuf::from("-"));
        assert_eq!(cli.fields.len(), DEFAULT_HIT_FIELDS.len());
        assert_eq!(cli.header_prefix, "# BLAST");
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(cli.workers >= 1);
        assert!(cli.worker_args.is_empty());
    }

    #[test]
    fn test_options_and_flags() {
        let cli = Cli::try_parse_from([
            "blastpool",
            "blastp",
            "-o",
            "db=pdb",
            "--opt",
            "evalue=1e-5",
            "--flag",
            "ungapped",
            "--fields",
            "sseqid,pident",
            "-j",
            "3",
        ])
        .unwrap();
        assert_eq!(
            cli.options,
            vec![
                ("db".to_string(), "pdb".to_string()),
                ("evalue".to_string(), "1e-5".to_string())
            ]
        );
        assert_eq!(cli.flags, vec!["ungapped"]);
        assert_eq!(cli.fields, vec!["sseqid", "pident"]);
        assert_eq!(cli.workers, 3);
    }

    #[test]
    fn test_bad_option_syntax() {
        assert!(Cli::try_parse_from(["blastpool", "blastn", "-o", "db"]).is_err());
        assert!(Cli::try_parse_from(["blastpool", "blastn", "-o", "=x"]).is_err());
    }

    #[test]
    fn test_worker_args_after_double_dash() {
        let cli =
            Cli::try_parse_from(["blastpool", "sh", "--format", "tsv", "--", "-c", "cat", "w"])
                .unwrap();
        assert_eq!(cli.worker_args, vec!["-c", "cat", "w"]);
        assert_eq!(cli.format, OutputFormat::Tsv);
    }

    #[test]
    fn test_log_format_parse() {
        let cli = Cli::try_parse_from(["blastpool", "blastn", "--log-format", "json"]).unwrap();
        assert_eq!(cli.log_format, Some(LogFormat::Json));
        assert!(Cli::try_parse_from(["blastpool", "blastn", "--log-format", "xml"]).is_err());
    }
}
