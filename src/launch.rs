//! Worker command-line construction.
//!
//! Switches and `name value` options are passed through to the worker as
//! `-name [value]`. The output format is fixed to tabular-with-comments so the
//! parser's line grammar holds; any attempt to set it is rejected.

use crate::error::{Error, Result};
use std::process::{Command, Stdio};

const OUTFMT: &str = "outfmt";
const TABULAR_WITH_COMMENTS: &str = "7";

/// How to launch one worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    program: String,
    args: Vec<String>,
    flags: Vec<String>,
    options: Vec<(String, String)>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            flags: Vec::new(),
            options: Vec::new(),
        }
    }

    pub fn blastn() -> Self {
        Self::new("blastn")
    }

    pub fn blastp() -> Self {
        Self::new("blastp")
    }

    pub fn blastx() -> Self {
        Self::new("blastx")
    }

    pub fn tblastn() -> Self {
        Self::new("tblastn")
    }

    pub fn tblastx() -> Self {
        Self::new("tblastx")
    }

    /// Add a raw argument, placed before all generated arguments.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add a valueless switch, e.g. `flag("ungapped")` for `-ungapped`.
    pub fn flag(mut self, name: impl Into<String>) -> Self {
        self.flags.push(name.into());
        self
    }

    /// Add an option with a value, e.g. `option("db", "nt")` for `-db nt`.
    pub fn option(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.options.push((name.into(), value.to_string()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Fail if any switch or option would override the output format.
    pub fn validate(&self) -> Result<()> {
        let names = self
            .flags
            .iter()
            .chain(self.options.iter().map(|(name, _)| name));
        for name in names {
            if name.trim_start_matches('-') == OUTFMT {
                return Err(Error::UnsupportedOption(OUTFMT.to_string()));
            }
        }
        Ok(())
    }

    /// Full argument vector (without the program name) for the given hit fields.
    pub fn build_args(&self, fields: &[String]) -> Result<Vec<String>> {
        self.validate()?;

        let mut args = self.args.clone();
        args.push(format!("-{}", OUTFMT));
        args.push(format!("{} {}", TABULAR_WITH_COMMENTS, fields.join(" ")));
        for flag in &self.flags {
            args.push(dashed(flag));
        }
        for (name, value) in &self.options {
            args.push(dashed(name));
            args.push(value.clone());
        }
        Ok(args)
    }

    /// A `Command` with piped stdin/stdout and inherited stderr.
    pub fn command(&self, fields: &[String]) -> Result<Command> {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.build_args(fields)?);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit());
        Ok(cmd)
    }
}

fn dashed(name: &str) -> String {
    format!("-{}", name.trim_start_matches('-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> Vec<String> {
        vec!["sseqid".to_string(), "pident".to_string()]
    }

    #[test]
    fn test_build_args_order() {
        let spec = LaunchSpec::blastn()
            .flag("ungapped")
            .option("db", "nt")
            .option("evalue", 1e-5);
        let args = spec.build_args(&fields()).unwrap();
        assert_eq!(
            args,
            vec![
                "-outfmt",
                "7 sseqid pident",
                "-ungapped",
                "-db",
                "nt",
                "-evalue",
                "0.00001"
            ]
        );
    }

    #[test]
    fn test_raw_args_come_first() {
        let spec = LaunchSpec::new("sh").arg("-c").arg("cat").arg("worker");
        let args = spec.build_args(&fields()).unwrap();
        assert_eq!(&args[..3], &["-c", "cat", "worker"]);
        assert_eq!(args[3], "-outfmt");
    }

    #[test]
    fn test_leading_dash_is_not_doubled() {
        let spec = LaunchSpec::blastp().option("-db", "pdb");
        let args = spec.build_args(&fields()).unwrap();
        assert!(args.contains(&"-db".to_string()));
        assert!(!args.contains(&"--db".to_string()));
    }

    #[test]
    fn test_outfmt_option_rejected() {
        let err = LaunchSpec::blastn()
            .option("outfmt", "6")
            .build_args(&fields())
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedOption(ref o) if o == "outfmt"));
    }

    #[test]
    fn test_outfmt_flag_rejected() {
        assert!(LaunchSpec::blastx().flag("-outfmt").validate().is_err());
    }

    #[test]
    fn test_command_program() {
        let spec = LaunchSpec::tblastn();
        let cmd = spec.command(&fields()).unwrap();
        assert_eq!(cmd.get_program(), "tblastn");
        assert_eq!(cmd.get_args().count(), 2);
    }
}
