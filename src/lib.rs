//! blastpool - run BLAST-style alignment queries across a pool of worker processes.
//!
//! Query records are read lazily from any [`BufRead`](std::io::BufRead), fed to
//! a fixed number of external worker processes over non-blocking pipes, and
//! their tabular (`-outfmt 7`) output is parsed incrementally into
//! [`ResultRecord`]s. Results are yielded as soon as any worker finishes a
//! query, so their order follows completion rather than submission.
//!
//! # Example
//!
//! Hit keys come from the worker's `# Fields:` line when it prints one (BLAST+
//! writes descriptive names such as `subject acc.ver` or `% identity`), and
//! from [`RunConfig::fields`] otherwise.
//!
//! ```no_run
//! use blastpool::{LaunchSpec, RunConfig};
//! use std::io::BufReader;
//!
//! # fn main() -> blastpool::Result<()> {
//! let input = BufReader::new(std::fs::File::open("queries.fa")?);
//! let launch = LaunchSpec::blastn().option("db", "nt").option("evalue", 1e-5);
//! let config = RunConfig::new().with_workers(8);
//!
//! for result in blastpool::run(&launch, input, &config)? {
//!     let result = result?;
//!     for hit in &result.hits {
//!         for (name, value) in hit.iter() {
//!             println!("{:?} {} = {}", result.id, name, value);
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod feeder;
pub mod launch;
pub mod logging;
pub mod parser;
pub mod pool;
pub mod record;
pub mod scheduler;

pub use config::{DEFAULT_HIT_FIELDS, RunConfig};
pub use error::{Error, ParseError, Result};
pub use feeder::QueryFeeder;
pub use launch::LaunchSpec;
pub use parser::ResultParser;
pub use record::{FieldValue, Hit, QueryRecord, ResultRecord};
pub use scheduler::{ResultStream, RunStats};

use std::io::BufRead;

/// Start a run: spawn `config.workers` copies of `launch` and return the lazy
/// result stream over `input`.
///
/// Configuration errors, including any attempt to override the output
/// format, are reported before a process is spawned.
pub fn run<R: BufRead>(launch: &LaunchSpec, input: R, config: &RunConfig) -> Result<ResultStream<R>> {
    ResultStream::start(launch, input, config)
}
