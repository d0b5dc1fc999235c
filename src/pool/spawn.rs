//! Worker subprocess spawning.
//!
//! Uses `std::process::Command`, which creates the stdin/stdout pipes
//! close-on-exec so sibling workers never inherit each other's descriptors.
//! stderr is inherited so worker diagnostics reach the user directly.

use super::proc::Proc;
use crate::error::{Error, Result};
use crate::launch::LaunchSpec;

/// Spawn one worker and wrap it in a non-blocking [`Proc`] handle.
pub fn spawn_worker(launch: &LaunchSpec, fields: &[String]) -> Result<Proc> {
    let mut cmd = launch.command(fields)?;

    let child = cmd.spawn().map_err(|source| Error::Spawn {
        program: launch.program().to_string(),
        source,
    })?;

    Proc::from_child(child)
}
