use std::{io, os::unix::process::ExitStatusExt, process::ExitStatus};

use nix::sys::signal::Signal;
use tokio::process::Command;
use tracing::{info, warn};

use crate::invocation::Invocation;

/// Shells report death by signal N as 128 + N.
const SIGNAL_EXIT_BASE: i32 = 128;

/// Run the launcher and wait for it, returning the status to exit with.
pub async fn execute(invocation: &Invocation) -> io::Result<u8> {
    info!(command = %invocation, "Starting launcher");
    let status = Command::new(&invocation.program)
        .args(&invocation.args)
        .envs(&invocation.env)
        .kill_on_drop(true)
        .status()
        .await?;
    Ok(exit_code(status))
}

fn exit_code(status: ExitStatus) -> u8 {
    if let Some(code) = status.code() {
        info!(code, "Launcher exited");
        return code as u8;
    }
    match status.signal() {
        Some(signo) => {
            let name = Signal::try_from(signo).map_or("unknown", Signal::as_str);
            warn!(signo, signal = name, "Launcher killed by signal");
            (SIGNAL_EXIT_BASE + signo) as u8
        }
        None => 1,
    }
}
