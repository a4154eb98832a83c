use crate::error::{OverseerError, Result};

/// Detach from the controlling terminal.
///
/// Double fork with `setsid` in between, then chdir to `/` and point the
/// standard streams at `/dev/null`. Must run before any threads exist (in
/// particular before the tokio runtime is built): only the calling thread
/// survives a fork.
#[cfg(unix)]
pub fn daemonize() -> Result<()> {
    use nix::libc;
    use nix::unistd::setsid;
    use std::fs::OpenOptions;
    use std::os::unix::io::AsRawFd;

    fork_and_exit_parent("first")?;

    setsid().map_err(|e| OverseerError::Other(format!("setsid failed: {}", e)))?;

    // The session leader exits so the daemon can never reacquire a terminal
    fork_and_exit_parent("second")?;

    std::env::set_current_dir("/")
        .map_err(|e| OverseerError::Other(format!("Failed to change directory to /: {}", e)))?;

    let devnull = OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")
        .map_err(|e| OverseerError::Other(format!("Failed to open /dev/null: {}", e)))?;

    for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        // SAFETY: both descriptors are valid for the duration of the call
        if unsafe { libc::dup2(devnull.as_raw_fd(), target) } < 0 {
            return Err(OverseerError::Other(format!(
                "Failed to redirect fd {}: {}",
                target,
                std::io::Error::last_os_error()
            )));
        }
    }

    Ok(())
}

#[cfg(unix)]
fn fork_and_exit_parent(stage: &str) -> Result<()> {
    use nix::unistd::{fork, ForkResult};

    // SAFETY: called while the process is still single-threaded
    match unsafe { fork() } {
        Ok(ForkResult::Parent { .. }) => std::process::exit(0),
        Ok(ForkResult::Child) => Ok(()),
        Err(e) => Err(OverseerError::Other(format!("{} fork failed: {}", stage, e))),
    }
}

#[cfg(not(unix))]
pub fn daemonize() -> Result<()> {
    Err(OverseerError::Other(
        "Daemonization is only supported on Unix systems".to_string(),
    ))
}
