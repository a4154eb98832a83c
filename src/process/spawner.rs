use crate::error::{OverseerError, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Everything needed to launch one service process
#[derive(Debug)]
pub struct SpawnRequest<'a> {
    /// Service name, used in error messages
    pub name: &'a str,
    pub argv: Vec<String>,
    pub working_directory: &'a Path,
    /// Merged over the inherited environment
    pub environment: &'a BTreeMap<String, String>,
    /// Destination for combined stdout and stderr
    pub log_file: File,
}

/// Split a command line into arguments, honouring shell-style quoting
pub fn parse_command(command: &str) -> Result<Vec<String>> {
    let argv = shlex::split(command).ok_or_else(|| {
        OverseerError::InvalidCommand(format!("Unbalanced quoting in command: {}", command))
    })?;

    if argv.is_empty() {
        return Err(OverseerError::InvalidCommand(
            "Command must not be empty".to_string(),
        ));
    }

    Ok(argv)
}

/// Spawn a process detached into its own process group.
///
/// The child does not receive signals aimed at the supervisor's group, and
/// its handle is dropped right away: the pid is the only thing tracked.
///
/// # Returns
/// * `Ok(pid)` - Process ID assigned by the OS
/// * `Err(OverseerError::SpawnError)` - The OS could not create the process
pub fn spawn_detached(request: SpawnRequest<'_>) -> Result<u32> {
    let (program, args) = request.argv.split_first().ok_or_else(|| {
        OverseerError::SpawnError(format!("Empty command for service '{}'", request.name))
    })?;

    let mut command = Command::new(program);
    command.args(args);

    if !request.working_directory.as_os_str().is_empty() {
        if !request.working_directory.is_dir() {
            return Err(OverseerError::SpawnError(format!(
                "Working directory does not exist: {}",
                request.working_directory.display()
            )));
        }
        command.current_dir(request.working_directory);
    }

    command.envs(request.environment);

    let stderr_file = request.log_file.try_clone().map_err(|e| {
        OverseerError::SpawnError(format!(
            "Failed to duplicate log handle for '{}': {}",
            request.name, e
        ))
    })?;
    command.stdin(Stdio::null());
    command.stdout(Stdio::from(request.log_file));
    command.stderr(Stdio::from(stderr_file));

    #[cfg(unix)]
    command.process_group(0);

    let child = command.spawn().map_err(|e| {
        OverseerError::SpawnError(format!(
            "Failed to spawn process '{}': {}",
            request.name, e
        ))
    })?;

    child.id().ok_or_else(|| {
        OverseerError::SpawnError(format!("Failed to get PID for process '{}'", request.name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn log_file(temp_dir: &TempDir) -> File {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(temp_dir.path().join("out.log"))
            .unwrap()
    }

    #[test]
    fn test_parse_simple_command() {
        let argv = parse_command("sleep 10").unwrap();
        assert_eq!(argv, vec!["sleep", "10"]);
    }

    #[test]
    fn test_parse_quoted_arguments() {
        let argv = parse_command(r#"sh -c 'echo "hello world"' --flag"#).unwrap();
        assert_eq!(argv, vec!["sh", "-c", r#"echo "hello world""#, "--flag"]);
    }

    #[test]
    fn test_parse_rejects_unbalanced_quotes() {
        let result = parse_command("echo 'oops");
        assert!(matches!(result, Err(OverseerError::InvalidCommand(_))));
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(matches!(
            parse_command(""),
            Err(OverseerError::InvalidCommand(_))
        ));
        assert!(matches!(
            parse_command("   "),
            Err(OverseerError::InvalidCommand(_))
        ));
    }

    #[tokio::test]
    async fn test_spawn_writes_combined_output_with_env() {
        let temp_dir = TempDir::new().unwrap();
        let mut environment = BTreeMap::new();
        environment.insert("OVERSEER_TEST_VAR".to_string(), "from-env".to_string());

        let pid = spawn_detached(SpawnRequest {
            name: "echo",
            argv: parse_command("sh -c 'echo $OVERSEER_TEST_VAR; echo oops >&2; pwd'").unwrap(),
            working_directory: temp_dir.path(),
            environment: &environment,
            log_file: log_file(&temp_dir),
        })
        .unwrap();
        assert!(pid > 0);

        let path = temp_dir.path().join("out.log");
        let mut contents = String::new();
        for _ in 0..50 {
            contents = std::fs::read_to_string(&path).unwrap();
            if contents.lines().count() >= 3 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }

        assert!(contents.contains("from-env"));
        assert!(contents.contains("oops"));
        let cwd = temp_dir.path().canonicalize().unwrap();
        assert!(contents.contains(cwd.to_str().unwrap()));
    }

    #[tokio::test]
    async fn test_spawn_nonexistent_program() {
        let temp_dir = TempDir::new().unwrap();
        let result = spawn_detached(SpawnRequest {
            name: "missing",
            argv: vec!["/nonexistent/program".to_string()],
            working_directory: temp_dir.path(),
            environment: &BTreeMap::new(),
            log_file: log_file(&temp_dir),
        });

        assert!(matches!(result, Err(OverseerError::SpawnError(_))));
    }

    #[tokio::test]
    async fn test_spawn_invalid_working_directory() {
        let temp_dir = TempDir::new().unwrap();
        let result = spawn_detached(SpawnRequest {
            name: "bad-cwd",
            argv: vec!["/bin/echo".to_string()],
            working_directory: &PathBuf::from("/nonexistent/directory"),
            environment: &BTreeMap::new(),
            log_file: log_file(&temp_dir),
        });

        match result {
            Err(OverseerError::SpawnError(msg)) => assert!(msg.contains("does not exist")),
            other => panic!("Expected SpawnError, got {:?}", other),
        }
    }
}
