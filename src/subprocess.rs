use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::Context;

/// Result of running a subprocess.
#[derive(Debug)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl RunOutput {
    /// Returns true if the process exited successfully.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run a command with args, optionally in a specific directory, capturing
/// stdout and stderr.
pub fn run(program: &str, args: &[&str], cwd: Option<&Path>) -> anyhow::Result<RunOutput> {
    let mut cmd = Command::new(program);
    cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());

    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = cmd.output().with_context(|| format!("running {program}"))?;

    Ok(RunOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

/// Run a git subcommand in the given workspace, erroring on non-zero exit.
pub fn git(workspace: &Path, args: &[&str]) -> anyhow::Result<RunOutput> {
    let output = run("git", args, Some(workspace))?;
    if output.success() {
        Ok(output)
    } else {
        anyhow::bail!(
            "git {} failed (exit {}): {}",
            args.first().unwrap_or(&""),
            output.exit_code,
            output.stderr.trim()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_echo() {
        let output = run("echo", &["hello"], None).unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[test]
    fn run_false_fails() {
        let output = run("false", &[], None).unwrap();
        assert!(!output.success());
    }

    #[test]
    fn git_in_non_repo_errors() {
        let dir = tempfile::tempdir().unwrap();
        let result = git(dir.path(), &["status"]);
        assert!(result.is_err());
    }
}
