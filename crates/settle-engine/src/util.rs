use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::process::Command;

/// Runs `script` with `sh -c` in `dir` and returns its stdout.
pub fn run_shell(dir: &Path, script: &str, envs: &[(&str, &str)]) -> Result<Vec<u8>> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(script).current_dir(dir);
    for (k, v) in envs {
        cmd.env(k, v);
    }
    let out = cmd.output().with_context(|| format!("run sh -c {:?}", script))?;
    if !out.status.success() {
        return Err(anyhow!(
            "command failed ({}): {}\nstdout:{}\nstderr:{}",
            out.status,
            script,
            String::from_utf8_lossy(&out.stdout),
            String::from_utf8_lossy(&out.stderr)
        ));
    }
    Ok(out.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn captures_stdout_and_env() {
        let dir = tempdir().unwrap();
        let out = run_shell(dir.path(), "printf '%s' \"$GREETING\"", &[("GREETING", "hi")]).unwrap();
        assert_eq!(out, b"hi");
    }

    #[test]
    fn non_zero_exit_carries_stderr() {
        let dir = tempdir().unwrap();
        let err = run_shell(dir.path(), "echo nope >&2; exit 3", &[]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("nope"));
        assert!(msg.contains("exit 3"));
    }
}
