use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};

use crate::VersionControl;

#[derive(Debug, Clone)]
pub struct GitClient {
    worktree: PathBuf,
}

impl GitClient {
    pub fn new(worktree: impl Into<PathBuf>) -> Self {
        Self {
            worktree: worktree.into(),
        }
    }

    fn base_git_command(&self) -> Command {
        let mut command = Command::new("git");
        command
            .arg("-c")
            .arg("core.autocrlf=false")
            .current_dir(&self.worktree);
        command
    }

    fn run_git(&self, args: &[&str]) -> Result<String> {
        let output = self
            .base_git_command()
            .args(args)
            .output()
            .with_context(|| format!("failed launching git {}", args.join(" ")))?;
        if !output.status.success() {
            anyhow::bail!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl VersionControl for GitClient {
    fn add(&self, paths: &[&Path]) -> Result<()> {
        let mut args = vec!["add".to_string(), "--".to_string()];
        for path in paths {
            args.push(path.display().to_string());
        }
        let borrowed: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_git(&borrowed)?;
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<String> {
        self.run_git(&["commit", "-m", message])?;
        self.run_git(&["rev-parse", "HEAD"])
    }

    fn tag(&self, name: &str, message: &str) -> Result<()> {
        self.run_git(&["tag", "-a", name, "-m", message])?;
        Ok(())
    }
}
