use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use crate::checklist::{self, Completion};
use crate::config::Config;

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Workspace directory (default: current directory)
    #[arg(long)]
    pub workspace: Option<PathBuf>,
}

impl CheckArgs {
    /// One-shot completion check against the task checklist.
    pub fn execute(&self) -> anyhow::Result<()> {
        let workspace = self
            .workspace
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .context("determining workspace directory")?;
        let config = Config::load_for_workspace(&workspace)?;
        let artifact = workspace.join(&config.watch.artifact);

        match checklist::check_artifact(&artifact)? {
            Completion::Complete => {
                println!("complete: no unchecked items in {}", artifact.display());
            }
            Completion::Incomplete(remaining) => {
                println!(
                    "incomplete: {remaining} unchecked item(s) in {}",
                    artifact.display()
                );
            }
            Completion::NoArtifact => {
                println!("no checklist at {}", artifact.display());
            }
        }
        Ok(())
    }
}
