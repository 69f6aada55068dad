use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, ValueEnum};
use serde::Serialize;

use crate::api::{HttpWorkerApi, WorkerApi};
use crate::config::Config;
use crate::estimate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Text,
    Json,
}

impl OutputFormat {
    /// Pretty on a terminal, plain text when piped.
    pub fn auto() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Text
        }
    }
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Identifier of the worker to inspect
    pub worker_id: String,
    /// Workspace directory (default: current directory)
    #[arg(long)]
    pub workspace: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
}

#[derive(Debug, Serialize)]
struct StatusSnapshot {
    worker_id: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_branch: Option<String>,
    estimated_context: u64,
    warn_threshold: u64,
    force_threshold: u64,
}

impl StatusArgs {
    /// One-shot snapshot: status plus the same context estimate the
    /// watcher would compute. No policy side effects.
    pub fn execute(&self) -> anyhow::Result<()> {
        let workspace = self
            .workspace
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .context("determining workspace directory")?;
        let config = Config::load_for_workspace(&workspace)?;
        let api_key = config.resolve_api_key()?;
        let api = HttpWorkerApi::new(&config.api.base_url, &api_key);

        let report = api.get_status(&self.worker_id)?;
        let transcript = api.get_conversation(&self.worker_id).unwrap_or_else(|e| {
            tracing::warn!("conversation fetch failed: {e:#}");
            crate::api::Transcript::default()
        });

        let snapshot = StatusSnapshot {
            worker_id: self.worker_id.clone(),
            status: report.status.to_string(),
            summary: report.summary,
            target_branch: report.target_branch,
            estimated_context: estimate::estimate_tokens(&transcript),
            warn_threshold: config.watch.warn_threshold,
            force_threshold: config.watch.force_threshold,
        };

        match self.format.unwrap_or_else(OutputFormat::auto) {
            OutputFormat::Pretty => print_pretty(&snapshot),
            OutputFormat::Text => print_text(&snapshot),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        }
        Ok(())
    }
}

fn print_pretty(snapshot: &StatusSnapshot) {
    println!("=== Worker {} ===\n", snapshot.worker_id);
    println!("Status: {}", snapshot.status);
    if let Some(ref summary) = snapshot.summary {
        println!("Summary: {summary}");
    }
    if let Some(ref branch) = snapshot.target_branch {
        println!("Branch: {branch}");
    }
    println!(
        "\nEstimated context: {} units (warn at {}, rotate at {})",
        snapshot.estimated_context, snapshot.warn_threshold, snapshot.force_threshold
    );
}

fn print_text(snapshot: &StatusSnapshot) {
    println!("worker  id={}  status={}", snapshot.worker_id, snapshot.status);
    if let Some(ref branch) = snapshot.target_branch {
        println!("branch  {branch}");
    }
    println!(
        "context  estimate={}  warn={}  force={}",
        snapshot.estimated_context, snapshot.warn_threshold, snapshot.force_threshold
    );
}
