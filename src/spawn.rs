//! Replacement-worker spawning.
//!
//! The spawner owns everything that has to happen around the spawn call:
//! pending workspace changes are committed and pushed first (best effort),
//! and every handoff is appended to a local progress log for human and
//! agent inspection.

use std::io::Write;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

/// Why a fresh worker is replacing the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffReason {
    /// Forced rotation: estimated context crossed the force threshold.
    ContextLimit,
    /// Worker stayed stopped through the whole nudge budget.
    Stalled,
    /// Worker finished but the checklist still has open items.
    Continue,
    /// Remote session hit its lifetime limit.
    Expired,
    /// Remote session failed or errored out.
    Failed,
}

impl std::fmt::Display for HandoffReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ContextLimit => "context_limit",
            Self::Stalled => "stalled",
            Self::Continue => "continue",
            Self::Expired => "expired",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Everything a spawner needs to know about one rotation.
#[derive(Debug, Clone)]
pub struct Handoff {
    pub reason: HandoffReason,
    /// Distilled context from the outgoing worker; present for
    /// context-limit rotations.
    pub summary: Option<String>,
    pub old_depth: u32,
    pub new_depth: u32,
}

/// Spawns a replacement worker and returns its id.
pub trait AgentSpawner {
    fn spawn(&self, workspace: &Path, handoff: &Handoff) -> anyhow::Result<String>;
}

/// Relative path of the handoff progress log inside the workspace.
pub const PROGRESS_LOG: &str = ".chainwatch/progress.log";

/// HTTP spawner against the worker service.
pub struct HttpSpawner {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct SpawnRequest<'a> {
    workspace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    resume_context: Option<ResumeContext<'a>>,
}

#[derive(Serialize)]
struct ResumeContext<'a> {
    reason: HandoffReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<&'a str>,
}

#[derive(serde::Deserialize)]
struct SpawnResponse {
    worker_id: String,
}

impl HttpSpawner {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

impl AgentSpawner for HttpSpawner {
    fn spawn(&self, workspace: &Path, handoff: &Handoff) -> anyhow::Result<String> {
        commit_and_push(workspace);

        let url = format!("{}/v1/workers", self.base_url);
        let request = SpawnRequest {
            workspace: workspace.display().to_string(),
            resume_context: Some(ResumeContext {
                reason: handoff.reason,
                summary: handoff.summary.as_deref(),
            }),
        };
        let mut response = self
            .agent
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send_json(request)
            .with_context(|| format!("spawning worker via {url}"))?;
        let spawned: SpawnResponse = response
            .body_mut()
            .read_json()
            .context("parsing spawn response")?;

        append_progress(workspace, handoff, &spawned.worker_id);
        Ok(spawned.worker_id)
    }
}

/// Commit and push pending workspace changes so the next worker starts
/// from the latest state. Best effort: a clean tree or a missing remote
/// is logged, not fatal.
fn commit_and_push(workspace: &Path) {
    if let Err(e) = crate::subprocess::git(workspace, &["add", "-A"]) {
        tracing::warn!("git add before handoff failed: {e:#}");
        return;
    }
    // Commit fails when the tree is clean; leave that to the log.
    match crate::subprocess::git(workspace, &["commit", "-m", "wip: handoff checkpoint"]) {
        Ok(_) => tracing::info!("committed pending changes before handoff"),
        Err(e) => tracing::debug!("nothing committed before handoff: {e:#}"),
    }
    if let Err(e) = crate::subprocess::git(workspace, &["push"]) {
        tracing::warn!("git push before handoff failed: {e:#}");
    }
}

/// Append one handoff record to the progress log. Failure to write the
/// log never blocks the rotation.
pub fn append_progress(workspace: &Path, handoff: &Handoff, new_worker_id: &str) {
    let path = workspace.join(PROGRESS_LOG);
    let line = format!(
        "{} iteration {} -> {} reason={} worker={}\n",
        chrono::Utc::now().to_rfc3339(),
        handoff.old_depth,
        handoff.new_depth,
        handoff.reason,
        new_worker_id,
    );
    let result = path
        .parent()
        .map(std::fs::create_dir_all)
        .transpose()
        .and_then(|_| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
        })
        .and_then(|mut f| f.write_all(line.as_bytes()));
    if let Err(e) = result {
        tracing::warn!("could not append to {}: {e}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_strings_are_stable() {
        assert_eq!(HandoffReason::ContextLimit.to_string(), "context_limit");
        assert_eq!(HandoffReason::Stalled.to_string(), "stalled");
        assert_eq!(HandoffReason::Continue.to_string(), "continue");
        assert_eq!(HandoffReason::Expired.to_string(), "expired");
        assert_eq!(HandoffReason::Failed.to_string(), "failed");
    }

    #[test]
    fn spawn_request_omits_empty_summary() {
        let request = SpawnRequest {
            workspace: "/tmp/ws".to_string(),
            resume_context: Some(ResumeContext {
                reason: HandoffReason::Expired,
                summary: None,
            }),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["resume_context"]["reason"], "expired");
        assert!(json["resume_context"].get("summary").is_none());
    }

    #[test]
    fn progress_log_appends_records() {
        let dir = tempfile::tempdir().unwrap();
        let handoff = Handoff {
            reason: HandoffReason::ContextLimit,
            summary: Some("summary".to_string()),
            old_depth: 1,
            new_depth: 2,
        };
        append_progress(dir.path(), &handoff, "w-next");
        append_progress(dir.path(), &handoff, "w-after");

        let body = std::fs::read_to_string(dir.path().join(PROGRESS_LOG)).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("iteration 1 -> 2"));
        assert!(lines[0].contains("reason=context_limit"));
        assert!(lines[0].contains("worker=w-next"));
        assert!(lines[1].contains("worker=w-after"));
    }
}
