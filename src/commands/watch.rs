//! The supervisory loop.
//!
//! One watcher supervises exactly one remote worker at a time. Each tick
//! fetches status, and while the worker is running, estimates consumed
//! context and applies the threshold policy. Terminal and stalled states
//! either finish the run or hand off to a freshly spawned worker with an
//! incremented chain depth. Chaining is bounded: hitting the depth limit
//! ends the run with an error instead of another spawn.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Args;

use crate::api::{HttpWorkerApi, StatusReport, Transcript, WorkerApi, WorkerStatus};
use crate::checklist::{self, Completion};
use crate::config::{Config, WatchConfig};
use crate::error::ExitError;
use crate::estimate::{self, PolicyAction, Thresholds};
use crate::spawn::{AgentSpawner, Handoff, HandoffReason, HttpSpawner};
use crate::subprocess;

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Identifier of the worker to supervise
    pub worker_id: String,
    /// Workspace directory (default: current directory)
    #[arg(long)]
    pub workspace: Option<PathBuf>,
    /// Override the chain depth limit
    #[arg(long)]
    pub max_depth: Option<u32>,
    /// Override the poll interval in seconds
    #[arg(long)]
    pub poll_interval: Option<u64>,
}

impl WatchArgs {
    pub fn execute(&self) -> anyhow::Result<()> {
        let workspace = self
            .workspace
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .context("determining workspace directory")?;

        let config = Config::load_for_workspace(&workspace)?;
        let api_key = config.resolve_api_key()?;

        let mut settings = config.watch.clone();
        if let Some(depth) = self.max_depth {
            settings.max_chain_depth = depth;
        }
        if let Some(interval) = self.poll_interval {
            settings.poll_interval = interval;
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            eprintln!("interrupt received; the remote worker keeps running without supervision");
            flag.store(true, Ordering::SeqCst);
        })
        .context("installing interrupt handler")?;

        let watcher = Watcher {
            api: HttpWorkerApi::new(&config.api.base_url, &api_key),
            spawner: HttpSpawner::new(&config.api.base_url, &api_key),
            workspace,
            settings,
            shutdown,
        };

        match watcher.run(Session::new(self.worker_id.clone(), 1))? {
            WatchOutcome::Complete => {
                println!("task complete: all checklist items are done");
                Ok(())
            }
            WatchOutcome::Unverifiable => {
                println!("worker finished; no task checklist found, completion not verified");
                Ok(())
            }
            WatchOutcome::Interrupted => {
                println!("supervision interrupted; the remote worker is still running");
                Ok(())
            }
        }
    }
}

/// Per-worker supervision state.
///
/// Owned by exactly one loop at a time and replaced wholesale on handoff:
/// only the incremented chain depth and the derived context summary cross
/// into the next session.
#[derive(Debug)]
pub struct Session {
    pub worker_id: String,
    pub chain_depth: u32,
    pub followup_count: u32,
    pub warning_sent: bool,
}

impl Session {
    pub fn new(worker_id: String, chain_depth: u32) -> Self {
        Self {
            worker_id,
            chain_depth,
            followup_count: 0,
            warning_sent: false,
        }
    }
}

/// How a supervision run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// Worker finished and the checklist has no open items.
    Complete,
    /// Worker finished but there is no checklist to verify against.
    Unverifiable,
    /// Operator interrupt; no replacement worker is spawned after one.
    Interrupted,
}

pub struct Watcher<A, S> {
    pub api: A,
    pub spawner: S,
    pub workspace: PathBuf,
    pub settings: WatchConfig,
    pub shutdown: Arc<AtomicBool>,
}

impl<A: WorkerApi, S: AgentSpawner> Watcher<A, S> {
    /// Supervise until the task completes, the chain is exhausted, or the
    /// operator interrupts.
    pub fn run(&self, mut session: Session) -> anyhow::Result<WatchOutcome> {
        let thresholds = Thresholds {
            warn: self.settings.warn_threshold,
            force: self.settings.force_threshold,
        };
        // Most recent branch the service reported, kept for the manual
        // continuation hint when the chain runs out.
        let mut last_branch: Option<String> = None;

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return Ok(WatchOutcome::Interrupted);
            }

            let report = self.api.get_status(&session.worker_id).unwrap_or_else(|e| {
                tracing::warn!("status fetch failed, treating as unknown: {e:#}");
                StatusReport::unknown()
            });
            if let Some(ref branch) = report.target_branch {
                last_branch = Some(branch.clone());
            }
            tracing::debug!(
                worker = %session.worker_id,
                depth = session.chain_depth,
                status = %report.status,
                "tick"
            );

            match report.status {
                WorkerStatus::Creating => {}
                WorkerStatus::Running => {
                    session.followup_count = 0;
                    let transcript = self.fetch_transcript(&session.worker_id);
                    let estimate = estimate::estimate_tokens(&transcript);
                    tracing::info!(
                        estimate,
                        warn = thresholds.warn,
                        force = thresholds.force,
                        "context estimate"
                    );
                    match thresholds.classify(estimate, session.warning_sent) {
                        PolicyAction::Continue => {}
                        PolicyAction::SendWarning => {
                            let text = warning_text(&self.settings.artifact);
                            match self.api.send_followup(&session.worker_id, &text) {
                                Ok(()) => {
                                    session.warning_sent = true;
                                    tracing::info!("context warning sent");
                                }
                                Err(e) => {
                                    tracing::warn!("could not deliver context warning: {e:#}");
                                }
                            }
                        }
                        PolicyAction::ForceRotate => {
                            let Some(next) = self.rotate_for_context(session, &last_branch)?
                            else {
                                return Ok(WatchOutcome::Interrupted);
                            };
                            session = next;
                        }
                    }
                }
                WorkerStatus::Stopped => {
                    if session.followup_count < self.settings.followup_attempts {
                        session.followup_count += 1;
                        tracing::info!(
                            attempt = session.followup_count,
                            budget = self.settings.followup_attempts,
                            "worker stopped, sending nudge"
                        );
                        let text = nudge_text(&self.settings.artifact);
                        if let Err(e) = self.api.send_followup(&session.worker_id, &text) {
                            tracing::warn!("nudge delivery failed: {e:#}");
                        }
                    } else {
                        tracing::warn!("nudge budget exhausted, rotating stalled worker");
                        let Some(next) =
                            self.handoff(session, HandoffReason::Stalled, None, &last_branch)?
                        else {
                            return Ok(WatchOutcome::Interrupted);
                        };
                        session = next;
                    }
                }
                WorkerStatus::Finished => {
                    self.sync_workspace(last_branch.as_deref());
                    let artifact = self.workspace.join(&self.settings.artifact);
                    match checklist::check_artifact(&artifact) {
                        Ok(Completion::Complete) => {
                            tracing::info!("worker finished and checklist is complete");
                            return Ok(WatchOutcome::Complete);
                        }
                        Ok(Completion::NoArtifact) => {
                            tracing::warn!(
                                "worker finished but {} does not exist; cannot verify",
                                artifact.display()
                            );
                            return Ok(WatchOutcome::Unverifiable);
                        }
                        Ok(Completion::Incomplete(remaining)) => {
                            tracing::info!(remaining, "worker finished with open checklist items");
                            let Some(next) =
                                self.handoff(session, HandoffReason::Continue, None, &last_branch)?
                            else {
                                return Ok(WatchOutcome::Interrupted);
                            };
                            session = next;
                        }
                        Err(e) => {
                            tracing::warn!(
                                "could not read {}: {e:#}; cannot verify",
                                artifact.display()
                            );
                            return Ok(WatchOutcome::Unverifiable);
                        }
                    }
                }
                WorkerStatus::Expired => {
                    tracing::warn!("worker session expired");
                    let Some(next) =
                        self.handoff(session, HandoffReason::Expired, None, &last_branch)?
                    else {
                        return Ok(WatchOutcome::Interrupted);
                    };
                    session = next;
                }
                WorkerStatus::Failed => {
                    let transcript = self.fetch_transcript(&session.worker_id);
                    if let Some(last) = transcript.last_message() {
                        tracing::warn!(
                            role = %last.role,
                            "worker failed; last message: {}",
                            truncate_chars(&last.text, 300)
                        );
                    } else {
                        tracing::warn!("worker failed with no retrievable conversation");
                    }
                    let Some(next) =
                        self.handoff(session, HandoffReason::Failed, None, &last_branch)?
                    else {
                        return Ok(WatchOutcome::Interrupted);
                    };
                    session = next;
                }
                WorkerStatus::Unknown => {
                    // The service can be transiently inconsistent; never
                    // escalate on this alone.
                    tracing::warn!("worker status unknown, continuing to poll");
                }
            }

            if !self.sleep(Duration::from_secs(self.settings.poll_interval)) {
                return Ok(WatchOutcome::Interrupted);
            }
        }
    }

    /// Force-rotate a running worker that crossed the hard threshold:
    /// request a stop, wait (bounded) for it to land, capture a final
    /// transcript, and hand off with the distilled summary.
    ///
    /// Returns `None` when an operator interrupt arrives mid-rotation:
    /// the handoff is abandoned rather than spawning an unsupervised
    /// worker after the operator asked to stop.
    fn rotate_for_context(
        &self,
        session: Session,
        last_branch: &Option<String>,
    ) -> anyhow::Result<Option<Session>> {
        tracing::info!("context estimate over force threshold, rotating worker");
        if let Err(e) = self.api.request_stop(&session.worker_id) {
            tracing::warn!("stop request failed: {e:#}");
        }
        if !self.wait_for_stop(&session.worker_id) {
            tracing::warn!("interrupt during stop wait; abandoning rotation");
            return Ok(None);
        }

        let transcript = self.fetch_transcript(&session.worker_id);
        let summary = derive_summary(
            &transcript,
            self.settings.summary_messages,
            self.settings.summary_truncate,
        );
        self.handoff(session, HandoffReason::ContextLimit, summary, last_branch)
    }

    /// Poll until the worker reports `Stopped` or the bounded wait
    /// elapses. Timing out is non-fatal: the rotation proceeds anyway.
    /// Returns false only when shutdown was requested during the wait.
    fn wait_for_stop(&self, worker_id: &str) -> bool {
        let deadline = Instant::now() + Duration::from_secs(self.settings.stop_wait);
        loop {
            if let Ok(report) = self.api.get_status(worker_id)
                && report.status == WorkerStatus::Stopped
            {
                return true;
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    "worker did not reach stopped within {}s; proceeding with rotation",
                    self.settings.stop_wait
                );
                return true;
            }
            if !self.sleep(Duration::from_secs(self.settings.stop_poll)) {
                return false;
            }
        }
    }

    /// Replace the current session with a freshly spawned worker.
    ///
    /// Returns `None` without spawning if shutdown was requested. The
    /// depth guard comes next: at the limit this fails without
    /// attempting a spawn, printing where to continue manually. A spawn
    /// failure is also fatal — retrying blindly against a systemic
    /// failure (auth, network, quota) could loop forever.
    fn handoff(
        &self,
        session: Session,
        reason: HandoffReason,
        summary: Option<String>,
        last_branch: &Option<String>,
    ) -> anyhow::Result<Option<Session>> {
        if self.shutdown.load(Ordering::SeqCst) {
            tracing::warn!("shutdown requested; not spawning a replacement worker");
            return Ok(None);
        }
        if session.chain_depth >= self.settings.max_chain_depth {
            return Err(ExitError::ChainExhausted {
                max: self.settings.max_chain_depth,
                workspace: self.workspace.display().to_string(),
                branch: last_branch.clone().unwrap_or_else(|| "(unknown)".to_string()),
            }
            .into());
        }

        let handoff = Handoff {
            reason,
            summary,
            old_depth: session.chain_depth,
            new_depth: session.chain_depth + 1,
        };
        let worker_id = self
            .spawner
            .spawn(&self.workspace, &handoff)
            .map_err(|e| ExitError::SpawnFailed(format!("{e:#}")))?;
        tracing::info!(
            old_worker = %session.worker_id,
            new_worker = %worker_id,
            depth = handoff.new_depth,
            reason = %reason,
            "handed off to fresh worker"
        );
        Ok(Some(Session::new(worker_id, handoff.new_depth)))
    }

    fn fetch_transcript(&self, worker_id: &str) -> Transcript {
        self.api.get_conversation(worker_id).unwrap_or_else(|e| {
            tracing::warn!("conversation fetch failed, treating as empty: {e:#}");
            Transcript::default()
        })
    }

    /// Bring the local checkout up to date with the branch the worker
    /// pushed to. Best effort; the completion check reads whatever state
    /// this leaves behind.
    fn sync_workspace(&self, branch: Option<&str>) {
        if let Err(e) = subprocess::git(&self.workspace, &["fetch", "--all"]) {
            tracing::warn!("git fetch failed: {e:#}");
            return;
        }
        if let Some(branch) = branch {
            if let Err(e) = subprocess::git(&self.workspace, &["checkout", branch]) {
                tracing::warn!("git checkout {branch} failed: {e:#}");
                return;
            }
            if let Err(e) = subprocess::git(&self.workspace, &["pull", "--ff-only"]) {
                tracing::warn!("git pull failed: {e:#}");
            }
        }
    }

    /// Sleep in sub-second slices so an interrupt lands promptly.
    /// Returns false when shutdown was requested.
    fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(Duration::from_millis(250)));
        }
    }
}

fn warning_text(artifact: &str) -> String {
    format!(
        "Your context budget is nearly exhausted. Finish the edit you are on, \
         commit and push your work, and bring {artifact} up to date so a \
         replacement worker can pick up cleanly."
    )
}

fn nudge_text(artifact: &str) -> String {
    format!(
        "You appear to have stopped before the task was finished. Resume work on \
         the remaining items in {artifact}. When every item is checked off, \
         announce completion with <promise>COMPLETE</promise>."
    )
}

/// Distill a transcript into the summary handed to the next worker: the
/// last few assistant messages, each truncated.
fn derive_summary(transcript: &Transcript, messages: usize, max_chars: usize) -> Option<String> {
    let mut tail: Vec<String> = transcript
        .messages
        .iter()
        .rev()
        .filter(|m| m.role == "assistant")
        .take(messages)
        .map(|m| truncate_chars(&m.text, max_chars))
        .collect();
    if tail.is_empty() {
        return None;
    }
    tail.reverse();
    Some(tail.join("\n---\n"))
}

/// Truncate on a character boundary without slicing through a code point.
fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}
