//! Remote worker service client.
//!
//! The watcher only ever consumes these four operations, so they live
//! behind a trait: production uses the HTTP client, tests feed the loop
//! scripted status sequences.

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Status reported by the remote service for a worker.
///
/// The service owns this value; the supervisor only observes it. Anything
/// the service reports that we don't recognize maps to `Unknown` so a new
/// server-side status degrades to "keep polling" instead of a parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Creating,
    Running,
    Stopped,
    Finished,
    Expired,
    Failed,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Creating => "creating",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Finished => "finished",
            Self::Expired => "expired",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One status poll result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: WorkerStatus,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub target_branch: Option<String>,
}

impl StatusReport {
    /// Neutral report used when a status fetch fails transiently.
    pub fn unknown() -> Self {
        Self {
            status: WorkerStatus::Unknown,
            summary: None,
            target_branch: None,
        }
    }
}

/// One conversation message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub text: String,
}

/// Immutable conversation snapshot, ordered oldest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Transcript {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Total character count across all message bodies.
    #[allow(clippy::cast_possible_truncation)]
    pub fn total_chars(&self) -> u64 {
        self.messages.iter().map(|m| m.text.chars().count() as u64).sum()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// Remote service operations the watcher consumes.
pub trait WorkerApi {
    fn get_status(&self, worker_id: &str) -> anyhow::Result<StatusReport>;
    fn get_conversation(&self, worker_id: &str) -> anyhow::Result<Transcript>;
    fn request_stop(&self, worker_id: &str) -> anyhow::Result<()>;
    fn send_followup(&self, worker_id: &str, text: &str) -> anyhow::Result<()>;
}

/// HTTP client for the worker service.
pub struct HttpWorkerApi {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct FollowupRequest<'a> {
    text: &'a str,
}

impl HttpWorkerApi {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn url(&self, worker_id: &str, tail: &str) -> String {
        format!("{}/v1/workers/{}{}", self.base_url, worker_id, tail)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key)
    }
}

impl WorkerApi for HttpWorkerApi {
    fn get_status(&self, worker_id: &str) -> anyhow::Result<StatusReport> {
        let url = self.url(worker_id, "");
        let mut response = self
            .agent
            .get(&url)
            .header("Authorization", self.bearer())
            .call()
            .with_context(|| format!("fetching status from {url}"))?;
        response
            .body_mut()
            .read_json::<StatusReport>()
            .context("parsing worker status response")
    }

    fn get_conversation(&self, worker_id: &str) -> anyhow::Result<Transcript> {
        let url = self.url(worker_id, "/conversation");
        let mut response = self
            .agent
            .get(&url)
            .header("Authorization", self.bearer())
            .call()
            .with_context(|| format!("fetching conversation from {url}"))?;
        response
            .body_mut()
            .read_json::<Transcript>()
            .context("parsing conversation response")
    }

    fn request_stop(&self, worker_id: &str) -> anyhow::Result<()> {
        let url = self.url(worker_id, "/stop");
        self.agent
            .post(&url)
            .header("Authorization", self.bearer())
            .send_empty()
            .with_context(|| format!("requesting stop via {url}"))?;
        Ok(())
    }

    fn send_followup(&self, worker_id: &str, text: &str) -> anyhow::Result<()> {
        let url = self.url(worker_id, "/followup");
        self.agent
            .post(&url)
            .header("Authorization", self.bearer())
            .send_json(FollowupRequest { text })
            .with_context(|| format!("sending follow-up via {url}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_deserializes_known_values() {
        let report: StatusReport =
            serde_json::from_str(r#"{"status": "running", "target_branch": "task/x"}"#).unwrap();
        assert_eq!(report.status, WorkerStatus::Running);
        assert_eq!(report.target_branch.as_deref(), Some("task/x"));
    }

    #[test]
    fn unrecognized_status_maps_to_unknown() {
        let report: StatusReport =
            serde_json::from_str(r#"{"status": "hibernating"}"#).unwrap();
        assert_eq!(report.status, WorkerStatus::Unknown);
    }

    #[test]
    fn transcript_counts_chars_across_messages() {
        let transcript = Transcript {
            messages: vec![
                Message {
                    role: "user".to_string(),
                    text: "abcd".to_string(),
                },
                Message {
                    role: "assistant".to_string(),
                    text: "efgh".to_string(),
                },
            ],
        };
        assert_eq!(transcript.total_chars(), 8);
        assert_eq!(transcript.last_message().unwrap().text, "efgh");
    }

    #[test]
    fn empty_conversation_body_deserializes() {
        let transcript: Transcript = serde_json::from_str("{}").unwrap();
        assert!(transcript.is_empty());
        assert_eq!(transcript.total_chars(), 0);
    }
}
