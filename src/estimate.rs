//! Context consumption estimate and threshold policy.
//!
//! The estimate is a coarse proxy, deliberately biased high: losing a
//! worker to a hard context cutoff mid-edit costs more than rotating one
//! tick early. No tokenizer is consulted.

use crate::api::Transcript;

/// Approximate characters per context unit for natural-language/code text.
const CHARS_PER_UNIT: u64 = 4;

/// Overhead multiplier for payloads not rendered as message text
/// (tool-call bodies, system instructions, attached file contents).
const OVERHEAD_FACTOR: f64 = 1.3;

/// Estimate consumed context units from a transcript.
///
/// An empty or malformed transcript yields 0, which means "no data
/// available" — callers must not treat a single zero reading as evidence
/// the context is empty.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn estimate_tokens(transcript: &Transcript) -> u64 {
    let base = transcript.total_chars() / CHARS_PER_UNIT;
    // Exact in f64 for any plausible transcript; truncation toward zero
    // is the intended rounding.
    (base as f64 * OVERHEAD_FACTOR) as u64
}

/// What the watcher should do about the current estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyAction {
    /// Below both thresholds, or warning already delivered.
    Continue,
    /// Warn the worker to wrap up; the caller latches `warning_sent`.
    SendWarning,
    /// Stop the worker and hand off to a fresh one.
    ForceRotate,
}

/// Warning and force-stop thresholds, in estimated context units.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub warn: u64,
    pub force: u64,
}

impl Thresholds {
    /// Classify an estimate. Pure: same inputs, same action.
    /// ForceRotate wins when one coarse poll jumps past both thresholds.
    pub fn classify(&self, estimate: u64, warning_sent: bool) -> PolicyAction {
        if estimate >= self.force {
            PolicyAction::ForceRotate
        } else if estimate >= self.warn && !warning_sent {
            PolicyAction::SendWarning
        } else {
            PolicyAction::Continue
        }
    }
}
