// src/models/partial.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

use crate::models::exam_config::ContentRef;

/// The three weighted sub-assessments composing a final exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PartialType {
    Theory,
    Simulation,
    Practical,
}

impl PartialType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartialType::Theory => "theory",
            PartialType::Simulation => "simulation",
            PartialType::Practical => "practical",
        }
    }
}

/// Lifecycle status of a partial.
///
/// Theory and simulation pass through `Submitted` transiently and land on
/// `Completed` in the same operation; practical stops at `Submitted` until
/// the instructor records an `Approved` or `Rejected` decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PartialStatus {
    NotYet,
    InProgress,
    Submitted,
    Completed,
    Approved,
    Rejected,
}

impl PartialStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PartialStatus::Completed | PartialStatus::Approved | PartialStatus::Rejected
        )
    }

    /// The allowed-transition table. Anything not listed here is rejected;
    /// backward moves go through the logged admin override only.
    pub fn can_transition_to(&self, next: PartialStatus) -> bool {
        use PartialStatus::*;
        matches!(
            (*self, next),
            (NotYet, InProgress)
                | (InProgress, Submitted)
                | (Submitted, Completed)
                | (Submitted, Approved)
                | (Submitted, Rejected)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PartialStatus::NotYet => "not_yet",
            PartialStatus::InProgress => "in_progress",
            PartialStatus::Submitted => "submitted",
            PartialStatus::Completed => "completed",
            PartialStatus::Approved => "approved",
            PartialStatus::Rejected => "rejected",
        }
    }
}

/// Represents the 'partials' table: one row per (final exam, partial type).
///
/// Weight, window, duration, content reference and config version are
/// snapshots copied from the class config when the row is created. Later
/// config edits never touch them.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Partial {
    pub id: i64,
    pub final_exam_id: i64,
    pub partial_type: PartialType,
    pub status: PartialStatus,

    /// Raw result from the external grader (quiz or simulation engine).
    pub raw_score: Option<f64>,
    pub max_score: Option<f64>,

    /// Raw result rescaled to the common 0-10 basis.
    pub normalized_score: Option<f64>,

    pub exam_weight: f64,
    pub config_version: i64,
    pub duration_minutes: i64,
    pub content_ref: Json<ContentRef>,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub scheduled_end: Option<DateTime<Utc>>,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Represents the 'checklist_results' table: one pass/fail judgment per
/// rubric item of a practical partial.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ChecklistResult {
    pub id: i64,
    pub partial_id: i64,
    pub item_name: String,
    pub description: String,
    pub passed: bool,
    pub position: i64,
}

/// The instructor's terminal judgment on a practical partial. Recorded
/// independently of the numeric checklist ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PracticalDecision {
    Approved,
    Rejected,
}

impl PracticalDecision {
    pub fn as_status(&self) -> PartialStatus {
        match self {
            PracticalDecision::Approved => PartialStatus::Approved,
            PracticalDecision::Rejected => PartialStatus::Rejected,
        }
    }
}

/// DTO for submitting a partial attempt.
///
/// Theory and simulation carry the external grader's raw output; practical
/// carries the instructor's checklist entries.
#[derive(Debug, Deserialize)]
pub struct SubmitPartialRequest {
    pub raw_score: Option<f64>,
    pub max_score: Option<f64>,
    pub checklist: Option<Vec<ChecklistEntry>>,
}

/// One submitted checklist judgment.
#[derive(Debug, Clone, Deserialize)]
pub struct ChecklistEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub passed: bool,
}

/// Partial plus its checklist rows, as returned by the exam detail read.
#[derive(Debug, Serialize)]
pub struct PartialDetail {
    #[serde(flatten)]
    pub partial: Partial,
    pub checklist: Vec<ChecklistResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_allowed() {
        use PartialStatus::*;
        assert!(NotYet.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Submitted));
        assert!(Submitted.can_transition_to(Completed));
        assert!(Submitted.can_transition_to(Approved));
        assert!(Submitted.can_transition_to(Rejected));
    }

    #[test]
    fn test_out_of_order_transitions_rejected() {
        use PartialStatus::*;
        // Double start / double submit
        assert!(!InProgress.can_transition_to(InProgress));
        assert!(!Submitted.can_transition_to(Submitted));
        // Skipping states
        assert!(!NotYet.can_transition_to(Submitted));
        assert!(!InProgress.can_transition_to(Approved));
        assert!(!InProgress.can_transition_to(Completed));
        // Backward moves
        assert!(!Submitted.can_transition_to(InProgress));
        assert!(!Completed.can_transition_to(Submitted));
    }

    #[test]
    fn test_terminal_states() {
        use PartialStatus::*;
        assert!(Completed.is_terminal());
        assert!(Approved.is_terminal());
        assert!(Rejected.is_terminal());
        assert!(!NotYet.is_terminal());
        assert!(!InProgress.is_terminal());
        assert!(!Submitted.is_terminal());

        for terminal in [Completed, Approved, Rejected] {
            for next in [NotYet, InProgress, Submitted, Completed, Approved, Rejected] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }
}
