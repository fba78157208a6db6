// src/models/final_exam.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

use crate::models::partial::PartialDetail;

/// Exam-level status, derived from the owned partials by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ExamStatus {
    NotYet,
    InProgress,
    Completed,
}

/// Represents the 'final_exams' table: one row per (class, enrollment).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FinalExam {
    pub id: i64,
    pub class_id: i64,
    pub enrollment_id: i64,
    pub trainee_id: i64,

    /// One-time secret admitting timed attempts. Never serialized back to
    /// callers; the create endpoint hands it out once.
    #[serde(skip_serializing)]
    pub exam_code: String,

    pub status: ExamStatus,
    pub total_marks: Option<f64>,
    pub is_pass: Option<bool>,
    pub complete_time: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

/// DTO for creating a final exam. The identifiers are resolved by the
/// external class/enrollment store; this service just records them.
#[derive(Debug, Deserialize)]
pub struct CreateFinalExamRequest {
    pub class_id: i64,
    pub enrollment_id: i64,
    pub trainee_id: i64,
}

/// Full read model: the exam plus its partials and their checklists.
#[derive(Debug, Serialize)]
pub struct FinalExamDetail {
    #[serde(flatten)]
    pub exam: FinalExam,
    pub partials: Vec<PartialDetail>,
}
