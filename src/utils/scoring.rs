// src/utils/scoring.rs

use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    config::{DEFAULT_PASSING_MARKS, FULL_MARKS},
    error::AppError,
    models::{final_exam::ExamStatus, partial::PartialStatus},
};

/// Rounds to two decimals. All persisted scores go through this so that
/// decimal inputs like 0.1 + 0.2 compare cleanly.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Rescales an external raw score to the common 0-10 basis.
pub fn normalize_raw(raw_score: f64, max_score: f64) -> f64 {
    if max_score <= 0.0 {
        return 0.0;
    }
    round2((raw_score / max_score * FULL_MARKS).clamp(0.0, FULL_MARKS))
}

/// Normalized sub-score of a practical checklist: 10 x passed/total.
pub fn checklist_score(passed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(passed as f64 / total as f64 * FULL_MARKS)
}

/// Minimal view of a partial consumed by the aggregator.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PartialOutcome {
    pub status: PartialStatus,
    pub normalized_score: Option<f64>,
    pub exam_weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateOutcome {
    pub total_marks: f64,
    pub all_terminal: bool,
    pub any_started: bool,
}

/// Combines the partial set into the weighted total. Pure function of its
/// input: rerunning it over an unchanged set yields the same outcome.
///
/// Only partials in a terminal state contribute; the exam counts as
/// complete once all three types exist and are terminal.
pub fn aggregate(partials: &[PartialOutcome]) -> AggregateOutcome {
    let total: f64 = partials
        .iter()
        .filter(|p| p.status.is_terminal())
        .map(|p| p.normalized_score.unwrap_or(0.0) * p.exam_weight)
        .sum();

    AggregateOutcome {
        total_marks: round2(total.clamp(0.0, FULL_MARKS)),
        all_terminal: partials.len() == 3 && partials.iter().all(|p| p.status.is_terminal()),
        any_started: partials.iter().any(|p| p.status != PartialStatus::NotYet),
    }
}

/// Recomputes a final exam's totals, status and verdict from its partials.
///
/// Invoked whenever a partial reaches a terminal state. `complete_time` is
/// written once and kept on later idempotent re-runs.
pub async fn recompute_final_exam(pool: &SqlitePool, final_exam_id: i64) -> Result<(), AppError> {
    let partials = sqlx::query_as::<_, PartialOutcome>(
        r#"
        SELECT status, normalized_score, exam_weight
        FROM partials
        WHERE final_exam_id = ?
        "#,
    )
    .bind(final_exam_id)
    .fetch_all(pool)
    .await?;

    let passing_marks = sqlx::query_scalar::<_, f64>(
        r#"
        SELECT c.passing_marks
        FROM class_exam_configs c
        JOIN final_exams f ON f.class_id = c.class_id
        WHERE f.id = ?
        "#,
    )
    .bind(final_exam_id)
    .fetch_optional(pool)
    .await?
    .unwrap_or(DEFAULT_PASSING_MARKS);

    let outcome = aggregate(&partials);

    if outcome.all_terminal {
        let is_pass = outcome.total_marks >= passing_marks;

        sqlx::query(
            r#"
            UPDATE final_exams
            SET status = 'completed',
                total_marks = ?,
                is_pass = ?,
                complete_time = COALESCE(complete_time, ?)
            WHERE id = ?
            "#,
        )
        .bind(outcome.total_marks)
        .bind(is_pass)
        .bind(Utc::now())
        .bind(final_exam_id)
        .execute(pool)
        .await?;

        tracing::info!(
            "Final exam {} completed: total {:.2}, pass = {}",
            final_exam_id,
            outcome.total_marks,
            is_pass
        );
    } else {
        let status = if outcome.any_started {
            ExamStatus::InProgress
        } else {
            ExamStatus::NotYet
        };

        sqlx::query(
            r#"
            UPDATE final_exams
            SET status = ?,
                total_marks = ?,
                is_pass = NULL,
                complete_time = NULL
            WHERE id = ?
            "#,
        )
        .bind(status)
        .bind(outcome.total_marks)
        .bind(final_exam_id)
        .execute(pool)
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terminal(normalized: f64, weight: f64) -> PartialOutcome {
        PartialOutcome {
            status: PartialStatus::Completed,
            normalized_score: Some(normalized),
            exam_weight: weight,
        }
    }

    #[test]
    fn test_round2_corrects_decimal_drift() {
        assert_eq!(round2(0.1 + 0.2), 0.3);
        assert_eq!(round2(6.666666), 6.67);
        assert_eq!(round2(7.7000000000000005), 7.7);
    }

    #[test]
    fn test_normalize_raw() {
        assert_eq!(normalize_raw(8.0, 10.0), 8.0);
        assert_eq!(normalize_raw(15.0, 20.0), 7.5);
        // Clamped: raw above max never exceeds the scale
        assert_eq!(normalize_raw(12.0, 10.0), 10.0);
        assert_eq!(normalize_raw(5.0, 0.0), 0.0);
    }

    #[test]
    fn test_checklist_score_four_of_six() {
        assert_eq!(checklist_score(4, 6), 6.67);
        assert_eq!(checklist_score(6, 6), 10.0);
        assert_eq!(checklist_score(0, 6), 0.0);
        assert_eq!(checklist_score(0, 0), 0.0);
    }

    #[test]
    fn test_aggregate_weighted_total() {
        // 0.40 x 8.0 + 0.30 x 6.0 + 0.30 x 9.0 = 7.70
        let partials = vec![terminal(8.0, 0.40), terminal(6.0, 0.30), terminal(9.0, 0.30)];

        let outcome = aggregate(&partials);
        assert_eq!(outcome.total_marks, 7.7);
        assert!(outcome.all_terminal);
        assert!(outcome.any_started);
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let partials = vec![terminal(8.0, 0.40), terminal(6.0, 0.30), terminal(9.0, 0.30)];

        let first = aggregate(&partials);
        let second = aggregate(&partials);
        assert_eq!(first, second);
    }

    #[test]
    fn test_aggregate_ignores_non_terminal_partials() {
        let mut partials = vec![terminal(8.0, 0.40), terminal(6.0, 0.30)];
        partials.push(PartialOutcome {
            status: PartialStatus::InProgress,
            normalized_score: None,
            exam_weight: 0.30,
        });

        let outcome = aggregate(&partials);
        // Only the two terminal partials contribute
        assert_eq!(outcome.total_marks, 5.0);
        assert!(!outcome.all_terminal);
        assert!(outcome.any_started);
    }

    #[test]
    fn test_aggregate_empty_set() {
        let outcome = aggregate(&[]);
        assert_eq!(outcome.total_marks, 0.0);
        assert!(!outcome.all_terminal);
        assert!(!outcome.any_started);
    }

    #[test]
    fn test_aggregate_clamps_to_scale() {
        // Weights snapshotted before a config fix could in theory overshoot;
        // the total still stays on the 0-10 scale.
        let partials = vec![terminal(10.0, 0.60), terminal(10.0, 0.60), terminal(10.0, 0.30)];

        let outcome = aggregate(&partials);
        assert_eq!(outcome.total_marks, 10.0);
    }
}
