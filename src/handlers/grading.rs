// src/handlers/grading.rs

use std::collections::HashSet;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::{
    error::AppError,
    handlers::session::{ensure_partial_exists, fetch_exam, fetch_partial, fetch_partial_by_type},
    models::{
        exam_config::{ChecklistItem, ContentRef},
        partial::{ChecklistEntry, Partial, PartialStatus, PartialType, PracticalDecision},
    },
    utils::{
        jwt::Claims,
        scoring::{checklist_score, recompute_final_exam},
    },
};

#[derive(Debug, Deserialize)]
pub struct OpenPracticalRequest {
    /// Per-trainee window assigned by the instructor.
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct GradePracticalRequest {
    pub checklist: Vec<ChecklistEntry>,
    pub decision: PracticalDecision,
}

/// The checklist the partial snapshotted at creation time.
pub(crate) fn checklist_items(partial: &Partial) -> Result<Vec<ChecklistItem>, AppError> {
    match &partial.content_ref.0 {
        ContentRef::Checklist { items } => Ok(items.clone()),
        _ => Err(AppError::InternalServerError(
            "practical partial has no checklist content".to_string(),
        )),
    }
}

/// Checks the submitted entries against the configured item list: every
/// configured item exactly once, nothing unknown. Returns (passed, total).
pub(crate) fn validate_checklist(
    configured: &[ChecklistItem],
    entries: &[ChecklistEntry],
) -> Result<(usize, usize), AppError> {
    let known: HashSet<&str> = configured.iter().map(|i| i.name.as_str()).collect();

    let mut seen = HashSet::new();
    for entry in entries {
        if !known.contains(entry.name.as_str()) {
            return Err(AppError::ChecklistMismatch(format!(
                "unknown checklist item '{}'",
                entry.name
            )));
        }
        if !seen.insert(entry.name.as_str()) {
            return Err(AppError::ChecklistMismatch(format!(
                "duplicate checklist item '{}'",
                entry.name
            )));
        }
    }

    for item in configured {
        if !seen.contains(item.name.as_str()) {
            return Err(AppError::ChecklistMismatch(format!(
                "missing checklist item '{}'",
                item.name
            )));
        }
    }

    let passed = entries.iter().filter(|e| e.passed).count();
    Ok((passed, configured.len()))
}

/// Replaces a partial's checklist rows with the given entries.
pub(crate) async fn replace_checklist(
    tx: &mut Transaction<'_, Sqlite>,
    partial_id: i64,
    entries: &[ChecklistEntry],
) -> Result<(), AppError> {
    sqlx::query("DELETE FROM checklist_results WHERE partial_id = ?")
        .bind(partial_id)
        .execute(&mut **tx)
        .await?;

    for (position, entry) in entries.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO checklist_results (partial_id, item_name, description, passed, position)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(partial_id)
        .bind(&entry.name)
        .bind(&entry.description)
        .bind(entry.passed)
        .bind(position as i64)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

/// Opens a trainee's practical attempt: assigns the per-trainee window and
/// starts the session. Instructor-initiated; no exam code involved.
pub async fn open_practical(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
    Json(payload): Json<OpenPracticalRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.window_end <= payload.window_start {
        return Err(AppError::BadRequest(
            "window end must be after its start".to_string(),
        ));
    }

    let exam = fetch_exam(&pool, exam_id).await?;

    ensure_partial_exists(&pool, &exam, PartialType::Practical).await?;
    let partial = fetch_partial_by_type(&pool, exam_id, PartialType::Practical).await?;

    // Window assignment and session claim in one conditional update.
    let claimed = sqlx::query(
        r#"
        UPDATE partials
        SET scheduled_start = ?, scheduled_end = ?,
            status = 'in_progress', actual_start_time = ?
        WHERE id = ? AND status = 'not_yet'
        "#,
    )
    .bind(payload.window_start)
    .bind(payload.window_end)
    .bind(Utc::now())
    .bind(partial.id)
    .execute(&pool)
    .await?;

    if claimed.rows_affected() == 0 {
        let status =
            sqlx::query_scalar::<_, PartialStatus>("SELECT status FROM partials WHERE id = ?")
                .bind(partial.id)
                .fetch_one(&pool)
                .await?;

        return Err(match status {
            PartialStatus::InProgress => AppError::SessionAlreadyActive,
            _ => AppError::AlreadyTerminal,
        });
    }

    sqlx::query("UPDATE final_exams SET status = 'in_progress' WHERE id = ? AND status = 'not_yet'")
        .bind(exam_id)
        .execute(&pool)
        .await?;

    tracing::info!(
        "Instructor {} opened the practical of exam {} for trainee {}",
        claims.user_id(),
        exam_id,
        exam.trainee_id
    );

    let partial = fetch_partial(&pool, partial.id).await?;
    Ok(Json(partial))
}

/// Records the instructor's checklist evaluation and terminal decision for
/// a practical partial.
///
/// * Valid from 'in_progress' (finalize and decide in one call) or
///   'submitted' (decide; a supplied checklist replaces the previous one).
/// * The normalized score is the checklist pass ratio on the 0-10 scale.
/// * The approve/reject decision is an independent judgment - a low ratio
///   does not force rejection, nor a high one approval.
pub async fn grade_practical(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(partial_id): Path<i64>,
    Json(payload): Json<GradePracticalRequest>,
) -> Result<impl IntoResponse, AppError> {
    let partial = fetch_partial(&pool, partial_id).await?;

    if partial.partial_type != PartialType::Practical {
        return Err(AppError::BadRequest(
            "Only practical partials are graded by checklist".to_string(),
        ));
    }

    if !matches!(
        partial.status,
        PartialStatus::InProgress | PartialStatus::Submitted
    ) {
        return Err(AppError::InvalidTransition(format!(
            "cannot grade a practical in status '{}'",
            partial.status.as_str()
        )));
    }

    let configured = checklist_items(&partial)?;
    let (passed, total) = validate_checklist(&configured, &payload.checklist)?;
    let normalized = checklist_score(passed, total);
    let target = payload.decision.as_status();

    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        r#"
        UPDATE partials
        SET status = ?, normalized_score = ?, submitted_at = COALESCE(submitted_at, ?)
        WHERE id = ? AND status IN ('in_progress', 'submitted')
        "#,
    )
    .bind(target)
    .bind(normalized)
    .bind(Utc::now())
    .bind(partial_id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(AppError::InvalidTransition(
            "practical was graded concurrently".to_string(),
        ));
    }

    replace_checklist(&mut tx, partial_id, &payload.checklist).await?;
    tx.commit().await?;

    recompute_final_exam(&pool, partial.final_exam_id).await?;

    tracing::info!(
        "Instructor {} graded practical partial {}: {} ({} of {} items passed)",
        claims.user_id(),
        partial_id,
        target.as_str(),
        passed,
        total
    );

    let partial = fetch_partial(&pool, partial_id).await?;
    Ok(Json(partial))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured(names: &[&str]) -> Vec<ChecklistItem> {
        names
            .iter()
            .map(|n| ChecklistItem {
                name: n.to_string(),
                description: String::new(),
            })
            .collect()
    }

    fn entry(name: &str, passed: bool) -> ChecklistEntry {
        ChecklistEntry {
            name: name.to_string(),
            description: String::new(),
            passed,
        }
    }

    #[test]
    fn test_validate_checklist_counts_passed_items() {
        let items = configured(&["a", "b", "c", "d", "e", "f"]);
        let entries = vec![
            entry("a", true),
            entry("b", true),
            entry("c", true),
            entry("d", true),
            entry("e", false),
            entry("f", false),
        ];

        let (passed, total) = validate_checklist(&items, &entries).unwrap();
        assert_eq!((passed, total), (4, 6));
        // 10 x 4/6, rounded to two decimals
        assert_eq!(checklist_score(passed, total), 6.67);
    }

    #[test]
    fn test_validate_checklist_rejects_missing_item() {
        let items = configured(&["a", "b"]);
        let entries = vec![entry("a", true)];

        let err = validate_checklist(&items, &entries).unwrap_err();
        match err {
            AppError::ChecklistMismatch(msg) => assert!(msg.contains("missing")),
            other => panic!("expected ChecklistMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_checklist_rejects_duplicate_item() {
        let items = configured(&["a", "b"]);
        let entries = vec![entry("a", true), entry("a", false), entry("b", true)];

        let err = validate_checklist(&items, &entries).unwrap_err();
        match err {
            AppError::ChecklistMismatch(msg) => assert!(msg.contains("duplicate")),
            other => panic!("expected ChecklistMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_checklist_rejects_unknown_item() {
        let items = configured(&["a"]);
        let entries = vec![entry("a", true), entry("z", true)];

        let err = validate_checklist(&items, &entries).unwrap_err();
        match err {
            AppError::ChecklistMismatch(msg) => assert!(msg.contains("unknown")),
            other => panic!("expected ChecklistMismatch, got {:?}", other),
        }
    }
}
