// src/handlers/session.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqlitePool, types::Json as SqlJson};

use crate::{
    error::AppError,
    handlers::grading::{checklist_items, replace_checklist, validate_checklist},
    models::{
        exam_config::ContentRef,
        final_exam::FinalExam,
        partial::{Partial, PartialStatus, PartialType, SubmitPartialRequest},
    },
    utils::{
        jwt::Claims,
        scoring::{checklist_score, normalize_raw, recompute_final_exam},
    },
};

#[derive(Debug, Deserialize)]
pub struct StartPartialRequest {
    /// The one-time exam code handed out when the exam was created.
    pub code: String,
}

/// What an admitted attempt gets back: the content to work on and the
/// bounds of the session.
#[derive(Debug, Serialize)]
pub struct StartPartialResponse {
    pub partial_id: i64,
    pub content_ref: SqlJson<ContentRef>,
    pub duration_minutes: i64,
    pub scheduled_end: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
}

/// Snapshot of the class configuration taken when a partial row is created.
#[derive(Debug, sqlx::FromRow)]
struct ConfigSnapshot {
    version: i64,
    exam_weight: f64,
    duration_minutes: i64,
    content_ref: SqlJson<ContentRef>,
    scheduled_start: Option<DateTime<Utc>>,
    scheduled_end: Option<DateTime<Utc>>,
}

pub(crate) async fn fetch_exam(pool: &SqlitePool, exam_id: i64) -> Result<FinalExam, AppError> {
    sqlx::query_as::<_, FinalExam>(
        r#"
        SELECT id, class_id, enrollment_id, trainee_id, exam_code, status,
               total_marks, is_pass, complete_time, created_at
        FROM final_exams
        WHERE id = ?
        "#,
    )
    .bind(exam_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Final exam not found".to_string()))
}

pub(crate) async fn fetch_partial(pool: &SqlitePool, partial_id: i64) -> Result<Partial, AppError> {
    sqlx::query_as::<_, Partial>(
        r#"
        SELECT id, final_exam_id, partial_type, status, raw_score, max_score,
               normalized_score, exam_weight, config_version, duration_minutes,
               content_ref, scheduled_start, scheduled_end, actual_start_time,
               submitted_at
        FROM partials
        WHERE id = ?
        "#,
    )
    .bind(partial_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Partial not found".to_string()))
}

pub(crate) async fn fetch_partial_by_type(
    pool: &SqlitePool,
    exam_id: i64,
    partial_type: PartialType,
) -> Result<Partial, AppError> {
    sqlx::query_as::<_, Partial>(
        r#"
        SELECT id, final_exam_id, partial_type, status, raw_score, max_score,
               normalized_score, exam_weight, config_version, duration_minutes,
               content_ref, scheduled_start, scheduled_end, actual_start_time,
               submitted_at
        FROM partials
        WHERE final_exam_id = ? AND partial_type = ?
        "#,
    )
    .bind(exam_id)
    .bind(partial_type)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Partial not found".to_string()))
}

/// First-touch creation: materializes the partial row from the class's
/// current config, copying weight, window, duration, content reference and
/// config version. The copy is a historical snapshot; later config edits do
/// not reach rows created here.
pub(crate) async fn ensure_partial_exists(
    pool: &SqlitePool,
    exam: &FinalExam,
    partial_type: PartialType,
) -> Result<(), AppError> {
    let snapshot = sqlx::query_as::<_, ConfigSnapshot>(
        r#"
        SELECT c.version, p.exam_weight, p.duration_minutes, p.content_ref,
               p.scheduled_start, p.scheduled_end
        FROM class_exam_configs c
        JOIN partial_configs p ON p.config_id = c.id
        WHERE c.class_id = ? AND p.partial_type = ?
        "#,
    )
    .bind(exam.class_id)
    .bind(partial_type)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound(
        "Exam configuration has not been committed for this class".to_string(),
    ))?;

    sqlx::query(
        r#"
        INSERT INTO partials
        (final_exam_id, partial_type, status, exam_weight, config_version,
         duration_minutes, content_ref, scheduled_start, scheduled_end)
        VALUES (?, ?, 'not_yet', ?, ?, ?, ?, ?, ?)
        ON CONFLICT(final_exam_id, partial_type) DO NOTHING
        "#,
    )
    .bind(exam.id)
    .bind(partial_type)
    .bind(snapshot.exam_weight)
    .bind(snapshot.version)
    .bind(snapshot.duration_minutes)
    .bind(snapshot.content_ref)
    .bind(snapshot.scheduled_start)
    .bind(snapshot.scheduled_end)
    .execute(pool)
    .await?;

    Ok(())
}

/// Admission control for a timed theory or simulation attempt.
///
/// * Validates the one-time exam code.
/// * Enforces the snapshotted scheduling window.
/// * Claims the session with an atomic check-and-set so that two
///   simultaneous start requests produce exactly one winner.
///
/// Practical attempts never pass through here; the instructor opens them.
pub async fn start_partial(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path((exam_id, partial_type)): Path<(i64, PartialType)>,
    Json(payload): Json<StartPartialRequest>,
) -> Result<impl IntoResponse, AppError> {
    if partial_type == PartialType::Practical {
        return Err(AppError::BadRequest(
            "Practical attempts are scheduled by the instructor".to_string(),
        ));
    }

    let exam = fetch_exam(&pool, exam_id).await?;

    if claims.role == "trainee" && exam.trainee_id != claims.user_id() {
        return Err(AppError::AuthError(
            "You may only start your own exam".to_string(),
        ));
    }

    ensure_partial_exists(&pool, &exam, partial_type).await?;

    if payload.code != exam.exam_code {
        return Err(AppError::InvalidCode);
    }

    let partial = fetch_partial_by_type(&pool, exam_id, partial_type).await?;

    let now = Utc::now();
    if let Some(start) = partial.scheduled_start {
        if now < start {
            return Err(AppError::WindowNotOpen);
        }
    }
    if let Some(end) = partial.scheduled_end {
        if now >= end {
            return Err(AppError::WindowClosed);
        }
    }

    // Single conditional update: of two concurrent requests that both saw
    // 'not_yet', only one affects a row; the loser re-reads and is told why.
    let claimed = sqlx::query(
        r#"
        UPDATE partials
        SET status = 'in_progress', actual_start_time = ?
        WHERE id = ? AND status = 'not_yet'
        "#,
    )
    .bind(now)
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
        "Trainee {} started {} partial of exam {}",
        exam.trainee_id,
        partial_type.as_str(),
        exam_id
    );

    Ok(Json(StartPartialResponse {
        partial_id: partial.id,
        content_ref: partial.content_ref,
        duration_minutes: partial.duration_minutes,
        scheduled_end: partial.scheduled_end,
        started_at: now,
    }))
}

/// Submits an in-progress partial.
///
/// * Theory / simulation: carries the external grader's raw score and
///   auto-completes immediately - there is no human review step.
/// * Practical: carries the instructor's checklist entries and stops at
///   'submitted' pending the approve/reject decision.
pub async fn submit_partial(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(partial_id): Path<i64>,
    Json(payload): Json<SubmitPartialRequest>,
) -> Result<impl IntoResponse, AppError> {
    let partial = fetch_partial(&pool, partial_id).await?;
    let exam = fetch_exam(&pool, partial.final_exam_id).await?;

    match partial.partial_type {
        PartialType::Theory | PartialType::Simulation => {
            if claims.role == "trainee" && exam.trainee_id != claims.user_id() {
                return Err(AppError::AuthError(
                    "You may only submit your own partial".to_string(),
                ));
            }

            let raw_score = payload.raw_score.ok_or(AppError::BadRequest(
                "raw_score is required for theory and simulation partials".to_string(),
            ))?;
            let max_score = payload.max_score.ok_or(AppError::BadRequest(
                "max_score is required for theory and simulation partials".to_string(),
            ))?;
            if max_score <= 0.0 {
                return Err(AppError::BadRequest("max_score must be positive".to_string()));
            }
            if raw_score < 0.0 {
                return Err(AppError::BadRequest("raw_score must not be negative".to_string()));
            }

            let normalized = normalize_raw(raw_score, max_score);

            // The submitted state is passed through transiently: the
            // auto-graded path completes in the same atomic statement.
            let updated = sqlx::query(
                r#"
                UPDATE partials
                SET status = 'completed', raw_score = ?, max_score = ?,
                    normalized_score = ?, submitted_at = ?
                WHERE id = ? AND status = 'in_progress'
                "#,
            )
            .bind(raw_score)
            .bind(max_score)
            .bind(normalized)
            .bind(Utc::now())
            .bind(partial_id)
            .execute(&pool)
            .await?;

            if updated.rows_affected() == 0 {
                return Err(AppError::InvalidTransition(format!(
                    "cannot submit a partial in status '{}'",
                    partial.status.as_str()
                )));
            }

            recompute_final_exam(&pool, partial.final_exam_id).await?;
        }
        PartialType::Practical => {
            if claims.role == "trainee" {
                return Err(AppError::AuthError(
                    "Practical checklists are recorded by the instructor".to_string(),
                ));
            }

            let entries = payload.checklist.ok_or(AppError::BadRequest(
                "checklist is required for practical partials".to_string(),
            ))?;

            let configured = checklist_items(&partial)?;
            let (passed, total) = validate_checklist(&configured, &entries)?;
            let normalized = checklist_score(passed, total);

            let mut tx = pool.begin().await?;

            let updated = sqlx::query(
                r#"
                UPDATE partials
                SET status = 'submitted', normalized_score = ?, submitted_at = ?
                WHERE id = ? AND status = 'in_progress'
                "#,
            )
            .bind(normalized)
            .bind(Utc::now())
            .bind(partial_id)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                return Err(AppError::InvalidTransition(format!(
                    "cannot submit a partial in status '{}'",
                    partial.status.as_str()
                )));
            }

            replace_checklist(&mut tx, partial_id, &entries).await?;
            tx.commit().await?;
            // Not terminal yet: the aggregator runs on the instructor decision.
        }
    }

    let partial = fetch_partial(&pool, partial_id).await?;
    Ok(Json(partial))
}
