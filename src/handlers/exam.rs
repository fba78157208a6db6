// src/handlers/exam.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    error::AppError,
    handlers::session::{fetch_exam, fetch_partial},
    models::{
        final_exam::{CreateFinalExamRequest, FinalExamDetail},
        partial::{ChecklistResult, Partial, PartialDetail, PartialStatus, PartialType},
    },
    utils::{jwt::Claims, scoring::recompute_final_exam},
};

/// Creates a final exam for an enrollment and mints its one-time code.
/// Admin only. The identifiers come pre-resolved from the enrollment store.
pub async fn create_final_exam(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateFinalExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    let exam_code = Uuid::new_v4().to_string();

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO final_exams (class_id, enrollment_id, trainee_id, exam_code)
        VALUES (?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(payload.class_id)
    .bind(payload.enrollment_id)
    .bind(payload.trainee_id)
    .bind(&exam_code)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint") {
            AppError::Conflict("A final exam already exists for this enrollment".to_string())
        } else {
            tracing::error!("Failed to create final exam: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"id": id, "exam_code": exam_code})),
    ))
}

/// Full exam read: the exam row, its partials and practical checklists, and
/// the aggregated totals. Trainees may read their own exam only.
pub async fn get_final_exam(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exam = fetch_exam(&pool, exam_id).await?;

    if claims.role == "trainee" && exam.trainee_id != claims.user_id() {
        return Err(AppError::AuthError(
            "You may only view your own exam".to_string(),
        ));
    }

    let partials = sqlx::query_as::<_, Partial>(
        r#"
        SELECT id, final_exam_id, partial_type, status, raw_score, max_score,
               normalized_score, exam_weight, config_version, duration_minutes,
               content_ref, scheduled_start, scheduled_end, actual_start_time,
               submitted_at
        FROM partials
        WHERE final_exam_id = ?
        ORDER BY id
        "#,
    )
    .bind(exam_id)
    .fetch_all(&pool)
    .await?;

    let mut details = Vec::with_capacity(partials.len());
    for partial in partials {
        let checklist = if partial.partial_type == PartialType::Practical {
            sqlx::query_as::<_, ChecklistResult>(
                r#"
                SELECT id, partial_id, item_name, description, passed, position
                FROM checklist_results
                WHERE partial_id = ?
                ORDER BY position
                "#,
            )
            .bind(partial.id)
            .fetch_all(&pool)
            .await?
        } else {
            Vec::new()
        };

        details.push(PartialDetail { partial, checklist });
    }

    Ok(Json(FinalExamDetail {
        exam,
        partials: details,
    }))
}

/// Deletes a final exam and everything it owns.
/// Admin only.
pub async fn delete_final_exam(
    State(pool): State<SqlitePool>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "DELETE FROM checklist_results WHERE partial_id IN (SELECT id FROM partials WHERE final_exam_id = ?)",
    )
    .bind(exam_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM partials WHERE final_exam_id = ?")
        .bind(exam_id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query("DELETE FROM final_exams WHERE id = ?")
        .bind(exam_id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Final exam not found".to_string()));
    }

    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct OverridePartialRequest {
    pub status: PartialStatus,
}

/// Forces a partial into a status outside the normal transition table.
/// Admin only; every use is logged. Moving backward clears recorded scores
/// so the row can be re-attempted cleanly.
pub async fn override_partial(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(partial_id): Path<i64>,
    Json(payload): Json<OverridePartialRequest>,
) -> Result<impl IntoResponse, AppError> {
    let partial = fetch_partial(&pool, partial_id).await?;

    tracing::warn!(
        "Admin {} override: partial {} forced '{}' -> '{}'",
        claims.user_id(),
        partial_id,
        partial.status.as_str(),
        payload.status.as_str()
    );

    let backward = matches!(
        payload.status,
        PartialStatus::NotYet | PartialStatus::InProgress
    );

    if backward {
        sqlx::query(
            r#"
            UPDATE partials
            SET status = ?, raw_score = NULL, max_score = NULL,
                normalized_score = NULL, submitted_at = NULL,
                actual_start_time = CASE WHEN ? = 'not_yet' THEN NULL ELSE actual_start_time END
            WHERE id = ?
            "#,
        )
        .bind(payload.status)
        .bind(payload.status)
        .bind(partial_id)
        .execute(&pool)
        .await?;
    } else {
        sqlx::query("UPDATE partials SET status = ? WHERE id = ?")
            .bind(payload.status)
            .bind(partial_id)
            .execute(&pool)
            .await?;
    }

    recompute_final_exam(&pool, partial.final_exam_id).await?;

    let partial = fetch_partial(&pool, partial_id).await?;
    Ok(Json(partial))
}
