// src/handlers/weights.rs

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::{SqlitePool, types::Json as SqlJson};
use validator::Validate;

use crate::{
    config::{DEFAULT_PASSING_MARKS, WEIGHT_SUM_EPSILON},
    error::AppError,
    models::{
        exam_config::{
            ClassExamConfig, ClassExamConfigResponse, ConfigureWeightsRequest, ContentRef,
            PartialConfig,
        },
        partial::PartialType,
    },
    utils::scoring::round2,
};

/// Validates the weight triple: each value strictly inside (0, 1) and the
/// two-decimal-rounded sum equal to 1.00 within the epsilon. Returns the
/// rounded triple that gets persisted.
fn validate_weights(
    theory: f64,
    simulation: f64,
    practical: f64,
) -> Result<(f64, f64, f64), AppError> {
    for (name, value) in [
        ("theory", theory),
        ("simulation", simulation),
        ("practical", practical),
    ] {
        if value <= 0.0 || value >= 1.0 {
            return Err(AppError::InvalidWeightDistribution(format!(
                "{} weight {} is outside the open interval (0, 1)",
                name, value
            )));
        }
    }

    let (theory, simulation, practical) = (round2(theory), round2(simulation), round2(practical));

    // Round before comparing: naive addition of decimals like 0.1 + 0.2
    // leaves representable-but-wrong remainders.
    let sum = round2(theory + simulation + practical);
    if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
        return Err(AppError::InvalidWeightDistribution(format!(
            "weights sum to {:.2}, expected 1.00",
            sum
        )));
    }

    Ok((theory, simulation, practical))
}

/// Commits a class's exam configuration: the weight triple plus per-type
/// duration, content reference and (theory/simulation) scheduling window.
///
/// * All three sections are written in one transaction - all or none.
/// * The class row's version is bumped on every commit; partials snapshot
///   the version they were created under.
/// * Existing partial snapshots are never touched by a reconfiguration.
pub async fn configure_weights(
    State(pool): State<SqlitePool>,
    Path(class_id): Path<i64>,
    Json(payload): Json<ConfigureWeightsRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let (theory_weight, simulation_weight, practical_weight) = validate_weights(
        payload.theory.exam_weight,
        payload.simulation.exam_weight,
        payload.practical.exam_weight,
    )?;

    for (name, start, end) in [
        (
            "theory",
            payload.theory.scheduled_start,
            payload.theory.scheduled_end,
        ),
        (
            "simulation",
            payload.simulation.scheduled_start,
            payload.simulation.scheduled_end,
        ),
    ] {
        if end <= start {
            return Err(AppError::BadRequest(format!(
                "{} window end must be after its start",
                name
            )));
        }
    }

    let mut tx = pool.begin().await?;

    let config = sqlx::query_as::<_, ClassExamConfig>(
        r#"
        INSERT INTO class_exam_configs (class_id, passing_marks)
        VALUES (?, COALESCE(?, ?))
        ON CONFLICT(class_id) DO UPDATE SET
            version = version + 1,
            passing_marks = COALESCE(?, passing_marks),
            updated_at = datetime('now')
        RETURNING id, class_id, version, passing_marks, created_at, updated_at
        "#,
    )
    .bind(class_id)
    .bind(payload.passing_marks)
    .bind(DEFAULT_PASSING_MARKS)
    .bind(payload.passing_marks)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to upsert class exam config: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    sqlx::query("DELETE FROM partial_configs WHERE config_id = ?")
        .bind(config.id)
        .execute(&mut *tx)
        .await?;

    let insert_sql = r#"
        INSERT INTO partial_configs
        (config_id, partial_type, exam_weight, duration_minutes, content_ref, scheduled_start, scheduled_end)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#;

    sqlx::query(insert_sql)
        .bind(config.id)
        .bind(PartialType::Theory)
        .bind(theory_weight)
        .bind(payload.theory.duration_minutes)
        .bind(SqlJson(ContentRef::Quiz {
            quiz_id: payload.theory.quiz_id,
        }))
        .bind(payload.theory.scheduled_start)
        .bind(payload.theory.scheduled_end)
        .execute(&mut *tx)
        .await?;

    sqlx::query(insert_sql)
        .bind(config.id)
        .bind(PartialType::Simulation)
        .bind(simulation_weight)
        .bind(payload.simulation.duration_minutes)
        .bind(SqlJson(ContentRef::Practice {
            practice_id: payload.simulation.practice_id,
        }))
        .bind(payload.simulation.scheduled_start)
        .bind(payload.simulation.scheduled_end)
        .execute(&mut *tx)
        .await?;

    sqlx::query(insert_sql)
        .bind(config.id)
        .bind(PartialType::Practical)
        .bind(practical_weight)
        .bind(payload.practical.duration_minutes)
        .bind(SqlJson(ContentRef::Checklist {
            items: payload.practical.checklist.clone(),
        }))
        .bind(Option::<chrono::DateTime<chrono::Utc>>::None)
        .bind(Option::<chrono::DateTime<chrono::Utc>>::None)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(
        "Class {} exam config committed (version {}): weights {:.2}/{:.2}/{:.2}",
        class_id,
        config.version,
        theory_weight,
        simulation_weight,
        practical_weight
    );

    let partials = fetch_partial_configs(&pool, config.id).await?;

    Ok(Json(ClassExamConfigResponse { config, partials }))
}

/// Reads a class's committed exam configuration.
pub async fn get_exam_config(
    State(pool): State<SqlitePool>,
    Path(class_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let config = sqlx::query_as::<_, ClassExamConfig>(
        r#"
        SELECT id, class_id, version, passing_marks, created_at, updated_at
        FROM class_exam_configs
        WHERE class_id = ?
        "#,
    )
    .bind(class_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound(
        "Exam configuration not found for this class".to_string(),
    ))?;

    let partials = fetch_partial_configs(&pool, config.id).await?;

    Ok(Json(ClassExamConfigResponse { config, partials }))
}

async fn fetch_partial_configs(
    pool: &SqlitePool,
    config_id: i64,
) -> Result<Vec<PartialConfig>, AppError> {
    let partials = sqlx::query_as::<_, PartialConfig>(
        r#"
        SELECT id, config_id, partial_type, exam_weight, duration_minutes,
               content_ref, scheduled_start, scheduled_end
        FROM partial_configs
        WHERE config_id = ?
        ORDER BY id
        "#,
    )
    .bind(config_id)
    .fetch_all(pool)
    .await?;

    Ok(partials)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_weights_accepts_exact_triple() {
        let (t, s, p) = validate_weights(0.40, 0.30, 0.30).unwrap();
        assert_eq!((t, s, p), (0.40, 0.30, 0.30));
    }

    #[test]
    fn test_validate_weights_corrects_decimal_drift() {
        // 0.1 + 0.2 + 0.7 does not sum to exactly 1.0 in binary floats
        assert!(validate_weights(0.1, 0.2, 0.7).is_ok());
        assert!(validate_weights(0.15, 0.35, 0.50).is_ok());
    }

    #[test]
    fn test_validate_weights_rejects_out_of_range() {
        for triple in [
            (0.0, 0.5, 0.5),
            (1.0, 0.5, 0.5),
            (-0.2, 0.6, 0.6),
            (0.5, 0.5, 1.2),
        ] {
            let err = validate_weights(triple.0, triple.1, triple.2).unwrap_err();
            match err {
                AppError::InvalidWeightDistribution(msg) => {
                    assert!(msg.contains("open interval"), "unexpected message: {}", msg)
                }
                other => panic!("expected InvalidWeightDistribution, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_validate_weights_rejects_sum_mismatch() {
        let err = validate_weights(0.50, 0.30, 0.30).unwrap_err();
        match err {
            AppError::InvalidWeightDistribution(msg) => {
                assert!(msg.contains("sum"), "unexpected message: {}", msg)
            }
            other => panic!("expected InvalidWeightDistribution, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_weights_rounds_to_two_decimals() {
        let (t, s, p) = validate_weights(0.4000000001, 0.2999999999, 0.30).unwrap();
        assert_eq!((t, s, p), (0.40, 0.30, 0.30));
    }
}
