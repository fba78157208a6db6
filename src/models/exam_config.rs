// src/models/exam_config.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

use crate::models::partial::PartialType;

/// Represents the 'class_exam_configs' table in the database.
/// One row per class; `version` increases on every committed
/// reconfiguration so partial snapshots can record their origin.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ClassExamConfig {
    pub id: i64,
    pub class_id: i64,
    pub version: i64,

    /// Pass threshold on the 0-10 scale, supplied by the class administrator.
    pub passing_marks: f64,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Represents the 'partial_configs' table: one row per partial type under a
/// committed class config.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PartialConfig {
    pub id: i64,
    pub config_id: i64,
    pub partial_type: PartialType,
    pub exam_weight: f64,
    pub duration_minutes: i64,
    pub content_ref: Json<ContentRef>,

    /// Class-level window for theory and simulation. Practical windows are
    /// assigned per trainee when the instructor schedules the attempt.
    pub scheduled_start: Option<DateTime<Utc>>,
    pub scheduled_end: Option<DateTime<Utc>>,
}

/// What a partial points at: the quiz, the practice scenario, or the
/// checklist the instructor grades against. Stored as a JSON column.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentRef {
    Quiz { quiz_id: i64 },
    Practice { practice_id: i64 },
    Checklist { items: Vec<ChecklistItem> },
}

/// One rubric item of a practical checklist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Full config payload returned to callers: the class row plus its three
/// partial sections.
#[derive(Debug, Serialize)]
pub struct ClassExamConfigResponse {
    #[serde(flatten)]
    pub config: ClassExamConfig,
    pub partials: Vec<PartialConfig>,
}

/// DTO for committing a class's exam configuration. All three sections must
/// be present; the commit is all-or-none.
#[derive(Debug, Deserialize, Validate)]
pub struct ConfigureWeightsRequest {
    #[validate(nested)]
    pub theory: TheorySection,
    #[validate(nested)]
    pub simulation: SimulationSection,
    #[validate(nested)]
    pub practical: PracticalSection,

    /// Optional: absent keeps the class's current threshold (or the default
    /// on first commit).
    pub passing_marks: Option<f64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TheorySection {
    pub exam_weight: f64,
    #[validate(range(min = 1, message = "duration must be at least one minute"))]
    pub duration_minutes: i64,
    pub quiz_id: i64,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SimulationSection {
    pub exam_weight: f64,
    #[validate(range(min = 1, message = "duration must be at least one minute"))]
    pub duration_minutes: i64,
    pub practice_id: i64,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PracticalSection {
    pub exam_weight: f64,
    #[validate(range(min = 1, message = "duration must be at least one minute"))]
    pub duration_minutes: i64,
    #[validate(custom(function = validate_checklist_items))]
    pub checklist: Vec<ChecklistItem>,
}

fn validate_checklist_items(items: &[ChecklistItem]) -> Result<(), validator::ValidationError> {
    if items.is_empty() {
        return Err(validator::ValidationError::new("checklist_cannot_be_empty"));
    }
    let mut seen = std::collections::HashSet::new();
    for item in items {
        if item.name.is_empty() || item.name.len() > 200 {
            return Err(validator::ValidationError::new("checklist_item_name_invalid"));
        }
        if !seen.insert(item.name.as_str()) {
            return Err(validator::ValidationError::new("checklist_item_duplicated"));
        }
    }
    Ok(())
}
