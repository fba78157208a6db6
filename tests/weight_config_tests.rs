// tests/weight_config_tests.rs

use certexam::{config::Config, routes, state::AppState, utils::jwt::sign_jwt};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;

const JWT_SECRET: &str = "weight_config_test_secret";

/// Helper function to spawn the app on a random port for testing.
/// Every test gets its own throwaway SQLite database file.
async fn spawn_app() -> (String, SqlitePool) {
    let db_path = std::env::temp_dir().join(format!(
        "certexam_test_{}.db",
        uuid::Uuid::new_v4().simple()
    ));
    let database_url = format!("sqlite://{}", db_path.display());

    let options = SqliteConnectOptions::from_str(&database_url)
        .expect("invalid test database url")
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .expect("Failed to open test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url,
        jwt_secret: JWT_SECRET.to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
    };

    let state = AppState {
        pool: pool.clone(),
        config,
    };
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (address, pool)
}

fn token(id: i64, role: &str) -> String {
    sign_jwt(id, role, JWT_SECRET, 600).unwrap()
}

fn config_payload(theory: f64, simulation: f64, practical: f64) -> serde_json::Value {
    let start = (chrono::Utc::now() - chrono::Duration::hours(1)).to_rfc3339();
    let end = (chrono::Utc::now() + chrono::Duration::hours(2)).to_rfc3339();

    serde_json::json!({
        "theory": {
            "exam_weight": theory,
            "duration_minutes": 60,
            "quiz_id": 11,
            "scheduled_start": start,
            "scheduled_end": end,
        },
        "simulation": {
            "exam_weight": simulation,
            "duration_minutes": 45,
            "practice_id": 22,
            "scheduled_start": start,
            "scheduled_end": end,
        },
        "practical": {
            "exam_weight": practical,
            "duration_minutes": 90,
            "checklist": [
                {"name": "safety briefing", "description": "PPE and area check"},
                {"name": "procedure order", "description": ""},
                {"name": "cleanup", "description": ""},
            ],
        },
        "passing_marks": 7.0,
    })
}

#[tokio::test]
async fn configure_weights_and_read_back() {
    // Arrange
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .put(format!("{}/api/admin/classes/1/exam-config", address))
        .header("Authorization", format!("Bearer {}", token(1, "admin")))
        .json(&config_payload(0.40, 0.30, 0.30))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["version"], 1);
    assert_eq!(body["passing_marks"], 7.0);
    assert_eq!(body["partials"].as_array().unwrap().len(), 3);

    // A subsequent read returns exactly the committed triple
    let read: serde_json::Value = client
        .get(format!("{}/api/classes/1/exam-config", address))
        .header("Authorization", format!("Bearer {}", token(2, "instructor")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let weights: Vec<f64> = read["partials"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["exam_weight"].as_f64().unwrap())
        .collect();
    assert_eq!(weights, vec![0.40, 0.30, 0.30]);
}

#[tokio::test]
async fn invalid_sum_rejected_and_prior_config_kept() {
    // Arrange
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let admin = token(1, "admin");

    let ok = client
        .put(format!("{}/api/admin/classes/1/exam-config", address))
        .header("Authorization", format!("Bearer {}", admin))
        .json(&config_payload(0.40, 0.30, 0.30))
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status().as_u16(), 200);

    // Act: sum is 1.10
    let response = client
        .put(format!("{}/api/admin/classes/1/exam-config", address))
        .header("Authorization", format!("Bearer {}", admin))
        .json(&config_payload(0.50, 0.30, 0.30))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status().as_u16(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "invalid_weight_distribution");

    // The earlier commit is untouched
    let read: serde_json::Value = client
        .get(format!("{}/api/classes/1/exam-config", address))
        .header("Authorization", format!("Bearer {}", admin))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(read["version"], 1);
    assert_eq!(read["partials"][0]["exam_weight"], 0.40);
}

#[tokio::test]
async fn out_of_range_weight_rejected() {
    // Arrange
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    // Act: zero weight is outside the open interval
    let response = client
        .put(format!("{}/api/admin/classes/1/exam-config", address))
        .header("Authorization", format!("Bearer {}", token(1, "admin")))
        .json(&config_payload(0.0, 0.5, 0.5))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status().as_u16(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "invalid_weight_distribution");
}

#[tokio::test]
async fn reconfigure_bumps_version() {
    // Arrange
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let admin = token(1, "admin");

    for _ in 0..2 {
        let response = client
            .put(format!("{}/api/admin/classes/7/exam-config", address))
            .header("Authorization", format!("Bearer {}", admin))
            .json(&config_payload(0.40, 0.30, 0.30))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    let read: serde_json::Value = client
        .get(format!("{}/api/classes/7/exam-config", address))
        .header("Authorization", format!("Bearer {}", admin))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(read["version"], 2);
}

#[tokio::test]
async fn trainee_cannot_configure_weights() {
    // Arrange
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .put(format!("{}/api/admin/classes/1/exam-config", address))
        .header("Authorization", format!("Bearer {}", token(5, "trainee")))
        .json(&config_payload(0.40, 0.30, 0.30))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn missing_config_returns_404() {
    // Arrange
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .get(format!("{}/api/classes/99/exam-config", address))
        .header("Authorization", format!("Bearer {}", token(1, "admin")))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status().as_u16(), 404);
}
