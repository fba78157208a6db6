// src/config.rs

use dotenvy::dotenv;
use std::env;

/// Tolerance when checking that the three partial weights sum to 1.00.
pub const WEIGHT_SUM_EPSILON: f64 = 0.001;

/// Normalized scores and the aggregated total live on a 0-10 scale.
pub const FULL_MARKS: f64 = 10.0;

/// Pass threshold applied when a class config does not supply its own.
pub const DEFAULT_PASSING_MARKS: f64 = 6.0;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3600);

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
        }
    }
}
