// src/routes.rs

use axum::{
    Router,
    http::Method,
    middleware,
    routing::{delete, get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{exam, grading, session, weights},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware, instructor_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (class config, exams, partials, admin).
/// * Every route sits behind JWT auth; instructor/admin sub-routers add a
///   role check on top.
/// * Applies global middleware (Trace, CORS) and injects the app state.
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let class_routes = Router::new()
        .route("/{class_id}/exam-config", get(weights::get_exam_config))
        .layer(middleware::from_fn(instructor_middleware));

    let exam_routes = Router::new()
        .route("/{exam_id}", get(exam::get_final_exam))
        .route(
            "/{exam_id}/partials/{partial_type}/start",
            post(session::start_partial),
        )
        // Instructor-initiated practical scheduling
        .merge(
            Router::new()
                .route("/{exam_id}/practical/open", post(grading::open_practical))
                .layer(middleware::from_fn(instructor_middleware)),
        );

    let partial_routes = Router::new()
        .route("/{partial_id}/submit", post(session::submit_partial))
        .merge(
            Router::new()
                .route("/{partial_id}/grade", post(grading::grade_practical))
                .layer(middleware::from_fn(instructor_middleware)),
        );

    let admin_routes = Router::new()
        .route(
            "/classes/{class_id}/exam-config",
            put(weights::configure_weights),
        )
        .route("/exams", post(exam::create_final_exam))
        .route("/exams/{exam_id}", delete(exam::delete_final_exam))
        .route(
            "/partials/{partial_id}/override",
            put(exam::override_partial),
        )
        .layer(middleware::from_fn(admin_middleware));

    Router::new()
        .nest("/api/classes", class_routes)
        .nest("/api/exams", exam_routes)
        .nest("/api/partials", partial_routes)
        .nest("/api/admin", admin_routes)
        // Auth first, then the per-router role checks above
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
