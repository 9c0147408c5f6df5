// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{delete, get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, exam, profile},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, exam, profile, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (Database Pool, Cache, Config).
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

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    // Onboarding reference data is public; profile routes need a token.
    let profile_routes = Router::new()
        .route("/me", get(profile::get_me).put(profile::update_me))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .route("/colleges", get(profile::list_colleges))
        .route("/departments", get(profile::list_departments));

    let exam_routes = Router::new()
        .route("/session", post(exam::start_session))
        .route("/questions/{attempt_id}", get(exam::get_questions))
        .route("/submit", post(exam::submit))
        .route("/config", get(exam::get_config))
        .route("/result", get(exam::get_result))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/sets", get(admin::list_sets).post(admin::create_set))
        .route("/sets/{id}", delete(admin::delete_set))
        .route(
            "/questions",
            get(admin::list_questions).post(admin::create_question),
        )
        .route(
            "/questions/{id}",
            put(admin::update_question).delete(admin::delete_question),
        )
        .route("/config", put(admin::update_config))
        .route("/users", get(admin::list_users))
        .route("/users/{id}", delete(admin::delete_user))
        .route("/users/{id}/reset", post(admin::reset_exam))
        .route("/colleges", post(admin::create_college))
        .route("/colleges/{id}", delete(admin::delete_college))
        .route("/departments", post(admin::create_department))
        .route("/departments/{id}", delete(admin::delete_department))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/exam", exam_routes)
        .nest("/api/admin", admin_routes)
        .nest("/api", profile_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
