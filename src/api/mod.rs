mod availability;
pub mod auth;
mod bookings;
mod courses;
pub mod error;
pub mod metrics;
mod payments;
mod requests;
pub mod validation;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes (public)
    let auth_routes = Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me));

    // Protected API routes
    let api_routes = Router::new()
        // Teachers and their offers
        .route("/teachers", get(availability::list_teachers))
        .route("/teachers/:id/offers", get(availability::teacher_offers))
        // Availability slots
        .route("/availability", post(availability::create_slot))
        .route("/availability/mine", get(availability::my_slots))
        .route("/availability/:id", delete(availability::cancel_slot))
        // Courses
        .route("/courses", get(courses::list_published))
        .route("/courses", post(courses::create_course))
        .route("/courses/mine", get(courses::my_courses))
        .route("/courses/:id", put(courses::update_course))
        .route("/courses/:id/enrollments", get(courses::course_enrollments))
        // Booking drafts
        .route("/bookings", post(bookings::create_draft))
        .route("/bookings/:id", get(bookings::get_draft))
        .route("/bookings/:id/teacher", post(bookings::select_teacher))
        .route("/bookings/:id/offer", post(bookings::select_offer))
        .route("/bookings/:id/quote", get(bookings::quote))
        .route("/bookings/:id/payment", post(bookings::confirm_payment))
        .route("/bookings/:id/back", post(bookings::back))
        .route("/bookings/:id/submit", post(bookings::submit))
        // Payment confirmation
        .route("/payments/history", get(payments::payment_history))
        .route("/payments/:order_id/confirm", post(payments::start_confirmation))
        .route(
            "/payments/:order_id/confirmation",
            get(payments::confirmation_status),
        )
        .route("/payments/:order_id/retry", post(payments::manual_retry))
        // Session requests
        .route("/requests/mine", get(requests::my_requests))
        .route("/requests/incoming", get(requests::incoming_requests))
        .route("/requests/:id/accept", post(requests::accept_request))
        .route("/requests/:id/decline", post(requests::decline_request))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest("/api/auth", auth_routes)
        .nest("/api", api_routes)
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
