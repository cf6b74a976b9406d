// src/web/routes.rs
use crate::{
    state::AppState,
    web::{
        attendance_handlers, course_handlers, enrollment_handlers, event_handlers, mw_auth, mw_teacher,
        session_handlers, student_handlers, system_handlers, teacher_handlers,
    },
};
use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::CorsLayer;

pub fn create_router(app_state: AppState) -> Router {
    // --- Rotas públicas (alunos a ler o QR, painel, browsers) ---
    let public_routes = Router::new()
        .route("/sessions", get(session_handlers::list_sessions))
        .route("/sessions/{id}", get(session_handlers::get_session))
        .route(
            "/sessions/{id}/attendance",
            get(session_handlers::session_attendance).post(session_handlers::mark_attendance),
        )
        .route(
            "/students",
            get(student_handlers::list_students).post(student_handlers::create_student),
        )
        .route(
            "/students/{id}",
            get(student_handlers::get_student)
                .put(student_handlers::update_student)
                .delete(student_handlers::delete_student),
        )
        .route("/students/{id}/enrollments", get(student_handlers::student_enrollments))
        .route("/students/{id}/attendance", get(student_handlers::student_attendance))
        .route(
            "/courses",
            get(course_handlers::list_courses).post(course_handlers::create_course),
        )
        .route(
            "/courses/{id}",
            get(course_handlers::get_course)
                .put(course_handlers::update_course)
                .delete(course_handlers::delete_course),
        )
        .route("/courses/{id}/enrollments", get(course_handlers::course_enrollments))
        .route("/courses/{id}/attendance", get(course_handlers::course_attendance))
        .route(
            "/attendance",
            get(attendance_handlers::list_attendance).post(attendance_handlers::create_attendance),
        )
        .route(
            "/attendance/{id}",
            get(attendance_handlers::get_attendance).delete(attendance_handlers::delete_attendance),
        )
        .route(
            "/enrollments",
            get(enrollment_handlers::list_enrollments).post(enrollment_handlers::enroll),
        )
        .route("/enrollments/unenroll", post(enrollment_handlers::unenroll))
        .route(
            "/enrollments/{id}",
            get(enrollment_handlers::get_enrollment)
                .put(enrollment_handlers::update_enrollment)
                .delete(enrollment_handlers::delete_enrollment),
        )
        .route("/config/firebase", get(system_handlers::firebase_config))
        .route("/events", get(event_handlers::events_stream))
        .route("/health", get(system_handlers::health));

    // --- Sessões: criar e fechar exigem docente autenticado ---
    let session_routes = Router::new()
        .route("/sessions", post(session_handlers::create_session))
        .route("/sessions/{id}/close", patch(session_handlers::close_session))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            mw_auth::require_auth,
        ));

    // --- Dados de cada docente: autenticado E dono do uid (ou admin) ---
    let teacher_routes = Router::new()
        .route(
            "/teachers/{uid}/courses",
            get(teacher_handlers::list_courses).post(teacher_handlers::add_course),
        )
        .route(
            "/teachers/{uid}/students",
            get(teacher_handlers::list_students).post(teacher_handlers::add_student),
        )
        .route("/teachers/{uid}/attendance", get(teacher_handlers::list_attendance))
        .route("/teachers/{uid}/init", post(teacher_handlers::init_teacher))
        // Ordem: route_layer aplicado por último corre primeiro (require_auth antes do dono)
        .route_layer(middleware::from_fn(mw_teacher::require_teacher_owner))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            mw_auth::require_auth,
        ));

    let api = Router::new()
        .merge(public_routes)
        .merge(session_routes)
        .merge(teacher_routes);

    // --- Router final ---
    Router::new()
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}
