// src/web/mod.rs
pub mod attendance_handlers;
pub mod course_handlers;
pub mod enrollment_handlers;
pub mod event_handlers;
pub mod mw_auth;
pub mod mw_teacher;
pub mod routes;
pub mod session_handlers;
pub mod student_handlers;
pub mod system_handlers;
pub mod teacher_handlers;
