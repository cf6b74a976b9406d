// src/services/mod.rs
pub mod attendance_service;
pub mod broadcaster;
pub mod captcha_service;
pub mod course_service;
pub mod enrollment_service;
pub mod records;
pub mod session_service;
pub mod student_service;
pub mod teacher_service;
pub mod token_service;
