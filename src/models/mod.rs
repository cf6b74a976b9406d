// src/models/mod.rs
pub mod attendance;
pub mod course;
pub mod enrollment;
pub mod session;
pub mod student;
pub mod teacher;
