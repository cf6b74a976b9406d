// src/models/course.rs
use serde::{Deserialize, Serialize};

/// Unidade curricular guardada em `courses/<id>` (ou `teachers/<uid>/courses/<key>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub instructor: Option<String>,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCourse {
    pub name: Option<String>,
    pub code: Option<String>,
    pub description: Option<String>,
    pub schedule: Option<String>,
    pub instructor: Option<String>,
    pub room: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoursePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
}

/// Unidades criadas automaticamente para cada docente novo.
pub struct DefaultCourse {
    pub name: &'static str,
    pub description: &'static str,
    pub schedule: &'static str,
    pub instructor: &'static str,
    pub room: &'static str,
}

pub const DEFAULT_COURSES: &[DefaultCourse] = &[
    DefaultCourse {
        name: "Algoritmos y Estructuras de Datos",
        description: "Fundamentos de algoritmos, complejidad computacional y estructuras de datos avanzadas",
        schedule: "Lunes y Miércoles 8:00-10:00",
        instructor: "Dr. García",
        room: "Aula 201",
    },
    DefaultCourse {
        name: "Bases de Datos",
        description: "Diseño, implementación y administración de sistemas de gestión de bases de datos",
        schedule: "Martes y Jueves 10:00-12:00",
        instructor: "Dra. Martínez",
        room: "Laboratorio 3",
    },
    DefaultCourse {
        name: "Desarrollo de Software",
        description: "Metodologías de desarrollo, patrones de diseño y arquitectura de software",
        schedule: "Viernes 14:00-17:00",
        instructor: "Ing. López",
        room: "Sala de Computación",
    },
];
