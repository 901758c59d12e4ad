//! Core data models used throughout lectern.
//!
//! These types represent the courses, lessons, chunks, and search results
//! that flow through the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};

/// A course document's structural metadata.
#[derive(Debug, Clone)]
pub struct Course {
    pub title: String,
    pub course_link: Option<String>,
    pub instructor: Option<String>,
    pub lessons: Vec<Lesson>,
}

/// One lesson within a course, in document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub lesson_number: u64,
    #[serde(rename = "lesson_title")]
    pub title: String,
    #[serde(default)]
    pub lesson_link: Option<String>,
}

/// A retrievable span of course text.
///
/// `lesson_number` is absent for lessonless trailing content. `chunk_index`
/// is a running counter across the whole source document.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseChunk {
    pub content: String,
    pub course_title: String,
    pub lesson_number: Option<u64>,
    pub chunk_index: usize,
}

/// Per-chunk metadata returned alongside each search match.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkMetadata {
    pub course_title: String,
    pub lesson_number: Option<u64>,
    pub chunk_index: usize,
}

/// Result set from the vector-store capability.
///
/// The three sequences are parallel; `error` short-circuits all of them.
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    pub documents: Vec<String>,
    pub metadata: Vec<ChunkMetadata>,
    pub distances: Vec<f64>,
    pub error: Option<String>,
}

impl SearchResults {
    pub fn with_error(message: impl Into<String>) -> Self {
        SearchResults {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Stored per-course record served to the outline tool.
#[derive(Debug, Clone)]
pub struct CourseMetadata {
    pub title: String,
    pub course_link: Option<String>,
    pub instructor: Option<String>,
    pub lessons_json: String,
    pub lesson_count: usize,
}

/// Attribution entry surfaced with an answer.
///
/// `lesson_link` is omitted from the serialized form when absent; the other
/// optional fields serialize as null.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub text: String,
    pub course_link: Option<String>,
    pub lesson_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lesson_link: Option<String>,
}
