//! Vector-store capability and the bundled in-memory implementation.
//!
//! The trait is the seam the search tools and ingestion pipeline talk to;
//! the in-memory store backs it with a term-overlap scorer so the whole
//! system runs without external services. Anything implementing
//! [`VectorStore`] (a real embedding index, a remote service) can be swapped
//! in behind the same seam.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::{ChunkMetadata, Course, CourseChunk, CourseMetadata, Lesson, SearchResults};

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Unified search: resolves an optional partial course name, applies an
    /// optional lesson filter, returns up to the store's result cap.
    /// Failures are reported inside the result set, never as panics.
    async fn search(
        &self,
        query: &str,
        course_name: Option<&str>,
        lesson_number: Option<u64>,
    ) -> SearchResults;

    /// Resolve a partial or differently-cased course name to the stored
    /// title.
    async fn resolve_course_name(&self, course_name: &str) -> Option<String>;

    async fn get_course_link(&self, title: &str) -> Option<String>;

    async fn get_lesson_link(&self, title: &str, lesson_number: u64) -> Option<String>;

    async fn get_course_metadata(&self, title: &str) -> Result<Option<CourseMetadata>>;

    async fn add_course_metadata(&self, course: &Course) -> Result<()>;

    async fn add_course_content(&self, chunks: &[CourseChunk]) -> Result<()>;

    async fn existing_course_titles(&self) -> Vec<String>;

    async fn course_count(&self) -> usize;

    async fn clear(&self) -> Result<()>;
}

/// Process-local store scoring chunks by query-term overlap.
pub struct InMemoryStore {
    courses: RwLock<HashMap<String, CourseMetadata>>,
    chunks: RwLock<Vec<CourseChunk>>,
    max_results: usize,
}

impl InMemoryStore {
    pub fn new(max_results: usize) -> Self {
        InMemoryStore {
            courses: RwLock::new(HashMap::new()),
            chunks: RwLock::new(Vec::new()),
            max_results,
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn search(
        &self,
        query: &str,
        course_name: Option<&str>,
        lesson_number: Option<u64>,
    ) -> SearchResults {
        let resolved_title = match course_name {
            Some(name) => match self.resolve_course_name(name).await {
                Some(title) => Some(title),
                None => {
                    return SearchResults::with_error(format!(
                        "No course found matching '{}'",
                        name
                    ))
                }
            },
            None => None,
        };

        let query_lower = query.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();

        let chunks = self.chunks.read().unwrap();
        let mut scored: Vec<(f64, &CourseChunk)> = chunks
            .iter()
            .filter(|chunk| {
                resolved_title
                    .as_deref()
                    .map_or(true, |title| chunk.course_title == title)
            })
            .filter(|chunk| lesson_number.map_or(true, |n| chunk.lesson_number == Some(n)))
            .filter_map(|chunk| {
                let text_lower = chunk.content.to_lowercase();
                let matches = terms.iter().filter(|t| text_lower.contains(**t)).count();
                (matches > 0).then_some((matches as f64, chunk))
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.max_results);

        SearchResults {
            documents: scored.iter().map(|(_, c)| c.content.clone()).collect(),
            metadata: scored
                .iter()
                .map(|(_, c)| ChunkMetadata {
                    course_title: c.course_title.clone(),
                    lesson_number: c.lesson_number,
                    chunk_index: c.chunk_index,
                })
                .collect(),
            distances: scored.iter().map(|(score, _)| 1.0 / (1.0 + score)).collect(),
            error: None,
        }
    }

    async fn resolve_course_name(&self, course_name: &str) -> Option<String> {
        let needle = course_name.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }

        let courses = self.courses.read().unwrap();

        // Exact title match wins
        for title in courses.keys() {
            if title.to_lowercase() == needle {
                return Some(title.clone());
            }
        }

        // Substring in either direction, alphabetical tie-break
        let mut partial: Vec<&String> = courses
            .keys()
            .filter(|title| {
                let title_lower = title.to_lowercase();
                title_lower.contains(&needle) || needle.contains(&title_lower)
            })
            .collect();
        partial.sort();
        if let Some(title) = partial.first() {
            return Some((*title).clone());
        }

        // Fall back to word overlap between needle and title
        let mut overlaps: Vec<(usize, &String)> = courses
            .keys()
            .filter_map(|title| {
                let title_lower = title.to_lowercase();
                let overlap = needle
                    .split_whitespace()
                    .filter(|word| title_lower.contains(word))
                    .count();
                (overlap > 0).then_some((overlap, title))
            })
            .collect();
        overlaps.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        overlaps.first().map(|(_, title)| (*title).clone())
    }

    async fn get_course_link(&self, title: &str) -> Option<String> {
        let courses = self.courses.read().unwrap();
        courses.get(title).and_then(|m| m.course_link.clone())
    }

    async fn get_lesson_link(&self, title: &str, lesson_number: u64) -> Option<String> {
        let courses = self.courses.read().unwrap();
        let metadata = courses.get(title)?;
        let lessons: Vec<Lesson> = serde_json::from_str(&metadata.lessons_json).ok()?;
        lessons
            .into_iter()
            .find(|lesson| lesson.lesson_number == lesson_number)
            .and_then(|lesson| lesson.lesson_link)
    }

    async fn get_course_metadata(&self, title: &str) -> Result<Option<CourseMetadata>> {
        let courses = self.courses.read().unwrap();
        Ok(courses.get(title).cloned())
    }

    async fn add_course_metadata(&self, course: &Course) -> Result<()> {
        let lessons_json = serde_json::to_string(&course.lessons)?;
        let metadata = CourseMetadata {
            title: course.title.clone(),
            course_link: course.course_link.clone(),
            instructor: course.instructor.clone(),
            lessons_json,
            lesson_count: course.lessons.len(),
        };
        self.courses
            .write()
            .unwrap()
            .insert(course.title.clone(), metadata);
        Ok(())
    }

    async fn add_course_content(&self, chunks: &[CourseChunk]) -> Result<()> {
        self.chunks.write().unwrap().extend(chunks.iter().cloned());
        Ok(())
    }

    async fn existing_course_titles(&self) -> Vec<String> {
        let mut titles: Vec<String> = self.courses.read().unwrap().keys().cloned().collect();
        titles.sort();
        titles
    }

    async fn course_count(&self) -> usize {
        self.courses.read().unwrap().len()
    }

    async fn clear(&self) -> Result<()> {
        self.courses.write().unwrap().clear();
        self.chunks.write().unwrap().clear();
        Ok(())
    }
}
