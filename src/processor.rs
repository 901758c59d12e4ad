//! Course document processing.
//!
//! Turns one raw course document into its structural metadata plus an
//! ordered list of retrievable chunks. Documents follow a line-oriented
//! format: a metadata header (title, link, instructor on the first lines),
//! then lesson blocks introduced by `Lesson N:` markers, each optionally
//! followed by a `Lesson Link:` line.

use anyhow::{Context, Result};
use regex::Regex;
use std::path::Path;

use crate::chunk;
use crate::models::{Course, CourseChunk, Lesson};

/// First line index that can hold course content rather than metadata.
const METADATA_START_LINE: usize = 3;
/// Number of leading lines scanned for the link/instructor header.
const METADATA_MAX_LINES: usize = 4;

pub struct DocumentProcessor {
    chunk_size: usize,
    chunk_overlap: usize,
    title_re: Regex,
    course_link_re: Regex,
    instructor_re: Regex,
    lesson_re: Regex,
    lesson_link_re: Regex,
}

impl DocumentProcessor {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        Ok(DocumentProcessor {
            chunk_size,
            chunk_overlap,
            title_re: Regex::new(r"(?i)^Course Title:\s*(.+)$")?,
            course_link_re: Regex::new(r"(?i)^Course Link:\s*(.+)$")?,
            instructor_re: Regex::new(r"(?i)^Course Instructor:\s*(.+)$")?,
            lesson_re: Regex::new(r"(?i)^Lesson\s+(\d+):\s*(.+)$")?,
            lesson_link_re: Regex::new(r"(?i)^Lesson Link:\s*(.+)$")?,
        })
    }

    /// Read a course document as text, replacing invalid UTF-8 sequences.
    pub fn read_file(&self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read document: {}", path.display()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Process one document file into a course and its chunks.
    pub fn process_document(&self, path: &Path) -> Result<(Course, Vec<CourseChunk>)> {
        let content = self.read_file(path)?;
        let fallback_title = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(self.process_text(&content, &fallback_title))
    }

    /// Process already-loaded document text.
    ///
    /// `fallback_title` names the course when the document has no usable
    /// first line.
    pub fn process_text(&self, content: &str, fallback_title: &str) -> (Course, Vec<CourseChunk>) {
        let lines: Vec<&str> = content.trim().split('\n').collect();

        let (title, course_link, instructor_name) =
            self.parse_course_metadata(&lines, fallback_title);

        let mut course = Course {
            title,
            course_link,
            // The parse sentinel means "no instructor line found"
            instructor: (instructor_name != "Unknown").then_some(instructor_name),
            lessons: Vec::new(),
        };

        let start_index = content_start_index(&lines);
        let mut chunks = self.process_lessons(&lines, start_index, &mut course);

        if chunks.is_empty() && lines.len() > 2 {
            chunks = self.handle_no_lessons(&lines, start_index, &course);
        }

        (course, chunks)
    }

    fn parse_course_metadata(
        &self,
        lines: &[&str],
        fallback_title: &str,
    ) -> (String, Option<String>, String) {
        let mut course_title = fallback_title.to_string();
        let mut course_link = None;
        let mut instructor_name = "Unknown".to_string();

        if let Some(first) = lines.first() {
            if !first.trim().is_empty() {
                course_title = self.extract_title(first);
            }
        }

        // Link and instructor may appear in either order within the header
        for line in lines.iter().take(METADATA_MAX_LINES).skip(1) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(caps) = self.course_link_re.captures(line) {
                course_link = Some(caps[1].trim().to_string());
                continue;
            }

            if let Some(caps) = self.instructor_re.captures(line) {
                instructor_name = caps[1].trim().to_string();
            }
        }

        (course_title, course_link, instructor_name)
    }

    fn extract_title(&self, first_line: &str) -> String {
        let trimmed = first_line.trim();
        match self.title_re.captures(trimmed) {
            Some(caps) => caps[1].trim().to_string(),
            None => trimmed.to_string(),
        }
    }

    fn process_lessons(
        &self,
        lines: &[&str],
        start_index: usize,
        course: &mut Course,
    ) -> Vec<CourseChunk> {
        let mut course_chunks = Vec::new();
        let mut chunk_counter = 0;

        let mut current_lesson: Option<(u64, String, Option<String>)> = None;
        let mut lesson_content: Vec<&str> = Vec::new();

        let mut i = start_index;
        while i < lines.len() {
            let line = lines[i];

            let marker = self.lesson_re.captures(line.trim()).and_then(|caps| {
                let number = caps[1].parse::<u64>().ok()?;
                Some((number, caps[2].trim().to_string()))
            });

            if let Some((lesson_number, lesson_title)) = marker {
                // Flush the previous lesson before starting the new one
                if let Some(lesson) = current_lesson.take() {
                    let chunks =
                        self.process_single_lesson(lesson, &lesson_content, course, chunk_counter);
                    chunk_counter += chunks.len();
                    course_chunks.extend(chunks);
                }

                let mut lesson_link = None;
                if i + 1 < lines.len() {
                    if let Some(caps) = self.lesson_link_re.captures(lines[i + 1].trim()) {
                        lesson_link = Some(caps[1].trim().to_string());
                        i += 1; // Skip the link line
                    }
                }

                current_lesson = Some((lesson_number, lesson_title, lesson_link));
                lesson_content.clear();
            } else {
                lesson_content.push(line);
            }

            i += 1;
        }

        if let Some(lesson) = current_lesson {
            let chunks = self.process_single_lesson(lesson, &lesson_content, course, chunk_counter);
            course_chunks.extend(chunks);
        }

        course_chunks
    }

    fn process_single_lesson(
        &self,
        lesson: (u64, String, Option<String>),
        content_lines: &[&str],
        course: &mut Course,
        chunk_start_index: usize,
    ) -> Vec<CourseChunk> {
        let (lesson_number, title, lesson_link) = lesson;

        let lesson_text = content_lines.join("\n").trim().to_string();
        if lesson_text.is_empty() {
            return Vec::new();
        }

        course.lessons.push(Lesson {
            lesson_number,
            title,
            lesson_link,
        });

        self.lesson_chunks(&lesson_text, &course.title, lesson_number, chunk_start_index)
    }

    fn lesson_chunks(
        &self,
        lesson_text: &str,
        course_title: &str,
        lesson_number: u64,
        chunk_start_index: usize,
    ) -> Vec<CourseChunk> {
        chunk::chunk_text(lesson_text, self.chunk_size, self.chunk_overlap)
            .into_iter()
            .enumerate()
            .map(|(idx, text)| CourseChunk {
                content: format!(
                    "Course {} Lesson {} content: {}",
                    course_title, lesson_number, text
                ),
                course_title: course_title.to_string(),
                lesson_number: Some(lesson_number),
                chunk_index: chunk_start_index + idx,
            })
            .collect()
    }

    // Documents without lesson markers are chunked as one lessonless block,
    // without the contextual header prefix.
    fn handle_no_lessons(
        &self,
        lines: &[&str],
        start_index: usize,
        course: &Course,
    ) -> Vec<CourseChunk> {
        let remaining: String = lines.get(start_index..).unwrap_or(&[]).join("\n");
        let remaining = remaining.trim();
        if remaining.is_empty() {
            return Vec::new();
        }

        chunk::chunk_text(remaining, self.chunk_size, self.chunk_overlap)
            .into_iter()
            .enumerate()
            .map(|(idx, content)| CourseChunk {
                content,
                course_title: course.title.clone(),
                lesson_number: None,
                chunk_index: idx,
            })
            .collect()
    }
}

fn content_start_index(lines: &[&str]) -> usize {
    if lines.len() > METADATA_START_LINE && lines[METADATA_START_LINE].trim().is_empty() {
        METADATA_START_LINE + 1
    } else {
        METADATA_START_LINE
    }
}
