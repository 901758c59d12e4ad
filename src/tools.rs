//! Search tools and the registry that dispatches them.
//!
//! Tools are capability objects the model can invoke mid-answer. Each one
//! exposes an Anthropic-style definition (name, description, JSON schema)
//! and an execute operation that always resolves to text: store errors,
//! not-found conditions, and malformed stored data all come back as tool
//! output for the model to relay, never as errors. Execution also returns
//! the source attributions for the response layer.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::models::{Lesson, SearchResults, Source};
use crate::store::VectorStore;

// ═══════════════════════════════════════════════════════════════════════════
// Tool capability
// ═══════════════════════════════════════════════════════════════════════════

/// Tool definition submitted to the model alongside a request.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// What a tool execution hands back: text for the model, sources for the
/// response layer.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub text: String,
    pub sources: Vec<Source>,
}

impl ToolOutput {
    pub fn text_only(text: impl Into<String>) -> Self {
        ToolOutput {
            text: text.into(),
            sources: Vec::new(),
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Run the tool against model-provided input.
    async fn execute(&self, input: &Value) -> ToolOutput;
}

// ═══════════════════════════════════════════════════════════════════════════
// Course content search
// ═══════════════════════════════════════════════════════════════════════════

/// Searches indexed course content, with fuzzy course-name matching and an
/// optional lesson filter.
pub struct CourseSearchTool {
    store: Arc<dyn VectorStore>,
}

impl CourseSearchTool {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        CourseSearchTool { store }
    }

    async fn format_results(&self, results: &SearchResults) -> ToolOutput {
        // Sort by lesson number, lessonless entries first
        let mut entries: Vec<_> = results
            .documents
            .iter()
            .zip(results.metadata.iter())
            .collect();
        entries.sort_by_key(|(_, meta)| meta.lesson_number);

        let mut formatted = Vec::new();
        let mut sources = Vec::new();

        for (doc, meta) in entries {
            let mut header = format!("[{}", meta.course_title);
            if let Some(n) = meta.lesson_number {
                header.push_str(&format!(" - Lesson {}", n));
            }
            header.push(']');

            let mut text = meta.course_title.clone();
            let course_link = self.store.get_course_link(&meta.course_title).await;
            let mut lesson_link = None;
            if let Some(n) = meta.lesson_number {
                text.push_str(&format!(" - Lesson {}", n));
                lesson_link = self.store.get_lesson_link(&meta.course_title, n).await;
            }

            sources.push(Source {
                text,
                course_link,
                lesson_number: meta.lesson_number,
                lesson_link,
            });

            formatted.push(format!("{}\n{}", header, doc));
        }

        ToolOutput {
            text: formatted.join("\n\n"),
            sources,
        }
    }
}

#[async_trait]
impl Tool for CourseSearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "search_course_content".to_string(),
            description:
                "Search course materials with smart course name matching and lesson filtering"
                    .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What to search for in the course content"
                    },
                    "course_name": {
                        "type": "string",
                        "description": "Course title (partial matches work, e.g. 'MCP', 'Introduction')"
                    },
                    "lesson_number": {
                        "type": "integer",
                        "description": "Specific lesson number to search within (e.g. 1, 2, 3)"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, input: &Value) -> ToolOutput {
        let query = input.get("query").and_then(Value::as_str).unwrap_or_default();
        let course_name = input.get("course_name").and_then(Value::as_str);
        let lesson_number = input.get("lesson_number").and_then(Value::as_u64);

        let mut results = self.store.search(query, course_name, lesson_number).await;

        // Store-reported errors go back to the model verbatim
        if let Some(error) = results.error.take() {
            return ToolOutput::text_only(error);
        }

        if results.is_empty() {
            let mut filter_info = String::new();
            if let Some(name) = course_name {
                filter_info.push_str(&format!(" in course '{}'", name));
            }
            if let Some(n) = lesson_number {
                filter_info.push_str(&format!(" in lesson {}", n));
            }
            return ToolOutput::text_only(format!("No relevant content found{}.", filter_info));
        }

        self.format_results(&results).await
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Course outline lookup
// ═══════════════════════════════════════════════════════════════════════════

/// Renders a course's stored structure: title, link, and the full lesson
/// list.
pub struct CourseOutlineTool {
    store: Arc<dyn VectorStore>,
}

impl CourseOutlineTool {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        CourseOutlineTool { store }
    }
}

#[async_trait]
impl Tool for CourseOutlineTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_course_outline".to_string(),
            description: "Get the complete structure and lesson list for a specific course, \
                          including course title, course link, and all lessons with their \
                          numbers and titles"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "course_name": {
                        "type": "string",
                        "description": "Course title (partial matches work, e.g. 'MCP', 'Introduction', 'Advanced Retrieval')"
                    }
                },
                "required": ["course_name"]
            }),
        }
    }

    async fn execute(&self, input: &Value) -> ToolOutput {
        let course_name = input
            .get("course_name")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let course_title = match self.store.resolve_course_name(course_name).await {
            Some(title) => title,
            None => {
                return ToolOutput::text_only(format!(
                    "No course found matching '{}'.",
                    course_name
                ))
            }
        };

        let metadata = match self.store.get_course_metadata(&course_title).await {
            Ok(Some(metadata)) => metadata,
            Ok(None) => {
                return ToolOutput::text_only(format!(
                    "Course '{}' found but no metadata available.",
                    course_title
                ))
            }
            Err(e) => {
                return ToolOutput::text_only(format!("Error retrieving course outline: {}", e))
            }
        };

        let lessons: Vec<Lesson> = match serde_json::from_str(&metadata.lessons_json) {
            Ok(lessons) => lessons,
            Err(e) => {
                return ToolOutput::text_only(format!("Error retrieving course outline: {}", e))
            }
        };

        let course_link = metadata.course_link.as_deref();
        ToolOutput {
            text: format_outline(&course_title, course_link, &lessons),
            sources: outline_sources(&course_title, course_link, &lessons),
        }
    }
}

fn format_outline(course_title: &str, course_link: Option<&str>, lessons: &[Lesson]) -> String {
    let mut output = format!("Course: {}\n", course_title);
    if let Some(link) = course_link {
        if !link.is_empty() {
            output.push_str(&format!("Course Link: {}\n", link));
        }
    }
    output.push_str(&format!("\nLessons ({} total):\n", lessons.len()));

    for lesson in lessons {
        output.push_str(&format!("\nLesson {}: {}", lesson.lesson_number, lesson.title));
        if let Some(link) = &lesson.lesson_link {
            if !link.is_empty() {
                output.push_str(&format!("\nLink: {}", link));
            }
        }
        output.push('\n');
    }

    output
}

fn outline_sources(
    course_title: &str,
    course_link: Option<&str>,
    lessons: &[Lesson],
) -> Vec<Source> {
    lessons
        .iter()
        .map(|lesson| Source {
            text: format!("{} - Lesson {}", course_title, lesson.lesson_number),
            course_link: course_link.map(str::to_string),
            lesson_number: Some(lesson.lesson_number),
            lesson_link: lesson.lesson_link.clone().filter(|link| !link.is_empty()),
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════════

/// Ordered name→tool registry. Registration happens once at startup;
/// dispatch never panics on unknown names.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<(String, Box<dyn Tool>)>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        ToolRegistry { tools: Vec::new() }
    }

    /// Registry preloaded with the two course tools.
    pub fn with_builtins(store: Arc<dyn VectorStore>) -> Result<Self> {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(CourseSearchTool::new(store.clone())))?;
        registry.register(Box::new(CourseOutlineTool::new(store)))?;
        Ok(registry)
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<()> {
        let name = tool.definition().name;
        if name.trim().is_empty() {
            bail!("Tool must have a 'name' in its definition");
        }
        if self.tools.iter().any(|(existing, _)| *existing == name) {
            bail!("Tool '{}' is already registered", name);
        }
        self.tools.push((name, tool));
        Ok(())
    }

    /// All definitions, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|(_, tool)| tool.definition()).collect()
    }

    /// Dispatch by name. Unknown names resolve to a not-found text result.
    pub async fn execute(&self, name: &str, input: &Value) -> ToolOutput {
        match self.tools.iter().find(|(tool_name, _)| tool_name == name) {
            Some((_, tool)) => tool.execute(input).await,
            None => ToolOutput::text_only(format!("Tool '{}' not found", name)),
        }
    }
}
