//! Ingestion command.
//!
//! Scans a course-document folder, indexes the courses that are not already
//! present, and prints the per-run summary.

use anyhow::Result;
use std::path::PathBuf;

use crate::config::Config;
use crate::rag::RagSystem;

pub async fn run_ingest(config: &Config, path: Option<PathBuf>, clear: bool) -> Result<()> {
    let docs_dir = path.unwrap_or_else(|| config.ingest.docs_dir.clone());

    let rag = RagSystem::new(config)?;
    let report = rag.add_course_folder(&docs_dir, clear).await?;

    if clear {
        println!("ingest {} (clear)", docs_dir.display());
    } else {
        println!("ingest {}", docs_dir.display());
    }
    println!("  documents found: {}", report.documents_found);
    println!("  courses added: {}", report.courses_added);
    println!("  chunks indexed: {}", report.chunks_indexed);
    println!("  skipped (already indexed): {}", report.skipped);
    println!("ok");

    Ok(())
}
