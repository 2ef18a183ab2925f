//! Export the generated proposal as Markdown.
//!
//! Produces one heading per valid topic (nested by the topic's level) with
//! its committed content underneath, suitable for pasting into a document
//! editor or converting with pandoc.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;

use proposal_flow_core::models::{Topic, TopicKey};

use crate::session::DocumentSession;

pub const MISSING_CONTENT: &str = "*Content not generated for this section.*";

/// Renders `topics` in order. Topics marked for removal are left out.
pub fn to_markdown(title: &str, topics: &[Topic], content: &BTreeMap<TopicKey, String>) -> String {
    let mut out = format!("# {}\n\n", title);
    for topic in topics.iter().filter(|t| !t.is_removed()) {
        let level = topic.level.unwrap_or(1).max(1) as usize;
        out.push_str(&"#".repeat(level + 1));
        out.push(' ');
        out.push_str(&topic.heading());
        out.push_str("\n\n");
        match content.get(&topic.key()) {
            Some(text) => out.push_str(text.trim_end()),
            None => out.push_str(MISSING_CONTENT),
        }
        out.push_str("\n\n");
    }
    out
}

/// Export the session's document as Markdown.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub fn run_export(session: &DocumentSession, output: Option<&Path>) -> Result<()> {
    let title = match session.template() {
        Some(t) => format!("{} ({})", session.document(), t),
        None => session.document().to_string(),
    };
    let markdown = to_markdown(&title, &session.topics(), &session.content_map());

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
            }
            std::fs::write(path, &markdown)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Exported {} bytes to {}", markdown.len(), path.display());
        }
        None => print!("{}", markdown),
    }
    Ok(())
}
