/// Markdown section splitter.
///
/// Splits a documentation page on level-2 headers (`## `). Each header line stays at the top
/// of its section and its text becomes the section's `Topic`. Lines inside fenced code blocks
/// are never treated as headers.
use regex::Regex;

use crate::model::{DocumentSection, SectionMetadata};

struct Pending {
    topic: Option<String>,
    lines: Vec<String>,
}

impl Pending {
    fn new(topic: Option<String>) -> Self {
        Self {
            topic,
            lines: Vec::new(),
        }
    }

    fn finish(self, out: &mut Vec<DocumentSection>) {
        let content = self.lines.join("\n").trim().to_string();
        if content.is_empty() {
            return;
        }
        out.push(DocumentSection {
            id: None,
            content,
            metadata: SectionMetadata { topic: self.topic },
        });
    }
}

pub fn split_markdown(markdown: &str) -> Vec<DocumentSection> {
    let h2_re = Regex::new(r"^##\s+(.+?)(?:\s+#+)?\s*$").expect("valid regex");
    let fence_re = Regex::new(r"^\s{0,3}(```|~~~)").expect("valid regex");

    let mut sections = Vec::new();
    let mut current = Pending::new(None);
    let mut open_fence: Option<&str> = None;

    for line in markdown.lines() {
        if let Some(caps) = fence_re.captures(line) {
            let marker = caps.get(1).map_or("```", |m| m.as_str());
            open_fence = match open_fence {
                Some(open) if open == marker => None,
                Some(open) => Some(open),
                None => Some(if marker == "~~~" { "~~~" } else { "```" }),
            };
            current.lines.push(line.to_string());
            continue;
        }

        if open_fence.is_none() {
            if let Some(caps) = h2_re.captures(line) {
                let topic = caps.get(1).map(|m| m.as_str().to_string());
                let next = Pending::new(topic);
                std::mem::replace(&mut current, next).finish(&mut sections);
            }
        }
        current.lines.push(line.to_string());
    }
    current.finish(&mut sections);

    sections
}
