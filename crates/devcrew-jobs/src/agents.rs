use std::collections::HashMap;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Parsed `AGENTS.md`: named `# SECTION` blocks plus a digest of the raw
/// file. The digest is stored on the Job at creation time but is not
/// enforced against re-parses — matching the original's behavior, which
/// tracks provenance without invalidating a running job if the file
/// changes mid-flight.
#[derive(Debug, Clone)]
pub struct AgentsSpec {
    pub sections: HashMap<String, String>,
    pub digest: String,
}

impl AgentsSpec {
    pub fn section(&self, name: &str) -> Option<&str> {
        self.sections.get(name).map(|s| s.as_str())
    }
}

/// Parses a markdown file whose top-level `# HEADER` lines introduce
/// sections; everything up to the next `# HEADER` (or EOF) is that
/// section's body.
pub fn parse_agents_file(path: &Path) -> std::io::Result<AgentsSpec> {
    let raw = std::fs::read_to_string(path)?;
    Ok(parse_agents_str(&raw))
}

pub fn parse_agents_str(raw: &str) -> AgentsSpec {
    let digest = format!("{:x}", Sha256::digest(raw.as_bytes()));
    let mut sections = HashMap::new();
    let mut current_name: Option<String> = None;
    let mut current_body = String::new();

    for line in raw.lines() {
        if let Some(header) = line.strip_prefix("# ") {
            if let Some(name) = current_name.take() {
                sections.insert(name, current_body.trim().to_string());
            }
            current_name = Some(header.trim().to_string());
            current_body = String::new();
        } else if current_name.is_some() {
            current_body.push_str(line);
            current_body.push('\n');
        }
    }
    if let Some(name) = current_name {
        sections.insert(name, current_body.trim().to_string());
    }

    AgentsSpec { sections, digest }
}

/// Interpolates a context blob into a prompt section's text. Sections use
/// a literal `{context}` placeholder.
pub fn build_prompt(section_text: &str, context: &str) -> String {
    if section_text.contains("{context}") {
        section_text.replace("{context}", context)
    } else {
        format!("{section_text}\n\n{context}")
    }
}

pub const DEFAULT_AGENTS_MD: &str = "# CTO-AI\n\
You are the planning lead. Decompose the task into an ordered JSON array of \
steps, each an object with `title`, `rationale`, `acceptance`, and optional \
`files`/`commands`. Respond with JSON only.\n\n\
# CODER-AI\n\
You are the implementer. Given a step and its context, respond with a \
unified diff implementing exactly that step.\n";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_sections() {
        let spec = parse_agents_str(DEFAULT_AGENTS_MD);
        assert!(spec.section("CTO-AI").unwrap().contains("planning lead"));
        assert!(spec.section("CODER-AI").unwrap().contains("implementer"));
    }

    #[test]
    fn digest_is_stable_for_identical_content() {
        let a = parse_agents_str(DEFAULT_AGENTS_MD);
        let b = parse_agents_str(DEFAULT_AGENTS_MD);
        assert_eq!(a.digest, b.digest);
    }
}
