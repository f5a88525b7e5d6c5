//! Markdown rendering and import of skill documents
//!
//! The rendered markdown is what the agent reads, and also what
//! [`ContentHash`](crate::ContentHash) is computed over. Import uses
//! pulldown-cmark so authors can write the first draft by hand:
//!
//! ```text
//! ---
//! name: tdd
//! description: Use when implementing any feature or bugfix
//! ---
//!
//! ## Rules
//! 1. Write the failing test first.
//!
//! ## Rationalizations
//! | Excuse | Reality |
//! |---|---|
//! | too simple to test | Simple code breaks. |
//!
//! ## Red Flags
//! - code before test
//!
//! ## Triggers
//! - when a deadline makes skipping the rule tempting
//! ```

use crate::document::{SkillDocument, SkillId};
use crate::error::ModelError;
use indexmap::{IndexMap, IndexSet};
use pulldown_cmark::{Event, Options, Parser as MdParser, Tag, TagEnd};
use serde::Deserialize;
use std::fmt::Write as _;

#[derive(Debug, Deserialize)]
struct Frontmatter {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    version: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionKind {
    Rules,
    Rationalizations,
    RedFlags,
    Triggers,
    Other,
}

impl SectionKind {
    fn from_heading(heading: &str) -> Self {
        match heading.trim().to_ascii_lowercase().as_str() {
            "rules" | "rule" | "the rule" | "the iron law" => Self::Rules,
            "rationalizations" | "rationalization table" | "common rationalizations" => {
                Self::Rationalizations
            }
            "red flags" | "red flags - stop" => Self::RedFlags,
            "triggers" | "when to use" => Self::Triggers,
            _ => Self::Other,
        }
    }
}

impl SkillDocument {
    /// Canonical markdown rendering
    #[must_use]
    pub fn render_markdown(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = writeln!(out, "---");
        let _ = writeln!(out, "name: {}", self.skill());
        let _ = writeln!(out, "description: {}", yaml_scalar(self.description()));
        let _ = writeln!(out, "version: {}", self.version());
        let _ = writeln!(out, "---\n");
        let _ = writeln!(out, "# {}\n", self.skill());

        let _ = writeln!(out, "## Rules\n");
        for (i, rule) in self.rules().iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, one_line(rule));
        }

        if !self.rationalization_table().is_empty() {
            let _ = writeln!(out, "\n## Rationalizations\n");
            let _ = writeln!(out, "| Excuse | Reality |");
            let _ = writeln!(out, "|---|---|");
            for (signature, counter) in self.rationalization_table() {
                let _ = writeln!(out, "| {} | {} |", table_cell(signature), table_cell(counter));
            }
        }

        if !self.red_flags().is_empty() {
            let _ = writeln!(out, "\n## Red Flags\n");
            for flag in self.red_flags() {
                let _ = writeln!(out, "- {}", one_line(flag));
            }
        }

        if !self.description_triggers().is_empty() {
            let _ = writeln!(out, "\n## Triggers\n");
            for trigger in self.description_triggers() {
                let _ = writeln!(out, "- {}", one_line(trigger));
            }
        }
        out
    }

    /// Import a hand-written skill document
    ///
    /// Frontmatter `name` is required; `version` defaults to 0. Unknown
    /// sections are ignored.
    ///
    /// # Errors
    /// `ModelError::Markdown` when frontmatter is missing or the document
    /// has no rule clause, `ModelError::Frontmatter` when it is not YAML.
    pub fn from_markdown(source: &str) -> Result<Self, ModelError> {
        let (frontmatter, body) = split_frontmatter(source)
            .ok_or_else(|| ModelError::Markdown("missing frontmatter".into()))?;
        let meta: Frontmatter = serde_yaml::from_str(frontmatter)?;
        if meta.name.trim().is_empty() {
            return Err(ModelError::Markdown("frontmatter name is blank".into()));
        }

        let mut rules = Vec::new();
        let mut table = IndexMap::new();
        let mut red_flags = IndexSet::new();
        let mut triggers = IndexSet::new();

        let mut section = SectionKind::Other;
        let mut heading: Option<String> = None;
        let mut text = String::new();
        let mut item_depth = 0usize;
        let mut in_table_head = false;
        let mut row: Vec<String> = Vec::new();

        for event in MdParser::new_ext(body, Options::ENABLE_TABLES) {
            match event {
                Event::Start(Tag::Heading { .. }) => heading = Some(String::new()),
                Event::End(TagEnd::Heading(_)) => {
                    if let Some(title) = heading.take() {
                        section = SectionKind::from_heading(&title);
                    }
                }
                Event::Text(t) | Event::Code(t) => match heading.as_mut() {
                    Some(title) => title.push_str(&t),
                    None => text.push_str(&t),
                },
                Event::SoftBreak | Event::HardBreak => text.push(' '),
                Event::Start(Tag::Item) => {
                    item_depth += 1;
                    text.clear();
                }
                Event::End(TagEnd::Item) => {
                    item_depth = item_depth.saturating_sub(1);
                    let clause = take_clause(&mut text);
                    if !clause.is_empty() {
                        match section {
                            SectionKind::Rules => rules.push(clause),
                            SectionKind::RedFlags => {
                                red_flags.insert(clause);
                            }
                            SectionKind::Triggers => {
                                triggers.insert(clause);
                            }
                            SectionKind::Rationalizations | SectionKind::Other => {}
                        }
                    }
                }
                Event::Start(Tag::Paragraph) if item_depth == 0 => text.clear(),
                Event::End(TagEnd::Paragraph) if item_depth == 0 => {
                    let clause = take_clause(&mut text);
                    if section == SectionKind::Rules && !clause.is_empty() {
                        rules.push(clause);
                    }
                }
                Event::Start(Tag::TableHead) => in_table_head = true,
                Event::End(TagEnd::TableHead) => in_table_head = false,
                Event::Start(Tag::TableCell) => text.clear(),
                Event::End(TagEnd::TableCell) => {
                    let cell = take_clause(&mut text);
                    if !in_table_head {
                        row.push(cell);
                    }
                }
                Event::End(TagEnd::TableRow) => {
                    if section == SectionKind::Rationalizations && row.len() >= 2 {
                        let counter = row.pop().unwrap_or_default();
                        let signature = row.swap_remove(0);
                        if !signature.is_empty() {
                            table.insert(signature, counter);
                        }
                    }
                    row.clear();
                }
                _ => {}
            }
        }

        if rules.is_empty() {
            return Err(ModelError::Markdown("document has no rule clause".into()));
        }

        Ok(SkillDocument::from_parts(
            SkillId::new(meta.name.trim()),
            meta.version.unwrap_or(0),
            meta.description.trim().to_string(),
            rules,
            table,
            red_flags,
            triggers,
        ))
    }
}

fn split_frontmatter(source: &str) -> Option<(&str, &str)> {
    let rest = source.trim_start().strip_prefix("---")?;
    let end = rest.find("\n---")?;
    let frontmatter = &rest[..end];
    let body = rest[end + 4..].trim_start_matches(['\r', '\n']);
    Some((frontmatter, body))
}

fn take_clause(text: &mut String) -> String {
    let clause = text.split_whitespace().collect::<Vec<_>>().join(" ");
    text.clear();
    clause
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn table_cell(text: &str) -> String {
    one_line(text).replace('|', "\\|")
}

fn yaml_scalar(text: &str) -> String {
    let line = one_line(text);
    serde_yaml::to_string(&line)
        .map(|s| s.trim_end().to_string())
        .unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const AUTHORED: &str = r"---
name: verification
description: Use when about to claim work is complete
---

# Verification Before Completion

## Rules

1. Run the verification command before claiming success.
2. Evidence before assertions, always.

## Rationalizations

| Excuse | Reality |
|---|---|
| should work now | Run the verification. |
| I'm confident | Confidence is not evidence. |

## Red Flags

- using should or probably
- expressing satisfaction before verification

## Triggers

- when about to commit
";

    #[test]
    fn imports_authored_document() {
        let doc = SkillDocument::from_markdown(AUTHORED).unwrap();
        assert_eq!(doc.skill().as_str(), "verification");
        assert_eq!(doc.version(), 0);
        assert_eq!(doc.rules().len(), 2);
        assert_eq!(doc.rationalization_table().len(), 2);
        assert_eq!(
            doc.rationalization_table().get("I'm confident").map(String::as_str),
            Some("Confidence is not evidence.")
        );
        assert!(doc.red_flags().contains("using should or probably"));
        assert!(doc.description_triggers().contains("when about to commit"));
    }

    #[test]
    fn render_then_import_preserves_content() {
        let doc = SkillDocument::draft(SkillId::new("tdd"), "Use when: writing code")
            .with_rule("Write the test first.")
            .with_counter("a | b", "pipes survive")
            .with_red_flag("tests after")
            .with_trigger("before any production code");
        let imported = SkillDocument::from_markdown(&doc.render_markdown()).unwrap();
        assert_eq!(imported, doc);
        assert_eq!(imported.content_hash(), doc.content_hash());
    }

    #[test]
    fn missing_frontmatter_is_rejected() {
        let err = SkillDocument::from_markdown("## Rules\n\n1. x\n").unwrap_err();
        assert!(matches!(err, ModelError::Markdown(_)));
    }

    #[test]
    fn document_without_rules_is_rejected() {
        let err = SkillDocument::from_markdown("---\nname: x\n---\n\n## Red Flags\n\n- y\n")
            .unwrap_err();
        assert!(err.to_string().contains("no rule clause"));
    }
}
