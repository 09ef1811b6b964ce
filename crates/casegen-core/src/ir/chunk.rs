//! Ticket sources and chunking

use crate::external::{plain_text, Issue};
use crate::ir::markdown::MarkdownScan;
use crate::ir::{Chunk, ChunkKind, TicketMeta};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One ticket comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentSource {
    pub author: Option<String>,
    pub body: String,
}

/// Attachment metadata; contents are never read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub filename: String,
    pub mime_type: Option<String>,
    pub size: Option<u64>,
}

/// Linked issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRef {
    pub relation: String,
    pub key: String,
    pub summary: String,
}

/// Everything fetched for a ticket
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketSources {
    pub meta: TicketMeta,
    pub description: String,
    pub acceptance_criteria: String,
    pub comments: Vec<CommentSource>,
    pub attachments: Vec<AttachmentMeta>,
    pub links: Vec<LinkRef>,
}

impl TicketSources {
    /// Tracker fields requested for a ticket
    #[must_use]
    pub fn fields(ac_field: &str) -> Vec<&str> {
        vec![
            "summary",
            "description",
            ac_field,
            "comment",
            "attachment",
            "issuelinks",
            "issuetype",
            "priority",
            "labels",
        ]
    }

    /// Read the tracker's field bag
    #[must_use]
    pub fn from_issue(issue: &Issue, ac_field: &str) -> Self {
        let field = |name: &str| issue.fields.get(name).cloned().unwrap_or(Value::Null);
        let name_of = |v: &Value| -> Option<String> {
            match v {
                Value::String(s) => Some(s.clone()),
                Value::Object(o) => o.get("name").and_then(Value::as_str).map(str::to_string),
                _ => None,
            }
        };

        let comments = match field("comment") {
            Value::Object(o) => o.get("comments").cloned().unwrap_or(Value::Null),
            other => other,
        };
        let comments = comments
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|c| {
                        let body = plain_text(c.get("body").unwrap_or(c));
                        (!body.is_empty()).then(|| CommentSource {
                            author: c
                                .get("author")
                                .and_then(|a| a.get("displayName").or(Some(a)))
                                .and_then(Value::as_str)
                                .map(str::to_string),
                            body,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let attachments = field("attachment")
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|a| {
                        Some(AttachmentMeta {
                            filename: a.get("filename")?.as_str()?.to_string(),
                            mime_type: a.get("mimeType").and_then(Value::as_str).map(str::to_string),
                            size: a.get("size").and_then(Value::as_u64),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let links = field("issuelinks")
            .as_array()
            .map(|items| items.iter().filter_map(link_ref).collect())
            .unwrap_or_default();

        let labels = field("labels")
            .as_array()
            .map(|l| l.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();

        Self {
            meta: TicketMeta {
                key: issue.key.clone(),
                summary: issue.text("summary"),
                issue_type: name_of(&field("issuetype")),
                priority: name_of(&field("priority")),
                labels,
            },
            description: issue.text("description"),
            acceptance_criteria: issue.text(ac_field),
            comments,
            attachments,
            links,
        }
    }

    /// Requirement text composed from description and acceptance criteria
    #[must_use]
    pub fn requirement_text(&self) -> String {
        match (self.description.trim(), self.acceptance_criteria.trim()) {
            ("", ac) => ac.to_string(),
            (desc, "") => desc.to_string(),
            (desc, ac) => format!("{desc}\n\nAcceptance criteria:\n{ac}"),
        }
    }

    /// Add a linked issue unless already present
    pub fn push_link(&mut self, link: LinkRef) {
        if !self.links.iter().any(|l| l.key == link.key) {
            self.links.push(link);
        }
    }

    /// Chunk index over the sources plus the scanned requirement text
    #[must_use]
    pub fn chunks(&self, scan: &MarkdownScan) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let description = if self.description.trim().is_empty() {
            scan.paragraphs.first().cloned().unwrap_or_default()
        } else {
            self.description.clone()
        };
        chunks.push(Chunk::new("desc", ChunkKind::Description, split_sentences(&description)));
        if !self.acceptance_criteria.trim().is_empty() {
            chunks.push(Chunk::new(
                "ac",
                ChunkKind::AcceptanceCriteria,
                split_sentences(&self.acceptance_criteria),
            ));
        }
        for (i, comment) in self.comments.iter().enumerate() {
            chunks.push(Chunk::new(
                format!("comment-{}", i + 1),
                ChunkKind::Comment,
                split_sentences(&comment.body),
            ));
        }
        for (i, a) in self.attachments.iter().enumerate() {
            let mut text = format!("Attachment {}", a.filename);
            if let Some(mime) = &a.mime_type {
                text.push_str(&format!(" ({mime})"));
            }
            chunks.push(Chunk::new(format!("attachment-{}", i + 1), ChunkKind::Attachment, vec![text]));
        }
        for (i, link) in self.links.iter().enumerate() {
            chunks.push(Chunk::new(
                format!("link-{}", i + 1),
                ChunkKind::Link,
                vec![format!("{} {}: {}", link.relation, link.key, link.summary)],
            ));
        }
        for (i, table) in scan.tables.iter().enumerate() {
            let rows = table.rows.iter().map(|r| table.row_sentence(r)).collect();
            chunks.push(Chunk::new(format!("table-{}", i + 1), ChunkKind::Table, rows));
        }
        for (i, para) in scan.paragraphs.iter().enumerate() {
            chunks.push(Chunk::new(format!("para-{}", i + 1), ChunkKind::Paragraph, split_sentences(para)));
        }
        chunks
    }
}

fn link_ref(link: &Value) -> Option<LinkRef> {
    let kind = link.get("type");
    let (relation, issue) = if let Some(issue) = link.get("outwardIssue") {
        (kind.and_then(|t| t.get("outward")), issue)
    } else {
        (kind.and_then(|t| t.get("inward")), link.get("inwardIssue")?)
    };
    Some(LinkRef {
        relation: relation.and_then(Value::as_str).unwrap_or("relates to").to_string(),
        key: issue.get("key")?.as_str()?.to_string(),
        summary: issue
            .get("fields")
            .and_then(|f| f.get("summary"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn is_wide_terminator(c: char) -> bool {
    matches!(c, '。' | '！' | '？' | '；')
}

/// Split text into trimmed, non-empty sentences.
///
/// Breaks after `.`, `!` or `?` followed by whitespace or end of text,
/// immediately after full-width terminators, and at line breaks. Leading
/// list markers are dropped.
#[must_use]
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' || c == '\r' {
            flush(&mut out, &mut current);
            continue;
        }
        current.push(c);
        let boundary = is_wide_terminator(c)
            || (is_terminator(c)
                && chars.peek().map_or(true, |n| n.is_whitespace())
                && !is_list_number(&current));
        if boundary {
            flush(&mut out, &mut current);
        }
    }
    flush(&mut out, &mut current);
    out
}

fn is_list_number(current: &str) -> bool {
    let body = current.trim().trim_end_matches('.');
    !body.is_empty() && body.chars().all(|c| c.is_ascii_digit())
}

fn flush(out: &mut Vec<String>, current: &mut String) {
    let trimmed = strip_list_marker(current.trim());
    if trimmed.chars().any(char::is_alphanumeric) {
        out.push(trimmed.to_string());
    }
    current.clear();
}

fn strip_list_marker(s: &str) -> &str {
    let s = s.trim_start_matches(['-', '*', '+', '•']).trim_start();
    let digits = s.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &s[digits..];
        if let Some(rest) = rest.strip_prefix(['.', ')']) {
            if rest.starts_with(char::is_whitespace) {
                return rest.trim_start();
            }
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn sentences_split_on_terminators_and_lines() {
        assert_eq!(
            split_sentences("User logs in with email and OTP. OTP expires after 5 minutes."),
            vec!["User logs in with email and OTP.", "OTP expires after 5 minutes."]
        );
        assert_eq!(split_sentences("Version 1.5 ships"), vec!["Version 1.5 ships"]);
        assert_eq!(
            split_sentences("- first item\n2. second item\n\n"),
            vec!["first item", "second item"]
        );
        assert_eq!(split_sentences("登录成功。显示首页！"), vec!["登录成功。", "显示首页！"]);
        assert!(split_sentences("  \n ... \n").is_empty());
    }

    #[test]
    fn sources_from_issue_fields() {
        let issue = Issue::new("TCG-1")
            .with_field("summary", json!("Login with OTP"))
            .with_field("description", json!("User logs in."))
            .with_field("issuetype", json!({"name": "Story"}))
            .with_field("comment", json!({"comments": [{"author": {"displayName": "Ana"}, "body": "Looks good."}]}))
            .with_field("attachment", json!([{"filename": "flow.png", "mimeType": "image/png", "size": 10}]))
            .with_field(
                "issuelinks",
                json!([{"type": {"outward": "blocks"}, "outwardIssue": {"key": "TCG-2", "fields": {"summary": "SMS"}}}]),
            );
        let sources = TicketSources::from_issue(&issue, "acceptance_criteria");
        assert_eq!(sources.meta.summary, "Login with OTP");
        assert_eq!(sources.meta.issue_type.as_deref(), Some("Story"));
        assert_eq!(sources.comments[0].author.as_deref(), Some("Ana"));
        assert_eq!(sources.attachments[0].filename, "flow.png");
        assert_eq!(sources.links[0].relation, "blocks");
        assert_eq!(sources.requirement_text(), "User logs in.");
    }

    #[test]
    fn chunk_ids_follow_source_order() {
        let sources = TicketSources {
            description: "Desc one. Desc two.".into(),
            acceptance_criteria: "AC one.".into(),
            comments: vec![CommentSource {
                author: None,
                body: "Comment.".into(),
            }],
            ..TicketSources::default()
        };
        let text = sources.requirement_text();
        let scan = MarkdownScan::parse(&text);
        let ids: Vec<_> = sources
            .chunks(&scan)
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids[..3], ["desc", "ac", "comment-1"]);
        assert!(ids.iter().any(|id| id == "para-1"));
    }
}
