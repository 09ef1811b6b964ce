//! Markdown scanning
//!
//! Splits requirement text into paragraphs, table packets and format
//! markers with `pulldown-cmark`, then reads reference-column descriptors
//! out of tables whose headers name a column plus at least one column
//! property.

use crate::ir::{FixedSide, FormatMarker, MarkerStyle, ReferenceColumn, TablePacket};
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

const TRUTHY: &[&str] = &["v", "✓", "✔", "☑", "[x]", "x", "y", "yes", "true", "o", "●"];
const FALSY: &[&str] = &["", "-", "✗", "☐", "[ ]", "[]", "n", "no", "false"];

/// Checkbox cell as a boolean; unknown text is false
#[must_use]
pub fn parse_checkbox(cell: &str) -> bool {
    let cell = cell.trim().to_lowercase();
    if TRUTHY.contains(&cell.as_str()) {
        return true;
    }
    if FALSY.contains(&cell.as_str()) {
        return false;
    }
    cell.split(|c: char| !c.is_alphanumeric())
        .next()
        .is_some_and(|first| matches!(first, "yes" | "true" | "y"))
}

/// Fixed-column cell as a side
#[must_use]
pub fn parse_fixed(cell: &str) -> FixedSide {
    let cell = cell.trim().to_lowercase();
    if FALSY.contains(&cell.as_str()) {
        return FixedSide::None;
    }
    let tokens: Vec<&str> = cell.split(|c: char| !c.is_alphanumeric()).collect();
    if cell.contains("left") || cell.contains('左') || tokens.contains(&"l") {
        FixedSide::Left
    } else if cell.contains("right") || cell.contains('右') || tokens.contains(&"r") {
        FixedSide::Right
    } else if parse_checkbox(&cell) {
        FixedSide::Left
    } else {
        FixedSide::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    New,
    Sortable,
    Fixed,
    CrossPage,
    EditNote,
    Format,
    Name,
}

const ROLE_KEYWORDS: &[(Role, &[&str])] = &[
    (Role::New, &["new", "新增"]),
    (Role::Sortable, &["sort", "排序"]),
    (Role::Fixed, &["fixed", "freeze", "pin", "固定", "凍結"]),
    (Role::CrossPage, &["cross", "param", "跨頁", "參數", "参数"]),
    (Role::EditNote, &["note", "edit", "remark", "comment", "備註", "备注"]),
    (Role::Format, &["format", "rule", "格式", "規則", "规则"]),
    (Role::Name, &["column", "field", "name", "title", "欄位", "字段", "名稱", "名称"]),
];

#[derive(Debug, Default)]
struct ColumnRoles {
    assigned: Vec<(Role, usize)>,
}

impl ColumnRoles {
    fn detect(headers: &[String]) -> Self {
        let lowered: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();
        let mut roles = Self::default();
        for (role, keywords) in ROLE_KEYWORDS {
            let hit = lowered.iter().enumerate().find(|(i, h)| {
                !roles.assigned.iter().any(|(_, taken)| taken == i)
                    && keywords.iter().any(|k| h.contains(k))
            });
            if let Some((i, _)) = hit {
                roles.assigned.push((*role, i));
            }
        }
        roles
    }

    fn index(&self, role: Role) -> Option<usize> {
        self.assigned.iter().find(|(r, _)| *r == role).map(|(_, i)| *i)
    }

    fn is_reference_table(&self) -> bool {
        self.index(Role::Name).is_some()
            && [Role::New, Role::Sortable, Role::Fixed, Role::Format]
                .iter()
                .any(|r| self.index(*r).is_some())
    }
}

fn append(s: &str, block: &mut String, cell: &mut Option<String>, emphasis: &mut [(MarkerStyle, String)]) {
    match cell {
        Some(c) => c.push_str(s),
        None => block.push_str(s),
    }
    for (_, text) in emphasis.iter_mut() {
        text.push_str(s);
    }
}

/// Result of scanning requirement markdown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkdownScan {
    /// Non-table text blocks in document order
    pub paragraphs: Vec<String>,
    pub tables: Vec<TablePacket>,
    pub markers: Vec<FormatMarker>,
}

impl MarkdownScan {
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut scan = Self::default();
        let mut block = String::new();
        let mut table: Option<TablePacket> = None;
        let mut row: Vec<String> = Vec::new();
        let mut cell: Option<String> = None;
        let mut emphasis: Vec<(MarkerStyle, String)> = Vec::new();

        let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
        for event in Parser::new_ext(text, options) {
            match event {
                Event::Start(Tag::Table(_)) => {
                    scan.flush(&mut block);
                    table = Some(TablePacket {
                        headers: Vec::new(),
                        rows: Vec::new(),
                    });
                }
                Event::End(TagEnd::Table) => scan.tables.extend(table.take()),
                Event::Start(Tag::TableHead | Tag::TableRow) => row.clear(),
                Event::End(TagEnd::TableHead) => {
                    if let Some(t) = table.as_mut() {
                        t.headers = std::mem::take(&mut row);
                    }
                }
                Event::End(TagEnd::TableRow) => {
                    if let Some(t) = table.as_mut() {
                        t.rows.push(std::mem::take(&mut row));
                    }
                }
                Event::Start(Tag::TableCell) => cell = Some(String::new()),
                Event::End(TagEnd::TableCell) => {
                    row.push(cell.take().unwrap_or_default().trim().to_string());
                }
                Event::Start(Tag::Strong) => emphasis.push((MarkerStyle::Bold, String::new())),
                Event::Start(Tag::Emphasis) => emphasis.push((MarkerStyle::Italic, String::new())),
                Event::End(TagEnd::Strong | TagEnd::Emphasis) => {
                    if let Some((style, text)) = emphasis.pop() {
                        scan.marker(style, &text);
                    }
                }
                Event::Code(code) => {
                    scan.marker(MarkerStyle::Code, &code);
                    append(&code, &mut block, &mut cell, &mut emphasis);
                }
                Event::Text(t) => append(&t, &mut block, &mut cell, &mut emphasis),
                Event::SoftBreak => append(" ", &mut block, &mut cell, &mut emphasis),
                Event::HardBreak => append("\n", &mut block, &mut cell, &mut emphasis),
                Event::Start(Tag::Item | Tag::List(_))
                | Event::End(
                    TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item | TagEnd::CodeBlock,
                ) => scan.flush(&mut block),
                _ => {}
            }
        }
        scan.flush(&mut block);
        scan
    }

    fn flush(&mut self, block: &mut String) {
        let text = block.trim();
        if !text.is_empty() {
            self.paragraphs.push(text.to_string());
        }
        block.clear();
    }

    fn marker(&mut self, style: MarkerStyle, text: &str) {
        let text = text.trim();
        if !text.is_empty() {
            self.markers.push(FormatMarker {
                style,
                text: text.to_string(),
            });
        }
    }

    /// Reference-column descriptors; table `i` is chunk `table-{i+1}`
    #[must_use]
    pub fn reference_columns(&self) -> Vec<ReferenceColumn> {
        let mut columns = Vec::new();
        for (t, table) in self.tables.iter().enumerate() {
            let roles = ColumnRoles::detect(&table.headers);
            if !roles.is_reference_table() {
                continue;
            }
            let cell = |row: &[String], role: Role| -> Option<String> {
                roles
                    .index(role)
                    .and_then(|i| row.get(i))
                    .map(|v| v.trim().to_string())
            };
            let text = |row: &[String], role: Role| cell(row, role).filter(|v| !FALSY.contains(&v.as_str()));

            for (r, row) in table.rows.iter().enumerate() {
                let Some(name) = cell(row, Role::Name).filter(|n| !n.is_empty()) else {
                    continue;
                };
                columns.push(ReferenceColumn {
                    name,
                    is_new: cell(row, Role::New).is_some_and(|v| parse_checkbox(&v)),
                    sortable: cell(row, Role::Sortable).is_some_and(|v| parse_checkbox(&v)),
                    fixed: cell(row, Role::Fixed).map_or(FixedSide::None, |v| parse_fixed(&v)),
                    format_rules: text(row, Role::Format),
                    cross_page_parameter: text(row, Role::CrossPage),
                    edit_note: text(row, Role::EditNote),
                    chunk_id: format!("table-{}", t + 1),
                    row: r,
                });
            }
        }
        columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const REQUIREMENT: &str = "\
Add **order date** and `status` columns to the *order list*.

| Column | New | Sortable | Fixed | Format | Cross-page parameter | Edit note |
|---|---|---|---|---|---|---|
| Order date | ✓ | v | left | YYYY-MM-DD | orderDate | |
| Status | | x | R | | | Read only |
| Amount | no | - | | 2 decimals | | |

Users can sort by any sortable column.
";

    #[test]
    fn checkbox_markers() {
        for t in ["v", "✓", "✔", "☑", "[x]", "X", "yes", "TRUE", "o", "●", "Yes, default"] {
            assert!(parse_checkbox(t), "{t}");
        }
        for f in ["", "-", "✗", "☐", "[ ]", "n", "No", "false", "maybe"] {
            assert!(!parse_checkbox(f), "{f}");
        }
    }

    #[test]
    fn fixed_markers() {
        assert_eq!(parse_fixed("Left"), FixedSide::Left);
        assert_eq!(parse_fixed("l"), FixedSide::Left);
        assert_eq!(parse_fixed("right side"), FixedSide::Right);
        assert_eq!(parse_fixed("R"), FixedSide::Right);
        assert_eq!(parse_fixed("✓"), FixedSide::Left);
        assert_eq!(parse_fixed(""), FixedSide::None);
        assert_eq!(parse_fixed("all"), FixedSide::None);
    }

    #[test]
    fn scan_splits_blocks_tables_and_markers() {
        let scan = MarkdownScan::parse(REQUIREMENT);
        assert_eq!(scan.paragraphs.len(), 2);
        assert_eq!(scan.tables.len(), 1);
        assert_eq!(scan.tables[0].rows.len(), 3);
        let styles: Vec<_> = scan.markers.iter().map(|m| (m.style, m.text.as_str())).collect();
        assert_eq!(
            styles,
            vec![
                (MarkerStyle::Bold, "order date"),
                (MarkerStyle::Code, "status"),
                (MarkerStyle::Italic, "order list"),
            ]
        );
    }

    #[test]
    fn reference_columns_from_table() {
        let columns = MarkdownScan::parse(REQUIREMENT).reference_columns();
        assert_eq!(columns.len(), 3);

        let date = &columns[0];
        assert_eq!(date.name, "Order date");
        assert!(date.is_new && date.sortable);
        assert_eq!(date.fixed, FixedSide::Left);
        assert_eq!(date.format_rules.as_deref(), Some("YYYY-MM-DD"));
        assert_eq!(date.cross_page_parameter.as_deref(), Some("orderDate"));
        assert_eq!(date.chunk_id, "table-1");

        let status = &columns[1];
        assert!(!status.is_new && status.sortable);
        assert_eq!(status.fixed, FixedSide::Right);
        assert_eq!(status.edit_note.as_deref(), Some("Read only"));

        assert!(!columns[2].sortable);
        assert_eq!(columns[2].row, 2);
    }

    #[test]
    fn plain_tables_are_not_reference_tables() {
        let scan = MarkdownScan::parse("| Role | Can edit |\n|---|---|\n| Admin | yes |\n");
        assert_eq!(scan.tables.len(), 1);
        assert!(scan.reference_columns().is_empty());
    }
}
