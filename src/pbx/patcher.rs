//! Setting patcher: rewrites one key inside one settings table.
//!
//! Each call re-parses the block from the current text, plans at most one [`Edit`], and
//! applies it with the block span as the write boundary. Nothing outside
//! `[block.start, block.end)` is ever touched.

use crate::edit::{Edit, EditResult};
use crate::pbx::errors::PatchError;
use crate::pbx::locator::ConfigBlock;
use crate::pbx::settings::{parse_entries, quote, ListLayout, SettingEntry, SettingValue};
use crate::report::PatchStatus;
use serde::{Deserialize, Serialize};

/// What to do with a setting's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingChange {
    /// Overwrite the whole value.
    Replace(SettingValue),
    /// Add elements missing from a list-valued setting, keeping existing order.
    Append(Vec<String>),
    /// Delete the statement, every occurrence of it.
    Remove,
    /// Drop these elements from a list-valued setting, keeping the rest in place.
    RemoveElements(Vec<String>),
}

/// Behaviour when the key does not exist in a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AbsentPolicy {
    #[default]
    Insert,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOperation {
    pub id: String,
    pub key: String,
    pub change: SettingChange,
    pub absent: AbsentPolicy,
}

impl PatchOperation {
    pub fn replace(id: impl Into<String>, key: impl Into<String>, value: SettingValue) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            change: SettingChange::Replace(value),
            absent: AbsentPolicy::Insert,
        }
    }

    pub fn append<I, S>(id: impl Into<String>, key: impl Into<String>, elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            key: key.into(),
            change: SettingChange::Append(elements.into_iter().map(Into::into).collect()),
            absent: AbsentPolicy::Insert,
        }
    }

    pub fn remove(id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            change: SettingChange::Remove,
            absent: AbsentPolicy::Insert,
        }
    }

    pub fn remove_elements<I, S>(id: impl Into<String>, key: impl Into<String>, elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            key: key.into(),
            change: SettingChange::RemoveElements(elements.into_iter().map(Into::into).collect()),
            absent: AbsentPolicy::Insert,
        }
    }

    pub fn skip_if_absent(mut self) -> Self {
        self.absent = AbsentPolicy::Skip;
        self
    }
}

/// Result of patching one key in one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingPatch {
    pub status: PatchStatus,
    /// How many statements in the block carried the key before patching.
    pub occurrences: usize,
}

/// Apply `operation` to `block` inside `source`.
///
/// When the key appears more than once, the first statement is patched (a removal drops
/// all of them) and the count is returned in [`SettingPatch::occurrences`] so the caller
/// can flag it.
pub fn apply(
    source: &mut String,
    block: &ConfigBlock,
    operation: &PatchOperation,
) -> Result<SettingPatch, PatchError> {
    let entries = parse_entries(source, block)?;
    let matching: Vec<&SettingEntry> = entries
        .iter()
        .filter(|entry| entry.key == operation.key)
        .collect();
    let occurrences = matching.len();

    if matching.iter().any(|entry| entry.dictionary) {
        return Err(PatchError::DictionaryValue {
            key: operation.key.clone(),
        });
    }

    let (status, edit) = match matching.first() {
        Some(entry) => plan_present(source, block, entry, &matching, operation),
        None => plan_absent(source, block, &entries, operation),
    };

    let status = match edit {
        Some(edit) => {
            tracing::trace!(
                key = %operation.key,
                at = edit.byte_start,
                delta = edit.delta(),
                "applying setting edit"
            );
            settled(status, edit.apply_to(source, block.span())?)
        }
        None => status,
    };

    Ok(SettingPatch {
        status,
        occurrences,
    })
}

/// An edit that found its text already in place changed nothing.
fn settled(planned: PatchStatus, result: EditResult) -> PatchStatus {
    match result {
        EditResult::Applied { .. } => planned,
        EditResult::AlreadyApplied => PatchStatus::Unchanged,
    }
}

fn plan_absent(
    source: &str,
    block: &ConfigBlock,
    entries: &[SettingEntry],
    operation: &PatchOperation,
) -> (PatchStatus, Option<Edit>) {
    let value = match &operation.change {
        SettingChange::Remove | SettingChange::RemoveElements(_) => {
            return (PatchStatus::Unchanged, None)
        }
        _ if operation.absent == AbsentPolicy::Skip => return (PatchStatus::SkippedAbsent, None),
        SettingChange::Replace(value) => value.clone(),
        SettingChange::Append(elements) => SettingValue::List(dedup(elements)),
    };

    let newline = line_ending(source);
    let indent = settings_indent(source, block, entries);
    let text = format!(
        "{newline}{indent}{} = {};",
        quote(&operation.key),
        render_value(&value, true, &indent, newline)
    );
    (PatchStatus::Inserted, Some(Edit::insert(block.start, text)))
}

fn plan_present(
    source: &str,
    block: &ConfigBlock,
    entry: &SettingEntry,
    matching: &[&SettingEntry],
    operation: &PatchOperation,
) -> (PatchStatus, Option<Edit>) {
    let newline = line_ending(source);
    let indent = entry_indent(source, entry).unwrap_or_default();
    let current = &source[entry.value_start..entry.value_end];

    match &operation.change {
        SettingChange::Replace(desired) => {
            if entry.value == *desired {
                return (PatchStatus::Unchanged, None);
            }
            let multiline = entry.list.is_none() || current.contains('\n');
            let text = render_value(desired, multiline, indent, newline);
            let edit = Edit::new(entry.value_start, entry.value_end, text, current);
            (PatchStatus::Updated, Some(edit))
        }
        SettingChange::Append(elements) => {
            let existing = entry.value.elements();
            let missing: Vec<String> = dedup(elements)
                .into_iter()
                .filter(|element| !existing.contains(&element.as_str()))
                .collect();
            if missing.is_empty() {
                return (PatchStatus::Unchanged, None);
            }

            let edit = match &entry.list {
                Some(layout) => append_to_list(source, layout, &missing, indent, newline),
                None => {
                    let mut values: Vec<String> = existing.iter().map(|v| v.to_string()).collect();
                    values.extend(missing);
                    let text = render_value(&SettingValue::List(values), true, indent, newline);
                    Edit::new(entry.value_start, entry.value_end, text, current)
                }
            };
            (PatchStatus::Updated, Some(edit))
        }
        SettingChange::RemoveElements(elements) => {
            let existing = entry.value.elements();
            if !existing.iter().any(|value| listed(elements, value)) {
                return (PatchStatus::Unchanged, None);
            }

            let text = match &entry.list {
                Some(layout) if current.contains('\n') => {
                    without_elements(source, entry, layout, elements)
                }
                _ => {
                    let kept: Vec<String> = existing
                        .into_iter()
                        .filter(|value| !listed(elements, value))
                        .map(str::to_string)
                        .collect();
                    let multiline = entry.list.is_none();
                    render_value(&SettingValue::List(kept), multiline, indent, newline)
                }
            };
            let edit = Edit::new(entry.value_start, entry.value_end, text, current);
            (PatchStatus::Updated, Some(edit))
        }
        SettingChange::Remove => (PatchStatus::Removed, Some(removal(source, block, matching))),
    }
}

fn render_value(value: &SettingValue, multiline: bool, indent: &str, newline: &str) -> String {
    match value {
        SettingValue::Scalar(scalar) => quote(scalar),
        SettingValue::List(_) if !multiline => value.to_string(),
        SettingValue::List(elements) => {
            let mut text = String::from("(");
            for element in elements {
                text.push_str(&format!("{newline}{indent}\t{},", quote(element)));
            }
            text.push_str(newline);
            text.push_str(indent);
            text.push(')');
            text
        }
    }
}

fn append_to_list(
    source: &str,
    layout: &ListLayout,
    missing: &[String],
    indent: &str,
    newline: &str,
) -> Edit {
    let Some(last) = layout.elements.last() else {
        let inner = &source[layout.open..layout.close];
        let text = if inner.contains('\n') {
            let mut text: String = missing
                .iter()
                .map(|element| format!("{newline}{indent}\t{},", quote(element)))
                .collect();
            text.push_str(newline);
            text.push_str(indent);
            text
        } else {
            missing.iter().map(|element| quote(element)).collect::<Vec<_>>().join(", ")
        };
        return Edit::new(layout.open, layout.close, text, inner);
    };

    let separator = list_separator(source, layout);
    match last.comma_end {
        Some(after_comma) => {
            let text: String = missing
                .iter()
                .map(|element| format!("{separator}{},", quote(element)))
                .collect();
            Edit::insert(after_comma, text)
        }
        None => {
            let text: String = missing
                .iter()
                .map(|element| format!(",{separator}{}", quote(element)))
                .collect();
            Edit::insert(last.end, text)
        }
    }
}

/// Whitespace the list already uses between elements.
fn list_separator(source: &str, layout: &ListLayout) -> String {
    for pair in layout.elements.windows(2) {
        if let Some(comma_end) = pair[0].comma_end {
            let gap = &source[comma_end..pair[1].start];
            if gap.chars().all(char::is_whitespace) {
                return gap.to_string();
            }
        }
    }

    if let Some(first) = layout.elements.first() {
        let lead = &source[layout.open..first.start];
        if lead.contains('\n') && lead.chars().all(char::is_whitespace) {
            return lead.to_string();
        }
    }
    " ".to_string()
}

/// Value text of a multi-line list with the `doomed` elements cut out. Each element
/// takes the whitespace before it and its trailing comma along, so the remaining lines
/// are left as they were.
fn without_elements(
    source: &str,
    entry: &SettingEntry,
    layout: &ListLayout,
    doomed: &[String],
) -> String {
    let mut text = String::new();
    let mut cursor = entry.value_start;
    let mut slot_start = layout.open;
    for element in &layout.elements {
        let slot_end = element.comma_end.unwrap_or(element.end);
        if doomed.contains(&element.value) {
            text.push_str(&source[cursor..slot_start]);
            cursor = slot_end;
        }
        slot_start = slot_end;
    }
    text.push_str(&source[cursor..entry.value_end]);
    text
}

/// One edit deleting every statement in `entries`, which are in document order.
fn removal(source: &str, block: &ConfigBlock, entries: &[&SettingEntry]) -> Edit {
    let spans: Vec<(usize, usize)> = entries
        .iter()
        .map(|entry| statement_span(source, block, entry))
        .collect();
    let start = spans.first().map_or(block.start, |span| span.0);
    let end = spans.last().map_or(start, |span| span.1);

    let mut kept = String::new();
    let mut cursor = start;
    for (span_start, span_end) in spans {
        kept.push_str(&source[cursor..span_start]);
        cursor = span_end;
    }
    Edit::new(start, end, kept, &source[start..end])
}

/// Span of a whole statement, including its own line when it stands alone.
fn statement_span(source: &str, block: &ConfigBlock, entry: &SettingEntry) -> (usize, usize) {
    let bytes = source.as_bytes();
    let mut start = entry.key_start;
    while start > block.start && matches!(bytes[start - 1], b' ' | b'\t') {
        start -= 1;
    }
    let mut end = entry.statement_end;

    let own_line = start > block.start && bytes[start - 1] == b'\n';
    let mut after = end;
    while after < block.end && matches!(bytes[after], b' ' | b'\t') {
        after += 1;
    }
    let rest = &source[after..block.end];
    let line_break = if rest.starts_with("\r\n") {
        Some(2)
    } else if rest.starts_with('\n') {
        Some(1)
    } else {
        None
    };

    match line_break {
        Some(width) if own_line => end = after + width,
        _ => start = entry.key_start,
    }

    (start, end)
}

fn listed(elements: &[String], value: &str) -> bool {
    elements.iter().any(|element| element == value)
}

fn dedup(elements: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(elements.len());
    for element in elements {
        if !unique.contains(element) {
            unique.push(element.clone());
        }
    }
    unique
}

fn line_ending(source: &str) -> &'static str {
    if source.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

/// Leading whitespace of the line holding `entry`, if the key starts that line.
fn entry_indent<'a>(source: &'a str, entry: &SettingEntry) -> Option<&'a str> {
    let line_start = source[..entry.key_start]
        .rfind('\n')
        .map_or(0, |newline| newline + 1);
    let prefix = &source[line_start..entry.key_start];
    prefix
        .chars()
        .all(|ch| ch == ' ' || ch == '\t')
        .then_some(prefix)
}

/// Indentation for a new statement: match the first existing one, else nest one tab
/// deeper than the line holding the opening brace.
fn settings_indent(source: &str, block: &ConfigBlock, entries: &[SettingEntry]) -> String {
    if let Some(indent) = entries.first().and_then(|entry| entry_indent(source, entry)) {
        return indent.to_string();
    }

    let brace = block.start.saturating_sub(1);
    let line_start = source[..brace].rfind('\n').map_or(0, |newline| newline + 1);
    let outer: String = source[line_start..brace]
        .chars()
        .take_while(|ch| *ch == ' ' || *ch == '\t')
        .collect();
    format!("{outer}\t")
}
