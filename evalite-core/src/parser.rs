//! Fault-tolerant extraction of tagged fields from model replies.
//!
//! Models asked for output like
//!
//! ```text
//! <reply>
//!   <thinking>...</thinking>
//!   <title>Q&A <draft></title>
//! </reply>
//! ```
//!
//! routinely put raw `&` and `<` inside tag bodies, which a strict markup
//! decoder rejects. Parsing therefore runs in three passes:
//!
//! 1. every declared top-level text tag has its body wrapped in
//!    `<![CDATA[...]]>` so embedded special characters are literal;
//! 2. the wrapped text is decoded leniently: each declared tag is located
//!    anywhere in the reply (first occurrence wins), unknown tags are
//!    skipped, order does not matter, and a missing tag decodes as empty;
//! 3. every decoded string has its CDATA wrapper removed, entities
//!    unescaped and surrounding whitespace trimmed.
//!
//! Which tags exist is declared statically per output type through
//! [`OutputSchema`]; nothing is discovered at runtime.

use std::collections::HashMap;
use std::ops::Range;

use thiserror::Error;

const CDATA_OPEN: &str = "<![CDATA[";
const CDATA_CLOSE: &str = "]]>";

/// Errors from [`parse_response`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The reply has no element at all.
    #[error("reply contains no recognizable markup")]
    NoMarkup,
}

/// How a field's content is laid out.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// A single string body.
    Text,
    /// Repeated `<item>` records nested inside one `<container>`.
    List {
        container: &'static str,
        item: &'static str,
        fields: &'static [FieldSpec],
    },
}

/// One field of an output record and the tag it is read from.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub tag: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    /// A text field named after its tag.
    pub const fn text(tag: &'static str) -> Self {
        Self {
            name: tag,
            tag,
            kind: FieldKind::Text,
        }
    }

    /// A list field: `<container><item>..</item>..</container>`.
    pub const fn list(
        name: &'static str,
        container: &'static str,
        item: &'static str,
        fields: &'static [FieldSpec],
    ) -> Self {
        Self {
            name,
            tag: container,
            kind: FieldKind::List {
                container,
                item,
                fields,
            },
        }
    }
}

/// Field-to-tag table for one output type.
#[derive(Debug, Clone, Copy)]
pub struct OutputSchema {
    /// Enclosing element; decoding is scoped to it when present.
    pub root: &'static str,
    pub fields: &'static [FieldSpec],
}

impl OutputSchema {
    /// Tags of top-level text fields: the ones wrapped before decoding.
    pub fn text_tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields
            .iter()
            .filter(|f| matches!(f.kind, FieldKind::Text))
            .map(|f| f.tag)
    }
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    List(Vec<ParsedRecord>),
}

/// Decoded fields keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRecord {
    fields: HashMap<&'static str, FieldValue>,
}

impl ParsedRecord {
    /// Text of a field, empty when absent.
    pub fn text(&self, name: &str) -> &str {
        match self.fields.get(name) {
            Some(FieldValue::Text(s)) => s,
            _ => "",
        }
    }

    /// Move a text field out, empty when absent.
    pub fn take_text(&mut self, name: &str) -> String {
        match self.fields.remove(name) {
            Some(FieldValue::Text(s)) => s,
            _ => String::new(),
        }
    }

    /// Move a list field out, empty when absent.
    pub fn take_list(&mut self, name: &str) -> Vec<ParsedRecord> {
        match self.fields.remove(name) {
            Some(FieldValue::List(items)) => items,
            _ => Vec::new(),
        }
    }
}

/// A record type that can be decoded from a model reply.
pub trait StructuredOutput: Sized {
    const SCHEMA: OutputSchema;

    fn from_record(record: ParsedRecord) -> Self;
}

/// Decode a model reply into `T`.
///
/// # Errors
///
/// Returns [`ParseError::NoMarkup`] when the reply contains no element;
/// callers are expected to fall back to a default in that case.
///
/// # Examples
///
/// ```
/// use evalite_core::parser::{parse_response, TitleOutput};
///
/// let out: TitleOutput = parse_response("<title>A & B <c></title>").unwrap();
/// assert_eq!(out.title, "A & B <c>");
/// ```
pub fn parse_response<T: StructuredOutput>(raw: &str) -> Result<T, ParseError> {
    parse_record(raw, &T::SCHEMA).map(T::from_record)
}

/// Decode a model reply against a schema without a target type.
pub fn parse_record(raw: &str, schema: &OutputSchema) -> Result<ParsedRecord, ParseError> {
    if !has_markup(raw) {
        return Err(ParseError::NoMarkup);
    }

    let wrapped = wrap_literal(raw, schema.text_tags());
    let scope = match find_element(&wrapped, schema.root) {
        Some(root) => &wrapped[root.body],
        None => wrapped.as_str(),
    };
    Ok(decode_fields(scope, schema.fields))
}

// ────────────────────────────────────────────────────────────────────────────
// Pass 1: literal wrapping
// ────────────────────────────────────────────────────────────────────────────

/// Wrap the body of every `<tag>...</tag>` (first close wins) in CDATA.
///
/// A single left-to-right pass: once a body is wrapped, tags mentioned
/// inside it are never matched. Existing CDATA sections are skipped, and a
/// body that already holds one is left as written.
fn wrap_literal<'a>(raw: &str, tags: impl Iterator<Item = &'a str>) -> String {
    let tags: Vec<(String, String)> = tags
        .map(|tag| (format!("<{tag}>"), format!("</{tag}>")))
        .collect();
    let mut out = String::with_capacity(raw.len() + 16 * tags.len());
    let mut rest = raw;

    loop {
        let next = tags
            .iter()
            .filter_map(|(open, close)| find_outside_cdata(rest, open).map(|at| (at, open, close)))
            .min_by_key(|(at, _, _)| *at);
        let Some((start, open, close)) = next else {
            break;
        };
        let body_start = start + open.len();
        out.push_str(&rest[..body_start]);

        let Some(len) = find_outside_cdata(&rest[body_start..], close) else {
            rest = &rest[body_start..];
            continue;
        };
        let body = &rest[body_start..body_start + len];
        if body.contains(CDATA_OPEN) {
            out.push_str(body);
        } else {
            out.push_str(CDATA_OPEN);
            out.push_str(body);
            out.push_str(CDATA_CLOSE);
        }
        out.push_str(close);
        rest = &rest[body_start + len + close.len()..];
    }
    out.push_str(rest);
    out
}

/// Offset of the first `needle` that does not sit inside a CDATA section.
fn find_outside_cdata(text: &str, needle: &str) -> Option<usize> {
    let mut cursor = 0;
    loop {
        let hit = cursor + text[cursor..].find(needle)?;
        match text[cursor..].find(CDATA_OPEN).map(|i| cursor + i) {
            Some(cdata) if cdata < hit => {
                let body = cdata + CDATA_OPEN.len();
                cursor = body + text[body..].find(CDATA_CLOSE)? + CDATA_CLOSE.len();
            }
            _ => return Some(hit),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pass 2: lenient decoding
// ────────────────────────────────────────────────────────────────────────────

/// Location of one element: its body, and the offset just past its close tag.
struct Element {
    body: Range<usize>,
    end: usize,
}

/// Whether the text contains anything that looks like an element.
fn has_markup(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.iter().enumerate().any(|(i, b)| {
        *b == b'<'
            && bytes
                .get(i + 1)
                .is_some_and(|c| c.is_ascii_alphabetic() || *c == b'_')
            && bytes[i + 1..].contains(&b'>')
    })
}

/// Find the first `<tag>` (attributes allowed) and its matching close tag.
///
/// Tags inside CDATA sections are never matched. An element with no close
/// tag is treated as absent.
fn find_element(text: &str, tag: &str) -> Option<Element> {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let mut search = 0;

    while let Some(found) = find_outside_cdata(&text[search..], &open) {
        let start = search + found;
        let after_name = start + open.len();
        search = after_name;

        match text[after_name..].chars().next() {
            Some('>') | Some('/') => {}
            Some(c) if c.is_whitespace() => {}
            _ => continue,
        }
        let open_end = after_name + text[after_name..].find('>')?;
        if text[..open_end].ends_with('/') {
            return Some(Element {
                body: open_end + 1..open_end + 1,
                end: open_end + 1,
            });
        }

        let body_start = open_end + 1;
        let body_end = body_start + find_outside_cdata(&text[body_start..], &close)?;
        return Some(Element {
            body: body_start..body_end,
            end: body_end + close.len(),
        });
    }
    None
}

fn decode_fields(text: &str, fields: &'static [FieldSpec]) -> ParsedRecord {
    let mut record = ParsedRecord::default();
    for field in fields {
        let value = match field.kind {
            FieldKind::Text => FieldValue::Text(
                find_element(text, field.tag)
                    .map(|el| clean(&text[el.body]))
                    .unwrap_or_default(),
            ),
            FieldKind::List {
                container,
                item,
                fields,
            } => {
                let mut items = Vec::new();
                if let Some(el) = find_element(text, container) {
                    let mut rest = &text[el.body];
                    while let Some(entry) = find_element(rest, item) {
                        items.push(decode_fields(&rest[entry.body.clone()], fields));
                        rest = &rest[entry.end..];
                    }
                }
                FieldValue::List(items)
            }
        };
        record.fields.insert(field.name, value);
    }
    record
}

// ────────────────────────────────────────────────────────────────────────────
// Pass 3: cleaning
// ────────────────────────────────────────────────────────────────────────────

fn clean(text: &str) -> String {
    html_escape::decode_html_entities(&strip_cdata(text))
        .trim()
        .to_string()
}

/// Replace every `<![CDATA[x]]>` with `x`.
fn strip_cdata(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(CDATA_OPEN) {
        out.push_str(&rest[..start]);
        let inner = &rest[start + CDATA_OPEN.len()..];
        match inner.find(CDATA_CLOSE) {
            Some(end) => {
                out.push_str(&inner[..end]);
                rest = &inner[end + CDATA_CLOSE.len()..];
            }
            None => {
                out.push_str(inner);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

// ────────────────────────────────────────────────────────────────────────────
// Output types
// ────────────────────────────────────────────────────────────────────────────

/// Reply to the workspace-naming prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitleOutput {
    pub thinking: String,
    pub title: String,
}

impl StructuredOutput for TitleOutput {
    const SCHEMA: OutputSchema = OutputSchema {
        root: "reply",
        fields: &[FieldSpec::text("thinking"), FieldSpec::text("title")],
    };

    fn from_record(mut record: ParsedRecord) -> Self {
        Self {
            thinking: record.take_text("thinking"),
            title: record.take_text("title"),
        }
    }
}

/// Reply to the prompt-generation prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedPromptOutput {
    pub thinking: String,
    pub prompt: String,
}

impl StructuredOutput for GeneratedPromptOutput {
    const SCHEMA: OutputSchema = OutputSchema {
        root: "reply",
        fields: &[FieldSpec::text("thinking"), FieldSpec::text("prompt")],
    };

    fn from_record(mut record: ParsedRecord) -> Self {
        Self {
            thinking: record.take_text("thinking"),
            prompt: record.take_text("prompt"),
        }
    }
}

/// One generated `variable_key` / `variable_value` pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableAssignment {
    pub key: String,
    pub value: String,
}

const VARIABLE_ASSIGNMENT_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "key",
        tag: "variable_key",
        kind: FieldKind::Text,
    },
    FieldSpec {
        name: "value",
        tag: "variable_value",
        kind: FieldKind::Text,
    },
];

/// Reply to the test-case generation prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedTestCaseOutput {
    pub summary: String,
    pub variable_considerations: String,
    pub test_case: Vec<VariableAssignment>,
}

impl StructuredOutput for GeneratedTestCaseOutput {
    const SCHEMA: OutputSchema = OutputSchema {
        root: "reply",
        fields: &[
            FieldSpec::text("summary"),
            FieldSpec::text("variable_considerations"),
            FieldSpec::list("test_case", "test_cases", "case", VARIABLE_ASSIGNMENT_FIELDS),
        ],
    };

    fn from_record(mut record: ParsedRecord) -> Self {
        Self {
            summary: record.take_text("summary"),
            variable_considerations: record.take_text("variable_considerations"),
            test_case: record
                .take_list("test_case")
                .into_iter()
                .map(|mut item| VariableAssignment {
                    key: item.take_text("key"),
                    value: item.take_text("value"),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_special_characters_survive() {
        let out: TitleOutput = parse_response("<title>A & B <c></title>").unwrap();
        assert_eq!(out.title, "A & B <c>");
        assert_eq!(out.thinking, "");
    }

    #[test]
    fn fields_are_trimmed_and_order_free() {
        let raw = "Sure!\n<reply>\n  <title>\n  My Title \n</title>\n  <thinking> hmm </thinking>\n</reply>";
        let out: TitleOutput = parse_response(raw).unwrap();
        assert_eq!(out.title, "My Title");
        assert_eq!(out.thinking, "hmm");
    }

    #[test]
    fn unknown_tags_are_ignored() {
        let raw = "<reply><note>ignore me</note><prompt>Do X</prompt><extra/></reply>";
        let out: GeneratedPromptOutput = parse_response(raw).unwrap();
        assert_eq!(out.prompt, "Do X");
    }

    #[test]
    fn first_occurrence_wins() {
        let raw = "<title>first</title><title>second</title>";
        let out: TitleOutput = parse_response(raw).unwrap();
        assert_eq!(out.title, "first");
    }

    #[test]
    fn entities_are_unescaped() {
        let raw = "<title>Fish &amp; Chips &lt;3 &#39;n&#x27; &quot;more&quot; 10&nbsp;min</title>";
        let out: TitleOutput = parse_response(raw).unwrap();
        assert_eq!(out.title, "Fish & Chips <3 'n' \"more\" 10\u{a0}min");
    }

    #[test]
    fn named_html_entities_are_unescaped() {
        let raw = "<title>Caf&eacute; &mdash; 10&nbsp;min&hellip;</title>";
        let out: TitleOutput = parse_response(raw).unwrap();
        assert_eq!(out.title, "Caf\u{e9} \u{2014} 10\u{a0}min\u{2026}");
    }

    #[test]
    fn open_tag_mentioned_in_another_field_is_literal() {
        let raw = "<reply><thinking>Wrap it in <title> tags.</thinking><title>Real</title></reply>";
        let out: TitleOutput = parse_response(raw).unwrap();
        assert_eq!(out.thinking, "Wrap it in <title> tags.");
        assert_eq!(out.title, "Real");
    }

    #[test]
    fn quoted_element_in_another_field_does_not_win() {
        let raw = "<thinking>I will answer with <title>x</title> at the end.</thinking><title>Real</title>";
        let out: TitleOutput = parse_response(raw).unwrap();
        assert_eq!(out.thinking, "I will answer with <title>x</title> at the end.");
        assert_eq!(out.title, "Real");
    }

    #[test]
    fn existing_cdata_is_not_double_wrapped() {
        let raw = "<title><![CDATA[x < y]]></title>";
        let out: TitleOutput = parse_response(raw).unwrap();
        assert_eq!(out.title, "x < y");
    }

    #[test]
    fn prompt_body_with_placeholders_and_markup() {
        let raw = "<reply><thinking>plan</thinking><prompt>\nSummarize {{TEXT}} in <b>bold</b> & cite.\n</prompt></reply>";
        let out: GeneratedPromptOutput = parse_response(raw).unwrap();
        assert_eq!(out.prompt, "Summarize {{TEXT}} in <b>bold</b> & cite.");
    }

    #[test]
    fn nested_list_is_decoded() {
        let raw = r#"
<reply>
<summary>A happy-path case</summary>
<variable_considerations>Names & places</variable_considerations>
<test_cases>
  <case><variable_key> NAME </variable_key><variable_value>Ada</variable_value></case>
  <case><variable_value>Paris &amp; Lyon</variable_value><variable_key>CITY</variable_key></case>
</test_cases>
</reply>"#;
        let out: GeneratedTestCaseOutput = parse_response(raw).unwrap();

        assert_eq!(out.summary, "A happy-path case");
        assert_eq!(out.variable_considerations, "Names & places");
        assert_eq!(
            out.test_case,
            vec![
                VariableAssignment {
                    key: "NAME".into(),
                    value: "Ada".into()
                },
                VariableAssignment {
                    key: "CITY".into(),
                    value: "Paris & Lyon".into()
                },
            ]
        );
    }

    #[test]
    fn missing_fields_decode_empty() {
        let out: GeneratedTestCaseOutput = parse_response("<reply><summary>s</summary></reply>").unwrap();
        assert_eq!(out.summary, "s");
        assert!(out.variable_considerations.is_empty());
        assert!(out.test_case.is_empty());
    }

    #[test]
    fn plain_text_is_a_parse_error() {
        let err = parse_response::<TitleOutput>("just a title, no tags").unwrap_err();
        assert_eq!(err, ParseError::NoMarkup);
        assert!(parse_response::<TitleOutput>("a < b > c").is_err());
    }

    #[test]
    fn unclosed_tag_is_treated_as_missing() {
        let out: TitleOutput = parse_response("<thinking>ok</thinking><title>never closed").unwrap();
        assert_eq!(out.thinking, "ok");
        assert_eq!(out.title, "");
    }

    #[test]
    fn similar_tag_names_do_not_match() {
        let out: TitleOutput = parse_response("<titles>no</titles><title>yes</title>").unwrap();
        assert_eq!(out.title, "yes");
    }

    #[test]
    fn wrap_literal_wraps_every_occurrence() {
        let wrapped = wrap_literal("<a>1</a><a>2</a>", ["a"].into_iter());
        assert_eq!(wrapped, "<a><![CDATA[1]]></a><a><![CDATA[2]]></a>");
    }

    #[test]
    fn wrap_literal_never_nests() {
        let wrapped = wrap_literal("<a>see <b>x</b></a><b>y</b>", ["a", "b"].into_iter());
        assert_eq!(wrapped, "<a><![CDATA[see <b>x</b>]]></a><b><![CDATA[y]]></b>");
    }

    #[test]
    fn find_outside_cdata_skips_sections() {
        assert_eq!(find_outside_cdata("<![CDATA[<a>]]><a>", "<a>"), Some(15));
        assert_eq!(find_outside_cdata("<![CDATA[<a>]]>", "<a>"), None);
    }

    #[test]
    fn strip_cdata_handles_multiple_sections() {
        assert_eq!(strip_cdata("<![CDATA[a]]> and <![CDATA[b]]>"), "a and b");
        assert_eq!(strip_cdata("<![CDATA[open"), "open");
    }
}
