//! Template compositor: substitutes canvas data into `{{placeholder}}` slots.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{DateTime, SecondsFormat, Utc};
use log::warn;
use regex::{Captures, Regex};

use crate::{CanvasDocument, RenderOptions, SectionValue};

/// Vertical distance between consecutive entries of a section.
pub const LINE_STEP: u32 = 22;
/// Baseline of the first entry, relative to its block.
pub const FIRST_LINE_Y: u32 = 56;
/// Left inset of entries, relative to their block.
pub const ITEM_X: u32 = 16;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("valid placeholder regex"))
}

fn unresolved_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{[^{}]*\}\}").expect("valid unresolved regex"))
}

/// Escape text for embedding in XML content or attribute values.
pub fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Lay out a section as one `<text>` element per entry.
fn section_markup(value: &SectionValue) -> String {
    value
        .items()
        .iter()
        .enumerate()
        .map(|(i, item)| {
            format!(
                r#"<text x="{x}" y="{y}" class="item">• {text}</text>"#,
                x = ITEM_X,
                y = FIRST_LINE_Y + i as u32 * LINE_STEP,
                text = escape_xml(item.trim()),
            )
        })
        .collect::<Vec<_>>()
        .join("")
}

fn metadata_markup(doc: &CanvasDocument, options: &RenderOptions, generated_at: &str) -> String {
    format!(
        r#"<metadata><canvas type="{}" theme="{}" generatedAt="{}" sections="{}"/></metadata>"#,
        doc.canvas_type,
        escape_xml(&options.theme),
        escape_xml(generated_at),
        doc.sections.len(),
    )
}

/// Build the substitution set: one markup fragment per section, then the
/// layout variables, which win over a section of the same name.
pub fn variables(
    doc: &CanvasDocument,
    options: &RenderOptions,
    generated_at: DateTime<Utc>,
) -> BTreeMap<String, String> {
    let mut vars: BTreeMap<String, String> = doc
        .sections
        .iter()
        .map(|(key, value)| (key.clone(), section_markup(value)))
        .collect();

    let generated_at = generated_at.to_rfc3339_opts(SecondsFormat::Secs, true);
    let title = doc.title().unwrap_or_else(|| doc.canvas_type.display_name());

    vars.insert("width".into(), options.width.to_string());
    vars.insert("height".into(), options.height.to_string());
    vars.insert("title".into(), escape_xml(title));
    vars.insert("generatedAt".into(), escape_xml(&generated_at));
    let metadata = if options.include_metadata {
        metadata_markup(doc, options, &generated_at)
    } else {
        String::new()
    };
    vars.insert("metadata".into(), metadata);
    vars
}

/// Substitute every known placeholder in `template`. Unknown placeholders are
/// left verbatim and reported with a warning; composition never fails.
pub fn compose(
    template: &str,
    doc: &CanvasDocument,
    options: &RenderOptions,
    generated_at: DateTime<Utc>,
) -> String {
    let vars = variables(doc, options, generated_at);
    let svg = placeholder_re()
        .replace_all(template, |caps: &Captures| match vars.get(&caps[1]) {
            Some(v) => v.clone(),
            None => caps[0].to_string(),
        })
        .into_owned();

    let unresolved = unresolved_placeholders(&svg);
    if !unresolved.is_empty() {
        warn!(
            "{} canvas has {} unresolved placeholder(s): {}",
            doc.canvas_type,
            unresolved.len(),
            unresolved.join(", ")
        );
    }
    svg
}

/// Placeholders still present in a composed document.
pub fn unresolved_placeholders(svg: &str) -> Vec<String> {
    unresolved_re()
        .find_iter(svg)
        .map(|m| m.as_str().to_string())
        .collect()
}
