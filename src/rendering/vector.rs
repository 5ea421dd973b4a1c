//! Whitespace-collapsing pass over composed SVG. Not a structural minifier:
//! it only removes whitespace between tags and squeezes runs of whitespace.
use std::sync::OnceLock;

use regex::Regex;

fn between_tags() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r">\s+<").expect("valid regex"))
}

fn runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

pub fn optimize_svg(svg: &str) -> String {
    let squeezed = runs().replace_all(svg, " ");
    between_tags().replace_all(&squeezed, "><").trim().to_string()
}
