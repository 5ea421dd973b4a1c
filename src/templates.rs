//! Template store: canvas type + theme -> parametrized SVG template
//!
//! Built-in templates are generated from static block layouts and theme
//! palettes. A directory of `.svg` overrides can replace any of them.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::{debug, warn};

use crate::{CanvasType, Result};

/// Width of the template coordinate space; output size is set by `{{width}}`.
pub const VIEWBOX_WIDTH: u32 = 1200;
/// Height of the template coordinate space.
pub const VIEWBOX_HEIGHT: u32 = 800;

/// Colour palette and typography for a visual theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    pub name: &'static str,
    pub background: &'static str,
    pub panel: &'static str,
    pub stroke: &'static str,
    pub heading: &'static str,
    pub text: &'static str,
    pub accent: &'static str,
    pub font_family: &'static str,
}

const PROFESSIONAL: Theme = Theme {
    name: "professional",
    background: "#ffffff",
    panel: "#f8fafc",
    stroke: "#1e3a5f",
    heading: "#1e3a5f",
    text: "#334155",
    accent: "#2563eb",
    font_family: "Helvetica, Arial, sans-serif",
};

const MODERN: Theme = Theme {
    name: "modern",
    background: "#0f172a",
    panel: "#1e293b",
    stroke: "#38bdf8",
    heading: "#f8fafc",
    text: "#e2e8f0",
    accent: "#38bdf8",
    font_family: "Inter, Helvetica, Arial, sans-serif",
};

const MINIMAL: Theme = Theme {
    name: "minimal",
    background: "#ffffff",
    panel: "#ffffff",
    stroke: "#d4d4d4",
    heading: "#171717",
    text: "#404040",
    accent: "#171717",
    font_family: "Georgia, serif",
};

impl Theme {
    pub const ALL: [Theme; 3] = [PROFESSIONAL, MODERN, MINIMAL];

    /// Resolve a theme by name. Unknown names get the default theme, never an error.
    pub fn by_name(name: &str) -> Theme {
        Theme::ALL
            .into_iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .unwrap_or(PROFESSIONAL)
    }

    /// Background colour as RGB, used for the opaque raster backdrop.
    pub fn background_rgb(&self) -> (u8, u8, u8) {
        parse_hex_color(self.background).unwrap_or((255, 255, 255))
    }
}

impl Default for Theme {
    fn default() -> Self {
        PROFESSIONAL
    }
}

fn parse_hex_color(s: &str) -> Option<(u8, u8, u8)> {
    let hex = s.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}

/// A titled block of the canvas, positioned in viewBox coordinates.
#[derive(Debug, Clone, Copy)]
struct Block {
    key: &'static str,
    title: &'static str,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

const fn block(key: &'static str, title: &'static str, x: u32, y: u32, width: u32, height: u32) -> Block {
    Block { key, title, x, y, width, height }
}

const BUSINESS_MODEL: &[Block] = &[
    block("key_partners", "Key Partners", 20, 80, 232, 470),
    block("key_activities", "Key Activities", 252, 80, 232, 235),
    block("key_resources", "Key Resources", 252, 315, 232, 235),
    block("value_propositions", "Value Propositions", 484, 80, 232, 470),
    block("customer_relationships", "Customer Relationships", 716, 80, 232, 235),
    block("channels", "Channels", 716, 315, 232, 235),
    block("customer_segments", "Customer Segments", 948, 80, 232, 470),
    block("cost_structure", "Cost Structure", 20, 560, 580, 220),
    block("revenue_streams", "Revenue Streams", 600, 560, 580, 220),
];

const VALUE_PROPOSITION: &[Block] = &[
    block("products_services", "Products &amp; Services", 20, 80, 280, 700),
    block("gain_creators", "Gain Creators", 300, 80, 290, 350),
    block("pain_relievers", "Pain Relievers", 300, 430, 290, 350),
    block("gains", "Gains", 610, 80, 290, 350),
    block("pains", "Pains", 610, 430, 290, 350),
    block("customer_jobs", "Customer Jobs", 900, 80, 280, 700),
];

const TESTING_BUSINESS_IDEAS: &[Block] = &[
    block("hypothesis", "Hypothesis", 20, 80, 386, 350),
    block("experiment", "Experiment", 406, 80, 386, 350),
    block("metrics", "Metrics", 792, 80, 386, 350),
    block("success_criteria", "Success Criteria", 20, 430, 386, 350),
    block("learnings", "Learnings", 406, 430, 386, 350),
    block("next_steps", "Next Steps", 792, 430, 386, 350),
];

fn layout(canvas_type: CanvasType) -> &'static [Block] {
    match canvas_type {
        CanvasType::BusinessModel => BUSINESS_MODEL,
        CanvasType::ValueProposition => VALUE_PROPOSITION,
        CanvasType::TestingBusinessIdeas => TESTING_BUSINESS_IDEAS,
    }
}

/// Section keys a built-in template has placeholders for.
pub fn section_keys(canvas_type: CanvasType) -> Vec<&'static str> {
    layout(canvas_type).iter().map(|b| b.key).collect()
}

fn builtin_template(canvas_type: CanvasType, theme: &Theme) -> String {
    let mut svg = String::with_capacity(4096);
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{{{{width}}}}" height="{{{{height}}}}" viewBox="0 0 {vw} {vh}" preserveAspectRatio="xMidYMid meet" font-family="{font}">
  {{{{metadata}}}}
  <rect x="0" y="0" width="{vw}" height="{vh}" fill="{bg}"/>
  <text x="20" y="44" font-size="28" font-weight="bold" fill="{heading}">{{{{title}}}}</text>
  <text x="1180" y="44" font-size="12" text-anchor="end" fill="{text}">Generated {{{{generatedAt}}}}</text>
  <line x1="20" y1="62" x2="1180" y2="62" stroke="{accent}" stroke-width="2"/>
"#,
        vw = VIEWBOX_WIDTH,
        vh = VIEWBOX_HEIGHT,
        font = theme.font_family,
        bg = theme.background,
        heading = theme.heading,
        text = theme.text,
        accent = theme.accent,
    ));

    for b in layout(canvas_type) {
        svg.push_str(&format!(
            r#"  <g id="block-{key}" transform="translate({x},{y})">
    <rect x="0" y="0" width="{w}" height="{h}" rx="6" fill="{panel}" stroke="{stroke}" stroke-width="1.5"/>
    <text x="16" y="30" font-size="17" font-weight="bold" fill="{heading}">{title}</text>
    <g font-size="14" fill="{text}">{{{{{key}}}}}</g>
  </g>
"#,
            key = b.key,
            x = b.x,
            y = b.y,
            w = b.width,
            h = b.height,
            panel = theme.panel,
            stroke = theme.stroke,
            heading = theme.heading,
            title = b.title,
            text = theme.text,
        ));
    }

    svg.push_str("</svg>\n");
    svg
}

/// Template lookup with optional on-disk overrides.
pub struct TemplateStore {
    /// Keyed by canvas type and, for theme-specific files, the theme name
    overrides: HashMap<(CanvasType, Option<String>), String>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self {
            overrides: HashMap::new(),
        }
    }

    /// Load `<canvasType>_<theme>.svg` and `<canvasType>.svg` overrides from
    /// `dir`. A missing directory yields an empty store; files that cannot be
    /// read or do not name a known canvas type are skipped.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let mut store = Self::new();
        if !dir.exists() {
            debug!("Template directory {:?} does not exist; using built-ins", dir);
            return Ok(store);
        }

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map_or(true, |e| e != "svg") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let (type_name, theme) = match stem.split_once('_') {
                Some((t, theme)) => (t, Some(theme.to_ascii_lowercase())),
                None => (stem, None),
            };
            let Some(canvas_type) = CanvasType::from_name(type_name) else {
                warn!("Ignoring template {:?}: unknown canvas type '{}'", path, type_name);
                continue;
            };
            match fs::read_to_string(&path) {
                Ok(content) => {
                    debug!("Loaded template override {:?}", path);
                    store.overrides.insert((canvas_type, theme), content);
                }
                Err(e) => warn!("Failed to read template {:?}: {}", path, e),
            }
        }
        Ok(store)
    }

    /// Register an override for a canvas type, optionally for one theme only.
    pub fn register(&mut self, canvas_type: CanvasType, theme: Option<&str>, template: impl Into<String>) {
        let theme = theme.map(|t| t.to_ascii_lowercase());
        self.overrides.insert((canvas_type, theme), template.into());
    }

    /// Template for `canvas_type` rendered with `theme`.
    ///
    /// Never fails: theme-specific overrides win, then type-wide overrides,
    /// then the built-in template with the theme's palette.
    pub fn get_template(&self, canvas_type: CanvasType, theme: &str) -> String {
        let theme_key = theme.to_ascii_lowercase();
        if let Some(t) = self.overrides.get(&(canvas_type, Some(theme_key))) {
            return t.clone();
        }
        if let Some(t) = self.overrides.get(&(canvas_type, None)) {
            return t.clone();
        }
        builtin_template(canvas_type, &Theme::by_name(theme))
    }

    /// Lookup by canvas type name; unknown names fall back to the default type.
    pub fn get_template_by_name(&self, canvas_type: &str, theme: &str) -> String {
        let canvas_type = CanvasType::from_name(canvas_type).unwrap_or_default();
        self.get_template(canvas_type, theme)
    }

    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_placeholder_per_block() {
        let store = TemplateStore::new();
        for canvas_type in CanvasType::ALL {
            let t = store.get_template(canvas_type, "professional");
            for key in section_keys(canvas_type) {
                assert!(t.contains(&format!("{{{{{}}}}}", key)), "missing {} in {}", key, canvas_type);
            }
            assert!(t.contains("{{width}}"));
            assert!(t.contains("{{title}}"));
        }
    }

    #[test]
    fn unknown_theme_uses_default_palette() {
        let store = TemplateStore::new();
        let a = store.get_template(CanvasType::BusinessModel, "no-such-theme");
        let b = store.get_template(CanvasType::BusinessModel, "professional");
        assert_eq!(a, b);
        assert_ne!(b, store.get_template(CanvasType::BusinessModel, "modern"));
    }

    #[test]
    fn unknown_type_name_falls_back() {
        let store = TemplateStore::new();
        assert_eq!(
            store.get_template_by_name("lean", "minimal"),
            store.get_template(CanvasType::BusinessModel, "minimal")
        );
    }

    #[test]
    fn overrides_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("valueProposition_modern.svg"), "<svg>themed</svg>").unwrap();
        fs::write(dir.path().join("valueProposition.svg"), "<svg>any</svg>").unwrap();
        fs::write(dir.path().join("napkin.svg"), "<svg/>").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = TemplateStore::load_from_dir(dir.path()).unwrap();
        assert_eq!(store.override_count(), 2);
        assert_eq!(store.get_template(CanvasType::ValueProposition, "Modern"), "<svg>themed</svg>");
        assert_eq!(store.get_template(CanvasType::ValueProposition, "minimal"), "<svg>any</svg>");
    }

    #[test]
    fn missing_dir_is_empty_store() {
        let store = TemplateStore::load_from_dir(Path::new("/definitely/not/here")).unwrap();
        assert_eq!(store.override_count(), 0);
    }

    #[test]
    fn theme_background_parses() {
        assert_eq!(Theme::by_name("modern").background_rgb(), (0x0f, 0x17, 0x2a));
        assert_eq!(Theme::default().background_rgb(), (255, 255, 255));
    }
}
