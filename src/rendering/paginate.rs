//! Paginated output through the shared document engine.
use log::warn;

use crate::engine::{EngineLifecycleManager, PageSize};
use crate::{Error, Result};

/// Minimal HTML shell that fits the SVG to one landscape A4 page.
pub fn wrap_html(svg: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<style>
@page {{ size: A4 landscape; margin: 0; }}
html, body {{ margin: 0; padding: 0; }}
body > svg {{ display: block; width: 100vw; height: 100vh; }}
</style>
</head>
<body>{}</body>
</html>"#,
        svg
    )
}

#[derive(Debug)]
pub enum Paginated {
    Pdf(Vec<u8>),
    /// The engine is unavailable; the caller should ship the SVG instead.
    Fallback { reason: String },
}

/// Print `svg` as a single-page PDF. An unavailable engine degrades to
/// `Paginated::Fallback` rather than failing the call.
pub async fn paginate(svg: &str, engine: &EngineLifecycleManager) -> Result<Paginated> {
    match engine.print_pdf(wrap_html(svg), PageSize::A4_LANDSCAPE).await {
        Ok(pdf) => Ok(Paginated::Pdf(pdf)),
        Err(Error::EngineUnavailable(reason)) => {
            warn!("PDF requested but document engine unavailable ({}); returning SVG", reason);
            Ok(Paginated::Fallback { reason })
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_embeds_svg_in_body() {
        let html = wrap_html("<svg/>");
        assert!(html.contains("<body><svg/></body>"));
        assert!(html.contains("size: A4 landscape"));
    }
}
