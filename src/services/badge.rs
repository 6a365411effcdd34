//! Scannable badge rendering
//!
//! Turns the opaque participant identifier into an SVG QR image. Rendering
//! failure is fatal to participant creation; no participant exists without
//! a usable identifier.

use qrcode::{render::svg, QrCode};

use crate::types::TurnstileError;

/// Minimum badge edge length in pixels
const MIN_SIZE: u32 = 256;

/// Render a participant identifier into an SVG QR badge.
pub fn render_badge(participant_id: &str) -> Result<String, TurnstileError> {
    if participant_id.trim().is_empty() {
        return Err(TurnstileError::Render("Empty participant id".into()));
    }

    let svg_string = QrCode::new(participant_id.as_bytes())
        .map_err(|e| TurnstileError::Render(format!("QR generation failed: {}", e)))?
        .render::<svg::Color>()
        .min_dimensions(MIN_SIZE, MIN_SIZE)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#FFFFFF"))
        .build();

    Ok(svg_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_produces_svg() {
        let svg = render_badge("3f1c9a2e-7b40-4f6c-a1d2-0b9e8c7d6f5a").unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("#000000"));
    }

    #[test]
    fn test_empty_id_is_fatal() {
        assert!(render_badge("  ").is_err());
    }
}
