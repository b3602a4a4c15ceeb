//! QR challenge rendering.

use qrcode::render::svg;
use qrcode::QrCode;

/// Render a login challenge string as an SVG image. Returns `None` when the
/// challenge cannot be encoded; the failure is logged and the challenge
/// simply stays unavailable.
pub fn render_svg(challenge: &str) -> Option<String> {
    match QrCode::new(challenge.as_bytes()) {
        Ok(code) => Some(
            code.render()
                .min_dimensions(240, 240)
                .dark_color(svg::Color("#000000"))
                .light_color(svg::Color("#ffffff"))
                .build(),
        ),
        Err(e) => {
            log::warn!("qr render failed: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_svg_markup() {
        let svg = render_svg("2@abcdef,secretref,keydata").expect("render");
        assert!(svg.contains("<svg"));
    }
}
