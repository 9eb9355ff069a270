use qrcode::render::svg;
use qrcode::QrCode;
use serde::Serialize;

use crate::errors::AppError;

/// What the operator receives after a key is minted.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionArtifact {
    pub uri: String,
    /// Scannable rendering of `uri`.
    pub image: RenderedImage,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedImage {
    pub media_type: &'static str,
    pub file_name: String,
    pub data: String,
}

/// Turns a share link into something a phone camera can scan.
pub trait QrRenderer: Send + Sync {
    fn render(&self, id: &str, uri: &str) -> Result<RenderedImage, AppError>;
}

#[derive(Debug, Clone, Copy)]
pub struct SvgQrRenderer {
    pub min_size: u32,
}

impl Default for SvgQrRenderer {
    fn default() -> Self {
        Self { min_size: 256 }
    }
}

impl QrRenderer for SvgQrRenderer {
    fn render(&self, id: &str, uri: &str) -> Result<RenderedImage, AppError> {
        let code = QrCode::new(uri.as_bytes())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("qr encoding failed: {}", e)))?;
        let data = code
            .render::<svg::Color>()
            .min_dimensions(self.min_size, self.min_size)
            .dark_color(svg::Color("#000000"))
            .light_color(svg::Color("#ffffff"))
            .build();
        Ok(RenderedImage {
            media_type: "image/svg+xml",
            file_name: format!("{}.svg", id),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_svg_named_after_key() {
        let img = SvgQrRenderer::default()
            .render("abc", "vless://abc@vpn.example.com:443#user")
            .unwrap();
        assert_eq!(img.media_type, "image/svg+xml");
        assert_eq!(img.file_name, "abc.svg");
        assert!(img.data.contains("<svg"));
    }

    #[test]
    fn same_link_renders_identically() {
        let r = SvgQrRenderer::default();
        let a = r.render("k", "vless://k@h:1#l").unwrap();
        let b = r.render("k", "vless://k@h:1#l").unwrap();
        assert_eq!(a.data, b.data);
    }
}
