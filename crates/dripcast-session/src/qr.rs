// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pairing-code rendering.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use dripcast_core::DripcastError;
use qrcode::QrCode;
use qrcode::render::svg;

/// Render an opaque pairing code as a scannable SVG, returned as a
/// `data:image/svg+xml;base64,` URL.
pub fn render_qr_data_url(code: &str, size: u32) -> Result<String, DripcastError> {
    let qr = QrCode::new(code.as_bytes())
        .map_err(|e| DripcastError::Pairing(format!("cannot encode pairing code: {e}")))?;
    let image = qr
        .render::<svg::Color<'_>>()
        .min_dimensions(size, size)
        .quiet_zone(true)
        .build();
    Ok(format!(
        "data:image/svg+xml;base64,{}",
        STANDARD.encode(image.as_bytes())
    ))
}
