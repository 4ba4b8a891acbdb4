//! Glyph metrics used by the headless document to lay out a single line of
//! text.

use std::sync::Arc;

use ttf_parser::{Face, GlyphId};

use super::Dimensions;

/// Synthetic emboldening applied to faces that have no bold cut.
const BOLD_WIDEN: f64 = 1.08;

/// Fixed metrics standing in for the generic families.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GenericMetrics {
    units_per_em: f64,
    advance: f64,
    line_height: f64,
}

const SANS_SERIF: GenericMetrics = GenericMetrics {
    units_per_em: 1000.0,
    advance: 556.0,
    line_height: 1150.0,
};

const SERIF: GenericMetrics = GenericMetrics {
    units_per_em: 1000.0,
    advance: 500.0,
    line_height: 1150.0,
};

const MONOSPACE: GenericMetrics = GenericMetrics {
    units_per_em: 1000.0,
    advance: 600.0,
    line_height: 1133.0,
};

pub const DEFAULT_FAMILY: &str = "serif";

pub fn generic(family: &str) -> Option<GenericMetrics> {
    match family {
        "sans-serif" => Some(SANS_SERIF),
        "serif" => Some(SERIF),
        "monospace" => Some(MONOSPACE),
        _ => None,
    }
}

impl GenericMetrics {
    pub fn measure(&self, text: &str, size: f64, bold: bool) -> Dimensions {
        let scale = size / self.units_per_em;
        let count = text.chars().count() as f64;
        Dimensions {
            width: count * self.advance * scale * weight_factor(bold),
            height: self.line_height * scale,
        }
    }
}

/// A font file that parsed successfully.
#[derive(Clone, Debug)]
pub struct FaceMetrics {
    data: Arc<Vec<u8>>,
}

impl FaceMetrics {
    pub fn parse(data: Vec<u8>) -> anyhow::Result<Self> {
        Face::parse(&data, 0).map_err(|err| anyhow::anyhow!("Invalid font data: {err}"))?;
        Ok(FaceMetrics {
            data: Arc::new(data),
        })
    }

    pub fn measure(&self, text: &str, size: f64, bold: bool) -> Dimensions {
        let Ok(face) = Face::parse(&self.data, 0) else {
            return Dimensions::ZERO;
        };

        let units_per_em = f64::from(face.units_per_em());
        let scale = size / units_per_em;

        // .notdef stands in for unmapped characters
        let fallback = face
            .glyph_hor_advance(GlyphId(0))
            .map(f64::from)
            .unwrap_or(units_per_em / 2.0);

        let advance: f64 = text
            .chars()
            .map(|c| {
                face.glyph_index(c)
                    .and_then(|glyph| face.glyph_hor_advance(glyph))
                    .map(f64::from)
                    .unwrap_or(fallback)
            })
            .sum();

        let line_height = f64::from(face.ascender()) - f64::from(face.descender())
            + f64::from(face.line_gap());

        Dimensions {
            width: advance * scale * weight_factor(bold),
            height: line_height * scale,
        }
    }
}

fn weight_factor(bold: bool) -> f64 {
    if bold {
        BOLD_WIDEN
    } else {
        1.0
    }
}
