use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::sync::Arc;
use ttf_parser::{Face, name_id};
use usvg::fontdb;

/// Families tried, in order, when settings name no font at all.
const FALLBACK_FAMILIES: &[&str] = &[
    "sans-serif",
    "Noto Sans CJK KR",
    "Noto Sans",
    "DejaVu Sans",
    "Arial",
];

/// Glyph advances of one font face, used to measure lines for wrapping.
#[derive(Clone)]
pub struct FontMetrics {
    data: Arc<Vec<u8>>,
    face_index: u32,
    units_per_em: u16,
    space_advance: u16,
    family: Option<String>,
}

impl std::fmt::Debug for FontMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontMetrics")
            .field("family", &self.family)
            .field("face_index", &self.face_index)
            .field("units_per_em", &self.units_per_em)
            .finish()
    }
}

impl FontMetrics {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("failed to read font: {}", path.display()))?;
        Self::from_data(data, None)
            .with_context(|| format!("failed to parse font: {}", path.display()))
    }

    fn from_data(data: Vec<u8>, preferred_index: Option<u32>) -> Result<Self> {
        let data = Arc::new(data);
        let count = ttf_parser::fonts_in_collection(&data).unwrap_or(1);
        let indices = preferred_index
            .into_iter()
            .chain(0..count)
            .collect::<Vec<_>>();
        for index in indices {
            let Ok(face) = Face::parse(&data, index) else {
                continue;
            };
            let units_per_em = face.units_per_em().max(1);
            let space_advance = face
                .glyph_index(' ')
                .and_then(|id| face.glyph_hor_advance(id))
                .unwrap_or(units_per_em / 2);
            let family = family_name(&face);
            return Ok(Self {
                data: Arc::clone(&data),
                face_index: index,
                units_per_em,
                space_advance,
                family,
            });
        }
        Err(anyhow!("no usable face in font data"))
    }

    /// Advance width of `text` at `font_size` pixels. Characters the face has
    /// no glyph for count as a space.
    pub fn measure(&self, text: &str, font_size: f32) -> Option<f32> {
        let face = Face::parse(&self.data, self.face_index).ok()?;
        let advance: u32 = text
            .chars()
            .filter(|ch| *ch != '\n')
            .map(|ch| {
                face.glyph_index(ch)
                    .and_then(|glyph| face.glyph_hor_advance(glyph))
                    .unwrap_or(self.space_advance) as u32
            })
            .sum();
        Some(advance as f32 * font_size / self.units_per_em as f32)
    }
}

/// A font picked for export text: its metrics plus the family name to put in
/// the SVG.
#[derive(Debug, Clone)]
pub struct ResolvedFont {
    pub metrics: FontMetrics,
    pub family: String,
}

/// Resolves the export font. A configured path wins over a configured family;
/// with neither, a short list of common families is tried. Bold faces are
/// preferred when looking fonts up by family.
pub fn resolve_export_font(
    font_path: Option<&Path>,
    font_family: Option<&str>,
) -> Result<ResolvedFont> {
    if let Some(path) = font_path {
        let metrics = FontMetrics::from_file(path)?;
        let family = metrics
            .family()
            .or(font_family)
            .unwrap_or("sans-serif")
            .to_string();
        return Ok(ResolvedFont { metrics, family });
    }

    let mut db = fontdb::Database::new();
    db.load_system_fonts();

    if let Some(family) = font_family {
        return resolve_from_database(&db, family);
    }
    FALLBACK_FAMILIES
        .iter()
        .find_map(|family| resolve_from_database(&db, family).ok())
        .ok_or_else(|| anyhow!("no fallback fonts found"))
}

fn resolve_from_database(db: &fontdb::Database, family: &str) -> Result<ResolvedFont> {
    let families = if family.eq_ignore_ascii_case("sans-serif") {
        [fontdb::Family::SansSerif]
    } else {
        [fontdb::Family::Name(family)]
    };
    let query = fontdb::Query {
        families: &families,
        weight: fontdb::Weight::BOLD,
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| anyhow!("font not found: {}", family))?;
    let (data, index) = db
        .with_face_data(id, |data, index| (data.to_vec(), index))
        .ok_or_else(|| anyhow!("failed to load font data: {}", family))?;
    let metrics = FontMetrics::from_data(data, Some(index))?;
    let family = metrics.family().unwrap_or(family).to_string();
    Ok(ResolvedFont { metrics, family })
}

/// Export text is drawn bold, and bold advances run about a tenth wider than
/// the regular widths in [`estimate_char_units`].
const BOLD_ESTIMATE_SCALE: f32 = 1.1;

/// Width of `text` at `font_size`, from real metrics when available and a
/// per-character estimate for bold text otherwise.
pub fn measure_text_width_px(text: &str, font_size: f32, font: Option<&FontMetrics>) -> f32 {
    font.and_then(|font| font.measure(text, font_size))
        .unwrap_or_else(|| estimate_text_width_units(text) * BOLD_ESTIMATE_SCALE * font_size)
}

/// Regular-weight advance of one character, in ems.
fn estimate_char_units(ch: char) -> f32 {
    if ch.is_whitespace() {
        0.25
    } else if ch.is_ascii_alphanumeric() {
        0.6
    } else if ch.is_ascii() {
        0.35
    } else if matches!(
        ch as u32,
        0x1100..=0x11FF | 0x3130..=0x318F | 0xAC00..=0xD7AF
            | 0x4E00..=0x9FFF | 0x3040..=0x30FF | 0x31F0..=0x31FF
    ) {
        1.0
    } else {
        0.9
    }
}

fn estimate_text_width_units(text: &str) -> f32 {
    text.chars()
        .filter(|ch| *ch != '\n')
        .map(estimate_char_units)
        .sum()
}

fn family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}
