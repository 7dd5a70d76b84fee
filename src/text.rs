//! Platform-neutral font shaper (spec §4.5).
//!
//! Font file discovery is an explicit Non-goal, so this module does not
//! shell out to FreeType/HarfBuzz (the teacher's `text-sys` crate, dropped
//! from the workspace — see `DESIGN.md`). Instead it generalizes the
//! teacher's own fallback strategy for glyphs it cannot shape normally: the
//! synthetic "tofu" box-glyph renderer in `src/text/face/tofu.rs`, which
//! draws a grid of hex digits representing a glyph index when no real
//! outline is available. Here that strategy becomes the *only* backend:
//! every character is shaped as a monospace cell containing a deterministic
//! outline keyed by its Unicode scalar value, which keeps layout (widths,
//! line metrics, wrapping) meaningful and exercisable without a system font
//! dependency.

use crate::math::{Point2, Rect2};
use crate::outline::Outline;
use crate::script::{CurvePoint, FontStyle, PathCommand};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineMetrics {
    pub height: f32,
    pub ascent: f32,
    pub descent: f32,
    pub internal_lead: f32,
    pub external_lead: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontRequest<'a> {
    pub family: &'a str,
    pub style: FontStyle,
    pub size: f32,
    pub rtl: bool,
}

/// A shaped, sized font face. Implementations work at a subpixel upscale
/// internally for precision (spec §4.5); this one works directly in the
/// requested `size` since its glyph geometry is procedural rather than
/// rasterized from a stored font.
pub trait FontShaper {
    fn metrics(&self) -> LineMetrics;
    fn text_width(&self, text: &str) -> f32;
    fn advance_width(&self, ch: char) -> f32;
    /// Appends `text`'s outline to `out`, with the origin at `(origin_x,
    /// origin_y)` (baseline-left).
    fn append_text_outline(&self, text: &str, origin: Point2, out: &mut Outline);
}

/// The builtin synthetic shaper: every glyph is a cell of size
/// `advance x height` containing a box outline derived from the character's
/// scalar value, generalizing `tofu.rs`'s notdef-glyph cell-grid strategy to
/// every character instead of only missing ones.
pub struct SyntheticShaper {
    size: f32,
    style: FontStyle,
}

impl SyntheticShaper {
    pub fn new(request: FontRequest<'_>) -> Self {
        Self {
            size: request.size.max(1.0),
            style: request.style,
        }
    }

    fn cell_width(&self) -> f32 {
        self.size * 0.6 * if self.style.bold { 1.15 } else { 1.0 }
    }
}

impl FontShaper for SyntheticShaper {
    fn metrics(&self) -> LineMetrics {
        let ascent = self.size * 0.8;
        let descent = self.size * 0.2;
        LineMetrics {
            height: ascent + descent,
            ascent,
            descent,
            internal_lead: self.size * 0.1,
            external_lead: self.size * 0.15,
        }
    }

    fn text_width(&self, text: &str) -> f32 {
        text.chars().map(|c| self.advance_width(c)).sum()
    }

    fn advance_width(&self, ch: char) -> f32 {
        if ch == ' ' {
            self.cell_width() * 0.5
        } else {
            self.cell_width()
        }
    }

    fn append_text_outline(&self, text: &str, origin: Point2, out: &mut Outline) {
        let mut x = origin.x;
        let metrics = self.metrics();
        for ch in text.chars() {
            let w = self.advance_width(ch);
            if ch != ' ' && !ch.is_whitespace() {
                append_glyph_cell(ch, Point2::new(x, origin.y), w, metrics, self.style, out);
            }
            x += w;
        }
    }
}

/// Draws one glyph cell: an outer box (scaled down slightly so adjacent
/// glyphs don't touch) with the character's codepoint rendered as a
/// thick-stroked binary tally inside it — deterministic, font-free, but
/// visually distinct per character so layout/rasterizer tests have
/// non-degenerate geometry to assert on.
fn append_glyph_cell(
    ch: char,
    baseline_origin: Point2,
    advance: f32,
    metrics: LineMetrics,
    style: FontStyle,
    out: &mut Outline,
) {
    let pad = advance * 0.08;
    let top = baseline_origin.y - metrics.ascent;
    let bottom = baseline_origin.y + metrics.descent;
    let left = baseline_origin.x + pad;
    let right = baseline_origin.x + advance - pad;

    let bbox = [
        CurvePoint { x: left, y: top },
        CurvePoint { x: right, y: top },
        CurvePoint { x: right, y: bottom },
        CurvePoint { x: left, y: bottom },
    ];
    let mut commands = vec![
        PathCommand::Move(bbox[0]),
        PathCommand::Line(bbox[1]),
        PathCommand::Line(bbox[2]),
        PathCommand::Line(bbox[3]),
        PathCommand::Close,
    ];

    // Encode the low 8 bits of the codepoint as filled horizontal bars,
    // msb at top, mirroring tofu.rs's hex-digit grid but at bit granularity.
    let code = ch as u32;
    let rows = 8;
    let row_h = (bottom - top) / rows as f32;
    for bit in 0..rows {
        if (code >> (rows - 1 - bit)) & 1 == 1 {
            let y0 = top + row_h * bit as f32 + row_h * 0.15;
            let y1 = top + row_h * (bit as f32 + 1.0) - row_h * 0.15;
            commands.push(PathCommand::Move(CurvePoint { x: left + pad, y: y0 }));
            commands.push(PathCommand::Line(CurvePoint { x: right - pad, y: y0 }));
            commands.push(PathCommand::Line(CurvePoint { x: right - pad, y: y1 }));
            commands.push(PathCommand::Line(CurvePoint { x: left + pad, y: y1 }));
            commands.push(PathCommand::Close);
        }
    }

    if style.underline {
        let y = bottom - row_h * 0.2;
        commands.push(PathCommand::Move(CurvePoint { x: left, y }));
        commands.push(PathCommand::Line(CurvePoint { x: right, y }));
        commands.push(PathCommand::Line(CurvePoint { x: right, y: y + row_h * 0.1 }));
        commands.push(PathCommand::Line(CurvePoint { x: left, y: y + row_h * 0.1 }));
        commands.push(PathCommand::Close);
    }

    let glyph = crate::outline::build_path(&commands);
    out.contours.extend(glyph.contours);
}

/// Bounding box of a shaped run, used by the layout engine for sizing.
pub fn text_extents(shaper: &dyn FontShaper, text: &str, origin: Point2) -> Rect2 {
    let mut outline = Outline::empty();
    shaper.append_text_outline(text, origin, &mut outline);
    outline.extents()
}

#[cfg(test)]
mod test {
    use super::*;

    fn shaper() -> SyntheticShaper {
        SyntheticShaper::new(FontRequest {
            family: "Arial",
            style: FontStyle {
                bold: false,
                italic: false,
                underline: false,
                strikeout: false,
            },
            size: 30.0,
            rtl: false,
        })
    }

    #[test]
    fn width_scales_with_length() {
        let s = shaper();
        assert!(s.text_width("AB") > s.text_width("A"));
        assert!((s.text_width("AA") - 2.0 * s.text_width("A")).abs() < 1e-3);
    }

    #[test]
    fn space_is_narrower_than_glyph() {
        let s = shaper();
        assert!(s.advance_width(' ') < s.advance_width('A'));
    }

    #[test]
    fn distinct_characters_produce_distinct_outlines() {
        let s = shaper();
        let mut a = Outline::empty();
        let mut b = Outline::empty();
        s.append_text_outline("A", Point2::ZERO, &mut a);
        s.append_text_outline("B", Point2::ZERO, &mut b);
        assert_ne!(a.contours.len(), b.contours.len());
    }
}
