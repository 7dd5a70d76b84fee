//! Per-event layout: position groups, line wrapping, alignment, direction
//! (spec §4.3).
//!
//! No direct teacher counterpart exists (the teacher's current renderer
//! lays out CSS boxes instead of SSB position groups), so this module is
//! built fresh against the spec, following the teacher's general shape of a
//! layout pass producing absolute per-segment boxes before rasterization
//! (`FrameLayoutPass` in the teacher's `src/renderer.rs`).

use crate::math::Point2;
use crate::script::Direction;
use crate::text::FontShaper;

/// One drawable item's size and offset within its line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryBox {
    pub off_x: f32,
    pub off_y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Default)]
pub struct Line {
    pub geometries: Vec<GeometryBox>,
    pub width: f32,
    pub height: f32,
    /// Spacing appended after this line once it is closed (external
    /// leading / font-space, per spec §4.3 "Wrapping").
    pub spacing: f32,
}

#[derive(Debug, Clone, Default)]
pub struct PositionGroup {
    pub lines: Vec<Line>,
    pub width: f32,
    pub height: f32,
}

impl PositionGroup {
    fn recompute_totals(&mut self, direction: Direction) {
        match direction {
            Direction::Ltr | Direction::Rtl => {
                self.width = self.lines.iter().map(|l| l.width).fold(0.0, f32::max);
                self.height = self.lines.iter().map(|l| l.height + l.spacing).sum();
            }
            Direction::Ttb => {
                self.width = self.lines.iter().map(|l| l.width + l.spacing).sum();
                self.height = self.lines.iter().map(|l| l.height).fold(0.0, f32::max);
            }
        }
    }
}

/// A single word: optional leading spaces plus a non-space run, per spec
/// §4.3's "word = optional leading spaces + non-space run" sizing rule.
pub(crate) fn split_words(text: &str) -> Vec<&str> {
    let mut words = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        while i < bytes.len() && bytes[i] == b' ' {
            i += 1;
        }
        while i < bytes.len() && bytes[i] != b' ' {
            i += 1;
        }
        if i > start {
            words.push(&text[start..i]);
        } else {
            break;
        }
    }
    words
}

/// Builder that accumulates position groups/lines/geometries as the
/// rasterizer's sizing pass walks an event's object sequence.
pub struct Layouter {
    pub groups: Vec<PositionGroup>,
    direction: Direction,
    wrap_width: f32,
    wrap_height: f32,
    margin_h: f32,
    margin_v: f32,
}

impl Layouter {
    pub fn new(direction: Direction, wrap_width: f32, wrap_height: f32, margin_h: f32, margin_v: f32) -> Self {
        Self {
            groups: vec![PositionGroup::default()],
            direction,
            wrap_width,
            wrap_height,
            margin_h,
            margin_v,
        }
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    /// Re-derives the wrap limits from a `margin` tag encountered mid-event
    /// (spec §4.3: "Wrap limits are computed from the frame and
    /// horizontal/vertical margins"). Only affects geometries added after
    /// the call; already-closed lines keep their recorded widths.
    pub fn set_wrap(&mut self, wrap_width: f32, wrap_height: f32) {
        self.wrap_width = wrap_width;
        self.wrap_height = wrap_height;
    }

    pub fn begin_position_group(&mut self) {
        self.groups.push(PositionGroup::default());
    }

    fn current_group(&mut self) -> &mut PositionGroup {
        self.groups.last_mut().unwrap()
    }

    /// Adds a point/path geometry of extents `(width, height)` to the
    /// current line, wrapping first if needed.
    pub fn add_geometry_box(&mut self, width: f32, height: f32, line_spacing: f32) {
        let width = width.max(0.0);
        let height = height.max(0.0);
        self.wrap_if_needed(width, height, line_spacing);
        let direction = self.direction;
        let group = self.current_group();
        let line = group.lines.last_mut().unwrap();
        let off_x = match direction {
            Direction::Ltr | Direction::Rtl => line.width,
            Direction::Ttb => 0.0,
        };
        let off_y = match direction {
            Direction::Ltr | Direction::Rtl => 0.0,
            Direction::Ttb => line.height,
        };
        line.geometries.push(GeometryBox { off_x, off_y, width, height });
        match direction {
            Direction::Ltr | Direction::Rtl => {
                line.width += width;
                line.height = line.height.max(height);
            }
            Direction::Ttb => {
                line.height += height;
                line.width = line.width.max(width);
            }
        }
    }

    fn wrap_if_needed(&mut self, width: f32, height: f32, line_spacing: f32) {
        let direction = self.direction;
        let (limit, extent, current) = {
            let group = self.current_group();
            if group.lines.is_empty() {
                group.lines.push(Line::default());
            }
            let line = group.lines.last().unwrap();
            match direction {
                Direction::Ltr | Direction::Rtl => (self.wrap_width, width, line.width),
                Direction::Ttb => (self.wrap_height, height, line.height),
            }
        };
        let non_empty = !self.current_group().lines.last().unwrap().geometries.is_empty();
        if limit > 0.0 && non_empty && current + extent > limit {
            self.close_line(line_spacing);
        }
    }

    fn close_line(&mut self, spacing: f32) {
        let group = self.current_group();
        group.lines.last_mut().unwrap().spacing = spacing;
        group.lines.push(Line::default());
    }

    /// Lays out a text run line-by-line (already split on `\n` by the
    /// caller), producing one `Line` per wrapped sub-line.
    pub fn add_text(&mut self, shaper: &dyn FontShaper, text: &str, font_space_h: f32, font_space_v: f32) {
        self.add_text_atoms(shaper, text, font_space_h, font_space_v);
    }

    /// Same as `add_text`, but also returns the source substring of each
    /// atom (word for LTR/RTL, single character for TTB) in the order its
    /// geometry box was added, so a caller building a draw-time atom plan
    /// alongside the sizing pass doesn't need to re-derive the same split.
    pub fn add_text_atoms(
        &mut self,
        shaper: &dyn FontShaper,
        text: &str,
        font_space_h: f32,
        font_space_v: f32,
    ) -> Vec<String> {
        let metrics = shaper.metrics();
        let line_spacing = metrics.external_lead + font_space_v;
        let mut atoms = Vec::new();

        match self.direction {
            Direction::Ltr | Direction::Rtl => {
                for word in split_words(text) {
                    let width = shaper.text_width(word) + font_space_h * (word.chars().count().max(1) - 1) as f32;
                    self.add_geometry_box(width, metrics.height, line_spacing);
                    atoms.push(word.to_string());
                }
            }
            Direction::Ttb => {
                for ch in text.chars() {
                    if ch == ' ' {
                        continue;
                    }
                    let width = shaper.advance_width(ch);
                    self.add_geometry_box(width, metrics.height + font_space_v, line_spacing);
                    atoms.push(ch.to_string());
                }
            }
        }
        atoms
    }

    /// Forces the current line closed even if `\n` was encountered mid-word,
    /// per spec §3 "`\n` inserts a newline" — used by the renderer to split
    /// a `Geometry::Text` string's embedded newlines into separate lines
    /// before handing each to `add_text_atoms`.
    pub fn force_newline(&mut self, spacing: f32) {
        if !self.current_group().lines.last().unwrap_or(&Line::default()).geometries.is_empty() {
            self.close_line(spacing);
        }
    }

    /// Computes `width`/`height` totals for every group without discarding
    /// empty lines/groups, so a caller correlating this tree against a
    /// second pass by raw index (the renderer's drawing pass) sees the same
    /// indices it saw while the tree was being built.
    pub fn compute_totals(&mut self) {
        let direction = self.direction;
        for group in &mut self.groups {
            group.recompute_totals(direction);
        }
    }

    pub fn finish(mut self) -> Vec<PositionGroup> {
        let direction = self.direction;
        for group in &mut self.groups {
            group.lines.retain(|l| !l.geometries.is_empty());
            group.recompute_totals(direction);
        }
        self.groups.retain(|g| !g.lines.is_empty());
        self.groups
    }
}

/// Splits a `Geometry::Text` string into the same atom sequence
/// `Layouter::add_text_atoms` would produce (words for LTR/RTL, characters
/// for TTB), flattening across embedded `\n`s. Used by the rasterizer's
/// drawing pass to walk the same atoms the sizing pass already placed into
/// `PositionGroup`/`Line` boxes, without redoing any wrap arithmetic.
pub fn text_atoms(direction: Direction, text: &str) -> Vec<String> {
    let mut atoms = Vec::new();
    for line in text.split('\n') {
        match direction {
            Direction::Ltr | Direction::Rtl => {
                atoms.extend(split_words(line).into_iter().map(str::to_string));
            }
            Direction::Ttb => {
                atoms.extend(line.chars().filter(|&c| c != ' ').map(|c| c.to_string()));
            }
        }
    }
    atoms
}

/// Decomposes the numpad `align` value (1..9) into horizontal/vertical
/// components, per spec §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VAlign {
    Bottom,
    Middle,
    Top,
}

pub fn decompose_align(align: u8) -> (HAlign, VAlign) {
    let align = align.clamp(1, 9) - 1;
    let h = match align % 3 {
        0 => HAlign::Left,
        1 => HAlign::Center,
        _ => HAlign::Right,
    };
    let v = match align / 3 {
        0 => VAlign::Bottom,
        1 => VAlign::Middle,
        _ => VAlign::Top,
    };
    (h, v)
}

/// Computes the anchor offset of `line` within `group`, per spec §4.3
/// ("TTB centers horizontally per line; LTR/RTL offsets vertically by total
/// group size").
///
/// Each direction has one "group axis" (stacked lines are positioned as one
/// block relative to the anchor: `cumulative_before` plus a pivot shift of
/// the *group's* extent along that axis) and one "per-line axis" (each line
/// is aligned independently of its siblings). Expanding "pivot shift of the
/// group's extent, then re-center this line within the group's extent"
/// algebraically cancels the group term, leaving a shift of the *line's own*
/// extent — e.g. Ltr/Rtl center: `-group.width/2 + (group.width-line.width)/2
/// == -line.width/2`. That is what actually centers every line (regardless
/// of its own width) on the same anchor point instead of only the widest one.
pub fn line_alignment_offset(
    group: &PositionGroup,
    line: &Line,
    align: u8,
    direction: Direction,
    cumulative_before: f32,
) -> Point2 {
    let (h, v) = decompose_align(align);

    match direction {
        Direction::Ltr | Direction::Rtl => {
            let x = match h {
                HAlign::Left => 0.0,
                HAlign::Center => -line.width / 2.0,
                HAlign::Right => -line.width,
            };
            let y = match v {
                VAlign::Top => cumulative_before,
                VAlign::Middle => cumulative_before - group.height / 2.0,
                VAlign::Bottom => cumulative_before - group.height,
            };
            Point2::new(x, y)
        }
        Direction::Ttb => {
            let x = match h {
                HAlign::Left => cumulative_before,
                HAlign::Center => cumulative_before - group.width / 2.0,
                HAlign::Right => cumulative_before - group.width,
            };
            // TTB centers horizontally per line (spec §4.3).
            let y = match v {
                VAlign::Top => 0.0,
                VAlign::Middle => -line.height / 2.0,
                VAlign::Bottom => -line.height,
            };
            Point2::new(x, y)
        }
    }
}

/// Resolves the drawing anchor for an "auto" position (spec §4.3 "Auto
/// position"): derived from frame dimensions, alignment and margins.
pub fn auto_position(
    frame_width: f32,
    frame_height: f32,
    align: u8,
    margin_h: f32,
    margin_v: f32,
) -> Point2 {
    let (h, v) = decompose_align(align);
    let x = match h {
        HAlign::Left => margin_h,
        HAlign::Center => frame_width / 2.0,
        HAlign::Right => frame_width - margin_h,
    };
    let y = match v {
        VAlign::Top => margin_v,
        VAlign::Middle => frame_height / 2.0,
        VAlign::Bottom => frame_height - margin_v,
    };
    Point2::new(x, y)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::text::{FontRequest, SyntheticShaper};

    fn shaper() -> SyntheticShaper {
        SyntheticShaper::new(FontRequest {
            family: "Arial",
            style: crate::script::FontStyle {
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
    fn wraps_when_exceeding_width() {
        let shaper = shaper();
        let mut layouter = Layouter::new(Direction::Ltr, 50.0, 0.0, 0.0, 0.0);
        layouter.add_text(&shaper, "AAAA BBBB CCCC", 0.0, 0.0);
        let groups = layouter.finish();
        assert!(groups[0].lines.len() > 1);
    }

    #[test]
    fn no_wrap_limit_keeps_single_line() {
        let shaper = shaper();
        let mut layouter = Layouter::new(Direction::Ltr, 0.0, 0.0, 0.0, 0.0);
        layouter.add_text(&shaper, "AAAA BBBB CCCC", 0.0, 0.0);
        let groups = layouter.finish();
        assert_eq!(groups[0].lines.len(), 1);
    }

    #[test]
    fn align_decomposition_covers_numpad() {
        assert_eq!(decompose_align(1), (HAlign::Left, VAlign::Bottom));
        assert_eq!(decompose_align(5), (HAlign::Center, VAlign::Middle));
        assert_eq!(decompose_align(9), (HAlign::Right, VAlign::Top));
    }

    #[test]
    fn direction_symmetry_ltr_rtl_same_total_width() {
        let shaper = shaper();
        let mut ltr = Layouter::new(Direction::Ltr, 0.0, 0.0, 0.0, 0.0);
        ltr.add_text(&shaper, "AB", 0.0, 0.0);
        let ltr_groups = ltr.finish();

        let mut rtl = Layouter::new(Direction::Rtl, 0.0, 0.0, 0.0, 0.0);
        rtl.add_text(&shaper, "AB", 0.0, 0.0);
        let rtl_groups = rtl.finish();

        assert!((ltr_groups[0].width - rtl_groups[0].width).abs() < 1e-3);
    }

    #[test]
    fn new_position_group_starts_fresh() {
        let shaper = shaper();
        let mut layouter = Layouter::new(Direction::Ltr, 0.0, 0.0, 0.0, 0.0);
        layouter.add_text(&shaper, "A", 0.0, 0.0);
        layouter.begin_position_group();
        layouter.add_text(&shaper, "B", 0.0, 0.0);
        let groups = layouter.finish();
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn center_align_centers_every_line_on_the_same_anchor_regardless_of_width() {
        // A short line and a long line in the same group must both end up
        // centered on the group's anchor, not just the widest one.
        let narrow = Line { geometries: vec![], width: 40.0, height: 10.0, spacing: 0.0 };
        let wide = Line { geometries: vec![], width: 100.0, height: 10.0, spacing: 0.0 };
        let group = PositionGroup { lines: vec![narrow.clone(), wide.clone()], width: 100.0, height: 20.0 };

        let narrow_offset = line_alignment_offset(&group, &narrow, 5, Direction::Ltr, 0.0);
        let wide_offset = line_alignment_offset(&group, &wide, 5, Direction::Ltr, 10.0);

        // Each line's own center (offset + width/2) must land on the anchor (x=0).
        assert!((narrow_offset.x + narrow.width / 2.0).abs() < 1e-4);
        assert!((wide_offset.x + wide.width / 2.0).abs() < 1e-4);
    }

    #[test]
    fn right_align_ends_line_exactly_at_anchor() {
        let line = Line { geometries: vec![], width: 60.0, height: 10.0, spacing: 0.0 };
        let group = PositionGroup { lines: vec![line.clone()], width: 60.0, height: 10.0 };
        let offset = line_alignment_offset(&group, &line, 6, Direction::Ltr, 0.0);
        // Right-aligned: the line's right edge (offset.x + width) sits at the anchor.
        assert!((offset.x + line.width).abs() < 1e-4);
    }
}
