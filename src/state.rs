//! Mutable render-state snapshot and the tag-application state machine
//! (spec §4.2). Grounded structurally on the teacher's tagged-sum approach
//! to style state (no downcasting — see `DESIGN.md`/spec §9 "Deep cast
//! chains"), with the two Open Question formulas reproduced bit-exactly
//! (rotation double negation in `crate::math::Matrix3::rotate_xy`; the
//! texture x/y swap in `apply_animate_numeric` below).

use crate::expr::{self, Vars};
use crate::math::Matrix3;
use crate::script::{
    CornerSet, DrawMode, Direction, FontStyle, KaraokeMode, LineCap, LineDash, LineJoin, Rgb, StencilMode, Tag,
    WrapStyle,
};

#[derive(Debug, Clone, PartialEq)]
pub struct TextureState {
    pub filename: Option<String>,
    pub x: f32,
    pub y: f32,
    pub wrap: WrapStyle,
}

impl Default for TextureState {
    fn default() -> Self {
        Self {
            filename: None,
            x: 0.0,
            y: 0.0,
            wrap: WrapStyle::Clamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KaraokeState {
    /// `-1` (sentinel) means karaoke has not been engaged for this event.
    pub start_ms: i64,
    pub duration_ms: u32,
    pub color: Rgb,
    pub mode: KaraokeMode,
}

impl Default for KaraokeState {
    fn default() -> Self {
        Self {
            start_ms: -1,
            duration_ms: 0,
            color: Rgb::RED,
            mode: KaraokeMode::Fill,
        }
    }
}

/// Mutable snapshot of every tag-controlled field, per spec §3 "Render
/// state" and the initial defaults in spec §9.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderState {
    pub font_family: String,
    pub font_style: FontStyle,
    pub font_size: f32,
    pub font_space_h: f32,
    pub font_space_v: f32,
    pub line_width: f32,
    pub line_join: LineJoin,
    pub line_cap: LineCap,
    pub line_dash: Option<LineDash>,
    pub mode: DrawMode,
    pub deform: Option<(String, String)>,
    /// `t` fed to the deform formulas (spec §3 "deform (two expressions +
    /// progress)"). Reset to 0 whenever `deform` is applied directly; tracks
    /// the enclosing `animate`'s `p` continuously when `deform` is one of
    /// its inner tags (`original_source/src/RenderState.hpp`: the formulas
    /// are latched once but `deform_progress` is re-assigned every
    /// `eval_tag` call).
    pub deform_progress: f32,
    /// `None` means "auto" (spec §3: sentinel position).
    pub position: Option<(f32, f32)>,
    pub align: u8,
    pub margin_h: f32,
    pub margin_v: f32,
    pub direction: Direction,
    pub matrix: Matrix3,
    pub colors: CornerSet<Rgb>,
    pub alphas: CornerSet<u8>,
    pub line_colors: CornerSet<Rgb>,
    pub line_alphas: CornerSet<u8>,
    pub texture: TextureState,
    pub blend: crate::script::BlendTag,
    pub blur_h: f32,
    pub blur_v: f32,
    pub stencil: StencilMode,
    pub karaoke: KaraokeState,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            font_family: "Arial".to_string(),
            font_style: FontStyle {
                bold: false,
                italic: false,
                underline: false,
                strikeout: false,
            },
            font_size: 30.0,
            font_space_h: 0.0,
            font_space_v: 0.0,
            line_width: 2.0,
            line_join: LineJoin::Round,
            line_cap: LineCap::Round,
            line_dash: None,
            mode: DrawMode::Fill,
            deform: None,
            deform_progress: 0.0,
            position: None,
            align: 2,
            margin_h: 0.0,
            margin_v: 0.0,
            direction: Direction::Ltr,
            matrix: Matrix3::IDENTITY,
            colors: CornerSet::Single(Rgb::WHITE),
            alphas: CornerSet::Single(255),
            line_colors: CornerSet::Single(Rgb::BLACK),
            line_alphas: CornerSet::Single(255),
            texture: TextureState::default(),
            blend: crate::script::BlendTag::Over,
            blur_h: 0.0,
            blur_v: 0.0,
            stencil: StencilMode::Off,
            karaoke: KaraokeState::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyResult {
    pub position_changed: bool,
    pub stencil_changed: bool,
}

impl RenderState {
    /// Applies one top-level tag. `inner_ms`/`inner_duration` are the
    /// event-relative clock used by `fade` (ignored inside `animate`, which
    /// calls `apply_animate_tag` instead).
    pub fn apply(&mut self, tag: &Tag, inner_ms: u32, inner_duration: u32) -> ApplyResult {
        let mut result = ApplyResult::default();
        match tag {
            Tag::FontFamily(f) => self.font_family = f.clone(),
            Tag::FontStyle(s) => self.font_style = s.clone(),
            Tag::FontSize(s) => self.font_size = s.max(0.0),
            Tag::FontSpace { h, v } => {
                self.font_space_h = *h;
                self.font_space_v = *v;
            }
            Tag::LineWidth(w) => self.line_width = w.max(0.0),
            Tag::LineStyle { join, cap } => {
                self.line_join = *join;
                self.line_cap = *cap;
            }
            Tag::LineDash(d) => self.line_dash = Some(d.clone()),
            Tag::Mode(m) => self.mode = *m,
            Tag::Deform { expr_x, expr_y } => {
                self.deform = Some((expr_x.clone(), expr_y.clone()));
                self.deform_progress = 0.0;
            }
            Tag::Position { x, y } => {
                result.position_changed = true;
                self.position = if *x == crate::script::SENTINEL && *y == crate::script::SENTINEL {
                    None
                } else {
                    Some((*x, *y))
                };
            }
            Tag::Align(a) => self.align = *a,
            Tag::Margin { h, v } => {
                self.margin_h = *h;
                self.margin_v = *v;
            }
            Tag::Direction(d) => self.direction = *d,
            Tag::Identity => self.matrix = Matrix3::IDENTITY,
            Tag::Translate { x, y } => self.matrix = self.matrix.multiply(&Matrix3::translate(*x, *y)),
            Tag::Scale { x, y } => self.matrix = self.matrix.multiply(&Matrix3::scale(*x, *y)),
            Tag::Rotate { x, y } => self.matrix = self.matrix.multiply(&Matrix3::rotate_xy(*x, *y)),
            Tag::RotateZ(angle) => self.matrix = self.matrix.multiply(&Matrix3::rotate_z(*angle)),
            Tag::Shear { x, y } => self.matrix = self.matrix.multiply(&Matrix3::shear(*x, *y)),
            Tag::Transform([a, b, c, d, tx, ty]) => {
                self.matrix = self.matrix.multiply(&Matrix3 {
                    a: *a,
                    b: *b,
                    c: *c,
                    d: *d,
                    tx: *tx,
                    ty: *ty,
                })
            }
            Tag::Color(c) => self.colors = c.clone(),
            Tag::Alpha(a) => self.alphas = a.clone(),
            Tag::LineColor(c) => self.line_colors = c.clone(),
            Tag::LineAlpha(a) => self.line_alphas = a.clone(),
            Tag::Texture(name) => self.texture.filename = Some(name.clone()),
            Tag::TexFill { x, y, wrap } => {
                self.texture.x = *x;
                self.texture.y = *y;
                self.texture.wrap = *wrap;
            }
            Tag::Blend(b) => self.blend = *b,
            Tag::Blur { h, v } => {
                self.blur_h = h.max(0.0);
                self.blur_v = v.max(0.0);
            }
            Tag::Stencil(mode) => {
                if *mode != self.stencil {
                    result.stencil_changed = true;
                }
                self.stencil = *mode;
            }
            Tag::Fade { in_ms, out_ms } => self.apply_fade(*in_ms, *out_ms, inner_ms, inner_duration),
            Tag::Animate { start, end, progress_expr, inner } => {
                let r = self.apply_animate_tag(*start, *end, progress_expr, inner, inner_ms, inner_duration);
                result.stencil_changed |= r.stencil_changed;
            }
            Tag::KaraokeDuration(d) => {
                if self.karaoke.start_ms < 0 {
                    self.karaoke.start_ms = 0;
                } else {
                    self.karaoke.start_ms += self.karaoke.duration_ms as i64;
                }
                self.karaoke.duration_ms = *d;
            }
            Tag::KaraokeSet(t) => {
                self.karaoke.start_ms = *t as i64;
                self.karaoke.duration_ms = 0;
            }
            Tag::KaraokeColor(c) => self.karaoke.color = *c,
            Tag::KaraokeMode(m) => self.karaoke.mode = *m,
        }
        result
    }

    fn apply_fade(&mut self, in_ms: u32, out_ms: u32, inner_ms: u32, inner_duration: u32) {
        let p = if inner_ms < in_ms {
            if in_ms == 0 {
                1.0
            } else {
                inner_ms as f32 / in_ms as f32
            }
        } else if inner_duration.saturating_sub(inner_ms) < out_ms {
            if out_ms == 0 {
                1.0
            } else {
                (inner_duration - inner_ms) as f32 / out_ms as f32
            }
        } else {
            1.0
        };
        if p >= 1.0 {
            return;
        }
        self.alphas = self.alphas.map(|a| ((a as f32) * p).round().clamp(0.0, 255.0) as u8);
        self.line_alphas = self.line_alphas.map(|a| ((a as f32) * p).round().clamp(0.0, 255.0) as u8);
    }

    fn apply_animate_tag(
        &mut self,
        start: i64,
        end: i64,
        progress_expr: &str,
        inner: &[Tag],
        inner_ms: u32,
        inner_duration: u32,
    ) -> ApplyResult {
        const SENTINEL: i64 = i64::MAX;
        let (window_start, window_end) = if start == SENTINEL && end == SENTINEL {
            (0i64, inner_duration as i64)
        } else {
            let resolve = |v: i64| -> i64 {
                if v < 0 {
                    inner_duration as i64 + v
                } else {
                    v
                }
            };
            (resolve(start), resolve(end))
        };

        let span = (window_end - window_start).max(1) as f32;
        let raw_p = ((inner_ms as i64 - window_start) as f32 / span).clamp(0.0, 1.0);

        let p = if !progress_expr.is_empty() {
            expr::eval(progress_expr, Vars { t: raw_p as f64, x: 0.0, y: 0.0 })
                .map(|v| v as f32)
                .unwrap_or(raw_p)
        } else {
            raw_p
        };

        let mut result = ApplyResult::default();
        for tag in inner {
            result.stencil_changed |= self.apply_animate_inner(tag, p);
        }
        result
    }

    /// Applies one tag inside an `animate` block at progress `p`: numeric
    /// tags interpolate, discrete tags switch at `p >= 1`, and `fade`/nested
    /// `animate`/`karaoke(duration|set)` are ignored (spec §4.2 step 4).
    fn apply_animate_inner(&mut self, tag: &Tag, p: f32) -> bool {
        match tag {
            Tag::FontSize(s) => self.font_size = crate::math::lerp(self.font_size, s.max(0.0), p),
            Tag::FontSpace { h, v } => {
                self.font_space_h = crate::math::lerp(self.font_space_h, *h, p);
                self.font_space_v = crate::math::lerp(self.font_space_v, *v, p);
            }
            Tag::LineWidth(w) => self.line_width = crate::math::lerp(self.line_width, w.max(0.0), p),
            Tag::Margin { h, v } => {
                self.margin_h = crate::math::lerp(self.margin_h, *h, p);
                self.margin_v = crate::math::lerp(self.margin_v, *v, p);
            }
            Tag::Blur { h, v } => {
                self.blur_h = crate::math::lerp(self.blur_h, h.max(0.0), p);
                self.blur_v = crate::math::lerp(self.blur_v, v.max(0.0), p);
            }
            Tag::Color(target) => self.colors = lerp_corner_rgb(&self.colors, target, p),
            Tag::Alpha(target) => self.alphas = lerp_corner_u8(&self.alphas, target, p),
            Tag::LineColor(target) => self.line_colors = lerp_corner_rgb(&self.line_colors, target, p),
            Tag::LineAlpha(target) => self.line_alphas = lerp_corner_u8(&self.line_alphas, target, p),
            Tag::Translate { x, y } => {
                let delta = Matrix3::translate(*x * p, *y * p);
                self.matrix = self.matrix.multiply(&delta);
            }
            Tag::Scale { x, y } => {
                // diagonal-like elements use `1 + p*(v-1)`, per spec §4.2.
                let sx = 1.0 + p * (x - 1.0);
                let sy = 1.0 + p * (y - 1.0);
                self.matrix = self.matrix.multiply(&Matrix3::scale(sx, sy));
            }
            Tag::Rotate { x, y } => {
                self.matrix = self.matrix.multiply(&Matrix3::rotate_xy(x * p, y * p));
            }
            Tag::RotateZ(angle) => {
                self.matrix = self.matrix.multiply(&Matrix3::rotate_z(angle * p));
            }
            Tag::TexFill { x, y, wrap: _ } => {
                // Reproduces the original's x/y transcription bug bit-exactly
                // (see DESIGN.md "Texture animation x/y swap"): `texture_x`
                // is updated correctly first, then `texture_y` is advanced
                // using `texfill.x` and the already-updated `texture_x`
                // instead of `texfill.y`/`texture_y`.
                self.texture.x = crate::math::lerp(self.texture.x, *x, p);
                self.texture.y += p * (x - self.texture.x);
                let _ = y;
            }
            Tag::FontFamily(v) => {
                if p >= 1.0 {
                    self.font_family = v.clone();
                }
            }
            Tag::FontStyle(v) => {
                if p >= 1.0 {
                    self.font_style = v.clone();
                }
            }
            Tag::Mode(v) => {
                if p >= 1.0 {
                    self.mode = *v;
                }
            }
            Tag::LineStyle { join, cap } => {
                if p >= 1.0 {
                    self.line_join = *join;
                    self.line_cap = *cap;
                }
            }
            Tag::Align(v) => {
                if p >= 1.0 {
                    self.align = *v;
                }
            }
            Tag::Direction(v) => {
                if p >= 1.0 {
                    self.direction = *v;
                }
            }
            Tag::Texture(v) => {
                if p >= 1.0 {
                    self.texture.filename = Some(v.clone());
                }
            }
            Tag::Blend(v) => {
                if p >= 1.0 {
                    self.blend = *v;
                }
            }
            Tag::Stencil(mode) => {
                if p >= 1.0 && *mode != self.stencil {
                    self.stencil = *mode;
                    return true;
                }
            }
            Tag::KaraokeColor(v) => {
                if p >= 1.0 {
                    self.karaoke.color = *v;
                }
            }
            Tag::Deform { expr_x, expr_y } => {
                // Unlike the other animated tags, the formulas themselves
                // don't interpolate toward a target: they're latched as soon
                // as the inner tag is seen, and only `deform_progress` tracks
                // `p` continuously for the remainder of the animate window.
                self.deform = Some((expr_x.clone(), expr_y.clone()));
                self.deform_progress = p;
            }
            Tag::Identity | Tag::Shear { .. } | Tag::Transform(_) | Tag::Position { .. } | Tag::LineDash(_) => {
                // Not enumerated by spec §4.2's animate rules; applied
                // directly as a discrete switch at p >= 1 for consistency.
                if p >= 1.0 {
                    self.apply(tag, 0, 0);
                }
            }
            // Explicitly ignored inside animate per spec §4.2 step 4.
            Tag::Fade { .. } | Tag::Animate { .. } | Tag::KaraokeDuration(_) | Tag::KaraokeSet(_) => {}
            Tag::KaraokeMode(_) => {}
        }
        false
    }
}

fn lerp_corner_rgb(from: &CornerSet<Rgb>, to: &CornerSet<Rgb>, p: f32) -> CornerSet<Rgb> {
    let n = match to {
        CornerSet::Single(_) => 1,
        CornerSet::Quad(_) => 4,
    };
    let values: Vec<Rgb> = (0..n)
        .map(|i| {
            let a = from.get(i.min(match from {
                CornerSet::Single(_) => 0,
                CornerSet::Quad(_) => 3,
            }));
            let b = to.get(i);
            Rgb {
                r: crate::math::lerp(a.r as f32, b.r as f32, p).round().clamp(0.0, 255.0) as u8,
                g: crate::math::lerp(a.g as f32, b.g as f32, p).round().clamp(0.0, 255.0) as u8,
                b: crate::math::lerp(a.b as f32, b.b as f32, p).round().clamp(0.0, 255.0) as u8,
            }
        })
        .collect();
    crate::script::corner_set_from_values(&values)
}

fn lerp_corner_u8(from: &CornerSet<u8>, to: &CornerSet<u8>, p: f32) -> CornerSet<u8> {
    let n = match to {
        CornerSet::Single(_) => 1,
        CornerSet::Quad(_) => 4,
    };
    let values: Vec<u8> = (0..n)
        .map(|i| {
            let a = from.get(i.min(match from {
                CornerSet::Single(_) => 0,
                CornerSet::Quad(_) => 3,
            }));
            let b = to.get(i);
            crate::math::lerp(a as f32, b as f32, p).round().clamp(0.0, 255.0) as u8
        })
        .collect();
    crate::script::corner_set_from_values(&values)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::script::BlendTag;

    #[test]
    fn position_tag_sets_changed_flag() {
        let mut state = RenderState::default();
        let r = state.apply(&Tag::Position { x: 10.0, y: 20.0 }, 0, 1000);
        assert!(r.position_changed);
        assert_eq!(state.position, Some((10.0, 20.0)));
    }

    #[test]
    fn other_tags_do_not_set_position_changed() {
        let mut state = RenderState::default();
        let r = state.apply(&Tag::Blend(BlendTag::Add), 0, 1000);
        assert!(!r.position_changed);
    }

    #[test]
    fn fade_monotonic_alpha() {
        let mut before = RenderState::default();
        before.apply(&Tag::Fade { in_ms: 200, out_ms: 200 }, 100, 1000);
        let a_100 = before.alphas.get(0);

        let mut at_start = RenderState::default();
        at_start.apply(&Tag::Fade { in_ms: 200, out_ms: 200 }, 0, 1000);
        let a_0 = at_start.alphas.get(0);

        assert!(a_100 >= a_0);
    }

    #[test]
    fn fade_is_noop_in_steady_state() {
        let mut state = RenderState::default();
        state.apply(&Tag::Fade { in_ms: 200, out_ms: 200 }, 500, 1000);
        assert_eq!(state.alphas.get(0), 255);
    }

    #[test]
    fn karaoke_duration_chains_starts() {
        let mut state = RenderState::default();
        state.apply(&Tag::KaraokeDuration(500), 0, 1000);
        assert_eq!(state.karaoke.start_ms, 0);
        state.apply(&Tag::KaraokeDuration(300), 0, 1000);
        assert_eq!(state.karaoke.start_ms, 500);
        assert_eq!(state.karaoke.duration_ms, 300);
    }

    #[test]
    fn deform_outside_animate_resets_progress() {
        let mut state = RenderState::default();
        state.deform_progress = 0.7;
        state.apply(
            &Tag::Deform {
                expr_x: "x".to_string(),
                expr_y: "y".to_string(),
            },
            0,
            1000,
        );
        assert_eq!(state.deform_progress, 0.0);
    }

    #[test]
    fn deform_inside_animate_tracks_progress() {
        let mut state = RenderState::default();
        state.apply(
            &Tag::Animate {
                start: 0,
                end: 1000,
                progress_expr: String::new(),
                inner: vec![Tag::Deform {
                    expr_x: "x".to_string(),
                    expr_y: "y+1".to_string(),
                }],
            },
            250,
            1000,
        );
        assert_eq!(state.deform, Some(("x".to_string(), "y+1".to_string())));
        assert!((state.deform_progress - 0.25).abs() < 1e-6);
    }

    #[test]
    fn animate_rotation_at_half_progress() {
        let mut state = RenderState::default();
        state.apply(
            &Tag::Animate {
                start: 0,
                end: 1000,
                progress_expr: String::new(),
                inner: vec![Tag::Rotate { x: 0.0, y: 360.0 }],
            },
            500,
            1000,
        );
        // At p=0.5 the rotation applied is 180 degrees about y.
        let expected = Matrix3::IDENTITY.multiply(&Matrix3::rotate_xy(0.0, 180.0));
        assert!((state.matrix.a - expected.a).abs() < 1e-3);
    }

    #[test]
    fn animate_rotate_z_reaches_90_and_180_degrees() {
        // Spec §8 scenario 5: `{ani=0,1000,(rz=360)}X` rotates 90° at
        // t=250ms and 180° at t=500ms.
        let mut at_250 = RenderState::default();
        at_250.apply(
            &Tag::Animate {
                start: 0,
                end: 1000,
                progress_expr: String::new(),
                inner: vec![Tag::RotateZ(360.0)],
            },
            250,
            1000,
        );
        let expected_90 = Matrix3::IDENTITY.multiply(&Matrix3::rotate_z(90.0));
        assert!((at_250.matrix.a - expected_90.a).abs() < 1e-3);
        assert!((at_250.matrix.b - expected_90.b).abs() < 1e-3);

        let mut at_500 = RenderState::default();
        at_500.apply(
            &Tag::Animate {
                start: 0,
                end: 1000,
                progress_expr: String::new(),
                inner: vec![Tag::RotateZ(360.0)],
            },
            500,
            1000,
        );
        let expected_180 = Matrix3::IDENTITY.multiply(&Matrix3::rotate_z(180.0));
        assert!((at_500.matrix.a - expected_180.a).abs() < 1e-3);
        assert!((at_500.matrix.b - expected_180.b).abs() < 1e-3);
    }
}
