//! Per-event rasterization: fill/stroke/texture/karaoke/stencil and the
//! separable box blur (spec §4.6, §4.8).
//!
//! The blur kernel style (row buffer, then column pass, normalized by the
//! kernel sum) follows the teacher's `src/rasterize/blur.rs`, though that
//! file implements a *Gaussian* blur; the box-blur math with fractional
//! edge weights below is authored fresh against spec §4.8 since the
//! teacher has no box-blur counterpart. The worker-thread fork-join follows
//! spec §5's row-stripe partition, one stripe per logical CPU, scoped so
//! every thread joins before the call returns.

use std::thread;

use crate::color::Rgba8;
use crate::math::Rect2;
use crate::outline::Outline;
use crate::script::{DrawMode, Rgb, StencilMode};

/// An RGBA tile plus its frame-space origin and render metadata, emitted
/// once per geometry (spec §4.6 "Emit the tile as (image, x, y, blend_mode,
/// fade_in, fade_out)").
#[derive(Debug, Clone)]
pub struct Tile {
    pub pixels: Vec<Rgba8>,
    pub width: usize,
    pub height: usize,
    pub x: i32,
    pub y: i32,
    pub blend: crate::script::BlendTag,
    pub fade_in_ms: u32,
    pub fade_out_ms: u32,
}

impl Tile {
    pub fn new(width: usize, height: usize, x: i32, y: i32, blend: crate::script::BlendTag) -> Self {
        Self {
            pixels: vec![Rgba8::TRANSPARENT; width * height],
            width,
            height,
            x,
            y,
            blend,
            fade_in_ms: 0,
            fade_out_ms: 0,
        }
    }

    pub fn get(&self, x: usize, y: usize) -> Rgba8 {
        self.pixels[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, p: Rgba8) {
        self.pixels[y * self.width + x] = p;
    }

    pub fn is_fully_transparent(&self) -> bool {
        self.pixels.iter().all(|p| p.a == 0)
    }
}

/// A solid colour or a 4-corner gradient sampled over an untransformed
/// extents rectangle (spec §4.6 "Fill colour").
#[derive(Debug, Clone, Copy)]
pub enum FillPattern {
    Solid { color: Rgb, alpha: u8 },
    Gradient { corners: [(Rgb, u8); 4], bounds: Rect2 },
}

impl FillPattern {
    pub fn sample(&self, x: f32, y: f32) -> Rgba8 {
        match *self {
            FillPattern::Solid { color, alpha } => premultiply(color, alpha),
            FillPattern::Gradient { corners, bounds } => {
                let w = bounds.width().max(1.0);
                let h = bounds.height().max(1.0);
                let u = ((x - bounds.min.x) / w).clamp(0.0, 1.0);
                let v = ((y - bounds.min.y) / h).clamp(0.0, 1.0);
                // corners ordered top-left, top-right, bottom-right, bottom-left.
                let (c0, a0) = corners[0];
                let (c1, a1) = corners[1];
                let (c2, a2) = corners[2];
                let (c3, a3) = corners[3];
                let top = lerp_rgba(c0, a0, c1, a1, u);
                let bottom = lerp_rgba(c3, a3, c2, a2, u);
                let (color, alpha) = lerp_rgba_pair(top, bottom, v);
                premultiply(color, alpha)
            }
        }
    }
}

fn lerp_rgba(a: Rgb, aa: u8, b: Rgb, ba: u8, t: f32) -> (Rgb, u8) {
    (
        Rgb {
            r: crate::math::lerp(a.r as f32, b.r as f32, t).round() as u8,
            g: crate::math::lerp(a.g as f32, b.g as f32, t).round() as u8,
            b: crate::math::lerp(a.b as f32, b.b as f32, t).round() as u8,
        },
        crate::math::lerp(aa as f32, ba as f32, t).round() as u8,
    )
}

fn lerp_rgba_pair(a: (Rgb, u8), b: (Rgb, u8), t: f32) -> (Rgb, u8) {
    lerp_rgba(a.0, a.1, b.0, b.1, t)
}

fn premultiply(color: Rgb, alpha: u8) -> Rgba8 {
    let a = alpha as u32;
    Rgba8::new(
        ((color.r as u32 * a) / 255) as u8,
        ((color.g as u32 * a) / 255) as u8,
        ((color.b as u32 * a) / 255) as u8,
        alpha,
    )
}

/// Fills every pixel inside `contours` (nonzero winding rule, scanline) with
/// `pattern`. `contours` are in tile-local pixel space.
pub fn fill_polygon(tile: &mut Tile, contours: &[Vec<crate::math::Point2>], pattern: &FillPattern, origin_x: f32, origin_y: f32) {
    for row in 0..tile.height {
        let y = row as f32 + 0.5;
        let mut crossings: Vec<(f32, i32)> = Vec::new();
        for contour in contours {
            for edge in contour.windows(2) {
                let (p0, p1) = (edge[0], edge[1]);
                if (p0.y <= y) != (p1.y <= y) {
                    let t = (y - p0.y) / (p1.y - p0.y);
                    let x = p0.x + (p1.x - p0.x) * t;
                    let winding = if p1.y > p0.y { 1 } else { -1 };
                    crossings.push((x, winding));
                }
            }
        }
        crossings.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

        let mut winding = 0;
        let mut span_start = None;
        for (x, w) in crossings {
            let was_inside = winding != 0;
            winding += w;
            let is_inside = winding != 0;
            if !was_inside && is_inside {
                span_start = Some(x);
            } else if was_inside && !is_inside {
                if let Some(start) = span_start.take() {
                    paint_span(tile, row, start, x, pattern, origin_x, origin_y);
                }
            }
        }
    }
}

fn paint_span(tile: &mut Tile, row: usize, x0: f32, x1: f32, pattern: &FillPattern, origin_x: f32, origin_y: f32) {
    let start = x0.floor().max(0.0) as usize;
    let end = (x1.ceil() as usize).min(tile.width);
    for col in start..end {
        let sample_x = col as f32 + 0.5;
        if sample_x < x0 || sample_x > x1 {
            continue;
        }
        let color = pattern.sample(sample_x + origin_x, row as f32 + 0.5 + origin_y);
        tile.set(col, row, color);
    }
}

/// Replaces the tile's alpha with its current alpha masked by `stencil`
/// (spec §4.6 "Stencil handling"). `mode` selects `inside`/`outside`;
/// `off`/`set`/`unset` are handled by the caller since they change whether
/// the tile is blended at all or how the stencil buffer itself is updated.
pub fn apply_stencil_mask(tile: &mut Tile, stencil: &StencilScratch, mode: StencilMode) {
    for y in 0..tile.height {
        let sy = tile.y + y as i32;
        for x in 0..tile.width {
            let sx = tile.x + x as i32;
            let s = stencil.sample(sx, sy);
            let idx = y * tile.width + x;
            let p = &mut tile.pixels[idx];
            let factor = match mode {
                StencilMode::Inside => s as f32 / 255.0,
                StencilMode::Outside => 1.0 - s as f32 / 255.0,
                _ => 1.0,
            };
            *p = p.scale_alpha(factor);
        }
    }
}

/// An A8 scratch surface accumulating shape masks across an event's drawing
/// (spec §4.6 "End of event" / glossary "Stencil").
pub struct StencilScratch {
    pub width: usize,
    pub height: usize,
    alpha: Vec<u8>,
}

impl StencilScratch {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            alpha: vec![0; width * height],
        }
    }

    pub fn clear(&mut self) {
        self.alpha.fill(0);
    }

    pub fn sample(&self, x: i32, y: i32) -> u8 {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            0
        } else {
            self.alpha[y as usize * self.width + x as usize]
        }
    }

    /// `stencil=set`: additively OR (saturating add) the tile's alpha in.
    pub fn set_from_tile(&mut self, tile: &Tile) {
        for y in 0..tile.height {
            let sy = tile.y + y as i32;
            if sy < 0 || sy as usize >= self.height {
                continue;
            }
            for x in 0..tile.width {
                let sx = tile.x + x as i32;
                if sx < 0 || sx as usize >= self.width {
                    continue;
                }
                let idx = sy as usize * self.width + sx as usize;
                let a = tile.get(x, y).a;
                self.alpha[idx] = self.alpha[idx].saturating_add(a);
            }
        }
    }

    /// `stencil=unset`: invert the tile alpha (XOR with opaque) then
    /// intersect (AND) with the existing stencil.
    pub fn unset_from_tile(&mut self, tile: &Tile) {
        for y in 0..tile.height {
            let sy = tile.y + y as i32;
            if sy < 0 || sy as usize >= self.height {
                continue;
            }
            for x in 0..tile.width {
                let sx = tile.x + x as i32;
                if sx < 0 || sx as usize >= self.width {
                    continue;
                }
                let idx = sy as usize * self.width + sx as usize;
                let inverted = 255 - tile.get(x, y).a;
                self.alpha[idx] = ((self.alpha[idx] as u16 * inverted as u16) / 255) as u8;
            }
        }
    }
}

/// Recolours the portion of `tile` within `progress` of `extents`, oriented
/// by `direction` — spec §4.6 "Karaoke colour".
pub fn apply_karaoke_progress(
    tile: &mut Tile,
    extents: Rect2,
    progress: f32,
    direction: crate::script::Direction,
    color: Rgb,
) {
    let progress = progress.clamp(0.0, 1.0);
    for y in 0..tile.height {
        let world_y = tile.y as f32 + y as f32;
        for x in 0..tile.width {
            let world_x = tile.x as f32 + x as f32;
            let inside = match direction {
                crate::script::Direction::Ltr => {
                    world_x <= extents.min.x + extents.width() * progress
                }
                crate::script::Direction::Rtl => {
                    world_x >= extents.max.x - extents.width() * progress
                }
                crate::script::Direction::Ttb => {
                    world_y <= extents.min.y + extents.height() * progress
                }
            };
            if inside && world_x >= extents.min.x && world_x < extents.max.x && world_y >= extents.min.y && world_y < extents.max.y {
                let idx = y * tile.width + x;
                let a = tile.pixels[idx].a;
                if a > 0 {
                    tile.pixels[idx] = premultiply(color, a);
                }
            }
        }
    }
}

/// Paints `color` over the whole tile with ATOP (keeps the tile's alpha,
/// replaces its colour) — used once karaoke has fully elapsed.
pub fn apply_karaoke_complete(tile: &mut Tile, color: Rgb) {
    for p in &mut tile.pixels {
        if p.a > 0 {
            *p = premultiply(color, p.a);
        }
    }
}

/// Separable box blur with fractional edge weights (spec §4.8). `radius_h`
/// / `radius_v` are the non-negative blur parameters in pixels; `(0, 0)` is
/// the identity. Parallelises across row stripes, one per available CPU.
pub fn box_blur(tile: &mut Tile, radius_h: f32, radius_v: f32) {
    if radius_h <= 0.0 && radius_v <= 0.0 {
        return;
    }
    if radius_h > 0.0 {
        blur_axis(tile, radius_h, Axis::Horizontal);
    }
    if radius_v > 0.0 {
        blur_axis(tile, radius_v, Axis::Vertical);
    }
}

#[derive(Clone, Copy)]
enum Axis {
    Horizontal,
    Vertical,
}

fn kernel_weights(radius: f32) -> (i32, Vec<f32>) {
    let r = radius.ceil() as i32;
    let mut weights = vec![1.0f32; (2 * r + 1) as usize];
    let edge_weight = 1.0 - (r as f32 - radius);
    if let Some(first) = weights.first_mut() {
        *first = edge_weight;
    }
    if let Some(last) = weights.last_mut() {
        *last = edge_weight;
    }
    (r, weights)
}

fn blur_axis(tile: &mut Tile, radius: f32, axis: Axis) {
    let (r, weights) = kernel_weights(radius);
    let sum: f32 = weights.iter().sum();
    if sum <= 0.0 {
        return;
    }

    let width = tile.width;
    let height = tile.height;
    if width == 0 || height == 0 {
        return;
    }
    let src = tile.pixels.clone();

    let num_workers = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    let mut dst = vec![Rgba8::TRANSPARENT; width * height];

    let rows_per_worker = height.div_ceil(num_workers.max(1));
    thread::scope(|scope| {
        for (chunk_idx, chunk) in dst.chunks_mut(rows_per_worker * width).enumerate() {
            let src = &src;
            let weights = &weights;
            let row_start = chunk_idx * rows_per_worker;
            scope.spawn(move || {
                let rows_in_chunk = chunk.len() / width;
                for local_row in 0..rows_in_chunk {
                    let row = row_start + local_row;
                    for col in 0..width {
                        let mut acc = [0f32; 4];
                        for (k, &w) in weights.iter().enumerate() {
                            let offset = k as i32 - r;
                            let (sx, sy) = match axis {
                                Axis::Horizontal => (col as i32 + offset, row as i32),
                                Axis::Vertical => (col as i32, row as i32 + offset),
                            };
                            if sx < 0 || sy < 0 || sx as usize >= width || sy as usize >= height {
                                continue;
                            }
                            let p = src[sy as usize * width + sx as usize];
                            acc[0] += p.r as f32 * w;
                            acc[1] += p.g as f32 * w;
                            acc[2] += p.b as f32 * w;
                            acc[3] += p.a as f32 * w;
                        }
                        let idx = local_row * width + col;
                        chunk[idx] = Rgba8::new(
                            (acc[0] / sum).round().clamp(0.0, 255.0) as u8,
                            (acc[1] / sum).round().clamp(0.0, 255.0) as u8,
                            (acc[2] / sum).round().clamp(0.0, 255.0) as u8,
                            (acc[3] / sum).round().clamp(0.0, 255.0) as u8,
                        );
                    }
                }
            });
        }
    });

    tile.pixels = dst;
}

/// `apply_fade`: scales an already-rendered tile's alpha for replay from the
/// event cache, per spec §4.6 step 1 and the fade progress rule in §4.2.
pub fn apply_fade(tile: &mut Tile, fade_in_ms: u32, fade_out_ms: u32, t_ms: u32, start_ms: u32, end_ms: u32) {
    if fade_in_ms == 0 && fade_out_ms == 0 {
        return;
    }
    let inner_ms = t_ms.saturating_sub(start_ms);
    let duration = end_ms - start_ms;
    let p = if inner_ms < fade_in_ms {
        if fade_in_ms == 0 {
            1.0
        } else {
            inner_ms as f32 / fade_in_ms as f32
        }
    } else if duration.saturating_sub(inner_ms) < fade_out_ms {
        if fade_out_ms == 0 {
            1.0
        } else {
            (duration - inner_ms) as f32 / fade_out_ms as f32
        }
    } else {
        1.0
    };
    if p >= 1.0 {
        return;
    }
    for pixel in &mut tile.pixels {
        *pixel = pixel.scale_alpha(p);
    }
}

/// `mode=fill` draw policy: whether to additionally render an unblurred
/// border on top of a blurred fill (spec §4.6: "when mode=fill and
/// line_width>0 and geometry≠points, render border + unblurred fill,
/// added").
pub fn wants_border_plus_fill(mode: DrawMode, line_width: f32, is_points: bool) -> bool {
    mode == DrawMode::Fill && line_width > 0.0 && !is_points
}

fn fill_pattern(colors: &crate::script::CornerSet<Rgb>, alphas: &crate::script::CornerSet<u8>, bounds: Rect2) -> FillPattern {
    use crate::script::CornerSet;
    match (colors, alphas) {
        (CornerSet::Single(c), CornerSet::Single(a)) => FillPattern::Solid { color: *c, alpha: *a },
        _ => FillPattern::Gradient {
            corners: [
                (colors.get(0), alphas.get(0)),
                (colors.get(1), alphas.get(1)),
                (colors.get(2), alphas.get(2)),
                (colors.get(3), alphas.get(3)),
            ],
            bounds,
        },
    }
}

/// Per-event resources the rasterizer needs beyond the script/render state
/// (spec §4.6): where to resolve `texture` filenames from, and a cache of
/// already-decoded textures so repeated `texture=...` tags in one event (or
/// across re-rasterized frames of a non-static event) don't re-read the file.
pub struct EventRenderContext<'a> {
    pub frame_width: u32,
    pub frame_height: u32,
    pub script_frame_width: u32,
    pub script_frame_height: u32,
    pub base_dir: &'a std::path::Path,
    pub texture_cache: &'a mut std::collections::HashMap<String, Option<crate::texture::Texture>>,
}

impl<'a> EventRenderContext<'a> {
    fn layout_frame(&self) -> (f32, f32) {
        if self.script_frame_width != 0 && self.script_frame_height != 0 {
            (self.script_frame_width as f32, self.script_frame_height as f32)
        } else {
            (self.frame_width as f32, self.frame_height as f32)
        }
    }

    /// Scale applied only to auto-computed positions when the script declares
    /// a frame size different from the render target (spec §4.3 "Auto
    /// position ... scaled if frame scale active").
    fn auto_position_scale(&self) -> (f32, f32) {
        if self.script_frame_width != 0 && self.script_frame_height != 0 {
            (
                self.frame_width as f32 / self.script_frame_width as f32,
                self.frame_height as f32 / self.script_frame_height as f32,
            )
        } else {
            (1.0, 1.0)
        }
    }

    fn resolve_texture(&mut self, filename: &str) -> Option<crate::texture::Texture> {
        self.texture_cache
            .entry(filename.to_string())
            .or_insert_with(|| crate::texture::resolve(self.base_dir, filename))
            .clone()
    }
}

fn geometry_shaper(state: &crate::state::RenderState) -> crate::text::SyntheticShaper {
    crate::text::SyntheticShaper::new(crate::text::FontRequest {
        family: &state.font_family,
        style: state.font_style.clone(),
        size: state.font_size,
        rtl: state.direction == crate::script::Direction::Rtl,
    })
}

/// Pass 1 of the per-event draw loop (spec §4.6): walks the event's objects
/// building up the position-group/line/geometry-box tree that pass 2 will
/// index into, without producing any pixels.
fn size_event(event: &crate::script::Event, ctx: &EventRenderContext) -> Vec<crate::layout::PositionGroup> {
    use crate::script::{Geometry, Object};

    let mut state = crate::state::RenderState::default();
    let (frame_w, frame_h) = ctx.layout_frame();
    let wrap = |s: &crate::state::RenderState| -> (f32, f32) {
        (
            (frame_w - 2.0 * s.margin_h).max(0.0),
            (frame_h - 2.0 * s.margin_v).max(0.0),
        )
    };
    let (ww, wh) = wrap(&state);
    let mut layouter = crate::layout::Layouter::new(state.direction, ww, wh, state.margin_h, state.margin_v);

    for object in &event.objects {
        match object {
            Object::Tag(tag) => {
                let r = state.apply(tag, 0, event.duration_ms());
                if r.position_changed {
                    layouter.begin_position_group();
                }
                layouter.set_direction(state.direction);
                let (ww, wh) = wrap(&state);
                layouter.set_wrap(ww, wh);
            }
            Object::Geometry(Geometry::Text(text)) => {
                let shaper = geometry_shaper(&state);
                let metrics = shaper.metrics();
                let line_spacing = metrics.external_lead + state.font_space_v;
                for (i, line) in text.split('\n').enumerate() {
                    if i > 0 {
                        layouter.force_newline(line_spacing);
                    }
                    layouter.add_text(&shaper, line, state.font_space_h, state.font_space_v);
                }
            }
            Object::Geometry(Geometry::Points(points)) => {
                let outline = crate::outline::build_points_outline(points, state.line_width);
                let extents = outline.extents();
                layouter.add_geometry_box(extents.width(), extents.height(), 0.0);
            }
            Object::Geometry(Geometry::Path(commands)) => {
                let outline = crate::outline::build_path(commands);
                let extents = outline.extents();
                layouter.add_geometry_box(extents.width(), extents.height(), 0.0);
            }
        }
    }

    layouter.finish()
}

fn cumulative_before(group: &crate::layout::PositionGroup, direction: crate::script::Direction, line_idx: usize) -> f32 {
    group.lines[..line_idx]
        .iter()
        .map(|l| match direction {
            crate::script::Direction::Ltr | crate::script::Direction::Rtl => l.height + l.spacing,
            crate::script::Direction::Ttb => l.width + l.spacing,
        })
        .sum()
}

/// A cursor walking `groups` in the exact same atom order pass 1 produced
/// them in, without recomputing any wrap decision.
struct DrawCursor {
    group: usize,
    line: usize,
    geom: usize,
}

impl DrawCursor {
    fn new() -> Self {
        Self { group: 0, line: 0, geom: 0 }
    }

    fn next_position_group(&mut self) {
        self.group += 1;
        self.line = 0;
        self.geom = 0;
    }

    /// Returns the box the cursor currently points at, then advances past
    /// it (skipping any now-exhausted lines within the same group).
    fn take<'g>(&mut self, groups: &'g [crate::layout::PositionGroup]) -> Option<(&'g crate::layout::PositionGroup, &'g crate::layout::Line, &'g crate::layout::GeometryBox, usize)> {
        let group = groups.get(self.group)?;
        let line = group.lines.get(self.line)?;
        let geom_box = line.geometries.get(self.geom)?;
        let line_idx = self.line;
        self.geom += 1;
        while self.line < group.lines.len() && self.geom >= group.lines[self.line].geometries.len() {
            self.line += 1;
            self.geom = 0;
        }
        Some((group, line, geom_box, line_idx))
    }
}

/// Pass 2 of the per-event draw loop: replays the same object sequence,
/// producing one `Tile` per drawable geometry atom (spec §4.6 "Rasterizer").
/// `t_ms` is already event-relative (`inner_ms`). Returns only the tiles
/// meant to be blended (`stencil = off/inside/outside`); `set`/`unset`
/// geometries update `stencil` in place and are not returned.
pub fn rasterize_event(
    event: &crate::script::Event,
    inner_ms: u32,
    stencil: &mut StencilScratch,
    ctx: &mut EventRenderContext,
) -> Vec<Tile> {
    use crate::script::{Geometry, Object};

    let groups = size_event(event, ctx);
    let inner_duration = event.duration_ms();

    let mut state = crate::state::RenderState::default();
    let mut cursor = DrawCursor::new();
    let mut out = Vec::new();
    let (scale_x, scale_y) = ctx.auto_position_scale();
    let mut fade_in_ms: u32 = 0;
    let mut fade_out_ms: u32 = 0;

    for object in &event.objects {
        match object {
            Object::Tag(tag) => {
                // `fade` is handled post-hoc by the caller via `Tile::fade_in_ms`/
                // `fade_out_ms` so that cached (static) events replay correctly at
                // a different `t_ms` than the one they were first drawn at (spec
                // §4.6 step 1, §4.9). Baking it into `state.alphas` here would be
                // indistinguishable from a real non-animated colour for a static
                // event, and the cache would then freeze the fade proportion of
                // whatever frame happened to populate it.
                if let crate::script::Tag::Fade { in_ms, out_ms } = tag {
                    fade_in_ms = *in_ms;
                    fade_out_ms = *out_ms;
                    continue;
                }
                let r = state.apply(tag, inner_ms, inner_duration);
                if r.position_changed {
                    cursor.next_position_group();
                }
            }
            Object::Geometry(geometry) => {
                let atoms: Vec<String> = match geometry {
                    Geometry::Text(text) => crate::layout::text_atoms(state.direction, text),
                    Geometry::Points(_) | Geometry::Path(_) => vec![String::new()],
                };

                for atom_text in atoms {
                    let Some((group, line, geom_box, line_idx)) = cursor.take(&groups) else {
                        continue;
                    };

                    let local_outline = match geometry {
                        Geometry::Text(_) => {
                            let shaper = geometry_shaper(&state);
                            let metrics = shaper.metrics();
                            let mut o = Outline::empty();
                            shaper.append_text_outline(
                                &atom_text,
                                crate::math::Point2::new(geom_box.off_x, geom_box.off_y + metrics.ascent),
                                &mut o,
                            );
                            o
                        }
                        Geometry::Points(points) => {
                            let mut o = crate::outline::build_points_outline(points, state.line_width);
                            let e = o.extents();
                            o.translate(geom_box.off_x - e.min.x, geom_box.off_y - e.min.y);
                            o
                        }
                        Geometry::Path(commands) => {
                            let mut o = crate::outline::build_path(commands);
                            let e = o.extents();
                            o.translate(geom_box.off_x - e.min.x, geom_box.off_y - e.min.y);
                            o
                        }
                    };

                    if local_outline.is_empty() {
                        continue;
                    }

                    if let Some((expr_x, expr_y)) = &state.deform {
                        let mut deformed = local_outline.clone();
                        deformed.map_vertices(|p| {
                            let vars = crate::expr::Vars { t: state.deform_progress as f64, x: p.x as f64, y: p.y as f64 };
                            let x = crate::expr::eval(expr_x, vars).map(|v| v as f32).unwrap_or(p.x);
                            let y = crate::expr::eval(expr_y, vars).map(|v| v as f32).unwrap_or(p.y);
                            crate::math::Point2::new(x, y)
                        });
                        draw_atom(&deformed, &state, group, line, line_idx, geom_box, matches!(geometry, Geometry::Points(_)), scale_x, scale_y, stencil, ctx, &mut out, inner_ms, fade_in_ms, fade_out_ms);
                    } else {
                        draw_atom(&local_outline, &state, group, line, line_idx, geom_box, matches!(geometry, Geometry::Points(_)), scale_x, scale_y, stencil, ctx, &mut out, inner_ms, fade_in_ms, fade_out_ms);
                    }
                }
            }
        }
    }

    stencil.clear();
    out
}

#[allow(clippy::too_many_arguments)]
fn draw_atom(
    local_outline: &Outline,
    state: &crate::state::RenderState,
    group: &crate::layout::PositionGroup,
    line: &crate::layout::Line,
    line_idx: usize,
    geom_box: &crate::layout::GeometryBox,
    is_points: bool,
    scale_x: f32,
    scale_y: f32,
    stencil: &mut StencilScratch,
    ctx: &mut EventRenderContext,
    out: &mut Vec<Tile>,
    inner_ms: u32,
    fade_in_ms: u32,
    fade_out_ms: u32,
) {
    let (frame_w, frame_h) = ctx.layout_frame();
    let anchor = match state.position {
        None => {
            let p = crate::layout::auto_position(frame_w, frame_h, state.align, state.margin_h, state.margin_v);
            crate::math::Point2::new(p.x * scale_x, p.y * scale_y)
        }
        Some((x, y)) => crate::math::Point2::new(x, y),
    };
    let before = cumulative_before(group, state.direction, line_idx);
    let align_offset = crate::layout::line_alignment_offset(group, line, state.align, state.direction, before);

    let transform = crate::math::Matrix3::translate(anchor.x + align_offset.x, anchor.y + align_offset.y).multiply(&state.matrix);
    let untransformed_extents = local_outline.extents();
    let transformed = local_outline.apply_matrix(&transform);
    let transformed_extents = transformed.extents();
    if transformed_extents.is_negative() {
        return;
    }

    let pad_h = state.blur_h.max(state.line_width / 2.0).ceil() as i32;
    let pad_v = state.blur_v.max(state.line_width / 2.0).ceil() as i32;
    let x0 = transformed_extents.min.x.floor() as i32 - pad_h;
    let y0 = transformed_extents.min.y.floor() as i32 - pad_v;
    let width = (transformed_extents.width().ceil() as i32 + 2 * pad_h).max(0) as usize;
    let height = (transformed_extents.height().ceil() as i32 + 2 * pad_v).max(0) as usize;
    if width == 0 || height == 0 {
        return;
    }

    let mut tile = Tile::new(width, height, x0, y0, state.blend);
    tile.fade_in_ms = fade_in_ms;
    tile.fade_out_ms = fade_out_ms;

    let fill = fill_pattern(&state.colors, &state.alphas, untransformed_extents);
    let line_fill = fill_pattern(&state.line_colors, &state.line_alphas, untransformed_extents);
    let local_contours = |o: &Outline| -> Vec<Vec<crate::math::Point2>> {
        o.contours
            .iter()
            .map(|c| c.iter().map(|p| crate::math::Point2::new(p.x - x0 as f32, p.y - y0 as f32)).collect())
            .collect()
    };

    let tri_pass = wants_border_plus_fill(state.mode, state.line_width, is_points);
    if is_points || state.mode == DrawMode::Fill && !tri_pass {
        fill_polygon(&mut tile, &local_contours(&transformed), &fill, x0 as f32, y0 as f32);
    } else if tri_pass {
        let border = crate::outline::stroke(&transformed, state.line_width, state.line_cap, state.line_join, None);
        fill_polygon(&mut tile, &local_contours(&border), &line_fill, x0 as f32, y0 as f32);
        fill_polygon(&mut tile, &local_contours(&transformed), &fill, x0 as f32, y0 as f32);
    } else {
        // Wire and boxed modes both draw stroke-only geometry; this crate's
        // naive ribbon stroke already produces a closed band for boxed mode
        // without a separate fill-then-erase pass (see DESIGN.md).
        let dash = state.line_dash.as_ref().map(|d| (d.dashes.as_slice(), d.offset));
        let border = crate::outline::stroke(&transformed, state.line_width, state.line_cap, state.line_join, dash);
        fill_polygon(&mut tile, &local_contours(&border), &line_fill, x0 as f32, y0 as f32);
    }

    if let Some(filename) = &state.texture.filename {
        if let Some(texture) = ctx.resolve_texture(filename) {
            crate::texture::apply_texture_fill(
                &mut tile,
                &texture,
                untransformed_extents.min.x,
                untransformed_extents.min.y,
                state.texture.x,
                state.texture.y,
                state.texture.wrap,
            );
        }
    }

    if state.karaoke.start_ms >= 0 {
        let elapsed = inner_ms as i64 - state.karaoke.start_ms;
        if elapsed >= state.karaoke.duration_ms as i64 {
            apply_karaoke_complete(&mut tile, state.karaoke.color);
        } else if elapsed >= 0 {
            let progress = elapsed as f32 / state.karaoke.duration_ms.max(1) as f32;
            apply_karaoke_progress(&mut tile, transformed_extents, progress, state.direction, state.karaoke.color);
        }
    }

    if !tri_pass {
        box_blur(&mut tile, state.blur_h, state.blur_v);
    }

    match state.stencil {
        StencilMode::Off => out.push(tile),
        StencilMode::Inside => {
            apply_stencil_mask(&mut tile, stencil, StencilMode::Inside);
            out.push(tile);
        }
        StencilMode::Outside => {
            apply_stencil_mask(&mut tile, stencil, StencilMode::Outside);
            out.push(tile);
        }
        StencilMode::Set => stencil.set_from_tile(&tile),
        StencilMode::Unset => stencil.unset_from_tile(&tile),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn blur_zero_radius_is_identity() {
        let mut tile = Tile::new(2, 2, 0, 0, crate::script::BlendTag::Over);
        tile.set(0, 0, Rgba8::new(10, 20, 30, 255));
        let before = tile.pixels.clone();
        box_blur(&mut tile, 0.0, 0.0);
        assert_eq!(tile.pixels, before);
    }

    #[test]
    fn blur_spreads_a_single_pixel() {
        let mut tile = Tile::new(5, 5, 0, 0, crate::script::BlendTag::Over);
        tile.set(2, 2, Rgba8::new(255, 255, 255, 255));
        box_blur(&mut tile, 1.0, 1.0);
        assert!(tile.get(1, 2).a > 0);
        assert!(tile.get(3, 2).a > 0);
    }

    #[test]
    fn fade_at_zero_progress_halves_opaque_alpha() {
        let mut tile = Tile::new(1, 1, 0, 0, crate::script::BlendTag::Over);
        tile.set(0, 0, Rgba8::new(255, 0, 0, 255));
        apply_fade(&mut tile, 200, 200, 100, 0, 1000);
        assert_eq!(tile.get(0, 0).a, 128);
    }

    #[test]
    fn stencil_inside_masks_outside_region() {
        let mut stencil = StencilScratch::new(4, 4);
        for y in 0..2 {
            for x in 0..2 {
                stencil.alpha[y * 4 + x] = 255;
            }
        }
        let mut tile = Tile::new(4, 4, 0, 0, crate::script::BlendTag::Over);
        for p in &mut tile.pixels {
            *p = Rgba8::new(255, 255, 255, 255);
        }
        apply_stencil_mask(&mut tile, &stencil, StencilMode::Inside);
        assert_eq!(tile.get(0, 0).a, 255);
        assert_eq!(tile.get(3, 3).a, 0);
    }
}
