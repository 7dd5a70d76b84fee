//! Typed tree of events, tags, geometries and styles (spec §3), plus the
//! script-level metadata the original carries in its header
//! (`original_source/src/SSBData.hpp`: title/author/description/version).

use std::collections::HashMap;

pub const SENTINEL: f32 = f32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineJoin {
    Round,
    Bevel,
    Miter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineCap {
    Round,
    Flat,
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawMode {
    Fill,
    Wire,
    Boxed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ltr,
    Rtl,
    Ttb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapStyle {
    Clamp,
    Repeat,
    Mirror,
    Flow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendTag {
    Over,
    Add,
    Sub,
    Mul,
    Screen,
    Diff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StencilMode {
    Off,
    Set,
    Unset,
    Inside,
    Outside,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KaraokeMode {
    Fill,
    Solid,
    Glow,
}

/// An RGB colour, 0..=255 per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Self = Self { r: 255, g: 255, b: 255 };
    pub const BLACK: Self = Self { r: 0, g: 0, b: 0 };
    pub const RED: Self = Self { r: 255, g: 0, b: 0 };
}

/// A 1- or 4- element colour/alpha set, per spec §3 corner-pattern rule.
#[derive(Debug, Clone, PartialEq)]
pub enum CornerSet<T> {
    Single(T),
    Quad([T; 4]),
}

impl<T: Copy> CornerSet<T> {
    pub fn get(&self, corner: usize) -> T {
        match self {
            CornerSet::Single(v) => *v,
            CornerSet::Quad(vs) => vs[corner],
        }
    }

    pub fn map<U: Copy>(&self, f: impl Fn(T) -> U) -> CornerSet<U> {
        match self {
            CornerSet::Single(v) => CornerSet::Single(f(*v)),
            CornerSet::Quad(vs) => CornerSet::Quad([f(vs[0]), f(vs[1]), f(vs[2]), f(vs[3])]),
        }
    }
}

/// Builds a `CornerSet` from 1, 2 or 4 parsed values, per spec §3:
/// "with 2 RGBs produces a 4-corner pattern {c0,c1,c1,c0}".
pub fn corner_set_from_values<T: Copy>(values: &[T]) -> CornerSet<T> {
    match values.len() {
        0 => unreachable!("tag parser must supply at least one value"),
        1 => CornerSet::Single(values[0]),
        2 => CornerSet::Quad([values[0], values[1], values[1], values[0]]),
        _ => CornerSet::Quad([values[0], values[1], values[2], values[3]]),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikeout: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineDash {
    pub offset: f32,
    pub dashes: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    FontFamily(String),
    FontStyle(FontStyle),
    FontSize(f32),
    FontSpace { h: f32, v: f32 },
    LineWidth(f32),
    LineStyle { join: LineJoin, cap: LineCap },
    LineDash(LineDash),
    Mode(DrawMode),
    Deform { expr_x: String, expr_y: String },
    Position { x: f32, y: f32 },
    Align(u8),
    Margin { h: f32, v: f32 },
    Direction(Direction),
    Identity,
    Translate { x: f32, y: f32 },
    Scale { x: f32, y: f32 },
    Rotate { x: f32, y: f32 },
    RotateZ(f32),
    Shear { x: f32, y: f32 },
    Transform([f32; 6]),
    Color(CornerSet<Rgb>),
    Alpha(CornerSet<u8>),
    LineColor(CornerSet<Rgb>),
    LineAlpha(CornerSet<u8>),
    Texture(String),
    TexFill { x: f32, y: f32, wrap: WrapStyle },
    Blend(BlendTag),
    Blur { h: f32, v: f32 },
    Stencil(StencilMode),
    Fade { in_ms: u32, out_ms: u32 },
    Animate {
        start: i64,
        end: i64,
        progress_expr: String,
        inner: Vec<Tag>,
    },
    KaraokeDuration(u32),
    KaraokeSet(u32),
    KaraokeColor(Rgb),
    KaraokeMode(KaraokeMode),
}

impl Tag {
    /// Whether this tag (at any depth) makes an event's rendering
    /// time-dependent, per spec §3: "`static_tags` is false iff any object is
    /// a karaoke tag or an animate tag at any depth."
    pub fn is_time_dependent(&self) -> bool {
        match self {
            Tag::KaraokeDuration(_) | Tag::KaraokeSet(_) | Tag::Animate { .. } => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvePoint {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathCommand {
    Move(CurvePoint),
    Line(CurvePoint),
    /// A cubic bezier curve with 3 control points (end point last).
    Curve([CurvePoint; 3]),
    /// An arc given a centre and a signed sweep in degrees (sign selects
    /// CCW vs CW).
    Arc { center: CurvePoint, degrees: f32 },
    Close,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Points(Vec<CurvePoint>),
    Path(Vec<PathCommand>),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Tag(Tag),
    Geometry(Geometry),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub start_ms: u32,
    pub end_ms: u32,
    pub static_tags: bool,
    pub objects: Vec<Object>,
}

impl Event {
    pub fn new(start_ms: u32, end_ms: u32, objects: Vec<Object>) -> Self {
        assert!(end_ms > start_ms, "event end must be after start");
        let static_tags = !objects.iter().any(|o| Self::contains_time_dependent(o));
        Self {
            start_ms,
            end_ms,
            static_tags,
            objects,
        }
    }

    fn contains_time_dependent(object: &Object) -> bool {
        match object {
            Object::Geometry(_) => false,
            Object::Tag(tag) => {
                if tag.is_time_dependent() {
                    return true;
                }
                if let Tag::Animate { inner, .. } = tag {
                    inner.iter().any(|t| t.is_time_dependent())
                } else {
                    false
                }
            }
        }
    }

    pub fn duration_ms(&self) -> u32 {
        self.end_ms - self.start_ms
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptMeta {
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Script {
    pub meta: ScriptMeta,
    /// 0 means "unscaled": tags/positions are in destination-frame pixels.
    pub frame_width: u32,
    pub frame_height: u32,
    pub styles: HashMap<String, String>,
    pub events: Vec<Event>,
}

impl Script {
    pub fn new() -> Self {
        Self {
            meta: ScriptMeta::default(),
            frame_width: 0,
            frame_height: 0,
            styles: HashMap::new(),
            events: Vec::new(),
        }
    }

    pub fn has_frame_scale(&self) -> bool {
        self.frame_width != 0 && self.frame_height != 0
    }
}

impl Default for Script {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn corner_set_expansion() {
        let set = corner_set_from_values(&[1, 2]);
        assert_eq!(set, CornerSet::Quad([1, 2, 2, 1]));
    }

    #[test]
    fn static_tags_detects_karaoke() {
        let ev = Event::new(
            0,
            1000,
            vec![
                Object::Tag(Tag::KaraokeDuration(500)),
                Object::Geometry(Geometry::Text("AB".into())),
            ],
        );
        assert!(!ev.static_tags);
    }

    #[test]
    fn static_tags_true_for_plain_text() {
        let ev = Event::new(
            0,
            1000,
            vec![Object::Geometry(Geometry::Text("Hi".into()))],
        );
        assert!(ev.static_tags);
    }

    #[test]
    fn static_tags_detects_nested_animate_karaoke() {
        let ev = Event::new(
            0,
            1000,
            vec![Object::Tag(Tag::Animate {
                start: i64::MAX,
                end: i64::MAX,
                progress_expr: String::new(),
                inner: vec![Tag::KaraokeSet(0)],
            })],
        );
        assert!(!ev.static_tags);
    }
}
