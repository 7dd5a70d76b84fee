//! Textual SSB script grammar → `Script` (spec §6).
//!
//! Grounded on `original_source/src/SSBParser.cpp` for the concrete grammar
//! (time format, colour literals, `{...}` tag blocks, style-name expansion)
//! and on the teacher's `src/ass/parse_overrides.rs` for the general shape
//! of a tag-block splitter that hands each `key=value` token to its own
//! small parser rather than one monolithic match.

use std::fmt;

use crate::script::{
    corner_set_from_values, BlendTag, CurvePoint, DrawMode, Direction, Event, FontStyle, Geometry, KaraokeMode,
    LineDash, Object, PathCommand, Rgb, Script, StencilMode, Tag, WrapStyle, SENTINEL,
};

const MAX_STYLE_EXPANSIONS: u32 = 64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("could not read script file: {0}")]
    ScriptRead(String),
}

/// A non-fatal diagnostic collected while parsing (spec §7 `ScriptSyntax`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub line: u32,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

pub fn parse_file(path: &std::path::Path) -> Result<(Script, Vec<Warning>), ParseError> {
    let text = std::fs::read_to_string(path).map_err(|e| ParseError::ScriptRead(e.to_string()))?;
    Ok(parse_str(&text))
}

/// Parses `text` in memory, never failing: unreadable lines and tags are
/// dropped and recorded as warnings (spec §7: "bad tag/value at line N ...
/// the offending tag is silently dropped; a best-effort render continues").
pub fn parse_str(text: &str) -> (Script, Vec<Warning>) {
    let mut script = Script::new();
    let mut warnings = Vec::new();

    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    #[derive(PartialEq)]
    enum Section {
        None,
        Meta,
        Frame,
        Styles,
        Events,
    }
    let mut section = Section::None;

    for (lineno, raw_line) in text.lines().enumerate() {
        let line_no = lineno as u32 + 1;
        let line = raw_line.trim_end_matches('\r');
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }
        match trimmed {
            "#META" => {
                section = Section::Meta;
                continue;
            }
            "#FRAME" => {
                section = Section::Frame;
                continue;
            }
            "#STYLES" => {
                section = Section::Styles;
                continue;
            }
            "#EVENTS" => {
                section = Section::Events;
                continue;
            }
            _ => {}
        }

        match section {
            Section::None => {}
            Section::Meta => parse_meta_line(&mut script, trimmed),
            Section::Frame => parse_frame_line(&mut script, trimmed),
            Section::Styles => parse_style_line(&mut script, trimmed),
            Section::Events => match parse_event_line(trimmed, &script.styles, line_no) {
                Ok(event) => script.events.push(event),
                Err(msg) => warnings.push(Warning { line: line_no, message: msg }),
            },
        }
    }

    (script, warnings)
}

fn parse_meta_line(script: &mut Script, line: &str) {
    if let Some((key, value)) = line.split_once(':') {
        let value = value.trim().to_string();
        match key.trim() {
            "Title" => script.meta.title = Some(value),
            "Author" => script.meta.author = Some(value),
            "Description" => script.meta.description = Some(value),
            "Version" => script.meta.version = Some(value),
            _ => {}
        }
    }
}

fn parse_frame_line(script: &mut Script, line: &str) {
    if let Some((key, value)) = line.split_once(':') {
        let value: u32 = value.trim().parse().unwrap_or(0);
        match key.trim() {
            "Width" => script.frame_width = value,
            "Height" => script.frame_height = value,
            _ => {}
        }
    }
}

fn parse_style_line(script: &mut Script, line: &str) {
    if let Some((name, content)) = line.split_once(':') {
        script.styles.insert(name.trim().to_string(), content.trim_start().to_string());
    }
}

fn parse_event_line(line: &str, styles: &std::collections::HashMap<String, String>, line_no: u32) -> Result<Event, String> {
    let mut parts = line.splitn(4, '|');
    let times = parts.next().ok_or("missing time field")?;
    let _style_ref = parts.next().unwrap_or("");
    let _note = parts.next().unwrap_or("");
    let text = parts.next().unwrap_or("");

    let (start, end) = times.split_once('-').ok_or("malformed time range")?;
    let start_ms = parse_time(start.trim()).ok_or("malformed start time")?;
    let end_ms = parse_time(end.trim()).ok_or("malformed end time")?;
    if end_ms <= start_ms {
        return Err(format!("event end must be after start ({})", line_no));
    }

    let expanded = expand_styles(text, styles, 0);
    let objects = parse_event_text(&expanded);
    Ok(Event::new(start_ms, end_ms, objects))
}

/// Parses `[[HH:]MM:]SS[.mmm]` into milliseconds, per
/// `original_source/src/SSBParser.cpp`'s `SSBTime::parse`.
pub fn parse_time(text: &str) -> Option<u32> {
    let fields: Vec<&str> = text.split(':').collect();
    let (h, m, s) = match fields.len() {
        1 => (0u32, 0u32, fields[0]),
        2 => (0u32, fields[0].parse().ok()?, fields[1]),
        3 => (fields[0].parse().ok()?, fields[1].parse().ok()?, fields[2]),
        _ => return None,
    };
    let seconds: f64 = s.parse().ok()?;
    if seconds < 0.0 {
        return None;
    }
    let total_ms = (h as f64 * 3_600_000.0) + (m as f64 * 60_000.0) + seconds * 1000.0;
    Some(total_ms.round() as u32)
}

/// Formats milliseconds back into `HH:MM:SS.mmm`, the inverse of
/// `parse_time` (spec §8 round-trip property).
pub fn format_time(ms: u32) -> String {
    let h = ms / 3_600_000;
    let m = (ms / 60_000) % 60;
    let s = (ms / 1000) % 60;
    let frac = ms % 1000;
    format!("{h:02}:{m:02}:{s:02}.{frac:03}")
}

fn expand_styles(text: &str, styles: &std::collections::HashMap<String, String>, depth: u32) -> String {
    if depth >= MAX_STYLE_EXPANSIONS {
        return text.to_string();
    }
    let mut out = String::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if text[i..].starts_with("\\\\") {
            if let Some(end) = text[i + 2..].find("\\\\") {
                let name = &text[i + 2..i + 2 + end];
                if let Some(content) = styles.get(name) {
                    out.push_str(&expand_styles(content, styles, depth + 1));
                } else {
                    out.push_str(&text[i..i + 2 + end + 2]);
                }
                i += 2 + end + 2;
                continue;
            }
        }
        let ch = text[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

/// Splits event text into a flat object sequence: `{...}` tag blocks
/// interleaved with literal text runs, handling `\n`, `\t` and `\{` escapes
/// (spec §6).
fn parse_event_text(text: &str) -> Vec<Object> {
    let mut objects = Vec::new();
    let mut chars = text.char_indices().peekable();
    let mut literal = String::new();
    // `{gm=p}` switches subsequent literal runs from plain text into path
    // geometry literals (spec §3 "geometry mode"), until `{gm=t}` switches
    // back; `{gm=pt}` does the same for a point-cloud literal.
    let mut geometry_mode = GeometryMode::Text;

    let flush_literal = |literal: &mut String, objects: &mut Vec<Object>, mode: GeometryMode| {
        if literal.is_empty() {
            return;
        }
        let taken = std::mem::take(literal);
        let geometry = match mode {
            GeometryMode::Text => Geometry::Text(taken),
            GeometryMode::Path => Geometry::Path(parse_path_literal(&taken)),
            GeometryMode::Points => Geometry::Points(parse_points_literal(&taken)),
        };
        objects.push(Object::Geometry(geometry));
    };

    while let Some((i, ch)) = chars.next() {
        match ch {
            '\\' if text[i..].starts_with("\\{") => {
                literal.push('{');
                chars.next();
            }
            '\\' if text[i..].starts_with("\\n") => {
                literal.push('\n');
                chars.next();
            }
            '\\' if text[i..].starts_with("\\t") => {
                literal.push_str("    ");
                chars.next();
            }
            '{' => {
                flush_literal(&mut literal, &mut objects, geometry_mode);
                let mut depth = 1;
                let mut block = String::new();
                for (_, c2) in chars.by_ref() {
                    if c2 == '{' {
                        depth += 1;
                    } else if c2 == '}' {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    block.push(c2);
                }
                for tag_text in block.split(';') {
                    let tag_text = tag_text.trim();
                    if tag_text.is_empty() {
                        continue;
                    }
                    if let Some(mode) = parse_geometry_mode(tag_text) {
                        geometry_mode = mode;
                        continue;
                    }
                    if let Some(tag) = parse_tag(tag_text) {
                        objects.push(Object::Tag(tag));
                    }
                }
            }
            _ => literal.push(ch),
        }
    }
    flush_literal(&mut literal, &mut objects, geometry_mode);
    objects
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GeometryMode {
    Text,
    Path,
    Points,
}

fn parse_geometry_mode(tag_text: &str) -> Option<GeometryMode> {
    let (key, value) = tag_text.split_once('=')?;
    if key.trim() != "gm" {
        return None;
    }
    match value.trim() {
        "t" => Some(GeometryMode::Text),
        "p" => Some(GeometryMode::Path),
        "pt" => Some(GeometryMode::Points),
        _ => None,
    }
}

fn parse_tag(text: &str) -> Option<Tag> {
    let (key, value) = text.split_once('=').unwrap_or((text, ""));
    let key = key.trim();
    let value = value.trim();
    let nums = || -> Vec<f32> { value.split(',').filter_map(|v| v.trim().parse().ok()).collect() };

    Some(match key {
        "ff" => Tag::FontFamily(value.to_string()),
        "fs" => Tag::FontSize(value.parse().ok()?),
        "fsp" => {
            let n = nums();
            Tag::FontSpace { h: *n.first()?, v: *n.get(1).unwrap_or(&0.0) }
        }
        "lw" => Tag::LineWidth(value.parse().ok()?),
        "ld" => {
            let n = nums();
            if n.is_empty() {
                return None;
            }
            Tag::LineDash(LineDash { offset: n[0], dashes: n[1..].to_vec() })
        }
        "mode" => Tag::Mode(match value {
            "fill" => DrawMode::Fill,
            "wire" => DrawMode::Wire,
            "boxed" => DrawMode::Boxed,
            _ => return None,
        }),
        "pos" => {
            let n = nums();
            Tag::Position { x: *n.first().unwrap_or(&SENTINEL), y: *n.get(1).unwrap_or(&SENTINEL) }
        }
        "an" => Tag::Align(value.parse().ok()?),
        "mg" => {
            let n = nums();
            Tag::Margin { h: *n.first()?, v: *n.get(1).unwrap_or(&0.0) }
        }
        "dir" => Tag::Direction(match value {
            "ltr" => Direction::Ltr,
            "rtl" => Direction::Rtl,
            "ttb" => Direction::Ttb,
            _ => return None,
        }),
        "identity" => Tag::Identity,
        "move" => {
            let n = nums();
            Tag::Translate { x: *n.first()?, y: *n.get(1).unwrap_or(&0.0) }
        }
        "scale" => {
            let n = nums();
            Tag::Scale { x: *n.first()?, y: *n.get(1).unwrap_or(&n[0]) }
        }
        "rz" => Tag::RotateZ(*nums().first()?),
        "rx" => {
            let n = nums();
            Tag::Rotate { x: *n.first()?, y: 0.0 }
        }
        "shear" => {
            let n = nums();
            Tag::Shear { x: *n.first()?, y: *n.get(1).unwrap_or(&0.0) }
        }
        "cl" => Tag::Color(corner_set_from_values(&parse_colors(value)?)),
        "al" => Tag::Alpha(corner_set_from_values(&parse_alphas(value)?)),
        "lcl" => Tag::LineColor(corner_set_from_values(&parse_colors(value)?)),
        "lal" => Tag::LineAlpha(corner_set_from_values(&parse_alphas(value)?)),
        "tex" => Tag::Texture(value.to_string()),
        "texfill" => {
            let mut parts = value.split(',');
            let x = parts.next()?.trim().parse().ok()?;
            let y = parts.next()?.trim().parse().ok()?;
            let wrap = match parts.next().map(str::trim) {
                Some("repeat") => WrapStyle::Repeat,
                Some("mirror") => WrapStyle::Mirror,
                Some("flow") => WrapStyle::Flow,
                _ => WrapStyle::Clamp,
            };
            Tag::TexFill { x, y, wrap }
        }
        "blend" => Tag::Blend(match value {
            "over" => BlendTag::Over,
            "add" => BlendTag::Add,
            "sub" => BlendTag::Sub,
            "mul" => BlendTag::Mul,
            "screen" => BlendTag::Screen,
            "diff" => BlendTag::Diff,
            _ => return None,
        }),
        "blur" => {
            let n = nums();
            Tag::Blur { h: *n.first()?, v: *n.get(1).unwrap_or(&n[0]) }
        }
        "stc" => Tag::Stencil(match value {
            "off" => StencilMode::Off,
            "set" => StencilMode::Set,
            "unset" => StencilMode::Unset,
            "inside" | "in" => StencilMode::Inside,
            "outside" | "out" => StencilMode::Outside,
            _ => return None,
        }),
        "fad" => {
            let n = nums();
            Tag::Fade { in_ms: *n.first()? as u32, out_ms: *n.get(1).unwrap_or(&0.0) as u32 }
        }
        "k" => Tag::KaraokeDuration(value.trim().parse::<f32>().ok()?.max(0.0) as u32),
        "ks" => Tag::KaraokeSet(value.trim().parse::<f32>().ok()?.max(0.0) as u32),
        "kc" => Tag::KaraokeColor(parse_rgb(value)?),
        "km" => Tag::KaraokeMode(match value {
            "fill" => KaraokeMode::Fill,
            "solid" => KaraokeMode::Solid,
            "glow" => KaraokeMode::Glow,
            _ => return None,
        }),
        "b" | "i" | "u" | "s" => Tag::FontStyle(FontStyle {
            bold: key == "b" && value != "0",
            italic: key == "i" && value != "0",
            underline: key == "u" && value != "0",
            strikeout: key == "s" && value != "0",
        }),
        "ani" => parse_animate(value)?,
        _ => return None,
    })
}

/// Parses `ani=(tags)`, `ani=start,end,(tags)` and
/// `ani=start,end,expr,(tags)` (the last field lets the caller reshape the
/// raw `0..1` progress with an expression evaluated against `t`, spec §4.2
/// step 3).
fn parse_animate(value: &str) -> Option<Tag> {
    let inner_start = value.find('(')?;
    let inner_end = value.rfind(')')?;
    let header = value[..inner_start].trim_end_matches(',');
    let inner_text = &value[inner_start + 1..inner_end];

    let (start, end, progress_expr) = if header.is_empty() {
        (i64::MAX, i64::MAX, String::new())
    } else {
        let mut it = header.splitn(3, ',');
        let s: i64 = it.next()?.trim().parse().ok()?;
        let e: i64 = it.next()?.trim().parse().ok()?;
        let expr = it.next().map(|s| s.trim().to_string()).unwrap_or_default();
        (s, e, expr)
    };

    let inner: Vec<Tag> = inner_text.split(';').filter_map(|t| parse_tag(t.trim())).collect();

    Some(Tag::Animate {
        start,
        end,
        progress_expr,
        inner,
    })
}

fn parse_rgb(text: &str) -> Option<Rgb> {
    if text.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&text[0..2], 16).ok()?;
    let g = u8::from_str_radix(&text[2..4], 16).ok()?;
    let b = u8::from_str_radix(&text[4..6], 16).ok()?;
    Some(Rgb { r, g, b })
}

fn parse_colors(value: &str) -> Option<Vec<Rgb>> {
    let colors: Option<Vec<Rgb>> = value.split(',').map(parse_rgb).collect();
    colors.filter(|c| !c.is_empty())
}

fn parse_alphas(value: &str) -> Option<Vec<u8>> {
    let alphas: Option<Vec<u8>> = value
        .split(',')
        .map(|v| v.trim().parse::<f32>().ok().map(|f| f.clamp(0.0, 255.0) as u8))
        .collect();
    alphas.filter(|a| !a.is_empty())
}

/// Parses the `m`/`l`/`b`/`a`/`c` token stream used by path-geometry
/// literals, both the `{gm=p}` in-text mode above and standalone callers
/// (e.g. tests) constructing a `Geometry::Path` directly from a string.
pub fn parse_path_literal(text: &str) -> Vec<PathCommand> {
    let mut commands = Vec::new();
    let mut tokens = text.split_whitespace();
    let mut num = |tokens: &mut std::str::SplitWhitespace| -> f32 { tokens.next().and_then(|v| v.parse().ok()).unwrap_or(0.0) };
    while let Some(tok) = tokens.next() {
        match tok {
            "m" => {
                let x = num(&mut tokens);
                let y = num(&mut tokens);
                commands.push(PathCommand::Move(CurvePoint { x, y }));
            }
            "l" => {
                let x = num(&mut tokens);
                let y = num(&mut tokens);
                commands.push(PathCommand::Line(CurvePoint { x, y }));
            }
            "b" => {
                let p1 = CurvePoint { x: num(&mut tokens), y: num(&mut tokens) };
                let p2 = CurvePoint { x: num(&mut tokens), y: num(&mut tokens) };
                let p3 = CurvePoint { x: num(&mut tokens), y: num(&mut tokens) };
                commands.push(PathCommand::Curve([p1, p2, p3]));
            }
            "a" => {
                let center = CurvePoint { x: num(&mut tokens), y: num(&mut tokens) };
                let degrees = num(&mut tokens);
                commands.push(PathCommand::Arc { center, degrees });
            }
            "c" => commands.push(PathCommand::Close),
            _ => {}
        }
    }
    commands
}

/// Parses a flat `x y x y ...` literal into the point cloud used by
/// `Geometry::Points` under `{gm=pt}`.
pub fn parse_points_literal(text: &str) -> Vec<CurvePoint> {
    let mut points = Vec::new();
    let mut tokens = text.split_whitespace();
    while let (Some(x), Some(y)) = (tokens.next(), tokens.next()) {
        if let (Ok(x), Ok(y)) = (x.parse(), y.parse()) {
            points.push(CurvePoint { x, y });
        }
    }
    points
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn time_roundtrip() {
        for ms in [0, 500, 1000, 61_000, 3_661_500, 99 * 3_600_000 + 59_000] {
            let formatted = format_time(ms);
            assert_eq!(parse_time(&formatted), Some(ms));
        }
    }

    #[test]
    fn parses_static_text_event() {
        let text = "#EVENTS\n00:00:00.000-00:00:01.000|||{fs=30;cl=FF0000}Hi";
        let (script, warnings) = parse_str(text);
        assert!(warnings.is_empty());
        assert_eq!(script.events.len(), 1);
        let ev = &script.events[0];
        assert_eq!(ev.start_ms, 0);
        assert_eq!(ev.end_ms, 1000);
        assert!(ev.static_tags);
    }

    #[test]
    fn empty_tag_block_matches_no_tag_block() {
        let a = parse_str("#EVENTS\n00:00:00.000-00:00:01.000|||Hi").0;
        let b = parse_str("#EVENTS\n00:00:00.000-00:00:01.000|||{}Hi").0;
        assert_eq!(a.events[0].objects, b.events[0].objects);
    }

    #[test]
    fn malformed_event_line_is_dropped_as_warning() {
        let (script, warnings) = parse_str("#EVENTS\nnonsense|||Hi");
        assert!(script.events.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn geometry_mode_switches_literal_to_path() {
        let text = "#EVENTS\n00:00:00.000-00:00:01.000|||{gm=p}m 0 0 l 100 0 l 100 100 l 0 100 c{stc=in}{cl=0000FF}Hello";
        let (script, warnings) = parse_str(text);
        assert!(warnings.is_empty());
        let objects = &script.events[0].objects;
        let path = objects.iter().find_map(|o| match o {
            Object::Geometry(Geometry::Path(cmds)) => Some(cmds),
            _ => None,
        });
        assert!(path.is_some(), "expected a path geometry: {objects:?}");
        assert_eq!(path.unwrap().last(), Some(&PathCommand::Close));
        let text_geom = objects.iter().find_map(|o| match o {
            Object::Geometry(Geometry::Text(t)) => Some(t.as_str()),
            _ => None,
        });
        assert_eq!(text_geom, Some("Hello"));
    }

    #[test]
    fn karaoke_and_text_parse_into_objects() {
        let (script, _) = parse_str("#EVENTS\n00:00:00.000-00:00:01.000|||{k=500;kc=00FF00}AB{k=500}CD");
        assert!(!script.events[0].static_tags);
    }

    #[test]
    fn karaoke_duration_tag_is_plain_milliseconds() {
        let (script, _) = parse_str("#EVENTS\n00:00:00.000-00:00:01.000|||{k=500}AB");
        let tag = script.events[0].objects.iter().find_map(|o| match o {
            Object::Tag(Tag::KaraokeDuration(d)) => Some(*d),
            _ => None,
        });
        assert_eq!(tag, Some(500));
    }
}
