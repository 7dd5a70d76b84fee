//! Lazy texture loading and pattern sampling for `texture`/`texfill` tags
//! (spec §3, §4.6 "Texture fill").
//!
//! Image decoding of arbitrary texture files is an explicit Non-goal
//! (delegated to a 2D graphics library the host embeds); this module
//! recognizes exactly one self-describing raw format so the texture-fill
//! pipeline has something concrete to sample without pulling in a decoder
//! dependency the spec places out of scope. Any other file (or a missing
//! one) degrades to `TextureMissing` (spec §7): logged, never fatal.

use std::path::{Path, PathBuf};

use crate::color::Rgba8;
use crate::script::WrapStyle;

const MAGIC: &[u8; 8] = b"SSBTEX1\0";

/// A decoded RGBA8 (straight, not premultiplied) texture image.
#[derive(Debug, Clone)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pixels: Vec<Rgba8>,
}

impl Texture {
    /// Parses the crate's raw texture dump: an 8-byte magic, `u32` width,
    /// `u32` height (both little-endian), then `width*height` RGBA8 texels.
    pub fn load(path: &Path) -> Option<Self> {
        let bytes = std::fs::read(path).ok()?;
        Self::parse(&bytes)
    }

    fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 16 || &bytes[0..8] != MAGIC {
            return None;
        }
        let width = u32::from_le_bytes(bytes[8..12].try_into().ok()?);
        let height = u32::from_le_bytes(bytes[12..16].try_into().ok()?);
        let expected = (width as usize).checked_mul(height as usize)?.checked_mul(4)?;
        let data = bytes.get(16..16 + expected)?;
        let pixels = data
            .chunks_exact(4)
            .map(|c| Rgba8::new(c[0], c[1], c[2], c[3]))
            .collect();
        Some(Self { width, height, pixels })
    }

    fn wrap_coord(coord: i64, size: u32, wrap: WrapStyle) -> Option<u32> {
        if size == 0 {
            return None;
        }
        let size = size as i64;
        match wrap {
            WrapStyle::Clamp => Some(coord.clamp(0, size - 1) as u32),
            WrapStyle::Repeat | WrapStyle::Flow => Some(coord.rem_euclid(size) as u32),
            WrapStyle::Mirror => {
                let period = size * 2;
                let m = coord.rem_euclid(period);
                Some(if m < size { m as u32 } else { (period - 1 - m) as u32 })
            }
        }
    }

    /// Samples the texture at integer tile-space coordinates after
    /// subtracting `(offset_x, offset_y)`, wrapping per `wrap`.
    pub fn sample(&self, x: i64, y: i64, offset_x: i64, offset_y: i64, wrap: WrapStyle) -> Rgba8 {
        let (Some(sx), Some(sy)) = (
            Self::wrap_coord(x - offset_x, self.width, wrap),
            Self::wrap_coord(y - offset_y, self.height, wrap),
        ) else {
            return Rgba8::TRANSPARENT;
        };
        self.pixels[sy as usize * self.width as usize + sx as usize]
    }
}

/// Resolves `filename` relative to `base_dir` (the script's own directory,
/// spec §9 "replace global state with a field owned by each Renderer
/// instance"), returning `None` (⇒ `TextureMissing`, spec §7) on any I/O or
/// format failure.
pub fn resolve(base_dir: &Path, filename: &str) -> Option<Texture> {
    let path: PathBuf = if Path::new(filename).is_absolute() {
        PathBuf::from(filename)
    } else {
        base_dir.join(filename)
    };
    Texture::load(&path)
}

/// Multiplies `tile` by `texture` sampled at `(fill_x+tex_x, fill_y+tex_y)`
/// with `wrap`, using the texture as both a colour modulator and an alpha
/// mask (spec §4.6 "Texture fill"): `out = tile.rgb * tex.rgb` premultiplied
/// by `tile.a * tex.a`.
pub fn apply_texture_fill(
    tile: &mut crate::raster::Tile,
    texture: &Texture,
    fill_x: f32,
    fill_y: f32,
    tex_x: f32,
    tex_y: f32,
    wrap: WrapStyle,
) {
    let offset_x = (fill_x + tex_x).round() as i64;
    let offset_y = (fill_y + tex_y).round() as i64;
    for ty in 0..tile.height {
        for tx in 0..tile.width {
            let world_x = (tile.x + tx as i32) as i64;
            let world_y = (tile.y + ty as i32) as i64;
            let texel = texture.sample(world_x, world_y, offset_x, offset_y, wrap);
            let idx = ty * tile.width + tx;
            let p = tile.pixels[idx];
            if p.a == 0 {
                continue;
            }
            // Unpremultiply, modulate by the texel in straight space, then
            // repremultiply against the combined alpha.
            let straight = |c: u8| (c as u32 * 255 / p.a as u32).min(255);
            let new_a = (p.a as u32 * texel.a as u32) / 255;
            let modulate = |c: u32, t: u8| (c * t as u32 / 255) * new_a / 255;
            let r = modulate(straight(p.r), texel.r) as u8;
            let g = modulate(straight(p.g), texel.g) as u8;
            let b = modulate(straight(p.b), texel.b) as u8;
            tile.pixels[idx] = Rgba8::new(r, g, b, new_a as u8);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_texture() -> Texture {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&2u32.to_le_bytes());
        for _ in 0..4 {
            bytes.extend_from_slice(&[255, 0, 0, 255]);
        }
        Texture::parse(&bytes).unwrap()
    }

    #[test]
    fn parses_raw_dump() {
        let tex = sample_texture();
        assert_eq!((tex.width, tex.height), (2, 2));
        assert_eq!(tex.sample(0, 0, 0, 0, WrapStyle::Clamp), Rgba8::new(255, 0, 0, 255));
    }

    #[test]
    fn clamp_wrap_saturates_at_edge() {
        let tex = sample_texture();
        assert_eq!(tex.sample(10, 10, 0, 0, WrapStyle::Clamp), Rgba8::new(255, 0, 0, 255));
    }

    #[test]
    fn missing_file_returns_none() {
        assert!(Texture::load(Path::new("/nonexistent/path/to/texture.raw")).is_none());
    }

    #[test]
    fn bad_magic_is_rejected() {
        assert!(Texture::parse(b"not-a-texture-file").is_none());
    }
}
