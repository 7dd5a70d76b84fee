//! A styled-subtitle renderer: parses a tag-driven scripting format into a
//! render-state machine, lays out and rasterizes each active event, and
//! blends the result onto a caller-owned video frame.
//!
//! Grounded on the teacher's crate shape (`src/lib.rs` wires a handful of
//! focused modules behind a `Renderer` façade and a C ABI) but built around
//! this format's own pipeline: [`script`] is the parsed data model,
//! [`parse`] turns text into it, [`state`] walks tags into a mutable style
//! snapshot, [`layout`] groups/wraps/aligns geometries per event,
//! [`outline`]/[`text`]/[`texture`] build and shade the vector geometry,
//! [`raster`] turns outlines into tiles, [`color`] blends tiles onto a
//! frame, [`cache`] remembers unchanging events across frames, and
//! [`renderer`] ties all of it into the public API that [`capi`] exposes to
//! C callers.

pub mod cache;
pub mod color;
pub mod expr;
pub mod layout;
pub mod outline;
pub mod parse;
pub mod raster;
pub mod renderer;
pub mod script;
pub mod state;
pub mod text;
pub mod texture;

mod capi;

pub use renderer::{ConstructError, Renderer, ScriptSource};
