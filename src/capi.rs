//! Stable C ABI for embedding this renderer from a non-Rust host (spec §6).
//!
//! Grounded on the teacher's `src/capi.rs` opaque-handle idiom
//! (`Box::into_raw`/`Box::from_raw`, `#[unsafe(no_mangle)] unsafe extern "C"
//! fn`, raw pointer + length for borrowed text), but deliberately narrower:
//! the teacher exposes a thread-local "get last error string/code" query
//! pair plus a whole subtitle-format probing/loading surface behind a
//! separate library handle. This format's C ABI is the five entry points
//! spec §6 names, and diagnostics are reported through a caller-supplied
//! fixed buffer instead of thread-local state, so there is no last-error
//! query pair and no separate library handle to construct first (see
//! DESIGN.md).

use std::ffi::{c_char, CStr};
use std::os::raw::c_int;
use std::path::PathBuf;

use crate::color::FrameFormat;
use crate::parse::Warning;
use crate::renderer::{Renderer, ScriptSource};

/// Matches spec §6 "warning string (capacity 256)".
const WARNING_BUF_CAPACITY: usize = 256;

fn frame_format_from_code(code: u32) -> Option<FrameFormat> {
    match code {
        0 => Some(FrameFormat::Bgr),
        1 => Some(FrameFormat::Bgrx),
        2 => Some(FrameFormat::Bgra),
        _ => None,
    }
}

fn join_warnings(warnings: &[Warning]) -> String {
    warnings
        .iter()
        .map(Warning::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Writes `message` (truncated to fit) plus a NUL terminator into
/// `warning_out`, a caller-owned buffer of at least `WARNING_BUF_CAPACITY`
/// bytes. A null `warning_out` is a no-op.
unsafe fn write_warning(warning_out: *mut c_char, message: &str) {
    if warning_out.is_null() {
        return;
    }
    let bytes = message.as_bytes();
    let n = bytes.len().min(WARNING_BUF_CAPACITY - 1);
    let dst = std::slice::from_raw_parts_mut(warning_out.cast::<u8>(), WARNING_BUF_CAPACITY);
    dst[..n].copy_from_slice(&bytes[..n]);
    dst[n] = 0;
}

unsafe fn finish_construction(
    warning_out: *mut c_char,
    result: Result<(Renderer, Vec<Warning>), crate::renderer::ConstructError>,
) -> *mut Renderer {
    match result {
        Ok((renderer, warnings)) => {
            if !warnings.is_empty() {
                write_warning(warning_out, &join_warnings(&warnings));
            }
            Box::into_raw(Box::new(renderer))
        }
        Err(error) => {
            write_warning(warning_out, &error.to_string());
            std::ptr::null_mut()
        }
    }
}

/// Parses the script at `script_path` (a NUL-terminated path) and constructs
/// a renderer targeting `(width, height, format)`. Returns null on failure,
/// in which case (and on any non-fatal parse warning) `warning_out` — a
/// caller-owned buffer of at least 256 bytes, or null to ignore — is filled
/// with a NUL-terminated diagnostic.
#[unsafe(no_mangle)]
unsafe extern "C" fn sbr_create_renderer(
    width: u32,
    height: u32,
    format: u32,
    script_path: *const c_char,
    warning_out: *mut c_char,
) -> *mut Renderer {
    let Some(format) = frame_format_from_code(format) else {
        write_warning(warning_out, "unsupported colour format");
        return std::ptr::null_mut();
    };
    if script_path.is_null() {
        write_warning(warning_out, "script_path is null");
        return std::ptr::null_mut();
    }

    let path = PathBuf::from(CStr::from_ptr(script_path).to_string_lossy().into_owned());
    let result = Renderer::new(width, height, format, ScriptSource::Path(path));
    finish_construction(warning_out, result)
}

/// As [`sbr_create_renderer`], but parses `data[..data_len]` (UTF-8 script
/// text, not necessarily NUL-terminated) instead of reading a file. Relative
/// `texture=` paths resolve against the process's current directory.
#[unsafe(no_mangle)]
unsafe extern "C" fn sbr_create_renderer_from_memory(
    width: u32,
    height: u32,
    format: u32,
    data: *const c_char,
    data_len: usize,
    warning_out: *mut c_char,
) -> *mut Renderer {
    let Some(format) = frame_format_from_code(format) else {
        write_warning(warning_out, "unsupported colour format");
        return std::ptr::null_mut();
    };
    if data.is_null() {
        write_warning(warning_out, "data is null");
        return std::ptr::null_mut();
    }

    let Ok(text) = std::str::from_utf8(std::slice::from_raw_parts(data.cast::<u8>(), data_len))
    else {
        write_warning(warning_out, "script is not valid UTF-8");
        return std::ptr::null_mut();
    };

    let result = Renderer::new(
        width,
        height,
        format,
        ScriptSource::Memory {
            text: text.to_owned(),
            base_dir: PathBuf::new(),
        },
    );
    finish_construction(warning_out, result)
}

/// Reallocates the renderer's stencil surface and clears its tile cache for
/// the new target (spec §4.9, §4.10). Returns -1 for an unrecognised
/// `format`, 0 on success.
#[unsafe(no_mangle)]
unsafe extern "C" fn sbr_set_target(
    renderer: *mut Renderer,
    width: u32,
    height: u32,
    format: u32,
) -> c_int {
    let Some(format) = frame_format_from_code(format) else {
        return -1;
    };
    (*renderer).set_target(width, height, format);
    0
}

/// Renders every event active at `start_ms` onto `image_ptr`, a buffer
/// `stride * target_height` bytes long in the renderer's current target
/// format (bottom-up rows, per spec §9).
#[unsafe(no_mangle)]
unsafe extern "C" fn sbr_render(renderer: *mut Renderer, image_ptr: *mut u8, stride: usize, start_ms: u32) {
    let (_, height) = (*renderer).target_size();
    let frame = std::slice::from_raw_parts_mut(image_ptr, stride * height as usize);
    (*renderer).render(frame, stride, start_ms);
}

#[unsafe(no_mangle)]
unsafe extern "C" fn sbr_free_renderer(renderer: *mut Renderer) {
    if !renderer.is_null() {
        drop(Box::from_raw(renderer));
    }
}
