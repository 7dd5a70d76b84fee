//! End-to-end rendering scenarios driven entirely through the public
//! `Renderer` API (spec §8). These assert on actual pixel values in an
//! in-memory BGRA frame buffer rather than image hashes, since this crate's
//! `sbr-test-util` PNG-snapshot harness needs pre-generated fixture pointer
//! files this workspace has no way to produce.

use ssbr::color::FrameFormat;
use ssbr::renderer::{Renderer, ScriptSource};

fn render(text: &str, width: u32, height: u32, t_ms: u32) -> Vec<u8> {
    let (mut renderer, warnings) = Renderer::new(
        width,
        height,
        FrameFormat::Bgra,
        ScriptSource::Memory {
            text: text.to_string(),
            base_dir: std::path::PathBuf::new(),
        },
    )
    .expect("script should parse");
    assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");

    let stride = width as usize * 4;
    let mut frame = vec![0u8; stride * height as usize];
    renderer.render(&mut frame, stride, t_ms);
    frame
}

/// Reads a BGRA pixel at top-down coordinate `(x, y)` out of a bottom-up
/// frame buffer, per `color::blend_tile`'s row mapping.
fn pixel(frame: &[u8], stride: usize, frame_height: u32, x: i32, y: i32) -> (u8, u8, u8, u8) {
    let row = frame_height as i32 - 1 - y;
    let offset = row as usize * stride + x as usize * 4;
    (frame[offset + 2], frame[offset + 1], frame[offset], frame[offset + 3])
}

#[test]
fn static_text_centers_and_bottom_aligns_on_frame_anchor() {
    let text = "#EVENTS\n00:00:00.000-00:00:01.000|||{lw=0;fs=30;cl=FF0000}Hi";
    let frame = render(text, 640, 480, 500);
    let stride = 640 * 4;

    // "Hi" is one 36px-wide atom; default align=2 (center, bottom) puts its
    // centre on (320, 480) and its box flush with the frame's bottom edge.
    let (r, g, b, a) = pixel(&frame, stride, 480, 310, 465);
    assert_eq!((r, g, b, a), (255, 0, 0, 255), "expected opaque red inside the glyph box");

    // Well clear of the glyph run, the frame must be untouched.
    let (_, _, _, a) = pixel(&frame, stride, 480, 100, 465);
    assert_eq!(a, 0, "background outside the text run must stay transparent");
}

#[test]
fn fade_scales_alpha_at_boundaries_and_leaves_steady_state_untouched() {
    let text =
        "#EVENTS\n00:00:00.000-00:00:01.000|||{lw=0;an=7;pos=200,150;gm=p;cl=FF0000;fad=200,200}m 0 0 l 100 0 l 100 100 l 0 100 c";
    let stride = 640 * 4;

    // 100ms into a 200ms fade-in: half-opacity.
    let frame_in = render(text, 640, 480, 100);
    let (r, _, _, a) = pixel(&frame_in, stride, 480, 250, 200);
    assert_eq!((r, a), (128, 128));

    // Mid-event, outside both fade windows: full opacity.
    let frame_steady = render(text, 640, 480, 500);
    let (r, _, _, a) = pixel(&frame_steady, stride, 480, 250, 200);
    assert_eq!((r, a), (255, 255));

    // 100ms from the end, inside the 200ms fade-out window: half-opacity again.
    let frame_out = render(text, 640, 480, 900);
    let (r, _, _, a) = pixel(&frame_out, stride, 480, 250, 200);
    assert_eq!((r, a), (128, 128));
}

#[test]
fn karaoke_recolors_only_the_elapsed_portion_of_each_word() {
    let text = "#EVENTS\n00:00:00.000-00:00:01.000|||{lw=0;fs=30;k=500;kc=00FF00}AB{k=500}CD";
    let stride = 640 * 4;

    // Glyph sample points, derived from the synthetic shaper's fixed 18px
    // cell width at fs=30 and the default centre/bottom anchor at (320, 480).
    let a_x = 292;
    let b_x = 311;
    let c_x = 329;
    let d_x = 347;
    let y = 465;

    let white = (255, 255, 255, 255);
    let green = (0, 255, 0, 255);

    // First word's karaoke window is [0, 500)ms, second word's is [500, 1000)ms.
    let half_in_ab = render(text, 640, 480, 250);
    assert_eq!(pixel(&half_in_ab, stride, 480, a_x, y), green, "A is half elapsed");
    assert_eq!(pixel(&half_in_ab, stride, 480, b_x, y), white, "B has not elapsed yet");
    assert_eq!(pixel(&half_in_ab, stride, 480, c_x, y), white, "CD window hasn't started");
    assert_eq!(pixel(&half_in_ab, stride, 480, d_x, y), white, "CD window hasn't started");

    let half_in_cd = render(text, 640, 480, 750);
    assert_eq!(pixel(&half_in_cd, stride, 480, a_x, y), green, "AB fully elapsed");
    assert_eq!(pixel(&half_in_cd, stride, 480, b_x, y), green, "AB fully elapsed");
    assert_eq!(pixel(&half_in_cd, stride, 480, c_x, y), green, "C is half elapsed");
    assert_eq!(pixel(&half_in_cd, stride, 480, d_x, y), white, "D has not elapsed yet");
}

#[test]
fn stencil_inside_keeps_only_the_overlap_with_the_set_region() {
    let text = "#EVENTS\n00:00:00.000-00:00:01.000|||\
        {lw=0;an=7;pos=200,150;gm=p;cl=FFFFFF;stc=set}m 0 0 l 100 0 l 100 100 l 0 100 c\
        {an=7;pos=150,100;cl=0000FF;stc=in}m 0 0 l 200 0 l 200 200 l 0 200 c";
    let frame = render(text, 640, 480, 500);
    let stride = 640 * 4;

    // Inside both the 100x100 stencil-setting square and the larger
    // stencil=in square: fully visible blue.
    let (r, g, b, a) = pixel(&frame, stride, 480, 250, 200);
    assert_eq!((r, g, b, a), (0, 0, 255, 255));

    // Inside the larger square but outside the stencil region: masked out.
    let (_, _, _, a) = pixel(&frame, stride, 480, 320, 120);
    assert_eq!(a, 0);
}

#[test]
fn animate_rotation_swaps_extent_at_90_degrees_and_restores_it_at_180() {
    // Spec §8 scenario 5: `{ani=0,1000,(rz=360)}X` — at t=250ms the glyph is
    // rotated 90°, at t=500ms 180°. `rz` is an in-plane z-axis rotation
    // (`Matrix3::rotate_z`), not the `rotate_xy` x/y-squash formula, so the
    // 200x100 rectangle (centered on its anchor) pivots rather than
    // collapsing to a point.
    let text = "#EVENTS\n00:00:00.000-00:00:01.000|||\
        {lw=0;an=5;pos=320,240;gm=p;cl=00FF00;ani=0,1000,(rz=360)}\
        m -100 -50 l 100 -50 l 100 50 l -100 50 c";
    let stride = 640 * 4;
    let row_y = 240; // passes through the rectangle's centre, where it stays pinned.

    let visible_width = |t_ms: u32| -> usize {
        let frame = render(text, 640, 480, t_ms);
        (100..540).filter(|&x| pixel(&frame, stride, 480, x, row_y).3 > 0).count()
    };

    let w0 = visible_width(0); // p=0, angle=0 degrees: full 200px width.
    let w250 = visible_width(250); // p=0.25, angle=90 degrees: collapses to the 100px height.
    let w500 = visible_width(500); // p=0.5, angle=180 degrees: rotates back to the full width.

    assert!(w0 > 190, "expected close to the full 200px width at 0 degrees, got {w0}");
    assert!(w250 < 120 && w250 > 80, "expected ~100px (the rectangle's height) at 90 degrees, got {w250}");
    assert!(w500 > 190, "expected the full width restored at 180 degrees, got {w500}");
}

#[test]
fn resize_after_render_reallocates_stencil_and_rerenders_correctly() {
    let text = "#EVENTS\n00:00:00.000-00:00:01.000|||{lw=0;fs=30;cl=FF0000}Hi";
    let (mut renderer, _warnings) = Renderer::new(
        640,
        480,
        FrameFormat::Bgra,
        ScriptSource::Memory { text: text.to_string(), base_dir: std::path::PathBuf::new() },
    )
    .unwrap();

    let mut first = vec![0u8; 640 * 480 * 4];
    renderer.render(&mut first, 640 * 4, 500);
    let (r, _, _, a) = pixel(&first, 640 * 4, 480, 310, 465);
    assert_eq!((r, a), (255, 255));

    renderer.set_target(320, 240, FrameFormat::Bgra);
    let mut second = vec![0u8; 320 * 240 * 4];
    renderer.render(&mut second, 320 * 4, 500);

    // Re-centred on the new, smaller frame: (160, 240) instead of (320, 480).
    let (r, _, _, a) = pixel(&second, 320 * 4, 240, 155, 225);
    assert_eq!((r, a), (255, 255), "text should re-anchor to the new target size");
}

#[test]
fn empty_tag_block_renders_identically_to_no_tag_block() {
    let with_block = render("#EVENTS\n00:00:00.000-00:00:01.000|||{}Hi", 640, 480, 500);
    let without_block = render("#EVENTS\n00:00:00.000-00:00:01.000|||Hi", 640, 480, 500);
    assert_eq!(with_block, without_block);
}
