//! Burn a short label into a frame with a built-in 5x7 bitmap font.

use trigcam_camera::Frame;

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
const SCALE: u32 = 2;
const ADVANCE: u32 = (GLYPH_WIDTH + 1) * SCALE;

/// Where frame ids are stamped.
pub const STAMP_ORIGIN: (u32, u32) = (10, 10);

/// BGR green.
pub const STAMP_COLOR: [u8; 3] = [0, 255, 0];

/// Draw `text` with its top-left corner at `origin`. Pixels outside the frame
/// are clipped. Lowercase letters use the uppercase glyphs.
pub fn stamp(frame: &mut Frame, text: &str, origin: (u32, u32), color: [u8; 3]) {
    let mut x0 = origin.0;
    for ch in text.chars() {
        let rows = glyph(ch.to_ascii_uppercase());
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                let px = x0 + col * SCALE;
                let py = origin.1 + row as u32 * SCALE;
                for dy in 0..SCALE {
                    for dx in 0..SCALE {
                        frame.put_pixel(px + dx, py + dy, color);
                    }
                }
            }
        }
        x0 = x0.saturating_add(ADVANCE);
        if x0 >= frame.width {
            break;
        }
    }
}

/// `<camera>_<sequence>` at the standard position.
pub fn stamp_frame_id(frame: &mut Frame, camera_name: &str) {
    let label = format!("{camera_name}_{}", frame.sequence);
    stamp(frame, &label, STAMP_ORIGIN, STAMP_COLOR);
}

fn glyph(ch: char) -> [u8; GLYPH_HEIGHT as usize] {
    match ch {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        'A' => [0x0E, 0x11, 0x11, 0x11, 0x1F, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ' ' => [0x00; 7],
        _ => [0x1F, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1F],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trigcam_camera::PixelFormat;

    #[test]
    fn stamp_draws_scaled_glyph() {
        let mut frame = Frame::filled(40, 30, PixelFormat::Bgr8, 0, 0);
        stamp(&mut frame, "1", (2, 2), STAMP_COLOR);

        let pixel = |f: &Frame, x: u32, y: u32| {
            let offset = y as usize * f.stride() + x as usize * 3;
            [f.data()[offset], f.data()[offset + 1], f.data()[offset + 2]]
        };
        // top row of '1' has only the middle column set
        assert_eq!(pixel(&frame, 2 + 2 * SCALE, 2), STAMP_COLOR);
        assert_eq!(pixel(&frame, 2 + 2 * SCALE + 1, 3), STAMP_COLOR);
        assert_eq!(pixel(&frame, 2, 2), [0, 0, 0]);
        // bottom row is three wide
        assert_eq!(pixel(&frame, 2 + SCALE, 2 + 6 * SCALE), STAMP_COLOR);
    }

    #[test]
    fn mono_frames_take_the_green_channel() {
        let mut frame = Frame::filled(60, 30, PixelFormat::Mono8, 42, 0);
        stamp_frame_id(&mut frame, "cam0");
        assert!(frame.data().iter().any(|&v| v == 255));
        assert!(frame.data().iter().all(|&v| v == 0 || v == 255));
    }

    #[test]
    fn text_is_clipped_at_the_frame_edge() {
        let mut frame = Frame::filled(12, 12, PixelFormat::Mono8, 0, 0);
        stamp(&mut frame, "WWWWWWWW", (0, 0), STAMP_COLOR);
        assert_eq!(frame.data().len(), 144);
    }
}
