//! Built-in 32x32 icon stamped on every save package

use crate::core::package::{ICON_SIZE, PALETTE_LEN};

/// ARGB4444 palette: transparent, outline, body, label, shutter
pub const DEFAULT_PALETTE: [u16; PALETTE_LEN] = [
    0x0000, 0xF222, 0xF46B, 0xFEEE, 0xF999, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

static DEFAULT_ICON: [u8; ICON_SIZE] = render_card();

/// Pixels of the default icon, two 4-bit pixels per byte (left pixel high)
pub fn default_icon() -> &'static [u8; ICON_SIZE] {
    &DEFAULT_ICON
}

const fn card_pixel(x: usize, y: usize) -> u8 {
    if x < 2 || x > 29 || y < 2 || y > 29 {
        0
    } else if x == 2 || x == 29 || y == 2 || y == 29 {
        1
    } else if x >= 7 && x < 25 && y >= 5 && y < 15 {
        3
    } else if x >= 10 && x < 22 && y >= 21 && y < 29 {
        4
    } else {
        2
    }
}

const fn render_card() -> [u8; ICON_SIZE] {
    let mut pixels = [0u8; ICON_SIZE];
    let mut y = 0;
    while y < 32 {
        let mut x = 0;
        while x < 32 {
            pixels[y * 16 + x / 2] = (card_pixel(x, y) << 4) | card_pixel(x + 1, y);
            x += 2;
        }
        y += 1;
    }
    pixels
}
