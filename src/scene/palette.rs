//! Colour palette mapping voxel colour indices to RGBA.

use serde::Serialize;

/// Maximum number of palette entries addressable by a `u8` colour index.
pub const PALETTE_MAX_COLORS: usize = 256;

/// An ordered table of up to 256 RGBA colours.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Palette {
    colors: Vec<[u8; 4]>,
}

impl Palette {
    /// Create an empty palette.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a palette from explicit colours. Entries past 256 are dropped.
    pub fn from_colors(colors: impl IntoIterator<Item = [u8; 4]>) -> Self {
        Self {
            colors: colors.into_iter().take(PALETTE_MAX_COLORS).collect(),
        }
    }

    /// A full 256-entry palette of distinct opaque colours (3-3-2 RGB ramp).
    pub fn rgb332() -> Self {
        let channel = |v: u32, max: u32| (v * 255 / max) as u8;
        Self::from_colors((0u32..256).map(|i| {
            [
                channel((i >> 5) & 7, 7),
                channel((i >> 2) & 7, 7),
                channel(i & 3, 3),
                255,
            ]
        }))
    }

    /// Build a palette from colours observed in stream order.
    ///
    /// Fully transparent colours are ignored. The first 256 distinct colours
    /// become entries; later colours are left to [`index_of`](Self::index_of)
    /// to map onto their nearest entry.
    pub fn from_observed(colors: impl IntoIterator<Item = [u8; 4]>) -> Self {
        let mut palette = Self::new();
        for color in colors {
            if palette.colors.len() == PALETTE_MAX_COLORS {
                break;
            }
            if color[3] == 0 {
                continue;
            }
            if palette.find_exact(color).is_none() {
                palette.colors.push(color);
            }
        }
        palette
    }

    /// Append a colour, returning its index, or `None` when the palette is full.
    pub fn push(&mut self, color: [u8; 4]) -> Option<u8> {
        if self.colors.len() >= PALETTE_MAX_COLORS {
            return None;
        }
        self.colors.push(color);
        Some((self.colors.len() - 1) as u8)
    }

    /// Colour at `index`; indices past the end read as opaque black.
    pub fn color(&self, index: u8) -> [u8; 4] {
        self.colors
            .get(index as usize)
            .copied()
            .unwrap_or([0, 0, 0, 255])
    }

    pub fn colors(&self) -> &[[u8; 4]] {
        &self.colors
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Index of the first entry equal to `color`.
    pub fn find_exact(&self, color: [u8; 4]) -> Option<u8> {
        self.colors
            .iter()
            .position(|c| *c == color)
            .map(|i| i as u8)
    }

    /// Index of the entry closest to `color` (squared RGBA distance, first wins ties).
    pub fn closest(&self, color: [u8; 4]) -> u8 {
        let distance = |c: &[u8; 4]| -> u32 {
            c.iter()
                .zip(color.iter())
                .map(|(a, b)| {
                    let d = *a as i32 - *b as i32;
                    (d * d) as u32
                })
                .sum()
        };
        self.colors
            .iter()
            .enumerate()
            .min_by_key(|(_, c)| distance(c))
            .map_or(0, |(i, _)| i as u8)
    }

    /// Exact match if present, nearest entry otherwise.
    pub fn index_of(&self, color: [u8; 4]) -> u8 {
        self.find_exact(color).unwrap_or_else(|| self.closest(color))
    }
}
