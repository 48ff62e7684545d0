//! 16³ voxel blocks stored as 64x64 RGBA images.
//!
//! Cell `(x, y, z)` maps to linear index `i = x + 16y + 256z`, which lands on
//! pixel `(i % 64, i / 64)`. A pixel with alpha 0 is an empty cell; any other
//! pixel is a voxel whose colour is matched against the palette.

use crate::error::{Result, SceneError};
use crate::scene::Palette;
use glam::IVec3;
use image::{ImageEncoder, RgbaImage};
use std::collections::HashMap;

/// Edge length of a block in voxels.
pub const BLOCK_SIZE: i32 = 16;

/// Edge length of the image holding one block.
pub const BLOCK_IMAGE_SIZE: u32 = 64;

const BLOCK_CELLS: usize = (BLOCK_SIZE * BLOCK_SIZE * BLOCK_SIZE) as usize;

/// Dense 16³ grid of palette indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VoxelBlock {
    cells: Vec<Option<u8>>,
}

impl Default for VoxelBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl VoxelBlock {
    /// Create an empty block.
    pub fn new() -> Self {
        Self {
            cells: vec![None; BLOCK_CELLS],
        }
    }

    fn index(local: IVec3) -> usize {
        assert!(
            local.cmpge(IVec3::ZERO).all() && local.cmplt(IVec3::splat(BLOCK_SIZE)).all(),
            "block cell {} out of range",
            local
        );
        (local.x + BLOCK_SIZE * local.y + BLOCK_SIZE * BLOCK_SIZE * local.z) as usize
    }

    /// Palette index at `local`, which must lie in `0..16` on every axis.
    pub fn get(&self, local: IVec3) -> Option<u8> {
        self.cells[Self::index(local)]
    }

    pub fn set(&mut self, local: IVec3, color: Option<u8>) {
        self.cells[Self::index(local)] = color;
    }

    /// Solid cells with their local coordinates, x fastest.
    pub fn iter(&self) -> impl Iterator<Item = (IVec3, u8)> + '_ {
        self.cells.iter().enumerate().filter_map(|(i, c)| {
            c.map(|color| {
                let i = i as i32;
                let local = IVec3::new(
                    i % BLOCK_SIZE,
                    (i / BLOCK_SIZE) % BLOCK_SIZE,
                    i / (BLOCK_SIZE * BLOCK_SIZE),
                );
                (local, color)
            })
        })
    }

    pub fn solid_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }
}

/// Pixel holding the block cell at `local`.
pub fn cell_to_pixel(local: IVec3) -> (u32, u32) {
    let i = VoxelBlock::index(local) as u32;
    (i % BLOCK_IMAGE_SIZE, i / BLOCK_IMAGE_SIZE)
}

/// Render `block` to its 64x64 image using `palette` colours.
///
/// Solid cells are always written with non-zero alpha so they survive the
/// round trip even when their palette colour is transparent.
///
/// [`decode_block`] recovers the exact indices only when every index used is
/// inside `palette` and maps to a distinct, opaque colour. Otherwise only
/// cell presence survives: indices past the end encode as black, duplicate
/// colours decode to their first entry and transparent entries decode to the
/// nearest opaque match.
pub fn encode_block(block: &VoxelBlock, palette: &Palette) -> RgbaImage {
    let mut image = RgbaImage::new(BLOCK_IMAGE_SIZE, BLOCK_IMAGE_SIZE);
    for (local, color) in block.iter() {
        let mut rgba = palette.color(color);
        if rgba[3] == 0 {
            rgba[3] = 255;
        }
        let (px, py) = cell_to_pixel(local);
        image.put_pixel(px, py, image::Rgba(rgba));
    }
    image
}

/// Read a block back from its image, mapping colours onto `palette`.
pub fn decode_block(image: &RgbaImage, palette: &Palette) -> Result<VoxelBlock> {
    if image.dimensions() != (BLOCK_IMAGE_SIZE, BLOCK_IMAGE_SIZE) {
        return Err(SceneError::format(format!(
            "block image is {}x{}, expected {}x{}",
            image.width(),
            image.height(),
            BLOCK_IMAGE_SIZE,
            BLOCK_IMAGE_SIZE
        )));
    }

    let mut lookup: HashMap<[u8; 4], u8> = HashMap::new();
    let mut block = VoxelBlock::new();
    for (i, pixel) in image.pixels().enumerate() {
        if pixel.0[3] == 0 {
            continue;
        }
        let color = *lookup
            .entry(pixel.0)
            .or_insert_with(|| palette.index_of(pixel.0));
        block.cells[i] = Some(color);
    }
    Ok(block)
}

/// Colours of the solid cells of a block image, in pixel order.
pub fn solid_colors(image: &RgbaImage) -> impl Iterator<Item = [u8; 4]> + '_ {
    image.pixels().map(|p| p.0).filter(|c| c[3] != 0)
}

/// Encode an RGBA image as PNG bytes.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let cursor = std::io::Cursor::new(&mut bytes);
    let encoder = image::codecs::png::PngEncoder::new(cursor);

    encoder.write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ExtendedColorType::Rgba8,
    )?;

    Ok(bytes)
}

/// Decode PNG bytes into an RGBA image.
pub fn decode_png(data: &[u8]) -> Result<RgbaImage> {
    let img = image::load_from_memory_with_format(data, image::ImageFormat::Png)?;
    Ok(img.to_rgba8())
}
