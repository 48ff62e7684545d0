//! Load and save whole scenes in the GOX container.
//!
//! Loading parses every chunk into a [`GoxChunk`] and accumulates them in a
//! transient [`SceneDocument`]. Only after the whole stream has been read is
//! the document turned into a [`SceneGraph`], so a failed load never hands out
//! a partially built scene. Saving walks the scene graph into a document and
//! writes its chunks in a fixed order:
//! `IMG`, `PREV`, `BL16`..., `MATE`..., `LAYR`..., `CAMR`..., `LIGH`.

use super::block::{self, VoxelBlock, BLOCK_IMAGE_SIZE, BLOCK_SIZE};
use super::chunk::{ByteCursor, ChunkReader, ChunkTag, ChunkWriter, RawChunk};
use super::dict::Dict;
use super::FormatConfig;
use crate::error::{Result, SceneError};
use crate::scene::{
    Camera, Light, Material, NodeKind, Palette, RawVolume, SceneGraph, SceneNode, Transform, Voxel,
};
use crate::types::{axis, Region};
use glam::{IVec3, Mat4, Quat, Vec3};
use image::RgbaImage;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::Path;

/// Bytes per block reference in a LAYR chunk: index, x, y, z, reserved.
const BLOCK_REF_LEN: usize = 20;

/// Largest absolute block origin coordinate accepted on load.
pub const MAX_BLOCK_ORIGIN: i32 = 1 << 24;

/// Placement of one block image inside a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRef {
    /// Position of the image in the document's image list.
    pub image: usize,
    /// Minimum corner of the block in file voxel units.
    pub origin: IVec3,
}

/// A decoded LAYR chunk. Values are in file space.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerChunk {
    pub blocks: Vec<BlockRef>,
    pub name: Option<String>,
    pub visible: bool,
    pub material: Option<usize>,
    pub id: Option<i32>,
    pub pivot: Option<Vec3>,
    pub color: Option<[u8; 4]>,
}

impl Default for LayerChunk {
    fn default() -> Self {
        Self {
            blocks: Vec::new(),
            name: None,
            visible: true,
            material: None,
            id: None,
            pivot: None,
            color: None,
        }
    }
}

impl LayerChunk {
    fn decode(cursor: &mut ByteCursor<'_>, max_value_len: usize) -> Result<Self> {
        let max_refs = cursor.remaining().saturating_sub(4) / BLOCK_REF_LEN;
        let count = cursor.read_len("block list", max_refs)?;
        let mut blocks = Vec::with_capacity(count);
        for _ in 0..count {
            let index = cursor.read_i32()?;
            let origin = IVec3::new(cursor.read_i32()?, cursor.read_i32()?, cursor.read_i32()?);
            let _reserved = cursor.read_i32()?;
            let image = usize::try_from(index)
                .map_err(|_| SceneError::format(format!("negative block index {}", index)))?;
            let limit = IVec3::splat(MAX_BLOCK_ORIGIN);
            if origin.cmplt(-limit).any() || origin.cmpgt(limit).any() {
                return Err(SceneError::format(format!(
                    "block origin {} outside +/-{}",
                    origin, MAX_BLOCK_ORIGIN
                )));
            }
            blocks.push(BlockRef { image, origin });
        }

        let dict = Dict::read(cursor, max_value_len)?;
        Ok(Self {
            blocks,
            name: dict.get_str("name"),
            visible: dict.get_bool("visible").unwrap_or(true),
            material: dict
                .get_i32("mat")
                .and_then(|m| usize::try_from(m).ok()),
            id: dict.get_i32("id"),
            pivot: dict.get_vec3("pivot"),
            color: dict.get_rgba8("color"),
        })
    }

    fn payload(&self) -> Result<Vec<u8>> {
        let count = i32::try_from(self.blocks.len())
            .map_err(|_| SceneError::format("too many blocks in layer"))?;
        let mut out = Vec::with_capacity(4 + self.blocks.len() * BLOCK_REF_LEN);
        out.extend_from_slice(&count.to_le_bytes());
        for block in &self.blocks {
            let index = i32::try_from(block.image)
                .map_err(|_| SceneError::format("block index out of range"))?;
            for value in [index, block.origin.x, block.origin.y, block.origin.z, 0] {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }

        let mut dict = Dict::new();
        if let Some(name) = &self.name {
            dict.set_str("name", name);
        }
        dict.set_bool("visible", self.visible);
        dict.set_i32("mat", self.material.map_or(-1, |m| m as i32));
        if let Some(id) = self.id {
            dict.set_i32("id", id);
        }
        if let Some(pivot) = self.pivot {
            dict.set_vec3("pivot", pivot);
        }
        if let Some(color) = self.color {
            dict.set_rgba8("color", color);
        }
        dict.write(&mut out)?;
        Ok(out)
    }
}

/// A decoded CAMR chunk. Values are in file space.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraChunk {
    pub name: String,
    pub distance: f32,
    pub rotation: Quat,
    pub offset: Vec3,
    pub orthographic: bool,
    pub active: bool,
}

impl Default for CameraChunk {
    fn default() -> Self {
        Self {
            name: String::new(),
            distance: Camera::default().distance,
            rotation: Quat::IDENTITY,
            offset: Vec3::ZERO,
            orthographic: false,
            active: false,
        }
    }
}

impl CameraChunk {
    fn from_dict(dict: &Dict) -> Self {
        let defaults = Self::default();
        Self {
            name: dict.get_str("name").unwrap_or_default(),
            distance: dict.get_f32("dist").unwrap_or(defaults.distance),
            rotation: dict.get_quat("rot").unwrap_or(defaults.rotation),
            offset: dict.get_vec3("ofs").unwrap_or(defaults.offset),
            orthographic: dict.get_bool("ortho").unwrap_or(false),
            active: dict.get_bool("active").unwrap_or(false),
        }
    }

    fn to_dict(&self) -> Dict {
        let mut dict = Dict::new();
        dict.set_str("name", &self.name);
        dict.set_f32("dist", self.distance);
        dict.set_quat("rot", self.rotation);
        dict.set_vec3("ofs", self.offset);
        dict.set_bool("ortho", self.orthographic);
        dict.set_bool("active", self.active);
        dict
    }

    /// File-space camera from a scene camera node.
    pub fn from_node(node: &SceneNode, camera: &Camera) -> Self {
        Self {
            name: node.name.clone(),
            distance: camera.distance,
            rotation: axis::rotation_to_file(node.transform.rotation),
            offset: axis::position_to_file(node.transform.translation),
            orthographic: camera.orthographic,
            active: camera.active,
        }
    }

    /// Scene camera node for this chunk.
    pub fn into_node(self) -> SceneNode {
        let camera = Camera {
            distance: self.distance,
            orthographic: self.orthographic,
            active: self.active,
        };
        SceneNode::camera(self.name, camera).with_transform(Transform {
            translation: axis::position_to_scene(self.offset),
            rotation: axis::rotation_to_scene(self.rotation),
        })
    }
}

fn material_from_dict(dict: &Dict) -> Material {
    let defaults = Material::default();
    Material {
        name: dict.get_str("name").unwrap_or_default(),
        base_color: dict
            .get_float4("color")
            .map_or(defaults.base_color, |c| c.map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)),
        metallic: dict.get_f32("metallic").unwrap_or(defaults.metallic),
        roughness: dict.get_f32("roughness").unwrap_or(defaults.roughness),
        emission: dict
            .get_vec3("emission")
            .map_or(defaults.emission, |e| e.to_array()),
    }
}

fn material_to_dict(material: &Material) -> Dict {
    let mut dict = Dict::new();
    dict.set_str("name", &material.name);
    dict.set_float4("color", material.base_color.map(|c| c as f32 / 255.0));
    dict.set_f32("metallic", material.metallic);
    dict.set_f32("roughness", material.roughness);
    dict.set_vec3("emission", Vec3::from_array(material.emission));
    dict
}

fn light_from_dict(dict: &Dict) -> Light {
    let defaults = Light::default();
    Light {
        pitch: dict.get_f32("pitch").unwrap_or(defaults.pitch),
        yaw: dict.get_f32("yaw").unwrap_or(defaults.yaw),
        intensity: dict.get_f32("intensity").unwrap_or(defaults.intensity),
        fixed: dict.get_bool("fixed").unwrap_or(defaults.fixed),
        ambient: dict.get_f32("ambient").unwrap_or(defaults.ambient),
        shadow: dict.get_f32("shadow").unwrap_or(defaults.shadow),
    }
}

fn light_to_dict(light: &Light) -> Dict {
    let mut dict = Dict::new();
    dict.set_f32("pitch", light.pitch);
    dict.set_f32("yaw", light.yaw);
    dict.set_f32("intensity", light.intensity);
    dict.set_bool("fixed", light.fixed);
    dict.set_f32("ambient", light.ambient);
    dict.set_f32("shadow", light.shadow);
    dict
}

fn dict_payload(dict: &Dict) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    dict.write(&mut out)?;
    Ok(out)
}

fn image_info_payload(bounds: Option<Mat4>) -> Result<Vec<u8>> {
    let mut dict = Dict::new();
    if let Some(bounds) = bounds {
        dict.set_mat4("box", bounds);
    }
    dict_payload(&dict)
}

/// Decode a BL16 payload, logging and dropping anything that is not a 64x64 image.
fn decode_block_image(payload: &[u8]) -> Option<RgbaImage> {
    match block::decode_png(payload) {
        Ok(image) if image.dimensions() == (BLOCK_IMAGE_SIZE, BLOCK_IMAGE_SIZE) => Some(image),
        Ok(image) => {
            log::warn!(
                "Dropping block image of size {}x{}",
                image.width(),
                image.height()
            );
            None
        }
        Err(e) => {
            log::warn!("Dropping unreadable block image: {}", e);
            None
        }
    }
}

/// One chunk with its payload decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum GoxChunk {
    /// `IMG `: bounding box of the scene, file space.
    ImageInfo { bounds: Option<Mat4> },
    /// `PREV`: PNG-encoded preview.
    Preview(Vec<u8>),
    /// `BL16`: one block image, `None` when it could not be decoded.
    BlockImage(Option<RgbaImage>),
    Layer(LayerChunk),
    Material(Material),
    Camera(CameraChunk),
    Light(Light),
    /// A tag this codec does not know; its payload was skipped.
    Unknown(ChunkTag),
}

impl GoxChunk {
    /// Decode a checksum-verified chunk.
    ///
    /// Malformed framing inside the payload (dictionary or block list
    /// lengths) is an error. Undecodable block images are not: they become
    /// `BlockImage(None)` so later block references keep their positions.
    pub fn decode(raw: &RawChunk<'_>, config: &FormatConfig) -> Result<Self> {
        let max_value_len = config.max_dict_value_len as usize;
        let mut cursor = ByteCursor::new(raw.payload);
        let chunk = match raw.tag {
            ChunkTag::IMG => {
                let dict = Dict::read(&mut cursor, max_value_len)?;
                GoxChunk::ImageInfo {
                    bounds: dict.get_mat4("box"),
                }
            }
            ChunkTag::PREV => GoxChunk::Preview(raw.payload.to_vec()),
            ChunkTag::BL16 => GoxChunk::BlockImage(decode_block_image(raw.payload)),
            ChunkTag::LAYR => GoxChunk::Layer(LayerChunk::decode(&mut cursor, max_value_len)?),
            ChunkTag::MATE => {
                GoxChunk::Material(material_from_dict(&Dict::read(&mut cursor, max_value_len)?))
            }
            ChunkTag::CAMR => {
                GoxChunk::Camera(CameraChunk::from_dict(&Dict::read(&mut cursor, max_value_len)?))
            }
            ChunkTag::LIGH => {
                GoxChunk::Light(light_from_dict(&Dict::read(&mut cursor, max_value_len)?))
            }
            tag => GoxChunk::Unknown(tag),
        };
        Ok(chunk)
    }

    /// Tag and payload for writing.
    pub fn encode(&self) -> Result<(ChunkTag, Vec<u8>)> {
        Ok(match self {
            GoxChunk::ImageInfo { bounds } => (ChunkTag::IMG, image_info_payload(*bounds)?),
            GoxChunk::Preview(png) => (ChunkTag::PREV, png.clone()),
            GoxChunk::BlockImage(Some(image)) => (ChunkTag::BL16, block::encode_png(image)?),
            GoxChunk::BlockImage(None) => {
                return Err(SceneError::format("cannot write a missing block image"))
            }
            GoxChunk::Layer(layer) => (ChunkTag::LAYR, layer.payload()?),
            GoxChunk::Material(material) => (ChunkTag::MATE, dict_payload(&material_to_dict(material))?),
            GoxChunk::Camera(camera) => (ChunkTag::CAMR, dict_payload(&camera.to_dict())?),
            GoxChunk::Light(light) => (ChunkTag::LIGH, dict_payload(&light_to_dict(light))?),
            GoxChunk::Unknown(tag) => {
                return Err(SceneError::format(format!("cannot write unknown chunk {}", tag)))
            }
        })
    }
}

/// Everything read from or about to be written to one GOX stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneDocument {
    pub version: i32,
    /// Scene bounds in file space.
    pub bounds: Option<Mat4>,
    /// PNG bytes of the first preview chunk.
    pub preview: Option<Vec<u8>>,
    /// Block images in stream order. Corrupt entries are `None`.
    pub images: Vec<Option<RgbaImage>>,
    pub layers: Vec<LayerChunk>,
    pub materials: Vec<Material>,
    pub cameras: Vec<CameraChunk>,
    pub light: Option<Light>,
    /// Chunks dropped because they were corrupt or undecodable.
    pub skipped_chunks: usize,
}

/// Turn a checksum mismatch into a skip unless `strict_crc` is set.
fn tolerate_corruption(error: SceneError, config: &FormatConfig) -> Result<ChunkTag> {
    match error {
        SceneError::Integrity {
            tag,
            expected,
            actual,
        } if !config.strict_crc => {
            log::warn!(
                "Skipping corrupt {} chunk (stored CRC {:#010x}, computed {:#010x})",
                tag,
                expected,
                actual
            );
            Ok(tag)
        }
        other => Err(other),
    }
}

impl SceneDocument {
    /// Parse a complete stream.
    pub fn parse(data: &[u8], config: &FormatConfig) -> Result<Self> {
        let reader = ChunkReader::new(data, config)?;
        let mut doc = SceneDocument {
            version: reader.version(),
            ..Default::default()
        };

        for next in reader {
            match next {
                Ok(raw) => {
                    log::debug!(
                        "Chunk {} at offset {} ({} bytes)",
                        raw.tag,
                        raw.offset,
                        raw.payload.len()
                    );
                    doc.apply(GoxChunk::decode(&raw, config)?);
                }
                Err(e) => {
                    let tag = tolerate_corruption(e, config)?;
                    doc.skipped_chunks += 1;
                    if tag == ChunkTag::BL16 {
                        doc.images.push(None);
                    }
                }
            }
        }
        Ok(doc)
    }

    fn apply(&mut self, chunk: GoxChunk) {
        match chunk {
            GoxChunk::ImageInfo { bounds } => self.bounds = bounds,
            GoxChunk::Preview(png) => {
                if self.preview.is_none() {
                    self.preview = Some(png);
                }
            }
            GoxChunk::BlockImage(image) => {
                if image.is_none() {
                    self.skipped_chunks += 1;
                }
                self.images.push(image);
            }
            GoxChunk::Layer(layer) => self.layers.push(layer),
            GoxChunk::Material(material) => self.materials.push(material),
            GoxChunk::Camera(camera) => self.cameras.push(camera),
            GoxChunk::Light(light) => self.light = Some(light),
            GoxChunk::Unknown(tag) => log::warn!("Skipping unknown chunk {}", tag),
        }
    }

    /// Palette of the distinct colours used by the block images, in stream order.
    pub fn palette(&self) -> Palette {
        Palette::from_observed(self.images.iter().flatten().flat_map(block::solid_colors))
    }

    /// Assemble the scene graph: one model node per layer, one camera node per camera.
    ///
    /// Fails with a format error when a layer spans more than
    /// `config.max_layer_voxels`.
    pub fn into_scene_graph(self, config: &FormatConfig) -> Result<SceneGraph> {
        let palette = self.palette();
        let blocks: Vec<Option<VoxelBlock>> = self
            .images
            .iter()
            .map(|image| {
                image
                    .as_ref()
                    .and_then(|image| block::decode_block(image, &palette).ok())
            })
            .collect();

        let mut scene = SceneGraph::with_palette(palette);
        scene.materials = self.materials;
        scene.light = self.light;

        let layer_count = self.layers.len();
        for (index, layer) in self.layers.into_iter().enumerate() {
            let node = layer_node(layer, index, &blocks, scene.materials.len(), config)?;
            scene.add_node(node);
        }
        let camera_count = self.cameras.len();
        for camera in self.cameras {
            scene.add_node(camera.into_node());
        }

        log::info!(
            "Loaded {} layers, {} cameras, {} materials, {} palette colours ({} chunks skipped)",
            layer_count,
            camera_count,
            scene.materials.len(),
            scene.palette.len(),
            self.skipped_chunks
        );
        Ok(scene)
    }

    /// Walk `scene` into a document ready for writing.
    pub fn from_scene_graph(scene: &SceneGraph, config: &FormatConfig) -> Result<Self> {
        let mut doc = SceneDocument {
            version: config.version,
            materials: scene.materials.clone(),
            light: scene.light.clone(),
            ..Default::default()
        };

        let mut slots: HashMap<VoxelBlock, usize> = HashMap::new();
        let mut bounds: Option<Region> = None;
        for (id, node) in scene.nodes().iter().enumerate() {
            match &node.kind {
                NodeKind::Model(volume) => {
                    let layer =
                        doc.push_layer(id, node, volume, scene, config, &mut slots, &mut bounds);
                    doc.layers.push(layer);
                }
                NodeKind::Camera(camera) => doc.cameras.push(CameraChunk::from_node(node, camera)),
            }
        }

        doc.bounds = bounds.map(|region| {
            let size = region.dimensions().as_vec3();
            Mat4::from_scale_rotation_translation(size * 0.5, Quat::IDENTITY, region.center())
        });
        if config.write_preview {
            doc.preview = Some(block::encode_png(&render_preview(scene, config.preview_size))?);
        }
        Ok(doc)
    }

    /// Split a model node into file-space blocks, storing new images as needed.
    #[allow(clippy::too_many_arguments)]
    fn push_layer(
        &mut self,
        id: usize,
        node: &SceneNode,
        volume: &RawVolume,
        scene: &SceneGraph,
        config: &FormatConfig,
        slots: &mut HashMap<VoxelBlock, usize>,
        bounds: &mut Option<Region>,
    ) -> LayerChunk {
        let shift = baked_shift(node);

        // Keyed (z, y, x) so blocks are written in a stable order.
        let mut blocks: BTreeMap<(i32, i32, i32), VoxelBlock> = BTreeMap::new();
        for (pos, voxel) in volume.iter() {
            let cell = axis::cell_to_file(pos + shift);
            bounds.get_or_insert(Region::cell(cell)).accumulate(cell);
            let origin = cell.div_euclid(IVec3::splat(BLOCK_SIZE)) * BLOCK_SIZE;
            blocks
                .entry((origin.z, origin.y, origin.x))
                .or_default()
                .set(cell - origin, Some(voxel.color));
        }

        let mut refs = Vec::with_capacity(blocks.len());
        for ((z, y, x), block) in blocks {
            let image = match slots.get(&block) {
                Some(&index) => index,
                None => {
                    let index = self.images.len();
                    self.images.push(Some(block::encode_block(&block, &scene.palette)));
                    if config.dedup_blocks {
                        slots.insert(block, index);
                    }
                    index
                }
            };
            refs.push(BlockRef {
                image,
                origin: IVec3::new(x, y, z),
            });
        }

        let material = node.material.filter(|&m| {
            let known = m < scene.materials.len();
            if !known {
                log::warn!("Node {:?} references unknown material {}", node.name, m);
            }
            known
        });

        LayerChunk {
            blocks: refs,
            name: Some(node.name.clone()),
            visible: node.visible,
            material,
            id: i32::try_from(id).ok(),
            pivot: Some(axis::pivot_to_file(node.pivot)),
            color: node.color,
        }
    }

    /// Write the document as a GOX stream.
    pub fn write<W: Write>(&self, writer: W) -> Result<W> {
        let mut out = ChunkWriter::new(writer, self.version)?;

        out.write_chunk(ChunkTag::IMG, &image_info_payload(self.bounds)?)?;
        if let Some(preview) = &self.preview {
            out.write_chunk(ChunkTag::PREV, preview)?;
        }
        for (i, image) in self.images.iter().enumerate() {
            let image = image
                .as_ref()
                .ok_or_else(|| SceneError::format(format!("block image {} is missing", i)))?;
            out.write_chunk(ChunkTag::BL16, &block::encode_png(image)?)?;
        }
        for material in &self.materials {
            out.write_chunk(ChunkTag::MATE, &dict_payload(&material_to_dict(material))?)?;
        }
        for layer in &self.layers {
            out.write_chunk(ChunkTag::LAYR, &layer.payload()?)?;
        }
        for camera in &self.cameras {
            out.write_chunk(ChunkTag::CAMR, &dict_payload(&camera.to_dict())?)?;
        }
        if let Some(light) = &self.light {
            out.write_chunk(ChunkTag::LIGH, &dict_payload(&light_to_dict(light))?)?;
        }
        Ok(out.into_inner())
    }
}

/// Whole-voxel translation baked into a node's saved block positions.
///
/// Layers carry no transform, so fractional translation and any rotation
/// are lost; both are logged.
fn baked_shift(node: &SceneNode) -> IVec3 {
    let translation = node.transform.translation;
    let shift = translation.round().as_ivec3();
    if translation != shift.as_vec3() {
        log::warn!(
            "Node {:?}: rounding translation {} to {} on save",
            node.name,
            translation,
            shift
        );
    }
    if !node.transform.rotation.abs_diff_eq(Quat::IDENTITY, 1e-6) {
        log::warn!(
            "Node {:?}: dropping rotation {} on save",
            node.name,
            node.transform.rotation
        );
    }
    shift
}

/// Build the model node for one layer.
fn layer_node(
    layer: LayerChunk,
    index: usize,
    blocks: &[Option<VoxelBlock>],
    material_count: usize,
    config: &FormatConfig,
) -> Result<SceneNode> {
    let name = layer
        .name
        .unwrap_or_else(|| format!("layer {}", index));

    let placed: Vec<(IVec3, &VoxelBlock)> = layer
        .blocks
        .iter()
        .filter_map(|r| match blocks.get(r.image) {
            Some(Some(block)) => Some((r.origin, block)),
            Some(None) => {
                log::warn!("Layer {:?}: block image {} is missing", name, r.image);
                None
            }
            None => {
                log::warn!(
                    "Layer {:?}: block image {} out of range ({} images)",
                    name,
                    r.image,
                    blocks.len()
                );
                None
            }
        })
        .collect();

    let cells = || {
        placed.iter().flat_map(|&(origin, block)| {
            block
                .iter()
                .map(move |(local, color)| (axis::cell_to_scene(origin + local), color))
        })
    };
    let region =
        Region::from_cells(cells().map(|(pos, _)| pos)).unwrap_or_else(|| Region::cell(IVec3::ZERO));
    match region.checked_voxel_count() {
        Some(count) if count <= config.max_layer_voxels => {}
        count => {
            return Err(SceneError::format(format!(
                "layer {:?} spans {} to {} ({} voxels, limit {})",
                name,
                region.lower,
                region.upper,
                count.map_or_else(|| "too many".to_string(), |c| c.to_string()),
                config.max_layer_voxels
            )))
        }
    }
    let mut volume = RawVolume::new(region);
    for (pos, color) in cells() {
        volume.set_voxel(pos, Some(Voxel::new(color)));
    }

    let material = layer.material.filter(|&m| {
        let known = m < material_count;
        if !known {
            log::warn!("Layer {:?} references unknown material {}", name, m);
        }
        known
    });

    let mut node = SceneNode::model(name, volume).with_visible(layer.visible);
    node.material = material;
    if let Some(pivot) = layer.pivot {
        node.pivot = axis::pivot_to_scene(pivot);
    }
    node.color = layer.color;
    if let Some(id) = layer.id {
        node.properties.insert("id".to_string(), id.to_string());
    }
    Ok(node)
}

/// Top-down colour projection of the visible model nodes.
pub fn render_preview(scene: &SceneGraph, size: u32) -> RgbaImage {
    let mut image = RgbaImage::new(size, size);

    // Highest voxel per (x, z) column.
    let mut columns: HashMap<(i32, i32), (i32, u8)> = HashMap::new();
    for node in scene.model_nodes().filter(|n| n.visible) {
        let Some(volume) = node.volume() else {
            continue;
        };
        let shift = node.transform.translation.round().as_ivec3();
        for (pos, voxel) in volume.iter() {
            let pos = pos + shift;
            let top = columns.entry((pos.x, pos.z)).or_insert((pos.y, voxel.color));
            if pos.y >= top.0 {
                *top = (pos.y, voxel.color);
            }
        }
    }

    let Some(region) = Region::from_cells(columns.keys().map(|&(x, z)| IVec3::new(x, 0, z))) else {
        return image;
    };
    let dims = region.dimensions();
    let extent = dims.x.max(dims.z) as i64;
    for (px, py, pixel) in image.enumerate_pixels_mut() {
        let x = region.lower.x + (px as i64 * extent / size as i64) as i32;
        let z = region.lower.z + (py as i64 * extent / size as i64) as i32;
        if let Some(&(_, color)) = columns.get(&(x, z)) {
            *pixel = image::Rgba(scene.palette.color(color));
        }
    }
    image
}

/// Load a scene from a GOX file.
pub fn load(path: impl AsRef<Path>, config: &FormatConfig) -> Result<SceneGraph> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    log::info!("Loading {} ({} bytes)", path.display(), data.len());
    load_from_bytes(&data, config)
}

/// Load a scene from an in-memory GOX stream.
pub fn load_from_bytes(data: &[u8], config: &FormatConfig) -> Result<SceneGraph> {
    SceneDocument::parse(data, config)?.into_scene_graph(config)
}

/// Save a scene to a GOX file. Nothing is written if encoding fails.
pub fn save(scene: &SceneGraph, path: impl AsRef<Path>, config: &FormatConfig) -> Result<()> {
    let path = path.as_ref();
    let data = save_to_bytes(scene, config)?;
    std::fs::write(path, &data)?;
    log::info!("Saved {} ({} bytes)", path.display(), data.len());
    Ok(())
}

/// Encode a scene into `writer`.
pub fn save_to_writer<W: Write>(scene: &SceneGraph, writer: W, config: &FormatConfig) -> Result<W> {
    SceneDocument::from_scene_graph(scene, config)?.write(writer)
}

/// Encode a scene into a byte vector.
pub fn save_to_bytes(scene: &SceneGraph, config: &FormatConfig) -> Result<Vec<u8>> {
    save_to_writer(scene, Vec::new(), config)
}

/// Read only the palette of a GOX file.
pub fn load_palette(path: impl AsRef<Path>, config: &FormatConfig) -> Result<Palette> {
    load_palette_from_bytes(&std::fs::read(path)?, config)
}

/// Read only the palette: block images are decoded, every other chunk is skipped.
pub fn load_palette_from_bytes(data: &[u8], config: &FormatConfig) -> Result<Palette> {
    let mut images = Vec::new();
    for next in ChunkReader::new(data, config)? {
        match next {
            Ok(raw) if raw.tag == ChunkTag::BL16 => images.extend(decode_block_image(raw.payload)),
            Ok(_) => {}
            Err(e) => {
                tolerate_corruption(e, config)?;
            }
        }
    }
    Ok(Palette::from_observed(images.iter().flat_map(block::solid_colors)))
}

/// Read the preview image of a GOX file, if it has one.
pub fn load_screenshot(path: impl AsRef<Path>, config: &FormatConfig) -> Result<Option<RgbaImage>> {
    load_screenshot_from_bytes(&std::fs::read(path)?, config)
}

/// Read the preview image of an in-memory stream.
///
/// The first PREV chunk that decodes wins; unreadable previews are logged and skipped.
pub fn load_screenshot_from_bytes(data: &[u8], config: &FormatConfig) -> Result<Option<RgbaImage>> {
    for next in ChunkReader::new(data, config)? {
        match next {
            Ok(raw) if raw.tag == ChunkTag::PREV => match block::decode_png(raw.payload) {
                Ok(image) => return Ok(Some(image)),
                Err(e) => log::warn!("Skipping unreadable preview at offset {}: {}", raw.offset, e),
            },
            Ok(_) => {}
            Err(e) => {
                tolerate_corruption(e, config)?;
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::chunk::GOX_VERSION;
    use crate::scene::VoxelAccess;
    use std::collections::HashSet;

    fn config() -> FormatConfig {
        FormatConfig::default().with_preview(false)
    }

    fn filled_block(color: u8, cells: &[IVec3]) -> VoxelBlock {
        let mut block = VoxelBlock::new();
        for &cell in cells {
            block.set(cell, Some(color));
        }
        block
    }

    /// A document with one layer made of two blocks at grid (0,0,0) and (1,0,0).
    fn two_block_document() -> SceneDocument {
        let palette = Palette::rgb332();
        let a = filled_block(0xE0, &[IVec3::ZERO, IVec3::new(15, 15, 15)]);
        let b = filled_block(0x1C, &[IVec3::new(0, 0, 0), IVec3::new(3, 4, 5)]);
        SceneDocument {
            version: GOX_VERSION,
            images: vec![
                Some(block::encode_block(&a, &palette)),
                Some(block::encode_block(&b, &palette)),
            ],
            layers: vec![LayerChunk {
                blocks: vec![
                    BlockRef {
                        image: 0,
                        origin: IVec3::ZERO,
                    },
                    BlockRef {
                        image: 1,
                        origin: IVec3::new(16, 0, 0),
                    },
                ],
                name: Some("blocks".into()),
                material: Some(0),
                ..Default::default()
            }],
            materials: vec![Material {
                name: "white".into(),
                base_color: [255, 255, 255, 255],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn encode(doc: &SceneDocument) -> Vec<u8> {
        doc.write(Vec::new()).unwrap()
    }

    fn solid_cells(node: &SceneNode) -> HashSet<IVec3> {
        node.volume().unwrap().iter().map(|(pos, _)| pos).collect()
    }

    #[test]
    fn test_two_block_layer_with_white_material() {
        let scene = load_from_bytes(&encode(&two_block_document()), &config()).unwrap();

        assert_eq!(scene.nodes().len(), 1);
        let node = &scene.nodes()[0];
        assert_eq!(node.name, "blocks");
        assert_eq!(node.material, Some(0));

        // File x 0..32, y 0..16, z 0..16 in scene space.
        let extent = Region::new(IVec3::new(0, 0, -16), IVec3::new(31, 15, -1));
        let cells = solid_cells(node);
        assert_eq!(cells.len(), 4);
        assert!(cells.iter().all(|&c| extent.contains(c)));
        // File cell (16 + 3, 4, 5) of the second block.
        assert!(cells.contains(&axis::cell_to_scene(IVec3::new(19, 4, 5))));

        assert_eq!(scene.materials.len(), 1);
        assert_eq!(scene.materials[0].base_color, [255, 255, 255, 255]);
        assert_eq!(scene.palette.len(), 2);
    }

    #[test]
    fn test_camera_axis_conversion_round_trip() {
        let doc = SceneDocument {
            version: GOX_VERSION,
            cameras: vec![CameraChunk {
                name: "main".into(),
                offset: Vec3::new(1.0, 2.0, 3.0),
                rotation: Quat::from_xyzw(0.1, 0.2, 0.3, 0.9),
                active: true,
                ..Default::default()
            }],
            ..Default::default()
        };
        let scene = load_from_bytes(&encode(&doc), &config()).unwrap();

        let node = scene.camera_nodes().next().unwrap();
        assert_eq!(node.transform.translation, Vec3::new(1.0, 3.0, -2.0));
        assert!(node.camera_data().unwrap().active);

        let resaved = save_to_bytes(&scene, &config()).unwrap();
        let reparsed = SceneDocument::parse(&resaved, &config()).unwrap();
        assert_eq!(reparsed.cameras[0].offset, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(reparsed.cameras[0].rotation, Quat::from_xyzw(0.1, 0.2, 0.3, 0.9));
        assert_eq!(reparsed.cameras[0].name, "main");
    }

    #[test]
    fn test_scene_round_trip_preserves_voxels() {
        let palette = Palette::rgb332();
        let region = Region::new(IVec3::new(-20, -3, -18), IVec3::new(5, 20, 2));
        let mut volume = RawVolume::new(region);
        for (i, pos) in region.cells().enumerate().filter(|(i, _)| i % 7 == 0) {
            volume.set_voxel(pos, Some(Voxel::new((i % 256) as u8)));
        }

        let mut scene = SceneGraph::with_palette(palette.clone());
        let mat = scene.add_material(Material::default());
        scene.add_node(
            SceneNode::model("model", volume.clone())
                .with_material(mat)
                .with_pivot(Vec3::new(0.5, 0.25, 0.75))
                .with_visible(false),
        );
        scene.light = Some(Light::default());

        let loaded = load_from_bytes(&save_to_bytes(&scene, &config()).unwrap(), &config()).unwrap();
        let node = loaded.model_nodes().next().unwrap();
        assert!(!node.visible);
        assert_eq!(node.material, Some(0));
        assert_eq!(node.pivot, Vec3::new(0.5, 0.25, 0.75));
        assert_eq!(loaded.light, Some(Light::default()));

        let reloaded = node.volume().unwrap();
        assert_eq!(reloaded.solid_count(), volume.solid_count());
        for (pos, voxel) in volume.iter() {
            let got = reloaded.voxel(pos).expect("voxel lost in round trip");
            assert_eq!(loaded.palette.color(got.color), palette.color(voxel.color));
        }
    }

    #[test]
    fn test_corrupt_block_is_skipped() {
        let mut data = encode(&two_block_document());
        let second_block = ChunkReader::new(&data, &config())
            .unwrap()
            .filter_map(|c| c.ok())
            .filter(|c| c.tag == ChunkTag::BL16)
            .nth(1)
            .unwrap()
            .offset;
        data[second_block + 8 + 10] ^= 0xFF;

        let doc = SceneDocument::parse(&data, &config()).unwrap();
        assert_eq!(doc.skipped_chunks, 1);
        assert_eq!(doc.images.len(), 2);
        assert!(doc.images[1].is_none());

        let scene = doc.into_scene_graph(&config()).unwrap();
        let cells = solid_cells(&scene.nodes()[0]);
        assert_eq!(cells.len(), 2);
        assert!(cells.iter().all(|c| c.x < 16));

        assert!(matches!(
            load_from_bytes(&data, &config().strict()),
            Err(SceneError::Integrity { tag: ChunkTag::BL16, .. })
        ));
    }

    #[test]
    fn test_unreadable_block_keeps_reference_positions() {
        let mut writer = ChunkWriter::new(Vec::new(), GOX_VERSION).unwrap();
        writer.write_chunk(ChunkTag::BL16, b"definitely not a png").unwrap();
        let good = filled_block(3, &[IVec3::ONE]);
        let image = block::encode_block(&good, &Palette::rgb332());
        writer.write_chunk(ChunkTag::BL16, &block::encode_png(&image).unwrap()).unwrap();
        let layer = LayerChunk {
            blocks: vec![
                BlockRef { image: 0, origin: IVec3::ZERO },
                BlockRef { image: 1, origin: IVec3::ZERO },
                BlockRef { image: 9, origin: IVec3::ZERO },
            ],
            ..Default::default()
        };
        let (tag, payload) = GoxChunk::Layer(layer).encode().unwrap();
        writer.write_chunk(tag, &payload).unwrap();

        let scene = load_from_bytes(&writer.into_inner(), &config()).unwrap();
        let node = &scene.nodes()[0];
        assert_eq!(node.name, "layer 0");
        assert_eq!(solid_cells(node), HashSet::from([axis::cell_to_scene(IVec3::ONE)]));
    }

    /// A stream with one single-voxel block image and a layer placing it at `origins`.
    fn placed_block_stream(origins: &[IVec3]) -> Vec<u8> {
        let mut writer = ChunkWriter::new(Vec::new(), GOX_VERSION).unwrap();
        let image = block::encode_block(&filled_block(3, &[IVec3::ZERO]), &Palette::rgb332());
        writer.write_chunk(ChunkTag::BL16, &block::encode_png(&image).unwrap()).unwrap();
        let layer = LayerChunk {
            blocks: origins
                .iter()
                .map(|&origin| BlockRef { image: 0, origin })
                .collect(),
            ..Default::default()
        };
        let (tag, payload) = GoxChunk::Layer(layer).encode().unwrap();
        writer.write_chunk(tag, &payload).unwrap();
        writer.into_inner()
    }

    #[test]
    fn test_block_origin_out_of_range_is_format_error() {
        for origin in [
            IVec3::new(i32::MAX - 3, 0, 0),
            IVec3::new(0, i32::MIN, 0),
            IVec3::new(0, 0, MAX_BLOCK_ORIGIN + 1),
        ] {
            assert!(
                matches!(
                    load_from_bytes(&placed_block_stream(&[origin]), &config()),
                    Err(SceneError::Format(_))
                ),
                "origin {} was accepted",
                origin
            );
        }

        let edge = IVec3::new(MAX_BLOCK_ORIGIN, -MAX_BLOCK_ORIGIN, MAX_BLOCK_ORIGIN);
        let scene = load_from_bytes(&placed_block_stream(&[edge]), &config()).unwrap();
        assert_eq!(
            solid_cells(&scene.nodes()[0]),
            HashSet::from([axis::cell_to_scene(edge)])
        );
    }

    #[test]
    fn test_layer_over_voxel_budget_is_format_error() {
        let far_apart = placed_block_stream(&[IVec3::ZERO, IVec3::new(1 << 20, 1 << 20, 0)]);
        assert!(matches!(
            load_from_bytes(&far_apart, &config()),
            Err(SceneError::Format(_))
        ));

        // Solid cells span file x 0..=19, y 0..=15, z 0..=15.
        let data = encode(&two_block_document());
        assert!(load_from_bytes(&data, &config().with_max_layer_voxels(20 * 16 * 16)).is_ok());
        assert!(matches!(
            load_from_bytes(&data, &config().with_max_layer_voxels(20 * 16 * 16 - 1)),
            Err(SceneError::Format(_))
        ));
    }

    #[test]
    fn test_baked_shift_rounds_translation() {
        let mut volume = RawVolume::new(Region::cell(IVec3::ZERO));
        volume.set_voxel(IVec3::ZERO, Some(Voxel::new(5)));
        let node = SceneNode::model("m", volume).with_transform(Transform {
            translation: Vec3::new(1.4, 2.0, -0.6),
            rotation: Quat::from_rotation_y(1.0),
        });
        assert_eq!(baked_shift(&node), IVec3::new(1, 2, -1));

        let mut scene = SceneGraph::with_palette(Palette::rgb332());
        scene.add_node(node);
        let loaded = load_from_bytes(&save_to_bytes(&scene, &config()).unwrap(), &config()).unwrap();
        let node = &loaded.nodes()[0];
        assert_eq!(node.transform, Transform::default());
        assert_eq!(solid_cells(node), HashSet::from([IVec3::new(1, 2, -1)]));
    }

    #[test]
    fn test_unreadable_preview_is_skipped() {
        let mut writer = ChunkWriter::new(Vec::new(), GOX_VERSION).unwrap();
        writer.write_chunk(ChunkTag::PREV, b"not a png").unwrap();
        let only_bad = writer.into_inner();
        assert!(load_screenshot_from_bytes(&only_bad, &config()).unwrap().is_none());

        let mut writer = ChunkWriter::new(Vec::new(), GOX_VERSION).unwrap();
        writer.write_chunk(ChunkTag::PREV, b"not a png").unwrap();
        let png = block::encode_png(&RgbaImage::new(8, 8)).unwrap();
        writer.write_chunk(ChunkTag::PREV, &png).unwrap();
        let preview = load_screenshot_from_bytes(&writer.into_inner(), &config())
            .unwrap()
            .unwrap();
        assert_eq!(preview.dimensions(), (8, 8));
    }

    #[test]
    fn test_unknown_chunk_is_tolerated() {
        let mut writer = ChunkWriter::new(Vec::new(), GOX_VERSION).unwrap();
        writer.write_chunk(ChunkTag(*b"ZZZZ"), &[1, 2, 3, 4, 5]).unwrap();
        let light = Light {
            intensity: 2.5,
            ..Default::default()
        };
        let (tag, payload) = GoxChunk::Light(light.clone()).encode().unwrap();
        writer.write_chunk(tag, &payload).unwrap();

        let scene = load_from_bytes(&writer.into_inner(), &config()).unwrap();
        assert_eq!(scene.light, Some(light));
        assert!(scene.is_empty());
    }

    #[test]
    fn test_version_mismatch_is_fatal() {
        let mut data = encode(&two_block_document());
        data[4..8].copy_from_slice(&1i32.to_le_bytes());
        assert!(matches!(
            load_from_bytes(&data, &config()),
            Err(SceneError::UnsupportedVersion(1))
        ));
    }

    #[test]
    fn test_malformed_dictionary_is_fatal() {
        let mut writer = ChunkWriter::new(Vec::new(), GOX_VERSION).unwrap();
        // Key length with no terminator after the entry.
        let mut payload = Vec::new();
        payload.extend_from_slice(&4i32.to_le_bytes());
        payload.extend_from_slice(b"name");
        payload.extend_from_slice(&(-3i32).to_le_bytes());
        writer.write_chunk(ChunkTag::MATE, &payload).unwrap();
        assert!(matches!(
            load_from_bytes(&writer.into_inner(), &config()),
            Err(SceneError::Format(_))
        ));
    }

    #[test]
    fn test_chunk_order_on_save() {
        let mut scene = SceneGraph::with_palette(Palette::rgb332());
        scene.add_material(Material::default());
        let mut volume = RawVolume::new(Region::cell(IVec3::ZERO));
        volume.set_voxel(IVec3::ZERO, Some(Voxel::new(1)));
        scene.add_node(SceneNode::camera("cam", Camera::default()));
        scene.add_node(SceneNode::model("m", volume));
        scene.light = Some(Light::default());

        let data = save_to_bytes(&scene, &FormatConfig::default()).unwrap();
        let tags: Vec<ChunkTag> = ChunkReader::new(&data, &config())
            .unwrap()
            .map(|c| c.unwrap().tag)
            .collect();
        assert_eq!(
            tags,
            vec![
                ChunkTag::IMG,
                ChunkTag::PREV,
                ChunkTag::BL16,
                ChunkTag::MATE,
                ChunkTag::LAYR,
                ChunkTag::CAMR,
                ChunkTag::LIGH,
            ]
        );
    }

    #[test]
    fn test_identical_blocks_are_shared() {
        let mut scene = SceneGraph::with_palette(Palette::rgb332());
        for x in [0, 32] {
            let cell = IVec3::new(x, 0, 0);
            let mut volume = RawVolume::new(Region::cell(cell));
            volume.set_voxel(cell, Some(Voxel::new(9)));
            scene.add_node(SceneNode::model(format!("m{}", x), volume));
        }

        let doc = SceneDocument::from_scene_graph(&scene, &config()).unwrap();
        assert_eq!(doc.images.len(), 1);
        assert_eq!(doc.layers[1].blocks[0].image, 0);
        assert_eq!(doc.layers[1].blocks[0].origin, IVec3::new(32, -16, 0));

        let mut no_dedup = config();
        no_dedup.dedup_blocks = false;
        let doc = SceneDocument::from_scene_graph(&scene, &no_dedup).unwrap();
        assert_eq!(doc.images.len(), 2);
    }

    #[test]
    fn test_bounds_cover_solid_cells() {
        let mut scene = SceneGraph::new();
        let region = Region::new(IVec3::ZERO, IVec3::new(3, 1, 1));
        let mut volume = RawVolume::new(region);
        for pos in region.cells() {
            volume.set_voxel(pos, Some(Voxel::new(0)));
        }
        scene.add_node(SceneNode::model("m", volume));

        let doc = SceneDocument::from_scene_graph(&scene, &config()).unwrap();
        let bounds = doc.bounds.unwrap();
        // Scene y 0..2 maps to file z; scene z 0..2 maps to file y -2..0.
        assert_eq!(bounds.transform_point3(Vec3::NEG_ONE), Vec3::new(0.0, -2.0, 0.0));
        assert_eq!(bounds.transform_point3(Vec3::ONE), Vec3::new(4.0, 0.0, 2.0));
    }

    #[test]
    fn test_file_round_trip_palette_and_screenshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.gox");
        let full = FormatConfig {
            preview_size: 32,
            ..Default::default()
        };

        let original = load_from_bytes(&encode(&two_block_document()), &config()).unwrap();
        save(&original, &path, &full).unwrap();

        let loaded = load(&path, &full).unwrap();
        assert_eq!(solid_cells(&loaded.nodes()[0]), solid_cells(&original.nodes()[0]));

        let palette = load_palette(&path, &full).unwrap();
        assert_eq!(palette, loaded.palette);

        let preview = load_screenshot(&path, &full).unwrap().unwrap();
        assert_eq!(preview.dimensions(), (32, 32));
        assert!(preview.pixels().any(|p| p.0[3] != 0));

        save(&original, &path, &config()).unwrap();
        assert!(load_screenshot(&path, &config()).unwrap().is_none());
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load(dir.path().join("missing.gox"), &config()),
            Err(SceneError::Io(_))
        ));
    }

    #[test]
    fn test_render_preview_takes_top_voxel() {
        let mut scene = SceneGraph::with_palette(Palette::rgb332());
        let region = Region::new(IVec3::ZERO, IVec3::new(0, 1, 0));
        let mut volume = RawVolume::new(region);
        volume.set_voxel(IVec3::new(0, 0, 0), Some(Voxel::new(1)));
        volume.set_voxel(IVec3::new(0, 1, 0), Some(Voxel::new(2)));
        scene.add_node(SceneNode::model("tower", volume));

        let preview = render_preview(&scene, 4);
        assert_eq!(preview.get_pixel(0, 0).0, scene.palette.color(2));
        assert!(render_preview(&SceneGraph::new(), 4).pixels().all(|p| p.0[3] == 0));
    }
}
