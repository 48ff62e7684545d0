//! In-memory scene graph: model and camera nodes, materials, palette and light.
//!
//! This is the Y-up representation the codecs load into and save from. It is
//! deliberately flat: every node hangs off an implicit root.

pub mod palette;
pub mod volume;

pub use palette::Palette;
pub use volume::{RawVolume, Voxel, VoxelAccess};

use glam::{Quat, Vec3};
use serde::Serialize;
use std::collections::BTreeMap;

/// Index of a node inside its [`SceneGraph`].
pub type NodeId = usize;

/// Position and orientation of a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

/// Camera parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Distance from the camera to its focus point.
    pub distance: f32,
    pub orthographic: bool,
    /// Whether this is the camera the document was last viewed through.
    pub active: bool,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            distance: 128.0,
            orthographic: false,
            active: false,
        }
    }
}

/// Surface material shared by model nodes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Material {
    pub name: String,
    /// Base colour, RGBA8.
    pub base_color: [u8; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub emission: [f32; 3],
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            base_color: [255, 255, 255, 255],
            metallic: 0.2,
            roughness: 0.5,
            emission: [0.0; 3],
        }
    }
}

/// Directional scene light. Angles are in radians.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Light {
    pub pitch: f32,
    pub yaw: f32,
    pub intensity: f32,
    /// Light direction is fixed relative to the camera.
    pub fixed: bool,
    pub ambient: f32,
    pub shadow: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            pitch: 10f32.to_radians(),
            yaw: 120f32.to_radians(),
            intensity: 1.0,
            fixed: true,
            ambient: 0.2,
            shadow: 0.3,
        }
    }
}

/// Payload of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Model(RawVolume),
    Camera(Camera),
}

/// A named node with a transform.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub name: String,
    pub kind: NodeKind,
    pub visible: bool,
    pub transform: Transform,
    /// Normalised pivot within the node's volume bounds.
    pub pivot: Vec3,
    /// Index into [`SceneGraph::materials`].
    pub material: Option<usize>,
    /// Display colour of the node in editors.
    pub color: Option<[u8; 4]>,
    /// Additional key/value metadata.
    pub properties: BTreeMap<String, String>,
}

impl SceneNode {
    fn with_kind(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            visible: true,
            transform: Transform::default(),
            pivot: Vec3::ZERO,
            material: None,
            color: None,
            properties: BTreeMap::new(),
        }
    }

    /// Create a model node holding `volume`.
    pub fn model(name: impl Into<String>, volume: RawVolume) -> Self {
        Self::with_kind(name, NodeKind::Model(volume))
    }

    /// Create a camera node.
    pub fn camera(name: impl Into<String>, camera: Camera) -> Self {
        Self::with_kind(name, NodeKind::Camera(camera))
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_material(mut self, material: usize) -> Self {
        self.material = Some(material);
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn with_pivot(mut self, pivot: Vec3) -> Self {
        self.pivot = pivot;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// The node's volume, if it is a model node.
    pub fn volume(&self) -> Option<&RawVolume> {
        match &self.kind {
            NodeKind::Model(volume) => Some(volume),
            NodeKind::Camera(_) => None,
        }
    }

    pub fn volume_mut(&mut self) -> Option<&mut RawVolume> {
        match &mut self.kind {
            NodeKind::Model(volume) => Some(volume),
            NodeKind::Camera(_) => None,
        }
    }

    pub fn camera_data(&self) -> Option<&Camera> {
        match &self.kind {
            NodeKind::Camera(camera) => Some(camera),
            NodeKind::Model(_) => None,
        }
    }

    pub fn is_model(&self) -> bool {
        matches!(self.kind, NodeKind::Model(_))
    }
}

/// A complete scene.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
    pub palette: Palette,
    pub materials: Vec<Material>,
    pub light: Option<Light>,
}

impl SceneGraph {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty scene using `palette`.
    pub fn with_palette(palette: Palette) -> Self {
        Self {
            palette,
            ..Default::default()
        }
    }

    /// Append a node and return its id.
    pub fn add_node(&mut self, node: SceneNode) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Append a material and return its index.
    pub fn add_material(&mut self, material: Material) -> usize {
        self.materials.push(material);
        self.materials.len() - 1
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id)
    }

    pub fn nodes(&self) -> &[SceneNode] {
        &self.nodes
    }

    /// Model nodes in insertion order.
    pub fn model_nodes(&self) -> impl Iterator<Item = &SceneNode> {
        self.nodes.iter().filter(|n| n.is_model())
    }

    /// Camera nodes in insertion order.
    pub fn camera_nodes(&self) -> impl Iterator<Item = &SceneNode> {
        self.nodes.iter().filter(|n| !n.is_model())
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Bounds of every solid voxel across all model nodes.
    pub fn solid_region(&self) -> Option<crate::types::Region> {
        self.model_nodes()
            .filter_map(|n| n.volume().and_then(RawVolume::solid_region))
            .reduce(|a, b| a.union(&b))
    }

    /// A serialisable overview of the scene.
    pub fn summary(&self) -> SceneSummary {
        SceneSummary {
            nodes: self
                .nodes
                .iter()
                .map(|n| NodeSummary {
                    name: n.name.clone(),
                    kind: if n.is_model() { "model" } else { "camera" },
                    visible: n.visible,
                    voxels: n.volume().map_or(0, RawVolume::solid_count),
                    material: n.material,
                })
                .collect(),
            palette_colors: self.palette.len(),
            materials: self.materials.clone(),
            light: self.light.clone(),
        }
    }
}

/// Overview of one node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub name: String,
    pub kind: &'static str,
    pub visible: bool,
    pub voxels: usize,
    pub material: Option<usize>,
}

/// Overview of a scene, as printed by tooling.
#[derive(Debug, Clone, Serialize)]
pub struct SceneSummary {
    pub nodes: Vec<NodeSummary>,
    pub palette_colors: usize,
    pub materials: Vec<Material>,
    pub light: Option<Light>,
}
