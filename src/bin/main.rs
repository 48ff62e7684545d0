//! voxscene CLI
//!
//! Inspect, mesh and re-save GOX voxel scenes.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use voxscene::format::{block, gox};
use voxscene::{extract_cubic_mesh, FormatConfig, VoxelAccess};

#[derive(Parser)]
#[command(name = "voxscene")]
#[command(author, version, about = "Inspect, mesh and re-save GOX voxel scenes", long_about = None)]
struct Cli {
    /// JSON file with codec settings (see FormatConfig)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a JSON summary of a scene
    Info {
        /// Input GOX file
        input: PathBuf,
    },

    /// Print the palette of a scene without decoding layers
    Palette {
        /// Input GOX file
        input: PathBuf,
    },

    /// Extract the preview image of a scene as PNG
    Preview {
        /// Input GOX file
        input: PathBuf,

        /// Output PNG path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Extract, compact and compress a mesh per model node and report statistics
    Mesh {
        /// Input GOX file
        input: PathBuf,
    },

    /// Load a scene and write it back out
    Resave {
        /// Input GOX file
        input: PathBuf,

        /// Output GOX file
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Info { input } => show_info(&input, &config)?,
        Commands::Palette { input } => show_palette(&input, &config)?,
        Commands::Preview { input, output } => extract_preview(&input, &output, &config)?,
        Commands::Mesh { input } => mesh_scene(&input, &config)?,
        Commands::Resave { input, output } => {
            let scene = gox::load(&input, &config)?;
            gox::save(&scene, &output, &config)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<FormatConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let json = fs::read_to_string(path)?;
            Ok(serde_json::from_str(&json)?)
        }
        None => Ok(FormatConfig::default()),
    }
}

fn show_info(input: &Path, config: &FormatConfig) -> Result<(), Box<dyn std::error::Error>> {
    let scene = gox::load(input, config)?;
    println!("{}", serde_json::to_string_pretty(&scene.summary())?);
    Ok(())
}

fn show_palette(input: &Path, config: &FormatConfig) -> Result<(), Box<dyn std::error::Error>> {
    let palette = gox::load_palette(input, config)?;
    for (i, [r, g, b, a]) in palette.colors().iter().enumerate() {
        println!("{:3}  #{:02x}{:02x}{:02x}{:02x}", i, r, g, b, a);
    }
    Ok(())
}

fn extract_preview(
    input: &Path,
    output: &Path,
    config: &FormatConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match gox::load_screenshot(input, config)? {
        Some(image) => {
            let png = block::encode_png(&image)?;
            fs::write(output, &png)?;
            println!(
                "Exported {}x{} preview ({} bytes) to {:?}",
                image.width(),
                image.height(),
                png.len(),
                output
            );
        }
        None => println!("{:?} has no preview image", input),
    }
    Ok(())
}

#[derive(Serialize)]
struct MeshStats {
    node: String,
    vertices: usize,
    triangles: usize,
    index_width: usize,
    index_bytes: usize,
}

fn mesh_scene(input: &Path, config: &FormatConfig) -> Result<(), Box<dyn std::error::Error>> {
    let scene = gox::load(input, config)?;

    let mut stats = Vec::new();
    for node in scene.model_nodes() {
        let Some(volume) = node.volume() else {
            continue;
        };
        let mut mesh = extract_cubic_mesh(volume, volume.region());
        mesh.remove_unused_vertices();
        mesh.validate()?;

        let packed = mesh.compress_indices();
        let index_width = packed.width().map_or(0, |w| w.bytes());
        let index_bytes = packed.data().len();
        stats.push(MeshStats {
            node: node.name.clone(),
            vertices: mesh.vertex_count(),
            triangles: mesh.triangle_count(),
            index_width,
            index_bytes,
        });
    }

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
