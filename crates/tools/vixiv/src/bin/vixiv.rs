//! Vixiv CLI - command-line interface for the Voxelize lattice service

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use glam::{UVec3, Vec3};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use vixiv::{
    Axis, CalculateCentersRequest, CellType, ClientConfig, IntegrateRequest, MeshVoxels,
    MeshVoxelsRequest, ShaderRequest, VoxelCenters, VoxelCentersRequest, VoxelizeClient,
    VoxelizeRequest, DEFAULT_BASE_URL,
};

/// Vixiv CLI - mesh lattice voxelization and shader generation
#[derive(Parser)]
#[command(name = "vixiv")]
#[command(about = "Client for the Voxelize lattice service", long_about = None)]
struct Cli {
    /// API key for the Voxelize service
    #[arg(long, env = "VOXELIZE_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Base URL of the Voxelize API
    #[arg(long, env = "VOXELIZE_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    base_url: String,

    /// Request timeout in seconds
    #[arg(long, default_value = "600", global = true)]
    timeout: u64,

    /// Retry attempts for transient failures
    #[arg(long, default_value = "3", global = true)]
    retries: u32,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check service status
    Status,

    /// Show server-side processing state
    State,

    /// Clear server-side processing state
    ClearState,

    /// Compute the lattice layout of a skin mesh
    MeshVoxels {
        /// Skin mesh (.stl)
        skin: PathBuf,

        #[command(flatten)]
        lattice: LatticeArgs,

        /// Write the layout as JSON to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate the lattice network for a skin mesh
    Voxelize {
        /// Skin mesh (.stl)
        skin: PathBuf,

        /// Output network mesh (.stl), defaults to voxelized_<skin> next to the input
        #[arg(short, long)]
        network: Option<PathBuf>,

        #[command(flatten)]
        lattice: LatticeArgs,

        /// Beam diameter in mm
        #[arg(long, default_value = "2")]
        beam_diameter: f32,

        /// Invert the cell fill
        #[arg(long)]
        invert_cells: bool,

        /// Axis along which cells are flattened (x, y or z)
        #[arg(long)]
        zero_thickness_dir: Option<Axis>,

        /// Layout JSON from `mesh-voxels` to reuse offsets and cell centers
        #[arg(long)]
        layout: Option<PathBuf>,
    },

    /// Merge a lattice network into its skin
    Integrate {
        /// Skin mesh (.stl)
        skin: PathBuf,

        /// Network mesh (.stl)
        network: PathBuf,

        /// Output mesh (.stl)
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Print the center point of a mesh
    ReadMesh {
        /// Mesh (.stl)
        mesh: PathBuf,
    },

    /// Compute visualization cell centers
    ///
    /// With --layout the centers of a mesh layout are rotated into
    /// visualization space; otherwise unit cell centers are computed from
    /// --cell-type and --cell-size.
    VoxelCenters {
        /// Layout JSON from `mesh-voxels`
        #[arg(long)]
        layout: Option<PathBuf>,

        /// Force direction, "x,y,z"
        #[arg(long, default_value = "0,0,1", value_parser = parse_vec3)]
        force_dir: Vec3,

        /// Rotation point, "x,y,z"
        #[arg(long, default_value = "0,0,0", value_parser = parse_vec3)]
        rotation_point: Vec3,

        /// Cell type when no layout is given
        #[arg(long, default_value = "fcc")]
        cell_type: CellType,

        /// Cell size in mm when no layout is given
        #[arg(long, default_value = "40")]
        cell_size: f32,

        /// Rotation angle in degrees when no layout is given
        #[arg(long)]
        angle: Option<f32>,

        /// Write the centers as JSON to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate a lattice visualization shader
    Shader {
        /// Centers JSON from `voxel-centers`
        #[arg(long)]
        centers: PathBuf,

        /// Output shader file
        #[arg(short, long, default_value = "out.glsl")]
        out: PathBuf,

        #[arg(long, default_value = "fcc")]
        cell_type: CellType,

        /// Cell size in mm, "x,y,z" or a single value
        #[arg(long, default_value = "40", value_parser = parse_vec3)]
        cell_size: Vec3,

        /// Beam diameter in mm
        #[arg(long, default_value = "2")]
        beam_diameter: f32,

        /// Rotation point, "x,y,z"
        #[arg(long, value_parser = parse_vec3)]
        rotation_point: Option<Vec3>,

        /// Visualize normals instead of shading
        #[arg(long)]
        view_normals: bool,

        /// Anti-aliasing passes
        #[arg(long, default_value = "0")]
        aa_passes: u32,
    },

    /// Run the full workflow: layout, network, integration and shader
    Pipeline {
        /// Skin mesh (.stl)
        skin: PathBuf,

        /// Network mesh output (.stl)
        #[arg(long, default_value = "network.stl")]
        network: PathBuf,

        /// Integrated mesh output (.stl)
        #[arg(long, default_value = "final_result.stl")]
        out: PathBuf,

        /// Shader output
        #[arg(long, default_value = "out.glsl")]
        shader: PathBuf,

        #[command(flatten)]
        lattice: LatticeArgs,

        /// Beam diameter in mm
        #[arg(long, default_value = "2")]
        beam_diameter: f32,

        /// Invert the cell fill
        #[arg(long)]
        invert_cells: bool,

        /// Axis along which cells are flattened (x, y or z)
        #[arg(long)]
        zero_thickness_dir: Option<Axis>,

        /// Visualize normals instead of shading
        #[arg(long)]
        view_normals: bool,

        /// Anti-aliasing passes
        #[arg(long, default_value = "0")]
        aa_passes: u32,
    },
}

/// Lattice geometry shared by layout and voxelize commands
#[derive(Args, Clone)]
struct LatticeArgs {
    /// Cell type (fcc, bcc or flourite)
    #[arg(long, default_value = "fcc")]
    cell_type: CellType,

    /// Cell size in mm, "x,y,z" or a single value
    #[arg(long, default_value = "40", value_parser = parse_vec3)]
    cell_size: Vec3,

    /// Minimum skin thickness in mm
    #[arg(long, default_value = "0.01")]
    min_skin_thickness: f32,

    /// Sampling steps, "x,y,z" or a single value
    #[arg(long, default_value = "1", value_parser = parse_uvec3)]
    sampling_res: UVec3,

    /// Force direction, "x,y,z"
    #[arg(long, default_value = "0,0,1", value_parser = parse_vec3)]
    force_dir: Vec3,
}

impl LatticeArgs {
    fn mesh_voxels_request(&self, skin: &Path) -> MeshVoxelsRequest {
        MeshVoxelsRequest::new(skin)
            .with_cell_size(self.cell_size)
            .with_min_skin_thickness(self.min_skin_thickness)
            .with_sampling_res(self.sampling_res)
            .with_force_dir(self.force_dir)
    }

    fn voxelize_request(&self, skin: &Path) -> VoxelizeRequest {
        VoxelizeRequest::new(skin)
            .with_cell_type(self.cell_type)
            .with_cell_size(self.cell_size)
            .with_min_skin_thickness(self.min_skin_thickness)
            .with_sampling_res(self.sampling_res)
            .with_force_dir(self.force_dir)
    }
}

fn parse_components<T: std::str::FromStr>(s: &str) -> Result<Vec<T>, String> {
    s.split(',')
        .map(|part| {
            part.trim()
                .parse::<T>()
                .map_err(|_| format!("invalid component '{}' in '{}'", part.trim(), s))
        })
        .collect()
}

fn parse_vec3(s: &str) -> Result<Vec3, String> {
    match parse_components::<f32>(s)?.as_slice() {
        [v] => Ok(Vec3::splat(*v)),
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(format!("expected 1 or 3 comma-separated values, got '{}'", s)),
    }
}

fn parse_uvec3(s: &str) -> Result<UVec3, String> {
    match parse_components::<u32>(s)?.as_slice() {
        [v] => Ok(UVec3::splat(*v)),
        [x, y, z] => Ok(UVec3::new(*x, *y, *z)),
        _ => Err(format!("expected 1 or 3 comma-separated values, got '{}'", s)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let default_filter = if cli.verbose { "vixiv=debug" } else { "vixiv=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::new(cli.api_key.clone(), cli.base_url.clone())?
        .with_request_timeout(Duration::from_secs(cli.timeout))
        .with_max_retries(cli.retries);
    let client = VoxelizeClient::from_config(config)?;
    tracing::debug!("Using Voxelize API at {}", client.base_url());

    match cli.command {
        Commands::Status => {
            let status = client.get_status().await?;
            print_json(&status)?;
            if !status.is_healthy() {
                tracing::warn!("Service reports status '{}'", status.status);
            }
        }
        Commands::State => print_json(&client.get_state().await?)?,
        Commands::ClearState => print_json(&client.clear_state().await?)?,
        Commands::MeshVoxels {
            skin,
            lattice,
            output,
        } => {
            let request = lattice.mesh_voxels_request(&skin);
            let voxels = with_spinner("Computing lattice layout...", client.get_mesh_voxels(&request))
                .await?;
            eprintln!("Layout: {} cells", voxels.cell_count());
            write_or_print(&voxels, output.as_deref(), &mut io::stdout().lock())?;
        }
        Commands::Voxelize {
            skin,
            network,
            lattice,
            beam_diameter,
            invert_cells,
            zero_thickness_dir,
            layout,
        } => {
            let mut request = lattice
                .voxelize_request(&skin)
                .with_beam_diameter(beam_diameter)
                .with_invert_cells(invert_cells);
            if let Some(path) = network {
                request = request.with_network_path(path);
            }
            if let Some(axis) = zero_thickness_dir {
                request = request.with_zero_thickness_dir(axis);
            }
            if let Some(layout) = layout {
                let voxels: MeshVoxels = read_json(&layout)?;
                request = request.with_mesh_voxels(&voxels);
            }

            let output = with_spinner("Generating lattice network...", client.voxelize_mesh(&request))
                .await?;
            println!("Network: {}", output.output_path.display());
        }
        Commands::Integrate { skin, network, out } => {
            let request = IntegrateRequest::new(skin, network, out);
            let path = with_spinner("Integrating network into skin...", client.integrate_network(&request))
                .await?;
            println!("Integrated mesh: {}", path.display());
        }
        Commands::ReadMesh { mesh } => {
            let center = client.read_mesh(&mesh).await?;
            print_json(&center)?;
        }
        Commands::VoxelCenters {
            layout,
            force_dir,
            rotation_point,
            cell_type,
            cell_size,
            angle,
            output,
        } => {
            let centers = match layout {
                Some(layout) => {
                    let voxels: MeshVoxels = read_json(&layout)?;
                    let request =
                        VoxelCentersRequest::from_mesh_voxels(&voxels, force_dir, rotation_point);
                    client.get_voxel_centers(&request).await?
                }
                None => {
                    let mut request = CalculateCentersRequest::new(cell_type, cell_size);
                    if let Some(angle) = angle {
                        request = request.with_angle(angle);
                    }
                    client.calculate_voxel_centers(&request).await?
                }
            };
            write_or_print(&centers, output.as_deref(), &mut io::stdout().lock())?;
        }
        Commands::Shader {
            centers,
            out,
            cell_type,
            cell_size,
            beam_diameter,
            rotation_point,
            view_normals,
            aa_passes,
        } => {
            let centers: VoxelCenters = read_json(&centers)?;
            let mut request = ShaderRequest::new(cell_type, Vec::new())
                .with_voxel_centers(&centers)
                .with_cell_size(cell_size)
                .with_beam_diameter(beam_diameter)
                .with_view_normals(view_normals)
                .with_aa_passes(aa_passes);
            if let Some(point) = rotation_point {
                request = request.with_rotation_point(point);
            }
            let path = with_spinner("Generating shader...", client.generate_shader_to_file(&request, &out))
                .await?;
            println!("Shader: {}", path.display());
        }
        Commands::Pipeline {
            skin,
            network,
            out,
            shader,
            lattice,
            beam_diameter,
            invert_cells,
            zero_thickness_dir,
            view_normals,
            aa_passes,
        } => {
            println!("Voxelize Pipeline");
            println!("=================");
            println!("Skin: {}", skin.display());
            println!("Cell: {} {:?} mm", lattice.cell_type, lattice.cell_size.to_array());
            println!();

            let voxels = with_spinner(
                "Step 1/5: computing lattice layout...",
                client.get_mesh_voxels(&lattice.mesh_voxels_request(&skin)),
            )
            .await?;
            println!("  {} cells", voxels.cell_count());

            let mut request = lattice
                .voxelize_request(&skin)
                .with_network_path(&network)
                .with_beam_diameter(beam_diameter)
                .with_invert_cells(invert_cells)
                .with_mesh_voxels(&voxels);
            if let Some(axis) = zero_thickness_dir {
                request = request.with_zero_thickness_dir(axis);
            }
            let network = with_spinner(
                "Step 2/5: generating lattice network...",
                client.voxelize_mesh(&request),
            )
            .await?
            .output_path;
            println!("  network: {}", network.display());

            let final_path = with_spinner(
                "Step 3/5: integrating network into skin...",
                client.integrate_network(&IntegrateRequest::new(&skin, &network, &out)),
            )
            .await?;
            println!("  integrated: {}", final_path.display());

            let (center, centers) =
                with_spinner("Step 4/5: computing visualization centers...", async {
                    let center = client.read_mesh(&skin).await?;
                    let request =
                        VoxelCentersRequest::from_mesh_voxels(&voxels, lattice.force_dir, center);
                    let centers = client.get_voxel_centers(&request).await?;
                    Ok::<_, vixiv::VixivError>((center, centers))
                })
                .await?;

            let request = ShaderRequest::new(lattice.cell_type, Vec::new())
                .with_voxel_centers(&centers)
                .with_cell_size(lattice.cell_size)
                .with_beam_diameter(beam_diameter)
                .with_rotation_point(center)
                .with_view_normals(view_normals)
                .with_aa_passes(aa_passes);
            let shader_path = with_spinner(
                "Step 5/5: generating shader...",
                client.generate_shader_to_file(&request, &shader),
            )
            .await?;
            println!("  shader: {}", shader_path.display());

            println!();
            println!("Done.");
        }
    }

    Ok(())
}

async fn with_spinner<T, E>(
    message: &'static str,
    future: impl Future<Output = Result<T, E>>,
) -> Result<T, E> {
    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    progress.enable_steady_tick(Duration::from_millis(100));
    progress.set_message(message);

    let result = future.await;
    match &result {
        Ok(_) => progress.finish_with_message(format!("✓ {}", message.trim_end_matches("..."))),
        Err(_) => progress.finish_with_message(format!("✗ {}", message.trim_end_matches("..."))),
    }
    result
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    write_json(value, &mut io::stdout().lock())
}

fn write_json<T: Serialize>(value: &T, out: &mut impl Write) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Write JSON to `path`, or to `out` when no path is given
///
/// `out` only ever receives the JSON document so it can be redirected into a
/// file and read back with `--layout`/`--centers`.
fn write_or_print<T: Serialize>(
    value: &T,
    path: Option<&Path>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            fs::write(path, serde_json::to_string_pretty(value)?)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Wrote {}", path.display());
            Ok(())
        }
        None => write_json(value, out),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::IVec3;

    fn sample_layout() -> MeshVoxels {
        MeshVoxels {
            location_table: vec![IVec3::ZERO, IVec3::new(1, 0, 0)],
            offsets: Vec3::new(0.5, 0.5, 0.0),
            cell_centers: vec![Vec3::splat(20.0), Vec3::new(60.0, 20.0, 20.0)],
        }
    }

    #[test]
    fn test_layout_stdout_reads_back_as_layout() {
        let layout = sample_layout();
        let mut stdout = Vec::new();
        write_or_print(&layout, None, &mut stdout).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let redirected = dir.path().join("layout.json");
        fs::write(&redirected, &stdout).unwrap();
        let parsed: MeshVoxels = read_json(&redirected).unwrap();
        assert_eq!(parsed, layout);
    }

    #[test]
    fn test_layout_output_file_leaves_stdout_empty() {
        let layout = sample_layout();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.json");
        let mut stdout = Vec::new();
        write_or_print(&layout, Some(&path), &mut stdout).unwrap();

        assert!(stdout.is_empty());
        assert_eq!(read_json::<MeshVoxels>(&path).unwrap(), layout);
    }

    #[test]
    fn test_parse_vec3() {
        assert_eq!(parse_vec3("40").unwrap(), Vec3::splat(40.0));
        assert_eq!(parse_vec3("0, 0, 1").unwrap(), Vec3::Z);
        assert!(parse_vec3("1,2").is_err());
        assert!(parse_vec3("a,b,c").is_err());
    }

    #[test]
    fn test_parse_uvec3() {
        assert_eq!(parse_uvec3("2").unwrap(), UVec3::splat(2));
        assert_eq!(parse_uvec3("1,2,3").unwrap(), UVec3::new(1, 2, 3));
        assert!(parse_uvec3("-1").is_err());
    }

    #[test]
    fn test_cli_parses_pipeline() {
        let cli = Cli::try_parse_from([
            "vixiv",
            "--api-key",
            "k",
            "pipeline",
            "mesh/Test16.stl",
            "--cell-type",
            "bcc",
            "--cell-size",
            "40,40,40",
            "--invert-cells",
            "--zero-thickness-dir",
            "x",
        ])
        .unwrap();

        match cli.command {
            Commands::Pipeline {
                lattice,
                invert_cells,
                zero_thickness_dir,
                ..
            } => {
                assert_eq!(lattice.cell_type, CellType::Bcc);
                assert_eq!(lattice.force_dir, Vec3::Z);
                assert!(invert_cells);
                assert_eq!(zero_thickness_dir, Some(Axis::X));
            }
            _ => panic!("expected pipeline command"),
        }
    }

    #[test]
    fn test_cli_verifies() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
