//! Vixiv - client SDK for the Voxelize lattice service
//!
//! The Voxelize service fills the interior of a skin mesh with a lattice of
//! unit cells (FCC, BCC or fluorite), merges the resulting beam network back
//! into the skin, and generates GLSL shaders for previewing the lattice. All of
//! the geometry work happens server-side; this crate is the typed client.
//!
//! ## Features
//!
//! - **Async HTTP client** authenticated with an `X-API-Key` header
//! - **Typed requests** with builders and local validation before any upload
//! - **Retry logic** with exponential backoff for transient failures
//! - **Session cache** of the last computed results for chaining calls
//! - **`vixiv` CLI** covering every endpoint plus the full pipeline
//!
//! ## Workflow
//!
//! ```text
//! skin.stl
//!     ↓ POST mesh-voxels      → location table, offsets, cell centers
//!     ↓ POST voxelize         → network.stl
//!     ↓ POST integrate        → final.stl
//!
//! skin.stl
//!     ↓ POST read-mesh        → rotation point
//!     ↓ POST voxel-centers    → visualization centers, angle
//!     ↓ POST generate-shader  → out.glsl
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use glam::Vec3;
//! use vixiv::{CellType, MeshVoxelsRequest, ShaderRequest, VoxelCentersRequest, VoxelizeClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads VOXELIZE_API_KEY and VOXELIZE_BASE_URL
//!     let client = VoxelizeClient::from_env()?;
//!
//!     let voxels = client
//!         .get_mesh_voxels(&MeshVoxelsRequest::new("mesh/Test16.stl"))
//!         .await?;
//!
//!     let center = client.read_mesh("mesh/Test16.stl").await?;
//!     let centers = client
//!         .get_voxel_centers(&VoxelCentersRequest::from_mesh_voxels(&voxels, Vec3::Z, center))
//!         .await?;
//!
//!     let shader = ShaderRequest::new(CellType::Bcc, Vec::new())
//!         .with_voxel_centers(&centers)
//!         .with_rotation_point(center);
//!     client.generate_shader_to_file(&shader, "out.glsl").await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod output;
pub mod state;
pub mod types;

pub use client::{VoxelizeClient, API_KEY_HEADER};
pub use config::{ClientConfig, API_KEY_ENV, BASE_URL_ENV, DEFAULT_BASE_URL};
pub use output::FilePayload;
pub use state::SessionState;
pub use types::{
    Axis, CalculateCentersRequest, CellType, ClearStateResponse, IntegrateRequest, MeshVoxels,
    MeshVoxelsRequest, Result, ServiceStatus, ShaderRequest, ShaderResult, StateSnapshot,
    VixivError, VoxelCenters, VoxelCentersRequest, VoxelizeOutput, VoxelizeRequest,
};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::client::VoxelizeClient;
    pub use crate::config::ClientConfig;
    pub use crate::state::SessionState;
    pub use crate::types::{
        Axis, CalculateCentersRequest, CellType, IntegrateRequest, MeshVoxels, MeshVoxelsRequest,
        ShaderRequest, VixivError, VoxelCenters, VoxelCentersRequest, VoxelizeRequest,
    };
}
