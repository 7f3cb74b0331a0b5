//! Types for Voxelize API requests and responses

use glam::{IVec3, UVec3, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Voxelize client error types
#[derive(Debug, Error)]
pub enum VixivError {
    #[error("API key must be provided either explicitly or through the VOXELIZE_API_KEY environment variable")]
    MissingApiKey,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,

    #[error("Request rejected ({status}): {message}")]
    Validation { status: u16, message: String },

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("API error: {0}")]
    Api(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Request timeout after {0}s")]
    TimeoutError(u64),

    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VixivError {
    /// Whether the failure is transient and the request may be retried
    pub fn is_retryable(&self) -> bool {
        match self {
            // Not Implemented will not change on retry
            VixivError::ServerError { status, .. } => *status != 501,
            VixivError::ConnectionError(_) | VixivError::TimeoutError(_) => true,
            _ => false,
        }
    }
}

/// Result type alias for Voxelize operations
pub type Result<T> = std::result::Result<T, VixivError>;

/// Lattice unit-cell topology used to fill the mesh interior
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    /// Face-centered cubic
    #[default]
    Fcc,
    /// Body-centered cubic
    Bcc,
    /// Fluorite structure (the service spells it "flourite")
    #[serde(rename = "flourite", alias = "fluorite")]
    Flourite,
}

impl CellType {
    /// Wire name understood by the service
    pub fn as_str(self) -> &'static str {
        match self {
            CellType::Fcc => "fcc",
            CellType::Bcc => "bcc",
            CellType::Flourite => "flourite",
        }
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CellType {
    type Err = VixivError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fcc" => Ok(CellType::Fcc),
            "bcc" => Ok(CellType::Bcc),
            "flourite" | "fluorite" => Ok(CellType::Flourite),
            other => Err(VixivError::InvalidRequest(format!(
                "Unknown cell type '{}' (expected fcc, bcc or flourite)",
                other
            ))),
        }
    }
}

/// Coordinate axis
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn as_str(self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Axis {
    type Err = VixivError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x" => Ok(Axis::X),
            "y" => Ok(Axis::Y),
            "z" => Ok(Axis::Z),
            other => Err(VixivError::InvalidRequest(format!(
                "Unknown axis '{}' (expected x, y or z)",
                other
            ))),
        }
    }
}

/// Default unit cell edge lengths in mm
pub const DEFAULT_CELL_SIZE: Vec3 = Vec3::splat(40.0);

/// Default beam diameter in mm
pub const DEFAULT_BEAM_DIAMETER: f32 = 2.0;

/// Default minimum skin thickness in mm
pub const DEFAULT_MIN_SKIN_THICKNESS: f32 = 0.01;

/// Default force direction (unit cells oriented along +z)
pub const DEFAULT_FORCE_DIR: Vec3 = Vec3::Z;

/// Upper bound on shader anti-aliasing passes
pub const MAX_AA_PASSES: u32 = 16;

/// Check that a mesh input exists and is an STL file
pub fn validate_mesh_path(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(VixivError::FileNotFound(path.to_path_buf()));
    }
    ensure_stl_extension(path)
}

pub(crate) fn ensure_stl_extension(path: &Path) -> Result<()> {
    let is_stl = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("stl"));
    if is_stl {
        Ok(())
    } else {
        Err(VixivError::UnsupportedFormat(format!(
            "Only STL files are supported: {}",
            path.display()
        )))
    }
}

fn validate_positive(name: &str, value: f32) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(VixivError::InvalidRequest(format!(
            "{} must be a positive number, got {}",
            name, value
        )))
    }
}

fn validate_non_negative(name: &str, value: f32) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(VixivError::InvalidRequest(format!(
            "{} must be zero or positive, got {}",
            name, value
        )))
    }
}

fn validate_cell_size(cell_size: Vec3) -> Result<()> {
    validate_positive("cell_size.x", cell_size.x)?;
    validate_positive("cell_size.y", cell_size.y)?;
    validate_positive("cell_size.z", cell_size.z)
}

fn validate_direction(name: &str, dir: Vec3) -> Result<()> {
    if dir.is_finite() && dir.length_squared() > 0.0 {
        Ok(())
    } else {
        Err(VixivError::InvalidRequest(format!(
            "{} must be a non-zero vector, got {:?}",
            name,
            dir.to_array()
        )))
    }
}

fn validate_sampling_res(sampling_res: UVec3) -> Result<()> {
    if sampling_res.min_element() == 0 {
        return Err(VixivError::InvalidRequest(format!(
            "sampling_res components must be at least 1, got {:?}",
            sampling_res.to_array()
        )));
    }
    Ok(())
}

fn push_vec3_fields(fields: &mut Vec<(String, String)>, prefix: &str, v: Vec3) {
    fields.push((format!("{}_x", prefix), v.x.to_string()));
    fields.push((format!("{}_y", prefix), v.y.to_string()));
    fields.push((format!("{}_z", prefix), v.z.to_string()));
}

fn push_cell_size_fields(fields: &mut Vec<(String, String)>, cell_size: Vec3) {
    // Older service builds only read the scalar field
    if cell_size.x == cell_size.y && cell_size.y == cell_size.z {
        fields.push(("cell_size".to_string(), cell_size.x.to_string()));
    }
    push_vec3_fields(fields, "cell_size", cell_size);
}

fn push_sampling_fields(fields: &mut Vec<(String, String)>, sampling_res: UVec3) {
    fields.push(("sampling_res_x".to_string(), sampling_res.x.to_string()));
    fields.push(("sampling_res_y".to_string(), sampling_res.y.to_string()));
    fields.push(("sampling_res_z".to_string(), sampling_res.z.to_string()));
}

fn json_field<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| VixivError::InvalidRequest(format!("Failed to encode field: {}", e)))
}

/// Parameters for computing the lattice layout of a skin mesh
#[derive(Debug, Clone, PartialEq)]
pub struct MeshVoxelsRequest {
    /// Path to the skin STL file
    pub file_path: PathBuf,
    /// Unit cell size in mm, xyz relative to the force direction
    pub cell_size: Vec3,
    /// Minimum skin thickness in mm
    pub min_skin_thickness: f32,
    /// Number of sampling steps in xyz
    pub sampling_res: UVec3,
    /// Force direction used to orient unit cells
    pub force_dir: Vec3,
}

impl MeshVoxelsRequest {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            cell_size: DEFAULT_CELL_SIZE,
            min_skin_thickness: DEFAULT_MIN_SKIN_THICKNESS,
            sampling_res: UVec3::ONE,
            force_dir: DEFAULT_FORCE_DIR,
        }
    }

    pub fn with_cell_size(mut self, cell_size: Vec3) -> Self {
        self.cell_size = cell_size;
        self
    }

    pub fn with_min_skin_thickness(mut self, thickness: f32) -> Self {
        self.min_skin_thickness = thickness;
        self
    }

    pub fn with_sampling_res(mut self, sampling_res: UVec3) -> Self {
        self.sampling_res = sampling_res;
        self
    }

    pub fn with_force_dir(mut self, force_dir: Vec3) -> Self {
        self.force_dir = force_dir;
        self
    }

    /// Validate parameters without touching the filesystem
    pub fn validate(&self) -> Result<()> {
        ensure_stl_extension(&self.file_path)?;
        validate_cell_size(self.cell_size)?;
        validate_non_negative("min_skin_thickness", self.min_skin_thickness)?;
        validate_sampling_res(self.sampling_res)?;
        validate_direction("force_dir", self.force_dir)
    }

    /// Multipart form fields sent alongside the mesh file
    pub fn form_fields(&self) -> Vec<(String, String)> {
        let mut fields = Vec::new();
        push_cell_size_fields(&mut fields, self.cell_size);
        fields.push((
            "min_skin_thickness".to_string(),
            self.min_skin_thickness.to_string(),
        ));
        push_sampling_fields(&mut fields, self.sampling_res);
        push_vec3_fields(&mut fields, "force_dir", self.force_dir);
        fields
    }
}

/// Parameters for generating the lattice network of a skin mesh
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelizeRequest {
    /// Path to the skin STL file
    pub file_path: PathBuf,
    /// Where to write the resulting network mesh (defaults next to the input)
    pub network_path: Option<PathBuf>,
    pub cell_type: CellType,
    pub cell_size: Vec3,
    pub beam_diameter: f32,
    pub min_skin_thickness: f32,
    pub sampling_res: UVec3,
    pub force_dir: Vec3,
    /// Invert the cell fill
    pub invert_cells: bool,
    /// Lattice origin offset from a previous mesh-voxels call
    pub offsets: Option<Vec3>,
    /// Cell centers from a previous mesh-voxels call
    pub cell_centers: Option<Vec<Vec3>>,
    /// Axis along which cells are flattened to zero thickness
    pub zero_thickness_dir: Option<Axis>,
}

impl VoxelizeRequest {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            network_path: None,
            cell_type: CellType::default(),
            cell_size: DEFAULT_CELL_SIZE,
            beam_diameter: DEFAULT_BEAM_DIAMETER,
            min_skin_thickness: DEFAULT_MIN_SKIN_THICKNESS,
            sampling_res: UVec3::ONE,
            force_dir: DEFAULT_FORCE_DIR,
            invert_cells: false,
            offsets: None,
            cell_centers: None,
            zero_thickness_dir: None,
        }
    }

    pub fn with_network_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.network_path = Some(path.into());
        self
    }

    pub fn with_cell_type(mut self, cell_type: CellType) -> Self {
        self.cell_type = cell_type;
        self
    }

    pub fn with_cell_size(mut self, cell_size: Vec3) -> Self {
        self.cell_size = cell_size;
        self
    }

    pub fn with_beam_diameter(mut self, diameter: f32) -> Self {
        self.beam_diameter = diameter;
        self
    }

    pub fn with_min_skin_thickness(mut self, thickness: f32) -> Self {
        self.min_skin_thickness = thickness;
        self
    }

    pub fn with_sampling_res(mut self, sampling_res: UVec3) -> Self {
        self.sampling_res = sampling_res;
        self
    }

    pub fn with_force_dir(mut self, force_dir: Vec3) -> Self {
        self.force_dir = force_dir;
        self
    }

    pub fn with_invert_cells(mut self, invert: bool) -> Self {
        self.invert_cells = invert;
        self
    }

    pub fn with_offsets(mut self, offsets: Vec3) -> Self {
        self.offsets = Some(offsets);
        self
    }

    pub fn with_cell_centers(mut self, centers: Vec<Vec3>) -> Self {
        self.cell_centers = Some(centers);
        self
    }

    pub fn with_zero_thickness_dir(mut self, axis: Axis) -> Self {
        self.zero_thickness_dir = Some(axis);
        self
    }

    /// Reuse the lattice layout computed by a mesh-voxels call
    pub fn with_mesh_voxels(mut self, voxels: &MeshVoxels) -> Self {
        self.offsets = Some(voxels.offsets);
        self.cell_centers = Some(voxels.cell_centers.clone());
        self
    }

    /// Validate parameters without touching the filesystem
    pub fn validate(&self) -> Result<()> {
        ensure_stl_extension(&self.file_path)?;
        if let Some(network_path) = &self.network_path {
            ensure_stl_extension(network_path)?;
        }
        validate_cell_size(self.cell_size)?;
        validate_positive("beam_diameter", self.beam_diameter)?;
        validate_non_negative("min_skin_thickness", self.min_skin_thickness)?;
        validate_sampling_res(self.sampling_res)?;
        validate_direction("force_dir", self.force_dir)?;
        if let Some(offsets) = self.offsets {
            if !offsets.is_finite() {
                return Err(VixivError::InvalidRequest(
                    "offsets must be finite".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Multipart form fields sent alongside the mesh file
    pub fn form_fields(&self) -> Result<Vec<(String, String)>> {
        let mut fields = vec![("cell_type".to_string(), self.cell_type.to_string())];
        push_cell_size_fields(&mut fields, self.cell_size);
        fields.push(("beam_diameter".to_string(), self.beam_diameter.to_string()));
        fields.push((
            "min_skin_thickness".to_string(),
            self.min_skin_thickness.to_string(),
        ));
        push_sampling_fields(&mut fields, self.sampling_res);
        push_vec3_fields(&mut fields, "force_dir", self.force_dir);
        fields.push(("invert_cells".to_string(), self.invert_cells.to_string()));
        if let Some(axis) = self.zero_thickness_dir {
            fields.push(("zero_thickness_dir".to_string(), axis.to_string()));
        }
        if let Some(offsets) = &self.offsets {
            fields.push(("offsets".to_string(), json_field(offsets)?));
        }
        if let Some(centers) = &self.cell_centers {
            fields.push(("cell_centers".to_string(), json_field(centers)?));
        }
        Ok(fields)
    }
}

/// Parameters for merging a lattice network into its skin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrateRequest {
    pub skin_path: PathBuf,
    pub network_path: PathBuf,
    /// Destination of the integrated mesh
    pub out_path: PathBuf,
}

impl IntegrateRequest {
    pub fn new(
        skin_path: impl Into<PathBuf>,
        network_path: impl Into<PathBuf>,
        out_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            skin_path: skin_path.into(),
            network_path: network_path.into(),
            out_path: out_path.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure_stl_extension(&self.skin_path)?;
        ensure_stl_extension(&self.network_path)?;
        ensure_stl_extension(&self.out_path)
    }
}

/// Parameters for transforming cell centers into visualization space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoxelCentersRequest {
    pub cell_centers: Vec<Vec3>,
    pub force_dir: Vec3,
    /// Pivot for the force-direction rotation, usually the mesh center
    pub rotation_point: Vec3,
}

impl VoxelCentersRequest {
    pub fn new(cell_centers: Vec<Vec3>, force_dir: Vec3, rotation_point: Vec3) -> Self {
        Self {
            cell_centers,
            force_dir,
            rotation_point,
        }
    }

    /// Build from a mesh-voxels result
    pub fn from_mesh_voxels(voxels: &MeshVoxels, force_dir: Vec3, rotation_point: Vec3) -> Self {
        Self::new(voxels.cell_centers.clone(), force_dir, rotation_point)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cell_centers.is_empty() {
            return Err(VixivError::InvalidRequest(
                "cell_centers cannot be empty".to_string(),
            ));
        }
        validate_direction("force_dir", self.force_dir)?;
        if !self.rotation_point.is_finite() {
            return Err(VixivError::InvalidRequest(
                "rotation_point must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parameters for computing unit cell centers from cell geometry alone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculateCentersRequest {
    pub cell_type: CellType,
    pub cell_size: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angle: Option<f32>,
}

impl CalculateCentersRequest {
    pub fn new(cell_type: CellType, cell_size: f32) -> Self {
        Self {
            cell_type,
            cell_size,
            angle: None,
        }
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = Some(angle);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_positive("cell_size", self.cell_size)?;
        if let Some(angle) = self.angle {
            if !angle.is_finite() {
                return Err(VixivError::InvalidRequest("angle must be finite".to_string()));
            }
        }
        Ok(())
    }
}

/// Parameters for generating a lattice visualization shader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderRequest {
    pub cell_type: CellType,
    /// Cell center positions in visualization space
    pub positions: Vec<Vec3>,
    pub cell_size: Vec3,
    pub beam_diameter: f32,
    /// Render surface normals instead of shading
    pub view_normals: bool,
    /// Anti-aliasing passes
    pub aa_passes: u32,
    /// Rotation angle in degrees
    pub angle: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation_point: Option<Vec3>,
}

impl ShaderRequest {
    pub fn new(cell_type: CellType, positions: Vec<Vec3>) -> Self {
        Self {
            cell_type,
            positions,
            cell_size: DEFAULT_CELL_SIZE,
            beam_diameter: DEFAULT_BEAM_DIAMETER,
            view_normals: false,
            aa_passes: 0,
            angle: 0.0,
            rotation_point: None,
        }
    }

    pub fn with_cell_size(mut self, cell_size: Vec3) -> Self {
        self.cell_size = cell_size;
        self
    }

    pub fn with_beam_diameter(mut self, diameter: f32) -> Self {
        self.beam_diameter = diameter;
        self
    }

    pub fn with_view_normals(mut self, view_normals: bool) -> Self {
        self.view_normals = view_normals;
        self
    }

    pub fn with_aa_passes(mut self, passes: u32) -> Self {
        self.aa_passes = passes;
        self
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_rotation_point(mut self, point: Vec3) -> Self {
        self.rotation_point = Some(point);
        self
    }

    /// Take positions and angle from a voxel-centers result
    pub fn with_voxel_centers(mut self, centers: &VoxelCenters) -> Self {
        self.positions = centers.cell_centers.clone();
        self.angle = centers.angle;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.positions.is_empty() {
            return Err(VixivError::InvalidRequest(
                "positions cannot be empty".to_string(),
            ));
        }
        validate_cell_size(self.cell_size)?;
        validate_positive("beam_diameter", self.beam_diameter)?;
        if self.aa_passes > MAX_AA_PASSES {
            return Err(VixivError::InvalidRequest(format!(
                "aa_passes must be at most {}, got {}",
                MAX_AA_PASSES, self.aa_passes
            )));
        }
        if !self.angle.is_finite() {
            return Err(VixivError::InvalidRequest("angle must be finite".to_string()));
        }
        Ok(())
    }
}

/// Lattice layout of a skin mesh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshVoxels {
    /// Integer lattice coordinates of every filled cell
    pub location_table: Vec<IVec3>,
    /// Lattice origin offset
    pub offsets: Vec3,
    /// World-space centers of every filled cell
    pub cell_centers: Vec<Vec3>,
}

impl MeshVoxels {
    pub fn cell_count(&self) -> usize {
        self.cell_centers.len()
    }
}

/// Result of a voxelize call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoxelizeOutput {
    /// Location of the written network mesh
    pub output_path: PathBuf,
}

/// Cell centers in visualization space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoxelCenters {
    #[serde(alias = "vis_centers", alias = "centers")]
    pub cell_centers: Vec<Vec3>,
    /// Rotation angle in degrees
    #[serde(default)]
    pub angle: f32,
}

/// Generated shader source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderResult {
    #[serde(alias = "shader_code", alias = "shader_content", alias = "content")]
    pub shader: String,
    /// Any additional fields returned by the service
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ShaderResult {
    pub fn line_count(&self) -> usize {
        self.shader.lines().count()
    }
}

/// Service health response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    /// e.g. "ok" or "healthy"
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Whether server-side state management is enabled
    #[serde(default, alias = "stateful_mode", skip_serializing_if = "Option::is_none")]
    pub stateful: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ServiceStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(
            self.status.to_ascii_lowercase().as_str(),
            "ok" | "healthy" | "ready" | "running"
        )
    }
}

/// Server-side processing state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl StateSnapshot {
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Confirmation returned when server-side state is cleared
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClearStateResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MeshCenter {
    #[serde(alias = "rotation_point", alias = "centroid")]
    pub center: Vec3,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_type_parsing() {
        assert_eq!("fcc".parse::<CellType>().unwrap(), CellType::Fcc);
        assert_eq!("BCC".parse::<CellType>().unwrap(), CellType::Bcc);
        assert_eq!("fluorite".parse::<CellType>().unwrap(), CellType::Flourite);
        assert_eq!(CellType::Flourite.to_string(), "flourite");
        assert!("kagome".parse::<CellType>().is_err());
    }

    #[test]
    fn test_cell_type_serde() {
        assert_eq!(serde_json::to_string(&CellType::Bcc).unwrap(), "\"bcc\"");
        let parsed: CellType = serde_json::from_str("\"fluorite\"").unwrap();
        assert_eq!(parsed, CellType::Flourite);
    }

    #[test]
    fn test_axis_parsing() {
        assert_eq!("X".parse::<Axis>().unwrap(), Axis::X);
        assert_eq!(Axis::Z.to_string(), "z");
        assert!("w".parse::<Axis>().is_err());
    }

    #[test]
    fn test_stl_extension_check() {
        assert!(ensure_stl_extension(Path::new("mesh/Test16.STL")).is_ok());
        assert!(matches!(
            ensure_stl_extension(Path::new("mesh/test.obj")),
            Err(VixivError::UnsupportedFormat(_))
        ));
        assert!(ensure_stl_extension(Path::new("mesh/stl")).is_err());
    }

    #[test]
    fn test_validate_mesh_path_missing() {
        let err = validate_mesh_path(Path::new("definitely/missing/skin.stl")).unwrap_err();
        assert!(matches!(err, VixivError::FileNotFound(_)));
    }

    #[test]
    fn test_mesh_voxels_form_fields() {
        let request = MeshVoxelsRequest::new("skin.stl")
            .with_cell_size(Vec3::new(40.0, 40.0, 20.0))
            .with_sampling_res(UVec3::new(1, 2, 3));
        let fields = request.form_fields();

        let get = |name: &str| {
            fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };
        // Non-uniform cell size has no scalar field
        assert_eq!(get("cell_size"), None);
        assert_eq!(get("cell_size_z"), Some("20"));
        assert_eq!(get("sampling_res_y"), Some("2"));
        assert_eq!(get("force_dir_z"), Some("1"));
        assert_eq!(get("min_skin_thickness"), Some("0.01"));
    }

    #[test]
    fn test_voxelize_form_fields() {
        let request = VoxelizeRequest::new("skin.stl")
            .with_cell_type(CellType::Bcc)
            .with_invert_cells(true)
            .with_offsets(Vec3::new(0.5, 0.0, -0.5))
            .with_cell_centers(vec![Vec3::ZERO, Vec3::ONE])
            .with_zero_thickness_dir(Axis::X);
        let fields = request.form_fields().unwrap();

        let get = |name: &str| {
            fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        };
        assert_eq!(get("cell_type").as_deref(), Some("bcc"));
        assert_eq!(get("cell_size").as_deref(), Some("40"));
        assert_eq!(get("beam_diameter").as_deref(), Some("2"));
        assert_eq!(get("invert_cells").as_deref(), Some("true"));
        assert_eq!(get("zero_thickness_dir").as_deref(), Some("x"));
        assert_eq!(get("offsets").as_deref(), Some("[0.5,0.0,-0.5]"));
        assert_eq!(
            get("cell_centers").as_deref(),
            Some("[[0.0,0.0,0.0],[1.0,1.0,1.0]]")
        );
    }

    #[test]
    fn test_voxelize_validation() {
        assert!(VoxelizeRequest::new("skin.stl").validate().is_ok());
        assert!(VoxelizeRequest::new("skin.stl")
            .with_beam_diameter(0.0)
            .validate()
            .is_err());
        assert!(VoxelizeRequest::new("skin.stl")
            .with_cell_size(Vec3::new(40.0, -1.0, 40.0))
            .validate()
            .is_err());
        assert!(VoxelizeRequest::new("skin.stl")
            .with_force_dir(Vec3::ZERO)
            .validate()
            .is_err());
        assert!(VoxelizeRequest::new("skin.stl")
            .with_sampling_res(UVec3::new(1, 0, 1))
            .validate()
            .is_err());
        assert!(VoxelizeRequest::new("skin.stl")
            .with_network_path("network.ply")
            .validate()
            .is_err());
    }

    #[test]
    fn test_voxelize_with_mesh_voxels() {
        let voxels = MeshVoxels {
            location_table: vec![IVec3::new(0, 0, 0)],
            offsets: Vec3::new(1.0, 2.0, 3.0),
            cell_centers: vec![Vec3::new(20.0, 20.0, 20.0)],
        };
        let request = VoxelizeRequest::new("skin.stl").with_mesh_voxels(&voxels);
        assert_eq!(request.offsets, Some(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(request.cell_centers, Some(vec![Vec3::new(20.0, 20.0, 20.0)]));
    }

    #[test]
    fn test_shader_request_validation() {
        let valid = ShaderRequest::new(CellType::Fcc, vec![Vec3::ZERO]);
        assert!(valid.validate().is_ok());

        let empty = ShaderRequest::new(CellType::Fcc, Vec::new());
        assert!(empty.validate().is_err());

        let too_many_passes = ShaderRequest::new(CellType::Fcc, vec![Vec3::ZERO]).with_aa_passes(17);
        assert!(too_many_passes.validate().is_err());
    }

    #[test]
    fn test_shader_request_json() {
        let request = ShaderRequest::new(CellType::Bcc, vec![Vec3::new(1.0, 2.0, 3.0)])
            .with_angle(45.0)
            .with_aa_passes(2);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["cell_type"], "bcc");
        assert_eq!(json["positions"], serde_json::json!([[1.0, 2.0, 3.0]]));
        assert_eq!(json["aa_passes"], 2);
        assert_eq!(json["angle"], 45.0);
        assert!(json.get("rotation_point").is_none());
    }

    #[test]
    fn test_shader_request_with_voxel_centers() {
        let centers = VoxelCenters {
            cell_centers: vec![Vec3::X, Vec3::Y],
            angle: 30.0,
        };
        let request = ShaderRequest::new(CellType::Fcc, Vec::new()).with_voxel_centers(&centers);
        assert_eq!(request.positions.len(), 2);
        assert_eq!(request.angle, 30.0);
    }

    #[test]
    fn test_calculate_centers_json_omits_angle() {
        let request = CalculateCentersRequest::new(CellType::Fcc, 40.0);
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("angle").is_none());

        let with_angle = request.with_angle(90.0);
        let json = serde_json::to_value(&with_angle).unwrap();
        assert_eq!(json["angle"], 90.0);
    }

    #[test]
    fn test_voxel_centers_aliases() {
        let parsed: VoxelCenters =
            serde_json::from_str(r#"{"vis_centers": [[1, 2, 3]], "angle": 12.5}"#).unwrap();
        assert_eq!(parsed.cell_centers, vec![Vec3::new(1.0, 2.0, 3.0)]);
        assert_eq!(parsed.angle, 12.5);

        let no_angle: VoxelCenters = serde_json::from_str(r#"{"centers": []}"#).unwrap();
        assert_eq!(no_angle.angle, 0.0);
    }

    #[test]
    fn test_mesh_voxels_parsing() {
        let parsed: MeshVoxels = serde_json::from_str(
            r#"{
                "location_table": [[0, 0, 0], [1, 0, -1]],
                "offsets": [0.5, 0.5, 0.5],
                "cell_centers": [[20, 20, 20], [60, 20, -20]]
            }"#,
        )
        .unwrap();
        assert_eq!(parsed.location_table[1], IVec3::new(1, 0, -1));
        assert_eq!(parsed.cell_count(), 2);
    }

    #[test]
    fn test_shader_result_keeps_extra_fields() {
        let parsed: ShaderResult = serde_json::from_str(
            r#"{"success": true, "shader_code": "void main() {}\n// end"}"#,
        )
        .unwrap();
        assert_eq!(parsed.line_count(), 2);
        assert_eq!(parsed.extra["success"], true);
    }

    #[test]
    fn test_service_status_health() {
        let status: ServiceStatus = serde_json::from_str(
            r#"{"status": "healthy", "stateful_mode": true, "rate_limit": "100/hour"}"#,
        )
        .unwrap();
        assert!(status.is_healthy());
        assert_eq!(status.stateful, Some(true));
        assert_eq!(status.extra["rate_limit"], "100/hour");

        let down: ServiceStatus = serde_json::from_str(r#"{"status": "degraded"}"#).unwrap();
        assert!(!down.is_healthy());
    }

    #[test]
    fn test_retryable_errors() {
        let server = |status| VixivError::ServerError {
            status,
            message: "boom".into(),
        };
        assert!(server(500).is_retryable());
        assert!(server(503).is_retryable());
        assert!(!server(501).is_retryable());
        assert!(VixivError::TimeoutError(5).is_retryable());
        assert!(VixivError::ConnectionError("refused".into()).is_retryable());
        assert!(!VixivError::RateLimited.is_retryable());
        assert!(!VixivError::InvalidApiKey.is_retryable());
    }
}
