//! Voxelize API HTTP client implementation

use crate::config::ClientConfig;
use crate::output::{default_network_path, write_payload, FilePayload};
use crate::state::{SessionCache, SessionState};
use crate::types::{
    validate_mesh_path, CalculateCentersRequest, ClearStateResponse, IntegrateRequest,
    MeshCenter, MeshVoxels, MeshVoxelsRequest, Result, ServiceStatus, ShaderRequest,
    ShaderResult, StateSnapshot, VixivError, VoxelCenters, VoxelCentersRequest, VoxelizeOutput,
    VoxelizeRequest,
};
use glam::Vec3;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Header carrying the API key on every request (`X-API-Key`)
pub const API_KEY_HEADER: &str = "x-api-key";

/// Upper bound for a single backoff delay (30 seconds)
const MAX_BACKOFF_MS: u64 = 30_000;

/// Voxelize API client
///
/// Wraps the remote mesh voxelization service: lattice layout, network
/// generation, skin integration, visualization centers and shader generation.
/// Results that later steps depend on are also kept in a local session cache,
/// see [`VoxelizeClient::session`].
///
/// # Example
///
/// ```no_run
/// use vixiv::{CellType, MeshVoxelsRequest, VoxelizeClient, VoxelizeRequest};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = VoxelizeClient::new(Some("my-key".into()), "http://localhost:5000/api/v1")?;
///
///     let voxels = client
///         .get_mesh_voxels(&MeshVoxelsRequest::new("mesh/Test16.stl"))
///         .await?;
///
///     let request = VoxelizeRequest::new("mesh/Test16.stl")
///         .with_cell_type(CellType::Bcc)
///         .with_network_path("mesh/network.stl")
///         .with_mesh_voxels(&voxels);
///     let output = client.voxelize_mesh(&request).await?;
///
///     println!("Network written to {}", output.output_path.display());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct VoxelizeClient {
    client: Client,
    config: ClientConfig,
    session: SessionCache,
}

/// A mesh file attached to a multipart request
struct MeshUpload {
    field: &'static str,
    file_name: String,
    bytes: Vec<u8>,
}

enum RequestBody {
    Empty,
    Json(Value),
    Multipart {
        files: Vec<MeshUpload>,
        fields: Vec<(String, String)>,
    },
}

impl VoxelizeClient {
    /// Create a client for the given base URL
    ///
    /// When `api_key` is `None` the key is read from `VOXELIZE_API_KEY`.
    pub fn new(api_key: Option<String>, base_url: impl Into<String>) -> Result<Self> {
        Self::from_config(ClientConfig::new(api_key, base_url)?)
    }

    /// Create a client from `VOXELIZE_API_KEY` and `VOXELIZE_BASE_URL`
    pub fn from_env() -> Result<Self> {
        Self::from_config(ClientConfig::from_env()?)
    }

    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let mut key = HeaderValue::from_str(config.api_key()).map_err(|_| {
            VixivError::InvalidRequest("API key contains characters not allowed in a header".into())
        })?;
        key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, key);

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            config,
            session: SessionCache::default(),
        })
    }

    /// Set the timeout for processing requests
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_request_timeout(timeout);
        self
    }

    /// Set the timeout for status requests
    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_status_timeout(timeout);
        self
    }

    /// Set the maximum number of retry attempts for transient failures
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.config = self.config.with_max_retries(max_retries);
        self
    }

    /// Set the base delay for exponential backoff (in milliseconds)
    pub fn with_base_delay_ms(mut self, delay_ms: u64) -> Self {
        self.config = self.config.with_base_delay_ms(delay_ms);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        self.config.base_url()
    }

    /// Compute the lattice layout of a skin mesh
    ///
    /// Returns the lattice location table, origin offset and cell centers,
    /// which feed [`VoxelizeRequest::with_mesh_voxels`] and
    /// [`VoxelCentersRequest::from_mesh_voxels`].
    pub async fn get_mesh_voxels(&self, request: &MeshVoxelsRequest) -> Result<MeshVoxels> {
        request.validate()?;
        let upload = read_mesh_upload("file", &request.file_path).await?;

        let body = RequestBody::Multipart {
            files: vec![upload],
            fields: request.form_fields(),
        };
        let value = self
            .send(Method::POST, "mesh-voxels", self.config.request_timeout(), &body)
            .await?;
        let voxels: MeshVoxels = decode_response(value, "mesh voxels")?;

        tracing::debug!("Received {} cell centers", voxels.cell_count());
        self.session
            .update(|state| state.mesh_voxels = Some(voxels.clone()));
        Ok(voxels)
    }

    /// Generate the lattice network for a skin mesh and write it to disk
    ///
    /// The network is written to `network_path` when set, otherwise to
    /// `voxelized_<name>` next to the input file.
    pub async fn voxelize_mesh(&self, request: &VoxelizeRequest) -> Result<VoxelizeOutput> {
        request.validate()?;
        let upload = read_mesh_upload("file", &request.file_path).await?;

        let body = RequestBody::Multipart {
            files: vec![upload],
            fields: request.form_fields()?,
        };
        let value = self
            .send(Method::POST, "voxelize", self.config.request_timeout(), &body)
            .await?;
        let payload: FilePayload = decode_response(value, "voxelize")?;

        let output_path = match &request.network_path {
            Some(path) => path.clone(),
            None => default_network_path(&request.file_path, &payload)?,
        };
        let output_path = write_payload(&payload, &output_path).await?;

        self.session
            .update(|state| state.network_path = Some(output_path.clone()));
        Ok(VoxelizeOutput { output_path })
    }

    /// Merge a lattice network into its skin and write the result to `out_path`
    pub async fn integrate_network(&self, request: &IntegrateRequest) -> Result<PathBuf> {
        request.validate()?;
        let skin = read_mesh_upload("skin", &request.skin_path).await?;
        let network = read_mesh_upload("network", &request.network_path).await?;

        let out_filename = request
            .out_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("integrated.stl")
            .to_string();
        let body = RequestBody::Multipart {
            files: vec![skin, network],
            fields: vec![("out_filename".to_string(), out_filename)],
        };
        let value = self
            .send(Method::POST, "integrate", self.config.request_timeout(), &body)
            .await?;
        let payload: FilePayload = decode_response(value, "integrate")?;

        let out_path = write_payload(&payload, &request.out_path).await?;
        self.session
            .update(|state| state.integrated_path = Some(out_path.clone()));
        Ok(out_path)
    }

    /// Read a mesh and return its center point, used as the rotation point
    pub async fn read_mesh(&self, file_path: impl AsRef<Path>) -> Result<Vec3> {
        let upload = read_mesh_upload("file", file_path.as_ref()).await?;
        let body = RequestBody::Multipart {
            files: vec![upload],
            fields: Vec::new(),
        };
        let value = self
            .send(Method::POST, "read-mesh", self.config.request_timeout(), &body)
            .await?;
        let MeshCenter { center } = decode_response(value, "read mesh")?;

        self.session.update(|state| state.mesh_center = Some(center));
        Ok(center)
    }

    /// Rotate cell centers into visualization space
    pub async fn get_voxel_centers(&self, request: &VoxelCentersRequest) -> Result<VoxelCenters> {
        request.validate()?;
        self.voxel_centers(request).await
    }

    /// Compute unit cell centers from cell type and size alone
    pub async fn calculate_voxel_centers(
        &self,
        request: &CalculateCentersRequest,
    ) -> Result<VoxelCenters> {
        request.validate()?;
        self.voxel_centers(request).await
    }

    async fn voxel_centers<T: Serialize>(&self, request: &T) -> Result<VoxelCenters> {
        let body = RequestBody::Json(to_json(request)?);
        let value = self
            .send(Method::POST, "voxel-centers", self.config.request_timeout(), &body)
            .await?;
        let centers: VoxelCenters = decode_response(value, "voxel centers")?;

        self.session
            .update(|state| state.voxel_centers = Some(centers.clone()));
        Ok(centers)
    }

    /// Generate lattice visualization shader source
    pub async fn generate_shader(&self, request: &ShaderRequest) -> Result<ShaderResult> {
        request.validate()?;
        let body = RequestBody::Json(to_json(request)?);
        let value = self
            .send(Method::POST, "generate-shader", self.config.request_timeout(), &body)
            .await?;
        decode_response(value, "shader")
    }

    /// Generate shader source and write it to `shader_path`
    pub async fn generate_shader_to_file(
        &self,
        request: &ShaderRequest,
        shader_path: impl AsRef<Path>,
    ) -> Result<PathBuf> {
        let result = self.generate_shader(request).await?;
        let path = shader_path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, result.shader.as_bytes()).await?;
        tracing::info!(
            "Wrote shader ({} lines) to {}",
            result.line_count(),
            path.display()
        );

        let path = path.to_path_buf();
        self.session
            .update(|state| state.shader_path = Some(path.clone()));
        Ok(path)
    }

    /// Get service health, rate limiting and state management status
    pub async fn get_status(&self) -> Result<ServiceStatus> {
        let value = self
            .send(Method::GET, "status", self.config.status_timeout(), &RequestBody::Empty)
            .await?;
        decode_response(value, "status")
    }

    /// Get the server-side processing state (stateful mode only)
    pub async fn get_state(&self) -> Result<StateSnapshot> {
        let value = self
            .send(Method::GET, "state", self.config.status_timeout(), &RequestBody::Empty)
            .await?;
        decode_response(value, "state")
    }

    /// Clear the server-side processing state (stateful mode only)
    pub async fn clear_state(&self) -> Result<ClearStateResponse> {
        let value = self
            .send(Method::DELETE, "state", self.config.status_timeout(), &RequestBody::Empty)
            .await?;
        decode_response(value, "clear state")
    }

    /// Snapshot of the results cached by this client and its clones
    pub fn session(&self) -> SessionState {
        self.session.snapshot()
    }

    /// Forget all locally cached results
    pub fn clear_session(&self) {
        self.session.clear();
    }

    /// Send a request, retrying transient failures with exponential backoff
    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        timeout: Duration,
        body: &RequestBody,
    ) -> Result<Value> {
        let url = self.config.endpoint_url(endpoint);
        let mut attempt = 0;

        loop {
            tracing::debug!("{} {} (attempt {})", method, url, attempt + 1);

            let result = match self
                .build_request(method.clone(), &url, body)?
                .timeout(timeout)
                .send()
                .await
            {
                Ok(response) => handle_response(response, timeout).await,
                Err(e) => Err(self.transport_error(e, timeout)),
            };

            match result {
                Err(err) if err.is_retryable() && attempt < self.config.max_retries() => {
                    let delay = self.calculate_backoff_delay(attempt);
                    tracing::warn!(
                        "{} {} failed: {}; retrying in {:?}",
                        method,
                        url,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    fn build_request(&self, method: Method, url: &str, body: &RequestBody) -> Result<RequestBuilder> {
        let builder = self.client.request(method, url);
        Ok(match body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart { files, fields } => {
                let mut form = Form::new();
                for upload in files {
                    let part = Part::bytes(upload.bytes.clone())
                        .file_name(upload.file_name.clone())
                        .mime_str("application/octet-stream")?;
                    form = form.part(upload.field, part);
                }
                for (name, value) in fields {
                    form = form.text(name.clone(), value.clone());
                }
                builder.multipart(form)
            }
        })
    }

    fn transport_error(&self, e: reqwest::Error, timeout: Duration) -> VixivError {
        if e.is_timeout() {
            VixivError::TimeoutError(timeout.as_secs())
        } else if e.is_connect() {
            VixivError::ConnectionError(format!(
                "Failed to connect to {}: {}",
                self.config.base_url(),
                e
            ))
        } else {
            VixivError::RequestFailed(e)
        }
    }

    /// Calculate exponential backoff delay for retry attempts
    fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .config
            .base_delay_ms()
            .saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(delay_ms.min(MAX_BACKOFF_MS))
    }
}

async fn read_mesh_upload(field: &'static str, path: &Path) -> Result<MeshUpload> {
    validate_mesh_path(path)?;
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("mesh.stl")
        .to_string();
    Ok(MeshUpload {
        field,
        file_name,
        bytes,
    })
}

async fn handle_response(response: Response, timeout: Duration) -> Result<Value> {
    let status = response.status();

    if status.is_success() {
        let text = response
            .text()
            .await
            .map_err(|e| body_error(e, timeout))?;
        return parse_body(&text);
    }

    let error_text = match response.text().await {
        Ok(text) => text,
        Err(e) if e.is_timeout() => return Err(VixivError::TimeoutError(timeout.as_secs())),
        Err(_) => "Unknown error".to_string(),
    };
    let message = error_message(&error_text);

    match status.as_u16() {
        401 => Err(VixivError::InvalidApiKey),
        429 => Err(VixivError::RateLimited),
        code if code >= 500 => Err(VixivError::ServerError {
            status: code,
            message,
        }),
        code => Err(VixivError::Validation {
            status: code,
            message,
        }),
    }
}

/// The request deadline also covers reading the body
fn body_error(e: reqwest::Error, timeout: Duration) -> VixivError {
    if e.is_timeout() {
        VixivError::TimeoutError(timeout.as_secs())
    } else {
        VixivError::RequestFailed(e)
    }
}

/// Parse a success body, turning `{"success": false}` envelopes into errors
fn parse_body(text: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| VixivError::ParseError(format!("Response is not valid JSON: {}", e)))?;

    if value.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(VixivError::Api(envelope_message(&value)));
    }
    Ok(value)
}

fn envelope_message(value: &Value) -> String {
    ["error", "message", "detail"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| "Request was not successful".to_string())
}

/// Best-effort message from an error body, which may or may not be JSON
fn error_message(text: &str) -> String {
    match serde_json::from_str::<Value>(text) {
        Ok(value) if value.is_object() => envelope_message(&value),
        _ if text.trim().is_empty() => "No error details".to_string(),
        _ => text.trim().to_string(),
    }
}

/// Deserialize a response, unwrapping a `result` object when present
fn decode_response<T: DeserializeOwned>(value: Value, what: &str) -> Result<T> {
    let value = match value {
        Value::Object(mut map) if map.get("result").is_some_and(Value::is_object) => {
            map.remove("result").unwrap_or(Value::Null)
        }
        other => other,
    };
    serde_json::from_value(value)
        .map_err(|e| VixivError::ParseError(format!("Failed to parse {} response: {}", what, e)))
}

fn to_json<T: Serialize>(request: &T) -> Result<Value> {
    serde_json::to_value(request)
        .map_err(|e| VixivError::InvalidRequest(format!("Failed to encode request: {}", e)))
}
