//! Local session cache of the most recent results
//!
//! Each client call that produces something reusable records it here so a
//! caller can chain steps without threading every value by hand. The cache
//! lives only in memory and is shared between clones of a client.

use crate::types::{MeshVoxels, VoxelCenters};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

/// Most recent results produced through a client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub mesh_voxels: Option<MeshVoxels>,
    pub network_path: Option<PathBuf>,
    pub integrated_path: Option<PathBuf>,
    pub mesh_center: Option<Vec3>,
    pub voxel_centers: Option<VoxelCenters>,
    pub shader_path: Option<PathBuf>,
}

impl SessionState {
    pub fn is_empty(&self) -> bool {
        *self == SessionState::default()
    }
}

/// Shared handle to a [`SessionState`]
#[derive(Debug, Clone, Default)]
pub(crate) struct SessionCache {
    inner: Arc<Mutex<SessionState>>,
}

impl SessionCache {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // Poisoning is ignored, the state is plain data
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> SessionState {
        self.lock().clone()
    }

    pub fn clear(&self) {
        *self.lock() = SessionState::default();
    }

    pub fn update(&self, f: impl FnOnce(&mut SessionState)) {
        f(&mut *self.lock());
    }
}
