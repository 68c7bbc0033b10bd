//! Triangle meshes in neuroglancer's legacy single-resolution format.
//!
//! Layout, little endian: `u32` vertex count, `3 * n` `f32` coordinates,
//! then `u32` vertex indices, three per triangle, to the end of the buffer.

use crate::error::{BuildError, BuildResult};
use crate::loading::http;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use tracing::{debug, warn};

/// Concurrent mesh downloads per thumbnail.
pub const MESH_FETCH_CONCURRENCY: usize = 10;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<[f32; 3]>,
    pub triangles: Vec<[u32; 3]>,
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Bounds {
    pub fn union(self, other: Bounds) -> Bounds {
        let mut out = self;
        for axis in 0..3 {
            out.min[axis] = out.min[axis].min(other.min[axis]);
            out.max[axis] = out.max[axis].max(other.max[axis]);
        }
        out
    }

    pub fn extent(&self, axis: usize) -> f32 {
        self.max[axis] - self.min[axis]
    }
}

impl Mesh {
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        let first = *self.vertices.first()?;
        let start = Bounds { min: first, max: first };
        Some(self.vertices.iter().fold(start, |b, v| b.union(Bounds { min: *v, max: *v })))
    }

    pub fn decode(id: u64, bytes: &[u8]) -> BuildResult<Mesh> {
        let err = |message: String| BuildError::Mesh { id, message };
        let header: [u8; 4] = bytes
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| err(format!("buffer of {} bytes has no header", bytes.len())))?;
        let n_vertices = u32::from_le_bytes(header) as usize;
        let vertex_end = n_vertices
            .checked_mul(12)
            .and_then(|n| n.checked_add(4))
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| err(format!("{n_vertices} vertices do not fit in {} bytes", bytes.len())))?;

        let vertices = bytes[4..vertex_end]
            .chunks_exact(12)
            .map(|chunk| {
                let f = |i: usize| f32::from_le_bytes([chunk[i], chunk[i + 1], chunk[i + 2], chunk[i + 3]]);
                [f(0), f(4), f(8)]
            })
            .collect();

        let index_bytes = &bytes[vertex_end..];
        if index_bytes.len() % 12 != 0 {
            return Err(err(format!(
                "index section of {} bytes is not a whole number of triangles",
                index_bytes.len()
            )));
        }
        let mut triangles = Vec::with_capacity(index_bytes.len() / 12);
        for chunk in index_bytes.chunks_exact(12) {
            let i = |o: usize| u32::from_le_bytes([chunk[o], chunk[o + 1], chunk[o + 2], chunk[o + 3]]);
            let tri = [i(0), i(4), i(8)];
            if tri.iter().any(|&v| v as usize >= n_vertices) {
                return Err(err(format!("triangle {tri:?} indexes past {n_vertices} vertices")));
            }
            triangles.push(tri);
        }
        Ok(Mesh { vertices, triangles })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.vertices.len() * 12 + self.triangles.len() * 12);
        out.extend_from_slice(&(self.vertices.len() as u32).to_le_bytes());
        for v in &self.vertices {
            for c in v {
                out.extend_from_slice(&c.to_le_bytes());
            }
        }
        for t in &self.triangles {
            for i in t {
                out.extend_from_slice(&i.to_le_bytes());
            }
        }
        out
    }
}

pub fn mesh_url(template: &str, id: u64) -> String {
    template.replace("{id}", &id.to_string())
}

pub async fn fetch_mesh(client: &Client, template: &str, id: u64) -> BuildResult<Mesh> {
    let url = mesh_url(template, id);
    let bytes = http::get_bytes(client, &url).await?;
    Mesh::decode(id, &bytes)
}

/// Download meshes for `ids` with bounded concurrency. Individual failures
/// are logged and left out.
pub async fn fetch_meshes(client: &Client, template: &str, ids: &[u64]) -> Vec<Mesh> {
    let results: Vec<(u64, BuildResult<Mesh>)> = stream::iter(ids.iter().copied())
        .map(|id| async move { (id, fetch_mesh(client, template, id).await) })
        .buffer_unordered(MESH_FETCH_CONCURRENCY)
        .collect()
        .await;

    let mut meshes = Vec::with_capacity(results.len());
    for (id, result) in results {
        match result {
            Ok(mesh) if !mesh.is_empty() => meshes.push(mesh),
            Ok(_) => debug!(id, "skipping empty mesh"),
            Err(error) => warn!(id, %error, "failed to fetch mesh"),
        }
    }
    meshes
}
