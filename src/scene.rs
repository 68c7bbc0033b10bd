//! Neuroglancer scenes for the 3D links on every page.
//!
//! Three base scenes (brain, VNC, whole CNS) are loaded once per build. Layer
//! 1 holds MCNS segments and layer 2 FlyWire segments.

use crate::config::Endpoints;
use crate::error::{BuildError, BuildResult};
use crate::loading::http;
use reqwest::{Client, Url};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::info;

pub const MCNS_LAYER: usize = 1;
pub const FLYWIRE_LAYER: usize = 2;
pub const MCNS_COLOR: &str = "#00e9e7";
pub const FLYWIRE_COLOR: &str = "#e511d0";
pub const VNC_SHELL_LAYER: &str = "vnc-neuropil-shell";
pub const MCNS_LAYER_NAME: &str = "maleCNS";

#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    viewer_url: String,
    state: Value,
}

impl Scene {
    pub fn new(viewer_url: &str, state: Value) -> Self {
        Self {
            viewer_url: viewer_url.to_string(),
            state,
        }
    }

    pub fn state(&self) -> &Value {
        &self.state
    }

    fn layers_mut(&mut self) -> Option<&mut Vec<Value>> {
        self.state.get_mut("layers").and_then(Value::as_array_mut)
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut Map<String, Value>> {
        self.layers_mut()?.get_mut(index)?.as_object_mut()
    }

    pub fn layer_by_name_mut(&mut self, name: &str) -> Option<&mut Map<String, Value>> {
        self.layers_mut()?
            .iter_mut()
            .filter_map(Value::as_object_mut)
            .find(|layer| layer.get("name").and_then(Value::as_str) == Some(name))
    }

    pub fn layer_by_name(&self, name: &str) -> Option<&Map<String, Value>> {
        self.state
            .get("layers")?
            .as_array()?
            .iter()
            .filter_map(Value::as_object)
            .find(|layer| layer.get("name").and_then(Value::as_str) == Some(name))
    }

    /// Segment IDs are strings in neuroglancer state.
    pub fn set_segments(&mut self, index: usize, ids: &[u64]) {
        if let Some(layer) = self.layer_mut(index) {
            let segments = ids.iter().map(|id| Value::String(id.to_string())).collect();
            layer.insert("segments".to_string(), Value::Array(segments));
        }
    }

    pub fn set_color(&mut self, index: usize, color: &str) {
        if let Some(layer) = self.layer_mut(index) {
            layer.insert(
                "segmentDefaultColor".to_string(),
                Value::String(color.to_string()),
            );
        }
    }

    pub fn hide_layer(&mut self, name: &str) {
        if let Some(layer) = self.layer_by_name_mut(name) {
            layer.insert("visible".to_string(), Value::Bool(false));
        }
    }

    /// Source URL of a named layer; the source may be a string or `{"url"}`.
    pub fn layer_source(&self, name: &str) -> Option<String> {
        match self.layer_by_name(name)?.get("source")? {
            Value::String(s) => Some(s.clone()),
            Value::Object(obj) => obj.get("url").and_then(Value::as_str).map(str::to_string),
            _ => None,
        }
    }

    pub fn to_url(&self) -> BuildResult<String> {
        let mut url = Url::parse(&self.viewer_url)
            .map_err(|e| BuildError::Config(format!("viewer url {}: {e}", self.viewer_url)))?;
        let state = serde_json::to_string(&self.state)
            .map_err(|e| BuildError::decode("neuroglancer scene", e))?;
        url.set_fragment(Some(&format!("!{state}")));
        Ok(url.into())
    }
}

/// The DVID server and node behind the MCNS segmentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DvidSource {
    pub server: String,
    pub node: String,
}

impl DvidSource {
    /// Parses `dvid://https://{host}/{node}/...`.
    pub fn from_layer_source(source: &str) -> Option<Self> {
        let rest = source.strip_prefix("dvid://")?;
        let (scheme, rest) = rest.split_once("://")?;
        let mut parts = rest.split('/');
        let host = parts.next().filter(|h| !h.is_empty())?;
        let node = parts.next().filter(|n| !n.is_empty())?;
        Some(Self {
            server: format!("{scheme}://{host}"),
            node: node.to_string(),
        })
    }

    pub fn mesh_url_template(&self) -> String {
        format!(
            "{}/api/node/{}/segmentation_meshes/key/{{id}}.ngmesh",
            self.server, self.node
        )
    }
}

/// Which neurons a summary spans, derived from superclass labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceneCoverage {
    pub ascending: bool,
    pub descending: bool,
    pub central: bool,
    pub vnc: bool,
}

impl SceneCoverage {
    pub fn from_superclasses<'a>(superclasses: impl IntoIterator<Item = &'a str>) -> Self {
        let mut coverage = SceneCoverage::default();
        for sc in superclasses {
            match sc {
                "ascending_neuron" | "ascending" => coverage.ascending = true,
                "descending_neuron" | "descending" => coverage.descending = true,
                "cb_intrinsic" | "central" | "ol_intrinsic" | "optic" | "visual_projection"
                | "visual_centrifugal" => coverage.central = true,
                "vnc_intrinsic" => coverage.vnc = true,
                _ => {}
            }
        }
        coverage
    }

    pub fn touches_vnc(&self) -> bool {
        self.ascending || self.descending || self.vnc
    }
}

#[derive(Debug, Clone)]
pub struct SceneSet {
    pub brain: Scene,
    pub vnc: Scene,
    pub cns: Scene,
}

impl SceneSet {
    pub fn pick(&self, coverage: SceneCoverage) -> Scene {
        let mut scene = if coverage.ascending || coverage.descending {
            self.cns.clone()
        } else if coverage.central && coverage.vnc {
            self.cns.clone()
        } else if coverage.central {
            self.brain.clone()
        } else {
            self.vnc.clone()
        };
        if !coverage.touches_vnc() {
            scene.hide_layer(VNC_SHELL_LAYER);
        }
        scene.set_color(MCNS_LAYER, MCNS_COLOR);
        scene.set_color(FLYWIRE_LAYER, FLYWIRE_COLOR);
        scene
    }

    /// Scene URL with the given segments filled in.
    pub fn url_for(
        &self,
        coverage: SceneCoverage,
        body_ids: &[u64],
        root_ids: &[u64],
    ) -> BuildResult<String> {
        let mut scene = self.pick(coverage);
        if !body_ids.is_empty() {
            scene.set_segments(MCNS_LAYER, body_ids);
        }
        if !root_ids.is_empty() {
            scene.set_segments(FLYWIRE_LAYER, root_ids);
        }
        scene.to_url()
    }

    pub fn dvid_source(&self) -> Option<DvidSource> {
        self.brain
            .layer_source(MCNS_LAYER_NAME)
            .and_then(|source| DvidSource::from_layer_source(&source))
    }

    /// Fetch the three base scenes, caching each state file in `cache_dir`.
    pub async fn load(endpoints: &Endpoints, cache_dir: &Path, force: bool) -> BuildResult<Self> {
        let client = http::build_client()?;
        let viewer = endpoints.viewer_url.as_str();
        let brain = load_state(&client, &endpoints.scene_brain_url, &cache_dir.join("scene_brain.json"), force).await?;
        let vnc = load_state(&client, &endpoints.scene_vnc_url, &cache_dir.join("scene_vnc.json"), force).await?;
        let cns = load_state(&client, &endpoints.scene_cns_url, &cache_dir.join("scene_cns.json"), force).await?;
        Ok(Self {
            brain: Scene::new(viewer, brain),
            vnc: Scene::new(viewer, vnc),
            cns: Scene::new(viewer, cns),
        })
    }
}

async fn load_state(client: &Client, url: &str, path: &Path, force: bool) -> BuildResult<Value> {
    if !force && path.exists() {
        let text = fs::read_to_string(path).map_err(|source| BuildError::Cache {
            path: path.to_path_buf(),
            source,
        })?;
        return serde_json::from_str(&text).map_err(|e| BuildError::decode("scene cache", e));
    }
    info!(url = %url, "fetching neuroglancer base scene");
    let state: Value = http::get_json(client, url).await?;
    let text =
        serde_json::to_string_pretty(&state).map_err(|e| BuildError::decode("scene", e))?;
    fs::write(path, text).map_err(|source| BuildError::Cache {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(state)
}
