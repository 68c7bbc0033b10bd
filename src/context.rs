use crate::aggregate::{LinkContext, extract_type_data};
use crate::artifacts::mesh::Mesh;
use crate::config::BuildConfig;
use crate::error::BuildError;
use crate::links::NeuprintLinks;
use crate::loading::SourceData;
use crate::loading::neuprint::NeuprintClient;
use crate::scene::SceneSet;
use crate::summary::TypeData;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// A best-effort artifact that could not be produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFailure {
    pub artifact: &'static str,
    pub type_file: String,
    pub category: &'static str,
    pub message: String,
}

/// Per-build state shared by every stage after loading.
///
/// Replaces module-level caches: the extracted type lists, the brain mesh
/// used as thumbnail backdrop and the neuroglancer base scenes all live here
/// and are dropped with the context.
pub struct BuildContext {
    config: Arc<BuildConfig>,
    source: SourceData,
    scenes: Option<SceneSet>,
    links: LinkContext,
    type_data: OnceCell<Arc<TypeData>>,
    /// Backdrop mesh, fetched on first use. `None` inside means unavailable.
    brain_mesh: tokio::sync::OnceCell<Option<Arc<Mesh>>>,
    /// FlyWire root ID to type, built on first use.
    fw_types: OnceCell<HashMap<u64, String>>,
    failures: Mutex<Vec<ArtifactFailure>>,
    extractions: AtomicU64,
}

impl BuildContext {
    pub fn new(config: Arc<BuildConfig>, source: SourceData, scenes: Option<SceneSet>) -> Self {
        let endpoints = &config.endpoints;
        let links = LinkContext {
            neuprint: NeuprintLinks::new(&endpoints.neuprint_server, &endpoints.neuprint_dataset),
            scenes: scenes.clone(),
        };
        Self {
            config,
            source,
            scenes,
            links,
            type_data: OnceCell::new(),
            brain_mesh: tokio::sync::OnceCell::new(),
            fw_types: OnceCell::new(),
            failures: Mutex::new(Vec::new()),
            extractions: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn source(&self) -> &SourceData {
        &self.source
    }

    pub fn scenes(&self) -> Option<&SceneSet> {
        self.scenes.as_ref()
    }

    /// The four class lists, extracted once per context.
    pub fn type_data(&self) -> Arc<TypeData> {
        self.type_data
            .get_or_init(|| {
                self.extractions.fetch_add(1, Ordering::Relaxed);
                Arc::new(extract_type_data(
                    &self.source.mcns,
                    &self.source.fw,
                    &self.source.rois,
                    &self.links,
                ))
            })
            .clone()
    }

    /// How many times extraction actually ran.
    pub fn extraction_count(&self) -> u64 {
        self.extractions.load(Ordering::Relaxed)
    }

    pub fn fw_types(&self) -> &HashMap<u64, String> {
        self.fw_types.get_or_init(|| {
            self.source
                .fw
                .rows()
                .iter()
                .filter_map(|row| {
                    let id = crate::frame::u64_col(row, "root_id")?;
                    let ty = crate::frame::str_col(row, "type")?;
                    Some((id, ty.to_string()))
                })
                .collect()
        })
    }

    pub fn neuprint(&self) -> Result<NeuprintClient, BuildError> {
        let endpoints = &self.config.endpoints;
        NeuprintClient::new(
            &endpoints.neuprint_server,
            &endpoints.neuprint_dataset,
            endpoints.neuprint_token.clone(),
        )
    }

    /// Fetch the backdrop mesh at most once; later calls reuse the result.
    pub async fn brain_mesh<F, Fut>(&self, fetch: F) -> Option<Arc<Mesh>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Mesh, BuildError>>,
    {
        self.brain_mesh
            .get_or_init(|| async move {
                match fetch().await {
                    Ok(mesh) => {
                        debug!(vertices = mesh.vertices.len(), "brain mesh ready");
                        Some(Arc::new(mesh))
                    }
                    Err(error) => {
                        warn!(%error, "brain mesh unavailable, thumbnails render without backdrop");
                        None
                    }
                }
            })
            .await
            .clone()
    }

    pub fn record_failure(&self, artifact: &'static str, type_file: &str, error: &BuildError) {
        if error.is_fatal() {
            warn!(
                artifact,
                type_file,
                category = error.category(),
                %error,
                "artifact generation failed"
            );
        } else {
            debug!(artifact, type_file, %error, "artifact skipped");
        }
        self.failures.lock().push(ArtifactFailure {
            artifact,
            type_file: type_file.to_string(),
            category: error.category(),
            message: error.to_string(),
        });
    }

    pub fn failures(&self) -> Vec<ArtifactFailure> {
        self.failures.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use serde_json::json;

    fn context() -> BuildContext {
        let mcns: Frame = [json!({"bodyId": 1, "type": "A", "mapping": "A"})]
            .iter()
            .map(|v| v.as_object().cloned().expect("object"))
            .collect();
        let fw: Frame = [json!({"root_id": 9, "type": "A", "mapping": "A"})]
            .iter()
            .map(|v| v.as_object().cloned().expect("object"))
            .collect();
        let source = SourceData {
            mcns,
            fw,
            ..SourceData::default()
        };
        BuildContext::new(Arc::new(BuildConfig::default()), source, None)
    }

    #[test]
    fn type_data_is_extracted_once() {
        let ctx = context();
        let first = ctx.type_data();
        let second = ctx.type_data();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(ctx.extraction_count(), 1);
        assert_eq!(first.isomorphic.len(), 1);
    }

    #[test]
    fn failures_are_collected() {
        let ctx = context();
        let err = BuildError::Mesh {
            id: 1,
            message: "empty".into(),
        };
        ctx.record_failure("thumbnail", "A", &err);
        let failures = ctx.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].category, "artifact");
    }

    #[tokio::test]
    async fn brain_mesh_is_fetched_once() {
        let ctx = context();
        let calls = AtomicU64::new(0);
        for _ in 0..2 {
            let mesh = ctx
                .brain_mesh(|| async {
                    calls.fetch_add(1, Ordering::Relaxed);
                    Ok(Mesh::default())
                })
                .await;
            assert!(mesh.is_some());
        }
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn fw_types_index_root_ids() {
        let ctx = context();
        assert_eq!(ctx.fw_types().get(&9).map(String::as_str), Some("A"));
    }
}
