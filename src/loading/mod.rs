//! Fetch-or-cache loaders for every upstream dataset.
//!
//! A cache file that exists is used as is unless a refresh is forced. Any
//! failure here aborts the build.

pub mod edges;
pub mod flywire;
pub mod http;
pub mod mapping;
pub mod neuprint;

use crate::config::BuildConfig;
use crate::error::{BuildError, BuildResult};
use crate::frame::{Frame, read_frame, u64_col, write_frame};
use crate::rois::RoiHierarchy;
use crate::{log_cache_operation, log_slow_operation};
use edges::FwEdge;
use flywire::AnnotationClient;
use mapping::{Mapping, parse_upstream_mapping, to_cache};
use neuprint::NeuprintClient;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

pub const MCNS_META_CACHE: &str = "mcns_meta_data.feather";
pub const FW_META_CACHE: &str = "fw_meta_data.feather";
pub const ROI_INFO_CACHE: &str = "roi_info.feather";
pub const MAPPING_CACHE: &str = "mapping.json";

const SLOW_FETCH_MS: u64 = 30_000;

/// Everything the build needs from upstream, already prepared for joining.
#[derive(Debug, Clone, Default)]
pub struct SourceData {
    pub mcns: Frame,
    pub fw: Frame,
    pub mapping: Mapping,
    pub fw_edges: Vec<FwEdge>,
    pub rois: RoiHierarchy,
}

pub struct Loader<'a> {
    config: &'a BuildConfig,
    force: bool,
}

impl<'a> Loader<'a> {
    pub fn new(config: &'a BuildConfig) -> Self {
        Self {
            config,
            force: config.update_metadata,
        }
    }

    fn cache_path(&self, name: &str) -> PathBuf {
        self.config.cache_dir.join(name)
    }

    fn use_cache(&self, path: &Path) -> bool {
        !self.force && path.exists()
    }

    fn neuprint(&self) -> BuildResult<NeuprintClient> {
        let endpoints = &self.config.endpoints;
        NeuprintClient::new(
            &endpoints.neuprint_server,
            &endpoints.neuprint_dataset,
            endpoints.neuprint_token.clone(),
        )
    }

    pub async fn load_all(&self) -> BuildResult<SourceData> {
        fs::create_dir_all(&self.config.cache_dir)
            .map_err(|e| BuildError::io(&self.config.cache_dir, e))?;
        let mut data = SourceData {
            mcns: self.load_mcns_meta().await?,
            fw: self.load_fw_meta().await?,
            mapping: self.load_mapping().await?,
            fw_edges: self.load_fw_edges().await?,
            rois: self.load_roi_info().await?,
        };
        prepare(&mut data);
        Ok(data)
    }

    pub async fn load_mcns_meta(&self) -> BuildResult<Frame> {
        let path = self.cache_path(MCNS_META_CACHE);
        if self.use_cache(&path) {
            let frame = read_frame(&path)?;
            log_cache_operation!(hit, MCNS_META_CACHE, rows = frame.len(), "loaded MCNS meta data from cache; use --update-metadata to refresh");
            return Ok(frame);
        }
        log_cache_operation!(miss, MCNS_META_CACHE, "loading MCNS meta data from neuPrint");
        let started = Instant::now();
        let frame = self.neuprint()?.fetch_neurons("Traced").await?;
        log_slow_operation!(started.elapsed(), SLOW_FETCH_MS, rows = frame.len(), "fetched MCNS meta data");
        write_frame(&path, &frame)?;
        info!(neurons = frame.len(), "found MCNS neurons");
        Ok(frame)
    }

    pub async fn load_fw_meta(&self) -> BuildResult<Frame> {
        let path = self.cache_path(FW_META_CACHE);
        if self.use_cache(&path) {
            let frame = read_frame(&path)?;
            log_cache_operation!(hit, FW_META_CACHE, rows = frame.len(), "loaded FlyWire meta data from cache; use --update-metadata to refresh");
            return Ok(frame);
        }
        let endpoints = &self.config.endpoints;
        let url = endpoints.flywire_annotations_url.as_deref().ok_or_else(|| {
            BuildError::Config(
                "flywire_annotations_url must be configured when the FlyWire cache is missing"
                    .to_string(),
            )
        })?;
        log_cache_operation!(miss, FW_META_CACHE, url = %url, "loading FlyWire annotations");
        let started = Instant::now();
        let frame = AnnotationClient::new(url, endpoints.flywire_token.clone())?
            .fetch_annotations()
            .await?;
        log_slow_operation!(started.elapsed(), SLOW_FETCH_MS, rows = frame.len(), "fetched FlyWire annotations");
        write_frame(&path, &frame)?;
        info!(neurons = frame.len(), "found FlyWire neurons");
        Ok(frame)
    }

    pub async fn load_mapping(&self) -> BuildResult<Mapping> {
        let path = self.cache_path(MAPPING_CACHE);
        if self.use_cache(&path) {
            let text = fs::read_to_string(&path).map_err(|source| BuildError::Cache {
                path: path.clone(),
                source,
            })?;
            let cached: BTreeMap<u64, String> = serde_json::from_str(&text)
                .map_err(|e| BuildError::decode(MAPPING_CACHE, e))?;
            log_cache_operation!(hit, MAPPING_CACHE, entries = cached.len(), "loaded cross-dataset mapping from cache");
            return Ok(cached.into_iter().collect());
        }
        let url = &self.config.endpoints.mapping_url;
        log_cache_operation!(miss, MAPPING_CACHE, url = %url, "loading cross-dataset mapping");
        let client = http::build_client()?;
        let raw: BTreeMap<String, Value> = http::get_json(&client, url).await?;
        let mapping = parse_upstream_mapping(raw)?;
        let text = serde_json::to_string(&to_cache(&mapping))
            .map_err(|e| BuildError::decode(MAPPING_CACHE, e))?;
        fs::write(&path, text).map_err(|source| BuildError::Cache {
            path: path.clone(),
            source,
        })?;
        Ok(mapping)
    }

    pub async fn load_fw_edges(&self) -> BuildResult<Vec<FwEdge>> {
        let url = &self.config.endpoints.fw_edges_url;
        let file_name = url
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("fw_edges.feather");
        let path = self.cache_path(file_name);
        let bytes = if self.use_cache(&path) {
            let bytes = fs::read(&path).map_err(|source| BuildError::Cache {
                path: path.clone(),
                source,
            })?;
            log_cache_operation!(hit, file_name, bytes = bytes.len(), "loaded FlyWire edges from cache");
            bytes
        } else {
            log_cache_operation!(miss, file_name, url = %url, "loading FlyWire edges");
            let client = http::build_client()?;
            let bytes = http::get_bytes(&client, url).await?;
            fs::write(&path, &bytes).map_err(|source| BuildError::Cache {
                path: path.clone(),
                source,
            })?;
            bytes
        };
        let edges = edges::decode_feather(&bytes)?;
        info!(edges = edges.len(), "FlyWire edge list ready");
        Ok(edges)
    }

    pub async fn load_roi_info(&self) -> BuildResult<RoiHierarchy> {
        let path = self.cache_path(ROI_INFO_CACHE);
        if self.use_cache(&path) {
            let hierarchy = RoiHierarchy::from_frame(&read_frame(&path)?)?;
            log_cache_operation!(hit, ROI_INFO_CACHE, rois = hierarchy.len(), "loaded ROI info from cache");
            return Ok(hierarchy);
        }
        log_cache_operation!(miss, ROI_INFO_CACHE, "loading ROI hierarchy from neuPrint");
        let hierarchy = self.neuprint()?.fetch_roi_hierarchy().await?;
        write_frame(&path, &hierarchy.to_frame())?;
        Ok(hierarchy)
    }
}

/// Fill the `type` columns and attach the cross-dataset `mapping` key.
pub fn prepare(data: &mut SourceData) {
    data.mcns
        .coalesce_into("type", &["type", "flywireType"], Some("unknown"));
    data.fw.coalesce_into(
        "type",
        &["cell_type", "hemibrain_type", "malecns_type"],
        None,
    );
    attach_mapping(&mut data.mcns, "bodyId", &data.mapping);
    attach_mapping(&mut data.fw, "root_id", &data.mapping);
}

fn attach_mapping(frame: &mut Frame, id_column: &str, mapping: &Mapping) {
    for row in frame.rows_mut() {
        let key = u64_col(row, id_column)
            .and_then(|id| mapping.get(&id))
            .map(|m| Value::String(m.clone()))
            .unwrap_or(Value::Null);
        row.insert("mapping".to_string(), key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(rows: Value) -> Frame {
        rows.as_array()
            .expect("array")
            .iter()
            .map(|r| r.as_object().cloned().expect("object"))
            .collect()
    }

    #[test]
    fn prepare_fills_types_and_mapping() {
        let mut data = SourceData {
            mcns: frame(json!([
                {"bodyId": 1, "type": null, "flywireType": "FW1"},
                {"bodyId": 2, "type": null},
                {"bodyId": 3, "type": "T3"}
            ])),
            fw: frame(json!([
                {"root_id": 10, "cell_type": null, "hemibrain_type": "HB", "malecns_type": "M"},
                {"root_id": 11}
            ])),
            mapping: [(1, "FW1".to_string()), (10, "FW1".to_string())].into(),
            ..SourceData::default()
        };
        prepare(&mut data);

        let mcns = data.mcns.rows();
        assert_eq!(mcns[0]["type"], json!("FW1"));
        assert_eq!(mcns[1]["type"], json!("unknown"));
        assert_eq!(mcns[2]["type"], json!("T3"));
        assert_eq!(mcns[0]["mapping"], json!("FW1"));
        assert_eq!(mcns[2]["mapping"], Value::Null);

        let fw = data.fw.rows();
        assert_eq!(fw[0]["type"], json!("HB"));
        assert_eq!(fw[1]["type"], Value::Null);
        assert_eq!(fw[0]["mapping"], json!("FW1"));
    }
}
