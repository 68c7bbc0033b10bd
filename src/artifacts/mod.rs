//! Best-effort per-type artifacts: connectivity graphs, connection tables
//! and thumbnails.
//!
//! Nothing in here aborts the build. Failures are recorded on the
//! [`BuildContext`] and the page renders without the missing artifact.

pub mod graph;
pub mod mesh;
pub mod table;
pub mod thumbnail;

use crate::config::SkipFlags;
use crate::connectivity::{Connectivity, fw_connectivity, mcns_connectivity};
use crate::context::BuildContext;
use crate::error::{BuildError, BuildResult};
use crate::loading::http;
use crate::log_slow_operation;
use crate::render::Renderer;
use crate::scene::{FLYWIRE_COLOR, MCNS_COLOR, SceneSet};
use crate::summary::TypeSummary;
use mesh::{Mesh, fetch_meshes};
use reqwest::Client;
use std::time::Instant;
use thumbnail::{MeshLayer, THUMBNAIL_HEIGHT, THUMBNAIL_WIDTH, parse_hex_color};
use tracing::{debug, info};

const SLOW_THUMBNAIL_MS: u64 = 20_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    Mcns,
    FlyWire,
}

impl Dataset {
    pub fn suffix(&self) -> &'static str {
        match self {
            Dataset::Mcns => "mcns",
            Dataset::FlyWire => "fw",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Dataset::Mcns => "MCNS",
            Dataset::FlyWire => "FlyWire",
        }
    }

    /// Node colour in connectivity graphs.
    pub fn node_color(&self) -> &'static str {
        match self {
            Dataset::Mcns => "#00ffff",
            Dataset::FlyWire => "#ff00ff",
        }
    }
}

/// Which artifacts to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactPlan {
    pub graphs: bool,
    pub tables: bool,
    pub thumbnails: bool,
}

impl ArtifactPlan {
    pub fn from_skip(skip: &SkipFlags) -> Self {
        Self {
            graphs: !skip.graphs,
            tables: !skip.tables,
            thumbnails: !skip.thumbnails,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.graphs || self.tables || self.thumbnails)
    }
}

/// Link relative to the build root.
pub fn artifact_link(dir: &str, type_file: &str, dataset: Option<Dataset>, ext: &str) -> String {
    match dataset {
        Some(dataset) => format!("{dir}/{type_file}_{}.{ext}", dataset.suffix()),
        None => format!("{dir}/{type_file}.{ext}"),
    }
}

/// Produce the planned artifacts for `records` and fill in their links.
pub async fn enrich(
    ctx: &BuildContext,
    renderer: &Renderer,
    records: Vec<&mut TypeSummary>,
    plan: ArtifactPlan,
) -> BuildResult<()> {
    if plan.is_empty() || records.is_empty() {
        return Ok(());
    }
    let client = http::build_client()?;
    let neuprint = ctx.neuprint()?;
    info!(types = records.len(), ?plan, "generating artifacts");

    for record in records {
        if plan.graphs || plan.tables {
            if !record.body_ids.is_empty() {
                match mcns_connectivity(&neuprint, &record.body_ids).await {
                    Ok(conn) => write_connectivity(ctx, renderer, record, &conn, Dataset::Mcns, plan),
                    Err(error) => ctx.record_failure("connectivity", &record.type_file, &error),
                }
            }
            if !record.root_ids.is_empty() {
                let source = ctx.source();
                let conn = fw_connectivity(&source.fw_edges, ctx.fw_types(), &record.root_ids);
                write_connectivity(ctx, renderer, record, &conn, Dataset::FlyWire, plan);
            }
        }

        if plan.thumbnails {
            let link = artifact_link("thumbnails", &record.type_file, None, "png");
            let path = ctx.config().build_dir.join(&link);
            if path.exists() {
                debug!(type_file = %record.type_file, "thumbnail exists, skipping");
                record.artifacts.thumbnail = Some(link);
                continue;
            }
            let started = Instant::now();
            match make_thumbnail(ctx, &client, record, &path).await {
                Ok(()) => record.artifacts.thumbnail = Some(link),
                Err(error) => ctx.record_failure("thumbnail", &record.type_file, &error),
            }
            log_slow_operation!(started.elapsed(), SLOW_THUMBNAIL_MS, type_file = %record.type_file, "rendered thumbnail");
        }
    }
    Ok(())
}

fn write_connectivity(
    ctx: &BuildContext,
    renderer: &Renderer,
    record: &mut TypeSummary,
    conn: &Connectivity,
    dataset: Dataset,
    plan: ArtifactPlan,
) {
    if conn.is_empty() {
        debug!(type_file = %record.type_file, dataset = dataset.label(), "no labelled partners");
        return;
    }
    let build_dir = &ctx.config().build_dir;
    if plan.graphs {
        let link = artifact_link("graphs", &record.type_file, Some(dataset), "html");
        match graph::write_graph(renderer, conn, &record.label, dataset, &build_dir.join(&link)) {
            Ok(()) => match dataset {
                Dataset::Mcns => record.artifacts.graph_mcns = Some(link),
                Dataset::FlyWire => record.artifacts.graph_fw = Some(link),
            },
            Err(error) => ctx.record_failure("graph", &record.type_file, &error),
        }
    }
    if plan.tables {
        let link = artifact_link("tables", &record.type_file, Some(dataset), "html");
        match table::write_table(renderer, conn, &record.label, dataset, &build_dir.join(&link)) {
            Ok(()) => match dataset {
                Dataset::Mcns => record.artifacts.table_mcns = Some(link),
                Dataset::FlyWire => record.artifacts.table_fw = Some(link),
            },
            Err(error) => ctx.record_failure("table", &record.type_file, &error),
        }
    }
}

fn mcns_mesh_template(ctx: &BuildContext) -> Option<String> {
    ctx.config()
        .endpoints
        .mesh_url_template_mcns
        .clone()
        .or_else(|| ctx.scenes().and_then(SceneSet::dvid_source).map(|d| d.mesh_url_template()))
}

async fn fetch_backdrop(client: &Client, url: Option<&str>) -> BuildResult<Mesh> {
    let url = url.ok_or_else(|| BuildError::Config("brain_mesh_url is not configured".to_string()))?;
    let bytes = http::get_bytes(client, url).await?;
    Mesh::decode(0, &bytes)
}

async fn make_thumbnail(
    ctx: &BuildContext,
    client: &Client,
    record: &TypeSummary,
    path: &std::path::Path,
) -> BuildResult<()> {
    let endpoints = &ctx.config().endpoints;
    let mcns = match mcns_mesh_template(ctx) {
        Some(template) if !record.body_ids.is_empty() => {
            fetch_meshes(client, &template, &record.body_ids).await
        }
        _ => Vec::new(),
    };
    let fw = match endpoints.mesh_url_template_fw.as_deref() {
        Some(template) if !record.root_ids.is_empty() => {
            fetch_meshes(client, template, &record.root_ids).await
        }
        _ => Vec::new(),
    };
    if mcns.is_empty() && fw.is_empty() {
        return Err(BuildError::EmptySelection(record.key.clone()));
    }

    let backdrop = ctx
        .brain_mesh(|| fetch_backdrop(client, endpoints.brain_mesh_url.as_deref()))
        .await;
    let layers = [
        MeshLayer {
            meshes: &mcns,
            color: parse_hex_color(MCNS_COLOR).unwrap_or([0, 233, 231]),
        },
        MeshLayer {
            meshes: &fw,
            color: parse_hex_color(FLYWIRE_COLOR).unwrap_or([229, 17, 208]),
        },
    ];
    let image = thumbnail::render(&layers, backdrop.as_deref(), THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT)?;
    thumbnail::write_png(&image, path)
}
