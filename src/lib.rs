pub mod aggregate;
pub mod artifacts;
pub mod collapse;
pub mod config;
pub mod connectivity;
pub mod context;
pub mod dimorphism;
pub mod error;
pub mod frame;
pub mod grouping;
pub mod links;
pub mod loading;
pub mod logging;
pub mod render;
pub mod rois;
pub mod scene;
pub mod site;
pub mod summary;

pub use config::{BuildConfig, CliArgs, SkipFlags};
pub use context::{ArtifactFailure, BuildContext};
pub use dimorphism::DimorphismClass;
pub use error::{BuildError, BuildResult};
pub use logging::{LoggingConfig, init_logging};
pub use summary::{TypeData, TypeSummary};

use anyhow::{Context as _, Result};
use artifacts::ArtifactPlan;
use loading::{Loader, SourceData};
use render::Renderer;
use scene::SceneSet;
use site::SiteWriter;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// What a build produced.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub pages: usize,
    pub class_counts: site::ClassCounts,
    pub failures: Vec<ArtifactFailure>,
}

/// Load (or read from cache), aggregate, group, enrich and render.
pub async fn run_build(config: BuildConfig) -> Result<BuildReport> {
    let config = Arc::new(config);
    let started = Instant::now();

    if config.clear_site {
        site::clear_site(&config)?;
    }
    config.ensure_directories()?;
    if config.clear_build {
        site::clear_build_directory(&config)?;
    }

    let source = Loader::new(&config)
        .load_all()
        .await
        .context("failed to load source data")?;
    let scenes = match SceneSet::load(&config.endpoints, &config.cache_dir, config.update_metadata).await {
        Ok(scenes) => Some(scenes),
        Err(error) => {
            warn!(%error, "neuroglancer scenes unavailable, pages will have no 3D links");
            None
        }
    };

    let renderer = Renderer::from_directory(&config.template_dir)
        .with_context(|| format!("failed to load templates from {:?}", config.template_dir))?;
    let report = build_site(Arc::clone(&config), source, scenes, &renderer).await?;

    info!(
        pages = report.pages,
        failed_artifacts = report.failures.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "build finished"
    );
    Ok(report)
}

/// Everything after loading. Split out so it can run on prepared data.
pub async fn build_site(
    config: Arc<BuildConfig>,
    source: SourceData,
    scenes: Option<SceneSet>,
    renderer: &Renderer,
) -> Result<BuildReport> {
    let ctx = BuildContext::new(Arc::clone(&config), source, scenes);
    let mut data = TypeData::clone(&ctx.type_data());
    if data.is_empty() {
        warn!("no cell types extracted, only index pages will be written");
    }

    let selected = site::select_profiles(&data, config.random_pages, config.random_seed);
    let plan = ArtifactPlan::from_skip(&config.skip);
    let records: Vec<&mut TypeSummary> = data
        .iter_mut()
        .filter(|record| selected.contains(&record.key))
        .collect();
    artifacts::enrich(&ctx, renderer, records, plan)
        .await
        .context("failed to prepare artifact generation")?;

    let skip = config.skip;
    let scenes = ctx.scenes();
    let hemilineages = grouping::group_by_hemilineage(&data, scenes);
    let mut writer = SiteWriter::new(renderer, &config);

    if !skip.overview {
        writer.overview(&data, &hemilineages)?;
    }
    if !skip.profiles {
        writer.type_pages(&data, &selected)?;
    }
    if !skip.supertypes {
        writer.supertype_pages(&grouping::group_by_supertype(&data, scenes))?;
    }
    if !skip.hemilineages {
        writer.hemilineage_pages(&hemilineages)?;
    }
    if !skip.regions {
        writer.region_pages(&grouping::group_by_region(&data, &ctx.source().rois, scenes))?;
    }
    if !skip.synonyms {
        writer.synonym_pages(&grouping::group_by_synonyms(&data, scenes))?;
    }

    Ok(BuildReport {
        pages: writer.written().len(),
        class_counts: site::ClassCounts::of(&data),
        failures: ctx.failures(),
    })
}
