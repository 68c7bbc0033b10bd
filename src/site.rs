//! Fan the summaries and groups out into pages.

use crate::config::BuildConfig;
use crate::dimorphism::DimorphismClass;
use crate::error::{BuildError, BuildResult};
use crate::grouping::{HemilineageGroup, RegionGroup, SupertypeGroup, SynonymGroup};
use crate::render::Renderer;
use crate::summary::{TypeData, TypeSummary};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tera::Context;
use tracing::info;

pub const OVERVIEW_TEMPLATE: &str = "dimorphism_overview.md";
pub const OVERVIEW_FILE: &str = "dimorphism_overview.md";

/// Relative path from a page one level below the build root back to it.
const UP: &str = "../";

/// Remove every file (not directory) in the output tree.
pub fn clear_build_directory(config: &BuildConfig) -> BuildResult<usize> {
    let mut removed = 0;
    for dir in config.output_dirs() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(BuildError::io(&dir, e)),
        };
        for entry in entries {
            let path = entry.map_err(|e| BuildError::io(&dir, e))?.path();
            if path.is_file() {
                fs::remove_file(&path).map_err(|e| BuildError::io(&path, e))?;
                removed += 1;
            }
        }
    }
    info!(files = removed, dir = %config.build_dir.display(), "cleared the build directory");
    Ok(removed)
}

/// Remove the rendered static site.
pub fn clear_site(config: &BuildConfig) -> BuildResult<bool> {
    let dir = &config.site_dir;
    if !dir.exists() {
        return Ok(false);
    }
    fs::remove_dir_all(dir).map_err(|e| BuildError::io(dir, e))?;
    info!(dir = %dir.display(), "cleared the site directory");
    Ok(true)
}

/// Keys of the summaries that get profile pages: all of them, or a seeded
/// random sample of `limit`.
pub fn select_profiles(data: &TypeData, limit: Option<usize>, seed: u64) -> BTreeSet<String> {
    let keys: Vec<&str> = data.iter().map(|r| r.key.as_str()).collect();
    match limit {
        Some(n) if n < keys.len() => {
            let mut rng = StdRng::seed_from_u64(seed);
            let picked: BTreeSet<String> = keys
                .choose_multiple(&mut rng, n)
                .map(|k| k.to_string())
                .collect();
            info!(picked = picked.len(), of = keys.len(), seed, "sampling profile pages");
            picked
        }
        _ => keys.into_iter().map(str::to_string).collect(),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassCounts {
    pub dimorphic: usize,
    pub male_specific: usize,
    pub female_specific: usize,
    pub isomorphic: usize,
}

impl ClassCounts {
    pub fn of(data: &TypeData) -> Self {
        Self {
            dimorphic: data.dimorphic.len(),
            male_specific: data.male.len(),
            female_specific: data.female.len(),
            isomorphic: data.isomorphic.len(),
        }
    }
}

pub struct SiteWriter<'a> {
    renderer: &'a Renderer,
    config: &'a BuildConfig,
    written: Vec<PathBuf>,
}

impl<'a> SiteWriter<'a> {
    pub fn new(renderer: &'a Renderer, config: &'a BuildConfig) -> Self {
        Self {
            renderer,
            config,
            written: Vec::new(),
        }
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn write(&mut self, template: &str, context: &Context, path: PathBuf) -> BuildResult<()> {
        self.renderer.render_to_file(template, context, &path)?;
        self.written.push(path);
        Ok(())
    }

    pub fn overview(&mut self, data: &TypeData, hemilineages: &[HemilineageGroup]) -> BuildResult<()> {
        let mut context = Context::new();
        context.insert("dimorphic_types", &data.dimorphic);
        context.insert("male_types", &data.male);
        context.insert("female_types", &data.female);
        context.insert("counts", &ClassCounts::of(data));
        context.insert("summary_types_dir", "types");
        context.insert("hemilineages", hemilineages);
        context.insert(
            "generated_at",
            &chrono::Utc::now().format("%Y-%m-%d %H:%M UTC").to_string(),
        );
        let path = self.config.build_dir.join(OVERVIEW_FILE);
        self.write(OVERVIEW_TEMPLATE, &context, path)?;
        info!("wrote overview page");
        Ok(())
    }

    /// One page per selected summary, with the template picked by class.
    pub fn type_pages(&mut self, data: &TypeData, selected: &BTreeSet<String>) -> BuildResult<usize> {
        let dir = self.config.types_dir();
        let mut count = 0;
        for class in DimorphismClass::PRIORITY {
            for record in data.list(class).iter().filter(|r| selected.contains(&r.key)) {
                self.type_page(record, &dir)?;
                count += 1;
            }
        }
        info!(pages = count, "wrote type pages");
        Ok(count)
    }

    fn type_page(&mut self, record: &TypeSummary, dir: &Path) -> BuildResult<()> {
        let mut context = Context::new();
        context.insert("meta", record);
        context.insert("class", record.class.as_str());
        context.insert("root", UP);
        self.write(record.class.template(), &context, dir.join(format!("{}.md", record.type_file)))
    }

    fn group_pages<G: Serialize>(
        &mut self,
        kind: &str,
        groups: &[G],
        file_of: impl Fn(&G) -> &str,
        dir: PathBuf,
    ) -> BuildResult<usize> {
        let individual = format!("{kind}_individual.md");
        for group in groups {
            let mut context = Context::new();
            context.insert("group", group);
            context.insert("root", UP);
            self.write(&individual, &context, dir.join(format!("{}.md", file_of(group))))?;
        }
        let mut context = Context::new();
        context.insert("groups", groups);
        context.insert("root", UP);
        self.write(&format!("{kind}_index.md"), &context, dir.join("index.md"))?;
        info!(kind, pages = groups.len(), "wrote group pages");
        Ok(groups.len())
    }

    pub fn supertype_pages(&mut self, groups: &[SupertypeGroup]) -> BuildResult<usize> {
        let dir = self.config.supertypes_dir();
        self.group_pages("supertype", groups, |g| g.file.as_str(), dir)
    }

    pub fn hemilineage_pages(&mut self, groups: &[HemilineageGroup]) -> BuildResult<usize> {
        let dir = self.config.hemilineages_dir();
        self.group_pages("hemilineage", groups, |g| g.file.as_str(), dir)
    }

    pub fn region_pages(&mut self, groups: &[RegionGroup]) -> BuildResult<usize> {
        let dir = self.config.regions_dir();
        self.group_pages("region", groups, |g| g.file.as_str(), dir)
    }

    pub fn synonym_pages(&mut self, groups: &[SynonymGroup]) -> BuildResult<usize> {
        let dir = self.config.synonyms_dir();
        self.group_pages("synonym", groups, |g| g.file.as_str(), dir)
    }
}
