use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CACHE_DIR: &str = ".cache";
const DEFAULT_BUILD_DIR: &str = "docs/build";
const DEFAULT_TEMPLATE_DIR: &str = "templates";
const DEFAULT_SITE_DIR: &str = "site";
const DEFAULT_RANDOM_SEED: u64 = 42;

const DEFAULT_NEUPRINT_SERVER: &str = "https://neuprint-cns.janelia.org";
const DEFAULT_NEUPRINT_DATASET: &str = "cns";
const DEFAULT_MAPPING_URL: &str =
    "https://flyem.mrc-lmb.cam.ac.uk/flyconnectome/mappings/mcns_fw_mapping.json";
const DEFAULT_FW_EDGES_URL: &str = "https://flyem.mrc-lmb.cam.ac.uk/flyconnectome/flywire_connectivity/proofread_connections_783_grouped.feather";
const DEFAULT_VIEWER_URL: &str = "https://clio-ng.janelia.org/";
const DEFAULT_SCENE_URL: &str =
    "https://storage.googleapis.com/flyem-user-links/short/2025-04-14.184028.199909.json";

/// Which stages of the build to skip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkipFlags {
    pub thumbnails: bool,
    pub overview: bool,
    pub profiles: bool,
    pub graphs: bool,
    pub tables: bool,
    pub supertypes: bool,
    pub hemilineages: bool,
    pub synonyms: bool,
    pub regions: bool,
}

/// Upstream services the loaders and artifact generators talk to.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub neuprint_server: String,
    pub neuprint_dataset: String,
    pub neuprint_token: Option<String>,
    pub flywire_annotations_url: Option<String>,
    pub flywire_token: Option<String>,
    pub mapping_url: String,
    pub fw_edges_url: String,
    pub viewer_url: String,
    pub scene_brain_url: String,
    pub scene_vnc_url: String,
    pub scene_cns_url: String,
    /// `{id}` is replaced by the body ID. When unset the DVID server named in
    /// the brain scene's `maleCNS` layer is used.
    pub mesh_url_template_mcns: Option<String>,
    pub mesh_url_template_fw: Option<String>,
    pub brain_mesh_url: Option<String>,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            neuprint_server: DEFAULT_NEUPRINT_SERVER.to_string(),
            neuprint_dataset: DEFAULT_NEUPRINT_DATASET.to_string(),
            neuprint_token: None,
            flywire_annotations_url: None,
            flywire_token: None,
            mapping_url: DEFAULT_MAPPING_URL.to_string(),
            fw_edges_url: DEFAULT_FW_EDGES_URL.to_string(),
            viewer_url: DEFAULT_VIEWER_URL.to_string(),
            scene_brain_url: DEFAULT_SCENE_URL.to_string(),
            scene_vnc_url: DEFAULT_SCENE_URL.to_string(),
            scene_cns_url: DEFAULT_SCENE_URL.to_string(),
            mesh_url_template_mcns: None,
            mesh_url_template_fw: None,
            brain_mesh_url: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub cache_dir: PathBuf,
    pub build_dir: PathBuf,
    pub template_dir: PathBuf,
    pub site_dir: PathBuf,
    pub update_metadata: bool,
    pub skip: SkipFlags,
    pub clear_build: bool,
    pub clear_site: bool,
    pub random_pages: Option<usize>,
    pub random_seed: u64,
    pub endpoints: Endpoints,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            build_dir: PathBuf::from(DEFAULT_BUILD_DIR),
            template_dir: PathBuf::from(DEFAULT_TEMPLATE_DIR),
            site_dir: PathBuf::from(DEFAULT_SITE_DIR),
            update_metadata: false,
            skip: SkipFlags::default(),
            clear_build: false,
            clear_site: false,
            random_pages: None,
            random_seed: DEFAULT_RANDOM_SEED,
            endpoints: Endpoints::default(),
        }
    }
}

impl BuildConfig {
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let CliArgs {
            config,
            update_metadata,
            skip_thumbnails,
            skip_overview,
            skip_profiles,
            skip_graphs,
            skip_tables,
            skip_supertypes,
            skip_hemilineages,
            skip_synonyms,
            skip_regions,
            clear_build,
            clear_site,
            random_pages,
            random_seed,
            cache_dir: cli_cache_dir,
            build_dir: cli_build_dir,
            template_dir: cli_template_dir,
            site_dir: cli_site_dir,
            neuprint_token: cli_neuprint_token,
        } = args;

        let file_config = if let Some(path) = config.as_ref() {
            load_config_file(path)?
        } else {
            PartialConfig::default()
        };

        let PartialConfig {
            cache_dir: file_cache_dir,
            build_dir: file_build_dir,
            template_dir: file_template_dir,
            site_dir: file_site_dir,
            random_seed: file_random_seed,
            neuprint_server,
            neuprint_dataset,
            neuprint_token: file_neuprint_token,
            flywire_annotations_url,
            flywire_token,
            mapping_url,
            fw_edges_url,
            viewer_url,
            scene_brain_url,
            scene_vnc_url,
            scene_cns_url,
            mesh_url_template_mcns,
            mesh_url_template_fw,
            brain_mesh_url,
        } = file_config;

        let defaults = Endpoints::default();
        let scene_brain_url = scene_brain_url.unwrap_or(defaults.scene_brain_url);
        let endpoints = Endpoints {
            neuprint_server: neuprint_server
                .unwrap_or(defaults.neuprint_server)
                .trim_end_matches('/')
                .to_string(),
            neuprint_dataset: neuprint_dataset.unwrap_or(defaults.neuprint_dataset),
            neuprint_token: cli_neuprint_token.or(file_neuprint_token),
            flywire_annotations_url,
            flywire_token,
            mapping_url: mapping_url.unwrap_or(defaults.mapping_url),
            fw_edges_url: fw_edges_url.unwrap_or(defaults.fw_edges_url),
            viewer_url: viewer_url.unwrap_or(defaults.viewer_url),
            scene_vnc_url: scene_vnc_url.unwrap_or_else(|| scene_brain_url.clone()),
            scene_cns_url: scene_cns_url.unwrap_or_else(|| scene_brain_url.clone()),
            scene_brain_url,
            mesh_url_template_mcns,
            mesh_url_template_fw,
            brain_mesh_url,
        };

        if let Some(template) = endpoints.mesh_url_template_mcns.as_ref() {
            anyhow::ensure!(
                template.contains("{id}"),
                "mesh_url_template_mcns must contain an {{id}} placeholder"
            );
        }
        if let Some(template) = endpoints.mesh_url_template_fw.as_ref() {
            anyhow::ensure!(
                template.contains("{id}"),
                "mesh_url_template_fw must contain an {{id}} placeholder"
            );
        }

        if let Some(n) = random_pages {
            anyhow::ensure!(n > 0, "--random-pages must be at least 1");
        }

        Ok(Self {
            cache_dir: cli_cache_dir
                .or(file_cache_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR)),
            build_dir: cli_build_dir
                .or(file_build_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BUILD_DIR)),
            template_dir: cli_template_dir
                .or(file_template_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPLATE_DIR)),
            site_dir: cli_site_dir
                .or(file_site_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SITE_DIR)),
            update_metadata,
            skip: SkipFlags {
                thumbnails: skip_thumbnails,
                overview: skip_overview,
                profiles: skip_profiles,
                graphs: skip_graphs,
                tables: skip_tables,
                supertypes: skip_supertypes,
                hemilineages: skip_hemilineages,
                synonyms: skip_synonyms,
                regions: skip_regions,
            },
            clear_build,
            clear_site,
            random_pages,
            random_seed: random_seed
                .or(file_random_seed)
                .unwrap_or(DEFAULT_RANDOM_SEED),
            endpoints,
        })
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.template_dir.is_dir(),
            "template directory {:?} does not exist",
            self.template_dir
        );
        anyhow::ensure!(
            self.cache_dir != self.build_dir,
            "cache and build directories must differ"
        );
        Ok(())
    }

    pub fn types_dir(&self) -> PathBuf {
        self.build_dir.join("types")
    }

    pub fn supertypes_dir(&self) -> PathBuf {
        self.build_dir.join("supertypes")
    }

    pub fn hemilineages_dir(&self) -> PathBuf {
        self.build_dir.join("hemilineages")
    }

    pub fn regions_dir(&self) -> PathBuf {
        self.build_dir.join("regions")
    }

    pub fn synonyms_dir(&self) -> PathBuf {
        self.build_dir.join("synonyms")
    }

    pub fn graphs_dir(&self) -> PathBuf {
        self.build_dir.join("graphs")
    }

    pub fn tables_dir(&self) -> PathBuf {
        self.build_dir.join("tables")
    }

    pub fn thumbnails_dir(&self) -> PathBuf {
        self.build_dir.join("thumbnails")
    }

    /// Every directory of the output tree, build root first.
    pub fn output_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.build_dir.clone(),
            self.types_dir(),
            self.supertypes_dir(),
            self.hemilineages_dir(),
            self.regions_dir(),
            self.synonyms_dir(),
            self.graphs_dir(),
            self.tables_dir(),
            self.thumbnails_dir(),
        ]
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)
            .with_context(|| format!("failed to create cache dir {:?}", self.cache_dir))?;
        for dir in self.output_dirs() {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create output dir {:?}", dir))?;
        }
        Ok(())
    }
}

#[derive(Parser, Debug, Default, Clone)]
#[command(
    name = "dimorphism-site",
    about = "Generate pages for sexually dimorphic cell types",
    version
)]
pub struct CliArgs {
    #[arg(long, value_name = "FILE", help = "Path to a configuration file (YAML or JSON)")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Force update of the meta data cache")]
    pub update_metadata: bool,

    #[arg(long, help = "Skip the generation of thumbnail images")]
    pub skip_thumbnails: bool,

    #[arg(long, help = "Skip the generation of the overview page")]
    pub skip_overview: bool,

    #[arg(long, help = "Skip the generation of individual cell type pages")]
    pub skip_profiles: bool,

    #[arg(long, help = "Skip the generation of connectivity graphs")]
    pub skip_graphs: bool,

    #[arg(long, help = "Skip the generation of connection tables")]
    pub skip_tables: bool,

    #[arg(long, help = "Skip the generation of supertype pages")]
    pub skip_supertypes: bool,

    #[arg(long, help = "Skip the generation of hemilineage pages")]
    pub skip_hemilineages: bool,

    #[arg(long, help = "Skip the generation of synonym pages")]
    pub skip_synonyms: bool,

    #[arg(long, help = "Skip the generation of region pages")]
    pub skip_regions: bool,

    #[arg(long, help = "Clear the build directory before generating pages")]
    pub clear_build: bool,

    #[arg(long, help = "Clear the rendered site directory")]
    pub clear_site: bool,

    #[arg(
        long,
        value_name = "N",
        help = "Only generate profile pages for N randomly picked types",
        value_parser = clap::value_parser!(usize)
    )]
    pub random_pages: Option<usize>,

    #[arg(
        long,
        value_name = "N",
        help = "Seed for --random-pages",
        value_parser = clap::value_parser!(u64)
    )]
    pub random_seed: Option<u64>,

    #[arg(long, env = "DIMORPHISM_CACHE_DIR", value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    #[arg(long, env = "DIMORPHISM_BUILD_DIR", value_name = "DIR")]
    pub build_dir: Option<PathBuf>,

    #[arg(long, env = "DIMORPHISM_TEMPLATE_DIR", value_name = "DIR")]
    pub template_dir: Option<PathBuf>,

    #[arg(long, env = "DIMORPHISM_SITE_DIR", value_name = "DIR")]
    pub site_dir: Option<PathBuf>,

    #[arg(
        long,
        env = "NEUPRINT_APPLICATION_CREDENTIALS",
        value_name = "TOKEN",
        hide_env_values = true,
        help = "neuPrint API token"
    )]
    pub neuprint_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    cache_dir: Option<PathBuf>,
    build_dir: Option<PathBuf>,
    template_dir: Option<PathBuf>,
    site_dir: Option<PathBuf>,
    random_seed: Option<u64>,
    neuprint_server: Option<String>,
    neuprint_dataset: Option<String>,
    neuprint_token: Option<String>,
    flywire_annotations_url: Option<String>,
    flywire_token: Option<String>,
    mapping_url: Option<String>,
    fw_edges_url: Option<String>,
    viewer_url: Option<String>,
    scene_brain_url: Option<String>,
    scene_vnc_url: Option<String>,
    scene_cns_url: Option<String>,
    mesh_url_template_mcns: Option<String>,
    mesh_url_template_fw: Option<String>,
    brain_mesh_url: Option<String>,
}

fn load_config_file(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        anyhow::bail!("config file {:?} does not exist", path);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML config {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON config {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_map_onto_skip_flags() {
        let args = CliArgs::parse_from([
            "dimorphism-site",
            "--skip-graphs",
            "--skip-synonyms",
            "--random-pages",
            "3",
        ]);
        let config = BuildConfig::from_args(args).expect("config");
        assert!(config.skip.graphs);
        assert!(config.skip.synonyms);
        assert!(!config.skip.tables);
        assert_eq!(config.random_pages, Some(3));
        assert_eq!(config.random_seed, DEFAULT_RANDOM_SEED);
    }

    #[test]
    fn zero_random_pages_is_rejected() {
        let args = CliArgs::parse_from(["dimorphism-site", "--random-pages", "0"]);
        assert!(BuildConfig::from_args(args).is_err());
    }

    #[test]
    fn config_file_fills_gaps_and_cli_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("site.yaml");
        fs::write(
            &path,
            "build_dir: out\ncache_dir: cache\nrandom_seed: 7\nneuprint_server: https://np.example/\nmesh_url_template_fw: https://meshes.example/{id}\n",
        )
        .expect("write config");

        let args = CliArgs {
            config: Some(path),
            build_dir: Some(PathBuf::from("cli-out")),
            ..CliArgs::default()
        };
        let config = BuildConfig::from_args(args).expect("config");
        assert_eq!(config.build_dir, PathBuf::from("cli-out"));
        assert_eq!(config.cache_dir, PathBuf::from("cache"));
        assert_eq!(config.random_seed, 7);
        assert_eq!(config.endpoints.neuprint_server, "https://np.example");
        assert_eq!(
            config.endpoints.scene_vnc_url,
            config.endpoints.scene_brain_url
        );
    }

    #[test]
    fn mesh_template_requires_placeholder() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("site.json");
        fs::write(&path, r#"{"mesh_url_template_mcns": "https://meshes.example/"}"#)
            .expect("write config");
        let args = CliArgs {
            config: Some(path),
            ..CliArgs::default()
        };
        assert!(BuildConfig::from_args(args).is_err());
    }
}
