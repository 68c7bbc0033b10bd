// =============================================================================
// Loaders and full builds against mocked upstream services
// =============================================================================

mod support;

use dimorphism_site::artifacts::mesh::Mesh;
use dimorphism_site::loading::{FW_META_CACHE, Loader, MAPPING_CACHE, MCNS_META_CACHE, ROI_INFO_CACHE};
use dimorphism_site::{BuildConfig, run_build};
use serde_json::{Value, json};
use support::{TestWorkspace, feather_bytes};
use wiremock::matchers::{body_string_contains, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FW_A: u64 = 720575940000000001;
const FW_B: u64 = 720575940000000002;
const FW_C: u64 = 720575940000000003;

fn neuron(props: Value) -> Value {
    json!([props])
}

async fn mount_neuprint(server: &MockServer) {
    mount_neuprint_metadata(server).await;
    Mock::given(method("POST"))
        .and(path("/api/custom/custom"))
        .and(body_string_contains("ConnectsTo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "columns": ["a.bodyId", "b.bodyId", "w.weight", "a.type", "b.type"],
            "data": [[10, 12, 5, "aSP-a", "LAL001"], [11, 12, 3, "aSP-a", "LAL001"]]
        })))
        .mount(server)
        .await;
}

/// Neurons and ROI hierarchy only; adjacency queries are left unmatched.
async fn mount_neuprint_metadata(server: &MockServer) {
    let neurons = json!({
        "columns": ["n"],
        "data": [
            neuron(json!({"bodyId": 10, "type": "aSP-a", "somaSide": "R", "status": "Traced",
                "dimorphism": "sexually dimorphic", "superclass": "cb_intrinsic",
                "roiInfo": "{\"LAL(R)\": {\"pre\": 40, \"post\": 2}}"})),
            neuron(json!({"bodyId": 11, "type": "aSP-a", "somaSide": "L", "status": "Traced",
                "dimorphism": "sexually dimorphic", "superclass": "cb_intrinsic",
                "roiInfo": "{\"LAL(R)\": {\"pre\": 30, \"post\": 4}}"})),
            neuron(json!({"bodyId": 12, "type": "LAL001", "somaSide": "R", "status": "Traced",
                "superclass": "cb_intrinsic"}))
        ]
    });
    Mock::given(method("POST"))
        .and(path("/api/custom/custom"))
        .and(body_string_contains("n.status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(neurons))
        .mount(server)
        .await;

    let tree = json!({"name": "MaleCNS", "children": [{"name": "LAL(R)"}, {"name": "SMP(R)"}]});
    Mock::given(method("POST"))
        .and(path("/api/custom/custom"))
        .and(body_string_contains("roiHierarchy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "columns": ["m.roiHierarchy", "m.primaryRois"],
            "data": [[tree.to_string(), ["LAL(R)", "SMP(R)"]]]
        })))
        .mount(server)
        .await;
}

async fn mount_flywire(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/annotations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"root_id": FW_A, "cell_type": "aSP-a", "side": "right", "dimorphism": "sexually dimorphic", "super_class": "central"},
            {"root_id": FW_B, "cell_type": "aSP-a", "side": "left", "dimorphism": "sexually dimorphic", "super_class": "central"},
            {"root_id": FW_C, "cell_type": "LAL001", "side": "right", "super_class": "central"}
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/mapping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "mcns:10": "aSP-a",
            "mcns:11": "aSP-a",
            "mcns:12": "LAL001",
            format!("fw:{FW_A}"): "aSP-a",
            format!("fw:{FW_B}"): "aSP-a",
            format!("fw:{FW_C}"): "LAL001"
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/edges/fw_edges.feather"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(feather_bytes(&[(FW_A as i64, FW_C as i64, 12), (FW_B as i64, FW_C as i64, 4)])),
        )
        .mount(server)
        .await;
}

async fn mount_scenes(server: &MockServer) {
    let scene = json!({
        "layers": [
            {"name": "maleCNS", "source": {"url": "dvid://https://emdata.example.org/abc123/segmentation"}},
            {"name": "female (FlyWire)", "source": "precomputed://gs://flywire/seg"},
            {"name": "vnc-neuropil-shell", "visible": true}
        ]
    });
    for name in ["brain", "vnc", "cns"] {
        Mock::given(method("GET"))
            .and(path(format!("/scenes/{name}.json")))
            .respond_with(ResponseTemplate::new(200).set_body_json(scene.clone()))
            .mount(server)
            .await;
    }
}

fn remote_config(workspace: &TestWorkspace, server: &MockServer) -> BuildConfig {
    let base = server.uri();
    let mut config = workspace.config();
    config.endpoints.neuprint_server = base.clone();
    config.endpoints.flywire_annotations_url = Some(format!("{base}/annotations"));
    config.endpoints.mapping_url = format!("{base}/mapping");
    config.endpoints.fw_edges_url = format!("{base}/edges/fw_edges.feather");
    config.endpoints.viewer_url = "https://ng.example.org/".to_string();
    config.endpoints.scene_brain_url = format!("{base}/scenes/brain.json");
    config.endpoints.scene_vnc_url = format!("{base}/scenes/vnc.json");
    config.endpoints.scene_cns_url = format!("{base}/scenes/cns.json");
    config
}

// =============================================================================
// Loader
// =============================================================================

#[tokio::test]
async fn test_load_all_fetches_and_caches_every_source() {
    let server = MockServer::start().await;
    mount_neuprint(&server).await;
    mount_flywire(&server).await;
    let workspace = TestWorkspace::new();
    let config = remote_config(&workspace, &server);

    let data = Loader::new(&config).load_all().await.expect("load");
    assert_eq!(data.mcns.len(), 3);
    assert_eq!(data.fw.len(), 3);
    assert_eq!(data.mapping.get(&FW_A).map(String::as_str), Some("aSP-a"));
    assert_eq!(data.fw_edges.len(), 2);
    assert!(data.rois.is_primary("LAL(R)"));
    assert_eq!(data.mcns.rows()[0]["mapping"], json!("aSP-a"));

    for cache in [MCNS_META_CACHE, FW_META_CACHE, ROI_INFO_CACHE, MAPPING_CACHE, "fw_edges.feather"] {
        assert!(config.cache_dir.join(cache).exists(), "{cache} not cached");
    }
}

#[tokio::test]
async fn test_cached_sources_are_used_without_the_network() {
    let workspace = TestWorkspace::new();
    let config = {
        let server = MockServer::start().await;
        mount_neuprint(&server).await;
        mount_flywire(&server).await;
        let config = remote_config(&workspace, &server);
        Loader::new(&config).load_all().await.expect("first load");
        config
    };

    // The mock server is gone; everything must come from the cache.
    let data = Loader::new(&config).load_all().await.expect("cached load");
    assert_eq!(data.mcns.len(), 3);
    assert_eq!(data.fw_edges.len(), 2);
    assert!(data.rois.is_primary("SMP(R)"));
    let first = &data.mcns.rows()[0];
    assert_eq!(first["bodyId"], json!(10));
    assert_eq!(first["roiInfo"]["LAL(R)"]["pre"], json!(40));
}

#[tokio::test]
async fn test_update_metadata_refetches() {
    let workspace = TestWorkspace::new();
    let server = MockServer::builder().start().await;
    mount_neuprint(&server).await;
    mount_flywire(&server).await;
    let mut config = remote_config(&workspace, &server);
    Loader::new(&config).load_all().await.expect("first load");
    drop(server);

    config.update_metadata = true;
    let err = Loader::new(&config).load_all().await.expect_err("server is gone");
    assert_eq!(err.category(), "network");
}

#[tokio::test]
async fn test_upstream_error_status_carries_the_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mapping"))
        .respond_with(ResponseTemplate::new(503).set_body_string("mapping store offline"))
        .mount(&server)
        .await;
    let workspace = TestWorkspace::new();
    let config = remote_config(&workspace, &server);
    std::fs::create_dir_all(&config.cache_dir).expect("cache dir");

    let err = Loader::new(&config).load_mapping().await.expect_err("503");
    assert_eq!(err.category(), "network");
    assert!(err.to_string().contains("503"));
    assert!(err.to_string().contains("mapping store offline"));
}

// =============================================================================
// Full build
// =============================================================================

#[tokio::test]
async fn test_run_build_links_scenes_graphs_and_tables() {
    let server = MockServer::start().await;
    mount_neuprint(&server).await;
    mount_flywire(&server).await;
    mount_scenes(&server).await;
    let workspace = TestWorkspace::new();
    let mut config = remote_config(&workspace, &server);
    config.skip.graphs = false;
    config.skip.tables = false;

    let report = run_build(config).await.expect("build");
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.class_counts.dimorphic, 1);

    let profile = workspace.read("build/types/aSP-a.md");
    assert!(profile.contains("https://ng.example.org/#!"));
    assert!(profile.contains("../graphs/aSP-a_mcns.html"));
    assert!(profile.contains("../tables/aSP-a_fw.html"));

    let graph = workspace.read("build/graphs/aSP-a_mcns.html");
    assert!(graph.contains("\"LAL001\""));
    assert!(graph.contains("#00ffff"));
    let table = workspace.read("build/tables/aSP-a_fw.html");
    assert!(table.contains("LAL001"));
    assert!(table.contains("FlyWire"));
}

#[tokio::test]
async fn test_missing_scenes_do_not_fail_the_build() {
    let server = MockServer::start().await;
    mount_neuprint(&server).await;
    mount_flywire(&server).await;
    let workspace = TestWorkspace::new();
    let config = remote_config(&workspace, &server);

    let report = run_build(config).await.expect("build");
    assert_eq!(report.class_counts.isomorphic, 1);
    let profile = workspace.read("build/types/aSP-a.md");
    assert!(!profile.contains("Open in neuroglancer"));
}

// =============================================================================
// Best-effort artifacts
// =============================================================================

fn tetrahedron(offset: f32) -> Mesh {
    Mesh {
        vertices: vec![
            [offset, 0.0, 0.0],
            [offset + 10.0, 0.0, 0.0],
            [offset, 10.0, 0.0],
            [offset, 0.0, 10.0],
        ],
        triangles: vec![[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]],
    }
}

async fn mount_meshes(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/meshes/(mcns|fw)/\d+\.ngmesh$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(tetrahedron(0.0).encode()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/meshes/brain.ngmesh"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(tetrahedron(-50.0).encode()))
        .mount(server)
        .await;
}

async fn requests_under(server: &MockServer, prefix: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path().starts_with(prefix))
        .count()
}

#[tokio::test]
async fn test_failed_adjacency_query_is_recorded_and_the_build_continues() {
    let server = MockServer::start().await;
    mount_neuprint_metadata(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/custom/custom"))
        .and(body_string_contains("ConnectsTo"))
        .respond_with(ResponseTemplate::new(500).set_body_string("adjacency query timed out"))
        .mount(&server)
        .await;
    mount_flywire(&server).await;
    let workspace = TestWorkspace::new();
    let mut config = remote_config(&workspace, &server);
    config.skip.graphs = false;
    config.skip.tables = false;

    let report = run_build(config).await.expect("build must survive artifact failures");
    let failed: Vec<_> = report
        .failures
        .iter()
        .filter(|f| f.artifact == "connectivity")
        .map(|f| f.type_file.as_str())
        .collect();
    assert!(failed.contains(&"aSP-a"), "{:?}", report.failures);
    assert!(report.failures.iter().all(|f| f.category == "network"));
    assert!(report.failures[0].message.contains("adjacency query timed out"));

    let profile = workspace.read("build/types/aSP-a.md");
    assert!(!profile.contains("aSP-a_mcns.html"));
    assert!(!workspace.path("build/graphs/aSP-a_mcns.html").exists());
    // FlyWire connectivity comes from the edge list and is unaffected.
    assert!(profile.contains("../graphs/aSP-a_fw.html"));
    assert!(workspace.path("build/tables/aSP-a_fw.html").exists());
}

#[tokio::test]
async fn test_thumbnails_are_rendered_once_and_reused() {
    let server = MockServer::start().await;
    mount_neuprint(&server).await;
    mount_flywire(&server).await;
    mount_meshes(&server).await;
    let workspace = TestWorkspace::new();
    let mut config = remote_config(&workspace, &server);
    let base = server.uri();
    config.skip.thumbnails = false;
    config.endpoints.mesh_url_template_mcns = Some(format!("{base}/meshes/mcns/{{id}}.ngmesh"));
    config.endpoints.mesh_url_template_fw = Some(format!("{base}/meshes/fw/{{id}}.ngmesh"));
    config.endpoints.brain_mesh_url = Some(format!("{base}/meshes/brain.ngmesh"));

    let report = run_build(config.clone()).await.expect("first build");
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    let png = workspace.path("build/thumbnails/aSP-a.png");
    let bytes = std::fs::read(&png).expect("thumbnail written");
    assert!(bytes.starts_with(b"\x89PNG"));
    assert!(workspace.read("build/types/aSP-a.md").contains("../thumbnails/aSP-a.png"));

    // Two MCNS and two FlyWire meshes for aSP-a, one of each for LAL001.
    assert_eq!(requests_under(&server, "/meshes/mcns/").await, 3);
    assert_eq!(requests_under(&server, "/meshes/fw/").await, 3);
    assert_eq!(requests_under(&server, "/meshes/brain").await, 1);

    let report = run_build(config).await.expect("second build");
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(requests_under(&server, "/meshes/").await, 7);
    assert!(workspace.read("build/types/aSP-a.md").contains("../thumbnails/aSP-a.png"));
}
