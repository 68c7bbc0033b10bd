#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use dimorphism_site::BuildConfig;
use dimorphism_site::frame::{Frame, Row};
use dimorphism_site::loading::edges::{FwEdge, POST_COLUMN, PRE_COLUMN, WEIGHT_COLUMN};
use dimorphism_site::loading::mapping::Mapping;
use dimorphism_site::loading::{SourceData, prepare};
use dimorphism_site::render::Renderer;
use dimorphism_site::rois::RoiHierarchy;
use serde_json::{Value, json};
use tempfile::{TempDir, tempdir};

pub fn template_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("templates")
}

pub fn repo_renderer() -> Renderer {
    Renderer::from_directory(&template_dir()).expect("load repository templates")
}

pub fn row(value: Value) -> Row {
    value.as_object().cloned().expect("row literal must be an object")
}

pub fn frame(rows: Value) -> Frame {
    Frame::new(
        rows.as_array()
            .expect("rows literal must be an array")
            .iter()
            .cloned()
            .map(row)
            .collect(),
    )
}

/// A build directory plus cache directory inside one temp dir.
pub struct TestWorkspace {
    _tempdir: TempDir,
    root: PathBuf,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let tempdir = tempdir().expect("tempdir");
        let root = tempdir.path().to_path_buf();
        Self {
            _tempdir: tempdir,
            root,
        }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Offline config: no thumbnails, graphs or tables.
    pub fn config(&self) -> BuildConfig {
        let mut config = BuildConfig {
            cache_dir: self.path("cache"),
            build_dir: self.path("build"),
            template_dir: template_dir(),
            site_dir: self.path("site"),
            ..BuildConfig::default()
        };
        config.skip.thumbnails = true;
        config.skip.graphs = true;
        config.skip.tables = true;
        config
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.path(relative))
            .unwrap_or_else(|e| panic!("read {relative}: {e}"))
    }
}

pub fn roi_hierarchy() -> RoiHierarchy {
    let tree = json!({
        "name": "MaleCNS",
        "children": [
            {"name": "CentralBrain", "children": [
                {"name": "LAL(R)*"},
                {"name": "SMP(R)*"}
            ]},
            {"name": "OL(R)", "children": [{"name": "ME(R)*"}]},
            {"name": "VNC", "children": [{"name": "LegNp(T1)(L)*"}]}
        ]
    });
    RoiHierarchy::from_tree(&tree, &[]).expect("roi tree")
}

/// Five MCNS and five FlyWire neurons. `aSP-a` is dimorphic and matched 1:1
/// (two MCNS neurons, two FlyWire neurons), `LAL001` is isomorphic, `mAL`
/// is male-specific and `fSP` is female-specific.
pub fn source_data() -> SourceData {
    let mcns = frame(json!([
        {"bodyId": 10, "type": "aSP-a", "somaSide": "R", "dimorphism": "sexually dimorphic",
         "superclass": "cb_intrinsic", "supertype": "aSP", "itoleeHl": "LHl4_dorsal", "fruDsx": "fru",
         "synonyms": "Kimura 2008: aSP-a", "roiInfo": {"LAL(R)": {"pre": 80, "post": 10}, "SMP(R)": {"pre": 5, "post": 5}}},
        {"bodyId": 11, "type": "aSP-a", "somaSide": "L", "dimorphism": "sexually dimorphic",
         "superclass": "cb_intrinsic", "supertype": "aSP", "itoleeHl": "LHl4_dorsal", "fruDsx": "fru",
         "synonyms": "Kimura 2008: aSP-a", "roiInfo": {"LAL(R)": {"pre": 70, "post": 20}}},
        {"bodyId": 12, "type": "LAL001", "somaSide": "R", "superclass": "cb_intrinsic",
         "roiInfo": {"LAL(R)": {"pre": 1, "post": 1}}},
        {"bodyId": 13, "type": "mAL", "somaSide": "R", "dimorphism": "male-specific",
         "superclass": "cb_intrinsic", "supertype": "aSP", "itoleeHl": "LHl4_dorsal"},
        {"bodyId": 14, "type": null, "flywireType": null, "somaSide": "L"}
    ]));
    let fw = frame(json!([
        {"root_id": 720575940000000001u64, "cell_type": "aSP-a", "side": "right", "dimorphism": "sexually dimorphic",
         "super_class": "central", "ito_lee_hemilineage": "LHl4_dorsal"},
        {"root_id": 720575940000000002u64, "cell_type": "aSP-a", "side": "left", "dimorphism": "sexually dimorphic",
         "super_class": "central", "ito_lee_hemilineage": "LHl4_dorsal"},
        {"root_id": 720575940000000003u64, "cell_type": "LAL001", "side": "right", "super_class": "central"},
        {"root_id": 720575940000000004u64, "cell_type": "fSP", "side": "left", "dimorphism": "female-specific",
         "super_class": "central", "ito_lee_hemilineage": "LHl4_dorsal"},
        {"root_id": 720575940000000005u64, "cell_type": null, "side": "right"}
    ]));
    let mapping: Mapping = [
        (10, "aSP-a"),
        (11, "aSP-a"),
        (12, "LAL001"),
        (720575940000000001, "aSP-a"),
        (720575940000000002, "aSP-a"),
        (720575940000000003, "LAL001"),
    ]
    .into_iter()
    .map(|(id, key)| (id, key.to_string()))
    .collect();

    let mut data = SourceData {
        mcns,
        fw,
        mapping,
        fw_edges: vec![FwEdge {
            pre: 720575940000000001,
            post: 720575940000000003,
            weight: 12,
        }],
        rois: roi_hierarchy(),
    };
    prepare(&mut data);
    data
}

pub fn feather_bytes(rows: &[(i64, i64, i64)]) -> Vec<u8> {
    let schema = Schema::new(vec![
        Field::new(PRE_COLUMN, DataType::Int64, false),
        Field::new(POST_COLUMN, DataType::Int64, false),
        Field::new(WEIGHT_COLUMN, DataType::Int64, false),
    ]);
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from(rows.iter().map(|r| r.0).collect::<Vec<_>>())),
        Arc::new(Int64Array::from(rows.iter().map(|r| r.1).collect::<Vec<_>>())),
        Arc::new(Int64Array::from(rows.iter().map(|r| r.2).collect::<Vec<_>>())),
    ];
    let batch = RecordBatch::try_new(Arc::new(schema.clone()), columns).expect("batch");
    let mut buf = Vec::new();
    {
        let mut writer = FileWriter::try_new(&mut buf, &schema).expect("writer");
        writer.write(&batch).expect("write batch");
        writer.finish().expect("finish");
    }
    buf
}
