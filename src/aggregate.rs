//! Reconcile the MCNS and FlyWire tables into per-type summaries.

use crate::collapse::{CollapsePolicy, ROI_COLUMNS, collapse_rows, present_str};
use crate::dimorphism::DimorphismClass;
use crate::frame::{Frame, Row, str_col, u64_col};
use crate::links::NeuprintLinks;
use crate::rois::RoiHierarchy;
use crate::scene::{SceneCoverage, SceneSet};
use crate::summary::{ArtifactLinks, RoiSynapses, TypeData, TypeSummary, type_file_name};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

/// Columns probed, in order, for a record's display label.
pub const LABEL_COLUMNS: &[&str] = &[
    "type",
    "flywireType",
    "cell_type",
    "malecns_type",
    "hemibrain_type",
    "instance",
];

const UNKNOWN_TYPE: &str = "unknown";

/// Link builders used while extracting; scenes are optional so the
/// aggregation runs offline.
#[derive(Debug, Clone)]
pub struct LinkContext {
    pub neuprint: NeuprintLinks,
    pub scenes: Option<SceneSet>,
}

/// Rows of one dataset split by dimorphism class.
#[derive(Debug, Default)]
pub struct Partition<'a> {
    pub dimorphic: Vec<&'a Row>,
    pub male: Vec<&'a Row>,
    pub female: Vec<&'a Row>,
    pub isomorphic: Vec<&'a Row>,
}

impl<'a> Partition<'a> {
    pub fn of(frame: &'a Frame) -> Self {
        let mut partition = Partition::default();
        for row in frame.rows() {
            let class = DimorphismClass::classify(str_col(row, "dimorphism"));
            partition.class_mut(class).push(row);
        }
        partition
    }

    pub fn class(&self, class: DimorphismClass) -> &[&'a Row] {
        match class {
            DimorphismClass::Dimorphic => &self.dimorphic,
            DimorphismClass::MaleSpecific => &self.male,
            DimorphismClass::FemaleSpecific => &self.female,
            DimorphismClass::Isomorphic => &self.isomorphic,
        }
    }

    fn class_mut(&mut self, class: DimorphismClass) -> &mut Vec<&'a Row> {
        match class {
            DimorphismClass::Dimorphic => &mut self.dimorphic,
            DimorphismClass::MaleSpecific => &mut self.male,
            DimorphismClass::FemaleSpecific => &mut self.female,
            DimorphismClass::Isomorphic => &mut self.isomorphic,
        }
    }

    pub fn len(&self) -> usize {
        self.dimorphic.len() + self.male.len() + self.female.len() + self.isomorphic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the four class lists from prepared MCNS and FlyWire tables.
pub fn extract_type_data(
    mcns: &Frame,
    fw: &Frame,
    rois: &RoiHierarchy,
    links: &LinkContext,
) -> TypeData {
    let policy = CollapsePolicy::default();
    let mcns_parts = Partition::of(mcns);
    let fw_parts = Partition::of(fw);

    if !mcns_parts.female.is_empty() {
        warn!(
            rows = mcns_parts.female.len(),
            "ignoring MCNS neurons tagged female-specific"
        );
    }

    let mut fw_by_mapping: HashMap<&str, Vec<&Row>> = HashMap::new();
    for row in fw.rows() {
        if let Some(key) = str_col(row, "mapping") {
            fw_by_mapping.entry(key).or_default().push(row);
        }
    }

    let mut data = TypeData::default();
    for class in [
        DimorphismClass::Dimorphic,
        DimorphismClass::MaleSpecific,
        DimorphismClass::Isomorphic,
    ] {
        let groups = group_mcns(mcns_parts.class(class), class);
        let records = data.list_mut(class);
        for (key, rows) in groups {
            let partners = fw_by_mapping.get(key.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            if partners.is_empty() && class == DimorphismClass::Dimorphic {
                debug!(mapping = %key, "no matching FlyWire type");
            }
            records.push(mcns_summary(key, class, &rows, partners, rois, links, &policy));
        }
    }

    for (key, rows) in group_female(&fw_parts.female) {
        data.female.push(female_summary(key, &rows, links, &policy));
    }

    dedupe_keys(&mut data);
    for class in DimorphismClass::PRIORITY {
        data.list_mut(class)
            .sort_by(|a, b| a.label.cmp(&b.label).then_with(|| a.key.cmp(&b.key)));
    }

    info!(
        dimorphic = data.dimorphic.len(),
        male_specific = data.male.len(),
        female_specific = data.female.len(),
        isomorphic = data.isomorphic.len(),
        "extracted cell type summaries"
    );
    data
}

/// MCNS rows keyed by mapping, falling back to a known type.
fn group_mcns<'a>(rows: &[&'a Row], class: DimorphismClass) -> BTreeMap<String, Vec<&'a Row>> {
    let mut groups: BTreeMap<String, Vec<&Row>> = BTreeMap::new();
    let mut dropped = 0usize;
    for &row in rows {
        let key = str_col(row, "mapping").or_else(|| {
            str_col(row, "type").filter(|t| *t != UNKNOWN_TYPE)
        });
        match key {
            Some(key) => groups.entry(key.to_string()).or_default().push(row),
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        warn!(class = %class, rows = dropped, "dropping MCNS neurons without mapping or type");
    }
    groups
}

/// Female-specific FlyWire rows keyed by their best type name.
fn group_female<'a>(rows: &[&'a Row]) -> BTreeMap<String, Vec<&'a Row>> {
    let mut groups: BTreeMap<String, Vec<&Row>> = BTreeMap::new();
    for &row in rows {
        let key = ["cell_type", "malecns_type", "hemibrain_type"]
            .iter()
            .find_map(|col| str_col(row, col))
            .unwrap_or(UNKNOWN_TYPE);
        groups.entry(key.to_string()).or_default().push(row);
    }
    groups
}

/// `(right, left)` counts from `column`, or from `fallback` when `column` is
/// empty throughout.
pub fn side_counts(
    rows: &[&Row],
    column: &str,
    fallback: Option<&str>,
    right: &str,
    left: &str,
) -> (usize, usize) {
    let source = if rows.iter().any(|row| str_col(row, column).is_some()) {
        column
    } else if let Some(fallback) = fallback {
        fallback
    } else {
        column
    };
    let mut counts = (0, 0);
    for row in rows {
        match str_col(row, source) {
            Some(side) if side == right => counts.0 += 1,
            Some(side) if side == left => counts.1 += 1,
            _ => {}
        }
    }
    counts
}

fn ids(rows: &[&Row], column: &str) -> Vec<u64> {
    let mut ids: Vec<u64> = rows.iter().filter_map(|row| u64_col(row, column)).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn representative_label(columns: &Map<String, Value>, fallback: &str) -> String {
    LABEL_COLUMNS
        .iter()
        .find_map(|col| present_str(columns.get(*col)).filter(|s| *s != UNKNOWN_TYPE))
        .unwrap_or(fallback)
        .to_string()
}

/// Distinct raw values of a text column, before collapsing.
fn raw_values(rows: &[&Row], column: &str) -> BTreeSet<String> {
    rows.iter()
        .filter_map(|row| str_col(row, column))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

fn superclasses<'a>(rows: &[&'a Row]) -> Vec<&'a str> {
    rows.iter()
        .filter_map(|&row| str_col(row, "superclass").or_else(|| str_col(row, "super_class")))
        .collect()
}

/// Sum pre/post per primary ROI over the neurons' `roiInfo`.
pub fn roi_synapses(rows: &[&Row], rois: &RoiHierarchy) -> BTreeMap<String, RoiSynapses> {
    let mut totals: BTreeMap<String, RoiSynapses> = BTreeMap::new();
    for row in rows {
        let Some(Value::Object(info)) = row.get("roiInfo") else {
            continue;
        };
        for (roi, stats) in info {
            if !rois.is_primary(roi) {
                continue;
            }
            let pre = stats.get("pre").and_then(Value::as_f64).unwrap_or(0.0);
            let post = stats.get("post").and_then(Value::as_f64).unwrap_or(0.0);
            let entry = totals.entry(roi.clone()).or_default();
            entry.pre += pre;
            entry.post += post;
        }
    }
    totals
}

fn scene_url(
    links: &LinkContext,
    coverage: SceneCoverage,
    body_ids: &[u64],
    root_ids: &[u64],
    key: &str,
) -> Option<String> {
    let scenes = links.scenes.as_ref()?;
    match scenes.url_for(coverage, body_ids, root_ids) {
        Ok(url) => Some(url),
        Err(error) => {
            warn!(key = %key, %error, "failed to build scene link");
            None
        }
    }
}

fn mcns_summary(
    key: String,
    class: DimorphismClass,
    rows: &[&Row],
    partners: &[&Row],
    rois: &RoiHierarchy,
    links: &LinkContext,
    policy: &CollapsePolicy,
) -> TypeSummary {
    let columns = collapse_rows(rows.iter().copied(), ROI_COLUMNS, policy);
    let fw_columns = if partners.is_empty() {
        Map::new()
    } else {
        collapse_rows(partners.iter().copied(), ROI_COLUMNS, policy)
    };
    let (n_mcnsr, n_mcnsl) = side_counts(rows, "somaSide", Some("rootSide"), "R", "L");
    let (n_fwr, n_fwl) = side_counts(partners, "side", None, "right", "left");
    let body_ids = ids(rows, "bodyId");
    let root_ids = ids(partners, "root_id");
    let label = representative_label(&columns, &key);
    let type_name = present_str(columns.get("type")).unwrap_or(&label).to_string();
    let coverage = SceneCoverage::from_superclasses(superclasses(rows).into_iter().chain(superclasses(partners)));

    TypeSummary {
        type_file: type_file_name(&key),
        class,
        neuprint_url: links.neuprint.search_url(&type_name),
        neuprint_conn_url: links.neuprint.connectivity_url(&type_name),
        scene_url: scene_url(links, coverage, &body_ids, &root_ids, &key),
        roi_synapses: roi_synapses(rows, rois),
        synonyms: raw_values(rows, "synonyms")
            .into_iter()
            .chain(raw_values(partners, "synonyms"))
            .collect(),
        label,
        columns,
        fw_columns,
        n_mcnsr,
        n_mcnsl,
        n_fwr,
        n_fwl,
        body_ids,
        root_ids,
        artifacts: ArtifactLinks::default(),
        key,
    }
}

fn female_summary(
    key: String,
    rows: &[&Row],
    links: &LinkContext,
    policy: &CollapsePolicy,
) -> TypeSummary {
    let columns = collapse_rows(rows.iter().copied(), ROI_COLUMNS, policy);
    let (n_fwr, n_fwl) = side_counts(rows, "side", None, "right", "left");
    let root_ids = ids(rows, "root_id");
    let coverage = SceneCoverage::from_superclasses(superclasses(rows));
    let label = representative_label(&columns, &key);

    TypeSummary {
        type_file: type_file_name(&key),
        class: DimorphismClass::FemaleSpecific,
        label,
        synonyms: raw_values(rows, "synonyms"),
        scene_url: scene_url(links, coverage, &[], &root_ids, &key),
        columns,
        fw_columns: Map::new(),
        n_mcnsr: 0,
        n_mcnsl: 0,
        n_fwr,
        n_fwl,
        body_ids: Vec::new(),
        root_ids,
        neuprint_url: None,
        neuprint_conn_url: None,
        roi_synapses: BTreeMap::new(),
        artifacts: ArtifactLinks::default(),
        key,
    }
}

/// Keep each join key in its highest-priority class only.
fn dedupe_keys(data: &mut TypeData) {
    let mut seen: HashSet<String> = HashSet::new();
    for class in DimorphismClass::PRIORITY {
        let list = data.list_mut(class);
        let before = list.len();
        list.retain(|record| seen.insert(record.key.clone()));
        if list.len() < before {
            warn!(
                class = %class,
                dropped = before - list.len(),
                "dropping summaries whose key already belongs to a higher-priority class"
            );
        }
    }
}
