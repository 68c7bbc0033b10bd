use super::{MemberCounts, group_scene_url, sort_members};
use crate::rois::{Compartment, RoiHierarchy};
use crate::scene::SceneSet;
use crate::summary::{TypeData, TypeSummary, type_file_name};
use serde::Serialize;
use std::collections::BTreeMap;

/// Minimum share of a type's input or output synapses for it to count as
/// innervating an ROI.
pub const REGION_THRESHOLD: f64 = 0.10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionGroup {
    pub roi: String,
    pub file: String,
    pub compartment: Compartment,
    pub members: Vec<TypeSummary>,
    pub counts: MemberCounts,
    pub scene_url: Option<String>,
}

/// Primary ROIs holding at least [`REGION_THRESHOLD`] of the record's
/// presynapses or postsynapses.
pub fn qualifying_rois(record: &TypeSummary) -> Vec<&str> {
    let (total_pre, total_post) = record
        .roi_synapses
        .values()
        .fold((0.0, 0.0), |acc, s| (acc.0 + s.pre, acc.1 + s.post));
    record
        .roi_synapses
        .iter()
        .filter(|(_, s)| {
            let pre = if total_pre > 0.0 { s.pre / total_pre } else { 0.0 };
            let post = if total_post > 0.0 { s.post / total_post } else { 0.0 };
            pre >= REGION_THRESHOLD || post >= REGION_THRESHOLD
        })
        .map(|(roi, _)| roi.as_str())
        .collect()
}

/// Bucket sexually dimorphic summaries under every ROI they innervate.
pub fn group_by_region(
    data: &TypeData,
    rois: &RoiHierarchy,
    scenes: Option<&SceneSet>,
) -> Vec<RegionGroup> {
    let mut buckets: BTreeMap<String, Vec<TypeSummary>> = BTreeMap::new();
    for record in data.dimorphic_records() {
        for roi in qualifying_rois(record) {
            buckets.entry(roi.to_string()).or_default().push(record.clone());
        }
    }

    let mut groups: Vec<RegionGroup> = buckets
        .into_iter()
        .map(|(roi, mut members)| {
            sort_members(&mut members);
            RegionGroup {
                file: type_file_name(&roi),
                compartment: rois.compartment(&roi),
                counts: MemberCounts::of(&members),
                scene_url: group_scene_url(scenes, &roi, &members),
                roi,
                members,
            }
        })
        .collect();
    groups.sort_by(|a, b| a.compartment.cmp(&b.compartment).then_with(|| a.roi.cmp(&b.roi)));
    groups
}
