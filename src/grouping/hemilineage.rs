use super::{MemberCounts, group_scene_url, sort_members};
use crate::collapse::{NOT_AVAILABLE, present_str};
use crate::dimorphism::DimorphismClass;
use crate::scene::SceneSet;
use crate::summary::{TypeData, TypeSummary, type_file_name};
use serde::Serialize;
use std::collections::BTreeMap;

const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HemilineageGroup {
    pub name: String,
    pub file: String,
    pub members: Vec<TypeSummary>,
    pub counts: MemberCounts,
    pub has_fru: bool,
    pub has_dsx: bool,
    /// `fru+dsx`, `fru`, `dsx` or `N/A`.
    pub fru_dsx: String,
    pub scene_url: Option<String>,
}

/// Lineage label of one summary, `"unknown"` when none is annotated.
pub fn hemilineage_of(record: &TypeSummary) -> &str {
    let candidates: &[&str] = if record.class.is_mcns_anchored() {
        &["itoleeHl", "trumanHl"]
    } else {
        &["ito_lee_hemilineage"]
    };
    candidates
        .iter()
        .find_map(|column| present_str(record.columns.get(*column)))
        .unwrap_or(UNKNOWN)
}

/// `(fru, dsx)` expression read from the `fruDsx` / `fru_dsx` annotations.
fn fru_dsx_flags(record: &TypeSummary) -> (bool, bool) {
    let mut flags = (false, false);
    for column in ["fruDsx", "fru_dsx"] {
        for map in [&record.columns, &record.fw_columns] {
            if let Some(text) = present_str(map.get(column)) {
                let text = text.to_ascii_lowercase();
                flags.0 |= text.contains("fru");
                flags.1 |= text.contains("dsx");
            }
        }
    }
    flags
}

fn fru_dsx_label(has_fru: bool, has_dsx: bool) -> &'static str {
    match (has_fru, has_dsx) {
        (true, true) => "fru+dsx",
        (true, false) => "fru",
        (false, true) => "dsx",
        (false, false) => NOT_AVAILABLE,
    }
}

/// Bucket the sexually dimorphic summaries (dimorphic, male- and
/// female-specific) by hemilineage. Buckets come back sorted by name.
pub fn group_by_hemilineage(data: &TypeData, scenes: Option<&SceneSet>) -> Vec<HemilineageGroup> {
    let mut buckets: BTreeMap<String, Vec<TypeSummary>> = BTreeMap::new();
    for class in [
        DimorphismClass::Dimorphic,
        DimorphismClass::MaleSpecific,
        DimorphismClass::FemaleSpecific,
    ] {
        for record in data.list(class) {
            buckets
                .entry(hemilineage_of(record).to_string())
                .or_default()
                .push(record.clone());
        }
    }

    buckets
        .into_iter()
        .map(|(name, mut members)| {
            sort_members(&mut members);
            let (has_fru, has_dsx) = members
                .iter()
                .map(fru_dsx_flags)
                .fold((false, false), |acc, f| (acc.0 | f.0, acc.1 | f.1));
            HemilineageGroup {
                file: type_file_name(&name),
                counts: MemberCounts::of(&members),
                fru_dsx: fru_dsx_label(has_fru, has_dsx).to_string(),
                scene_url: group_scene_url(scenes, &name, &members),
                name,
                members,
                has_fru,
                has_dsx,
            }
        })
        .collect()
}
