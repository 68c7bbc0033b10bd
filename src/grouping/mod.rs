//! Re-bucket type summaries under coarser keys.

pub mod hemilineage;
pub mod region;
pub mod supertype;
pub mod synonyms;

pub use hemilineage::{HemilineageGroup, group_by_hemilineage};
pub use region::{REGION_THRESHOLD, RegionGroup, group_by_region};
pub use supertype::{SUPERTYPE_SEPARATOR, SupertypeGroup, group_by_supertype};
pub use synonyms::{SynonymEntry, SynonymGroup, group_by_synonyms, parse_synonyms};

use crate::collapse::split_members;
use crate::scene::{SceneCoverage, SceneSet};
use crate::summary::TypeSummary;
use serde::Serialize;
use tracing::warn;

/// Neuron and type counts over a group's members.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemberCounts {
    pub n_mcnsr: usize,
    pub n_mcnsl: usize,
    pub n_fwr: usize,
    pub n_fwl: usize,
    pub n_mcns: usize,
    pub n_fw: usize,
    /// Member types with at least one MCNS neuron.
    pub n_types_mcns: usize,
    /// Member types with at least one FlyWire neuron.
    pub n_types_fw: usize,
}

impl MemberCounts {
    pub fn of(members: &[TypeSummary]) -> Self {
        members.iter().fold(MemberCounts::default(), |mut acc, m| {
            acc.n_mcnsr += m.n_mcnsr;
            acc.n_mcnsl += m.n_mcnsl;
            acc.n_fwr += m.n_fwr;
            acc.n_fwl += m.n_fwl;
            acc.n_mcns += m.n_mcns();
            acc.n_fw += m.n_fw();
            acc.n_types_mcns += usize::from(m.n_mcns() > 0);
            acc.n_types_fw += usize::from(m.n_fw() > 0);
            acc
        })
    }
}

fn sort_members(members: &mut [TypeSummary]) {
    members.sort_by(|a, b| a.label.cmp(&b.label).then_with(|| a.key.cmp(&b.key)));
}

/// One scene showing every member of a group.
fn group_scene_url(scenes: Option<&SceneSet>, name: &str, members: &[TypeSummary]) -> Option<String> {
    let scenes = scenes?;
    let mut superclasses: Vec<&str> = Vec::new();
    for member in members {
        for column in ["superclass", "super_class"] {
            if let Some(value) = member.column_str(column) {
                superclasses.extend(split_members(value, ','));
            }
        }
    }
    let mut body_ids: Vec<u64> = members.iter().flat_map(|m| m.body_ids.iter().copied()).collect();
    let mut root_ids: Vec<u64> = members.iter().flat_map(|m| m.root_ids.iter().copied()).collect();
    body_ids.sort_unstable();
    body_ids.dedup();
    root_ids.sort_unstable();
    root_ids.dedup();
    match scenes.url_for(SceneCoverage::from_superclasses(superclasses), &body_ids, &root_ids) {
        Ok(url) => Some(url),
        Err(error) => {
            warn!(group = %name, %error, "failed to build group scene link");
            None
        }
    }
}
