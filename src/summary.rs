//! Per-type summary records and the four class lists built from them.

use crate::collapse::present_str;
use crate::dimorphism::DimorphismClass;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Synapse totals of a summary inside one primary ROI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RoiSynapses {
    pub pre: f64,
    pub post: f64,
}

/// Relative links to generated artifacts, filled in as they are produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArtifactLinks {
    pub graph_mcns: Option<String>,
    pub graph_fw: Option<String>,
    pub table_mcns: Option<String>,
    pub table_fw: Option<String>,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeSummary {
    /// Join key: mapping for MCNS-anchored records, type for female-specific.
    pub key: String,
    pub type_file: String,
    pub class: DimorphismClass,
    pub label: String,
    /// Collapsed columns of the anchoring dataset.
    pub columns: Map<String, Value>,
    /// Collapsed FlyWire columns of an MCNS-anchored record.
    pub fw_columns: Map<String, Value>,
    pub n_mcnsr: usize,
    pub n_mcnsl: usize,
    pub n_fwr: usize,
    pub n_fwl: usize,
    pub body_ids: Vec<u64>,
    pub root_ids: Vec<u64>,
    pub neuprint_url: Option<String>,
    pub neuprint_conn_url: Option<String>,
    pub scene_url: Option<String>,
    pub roi_synapses: BTreeMap<String, RoiSynapses>,
    /// Distinct per-neuron synonym annotations, kept apart so each one is
    /// parsed on its own.
    pub synonyms: BTreeSet<String>,
    pub artifacts: ArtifactLinks,
}

impl TypeSummary {
    /// A collapsed column as text, ignoring the empty sentinel. Falls back to
    /// the FlyWire columns.
    pub fn column_str(&self, name: &str) -> Option<&str> {
        present_str(self.columns.get(name)).or_else(|| present_str(self.fw_columns.get(name)))
    }

    /// Smallest member ID, MCNS first.
    pub fn min_id(&self) -> Option<u64> {
        self.body_ids
            .iter()
            .min()
            .or_else(|| self.root_ids.iter().min())
            .copied()
    }

    pub fn n_mcns(&self) -> usize {
        self.body_ids.len()
    }

    pub fn n_fw(&self) -> usize {
        self.root_ids.len()
    }

    pub fn is_dimorphic(&self) -> bool {
        self.class != DimorphismClass::Isomorphic
    }
}

/// Output of `extract_type_data`, one list per class, each sorted by label.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TypeData {
    pub dimorphic: Vec<TypeSummary>,
    pub male: Vec<TypeSummary>,
    pub female: Vec<TypeSummary>,
    pub isomorphic: Vec<TypeSummary>,
}

impl TypeData {
    pub fn list(&self, class: DimorphismClass) -> &[TypeSummary] {
        match class {
            DimorphismClass::Dimorphic => &self.dimorphic,
            DimorphismClass::MaleSpecific => &self.male,
            DimorphismClass::FemaleSpecific => &self.female,
            DimorphismClass::Isomorphic => &self.isomorphic,
        }
    }

    pub fn list_mut(&mut self, class: DimorphismClass) -> &mut Vec<TypeSummary> {
        match class {
            DimorphismClass::Dimorphic => &mut self.dimorphic,
            DimorphismClass::MaleSpecific => &mut self.male,
            DimorphismClass::FemaleSpecific => &mut self.female,
            DimorphismClass::Isomorphic => &mut self.isomorphic,
        }
    }

    /// Every record, in class priority order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeSummary> {
        DimorphismClass::PRIORITY
            .into_iter()
            .flat_map(move |class| self.list(class).iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TypeSummary> {
        self.dimorphic
            .iter_mut()
            .chain(self.male.iter_mut())
            .chain(self.female.iter_mut())
            .chain(self.isomorphic.iter_mut())
    }

    pub fn len(&self) -> usize {
        self.dimorphic.len() + self.male.len() + self.female.len() + self.isomorphic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sexually dimorphic records only (everything but isomorphic).
    pub fn dimorphic_records(&self) -> impl Iterator<Item = &TypeSummary> {
        self.iter().filter(|record| record.is_dimorphic())
    }
}

/// File-system safe name for a type key.
pub fn type_file_name(key: &str) -> String {
    key.replace([' ', '/'], "_")
}
