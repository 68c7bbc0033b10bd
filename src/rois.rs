//! ROI hierarchy and the three coarse compartments used for region pages.

use crate::error::{BuildError, BuildResult};
use crate::frame::{Frame, Row, str_col};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Compartment {
    Optic,
    #[serde(rename = "VNC")]
    Vnc,
    CentralBrain,
}

impl Compartment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Compartment::Optic => "Optic",
            Compartment::Vnc => "VNC",
            Compartment::CentralBrain => "CentralBrain",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "Optic" => Some(Compartment::Optic),
            "VNC" => Some(Compartment::Vnc),
            "CentralBrain" => Some(Compartment::CentralBrain),
            _ => None,
        }
    }

    /// Compartment implied by a ROI's own name, if any.
    pub fn from_name(name: &str) -> Option<Self> {
        let base = name
            .trim_end_matches('*')
            .trim_end_matches("(R)")
            .trim_end_matches("(L)")
            .trim();
        const OPTIC: &[&str] = &["ME", "LO", "LOP", "LA", "AME", "OL", "OpticLobe"];
        if OPTIC.contains(&base) || base.starts_with("OL_") || base.starts_with("Optic") {
            Some(Compartment::Optic)
        } else if base == "VNC" || base.starts_with("VNC") {
            Some(Compartment::Vnc)
        } else if base == "CentralBrain" || base == "CB" {
            Some(Compartment::CentralBrain)
        } else {
            None
        }
    }
}

impl fmt::Display for Compartment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoiNode {
    pub name: String,
    pub parent: Option<String>,
    pub compartment: Compartment,
    pub primary: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoiHierarchy {
    nodes: IndexMap<String, RoiNode>,
}

impl RoiHierarchy {
    /// Build from neuPrint's nested `{"name", "children"}` tree. Primary ROIs
    /// are the `*`-marked names plus `primary`; with neither, the leaves.
    pub fn from_tree(tree: &Value, primary: &[String]) -> BuildResult<Self> {
        let mut hierarchy = RoiHierarchy::default();
        hierarchy.visit(tree, None, Compartment::CentralBrain)?;
        for name in primary {
            if let Some(node) = hierarchy.nodes.get_mut(name.trim_end_matches('*')) {
                node.primary = true;
            }
        }
        if !hierarchy.nodes.values().any(|node| node.primary) {
            let parents: Vec<String> = hierarchy
                .nodes
                .values()
                .filter_map(|node| node.parent.clone())
                .collect();
            for node in hierarchy.nodes.values_mut() {
                node.primary = !parents.contains(&node.name);
            }
        }
        Ok(hierarchy)
    }

    fn visit(
        &mut self,
        node: &Value,
        parent: Option<&str>,
        inherited: Compartment,
    ) -> BuildResult<()> {
        let name = node
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| BuildError::decode("ROI hierarchy", "node without a name"))?
            .trim_end_matches('*')
            .to_string();
        let compartment = Compartment::from_name(&name).unwrap_or(inherited);
        let primary = node
            .get("name")
            .and_then(Value::as_str)
            .is_some_and(|n| n.ends_with('*'));
        self.nodes.insert(
            name.clone(),
            RoiNode {
                name: name.clone(),
                parent: parent.map(str::to_string),
                compartment,
                primary,
            },
        );
        if let Some(children) = node.get("children").and_then(Value::as_array) {
            for child in children {
                self.visit(child, Some(&name), compartment)?;
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, roi: &str) -> Option<&RoiNode> {
        self.nodes.get(roi)
    }

    /// Unknown ROIs are never primary; an empty hierarchy accepts everything.
    pub fn is_primary(&self, roi: &str) -> bool {
        if self.nodes.is_empty() {
            return true;
        }
        self.nodes.get(roi).is_some_and(|node| node.primary)
    }

    pub fn compartment(&self, roi: &str) -> Compartment {
        self.nodes
            .get(roi)
            .map(|node| node.compartment)
            .or_else(|| Compartment::from_name(roi))
            .unwrap_or(Compartment::CentralBrain)
    }

    pub fn to_frame(&self) -> Frame {
        self.nodes
            .values()
            .map(|node| {
                let row = json!({
                    "roi": node.name,
                    "parent": node.parent,
                    "compartment": node.compartment.as_str(),
                    "primary": node.primary,
                });
                match row {
                    Value::Object(map) => map,
                    _ => Row::new(),
                }
            })
            .collect()
    }

    pub fn from_frame(frame: &Frame) -> BuildResult<Self> {
        let mut nodes = IndexMap::new();
        for row in frame.rows() {
            let name = str_col(row, "roi")
                .ok_or_else(|| BuildError::decode("ROI cache", "row without roi"))?
                .to_string();
            let compartment = str_col(row, "compartment")
                .and_then(Compartment::parse)
                .ok_or_else(|| {
                    BuildError::decode("ROI cache", format!("bad compartment for {name}"))
                })?;
            nodes.insert(
                name.clone(),
                RoiNode {
                    name,
                    parent: str_col(row, "parent").map(str::to_string),
                    compartment,
                    primary: row.get("primary").and_then(Value::as_bool).unwrap_or(false),
                },
            );
        }
        Ok(Self { nodes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> Value {
        json!({
            "name": "CNS",
            "children": [
                {"name": "CentralBrain", "children": [
                    {"name": "LAL(R)*"},
                    {"name": "SMP(R)*"}
                ]},
                {"name": "OL(R)", "children": [
                    {"name": "ME(R)*", "children": [{"name": "ME_R_layer_01"}]}
                ]},
                {"name": "VNC", "children": [{"name": "LegNp(T1)(R)*"}]}
            ]
        })
    }

    #[test]
    fn compartments_are_inherited_from_ancestors() {
        let h = RoiHierarchy::from_tree(&tree(), &[]).expect("hierarchy");
        assert_eq!(h.compartment("LAL(R)"), Compartment::CentralBrain);
        assert_eq!(h.compartment("ME_R_layer_01"), Compartment::Optic);
        assert_eq!(h.compartment("LegNp(T1)(R)"), Compartment::Vnc);
    }

    #[test]
    fn star_marks_primary_rois() {
        let h = RoiHierarchy::from_tree(&tree(), &[]).expect("hierarchy");
        assert!(h.is_primary("ME(R)"));
        assert!(!h.is_primary("ME_R_layer_01"));
        assert!(!h.is_primary("CentralBrain"));
    }

    #[test]
    fn explicit_primary_list_adds_to_marks() {
        let h = RoiHierarchy::from_tree(&tree(), &["ME_R_layer_01".to_string()])
            .expect("hierarchy");
        assert!(h.is_primary("ME_R_layer_01"));
    }

    #[test]
    fn cache_frame_restores_hierarchy() {
        let h = RoiHierarchy::from_tree(&tree(), &[]).expect("hierarchy");
        let back = RoiHierarchy::from_frame(&h.to_frame()).expect("from frame");
        assert_eq!(back, h);
    }
}
