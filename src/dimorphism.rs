use serde::{Deserialize, Serialize};
use std::fmt;

/// Sex-specificity of a neuron, read from the free-text `dimorphism` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DimorphismClass {
    Dimorphic,
    MaleSpecific,
    FemaleSpecific,
    Isomorphic,
}

impl DimorphismClass {
    /// Order used when the same join key shows up under several classes.
    pub const PRIORITY: [DimorphismClass; 4] = [
        DimorphismClass::Dimorphic,
        DimorphismClass::MaleSpecific,
        DimorphismClass::FemaleSpecific,
        DimorphismClass::Isomorphic,
    ];

    /// `female-specific` contains `male-specific`, so it is tested first.
    pub fn classify(tag: Option<&str>) -> Self {
        let Some(tag) = tag else {
            return DimorphismClass::Isomorphic;
        };
        let tag = tag.to_ascii_lowercase();
        if tag.contains("dimorphic") {
            DimorphismClass::Dimorphic
        } else if tag.contains("female-specific") {
            DimorphismClass::FemaleSpecific
        } else if tag.contains("male-specific") {
            DimorphismClass::MaleSpecific
        } else {
            DimorphismClass::Isomorphic
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DimorphismClass::Dimorphic => "dimorphic",
            DimorphismClass::MaleSpecific => "male-specific",
            DimorphismClass::FemaleSpecific => "female-specific",
            DimorphismClass::Isomorphic => "isomorphic",
        }
    }

    /// Whether MCNS rows anchor summaries of this class (FlyWire otherwise).
    pub fn is_mcns_anchored(&self) -> bool {
        !matches!(self, DimorphismClass::FemaleSpecific)
    }

    /// Template for the individual type page.
    pub fn template(&self) -> &'static str {
        match self {
            DimorphismClass::Dimorphic => "dimorphic_individual.md",
            DimorphismClass::MaleSpecific => "male_spec_individual.md",
            DimorphismClass::FemaleSpecific => "female_spec_individual.md",
            DimorphismClass::Isomorphic => "isomorphic_individual.md",
        }
    }
}

impl fmt::Display for DimorphismClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
