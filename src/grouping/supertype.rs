use super::{MemberCounts, group_scene_url, sort_members};
use crate::collapse::split_members;
use crate::scene::SceneSet;
use crate::summary::{TypeData, TypeSummary, type_file_name};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Separates supertypes inside one value. Matches the collapse delimiter so a
/// type whose neurons disagree joins every supertype they name.
pub const SUPERTYPE_SEPARATOR: char = ',';

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupertypeGroup {
    pub name: String,
    pub file: String,
    /// Group made from a single type without a supertype annotation.
    pub singleton: bool,
    pub members: Vec<TypeSummary>,
    pub counts: MemberCounts,
    pub dimorphic: bool,
    pub scene_url: Option<String>,
}

fn supertypes_of(record: &TypeSummary) -> Vec<String> {
    ["supertype", "super_type"]
        .iter()
        .find_map(|column| record.column_str(column))
        .map(|value| {
            split_members(value, SUPERTYPE_SEPARATOR)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Bucket sexually dimorphic summaries by supertype.
pub fn group_by_supertype(data: &TypeData, scenes: Option<&SceneSet>) -> Vec<SupertypeGroup> {
    let mut buckets: BTreeMap<(String, bool), Vec<TypeSummary>> = BTreeMap::new();
    for record in data.dimorphic_records() {
        let names = supertypes_of(record);
        if names.is_empty() {
            let name = record
                .min_id()
                .map(|id| id.to_string())
                .unwrap_or_else(|| record.key.clone());
            debug!(key = %record.key, group = %name, "type has no supertype, using singleton group");
            buckets.entry((name, true)).or_default().push(record.clone());
            continue;
        }
        for name in names {
            buckets.entry((name, false)).or_default().push(record.clone());
        }
    }

    buckets
        .into_iter()
        .map(|((name, singleton), mut members)| {
            sort_members(&mut members);
            SupertypeGroup {
                file: type_file_name(&name),
                counts: MemberCounts::of(&members),
                dimorphic: members.iter().any(TypeSummary::is_dimorphic),
                scene_url: group_scene_url(scenes, &name, &members),
                name,
                singleton,
                members,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimorphism::DimorphismClass;
    use crate::grouping::test_support::summary;
    use serde_json::json;

    #[test]
    fn multi_valued_supertypes_join_each_group() {
        let data = TypeData {
            dimorphic: vec![
                summary("A", DimorphismClass::Dimorphic, json!({"supertype": "SA1, SA2"})),
                summary("B", DimorphismClass::Dimorphic, json!({"supertype": "SA2"})),
            ],
            ..TypeData::default()
        };
        let groups = group_by_supertype(&data, None);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "SA1");
        assert_eq!(groups[0].members.len(), 1);
        assert_eq!(groups[1].name, "SA2");
        assert_eq!(groups[1].members.len(), 2);
        assert!(groups[1].dimorphic);
    }

    #[test]
    fn missing_supertype_becomes_singleton_named_by_min_id() {
        let mut record = summary("C", DimorphismClass::MaleSpecific, json!({"supertype": "N/A"}));
        record.body_ids = vec![42, 7];
        let data = TypeData {
            male: vec![record],
            ..TypeData::default()
        };
        let groups = group_by_supertype(&data, None);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "7");
        assert!(groups[0].singleton);
    }
}
