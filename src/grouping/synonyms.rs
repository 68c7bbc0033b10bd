//! Literature synonyms of cell types.
//!
//! Annotations read `"Author Year[; Author Year...]: Synonym"`; several such
//! entries may follow each other separated by `;`, e.g.
//! `"Cachero 2010; Yu 2010: aSP-a; Kohl 2013: pMP4"`.

use super::{MemberCounts, group_scene_url, sort_members};
use crate::scene::SceneSet;
use crate::summary::{TypeData, TypeSummary, type_file_name};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Surname(s), optional "et al." and a four digit year with optional suffix.
static PUBLICATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\p{Lu}[\p{L}'’.\-]*(?:\s+(?:and|&)\s+\p{Lu}[\p{L}'’.\-]*)?(?:\s+et\s+al\.?)?,?\s+(?:1[89]|20)\d{2}[a-z]?$")
        .expect("publication regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynonymEntry {
    pub synonym: String,
    pub publications: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynonymGroup {
    pub synonym: String,
    pub file: String,
    pub publications: Vec<String>,
    pub members: Vec<TypeSummary>,
    pub counts: MemberCounts,
    /// Any member outside the isomorphic class.
    pub has_dimorphic: bool,
    pub scene_url: Option<String>,
}

pub fn is_publication(text: &str) -> bool {
    PUBLICATION.is_match(text)
}

/// Parse one annotation. Values without `:` carry no synonym and yield
/// nothing; malformed entries are logged and skipped.
pub fn parse_synonyms(value: &str) -> Vec<SynonymEntry> {
    if !value.contains(':') {
        return Vec::new();
    }
    let mut entries = Vec::new();
    let mut pending: Vec<String> = Vec::new();
    let mut malformed = false;
    for part in value.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((author, synonym)) = part.split_once(':') else {
            if is_publication(part) {
                pending.push(part.to_string());
            } else {
                warn!(value = %value, part = %part, "unrecognised publication in synonym annotation");
                malformed = true;
            }
            continue;
        };
        let (author, synonym) = (author.trim(), synonym.trim());
        let valid = is_publication(author) && !synonym.is_empty() && !malformed;
        if valid {
            pending.push(author.to_string());
            entries.push(SynonymEntry {
                synonym: synonym.to_string(),
                publications: std::mem::take(&mut pending),
            });
        } else {
            warn!(value = %value, entry = %part, "skipping malformed synonym entry");
            pending.clear();
        }
        malformed = false;
    }
    if !pending.is_empty() {
        warn!(value = %value, "publications without a synonym");
    }
    entries
}

/// Collect every parsed synonym across all summaries.
pub fn group_by_synonyms(data: &TypeData, scenes: Option<&SceneSet>) -> Vec<SynonymGroup> {
    let mut buckets: BTreeMap<String, (BTreeSet<String>, Vec<TypeSummary>)> = BTreeMap::new();
    for record in data.iter() {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        for entry in record.synonyms.iter().flat_map(|value| parse_synonyms(value)) {
            let (publications, members) = buckets.entry(entry.synonym.clone()).or_default();
            publications.extend(entry.publications);
            if seen.insert(entry.synonym) {
                members.push(record.clone());
            }
        }
    }

    buckets
        .into_iter()
        .map(|(synonym, (publications, mut members))| {
            sort_members(&mut members);
            SynonymGroup {
                file: type_file_name(&synonym),
                publications: publications.into_iter().collect(),
                counts: MemberCounts::of(&members),
                has_dimorphic: members.iter().any(TypeSummary::is_dimorphic),
                scene_url: group_scene_url(scenes, &synonym, &members),
                synonym,
                members,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimorphism::DimorphismClass;
    use crate::aggregate::{LinkContext, extract_type_data};
    use crate::frame::Frame;
    use crate::grouping::test_support::summary;
    use crate::links::NeuprintLinks;
    use crate::rois::RoiHierarchy;
    use serde_json::json;

    #[test]
    fn single_publication() {
        let entries = parse_synonyms("Smith 2020: FooType");
        assert_eq!(
            entries,
            vec![SynonymEntry {
                synonym: "FooType".into(),
                publications: vec!["Smith 2020".into()],
            }]
        );
    }

    #[test]
    fn several_publications_share_a_synonym() {
        let entries = parse_synonyms("Smith 2020; Jones 2021: FooType");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].publications, vec!["Smith 2020", "Jones 2021"]);
    }

    #[test]
    fn several_synonyms_in_one_value() {
        let entries = parse_synonyms("Cachero et al. 2010: aSP-a; Kohl 2013: pMP4");
        let names: Vec<_> = entries.iter().map(|e| e.synonym.as_str()).collect();
        assert_eq!(names, vec!["aSP-a", "pMP4"]);
    }

    #[test]
    fn values_without_colon_are_ignored() {
        assert!(parse_synonyms("Smith 2020 FooType").is_empty());
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let entries = parse_synonyms("not a citation: Foo; Lee 2019: Bar; Kim: Baz");
        let names: Vec<_> = entries.iter().map(|e| e.synonym.as_str()).collect();
        assert_eq!(names, vec!["Bar"]);
    }

    #[test]
    fn groups_track_dimorphic_members() {
        let data = TypeData {
            male: vec![summary("A", DimorphismClass::MaleSpecific, json!({"synonyms": "Smith 2020: Foo"}))],
            isomorphic: vec![
                summary("B", DimorphismClass::Isomorphic, json!({"synonyms": "Jones 2021: Foo"})),
                summary("C", DimorphismClass::Isomorphic, json!({"synonyms": "Jones 2021: Bar"})),
            ],
            ..TypeData::default()
        };
        let groups = group_by_synonyms(&data, None);
        assert_eq!(groups.len(), 2);
        let foo = groups.iter().find(|g| g.synonym == "Foo").expect("Foo");
        assert_eq!(foo.members.len(), 2);
        assert_eq!(foo.publications, vec!["Jones 2021", "Smith 2020"]);
        assert!(foo.has_dimorphic);
        let bar = groups.iter().find(|g| g.synonym == "Bar").expect("Bar");
        assert!(!bar.has_dimorphic);
    }

    #[test]
    fn neurons_of_one_type_with_different_synonyms() {
        let mcns: Frame = [
            json!({"bodyId": 1, "type": "A", "mapping": "A", "synonyms": "Smith 2020: Foo"}),
            json!({"bodyId": 2, "type": "A", "mapping": "A", "synonyms": "Jones 2021: Bar"}),
        ]
        .iter()
        .map(|v| v.as_object().cloned().expect("object"))
        .collect();
        let links = LinkContext {
            neuprint: NeuprintLinks::new("https://neuprint.example", "cns"),
            scenes: None,
        };
        let data = extract_type_data(&mcns, &Frame::default(), &RoiHierarchy::default(), &links);
        let groups = group_by_synonyms(&data, None);
        let names: Vec<_> = groups.iter().map(|g| g.synonym.as_str()).collect();
        assert_eq!(names, vec!["Bar", "Foo"]);
        assert_eq!(groups[0].publications, vec!["Jones 2021"]);
        assert!(groups.iter().all(|g| g.members.len() == 1));
    }
}
