//! Type-level connectivity of one summary's neurons.

use crate::error::BuildResult;
use crate::loading::edges::FwEdge;
use crate::loading::neuprint::{Adjacency, Direction, NeuprintClient};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Summed synapse weight between two types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TypeEdge {
    pub pre_type: String,
    pub post_type: String,
    pub weight: u64,
}

/// Partners of a set of neurons, each list sorted by weight, heaviest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Connectivity {
    pub downstream: Vec<TypeEdge>,
    pub upstream: Vec<TypeEdge>,
}

impl Connectivity {
    pub fn is_empty(&self) -> bool {
        self.downstream.is_empty() && self.upstream.is_empty()
    }

    /// The `n` heaviest edges in each direction, without repeats.
    pub fn top(&self, n: usize) -> Vec<TypeEdge> {
        let mut seen = HashSet::new();
        self.downstream
            .iter()
            .take(n)
            .chain(self.upstream.iter().take(n))
            .filter(|edge| seen.insert((*edge).clone()))
            .cloned()
            .collect()
    }
}

/// Sum weights per `(pre_type, post_type)`, dropping unlabeled ends and
/// self-loops.
pub fn aggregate_by_type<'a, I>(edges: I) -> Vec<TypeEdge>
where
    I: IntoIterator<Item = (Option<&'a str>, Option<&'a str>, u64)>,
{
    let mut sums: HashMap<(&str, &str), u64> = HashMap::new();
    for (pre, post, weight) in edges {
        let (Some(pre), Some(post)) = (pre, post) else {
            continue;
        };
        if pre == post {
            continue;
        }
        *sums.entry((pre, post)).or_default() += weight;
    }
    let mut out: Vec<TypeEdge> = sums
        .into_iter()
        .map(|((pre, post), weight)| TypeEdge {
            pre_type: pre.to_string(),
            post_type: post.to_string(),
            weight,
        })
        .collect();
    out.sort_by(|a, b| {
        b.weight
            .cmp(&a.weight)
            .then_with(|| a.pre_type.cmp(&b.pre_type))
            .then_with(|| a.post_type.cmp(&b.post_type))
    });
    out
}

fn from_adjacencies(adjacencies: &[Adjacency]) -> Vec<TypeEdge> {
    aggregate_by_type(
        adjacencies
            .iter()
            .map(|a| (a.pre_type.as_deref(), a.post_type.as_deref(), a.weight)),
    )
}

/// MCNS partners from neuPrint.
pub async fn mcns_connectivity(client: &NeuprintClient, body_ids: &[u64]) -> BuildResult<Connectivity> {
    let down = client.fetch_adjacencies(body_ids, Direction::Downstream).await?;
    let up = client.fetch_adjacencies(body_ids, Direction::Upstream).await?;
    Ok(Connectivity {
        downstream: from_adjacencies(&down),
        upstream: from_adjacencies(&up),
    })
}

/// FlyWire partners from the preloaded edge list.
pub fn fw_connectivity(
    edges: &[FwEdge],
    types: &HashMap<u64, String>,
    root_ids: &[u64],
) -> Connectivity {
    let members: HashSet<u64> = root_ids.iter().copied().collect();
    let label = |id: u64| types.get(&id).map(String::as_str);
    let downstream = aggregate_by_type(
        edges
            .iter()
            .filter(|e| members.contains(&e.pre))
            .map(|e| (label(e.pre), label(e.post), e.weight)),
    );
    let upstream = aggregate_by_type(
        edges
            .iter()
            .filter(|e| members.contains(&e.post))
            .map(|e| (label(e.pre), label(e.post), e.weight)),
    );
    Connectivity { downstream, upstream }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(pre: u64, post: u64, weight: u64) -> FwEdge {
        FwEdge { pre, post, weight }
    }

    #[test]
    fn self_loops_and_unknown_partners_are_dropped() {
        let out = aggregate_by_type([
            (Some("A"), Some("A"), 50),
            (Some("A"), None, 40),
            (Some("A"), Some("B"), 3),
            (Some("A"), Some("B"), 4),
            (Some("A"), Some("C"), 9),
        ]);
        let weights: Vec<_> = out.iter().map(|e| (e.post_type.as_str(), e.weight)).collect();
        assert_eq!(weights, vec![("C", 9), ("B", 7)]);
    }

    #[test]
    fn flywire_partners_come_from_the_edge_list() {
        let types: HashMap<u64, String> = [(1, "A"), (2, "A"), (3, "B"), (4, "C")]
            .into_iter()
            .map(|(id, t)| (id, t.to_string()))
            .collect();
        let edges = [edge(1, 3, 10), edge(2, 3, 5), edge(4, 1, 8), edge(1, 2, 99), edge(3, 4, 1)];
        let conn = fw_connectivity(&edges, &types, &[1, 2]);
        assert_eq!(conn.downstream.len(), 1);
        assert_eq!(conn.downstream[0].weight, 15);
        assert_eq!(conn.upstream.len(), 1);
        assert_eq!(conn.upstream[0].pre_type, "C");
    }

    #[test]
    fn top_keeps_n_per_direction() {
        let conn = Connectivity {
            downstream: aggregate_by_type([
                (Some("A"), Some("B"), 3),
                (Some("A"), Some("C"), 2),
                (Some("A"), Some("D"), 1),
            ]),
            upstream: aggregate_by_type([(Some("E"), Some("A"), 5)]),
        };
        let top = conn.top(2);
        let posts: Vec<_> = top.iter().map(|e| e.post_type.as_str()).collect();
        assert_eq!(posts, vec!["B", "C", "A"]);
    }
}
