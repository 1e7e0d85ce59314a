//! Leader clustering by cosine proximity.
//!
//! Vectors are visited in symbol id order; each joins the closest existing
//! cluster whose centroid is at least `threshold` similar, or starts a new
//! one. Clusters below `min_size` are dropped.

use super::embedding::cosine_similarity;
use super::types::{ClusterMember, SemanticCluster};
use crate::symbol::SymbolId;
use crate::ProjectId;
use std::collections::{BTreeMap, HashMap};

struct Draft {
    sum: Vec<f32>,
    members: Vec<usize>,
}

impl Draft {
    fn centroid(&self) -> Vec<f32> {
        let n = self.members.len().max(1) as f32;
        self.sum.iter().map(|x| x / n).collect()
    }
}

pub fn cluster_embeddings(
    project: ProjectId,
    embeddings: &[(SymbolId, Vec<f32>)],
    names: &HashMap<SymbolId, Vec<String>>,
    threshold: f32,
    min_size: usize,
) -> Vec<SemanticCluster> {
    let mut order: Vec<usize> = (0..embeddings.len()).collect();
    order.sort_by_key(|&i| embeddings[i].0);

    let mut drafts: Vec<Draft> = Vec::new();
    for i in order {
        let vector = &embeddings[i].1;
        if vector.iter().all(|x| *x == 0.0) {
            continue;
        }
        let closest = drafts
            .iter()
            .enumerate()
            .map(|(idx, d)| (idx, cosine_similarity(&d.centroid(), vector)))
            .filter(|(_, score)| *score >= threshold)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal).then(b.0.cmp(&a.0)));

        match closest {
            Some((idx, _)) => {
                let draft = &mut drafts[idx];
                for (s, x) in draft.sum.iter_mut().zip(vector) {
                    *s += x;
                }
                draft.members.push(i);
            }
            None => drafts.push(Draft {
                sum: vector.clone(),
                members: vec![i],
            }),
        }
    }

    drafts
        .into_iter()
        .filter(|d| d.members.len() >= min_size.max(2))
        .map(|draft| {
            let centroid = draft.centroid();
            let mut members: Vec<ClusterMember> = draft
                .members
                .iter()
                .map(|&i| ClusterMember {
                    symbol_id: embeddings[i].0,
                    score: cosine_similarity(&centroid, &embeddings[i].1),
                })
                .collect();
            members.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.symbol_id.cmp(&b.symbol_id))
            });
            let cohesion = members.iter().map(|m| m.score).sum::<f32>() / members.len() as f32;
            SemanticCluster {
                id: 0,
                project_id: project,
                label: label_for(&members, names),
                cohesion,
                members,
            }
        })
        .collect()
}

/// Most frequent name token among the members; ties go alphabetically.
fn label_for(members: &[ClusterMember], names: &HashMap<SymbolId, Vec<String>>) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for member in members {
        for token in names.get(&member.symbol_id).into_iter().flatten() {
            *counts.entry(token.as_str()).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(a.0)))
        .map(|(token, _)| token.to_string())
        .unwrap_or_else(|| "misc".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(index: usize, noise: f32) -> Vec<f32> {
        let mut v = vec![0.0; 8];
        v[index] = 1.0;
        v[(index + 1) % 8] = noise;
        v
    }

    #[test]
    fn test_groups_close_vectors() {
        let embeddings = vec![
            (SymbolId(1), unit(0, 0.0)),
            (SymbolId(2), unit(0, 0.1)),
            (SymbolId(3), unit(4, 0.0)),
            (SymbolId(4), unit(4, 0.05)),
            (SymbolId(5), unit(2, 0.0)),
        ];
        let names = HashMap::from([
            (SymbolId(1), vec!["load".to_string(), "user".to_string()]),
            (SymbolId(2), vec!["load".to_string(), "account".to_string()]),
        ]);

        let clusters = cluster_embeddings(7, &embeddings, &names, 0.85, 2);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].label, "load");
        assert_eq!(clusters[0].project_id, 7);
        assert!(clusters[0].cohesion > 0.95);
        let ids: Vec<SymbolId> = clusters[1].members.iter().map(|m| m.symbol_id).collect();
        assert!(ids.contains(&SymbolId(3)) && ids.contains(&SymbolId(4)));
    }

    #[test]
    fn test_singletons_are_dropped() {
        let embeddings = vec![(SymbolId(1), unit(0, 0.0)), (SymbolId(2), unit(3, 0.0))];
        assert!(cluster_embeddings(1, &embeddings, &HashMap::new(), 0.85, 2).is_empty());
    }
}
