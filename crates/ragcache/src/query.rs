//! Retrieval over loaded trees and federated result merging.
//!
//! Retrieval ranks nodes by lexical overlap with the query; the
//! reported score is derived from the node's layer (`1/(1+0.2·layer)`)
//! so leaf content outranks summaries at equal relevance.

use std::collections::HashMap;

use serde::Serialize;

use crate::artifact::Tree;

/// Result text is truncated to this many characters.
const MAX_RESULT_TEXT: usize = 2000;

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub text: String,
    pub score: f64,
    pub layer: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub is_summary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_tree: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    pub index: usize,
    pub source: String,
    pub node_ids: Vec<String>,
}

pub fn score_for_layer(layer: u32) -> f64 {
    1.0 / (1.0 + 0.2 * layer as f64)
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(String::from)
        .collect()
}

/// Lexical relevance: fraction of query terms present in the node.
fn relevance(query_terms: &[String], text: &str) -> f64 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let node_terms: Vec<String> = tokenize(text);
    let matched = query_terms
        .iter()
        .filter(|t| node_terms.contains(t))
        .count();
    matched as f64 / query_terms.len() as f64
}

/// Retrieve up to `top_k` nodes for a query.
pub fn search_tree(tree: &Tree, query: &str, top_k: usize) -> Vec<SearchResult> {
    let query_terms = tokenize(query);

    let mut scored: Vec<(f64, &crate::artifact::TreeNode)> = tree
        .nodes
        .iter()
        .map(|node| (relevance(&query_terms, &node.text), node))
        .filter(|(rel, _)| *rel > 0.0)
        .collect();
    // Best relevance first; prefer leaves on ties, then stable by id.
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.layer.cmp(&b.1.layer))
            .then(a.1.id.cmp(&b.1.id))
    });

    scored
        .into_iter()
        .take(top_k)
        .map(|(_, node)| SearchResult {
            text: node.text.chars().take(MAX_RESULT_TEXT).collect(),
            score: score_for_layer(node.layer),
            layer: node.layer,
            node_id: Some(node.id.to_string()),
            is_summary: node.layer > 0,
            source_tree: None,
        })
        .collect()
}

/// Retrieval followed by extractive answer synthesis with citations.
pub fn answer_question(
    tree: &Tree,
    question: &str,
    top_k: usize,
) -> (String, Vec<String>, Vec<Citation>) {
    let results = search_tree(tree, question, top_k);

    let context_chunks: Vec<String> = results
        .iter()
        .map(|r| r.text.chars().take(500).collect())
        .collect();

    let answer = if results.is_empty() {
        "No relevant material found in the knowledge base.".to_string()
    } else {
        // Lead with the best chunk, then note the supporting ones.
        let mut answer = results[0].text.clone();
        if results.len() > 1 {
            answer.push_str(&format!(
                "\n\n({} supporting chunk(s) retrieved.)",
                results.len() - 1
            ));
        }
        answer
    };

    let mut citations = Vec::new();
    for (index, result) in results.iter().enumerate() {
        let source = result
            .node_id
            .as_deref()
            .and_then(|id| id.parse::<u32>().ok())
            .and_then(|id| tree.node(id))
            .and_then(|n| n.source.clone());
        if let Some(source) = source {
            citations.push(Citation {
                index,
                source,
                node_ids: result.node_id.clone().into_iter().collect(),
            });
        }
    }

    (answer, context_chunks, citations)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Federated merge
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    Score,
    RoundRobin,
    Weighted,
}

impl MergeStrategy {
    pub fn parse(s: &str) -> Self {
        match s {
            "round_robin" => MergeStrategy::RoundRobin,
            "weighted" => MergeStrategy::Weighted,
            _ => MergeStrategy::Score,
        }
    }
}

/// Merge per-tree result lists into one ranked list.
pub fn merge_results(
    mut all_results: Vec<SearchResult>,
    top_k: usize,
    strategy: MergeStrategy,
) -> Vec<SearchResult> {
    match strategy {
        MergeStrategy::RoundRobin => {
            let mut by_tree: Vec<(String, std::collections::VecDeque<SearchResult>)> = Vec::new();
            for result in all_results {
                let tree = result.source_tree.clone().unwrap_or_default();
                match by_tree.iter_mut().find(|(t, _)| *t == tree) {
                    Some((_, bucket)) => bucket.push_back(result),
                    None => by_tree.push((tree, std::collections::VecDeque::from([result]))),
                }
            }
            let mut merged = Vec::new();
            while merged.len() < top_k && by_tree.iter().any(|(_, b)| !b.is_empty()) {
                for (_, bucket) in by_tree.iter_mut() {
                    if merged.len() >= top_k {
                        break;
                    }
                    if let Some(result) = bucket.pop_front() {
                        merged.push(result);
                    }
                }
            }
            merged
        }
        MergeStrategy::Weighted => {
            // Weight by order of first appearance: the first tree keeps
            // full weight, each subsequent tree loses 0.1.
            let mut weights: HashMap<String, f64> = HashMap::new();
            for result in &all_results {
                let tree = result.source_tree.clone().unwrap_or_default();
                if !weights.contains_key(&tree) {
                    let weight = 1.0 - 0.1 * weights.len() as f64;
                    weights.insert(tree, weight);
                }
            }
            for result in &mut all_results {
                let tree = result.source_tree.clone().unwrap_or_default();
                result.score *= weights.get(&tree).copied().unwrap_or(1.0);
            }
            sort_by_score(&mut all_results);
            all_results.truncate(top_k);
            all_results
        }
        MergeStrategy::Score => {
            sort_by_score(&mut all_results);
            all_results.truncate(top_k);
            all_results
        }
    }
}

fn sort_by_score(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::TreeNode;

    fn tree() -> Tree {
        Tree {
            name: "k8s".into(),
            nodes: vec![
                TreeNode {
                    id: 0,
                    layer: 0,
                    text: "Crashloop pods usually mean an OOM kill or bad config.".into(),
                    source: Some("runbooks/pods.md".into()),
                    children: vec![],
                },
                TreeNode {
                    id: 1,
                    layer: 0,
                    text: "Networking: check service endpoints and DNS.".into(),
                    source: None,
                    children: vec![],
                },
                TreeNode {
                    id: 2,
                    layer: 1,
                    text: "Summary of pod troubleshooting including crashloop cases.".into(),
                    source: None,
                    children: vec![0, 1],
                },
            ],
            bytes: 1,
        }
    }

    fn result(tree: &str, score: f64) -> SearchResult {
        SearchResult {
            text: format!("{tree}:{score}"),
            score,
            layer: 0,
            node_id: None,
            is_summary: false,
            source_tree: Some(tree.into()),
        }
    }

    #[test]
    fn layer_score_formula() {
        assert_eq!(score_for_layer(0), 1.0);
        assert!((score_for_layer(1) - 1.0 / 1.2).abs() < 1e-9);
        assert!((score_for_layer(2) - 1.0 / 1.4).abs() < 1e-9);
    }

    #[test]
    fn search_ranks_relevant_leaves_first() {
        let tree = tree();
        let results = search_tree(&tree, "crashloop pods", 10);
        assert!(results.len() >= 2);
        assert_eq!(results[0].node_id.as_deref(), Some("0"));
        assert_eq!(results[0].score, 1.0);
        assert!(!results[0].is_summary);
        // The summary mentioning crashloop shows up with a layer score.
        let summary = results.iter().find(|r| r.is_summary).unwrap();
        assert!((summary.score - 1.0 / 1.2).abs() < 1e-9);
    }

    #[test]
    fn search_with_no_match_is_empty() {
        assert!(search_tree(&tree(), "quantum blockchain", 5).is_empty());
    }

    #[test]
    fn answer_carries_context_and_citations() {
        let (answer, chunks, citations) = answer_question(&tree(), "crashloop pods", 3);
        assert!(answer.contains("Crashloop pods"));
        assert!(!chunks.is_empty());
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].source, "runbooks/pods.md");
    }

    #[test]
    fn score_merge_sorts_globally() {
        let merged = merge_results(
            vec![result("a", 0.5), result("b", 0.9), result("a", 0.7)],
            2,
            MergeStrategy::Score,
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].score, 0.9);
        assert_eq!(merged[1].score, 0.7);
    }

    #[test]
    fn round_robin_interleaves_trees() {
        let merged = merge_results(
            vec![
                result("a", 0.9),
                result("a", 0.8),
                result("b", 0.7),
                result("b", 0.6),
            ],
            4,
            MergeStrategy::RoundRobin,
        );
        let trees: Vec<_> = merged
            .iter()
            .map(|r| r.source_tree.as_deref().unwrap())
            .collect();
        assert_eq!(trees, vec!["a", "b", "a", "b"]);
    }

    #[test]
    fn weighted_merge_decays_later_trees() {
        let merged = merge_results(
            vec![result("a", 0.8), result("b", 0.85)],
            2,
            MergeStrategy::Weighted,
        );
        // a keeps 1.0 weight, b gets 0.9: 0.8 > 0.85 * 0.9.
        assert_eq!(merged[0].source_tree.as_deref(), Some("a"));
        assert!((merged[1].score - 0.765).abs() < 1e-9);
    }

    #[test]
    fn strategy_parse_defaults_to_score() {
        assert_eq!(MergeStrategy::parse("round_robin"), MergeStrategy::RoundRobin);
        assert_eq!(MergeStrategy::parse("weighted"), MergeStrategy::Weighted);
        assert_eq!(MergeStrategy::parse("anything"), MergeStrategy::Score);
    }
}
