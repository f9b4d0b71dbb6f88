//! Cluster naming.
//!
//! Tags shared by at least half of a cluster's members name the cluster
//! (up to three, most frequent first, title-cased, joined with " + ").
//! Without a consensus the representative document's title is used verbatim.

use crate::documents::Document;
use std::collections::HashMap;

/// Name when the representative cannot be resolved among the members.
const UNNAMED_CLUSTER: &str = "Unnamed Cluster";

/// Maximum number of consensus tags in a name.
const MAX_NAME_TAGS: usize = 3;

pub fn cluster_name(members: &[&Document], representative_id: u64) -> String {
    if members.is_empty() {
        return UNNAMED_CLUSTER.to_string();
    }

    // tag -> occurrence count, first-seen order preserved for stable ties
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for document in members {
        for tag in &document.tags {
            let tag = tag.trim().to_lowercase();
            if tag.is_empty() {
                continue;
            }
            let count = counts.entry(tag.clone()).or_insert_with(|| {
                order.push(tag.clone());
                0
            });
            *count += 1;
        }
    }

    // a tag carried by at least half the members is a consensus tag
    let threshold = members.len() as f32 * 0.5;
    let mut consensus: Vec<(&String, usize)> = order
        .iter()
        .map(|tag| (tag, counts[tag]))
        .filter(|&(_, count)| count as f32 >= threshold)
        .collect();

    if !consensus.is_empty() {
        consensus.sort_by(|a, b| b.1.cmp(&a.1));
        return consensus
            .iter()
            .take(MAX_NAME_TAGS)
            .map(|(tag, _)| title_case(tag))
            .collect::<Vec<_>>()
            .join(" + ");
    }

    members
        .iter()
        .find(|document| document.id == representative_id)
        .map(|document| document.title.clone())
        .unwrap_or_else(|| UNNAMED_CLUSTER.to_string())
}

fn title_case(tag: &str) -> String {
    tag.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
