use std::{borrow::Borrow, collections::HashSet};

use serde::{Deserialize, Serialize};

use crate::{Filter, Item, Metadata, Metric, metric};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
	#[serde(rename = "id")]
	pub item_id: String,
	pub score: f32,
	/// 1-based position in the result.
	pub rank: u32,
	#[serde(default)]
	pub metadata: Metadata,
}

/// Ordered by rank; scores never increase along the list and ids are unique.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
	pub items: Vec<RankedItem>,
}
impl RecommendationResult {
	pub fn len(&self) -> usize {
		self.items.len()
	}

	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	pub fn ids(&self) -> Vec<&str> {
		self.items.iter().map(|item| item.item_id.as_str()).collect()
	}
}

/// Scores every candidate that passes `filter`, orders by score descending with ties broken
/// by ascending id, and keeps the first `k`. Duplicate ids keep their first occurrence.
///
/// The output depends only on the arguments.
pub fn rank<C>(
	query: &[f32],
	candidates: &[C],
	k: usize,
	filter: &Filter,
	metric: Metric,
) -> RecommendationResult
where
	C: Borrow<Item>,
{
	if k == 0 {
		return RecommendationResult::default();
	}

	let mut seen = HashSet::new();
	let mut scored: Vec<(f32, &Item)> = Vec::with_capacity(candidates.len());

	for candidate in candidates {
		let item = candidate.borrow();

		if !seen.insert(item.id.as_str()) {
			continue;
		}
		if !filter.matches(&item.metadata) {
			continue;
		}
		if item.vector.len() != query.len() {
			continue;
		}

		scored.push((metric.score(query, &item.vector), item));
	}

	scored.sort_by(|(left_score, left), (right_score, right)| {
		metric::cmp_ranked(*left_score, &left.id, *right_score, &right.id)
	});
	scored.truncate(k);

	let items = scored
		.into_iter()
		.enumerate()
		.map(|(idx, (score, item))| RankedItem {
			item_id: item.id.clone(),
			score,
			rank: idx as u32 + 1,
			metadata: item.metadata.clone(),
		})
		.collect();

	RecommendationResult { items }
}
