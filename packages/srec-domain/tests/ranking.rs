use std::sync::Arc;

use srec_domain::{Filter, Item, Metadata, MetadataValue, Metric, Predicate, rank};

fn item(id: &str, vector: &[f32]) -> Item {
	Item::new(id, vector.to_vec(), Metadata::new())
}

fn item_with(id: &str, vector: &[f32], market: &str) -> Item {
	let mut metadata = Metadata::new();

	metadata.insert("market".to_string(), MetadataValue::from(market));

	Item::new(id, vector.to_vec(), metadata)
}

fn abc() -> Vec<Item> {
	vec![item("C", &[-1.0, 0.0, 0.0]), item("B", &[0.9, 0.1, 0.0]), item("A", &[1.0, 0.0, 0.0])]
}

#[test]
fn nearest_two_of_three_under_cosine() {
	let result = rank(&[1.0, 0.0, 0.0], &abc(), 2, &Filter::default(), Metric::Cosine);

	assert_eq!(result.ids(), vec!["A", "B"]);
	assert_eq!(result.items[0].rank, 1);
	assert_eq!(result.items[1].rank, 2);
}

#[test]
fn ranking_is_deterministic_including_ties() {
	let candidates = vec![
		item("d", &[0.0, 1.0]),
		item("b", &[1.0, 0.0]),
		item("c", &[1.0, 0.0]),
		item("a", &[1.0, 0.0]),
	];
	let first = rank(&[1.0, 0.0], &candidates, 4, &Filter::default(), Metric::Cosine);
	let second = rank(&[1.0, 0.0], &candidates, 4, &Filter::default(), Metric::Cosine);

	assert_eq!(first, second);
	assert_eq!(first.ids(), vec!["a", "b", "c", "d"]);
}

#[test]
fn result_never_exceeds_k_and_fills_k_when_possible() {
	let candidates: Vec<Item> =
		(0..10).map(|idx| item(&format!("s{idx:02}"), &[idx as f32, 1.0])).collect();

	for k in 1..=12 {
		let result = rank(&[1.0, 1.0], &candidates, k, &Filter::default(), Metric::Euclidean);

		assert_eq!(result.len(), k.min(candidates.len()));
	}
}

#[test]
fn scores_are_monotonically_non_increasing() {
	let candidates: Vec<Item> = (0..32)
		.map(|idx| {
			let angle = idx as f32 * 0.2;

			item(&format!("s{idx:02}"), &[angle.cos(), angle.sin(), 0.5])
		})
		.collect();
	let result = rank(&[0.3, 0.7, 0.1], &candidates, 32, &Filter::default(), Metric::Cosine);

	for pair in result.items.windows(2) {
		assert!(pair[0].score >= pair[1].score);
	}
}

#[test]
fn filters_apply_before_truncation() {
	let candidates = vec![
		item_with("A", &[1.0, 0.0], "KOSPI"),
		item_with("B", &[0.9, 0.1], "KOSDAQ"),
		item_with("C", &[0.5, 0.5], "KOSDAQ"),
	];
	let filter = Filter::new(vec![Predicate::Eq {
		field: "market".to_string(),
		value: MetadataValue::from("KOSDAQ"),
	}])
	.expect("valid filter");
	let result = rank(&[1.0, 0.0], &candidates, 2, &filter, Metric::Cosine);

	assert_eq!(result.ids(), vec!["B", "C"]);
	assert_eq!(result.items[0].metadata["market"], MetadataValue::from("KOSDAQ"));
}

#[test]
fn fewer_survivors_than_k_is_not_an_error() {
	let filter = Filter::new(vec![Predicate::In {
		field: "market".to_string(),
		values: vec![MetadataValue::from("NYSE")],
	}])
	.expect("valid filter");
	let result = rank(&[1.0, 0.0, 0.0], &abc(), 5, &filter, Metric::Cosine);

	assert!(result.is_empty());
}

#[test]
fn duplicate_candidates_collapse() {
	let candidates = vec![
		Arc::new(item("A", &[1.0, 0.0])),
		Arc::new(item("A", &[1.0, 0.0])),
		Arc::new(item("B", &[0.0, 1.0])),
	];
	let result = rank(&[1.0, 0.0], &candidates, 3, &Filter::default(), Metric::Cosine);

	assert_eq!(result.ids(), vec!["A", "B"]);
}

#[test]
fn result_serializes_with_public_field_names() {
	let result = rank(&[1.0, 0.0, 0.0], &abc(), 1, &Filter::default(), Metric::Cosine);
	let json = serde_json::to_value(&result).expect("encode failed");

	assert_eq!(json["items"][0]["id"], "A");
	assert_eq!(json["items"][0]["rank"], 1);
}
