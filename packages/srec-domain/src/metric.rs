use std::{cmp::Ordering, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// Similarity metric declared by a store. Higher scores are always more similar.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
	/// Cosine similarity in `[-1, 1]`. A zero-norm operand scores 0.
	#[default]
	Cosine,
	/// `1 / (1 + d)` where `d` is the L2 distance, so scores lie in `(0, 1]`.
	Euclidean,
}
impl Metric {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Cosine => "cosine",
			Self::Euclidean => "euclidean",
		}
	}

	/// Both slices must have the same length; callers validate dimensions first.
	pub fn score(self, query: &[f32], vector: &[f32]) -> f32 {
		debug_assert_eq!(query.len(), vector.len());

		match self {
			Self::Cosine => cosine(query, vector),
			Self::Euclidean => {
				let dist = query
					.iter()
					.zip(vector)
					.map(|(a, b)| {
						let diff = *a as f64 - *b as f64;

						diff * diff
					})
					.sum::<f64>()
					.sqrt();

				(1.0 / (1.0 + dist)) as f32
			},
		}
	}
}
impl fmt::Display for Metric {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for Metric {
	type Err = Error;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"cosine" => Ok(Self::Cosine),
			"euclidean" => Ok(Self::Euclidean),
			_ => Err(Error::UnknownMetric(raw.to_string())),
		}
	}
}

/// Ranking order: score descending, then id ascending.
pub fn cmp_ranked(left_score: f32, left_id: &str, right_score: f32, right_id: &str) -> Ordering {
	right_score.total_cmp(&left_score).then_with(|| left_id.cmp(right_id))
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
	let mut dot = 0.0_f64;
	let mut norm_a = 0.0_f64;
	let mut norm_b = 0.0_f64;

	for (x, y) in a.iter().zip(b) {
		let (x, y) = (*x as f64, *y as f64);

		dot += x * y;
		norm_a += x * x;
		norm_b += y * y;
	}

	if norm_a == 0.0 || norm_b == 0.0 {
		return 0.0;
	}

	// Adding zero folds -0.0 into 0.0 so `total_cmp` treats equal scores as ties.
	(dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32 + 0.0
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cosine_prefers_aligned_vectors() {
		let query = [1.0, 0.0, 0.0];

		assert!((Metric::Cosine.score(&query, &[1.0, 0.0, 0.0]) - 1.0).abs() < 1e-6);
		assert!(
			Metric::Cosine.score(&query, &[0.9, 0.1, 0.0])
				> Metric::Cosine.score(&query, &[-1.0, 0.0, 0.0])
		);
		assert_eq!(Metric::Cosine.score(&query, &[0.0, 0.0, 0.0]), 0.0);
	}

	#[test]
	fn euclidean_score_decreases_with_distance() {
		let query = [0.0, 0.0];

		assert_eq!(Metric::Euclidean.score(&query, &[0.0, 0.0]), 1.0);
		assert!((Metric::Euclidean.score(&query, &[3.0, 4.0]) - 1.0 / 6.0).abs() < 1e-6);
	}

	#[test]
	fn parses_case_insensitively() {
		assert_eq!("Cosine".parse::<Metric>(), Ok(Metric::Cosine));
		assert_eq!(" euclidean ".parse::<Metric>(), Ok(Metric::Euclidean));
		assert!(matches!("dot".parse::<Metric>(), Err(Error::UnknownMetric(_))));
	}

	#[test]
	fn ties_break_by_ascending_id() {
		assert_eq!(cmp_ranked(0.5, "b", 0.5, "a"), Ordering::Greater);
		assert_eq!(cmp_ranked(0.9, "z", 0.5, "a"), Ordering::Less);
	}
}
