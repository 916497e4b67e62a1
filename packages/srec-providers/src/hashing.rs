//! Offline text embedding by signed feature hashing.
//!
//! Text is NFKC-normalized and lowercased, split into Unicode words, and each word adds ±1 to a
//! blake3-selected bucket. The result is L2-normalized, so texts sharing vocabulary score high
//! under cosine similarity.

use srec_domain::EmbedSource;
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

pub fn embed(sources: &[EmbedSource], dimension: usize) -> Vec<Vec<f32>> {
	sources.iter().map(|source| embed_text(&source.text(), dimension)).collect()
}

/// A text without words maps to the zero vector.
pub fn embed_text(text: &str, dimension: usize) -> Vec<f32> {
	let mut vector = vec![0.0_f32; dimension];

	if dimension == 0 {
		return vector;
	}

	let normalized = text.nfkc().collect::<String>().to_lowercase();

	for word in normalized.unicode_words() {
		let hash = blake3::hash(word.as_bytes());
		let bytes = hash.as_bytes();
		let mut head = [0_u8; 8];

		head.copy_from_slice(&bytes[..8]);

		let bucket = (u64::from_le_bytes(head) % dimension as u64) as usize;
		let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };

		vector[bucket] += sign;
	}

	let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();

	if norm > 0.0 {
		for value in &mut vector {
			*value /= norm;
		}
	}

	vector
}

#[cfg(test)]
mod tests {
	use super::*;

	fn dot(a: &[f32], b: &[f32]) -> f32 {
		a.iter().zip(b).map(|(x, y)| x * y).sum()
	}

	#[test]
	fn vectors_are_deterministic_and_unit_length() {
		let first = embed_text("Memory chips and foundry services", 64);
		let second = embed_text("Memory chips and foundry services", 64);
		let norm = dot(&first, &first).sqrt();

		assert_eq!(first, second);
		assert_eq!(first.len(), 64);
		assert!((norm - 1.0).abs() < 1e-5);
	}

	#[test]
	fn word_order_case_and_width_do_not_matter() {
		let plain = embed_text("battery materials", 128);
		let shuffled = embed_text("MATERIALS Battery", 128);
		let fullwidth = embed_text("ｂａｔｔｅｒｙ materials", 128);

		assert!((dot(&plain, &shuffled) - 1.0).abs() < 1e-5);
		assert!((dot(&plain, &fullwidth) - 1.0).abs() < 1e-5);
	}

	#[test]
	fn text_without_words_is_the_zero_vector() {
		assert!(embed_text("  ,.;  ", 16).iter().all(|value| *value == 0.0));
	}
}
