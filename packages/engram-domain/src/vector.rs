pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
	if a.len() != b.len() || a.is_empty() {
		return 0.0;
	}

	let mut dot = 0.0_f32;
	let mut norm_a = 0.0_f32;
	let mut norm_b = 0.0_f32;

	for (x, y) in a.iter().zip(b.iter()) {
		dot += x * y;
		norm_a += x * x;
		norm_b += y * y;
	}

	if norm_a == 0.0 || norm_b == 0.0 {
		return 0.0;
	}

	dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Scales the vector to unit length in place. Zero vectors are left untouched.
pub fn normalize(vec: &mut [f32]) {
	let norm = vec.iter().map(|value| value * value).sum::<f32>().sqrt();

	if norm == 0.0 {
		return;
	}

	for value in vec.iter_mut() {
		*value /= norm;
	}
}

pub fn normalized(mut vec: Vec<f32>) -> Vec<f32> {
	normalize(&mut vec);

	vec
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cosine_of_identical_vectors_is_one() {
		let vec = vec![0.3, -0.5, 0.8];

		assert!((cosine_similarity(&vec, &vec) - 1.0).abs() < 1e-6);
	}

	#[test]
	fn cosine_of_orthogonal_vectors_is_zero() {
		assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
	}

	#[test]
	fn cosine_handles_zero_and_mismatched_inputs() {
		assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
		assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
	}

	#[test]
	fn normalized_vector_has_unit_length() {
		let vec = normalized(vec![3.0, 4.0]);
		let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();

		assert!((norm - 1.0).abs() < 1e-6);
		assert!((vec[0] - 0.6).abs() < 1e-6);
	}
}
