use time::{Duration, OffsetDateTime};

/// Exponential half-life decay on the time since a record was last accessed.
///
/// Returns a factor in (0, 1]; monotonically non-increasing in elapsed time, so an
/// unused memory can only rank lower than an equally similar fresh one.
pub fn recency_decay(last_accessed_at: OffsetDateTime, now: OffsetDateTime, half_life_days: f32) -> f32 {
	if half_life_days <= 0.0 {
		return 1.0;
	}

	let age_days = age_days(now - last_accessed_at);

	(-age_days / half_life_days * std::f32::consts::LN_2).exp()
}

pub fn composite_score(similarity: f32, importance: f32, decay: f32) -> f32 {
	similarity.clamp(-1.0, 1.0) * importance.clamp(0.0, 1.0) * decay.clamp(0.0, 1.0)
}

fn age_days(elapsed: Duration) -> f32 {
	(elapsed.as_seconds_f32() / 86_400.0).max(0.0)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decay_is_one_at_zero_age() {
		let now = OffsetDateTime::now_utc();

		assert!((recency_decay(now, now, 30.0) - 1.0).abs() < 1e-6);
	}

	#[test]
	fn decay_halves_after_one_half_life() {
		let now = OffsetDateTime::now_utc();
		let then = now - Duration::days(30);

		assert!((recency_decay(then, now, 30.0) - 0.5).abs() < 1e-3);
	}

	#[test]
	fn decay_is_monotonically_non_increasing() {
		let now = OffsetDateTime::now_utc();
		let mut previous = f32::INFINITY;

		for days in [0_i64, 1, 7, 30, 365, 3_650] {
			let decay = recency_decay(now - Duration::days(days), now, 30.0);

			assert!(decay <= previous);
			assert!(decay > 0.0);

			previous = decay;
		}
	}

	#[test]
	fn future_access_times_do_not_boost_above_one() {
		let now = OffsetDateTime::now_utc();

		assert!(recency_decay(now + Duration::days(2), now, 30.0) <= 1.0);
	}

	#[test]
	fn fresher_access_scores_higher_at_equal_similarity_and_importance() {
		let now = OffsetDateTime::now_utc();
		let fresh = recency_decay(now - Duration::hours(1), now, 30.0);
		let stale = recency_decay(now - Duration::days(90), now, 30.0);

		assert!(composite_score(0.8, 0.5, fresh) > composite_score(0.8, 0.5, stale));
	}
}
