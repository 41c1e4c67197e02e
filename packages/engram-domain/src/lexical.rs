use std::collections::HashSet;

pub fn tokenize_query(query: &str, max_terms: usize) -> Vec<String> {
	let mut normalized = String::with_capacity(query.len());

	for ch in query.chars() {
		if ch.is_ascii_alphanumeric() {
			normalized.push(ch.to_ascii_lowercase());
		} else {
			normalized.push(' ');
		}
	}

	let mut out = Vec::new();
	let mut seen = HashSet::new();

	for token in normalized.split_whitespace() {
		if token.len() < 2 {
			continue;
		}
		if seen.insert(token) {
			out.push(token.to_string());
		}
		if out.len() >= max_terms {
			break;
		}
	}

	out
}

pub fn tokenize_text_terms(text: &str, max_terms: usize) -> HashSet<String> {
	if max_terms == 0 {
		return HashSet::new();
	}

	let mut normalized = String::with_capacity(text.len());

	for ch in text.chars() {
		if ch.is_ascii_alphanumeric() {
			normalized.push(ch.to_ascii_lowercase());
		} else {
			normalized.push(' ');
		}
	}

	let mut out = HashSet::new();

	for token in normalized.split_whitespace() {
		if token.len() < 2 {
			continue;
		}

		out.insert(token.to_string());

		if out.len() >= max_terms {
			break;
		}
	}

	out
}

/// Share of query tokens that appear in the candidate text; the default secondary
/// relevance signal when no cross-encoder provider is configured.
pub fn lexical_overlap_ratio(query_tokens: &[String], text: &str, max_text_terms: usize) -> f32 {
	if query_tokens.is_empty() {
		return 0.0;
	}

	let text_terms = tokenize_text_terms(text, max_text_terms);

	if text_terms.is_empty() {
		return 0.0;
	}

	let mut matched = 0_usize;

	for token in query_tokens {
		if text_terms.contains(token.as_str()) {
			matched += 1;
		}
	}

	matched as f32 / query_tokens.len() as f32
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tokenize_query_lowercases_dedups_and_caps() {
		let tokens = tokenize_query("Tea, TEA, green tea ceremony!", 3);

		assert_eq!(tokens, vec!["tea", "green", "ceremony"]);
	}

	#[test]
	fn single_char_tokens_are_dropped() {
		let tokens = tokenize_query("a b cd", 8);

		assert_eq!(tokens, vec!["cd"]);
	}

	#[test]
	fn overlap_ratio_counts_matched_query_tokens() {
		let tokens = tokenize_query("green tea ceremony", 8);
		let ratio = lexical_overlap_ratio(&tokens, "Enjoys green tea in the morning.", 32);

		assert!((ratio - 2.0 / 3.0).abs() < 1e-6);
	}

	#[test]
	fn overlap_ratio_is_zero_without_query_tokens_or_text() {
		assert_eq!(lexical_overlap_ratio(&[], "anything", 32), 0.0);
		assert_eq!(lexical_overlap_ratio(&["tea".to_string()], "", 32), 0.0);
	}
}
