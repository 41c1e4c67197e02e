use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Embedder, Error, Result, auth_headers, truncate_on_char_boundary};
use engram_config::EmbeddingProviderConfig;
use engram_domain::BoxFuture;

/// HTTP client for `POST {api_base}{path}` embedding services.
///
/// The underlying client is built once with the configured timeout; there is no
/// "no timeout" mode.
pub struct HttpEmbedder {
	cfg: EmbeddingProviderConfig,
	client: Client,
}
impl HttpEmbedder {
	pub fn new(cfg: EmbeddingProviderConfig) -> Result<Self> {
		let client = Client::builder()
			.timeout(Duration::from_millis(cfg.timeout_ms))
			.build()
			.map_err(|err| Error::unavailable(format!("Failed to build HTTP client: {err}.")))?;

		Ok(Self { cfg, client })
	}

	pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
		if texts.is_empty() {
			return Ok(Vec::new());
		}

		let inputs: Vec<&str> = texts
			.iter()
			.map(|text| truncate_on_char_boundary(text, self.cfg.max_input_chars as usize))
			.collect();

		for input in &inputs {
			if input.trim().is_empty() {
				return Err(Error::bad_response("Embedding input must be non-empty."));
			}
		}

		let url = format!("{}{}", self.cfg.api_base, self.cfg.path);
		let body = serde_json::json!({
			"model": self.cfg.model,
			"input": inputs,
			"dimensions": self.cfg.dimensions,
		});
		let res = self
			.client
			.post(url)
			.headers(auth_headers(&self.cfg.api_key, &self.cfg.default_headers)?)
			.json(&body)
			.send()
			.await?;
		let res = res
			.error_for_status()
			.map_err(|err| Error::unavailable(format!("Embedding service refused: {err}.")))?;
		let json: Value = res
			.json()
			.await
			.map_err(|err| Error::bad_response(format!("Embedding body is not JSON: {err}.")))?;
		let vectors = parse_embedding_response(json, self.cfg.dimensions as usize)?;

		if vectors.len() != texts.len() {
			return Err(Error::bad_response(format!(
				"Expected {} embeddings, received {}.",
				texts.len(),
				vectors.len()
			)));
		}

		Ok(vectors)
	}
}
impl Embedder for HttpEmbedder {
	fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>> {
		Box::pin(async move {
			let inputs = [text.to_string()];
			let mut vectors = self.embed_batch(&inputs).await?;

			vectors
				.pop()
				.ok_or_else(|| Error::bad_response("Embedding response contained no vectors."))
		})
	}

	fn dimensions(&self) -> usize {
		self.cfg.dimensions as usize
	}
}

fn parse_embedding_response(json: Value, expected_dim: usize) -> Result<Vec<Vec<f32>>> {
	let data = json
		.get("data")
		.and_then(|v| v.as_array())
		.ok_or_else(|| Error::bad_response("Embedding response is missing data array."))?;
	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let embedding = item
			.get("embedding")
			.and_then(|v| v.as_array())
			.ok_or_else(|| Error::bad_response("Embedding item missing embedding array."))?;
		let mut vec = Vec::with_capacity(embedding.len());

		for value in embedding {
			let number = value
				.as_f64()
				.ok_or_else(|| Error::bad_response("Embedding value must be numeric."))?;

			vec.push(number as f32);
		}

		if vec.len() != expected_dim {
			return Err(Error::bad_response(format!(
				"Embedding dimension {} does not match configured dimensions {expected_dim}.",
				vec.len()
			)));
		}

		indexed.push((index, vec));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_embeddings_in_index_order() {
		let json = serde_json::json!({
			"data": [
				{ "index": 1, "embedding": [2.0, 3.0] },
				{ "index": 0, "embedding": [0.5, 1.5] }
			]
		});
		let parsed = parse_embedding_response(json, 2).expect("parse failed");

		assert_eq!(parsed.len(), 2);
		assert_eq!(parsed[0], vec![0.5, 1.5]);
		assert_eq!(parsed[1], vec![2.0, 3.0]);
	}

	#[test]
	fn rejects_missing_data_array() {
		let json = serde_json::json!({ "vectors": [] });

		assert!(matches!(
			parse_embedding_response(json, 2),
			Err(Error::BadResponse { .. })
		));
	}

	#[test]
	fn rejects_wrong_dimensionality() {
		let json = serde_json::json!({
			"data": [ { "index": 0, "embedding": [1.0, 2.0, 3.0] } ]
		});

		assert!(matches!(
			parse_embedding_response(json, 2),
			Err(Error::BadResponse { .. })
		));
	}

	#[test]
	fn rejects_non_numeric_values() {
		let json = serde_json::json!({
			"data": [ { "index": 0, "embedding": [1.0, "oops"] } ]
		});

		assert!(matches!(
			parse_embedding_response(json, 2),
			Err(Error::BadResponse { .. })
		));
	}
}
