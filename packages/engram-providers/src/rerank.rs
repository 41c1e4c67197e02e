use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Reranker, Result, auth_headers};
use engram_config::RerankProviderConfig;
use engram_domain::BoxFuture;

/// HTTP client for cross-encoder rerank services that score `(query, document)`
/// pairs jointly. Scores are aligned back to input order by the response index.
pub struct HttpReranker {
	cfg: RerankProviderConfig,
	client: Client,
}
impl HttpReranker {
	pub fn new(cfg: RerankProviderConfig) -> Result<Self> {
		let client = Client::builder()
			.timeout(Duration::from_millis(cfg.timeout_ms))
			.build()
			.map_err(|err| Error::unavailable(format!("Failed to build HTTP client: {err}.")))?;

		Ok(Self { cfg, client })
	}

	async fn rerank_inner(&self, query: &str, docs: &[String]) -> Result<Vec<f32>> {
		if docs.is_empty() {
			return Ok(Vec::new());
		}

		let url = format!("{}{}", self.cfg.api_base, self.cfg.path);
		let body =
			serde_json::json!({ "model": self.cfg.model, "query": query, "documents": docs });
		let res = self
			.client
			.post(url)
			.headers(auth_headers(&self.cfg.api_key, &self.cfg.default_headers)?)
			.json(&body)
			.send()
			.await?;
		let res = res
			.error_for_status()
			.map_err(|err| Error::unavailable(format!("Rerank service refused: {err}.")))?;
		let json: Value = res
			.json()
			.await
			.map_err(|err| Error::bad_response(format!("Rerank body is not JSON: {err}.")))?;

		parse_rerank_response(json, docs.len())
	}
}
impl Reranker for HttpReranker {
	fn rerank<'a>(&'a self, query: &'a str, docs: &'a [String]) -> BoxFuture<'a, Result<Vec<f32>>> {
		Box::pin(self.rerank_inner(query, docs))
	}
}

fn parse_rerank_response(json: Value, doc_count: usize) -> Result<Vec<f32>> {
	let mut scores = vec![0.0_f32; doc_count];
	let results = json
		.get("results")
		.or_else(|| json.get("data"))
		.and_then(|v| v.as_array())
		.ok_or_else(|| Error::bad_response("Rerank response is missing results array."))?;

	for item in results {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.ok_or_else(|| Error::bad_response("Rerank result missing index."))? as usize;
		let score = item
			.get("relevance_score")
			.or_else(|| item.get("score"))
			.and_then(|v| v.as_f64())
			.ok_or_else(|| Error::bad_response("Rerank result missing score."))? as f32;

		if index < scores.len() {
			scores[index] = score;
		}
	}

	Ok(scores)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn aligns_scores_by_index() {
		let json = serde_json::json!({
			"results": [
				{ "index": 1, "relevance_score": 0.2 },
				{ "index": 0, "relevance_score": 0.9 }
			]
		});
		let scores = parse_rerank_response(json, 2).expect("parse failed");

		assert_eq!(scores, vec![0.9, 0.2]);
	}

	#[test]
	fn rejects_results_without_scores() {
		let json = serde_json::json!({ "results": [ { "index": 0 } ] });

		assert!(matches!(parse_rerank_response(json, 1), Err(Error::BadResponse { .. })));
	}
}
