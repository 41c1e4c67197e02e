mod embedding;
mod error;
mod rerank;

pub use embedding::HttpEmbedder;
pub use error::{Error, Result};
pub use rerank::HttpReranker;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName};
use serde_json::{Map, Value};

use engram_domain::BoxFuture;

/// Calls an external embedding model. Implementations must enforce a timeout and
/// return a typed error; they never panic past this boundary.
pub trait Embedder
where
	Self: Send + Sync,
{
	fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>>;

	fn dimensions(&self) -> usize;
}

/// Secondary relevance pass over retrieval candidates: joint scoring of the query
/// against each candidate text, one score per candidate in input order.
pub trait Reranker
where
	Self: Send + Sync,
{
	fn rerank<'a>(&'a self, query: &'a str, docs: &'a [String]) -> BoxFuture<'a, Result<Vec<f32>>>;
}

fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(
		AUTHORIZATION,
		format!("Bearer {api_key}")
			.parse()
			.map_err(|_| Error::bad_response("Authorization header value is not ASCII."))?,
	);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::bad_response("Default header values must be strings."));
		};
		let name = HeaderName::from_bytes(key.as_bytes())
			.map_err(|_| Error::bad_response(format!("Invalid default header name: {key}.")))?;
		let parsed = raw
			.parse()
			.map_err(|_| Error::bad_response(format!("Invalid default header value for {key}.")))?;

		headers.insert(name, parsed);
	}

	Ok(headers)
}

fn truncate_on_char_boundary(text: &str, max_chars: usize) -> &str {
	match text.char_indices().nth(max_chars) {
		Some((byte_index, _)) => &text[..byte_index],
		None => text,
	}
}
