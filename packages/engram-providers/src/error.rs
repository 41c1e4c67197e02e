pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// Transport failure, timeout, or non-success status from the model service.
	#[error("Provider unavailable: {message}")]
	Unavailable { message: String },
	/// The service answered, but the body was not the promised shape.
	#[error("Provider response malformed: {message}")]
	BadResponse { message: String },
}
impl Error {
	pub(crate) fn unavailable(message: impl Into<String>) -> Self {
		Self::Unavailable { message: message.into() }
	}

	pub(crate) fn bad_response(message: impl Into<String>) -> Self {
		Self::BadResponse { message: message.into() }
	}
}
impl From<reqwest::Error> for Error {
	fn from(err: reqwest::Error) -> Self {
		// HTTP success does not imply a well-formed body; decode failures are the
		// service misbehaving, everything else is the service being unreachable.
		if err.is_decode() {
			Self::BadResponse { message: err.to_string() }
		} else {
			Self::Unavailable { message: err.to_string() }
		}
	}
}
