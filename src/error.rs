use super::custom_params::ValueType;

/// Error domain for everything to do with recipients, content info, and payload encryption.
pub const CIPHER_ERROR_DOMAIN: &str = "sealed_envelope::cipher";

/// Error domain for password-based key derivation.
pub const KDF_ERROR_DOMAIN: &str = "sealed_envelope::kdf";

/// Which of the two error domains an [`Error`] belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorDomain {
	Cipher,
	Kdf,
}

impl ErrorDomain {
	pub fn as_str(&self) -> &'static str {
		match self {
			ErrorDomain::Cipher => CIPHER_ERROR_DOMAIN,
			ErrorDomain::Kdf => KDF_ERROR_DOMAIN,
		}
	}
}

impl std::fmt::Display for ErrorDomain {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, thiserror::Error, thiserror_ext::Construct)]
#[non_exhaustive]
pub enum Error {
	#[error("invalid argument: {0}")]
	InvalidArgument(String),

	#[error("no recipients have been added")]
	MissingRecipients,

	#[error("malformed content info at {element}: {reason}")]
	MalformedContentInfo { element: String, reason: String },

	#[error("no content info has been provided")]
	MissingContentInfo,

	#[error("no matching recipient in content info")]
	RecipientNotFound,

	#[error("failed to unwrap content key")]
	UnwrapFailed,

	#[error("key derivation parameters below recommendations: {0}")]
	WeakParameters(String),

	#[error("custom parameter {key:?} holds {found}, not {expected}")]
	TypeMismatch {
		key: String,
		expected: ValueType,
		found: ValueType,
	},

	#[error("custom parameter {0:?} not found")]
	KeyNotFound(String),

	#[error("invalid cipher state: {0}")]
	InvalidState(String),

	#[error("invalid key: {0}")]
	InvalidKey(String),

	#[error("failed to encrypt plaintext")]
	Encryption,

	#[error("failed to decrypt ciphertext")]
	Decryption,

	#[error("content info encoding failure on {element}: {cause}")]
	Encoding {
		element: String,
		cause: std::io::Error,
	},

	#[error("stream I/O failure: {0}")]
	Io(#[source] std::io::Error),

	#[error("CAN'T HAPPEN: {0}")]
	Insanity(String),
}

impl Error {
	/// The error domain this error belongs to.
	pub fn domain(&self) -> ErrorDomain {
		match self {
			Error::WeakParameters(_) => ErrorDomain::Kdf,
			_ => ErrorDomain::Cipher,
		}
	}

	/// A stable numeric code, unique within the error's [`domain`](Error::domain).
	pub fn code(&self) -> u32 {
		match self {
			Error::InvalidArgument(_) => 1,
			Error::MissingRecipients => 2,
			Error::MalformedContentInfo { .. } => 3,
			Error::MissingContentInfo => 4,
			Error::RecipientNotFound => 5,
			Error::UnwrapFailed => 6,
			Error::TypeMismatch { .. } => 7,
			Error::KeyNotFound(_) => 8,
			Error::InvalidState(_) => 9,
			Error::InvalidKey(_) => 10,
			Error::Encryption => 11,
			Error::Decryption => 12,
			Error::Encoding { .. } => 13,
			Error::Io(_) => 14,
			Error::Insanity(_) => 99,

			Error::WeakParameters(_) => 1,
		}
	}
}
