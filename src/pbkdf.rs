//! Password-based key derivation.
//!
//! The recommendations check refuses to derive keys from parameters that are too weak to
//! resist offline guessing.  The floor is set from current PBKDF2 guidance: at least 100,000
//! iterations (the default is 600,000), and at least 128 bits of salt.
use pbkdf2::pbkdf2_hmac;
use secrecy::SecretSlice;

use super::Error;

/// How many bytes [`Pbkdf::random_bytes_of_size`] produces when asked for zero.
pub const DEFAULT_RANDOM_BYTES_SIZE: usize = 32;

/// The shortest salt that passes the recommendations check.
pub const MIN_SALT_SIZE: usize = 16;

/// Iterations used when a [`Pbkdf`] is created with an iteration count of zero.
pub const DEFAULT_ITERATIONS: u32 = 600_000;

/// The smallest iteration count that passes the recommendations check.
pub const MIN_ITERATIONS: u32 = 100_000;

/// The key derivation algorithm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PbkdfAlgorithm {
	#[default]
	Pbkdf2,
}

impl PbkdfAlgorithm {
	pub(crate) fn id(self) -> u64 {
		match self {
			PbkdfAlgorithm::Pbkdf2 => 0,
		}
	}

	pub(crate) fn from_id(id: u64) -> Option<Self> {
		match id {
			0 => Some(PbkdfAlgorithm::Pbkdf2),
			_ => None,
		}
	}
}

/// The hash function underlying the key derivation's HMAC.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PbkdfHash {
	Sha1,
	Sha224,
	Sha256,
	#[default]
	Sha384,
	Sha512,
}

impl PbkdfHash {
	/// Size, in bytes, of the hash function's output.
	pub fn output_size(self) -> usize {
		match self {
			PbkdfHash::Sha1 => 20,
			PbkdfHash::Sha224 => 28,
			PbkdfHash::Sha256 => 32,
			PbkdfHash::Sha384 => 48,
			PbkdfHash::Sha512 => 64,
		}
	}

	pub(crate) fn id(self) -> u64 {
		match self {
			PbkdfHash::Sha1 => 1,
			PbkdfHash::Sha224 => 2,
			PbkdfHash::Sha256 => 3,
			PbkdfHash::Sha384 => 4,
			PbkdfHash::Sha512 => 5,
		}
	}

	pub(crate) fn from_id(id: u64) -> Option<Self> {
		match id {
			1 => Some(PbkdfHash::Sha1),
			2 => Some(PbkdfHash::Sha224),
			3 => Some(PbkdfHash::Sha256),
			4 => Some(PbkdfHash::Sha384),
			5 => Some(PbkdfHash::Sha512),
			_ => None,
		}
	}
}

/// Settings for deriving keys from passwords.
///
/// An empty `salt` means "generate a fresh random salt each time a [`Pbkdf`] is made from this
/// config", and an `iterations` of zero means [`DEFAULT_ITERATIONS`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KdfConfig {
	pub salt: Vec<u8>,
	pub iterations: u32,
	pub algorithm: PbkdfAlgorithm,
	pub hash: PbkdfHash,
	pub recommendations_enforced: bool,
}

impl Default for KdfConfig {
	fn default() -> Self {
		Self {
			salt: Vec::new(),
			iterations: 0,
			algorithm: PbkdfAlgorithm::default(),
			hash: PbkdfHash::default(),
			recommendations_enforced: true,
		}
	}
}

/// Derives keys from passwords.
///
/// # Example
///
/// ```rust
/// use sealed_envelope::{Pbkdf, PbkdfHash};
/// use secrecy::ExposeSecret as _;
/// # fn main() -> Result<(), sealed_envelope::Error> {
///
/// let mut kdf = Pbkdf::new(b"NaCl, but longer than sixteen bytes", 100_000);
/// kdf.set_hash(PbkdfHash::Sha256);
///
/// let key = kdf.key_from_password("correct horse battery staple", 0)?;
/// // Zero means "as long as the hash output"
/// assert_eq!(32, key.expose_secret().len());
///
/// // Too few iterations are refused, unless you *really* insist
/// let mut weak = Pbkdf::new(b"NaCl, but longer than sixteen bytes", 1_000);
/// assert!(weak.key_from_password("hunter2", 32).is_err());
/// weak.disable_recommendations_check();
/// assert!(weak.key_from_password("hunter2", 32).is_ok());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Pbkdf {
	salt: Vec<u8>,
	iterations: u32,
	algorithm: PbkdfAlgorithm,
	hash: PbkdfHash,
	recommendations_enforced: bool,
}

impl Pbkdf {
	/// Create a new [`Pbkdf`], generating a salt if `salt` is empty and using the default
	/// iteration count if `iterations` is zero.
	#[tracing::instrument(level = "debug", skip(salt))]
	pub fn new(salt: impl AsRef<[u8]>, iterations: u32) -> Self {
		let salt = salt.as_ref();

		let salt = if salt.is_empty() {
			tracing::debug!("Generating salt");
			Self::random_bytes_of_size(0)
		} else {
			salt.to_vec()
		};

		let iterations = if iterations == 0 {
			DEFAULT_ITERATIONS
		} else {
			iterations
		};

		Self {
			salt,
			iterations,
			algorithm: PbkdfAlgorithm::default(),
			hash: PbkdfHash::default(),
			recommendations_enforced: true,
		}
	}

	pub fn from_config(config: &KdfConfig) -> Self {
		let mut kdf = Self::new(&config.salt, config.iterations);
		kdf.algorithm = config.algorithm;
		kdf.hash = config.hash;
		kdf.recommendations_enforced = config.recommendations_enforced;
		kdf
	}

	pub fn salt(&self) -> &[u8] {
		&self.salt
	}

	pub fn iterations(&self) -> u32 {
		self.iterations
	}

	pub fn algorithm(&self) -> PbkdfAlgorithm {
		self.algorithm
	}

	pub fn set_algorithm(&mut self, algorithm: PbkdfAlgorithm) {
		self.algorithm = algorithm;
	}

	pub fn hash(&self) -> PbkdfHash {
		self.hash
	}

	pub fn set_hash(&mut self, hash: PbkdfHash) {
		self.hash = hash;
	}

	/// Refuse to derive keys from parameters weaker than recommended.  This is the default.
	pub fn enable_recommendations_check(&mut self) {
		self.recommendations_enforced = true;
	}

	/// Derive keys from whatever parameters are given.
	///
	/// Only do this to read data produced by something that didn't know better.
	pub fn disable_recommendations_check(&mut self) {
		self.recommendations_enforced = false;
	}

	pub fn recommendations_enforced(&self) -> bool {
		self.recommendations_enforced
	}

	/// Check the parameters against the recommendations, whether or not they're enforced.
	///
	/// # Errors
	///
	/// Returns [`Error::WeakParameters`] describing the first shortfall found.
	pub fn check_recommendations(&self) -> Result<(), Error> {
		if self.iterations < MIN_ITERATIONS {
			return Err(Error::weak_parameters(format!(
				"{} iterations is fewer than the minimum of {MIN_ITERATIONS}",
				self.iterations
			)));
		}

		if self.salt.len() < MIN_SALT_SIZE {
			return Err(Error::weak_parameters(format!(
				"{} byte salt is shorter than the minimum of {MIN_SALT_SIZE}",
				self.salt.len()
			)));
		}

		Ok(())
	}

	/// Derive a key of `size` bytes from `password`.  A `size` of zero produces a key as long
	/// as the output of the selected hash.
	///
	/// The same password, salt, iteration count, and hash always produce the same key.
	///
	/// # Errors
	///
	/// Returns [`Error::WeakParameters`] before doing any work if the recommendations check is
	/// enabled and the parameters fail it.
	#[tracing::instrument(level = "debug", skip(password), fields(iterations = self.iterations, hash = ?self.hash))]
	pub fn key_from_password(&self, password: &str, size: usize) -> Result<SecretSlice<u8>, Error> {
		if self.recommendations_enforced {
			self.check_recommendations().inspect_err(|e| {
				tracing::debug!(error = %e, "Refusing to derive key");
			})?;
		}

		let size = if size == 0 {
			self.hash.output_size()
		} else {
			size
		};

		let mut key = vec![0u8; size];
		let (password, salt, rounds) = (password.as_bytes(), &self.salt[..], self.iterations);

		match self.algorithm {
			PbkdfAlgorithm::Pbkdf2 => match self.hash {
				PbkdfHash::Sha1 => pbkdf2_hmac::<sha1::Sha1>(password, salt, rounds, &mut key),
				PbkdfHash::Sha224 => pbkdf2_hmac::<sha2::Sha224>(password, salt, rounds, &mut key),
				PbkdfHash::Sha256 => pbkdf2_hmac::<sha2::Sha256>(password, salt, rounds, &mut key),
				PbkdfHash::Sha384 => pbkdf2_hmac::<sha2::Sha384>(password, salt, rounds, &mut key),
				PbkdfHash::Sha512 => pbkdf2_hmac::<sha2::Sha512>(password, salt, rounds, &mut key),
			},
		}

		Ok(key.into())
	}

	/// Generate `size` cryptographically secure random bytes, or [`DEFAULT_RANDOM_BYTES_SIZE`]
	/// of them if `size` is zero.
	pub fn random_bytes_of_size(size: usize) -> Vec<u8> {
		use rand::{RngCore, rng};

		let size = if size == 0 {
			DEFAULT_RANDOM_BYTES_SIZE
		} else {
			size
		};

		let mut v = vec![0u8; size];
		rng().fill_bytes(&mut v);
		v
	}
}
