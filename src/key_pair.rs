use ciborium_ll::{Decoder, Encoder};
use secrecy::{ExposeSecret as _, SecretBox, SecretSlice};
use x25519_dalek::{PublicKey, StaticSecret};

use super::{Error, KdfConfig, Pbkdf, PbkdfAlgorithm, PbkdfHash, codec, wrap};

const PRIVATE_KEY: u8 = 0;
const PUBLIC_KEY: u8 = 1;
const ENCRYPTED_PRIVATE_KEY: u8 = 2;

const KEY_SIZE: usize = 32;

/// An X25519 key pair for key recipients.
///
/// The public half goes to whoever is encrypting (as the `public_key` of
/// [`add_key_recipient`](crate::RecipientCipher::add_key_recipient)), and the private half is
/// what you decrypt with.  The private half can be exported as-is, or sealed under a password.
pub struct KeyPair {
	key: SecretBox<StaticSecret>,
	public: PublicKey,
}

impl std::fmt::Debug for KeyPair {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
		f.debug_struct("KeyPair")
			.field("public", &self.public_key())
			.finish()
	}
}

impl KeyPair {
	#[tracing::instrument(level = "debug")]
	pub fn generate() -> Self {
		Self::new_from_key(StaticSecret::random())
	}

	fn new_from_key(key: StaticSecret) -> Self {
		KeyPair {
			public: (&key).into(),
			key: SecretBox::new(Box::new(key)),
		}
	}

	/// Load a key pair from an exported private key.
	///
	/// # Errors
	///
	/// * [`Error::InvalidKey`] if `private_key` isn't a private key at all.
	/// * [`Error::InvalidArgument`] if the key is password-protected and no password was given.
	/// * [`Error::UnwrapFailed`] if the password is wrong.
	/// * [`Error::WeakParameters`] if the key was protected with below-recommended parameters.
	pub fn from_private_key(private_key: &[u8], password: Option<&str>) -> Result<Self, Error> {
		let key = parse_private_key(private_key, password, true)?;

		Ok(Self::new_from_key(key.expose_secret().clone()))
	}

	pub fn public_key(&self) -> Vec<u8> {
		let mut v = vec![PUBLIC_KEY];

		v.extend_from_slice(self.public.as_bytes());

		v
	}

	pub fn private_key(&self) -> SecretSlice<u8> {
		let mut v = vec![PRIVATE_KEY];
		v.extend_from_slice(self.key.expose_secret().as_bytes());
		v.into()
	}

	/// Export the private key sealed under `password`.
	///
	/// A fresh salt is generated unless `config` pins one.
	#[tracing::instrument(level = "debug", skip(password))]
	pub fn encrypted_private_key(&self, password: &str, config: &KdfConfig) -> Result<Vec<u8>, Error> {
		if password.is_empty() {
			return Err(Error::invalid_argument("password must not be empty"));
		}

		let kdf = Pbkdf::from_config(config);
		let wrapped = wrap::wrap_with_password(self.key.expose_secret().as_bytes(), password, &kdf)?;

		let mut v: Vec<u8> = vec![ENCRYPTED_PRIVATE_KEY];

		let mut enc = Encoder::from(&mut v);
		codec::push_array(&mut enc, 5, "private key")?;
		codec::push_bytes(&mut enc, kdf.salt(), "salt")?;
		codec::push_uint(&mut enc, kdf.iterations().into(), "iterations")?;
		codec::push_uint(&mut enc, kdf.algorithm().id(), "algorithm")?;
		codec::push_uint(&mut enc, kdf.hash().id(), "hash")?;
		codec::push_bytes(&mut enc, &wrapped, "wrapped key")?;

		Ok(v)
	}
}

pub(crate) fn parse_public_key(k: &[u8]) -> Result<PublicKey, Error> {
	if k.len() != KEY_SIZE + 1 {
		return Err(Error::invalid_key("invalid public key length"));
	}

	match k[0] {
		PUBLIC_KEY => {
			let inkey: [u8; KEY_SIZE] = k[1..]
				.try_into()
				.map_err(|_| Error::insanity("public key slice did not fit"))?;
			Ok(PublicKey::from(inkey))
		}
		n => Err(Error::invalid_key(format!("invalid public key type byte {n}"))),
	}
}

pub(crate) fn parse_private_key(
	k: &[u8],
	password: Option<&str>,
	enforce_recommendations: bool,
) -> Result<SecretBox<StaticSecret>, Error> {
	match k.first() {
		Some(&PRIVATE_KEY) => {
			if k.len() != KEY_SIZE + 1 {
				return Err(Error::invalid_key("invalid private key length"));
			}

			secret_from_slice(&k[1..])
		}
		Some(&ENCRYPTED_PRIVATE_KEY) => {
			let Some(password) = password else {
				return Err(Error::invalid_argument(
					"private key is password-protected, but no password was given",
				));
			};

			let (mut kdf, wrapped) = decode_encrypted_private_key(&k[1..])
				.map_err(|e| Error::invalid_key(format!("bad encrypted private key: {e}")))?;

			if !enforce_recommendations {
				kdf.disable_recommendations_check();
			}

			let key = wrap::unwrap_with_password(&wrapped, password, &kdf)?;

			secret_from_slice(key.expose_secret()).map_err(|_| Error::UnwrapFailed)
		}
		Some(n) => Err(Error::invalid_key(format!("invalid private key type byte {n}"))),
		None => Err(Error::invalid_argument("private key must not be empty")),
	}
}

fn secret_from_slice(k: &[u8]) -> Result<SecretBox<StaticSecret>, Error> {
	let inkey: [u8; KEY_SIZE] = k
		.try_into()
		.map_err(|_| Error::invalid_key("invalid private key length"))?;

	Ok(SecretBox::new(Box::new(StaticSecret::from(inkey))))
}

fn decode_encrypted_private_key(b: &[u8]) -> Result<(Pbkdf, Vec<u8>), Error> {
	let mut dec = Decoder::from(b);

	codec::expect_array(&mut dec, 5, "private key")?;
	let kdf = decode_kdf_parameters(&mut dec)?;
	let wrapped = codec::pull_bytes(&mut dec, "wrapped key")?;

	if dec.offset() != b.len() {
		return Err(codec::malformed("private key", "trailing data"));
	}

	Ok((kdf, wrapped))
}

/// Read `salt, iterations, algorithm id, hash id`, as used for every password-sealed thing.
pub(crate) fn decode_kdf_parameters<R>(dec: &mut Decoder<R>) -> Result<Pbkdf, Error>
where
	R: ciborium_io::Read,
	R::Error: std::fmt::Debug,
{
	let salt = codec::pull_bytes(dec, "salt")?;
	if salt.is_empty() {
		return Err(codec::malformed("salt", "empty salt"));
	}

	let iterations = codec::pull_uint(dec, "iterations")?;
	let iterations = u32::try_from(iterations)
		.ok()
		.filter(|i| *i > 0)
		.ok_or_else(|| codec::malformed("iterations", format!("bad iteration count {iterations}")))?;

	let algorithm = codec::pull_uint(dec, "algorithm")?;
	let algorithm = PbkdfAlgorithm::from_id(algorithm)
		.ok_or_else(|| codec::malformed("algorithm", format!("unknown KDF algorithm {algorithm}")))?;

	let hash = codec::pull_uint(dec, "hash")?;
	let hash = PbkdfHash::from_id(hash)
		.ok_or_else(|| codec::malformed("hash", format!("unknown hash {hash}")))?;

	let mut kdf = Pbkdf::new(salt, iterations);
	kdf.set_algorithm(algorithm);
	kdf.set_hash(hash);

	Ok(kdf)
}
