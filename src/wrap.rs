//! Per-recipient content key wrapping, and the AEAD primitives everything is sealed with.
//!
//! Key recipients get an ephemeral-static X25519 exchange, with the shared secret run through
//! HKDF to make a key-encryption key: `ephemeral pubkey (32) || nonce (12) || sealed key (48)`.
//! Password recipients get a key-encryption key straight out of the [`Pbkdf`]:
//! `nonce (12) || sealed key (48)`.
use chacha20poly1305::{
	ChaCha20Poly1305, KeyInit as _,
	aead::{Aead as _, Payload},
};
use secrecy::{ExposeSecret as _, SecretSlice};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use super::{CONTENT_KEY_SIZE, ContentKey, Error, Pbkdf, RecipientId, kdf};

pub(crate) const NONCE_SIZE: usize = 12;
pub(crate) const TAG_SIZE: usize = 16;

const EPHEMERAL_KEY_SIZE: usize = 32;
const KEK_SIZE: usize = 32;

pub(crate) fn random_nonce() -> [u8; NONCE_SIZE] {
	use rand::{RngCore, rng};

	let mut nonce = [0u8; NONCE_SIZE];
	rng().fill_bytes(&mut nonce);
	nonce
}

pub(crate) fn seal(
	key: &[u8; 32],
	nonce: &[u8; NONCE_SIZE],
	aad: &[u8],
	plaintext: &[u8],
) -> Result<Vec<u8>, Error> {
	let cipher = ChaCha20Poly1305::new(key.into());

	cipher
		.encrypt(
			nonce.into(),
			Payload {
				msg: plaintext,
				aad,
			},
		)
		.map_err(|_| Error::Encryption)
}

pub(crate) fn open(
	key: &[u8; 32],
	nonce: &[u8; NONCE_SIZE],
	aad: &[u8],
	ciphertext: &[u8],
) -> Result<Vec<u8>, Error> {
	let cipher = ChaCha20Poly1305::new(key.into());

	cipher
		.decrypt(
			nonce.into(),
			Payload {
				msg: ciphertext,
				aad,
			},
		)
		.map_err(|_| Error::Decryption)
}

// Unit N uses the base nonce with N XORed into its last eight bytes.  The AAD is N followed by
// a last-unit flag, so units can be neither reordered, spliced between payloads, nor dropped from
// the end
fn unit_nonce(base: &[u8; NONCE_SIZE], index: u64) -> [u8; NONCE_SIZE] {
	let mut nonce = *base;

	for (n, i) in nonce[NONCE_SIZE - 8..].iter_mut().zip(index.to_be_bytes()) {
		*n ^= i;
	}

	nonce
}

fn unit_aad(index: u64, last: bool) -> [u8; 9] {
	let mut aad = [0u8; 9];
	aad[..8].copy_from_slice(&index.to_be_bytes());
	aad[8] = u8::from(last);
	aad
}

/// Encrypt one independently-authenticated piece of payload.  Every payload ends with exactly
/// one unit marked `last`.
pub(crate) fn seal_unit(
	key: &ContentKey,
	base_nonce: &[u8; NONCE_SIZE],
	index: u64,
	last: bool,
	plaintext: &[u8],
) -> Result<Vec<u8>, Error> {
	seal(
		key.expose_secret(),
		&unit_nonce(base_nonce, index),
		&unit_aad(index, last),
		plaintext,
	)
}

pub(crate) fn open_unit(
	key: &ContentKey,
	base_nonce: &[u8; NONCE_SIZE],
	index: u64,
	last: bool,
	ciphertext: &[u8],
) -> Result<Vec<u8>, Error> {
	open(
		key.expose_secret(),
		&unit_nonce(base_nonce, index),
		&unit_aad(index, last),
		ciphertext,
	)
	.inspect_err(|_| tracing::debug!(index, last, "Payload unit failed authentication"))
}

fn wrap_context(ephemeral: &PublicKey, recipient: &PublicKey) -> Vec<u8> {
	let mut context = b"key_wrap::".to_vec();
	context.extend_from_slice(ephemeral.as_bytes());
	context.extend_from_slice(recipient.as_bytes());
	context
}

#[tracing::instrument(level = "debug", skip(content_key, public_key), fields(%recipient_id))]
pub(crate) fn wrap_for_public_key(
	content_key: &ContentKey,
	recipient_id: &RecipientId,
	public_key: &PublicKey,
) -> Result<Vec<u8>, Error> {
	let tmp_key = EphemeralSecret::random();
	let tmp_pubkey = PublicKey::from(&tmp_key);

	let shared = tmp_key.diffie_hellman(public_key);

	if !shared.was_contributory() {
		return Err(Error::invalid_key("recipient public key is of low order"));
	}

	let kek = kdf::derive_key(shared.as_bytes(), &wrap_context(&tmp_pubkey, public_key))?;
	let nonce = random_nonce();
	let sealed = seal(
		kek.expose_secret(),
		&nonce,
		recipient_id.as_bytes(),
		content_key.expose_secret(),
	)?;

	let mut wrapped = Vec::with_capacity(EPHEMERAL_KEY_SIZE + NONCE_SIZE + sealed.len());
	wrapped.extend_from_slice(tmp_pubkey.as_bytes());
	wrapped.extend_from_slice(&nonce);
	wrapped.extend_from_slice(&sealed);

	Ok(wrapped)
}

#[tracing::instrument(level = "debug", skip(wrapped, private_key), fields(%recipient_id))]
pub(crate) fn unwrap_with_private_key(
	wrapped: &[u8],
	recipient_id: &RecipientId,
	private_key: &StaticSecret,
) -> Result<ContentKey, Error> {
	if wrapped.len() != EPHEMERAL_KEY_SIZE + NONCE_SIZE + CONTENT_KEY_SIZE + TAG_SIZE {
		tracing::debug!(len = wrapped.len(), "Wrapped key has the wrong length");
		return Err(Error::UnwrapFailed);
	}

	let (tmp_pubkey, rest) = wrapped.split_at(EPHEMERAL_KEY_SIZE);
	let (nonce, sealed) = rest.split_at(NONCE_SIZE);

	let tmp_pubkey: [u8; EPHEMERAL_KEY_SIZE] = tmp_pubkey
		.try_into()
		.map_err(|_| Error::insanity("split_at gave a bad ephemeral key length"))?;
	let tmp_pubkey = PublicKey::from(tmp_pubkey);
	let nonce: [u8; NONCE_SIZE] = nonce
		.try_into()
		.map_err(|_| Error::insanity("split_at gave a bad nonce length"))?;

	let shared = private_key.diffie_hellman(&tmp_pubkey);

	if !shared.was_contributory() {
		return Err(Error::UnwrapFailed);
	}

	let own_pubkey = PublicKey::from(private_key);
	let kek = kdf::derive_key(shared.as_bytes(), &wrap_context(&tmp_pubkey, &own_pubkey))?;

	let key: SecretSlice<u8> = open(kek.expose_secret(), &nonce, recipient_id.as_bytes(), sealed)
		.map_err(|_| Error::UnwrapFailed)?
		.into();

	ContentKey::from_slice(key.expose_secret()).ok_or(Error::UnwrapFailed)
}

fn password_aad(kdf: &Pbkdf) -> Vec<u8> {
	let mut aad = Vec::<u8>::new();
	aad.push(kdf.algorithm().id() as u8);
	aad.push(kdf.hash().id() as u8);
	aad.extend_from_slice(&kdf.iterations().to_be_bytes());
	aad.extend_from_slice(kdf.salt());
	aad
}

/// Seal `secret` under a key derived from `password` with `kdf`'s parameters.
#[tracing::instrument(level = "debug", skip_all)]
pub(crate) fn wrap_with_password(secret: &[u8], password: &str, kdf: &Pbkdf) -> Result<Vec<u8>, Error> {
	let kek = kdf.key_from_password(password, KEK_SIZE)?;
	let kek: &[u8; KEK_SIZE] = kek
		.expose_secret()
		.try_into()
		.map_err(|_| Error::insanity("KDF produced a key of the wrong size"))?;

	let nonce = random_nonce();
	let sealed = seal(kek, &nonce, &password_aad(kdf), secret)?;

	let mut wrapped = Vec::with_capacity(NONCE_SIZE + sealed.len());
	wrapped.extend_from_slice(&nonce);
	wrapped.extend_from_slice(&sealed);

	Ok(wrapped)
}

/// Reverse [`wrap_with_password`].
///
/// # Errors
///
/// [`Error::UnwrapFailed`] if the password is wrong or the wrapped data has been tampered with,
/// [`Error::WeakParameters`] if `kdf` enforces recommendations its own parameters don't meet.
#[tracing::instrument(level = "debug", skip_all)]
pub(crate) fn unwrap_with_password(
	wrapped: &[u8],
	password: &str,
	kdf: &Pbkdf,
) -> Result<SecretSlice<u8>, Error> {
	if wrapped.len() < NONCE_SIZE + TAG_SIZE {
		tracing::debug!(len = wrapped.len(), "Wrapped key is too short");
		return Err(Error::UnwrapFailed);
	}

	let kek = kdf.key_from_password(password, KEK_SIZE)?;
	let kek: &[u8; KEK_SIZE] = kek
		.expose_secret()
		.try_into()
		.map_err(|_| Error::insanity("KDF produced a key of the wrong size"))?;

	let (nonce, sealed) = wrapped.split_at(NONCE_SIZE);
	let nonce: [u8; NONCE_SIZE] = nonce
		.try_into()
		.map_err(|_| Error::insanity("split_at gave a bad nonce length"))?;

	open(kek, &nonce, &password_aad(kdf), sealed)
		.map(Into::into)
		.map_err(|_| Error::UnwrapFailed)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::PbkdfHash;

	fn quick_kdf() -> Pbkdf {
		let mut kdf = Pbkdf::new(b"", 1_000);
		kdf.disable_recommendations_check();
		kdf
	}

	#[test]
	fn public_key_round_trip() {
		crate::test_helpers::init();
		let secret = StaticSecret::random();
		let public = PublicKey::from(&secret);
		let id = RecipientId::new(b"alice").unwrap();
		let key = ContentKey::generate();

		let wrapped = wrap_for_public_key(&key, &id, &public).unwrap();
		assert_eq!(92, wrapped.len());

		assert_eq!(key, unwrap_with_private_key(&wrapped, &id, &secret).unwrap());
	}

	#[test]
	fn wrong_private_key_fails_to_unwrap() {
		crate::test_helpers::init();
		let secret = StaticSecret::random();
		let id = RecipientId::new(b"alice").unwrap();
		let wrapped =
			wrap_for_public_key(&ContentKey::generate(), &id, &PublicKey::from(&secret)).unwrap();

		let result = unwrap_with_private_key(&wrapped, &id, &StaticSecret::random());
		assert!(matches!(result, Err(Error::UnwrapFailed)));
	}

	#[test]
	fn wrapped_key_is_bound_to_recipient_id() {
		let secret = StaticSecret::random();
		let wrapped = wrap_for_public_key(
			&ContentKey::generate(),
			&RecipientId::new(b"alice").unwrap(),
			&PublicKey::from(&secret),
		)
		.unwrap();

		let result = unwrap_with_private_key(&wrapped, &RecipientId::new(b"mallory").unwrap(), &secret);
		assert!(matches!(result, Err(Error::UnwrapFailed)));
	}

	#[test]
	fn low_order_public_key_is_refused() {
		let result = wrap_for_public_key(
			&ContentKey::generate(),
			&RecipientId::new(b"zero").unwrap(),
			&PublicKey::from([0u8; 32]),
		);
		assert!(matches!(result, Err(Error::InvalidKey(_))));
	}

	#[test]
	fn units_are_bound_to_their_index() {
		let key = ContentKey::generate();
		let nonce = random_nonce();

		let sealed = seal_unit(&key, &nonce, 3, false, b"chunk three").unwrap();

		assert_eq!(b"chunk three".to_vec(), open_unit(&key, &nonce, 3, false, &sealed).unwrap());
		assert!(matches!(open_unit(&key, &nonce, 4, false, &sealed), Err(Error::Decryption)));
		assert!(matches!(
			open_unit(&ContentKey::generate(), &nonce, 3, false, &sealed),
			Err(Error::Decryption)
		));
	}

	#[test]
	fn units_are_bound_to_being_last() {
		let key = ContentKey::generate();
		let nonce = random_nonce();

		let middle = seal_unit(&key, &nonce, 1, false, b"more to come").unwrap();
		let end = seal_unit(&key, &nonce, 2, true, b"").unwrap();

		assert!(matches!(open_unit(&key, &nonce, 1, true, &middle), Err(Error::Decryption)));
		assert!(matches!(open_unit(&key, &nonce, 2, false, &end), Err(Error::Decryption)));
		assert!(open_unit(&key, &nonce, 2, true, &end).unwrap().is_empty());
	}

	#[test]
	fn unit_nonces_differ_only_in_the_counter() {
		let base = [0xffu8; NONCE_SIZE];

		assert_eq!(base, unit_nonce(&base, 0));

		let one = unit_nonce(&base, 1);
		assert_eq!(base[..NONCE_SIZE - 1], one[..NONCE_SIZE - 1]);
		assert_eq!(0xfe, one[NONCE_SIZE - 1]);
	}

	#[test]
	fn password_round_trip() {
		crate::test_helpers::init();
		let kdf = quick_kdf();

		let wrapped = wrap_with_password(b"thirty-two bytes of secret stuff", "pw", &kdf).unwrap();
		assert_eq!(60, wrapped.len());

		let secret = unwrap_with_password(&wrapped, "pw", &kdf).unwrap();
		assert_eq!(b"thirty-two bytes of secret stuff", secret.expose_secret());

		let result = unwrap_with_password(&wrapped, "wrong", &kdf);
		assert!(matches!(result, Err(Error::UnwrapFailed)));
	}

	#[test]
	fn password_wrap_is_bound_to_kdf_parameters() {
		let kdf = quick_kdf();
		let wrapped = wrap_with_password(b"secret", "pw", &kdf).unwrap();

		let mut tweaked = Pbkdf::new(kdf.salt(), 1_000);
		tweaked.set_hash(PbkdfHash::Sha256);
		tweaked.disable_recommendations_check();

		let result = unwrap_with_password(&wrapped, "pw", &tweaked);
		assert!(matches!(result, Err(Error::UnwrapFailed)));
	}
}
