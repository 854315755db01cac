use hkdf::Hkdf;
use secrecy::SecretBox;
use sha2::Sha256;

use super::Error;

/// Turn a Diffie-Hellman shared secret into a key-encryption key for one wrap.
pub(crate) fn derive_key(shared: &[u8; 32], context: &[u8]) -> Result<SecretBox<[u8; 32]>, Error> {
	let hk = Hkdf::<Sha256>::new(None, shared);

	let mut output = Box::new([0u8; 32]);

	hk.expand(context, &mut output[..])
		.map_err(|e| Error::insanity(format!("HKDF expand assploded: {e}")))?;

	Ok(output.into())
}

#[cfg(test)]
mod tests {
	use super::*;
	use secrecy::ExposeSecret as _;

	#[test]
	fn context_separates_keys() {
		let shared = [3u8; 32];

		let a = derive_key(&shared, b"a").unwrap();
		let a2 = derive_key(&shared, b"a").unwrap();
		let b = derive_key(&shared, b"b").unwrap();

		assert_eq!(a.expose_secret(), a2.expose_secret());
		assert_ne!(a.expose_secret(), b.expose_secret());
	}
}
