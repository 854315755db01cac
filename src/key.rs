use secrecy::ExposeSecret as _;

/// Size, in bytes, of every content key.
pub const CONTENT_KEY_SIZE: usize = 32;

/// The symmetric key that actually encrypts a payload.
///
/// One is generated per encryption session, and wrapped separately for each recipient in the
/// content info.  It is never serialized in the clear, and is zeroed when dropped.
#[derive(Debug)]
pub struct ContentKey(secrecy::SecretBox<[u8; CONTENT_KEY_SIZE]>);

impl ContentKey {
	pub fn expose_secret(&self) -> &[u8; CONTENT_KEY_SIZE] {
		self.0.expose_secret()
	}

	/// Create a fresh random content key.
	#[tracing::instrument(level = "trace")]
	pub(crate) fn generate() -> Self {
		use rand::{RngCore, rng};

		let mut k = Box::new([0u8; CONTENT_KEY_SIZE]);

		rng().fill_bytes(&mut k[..]);

		k.into()
	}

	/// Take ownership of unwrapped key material, if it's the right length.
	pub(crate) fn from_slice(k: &[u8]) -> Option<Self> {
		let k: [u8; CONTENT_KEY_SIZE] = k.try_into().ok()?;

		Some(Box::new(k).into())
	}
}

impl Clone for ContentKey {
	fn clone(&self) -> Self {
		Self(Box::new(*self.expose_secret()).into())
	}
}

impl PartialEq for ContentKey {
	fn eq(&self, other: &Self) -> bool {
		constant_time_eq::constant_time_eq_n(self.expose_secret(), other.expose_secret())
	}
}

impl Eq for ContentKey {}

impl From<Box<[u8; CONTENT_KEY_SIZE]>> for ContentKey {
	fn from(k: Box<[u8; CONTENT_KEY_SIZE]>) -> Self {
		ContentKey(k.into())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn generated_keys_differ() {
		assert_ne!(ContentKey::generate(), ContentKey::generate());
	}

	#[test]
	fn from_slice_checks_length() {
		assert!(ContentKey::from_slice(&[0u8; 31]).is_none());
		assert!(ContentKey::from_slice(&[0u8; 33]).is_none());

		let k = ContentKey::from_slice(&[7u8; 32]).expect("right-sized key rejected");
		assert_eq!(&[7u8; 32], k.expose_secret());
	}
}
