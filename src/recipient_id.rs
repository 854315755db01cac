use ciborium_ll::Decoder;

use super::{Error, codec};

/// The caller-chosen identifier of a key recipient.
#[allow(clippy::derived_hash_with_manual_eq)] // k1 == k2 => hash(k1) == hash(k2) will hold
#[derive(Clone, Debug, Hash, Ord, PartialOrd)]
pub struct RecipientId(Vec<u8>);

impl RecipientId {
	pub fn new(id: impl AsRef<[u8]>) -> Result<Self, Error> {
		let id = id.as_ref();

		if id.is_empty() {
			return Err(Error::invalid_argument("recipient id must not be empty"));
		}

		Ok(Self(id.to_vec()))
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	pub(super) fn encode(&self, enc: &mut codec::Enc<'_>) -> Result<(), Error> {
		codec::push_bytes(enc, &self.0, "recipient_id")
	}

	pub(super) fn decode<R>(dec: &mut Decoder<R>) -> Result<Self, Error>
	where
		R: ciborium_io::Read,
		R::Error: std::fmt::Debug,
	{
		let id = codec::pull_bytes(dec, "recipient_id")?;

		if id.is_empty() {
			return Err(codec::malformed("recipient_id", "empty recipient id"));
		}

		Ok(Self(id))
	}
}

impl PartialEq for RecipientId {
	fn eq(&self, other: &Self) -> bool {
		constant_time_eq::constant_time_eq(&self.0, &other.0)
	}
}

impl Eq for RecipientId {}

impl std::fmt::Display for RecipientId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		for b in &self.0 {
			f.write_fmt(format_args!("{b:02x}"))?;
		}

		Ok(())
	}
}
