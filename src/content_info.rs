use ciborium_ll::{Decoder, Encoder};

use super::{
	CustomParameters, CustomValue, Error, Pbkdf, PbkdfAlgorithm, PbkdfHash, RecipientId, ValueType,
	chunk_cipher::MAX_CHUNK_SIZE, codec, key_pair, wrap::NONCE_SIZE,
};

// This makes more sense in base64
pub(crate) const MAGIC: [u8; 3] = [0xb3, 0xc1, 0xf7];

const VERSION: u64 = 1;
const CONTENT_CIPHER_CHACHA20_POLY1305: u64 = 1;
const KEY_WRAP_X25519_HKDF_SHA256_CHACHA20_POLY1305: u64 = 1;

/// One key recipient's copy of the content key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyRecipientEntry {
	id: RecipientId,
	wrapped_key: Vec<u8>,
}

impl KeyRecipientEntry {
	pub(crate) fn new(id: RecipientId, wrapped_key: Vec<u8>) -> Self {
		Self { id, wrapped_key }
	}

	pub fn id(&self) -> &RecipientId {
		&self.id
	}

	pub fn wrapped_key(&self) -> &[u8] {
		&self.wrapped_key
	}
}

/// One password recipient's copy of the content key, along with everything needed to
/// re-derive the key that wrapped it (except the password, of course).
#[derive(Clone, Debug)]
pub struct PasswordRecipientEntry {
	kdf: Pbkdf,
	wrapped_key: Vec<u8>,
}

impl PasswordRecipientEntry {
	pub(crate) fn new(kdf: Pbkdf, wrapped_key: Vec<u8>) -> Self {
		Self { kdf, wrapped_key }
	}

	pub fn salt(&self) -> &[u8] {
		self.kdf.salt()
	}

	pub fn iterations(&self) -> u32 {
		self.kdf.iterations()
	}

	pub fn algorithm(&self) -> PbkdfAlgorithm {
		self.kdf.algorithm()
	}

	pub fn hash(&self) -> PbkdfHash {
		self.kdf.hash()
	}

	pub fn wrapped_key(&self) -> &[u8] {
		&self.wrapped_key
	}

	pub(crate) fn kdf(&self) -> &Pbkdf {
		&self.kdf
	}
}

/// Everything a recipient needs, besides their own credentials, to decrypt a payload.
///
/// The wire form is the three magic bytes `b3 c1 f7` followed by a CBOR array of the header
/// (format version, algorithm identifiers, base nonce and chunk size), the key recipient
/// entries, the password recipient entries, and the custom parameters.  All CBOR items are
/// definite-length, so the size of an embedded content info can be found from its length
/// prefixes alone, with [`ContentInfo::size_in_data`].
#[derive(Clone, Debug)]
pub struct ContentInfo {
	nonce: [u8; NONCE_SIZE],
	chunk_size: usize,
	key_recipients: Vec<KeyRecipientEntry>,
	password_recipients: Vec<PasswordRecipientEntry>,
	custom_parameters: CustomParameters,
}

impl ContentInfo {
	pub(crate) fn new(
		nonce: [u8; NONCE_SIZE],
		key_recipients: Vec<KeyRecipientEntry>,
		password_recipients: Vec<PasswordRecipientEntry>,
	) -> Self {
		Self {
			nonce,
			chunk_size: 0,
			key_recipients,
			password_recipients,
			custom_parameters: CustomParameters::default(),
		}
	}

	pub(crate) fn nonce(&self) -> &[u8; NONCE_SIZE] {
		&self.nonce
	}

	/// Size of each plaintext chunk, or zero if the payload is a single unit.
	pub fn chunk_size(&self) -> usize {
		self.chunk_size
	}

	pub(crate) fn set_chunk_size(&mut self, chunk_size: usize) {
		self.chunk_size = chunk_size;
	}

	pub fn key_recipients(&self) -> &[KeyRecipientEntry] {
		&self.key_recipients
	}

	pub fn password_recipients(&self) -> &[PasswordRecipientEntry] {
		&self.password_recipients
	}

	pub fn custom_parameters(&self) -> &CustomParameters {
		&self.custom_parameters
	}

	pub(crate) fn set_custom_parameters(&mut self, params: CustomParameters) {
		self.custom_parameters = params;
	}

	pub(crate) fn key_recipient(&self, id: &RecipientId) -> Option<&KeyRecipientEntry> {
		self.key_recipients.iter().find(|e| e.id() == id)
	}

	pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
		let mut v: Vec<u8> = Vec::new();

		v.extend_from_slice(&MAGIC);

		let mut enc = Encoder::from(&mut v);
		codec::push_array(&mut enc, 4, "content info")?;

		codec::push_array(&mut enc, 5, "header")?;
		codec::push_uint(&mut enc, VERSION, "version")?;
		codec::push_uint(&mut enc, CONTENT_CIPHER_CHACHA20_POLY1305, "content cipher")?;
		codec::push_uint(&mut enc, KEY_WRAP_X25519_HKDF_SHA256_CHACHA20_POLY1305, "key wrap")?;
		codec::push_bytes(&mut enc, &self.nonce, "nonce")?;
		codec::push_uint(&mut enc, self.chunk_size as u64, "chunk size")?;

		codec::push_array(&mut enc, self.key_recipients.len(), "key recipients")?;
		for entry in &self.key_recipients {
			codec::push_array(&mut enc, 2, "key recipient")?;
			entry.id.encode(&mut enc)?;
			codec::push_bytes(&mut enc, &entry.wrapped_key, "wrapped key")?;
		}

		codec::push_array(&mut enc, self.password_recipients.len(), "password recipients")?;
		for entry in &self.password_recipients {
			codec::push_array(&mut enc, 5, "password recipient")?;
			codec::push_bytes(&mut enc, entry.kdf.salt(), "salt")?;
			codec::push_uint(&mut enc, entry.kdf.iterations().into(), "iterations")?;
			codec::push_uint(&mut enc, entry.kdf.algorithm().id(), "algorithm")?;
			codec::push_uint(&mut enc, entry.kdf.hash().id(), "hash")?;
			codec::push_bytes(&mut enc, &entry.wrapped_key, "wrapped key")?;
		}

		codec::push_array(&mut enc, self.custom_parameters.len(), "custom parameters")?;
		for (key, value) in self.custom_parameters.iter() {
			codec::push_array(&mut enc, 3, "custom parameter")?;
			codec::push_text(&mut enc, key, "parameter key")?;
			codec::push_uint(&mut enc, value.value_type().tag(), "parameter type")?;
			match value {
				CustomValue::Int(i) => codec::push_int(&mut enc, (*i).into(), "parameter value")?,
				CustomValue::String(s) => codec::push_text(&mut enc, s, "parameter value")?,
				CustomValue::Data(d) => codec::push_bytes(&mut enc, d, "parameter value")?,
			}
		}

		tracing::debug!(
			len = v.len(),
			key_recipients = self.key_recipients.len(),
			password_recipients = self.password_recipients.len(),
			"Serialized content info"
		);

		Ok(v)
	}

	/// Parse a complete serialized content info.
	///
	/// # Errors
	///
	/// [`Error::MalformedContentInfo`] for anything that isn't exactly one well-formed content
	/// info, including one followed by extra bytes.
	pub fn from_bytes(b: &[u8]) -> Result<Self, Error> {
		let Some(body) = b.strip_prefix(&MAGIC[..]) else {
			tracing::debug!(actual = ?b.get(..3), "Incorrect content info magic");
			return Err(codec::malformed("magic", "incorrect magic"));
		};

		let mut dec = Decoder::from(body);
		let info = Self::decode(&mut dec)?;

		if dec.offset() != body.len() {
			return Err(codec::malformed(
				"content info",
				format!("{} trailing bytes", body.len() - dec.offset()),
			));
		}

		Ok(info)
	}

	/// Parse a content info off the front of `reader`, consuming nothing past the end of it.
	pub fn read_from(mut reader: impl std::io::Read) -> Result<Self, Error> {
		let mut magic = [0u8; 3];
		reader
			.read_exact(&mut magic)
			.map_err(|e| codec::malformed("magic", e))?;

		if magic != MAGIC {
			tracing::debug!(actual = ?magic, "Incorrect content info magic");
			return Err(codec::malformed("magic", "incorrect magic"));
		}

		Self::decode(&mut Decoder::from(reader))
	}

	/// How many leading bytes of `data` are an embedded content info, or zero if `data` doesn't
	/// start with one.
	///
	/// Only the length prefixes are read; wrapped keys and parameter values are skipped over
	/// uninterpreted.
	pub fn size_in_data(data: &[u8]) -> Result<usize, Error> {
		let Some(body) = data.strip_prefix(&MAGIC[..]) else {
			return Ok(0);
		};

		let mut dec = Decoder::from(body);
		codec::skip_item(&mut dec, 0)?;

		Ok(MAGIC.len() + dec.offset())
	}

	fn decode<R>(dec: &mut Decoder<R>) -> Result<Self, Error>
	where
		R: ciborium_io::Read,
		R::Error: std::fmt::Debug,
	{
		codec::expect_array(dec, 4, "content info")?;

		let (nonce, chunk_size) = decode_header(dec)?;

		// Counts come off the wire, so nothing is preallocated from them
		let mut key_recipients: Vec<KeyRecipientEntry> = Vec::new();
		for _ in 0..codec::pull_array(dec, "key recipients")? {
			codec::expect_array(dec, 2, "key recipient")?;
			let id = RecipientId::decode(dec)?;
			let wrapped_key = codec::pull_bytes(dec, "wrapped key")?;

			if key_recipients.iter().any(|e| e.id == id) {
				return Err(codec::malformed("key recipient", format!("duplicate recipient id {id}")));
			}

			key_recipients.push(KeyRecipientEntry::new(id, wrapped_key));
		}

		let mut password_recipients: Vec<PasswordRecipientEntry> = Vec::new();
		for _ in 0..codec::pull_array(dec, "password recipients")? {
			codec::expect_array(dec, 5, "password recipient")?;
			let kdf = key_pair::decode_kdf_parameters(dec)?;
			let wrapped_key = codec::pull_bytes(dec, "wrapped key")?;

			password_recipients.push(PasswordRecipientEntry::new(kdf, wrapped_key));
		}

		let mut custom_parameters = CustomParameters::default();
		for _ in 0..codec::pull_array(dec, "custom parameters")? {
			codec::expect_array(dec, 3, "custom parameter")?;
			let key = codec::pull_text(dec, "parameter key")?;
			if key.is_empty() {
				return Err(codec::malformed("parameter key", "empty key"));
			}

			let tag = codec::pull_uint(dec, "parameter type")?;
			let value = match ValueType::from_tag(tag) {
				Some(ValueType::Int) => {
					let i = codec::pull_int(dec, "parameter value")?;
					CustomValue::Int(i32::try_from(i).map_err(|e| codec::malformed("parameter value", e))?)
				}
				Some(ValueType::String) => CustomValue::String(codec::pull_text(dec, "parameter value")?),
				Some(ValueType::Data) => CustomValue::Data(codec::pull_bytes(dec, "parameter value")?),
				None => {
					return Err(codec::malformed(
						"parameter type",
						format!("unknown value type {tag}"),
					));
				}
			};

			if !custom_parameters.insert_new(key.clone(), value) {
				return Err(codec::malformed("custom parameter", format!("duplicate key {key:?}")));
			}
		}

		tracing::debug!(
			key_recipients = key_recipients.len(),
			password_recipients = password_recipients.len(),
			custom_parameters = custom_parameters.len(),
			chunk_size,
			"Parsed content info"
		);

		Ok(Self {
			nonce,
			chunk_size,
			key_recipients,
			password_recipients,
			custom_parameters,
		})
	}
}

fn decode_header<R>(dec: &mut Decoder<R>) -> Result<([u8; NONCE_SIZE], usize), Error>
where
	R: ciborium_io::Read,
	R::Error: std::fmt::Debug,
{
	codec::expect_array(dec, 5, "header")?;

	let version = codec::pull_uint(dec, "version")?;
	if version != VERSION {
		return Err(codec::malformed("version", format!("unsupported version {version}")));
	}

	let content_cipher = codec::pull_uint(dec, "content cipher")?;
	if content_cipher != CONTENT_CIPHER_CHACHA20_POLY1305 {
		return Err(codec::malformed(
			"content cipher",
			format!("unknown content cipher {content_cipher}"),
		));
	}

	let key_wrap = codec::pull_uint(dec, "key wrap")?;
	if key_wrap != KEY_WRAP_X25519_HKDF_SHA256_CHACHA20_POLY1305 {
		return Err(codec::malformed("key wrap", format!("unknown key wrap {key_wrap}")));
	}

	let nonce: [u8; NONCE_SIZE] = codec::pull_bytes(dec, "nonce")?
		.try_into()
		.map_err(|n: Vec<u8>| codec::malformed("nonce", format!("nonce is {} bytes", n.len())))?;

	let chunk_size = codec::pull_uint(dec, "chunk size")?;
	let chunk_size = usize::try_from(chunk_size)
		.ok()
		.filter(|s| *s <= MAX_CHUNK_SIZE)
		.ok_or_else(|| codec::malformed("chunk size", format!("chunk size {chunk_size} too large")))?;

	Ok((nonce, chunk_size))
}
