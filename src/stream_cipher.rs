use std::io::{Read, Write};

use super::{
	ContentInfo, ContentKey, Error, RecipientCipher,
	content_info::MAGIC,
	wrap::{self, TAG_SIZE},
};

/// Plaintext chunk size of everything a [`StreamCipher`] encrypts.
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Encrypts from a reader to a writer, holding no more than one chunk in memory at a time.
///
/// The stream is cut into [`STREAM_CHUNK_SIZE`] chunks, each sealed on its own as a
/// [`ChunkCipher`](crate::ChunkCipher) would.  Decryption works out the chunk size from the
/// content info, so it will also decrypt anything produced by a
/// [`RecipientCipher`] or a [`ChunkCipher`](crate::ChunkCipher).
///
/// Recipients, content info and custom parameters are all handled by the underlying
/// [`RecipientCipher`], which a [`StreamCipher`] derefs to.
///
/// # Example
///
/// ```rust
/// use sealed_envelope::{Error, KdfConfig, StreamCipher};
/// # fn main() -> Result<(), Error> {
///
/// // Keep the example quick; don't do this for real
/// let config = KdfConfig { iterations: 1_000, recommendations_enforced: false, ..KdfConfig::default() };
///
/// let mut cipher = StreamCipher::new();
/// cipher.set_kdf_config(config.clone());
/// cipher.add_password_recipient("open sesame")?;
///
/// let mut ciphertext = Vec::new();
/// cipher.encrypt(&b"lots and lots of data"[..], &mut ciphertext, true)?;
///
/// let mut decipher = StreamCipher::new();
/// decipher.set_kdf_config(config);
/// let mut plaintext = Vec::new();
/// decipher.decrypt_with_password(&ciphertext[..], &mut plaintext, "open sesame")?;
///
/// assert_eq!(b"lots and lots of data".to_vec(), plaintext);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct StreamCipher {
	envelope: RecipientCipher,
}

impl std::ops::Deref for StreamCipher {
	type Target = RecipientCipher;

	fn deref(&self) -> &RecipientCipher {
		&self.envelope
	}
}

impl std::ops::DerefMut for StreamCipher {
	fn deref_mut(&mut self) -> &mut RecipientCipher {
		&mut self.envelope
	}
}

impl StreamCipher {
	pub fn new() -> Self {
		Self::default()
	}

	/// Encrypt everything in `input` to `output`, optionally starting with the content info.
	///
	/// Without `embed_content_info`, get the content info from
	/// [`content_info`](RecipientCipher::content_info) afterwards.
	///
	/// # Errors
	///
	/// [`Error::MissingRecipients`] if there are no recipients, [`Error::Io`] if reading or
	/// writing fails.
	#[tracing::instrument(level = "debug", skip(self, input, output))]
	pub fn encrypt(
		&mut self,
		mut input: impl Read,
		mut output: impl Write,
		embed_content_info: bool,
	) -> Result<(), Error> {
		let (key, nonce) = self.envelope.seal_session(STREAM_CHUNK_SIZE)?;

		if embed_content_info {
			let info = self
				.envelope
				.content_info()?
				.ok_or_else(|| Error::insanity("sealed session has no content info"))?;
			output.write_all(&info).map_err(Error::Io)?;
		}

		let mut buf: Vec<u8> = Vec::with_capacity(STREAM_CHUNK_SIZE);

		// A short read means the end of the stream, so the last chunk is always short, even if
		// that makes it empty
		for index in 0u64.. {
			buf.clear();
			let n = read_chunk(&mut input, &mut buf, STREAM_CHUNK_SIZE)?;
			let last = n < STREAM_CHUNK_SIZE;

			output
				.write_all(&wrap::seal_unit(&key, &nonce, index, last, &buf)?)
				.map_err(Error::Io)?;

			if last {
				tracing::debug!(chunks = index + 1, "Encrypted stream");
				break;
			}
		}

		output.flush().map_err(Error::Io)
	}

	/// Decrypt `input` to `output` as key recipient `id`.
	///
	/// If `input` starts with a content info, that's used; otherwise the content info must have
	/// been given to [`set_content_info`](RecipientCipher::set_content_info).
	#[tracing::instrument(level = "debug", skip_all)]
	pub fn decrypt_with_key(
		&mut self,
		input: impl Read,
		output: impl Write,
		id: impl AsRef<[u8]>,
		private_key: &[u8],
		key_password: Option<&str>,
	) -> Result<(), Error> {
		let mut input = self.take_embedded_content_info(input)?;
		let key = self
			.envelope
			.recover_key_with_private_key(id, private_key, key_password)?;

		self.decrypt_payload(&key, &mut input, output)
	}

	/// Decrypt `input` to `output` as a password recipient.  The content info is found as for
	/// [`decrypt_with_key`](Self::decrypt_with_key).
	#[tracing::instrument(level = "debug", skip_all)]
	pub fn decrypt_with_password(
		&mut self,
		input: impl Read,
		output: impl Write,
		password: &str,
	) -> Result<(), Error> {
		let mut input = self.take_embedded_content_info(input)?;
		let key = self.envelope.recover_key_with_password(password)?;

		self.decrypt_payload(&key, &mut input, output)
	}

	// Peek at the start of the stream; if it isn't a content info, put it back
	fn take_embedded_content_info<R: Read>(
		&mut self,
		mut input: R,
	) -> Result<std::io::Chain<std::io::Cursor<Vec<u8>>, R>, Error> {
		let mut prefix: Vec<u8> = Vec::with_capacity(MAGIC.len());
		read_chunk(&mut input, &mut prefix, MAGIC.len())?;

		let embedded = prefix == MAGIC;
		let mut input = std::io::Cursor::new(prefix).chain(input);

		if embedded {
			let info = ContentInfo::read_from(&mut input)?;
			tracing::debug!("Read embedded content info");
			self.envelope.open_content_info(info);
		} else if self.envelope.current_content_info().is_none() {
			return Err(Error::MissingContentInfo);
		}

		Ok(input)
	}

	fn decrypt_payload(
		&self,
		key: &ContentKey,
		input: &mut impl Read,
		mut output: impl Write,
	) -> Result<(), Error> {
		let info = self
			.envelope
			.current_content_info()
			.ok_or(Error::MissingContentInfo)?;
		let nonce = *info.nonce();

		if info.chunk_size() == 0 {
			let mut ciphertext = Vec::new();
			input.read_to_end(&mut ciphertext).map_err(Error::Io)?;

			output
				.write_all(&wrap::open_unit(key, &nonce, 0, true, &ciphertext)?)
				.map_err(Error::Io)?;
		} else {
			let unit_size = info.chunk_size() + TAG_SIZE;
			let mut buf: Vec<u8> = Vec::new();

			// Full-size units are never last; a stream cut at a unit boundary leaves an empty
			// last unit, which fails to open
			for index in 0u64.. {
				buf.clear();
				let n = read_chunk(input, &mut buf, unit_size)?;
				let last = n < unit_size;

				output
					.write_all(&wrap::open_unit(key, &nonce, index, last, &buf)?)
					.map_err(Error::Io)?;

				if last {
					break;
				}
			}
		}

		output.flush().map_err(Error::Io)
	}
}

/// Read up to `limit` bytes into `buf`, stopping short only at the end of the stream.
fn read_chunk(input: &mut impl Read, buf: &mut Vec<u8>, limit: usize) -> Result<usize, Error> {
	input
		.by_ref()
		.take(limit as u64)
		.read_to_end(buf)
		.map_err(Error::Io)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{ChunkCipher, KeyPair, recipient_cipher::tests::quick_kdf_config};
	use secrecy::ExposeSecret as _;

	fn sample(len: usize) -> Vec<u8> {
		(0..len).map(|i| (i % 251) as u8).collect()
	}

	fn encrypt_for(kp: &KeyPair, data: &[u8], embed: bool) -> (Vec<u8>, Vec<u8>) {
		let mut cipher = StreamCipher::new();
		cipher.add_key_recipient(b"dave", &kp.public_key()).unwrap();

		let mut ciphertext = Vec::new();
		cipher.encrypt(data, &mut ciphertext, embed).unwrap();

		(ciphertext, cipher.content_info().unwrap().unwrap())
	}

	#[test]
	fn multi_chunk_round_trip() {
		crate::test_helpers::init();
		let dave = KeyPair::generate();
		let data = sample(STREAM_CHUNK_SIZE * 2 + 1234);

		let (ciphertext, info) = encrypt_for(&dave, &data, true);
		assert_eq!(info.len() + data.len() + 3 * TAG_SIZE, ciphertext.len());

		let mut decipher = StreamCipher::new();
		let mut plaintext = Vec::new();
		decipher
			.decrypt_with_key(&ciphertext[..], &mut plaintext, b"dave", dave.private_key().expose_secret(), None)
			.unwrap();

		assert_eq!(data, plaintext);
	}

	#[test]
	fn exact_multiple_of_chunk_size() {
		let dave = KeyPair::generate();
		let data = sample(STREAM_CHUNK_SIZE * 2);

		let (ciphertext, info) = encrypt_for(&dave, &data, true);
		assert_eq!(info.len() + data.len() + 3 * TAG_SIZE, ciphertext.len());

		let mut plaintext = Vec::new();
		StreamCipher::new()
			.decrypt_with_key(&ciphertext[..], &mut plaintext, b"dave", dave.private_key().expose_secret(), None)
			.unwrap();

		assert_eq!(data, plaintext);
	}

	#[test]
	fn empty_stream() {
		let dave = KeyPair::generate();

		let (ciphertext, info) = encrypt_for(&dave, b"", true);
		assert_eq!(info.len() + TAG_SIZE, ciphertext.len());

		let mut plaintext = Vec::new();
		StreamCipher::new()
			.decrypt_with_key(&ciphertext[..], &mut plaintext, b"dave", dave.private_key().expose_secret(), None)
			.unwrap();

		assert!(plaintext.is_empty());
	}

	#[test]
	fn detached_password_round_trip() {
		crate::test_helpers::init();
		let data = sample(100_000);

		let mut cipher = StreamCipher::new();
		cipher.set_kdf_config(quick_kdf_config());
		cipher.add_password_recipient("streamy").unwrap();
		let mut ciphertext = Vec::new();
		cipher.encrypt(&data[..], &mut ciphertext, false).unwrap();
		let info = cipher.content_info().unwrap().unwrap();

		let mut decipher = StreamCipher::new();
		decipher.set_kdf_config(quick_kdf_config());
		let mut plaintext = Vec::new();
		assert!(matches!(
			decipher.decrypt_with_password(&ciphertext[..], &mut plaintext, "streamy"),
			Err(Error::MissingContentInfo)
		));

		decipher.set_content_info(&info).unwrap();
		decipher
			.decrypt_with_password(&ciphertext[..], &mut plaintext, "streamy")
			.unwrap();
		assert_eq!(data, plaintext);
	}

	#[test]
	fn truncated_stream_fails() {
		let dave = KeyPair::generate();
		let (ciphertext, _) = encrypt_for(&dave, &sample(5000), true);

		let mut plaintext = Vec::new();
		let result = StreamCipher::new().decrypt_with_key(
			&ciphertext[..ciphertext.len() - 1],
			&mut plaintext,
			b"dave",
			dave.private_key().expose_secret(),
			None,
		);

		assert!(matches!(result, Err(Error::Decryption)));
	}

	#[test]
	fn stream_cut_at_a_chunk_boundary_fails() {
		crate::test_helpers::init();
		let dave = KeyPair::generate();
		let data = sample(STREAM_CHUNK_SIZE * 2 + 10);
		let (ciphertext, info) = encrypt_for(&dave, &data, true);

		for chunks in [1, 2] {
			let cut = info.len() + chunks * (STREAM_CHUNK_SIZE + TAG_SIZE);
			let mut plaintext = Vec::new();
			let result = StreamCipher::new().decrypt_with_key(
				&ciphertext[..cut],
				&mut plaintext,
				b"dave",
				dave.private_key().expose_secret(),
				None,
			);

			assert!(matches!(result, Err(Error::Decryption)));
		}

		// The same goes for an exact multiple of the chunk size, whose last chunk is empty
		let data = sample(STREAM_CHUNK_SIZE);
		let (ciphertext, _) = encrypt_for(&dave, &data, true);

		let mut plaintext = Vec::new();
		let result = StreamCipher::new().decrypt_with_key(
			&ciphertext[..ciphertext.len() - TAG_SIZE],
			&mut plaintext,
			b"dave",
			dave.private_key().expose_secret(),
			None,
		);
		assert!(matches!(result, Err(Error::Decryption)));
	}

	#[test]
	fn truncated_content_info_is_malformed() {
		let dave = KeyPair::generate();
		let (_, info) = encrypt_for(&dave, b"whatever", false);

		let mut plaintext = Vec::new();
		let result = StreamCipher::new().decrypt_with_key(
			&info[..info.len() - 1],
			&mut plaintext,
			b"dave",
			dave.private_key().expose_secret(),
			None,
		);

		assert!(matches!(result, Err(Error::MalformedContentInfo { .. })));
	}

	#[test]
	fn decrypts_other_ciphers_output() {
		let dave = KeyPair::generate();
		let private = dave.private_key();

		let mut whole = RecipientCipher::new();
		whole.add_key_recipient(b"dave", &dave.public_key()).unwrap();
		let ciphertext = whole.encrypt(b"all in one go", true).unwrap();

		let mut plaintext = Vec::new();
		StreamCipher::new()
			.decrypt_with_key(&ciphertext[..], &mut plaintext, b"dave", private.expose_secret(), None)
			.unwrap();
		assert_eq!(b"all in one go".to_vec(), plaintext);

		let mut chunked = ChunkCipher::new();
		chunked.add_key_recipient(b"dave", &dave.public_key()).unwrap();
		chunked.start_encryption(3).unwrap();
		let mut ciphertext = Vec::new();
		let mut chunks = Vec::new();
		for chunk in b"bit by bit".chunks(3) {
			chunks.extend(chunked.process_data_chunk(chunk).unwrap());
		}
		chunks.extend(chunked.finish().unwrap());
		ciphertext.extend(chunked.content_info().unwrap().unwrap());
		ciphertext.extend(chunks);

		let mut plaintext = Vec::new();
		StreamCipher::new()
			.decrypt_with_key(&ciphertext[..], &mut plaintext, b"dave", private.expose_secret(), None)
			.unwrap();
		assert_eq!(b"bit by bit".to_vec(), plaintext);
	}

	#[test]
	fn stream_output_decrypts_as_one_buffer() {
		let dave = KeyPair::generate();
		let data = sample(STREAM_CHUNK_SIZE + 10);
		let (ciphertext, _) = encrypt_for(&dave, &data, true);

		let mut decipher = RecipientCipher::new();
		assert_eq!(
			data,
			decipher
				.decrypt_with_key(&ciphertext, b"dave", dave.private_key().expose_secret(), None)
				.unwrap()
		);
	}
}
