use super::{
	ContentKey, Error, RecipientCipher,
	wrap::{self, NONCE_SIZE, TAG_SIZE},
};

/// Plaintext chunk size used when [`ChunkCipher::start_encryption`] is asked for zero.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// The largest chunk size that will be used, or accepted from a content info.
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024 * 1024;

struct Progress {
	key: ContentKey,
	nonce: [u8; NONCE_SIZE],
	chunk_size: usize,
	index: u64,
	ended: bool,
}

impl Progress {
	fn next_index(&mut self) -> u64 {
		let index = self.index;
		self.index += 1;
		index
	}
}

enum State {
	Idle,
	Encrypting(Progress),
	Decrypting(Progress),
}

/// Encrypts or decrypts a payload one chunk at a time, under a single content info.
///
/// Every chunk is sealed on its own, bound to its position in the payload, so decryption can
/// start as soon as the content info and the first chunk are available, and a damaged chunk
/// fails to decrypt without taking any of the others with it.
///
/// Recipients, content info and custom parameters are all handled by the underlying
/// [`RecipientCipher`], which a [`ChunkCipher`] derefs to.  The chunk size is recorded in the
/// content info, so fetch the content info *after* [`start_encryption`](Self::start_encryption).
///
/// Every chunk but the last must be exactly the chunk size.  A shorter chunk ends the payload;
/// if the payload's length is a multiple of the chunk size, [`finish`](Self::finish) hands back
/// an empty final chunk instead.  Decryption refuses to finish without seeing the final chunk,
/// so a payload that has lost chunks off its end doesn't pass for a shorter one.
///
/// # Example
///
/// ```rust
/// use sealed_envelope::{ChunkCipher, Error, KeyPair};
/// use secrecy::ExposeSecret as _;
/// # fn main() -> Result<(), Error> {
///
/// let bob = KeyPair::generate();
///
/// let mut cipher = ChunkCipher::new();
/// cipher.add_key_recipient(b"bob", &bob.public_key())?;
/// let chunk_size = cipher.start_encryption(16)?;
/// let content_info = cipher.content_info()?.expect("there is a recipient");
///
/// let mut ciphertext = Vec::new();
/// for chunk in b"Some data that will not fit in one chunk".chunks(chunk_size) {
///     ciphertext.push(cipher.process_data_chunk(chunk)?);
/// }
/// let tail = cipher.finish()?;
/// if !tail.is_empty() {
///     ciphertext.push(tail);
/// }
///
/// let mut decipher = ChunkCipher::new();
/// decipher.set_content_info(&content_info)?;
/// decipher.start_decryption_with_key(b"bob", bob.private_key().expose_secret(), None)?;
///
/// let mut plaintext = Vec::new();
/// for chunk in &ciphertext {
///     plaintext.extend(decipher.process_data_chunk(chunk)?);
/// }
/// plaintext.extend(decipher.finish()?);
///
/// assert_eq!(b"Some data that will not fit in one chunk".to_vec(), plaintext);
/// # Ok(())
/// # }
/// ```
pub struct ChunkCipher {
	envelope: RecipientCipher,
	state: State,
}

impl std::fmt::Debug for ChunkCipher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
		let state = match &self.state {
			State::Idle => "idle",
			State::Encrypting(_) => "encrypting",
			State::Decrypting(_) => "decrypting",
		};

		f.debug_struct("ChunkCipher")
			.field("envelope", &self.envelope)
			.field("state", &state)
			.finish()
	}
}

impl Default for ChunkCipher {
	fn default() -> Self {
		Self::new()
	}
}

impl std::ops::Deref for ChunkCipher {
	type Target = RecipientCipher;

	fn deref(&self) -> &RecipientCipher {
		&self.envelope
	}
}

impl std::ops::DerefMut for ChunkCipher {
	fn deref_mut(&mut self) -> &mut RecipientCipher {
		&mut self.envelope
	}
}

impl ChunkCipher {
	pub fn new() -> Self {
		Self {
			envelope: RecipientCipher::new(),
			state: State::Idle,
		}
	}

	fn ensure_idle(&self) -> Result<(), Error> {
		if matches!(self.state, State::Idle) {
			Ok(())
		} else {
			Err(Error::invalid_state("chunk processing already in progress"))
		}
	}

	/// Start encrypting, returning the plaintext size of every chunk but the last (which may be
	/// shorter).  A `preferred_chunk_size` of zero means [`DEFAULT_CHUNK_SIZE`].
	///
	/// # Errors
	///
	/// * [`Error::MissingRecipients`] if there are no recipients.
	/// * [`Error::InvalidArgument`] if `preferred_chunk_size` is over [`MAX_CHUNK_SIZE`].
	/// * [`Error::InvalidState`] if encryption or decryption has already started.
	#[tracing::instrument(level = "debug", skip(self))]
	pub fn start_encryption(&mut self, preferred_chunk_size: usize) -> Result<usize, Error> {
		self.ensure_idle()?;

		let chunk_size = match preferred_chunk_size {
			0 => DEFAULT_CHUNK_SIZE,
			n if n > MAX_CHUNK_SIZE => {
				return Err(Error::invalid_argument(format!(
					"chunk size {n} is larger than {MAX_CHUNK_SIZE}"
				)));
			}
			n => n,
		};

		let (key, nonce) = self.envelope.seal_session(chunk_size)?;

		self.state = State::Encrypting(Progress {
			key,
			nonce,
			chunk_size,
			index: 0,
			ended: false,
		});

		Ok(chunk_size)
	}

	/// Start decrypting as key recipient `id`, returning the size of every encrypted chunk but
	/// the last.  The content info must already have been given to
	/// [`set_content_info`](RecipientCipher::set_content_info).
	#[tracing::instrument(level = "debug", skip_all)]
	pub fn start_decryption_with_key(
		&mut self,
		id: impl AsRef<[u8]>,
		private_key: &[u8],
		key_password: Option<&str>,
	) -> Result<usize, Error> {
		self.ensure_idle()?;

		let key = self
			.envelope
			.recover_key_with_private_key(id, private_key, key_password)?;

		self.start_decryption(key)
	}

	/// Start decrypting as a password recipient, as for
	/// [`start_decryption_with_key`](Self::start_decryption_with_key).
	#[tracing::instrument(level = "debug", skip_all)]
	pub fn start_decryption_with_password(&mut self, password: &str) -> Result<usize, Error> {
		self.ensure_idle()?;

		let key = self.envelope.recover_key_with_password(password)?;

		self.start_decryption(key)
	}

	fn start_decryption(&mut self, key: ContentKey) -> Result<usize, Error> {
		let info = self
			.envelope
			.current_content_info()
			.ok_or(Error::MissingContentInfo)?;

		if info.chunk_size() == 0 {
			return Err(Error::invalid_state("content info is not for chunked data"));
		}

		let chunk_size = info.chunk_size();
		self.state = State::Decrypting(Progress {
			key,
			nonce: *info.nonce(),
			chunk_size,
			index: 0,
			ended: false,
		});

		Ok(chunk_size + TAG_SIZE)
	}

	/// Encrypt or decrypt the next chunk, depending on which was started.
	///
	/// A chunk shorter than the chunk size is the last one.  A chunk that fails to decrypt still
	/// counts, so the chunks after it can be decrypted.
	///
	/// # Errors
	///
	/// * [`Error::InvalidState`] if neither encryption nor decryption has been started, or the
	///   last chunk has already been processed.
	/// * [`Error::InvalidArgument`] if `chunk` is bigger than a chunk can be.
	/// * [`Error::Decryption`] if the chunk is damaged, out of order, or from another payload.
	pub fn process_data_chunk(&mut self, chunk: &[u8]) -> Result<Vec<u8>, Error> {
		match &mut self.state {
			State::Idle => Err(Error::invalid_state(
				"neither encryption nor decryption has been started",
			)),
			State::Encrypting(progress) | State::Decrypting(progress) if progress.ended => {
				Err(Error::invalid_state("the last chunk has already been processed"))
			}
			State::Encrypting(progress) => {
				if chunk.len() > progress.chunk_size {
					return Err(Error::invalid_argument(format!(
						"chunk of {} bytes is over the chunk size of {}",
						chunk.len(),
						progress.chunk_size
					)));
				}

				let last = chunk.len() < progress.chunk_size;
				let index = progress.next_index();
				tracing::trace!(index, len = chunk.len(), last, "Encrypting chunk");
				let sealed = wrap::seal_unit(&progress.key, &progress.nonce, index, last, chunk)?;
				progress.ended = last;

				Ok(sealed)
			}
			State::Decrypting(progress) => {
				let unit_size = progress.chunk_size + TAG_SIZE;
				if chunk.len() > unit_size {
					return Err(Error::invalid_argument(format!(
						"chunk of {} bytes is over the encrypted chunk size of {unit_size}",
						chunk.len(),
					)));
				}

				let last = chunk.len() < unit_size;
				let index = progress.next_index();
				tracing::trace!(index, len = chunk.len(), last, "Decrypting chunk");
				let opened = wrap::open_unit(&progress.key, &progress.nonce, index, last, chunk)?;
				progress.ended = last;

				Ok(opened)
			}
		}
	}

	/// End the current encryption or decryption, discarding the content key.
	///
	/// When encrypting, if every chunk given to [`process_data_chunk`] was full-size, this
	/// returns one more encrypted chunk, holding no data, to mark the end; send it along with
	/// the others.  Otherwise, and always when decrypting, it returns nothing.
	///
	/// [`process_data_chunk`]: Self::process_data_chunk
	///
	/// # Errors
	///
	/// * [`Error::InvalidState`] if nothing was started.
	/// * [`Error::Decryption`] if decrypting, and the final chunk never arrived.
	#[tracing::instrument(level = "debug", skip(self))]
	pub fn finish(&mut self) -> Result<Vec<u8>, Error> {
		match std::mem::replace(&mut self.state, State::Idle) {
			State::Idle => Err(Error::invalid_state("nothing to finish")),
			State::Encrypting(mut progress) => {
				let tail = if progress.ended {
					Vec::new()
				} else {
					let index = progress.next_index();
					wrap::seal_unit(&progress.key, &progress.nonce, index, true, &[])?
				};

				tracing::debug!(chunks = progress.index, "Finished encrypting");
				Ok(tail)
			}
			State::Decrypting(progress) => {
				if !progress.ended {
					tracing::debug!(chunks = progress.index, "Payload ended before its final chunk");
					return Err(Error::Decryption);
				}

				tracing::debug!(chunks = progress.index, "Finished decrypting");
				Ok(Vec::new())
			}
		}
	}
}
