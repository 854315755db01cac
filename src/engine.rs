use super::{ChunkCipher, RecipientCipher, StreamCipher};

/// Anything that encrypts through a [`RecipientCipher`] envelope.
///
/// Recipients, content info, key recovery and custom parameters all live on the envelope, so
/// code that only deals with those can take any kind of cipher.
pub trait Envelope {
	fn envelope(&self) -> &RecipientCipher;

	fn envelope_mut(&mut self) -> &mut RecipientCipher;
}

impl Envelope for RecipientCipher {
	fn envelope(&self) -> &RecipientCipher {
		self
	}

	fn envelope_mut(&mut self) -> &mut RecipientCipher {
		self
	}
}

impl Envelope for StreamCipher {
	fn envelope(&self) -> &RecipientCipher {
		self
	}

	fn envelope_mut(&mut self) -> &mut RecipientCipher {
		self
	}
}

impl Envelope for ChunkCipher {
	fn envelope(&self) -> &RecipientCipher {
		self
	}

	fn envelope_mut(&mut self) -> &mut RecipientCipher {
		self
	}
}

/// The kinds of [`CipherEngine`] there are.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CipherKind {
	/// Whole buffers at once; see [`RecipientCipher`].
	Recipient,
	/// `Read` to `Write`; see [`StreamCipher`].
	Stream,
	/// Caller-driven chunks; see [`ChunkCipher`].
	Chunk,
}

/// One cipher, of whichever kind was asked for.
///
/// # Example
///
/// ```rust
/// use sealed_envelope::{CipherEngine, CipherKind, Envelope as _, KeyPair};
/// # fn main() -> Result<(), sealed_envelope::Error> {
///
/// let erin = KeyPair::generate();
///
/// for kind in [CipherKind::Recipient, CipherKind::Stream, CipherKind::Chunk] {
///     let mut engine = CipherEngine::new(kind);
///     engine.envelope_mut().add_key_recipient(b"erin", &erin.public_key())?;
///     assert!(engine.envelope().is_key_recipient_exists(b"erin"));
///     assert_eq!(kind, engine.kind());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub enum CipherEngine {
	Recipient(RecipientCipher),
	Stream(StreamCipher),
	Chunk(ChunkCipher),
}

impl CipherEngine {
	pub fn new(kind: CipherKind) -> Self {
		tracing::debug!(?kind, "Creating cipher engine");

		match kind {
			CipherKind::Recipient => CipherEngine::Recipient(RecipientCipher::new()),
			CipherKind::Stream => CipherEngine::Stream(StreamCipher::new()),
			CipherKind::Chunk => CipherEngine::Chunk(ChunkCipher::new()),
		}
	}

	pub fn kind(&self) -> CipherKind {
		match self {
			CipherEngine::Recipient(_) => CipherKind::Recipient,
			CipherEngine::Stream(_) => CipherKind::Stream,
			CipherEngine::Chunk(_) => CipherKind::Chunk,
		}
	}
}

impl Envelope for CipherEngine {
	fn envelope(&self) -> &RecipientCipher {
		match self {
			CipherEngine::Recipient(c) => c.envelope(),
			CipherEngine::Stream(c) => c.envelope(),
			CipherEngine::Chunk(c) => c.envelope(),
		}
	}

	fn envelope_mut(&mut self) -> &mut RecipientCipher {
		match self {
			CipherEngine::Recipient(c) => c.envelope_mut(),
			CipherEngine::Stream(c) => c.envelope_mut(),
			CipherEngine::Chunk(c) => c.envelope_mut(),
		}
	}
}

impl From<RecipientCipher> for CipherEngine {
	fn from(c: RecipientCipher) -> Self {
		CipherEngine::Recipient(c)
	}
}

impl From<StreamCipher> for CipherEngine {
	fn from(c: StreamCipher) -> Self {
		CipherEngine::Stream(c)
	}
}

impl From<ChunkCipher> for CipherEngine {
	fn from(c: ChunkCipher) -> Self {
		CipherEngine::Chunk(c)
	}
}
