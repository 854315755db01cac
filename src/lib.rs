//! Encrypt once, for many recipients.
//!
//! Each payload is encrypted with a fresh random *content key*, and that key is then wrapped
//! separately for everyone who should be able to read the payload.  Recipients come in two
//! flavours:
//!
//! * **Key recipients** are identified by an id of your choosing, and hold an X25519
//!   [`KeyPair`].  The content key is wrapped with an ephemeral-static Diffie-Hellman exchange
//!   against their public key.
//!
//! * **Password recipients** just know a password.  The content key is wrapped with a key
//!   derived from the password by a [`Pbkdf`], whose cost is governed by a [`KdfConfig`].
//!
//! The wrapped keys, along with any [`CustomParameters`] you attach, make up the *content
//! info*.  That can travel at the front of the ciphertext, or separately, as suits.
//!
//! Payloads can be encrypted all in one go with a [`RecipientCipher`], from a reader to a writer
//! with a [`StreamCipher`], or one chunk at a time with a [`ChunkCipher`].  Chunked payloads have
//! every chunk authenticated on its own, so decryption can start before the whole payload has
//! arrived, and a damaged chunk can't affect any other.  If you need to pick which at runtime, a
//! [`CipherEngine`] can hold any of them.
//!
//! # Example
//!
//! ```rust
//! use sealed_envelope::{Error, KeyPair, RecipientCipher};
//! use secrecy::ExposeSecret as _;
//! # fn main() -> Result<(), Error> {
//!
//! let alice = KeyPair::generate();
//! let bob = KeyPair::generate();
//!
//! let mut cipher = RecipientCipher::new();
//! cipher.add_key_recipient(b"alice", &alice.public_key())?;
//! cipher.add_key_recipient(b"bob", &bob.public_key())?;
//! cipher.set_int("version", 3)?;
//!
//! // The content info goes separately this time
//! let ciphertext = cipher.encrypt(b"For Alice and Bob only", false)?;
//! let content_info = cipher.content_info()?.expect("there are recipients");
//!
//! let mut bobs_cipher = RecipientCipher::new();
//! bobs_cipher.set_content_info(&content_info)?;
//! assert!(bobs_cipher.is_key_recipient_exists(b"alice"));
//! assert_eq!(3, bobs_cipher.int("version")?);
//!
//! let plaintext = bobs_cipher.decrypt_with_key(
//!     &ciphertext,
//!     b"bob",
//!     bob.private_key().expose_secret(),
//!     None,
//! )?;
//! assert_eq!(b"For Alice and Bob only".to_vec(), plaintext);
//!
//! // Alice's id with Bob's key doesn't work, and the error says so
//! let result = bobs_cipher.decrypt_with_key(
//!     &ciphertext,
//!     b"alice",
//!     bob.private_key().expose_secret(),
//!     None,
//! );
//! assert!(matches!(result, Err(Error::UnwrapFailed)));
//! # Ok(())
//! # }
//! ```
mod chunk_cipher;
mod codec;
mod content_info;
mod custom_params;
mod engine;
mod error;
mod kdf;
mod key;
mod key_pair;
mod pbkdf;
mod recipient_cipher;
mod recipient_id;
mod stream_cipher;
mod wrap;

pub use chunk_cipher::{ChunkCipher, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
pub use content_info::{ContentInfo, KeyRecipientEntry, PasswordRecipientEntry};
pub use custom_params::{CustomParameters, CustomValue, ValueType};
pub use engine::{CipherEngine, CipherKind, Envelope};
pub use error::{CIPHER_ERROR_DOMAIN, Error, ErrorDomain, KDF_ERROR_DOMAIN};
pub use key::{CONTENT_KEY_SIZE, ContentKey};
pub use key_pair::KeyPair;
pub use pbkdf::{
	DEFAULT_ITERATIONS, DEFAULT_RANDOM_BYTES_SIZE, KdfConfig, MIN_ITERATIONS, MIN_SALT_SIZE, Pbkdf,
	PbkdfAlgorithm, PbkdfHash,
};
pub use recipient_cipher::RecipientCipher;
pub use recipient_id::RecipientId;
pub use stream_cipher::{STREAM_CHUNK_SIZE, StreamCipher};
