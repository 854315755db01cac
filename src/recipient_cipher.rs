use secrecy::{ExposeSecret as _, SecretString};
use std::collections::BTreeMap;
use x25519_dalek::PublicKey;

use super::{
	ContentInfo, ContentKey, CustomParameters, Error, KdfConfig, Pbkdf, RecipientId,
	content_info::{KeyRecipientEntry, PasswordRecipientEntry},
	key_pair,
	wrap::{self, NONCE_SIZE, TAG_SIZE},
};

/// A content key along with the content info that carries it to the recipients.
struct Session {
	key: ContentKey,
	info: ContentInfo,
}

enum State {
	/// Nothing produced or parsed yet, or the last session was abandoned.
	Idle,
	/// Content info has been handed out, but nothing encrypted with its key yet.
	Prepared(Session),
	/// Payload has been encrypted; the key is gone, so the nonce can never be reused.
	Sealed(ContentInfo),
	/// Content info came from someone else, for decryption.
	Opened(ContentInfo),
}

/// Encrypts data for any number of recipients, and decrypts data sent to one of them.
///
/// Each encryption generates a fresh random content key, which encrypts the payload.  The
/// content key is then wrapped separately for every recipient: *key recipients* get it sealed
/// to their X25519 public key, and *password recipients* get it sealed with a key derived from
/// their password.  The wrapped keys, together with the [`CustomParameters`], make up the
/// content info, which can be embedded at the front of the ciphertext or handed over
/// separately.
///
/// The recipients are "frozen" into the content info the moment it's produced; adding or
/// removing recipients after that affects the *next* encryption, not the current one.
///
/// # Example
///
/// ```rust
/// use sealed_envelope::{Error, KeyPair, RecipientCipher};
/// # fn main() -> Result<(), Error> {
///
/// let alice = KeyPair::generate();
/// let mut cipher = RecipientCipher::new();
/// cipher.add_key_recipient(b"alice", &alice.public_key())?;
/// cipher.set_string("content-type", "text/plain")?;
///
/// let ciphertext = cipher.encrypt(b"Hello, Alice!", true)?;
///
/// // Alice doesn't need anything but the ciphertext and her private key
/// let mut decipher = RecipientCipher::new();
/// let plaintext = decipher.decrypt_with_key(
///     &ciphertext,
///     b"alice",
///     secrecy::ExposeSecret::expose_secret(&alice.private_key()),
///     None,
/// )?;
/// assert_eq!(b"Hello, Alice!".to_vec(), plaintext);
/// assert_eq!("text/plain", decipher.string("content-type")?);
///
/// // Nobody else can, though
/// let mut mallory = RecipientCipher::new();
/// let result = mallory.decrypt_with_key(
///     &ciphertext,
///     b"mallory",
///     secrecy::ExposeSecret::expose_secret(&KeyPair::generate().private_key()),
///     None,
/// );
/// assert!(matches!(result, Err(Error::RecipientNotFound)));
/// # Ok(())
/// # }
/// ```
pub struct RecipientCipher {
	key_recipients: BTreeMap<RecipientId, PublicKey>,
	password_recipients: Vec<SecretString>,
	custom_parameters: CustomParameters,
	kdf_config: KdfConfig,
	state: State,
}

impl std::fmt::Debug for RecipientCipher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
		f.debug_struct("RecipientCipher")
			.field(
				"key_recipients",
				&self.key_recipients.keys().map(ToString::to_string).collect::<Vec<_>>(),
			)
			.field("password_recipients", &self.password_recipients.len())
			.field("custom_parameters", &self.custom_parameters)
			.field("kdf_config", &self.kdf_config)
			.finish_non_exhaustive()
	}
}

impl Default for RecipientCipher {
	fn default() -> Self {
		Self::new()
	}
}

impl RecipientCipher {
	pub fn new() -> Self {
		Self {
			key_recipients: BTreeMap::new(),
			password_recipients: Vec::new(),
			custom_parameters: CustomParameters::default(),
			kdf_config: KdfConfig::default(),
			state: State::Idle,
		}
	}

	/// Add a recipient who will decrypt with the private half of `public_key`.
	///
	/// Adding an `id` that's already present replaces its public key.
	///
	/// # Errors
	///
	/// [`Error::InvalidArgument`] if `id` is empty, or `public_key` is not a public key as
	/// produced by [`KeyPair::public_key`](crate::KeyPair::public_key).
	#[tracing::instrument(level = "debug", skip_all)]
	pub fn add_key_recipient(&mut self, id: impl AsRef<[u8]>, public_key: &[u8]) -> Result<(), Error> {
		let id = RecipientId::new(id)?;

		if public_key.is_empty() {
			return Err(Error::invalid_argument("public key must not be empty"));
		}

		let public_key = key_pair::parse_public_key(public_key)
			.map_err(|e| Error::invalid_argument(e.to_string()))?;

		if self.key_recipients.insert(id.clone(), public_key).is_some() {
			tracing::debug!(recipient_id = %id, "Replaced key recipient");
		} else {
			tracing::debug!(recipient_id = %id, "Added key recipient");
		}

		Ok(())
	}

	/// Remove a key recipient.  Removing a recipient that isn't there is fine.
	pub fn remove_key_recipient(&mut self, id: impl AsRef<[u8]>) -> Result<(), Error> {
		if let Ok(id) = RecipientId::new(id) {
			if self.key_recipients.remove(&id).is_some() {
				tracing::debug!(recipient_id = %id, "Removed key recipient");
			}
		}

		Ok(())
	}

	/// Whether `id` is a key recipient, either one that's been added (and not since removed), or
	/// one in a content info given to [`set_content_info`](Self::set_content_info).
	pub fn is_key_recipient_exists(&self, id: impl AsRef<[u8]>) -> bool {
		let Ok(id) = RecipientId::new(id) else {
			return false;
		};

		if self.key_recipients.contains_key(&id) {
			return true;
		}

		// Content info made here only ever holds recipients from the live set
		match &self.state {
			State::Opened(info) => info.key_recipient(&id).is_some(),
			State::Idle | State::Prepared(_) | State::Sealed(_) => false,
		}
	}

	#[tracing::instrument(level = "debug", skip_all)]
	pub fn add_password_recipient(&mut self, password: &str) -> Result<(), Error> {
		if password.is_empty() {
			return Err(Error::invalid_argument("password must not be empty"));
		}

		if !self.has_password(password) {
			self.password_recipients.push(password.into());
			tracing::debug!(count = self.password_recipients.len(), "Added password recipient");
		}

		Ok(())
	}

	/// Remove a password recipient.  Removing a password that isn't there is fine.
	#[tracing::instrument(level = "debug", skip_all)]
	pub fn remove_password_recipient(&mut self, password: &str) -> Result<(), Error> {
		self.password_recipients
			.retain(|p| !constant_time_eq::constant_time_eq(p.expose_secret().as_bytes(), password.as_bytes()));

		Ok(())
	}

	fn has_password(&self, password: &str) -> bool {
		self.password_recipients
			.iter()
			.any(|p| constant_time_eq::constant_time_eq(p.expose_secret().as_bytes(), password.as_bytes()))
	}

	pub fn remove_all_recipients(&mut self) -> Result<(), Error> {
		tracing::debug!("Removing all recipients");
		self.key_recipients.clear();
		self.password_recipients.clear();

		Ok(())
	}

	/// Set the parameters used to derive keys for password recipients.
	///
	/// Whether recommendations are enforced also governs decryption: a content info whose
	/// password entries were made with weak parameters can only be opened with enforcement off.
	pub fn set_kdf_config(&mut self, config: KdfConfig) {
		self.kdf_config = config;
	}

	pub fn kdf_config(&self) -> &KdfConfig {
		&self.kdf_config
	}

	/// The serialized content info for the current session.
	///
	/// The first call after recipients have been added starts a session: a new content key is
	/// generated and wrapped for every recipient.  Later calls return the same recipient entries,
	/// with whatever the custom parameters are *now*.  Returns `None` if there are no recipients
	/// and no content info has been made or set.
	///
	/// After an encryption, this is the content info *of that encryption*, and stays so until
	/// the next one, which starts a session of its own.  So for detached content info, take it
	/// after [`encrypt`](Self::encrypt): content info taken between two encryptions belongs to
	/// the first, and won't open the second.
	#[tracing::instrument(level = "debug", skip(self))]
	pub fn content_info(&mut self) -> Result<Option<Vec<u8>>, Error> {
		if matches!(self.state, State::Idle) {
			if self.key_recipients.is_empty() && self.password_recipients.is_empty() {
				return Ok(None);
			}

			self.state = State::Prepared(self.new_session()?);
		}

		let Some(info) = self.current_content_info() else {
			return Ok(None);
		};

		let mut info = info.clone();
		info.set_custom_parameters(self.custom_parameters.clone());

		info.to_bytes().map(Some)
	}

	/// Use `content_info` for decryption.  Its custom parameters replace any already set.
	///
	/// # Errors
	///
	/// [`Error::MalformedContentInfo`] if `content_info` is anything other than exactly one
	/// well-formed content info.  Nothing changes on error.
	#[tracing::instrument(level = "debug", skip_all)]
	pub fn set_content_info(&mut self, content_info: &[u8]) -> Result<(), Error> {
		let info = ContentInfo::from_bytes(content_info)?;
		self.open_content_info(info);

		Ok(())
	}

	pub(crate) fn open_content_info(&mut self, info: ContentInfo) {
		self.custom_parameters = info.custom_parameters().clone();
		self.state = State::Opened(info);
	}

	/// How many leading bytes of `data` are an embedded content info (zero if there isn't one).
	pub fn content_info_size_in_data(&self, data: &[u8]) -> Result<usize, Error> {
		ContentInfo::size_in_data(data)
	}

	/// The content info of the current session, or the one given to
	/// [`set_content_info`](Self::set_content_info).
	///
	/// Its custom parameters are as they were when it was made or parsed; the cipher's own
	/// [`custom_parameters`](Self::custom_parameters) are the live ones.
	pub fn current_content_info(&self) -> Option<&ContentInfo> {
		match &self.state {
			State::Idle => None,
			State::Prepared(session) => Some(&session.info),
			State::Sealed(info) | State::Opened(info) => Some(info),
		}
	}

	#[tracing::instrument(level = "debug", skip(self))]
	fn new_session(&self) -> Result<Session, Error> {
		if self.key_recipients.is_empty() && self.password_recipients.is_empty() {
			return Err(Error::MissingRecipients);
		}

		let key = ContentKey::generate();

		let mut key_entries = Vec::with_capacity(self.key_recipients.len());
		for (id, public_key) in &self.key_recipients {
			let wrapped = wrap::wrap_for_public_key(&key, id, public_key)?;
			key_entries.push(KeyRecipientEntry::new(id.clone(), wrapped));
		}

		let mut password_entries = Vec::with_capacity(self.password_recipients.len());
		for password in &self.password_recipients {
			// A fresh Pbkdf per recipient gets a fresh salt, unless the config pins one
			let kdf = Pbkdf::from_config(&self.kdf_config);
			let wrapped = wrap::wrap_with_password(key.expose_secret(), password.expose_secret(), &kdf)?;
			password_entries.push(PasswordRecipientEntry::new(kdf, wrapped));
		}

		tracing::debug!(
			key_recipients = key_entries.len(),
			password_recipients = password_entries.len(),
			"Started encryption session"
		);

		Ok(Session {
			key,
			info: ContentInfo::new(wrap::random_nonce(), key_entries, password_entries),
		})
	}

	/// Take the prepared session (or start one), and mark it used.
	pub(crate) fn seal_session(
		&mut self,
		chunk_size: usize,
	) -> Result<(ContentKey, [u8; NONCE_SIZE]), Error> {
		let session = match std::mem::replace(&mut self.state, State::Idle) {
			State::Prepared(session) => session,
			other => {
				self.state = other;
				self.new_session()?
			}
		};

		let Session { key, mut info } = session;
		info.set_chunk_size(chunk_size);
		let nonce = *info.nonce();
		self.state = State::Sealed(info);

		Ok((key, nonce))
	}

	/// Recover the content key from the current content info with a key recipient's private
	/// key.  If the private key is password-protected, `key_password` unlocks it.
	///
	/// # Errors
	///
	/// * [`Error::MissingContentInfo`] if there's no content info to look in.
	/// * [`Error::RecipientNotFound`] if `id` isn't in the content info.
	/// * [`Error::UnwrapFailed`] if `private_key` (or `key_password`) is wrong, or the content
	///   info has been tampered with.
	#[tracing::instrument(level = "debug", skip_all, fields(recipient_id = tracing::field::Empty))]
	pub fn recover_key_with_private_key(
		&self,
		id: impl AsRef<[u8]>,
		private_key: &[u8],
		key_password: Option<&str>,
	) -> Result<ContentKey, Error> {
		let info = self.current_content_info().ok_or(Error::MissingContentInfo)?;
		let id = RecipientId::new(id)?;
		tracing::Span::current().record("recipient_id", tracing::field::display(&id));

		let Some(entry) = info.key_recipient(&id) else {
			tracing::debug!("Recipient not in content info");
			return Err(Error::RecipientNotFound);
		};

		let private_key = key_pair::parse_private_key(
			private_key,
			key_password,
			self.kdf_config.recommendations_enforced,
		)?;

		wrap::unwrap_with_private_key(entry.wrapped_key(), &id, private_key.expose_secret())
	}

	/// Recover the content key from the current content info with a password.
	///
	/// # Errors
	///
	/// * [`Error::MissingContentInfo`] if there's no content info to look in.
	/// * [`Error::RecipientNotFound`] if the content info has no password recipients at all.
	/// * [`Error::UnwrapFailed`] if none of them can be opened with `password`.
	/// * [`Error::WeakParameters`] if recommendations are enforced, no entry could be opened, and
	///   some entry was skipped for not meeting them.
	#[tracing::instrument(level = "debug", skip_all)]
	pub fn recover_key_with_password(&self, password: &str) -> Result<ContentKey, Error> {
		let info = self.current_content_info().ok_or(Error::MissingContentInfo)?;

		if info.password_recipients().is_empty() {
			tracing::debug!("Content info has no password recipients");
			return Err(Error::RecipientNotFound);
		}

		let mut weak = None;

		for entry in info.password_recipients() {
			let mut kdf = entry.kdf().clone();
			if !self.kdf_config.recommendations_enforced {
				kdf.disable_recommendations_check();
			}

			match wrap::unwrap_with_password(entry.wrapped_key(), password, &kdf) {
				Ok(key) => return ContentKey::from_slice(key.expose_secret()).ok_or(Error::UnwrapFailed),
				Err(Error::UnwrapFailed) => continue,
				Err(e @ Error::WeakParameters(_)) => {
					tracing::debug!("Skipping password entry with weak parameters");
					weak = Some(e);
				}
				Err(e) => return Err(e),
			}
		}

		Err(weak.unwrap_or(Error::UnwrapFailed))
	}

	/// Encrypt `plaintext` for every recipient.
	///
	/// If [`content_info`](Self::content_info) has been called since the last encryption, the
	/// key it prepared is used; otherwise a new session is started.  Either way, the content key
	/// is discarded afterwards, and the content info stays available from
	/// [`content_info`](Self::content_info) until the next encryption.
	///
	/// # Errors
	///
	/// [`Error::MissingRecipients`] if there are no recipients.
	#[tracing::instrument(level = "debug", skip(self, plaintext))]
	pub fn encrypt(&mut self, plaintext: &[u8], embed_content_info: bool) -> Result<Vec<u8>, Error> {
		let (key, nonce) = self.seal_session(0)?;

		let ciphertext = wrap::seal_unit(&key, &nonce, 0, true, plaintext)?;

		if embed_content_info {
			let mut v = self.content_info()?.ok_or_else(|| Error::insanity("sealed session has no content info"))?;
			v.extend_from_slice(&ciphertext);
			Ok(v)
		} else {
			Ok(ciphertext)
		}
	}

	/// Decrypt `data` as key recipient `id`.
	///
	/// If `data` starts with an embedded content info, that's used (and replaces any set
	/// already); otherwise the content info must have been given to
	/// [`set_content_info`](Self::set_content_info).
	#[tracing::instrument(level = "debug", skip_all)]
	pub fn decrypt_with_key(
		&mut self,
		data: &[u8],
		id: impl AsRef<[u8]>,
		private_key: &[u8],
		key_password: Option<&str>,
	) -> Result<Vec<u8>, Error> {
		let payload = self.take_embedded_content_info(data)?;
		let key = self.recover_key_with_private_key(id, private_key, key_password)?;

		self.open_payload(&key, payload)
	}

	/// Decrypt `data` as a password recipient.  The content info is found as for
	/// [`decrypt_with_key`](Self::decrypt_with_key).
	#[tracing::instrument(level = "debug", skip_all)]
	pub fn decrypt_with_password(&mut self, data: &[u8], password: &str) -> Result<Vec<u8>, Error> {
		let payload = self.take_embedded_content_info(data)?;
		let key = self.recover_key_with_password(password)?;

		self.open_payload(&key, payload)
	}

	fn take_embedded_content_info<'a>(&mut self, data: &'a [u8]) -> Result<&'a [u8], Error> {
		let size = ContentInfo::size_in_data(data)?;

		if size > 0 {
			tracing::debug!(size, "Found embedded content info");
			self.set_content_info(&data[..size])?;
			Ok(&data[size..])
		} else if self.current_content_info().is_some() {
			Ok(data)
		} else {
			Err(Error::MissingContentInfo)
		}
	}

	fn open_payload(&self, key: &ContentKey, payload: &[u8]) -> Result<Vec<u8>, Error> {
		let info = self.current_content_info().ok_or(Error::MissingContentInfo)?;
		let nonce = info.nonce();

		if info.chunk_size() == 0 {
			return wrap::open_unit(key, nonce, 0, true, payload);
		}

		// Full-size units are never last, so a payload cut at a unit boundary leaves an empty
		// last unit, which fails to open
		let unit_size = info.chunk_size() + TAG_SIZE;
		let mut plaintext = Vec::with_capacity(payload.len());
		let mut rest = payload;
		let mut index = 0u64;

		while rest.len() >= unit_size {
			let (unit, tail) = rest.split_at(unit_size);
			plaintext.extend_from_slice(&wrap::open_unit(key, nonce, index, false, unit)?);
			rest = tail;
			index += 1;
		}
		plaintext.extend_from_slice(&wrap::open_unit(key, nonce, index, true, rest)?);

		Ok(plaintext)
	}

	pub fn custom_parameters(&self) -> &CustomParameters {
		&self.custom_parameters
	}

	pub fn custom_parameters_mut(&mut self) -> &mut CustomParameters {
		&mut self.custom_parameters
	}

	pub fn set_int(&mut self, key: &str, value: i32) -> Result<(), Error> {
		self.custom_parameters.set_int(key, value)
	}

	pub fn int(&self, key: &str) -> Result<i32, Error> {
		self.custom_parameters.int(key)
	}

	pub fn remove_int(&mut self, key: &str) {
		self.custom_parameters.remove_int(key)
	}

	pub fn set_string(&mut self, key: &str, value: impl Into<String>) -> Result<(), Error> {
		self.custom_parameters.set_string(key, value)
	}

	pub fn string(&self, key: &str) -> Result<&str, Error> {
		self.custom_parameters.string(key)
	}

	pub fn remove_string(&mut self, key: &str) {
		self.custom_parameters.remove_string(key)
	}

	pub fn set_data(&mut self, key: &str, value: impl AsRef<[u8]>) -> Result<(), Error> {
		self.custom_parameters.set_data(key, value)
	}

	pub fn data(&self, key: &str) -> Result<&[u8], Error> {
		self.custom_parameters.data(key)
	}

	pub fn remove_data(&mut self, key: &str) {
		self.custom_parameters.remove_data(key)
	}

	pub fn is_empty_custom_parameters(&self) -> bool {
		self.custom_parameters.is_empty()
	}

	pub fn clear_custom_parameters(&mut self) {
		self.custom_parameters.clear()
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use crate::{KeyPair, PbkdfHash, ValueType};

	/// Cheap enough to run lots of times in tests.
	pub(crate) fn quick_kdf_config() -> KdfConfig {
		KdfConfig {
			iterations: 1_000,
			hash: PbkdfHash::Sha256,
			recommendations_enforced: false,
			..KdfConfig::default()
		}
	}

	fn private(kp: &KeyPair) -> Vec<u8> {
		kp.private_key().expose_secret().to_vec()
	}

	fn session_key(cipher: &RecipientCipher) -> ContentKey {
		match &cipher.state {
			State::Prepared(session) => session.key.clone(),
			_ => panic!("no prepared session"),
		}
	}

	#[test]
	fn key_recipient_existence_tracks_the_live_set() {
		let mut cipher = RecipientCipher::new();
		let kp = KeyPair::generate();

		assert!(!cipher.is_key_recipient_exists(b"idA"));
		cipher.add_key_recipient(b"idA", &kp.public_key()).unwrap();
		assert!(cipher.is_key_recipient_exists(b"idA"));
		cipher.remove_key_recipient(b"idA").unwrap();
		assert!(!cipher.is_key_recipient_exists(b"idA"));

		// Again, for idempotence
		cipher.remove_key_recipient(b"idA").unwrap();
		cipher.remove_key_recipient(b"").unwrap();
		assert!(!cipher.is_key_recipient_exists(b"idA"));
	}

	#[test]
	fn removed_recipients_stop_existing_once_content_info_is_made() {
		let mut cipher = RecipientCipher::new();
		cipher.add_key_recipient(b"idA", &KeyPair::generate().public_key()).unwrap();
		cipher.add_key_recipient(b"idB", &KeyPair::generate().public_key()).unwrap();
		cipher.content_info().unwrap().unwrap();

		cipher.remove_key_recipient(b"idA").unwrap();
		assert!(!cipher.is_key_recipient_exists(b"idA"));
		assert!(cipher.is_key_recipient_exists(b"idB"));

		cipher.encrypt(b"sealed with both", false).unwrap();
		cipher.remove_all_recipients().unwrap();
		assert!(!cipher.is_key_recipient_exists(b"idB"));
	}

	#[test]
	fn bad_key_recipients_are_refused() {
		let mut cipher = RecipientCipher::new();
		let kp = KeyPair::generate();

		assert!(matches!(
			cipher.add_key_recipient(b"", &kp.public_key()),
			Err(Error::InvalidArgument(_))
		));
		assert!(matches!(
			cipher.add_key_recipient(b"id", b""),
			Err(Error::InvalidArgument(_))
		));
		assert!(matches!(
			cipher.add_key_recipient(b"id", &private(&kp)),
			Err(Error::InvalidArgument(_))
		));
	}

	#[test]
	fn empty_password_is_refused() {
		let mut cipher = RecipientCipher::new();
		assert!(matches!(
			cipher.add_password_recipient(""),
			Err(Error::InvalidArgument(_))
		));
	}

	#[test]
	fn no_recipients_means_no_content_info() {
		let mut cipher = RecipientCipher::new();

		assert!(cipher.content_info().unwrap().is_none());
		assert!(matches!(
			cipher.encrypt(b"nobody to read this", true),
			Err(Error::MissingRecipients)
		));
	}

	#[test]
	fn two_key_recipients_make_two_entries() {
		crate::test_helpers::init();
		let mut cipher = RecipientCipher::new();
		cipher.add_key_recipient(b"idA", &KeyPair::generate().public_key()).unwrap();
		cipher.add_key_recipient(b"idB", &KeyPair::generate().public_key()).unwrap();

		let bytes = cipher.content_info().unwrap().unwrap();
		let info = ContentInfo::from_bytes(&bytes).unwrap();

		assert_eq!(2, info.key_recipients().len());
		assert_eq!(0, info.password_recipients().len());
		assert_eq!(b"idA", info.key_recipients()[0].id().as_bytes());
		assert_eq!(b"idB", info.key_recipients()[1].id().as_bytes());
	}

	#[test]
	fn duplicate_key_recipient_replaces() {
		let first = KeyPair::generate();
		let second = KeyPair::generate();
		let mut cipher = RecipientCipher::new();
		cipher.add_key_recipient(b"id", &first.public_key()).unwrap();
		cipher.add_key_recipient(b"id", &second.public_key()).unwrap();

		let ciphertext = cipher.encrypt(b"for the second key", true).unwrap();

		let mut decipher = RecipientCipher::new();
		assert!(matches!(
			decipher.decrypt_with_key(&ciphertext, b"id", &private(&first), None),
			Err(Error::UnwrapFailed)
		));
		assert_eq!(
			b"for the second key".to_vec(),
			decipher
				.decrypt_with_key(&ciphertext, b"id", &private(&second), None)
				.unwrap()
		);
	}

	#[test]
	fn password_recovery_distinguishes_wrong_password() {
		crate::test_helpers::init();
		let mut cipher = RecipientCipher::new();
		cipher.set_kdf_config(quick_kdf_config());
		cipher.add_password_recipient("correct-password").unwrap();

		let bytes = cipher.content_info().unwrap().unwrap();
		let original = session_key(&cipher);

		let mut decipher = RecipientCipher::new();
		decipher.set_kdf_config(quick_kdf_config());
		decipher.set_content_info(&bytes).unwrap();

		assert!(matches!(
			decipher.recover_key_with_password("wrong-password"),
			Err(Error::UnwrapFailed)
		));
		assert_eq!(
			original,
			decipher.recover_key_with_password("correct-password").unwrap()
		);
	}

	#[test]
	fn key_recovery_distinguishes_missing_recipient() {
		let alice = KeyPair::generate();
		let mut cipher = RecipientCipher::new();
		cipher.add_key_recipient(b"alice", &alice.public_key()).unwrap();
		let bytes = cipher.content_info().unwrap().unwrap();
		let original = session_key(&cipher);

		let mut decipher = RecipientCipher::new();
		decipher.set_content_info(&bytes).unwrap();

		assert!(matches!(
			decipher.recover_key_with_private_key(b"bob", &private(&alice), None),
			Err(Error::RecipientNotFound)
		));
		assert!(matches!(
			decipher.recover_key_with_private_key(b"alice", &private(&KeyPair::generate()), None),
			Err(Error::UnwrapFailed)
		));
		assert_eq!(
			original,
			decipher
				.recover_key_with_private_key(b"alice", &private(&alice), None)
				.unwrap()
		);

		// No password recipients at all is a different thing from a wrong password
		assert!(matches!(
			decipher.recover_key_with_password("anything"),
			Err(Error::RecipientNotFound)
		));
	}

	#[test]
	fn parsed_content_info_recipients_exist() {
		let mut cipher = RecipientCipher::new();
		cipher.add_key_recipient(b"alice", &KeyPair::generate().public_key()).unwrap();
		let bytes = cipher.content_info().unwrap().unwrap();

		let mut decipher = RecipientCipher::new();
		assert!(!decipher.is_key_recipient_exists(b"alice"));
		decipher.set_content_info(&bytes).unwrap();
		assert!(decipher.is_key_recipient_exists(b"alice"));
		assert!(!decipher.is_key_recipient_exists(b"bob"));
	}

	#[test]
	fn custom_parameters_survive_the_trip() {
		let mut cipher = RecipientCipher::new();
		cipher.add_key_recipient(b"alice", &KeyPair::generate().public_key()).unwrap();
		cipher.set_int("v", 7).unwrap();

		let bytes = cipher.content_info().unwrap().unwrap();

		let mut decipher = RecipientCipher::new();
		decipher.set_content_info(&bytes).unwrap();

		assert_eq!(7, decipher.int("v").unwrap());
		assert!(matches!(
			decipher.string("v"),
			Err(Error::TypeMismatch {
				expected: ValueType::String,
				found: ValueType::Int,
				..
			})
		));
	}

	#[test]
	fn recipients_freeze_but_parameters_do_not() {
		let mut cipher = RecipientCipher::new();
		cipher.add_key_recipient(b"alice", &KeyPair::generate().public_key()).unwrap();

		let first = cipher.content_info().unwrap().unwrap();

		cipher.add_key_recipient(b"bob", &KeyPair::generate().public_key()).unwrap();
		cipher.set_string("late", "addition").unwrap();

		let second = ContentInfo::from_bytes(&cipher.content_info().unwrap().unwrap()).unwrap();
		let first = ContentInfo::from_bytes(&first).unwrap();

		assert_eq!(first.key_recipients(), second.key_recipients());
		assert_eq!("addition", second.custom_parameters().string("late").unwrap());

		// ... but the next session picks up Bob
		cipher.encrypt(b"", false).unwrap();
		cipher.encrypt(b"", false).unwrap();
		let third = ContentInfo::from_bytes(&cipher.content_info().unwrap().unwrap()).unwrap();
		assert_eq!(2, third.key_recipients().len());
	}

	#[test]
	fn every_encryption_gets_a_fresh_key() {
		let alice = KeyPair::generate();
		let mut cipher = RecipientCipher::new();
		cipher.add_key_recipient(b"alice", &alice.public_key()).unwrap();

		let one = cipher.encrypt(b"same plaintext", true).unwrap();
		let two = cipher.encrypt(b"same plaintext", true).unwrap();
		assert_ne!(one, two);

		for ct in [one, two] {
			let mut decipher = RecipientCipher::new();
			assert_eq!(
				b"same plaintext".to_vec(),
				decipher.decrypt_with_key(&ct, b"alice", &private(&alice), None).unwrap()
			);
		}
	}

	#[test]
	fn content_info_belongs_to_the_last_encryption() {
		let alice = KeyPair::generate();
		let mut cipher = RecipientCipher::new();
		cipher.add_key_recipient(b"alice", &alice.public_key()).unwrap();

		let first = cipher.encrypt(b"first", false).unwrap();
		let between = cipher.content_info().unwrap().unwrap();
		let second = cipher.encrypt(b"second", false).unwrap();
		let after = cipher.content_info().unwrap().unwrap();

		let open = |info: &[u8], ct: &[u8]| {
			let mut decipher = RecipientCipher::new();
			decipher.set_content_info(info).unwrap();
			decipher.decrypt_with_key(ct, b"alice", &private(&alice), None)
		};

		assert_eq!(b"first".to_vec(), open(&between, &first).unwrap());
		assert_eq!(b"second".to_vec(), open(&after, &second).unwrap());
		assert!(matches!(open(&between, &second), Err(Error::Decryption)));
	}

	#[test]
	fn detached_content_info_round_trip() {
		crate::test_helpers::init();
		let mut cipher = RecipientCipher::new();
		cipher.set_kdf_config(quick_kdf_config());
		cipher.add_password_recipient("hunter2").unwrap();
		cipher.add_password_recipient("swordfish").unwrap();

		let ciphertext = cipher.encrypt(b"detached", false).unwrap();
		let info = cipher.content_info().unwrap().unwrap();

		let mut decipher = RecipientCipher::new();
		decipher.set_kdf_config(quick_kdf_config());
		assert!(matches!(
			decipher.decrypt_with_password(&ciphertext, "swordfish"),
			Err(Error::MissingContentInfo)
		));

		decipher.set_content_info(&info).unwrap();
		assert_eq!(
			b"detached".to_vec(),
			decipher.decrypt_with_password(&ciphertext, "swordfish").unwrap()
		);
		assert!(matches!(
			decipher.decrypt_with_password(&ciphertext, "letmein"),
			Err(Error::UnwrapFailed)
		));
	}

	#[test]
	fn weak_password_entries_need_enforcement_off() {
		let mut cipher = RecipientCipher::new();
		cipher.set_kdf_config(quick_kdf_config());
		cipher.add_password_recipient("pw").unwrap();
		let ciphertext = cipher.encrypt(b"weakly protected", true).unwrap();

		let mut strict = RecipientCipher::new();
		assert!(matches!(
			strict.decrypt_with_password(&ciphertext, "pw"),
			Err(Error::WeakParameters(_))
		));
	}

	#[test]
	fn weak_password_entry_does_not_hide_a_strong_one() {
		crate::test_helpers::init();
		let key = ContentKey::generate();

		let mut weak_kdf = Pbkdf::new(b"", 1_000);
		weak_kdf.disable_recommendations_check();
		let weak = PasswordRecipientEntry::new(
			weak_kdf.clone(),
			wrap::wrap_with_password(key.expose_secret(), "pw", &weak_kdf).unwrap(),
		);

		let mut strong_kdf = Pbkdf::new(b"", crate::MIN_ITERATIONS);
		strong_kdf.set_hash(PbkdfHash::Sha256);
		let strong = PasswordRecipientEntry::new(
			strong_kdf.clone(),
			wrap::wrap_with_password(key.expose_secret(), "pw", &strong_kdf).unwrap(),
		);

		let both = ContentInfo::new(wrap::random_nonce(), Vec::new(), vec![weak.clone(), strong]);
		let mut decipher = RecipientCipher::new();
		decipher.set_content_info(&both.to_bytes().unwrap()).unwrap();
		assert_eq!(key, decipher.recover_key_with_password("pw").unwrap());

		let only_weak = ContentInfo::new(wrap::random_nonce(), Vec::new(), vec![weak]);
		decipher.set_content_info(&only_weak.to_bytes().unwrap()).unwrap();
		assert!(matches!(
			decipher.recover_key_with_password("pw"),
			Err(Error::WeakParameters(_))
		));
	}

	#[test]
	fn tampered_payload_fails_to_decrypt() {
		let alice = KeyPair::generate();
		let mut cipher = RecipientCipher::new();
		cipher.add_key_recipient(b"alice", &alice.public_key()).unwrap();
		let mut ciphertext = cipher.encrypt(b"don't touch", true).unwrap();

		let last = ciphertext.len() - 1;
		ciphertext[last] ^= 0x01;

		let mut decipher = RecipientCipher::new();
		assert!(matches!(
			decipher.decrypt_with_key(&ciphertext, b"alice", &private(&alice), None),
			Err(Error::Decryption)
		));
	}

	#[test]
	fn password_protected_private_key_decrypts() {
		let alice = KeyPair::generate();
		let sealed = alice
			.encrypted_private_key("key password", &quick_kdf_config())
			.unwrap();

		let mut cipher = RecipientCipher::new();
		cipher.add_key_recipient(b"alice", &alice.public_key()).unwrap();
		let ciphertext = cipher.encrypt(b"locked twice", true).unwrap();

		let mut decipher = RecipientCipher::new();
		decipher.set_kdf_config(quick_kdf_config());
		assert!(matches!(
			decipher.decrypt_with_key(&ciphertext, b"alice", &sealed, None),
			Err(Error::InvalidArgument(_))
		));
		assert!(matches!(
			decipher.decrypt_with_key(&ciphertext, b"alice", &sealed, Some("wrong")),
			Err(Error::UnwrapFailed)
		));
		assert_eq!(
			b"locked twice".to_vec(),
			decipher
				.decrypt_with_key(&ciphertext, b"alice", &sealed, Some("key password"))
				.unwrap()
		);
	}

	#[test]
	fn malformed_content_info_changes_nothing() {
		let mut cipher = RecipientCipher::new();
		cipher.add_key_recipient(b"alice", &KeyPair::generate().public_key()).unwrap();
		let bytes = cipher.content_info().unwrap().unwrap();

		let mut decipher = RecipientCipher::new();
		decipher.set_int("kept", 1).unwrap();
		assert!(matches!(
			decipher.set_content_info(&bytes[..bytes.len() - 1]),
			Err(Error::MalformedContentInfo { .. })
		));
		assert!(decipher.current_content_info().is_none());
		assert_eq!(1, decipher.int("kept").unwrap());
	}

	#[test]
	fn custom_parameter_removal_is_idempotent() {
		let mut cipher = RecipientCipher::new();
		cipher.remove_int("nothing");
		cipher.remove_string("nothing");
		cipher.remove_data("nothing");
		cipher.remove_password_recipient("nothing").unwrap();
		assert!(cipher.is_empty_custom_parameters());

		cipher.set_data("d", b"x").unwrap();
		assert!(!cipher.is_empty_custom_parameters());
		cipher.clear_custom_parameters();
		assert!(cipher.is_empty_custom_parameters());
	}

	#[test]
	fn remove_all_recipients_empties_both_sets() {
		let mut cipher = RecipientCipher::new();
		cipher.add_key_recipient(b"alice", &KeyPair::generate().public_key()).unwrap();
		cipher.add_password_recipient("pw").unwrap();

		cipher.remove_all_recipients().unwrap();

		assert!(!cipher.is_key_recipient_exists(b"alice"));
		assert!(cipher.content_info().unwrap().is_none());
	}
}
