use std::collections::BTreeMap;

use super::Error;

/// The type of value stored under a custom parameter key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueType {
	Int,
	String,
	Data,
}

impl ValueType {
	pub(crate) fn tag(self) -> u64 {
		match self {
			ValueType::Int => 0,
			ValueType::String => 1,
			ValueType::Data => 2,
		}
	}

	pub(crate) fn from_tag(tag: u64) -> Option<Self> {
		match tag {
			0 => Some(ValueType::Int),
			1 => Some(ValueType::String),
			2 => Some(ValueType::Data),
			_ => None,
		}
	}
}

impl std::fmt::Display for ValueType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			ValueType::Int => "int",
			ValueType::String => "string",
			ValueType::Data => "data",
		})
	}
}

/// A single custom parameter value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CustomValue {
	Int(i32),
	String(String),
	Data(Vec<u8>),
}

impl CustomValue {
	pub fn value_type(&self) -> ValueType {
		match self {
			CustomValue::Int(_) => ValueType::Int,
			CustomValue::String(_) => ValueType::String,
			CustomValue::Data(_) => ValueType::Data,
		}
	}
}

/// Application metadata carried alongside the recipients in a content info.
///
/// **Custom parameters are not encrypted.**  Anyone who can see the ciphertext can read them,
/// so they're for things like content types and version numbers, never for secrets.
///
/// Each key holds one value of one type.  Setting a key replaces whatever was there, whatever
/// its type; reading a key as the wrong type is an [`Error::TypeMismatch`], which is distinct
/// from the key not being there at all ([`Error::KeyNotFound`]).  Removing a key that isn't
/// there (or that holds a different type) does nothing.
///
/// # Example
///
/// ```rust
/// use sealed_envelope::{CustomParameters, Error};
///
/// let mut params = CustomParameters::default();
/// params.set_int("version", 7).unwrap();
///
/// assert_eq!(7, params.int("version").unwrap());
/// assert!(matches!(params.string("version"), Err(Error::TypeMismatch { .. })));
/// assert!(matches!(params.string("nope"), Err(Error::KeyNotFound(_))));
///
/// params.remove_string("version");
/// assert!(!params.is_empty());
/// params.remove_int("version");
/// assert!(params.is_empty());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CustomParameters {
	values: BTreeMap<String, CustomValue>,
}

impl CustomParameters {
	fn set(&mut self, key: &str, value: CustomValue) -> Result<(), Error> {
		if key.is_empty() {
			return Err(Error::invalid_argument("custom parameter key must not be empty"));
		}

		tracing::trace!(key, value_type = %value.value_type(), "Setting custom parameter");
		self.values.insert(key.to_string(), value);

		Ok(())
	}

	fn get(&self, key: &str) -> Result<&CustomValue, Error> {
		self.values.get(key).ok_or_else(|| Error::key_not_found(key))
	}

	fn remove(&mut self, key: &str, value_type: ValueType) {
		if self.values.get(key).is_some_and(|v| v.value_type() == value_type) {
			self.values.remove(key);
		}
	}

	pub fn set_int(&mut self, key: &str, value: i32) -> Result<(), Error> {
		self.set(key, CustomValue::Int(value))
	}

	pub fn int(&self, key: &str) -> Result<i32, Error> {
		match self.get(key)? {
			CustomValue::Int(v) => Ok(*v),
			other => Err(Error::type_mismatch(key, ValueType::Int, other.value_type())),
		}
	}

	pub fn remove_int(&mut self, key: &str) {
		self.remove(key, ValueType::Int)
	}

	pub fn set_string(&mut self, key: &str, value: impl Into<String>) -> Result<(), Error> {
		self.set(key, CustomValue::String(value.into()))
	}

	pub fn string(&self, key: &str) -> Result<&str, Error> {
		match self.get(key)? {
			CustomValue::String(v) => Ok(v),
			other => Err(Error::type_mismatch(key, ValueType::String, other.value_type())),
		}
	}

	pub fn remove_string(&mut self, key: &str) {
		self.remove(key, ValueType::String)
	}

	pub fn set_data(&mut self, key: &str, value: impl AsRef<[u8]>) -> Result<(), Error> {
		self.set(key, CustomValue::Data(value.as_ref().to_vec()))
	}

	pub fn data(&self, key: &str) -> Result<&[u8], Error> {
		match self.get(key)? {
			CustomValue::Data(v) => Ok(v),
			other => Err(Error::type_mismatch(key, ValueType::Data, other.value_type())),
		}
	}

	pub fn remove_data(&mut self, key: &str) {
		self.remove(key, ValueType::Data)
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}

	pub fn len(&self) -> usize {
		self.values.len()
	}

	pub fn clear(&mut self) {
		self.values.clear();
	}

	/// All parameters, in key order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &CustomValue)> {
		self.values.iter().map(|(k, v)| (k.as_str(), v))
	}

	/// Add a decoded parameter, refusing to silently overwrite a duplicate.
	pub(crate) fn insert_new(&mut self, key: String, value: CustomValue) -> bool {
		match self.values.entry(key) {
			std::collections::btree_map::Entry::Occupied(_) => false,
			std::collections::btree_map::Entry::Vacant(e) => {
				e.insert(value);
				true
			}
		}
	}
}
