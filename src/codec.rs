//! Strict CBOR helpers for the content info wire format.
//!
//! Only definite-length items are ever written or accepted, so every length prefix in an
//! encoded structure can be trusted by [`skip_item`] to find the end of it.
use ciborium_ll::{Decoder, Encoder, Header};

use super::Error;

// The deepest legitimate structure is content info -> section -> entry -> value
const MAX_NESTING: usize = 8;

pub(crate) type Enc<'a> = Encoder<&'a mut Vec<u8>>;

pub(crate) fn push_array(enc: &mut Enc<'_>, len: usize, element: &str) -> Result<(), Error> {
	enc.push(Header::Array(Some(len)))
		.map_err(|e| Error::encoding(element, e))
}

pub(crate) fn push_uint(enc: &mut Enc<'_>, v: u64, element: &str) -> Result<(), Error> {
	enc.push(Header::Positive(v))
		.map_err(|e| Error::encoding(element, e))
}

pub(crate) fn push_int(enc: &mut Enc<'_>, v: i64, element: &str) -> Result<(), Error> {
	let header = if v < 0 {
		// CBOR stores -1 - n
		Header::Negative(!v as u64)
	} else {
		Header::Positive(v as u64)
	};

	enc.push(header).map_err(|e| Error::encoding(element, e))
}

pub(crate) fn push_bytes(enc: &mut Enc<'_>, b: &[u8], element: &str) -> Result<(), Error> {
	enc.bytes(b, None).map_err(|e| Error::encoding(element, e))
}

pub(crate) fn push_text(enc: &mut Enc<'_>, s: &str, element: &str) -> Result<(), Error> {
	enc.text(s, None).map_err(|e| Error::encoding(element, e))
}

pub(crate) fn malformed(element: &str, reason: impl std::fmt::Debug) -> Error {
	Error::malformed_content_info(element, format!("{reason:?}"))
}

fn pull_header<R>(dec: &mut Decoder<R>, element: &str) -> Result<Header, Error>
where
	R: ciborium_io::Read,
	R::Error: std::fmt::Debug,
{
	dec.pull().map_err(|e| malformed(element, e))
}

/// Read an array header, returning the number of items in it.
pub(crate) fn pull_array<R>(dec: &mut Decoder<R>, element: &str) -> Result<usize, Error>
where
	R: ciborium_io::Read,
	R::Error: std::fmt::Debug,
{
	match pull_header(dec, element)? {
		Header::Array(Some(len)) => Ok(len),
		h => Err(malformed(element, format!("expected array, got {h:?}"))),
	}
}

/// Read an array header that must have exactly `len` items.
pub(crate) fn expect_array<R>(dec: &mut Decoder<R>, len: usize, element: &str) -> Result<(), Error>
where
	R: ciborium_io::Read,
	R::Error: std::fmt::Debug,
{
	let actual = pull_array(dec, element)?;

	if actual == len {
		Ok(())
	} else {
		Err(malformed(
			element,
			format!("expected {len} items, got {actual}"),
		))
	}
}

pub(crate) fn pull_uint<R>(dec: &mut Decoder<R>, element: &str) -> Result<u64, Error>
where
	R: ciborium_io::Read,
	R::Error: std::fmt::Debug,
{
	match pull_header(dec, element)? {
		Header::Positive(v) => Ok(v),
		h => Err(malformed(element, format!("expected unsigned integer, got {h:?}"))),
	}
}

pub(crate) fn pull_int<R>(dec: &mut Decoder<R>, element: &str) -> Result<i64, Error>
where
	R: ciborium_io::Read,
	R::Error: std::fmt::Debug,
{
	match pull_header(dec, element)? {
		Header::Positive(v) => i64::try_from(v).map_err(|e| malformed(element, e)),
		Header::Negative(n) => i64::try_from(n)
			.map(|n| -1 - n)
			.map_err(|e| malformed(element, e)),
		h => Err(malformed(element, format!("expected integer, got {h:?}"))),
	}
}

pub(crate) fn pull_bytes<R>(dec: &mut Decoder<R>, element: &str) -> Result<Vec<u8>, Error>
where
	R: ciborium_io::Read,
	R::Error: std::fmt::Debug,
{
	let Header::Bytes(Some(len)) = pull_header(dec, element)? else {
		return Err(malformed(element, "expected definite-length bytes"));
	};

	let mut v: Vec<u8> = Vec::new();
	read_bytes(dec, len, element, |chunk| v.extend_from_slice(chunk))?;

	Ok(v)
}

pub(crate) fn pull_text<R>(dec: &mut Decoder<R>, element: &str) -> Result<String, Error>
where
	R: ciborium_io::Read,
	R::Error: std::fmt::Debug,
{
	let Header::Text(Some(len)) = pull_header(dec, element)? else {
		return Err(malformed(element, "expected definite-length text"));
	};

	let mut s = String::new();
	read_text(dec, len, element, |chunk| s.push_str(chunk))?;

	Ok(s)
}

// CBOR's great, until you have to deal with segmented bytestrings...
fn read_bytes<R>(
	dec: &mut Decoder<R>,
	len: usize,
	element: &str,
	mut sink: impl FnMut(&[u8]),
) -> Result<(), Error>
where
	R: ciborium_io::Read,
	R::Error: std::fmt::Debug,
{
	let mut buf = [0u8; 1024];
	let mut seen = 0usize;
	let mut segments = dec.bytes(Some(len));

	while let Some(mut segment) = segments.pull().map_err(|e| malformed(element, e))? {
		while let Some(chunk) = segment
			.pull(&mut buf[..])
			.map_err(|e| malformed(element, e))?
		{
			seen += chunk.len();
			sink(chunk);
		}
	}

	if seen == len {
		Ok(())
	} else {
		Err(malformed(element, format!("expected {len} bytes, got {seen}")))
	}
}

fn read_text<R>(
	dec: &mut Decoder<R>,
	len: usize,
	element: &str,
	mut sink: impl FnMut(&str),
) -> Result<(), Error>
where
	R: ciborium_io::Read,
	R::Error: std::fmt::Debug,
{
	let mut buf = [0u8; 1024];
	let mut seen = 0usize;
	let mut segments = dec.text(Some(len));

	while let Some(mut segment) = segments.pull().map_err(|e| malformed(element, e))? {
		while let Some(chunk) = segment
			.pull(&mut buf[..])
			.map_err(|e| malformed(element, e))?
		{
			seen += chunk.len();
			sink(chunk);
		}
	}

	if seen == len {
		Ok(())
	} else {
		Err(malformed(element, format!("expected {len} bytes, got {seen}")))
	}
}

/// Step over one complete item, following length prefixes without looking at payloads.
pub(crate) fn skip_item<R>(dec: &mut Decoder<R>, depth: usize) -> Result<(), Error>
where
	R: ciborium_io::Read,
	R::Error: std::fmt::Debug,
{
	if depth > MAX_NESTING {
		return Err(malformed("nesting", "structure nested too deeply"));
	}

	match pull_header(dec, "item")? {
		Header::Positive(_) | Header::Negative(_) => Ok(()),
		Header::Bytes(Some(len)) => read_bytes(dec, len, "bytes", |_| ()),
		Header::Text(Some(len)) => read_text(dec, len, "text", |_| ()),
		// Each item consumes at least one byte, so a bogus count runs out of input
		// rather than looping forever
		Header::Array(Some(n)) => (0..n).try_for_each(|_| skip_item(dec, depth + 1)),
		h => Err(malformed("item", format!("unexpected {h:?}"))),
	}
}
