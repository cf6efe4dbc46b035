//! zlib (RFC 1950) envelope around a DEFLATE stream.

use alloc::vec::Vec;
use log::{debug, warn};

use crate::inflate::{inflate_into, ByteSink};
use crate::{Error, Result};

/// Adler-32 checksum of `data`.
pub fn adler32(data: &[u8]) -> u32 {
	const BASE: u32 = 65521;
	// most bytes that can be summed before `s2` could overflow a u32
	const NMAX: usize = 5552;

	let mut s1: u32 = 1;
	let mut s2: u32 = 0;
	for chunk in data.chunks(NMAX) {
		for byte in chunk.iter().copied() {
			s1 += u32::from(byte);
			s2 += s1;
		}
		s1 %= BASE;
		s2 %= BASE;
	}
	s2 << 16 | s1
}

/// decompress zlib data, verifying the Adler-32 trailer.
pub fn zlib_decompress(data: &[u8]) -> Result<Vec<u8>> {
	decompress(data, true)
}

pub(crate) fn decompress(data: &[u8], confirm_checksum: bool) -> Result<Vec<u8>> {
	// 2 header bytes + 4 trailer bytes
	if data.len() < 6 {
		return Err(Error::TruncatedInput);
	}
	let cmf = data[0];
	let flags = data[1];
	if cmf & 0xf != 8 {
		return Err(Error::UnsupportedMethod);
	}
	if (u16::from(cmf) << 8 | u16::from(flags)) % 31 != 0 {
		return Err(Error::BadZlibHeader);
	}
	// preset dictionary
	if flags & 0x20 != 0 {
		return Err(Error::UnsupportedMethod);
	}

	let (body, trailer) = data[2..].split_at(data.len() - 6);
	let mut sink = ByteSink::with_capacity(data.len().saturating_mul(4))?;
	let consumed = inflate_into(body, &mut sink)?;
	debug!(
		"inflated {consumed} of {} deflate bytes into {} bytes",
		body.len(),
		sink.len()
	);

	if confirm_checksum {
		let expected = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
		let found = adler32(sink.as_slice());
		if expected != found {
			debug!("adler-32 mismatch: expected {expected:#010x}, found {found:#010x}");
			return Err(Error::ChecksumMismatch);
		}
	} else {
		warn!("skipping adler-32 verification");
	}
	Ok(sink.into_vec())
}
