//! PNG chunk walking.

use alloc::vec::Vec;
use log::{info, trace, warn};

use crate::{Error, ImageHeader, Result};

const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

/// one chunk of a PNG file. the CRC is skipped, not checked.
#[derive(Debug, Clone, Copy)]
struct Chunk<'a> {
	kind: [u8; 4],
	data: &'a [u8],
}

/// iterator over the chunks following the signature.
///
/// stops at the end of input, or early at a chunk whose declared length
/// runs past the end of input.
struct Chunks<'a> {
	bytes: &'a [u8],
	pos: usize,
}

impl<'a> Chunks<'a> {
	fn new(bytes: &'a [u8]) -> Result<Self> {
		if bytes.len() < PNG_SIGNATURE.len() || bytes[..8] != PNG_SIGNATURE {
			return Err(Error::BadSignature);
		}
		Ok(Self { bytes, pos: 8 })
	}
}

impl<'a> Iterator for Chunks<'a> {
	type Item = Chunk<'a>;

	fn next(&mut self) -> Option<Chunk<'a>> {
		// length + type + CRC
		let rest = self.bytes.get(self.pos..)?;
		if rest.len() < 12 {
			return None;
		}
		let length = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
		let kind = [rest[4], rest[5], rest[6], rest[7]];
		let Some(data) = length
			.checked_add(12)
			.filter(|end| *end <= rest.len())
			.map(|_| &rest[8..8 + length])
		else {
			warn!(
				"chunk {:?} claims {length} bytes but only {} remain, stopping",
				core::str::from_utf8(&kind).unwrap_or("????"),
				rest.len() - 12
			);
			self.pos = self.bytes.len();
			return None;
		};
		self.pos += length + 12;
		Some(Chunk { kind, data })
	}
}

fn parse_ihdr(data: &[u8]) -> ImageHeader {
	let header = ImageHeader {
		width: u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
		height: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
		bit_depth: data[8],
		color_type: data[9],
		interlace: data[12],
	};
	info!("Width: {}", header.width);
	info!("Height: {}", header.height);
	info!("Depth: {}", header.bit_depth);
	info!("Color type: {}", header.color_type);
	info!("Interlace: {}", header.interlace);
	header
}

/// header fields plus the concatenated IDAT payload.
#[derive(Debug)]
pub(crate) struct PngRecord {
	pub(crate) header: ImageHeader,
	pub(crate) idat: Vec<u8>,
}

/// walk every chunk up to IEND, collecting IHDR fields and IDAT data.
pub(crate) fn read_png(bytes: &[u8]) -> Result<PngRecord> {
	let mut header = ImageHeader::default();
	let mut idat = Vec::new();
	for chunk in Chunks::new(bytes)? {
		match &chunk.kind {
			b"IHDR" if chunk.data.len() >= 13 => header = parse_ihdr(chunk.data),
			b"IDAT" => {
				trace!("IDAT chunk of {} bytes", chunk.data.len());
				idat.try_reserve(chunk.data.len())
					.map_err(|_| Error::OutOfMemory)?;
				idat.extend_from_slice(chunk.data);
			}
			b"IEND" => break,
			kind => {
				trace!(
					"skipping chunk {:?} of {} bytes",
					core::str::from_utf8(kind).unwrap_or("????"),
					chunk.data.len()
				);
			}
		}
	}
	if header.width == 0 || header.height == 0 || idat.is_empty() {
		return Err(Error::MalformedPNG);
	}
	Ok(PngRecord { header, idat })
}

/// decode image metadata.
///
/// this only walks chunks up to the first IHDR, so it does not touch the image data.
pub fn decode_png_header(bytes: &[u8]) -> Result<ImageHeader> {
	let header = Chunks::new(bytes)?
		.find(|chunk| &chunk.kind == b"IHDR" && chunk.data.len() >= 13)
		.map(|chunk| parse_ihdr(chunk.data))
		.ok_or(Error::MalformedPNG)?;
	if header.width == 0 || header.height == 0 {
		return Err(Error::MalformedPNG);
	}
	Ok(header)
}

/// assemble a PNG file from raw chunks, with zeroed CRCs.
#[cfg(test)]
pub(crate) fn build_png(chunks: &[(&[u8; 4], &[u8])]) -> Vec<u8> {
	let mut png = PNG_SIGNATURE.to_vec();
	for (kind, data) in chunks {
		png.extend_from_slice(&(data.len() as u32).to_be_bytes());
		png.extend_from_slice(*kind);
		png.extend_from_slice(data);
		png.extend_from_slice(&[0; 4]);
	}
	png
}

/// IHDR payload for an 8-bit, non-interlaced image.
#[cfg(test)]
pub(crate) fn ihdr(width: u32, height: u32, color_type: u8) -> Vec<u8> {
	let mut data = width.to_be_bytes().to_vec();
	data.extend_from_slice(&height.to_be_bytes());
	data.extend_from_slice(&[8, color_type, 0, 0, 0]);
	data
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_bad_signature() {
		assert!(matches!(read_png(b"hello"), Err(Error::BadSignature)));
		let mut png = build_png(&[(b"IHDR", &ihdr(1, 1, 6))]);
		png[1] = b'Q';
		assert!(matches!(read_png(&png), Err(Error::BadSignature)));
		assert!(matches!(decode_png_header(&png), Err(Error::BadSignature)));
	}

	#[test]
	fn test_idat_chunks_concatenate() {
		let png = build_png(&[
			(b"IHDR", &ihdr(3, 2, 2)),
			(b"IDAT", b"abc"),
			(b"tEXt", b"Comment\0hi"),
			(b"IDAT", b""),
			(b"IDAT", b"de"),
			(b"IEND", b""),
			(b"IDAT", b"ignored"),
		]);
		let record = read_png(&png).unwrap();
		assert_eq!(record.idat, b"abcde");
		assert_eq!(record.header.width(), 3);
		assert_eq!(record.header.height(), 2);
		assert_eq!(record.header.color_type(), 2);
		assert_eq!(record.header.bit_depth(), 8);
	}

	#[test]
	fn test_missing_pieces() {
		let no_idat = build_png(&[(b"IHDR", &ihdr(3, 2, 2)), (b"IEND", b"")]);
		assert!(matches!(read_png(&no_idat), Err(Error::MalformedPNG)));

		let no_ihdr = build_png(&[(b"IDAT", b"abc"), (b"IEND", b"")]);
		assert!(matches!(read_png(&no_ihdr), Err(Error::MalformedPNG)));
		assert!(matches!(decode_png_header(&no_ihdr), Err(Error::MalformedPNG)));

		let zero_width = build_png(&[(b"IHDR", &ihdr(0, 2, 2)), (b"IDAT", b"abc")]);
		assert!(matches!(read_png(&zero_width), Err(Error::MalformedPNG)));

		// an IHDR shorter than 13 bytes is ignored
		let short_ihdr = build_png(&[(b"IHDR", &ihdr(3, 2, 2)[..12]), (b"IDAT", b"abc")]);
		assert!(matches!(read_png(&short_ihdr), Err(Error::MalformedPNG)));
	}

	#[test]
	fn test_truncated_chunk_stops_scan() {
		let mut png = build_png(&[(b"IHDR", &ihdr(3, 2, 2)), (b"IDAT", b"abcdef")]);
		// cut into the IDAT's CRC
		png.truncate(png.len() - 2);
		assert!(matches!(read_png(&png), Err(Error::MalformedPNG)));

		let mut png = build_png(&[
			(b"IHDR", &ihdr(3, 2, 2)),
			(b"IDAT", b"abc"),
			(b"IDAT", b"def"),
		]);
		png.truncate(png.len() - 1);
		assert_eq!(read_png(&png).unwrap().idat, b"abc");
	}

	#[test]
	fn test_huge_chunk_length() {
		let mut png = build_png(&[(b"IHDR", &ihdr(3, 2, 2)), (b"IDAT", b"abc")]);
		let idat_offset = 8 + 12 + 13;
		png[idat_offset..idat_offset + 4].copy_from_slice(&u32::MAX.to_be_bytes());
		assert!(matches!(read_png(&png), Err(Error::MalformedPNG)));
	}

	#[test]
	fn test_header_only() {
		let png = build_png(&[(b"IHDR", &ihdr(640, 480, 4)), (b"IDAT", b"junk")]);
		let header = decode_png_header(&png).unwrap();
		assert_eq!(header.width(), 640);
		assert_eq!(header.height(), 480);
		assert_eq!(header.color_type(), 4);
		assert_eq!(header.interlace(), 0);
	}
}
