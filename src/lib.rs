#![no_std]
#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

extern crate alloc;
#[cfg(any(feature = "std", test))]
extern crate std;

use alloc::vec::Vec;
use core::fmt::{self, Display};
use log::debug;

mod chunks;
mod filter;
mod inflate;
mod zlib;


pub use chunks::decode_png_header;
pub use inflate::inflate;
pub use zlib::{adler32, zlib_decompress};

/// decoding error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
	/// this file is not a PNG file (missing PNG signature).
	BadSignature,
	/// missing IHDR or IDAT chunk, zero width or height,
	/// or too little image data (invalid PNG file)
	MalformedPNG,
	/// zlib compression method isn't DEFLATE, or a preset dictionary is required
	UnsupportedMethod,
	/// zlib header check bits are wrong (invalid PNG file)
	BadZlibHeader,
	/// Adler-32 checksum doesn't check out (invalid PNG file)
	ChecksumMismatch,
	/// bad huffman code (invalid PNG file)
	InvalidHuffmanCode,
	/// bad LZ77 back reference (invalid PNG file)
	InvalidBackReference,
	/// ZLIB LEN doesn't match NLEN (invalid PNG file)
	LengthMismatch,
	/// bad DEFLATE block type (invalid PNG file)
	InvalidBlockType,
	/// only 8 bits per sample are supported
	UnsupportedBitDepth,
	/// only grayscale, grayscale + alpha, RGB and RGBA are supported
	UnsupportedColorType,
	/// unsupported interlace method (Adam7 interlacing is not supported)
	UnsupportedInterlace,
	/// bad filter number (invalid PNG file)
	BadFilter,
	/// compressed data ended early
	TruncatedInput,
	/// image dimensions exceed the configured limits or `usize`
	ImageTooLarge,
	/// an allocation failed
	OutOfMemory,
}

/// alias for `Result<T, Error>`
pub type Result<T> = core::result::Result<T, Error>;

impl Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::BadSignature => write!(f, "not a png file"),
			Self::MalformedPNG => write!(f, "malformed png file"),
			Self::UnsupportedMethod => write!(f, "unsupported zlib compression method"),
			Self::BadZlibHeader => write!(f, "bad zlib header"),
			Self::ChecksumMismatch => write!(f, "bad adler-32 checksum"),
			Self::InvalidHuffmanCode => write!(f, "bad code in DEFLATE data"),
			Self::InvalidBackReference => {
				write!(f, "bad DEFLATE back reference (goes past start of stream)")
			}
			Self::LengthMismatch => write!(f, "LEN doesn't match NLEN"),
			Self::InvalidBlockType => write!(f, "bad DEFLATE block type"),
			Self::UnsupportedBitDepth => write!(f, "unsupported bit depth"),
			Self::UnsupportedColorType => write!(f, "unsupported color type"),
			Self::UnsupportedInterlace => write!(f, "unsupported interlacing method"),
			Self::BadFilter => write!(f, "bad PNG filter"),
			Self::TruncatedInput => write!(f, "unexpected end of compressed data"),
			Self::ImageTooLarge => write!(f, "image dimensions too large"),
			Self::OutOfMemory => write!(f, "out of memory"),
		}
	}
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// color format of a supported image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ColorType {
	/// grayscale
	Gray,
	/// grayscale + alpha
	GrayAlpha,
	/// RGB
	Rgb,
	/// RGBA
	Rgba,
}

impl ColorType {
	fn from_byte(x: u8) -> Option<Self> {
		Some(match x {
			0 => Self::Gray,
			2 => Self::Rgb,
			4 => Self::GrayAlpha,
			6 => Self::Rgba,
			_ => return None,
		})
	}

	fn channels(self) -> u8 {
		match self {
			Self::Gray => 1,
			Self::GrayAlpha => 2,
			Self::Rgb => 3,
			Self::Rgba => 4,
		}
	}
}

/// image metadata from the IHDR chunk.
///
/// the fields are reported as stored in the file, even when
/// [`decode`] would reject them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageHeader {
	width: u32,
	height: u32,
	bit_depth: u8,
	color_type: u8,
	interlace: u8,
}

impl ImageHeader {
	/// width of image in pixels
	pub fn width(&self) -> u32 {
		self.width
	}
	/// height of image in pixels
	pub fn height(&self) -> u32 {
		self.height
	}
	/// bits per sample
	pub fn bit_depth(&self) -> u8 {
		self.bit_depth
	}
	/// PNG color type byte (0, 2, 3, 4 or 6 in valid files)
	pub fn color_type(&self) -> u8 {
		self.color_type
	}
	/// interlace method (0 = none, 1 = Adam7)
	pub fn interlace(&self) -> u8 {
		self.interlace
	}
}

/// options for [`decode_with_options`]
///
/// the width and height limits are checked against IHDR before any image
/// data is inflated, and bound the size of the returned pixel buffer. they
/// do not bound the inflated IDAT stream itself: a small image whose IDAT
/// expands to far more than `height * (width * channels + 1)` bytes is still
/// inflated in full before the excess is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
	confirm_checksum: bool,
	max_width: u32,
	max_height: u32,
}

impl Default for DecodeOptions {
	fn default() -> Self {
		Self {
			confirm_checksum: true,
			max_width: 1 << 17,
			max_height: 1 << 17,
		}
	}
}

impl DecodeOptions {
	/// whether the zlib Adler-32 trailer is verified (default `true`).
	///
	/// when disabled the trailer is ignored entirely.
	pub fn set_confirm_checksum(mut self, yes: bool) -> Self {
		self.confirm_checksum = yes;
		self
	}
	/// largest accepted width in pixels
	pub fn set_max_width(mut self, width: u32) -> Self {
		self.max_width = width;
		self
	}
	/// largest accepted height in pixels
	pub fn set_max_height(mut self, height: u32) -> Self {
		self.max_height = height;
		self
	}
	/// see [`Self::set_confirm_checksum`]
	pub fn confirm_checksum(&self) -> bool {
		self.confirm_checksum
	}
	/// see [`Self::set_max_width`]
	pub fn max_width(&self) -> u32 {
		self.max_width
	}
	/// see [`Self::set_max_height`]
	pub fn max_height(&self) -> u32 {
		self.max_height
	}
}

/// a decoded image: 8-bit RGBA pixels, row-major, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
	width: u32,
	height: u32,
	pixels: Vec<u8>,
}

impl Image {
	/// image width in pixels
	pub fn width(&self) -> u32 {
		self.width
	}

	/// image height in pixels
	pub fn height(&self) -> u32 {
		self.height
	}

	/// RGBA pixel data, exactly `width * height * 4` bytes.
	pub fn pixels(&self) -> &[u8] {
		&self.pixels
	}

	/// take the RGBA pixel data.
	pub fn into_pixels(self) -> Vec<u8> {
		self.pixels
	}

	/// split into `(width, height, rgba)`.
	pub fn into_parts(self) -> (u32, u32, Vec<u8>) {
		(self.width, self.height, self.pixels)
	}

	/// copy of the pixels in BGRA byte order, as 32-bit device-independent
	/// bitmaps usually want them.
	///
	/// with `premultiply`, each color channel of a pixel with alpha below 255
	/// becomes `channel * alpha / 255`.
	pub fn to_bgra(&self, premultiply: bool) -> Vec<u8> {
		filter::rgba_to_bgra(&self.pixels, premultiply)
	}

	/// blend the image over a solid RGB background, giving opaque RGBA pixels.
	pub fn composite_over(&self, background: [u8; 3]) -> Vec<u8> {
		filter::composite_over(&self.pixels, background)
	}
}

/// decode a PNG file to RGBA pixels with the default [`DecodeOptions`].
pub fn decode(bytes: &[u8]) -> Result<Image> {
	decode_with_options(bytes, DecodeOptions::default())
}

/// decode a PNG file to RGBA pixels.
///
/// supports non-interlaced 8-bit grayscale, grayscale + alpha, RGB and RGBA images.
/// chunk CRCs are not checked.
pub fn decode_with_options(bytes: &[u8], options: DecodeOptions) -> Result<Image> {
	let chunks::PngRecord { header, idat } = chunks::read_png(bytes)?;
	if header.width > options.max_width || header.height > options.max_height {
		return Err(Error::ImageTooLarge);
	}
	let color_type = filter::check_format(header.bit_depth, header.color_type)?;
	if header.interlace != 0 {
		return Err(Error::UnsupportedInterlace);
	}
	let width = usize::try_from(header.width).map_err(|_| Error::ImageTooLarge)?;
	let height = usize::try_from(header.height).map_err(|_| Error::ImageTooLarge)?;

	debug!("{} bytes of IDAT data", idat.len());
	let scanlines = zlib::decompress(&idat, options.confirm_checksum)?;
	drop(idat);
	let pixels = filter::reconstruct(&scanlines, width, height, color_type)?;
	Ok(Image {
		width: header.width,
		height: header.height,
		pixels,
	})
}
