//! scanline defiltering and conversion to RGBA.

use alloc::vec;
use alloc::vec::Vec;
use core::mem;

use crate::{ColorType, Error, Result};

const FILTER_NONE: u8 = 0;
const FILTER_SUB: u8 = 1;
const FILTER_UP: u8 = 2;
const FILTER_AVG: u8 = 3;
const FILTER_PAETH: u8 = 4;

/// map IHDR bit depth and color type to a supported format.
pub(crate) fn check_format(bit_depth: u8, color_type: u8) -> Result<ColorType> {
	if bit_depth != 8 {
		return Err(Error::UnsupportedBitDepth);
	}
	ColorType::from_byte(color_type).ok_or(Error::UnsupportedColorType)
}

/// the Paeth predictor used by filter type 4.
///
/// ties go to `a`, then `b`.
pub(crate) fn paeth_predictor(a: u8, b: u8, c: u8) -> u8 {
	let p = i16::from(a) + i16::from(b) - i16::from(c);
	let pa = (p - i16::from(a)).abs();
	let pb = (p - i16::from(b)).abs();
	let pc = (p - i16::from(c)).abs();
	if pa <= pb && pa <= pc {
		a
	} else if pb <= pc {
		b
	} else {
		c
	}
}

/// reverse the filter of one scanline in place, given the previous reconstructed one.
fn unfilter_row(filter: u8, row: &mut [u8], prev: &[u8], bpp: usize) -> Result<()> {
	match filter {
		FILTER_NONE => {}
		FILTER_SUB => {
			for i in bpp..row.len() {
				row[i] = row[i].wrapping_add(row[i - bpp]);
			}
		}
		FILTER_UP => {
			for (x, b) in row.iter_mut().zip(prev) {
				*x = x.wrapping_add(*b);
			}
		}
		FILTER_AVG => {
			for i in 0..row.len() {
				let a = if i >= bpp { u16::from(row[i - bpp]) } else { 0 };
				let b = u16::from(prev[i]);
				row[i] = row[i].wrapping_add(((a + b) >> 1) as u8);
			}
		}
		FILTER_PAETH => {
			for i in 0..row.len() {
				let (a, c) = if i >= bpp {
					(row[i - bpp], prev[i - bpp])
				} else {
					(0, 0)
				};
				row[i] = row[i].wrapping_add(paeth_predictor(a, prev[i], c));
			}
		}
		_ => return Err(Error::BadFilter),
	}
	Ok(())
}

/// append one reconstructed scanline to `rgba`.
fn push_rgba(rgba: &mut Vec<u8>, row: &[u8], color_type: ColorType) {
	match color_type {
		ColorType::Gray => {
			for g in row.iter().copied() {
				rgba.extend_from_slice(&[g, g, g, 255]);
			}
		}
		ColorType::GrayAlpha => {
			for ga in row.chunks_exact(2) {
				rgba.extend_from_slice(&[ga[0], ga[0], ga[0], ga[1]]);
			}
		}
		ColorType::Rgb => {
			for rgb in row.chunks_exact(3) {
				rgba.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
			}
		}
		ColorType::Rgba => rgba.extend_from_slice(row),
	}
}

/// reverse scanline filters on decompressed IDAT data and convert to RGBA8888.
pub(crate) fn reconstruct(
	data: &[u8],
	width: usize,
	height: usize,
	color_type: ColorType,
) -> Result<Vec<u8>> {
	let bpp = usize::from(color_type.channels());
	let row_bytes = width.checked_mul(bpp).ok_or(Error::ImageTooLarge)?;
	let stride = row_bytes + 1;
	if stride
		.checked_mul(height)
		.map_or(true, |needed| data.len() < needed)
	{
		return Err(Error::MalformedPNG);
	}
	let rgba_len = width
		.checked_mul(height)
		.and_then(|area| area.checked_mul(4))
		.ok_or(Error::ImageTooLarge)?;

	let mut rgba = Vec::new();
	rgba.try_reserve_exact(rgba_len)
		.map_err(|_| Error::OutOfMemory)?;
	let mut prev = vec![0; row_bytes];
	let mut row = vec![0; row_bytes];
	for scanline in data.chunks_exact(stride).take(height) {
		row.copy_from_slice(&scanline[1..]);
		unfilter_row(scanline[0], &mut row, &prev, bpp)?;
		push_rgba(&mut rgba, &row, color_type);
		mem::swap(&mut row, &mut prev);
	}
	Ok(rgba)
}

/// RGBA8888 to BGRA8888, optionally premultiplying color by alpha.
pub(crate) fn rgba_to_bgra(rgba: &[u8], premultiply: bool) -> Vec<u8> {
	let mut bgra = Vec::with_capacity(rgba.len());
	for px in rgba.chunks_exact(4) {
		let [mut r, mut g, mut b, a] = [px[0], px[1], px[2], px[3]];
		if premultiply && a < 255 {
			r = (u16::from(r) * u16::from(a) / 255) as u8;
			g = (u16::from(g) * u16::from(a) / 255) as u8;
			b = (u16::from(b) * u16::from(a) / 255) as u8;
		}
		bgra.extend_from_slice(&[b, g, r, a]);
	}
	bgra
}

/// blend RGBA8888 over an opaque background color, giving opaque RGBA8888.
pub(crate) fn composite_over(rgba: &[u8], background: [u8; 3]) -> Vec<u8> {
	let mut out = Vec::with_capacity(rgba.len());
	for px in rgba.chunks_exact(4) {
		let a = u16::from(px[3]);
		for (src, bg) in px[..3].iter().zip(background) {
			out.push(((u16::from(*src) * a + u16::from(bg) * (255 - a)) / 255) as u8);
		}
		out.push(255);
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_paeth_ties() {
		assert_eq!(paeth_predictor(10, 10, 10), 10);
		// p = -10: |p-a| = |p-b| = 10, |p-c| = 20
		assert_eq!(paeth_predictor(0, 0, 10), 0);
		// p = 5: pa = 3, pb = 3, pc = 0
		assert_eq!(paeth_predictor(2, 8, 5), 5);
		// p = 20: pa = 10, pb = 0, pc = 10
		assert_eq!(paeth_predictor(10, 20, 10), 20);
		// p = 0: pa = 10, pb = 0, pc = 10
		assert_eq!(paeth_predictor(10, 0, 10), 0);
		// p = 15: pa = 5, pb = 5, pc = 5
		assert_eq!(paeth_predictor(10, 10, 5), 10);
		// p = 200: pa = 0
		assert_eq!(paeth_predictor(200, 100, 100), 200);
	}

	#[test]
	fn test_check_format() {
		assert!(matches!(check_format(8, 0), Ok(ColorType::Gray)));
		assert!(matches!(check_format(8, 2), Ok(ColorType::Rgb)));
		assert!(matches!(check_format(8, 4), Ok(ColorType::GrayAlpha)));
		assert!(matches!(check_format(8, 6), Ok(ColorType::Rgba)));
		assert!(matches!(check_format(8, 3), Err(Error::UnsupportedColorType)));
		assert!(matches!(check_format(8, 5), Err(Error::UnsupportedColorType)));
		assert!(matches!(check_format(16, 6), Err(Error::UnsupportedBitDepth)));
		assert!(matches!(check_format(4, 0), Err(Error::UnsupportedBitDepth)));
	}

	#[test]
	fn test_each_filter() {
		// 2x2 gray+alpha; every row reconstructs to [10, 20, 30, 40] then [50, 60, 70, 80]
		let top = [10, 20, 30, 40];
		let bottom = [50u8, 60, 70, 80];
		let cases: [(u8, [u8; 4]); 5] = [
			(FILTER_NONE, bottom),
			(FILTER_SUB, [50, 60, 20, 20]),
			(FILTER_UP, [40, 40, 40, 40]),
			// avg: (a + b) / 2 with a = left, b = up
			(FILTER_AVG, [45, 50, 70 - 40, 80 - 50]),
			// paeth: first pixel predicts from up, second from left/up/upleft
			(FILTER_PAETH, [40, 40, 70 - 50, 80 - 60]),
		];
		for (filter, filtered) in cases {
			let mut data = vec![FILTER_NONE];
			data.extend_from_slice(&top);
			data.push(filter);
			data.extend_from_slice(&filtered);
			let rgba = reconstruct(&data, 2, 2, ColorType::GrayAlpha).unwrap();
			assert_eq!(
				rgba,
				[10, 10, 10, 20, 30, 30, 30, 40, 50, 50, 50, 60, 70, 70, 70, 80],
				"filter {filter}"
			);
		}
	}

	#[test]
	fn test_first_row_has_zero_above() {
		// up and paeth on the first row behave like none and sub
		let rgba = reconstruct(&[FILTER_UP, 7, 9], 2, 1, ColorType::Gray).unwrap();
		assert_eq!(rgba, [7, 7, 7, 255, 9, 9, 9, 255]);
		let rgba = reconstruct(&[FILTER_PAETH, 7, 9], 2, 1, ColorType::Gray).unwrap();
		assert_eq!(rgba, [7, 7, 7, 255, 16, 16, 16, 255]);
		let rgba = reconstruct(&[FILTER_AVG, 8, 9], 2, 1, ColorType::Gray).unwrap();
		assert_eq!(rgba, [8, 8, 8, 255, 13, 13, 13, 255]);
	}

	#[test]
	fn test_wrapping_arithmetic() {
		let rgba = reconstruct(&[FILTER_SUB, 200, 100, 50, 100, 200, 250], 2, 1, ColorType::Rgb)
			.unwrap();
		assert_eq!(rgba, [200, 100, 50, 255, 44, 44, 44, 255]);
	}

	#[test]
	fn test_bad_filter() {
		assert!(matches!(
			reconstruct(&[5, 1, 2, 3], 1, 1, ColorType::Rgb),
			Err(Error::BadFilter)
		));
	}

	#[test]
	fn test_short_data() {
		assert!(matches!(
			reconstruct(&[0, 1, 2, 3, 4, 0, 1], 1, 2, ColorType::Rgba),
			Err(Error::MalformedPNG)
		));
	}

	#[test]
	fn test_extra_data_ignored() {
		let rgba = reconstruct(&[0, 1, 2, 3, 4, 0, 0], 1, 1, ColorType::Rgba).unwrap();
		assert_eq!(rgba, [1, 2, 3, 4]);
	}

	#[test]
	fn test_bgra() {
		let rgba = [10, 20, 30, 255, 200, 100, 50, 128];
		assert_eq!(
			rgba_to_bgra(&rgba, false),
			[30, 20, 10, 255, 50, 100, 200, 128]
		);
		assert_eq!(
			rgba_to_bgra(&rgba, true),
			[30, 20, 10, 255, 25, 50, 100, 128]
		);
	}

	#[test]
	fn test_composite() {
		let rgba = [10, 20, 30, 255, 200, 100, 50, 0, 255, 0, 0, 51];
		assert_eq!(
			composite_over(&rgba, [100, 100, 100]),
			[10, 20, 30, 255, 100, 100, 100, 255, 131, 80, 80, 255]
		);
	}
}
