//! raw DEFLATE (RFC 1951) decoding.

use alloc::vec::Vec;
use core::cmp::max;
use log::trace;

use crate::{Error, Result};

/// growable output buffer the decompressor writes into.
///
/// LZ77 back references read from the same buffer they append to.
#[derive(Debug, Default)]
pub(crate) struct ByteSink {
	data: Vec<u8>,
}

impl ByteSink {
	/// smallest capacity we grow to on the first overflow.
	const MIN_GROWTH: usize = 1024;

	pub(crate) fn with_capacity(capacity: usize) -> Result<Self> {
		let mut data = Vec::new();
		data.try_reserve_exact(capacity)
			.map_err(|_| Error::OutOfMemory)?;
		Ok(Self { data })
	}

	pub(crate) fn push(&mut self, byte: u8) -> Result<()> {
		if self.data.len() == self.data.capacity() {
			let new_capacity = self
				.data
				.capacity()
				.checked_mul(2)
				.ok_or(Error::OutOfMemory)?;
			let new_capacity = max(new_capacity, Self::MIN_GROWTH);
			self.data
				.try_reserve_exact(new_capacity - self.data.len())
				.map_err(|_| Error::OutOfMemory)?;
		}
		self.data.push(byte);
		Ok(())
	}

	/// append `length` bytes starting `distance` bytes before the current end.
	///
	/// the source and destination may overlap; bytes written earlier in this
	/// copy are read back by later iterations.
	fn copy_back(&mut self, distance: usize, length: usize) -> Result<()> {
		if distance == 0 || distance > self.data.len() {
			return Err(Error::InvalidBackReference);
		}
		let mut src = self.data.len() - distance;
		for _ in 0..length {
			let byte = self.data[src];
			self.push(byte)?;
			src += 1;
		}
		Ok(())
	}

	pub(crate) fn len(&self) -> usize {
		self.data.len()
	}

	pub(crate) fn as_slice(&self) -> &[u8] {
		&self.data
	}

	pub(crate) fn into_vec(self) -> Vec<u8> {
		self.data
	}

	#[cfg(test)]
	fn capacity(&self) -> usize {
		self.data.capacity()
	}
}

/// LSB-first bit cursor over compressed input.
#[derive(Debug)]
pub(crate) struct BitReader<'a> {
	data: &'a [u8],
	pos: usize,
	bits: u32,
	bits_left: u8,
}

impl<'a> From<&'a [u8]> for BitReader<'a> {
	fn from(data: &'a [u8]) -> Self {
		Self {
			data,
			pos: 0,
			bits: 0,
			bits_left: 0,
		}
	}
}

impl BitReader<'_> {
	/// read `count` bits, `count <= 25`.
	pub(crate) fn read_bits(&mut self, count: u8) -> Result<u32> {
		debug_assert!(count <= 25);
		while self.bits_left < count {
			let byte = *self.data.get(self.pos).ok_or(Error::TruncatedInput)?;
			self.bits |= u32::from(byte) << self.bits_left;
			self.pos += 1;
			self.bits_left += 8;
		}
		let value = self.bits & ((1 << count) - 1);
		self.bits >>= count;
		self.bits_left -= count;
		Ok(value)
	}

	fn read_bits_usize(&mut self, count: u8) -> Result<usize> {
		self.read_bits(count).map(|x| x as usize)
	}

	/// drop buffered bits without consuming input.
	fn align_to_byte(&mut self) {
		self.bits = 0;
		self.bits_left = 0;
	}

	/// drop buffered bits and read the next whole input byte.
	fn read_byte_aligned(&mut self) -> Result<u8> {
		self.align_to_byte();
		let byte = *self.data.get(self.pos).ok_or(Error::TruncatedInput)?;
		self.pos += 1;
		Ok(byte)
	}

	/// number of input bytes consumed so far.
	pub(crate) fn position(&self) -> usize {
		self.pos
	}
}

const HUFFMAN_MAX_BITS: usize = 15;
const HUFFMAN_MAX_SYMBOLS: usize = 288;
const DISTANCE_SYMBOLS: usize = 32;

/// canonical Huffman decode table.
///
/// codes of one length are consecutive integers assigned in symbol order,
/// so a code of length `L` at or below `max_code[L]` maps to
/// `symbols[offset[L] + code]`.
#[derive(Debug, Clone)]
pub(crate) struct HuffmanTable {
	max_code: [i32; HUFFMAN_MAX_BITS + 1],
	offset: [i32; HUFFMAN_MAX_BITS + 1],
	symbols: [u16; HUFFMAN_MAX_SYMBOLS],
	symbol_count: usize,
}

impl HuffmanTable {
	/// build a table from per-symbol code lengths. a length of 0 means unused.
	pub(crate) fn from_code_lengths(code_lengths: &[u8]) -> Self {
		debug_assert!(code_lengths.len() <= HUFFMAN_MAX_SYMBOLS);
		let mut bl_count = [0i32; HUFFMAN_MAX_BITS + 1];
		for l in code_lengths.iter().copied().map(usize::from) {
			if (1..=HUFFMAN_MAX_BITS).contains(&l) {
				bl_count[l] += 1;
			}
		}
		let mut next_code = [0i32; HUFFMAN_MAX_BITS + 1];
		let mut code = 0;
		for bits in 1..=HUFFMAN_MAX_BITS {
			code = (code + bl_count[bits - 1]) << 1;
			next_code[bits] = code;
		}

		let mut table = HuffmanTable {
			max_code: [-1; HUFFMAN_MAX_BITS + 1],
			offset: [0; HUFFMAN_MAX_BITS + 1],
			symbols: [0; HUFFMAN_MAX_SYMBOLS],
			symbol_count: 0,
		};
		for bits in 1..=HUFFMAN_MAX_BITS {
			table.offset[bits] = table.symbol_count as i32 - next_code[bits];
			for (symbol, l) in code_lengths.iter().copied().enumerate() {
				if usize::from(l) == bits {
					table.symbols[table.symbol_count] = symbol as u16;
					table.symbol_count += 1;
					table.max_code[bits] = next_code[bits];
					next_code[bits] += 1;
				}
			}
		}
		table
	}

	/// decode one symbol, reading the code one bit at a time.
	pub(crate) fn decode(&self, reader: &mut BitReader) -> Result<u16> {
		let mut code = 0i32;
		for len in 1..=HUFFMAN_MAX_BITS {
			code = (code << 1) | reader.read_bits(1)? as i32;
			let max_code = self.max_code[len];
			if max_code >= 0 && code <= max_code {
				// only an over-subscribed length set can land outside the table
				return usize::try_from(self.offset[len] + code)
					.ok()
					.and_then(|i| self.symbols[..self.symbol_count].get(i))
					.copied()
					.ok_or(Error::InvalidHuffmanCode);
			}
		}
		Err(Error::InvalidHuffmanCode)
	}
}

const LENGTH_BASE: [u16; 29] = [
	3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
	163, 195, 227, 258,
];
const LENGTH_EXTRA: [u8; 29] = [
	0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];
const DIST_BASE: [u16; 30] = [
	1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
	2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];
const DIST_EXTRA: [u8; 30] = [
	0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
	13,
];

/// order in which code length code lengths are stored
const CODE_LENGTH_ORDER: [usize; 19] = [
	16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

type CodeLengths = ([u8; HUFFMAN_MAX_SYMBOLS], [u8; DISTANCE_SYMBOLS]);

/// code lengths of the fixed tables from RFC 1951 section 3.2.6
fn fixed_code_lengths() -> CodeLengths {
	let mut literal_lengths = [0; HUFFMAN_MAX_SYMBOLS];
	literal_lengths[..144].fill(8);
	literal_lengths[144..256].fill(9);
	literal_lengths[256..280].fill(7);
	literal_lengths[280..].fill(8);
	(literal_lengths, [5; DISTANCE_SYMBOLS])
}

fn read_dynamic_code_lengths(reader: &mut BitReader) -> Result<CodeLengths> {
	let literal_count = reader.read_bits_usize(5)? + 257;
	let distance_count = reader.read_bits_usize(5)? + 1;
	let code_length_count = reader.read_bits_usize(4)? + 4;

	let mut code_length_lengths = [0; 19];
	for i in CODE_LENGTH_ORDER.iter().copied().take(code_length_count) {
		code_length_lengths[i] = reader.read_bits(3)? as u8;
	}
	let code_length_table = HuffmanTable::from_code_lengths(&code_length_lengths);

	let mut lengths = [0u8; 320];
	let total = literal_count + distance_count;
	let mut i = 0;
	while i < total {
		let (value, repeat) = match code_length_table.decode(reader)? {
			op @ 0..=15 => (op as u8, 1),
			16 => {
				if i == 0 {
					return Err(Error::InvalidHuffmanCode);
				}
				(lengths[i - 1], reader.read_bits_usize(2)? + 3)
			}
			17 => (0, reader.read_bits_usize(3)? + 3),
			18 => (0, reader.read_bits_usize(7)? + 11),
			_ => return Err(Error::InvalidHuffmanCode),
		};
		// runs are clipped at the declared table size
		let end = (i + repeat).min(total);
		lengths[i..end].fill(value);
		i = end;
	}

	let mut literal_lengths = [0; HUFFMAN_MAX_SYMBOLS];
	let mut distance_lengths = [0; DISTANCE_SYMBOLS];
	literal_lengths[..literal_count].copy_from_slice(&lengths[..literal_count]);
	distance_lengths[..distance_count].copy_from_slice(&lengths[literal_count..total]);
	Ok((literal_lengths, distance_lengths))
}

/// decode symbols of one Huffman-coded block until its end-of-block symbol.
fn read_compressed_block(
	reader: &mut BitReader,
	sink: &mut ByteSink,
	(literal_lengths, distance_lengths): &CodeLengths,
) -> Result<()> {
	let literal_table = HuffmanTable::from_code_lengths(literal_lengths);
	let distance_table = HuffmanTable::from_code_lengths(distance_lengths);

	loop {
		match literal_table.decode(reader)? {
			literal @ 0..=255 => sink.push(literal as u8)?,
			256 => return Ok(()),
			symbol @ 257..=285 => {
				let code = usize::from(symbol - 257);
				let length = usize::from(LENGTH_BASE[code])
					+ reader.read_bits_usize(LENGTH_EXTRA[code])?;

				let distance_code = usize::from(distance_table.decode(reader)?);
				if distance_code >= DIST_BASE.len() {
					return Err(Error::InvalidHuffmanCode);
				}
				let distance = usize::from(DIST_BASE[distance_code])
					+ reader.read_bits_usize(DIST_EXTRA[distance_code])?;
				sink.copy_back(distance, length)?;
			}
			_ => return Err(Error::InvalidHuffmanCode),
		}
	}
}

fn read_stored_block(reader: &mut BitReader, sink: &mut ByteSink) -> Result<()> {
	reader.align_to_byte();
	let len = u16::from_le_bytes([reader.read_byte_aligned()?, reader.read_byte_aligned()?]);
	let nlen = u16::from_le_bytes([reader.read_byte_aligned()?, reader.read_byte_aligned()?]);
	if len != !nlen {
		return Err(Error::LengthMismatch);
	}
	for _ in 0..len {
		sink.push(reader.read_byte_aligned()?)?;
	}
	Ok(())
}

/// decode a DEFLATE stream into `sink`, returning the number of input bytes consumed.
pub(crate) fn inflate_into(data: &[u8], sink: &mut ByteSink) -> Result<usize> {
	let mut reader = BitReader::from(data);
	loop {
		let is_final = reader.read_bits(1)? == 1;
		let block_type = reader.read_bits(2)?;
		trace!(
			"deflate block: type {block_type}, final {is_final}, output so far {}",
			sink.len()
		);
		match block_type {
			0 => read_stored_block(&mut reader, sink)?,
			1 => read_compressed_block(&mut reader, sink, &fixed_code_lengths())?,
			2 => {
				let lengths = read_dynamic_code_lengths(&mut reader)?;
				read_compressed_block(&mut reader, sink, &lengths)?;
			}
			_ => return Err(Error::InvalidBlockType),
		}
		if is_final {
			break;
		}
	}
	Ok(reader.position())
}

/// decompress a raw DEFLATE stream (no zlib header or trailer).
///
/// returns the decompressed bytes and the number of input bytes consumed;
/// anything after the final block is left untouched.
pub fn inflate(data: &[u8]) -> Result<(Vec<u8>, usize)> {
	let mut sink = ByteSink::default();
	let consumed = inflate_into(data, &mut sink)?;
	Ok((sink.into_vec(), consumed))
}

/// bit-level writer for hand-assembled DEFLATE streams in tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct BitWriter {
	bytes: Vec<u8>,
	bit: u8,
}

#[cfg(test)]
impl BitWriter {
	fn push_bit(&mut self, bit: u32) {
		if self.bit == 0 {
			self.bytes.push(0);
		}
		if let Some(last) = self.bytes.last_mut() {
			*last |= ((bit & 1) as u8) << self.bit;
		}
		self.bit = (self.bit + 1) % 8;
	}

	/// plain value, least significant bit first.
	pub(crate) fn bits(&mut self, value: u32, count: u8) -> &mut Self {
		for i in 0..count {
			self.push_bit(value >> i);
		}
		self
	}

	/// Huffman code, most significant bit first.
	pub(crate) fn code(&mut self, code: u32, length: u8) -> &mut Self {
		for i in (0..length).rev() {
			self.push_bit(code >> i);
		}
		self
	}

	/// literal/length symbol using the fixed table.
	pub(crate) fn fixed_symbol(&mut self, symbol: u16) -> &mut Self {
		let symbol = u32::from(symbol);
		match symbol {
			0..=143 => self.code(0x30 + symbol, 8),
			144..=255 => self.code(0x190 + symbol - 144, 9),
			256..=279 => self.code(symbol - 256, 7),
			_ => self.code(0xc0 + symbol - 280, 8),
		}
	}

	/// a whole final fixed-Huffman block holding `data` as literals.
	pub(crate) fn fixed_literals_block(&mut self, data: &[u8]) -> &mut Self {
		self.bits(1, 1).bits(1, 2);
		for byte in data {
			self.fixed_symbol(u16::from(*byte));
		}
		self.fixed_symbol(256)
	}

	pub(crate) fn finish(&self) -> Vec<u8> {
		self.bytes.clone()
	}
}
