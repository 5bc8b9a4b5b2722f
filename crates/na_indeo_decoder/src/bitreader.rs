/// Indeo 4/5 Bitstream Reader
///
/// Indeo packs its bitstream least-significant-bit first: the first bit of
/// a field is bit 0 of the first byte. Reads past the declared end return
/// zero bits instead of failing, so a truncated frame surfaces as a decode
/// error further up rather than a panic here.

use byteorder::{ByteOrder, LittleEndian};

use crate::vlc::Vlc;

/// How far past the end the cursor may run before it stops advancing.
pub const PADDING_BITS: usize = 64 * 8;

#[derive(Clone)]
pub struct BitReader<'a> {
    data:  &'a [u8],
    index: usize,
    size:  usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BitReader { data, index: 0, size: data.len() * 8 }
    }

    /// Create a reader over the first `size_in_bits` bits of `data`.
    pub fn with_bit_len(data: &'a [u8], size_in_bits: usize) -> Self {
        let size = size_in_bits.min(data.len() * 8);
        BitReader { data, index: 0, size }
    }

    /// Eight bytes starting at byte `pos`, zero-filled past the end.
    #[inline]
    fn load_u64(&self, pos: usize) -> u64 {
        if pos + 8 <= self.data.len() {
            return LittleEndian::read_u64(&self.data[pos..pos + 8]);
        }
        let mut tmp = [0u8; 8];
        if pos < self.data.len() {
            let avail = self.data.len() - pos;
            tmp[..avail].copy_from_slice(&self.data[pos..]);
        }
        LittleEndian::read_u64(&tmp)
    }

    /// Up to 56 bits starting at the cursor, without advancing.
    #[inline]
    fn window(&self) -> u64 {
        if self.index >= self.size {
            return 0;
        }
        let w = self.load_u64(self.index >> 3) >> (self.index & 7);
        // Bits beyond the declared length read as zero.
        let valid = self.size - self.index;
        if valid < 56 { w & ((1u64 << valid) - 1) } else { w }
    }

    #[inline]
    fn advance(&mut self, n: usize) {
        self.index = (self.index + n).min(self.size + PADDING_BITS);
    }

    /// Read 1..=25 bits.
    #[inline]
    pub fn get_bits(&mut self, n: u32) -> u32 {
        debug_assert!(n <= 25);
        let v = self.show_bits(n);
        self.advance(n as usize);
        v
    }

    /// Read up to 32 bits.
    #[inline]
    pub fn get_bits_long(&mut self, n: u32) -> u32 {
        let v = self.show_bits_long(n);
        self.advance(n as usize);
        v
    }

    /// Read up to 64 bits; the first-read bits land in the low half.
    pub fn get_bits64(&mut self, n: u32) -> u64 {
        if n <= 32 {
            return self.get_bits_long(n) as u64;
        }
        let lo = self.get_bits_long(32) as u64;
        let hi = self.get_bits_long(n - 32) as u64;
        lo | (hi << 32)
    }

    #[inline]
    pub fn get_bit(&mut self) -> bool {
        self.get_bits(1) != 0
    }

    /// Sign-extended read of 1..=25 bits.
    pub fn get_sbits(&mut self, n: u32) -> i32 {
        sign_extend(self.get_bits(n), n)
    }

    /// Sign-extended read of up to 32 bits.
    pub fn get_sbits_long(&mut self, n: u32) -> i32 {
        sign_extend(self.get_bits_long(n), n)
    }

    /// Peek 0..=25 bits.
    #[inline]
    pub fn show_bits(&self, n: u32) -> u32 {
        self.show_bits_long(n)
    }

    /// Peek up to 32 bits.
    #[inline]
    pub fn show_bits_long(&self, n: u32) -> u32 {
        if n == 0 {
            return 0;
        }
        debug_assert!(n <= 32);
        (self.window() & ((1u64 << n) - 1)) as u32
    }

    #[inline]
    pub fn skip_bits(&mut self, n: u32) {
        self.advance(n as usize);
    }

    #[inline]
    pub fn skip_bits_long(&mut self, n: usize) {
        self.advance(n);
    }

    /// Advance to the next byte boundary.
    #[inline]
    pub fn align(&mut self) {
        let rem = self.index & 7;
        if rem != 0 {
            self.advance(8 - rem);
        }
    }

    /// Current cursor position in bits.
    #[inline]
    pub fn get_bits_count(&self) -> usize {
        self.index
    }

    /// Bits remaining before the declared end (negative after over-read).
    #[inline]
    pub fn get_bits_left(&self) -> isize {
        self.size as isize - self.index as isize
    }

    pub fn size_in_bits(&self) -> usize {
        self.size
    }

    /// Move the cursor to an absolute bit position.
    pub fn seek(&mut self, pos: usize) {
        self.index = pos.min(self.size + PADDING_BITS);
    }

    /// Byte slice from the current (byte-aligned) position to the end.
    pub fn remaining_data(&self) -> &'a [u8] {
        let pos = (self.index >> 3).min(self.data.len());
        &self.data[pos..]
    }

    /// Decode one VLC symbol, following sub-tables up to `max_depth` levels.
    ///
    /// Returns `-1` for a bit pattern the table does not cover.
    #[inline]
    pub fn get_vlc2(&mut self, vlc: &Vlc, bits: u32, max_depth: u32) -> i32 {
        let table = vlc.table();
        let mut nb_bits = bits;
        let mut entry = table[self.show_bits(nb_bits) as usize];

        let mut depth = 1;
        while entry.len < 0 && depth < max_depth {
            self.skip_bits(nb_bits);
            nb_bits = (-entry.len) as u32;
            let index = self.show_bits(nb_bits) as usize + entry.sym as usize;
            entry = table[index];
            depth += 1;
        }

        if entry.len <= 0 {
            return -1;
        }
        self.skip_bits(entry.len as u32);
        entry.sym
    }
}

#[inline]
fn sign_extend(v: u32, n: u32) -> i32 {
    if n == 0 {
        return 0;
    }
    let shift = 32 - n;
    ((v << shift) as i32) >> shift
}
