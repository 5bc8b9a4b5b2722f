#![allow(dead_code)]

use indeo_decoder::huffman::{HuffDesc, BLK_HUFF_DESC, MB_HUFF_DESC};
use indeo_decoder::tables::RUN_VALUE_MAPS;

/// LSB-first bit writer matching the Indeo bitstream order.
#[derive(Default)]
pub struct BitWriter {
    buf:  Vec<u8>,
    bits: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_bits(&mut self, value: u32, n: u32) {
        for i in 0..n {
            if self.bits % 8 == 0 {
                self.buf.push(0);
            }
            if (value >> i) & 1 != 0 {
                let last = self.buf.len() - 1;
                self.buf[last] |= 1 << (self.bits % 8);
            }
            self.bits += 1;
        }
    }

    pub fn put_bit(&mut self, bit: bool) {
        self.put_bits(bit as u32, 1);
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.align();
        for &b in bytes {
            self.put_bits(b as u32, 8);
        }
    }

    /// Write a codeword most significant bit first.
    pub fn put_code(&mut self, code: u32, len: u32) {
        for i in (0..len).rev() {
            self.put_bit((code >> i) & 1 != 0);
        }
    }

    /// Write the codeword `desc` assigns to `sym`.
    pub fn put_sym(&mut self, desc: &HuffDesc, sym: i32) {
        let codes = desc.codes().unwrap();
        let c = codes.iter().find(|c| c.sym == sym).unwrap();
        self.put_code(c.code, c.len as u32);
    }

    /// Signed macroblock delta in the default macroblock codebook.
    pub fn put_delta(&mut self, v: i32) {
        self.put_sym(&MB_HUFF_DESC[7], if v > 0 { v * 2 - 1 } else { -v * 2 });
    }

    /// Block holding only a DC coefficient, coded with the default block
    /// codebook and run/value map. A zero DC leaves just the EOB.
    pub fn put_dc_block(&mut self, dc: i32) {
        let desc = &BLK_HUFF_DESC[7];
        let rvmap = &RUN_VALUE_MAPS[8];
        if dc != 0 {
            let code = if dc > 0 { dc * 2 - 1 } else { -dc * 2 };
            self.put_sym(desc, rvmap.esc as i32);
            self.put_sym(desc, 0); // run 1
            self.put_sym(desc, code & 63);
            self.put_sym(desc, code >> 6);
        }
        self.put_sym(desc, rvmap.eob as i32);
    }

    /// Non-empty tile: header with the byte size of header plus body,
    /// then the body.
    pub fn put_tile(&mut self, body: &[u8]) {
        self.align();
        self.put_bit(false);
        self.put_bit(true);
        if body.len() + 2 < 255 {
            self.put_bits((body.len() + 2) as u32, 8);
        } else {
            self.put_bits(255, 8);
            self.put_bits((body.len() + 5) as u32, 24);
        }
        self.put_bytes(body);
    }

    pub fn align(&mut self) {
        self.bits = (self.bits + 7) & !7;
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.align();
        self.buf
    }
}
