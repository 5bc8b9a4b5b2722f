/// Generic VLC lookup-table builder.
///
/// Codes are supplied MSB-first (the natural reading of the codeword) and
/// stored bit-reversed, since Indeo reads its bitstream LSB-first. A code
/// longer than the primary table width spills into a chained sub-table;
/// the parent slot then holds the sub-table offset in `sym` and its width
/// as a negative `len`.

use crate::error::{invalid, Result};

// ─── Table entries ──────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VlcEntry {
    /// Decoded symbol, or sub-table offset when `len < 0`.
    pub sym: i32,
    /// Code length, `-width` for a sub-table link, 0 for an unused slot.
    pub len: i8,
}

const EMPTY_ENTRY: VlcEntry = VlcEntry { sym: -1, len: 0 };

/// One input codeword.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VlcCode {
    pub code: u32,
    pub len:  u8,
    pub sym:  i32,
}

/// Working copy of a codeword, left-aligned in 32 bits.
#[derive(Clone, Copy)]
struct AlignedCode {
    code: u32,
    bits: u32,
    sym:  i32,
}

// ─── Lookup table ───────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct Vlc {
    table: Vec<VlcEntry>,
    bits:  u32,
}

impl Vlc {
    /// Build a lookup table with a `table_bits`-wide primary level.
    pub fn init_vlc(table_bits: u32, codes: &[VlcCode]) -> Result<Self> {
        if table_bits == 0 || table_bits > 30 {
            return invalid(format!("VLC table width {} out of range", table_bits));
        }

        let mut work = Vec::with_capacity(codes.len());
        for c in codes {
            if c.len == 0 {
                continue;
            }
            if c.len > 32 {
                return invalid(format!("VLC code of {} bits is too long", c.len));
            }
            if c.len < 32 && c.code >= (1u32 << c.len) {
                return invalid(format!("VLC code {:#x} does not fit in {} bits", c.code, c.len));
            }
            work.push(AlignedCode {
                code: c.code << (32 - c.len as u32),
                bits: c.len as u32,
                sym:  c.sym,
            });
        }
        work.sort_by_key(|c| c.code);

        let mut table = Vec::new();
        build_table(&mut table, table_bits, &mut work)?;
        Ok(Vlc { table, bits: table_bits })
    }

    #[inline]
    pub fn table(&self) -> &[VlcEntry] {
        &self.table
    }

    /// Width of the primary lookup level.
    pub fn bits(&self) -> u32 {
        self.bits
    }
}

fn build_table(table: &mut Vec<VlcEntry>, table_nb_bits: u32, codes: &mut [AlignedCode]) -> Result<usize> {
    if table_nb_bits > 30 {
        return invalid("VLC sub-table too wide");
    }
    let table_size = 1usize << table_nb_bits;
    let table_index = table.len();
    table.resize(table_index + table_size, EMPTY_ENTRY);

    let mut i = 0;
    while i < codes.len() {
        let AlignedCode { code, bits: n, sym } = codes[i];

        if n <= table_nb_bits {
            let mut j = code.reverse_bits() as usize;
            let inc = 1usize << n;
            for _ in 0..(1usize << (table_nb_bits - n)) {
                let slot = &mut table[table_index + j];
                if slot.len != 0 {
                    return invalid("incorrect VLC codes");
                }
                *slot = VlcEntry { sym, len: n as i8 };
                j += inc;
            }
            i += 1;
        } else {
            // Gather every code sharing this prefix into one sub-table.
            let rest = n - table_nb_bits;
            let code_prefix = code >> (32 - table_nb_bits);
            let mut subtable_bits = rest;
            codes[i].bits = rest;
            codes[i].code = code << table_nb_bits;

            let mut k = i + 1;
            while k < codes.len() {
                if codes[k].bits <= table_nb_bits {
                    break;
                }
                let ck = codes[k].code;
                if ck >> (32 - table_nb_bits) != code_prefix {
                    break;
                }
                let nk = codes[k].bits - table_nb_bits;
                codes[k].bits = nk;
                codes[k].code = ck << table_nb_bits;
                subtable_bits = subtable_bits.max(nk);
                k += 1;
            }
            let subtable_bits = subtable_bits.min(table_nb_bits);

            let j = (code_prefix.reverse_bits() >> (32 - table_nb_bits)) as usize;
            if table[table_index + j].len != 0 {
                return invalid("incorrect VLC codes");
            }
            let index = build_table(table, subtable_bits, &mut codes[i..k])?;
            table[table_index + j] = VlcEntry { sym: index as i32, len: -(subtable_bits as i8) };
            i = k;
        }
    }
    Ok(table_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitreader::tests::BitWriter;
    use crate::bitreader::BitReader;

    fn put_code(w: &mut BitWriter, code: u32, len: u8) {
        // MSB of the codeword goes out first.
        for i in (0..len).rev() {
            w.put_bit((code >> i) & 1 != 0);
        }
    }

    #[test]
    fn test_short_codes() {
        let codes = [
            VlcCode { code: 0b0,   len: 1, sym: 10 },
            VlcCode { code: 0b10,  len: 2, sym: 20 },
            VlcCode { code: 0b110, len: 3, sym: 30 },
            VlcCode { code: 0b111, len: 3, sym: 40 },
        ];
        let vlc = Vlc::init_vlc(4, &codes).unwrap();

        let mut w = BitWriter::new();
        for c in [3usize, 0, 2, 1, 0] {
            put_code(&mut w, codes[c].code, codes[c].len);
        }
        let data = w.finish();
        let mut br = BitReader::new(&data);
        let got: Vec<i32> = (0..5).map(|_| br.get_vlc2(&vlc, 4, 1)).collect();
        assert_eq!(got, vec![40, 10, 30, 20, 10]);
    }

    #[test]
    fn test_subtables_for_long_codes() {
        // Unary-style code: 0, 10, 110, ..., 1111111110, 1111111111
        let mut codes = Vec::new();
        for i in 0..10u32 {
            codes.push(VlcCode { code: ((1 << i) - 1) << 1, len: (i + 1) as u8, sym: i as i32 });
        }
        codes.push(VlcCode { code: (1 << 10) - 1, len: 10, sym: 10 });
        let vlc = Vlc::init_vlc(3, &codes).unwrap();
        assert!(vlc.table().iter().any(|e| e.len < 0));

        let mut w = BitWriter::new();
        for c in &codes {
            put_code(&mut w, c.code, c.len);
        }
        let data = w.finish();
        let mut br = BitReader::new(&data);
        for c in &codes {
            assert_eq!(br.get_vlc2(&vlc, 3, 4), c.sym);
        }
    }

    #[test]
    fn test_depth_limit_reports_miss() {
        let codes = [
            VlcCode { code: 0,      len: 1, sym: 0 },
            VlcCode { code: 0b1000, len: 4, sym: 1 },
            VlcCode { code: 0b1001, len: 4, sym: 2 },
        ];
        let vlc = Vlc::init_vlc(2, &codes).unwrap();
        let mut w = BitWriter::new();
        put_code(&mut w, 0b1001, 4);
        let data = w.finish();
        let mut br = BitReader::new(&data);
        assert_eq!(br.get_vlc2(&vlc, 2, 1), -1);
        let mut br = BitReader::new(&data);
        assert_eq!(br.get_vlc2(&vlc, 2, 2), 2);
    }

    #[test]
    fn test_rejects_bad_input() {
        let dup = [
            VlcCode { code: 0b01, len: 2, sym: 0 },
            VlcCode { code: 0b01, len: 2, sym: 1 },
        ];
        assert!(Vlc::init_vlc(4, &dup).is_err());

        let long = [VlcCode { code: 1, len: 33, sym: 0 }];
        assert!(Vlc::init_vlc(8, &long).is_err());

        assert!(Vlc::init_vlc(31, &[]).is_err());
    }
}
