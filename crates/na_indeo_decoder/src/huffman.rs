/// Indeo Huffman codebooks.
///
/// A codebook is transmitted as a row descriptor: row `i` holds
/// `1 << xbits[i]` codes made of `i` one-bits, a terminating zero (absent on
/// the last row) and `xbits[i]` payload bits. The decoder keeps eight
/// predefined macroblock and block codebooks plus one custom codebook per
/// table slot, rebuilt only when the transmitted descriptor changes.

use log::warn;

use crate::bitreader::BitReader;
use crate::error::{invalid, Result};
use crate::vlc::{Vlc, VlcCode};

/// Direct-lookup width of every Indeo VLC table.
pub const IVI_VLC_BITS: u32 = 13;

/// Hard limit on the number of codes in one codebook.
pub const MAX_CODES: usize = 256;

// ─── Descriptor ─────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default)]
pub struct HuffDesc {
    pub num_rows: u8,
    pub xbits:    [u8; 16],
}

/// Only the rows in use take part in the comparison.
impl PartialEq for HuffDesc {
    fn eq(&self, other: &Self) -> bool {
        let n = self.num_rows as usize;
        self.num_rows == other.num_rows && self.xbits[..n] == other.xbits[..n]
    }
}

impl Eq for HuffDesc {}

impl HuffDesc {
    pub const fn from_rows(rows: &[u8]) -> Self {
        let mut xbits = [0u8; 16];
        let mut i = 0;
        while i < rows.len() {
            xbits[i] = rows[i];
            i += 1;
        }
        HuffDesc { num_rows: rows.len() as u8, xbits }
    }

    /// Expand the descriptor into canonical `(code, len, symbol)` triples.
    /// Symbols are numbered in code order. Codes past the 256th are dropped.
    pub fn codes(&self) -> Result<Vec<VlcCode>> {
        let rows = self.num_rows as usize;
        if rows == 0 || rows > 16 {
            return invalid(format!("Huffman descriptor with {} rows", rows));
        }

        let mut codes = Vec::new();
        for (i, &xb) in self.xbits[..rows].iter().enumerate() {
            let xb = xb as u32;
            let not_last = (i != rows - 1) as u32;
            let prefix = ((1u32 << i) - 1) << (xb + not_last);
            let len = i as u32 + xb + not_last;
            for j in 0..(1u32 << xb) {
                // Some Indeo5 codebooks describe more codes than a table may hold.
                if codes.len() >= MAX_CODES {
                    break;
                }
                if len > IVI_VLC_BITS {
                    return invalid(format!("Huffman code of {} bits exceeds the table width", len));
                }
                codes.push(VlcCode {
                    code: prefix | j,
                    // A lone zero-length code is sent as a single bit.
                    len:  len.max(1) as u8,
                    sym:  codes.len() as i32,
                });
            }
        }
        Ok(codes)
    }

    pub fn create_huff_from_desc(&self) -> Result<Vlc> {
        Vlc::init_vlc(IVI_VLC_BITS, &self.codes()?)
    }
}

// ─── Predefined codebooks ───────────────────────────────────────────────────

pub static MB_HUFF_DESC: [HuffDesc; 8] = [
    HuffDesc::from_rows(&[0, 4, 5, 4, 4, 4, 6, 6]),
    HuffDesc::from_rows(&[0, 2, 2, 3, 3, 3, 3, 5, 3, 2, 2, 2]),
    HuffDesc::from_rows(&[0, 2, 3, 4, 3, 3, 3, 3, 4, 3, 2, 2]),
    HuffDesc::from_rows(&[0, 3, 4, 4, 3, 3, 3, 3, 3, 2, 2, 2]),
    HuffDesc::from_rows(&[0, 4, 4, 3, 3, 3, 3, 2, 3, 3, 2, 1, 1]),
    HuffDesc::from_rows(&[0, 4, 4, 4, 4, 3, 3, 3, 2]),
    HuffDesc::from_rows(&[0, 4, 4, 4, 4, 3, 3, 2, 2, 2]),
    HuffDesc::from_rows(&[0, 4, 4, 4, 3, 3, 2, 3, 2, 2, 2, 2]),
];

pub static BLK_HUFF_DESC: [HuffDesc; 8] = [
    HuffDesc::from_rows(&[1, 2, 3, 4, 4, 7, 5, 5, 4, 1]),
    HuffDesc::from_rows(&[2, 3, 4, 4, 4, 7, 5, 4, 3, 3, 2]),
    HuffDesc::from_rows(&[2, 4, 5, 5, 5, 5, 6, 4, 4, 3, 1, 1]),
    HuffDesc::from_rows(&[3, 3, 4, 4, 5, 6, 6, 4, 4, 3, 2, 1, 1]),
    HuffDesc::from_rows(&[3, 4, 4, 5, 5, 5, 6, 5, 4, 2, 2]),
    HuffDesc::from_rows(&[3, 4, 5, 5, 5, 5, 6, 4, 3, 3, 2, 1, 1]),
    HuffDesc::from_rows(&[3, 4, 5, 5, 5, 6, 5, 4, 3, 3, 2, 1, 1]),
    HuffDesc::from_rows(&[3, 4, 4, 5, 5, 5, 6, 5, 5]),
];

/// Which family of codebooks a table slot draws from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HuffKind {
    Mb,
    Blk,
}

/// The sixteen predefined tables, built once per decoder.
pub struct VlcStore {
    mb:  Vec<Vlc>,
    blk: Vec<Vlc>,
}

impl VlcStore {
    pub fn new() -> Result<Self> {
        let mb = MB_HUFF_DESC.iter().map(HuffDesc::create_huff_from_desc).collect::<Result<Vec<_>>>()?;
        let blk = BLK_HUFF_DESC.iter().map(HuffDesc::create_huff_from_desc).collect::<Result<Vec<_>>>()?;
        Ok(VlcStore { mb, blk })
    }

    pub fn get(&self, kind: HuffKind, idx: usize) -> &Vlc {
        match kind {
            HuffKind::Mb  => &self.mb[idx & 7],
            HuffKind::Blk => &self.blk[idx & 7],
        }
    }
}

// ─── Table slot ─────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TabSel {
    Predefined(usize),
    Custom,
    /// Use whatever the picture-level block table currently selects.
    Picture,
}

#[derive(Clone, Debug)]
pub struct HuffTab {
    pub sel:   TabSel,
    cust_desc: HuffDesc,
    cust_tab:  Option<Vlc>,
}

impl Default for HuffTab {
    fn default() -> Self {
        HuffTab { sel: TabSel::Predefined(7), cust_desc: HuffDesc::default(), cust_tab: None }
    }
}

impl HuffTab {
    /// Read a codebook selection.
    ///
    /// When `desc_coded` is false the default table 7 is used; otherwise a
    /// 3-bit selector follows, 7 meaning an explicit descriptor.
    pub fn decode_huff_desc(&mut self, br: &mut BitReader, desc_coded: bool) -> Result<()> {
        if !desc_coded {
            self.sel = TabSel::Predefined(7);
            return Ok(());
        }

        let tab_sel = br.get_bits(3) as usize;
        if tab_sel != 7 {
            self.sel = TabSel::Predefined(tab_sel);
            return Ok(());
        }

        let mut new_desc = HuffDesc { num_rows: br.get_bits(4) as u8, xbits: [0; 16] };
        if new_desc.num_rows == 0 {
            warn!("Empty custom Huffman table");
            return invalid("empty custom Huffman table");
        }
        for i in 0..new_desc.num_rows as usize {
            new_desc.xbits[i] = br.get_bits(4) as u8;
        }

        if new_desc != self.cust_desc || self.cust_tab.is_none() {
            self.cust_desc = new_desc;
            self.cust_tab = None;
            match self.cust_desc.create_huff_from_desc() {
                Ok(vlc) => self.cust_tab = Some(vlc),
                Err(err) => {
                    self.cust_desc.num_rows = 0;
                    warn!("Error while initializing custom vlc table: {}", err);
                    return Err(err);
                }
            }
        }
        self.sel = TabSel::Custom;
        Ok(())
    }

    /// Select the picture-level table.
    pub fn use_picture_table(&mut self) {
        self.sel = TabSel::Picture;
    }

    /// Resolve the current selection. `None` for [`TabSel::Picture`] or a
    /// custom table that failed to build.
    pub fn table<'a>(&'a self, store: &'a VlcStore, kind: HuffKind) -> Option<&'a Vlc> {
        match self.sel {
            TabSel::Predefined(n) => Some(store.get(kind, n)),
            TabSel::Custom => self.cust_tab.as_ref(),
            TabSel::Picture => None,
        }
    }

    pub fn custom_desc(&self) -> &HuffDesc {
        &self.cust_desc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitreader::tests::BitWriter;

    fn put_code(w: &mut BitWriter, c: &VlcCode) {
        for i in (0..c.len).rev() {
            w.put_bit((c.code >> i) & 1 != 0);
        }
    }

    fn round_trip(desc: &HuffDesc) {
        let codes = desc.codes().unwrap();
        let expected: usize = desc.xbits[..desc.num_rows as usize].iter().map(|&x| 1usize << x).sum();
        assert_eq!(codes.len(), expected.min(MAX_CODES));

        let vlc = desc.create_huff_from_desc().unwrap();
        let mut w = BitWriter::new();
        for c in codes.iter().rev() {
            put_code(&mut w, c);
        }
        let data = w.finish();
        let mut br = BitReader::new(&data);
        for c in codes.iter().rev() {
            assert_eq!(br.get_vlc2(&vlc, IVI_VLC_BITS, 1), c.sym);
        }
    }

    #[test]
    fn test_predefined_round_trip() {
        for desc in MB_HUFF_DESC.iter().chain(BLK_HUFF_DESC.iter()) {
            round_trip(desc);
        }
    }

    #[test]
    fn test_codes_are_prefix_free() {
        for desc in BLK_HUFF_DESC.iter() {
            let codes = desc.codes().unwrap();
            for a in &codes {
                for b in &codes {
                    if a.sym == b.sym || a.len > b.len {
                        continue;
                    }
                    let prefix = b.code >> (b.len - a.len);
                    assert_ne!(prefix, a.code, "{:?} is a prefix of {:?}", a, b);
                }
            }
        }
    }

    #[test]
    fn test_custom_descriptors() {
        round_trip(&HuffDesc::from_rows(&[0]));
        round_trip(&HuffDesc::from_rows(&[3, 2, 1]));
        // 2 + 4 + 256 codes, the last row is cut short
        let codes = HuffDesc::from_rows(&[1, 2, 8]).codes().unwrap();
        assert_eq!(codes.len(), MAX_CODES);
        assert_eq!(codes[MAX_CODES - 1].sym, 255);
        // last row reaches 3 + 11 = 14 bits
        assert!(HuffDesc::from_rows(&[0, 0, 0, 11]).codes().is_err());
    }

    #[test]
    fn test_oversized_block_codebook_is_truncated() {
        // 8 + 16 + 16 + 32 + 32 + 32 + 64 + 32 + 32 = 264 codes
        let codes = BLK_HUFF_DESC[7].codes().unwrap();
        assert_eq!(codes.len(), MAX_CODES);
        assert!(VlcStore::new().is_ok());
    }

    #[test]
    fn test_descriptor_equality_ignores_unused_rows() {
        let mut a = HuffDesc::from_rows(&[1, 2, 3]);
        let b = HuffDesc::from_rows(&[1, 2, 3]);
        a.xbits[10] = 9;
        assert_eq!(a, b);
        assert_ne!(a, HuffDesc::from_rows(&[1, 2]));
    }

    #[test]
    fn test_decode_huff_desc_selection() {
        let store = VlcStore::new().unwrap();
        let mut w = BitWriter::new();
        w.put_bits(3, 3); // predefined 3
        w.put_bits(7, 3); // custom, 2 rows
        w.put_bits(2, 4);
        w.put_bits(1, 4);
        w.put_bits(2, 4);
        w.put_bits(7, 3); // same custom again
        w.put_bits(2, 4);
        w.put_bits(1, 4);
        w.put_bits(2, 4);
        w.put_bits(7, 3); // empty custom
        w.put_bits(0, 4);
        let data = w.finish();
        let mut br = BitReader::new(&data);

        let mut tab = HuffTab::default();
        tab.decode_huff_desc(&mut br, false).unwrap();
        assert_eq!(tab.sel, TabSel::Predefined(7));
        tab.decode_huff_desc(&mut br, true).unwrap();
        assert_eq!(tab.sel, TabSel::Predefined(3));
        assert!(tab.table(&store, HuffKind::Blk).is_some());

        tab.decode_huff_desc(&mut br, true).unwrap();
        assert_eq!(tab.sel, TabSel::Custom);
        assert_eq!(*tab.custom_desc(), HuffDesc::from_rows(&[1, 2]));
        let first = tab.table(&store, HuffKind::Blk).map(|v| v.table().as_ptr());

        tab.decode_huff_desc(&mut br, true).unwrap();
        let second = tab.table(&store, HuffKind::Blk).map(|v| v.table().as_ptr());
        assert_eq!(first, second, "unchanged descriptor must not rebuild");

        assert!(tab.decode_huff_desc(&mut br, true).is_err());
    }
}
