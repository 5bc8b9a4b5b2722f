//! Indeo Video Interactive 4 bitstream syntax
//!
//! Picture header, band header and macroblock info parsing, plus the
//! run-length coded transparency band.

use log::{debug, trace, warn};

use crate::bitreader::BitReader;
use crate::bufswitch::{FrameType, Generation};
use crate::decoder::{check_mb_vector, read_mb_delta, scale_mv, FormatDecoder, IndeoContext, IndeoDecoder, PictureHeader};
use crate::dsp::{Transform, TransformKind};
use crate::error::{invalid, unsupported, Result};
use crate::huffman::{HuffDesc, IVI_VLC_BITS};
use crate::plane::{check_image_size, mbs_per_tile, Band, MbInfo, PicConfig, Tile, MAX_CORRECTIONS};
use crate::tables::{
    SCAN_4X4_ALT, SCAN_4X4_DIRECT, SCAN_4X4_HOR, SCAN_4X4_VER, SCAN_8X8_ALT, SCAN_8X8_HOR, SCAN_8X8_VER, ZIGZAG_8X8,
};
use crate::vlc::Vlc;

pub type Indeo4Decoder = IndeoDecoder<Indeo4Format>;

/// Standard picture sizes selected by the 3-bit size index.
const PIC_SIZES: [(usize, usize); 7] =
    [(640, 480), (320, 240), (160, 120), (704, 480), (352, 240), (352, 288), (176, 144)];

/// Quantization matrix index → base table.
const QUANT_INDEX_TO_TAB: [usize; 22] = [0, 1, 0, 2, 1, 3, 0, 4, 1, 5, 0, 1, 6, 7, 8, 0, 1, 2, 2, 3, 3, 4];

static SCAN_INDEX_TO_TAB: [&[u8]; 15] = [
    // 8x8
    &ZIGZAG_8X8,
    &SCAN_8X8_ALT,
    &SCAN_8X8_HOR,
    &SCAN_8X8_VER,
    &ZIGZAG_8X8,
    // 4x4
    &SCAN_4X4_DIRECT,
    &SCAN_4X4_ALT,
    &SCAN_4X4_VER,
    &SCAN_4X4_HOR,
    &SCAN_4X4_DIRECT,
    // 8x8, unused by known encoders
    &SCAN_8X8_HOR,
    &SCAN_8X8_HOR,
    &SCAN_8X8_HOR,
    &SCAN_8X8_HOR,
    &SCAN_8X8_HOR,
];

/// Transform table entry: kind, size and whether the DC is predicted.
#[derive(Clone, Copy)]
enum TransformSlot {
    Known(TransformKind, usize, bool),
    Dct,
    Missing,
}

const TRANSFORMS: [TransformSlot; 18] = {
    use TransformKind::*;
    use TransformSlot::*;
    [
        Known(Haar2d, 8, true),
        Known(HaarRow, 8, false),
        Known(HaarCol, 8, false),
        Known(Copy, 8, true),
        Known(Slant2d, 8, true),
        Known(SlantRow, 8, true),
        Known(SlantCol, 8, true),
        Dct,
        Dct,
        Dct,
        Known(Haar2d, 4, true),
        Known(Slant2d, 4, true),
        Missing,
        Known(HaarRow, 4, false),
        Known(HaarCol, 4, false),
        Known(SlantRow, 4, false),
        Known(SlantCol, 4, false),
        Dct,
    ]
};

/// Band count of a plane: 1 or 4, 0 for an unsupported layout.
fn decode_plane_subdivision(br: &mut BitReader) -> usize {
    match br.get_bits(2) {
        3 => 1,
        2 => {
            for _ in 0..4 {
                if br.get_bits(2) != 3 {
                    return 0;
                }
            }
            4
        }
        _ => 0,
    }
}

#[inline]
fn scale_tile_size(def_size: usize, size_factor: u32) -> usize {
    if size_factor == 15 {
        def_size
    } else {
        ((size_factor + 1) << 5) as usize
    }
}

/// Indeo4 syntax state. Holds the transparency codebook between frames.
#[derive(Default)]
pub struct Indeo4Format {
    trans_desc: HuffDesc,
    trans_vlc:  Option<Vlc>,
}

impl FormatDecoder for Indeo4Format {
    const GENERATION: Generation = Generation::Indeo4;

    fn decode_picture_header(&mut self, ctx: &mut IndeoContext, br: &mut BitReader) -> Result<()> {
        if br.get_bits(18) != 0x3FFF8 {
            return invalid("invalid picture start code");
        }

        let hdr = &mut ctx.hdr;
        hdr.prev_frame_type = hdr.frame_type;
        hdr.frame_type = FrameType::from_indeo4(br.get_bits(3))?;
        if hdr.frame_type == FrameType::Bidir && !hdr.has_b_frames {
            debug!("Stream uses bidirectional frames");
            hdr.has_b_frames = true;
        }

        hdr.has_transp = br.get_bit();

        // unknown bit: Mac decoder ignores this bit, XANIM returns error
        if br.get_bit() {
            return invalid("sync bit is set");
        }

        hdr.data_size = if br.get_bit() { br.get_bits(24) } else { 0 };

        // null frames don't contain anything else
        if hdr.frame_type.is_null() {
            debug!("Null frame {:?}", hdr.frame_type);
            return Ok(());
        }

        // password-protected clip
        if br.get_bit() {
            hdr.lock_word = br.get_bits_long(32);
            debug!("Lock word {:#010x}", hdr.lock_word);
        }

        let pic_size_indx = br.get_bits(3) as usize;
        let (width, height) = if pic_size_indx == 7 {
            let h = br.get_bits(16) as usize;
            let w = br.get_bits(16) as usize;
            (w, h)
        } else {
            PIC_SIZES[pic_size_indx]
        };
        if width == 0 || height == 0 {
            return invalid(format!("invalid picture size {}x{}", width, height));
        }
        check_image_size(width, height)?;

        let mut pic_conf = PicConfig { pic_width: width, pic_height: height, ..PicConfig::default() };

        // tile size
        hdr.uses_tiling = br.get_bit();
        if hdr.uses_tiling {
            pic_conf.tile_height = scale_tile_size(height, br.get_bits(4));
            pic_conf.tile_width = scale_tile_size(width, br.get_bits(4));
        } else {
            pic_conf.tile_height = height;
            pic_conf.tile_width = width;
        }

        // chroma subsampling
        if br.get_bits(2) != 0 {
            return unsupported("only YVU9 chroma subsampling");
        }
        pic_conf.set_chroma_from_luma();

        pic_conf.luma_bands = decode_plane_subdivision(br);
        pic_conf.chroma_bands = 0;
        if pic_conf.luma_bands != 0 {
            pic_conf.chroma_bands = decode_plane_subdivision(br);
        }
        hdr.is_scalable = pic_conf.luma_bands != 1 || pic_conf.chroma_bands != 1;
        if hdr.is_scalable && (pic_conf.luma_bands != 4 || pic_conf.chroma_bands != 1) {
            return invalid(format!(
                "scalability: unsupported subdivision, luma {} chroma {}",
                pic_conf.luma_bands, pic_conf.chroma_bands
            ));
        }

        if ctx.layout.reconfigure(&pic_conf, false, true)? {
            let is_scalable = hdr.is_scalable;
            for (p, plane) in ctx.layout.planes.iter_mut().enumerate() {
                for band in plane.bands.iter_mut() {
                    band.mb_size = if p == 0 { if is_scalable { 8 } else { 16 } } else { 4 };
                    band.blk_size = if p == 0 { 8 } else { 4 };
                }
            }
            if let Err(err) = ctx.layout.init_tiles(pic_conf.tile_width, pic_conf.tile_height) {
                ctx.layout.clear();
                return Err(err);
            }
        }

        let hdr = &mut ctx.hdr;
        hdr.frame_num = if br.get_bit() { br.get_bits(20) } else { 0 };

        // decoder time estimate
        if br.get_bit() {
            br.skip_bits(8);
        }

        let coded = br.get_bit();
        hdr.mb_vlc.decode_huff_desc(br, coded)?;
        let coded = br.get_bit();
        hdr.blk_vlc.decode_huff_desc(br, coded)?;

        hdr.rvmap_sel = if br.get_bit() { br.get_bits(3) as usize } else { 8 };

        hdr.in_imf = br.get_bit();
        hdr.in_q = br.get_bit();
        hdr.glob_quant = br.get_bits(5);

        hdr.unknown1 = if br.get_bit() { br.get_bits(3) } else { 0 };
        hdr.checksum = if br.get_bit() { br.get_bits(16) } else { 0 };

        // picture header extension
        while br.get_bit() {
            trace!("Picture header extension");
            if br.get_bits_left() < 10 {
                return invalid("truncated picture header extension");
            }
            br.skip_bits(8);
        }

        if br.get_bit() {
            warn!("Bad blocks bits encountered");
        }

        br.align();

        debug!(
            "Indeo4 frame {} {:?}: {}x{} tiles {}x{} bands {}/{} transp {}",
            hdr.frame_num,
            hdr.frame_type,
            width,
            height,
            pic_conf.tile_width,
            pic_conf.tile_height,
            pic_conf.luma_bands,
            pic_conf.chroma_bands,
            hdr.has_transp
        );
        Ok(())
    }

    fn decode_band_header(&self, hdr: &PictureHeader, band: &mut Band, br: &mut BitReader) -> Result<()> {
        let plane = br.get_bits(2) as usize;
        let band_num = br.get_bits(4) as usize;
        if band.plane != plane || band.band_num != band_num {
            return invalid("invalid band header sequence");
        }

        band.is_empty = br.get_bit();
        if !band.is_empty {
            let old_blk_size = band.blk_size;

            // header size; 4 bytes when absent
            if br.get_bit() {
                br.skip_bits(16);
            }

            let halfpel = br.get_bits(2);
            if halfpel >= 2 {
                return invalid(format!("unsupported mv resolution {}", halfpel));
            }
            band.is_halfpel = halfpel == 1;

            band.checksum_present = br.get_bit();
            if band.checksum_present {
                band.checksum = br.get_bits(16);
            }

            let indx = br.get_bits(2) as usize;
            if indx == 3 {
                return invalid("invalid block size");
            }
            band.mb_size = 16 >> indx;
            band.blk_size = 8 >> (indx >> 1);

            band.inherit_mv = br.get_bit();
            band.inherit_qdelta = br.get_bit();
            band.glob_quant = br.get_bits(5) as i32;

            if !br.get_bit() || hdr.frame_type == FrameType::Intra {
                let transform_id = br.get_bits(5) as usize;
                let (kind, size, is_2d) = match TRANSFORMS.get(transform_id) {
                    Some(TransformSlot::Known(kind, size, is_2d)) => (*kind, *size, *is_2d),
                    Some(TransformSlot::Dct) => return unsupported("DCT transform"),
                    _ => return unsupported(format!("transform {}", transform_id)),
                };
                if transform_id < 10 && band.blk_size < 8 {
                    return invalid("wrong transform size");
                }
                band.transform = Transform::new(kind, size)?;
                band.is_2d_trans = is_2d;
                if band.blk_size != size {
                    return invalid("transform and block size mismatch");
                }

                let scan_indx = br.get_bits(4) as usize;
                if scan_indx == 15 {
                    return invalid("custom scan pattern encountered");
                }
                if scan_indx > 4 && scan_indx < 10 {
                    if band.blk_size != 4 {
                        return invalid("mismatching scan table");
                    }
                } else if band.blk_size != 8 {
                    return invalid("mismatching scan table");
                }
                band.scan = Some(SCAN_INDEX_TO_TAB[scan_indx]);
                band.scan_size = band.blk_size;

                let quant_mat = br.get_bits(5) as usize;
                if quant_mat == 31 {
                    return unsupported("custom quant matrix");
                }
                if quant_mat >= QUANT_INDEX_TO_TAB.len() {
                    return invalid(format!("quantization matrix {}", quant_mat));
                }
                band.quant_mat = quant_mat;
            } else if old_blk_size != band.blk_size {
                return invalid("band block size does not match the inherited configuration");
            }

            if QUANT_INDEX_TO_TAB[band.quant_mat] > 4 && band.blk_size == 4 {
                band.quant_mat = 0;
                return invalid("invalid quant matrix for 4x4 block");
            }

            // block huffman codebook
            if !br.get_bit() {
                band.blk_vlc.use_picture_table();
            } else {
                band.blk_vlc.decode_huff_desc(br, true)?;
            }

            band.rvmap_sel = if br.get_bit() { br.get_bits(3) as usize } else { 8 };

            band.num_corr = 0;
            band.corr.clear();
            if br.get_bit() {
                band.num_corr = br.get_bits(8) as usize;
                if band.num_corr > MAX_CORRECTIONS {
                    band.num_corr = 0;
                    return invalid("too many corrections");
                }
                for _ in 0..band.num_corr * 2 {
                    band.corr.push(br.get_bits(8) as u8);
                }
            }

            // Indeo4 has no scale tables
            band.intra_scale = None;
            band.inter_scale = None;
            let tab = QUANT_INDEX_TO_TAB[band.quant_mat];
            if band.blk_size == 8 {
                band.intra_base = &INTRA_BASE_8X8[tab];
                band.inter_base = &INTER_BASE_8X8[tab];
            } else {
                band.intra_base = &INTRA_BASE_4X4[tab];
                band.inter_base = &INTER_BASE_4X4[tab];
            }

            trace!(
                "Band {}/{}: mb {} blk {} {:?} quant {} mat {} halfpel {}",
                plane,
                band_num,
                band.mb_size,
                band.blk_size,
                band.transform.kind,
                band.glob_quant,
                band.quant_mat,
                band.is_halfpel
            );
        }

        br.align();
        Ok(())
    }

    fn decode_mb_info(
        &self,
        hdr: &PictureHeader,
        mb_vlc: &Vlc,
        band: &Band,
        tile: &mut Tile,
        ref_tile: Option<&Tile>,
        mv_scale: i32,
        br: &mut BitReader,
    ) -> Result<()> {
        let blks_per_mb = if band.mb_size != band.blk_size { 4 } else { 1 };
        let mb_type_bits = if hdr.frame_type == FrameType::Bidir { 2 } else { 1 };
        let is_base_band = band.plane == 0 && band.band_num == 0;

        if tile.num_mbs != mbs_per_tile(tile.width, tile.height, band.mb_size) || tile.mbs.len() != tile.num_mbs {
            return invalid("allocated tile size mismatches parameters");
        }

        let pitch = band.pitch;
        let mut mv_x = 0;
        let mut mv_y = 0;
        let mut idx = 0;

        for y in (tile.ypos..tile.ypos + tile.height).step_by(band.mb_size) {
            for x in (tile.xpos..tile.xpos + tile.width).step_by(band.mb_size) {
                if br.get_bits_left() < 1 {
                    return invalid("insufficient input for mb info");
                }
                let ref_mb = ref_tile.and_then(|r| r.mbs.get(idx));
                let mut mb = MbInfo {
                    xpos: x as i32,
                    ypos: y as i32,
                    buf_offs: (y * pitch + x) as i32,
                    ..MbInfo::default()
                };

                if br.get_bit() {
                    if hdr.frame_type == FrameType::Intra {
                        return invalid("empty macroblock in an intra frame");
                    }
                    mb.mb_type = 1;
                    mb.cbp = 0;
                    if is_base_band && hdr.in_q {
                        mb.q_delta = read_mb_delta(br, mb_vlc)?;
                    }
                    if band.inherit_mv {
                        if let Some(r) = ref_mb {
                            mb.mv_x = scale_mv(r.mv_x, mv_scale);
                            mb.mv_y = scale_mv(r.mv_y, mv_scale);
                        }
                    }
                } else {
                    if band.inherit_mv {
                        match ref_mb {
                            Some(r) => mb.mb_type = r.mb_type,
                            None => return invalid("missing reference macroblock"),
                        }
                    } else if hdr.frame_type.is_intra() {
                        mb.mb_type = 0;
                    } else {
                        mb.mb_type = br.get_bits(mb_type_bits) as i32;
                    }

                    mb.cbp = br.get_bits(blks_per_mb);

                    if band.inherit_qdelta {
                        if let Some(r) = ref_mb {
                            mb.q_delta = r.q_delta;
                        }
                    } else if mb.cbp != 0 || (is_base_band && hdr.in_q) {
                        mb.q_delta = read_mb_delta(br, mb_vlc)?;
                    }

                    if mb.mb_type != 0 {
                        if band.inherit_mv {
                            if let Some(r) = ref_mb {
                                mb.mv_x = scale_mv(r.mv_x, mv_scale);
                                mb.mv_y = scale_mv(r.mv_y, mv_scale);
                            }
                        } else {
                            mv_y += read_mb_delta(br, mb_vlc)?;
                            mv_x += read_mb_delta(br, mb_vlc)?;
                            mb.mv_x = mv_x;
                            mb.mv_y = mv_y;
                            if mb.mb_type == 3 {
                                mv_y += read_mb_delta(br, mb_vlc)?;
                                mv_x += read_mb_delta(br, mb_vlc)?;
                                mb.b_mv_y = -mv_y;
                                mb.b_mv_x = -mv_x;
                            }
                        }
                        if mb.mb_type == 2 {
                            mb.b_mv_x = -mb.mv_x;
                            mb.b_mv_y = -mb.mv_y;
                            mb.mv_x = 0;
                            mb.mv_y = 0;
                        }
                    }
                }

                if mb.mb_type != 0 {
                    check_mb_vector(band, &mb)?;
                }

                tile.mbs[idx] = mb;
                idx += 1;
            }
        }

        br.align();
        Ok(())
    }

    fn decode_transparency(&mut self, br: &mut BitReader, width: usize, height: usize, alpha: &mut [u8]) -> Result<()> {
        let color_plane = br.get_bits(2);
        let bit_depth = br.get_bits(3);
        let dirty_rects = br.get_bits(8) as usize;
        if br.get_bits_left() < (dirty_rects * 64) as isize {
            return invalid("truncated transparency rectangles");
        }
        for _ in 0..dirty_rects {
            // x, y, width, height
            br.skip_bits_long(64);
        }
        if br.get_bit() {
            let key = br.get_bits(24);
            trace!("Transparency key color {:06x}", key);
        }
        br.skip_bits(1);
        trace!("Transparency plane {} depth {} rects {}", color_plane, bit_depth, dirty_rects);

        let num_rows = br.get_bits(4) as usize;
        if num_rows == 0 {
            return invalid("empty transparency codebook");
        }
        let mut rows = [0u8; 16];
        for r in rows.iter_mut().take(num_rows) {
            *r = br.get_bits(4) as u8;
        }
        let desc = HuffDesc::from_rows(&rows[..num_rows]);
        if desc != self.trans_desc || self.trans_vlc.is_none() {
            self.trans_desc = desc;
            self.trans_vlc = Some(desc.create_huff_from_desc()?);
        }
        let Some(vlc) = self.trans_vlc.as_ref() else {
            return invalid("transparency codebook is not set");
        };
        br.align();

        let tile_start = br.get_bits_count();
        if br.get_bit() {
            // empty tile: keep the previous mask
            return Ok(());
        }
        br.get_bit();
        let mut len = br.get_bits(8) as usize;
        if len == 255 {
            len = br.get_bits(24) as usize;
        }
        br.align();
        let tile_end = tile_start + len * 8;
        if tile_end > br.size_in_bits() {
            return invalid("transparency tile exceeds the packet");
        }

        // runs alternate between opaque and transparent
        let first_val = br.get_bit();
        let mut fill: u8 = if first_val { 0 } else { 255 };
        let row_width = (width + 31) & !31;
        let (mut x, mut y) = (0usize, 0usize);

        while br.get_bits_count() < tile_end {
            let code = br.get_vlc2(vlc, IVI_VLC_BITS, 1);
            if code < 0 {
                return invalid("invalid transparency code");
            }
            let run = if code == 0 { 255 } else { code as usize };
            for _ in 0..run {
                if x < width && y < height {
                    alpha[x + y * width] = fill;
                }
                x += 1;
                if x == row_width {
                    x = 0;
                    y += 1;
                }
            }
            if code != 0 {
                fill = !fill;
            }
        }
        br.align();
        Ok(())
    }
}

// ─── Quantization base tables ───────────────────────────────────────────────

static INTRA_BASE_8X8: [[u16; 64]; 9] = [
  [
       43,   342,   385,   470,   555,   555,   598,   726,
      342,   342,   470,   513,   555,   598,   726,   769,
      385,   470,   555,   555,   598,   726,   726,   811,
      470,   470,   555,   555,   598,   726,   769,   854,
      470,   555,   555,   598,   683,   726,   854,  1025,
      555,   555,   598,   683,   726,   854,  1025,  1153,
      555,   555,   598,   726,   811,   982,  1195,  1451,
      555,   598,   726,   811,   982,  1195,  1451,  1793,
  ],
  [
       86,  1195,  2390,  2390,  4865,  4865,  4865,  4865,
     1195,  1195,  2390,  2390,  4865,  4865,  4865,  4865,
     2390,  2390,  4865,  4865,  6827,  6827,  6827,  6827,
     2390,  2390,  4865,  4865,  6827,  6827,  6827,  6827,
     4865,  4865,  6827,  6827,  6827,  6827,  6827,  6827,
     4865,  4865,  6827,  6827,  6827,  6827,  6827,  6827,
     4865,  4865,  6827,  6827,  6827,  6827,  6827,  6827,
     4865,  4865,  6827,  6827,  6827,  6827,  6827,  6827,
  ],
  [
      235,  1067,  1195,  1323,  1451,  1579,  1707,  1835,
      235,  1067,  1195,  1323,  1451,  1579,  1707,  1835,
      235,  1067,  1195,  1323,  1451,  1579,  1707,  1835,
      235,  1067,  1195,  1323,  1451,  1579,  1707,  1835,
      235,  1067,  1195,  1323,  1451,  1579,  1707,  1835,
      235,  1067,  1195,  1323,  1451,  1579,  1707,  1835,
      235,  1067,  1195,  1323,  1451,  1579,  1707,  1835,
      235,  1067,  1195,  1323,  1451,  1579,  1707,  1835,
  ],
  [
     1707,  1707,  3414,  3414,  3414,  3414,  3414,  3414,
     1707,  1707,  3414,  3414,  3414,  3414,  3414,  3414,
     1707,  1707,  3414,  3414,  3414,  3414,  3414,  3414,
     1707,  1707,  3414,  3414,  3414,  3414,  3414,  3414,
     1707,  1707,  3414,  3414,  3414,  3414,  3414,  3414,
     1707,  1707,  3414,  3414,  3414,  3414,  3414,  3414,
     1707,  1707,  3414,  3414,  3414,  3414,  3414,  3414,
     1707,  1707,  3414,  3414,  3414,  3414,  3414,  3414,
  ],
  [
      897,   897,   897,   897,   897,   897,   897,   897,
     1067,  1067,  1067,  1067,  1067,  1067,  1067,  1067,
     1238,  1238,  1238,  1238,  1238,  1238,  1238,  1238,
     1409,  1409,  1409,  1409,  1409,  1409,  1409,  1409,
     1579,  1579,  1579,  1579,  1579,  1579,  1579,  1579,
     1750,  1750,  1750,  1750,  1750,  1750,  1750,  1750,
     1921,  1921,  1921,  1921,  1921,  1921,  1921,  1921,
     2091,  2091,  2091,  2091,  2091,  2091,  2091,  2091,
  ],
  [
     1707,  1707,  1707,  1707,  1707,  1707,  1707,  1707,
     1707,  1707,  1707,  1707,  1707,  1707,  1707,  1707,
     3414,  3414,  3414,  3414,  3414,  3414,  3414,  3414,
     3414,  3414,  3414,  3414,  3414,  3414,  3414,  3414,
     3414,  3414,  3414,  3414,  3414,  3414,  3414,  3414,
     3414,  3414,  3414,  3414,  3414,  3414,  3414,  3414,
     3414,  3414,  3414,  3414,  3414,  3414,  3414,  3414,
     3414,  3414,  3414,  3414,  3414,  3414,  3414,  3414,
  ],
  [
     2390,  2390,  2390,  2390,  2390,  2390,  2390,  2390,
     2390,  2390,  2390,  2390,  2390,  2390,  2390,  2390,
     2390,  2390,  2390,  2390,  2390,  2390,  2390,  2390,
     2390,  2390,  2390,  2390,  2390,  2390,  2390,  2390,
     2390,  2390,  2390,  2390,  2390,  2390,  2390,  2390,
     2390,  2390,  2390,  2390,  2390,  2390,  2390,  2390,
     2390,  2390,  2390,  2390,  2390,  2390,  2390,  2390,
     2390,  2390,  2390,  2390,  2390,  2390,  2390,  2390,
  ],
  [
       22,   171,   214,   257,   257,   299,   299,   342,
      171,   171,   257,   257,   299,   299,   342,   385,
      214,   257,   257,   299,   299,   342,   342,   385,
      257,   257,   257,   299,   299,   342,   385,   427,
      257,   257,   299,   299,   342,   385,   427,   513,
      257,   299,   299,   342,   385,   427,   513,   598,
      299,   299,   299,   385,   385,   470,   598,   726,
      299,   299,   385,   385,   470,   598,   726,   897,
  ],
  [
       86,   598,  1195,  1195,  2390,  2390,  2390,  2390,
      598,   598,  1195,  1195,  2390,  2390,  2390,  2390,
     1195,  1195,  2390,  2390,  3414,  3414,  3414,  3414,
     1195,  1195,  2390,  2390,  3414,  3414,  3414,  3414,
     2390,  2390,  3414,  3414,  3414,  3414,  3414,  3414,
     2390,  2390,  3414,  3414,  3414,  3414,  3414,  3414,
     2390,  2390,  3414,  3414,  3414,  3414,  3414,  3414,
     2390,  2390,  3414,  3414,  3414,  3414,  3414,  3414,
  ],
];

static INTER_BASE_8X8: [[u16; 64]; 9] = [
  [
      427,   427,   470,   427,   427,   427,   470,   470,
      427,   427,   470,   427,   427,   427,   470,   470,
      470,   470,   470,   470,   470,   470,   470,   470,
      427,   427,   470,   470,   427,   427,   470,   470,
      427,   427,   470,   427,   427,   427,   470,   470,
      427,   427,   470,   427,   427,   427,   470,   470,
      470,   470,   470,   470,   470,   470,   470,   470,
      470,   470,   470,   470,   470,   470,   470,   470,
  ],
  [
     1707,  1707,  2433,  2433,  3414,  3414,  3414,  3414,
     1707,  1707,  2433,  2433,  3414,  3414,  3414,  3414,
     2433,  2433,  3414,  3414,  4822,  4822,  4822,  4822,
     2433,  2433,  3414,  3414,  4822,  4822,  4822,  4822,
     3414,  3414,  4822,  4822,  3414,  3414,  3414,  3414,
     3414,  3414,  4822,  4822,  3414,  3414,  3414,  3414,
     3414,  3414,  4822,  4822,  3414,  3414,  3414,  3414,
     3414,  3414,  4822,  4822,  3414,  3414,  3414,  3414,
  ],
  [
     1195,  1195,  1281,  1238,  1195,  1195,  1281,  1281,
     1195,  1195,  1281,  1238,  1195,  1195,  1281,  1281,
     1195,  1195,  1281,  1238,  1195,  1195,  1281,  1281,
     1195,  1195,  1281,  1238,  1195,  1195,  1281,  1281,
     1195,  1195,  1281,  1238,  1195,  1195,  1281,  1281,
     1195,  1195,  1281,  1238,  1195,  1195,  1281,  1281,
     1195,  1195,  1281,  1238,  1195,  1195,  1281,  1281,
     1195,  1195,  1281,  1238,  1195,  1195,  1281,  1281,
  ],
  [
     2433,  2433,  3414,  3414,  2433,  2433,  2433,  2433,
     2433,  2433,  3414,  3414,  2433,  2433,  2433,  2433,
     2433,  2433,  3414,  3414,  2433,  2433,  2433,  2433,
     2433,  2433,  3414,  3414,  2433,  2433,  2433,  2433,
     2433,  2433,  3414,  3414,  2433,  2433,  2433,  2433,
     2433,  2433,  3414,  3414,  2433,  2433,  2433,  2433,
     2433,  2433,  3414,  3414,  2433,  2433,  2433,  2433,
     2433,  2433,  3414,  3414,  2433,  2433,  2433,  2433,
  ],
  [
     1195,  1195,  1195,  1195,  1195,  1195,  1195,  1195,
     1195,  1195,  1195,  1195,  1195,  1195,  1195,  1195,
     1281,  1281,  1281,  1281,  1281,  1281,  1281,  1281,
     1238,  1238,  1238,  1238,  1238,  1238,  1238,  1238,
     1195,  1195,  1195,  1195,  1195,  1195,  1195,  1195,
     1195,  1195,  1195,  1195,  1195,  1195,  1195,  1195,
     1281,  1281,  1281,  1281,  1281,  1281,  1281,  1281,
     1281,  1281,  1281,  1281,  1281,  1281,  1281,  1281,
  ],
  [
     2433,  2433,  2433,  2433,  2433,  2433,  2433,  2433,
     2433,  2433,  2433,  2433,  2433,  2433,  2433,  2433,
     3414,  3414,  3414,  3414,  3414,  3414,  3414,  3414,
     3414,  3414,  3414,  3414,  3414,  3414,  3414,  3414,
     2433,  2433,  2433,  2433,  2433,  2433,  2433,  2433,
     2433,  2433,  2433,  2433,  2433,  2433,  2433,  2433,
     2433,  2433,  2433,  2433,  2433,  2433,  2433,  2433,
     2433,  2433,  2433,  2433,  2433,  2433,  2433,  2433,
  ],
  [
     1707,  1707,  1707,  1707,  1707,  1707,  1707,  1707,
     1707,  1707,  1707,  1707,  1707,  1707,  1707,  1707,
     1707,  1707,  1707,  1707,  1707,  1707,  1707,  1707,
     1707,  1707,  1707,  1707,  1707,  1707,  1707,  1707,
     1707,  1707,  1707,  1707,  1707,  1707,  1707,  1707,
     1707,  1707,  1707,  1707,  1707,  1707,  1707,  1707,
     1707,  1707,  1707,  1707,  1707,  1707,  1707,  1707,
     1707,  1707,  1707,  1707,  1707,  1707,  1707,  1707,
  ],
  [
       86,   171,   171,   214,   214,   214,   214,   257,
      171,   171,   214,   214,   214,   214,   257,   257,
      171,   214,   214,   214,   214,   257,   257,   257,
      214,   214,   214,   214,   257,   257,   257,   299,
      214,   214,   214,   257,   257,   257,   299,   299,
      214,   214,   257,   257,   257,   299,   299,   299,
      214,   257,   257,   257,   299,   299,   299,   342,
      257,   257,   257,   299,   299,   299,   342,   342,
  ],
  [
      854,   854,  1195,  1195,  1707,  1707,  1707,  1707,
      854,   854,  1195,  1195,  1707,  1707,  1707,  1707,
     1195,  1195,  1707,  1707,  2390,  2390,  2390,  2390,
     1195,  1195,  1707,  1707,  2390,  2390,  2390,  2390,
     1707,  1707,  2390,  2390,  1707,  1707,  1707,  1707,
     1707,  1707,  2390,  2390,  1707,  1707,  1707,  1707,
     1707,  1707,  2390,  2390,  1707,  1707,  1707,  1707,
     1707,  1707,  2390,  2390,  1707,  1707,  1707,  1707,
  ],
];

static INTRA_BASE_4X4: [[u16; 16]; 5] = [
  [
       22,   214,   257,   299,
      214,   257,   299,   342,
      257,   299,   342,   427,
      299,   342,   427,   513,
  ],
  [
      129,  1025,  1451,  1451,
     1025,  1025,  1451,  1451,
     1451,  1451,  2049,  2049,
     1451,  1451,  2049,  2049,
  ],
  [
       43,   171,   171,   171,
       43,   171,   171,   171,
       43,   171,   171,   171,
       43,   171,   171,   171,
  ],
  [
       43,    43,    43,    43,
      171,   171,   171,   171,
      171,   171,   171,   171,
      171,   171,   171,   171,
  ],
  [
       43,    43,    43,    43,
       43,    43,    43,    43,
       43,    43,    43,    43,
       43,    43,    43,    43,
  ],
];

static INTER_BASE_4X4: [[u16; 16]; 5] = [
  [
      107,   214,   257,   299,
      214,   257,   299,   299,
      257,   299,   299,   342,
      299,   299,   342,   342,
  ],
  [
      513,  1025,  1238,  1238,
     1025,  1025,  1238,  1238,
     1238,  1238,  1451,  1451,
     1238,  1238,  1451,  1451,
  ],
  [
       43,   171,   171,   171,
       43,   171,   171,   171,
       43,   171,   171,   171,
       43,   171,   171,   171,
  ],
  [
       43,    43,    43,    43,
      171,   171,   171,   171,
      171,   171,   171,   171,
      171,   171,   171,   171,
  ],
  [
       43,    43,    43,    43,
       43,    43,    43,    43,
       43,    43,    43,    43,
       43,    43,    43,    43,
  ],
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Codec;
    use crate::bitreader::tests::BitWriter;
    use crate::config::DecoderConfig;
    use crate::error::DecoderError;
    use crate::huffman::{HuffKind, TabSel, VlcStore, MB_HUFF_DESC};

    fn picture_header(w: &mut BitWriter, frame_type: u32, pic_size: u32) {
        w.put_bits(0x3FFF8, 18);
        w.put_bits(frame_type, 3);
        w.put_bit(false); // transparency
        w.put_bit(false); // sync
        w.put_bit(false); // data size
        if frame_type >= 5 {
            return;
        }
        w.put_bit(false); // lock word
        w.put_bits(pic_size, 3);
        w.put_bit(false); // tiling
        w.put_bits(0, 2); // YVU9
        w.put_bits(3, 2); // one luma band
        w.put_bits(3, 2); // one chroma band
        w.put_bit(true);
        w.put_bits(42, 20); // frame number
        w.put_bit(false); // time estimate
        w.put_bit(false); // mb codebook
        w.put_bit(true); // blk codebook
        w.put_bits(2, 3);
        w.put_bit(true);
        w.put_bits(5, 3); // rvmap
        w.put_bit(false); // in_imf
        w.put_bit(true); // in_q
        w.put_bits(12, 5);
        w.put_bit(false); // unknown
        w.put_bit(false); // checksum
        w.put_bit(false); // extension
        w.put_bit(false); // bad blocks
    }

    #[test]
    fn test_plane_subdivision() {
        let mut w = BitWriter::new();
        w.put_bits(3, 2);
        w.put_bits(2, 2);
        for _ in 0..4 {
            w.put_bits(3, 2);
        }
        w.put_bits(2, 2);
        w.put_bits(1, 2);
        w.put_bits(0, 2);
        let data = w.finish();
        let mut br = BitReader::new(&data);
        assert_eq!(decode_plane_subdivision(&mut br), 1);
        assert_eq!(decode_plane_subdivision(&mut br), 4);
        assert_eq!(decode_plane_subdivision(&mut br), 0);
        assert_eq!(decode_plane_subdivision(&mut br), 0);
    }

    #[test]
    fn test_scale_tile_size() {
        assert_eq!(scale_tile_size(352, 15), 352);
        assert_eq!(scale_tile_size(352, 0), 32);
        assert_eq!(scale_tile_size(352, 3), 128);
    }

    #[test]
    fn test_picture_header() {
        let mut w = BitWriter::new();
        picture_header(&mut w, 0, 6);
        let data = w.finish();
        let mut br = BitReader::new(&data);

        let mut ctx = IndeoContext::new(Generation::Indeo4).unwrap();
        let mut fmt = Indeo4Format::default();
        fmt.decode_picture_header(&mut ctx, &mut br).unwrap();

        assert_eq!(ctx.hdr.frame_type, FrameType::Intra);
        assert_eq!(ctx.hdr.frame_num, 42);
        assert_eq!(ctx.hdr.rvmap_sel, 5);
        assert_eq!(ctx.hdr.glob_quant, 12);
        assert!(ctx.hdr.in_q);
        assert!(!ctx.hdr.is_scalable);
        assert_eq!(ctx.hdr.mb_vlc.sel, TabSel::Predefined(7));
        assert_eq!(ctx.hdr.blk_vlc.sel, TabSel::Predefined(2));
        assert_eq!(br.get_bits_count() % 8, 0);

        let layout = &ctx.layout;
        assert!(layout.is_allocated());
        assert_eq!((layout.pic_conf.pic_width, layout.pic_conf.pic_height), (176, 144));
        assert_eq!((layout.pic_conf.chroma_width, layout.pic_conf.chroma_height), (44, 36));
        let luma = &layout.planes[0].bands[0];
        assert_eq!((luma.mb_size, luma.blk_size), (16, 8));
        assert_eq!(luma.tiles.len(), 1);
        assert_eq!(luma.tiles[0].num_mbs, 11 * 9);
        let chroma = &layout.planes[1].bands[0];
        assert_eq!((chroma.mb_size, chroma.blk_size), (4, 4));
        // four buffers for bidirectional prediction
        assert!(!luma.bufs[3].is_empty());
    }

    #[test]
    fn test_null_frame_stops_after_data_size() {
        let mut w = BitWriter::new();
        picture_header(&mut w, 6, 0);
        let data = w.finish();
        let mut br = BitReader::new(&data);
        let mut ctx = IndeoContext::new(Generation::Indeo4).unwrap();
        Indeo4Format::default().decode_picture_header(&mut ctx, &mut br).unwrap();
        assert_eq!(ctx.hdr.frame_type, FrameType::NullLast);
        assert!(!ctx.layout.is_allocated());
    }

    #[test]
    fn test_bad_start_code() {
        let data = [0u8; 16];
        let mut br = BitReader::new(&data);
        let mut ctx = IndeoContext::new(Generation::Indeo4).unwrap();
        assert!(Indeo4Format::default().decode_picture_header(&mut ctx, &mut br).is_err());
    }

    fn band_header(w: &mut BitWriter, indx: u32, transform: u32, scan: u32, quant_mat: u32) {
        w.put_bits(0, 2); // plane
        w.put_bits(0, 4); // band
        w.put_bit(false); // empty
        w.put_bit(false); // header size
        w.put_bits(1, 2); // half-pel
        w.put_bit(true);
        w.put_bits(0xBEEF, 16);
        w.put_bits(indx, 2);
        w.put_bit(false); // inherit mv
        w.put_bit(false); // inherit qdelta
        w.put_bits(7, 5);
        w.put_bit(false); // explicit transform
        w.put_bits(transform, 5);
        w.put_bits(scan, 4);
        w.put_bits(quant_mat, 5);
    }

    #[test]
    fn test_band_header() {
        let mut w = BitWriter::new();
        band_header(&mut w, 0, 4, 1, 3);
        w.put_bit(false); // picture block codebook
        w.put_bit(false); // default rvmap
        w.put_bit(true);
        w.put_bits(1, 8);
        w.put_bits(0x12, 8);
        w.put_bits(0x34, 8);
        let data = w.finish();
        let mut br = BitReader::new(&data);

        let hdr = PictureHeader::default();
        let mut band = Band::default();
        Indeo4Format::default().decode_band_header(&hdr, &mut band, &mut br).unwrap();

        assert!(!band.is_empty);
        assert!(band.is_halfpel);
        assert!(band.checksum_present);
        assert_eq!(band.checksum, 0xBEEF);
        assert_eq!((band.mb_size, band.blk_size), (16, 8));
        assert_eq!(band.glob_quant, 7);
        assert_eq!(band.transform.kind, TransformKind::Slant2d);
        assert!(band.is_2d_trans);
        assert_eq!(band.scan, Some(&SCAN_8X8_ALT[..]));
        assert_eq!(band.intra_base, &INTRA_BASE_8X8[2][..]);
        assert!(band.intra_scale.is_none());
        assert_eq!(band.blk_vlc.sel, TabSel::Picture);
        assert_eq!(band.rvmap_sel, 8);
        assert_eq!(band.num_corr, 1);
        assert_eq!(band.corr, vec![0x12, 0x34]);
    }

    #[test]
    fn test_band_header_rejects_bad_combinations() {
        let hdr = PictureHeader::default();
        let fmt = Indeo4Format::default();
        let cases = [
            // 8x8 transform on 4x4 blocks
            (2, 4, 5, 0),
            // 4x4 scan on 8x8 blocks
            (0, 4, 6, 0),
            // DCT
            (0, 8, 0, 0),
            // quant matrix index out of range
            (0, 4, 0, 25),
            // 4x4 blocks with an 8x8-only quant table
            (2, 10, 5, 12),
        ];
        for (indx, transform, scan, quant_mat) in cases {
            let mut w = BitWriter::new();
            band_header(&mut w, indx, transform, scan, quant_mat);
            w.put_bits(0, 8);
            let data = w.finish();
            let mut br = BitReader::new(&data);
            let mut band = Band::default();
            assert!(
                fmt.decode_band_header(&hdr, &mut band, &mut br).is_err(),
                "accepted {:?}",
                (indx, transform, scan, quant_mat)
            );
        }

        let mut w = BitWriter::new();
        w.put_bits(1, 2);
        let data = w.finish();
        let mut br = BitReader::new(&data);
        let mut band = Band::default();
        assert!(fmt.decode_band_header(&hdr, &mut band, &mut br).is_err());
    }

    fn put_code(w: &mut BitWriter, code: u32, len: u32) {
        for i in (0..len).rev() {
            w.put_bit((code >> i) & 1 != 0);
        }
    }

    /// Signed macroblock delta in the default macroblock codebook.
    fn put_delta(w: &mut BitWriter, v: i32) {
        let sym = if v > 0 { v * 2 - 1 } else { -v * 2 };
        let codes = MB_HUFF_DESC[7].codes().unwrap();
        let c = codes.iter().find(|c| c.sym == sym).unwrap();
        put_code(w, c.code, c.len as u32);
    }

    fn mb_band(width: usize) -> (Band, Tile) {
        let pitch = 96;
        let band = Band {
            mb_size: 16,
            blk_size: 8,
            pitch,
            aheight: 64,
            buf_size: pitch * 64,
            ..Band::default()
        };
        let num_mbs = mbs_per_tile(width, 16, 16);
        let tile = Tile {
            width,
            height: 16,
            mb_size: 16,
            num_mbs,
            mbs: vec![MbInfo::default(); num_mbs],
            ..Tile::default()
        };
        (band, tile)
    }

    #[test]
    fn test_mb_info_bidir_types() {
        let store = VlcStore::new().unwrap();
        let mb_vlc = store.get(HuffKind::Mb, 7);
        let hdr = PictureHeader { frame_type: FrameType::Bidir, ..PictureHeader::default() };
        let (band, mut tile) = mb_band(80);

        let mut w = BitWriter::new();
        // intra, blocks 1 and 3 coded
        w.put_bit(false);
        w.put_bits(0, 2);
        w.put_bits(0b1010, 4);
        put_delta(&mut w, 2);
        // forward
        w.put_bit(false);
        w.put_bits(1, 2);
        w.put_bits(0, 4);
        put_delta(&mut w, 1);
        put_delta(&mut w, 2);
        // backward: the vector is negated
        w.put_bit(false);
        w.put_bits(2, 2);
        w.put_bits(0, 4);
        put_delta(&mut w, -1);
        put_delta(&mut w, 1);
        // bidirectional, two vectors continuing the running prediction
        w.put_bit(false);
        w.put_bits(3, 2);
        w.put_bits(0b0001, 4);
        put_delta(&mut w, -1);
        put_delta(&mut w, 1);
        put_delta(&mut w, -3);
        put_delta(&mut w, 0);
        put_delta(&mut w, 2);
        // empty
        w.put_bit(true);
        let data = w.finish();

        let mut br = BitReader::new(&data);
        Indeo4Format::default()
            .decode_mb_info(&hdr, mb_vlc, &band, &mut tile, None, 0, &mut br)
            .unwrap();
        assert_eq!(br.get_bits_count(), data.len() * 8);

        let mbs = &tile.mbs;
        assert_eq!((mbs[0].mb_type, mbs[0].cbp, mbs[0].q_delta), (0, 0b1010, 2));
        assert_eq!((mbs[0].mv_x, mbs[0].mv_y), (0, 0));

        assert_eq!((mbs[1].mb_type, mbs[1].cbp, mbs[1].q_delta), (1, 0, 0));
        assert_eq!((mbs[1].mv_x, mbs[1].mv_y), (2, 1));
        assert_eq!((mbs[1].xpos, mbs[1].ypos, mbs[1].buf_offs), (16, 0, 16));

        assert_eq!(mbs[2].mb_type, 2);
        assert_eq!((mbs[2].mv_x, mbs[2].mv_y), (0, 0));
        assert_eq!((mbs[2].b_mv_x, mbs[2].b_mv_y), (-3, 0));

        assert_eq!((mbs[3].mb_type, mbs[3].cbp, mbs[3].q_delta), (3, 1, -1));
        assert_eq!((mbs[3].mv_x, mbs[3].mv_y), (0, 1));
        assert_eq!((mbs[3].b_mv_x, mbs[3].b_mv_y), (-2, -1));

        assert_eq!((mbs[4].mb_type, mbs[4].cbp), (1, 0));
        assert_eq!((mbs[4].mv_x, mbs[4].mv_y, mbs[4].b_mv_x), (0, 0, 0));
        assert_eq!(mbs[4].buf_offs, 64);
    }

    #[test]
    fn test_mb_info_inherits_from_luma() {
        let store = VlcStore::new().unwrap();
        let mb_vlc = store.get(HuffKind::Mb, 7);
        let hdr = PictureHeader { frame_type: FrameType::Inter, ..PictureHeader::default() };
        let (mut band, mut tile) = mb_band(32);
        band.plane = 1;
        band.inherit_mv = true;
        band.inherit_qdelta = true;

        let mut ref_tile = tile.clone();
        ref_tile.mbs[0] = MbInfo { mb_type: 0, q_delta: 3, ..MbInfo::default() };
        ref_tile.mbs[1] = MbInfo { mb_type: 1, q_delta: -2, mv_x: 5, mv_y: 4, ..MbInfo::default() };

        let mut w = BitWriter::new();
        // neither type nor delta is coded
        w.put_bit(false);
        w.put_bits(0b1111, 4);
        w.put_bit(false);
        w.put_bits(0, 4);
        let data = w.finish();

        let mut br = BitReader::new(&data);
        Indeo4Format::default()
            .decode_mb_info(&hdr, mb_vlc, &band, &mut tile, Some(&ref_tile), 1, &mut br)
            .unwrap();
        assert_eq!((tile.mbs[0].mb_type, tile.mbs[0].cbp, tile.mbs[0].q_delta), (0, 0b1111, 3));
        assert_eq!((tile.mbs[1].mb_type, tile.mbs[1].q_delta), (1, -2));
        assert_eq!((tile.mbs[1].mv_x, tile.mbs[1].mv_y), (3, 2));

        // inheriting the type needs a reference tile
        let mut br = BitReader::new(&data);
        assert!(Indeo4Format::default()
            .decode_mb_info(&hdr, mb_vlc, &band, &mut tile, None, 1, &mut br)
            .is_err());
    }

    #[test]
    fn test_mb_info_rejects_empty_intra_macroblock() {
        let store = VlcStore::new().unwrap();
        let hdr = PictureHeader::default();
        let (band, mut tile) = mb_band(16);
        let data = [1u8];
        let mut br = BitReader::new(&data);
        assert!(Indeo4Format::default()
            .decode_mb_info(&hdr, store.get(HuffKind::Mb, 7), &band, &mut tile, None, 0, &mut br)
            .is_err());
    }

    /// Indeo4 syntax with a band header that selects a run/value map
    /// beyond the nine defined ones.
    #[derive(Default)]
    struct OutOfRangeRvmap(Indeo4Format);

    impl FormatDecoder for OutOfRangeRvmap {
        const GENERATION: Generation = Generation::Indeo4;

        fn decode_picture_header(&mut self, ctx: &mut IndeoContext, br: &mut BitReader) -> Result<()> {
            self.0.decode_picture_header(ctx, br)
        }

        fn decode_band_header(&self, hdr: &PictureHeader, band: &mut Band, br: &mut BitReader) -> Result<()> {
            self.0.decode_band_header(hdr, band, br)?;
            band.rvmap_sel = 9;
            Ok(())
        }

        fn decode_mb_info(
            &self,
            hdr: &PictureHeader,
            mb_vlc: &Vlc,
            band: &Band,
            tile: &mut Tile,
            ref_tile: Option<&Tile>,
            mv_scale: i32,
            br: &mut BitReader,
        ) -> Result<()> {
            self.0.decode_mb_info(hdr, mb_vlc, band, tile, ref_tile, mv_scale, br)
        }
    }

    #[test]
    fn test_unknown_rvmap_is_rejected() {
        let mut w = BitWriter::new();
        picture_header(&mut w, 0, 6);
        w.align();
        band_header(&mut w, 0, 4, 0, 0);
        w.put_bit(false);
        w.put_bit(false);
        w.put_bit(false);
        w.align();
        w.put_bits(0, 32);
        let data = w.finish();

        let mut dec = IndeoDecoder::<OutOfRangeRvmap>::new(DecoderConfig::default()).unwrap();
        match dec.decode_frame(&data) {
            Err(DecoderError::InvalidData(msg)) => assert!(msg.contains("run/value map"), "{}", msg),
            Err(other) => panic!("unexpected error {}", other),
            Ok(_) => panic!("out-of-range run/value map accepted"),
        }
    }

    #[test]
    fn test_transparency_runs() {
        let mut w = BitWriter::new();
        w.put_bits(0, 2); // colour plane
        w.put_bits(0, 3); // bit depth
        w.put_bits(0, 8); // no dirty rectangles
        w.put_bit(false); // no key colour
        w.put_bit(false);
        w.put_bits(1, 4); // one-row codebook of 3-bit codes
        w.put_bits(3, 4);
        w.align();
        w.put_bit(false); // tile not empty
        w.put_bit(false);
        w.put_bits(4, 8); // tile length in bytes
        w.align();
        w.put_bit(false); // start opaque
        for code in [5, 7, 4, 6, 2] {
            put_code(&mut w, code, 3);
        }
        let data = w.finish();

        let mut fmt = Indeo4Format::default();
        let mut alpha = vec![128u8; 64];
        for _ in 0..2 {
            let mut br = BitReader::new(&data);
            fmt.decode_transparency(&mut br, 32, 2, &mut alpha).unwrap();
        }
        assert!(fmt.trans_vlc.is_some());

        let mut expected = Vec::new();
        expected.extend_from_slice(&[255; 5]);
        expected.extend_from_slice(&[0; 7]);
        expected.extend_from_slice(&[255; 4]);
        expected.extend_from_slice(&[0; 6]);
        expected.extend_from_slice(&[255; 2]);
        assert_eq!(&alpha[..24], &expected[..]);
        assert!(alpha[24..].iter().all(|&a| a == 128));
    }

    #[test]
    fn test_transparency_tile_past_end() {
        let mut w = BitWriter::new();
        w.put_bits(0, 13);
        w.put_bits(0, 2);
        w.put_bits(1, 4);
        w.put_bits(3, 4);
        w.align();
        w.put_bit(false);
        w.put_bit(false);
        w.put_bits(200, 8);
        let data = w.finish();
        let mut br = BitReader::new(&data);
        let mut alpha = vec![0u8; 16];
        assert!(Indeo4Format::default().decode_transparency(&mut br, 4, 4, &mut alpha).is_err());
    }
}
