//! Indeo Video Interactive 5 bitstream syntax
//!
//! Indeo5 moves most of the picture geometry into a GOP header carried by
//! every intra frame:
//!   • picture size, tile size and band subdivision
//!   • per-band block sizes, transforms and quantization matrices
//!
//! Inter frames then only carry the codebook selection and per-band flags.

use log::{debug, trace};

use crate::bitreader::BitReader;
use crate::bufswitch::{FrameType, Generation};
use crate::decoder::{check_mb_vector, read_mb_delta, scale_mv, FormatDecoder, IndeoContext, IndeoDecoder, PictureHeader};
use crate::dsp::{Transform, TransformKind};
use crate::error::{invalid, unsupported, Result};
use crate::plane::{check_image_size, mbs_per_tile, Band, MbInfo, PicConfig, Tile, MAX_CORRECTIONS};
use crate::tables::{SCAN_4X4_DIRECT, SCAN_8X8_HOR, SCAN_8X8_VER, ZIGZAG_8X8};
use crate::vlc::Vlc;

pub type Indeo5Decoder = IndeoDecoder<Indeo5Format>;

/// Picture size index escape: explicit 13-bit dimensions follow.
const PIC_SIZE_ESC: usize = 15;

const PIC_SIZES: [(usize, usize); 12] = [
    (640, 480),
    (320, 240),
    (160, 120),
    (704, 480),
    (352, 240),
    (352, 288),
    (176, 144),
    (240, 180),
    (640, 240),
    (704, 240),
    (80, 60),
    (88, 72),
];

/// Skip a chain of length-prefixed header extension blocks.
fn skip_hdr_extension(br: &mut BitReader) -> Result<()> {
    loop {
        let len = br.get_bits(8) as usize;
        if (len * 8) as isize > br.get_bits_left() {
            return invalid("header extension exceeds the packet");
        }
        br.skip_bits_long(len * 8);
        if len == 0 {
            return Ok(());
        }
    }
}

#[derive(Default)]
pub struct Indeo5Format;

impl Indeo5Format {
    /// Parse the GOP header of an intra frame and rebuild the band layout.
    fn decode_gop_header(&self, ctx: &mut IndeoContext, br: &mut BitReader) -> Result<()> {
        let hdr = &mut ctx.hdr;
        hdr.gop_flags = br.get_bits(8);
        hdr.gop_hdr_size = if hdr.gop_flags & 1 != 0 { br.get_bits(16) } else { 0 };
        if hdr.gop_flags & 0x20 != 0 {
            hdr.lock_word = br.get_bits_long(32);
        }

        let mut tile_size = 0;
        if hdr.gop_flags & 0x40 != 0 {
            tile_size = 64 << br.get_bits(2);
            if tile_size > 256 {
                return invalid(format!("invalid tile size {}", tile_size));
            }
        }

        let mut pic_conf = PicConfig {
            luma_bands: br.get_bits(2) as usize * 3 + 1,
            chroma_bands: br.get_bits(1) as usize * 3 + 1,
            ..PicConfig::default()
        };
        let is_scalable = pic_conf.luma_bands != 1 || pic_conf.chroma_bands != 1;
        if is_scalable && (pic_conf.luma_bands != 4 || pic_conf.chroma_bands != 1) {
            return invalid(format!(
                "scalability: unsupported subdivision, luma {} chroma {}",
                pic_conf.luma_bands, pic_conf.chroma_bands
            ));
        }

        let pic_size_indx = br.get_bits(4) as usize;
        let (width, height) = if pic_size_indx == PIC_SIZE_ESC {
            let h = br.get_bits(13) as usize;
            let w = br.get_bits(13) as usize;
            (w, h)
        } else {
            match PIC_SIZES.get(pic_size_indx) {
                Some(&size) => size,
                None => return invalid(format!("picture size index {}", pic_size_indx)),
            }
        };
        if width == 0 || height == 0 {
            return invalid(format!("invalid picture size {}x{}", width, height));
        }
        check_image_size(width, height)?;
        pic_conf.pic_width = width;
        pic_conf.pic_height = height;

        if hdr.gop_flags & 2 != 0 {
            return unsupported("YV12 picture format");
        }

        pic_conf.set_chroma_from_luma();
        if tile_size == 0 {
            pic_conf.tile_width = width;
            pic_conf.tile_height = height;
        } else {
            pic_conf.tile_width = tile_size;
            pic_conf.tile_height = tile_size;
        }

        let mut blk_size_changed = false;
        if pic_conf != ctx.layout.pic_conf || hdr.gop_invalid {
            ctx.layout.reconfigure(&pic_conf, true, false)?;
            blk_size_changed = true;
        }
        if !ctx.layout.is_allocated() {
            return invalid("picture planes are not allocated");
        }
        hdr.is_scalable = is_scalable;

        for p in 0..2 {
            let num_bands = if p == 0 { pic_conf.luma_bands } else { 1 };
            for i in 0..num_bands {
                let band = &mut ctx.layout.planes[p].bands[i];
                band.is_halfpel = br.get_bit();

                let mb_bit = br.get_bit();
                let blk_size = 8 >> br.get_bits(1) as usize;
                let mb_size = if mb_bit { blk_size } else { blk_size << 1 };
                if p == 0 && blk_size == 4 {
                    return unsupported("4x4 luma blocks");
                }
                if mb_size != band.mb_size || blk_size != band.blk_size {
                    band.mb_size = mb_size;
                    band.blk_size = blk_size;
                    blk_size_changed = true;
                }

                if br.get_bit() {
                    return unsupported("extended transform info");
                }

                let (kind, size, scan): (TransformKind, usize, &'static [u8]) = match (p << 2) + i {
                    0 => (TransformKind::Slant2d, 8, &ZIGZAG_8X8),
                    1 => (TransformKind::SlantRow, 8, &SCAN_8X8_VER),
                    2 => (TransformKind::SlantCol, 8, &SCAN_8X8_HOR),
                    3 => (TransformKind::Copy, 8, &SCAN_8X8_HOR),
                    _ => (TransformKind::Slant2d, 4, &SCAN_4X4_DIRECT),
                };
                band.transform = Transform::new(kind, size)?;
                band.scan = Some(scan);
                band.is_2d_trans = kind == TransformKind::Slant2d;
                if size != band.blk_size {
                    return invalid("transform and block size mismatch");
                }
                band.scan_size = band.blk_size;

                band.quant_mat = if p == 0 {
                    if pic_conf.luma_bands > 1 { i + 1 } else { 0 }
                } else {
                    5
                };

                if band.blk_size == 8 {
                    if band.quant_mat >= 5 {
                        return invalid(format!("quant_mat {} too large", band.quant_mat));
                    }
                    band.intra_base = &INTRA_BASE_8X8[band.quant_mat];
                    band.inter_base = &INTER_BASE_8X8[band.quant_mat];
                    band.intra_scale = Some(&INTRA_SCALE_8X8[band.quant_mat]);
                    band.inter_scale = Some(&INTER_SCALE_8X8[band.quant_mat]);
                } else {
                    band.intra_base = &INTRA_BASE_4X4;
                    band.inter_base = &INTER_BASE_4X4;
                    band.intra_scale = Some(&INTRA_SCALE_4X4);
                    band.inter_scale = Some(&INTER_SCALE_4X4);
                }

                if br.get_bits(2) != 0 {
                    return invalid("end marker missing");
                }
            }
        }

        // Both chroma planes share one set of band parameters.
        {
            let (first, rest) = ctx.layout.planes.split_at_mut(2);
            let src = &first[1].bands[0];
            let dst = &mut rest[0].bands[0];
            dst.mb_size = src.mb_size;
            dst.blk_size = src.blk_size;
            dst.is_halfpel = src.is_halfpel;
            dst.intra_base = src.intra_base;
            dst.inter_base = src.inter_base;
            dst.intra_scale = src.intra_scale;
            dst.inter_scale = src.inter_scale;
            dst.scan = src.scan;
            dst.scan_size = src.scan_size;
            dst.transform = src.transform.clone();
            dst.is_2d_trans = src.is_2d_trans;
            dst.quant_mat = src.quant_mat;
        }

        if blk_size_changed {
            ctx.layout.init_tiles(pic_conf.tile_width, pic_conf.tile_height)?;
        }

        if ctx.hdr.gop_flags & 8 != 0 {
            if br.get_bits(3) != 0 {
                return invalid("alignment bits are not zero");
            }
            // transparency fill colour
            if br.get_bit() {
                br.skip_bits(24);
            }
        }

        br.align();
        br.skip_bits(23);

        // GOP extension
        if br.get_bit() {
            loop {
                if br.get_bits_left() < 16 {
                    return invalid("truncated GOP extension");
                }
                if br.get_bits(16) & 0x8000 == 0 {
                    break;
                }
            }
        }
        br.align();

        debug!(
            "Indeo5 GOP: {}x{} tiles {}x{} bands {}/{} flags {:#04x}",
            width,
            height,
            pic_conf.tile_width,
            pic_conf.tile_height,
            pic_conf.luma_bands,
            pic_conf.chroma_bands,
            ctx.hdr.gop_flags
        );
        Ok(())
    }
}

impl FormatDecoder for Indeo5Format {
    const GENERATION: Generation = Generation::Indeo5;

    fn decode_picture_header(&mut self, ctx: &mut IndeoContext, br: &mut BitReader) -> Result<()> {
        if br.get_bits(5) != 0x1F {
            return invalid("invalid picture start code");
        }

        ctx.hdr.prev_frame_type = ctx.hdr.frame_type;
        ctx.hdr.frame_type = FrameType::from_indeo5(br.get_bits(3))?;
        ctx.hdr.frame_num = br.get_bits(8);

        if ctx.hdr.frame_type == FrameType::Intra {
            if let Err(err) = self.decode_gop_header(ctx, br) {
                ctx.hdr.gop_invalid = true;
                return Err(err);
            }
            ctx.hdr.gop_invalid = false;
        }

        let hdr = &mut ctx.hdr;
        if hdr.frame_type == FrameType::InterScal && !hdr.is_scalable {
            return invalid("scalable inter frame in a non-scalable stream");
        }

        if hdr.frame_type != FrameType::Null {
            hdr.frame_flags = br.get_bits(8);
            hdr.pic_hdr_size = if hdr.frame_flags & 1 != 0 { br.get_bits(24) } else { 0 };
            hdr.checksum = if hdr.frame_flags & 0x10 != 0 { br.get_bits(16) } else { 0 };
            if hdr.frame_flags & 0x20 != 0 {
                skip_hdr_extension(br)?;
            }
            hdr.mb_vlc.decode_huff_desc(br, hdr.frame_flags & 0x40 != 0)?;
            br.skip_bits(3);
        }

        br.align();

        trace!("Indeo5 frame {} {:?} flags {:#04x}", hdr.frame_num, hdr.frame_type, hdr.frame_flags);
        Ok(())
    }

    fn decode_band_header(&self, hdr: &PictureHeader, band: &mut Band, br: &mut BitReader) -> Result<()> {
        let band_flags = br.get_bits(8);

        if band_flags & 1 != 0 {
            band.is_empty = true;
            return Ok(());
        }
        band.is_empty = false;

        band.data_size = if hdr.frame_flags & 0x80 != 0 { br.get_bits(24) as usize } else { 0 };

        band.inherit_mv = band_flags & 2 != 0;
        band.inherit_qdelta = band_flags & 8 != 0;
        band.qdelta_present = band_flags & 4 != 0;
        if !band.qdelta_present {
            band.inherit_qdelta = true;
        }

        band.num_corr = 0;
        band.corr.clear();
        if band_flags & 0x10 != 0 {
            band.num_corr = br.get_bits(8) as usize;
            if band.num_corr > MAX_CORRECTIONS {
                band.num_corr = 0;
                return invalid("too many corrections");
            }
            for _ in 0..band.num_corr * 2 {
                band.corr.push(br.get_bits(8) as u8);
            }
        }

        band.rvmap_sel = if band_flags & 0x40 != 0 { br.get_bits(3) as usize } else { 8 };

        band.blk_vlc.decode_huff_desc(br, band_flags & 0x80 != 0)?;

        band.checksum_present = br.get_bit();
        if band.checksum_present {
            band.checksum = br.get_bits(16);
        }

        band.glob_quant = br.get_bits(5) as i32;

        if band_flags & 0x20 != 0 {
            br.align();
            skip_hdr_extension(br)?;
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
        if ref_tile.is_none() && ((band.qdelta_present && band.inherit_qdelta) || band.inherit_mv) {
            return invalid("inherited macroblock info without a reference band");
        }
        if tile.num_mbs != mbs_per_tile(tile.width, tile.height, band.mb_size) || tile.mbs.len() != tile.num_mbs {
            return invalid("allocated tile size mismatches parameters");
        }

        let blks_per_mb = if band.mb_size != band.blk_size { 4 } else { 1 };
        let quant_in_base = band.plane == 0 && band.band_num == 0 && hdr.frame_flags & 8 != 0;
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
                    if quant_in_base {
                        mb.q_delta = read_mb_delta(br, mb_vlc)?;
                    }
                    if band.inherit_mv {
                        if let Some(r) = ref_mb {
                            mb.mv_x = scale_mv(r.mv_x, mv_scale);
                            mb.mv_y = scale_mv(r.mv_y, mv_scale);
                        }
                    }
                } else {
                    mb.mb_type = match ref_mb {
                        Some(r) if band.inherit_mv => r.mb_type,
                        _ if hdr.frame_type == FrameType::Intra => 0,
                        _ => br.get_bit() as i32,
                    };

                    mb.cbp = br.get_bits(blks_per_mb);

                    if band.qdelta_present {
                        if band.inherit_qdelta {
                            if let Some(r) = ref_mb {
                                mb.q_delta = r.q_delta;
                            }
                        } else if mb.cbp != 0 || quant_in_base {
                            mb.q_delta = read_mb_delta(br, mb_vlc)?;
                        }
                    }

                    if mb.mb_type != 0 {
                        match ref_mb {
                            Some(r) if band.inherit_mv => {
                                mb.mv_x = scale_mv(r.mv_x, mv_scale);
                                mb.mv_y = scale_mv(r.mv_y, mv_scale);
                            }
                            _ => {
                                mv_y += read_mb_delta(br, mb_vlc)?;
                                mv_x += read_mb_delta(br, mb_vlc)?;
                                mb.mv_x = mv_x;
                                mb.mv_y = mv_y;
                            }
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
}

// ─── Quantization tables ─────────────────────────────────────────────────────

static INTRA_BASE_8X8: [[u16; 64]; 5] = [
  [
      26,   46,   54,   66,   70,   74,   78,   90,
      46,   50,   62,   66,   70,   78,   86,  106,
      54,   62,   62,   68,   74,   84,  102,  114,
      66,   66,   68,   74,   82,   98,  108,  122,
      70,   70,   74,   82,   94,  102,  114,  142,
      74,   78,   84,   98,  102,  110,  134,  166,
      78,   86,  102,  108,  114,  134,  154,  202,
      90,  106,  114,  122,  142,  166,  202,  254,
  ],
  [
      38,   58,   62,   70,   74,   78,   82,   90,
      58,   62,   66,   70,   74,   78,   86,   94,
      62,   66,   70,   72,   76,   82,   90,   98,
      70,   70,   72,   74,   78,   86,   94,  102,
      74,   74,   76,   78,   82,   90,   98,  106,
      78,   78,   82,   86,   90,   94,  102,  110,
      82,   86,   90,   94,   98,  102,  106,  114,
      90,   94,   98,  102,  106,  110,  114,  118,
  ],
  [
      78,  170,  242,  212,  222,  194,  214,  194,
      78,  170,  242,  212,  222,  194,  214,  194,
      78,  170,  242,  212,  222,  194,  214,  194,
      78,  170,  242,  212,  222,  194,  214,  194,
      78,  170,  242,  212,  222,  194,  214,  194,
      78,  170,  242,  212,  222,  194,  214,  194,
      78,  170,  242,  212,  222,  194,  214,  194,
      78,  170,  242,  212,  222,  194,  214,  194,
  ],
  [
      78,   78,   78,   78,   78,   78,   78,   78,
     170,  170,  170,  170,  170,  170,  170,  170,
     242,  242,  242,  242,  242,  242,  242,  242,
     212,  212,  212,  212,  212,  212,  212,  212,
     222,  222,  222,  222,  222,  222,  222,  222,
     194,  194,  194,  194,  194,  194,  194,  194,
     214,  214,  214,  214,  214,  214,  214,  214,
     194,  194,  194,  194,  194,  194,  194,  194,
  ],
  [
      94,   94,   94,   94,   94,   94,   94,   94,
      94,   94,   94,   94,   94,   94,   94,   94,
      94,   94,   94,   94,   94,   94,   94,   94,
      94,   94,   94,   94,   94,   94,   94,   94,
      94,   94,   94,   94,   94,   94,   94,   94,
      94,   94,   94,   94,   94,   94,   94,   94,
      94,   94,   94,   94,   94,   94,   94,   94,
      94,   94,   94,   94,   94,   94,   94,   94,
  ],
];

static INTER_BASE_8X8: [[u16; 64]; 5] = [
  [
      38,   58,   62,   70,   74,   78,   82,   90,
      58,   62,   66,   70,   74,   78,   86,   94,
      62,   66,   70,   72,   76,   82,   90,   98,
      70,   70,   72,   74,   78,   86,   94,  102,
      74,   74,   76,   78,   82,   90,   98,  106,
      78,   78,   82,   86,   90,   94,  102,  110,
      82,   86,   90,   94,   98,  102,  106,  114,
      90,   94,   98,  102,  106,  110,  114,  118,
  ],
  [
      38,   58,   62,   70,   74,   78,   82,   90,
      58,   62,   66,   70,   74,   78,   86,   94,
      62,   66,   70,   72,   76,   82,   90,   98,
      70,   70,   72,   74,   78,   86,   94,  102,
      74,   74,   76,   78,   82,   90,   98,  106,
      78,   78,   82,   86,   90,   94,  102,  110,
      82,   86,   90,   94,   98,  102,  106,  114,
      90,   94,   98,  102,  106,  110,  114,  118,
  ],
  [
      78,  170,  242,  212,  222,  194,  214,  194,
      78,  170,  242,  212,  222,  194,  214,  194,
      78,  170,  242,  212,  222,  194,  214,  194,
      78,  170,  242,  212,  222,  194,  214,  194,
      78,  170,  242,  212,  222,  194,  214,  194,
      78,  170,  242,  212,  222,  194,  214,  194,
      78,  170,  242,  212,  222,  194,  214,  194,
      78,  170,  242,  212,  222,  194,  214,  194,
  ],
  [
      78,   78,   78,   78,   78,   78,   78,   78,
     170,  170,  170,  170,  170,  170,  170,  170,
     242,  242,  242,  242,  242,  242,  242,  242,
     212,  212,  212,  212,  212,  212,  212,  212,
     222,  222,  222,  222,  222,  222,  222,  222,
     194,  194,  194,  194,  194,  194,  194,  194,
     214,  214,  214,  214,  214,  214,  214,  214,
     194,  194,  194,  194,  194,  194,  194,  194,
  ],
  [
      94,   94,   94,   94,   94,   94,   94,   94,
      94,   94,   94,   94,   94,   94,   94,   94,
      94,   94,   94,   94,   94,   94,   94,   94,
      94,   94,   94,   94,   94,   94,   94,   94,
      94,   94,   94,   94,   94,   94,   94,   94,
      94,   94,   94,   94,   94,   94,   94,   94,
      94,   94,   94,   94,   94,   94,   94,   94,
      94,   94,   94,   94,   94,   94,   94,   94,
  ],
];

static INTRA_BASE_4X4: [u16; 16] = [
      30,   62,   74,   82,
      62,   74,   82,   94,
      74,   82,   94,  122,
      82,   94,  122,  146,
];

static INTER_BASE_4X4: [u16; 16] = [
      30,   62,   74,   82,
      62,   74,   82,   86,
      74,   82,   86,   94,
      82,   86,   94,  102,
];

static INTRA_SCALE_8X8: [[u8; 24]; 5] = [
  [
     11,  14,  16,  18,  20,  22,  23,  24,  26,  28,  30,  32,
     34,  36,  39,  40,  42,  45,  47,  49,  52,  55,  57,  60,
  ],
  [
      1,  16,  18,  20,  22,  24,  27,  30,  34,  37,  40,  44,
     48,  52,  56,  61,  66,  71,  76,  82,  88,  94, 101, 108,
  ],
  [
     19,  34,  39,  42,  45,  51,  54,  60,  65,  69,  73,  78,
     83,  88,  93,  99, 105, 111, 117, 124, 130, 136, 142, 149,
  ],
  [
     19,  31,  33,  36,  39,  41,  45,  47,  52,  55,  58,  61,
     64,  68,  72,  76,  79,  82,  86,  90,  94,  98, 102, 107,
  ],
  [
     49,  66,  71,  71,  77,  82,  88,  88,  93,  99, 103, 107,
    111, 115, 120, 124, 128, 132, 137, 142, 147, 152, 157, 164,
  ],
];

static INTER_SCALE_8X8: [[u8; 24]; 5] = [
  [
     11,  17,  19,  20,  21,  22,  24,  26,  27,  29,  32,  34,
     35,  37,  40,  42,  46,  50,  53,  57,  61,  65,  68,  74,
  ],
  [
      7,  20,  22,  24,  27,  30,  34,  37,  41,  45,  49,  53,
     58,  63,  68,  74,  80,  86,  92,  99, 106, 113, 120, 126,
  ],
  [
     21,  37,  40,  45,  48,  52,  58,  61,  66,  72,  76,  81,
     86,  91,  96, 101, 107, 112, 118, 124, 130, 136, 143, 151,
  ],
  [
     19,  31,  32,  34,  37,  40,  43,  45,  48,  51,  54,  57,
     60,  63,  66,  69,  72,  75,  78,  82,  86,  90,  94,  98,
  ],
  [
     60,  82,  88,  93,  99, 104, 104, 109, 115, 120, 124, 128,
    132, 137, 142, 147, 152, 157, 163, 169, 173, 177, 181, 186,
  ],
];

static INTRA_SCALE_4X4: [u8; 24] = [
      1,  11,  11,  13,  13,  13,  14,  15,  16,  17,  19,  20,
     21,  22,  23,  24,  25,  26,  27,  28,  29,  30,  31,  32,
];

static INTER_SCALE_4X4: [u8; 24] = [
     11,  13,  13,  14,  17,  17,  18,  19,  20,  21,  22,  23,
     24,  25,  26,  27,  28,  29,  30,  31,  32,  33,  34,  35,
];
