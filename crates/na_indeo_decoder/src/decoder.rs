//! Indeo 4/5 frame decode engine
//!
//! Shared by both generations:
//!   • picture header → per-plane, per-band decode → recomposition → output
//!   • tile walk with explicit or inherited macroblock info
//!   • run/value coefficient decode, dequantization, inverse transform
//!   • half-pel motion compensation from one or two references
//!
//! The generation-specific header syntax lives behind [`FormatDecoder`].

use std::mem;

use log::{debug, trace, warn};

use crate::api::{Codec, PixelFormat, Surface};
use crate::bitreader::BitReader;
use crate::bufswitch::{BufferSlots, FrameType, Generation};
use crate::config::DecoderConfig;
use crate::dsp::{mc_avg_delta, mc_avg_no_delta, mc_delta, mc_extra, mc_no_delta};
use crate::error::{invalid, unsupported, DecoderError, Result};
use crate::huffman::{HuffKind, HuffTab, TabSel, VlcStore, IVI_VLC_BITS};
use crate::output;
use crate::plane::{mbs_per_tile, Band, FrameLayout, MbInfo, Tile};
use crate::tables::{RunValueMap, RUN_VALUE_MAPS};
use crate::vlc::Vlc;

/// Indeo5 GOP flag: the clip is password protected.
pub const GOP_PROTECTED: u32 = 0x20;

// ─── Shared helpers ──────────────────────────────────────────────────────────

/// Map an unsigned VLC symbol onto the signed range: 1, -1, 2, -2, ...
#[inline]
pub fn to_signed(v: i32) -> i32 {
    -((v >> 1) ^ -(v & 1))
}

/// Rescale an inherited motion vector to a band with smaller macroblocks.
#[inline]
pub fn scale_mv(mv: i32, mv_scale: i32) -> i32 {
    if mv_scale == 0 {
        return mv;
    }
    (mv + (mv > 0) as i32 + (mv_scale - 1)) >> mv_scale
}

/// Read a signed macroblock-level delta (quant or motion).
pub(crate) fn read_mb_delta(br: &mut BitReader, mb_vlc: &Vlc) -> Result<i32> {
    let sym = br.get_vlc2(mb_vlc, IVI_VLC_BITS, 1);
    if sym < 0 {
        return invalid("invalid macroblock VLC code");
    }
    Ok(to_signed(sym))
}

/// Reject an inter macroblock whose vector reaches outside the band buffer.
pub(crate) fn check_mb_vector(band: &Band, mb: &MbInfo) -> Result<()> {
    let s = band.is_halfpel as i32;
    let pitch = band.pitch as i64;
    let mb_size = band.mb_size as i64;
    let (x, y) = (mb.xpos as i64, mb.ypos as i64);
    let (mv_x, mv_y) = (mb.mv_x as i64, mb.mv_y as i64);

    let first = x + (mv_x >> s) + (y + (mv_y >> s)) * pitch;
    let last = x + ((mv_x + s as i64) >> s) + mb_size - 1
        + (y + mb_size - 1 + ((mv_y + s as i64) >> s)) * pitch;
    if first < 0 || last > band.buf_size as i64 - 1 {
        return Err(DecoderError::OutOfBounds(format!(
            "motion vector {} {} outside reference",
            x * s as i64 + mv_x,
            y * s as i64 + mv_y
        )));
    }
    Ok(())
}

/// Reject a vector whose prediction window leaves the aligned band area.
fn check_mv_window(band: &Band, mb: &MbInfo, mv_x: i32, mv_y: i32) -> Result<()> {
    let hp = band.is_halfpel as i32;
    let dmv_x = mv_x >> hp;
    let dmv_y = mv_y >> hp;
    let cx = mv_x & hp;
    let cy = mv_y & hp;
    let mb_size = band.mb_size as i32;

    if mb.xpos + dmv_x < 0
        || mb.xpos + dmv_x + mb_size + cx > band.pitch as i32
        || mb.ypos + dmv_y < 0
        || mb.ypos + dmv_y + mb_size + cy > band.aheight as i32
    {
        return Err(DecoderError::OutOfBounds("MV out of bounds".into()));
    }
    Ok(())
}

// ─── Picture state ───────────────────────────────────────────────────────────

/// Picture-level syntax elements of the current frame.
#[derive(Clone, Debug, Default)]
pub struct PictureHeader {
    pub frame_type:      FrameType,
    pub prev_frame_type: FrameType,
    pub frame_num:       u32,
    pub data_size:       u32,
    pub checksum:        u32,

    pub is_scalable: bool,
    pub has_transp:  bool,
    pub uses_tiling: bool,
    pub has_b_frames: bool,
    pub lock_word:   u32,

    // Indeo4
    pub in_imf:     bool,
    pub in_q:       bool,
    pub glob_quant: u32,
    pub unknown1:   u32,

    // Indeo5
    pub frame_flags:  u32,
    pub pic_hdr_size: u32,
    pub gop_flags:    u32,
    pub gop_hdr_size: u32,
    pub gop_invalid:  bool,

    pub rvmap_sel: usize,
    pub mb_vlc:    HuffTab,
    /// Picture-level block codebook, used by bands that do not carry one.
    pub blk_vlc:   HuffTab,
}

/// Everything a generation parser and the band decoder share.
pub struct IndeoContext {
    pub hdr:         PictureHeader,
    pub layout:      FrameLayout,
    pub store:       VlcStore,
    pub rvmaps:      Vec<RunValueMap>,
    pub slots:       BufferSlots,
    pub buf_invalid: [bool; 4],
}

impl IndeoContext {
    pub fn new(generation: Generation) -> Result<Self> {
        Ok(IndeoContext {
            hdr: PictureHeader { rvmap_sel: 8, ..PictureHeader::default() },
            layout: FrameLayout::default(),
            store: VlcStore::new()?,
            rvmaps: RUN_VALUE_MAPS.to_vec(),
            slots: BufferSlots::new(generation),
            buf_invalid: [false; 4],
        })
    }
}

/// Generation-specific bitstream syntax.
pub trait FormatDecoder {
    const GENERATION: Generation;

    /// Parse the picture header (and Indeo5 GOP header), updating the
    /// layout when the picture geometry changes.
    fn decode_picture_header(&mut self, ctx: &mut IndeoContext, br: &mut BitReader) -> Result<()>;

    fn decode_band_header(&self, hdr: &PictureHeader, band: &mut Band, br: &mut BitReader) -> Result<()>;

    /// Fill the macroblock info of a coded tile.
    #[allow(clippy::too_many_arguments)]
    fn decode_mb_info(
        &self,
        hdr: &PictureHeader,
        mb_vlc: &Vlc,
        band: &Band,
        tile: &mut Tile,
        ref_tile: Option<&Tile>,
        mv_scale: i32,
        br: &mut BitReader,
    ) -> Result<()>;

    /// Decode the transparency band following the colour planes into `alpha`
    /// (one byte per pixel, `width` stride).
    fn decode_transparency(
        &mut self,
        _br: &mut BitReader,
        _width: usize,
        _height: usize,
        _alpha: &mut [u8],
    ) -> Result<()> {
        Ok(())
    }
}

// ─── Band buffers ────────────────────────────────────────────────────────────

struct BandBuffers<'a> {
    dst:      &'a mut [i16],
    ref_buf:  &'a [i16],
    bref_buf: &'a [i16],
}

#[derive(Clone, Copy, Debug, Default)]
struct Motion {
    mv_x:     i32,
    mv_y:     i32,
    mv_x2:    i32,
    mv_y2:    i32,
    mc_type:  i32,
    mc_type2: i32,
}

/// Motion-compensate one block. `delta` adds the prediction onto the
/// residual already in place instead of overwriting it.
fn block_mc(bufs: &mut BandBuffers, band: &Band, offs: isize, m: &Motion, delta: bool) -> Result<()> {
    let pitch = band.pitch as isize;
    let blk = band.blk_size;
    let buf_size = band.buf_size as isize;
    let min_size = pitch * (blk as isize - 1) + blk as isize;
    let ref_offs = offs + m.mv_y as isize * pitch + m.mv_x as isize;

    if m.mc_type != -1 {
        let ref_size = if m.mc_type >= 0 { mc_extra(m.mc_type, band.pitch) as isize } else { 0 };
        if offs < 0 || ref_offs < 0 || bufs.ref_buf.len() < band.buf_size {
            return Err(DecoderError::OutOfBounds("reference block outside the band".into()));
        }
        if buf_size - min_size < offs || buf_size - min_size - ref_size < ref_offs {
            return Err(DecoderError::OutOfBounds("reference block outside the band".into()));
        }
    }
    if offs < 0 || buf_size - min_size < offs {
        return Err(DecoderError::OutOfBounds("block outside the band".into()));
    }
    let dst = &mut bufs.dst[offs as usize..];

    if m.mc_type2 == -1 {
        if m.mc_type == -1 {
            return invalid("block without a prediction");
        }
        let src = &bufs.ref_buf[ref_offs as usize..];
        if delta {
            mc_delta(dst, src, band.pitch, m.mc_type, blk);
        } else {
            mc_no_delta(dst, src, band.pitch, m.mc_type, blk);
        }
        return Ok(());
    }

    let ref_offs2 = offs + m.mv_y2 as isize * pitch + m.mv_x2 as isize;
    let ref_size2 = mc_extra(m.mc_type2, band.pitch) as isize;
    if ref_offs2 < 0 || bufs.bref_buf.len() < band.buf_size {
        return Err(DecoderError::OutOfBounds("backward reference block outside the band".into()));
    }
    if buf_size - min_size - ref_size2 < ref_offs2 {
        return Err(DecoderError::OutOfBounds("backward reference block outside the band".into()));
    }
    let src2 = &bufs.bref_buf[ref_offs2 as usize..];

    if m.mc_type == -1 {
        if delta {
            mc_delta(dst, src2, band.pitch, m.mc_type2, blk);
        } else {
            mc_no_delta(dst, src2, band.pitch, m.mc_type2, blk);
        }
    } else {
        let src1 = &bufs.ref_buf[ref_offs as usize..];
        if delta {
            mc_avg_delta(dst, src1, src2, band.pitch, m.mc_type, m.mc_type2, blk);
        } else {
            mc_avg_no_delta(dst, src1, src2, band.pitch, m.mc_type, m.mc_type2, blk);
        }
    }
    Ok(())
}

// ─── Block decoding ──────────────────────────────────────────────────────────

/// Decode, dequantize and inverse-transform one coded block, then add the
/// prediction for inter blocks.
#[allow(clippy::too_many_arguments)]
fn decode_coded_block(
    br: &mut BitReader,
    band: &Band,
    blk_vlc: &Vlc,
    rvmap: &RunValueMap,
    bufs: &mut BandBuffers,
    motion: &Motion,
    prev_dc: &mut i32,
    is_intra: bool,
    quant: i32,
    offs: isize,
) -> Result<()> {
    let base_tab = if is_intra { band.intra_base } else { band.inter_base };
    let blk_size = band.blk_size;
    let num_coeffs = (blk_size * blk_size) as i32;
    let col_mask = blk_size - 1;
    let transform = band.transform;

    if transform.size > blk_size {
        return invalid("too large transform");
    }
    if offs < 0 || offs as usize + transform.min_len(band.pitch) > bufs.dst.len() {
        return invalid("block outside the band");
    }
    let scan = match band.scan {
        Some(scan) if scan.len() >= num_coeffs as usize => scan,
        _ => return invalid("scan pattern is not set"),
    };
    if base_tab.len() < num_coeffs as usize {
        return invalid("quantization matrix is not set");
    }

    let mut trvec = [0i32; 64];
    let mut col_flags = [false; 8];
    let eob = rvmap.eob as i32;
    let esc = rvmap.esc as i32;
    let mut scan_pos = -1i32;
    let mut sym = 0i32;

    while scan_pos <= num_coeffs {
        sym = br.get_vlc2(blk_vlc, IVI_VLC_BITS, 1);
        if sym == eob {
            break;
        }

        let (run, val) = if sym == esc {
            // Escape: run and value are coded with three more symbols.
            let run = br.get_vlc2(blk_vlc, IVI_VLC_BITS, 1);
            let lo = br.get_vlc2(blk_vlc, IVI_VLC_BITS, 1);
            let hi = br.get_vlc2(blk_vlc, IVI_VLC_BITS, 1);
            if run < 0 || lo < 0 || hi < 0 {
                return invalid("invalid escape sequence");
            }
            (run + 1, to_signed((hi << 6) | lo))
        } else {
            if !(0..256).contains(&sym) {
                return invalid(format!("invalid symbol {}", sym));
            }
            (rvmap.runs[sym as usize] as i32, rvmap.values[sym as usize] as i32)
        };

        scan_pos += run;
        if scan_pos >= num_coeffs || scan_pos < 0 {
            break;
        }
        let pos = scan[scan_pos as usize] as usize;

        let q = (base_tab[pos] as i32 * quant) >> 9;
        let mut val = val;
        if q > 1 {
            let sign = if val > 0 { 1 } else { -1 };
            val = val * q + sign * (((q ^ 1) - 1) >> 1);
        }
        trvec[pos] = val;
        col_flags[pos & col_mask] |= val != 0;
    }

    if scan_pos < 0 || (scan_pos >= num_coeffs && sym != eob) {
        return invalid("corrupt block data");
    }

    // DC prediction for intra blocks
    if is_intra && band.is_2d_trans {
        *prev_dc += trvec[0];
        trvec[0] = *prev_dc;
        col_flags[0] |= *prev_dc != 0;
    }

    transform.inverse(&trvec, &mut bufs.dst[offs as usize..], band.pitch, &col_flags);

    if !is_intra {
        block_mc(bufs, band, offs, motion, true)?;
    }
    Ok(())
}

fn decode_blocks(
    br: &mut BitReader,
    band: &Band,
    tile: &Tile,
    blk_vlc: &Vlc,
    rvmap: &RunValueMap,
    bufs: &mut BandBuffers,
    max_quant: i32,
) -> Result<()> {
    let blk_size = band.blk_size;
    let num_blocks = if band.mb_size != blk_size { 4 } else { 1 };
    let pitch = band.pitch as isize;
    let mut prev_dc = 0i32;

    for mb in tile.mbs.iter() {
        let is_intra = mb.mb_type == 0;
        let mut cbp = mb.cbp;
        let mut buf_offs = mb.buf_offs as isize;

        let mut quant = (band.glob_quant + mb.q_delta).clamp(0, max_quant);
        let scale_tab = if is_intra { band.intra_scale } else { band.inter_scale };
        if let Some(tab) = scale_tab {
            quant = tab.get(quant as usize).copied().unwrap_or(0) as i32;
        }

        let mut motion = Motion { mc_type2: -1, ..Motion::default() };
        if !is_intra {
            motion.mv_x = mb.mv_x;
            motion.mv_y = mb.mv_y;
            motion.mv_x2 = mb.b_mv_x;
            motion.mv_y2 = mb.b_mv_y;
            motion.mc_type2 = 0;
            if band.is_halfpel {
                motion.mc_type = ((mb.mv_y & 1) << 1) | (mb.mv_x & 1);
                motion.mc_type2 = ((mb.b_mv_y & 1) << 1) | (mb.b_mv_x & 1);
                motion.mv_x >>= 1;
                motion.mv_y >>= 1;
                motion.mv_x2 >>= 1;
                motion.mv_y2 >>= 1;
            }
            if mb.mb_type == 2 {
                motion.mc_type = -1;
            }
            if mb.mb_type != 2 && mb.mb_type != 3 {
                motion.mc_type2 = -1;
            }
            check_mv_window(band, mb, mb.mv_x, mb.mv_y)?;
            if mb.mb_type == 2 || mb.mb_type == 3 {
                check_mv_window(band, mb, mb.b_mv_x, mb.b_mv_y)?;
            }
        }

        for blk in 0..num_blocks {
            if blk & 1 != 0 {
                buf_offs += blk_size as isize;
            } else if blk == 2 {
                buf_offs += blk_size as isize * pitch - blk_size as isize;
            }

            if cbp & 1 != 0 {
                decode_coded_block(
                    br, band, blk_vlc, rvmap, bufs, &motion, &mut prev_dc, is_intra, quant, buf_offs,
                )?;
            } else if is_intra {
                // uncoded intra block: DC only
                if buf_offs < 0 || buf_offs as usize + band.transform.min_len(band.pitch) > bufs.dst.len() {
                    return invalid("block outside the band");
                }
                band.transform.dc(prev_dc, &mut bufs.dst[buf_offs as usize..], band.pitch);
            } else {
                block_mc(bufs, band, buf_offs, &motion, false)?;
            }
            cbp >>= 1;
        }
    }

    br.align();
    Ok(())
}

/// Reconstruct a tile that carries no data: inherited motion if any,
/// otherwise a straight copy from the reference.
fn process_empty_tile(
    band: &Band,
    tile: &mut Tile,
    ref_tile: Option<&Tile>,
    mv_scale: i32,
    bufs: &mut BandBuffers,
) -> Result<()> {
    let mb_size = band.mb_size;
    if tile.num_mbs != mbs_per_tile(tile.width, tile.height, mb_size) || tile.mbs.len() != tile.num_mbs {
        return invalid(format!(
            "allocated tile size {} mismatches parameters {}",
            tile.num_mbs,
            mbs_per_tile(tile.width, tile.height, mb_size)
        ));
    }

    let pitch = band.pitch;
    let mut need_mc = false;
    let mut idx = 0;
    for y in (tile.ypos..tile.ypos + tile.height).step_by(mb_size) {
        for x in (tile.xpos..tile.xpos + tile.width).step_by(mb_size) {
            let ref_mb = ref_tile.and_then(|r| r.mbs.get(idx));
            let mut mb = MbInfo {
                xpos: x as i32,
                ypos: y as i32,
                buf_offs: (y * pitch + x) as i32,
                mb_type: 1,
                cbp: 0,
                ..MbInfo::default()
            };

            if !band.qdelta_present && band.plane == 0 && band.band_num == 0 {
                mb.q_delta = band.glob_quant;
            }
            if band.inherit_qdelta {
                if let Some(r) = ref_mb {
                    mb.q_delta = r.q_delta;
                }
            }
            if band.inherit_mv {
                if let Some(r) = ref_mb {
                    mb.mv_x = scale_mv(r.mv_x, mv_scale);
                    mb.mv_y = scale_mv(r.mv_y, mv_scale);
                    need_mc |= mb.mv_x != 0 || mb.mv_y != 0;
                    check_mv_window(band, &mb, mb.mv_x, mb.mv_y)?;
                }
            }

            tile.mbs[idx] = mb;
            idx += 1;
        }
    }

    if band.inherit_mv && need_mc {
        let blk = band.blk_size;
        let num_blocks = if mb_size != blk { 4 } else { 1 };
        for mb in tile.mbs.iter() {
            let mut motion = Motion { mv_x: mb.mv_x, mv_y: mb.mv_y, mc_type2: -1, ..Motion::default() };
            if band.is_halfpel {
                motion.mc_type = ((mb.mv_y & 1) << 1) | (mb.mv_x & 1);
                motion.mv_x >>= 1;
                motion.mv_y >>= 1;
            }
            for b in 0..num_blocks {
                let offs = mb.buf_offs as isize
                    + (blk * ((b & 1) + if b & 2 != 0 { pitch } else { 0 })) as isize;
                block_mc(bufs, band, offs, &motion, false)?;
            }
        }
    } else {
        if bufs.ref_buf.len() < band.buf_size {
            return invalid("empty tile without a reference");
        }
        for row in tile.ypos..tile.ypos + tile.height {
            let start = row * pitch + tile.xpos;
            let end = start + tile.width;
            bufs.dst[start..end].copy_from_slice(&bufs.ref_buf[start..end]);
        }
    }
    Ok(())
}

/// Tile payload size in bytes; 0 when absent.
fn decode_tile_data_size(br: &mut BitReader) -> usize {
    let mut len = 0;
    if br.get_bit() {
        len = br.get_bits(8) as usize;
        if len == 255 {
            len = br.get_bits(24) as usize;
        }
    }
    br.align();
    len
}

// ─── Decoder ─────────────────────────────────────────────────────────────────

enum FrameOutcome {
    Decoded(Surface),
    /// Null frame: present the previous output again.
    Repeat,
    /// Present the frame that was embedded in the previous packet.
    Pending,
}

/// Generic Indeo decoder, parameterized by the bitstream generation.
pub struct IndeoDecoder<F: FormatDecoder> {
    format:  F,
    ctx:     IndeoContext,
    config:  DecoderConfig,
    alpha:   Vec<u8>,
    output:  Option<Surface>,
    pending: Option<Surface>,
}

impl<F: FormatDecoder + Default> IndeoDecoder<F> {
    pub fn new(config: DecoderConfig) -> Result<Self> {
        Ok(IndeoDecoder {
            format: F::default(),
            ctx: IndeoContext::new(F::GENERATION)?,
            config,
            alpha: Vec::new(),
            output: None,
            pending: None,
        })
    }
}

impl<F: FormatDecoder> IndeoDecoder<F> {
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn picture_header(&self) -> &PictureHeader {
        &self.ctx.hdr
    }

    /// Buffer roles used by the last decoded frame.
    pub fn buffer_slots(&self) -> BufferSlots {
        self.ctx.slots
    }

    /// Picture dimensions of the current configuration, if any.
    pub fn dimensions(&self) -> Option<(usize, usize)> {
        if self.ctx.layout.is_allocated() {
            Some((self.ctx.layout.pic_conf.pic_width, self.ctx.layout.pic_conf.pic_height))
        } else {
            None
        }
    }

    fn decode_packet(&mut self, data: &[u8]) -> Result<FrameOutcome> {
        let mut br = BitReader::new(data);
        self.format.decode_picture_header(&mut self.ctx, &mut br)?;

        let frame_type = self.ctx.hdr.frame_type;
        if self.ctx.hdr.gop_invalid {
            return invalid("invalid GOP header");
        }
        if frame_type == FrameType::NullLast {
            return Ok(if self.pending.is_some() { FrameOutcome::Pending } else { FrameOutcome::Repeat });
        }
        if self.ctx.hdr.gop_flags & GOP_PROTECTED != 0 {
            return unsupported("password-protected clip");
        }
        if !self.ctx.layout.is_allocated() {
            return invalid("color planes not initialized yet");
        }

        self.ctx.slots = self.ctx.slots.advance(F::GENERATION, self.ctx.hdr.prev_frame_type, frame_type);
        let dst = self.ctx.slots.current;
        trace!(
            "Frame {} {:?}: dst {} ref {} bref {}",
            self.ctx.hdr.frame_num,
            frame_type,
            dst,
            self.ctx.slots.primary_ref,
            self.ctx.slots.bidir_ref
        );

        if !frame_type.is_null() {
            self.ctx.buf_invalid[dst] = true;
            for p in 0..3 {
                for b in 0..self.ctx.layout.planes[p].bands.len() {
                    if let Err(err) = self.decode_band(p, b, &mut br) {
                        warn!("Error while decoding band {} of plane {}: {}", b, p, err);
                        return Err(err);
                    }
                }
            }
            self.ctx.buf_invalid[dst] = false;
        } else {
            if self.ctx.hdr.is_scalable {
                return invalid("null frame in a scalable stream");
            }
            if self.ctx.layout.planes.iter().any(|p| p.bands.first().map_or(true, |b| b.bufs[dst].is_empty())) {
                return invalid("null frame before any picture");
            }
        }
        if self.ctx.buf_invalid[dst] {
            return invalid("destination buffer holds a failed frame");
        }
        if frame_type.is_null() {
            return Ok(FrameOutcome::Repeat);
        }

        let mut frame = output::assemble_frame(&self.ctx.layout, dst, self.ctx.hdr.is_scalable, F::GENERATION)?;

        if self.ctx.hdr.has_transp {
            let (w, h) = (frame.width, frame.height);
            if self.alpha.len() != w * h {
                self.alpha = vec![255; w * h];
            }
            if let Err(err) = self.format.decode_transparency(&mut br, w, h, &mut self.alpha) {
                warn!("Error while decoding transparency: {}", err);
            }
            if self.config.apply_transparency {
                frame.alpha = Some(self.alpha.clone());
            }
        }

        if F::GENERATION == Generation::Indeo4 && frame_type == FrameType::Intra {
            self.pending = None;
            if let Some(pos) = find_embedded_frame(&mut br) {
                debug!("Embedded frame at byte {}", pos);
                match self.decode_packet(&data[pos..]) {
                    Ok(FrameOutcome::Decoded(surface)) => self.pending = Some(surface),
                    Ok(_) => {}
                    Err(err) => warn!("Error while decoding embedded frame: {}", err),
                }
            }
        }

        Ok(FrameOutcome::Decoded(Surface::from_frame(frame, self.config.pixel_format)))
    }

    fn decode_band(&mut self, p: usize, b: usize, br: &mut BitReader) -> Result<()> {
        let mut band = mem::take(&mut self.ctx.layout.planes[p].bands[b]);
        let result = self.decode_band_data(&mut band, br);
        self.ctx.layout.planes[p].bands[b] = band;
        result
    }

    fn decode_band_data(&mut self, band: &mut Band, br: &mut BitReader) -> Result<()> {
        let ctx = &mut self.ctx;
        let slots = ctx.slots;
        let dst_idx = slots.current;
        let (ref_idx, bref_idx) = if ctx.hdr.frame_type == FrameType::Bidir {
            (slots.bidir_ref, Some(slots.primary_ref))
        } else {
            (slots.primary_ref, None)
        };

        if band.bufs[dst_idx].len() < band.buf_size || band.buf_size == 0 {
            return invalid("band buffer points to no data");
        }

        if let Err(err) = self.format.decode_band_header(&ctx.hdr, band, br) {
            warn!("Error while decoding band header: {}", err);
            return Err(err);
        }

        if band.is_empty {
            warn!("Empty band encountered in plane {} band {}", band.plane, band.band_num);
            let (dst, others) = split_buffers(&mut band.bufs, dst_idx);
            match others.get(ref_idx).filter(|r| r.len() == dst.len() && !ctx.hdr.frame_type.is_intra()) {
                Some(src) => dst.copy_from_slice(src),
                None => dst.fill(0),
            }
            br.align();
            return Ok(());
        }

        // The luma band 0 is the inheritance source of every other band.
        let is_base_band = band.plane == 0 && band.band_num == 0;
        let mv_scale = if is_base_band {
            0
        } else {
            (ctx.layout.planes[0].bands[0].mb_size >> 3) as i32 - (band.mb_size >> 3) as i32
        };

        let mb_vlc = match ctx.hdr.mb_vlc.table(&ctx.store, HuffKind::Mb) {
            Some(vlc) => vlc,
            None => return invalid("macroblock VLC table is not set"),
        };
        let blk_vlc = match band.blk_vlc.sel {
            TabSel::Picture => ctx.hdr.blk_vlc.table(&ctx.store, HuffKind::Blk),
            _ => band.blk_vlc.table(&ctx.store, HuffKind::Blk),
        };
        let Some(blk_vlc) = blk_vlc else {
            return invalid("block VLC table is not set");
        };

        let max_quant = match F::GENERATION {
            Generation::Indeo4 => 31,
            Generation::Indeo5 => 23,
        };

        let rvmap_sel = band.rvmap_sel;
        if rvmap_sel >= ctx.rvmaps.len() {
            return invalid(format!("run/value map {} does not exist", rvmap_sel));
        }
        ctx.rvmaps[rvmap_sel].apply_corrections(&band.corr);

        let mut tiles = mem::take(&mut band.tiles);
        let mut dst = mem::take(&mut band.bufs[dst_idx]);
        let ref_tiles = if is_base_band { None } else { Some(&ctx.layout.planes[0].bands[0].tiles[..]) };

        let result = {
            let mut bufs = BandBuffers {
                dst: &mut dst,
                ref_buf: &band.bufs[ref_idx],
                bref_buf: bref_idx.map_or(&[][..], |i| &band.bufs[i][..]),
            };
            let rvmap = &ctx.rvmaps[rvmap_sel];
            let band_ref: &Band = band;
            let mut pos = br.get_bits_count();
            let mut res = Ok(());

            for (t, tile) in tiles.iter_mut().enumerate() {
                let ref_tile = if tile.has_ref { ref_tiles.and_then(|r| r.get(t)) } else { None };
                res = decode_tile(
                    &self.format, &ctx.hdr, mb_vlc, blk_vlc, rvmap, band_ref, tile, ref_tile, mv_scale,
                    &mut bufs, max_quant, &mut pos, br,
                );
                if res.is_err() {
                    break;
                }
            }
            res
        };

        band.bufs[dst_idx] = dst;
        band.tiles = tiles;
        ctx.rvmaps[rvmap_sel].undo_corrections(&band.corr);
        br.align();
        result
    }
}

#[allow(clippy::too_many_arguments)]
fn decode_tile<F: FormatDecoder>(
    format: &F,
    hdr: &PictureHeader,
    mb_vlc: &Vlc,
    blk_vlc: &Vlc,
    rvmap: &RunValueMap,
    band: &Band,
    tile: &mut Tile,
    ref_tile: Option<&Tile>,
    mv_scale: i32,
    bufs: &mut BandBuffers,
    max_quant: i32,
    pos: &mut usize,
    br: &mut BitReader,
) -> Result<()> {
    if tile.mb_size != band.mb_size {
        return invalid(format!("MB sizes mismatch: {} vs. {}", band.mb_size, tile.mb_size));
    }

    tile.is_empty = br.get_bit();
    if tile.is_empty {
        process_empty_tile(band, tile, ref_tile, mv_scale, bufs)?;
        trace!("Empty tile at {}x{}", tile.xpos, tile.ypos);
        return Ok(());
    }

    tile.data_size = decode_tile_data_size(br);
    if tile.data_size == 0 {
        return invalid("tile data size is zero");
    }

    format.decode_mb_info(hdr, mb_vlc, band, tile, ref_tile, mv_scale, br)?;
    if let Err(err) = decode_blocks(br, band, tile, blk_vlc, rvmap, bufs, max_quant) {
        warn!("Corrupted tile data encountered");
        return Err(err);
    }

    if (br.get_bits_count().wrapping_sub(*pos) >> 3) != tile.data_size {
        return invalid("tile data size mismatch");
    }
    *pos += tile.data_size << 3;
    Ok(())
}

/// Borrow buffer `idx` mutably and the remaining ones immutably; the
/// returned array view has an empty slice at `idx`.
fn split_buffers(bufs: &mut [Vec<i16>; 4], idx: usize) -> (&mut [i16], [&[i16]; 4]) {
    let (head, tail) = bufs.split_at_mut(idx);
    let (cur, tail) = tail.split_at_mut(1);
    let mut others: [&[i16]; 4] = [&[]; 4];
    for (i, b) in head.iter().enumerate() {
        others[i] = b;
    }
    for (i, b) in tail.iter().enumerate() {
        others[idx + 1 + i] = b;
    }
    (&mut cur[0][..], others)
}

/// Look for a second frame packed after an intra frame.
///
/// Skips the version string and the padding up to the next 64-bit
/// boundary; returns the byte offset of the embedded frame header.
fn find_embedded_frame(br: &mut BitReader) -> Option<usize> {
    while br.get_bits(8) != 0 {
        if br.get_bits_left() < 8 {
            return None;
        }
    }
    let left = br.get_bits_count() & 0x18;
    br.skip_bits_long(64 - left);
    // sync code followed by the INTER frame type
    if br.get_bits_left() > 18 && br.show_bits_long(21) == 0xBFFF8 {
        Some(br.get_bits_count() >> 3)
    } else {
        None
    }
}

impl<F: FormatDecoder> Codec for IndeoDecoder<F> {
    fn decode_frame(&mut self, data: &[u8]) -> Result<&Surface> {
        match self.decode_packet(data) {
            Ok(FrameOutcome::Decoded(surface)) => self.output = Some(surface),
            Ok(FrameOutcome::Repeat) => {}
            Ok(FrameOutcome::Pending) => {
                if let Some(surface) = self.pending.take() {
                    self.output = Some(surface);
                }
            }
            Err(err) => {
                if self.config.conceal_errors && self.output.is_some() {
                    warn!("Frame decode failed, repeating previous frame: {}", err);
                } else {
                    return Err(err);
                }
            }
        }
        self.output.as_ref().ok_or(DecoderError::EndOfStream)
    }

    fn pixel_format(&self) -> PixelFormat {
        self.config.pixel_format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_signed() {
        let got: Vec<i32> = (0..7).map(to_signed).collect();
        assert_eq!(got, vec![0, 1, -1, 2, -2, 3, -3]);
    }

    #[test]
    fn test_scale_mv() {
        assert_eq!(scale_mv(5, 0), 5);
        assert_eq!(scale_mv(5, 1), 3);
        assert_eq!(scale_mv(4, 1), 2);
        assert_eq!(scale_mv(-5, 1), -3);
        assert_eq!(scale_mv(-4, 1), -2);
        assert_eq!(scale_mv(0, 1), 0);
    }

    #[test]
    fn test_tile_data_size() {
        use crate::bitreader::tests::BitWriter;
        let mut w = BitWriter::new();
        w.put_bit(true);
        w.put_bits(255, 8);
        w.put_bits(1000, 24);
        w.align();
        w.put_bit(false);
        let data = w.finish();
        let mut br = BitReader::new(&data);
        assert_eq!(decode_tile_data_size(&mut br), 1000);
        assert_eq!(br.get_bits_count(), 40);
        assert_eq!(decode_tile_data_size(&mut br), 0);
    }

    #[test]
    fn test_split_buffers() {
        let mut bufs = [vec![1i16; 2], vec![2i16; 2], Vec::new(), vec![4i16; 2]];
        let (cur, others) = split_buffers(&mut bufs, 1);
        cur[0] = 9;
        assert_eq!(others[0], &[1, 1]);
        assert!(others[1].is_empty());
        assert!(others[2].is_empty());
        assert_eq!(others[3], &[4, 4]);
        assert_eq!(bufs[1], vec![9, 2]);
    }

    #[test]
    fn test_find_embedded_frame() {
        use crate::bitreader::tests::BitWriter;
        let mut w = BitWriter::new();
        // version string "ab\0"
        w.put_bits(b'a' as u32, 8);
        w.put_bits(b'b' as u32, 8);
        w.put_bits(0, 8);
        // pad to 64 bits
        w.put_bits(0, 32);
        w.put_bits(0, 8);
        w.put_bits(0x3FFF8, 18);
        w.put_bits(2, 3);
        w.put_bits(0, 32);
        let data = w.finish();
        let mut br = BitReader::new(&data);
        assert_eq!(find_embedded_frame(&mut br), Some(8));
    }
}
