/// Plane / band / tile / macroblock hierarchy.
///
/// A frame has three planes (Y and two quarter-resolution chroma planes).
/// Each plane is split into one or four wavelet bands, each band into tiles
/// and each tile into macroblocks. Bands own up to four sample buffers whose
/// roles (current, reference, ...) are assigned per frame by index.

use log::debug;

use crate::dsp::Transform;
use crate::error::{invalid, DecoderError, Result};
use crate::huffman::HuffTab;

/// Most correction pairs a band header may carry.
pub const MAX_CORRECTIONS: usize = 61;

/// Number of macroblocks covering a `w`x`h` tile.
#[inline]
pub fn mbs_per_tile(w: usize, h: usize, mb_size: usize) -> usize {
    ((w + mb_size - 1) / mb_size) * ((h + mb_size - 1) / mb_size)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PicConfig {
    pub pic_width:     usize,
    pub pic_height:    usize,
    pub chroma_width:  usize,
    pub chroma_height: usize,
    pub tile_width:    usize,
    pub tile_height:   usize,
    pub luma_bands:    usize,
    pub chroma_bands:  usize,
}

impl PicConfig {
    /// Derive chroma dimensions for 4:1:0 sampling.
    pub fn set_chroma_from_luma(&mut self) {
        self.chroma_width = (self.pic_width + 3) >> 2;
        self.chroma_height = (self.pic_height + 3) >> 2;
    }
}

/// Reject pictures whose padded area would overflow the sample arithmetic.
pub fn check_image_size(w: usize, h: usize) -> Result<()> {
    if ((w as u64 + 128) * (h as u64 + 128)) < (i32::MAX as u64 / 8) {
        Ok(())
    } else {
        Err(DecoderError::Allocation(format!("picture size {}x{} is invalid", w, h)))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MbInfo {
    pub xpos:     i32,
    pub ypos:     i32,
    pub buf_offs: i32,
    /// 0 intra, 1 inter, 2 backward, 3 bidirectional.
    pub mb_type:  i32,
    pub cbp:      u32,
    pub q_delta:  i32,
    pub mv_x:     i32,
    pub mv_y:     i32,
    pub b_mv_x:   i32,
    pub b_mv_y:   i32,
}

#[derive(Clone, Debug, Default)]
pub struct Tile {
    pub xpos:      usize,
    pub ypos:      usize,
    pub width:     usize,
    pub height:    usize,
    pub mb_size:   usize,
    pub is_empty:  bool,
    pub data_size: usize,
    pub num_mbs:   usize,
    pub mbs:       Vec<MbInfo>,
    /// Macroblock info can be inherited from the co-located tile of luma band 0.
    pub has_ref:   bool,
}

#[derive(Clone, Debug, Default)]
pub struct Band {
    pub plane:    usize,
    pub band_num: usize,
    pub width:    usize,
    pub height:   usize,
    /// Buffer stride, also the aligned width.
    pub pitch:    usize,
    pub aheight:  usize,
    pub bufs:     [Vec<i16>; 4],
    /// Samples per buffer.
    pub buf_size: usize,

    pub is_empty:       bool,
    pub data_size:      usize,
    pub mb_size:        usize,
    pub blk_size:       usize,
    pub is_halfpel:     bool,
    pub inherit_mv:     bool,
    pub inherit_qdelta: bool,
    pub qdelta_present: bool,
    pub quant_mat:      usize,
    pub glob_quant:     i32,
    pub scan:           Option<&'static [u8]>,
    pub scan_size:      usize,

    pub rvmap_sel: usize,
    pub num_corr:  usize,
    pub corr:      Vec<u8>,

    pub blk_vlc:       HuffTab,
    pub transform:     Transform,
    pub is_2d_trans:   bool,
    pub checksum:      u32,
    pub checksum_present: bool,

    pub intra_base:  &'static [u16],
    pub inter_base:  &'static [u16],
    pub intra_scale: Option<&'static [u8]>,
    pub inter_scale: Option<&'static [u8]>,

    pub tiles: Vec<Tile>,
}

impl Band {
    /// Lay out the tile grid of this band. `ref_tiles` are the tiles of
    /// luma band 0, or `None` when this is that band.
    fn init_tiles(&mut self, ref_tiles: Option<&[Tile]>, t_width: usize, t_height: usize) -> Result<()> {
        let mut tiles = Vec::new();
        let mut ref_iter = ref_tiles.map(|t| t.iter());

        for y in (0..self.height).step_by(t_height) {
            for x in (0..self.width).step_by(t_width) {
                let width = (self.width - x).min(t_width);
                let height = (self.height - y).min(t_height);
                let num_mbs = mbs_per_tile(width, height, self.mb_size);

                let has_ref = match ref_iter.as_mut() {
                    Some(it) => match it.next() {
                        Some(r) if r.num_mbs == num_mbs => true,
                        _ => return invalid("reference tile mismatch"),
                    },
                    None => false,
                };

                tiles.push(Tile {
                    xpos: x,
                    ypos: y,
                    width,
                    height,
                    mb_size: self.mb_size,
                    is_empty: false,
                    data_size: 0,
                    num_mbs,
                    mbs: vec![MbInfo::default(); num_mbs],
                    has_ref,
                });
            }
        }
        self.tiles = tiles;
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct Plane {
    pub width:  usize,
    pub height: usize,
    pub bands:  Vec<Band>,
}

fn alloc_buf(len: usize) -> Result<Vec<i16>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|e| DecoderError::Allocation(format!("band buffer of {} samples: {}", len, e)))?;
    buf.resize(len, 0);
    Ok(buf)
}

#[inline]
fn align_up(v: usize, a: usize) -> usize {
    (v + a - 1) & !(a - 1)
}

/// The picture configuration and the hierarchy allocated for it.
#[derive(Clone, Debug, Default)]
pub struct FrameLayout {
    pub pic_conf: PicConfig,
    pub planes:   [Plane; 3],
}

impl FrameLayout {
    pub fn is_allocated(&self) -> bool {
        !self.planes[0].bands.is_empty()
    }

    /// Drop all planes, leaving the layout unallocated.
    pub fn clear(&mut self) {
        for p in self.planes.iter_mut() {
            *p = Plane::default();
        }
    }

    /// Reallocate planes and band buffers when `cfg` differs from the
    /// current configuration (or `force` is set). Returns whether a
    /// reallocation happened.
    ///
    /// On failure the new configuration is still recorded with no planes,
    /// so the same geometry is not retried on every frame.
    pub fn reconfigure(&mut self, cfg: &PicConfig, force: bool, is_indeo4: bool) -> Result<bool> {
        if *cfg == self.pic_conf && !force {
            return Ok(false);
        }
        debug!(
            "Reallocating planes for {}x{}, tiles {}x{}, bands {}/{}",
            cfg.pic_width, cfg.pic_height, cfg.tile_width, cfg.tile_height, cfg.luma_bands, cfg.chroma_bands
        );
        self.pic_conf = *cfg;
        if let Err(err) = self.init_planes(cfg, is_indeo4) {
            self.clear();
            return Err(err);
        }
        Ok(true)
    }

    /// Allocate planes, bands and sample buffers for `cfg`.
    pub fn init_planes(&mut self, cfg: &PicConfig, is_indeo4: bool) -> Result<()> {
        self.clear();

        check_image_size(cfg.pic_width, cfg.pic_height)?;
        if cfg.luma_bands < 1 || cfg.chroma_bands < 1 {
            return invalid("plane without bands");
        }

        self.planes[0].width = cfg.pic_width;
        self.planes[0].height = cfg.pic_height;
        for p in 1..3 {
            self.planes[p].width = (cfg.pic_width + 3) >> 2;
            self.planes[p].height = (cfg.pic_height + 3) >> 2;
        }

        for p in 0..3 {
            let num_bands = if p == 0 { cfg.luma_bands } else { cfg.chroma_bands };
            let plane = &mut self.planes[p];

            // Several bands each cover half the plane in both directions.
            let (b_width, b_height) = if num_bands == 1 {
                (plane.width, plane.height)
            } else {
                ((plane.width + 1) >> 1, (plane.height + 1) >> 1)
            };

            // Luma buffers are aligned to the largest macroblock (16),
            // chroma ones to 8.
            let align_fac = if p == 0 { 16 } else { 8 };
            let width_aligned = align_up(b_width, align_fac);
            let height_aligned = align_up(b_height, align_fac);
            let buf_size = width_aligned * height_aligned;

            let mut bands = Vec::with_capacity(num_bands);
            for b in 0..num_bands {
                let mut band = Band {
                    plane: p,
                    band_num: b,
                    width: b_width,
                    height: b_height,
                    pitch: width_aligned,
                    aheight: height_aligned,
                    buf_size,
                    ..Band::default()
                };
                band.bufs[0] = alloc_buf(buf_size)?;
                band.bufs[1] = alloc_buf(buf_size)?;
                // third buffer for scalability mode
                if cfg.luma_bands > 1 {
                    band.bufs[2] = alloc_buf(buf_size)?;
                }
                if is_indeo4 {
                    band.bufs[3] = alloc_buf(buf_size)?;
                }
                bands.push(band);
            }
            plane.bands = bands;
        }
        Ok(())
    }

    /// Build the tile grid of every band for the given luma tile size.
    pub fn init_tiles(&mut self, tile_width: usize, tile_height: usize) -> Result<()> {
        for p in 0..3 {
            let (mut t_width, mut t_height) = if p == 0 {
                (tile_width, tile_height)
            } else {
                ((tile_width + 3) >> 2, (tile_height + 3) >> 2)
            };
            if p == 0 && self.planes[0].bands.len() == 4 {
                t_width >>= 1;
                t_height >>= 1;
            }
            if t_width == 0 || t_height == 0 {
                return invalid("zero tile size");
            }

            for b in 0..self.planes[p].bands.len() {
                if self.planes[p].bands[b].mb_size == 0 {
                    return invalid("macroblock size not set");
                }
                if p == 0 && b == 0 {
                    self.planes[0].bands[0].init_tiles(None, t_width, t_height)?;
                } else {
                    let (luma, rest) = self.planes.split_at_mut(1);
                    let (ref_band, band) = if p == 0 {
                        let (first, others) = luma[0].bands.split_at_mut(1);
                        (&first[0], &mut others[b - 1])
                    } else {
                        (&luma[0].bands[0], &mut rest[p - 1].bands[b])
                    };
                    band.init_tiles(Some(&ref_band.tiles), t_width, t_height)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(w: usize, h: usize, luma_bands: usize) -> PicConfig {
        let mut c = PicConfig {
            pic_width: w,
            pic_height: h,
            tile_width: w,
            tile_height: h,
            luma_bands,
            chroma_bands: 1,
            ..PicConfig::default()
        };
        c.set_chroma_from_luma();
        c
    }

    fn set_mb_sizes(layout: &mut FrameLayout) {
        for (p, plane) in layout.planes.iter_mut().enumerate() {
            for band in plane.bands.iter_mut() {
                band.mb_size = if p == 0 { 16 } else { 4 };
                band.blk_size = if p == 0 { 8 } else { 4 };
            }
        }
    }

    #[test]
    fn test_reconfigure_is_idempotent() {
        let mut layout = FrameLayout::default();
        let c = cfg(176, 144, 1);
        assert!(layout.reconfigure(&c, false, true).unwrap());
        assert!(!layout.reconfigure(&c, false, true).unwrap());

        let c2 = cfg(352, 144, 1);
        assert!(layout.reconfigure(&c2, false, true).unwrap());
        assert!(!layout.reconfigure(&c2, false, true).unwrap());

        let y = &layout.planes[0].bands[0];
        assert_eq!((y.width, y.height, y.pitch, y.aheight), (352, 144, 352, 144));
        assert_eq!(y.bufs[0].len(), y.buf_size);
        assert_eq!(y.bufs[3].len(), y.buf_size);
        assert!(y.bufs[2].is_empty());

        let u = &layout.planes[1].bands[0];
        assert_eq!((u.width, u.height, u.pitch, u.aheight), (88, 36, 88, 40));
        assert_eq!(layout.planes[2].width, 88);
    }

    #[test]
    fn test_scalable_layout_and_tiles() {
        let mut layout = FrameLayout::default();
        let c = PicConfig { tile_width: 64, tile_height: 64, ..cfg(160, 120, 4) };
        layout.reconfigure(&c, false, false).unwrap();
        assert_eq!(layout.planes[0].bands.len(), 4);
        let b = &layout.planes[0].bands[3];
        assert_eq!((b.width, b.height, b.pitch, b.aheight), (80, 60, 80, 64));
        assert_eq!(b.bufs[2].len(), b.buf_size);
        assert!(b.bufs[3].is_empty());

        for (p, plane) in layout.planes.iter_mut().enumerate() {
            for band in plane.bands.iter_mut() {
                band.mb_size = if p == 0 { 8 } else { 4 };
            }
        }
        layout.init_tiles(64, 64).unwrap();
        // luma bands use 32x32 tiles over 80x60
        assert_eq!(layout.planes[0].bands[0].tiles.len(), 6);
        let t = &layout.planes[0].bands[1].tiles[5];
        assert_eq!((t.xpos, t.ypos, t.width, t.height), (64, 32, 16, 28));
        assert_eq!(t.num_mbs, 2 * 4);
        assert!(t.has_ref);
        assert!(!layout.planes[0].bands[0].tiles[0].has_ref);
    }

    #[test]
    fn test_chroma_tiles_reference_luma() {
        let mut layout = FrameLayout::default();
        let c = cfg(176, 144, 1);
        layout.reconfigure(&c, false, true).unwrap();
        set_mb_sizes(&mut layout);
        layout.init_tiles(176, 144).unwrap();
        let v = &layout.planes[2].bands[0];
        assert_eq!(v.tiles.len(), 1);
        assert_eq!(v.tiles[0].num_mbs, 11 * 9);
        assert_eq!(layout.planes[0].bands[0].tiles[0].num_mbs, 11 * 9);
    }

    #[test]
    fn test_oversized_picture_is_rejected() {
        let mut layout = FrameLayout::default();
        let c = cfg(40000, 40000, 1);
        assert!(matches!(layout.reconfigure(&c, false, true), Err(DecoderError::Allocation(_))));
        assert!(!layout.is_allocated());
        // Same geometry again: no retry.
        assert!(!layout.reconfigure(&c, false, true).unwrap());
        assert!(!layout.is_allocated());
        assert!(layout.reconfigure(&cfg(64, 64, 1), false, true).unwrap());
        assert!(layout.is_allocated());
    }
}
