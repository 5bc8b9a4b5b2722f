/// Band buffers → 8-bit planes.
///
/// Single-band planes are biased by 128 and clipped. Four-band luma planes
/// are recomposed from their wavelet bands first: a plain Haar synthesis for
/// Indeo4 and a 5/3 synthesis for Indeo5.

use crate::api::YuvFrame;
use crate::bufswitch::Generation;
use crate::error::{invalid, Result};
use crate::plane::{FrameLayout, Plane};

#[inline(always)]
fn clip_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Four-pixel output of one recomposition step; pixels beyond the plane
/// edge are dropped.
struct QuadWriter<'a> {
    dst:    &'a mut [u8],
    width:  usize,
    height: usize,
}

impl QuadWriter<'_> {
    #[inline]
    fn put(&mut self, x: usize, y: usize, p: [i32; 4]) {
        for (i, &v) in p.iter().enumerate() {
            let px = x + (i & 1);
            let py = y + (i >> 1);
            if px < self.width && py < self.height {
                self.dst[py * self.width + px] = clip_u8(v + 128);
            }
        }
    }
}

/// Copy band 0 of `plane` into `dst` (stride = plane width).
pub fn output_plane(plane: &Plane, buf_idx: usize, dst: &mut [u8]) -> Result<()> {
    let band = match plane.bands.first() {
        Some(b) => b,
        None => return invalid("plane without bands"),
    };
    let src = &band.bufs[buf_idx];
    if src.len() < band.pitch * plane.height || plane.width > band.pitch {
        return invalid("band buffer is not allocated");
    }
    for (y, row) in dst.chunks_exact_mut(plane.width).take(plane.height).enumerate() {
        let line = &src[y * band.pitch..y * band.pitch + plane.width];
        for (d, &s) in row.iter_mut().zip(line.iter()) {
            *d = clip_u8(s as i32 + 128);
        }
    }
    Ok(())
}

fn band_bufs<'a>(plane: &'a Plane, buf_idx: usize) -> Result<[&'a [i16]; 4]> {
    if plane.bands.len() != 4 {
        return invalid("recomposition needs four bands");
    }
    let size = plane.bands[0].buf_size;
    let mut out: [&[i16]; 4] = [&[]; 4];
    for (o, band) in out.iter_mut().zip(plane.bands.iter()) {
        if band.bufs[buf_idx].len() < size || band.pitch != plane.bands[0].pitch {
            return invalid("band buffer is not allocated");
        }
        *o = &band.bufs[buf_idx];
    }
    Ok(out)
}

/// Inverse Haar wavelet recomposition.
pub fn recompose_haar(plane: &Plane, buf_idx: usize, dst: &mut [u8]) -> Result<()> {
    let [b0, b1, b2, b3] = band_bufs(plane, buf_idx)?;
    let pitch = plane.bands[0].pitch;
    let mut out = QuadWriter { dst, width: plane.width, height: plane.height };

    for (row, y) in (0..plane.height).step_by(2).enumerate() {
        let base = row * pitch;
        for (indx, x) in (0..plane.width).step_by(2).enumerate() {
            let i = base + indx;
            let (c0, c1, c2, c3) = (b0[i] as i32, b1[i] as i32, b2[i] as i32, b3[i] as i32);
            out.put(x, y, [
                (c0 + c1 + c2 + c3 + 2) >> 2,
                (c0 + c1 - c2 - c3 + 2) >> 2,
                (c0 - c1 + c2 - c3 + 2) >> 2,
                (c0 - c1 - c2 + c3 + 2) >> 2,
            ]);
        }
    }
    Ok(())
}

/// Inverse 5/3 wavelet recomposition.
///
/// Neighbours outside the band are mirrored from the edge: the first row
/// uses itself as its upper neighbour, the last row pair uses itself as the
/// lower one and the last column pair its own left sample.
pub fn recompose_53(plane: &Plane, buf_idx: usize, dst: &mut [u8]) -> Result<()> {
    let bands = band_bufs(plane, buf_idx)?;
    let pitch = plane.bands[0].pitch as isize;
    let mut out = QuadWriter { dst, width: plane.width, height: plane.height };

    let at = |b: usize, off: isize| -> i32 {
        if off < 0 {
            0
        } else {
            bands[b].get(off as usize).copied().unwrap_or(0) as i32
        }
    };

    let mut back_pitch = 0isize;
    let mut pitch_ = pitch;
    // per-band row origins; all bands share one pitch
    let mut base = 0isize;

    for y in (0..plane.height).step_by(2) {
        if y + 2 >= plane.height {
            pitch_ = 0;
        }

        let mut b0_1 = at(0, base);
        let mut b0_2 = at(0, base + pitch_);

        let mut b1_1 = at(1, base + back_pitch);
        let mut b1_2 = at(1, base);
        let mut b1_3 = b1_1 - b1_2 * 6 + at(1, base + pitch_);

        let mut b2_2 = at(2, base);
        let mut b2_3 = b2_2;
        let mut b2_5 = at(2, base + pitch_);
        let mut b2_6 = b2_5;

        let mut b3_2 = at(3, base + back_pitch);
        let mut b3_3 = b3_2;
        let mut b3_5 = at(3, base);
        let mut b3_6 = b3_5;
        let mut b3_8 = b3_2 - b3_5 * 6 + at(3, base + pitch_);
        let mut b3_9 = b3_8;

        let mut row = base;
        for (indx, x) in (0..plane.width).step_by(2).enumerate() {
            if x + 2 >= plane.width {
                row -= 1;
            }
            let nx = row + indx as isize + 1;

            let b2_1 = b2_2;
            b2_2 = b2_3;
            let b2_4 = b2_5;
            b2_5 = b2_6;
            let b3_1 = b3_2;
            b3_2 = b3_3;
            let b3_4 = b3_5;
            b3_5 = b3_6;
            let b3_7 = b3_8;
            b3_8 = b3_9;

            // LL: lowpass both ways
            let tmp0 = b0_1;
            let tmp2 = b0_2;
            b0_1 = at(0, nx);
            b0_2 = at(0, pitch_ + nx);
            let tmp1 = tmp0 + b0_1;

            let mut p0 = tmp0 << 4;
            let mut p1 = tmp1 << 3;
            let mut p2 = (tmp0 + tmp2) << 3;
            let mut p3 = (tmp1 + tmp2 + b0_2) << 2;

            // HL: highpass vertically, lowpass horizontally
            let tmp0 = b1_2;
            let tmp1 = b1_1;
            b1_2 = at(1, nx);
            b1_1 = at(1, back_pitch + nx);
            let tmp2 = tmp1 - tmp0 * 6 + b1_3;
            b1_3 = b1_1 - b1_2 * 6 + at(1, pitch_ + nx);

            p0 += (tmp0 + tmp1) << 3;
            p1 += (tmp0 + tmp1 + b1_1 + b1_2) << 2;
            p2 += tmp2 << 2;
            p3 += (tmp2 + b1_3) << 1;

            // LH: lowpass vertically, highpass horizontally
            b2_3 = at(2, nx);
            b2_6 = at(2, pitch_ + nx);
            let tmp0 = b2_1 + b2_2;
            let tmp1 = b2_1 - b2_2 * 6 + b2_3;

            p0 += tmp0 << 3;
            p1 += tmp1 << 2;
            p2 += (tmp0 + b2_4 + b2_5) << 2;
            p3 += (tmp1 + b2_4 - b2_5 * 6 + b2_6) << 1;

            // HH: highpass both ways
            b3_6 = at(3, nx);
            b3_3 = at(3, back_pitch + nx);
            let tmp0 = b3_1 + b3_4;
            let tmp1 = b3_2 + b3_5;
            let tmp2 = b3_3 + b3_6;
            b3_9 = b3_3 - b3_6 * 6 + at(3, pitch_ + nx);

            p0 += (tmp0 + tmp1) << 2;
            p1 += (tmp0 - tmp1 * 6 + tmp2) << 1;
            p2 += (b3_7 + b3_8) << 1;
            p3 += b3_7 - b3_8 * 6 + b3_9;

            out.put(x, y, [p0 >> 6, p1 >> 6, p2 >> 6, p3 >> 6]);
        }

        back_pitch = -pitch_;
        base = row + pitch_ + 1;
    }
    Ok(())
}

/// Build the output picture from the `buf_idx` buffers of every band.
///
/// The first chroma output plane (U) comes from plane 2, the second (V)
/// from plane 1.
pub fn assemble_frame(layout: &FrameLayout, buf_idx: usize, is_scalable: bool, generation: Generation) -> Result<YuvFrame> {
    let luma = &layout.planes[0];
    let chroma = &layout.planes[1];
    let mut frame = YuvFrame::new(luma.width, luma.height, chroma.width, chroma.height);

    if is_scalable {
        match generation {
            Generation::Indeo4 => recompose_haar(luma, buf_idx, &mut frame.y)?,
            Generation::Indeo5 => recompose_53(luma, buf_idx, &mut frame.y)?,
        }
    } else {
        output_plane(luma, buf_idx, &mut frame.y)?;
    }
    output_plane(&layout.planes[2], buf_idx, &mut frame.u)?;
    output_plane(&layout.planes[1], buf_idx, &mut frame.v)?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plane::PicConfig;

    fn scalable_layout(w: usize, h: usize) -> FrameLayout {
        let mut cfg = PicConfig {
            pic_width: w,
            pic_height: h,
            tile_width: w,
            tile_height: h,
            luma_bands: 4,
            chroma_bands: 1,
            ..PicConfig::default()
        };
        cfg.set_chroma_from_luma();
        let mut layout = FrameLayout::default();
        layout.reconfigure(&cfg, false, true).unwrap();
        layout
    }

    #[test]
    fn test_output_plane_bias_and_clip() {
        let mut layout = scalable_layout(16, 16);
        let plane = &mut layout.planes[1];
        let band = &mut plane.bands[0];
        band.bufs[0][0] = -200;
        band.bufs[0][1] = 10;
        band.bufs[0][2] = 300;
        let mut dst = vec![0u8; plane.width * plane.height];
        output_plane(plane, 0, &mut dst).unwrap();
        assert_eq!(&dst[..4], &[0, 138, 255, 128]);
    }

    #[test]
    fn test_haar_flat_low_band() {
        let mut layout = scalable_layout(8, 6);
        for v in layout.planes[0].bands[0].bufs[0].iter_mut() {
            *v = 40;
        }
        let mut dst = vec![0u8; 8 * 6];
        recompose_haar(&layout.planes[0], 0, &mut dst).unwrap();
        assert!(dst.iter().all(|&p| p == 138));
    }

    #[test]
    fn test_haar_high_bands() {
        let mut layout = scalable_layout(2, 2);
        layout.planes[0].bands[1].bufs[0][0] = 8;
        layout.planes[0].bands[2].bufs[0][0] = 4;
        let mut dst = vec![0u8; 4];
        recompose_haar(&layout.planes[0], 0, &mut dst).unwrap();
        // p0 = (8+4+2)>>2, p1 = (8-4+2)>>2, p2 = (-8+4+2)>>2, p3 = (-8-4+2)>>2
        assert_eq!(dst, vec![131, 129, 127, 125]);
    }

    #[test]
    fn test_53_flat_low_band() {
        let mut layout = scalable_layout(12, 10);
        for v in layout.planes[0].bands[0].bufs[1].iter_mut() {
            *v = 16;
        }
        let mut dst = vec![0u8; 12 * 10];
        recompose_53(&layout.planes[0], 1, &mut dst).unwrap();
        // a flat LL band of value v reconstructs to v / 4 everywhere
        assert!(dst.iter().all(|&p| p == 132), "{:?}", dst);
    }

    #[test]
    fn test_recompose_requires_four_bands() {
        let mut cfg = PicConfig { pic_width: 8, pic_height: 8, tile_width: 8, tile_height: 8, luma_bands: 1, chroma_bands: 1, ..PicConfig::default() };
        cfg.set_chroma_from_luma();
        let mut layout = FrameLayout::default();
        layout.reconfigure(&cfg, false, false).unwrap();
        let mut dst = vec![0u8; 64];
        assert!(recompose_haar(&layout.planes[0], 0, &mut dst).is_err());
    }
}
