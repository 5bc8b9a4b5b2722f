//! Public library API.

use crate::error::Result;

/// Layout of the pixels a decoder hands out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PixelFormat {
    /// Planar YUV with 4x4 chroma subsampling (YVU9 sampling).
    #[default]
    Yuv410,
    /// Packed 8-bit R, G, B, A.
    Rgba32,
}

/// A decoded picture in planar 4:1:0 form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct YuvFrame {
    pub width:         usize,
    pub height:        usize,
    pub chroma_width:  usize,
    pub chroma_height: usize,
    pub y:     Vec<u8>,
    pub u:     Vec<u8>,
    pub v:     Vec<u8>,
    /// Per-pixel opacity, present for transparent Indeo4 streams.
    pub alpha: Option<Vec<u8>>,
}

impl YuvFrame {
    pub fn new(width: usize, height: usize, chroma_width: usize, chroma_height: usize) -> Self {
        YuvFrame {
            width,
            height,
            chroma_width,
            chroma_height,
            y: vec![0; width * height],
            u: vec![128; chroma_width * chroma_height],
            v: vec![128; chroma_width * chroma_height],
            alpha: None,
        }
    }

    /// Y, U and V planes back to back.
    pub fn to_planar_u8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.y.len() + self.u.len() + self.v.len());
        out.extend_from_slice(&self.y);
        out.extend_from_slice(&self.u);
        out.extend_from_slice(&self.v);
        out
    }

    /// Convert to packed RGBA (ITU-R BT.601, studio range).
    pub fn to_rgba(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.width * self.height * 4];
        if self.chroma_width == 0 || self.chroma_height == 0 {
            return out;
        }
        for y in 0..self.height {
            let cy = (y >> 2).min(self.chroma_height - 1);
            for x in 0..self.width {
                let cx = (x >> 2).min(self.chroma_width - 1);
                let (r, g, b) = yuv_to_rgb(
                    self.y[y * self.width + x],
                    self.u[cy * self.chroma_width + cx],
                    self.v[cy * self.chroma_width + cx],
                );
                let a = self.alpha.as_ref().map_or(255, |a| a[y * self.width + x]);
                let o = (y * self.width + x) * 4;
                out[o..o + 4].copy_from_slice(&[r, g, b, a]);
            }
        }
        out
    }
}

#[inline]
fn clip_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Integer BT.601 conversion with 8 fractional bits.
#[inline]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let c = 298 * (y as i32 - 16);
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    (
        clip_u8((c + 409 * e + 128) >> 8),
        clip_u8((c - 100 * d - 208 * e + 128) >> 8),
        clip_u8((c + 516 * d + 128) >> 8),
    )
}

/// Output of [`Codec::decode_frame`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Surface {
    pub width:  usize,
    pub height: usize,
    pub format: PixelFormat,
    pub frame:  YuvFrame,
    /// Packed pixels for [`PixelFormat::Rgba32`], empty otherwise.
    pub rgba:   Vec<u8>,
}

impl Surface {
    pub fn from_frame(frame: YuvFrame, format: PixelFormat) -> Self {
        let rgba = match format {
            PixelFormat::Rgba32 => frame.to_rgba(),
            PixelFormat::Yuv410 => Vec::new(),
        };
        Surface { width: frame.width, height: frame.height, format, frame, rgba }
    }

    /// Bytes per row of the packed representation.
    pub fn pitch(&self) -> usize {
        match self.format {
            PixelFormat::Rgba32 => self.width * 4,
            PixelFormat::Yuv410 => self.width,
        }
    }
}

/// A frame-at-a-time video decoder.
pub trait Codec {
    /// Decode one compressed frame. Null frames return the previous picture.
    fn decode_frame(&mut self, data: &[u8]) -> Result<&Surface>;

    fn pixel_format(&self) -> PixelFormat;
}
