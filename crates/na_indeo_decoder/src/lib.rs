//! Intel Indeo Video Interactive 4 and 5 decoding library.
//!
//! Each call to [`Codec::decode_frame`] takes one compressed frame and
//! returns the reconstructed picture as 4:1:0 YUV or packed RGBA.

pub mod bitreader;
pub mod bufswitch;
pub mod config;
pub mod decoder;
pub mod dsp;
pub mod error;
pub mod huffman;
pub mod output;
pub mod plane;
pub mod tables;
pub mod vlc;

pub mod indeo4;
pub mod indeo5;

pub mod api;

pub use api::{Codec, PixelFormat, Surface, YuvFrame};
pub use bufswitch::FrameType;
pub use config::DecoderConfig;
pub use decoder::IndeoDecoder;
pub use error::{DecoderError, Result};
pub use indeo4::{Indeo4Decoder, Indeo4Format};
pub use indeo5::{Indeo5Decoder, Indeo5Format};
