use crate::api::PixelFormat;

/// Decoder options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecoderConfig {
    pub pixel_format: PixelFormat,
    /// Return the last good picture instead of an error when a frame fails.
    pub conceal_errors: bool,
    /// Fill the alpha channel from the Indeo4 transparency band.
    pub apply_transparency: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        DecoderConfig {
            pixel_format: PixelFormat::Yuv410,
            conceal_errors: false,
            apply_transparency: true,
        }
    }
}

impl DecoderConfig {
    pub fn with_pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = format;
        self
    }

    pub fn with_conceal_errors(mut self, conceal: bool) -> Self {
        self.conceal_errors = conceal;
        self
    }

    pub fn with_transparency(mut self, apply: bool) -> Self {
        self.apply_transparency = apply;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let cfg = DecoderConfig::default()
            .with_pixel_format(PixelFormat::Rgba32)
            .with_conceal_errors(true)
            .with_transparency(false);
        assert_eq!(cfg.pixel_format, PixelFormat::Rgba32);
        assert!(cfg.conceal_errors);
        assert!(!cfg.apply_transparency);
    }
}
