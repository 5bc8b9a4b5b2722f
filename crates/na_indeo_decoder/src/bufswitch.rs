/// Frame types and the buffer-role state machine.
///
/// Every band owns up to four sample buffers. Which one is written by the
/// current frame and which ones serve as references is decided from the
/// previous and current frame types only.

use crate::error::{invalid, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Generation {
    Indeo4,
    Indeo5,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FrameType {
    #[default]
    Intra,
    /// Indeo4 intra frame that does not start a new group.
    Intra1,
    Inter,
    /// Indeo4 bidirectional frame.
    Bidir,
    InterNoRef,
    /// Indeo5 inter frame of a scalable stream that only updates the
    /// high bands.
    InterScal,
    NullFirst,
    NullLast,
    /// Indeo5 null frame.
    Null,
}

impl FrameType {
    /// Indeo4 picture-header code (3 bits).
    pub fn from_indeo4(code: u32) -> Result<Self> {
        Ok(match code {
            0 => FrameType::Intra,
            1 => FrameType::Intra1,
            2 => FrameType::Inter,
            3 => FrameType::Bidir,
            4 => FrameType::InterNoRef,
            5 => FrameType::NullFirst,
            6 => FrameType::NullLast,
            _ => return invalid(format!("invalid frame type {}", code)),
        })
    }

    /// Indeo5 picture-header code (3 bits).
    pub fn from_indeo5(code: u32) -> Result<Self> {
        Ok(match code {
            0 => FrameType::Intra,
            1 => FrameType::Inter,
            2 => FrameType::InterScal,
            3 => FrameType::InterNoRef,
            4 => FrameType::Null,
            _ => return invalid(format!("invalid frame type {}", code)),
        })
    }

    pub fn is_null(self) -> bool {
        matches!(self, FrameType::NullFirst | FrameType::NullLast | FrameType::Null)
    }

    pub fn is_intra(self) -> bool {
        matches!(self, FrameType::Intra | FrameType::Intra1)
    }

    /// Indeo4 frames that later frames predict from.
    fn is_indeo4_ref(self) -> bool {
        matches!(self, FrameType::Intra | FrameType::Intra1 | FrameType::Inter)
    }
}

/// Buffer indices for the frame being decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferSlots {
    pub current:       usize,
    pub primary_ref:   usize,
    /// Indeo5 scalable inter frames swap through this slot.
    pub secondary_ref: usize,
    /// Indeo4 backward reference of bidirectional frames.
    pub bidir_ref:     usize,
    buf_switch:        usize,
    inter_scal:        bool,
}

impl BufferSlots {
    pub fn new(generation: Generation) -> Self {
        match generation {
            Generation::Indeo4 => BufferSlots {
                current: 0,
                primary_ref: 1,
                secondary_ref: 0,
                bidir_ref: 3,
                buf_switch: 0,
                inter_scal: false,
            },
            Generation::Indeo5 => BufferSlots {
                current: 0,
                primary_ref: 0,
                secondary_ref: 0,
                bidir_ref: 0,
                buf_switch: 0,
                inter_scal: false,
            },
        }
    }

    /// Buffer roles for a `cur` frame following a `prev` frame.
    #[must_use]
    pub fn advance(self, generation: Generation, prev: FrameType, cur: FrameType) -> Self {
        let mut s = self;
        match generation {
            Generation::Indeo4 => {
                let is_prev_ref = prev.is_indeo4_ref();
                let is_ref = cur.is_indeo4_ref();
                if is_prev_ref && is_ref {
                    std::mem::swap(&mut s.current, &mut s.primary_ref);
                } else if is_prev_ref {
                    std::mem::swap(&mut s.primary_ref, &mut s.bidir_ref);
                    std::mem::swap(&mut s.current, &mut s.primary_ref);
                }
            }
            Generation::Indeo5 => {
                match prev {
                    FrameType::Intra | FrameType::Inter => {
                        s.buf_switch ^= 1;
                        s.current = s.buf_switch;
                        s.primary_ref = s.buf_switch ^ 1;
                    }
                    FrameType::InterScal => {
                        if !s.inter_scal {
                            s.secondary_ref = 2;
                            s.inter_scal = true;
                        }
                        std::mem::swap(&mut s.current, &mut s.secondary_ref);
                        s.primary_ref = s.secondary_ref;
                    }
                    _ => {}
                }
                match cur {
                    FrameType::Intra | FrameType::Inter => {
                        if cur == FrameType::Intra {
                            s.buf_switch = 0;
                        }
                        s.inter_scal = false;
                        s.current = s.buf_switch;
                        s.primary_ref = s.buf_switch ^ 1;
                    }
                    _ => {}
                }
            }
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(generation: Generation, types: &[FrameType]) -> Vec<(usize, usize)> {
        let mut slots = BufferSlots::new(generation);
        let mut prev = FrameType::Intra;
        types
            .iter()
            .map(|&ft| {
                slots = slots.advance(generation, prev, ft);
                prev = ft;
                (slots.current, slots.primary_ref)
            })
            .collect()
    }

    #[test]
    fn test_indeo5_rotation() {
        use FrameType::*;
        let got = run(Generation::Indeo5, &[Intra, Inter, Inter, InterScal, InterNoRef, Inter]);
        assert_eq!(got, vec![(0, 1), (1, 0), (0, 1), (1, 0), (2, 1), (1, 0)]);
    }

    #[test]
    fn test_indeo4_reference_chain() {
        use FrameType::*;
        let got = run(Generation::Indeo4, &[Intra, Inter, Inter]);
        assert_eq!(got, vec![(1, 0), (0, 1), (1, 0)]);
    }

    #[test]
    fn test_indeo4_bidir_keeps_both_references() {
        use FrameType::*;
        let mut slots = BufferSlots::new(Generation::Indeo4);
        slots = slots.advance(Generation::Indeo4, Intra, Intra);
        let intra_buf = slots.current;
        slots = slots.advance(Generation::Indeo4, Intra, Inter);
        let inter_buf = slots.current;
        slots = slots.advance(Generation::Indeo4, Inter, Bidir);
        // Bidirectional frames predict from the last two reference frames.
        assert_eq!(slots.primary_ref, inter_buf);
        assert_eq!(slots.bidir_ref, intra_buf);
        assert_ne!(slots.current, inter_buf);
        assert_ne!(slots.current, intra_buf);
    }

    #[test]
    fn test_frame_type_codes() {
        assert_eq!(FrameType::from_indeo4(3).unwrap(), FrameType::Bidir);
        assert!(FrameType::from_indeo4(7).is_err());
        assert_eq!(FrameType::from_indeo5(2).unwrap(), FrameType::InterScal);
        assert!(FrameType::from_indeo5(5).is_err());
        assert!(FrameType::NullLast.is_null());
        assert!(FrameType::Intra1.is_intra());
    }
}
