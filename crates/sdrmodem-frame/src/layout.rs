//! Packet fragmentation and DMA buffer footprint arithmetic.

use crate::error::{FrameError, Result};
use crate::{
    DEFAULT_MTU, FRAME_HEADER_SIZE, LENGTH_WORD_SIZE, MAX_MTU, MIN_MTU, MTU_ALIGN, PAYLOAD_ALIGN,
    RESERVED_PAD,
};

/// Round `n` up to a multiple of `align` (a power of two)
#[inline]
#[must_use]
pub const fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

/// Bring an MTU into `[MIN_MTU, MAX_MTU]` and down to the MTU alignment.
///
/// Zero or out-of-range values are replaced by [`DEFAULT_MTU`].
#[must_use]
pub fn normalize_mtu(mtu: usize) -> usize {
    let mtu = if (MIN_MTU..=MAX_MTU).contains(&mtu) {
        mtu
    } else {
        DEFAULT_MTU
    };
    mtu & !(MTU_ALIGN - 1)
}

/// Encoded size of one frame carrying `payload_len` bytes: header, payload
/// padded to 8 bytes, reserved pad
#[must_use]
pub const fn encoded_len(payload_len: usize) -> usize {
    FRAME_HEADER_SIZE + align_up(payload_len, PAYLOAD_ALIGN) + RESERVED_PAD
}

/// Largest encoded frame at `mtu`
#[must_use]
pub const fn frame_footprint(mtu: usize) -> usize {
    encoded_len(mtu)
}

/// Largest TX record at `mtu`: length word followed by the encoded frame
#[must_use]
pub const fn tx_frame_footprint(mtu: usize) -> usize {
    LENGTH_WORD_SIZE + frame_footprint(mtu)
}

/// One fragment of a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    /// Zero-based frame index
    pub frame_id: u32,
    /// Offset of the fragment in the packet
    pub offset: usize,
    /// Fragment length in bytes
    pub len: usize,
}

/// Split of one packet into MTU-sized frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketLayout {
    /// Packet size in bytes
    pub pack_sz: usize,
    /// Payload bytes per frame
    pub mtu: usize,
    /// Number of frames
    pub num_frames: usize,
}

impl PacketLayout {
    /// Lay out a packet of `pack_sz` bytes at `mtu`
    ///
    /// # Errors
    ///
    /// Returns `FrameError::InvalidMtu` if `mtu` is zero or does not fit the header field.
    pub fn new(pack_sz: usize, mtu: usize) -> Result<Self> {
        if mtu == 0 || u32::try_from(mtu).is_err() {
            return Err(FrameError::InvalidMtu(mtu));
        }
        Ok(Self {
            pack_sz,
            mtu,
            num_frames: pack_sz.div_ceil(mtu),
        })
    }

    /// Payload size of frame `frame_id`
    #[must_use]
    pub fn frame_len(&self, frame_id: usize) -> usize {
        let start = frame_id * self.mtu;
        self.pack_sz.saturating_sub(start).min(self.mtu)
    }

    /// Payload size of the last frame
    #[must_use]
    pub fn last_frame_len(&self) -> usize {
        match self.num_frames {
            0 => 0,
            n => self.frame_len(n - 1),
        }
    }

    /// Fragments in frame order
    pub fn fragments(&self) -> impl Iterator<Item = Fragment> + '_ {
        (0..self.num_frames).map(move |i| Fragment {
            frame_id: i as u32,
            offset: i * self.mtu,
            len: self.frame_len(i),
        })
    }

    /// DMA buffer bytes needed to stage every TX record of the packet at full MTU
    #[must_use]
    pub fn tx_footprint(&self) -> usize {
        self.num_frames * tx_frame_footprint(self.mtu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_mtu() {
        assert_eq!(normalize_mtu(0), DEFAULT_MTU);
        assert_eq!(normalize_mtu(MIN_MTU - 1), DEFAULT_MTU);
        assert_eq!(normalize_mtu(MAX_MTU + 1), DEFAULT_MTU);
        assert_eq!(normalize_mtu(256), 256);
        assert_eq!(normalize_mtu(259), 256);
        assert_eq!(normalize_mtu(MAX_MTU), MAX_MTU);
        assert_eq!(DEFAULT_MTU % MTU_ALIGN, 0);
    }

    #[test]
    fn test_footprints() {
        assert_eq!(encoded_len(0), 48);
        assert_eq!(encoded_len(1), 56);
        assert_eq!(encoded_len(88), 32 + 88 + 16);
        assert_eq!(tx_frame_footprint(256), 8 + 32 + 256 + 16);
        assert_eq!(tx_frame_footprint(MAX_MTU), 8192);
        assert_eq!(frame_footprint(DEFAULT_MTU), 4096);
    }

    #[test]
    fn test_600_bytes_at_256() {
        let layout = PacketLayout::new(600, 256).unwrap();
        assert_eq!(layout.num_frames, 3);
        let lens: Vec<_> = layout.fragments().map(|f| f.len).collect();
        assert_eq!(lens, [256, 256, 88]);
        assert_eq!(layout.last_frame_len(), 88);
        assert_eq!(layout.fragments().nth(2).unwrap().offset, 512);
    }

    #[test]
    fn test_empty_packet() {
        let layout = PacketLayout::new(0, 256).unwrap();
        assert_eq!(layout.num_frames, 0);
        assert_eq!(layout.last_frame_len(), 0);
        assert_eq!(layout.fragments().count(), 0);
    }

    #[test]
    fn test_invalid_mtu() {
        assert_eq!(PacketLayout::new(10, 0), Err(FrameError::InvalidMtu(0)));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn fragmentation_covers_packet(n in 1usize..200_000, mtu in 1usize..9000) {
                let layout = PacketLayout::new(n, mtu).unwrap();
                prop_assert_eq!(layout.num_frames, n.div_ceil(mtu));
                prop_assert_eq!(layout.last_frame_len(), n - mtu * (layout.num_frames - 1));

                let mut next = 0;
                for fragment in layout.fragments() {
                    prop_assert_eq!(fragment.offset, next);
                    prop_assert!(fragment.len > 0 && fragment.len <= mtu);
                    next += fragment.len;
                }
                prop_assert_eq!(next, n);
            }

            #[test]
            fn normalized_mtu_in_range(mtu: usize) {
                let normalized = normalize_mtu(mtu);
                prop_assert!((MIN_MTU..=MAX_MTU).contains(&normalized));
                prop_assert_eq!(normalized % MTU_ALIGN, 0);
            }
        }
    }
}
