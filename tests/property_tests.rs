//! Property-based tests over the frame codec and the loopback radio

use proptest::prelude::*;
use sdrmodem_frame::{
    FRAME_HEADER_SIZE, FrameMeta, MAX_MTU, MIN_MTU, PacketLayout, decode_frame, encode_frame_vec,
    normalize_mtu,
};
use sdrmodem_integration_tests::Radio;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Fragment count and last-frame size follow from the packet size and MTU
    #[test]
    fn prop_fragmentation(pack_sz in 1usize..200_000, mtu in MIN_MTU..=MAX_MTU) {
        let mtu = normalize_mtu(mtu);
        let layout = PacketLayout::new(pack_sz, mtu).unwrap();

        prop_assert_eq!(layout.num_frames, pack_sz.div_ceil(mtu));
        prop_assert_eq!(layout.last_frame_len(), pack_sz - mtu * (layout.num_frames - 1));

        let fragments: Vec<_> = layout.fragments().collect();
        prop_assert_eq!(fragments.iter().map(|f| f.len).sum::<usize>(), pack_sz);
        prop_assert!(fragments.iter().all(|f| f.len > 0 && f.len <= mtu));
        prop_assert!(fragments.windows(2).all(|w| w[1].offset == w[0].offset + w[0].len));
    }

    /// Any single payload bit flip is detected by the frame CRC
    #[test]
    fn prop_crc_detects_bit_flip(
        payload in prop::collection::vec(any::<u8>(), 1..512),
        bit in any::<prop::sample::Index>(),
    ) {
        let meta = FrameMeta {
            pack_id: 1,
            pack_sz: payload.len() as u32,
            num_frames: 1,
            mtu: 512,
        };
        let mut frame = encode_frame_vec(&meta, 0, &payload).unwrap();
        prop_assert!(decode_frame(&frame).unwrap().crc.is_valid());

        let bit = bit.index(payload.len() * 8);
        frame[FRAME_HEADER_SIZE + bit / 8] ^= 1 << (bit % 8);
        prop_assert!(!decode_frame(&frame).unwrap().crc.is_valid());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// A packet written by the TX framer is read back unchanged by the RX reassembler
    #[test]
    fn prop_loopback_roundtrip(
        data in prop::collection::vec(any::<u8>(), 1..12_000),
        mtu in MIN_MTU..2048usize,
    ) {
        let mut radio = Radio::new();
        let mtu = radio.tx.set_mtu(mtu).unwrap();
        prop_assert!(data.len() <= radio.tx.max_packet_size().unwrap());

        prop_assert_eq!(radio.tx.write(&data).unwrap(), data.len());
        let (packet, report) = radio.receive_packet().unwrap();

        prop_assert_eq!(report.frames, data.len().div_ceil(mtu));
        prop_assert_eq!(report.valid_bytes, data.len());
        prop_assert_eq!(packet, data);
    }

    /// Flipping one payload bit in one frame costs exactly that frame's bytes
    #[test]
    fn prop_bit_flip_costs_one_frame(
        len in 200usize..3000,
        frame_pick in any::<prop::sample::Index>(),
        bit_pick in any::<prop::sample::Index>(),
    ) {
        let mut radio = Radio::new();
        let mtu = radio.tx.set_mtu(128).unwrap();
        let layout = PacketLayout::new(len, mtu).unwrap();

        let target = frame_pick.index(layout.num_frames);
        let target_len = layout.frame_len(target);
        let bit = bit_pick.index(target_len * 8);
        radio.link.set_tamper(move |index, frame| {
            if index == target as u64 {
                frame[FRAME_HEADER_SIZE + bit / 8] ^= 1 << (bit % 8);
            }
        });

        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        radio.tx.write(&data).unwrap();
        let (_, report) = radio.receive_packet().unwrap();

        prop_assert_eq!(report.valid_bytes, len - target_len);
        prop_assert_eq!(report.crc_failures, 1);
    }
}
