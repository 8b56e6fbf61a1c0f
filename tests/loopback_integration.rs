//! TX -> simulated radio -> RX round trips
//!
//! Tests for:
//! - Staged packets (a single DMA transfer)
//! - Streamed packets with throttling and an end-of-burst marker
//! - Consecutive packets at different MTUs
//! - The largest packet the TX buffer accepts
//! - Link statistics on both sides

use sdrmodem_frame::{DEFAULT_MTU, FRAME_HEADER_SIZE, FrameHeader, LENGTH_WORD_SIZE};
use sdrmodem_integration_tests::{Radio, pattern};

/// Split a TX burst into its length-prefixed frame records
fn records(burst: &[u8]) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos + LENGTH_WORD_SIZE <= burst.len() {
        let word: [u8; 8] = burst[pos..pos + LENGTH_WORD_SIZE].try_into().unwrap();
        let len = u64::from_le_bytes(word) as usize;
        if len == 0 {
            break;
        }
        out.push(burst[pos + LENGTH_WORD_SIZE..pos + LENGTH_WORD_SIZE + len].to_vec());
        pos += LENGTH_WORD_SIZE + len;
    }
    out
}

#[test]
fn test_600_bytes_at_mtu_256() {
    let mut radio = Radio::new();
    radio.tx.set_mtu(256).unwrap();
    let data = pattern(600, 1);

    assert_eq!(radio.tx.write(&data).unwrap(), 600);

    // Staged in one transfer: three frames of 256, 256 and 88 bytes
    assert_eq!(radio.tx_dmac.transfers(), 1);
    let bursts = radio.link.take_bursts();
    let sizes: Vec<u32> = records(&bursts[0])
        .iter()
        .map(|frame| FrameHeader::decode(frame).unwrap().frame_sz)
        .collect();
    assert_eq!(sizes, [256, 256, 88]);

    let (packet, report) = radio.receive_packet().unwrap();
    assert_eq!(packet, data);
    assert_eq!(report.valid_bytes, 600);
    assert_eq!(report.frames, 3);
    assert_eq!(radio.rx.frames_received(), 3);
}

#[test]
fn test_single_byte_packet() {
    let mut radio = Radio::new();
    radio.tx.write(&[0xa5]).unwrap();

    let (packet, report) = radio.receive_packet().unwrap();
    assert_eq!(packet, [0xa5]);
    assert_eq!(report.valid_bytes, 1);
}

#[test]
fn test_empty_packet_sends_nothing() {
    let mut radio = Radio::new();
    assert_eq!(radio.tx.write(&[]).unwrap(), 0);
    assert_eq!(radio.tx_dmac.transfers(), 0);
    assert_eq!(radio.link.pending(), 0);
}

#[test]
fn test_streamed_packet() {
    let mut radio = Radio::new();
    radio.tx.set_mtu(128).unwrap();
    let data = pattern(20 * 128 - 7, 2);

    radio.tx.write(&data).unwrap();

    // One transfer per frame plus the end-of-burst marker
    assert_eq!(radio.tx_dmac.transfers(), 21);
    let bursts = radio.link.take_bursts();
    let last = FrameHeader::decode(&records(bursts.last().unwrap())[0]).unwrap();
    assert!(last.is_end_of_burst());
    assert_eq!(last.num_frames, 20);

    let (packet, report) = radio.receive_packet().unwrap();
    assert_eq!(packet, data);
    assert_eq!(report.valid_bytes, data.len());
    assert_eq!(report.frames, 20);
}

#[test]
fn test_packet_after_streamed_packet() {
    let mut radio = Radio::new();
    radio.tx.set_mtu(64).unwrap();

    let first = pattern(64 * 9, 3);
    radio.tx.write(&first).unwrap();
    let (packet, _) = radio.receive_packet().unwrap();
    assert_eq!(packet, first);

    // The end-of-burst marker may still be queued; the next receive skips it
    let second = pattern(100, 4);
    radio.tx.write(&second).unwrap();
    let (packet, report) = radio.receive_packet().unwrap();
    assert_eq!(packet, second);
    assert_eq!(report.valid_bytes, 100);
}

#[test]
fn test_consecutive_packets_various_mtus() {
    let mut radio = Radio::new();
    let cases = [(64, 1), (256, 600), (1024, 3000), (0, 9000), (512, 512)];

    for (i, (mtu, len)) in cases.into_iter().enumerate() {
        radio.tx.set_mtu(mtu).unwrap();
        let data = pattern(len, i as u8);
        radio.tx.write(&data).unwrap();

        let (packet, report) = radio.receive_packet().unwrap();
        assert_eq!(packet, data, "packet {i} (mtu {mtu}, {len} bytes)");
        assert_eq!(report.valid_bytes, len);
    }
    assert_eq!(radio.tx.last_pack_id(), cases.len() as u32);
}

#[test]
fn test_default_mtu_large_packet() {
    let mut radio = Radio::new();
    assert_eq!(radio.tx.mtu(), DEFAULT_MTU);
    let data = pattern(40_000, 5);

    radio.tx.write(&data).unwrap();
    let (packet, report) = radio.receive_packet().unwrap();
    assert_eq!(packet, data);
    assert_eq!(report.frames, 40_000usize.div_ceil(DEFAULT_MTU));
}

#[test]
fn test_largest_packet() {
    let mut radio = Radio::new();
    radio.tx.set_mtu(1024).unwrap();
    let max = radio.tx.max_packet_size().unwrap();
    let data = pattern(max, 6);

    radio.tx.write(&data).unwrap();
    let (packet, report) = radio.receive_packet().unwrap();
    assert_eq!(packet.len(), max);
    assert_eq!(packet, data);
    assert_eq!(report.valid_bytes, max);
}

#[test]
fn test_statistics() {
    let mut radio = Radio::new();
    radio.tx.set_mtu(256).unwrap();
    radio.tx.write(&pattern(600, 7)).unwrap();
    radio.receive_packet().unwrap();

    let tx = radio.tx.stats();
    assert_eq!(tx.packets_sent, 1);
    assert_eq!(tx.frames_sent, 3);
    assert_eq!(tx.bytes_sent, 600);

    let rx = radio.rx.stats();
    assert_eq!(rx.packets_received, 1);
    assert!(rx.frames_received >= 3);
    assert_eq!(rx.bytes_received, 600);
    assert_eq!(rx.crc_failures, 0);
}

#[test]
fn test_frames_carry_header_and_padding() {
    let mut radio = Radio::new();
    radio.tx.set_mtu(64).unwrap();
    radio.tx.write(&pattern(10, 8)).unwrap();

    let bursts = radio.link.take_bursts();
    let frames = records(&bursts[0]);
    assert_eq!(frames.len(), 1);
    // header, payload padded to 8, reserved pad
    assert_eq!(frames[0].len(), FRAME_HEADER_SIZE + 16 + 16);
}
