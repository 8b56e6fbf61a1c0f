//! CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF, no reflection, no final xor).

const POLY: u16 = 0x1021;
const INIT: u16 = 0xffff;

const TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// CRC-16 over `data`
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(INIT, |crc, &byte| {
        (crc << 8) ^ TABLE[((crc >> 8) as u8 ^ byte) as usize]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(crc16(b"123456789"), 0x29b1);
    }

    #[test]
    fn test_empty_is_init() {
        assert_eq!(crc16(&[]), 0xffff);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn single_bit_flip_detected(
                data in proptest::collection::vec(any::<u8>(), 1..2048),
                bit in any::<prop::sample::Index>(),
            ) {
                let mut flipped = data.clone();
                let bit = bit.index(data.len() * 8);
                flipped[bit / 8] ^= 1 << (bit % 8);
                prop_assert_ne!(crc16(&data), crc16(&flipped));
            }
        }
    }
}
