//! Frame checksums.
//!
//! The Soladin family trails every frame with a single-byte additive checksum: the low 8
//! bits of the sum of all preceding bytes. Both vendors call their trailer a "CRC" but
//! only the BLS family (Modbus RTU) actually uses a polynomial CRC, CRC-16/MODBUS sent
//! low byte first. The two are not interchangeable on the wire.

use crc::{Crc, CRC_16_MODBUS};

/// Sum of all bytes, truncated to 8 bits.
pub fn additive_sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Checksum of a frame whose last byte is the checksum slot.
///
/// The slot itself is excluded, so this can be called on a frame with a placeholder
/// trailer or on a received frame. An empty frame has checksum `0`.
pub fn checksum(frame: &[u8]) -> u8 {
    match frame.split_last() {
        Some((_, body)) => additive_sum(body),
        None => 0,
    }
}

/// Whether the last byte of `frame` is the additive checksum of the rest.
pub fn validate(frame: &[u8]) -> bool {
    match frame.split_last() {
        Some((last, body)) => additive_sum(body) == *last,
        None => false,
    }
}

/// Append the additive checksum of `body` to it.
///
/// Hands the checksum back as the error when the buffer has no room left.
pub fn append_checksum<const L: usize>(body: &mut heapless::Vec<u8, L>) -> Result<(), u8> {
    let sum = additive_sum(body);
    body.push(sum)
}

const CRC_MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// CRC-16/MODBUS over `body`, as sent low byte first in a BLS frame trailer.
///
/// Frames are built and validated by `rmodbus`; this is only needed to report what a
/// rejected frame should have carried.
pub fn crc16(body: &[u8]) -> u16 {
    CRC_MODBUS.checksum(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_checksum_excludes_last_byte() {
        // Soladin stats request, checksum C7.
        let frame = [0x11, 0x00, 0x00, 0x00, 0xB6, 0x00, 0x00, 0x00, 0xC7];
        assert_eq!(checksum(&frame), 0xC7);
        assert!(validate(&frame));
    }

    #[test]
    fn test_checksum_wraps() {
        // Discovery reply from a Soladin at 11 00: 11 + C1 + F3 = 0x1C5.
        let frame = [0x00, 0x00, 0x11, 0x00, 0xC1, 0xF3, 0x00, 0x00, 0xC5];
        assert!(validate(&frame));
    }

    #[test]
    fn test_validate_empty_and_single() {
        assert!(!validate(&[]));
        // A lone zero byte is its own (empty) body's checksum.
        assert!(validate(&[0x00]));
        assert!(!validate(&[0x01]));
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn test_append_checksum() {
        let mut frame: heapless::Vec<u8, 16> = heapless::Vec::new();
        frame
            .extend_from_slice(&[0x11, 0x00, 0x00, 0x00, 0xB9, 0x00, 0x00, 0x00])
            .unwrap();
        append_checksum(&mut frame).unwrap();
        assert_eq!(frame.last(), Some(&0xCA));
        assert!(validate(&frame));
    }

    #[test]
    fn test_append_checksum_full_buffer() {
        let mut frame: heapless::Vec<u8, 2> = heapless::Vec::new();
        frame.extend_from_slice(&[0x01, 0x02]).unwrap();
        assert!(append_checksum(&mut frame).is_err());
    }

    #[test]
    fn test_crc16_known_frames() {
        // Bus query request, bus query reply and the BLS telemetry request.
        assert_eq!(crc16(&[0xFF, 0x03, 0x00, 0x3C, 0x00, 0x01]), 0xD851);
        assert_eq!(crc16(&[0xFF, 0x03, 0x02, 0x00, 0x02]), 0x5110);
        assert_eq!(crc16(&[0x02, 0x04, 0x00, 0x0A, 0x00, 0x1F]), 0xF391);
        assert_eq!(crc16(&[]), 0xFFFF);
    }

    #[test]
    fn test_crc16_long_body() {
        // Longer than a u8 can count; the whole body still takes part.
        let body = [0x5Au8; 300];
        assert_ne!(crc16(&body), crc16(&body[..300 - 256]));
        assert_ne!(crc16(&body), crc16(&body[..299]));
    }

    #[test]
    fn test_single_bit_flips_are_detected() {
        // An additive checksum has blind spots for multi-bit errors, but a single flipped
        // bit always shifts the sum by a power of two. We only ask for 99% so that the
        // check stays meaningful if the frame under test changes.
        let frame = [0x11, 0x00, 0x00, 0x00, 0xB6, 0x00, 0x00, 0x00, 0xC7];
        let mut total = 0;
        let mut detected = 0;
        for byte in 0..frame.len() {
            for bit in 0..8 {
                let mut corrupted = frame;
                corrupted[byte] ^= 1 << bit;
                total += 1;
                if !validate(&corrupted) {
                    detected += 1;
                }
            }
        }
        assert!(detected * 100 >= total * 99);
    }

    proptest! {
        #[test]
        fn prop_appended_checksum_validates(body in proptest::collection::vec(any::<u8>(), 0..64)) {
            let mut frame: heapless::Vec<u8, 80> = heapless::Vec::new();
            frame.extend_from_slice(&body).unwrap();
            append_checksum(&mut frame).unwrap();
            prop_assert!(validate(&frame));
        }

        #[test]
        fn prop_single_bit_flip_breaks_checksum(
            body in proptest::collection::vec(any::<u8>(), 1..64),
            position in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let mut frame: heapless::Vec<u8, 80> = heapless::Vec::new();
            frame.extend_from_slice(&body).unwrap();
            append_checksum(&mut frame).unwrap();
            let idx = position.index(frame.len());
            frame[idx] ^= 1 << bit;
            prop_assert!(!validate(&frame));
        }
    }
}
