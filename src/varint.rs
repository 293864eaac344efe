use crate::MspErr;

const SEGMENT_BITS: u32 = 0x7F;
const CHECKER_BIT: u8 = 0x80;
const MAX_VARINT_LEN: usize = 5;

/// Encode the given number as a [VarInt](https://wiki.vg/Protocol#VarInt_and_VarLong).
pub fn encode_varint(num: i32) -> Vec<u8> {
    // Why do we need to cast `num` to the u32 type?
    //
    // The protocol documentation mentions: "negative values always use the maximum number of bytes."
    // This indicates that encoding negative numbers actually encodes the value corresponding
    // to its two's complement representation.
    let mut num = num as u32;
    let mut result = Vec::<u8>::with_capacity(MAX_VARINT_LEN);

    loop {
        if (num & (!SEGMENT_BITS)) == 0 {
            result.push(num as u8);

            return result;
        }

        result.push(((num & SEGMENT_BITS) | (!SEGMENT_BITS)) as u8);
        num >>= 7;
    }
}

/// Number of bytes [encode_varint] produces for `num`.
pub fn varint_size(num: i32) -> usize {
    let num = num as u32;

    match num {
        0 => 1,
        n => (32 - n.leading_zeros() as usize).div_ceil(7),
    }
}

/// Decode a VarInt from the front of `bufs`.
///
/// Returns the value and how many bytes it occupied. A VarInt cut short by the end of
/// `bufs` is a [MspErr::BufferUnderflow], so stream readers can wait for more data.
pub fn decode_varint(bufs: &[u8]) -> Result<(i32, usize), MspErr> {
    let mut result = 0i32;

    for i in 0..MAX_VARINT_LEN {
        let Some(&buf) = bufs.get(i) else {
            return Err(MspErr::BufferUnderflow {
                needed: i + 1,
                available: bufs.len(),
            });
        };

        result |= ((buf as u32 & SEGMENT_BITS) << (i * 7)) as i32;

        if buf & CHECKER_BIT == 0 {
            return Ok((result, i + 1));
        }
    }

    Err(MspErr::VarIntTooLarge)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_wiki_samples() {
        assert_eq!(encode_varint(0), vec![0x00]);
        assert_eq!(encode_varint(127), vec![0x7F]);
        assert_eq!(encode_varint(128), vec![0x80, 0x01]);
        assert_eq!(encode_varint(25565), vec![0xDD, 0xC7, 0x01]);
        assert_eq!(encode_varint(2147483647), vec![0xFF, 0xFF, 0xFF, 0xFF, 0x07]);
        assert_eq!(encode_varint(-1), vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
    }

    #[test]
    fn round_trips_and_sizes() {
        for num in [0, 1, 127, 128, 255, 16383, 16384, 2097151, 2097152, i32::MAX, -1, i32::MIN] {
            let bufs = encode_varint(num);

            assert_eq!(decode_varint(&bufs).unwrap(), (num, bufs.len()));
            assert_eq!(varint_size(num), bufs.len());
        }
    }

    #[test]
    fn size_follows_bit_length() {
        assert_eq!(varint_size(127), 1);
        assert_eq!(varint_size(128), 2);
        assert_eq!(varint_size(16384), 3);
        assert_eq!(varint_size(-1), 5);
    }

    #[test]
    fn rejects_six_byte_varint() {
        let bufs = [0x80, 0x80, 0x80, 0x80, 0x80, 0x01];

        assert!(matches!(decode_varint(&bufs), Err(MspErr::VarIntTooLarge)));
    }

    #[test]
    fn truncated_varint_underflows() {
        assert!(matches!(
            decode_varint(&[0x80, 0x80]),
            Err(MspErr::BufferUnderflow { needed: 3, available: 2 })
        ));
        assert!(matches!(
            decode_varint(&[]),
            Err(MspErr::BufferUnderflow { needed: 1, available: 0 })
        ));
    }
}
