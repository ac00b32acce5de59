//! Little-endian integer encoding over byte slices.
//!
//! Every read and write is bounds checked by the slice indexing, so a bad
//! position panics instead of touching memory outside the buffer.

/// Decode a `u16` stored at `offset`.
#[inline(always)]
pub fn decode_u16(buf: &[u8], offset: usize) -> u16 {
    let mut b = [0u8; 2];
    b.copy_from_slice(&buf[offset..offset + 2]);
    u16::from_le_bytes(b)
}

/// Decode a `u32` stored at `offset`.
#[inline(always)]
pub fn decode_u32(buf: &[u8], offset: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(b)
}

/// Decode a `u64` stored at `offset`.
#[inline(always)]
pub fn decode_u64(buf: &[u8], offset: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(b)
}

/// Encode a `u16` at `offset`.
#[inline(always)]
pub fn encode_u16(buf: &mut [u8], offset: usize, v: u16) {
    buf[offset..offset + 2].copy_from_slice(&v.to_le_bytes());
}

/// Encode a `u32` at `offset`.
#[inline(always)]
pub fn encode_u32(buf: &mut [u8], offset: usize, v: u32) {
    buf[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
}

/// Encode a `u64` at `offset`.
#[inline(always)]
pub fn encode_u64(buf: &mut [u8], offset: usize, v: u64) {
    buf[offset..offset + 8].copy_from_slice(&v.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn can_encode_and_decode_u16(sut: u16) -> bool {
        let mut target = [0u8; 4];
        encode_u16(&mut target, 1, sut);
        decode_u16(&target, 1) == sut
    }

    #[quickcheck]
    fn can_encode_and_decode_u64(sut: u64) -> bool {
        let mut target = [0u8; 12];
        encode_u64(&mut target, 3, sut);
        decode_u64(&target, 3) == sut
    }

    #[test]
    fn encoding_is_little_endian() {
        let mut target = [0u8; 4];
        encode_u32(&mut target, 0, 0xBADC0DE);
        assert_eq!(target, [0xDE, 0xC0, 0xAD, 0x0B]);
        assert_eq!(decode_u32(&target, 0), 0xBADC0DE);
    }

    #[test]
    #[should_panic]
    fn out_of_range_read_panics() {
        let target = [0u8; 4];
        decode_u64(&target, 0);
    }
}
