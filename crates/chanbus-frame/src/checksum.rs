//! Fletcher-16 checksum.

/// Largest run of bytes that can be summed before the running sums must be
/// reduced modulo 255 to stay clear of overflow.
const BLOCK_LEN: usize = 5802;

/// Incremental Fletcher-16 state.
#[derive(Debug, Default, Clone, Copy)]
pub struct Fletcher16 {
    c0: u32,
    c1: u32,
}

impl Fletcher16 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed more bytes into the running checksum.
    pub fn update(&mut self, data: &[u8]) {
        for block in data.chunks(BLOCK_LEN) {
            for &byte in block {
                self.c0 += u32::from(byte);
                self.c1 += self.c0;
            }
            self.c0 %= 255;
            self.c1 %= 255;
        }
    }

    pub fn finish(&self) -> u16 {
        ((self.c1 << 8) | self.c0) as u16
    }
}

/// One-shot Fletcher-16 over `data`.
pub fn fletcher16(data: &[u8]) -> u16 {
    let mut sum = Fletcher16::new();
    sum.update(data);
    sum.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vectors() {
        assert_eq!(fletcher16(b"abcde"), 0xC8F0);
        assert_eq!(fletcher16(b"abcdef"), 0x2057);
        assert_eq!(fletcher16(b"abcdefgh"), 0x0627);
    }

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(fletcher16(&[]), 0);
    }

    #[test]
    fn incremental_matches_one_shot() {
        let data: Vec<u8> = (0..20_000u32).map(|i| (i * 31 % 251) as u8).collect();
        let mut sum = Fletcher16::new();
        for chunk in data.chunks(777) {
            sum.update(chunk);
        }
        assert_eq!(sum.finish(), fletcher16(&data));
    }

    #[test]
    fn detects_single_byte_change() {
        let mut data = b"channel-and-payload".to_vec();
        let before = fletcher16(&data);
        data[4] ^= 0x01;
        assert_ne!(before, fletcher16(&data));
    }
}
