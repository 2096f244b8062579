//! Inserted disk images.

use flate2::Crc;

/// A disk image as the drive sees it: raw bytes plus the identity a
/// snapshot records.
#[derive(Clone)]
pub struct DiskImage {
    name: String,
    data: Vec<u8>,
    crc32: u32,
}

impl DiskImage {
    #[must_use]
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        let mut crc = Crc::new();
        crc.update(&data);
        Self {
            name: name.into(),
            crc32: crc.sum(),
            data,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    /// Bit `bit` of the raw stream for `track`, wrapping around the image.
    #[must_use]
    pub fn bit(&self, track: u32, bit: u32, track_bytes: u32) -> u8 {
        if self.data.is_empty() {
            return 0;
        }
        let byte = (u64::from(track) * u64::from(track_bytes) + u64::from(bit / 8))
            % self.data.len() as u64;
        (self.data[byte as usize] >> (7 - (bit % 8))) & 1
    }
}

impl std::fmt::Debug for DiskImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskImage")
            .field("name", &self.name)
            .field("len", &self.data.len())
            .field("crc32", &format_args!("{:08X}", self.crc32))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_matches_standard_check_value() {
        let img = DiskImage::new("check", b"123456789".to_vec());
        assert_eq!(img.crc32(), 0xCBF4_3926);
    }

    #[test]
    fn bits_are_msb_first() {
        let img = DiskImage::new("bits", vec![0b1000_0001, 0xFF]);
        assert_eq!(img.bit(0, 0, 2), 1);
        assert_eq!(img.bit(0, 1, 2), 0);
        assert_eq!(img.bit(0, 7, 2), 1);
        assert_eq!(img.bit(0, 9, 2), 1);
    }

    #[test]
    fn empty_image_reads_zero() {
        let img = DiskImage::new("empty", Vec::new());
        assert_eq!(img.bit(3, 100, 12_668), 0);
    }
}
