//! Little-endian integer pack/unpack helpers (§2 "Endian + CRC32" row).
//!
//! Every on-disk struct in this engine (file header, page header, B+Tree
//! node, WAL record header) is laid out byte-exactly per spec, so fields are
//! packed and unpacked by hand with `to_le_bytes`/`from_le_bytes` rather than
//! through a generic serializer — mirroring the grounding repo's own
//! `raft::LogEntryHeader::to_bytes`/`from_bytes` pair.

pub fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}

pub fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn read_i32(buf: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}

pub fn write_i32(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn read_u64(buf: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(buf[offset..offset + 8].try_into().unwrap())
}

pub fn write_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

pub fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(buf[offset..offset + 2].try_into().unwrap())
}

pub fn write_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

/// Big-endian (file-order) read, used only for the two magic-number fields
/// (`FILE_MAGIC`, `WAL_MAGIC`) so their on-disk bytes spell the ASCII
/// signature the spec names literally (§6.1, §3.5), unlike every other
/// field in this engine which is little-endian.
pub fn read_u32_be(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes(buf[offset..offset + 4].try_into().unwrap())
}

pub fn write_u32_be(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u32_round_trips() {
        let mut buf = [0u8; 8];
        write_u32(&mut buf, 4, 0xDEAD_BEEF);
        assert_eq!(read_u32(&buf, 4), 0xDEAD_BEEF);
    }

    #[test]
    fn i32_round_trips_negative() {
        let mut buf = [0u8; 4];
        write_i32(&mut buf, 0, -42);
        assert_eq!(read_i32(&buf, 0), -42);
    }

    #[test]
    fn u64_round_trips() {
        let mut buf = [0u8; 8];
        write_u64(&mut buf, 0, u64::MAX - 1);
        assert_eq!(read_u64(&buf, 0), u64::MAX - 1);
    }

    #[test]
    fn is_little_endian_on_wire() {
        let mut buf = [0u8; 4];
        write_u32(&mut buf, 0, 1);
        assert_eq!(buf, [1, 0, 0, 0]);
    }

    #[test]
    fn u32_be_round_trips_and_is_big_endian_on_wire() {
        let mut buf = [0u8; 4];
        write_u32_be(&mut buf, 0, 0x416D_6944);
        assert_eq!(buf, *b"AmiD");
        assert_eq!(read_u32_be(&buf, 0), 0x416D_6944);
    }
}
