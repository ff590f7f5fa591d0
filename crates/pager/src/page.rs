//! Page header stamping and checksum verification (§3.3): the first 12
//! bytes of every non-zero page, covering the remaining 4084 bytes with a
//! CRC-32.

use common::{crc, endian, DbError, DbResult};
use types::PAGE_SIZE;

const OFF_PAGE_NUM: usize = 0;
const OFF_PAGE_TYPE: usize = 4;
const OFF_CHECKSUM: usize = 8;
pub const PAGE_HEADER_SIZE: usize = types::PAGE_HEADER_SIZE;

/// Stamp `buf`'s page-number and checksum fields in place. The caller must
/// already have placed the correct page_type byte (offset 4) in the buffer;
/// this function does not touch it.
pub fn stamp(buf: &mut [u8; PAGE_SIZE], page_num: u32) {
    endian::write_u32(buf, OFF_PAGE_NUM, page_num);
    let checksum = crc::checksum(&buf[PAGE_HEADER_SIZE..]);
    endian::write_u32(buf, OFF_CHECKSUM, checksum);
}

/// Verify that `buf`'s stored page_num matches `expected` and its checksum
/// matches the computed CRC of the body (§3.3's read-time invariant).
pub fn verify(buf: &[u8; PAGE_SIZE], expected: u32) -> DbResult<()> {
    let stored_num = endian::read_u32(buf, OFF_PAGE_NUM);
    if stored_num != expected {
        return Err(DbError::corrupt(format!(
            "page {expected}: stored page_num {stored_num} does not match"
        )));
    }
    let stored_checksum = endian::read_u32(buf, OFF_CHECKSUM);
    let computed = crc::checksum(&buf[PAGE_HEADER_SIZE..]);
    if stored_checksum != computed {
        return Err(DbError::corrupt(format!(
            "page {expected}: checksum mismatch (stored {stored_checksum:#x}, computed {computed:#x})"
        )));
    }
    Ok(())
}

pub fn page_type(buf: &[u8; PAGE_SIZE]) -> u8 {
    buf[OFF_PAGE_TYPE]
}

pub fn set_page_type(buf: &mut [u8; PAGE_SIZE], page_type: types::PageType) {
    buf[OFF_PAGE_TYPE] = page_type as u8;
}
