//! The schema-page wire format (§3.8, §6.4): byte-exact layout for the one
//! page an external SQL-catalog collaborator uses to describe a table, plus
//! the table-name hash that turns a name into the B+Tree key addressing it.
//!
//! Only the *layout* is in scope here, the same way `btree::node` owns a
//! node's bytes without knowing what a caller's keys mean: parsing a column's
//! type tag into a `SqlType`, enforcing uniqueness of primary keys, and
//! everything else that makes this a relational catalog belongs to the
//! external collaborator spec.md describes, not to this crate.

use common::endian;
use common::{crc, DbError, DbResult};
use types::PAGE_HEADER_SIZE;

/// Page body layout (§3.8). Bytes are relative to the start of the page
/// body, i.e. offset [`PAGE_HEADER_SIZE`] within the full page buffer.
pub const TABLE_NAME_SIZE: usize = 64;
pub const MAX_COLUMNS: usize = 32;
pub const COLUMN_NAME_SIZE: usize = 64;
/// name(64) + type(1) + is_primary_key(1) + not_null(1) + pad(1).
pub const COLUMN_RECORD_SIZE: usize = COLUMN_NAME_SIZE + 4;

const OFF_TABLE_NAME: usize = 0;
const OFF_COLUMN_COUNT: usize = TABLE_NAME_SIZE;
const OFF_COLUMNS: usize = OFF_COLUMN_COUNT + 4;
const COLUMNS_SIZE: usize = MAX_COLUMNS * COLUMN_RECORD_SIZE;
const OFF_PRIMARY_KEY_INDEX: usize = OFF_COLUMNS + COLUMNS_SIZE;
const OFF_BTREE_ROOT: usize = OFF_PRIMARY_KEY_INDEX + 4;
const OFF_NEXT_ROWID: usize = OFF_BTREE_ROOT + 4;
const OFF_ROW_COUNT: usize = OFF_NEXT_ROWID + 4;

/// Total body size a schema page occupies; must fit within one page's body
/// (`PAGE_SIZE - PAGE_HEADER_SIZE`).
pub const SCHEMA_PAGE_BODY_SIZE: usize = OFF_ROW_COUNT + 4;

/// Sentinel stored in `primary_key_index` when the table uses an implicit
/// row id rather than a declared primary key column.
pub const NO_PRIMARY_KEY: i32 = -1;

const fn body(offset: usize) -> usize {
    PAGE_HEADER_SIZE + offset
}

fn column_offset(i: usize) -> usize {
    OFF_COLUMNS + i * COLUMN_RECORD_SIZE
}

/// Zero out a fresh schema page's fields: no columns, no primary key, an
/// unassigned B+Tree root, row id counter starting at 1, zero rows.
pub fn init(buf: &mut [u8]) {
    buf[body(OFF_TABLE_NAME)..body(OFF_TABLE_NAME) + TABLE_NAME_SIZE].fill(0);
    set_column_count(buf, 0);
    for i in 0..MAX_COLUMNS {
        clear_column(buf, i);
    }
    set_primary_key_index(buf, NO_PRIMARY_KEY);
    set_btree_root(buf, 0);
    set_next_rowid(buf, 1);
    set_row_count(buf, 0);
}

fn read_padded_str(buf: &[u8], off: usize, len: usize) -> String {
    let raw = &buf[off..off + len];
    let end = raw.iter().position(|&b| b == 0).unwrap_or(len);
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

fn write_padded_str(buf: &mut [u8], off: usize, len: usize, s: &str) -> DbResult<()> {
    let bytes = s.as_bytes();
    if bytes.len() > len {
        return Err(DbError::generic(format!(
            "name {s:?} is {} bytes, exceeds the {len}-byte field"
        )));
    }
    let field = &mut buf[off..off + len];
    field.fill(0);
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(())
}

pub fn table_name(buf: &[u8]) -> String {
    read_padded_str(buf, body(OFF_TABLE_NAME), TABLE_NAME_SIZE)
}

pub fn set_table_name(buf: &mut [u8], name: &str) -> DbResult<()> {
    write_padded_str(buf, body(OFF_TABLE_NAME), TABLE_NAME_SIZE, name)
}

pub fn column_count(buf: &[u8]) -> usize {
    endian::read_u32(buf, body(OFF_COLUMN_COUNT)) as usize
}

pub fn set_column_count(buf: &mut [u8], n: usize) {
    endian::write_u32(buf, body(OFF_COLUMN_COUNT), n as u32);
}

fn clear_column(buf: &mut [u8], i: usize) {
    let off = body(column_offset(i));
    buf[off..off + COLUMN_RECORD_SIZE].fill(0);
}

pub fn column_name(buf: &[u8], i: usize) -> String {
    read_padded_str(buf, body(column_offset(i)), COLUMN_NAME_SIZE)
}

pub fn set_column_name(buf: &mut [u8], i: usize, name: &str) -> DbResult<()> {
    write_padded_str(buf, body(column_offset(i)), COLUMN_NAME_SIZE, name)
}

pub fn column_type(buf: &[u8], i: usize) -> u8 {
    buf[body(column_offset(i)) + COLUMN_NAME_SIZE]
}

pub fn set_column_type(buf: &mut [u8], i: usize, type_tag: u8) {
    buf[body(column_offset(i)) + COLUMN_NAME_SIZE] = type_tag;
}

pub fn column_is_primary_key(buf: &[u8], i: usize) -> bool {
    buf[body(column_offset(i)) + COLUMN_NAME_SIZE + 1] != 0
}

pub fn set_column_is_primary_key(buf: &mut [u8], i: usize, is_pk: bool) {
    buf[body(column_offset(i)) + COLUMN_NAME_SIZE + 1] = is_pk as u8;
}

pub fn column_not_null(buf: &[u8], i: usize) -> bool {
    buf[body(column_offset(i)) + COLUMN_NAME_SIZE + 2] != 0
}

pub fn set_column_not_null(buf: &mut [u8], i: usize, not_null: bool) {
    buf[body(column_offset(i)) + COLUMN_NAME_SIZE + 2] = not_null as u8;
}

pub fn primary_key_index(buf: &[u8]) -> i32 {
    endian::read_i32(buf, body(OFF_PRIMARY_KEY_INDEX))
}

pub fn set_primary_key_index(buf: &mut [u8], idx: i32) {
    endian::write_i32(buf, body(OFF_PRIMARY_KEY_INDEX), idx);
}

pub fn btree_root(buf: &[u8]) -> u32 {
    endian::read_u32(buf, body(OFF_BTREE_ROOT))
}

pub fn set_btree_root(buf: &mut [u8], page: u32) {
    endian::write_u32(buf, body(OFF_BTREE_ROOT), page);
}

pub fn next_rowid(buf: &[u8]) -> u32 {
    endian::read_u32(buf, body(OFF_NEXT_ROWID))
}

pub fn set_next_rowid(buf: &mut [u8], rowid: u32) {
    endian::write_u32(buf, body(OFF_NEXT_ROWID), rowid);
}

pub fn row_count(buf: &[u8]) -> u32 {
    endian::read_u32(buf, body(OFF_ROW_COUNT))
}

pub fn set_row_count(buf: &mut [u8], count: u32) {
    endian::write_u32(buf, body(OFF_ROW_COUNT), count);
}

/// Turn a table name into the B+Tree key that addresses its schema page in
/// the catalog tree (§3.8): CRC-32 of the UTF-8 bytes, high bit masked off
/// so the result is always a non-negative `i32` (keys are signed-ascending,
/// §4.3).
pub fn table_name_hash(name: &str) -> i32 {
    (crc::checksum(name.as_bytes()) & 0x7FFF_FFFF) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use types::PAGE_SIZE;

    fn fresh_page() -> [u8; PAGE_SIZE] {
        let mut buf = [0u8; PAGE_SIZE];
        init(&mut buf);
        buf
    }

    #[test]
    fn init_sets_defaults() {
        let buf = fresh_page();
        assert_eq!(table_name(&buf), "");
        assert_eq!(column_count(&buf), 0);
        assert_eq!(primary_key_index(&buf), NO_PRIMARY_KEY);
        assert_eq!(btree_root(&buf), 0);
        assert_eq!(next_rowid(&buf), 1);
        assert_eq!(row_count(&buf), 0);
    }

    #[test]
    fn table_name_round_trips_with_nul_padding() {
        let mut buf = fresh_page();
        set_table_name(&mut buf, "orders").unwrap();
        assert_eq!(table_name(&buf), "orders");
        // The rest of the 64-byte field stays zeroed.
        let start = PAGE_HEADER_SIZE + OFF_TABLE_NAME + "orders".len();
        assert!(buf[start..PAGE_HEADER_SIZE + TABLE_NAME_SIZE].iter().all(|&b| b == 0));
    }

    #[test]
    fn table_name_too_long_is_rejected() {
        let mut buf = fresh_page();
        let too_long = "x".repeat(TABLE_NAME_SIZE + 1);
        assert!(set_table_name(&mut buf, &too_long).is_err());
    }

    #[test]
    fn column_fields_round_trip() {
        let mut buf = fresh_page();
        set_column_count(&mut buf, 2);
        set_column_name(&mut buf, 0, "id").unwrap();
        set_column_type(&mut buf, 0, 1);
        set_column_is_primary_key(&mut buf, 0, true);
        set_column_not_null(&mut buf, 0, true);

        set_column_name(&mut buf, 1, "name").unwrap();
        set_column_type(&mut buf, 1, 2);
        set_column_is_primary_key(&mut buf, 1, false);
        set_column_not_null(&mut buf, 1, false);

        assert_eq!(column_count(&buf), 2);
        assert_eq!(column_name(&buf, 0), "id");
        assert_eq!(column_type(&buf, 0), 1);
        assert!(column_is_primary_key(&buf, 0));
        assert!(column_not_null(&buf, 0));

        assert_eq!(column_name(&buf, 1), "name");
        assert_eq!(column_type(&buf, 1), 2);
        assert!(!column_is_primary_key(&buf, 1));
        assert!(!column_not_null(&buf, 1));
    }

    #[test]
    fn btree_root_and_counters_round_trip() {
        let mut buf = fresh_page();
        set_primary_key_index(&mut buf, 0);
        set_btree_root(&mut buf, 17);
        set_next_rowid(&mut buf, 101);
        set_row_count(&mut buf, 100);

        assert_eq!(primary_key_index(&buf), 0);
        assert_eq!(btree_root(&buf), 17);
        assert_eq!(next_rowid(&buf), 101);
        assert_eq!(row_count(&buf), 100);
    }

    #[test]
    fn schema_page_body_fits_one_page() {
        assert!(SCHEMA_PAGE_BODY_SIZE <= PAGE_SIZE - PAGE_HEADER_SIZE);
    }

    #[test]
    fn table_name_hash_is_deterministic_and_positive() {
        let h1 = table_name_hash("orders");
        let h2 = table_name_hash("orders");
        assert_eq!(h1, h2);
        assert!(h1 >= 0);
        assert_ne!(table_name_hash("orders"), table_name_hash("customers"));
    }
}
