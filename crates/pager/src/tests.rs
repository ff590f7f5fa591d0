use super::*;
use tempfile::tempdir;
use types::FILE_MAGIC;

#[test]
fn fresh_pager_open_creates_a_valid_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db1");

    let pager = Pager::<OsFile>::open(&path, false).unwrap();
    assert_eq!(pager.page_count(), 1);
    assert!(pager.header.is_dirty());
    assert!(pager.bitmap.is_set(0));
    assert!(!pager.bitmap.is_set(1));
    pager.close().unwrap();

    let reopened = Pager::<OsFile>::open(&path, true).unwrap();
    assert_eq!(reopened.header.magic, FILE_MAGIC);
    assert!(!reopened.header.is_dirty());
}

#[test]
fn allocate_and_read_write_page_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db2");
    let mut pager = Pager::<OsFile>::open(&path, false).unwrap();

    let p = pager.allocate_page().unwrap();
    let mut body = [0u8; PAGE_SIZE];
    page::set_page_type(&mut body, PageType::BTree);
    body[12] = 0xA0;
    body[13] = 0xA1;
    pager.write_page(p, &mut body).unwrap();
    pager.sync().unwrap();

    let read_back = pager.read_page(p).unwrap();
    assert_eq!(&read_back[12..14], &[0xA0, 0xA1]);
}

#[test]
fn allocating_max_pages_then_one_more_returns_full() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db_full");
    let mut pager = Pager::<OsFile>::open(&path, false).unwrap();

    // Page 0 is already allocated; fill every remaining bit.
    for _ in 1..types::MAX_PAGES {
        pager.allocate_page().unwrap();
    }
    let err = pager.allocate_page().unwrap_err();
    assert_eq!(err.code(), types::ErrorCode::Full);
}

#[test]
fn free_then_reallocate_reuses_the_slot() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db3");
    let mut pager = Pager::<OsFile>::open(&path, false).unwrap();

    let p = pager.allocate_page().unwrap();
    pager.free_page(p).unwrap();
    let reused = pager.allocate_page().unwrap();
    assert_eq!(p, reused);
}

#[test]
fn read_page_detects_corruption() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db4");
    let mut pager = Pager::<OsFile>::open(&path, false).unwrap();
    let p = pager.allocate_page().unwrap();

    let mut file = OsFile::open(&path, false).unwrap();
    file.write_at(p as u64 * PAGE_SIZE as u64 + 20, &[0xFF; 4])
        .unwrap();

    let err = pager.read_page(p).unwrap_err();
    assert_eq!(err.code(), types::ErrorCode::Corrupt);
}

#[test]
fn commit_durability_survives_close_and_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db5");
    let mut pager = Pager::<OsFile>::open(&path, false).unwrap();

    let p = pager.allocate_page().unwrap();
    pager.wal_mut().begin_txn().unwrap();
    let mut body = [0u8; PAGE_SIZE];
    page::set_page_type(&mut body, PageType::BTree);
    body[12..18].copy_from_slice(&[0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5]);
    page::stamp(&mut body, p);
    pager.wal_mut().log_page(p, &body).unwrap();
    pager.wal_mut().log_commit().unwrap();
    pager.flush_wal().unwrap();
    pager.write_page(p, &mut body).unwrap();
    pager.sync().unwrap();
    pager.reset_wal_buffer().unwrap();
    pager.close().unwrap();

    let mut reopened = Pager::<OsFile>::open(&path, false).unwrap();
    let read_back = reopened.read_page(p).unwrap();
    assert_eq!(&read_back[12..18], &[0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5]);
}

#[test]
fn recovery_redoes_committed_transaction_left_dirty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db6");
    let mut pager = Pager::<OsFile>::open(&path, false).unwrap();
    let p = pager.allocate_page().unwrap();

    pager.wal_mut().begin_txn().unwrap();
    let mut body = [0u8; PAGE_SIZE];
    page::set_page_type(&mut body, PageType::BTree);
    body[12] = 0x77;
    page::stamp(&mut body, p);
    pager.wal_mut().log_page(p, &body).unwrap();
    pager.wal_mut().log_commit().unwrap();
    pager.flush_wal().unwrap();
    // Simulate a crash: the header is left with DIRTY set and the page was
    // never written through to its home location.
    drop(pager);

    let mut reopened = Pager::<OsFile>::open(&path, false).unwrap();
    let recovered = reopened.read_page(p).unwrap();
    assert_eq!(recovered[12], 0x77);
    assert!(!reopened.header.is_dirty());
}

#[test]
fn recovery_ignores_uncommitted_transaction() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db7");
    let mut pager = Pager::<OsFile>::open(&path, false).unwrap();
    let p = pager.allocate_page().unwrap();

    // Write the pre-crash home image directly (no transaction involved).
    let mut original = [0u8; PAGE_SIZE];
    page::set_page_type(&mut original, PageType::BTree);
    original[12] = 0x11;
    pager.write_page(p, &mut original).unwrap();
    pager.sync().unwrap();

    // A transaction logs a page but never commits.
    pager.wal_mut().begin_txn().unwrap();
    let mut uncommitted = original;
    uncommitted[12] = 0x99;
    page::stamp(&mut uncommitted, p);
    pager.wal_mut().log_page(p, &uncommitted).unwrap();
    pager.flush_wal().unwrap();
    drop(pager);

    let mut reopened = Pager::<OsFile>::open(&path, false).unwrap();
    let recovered = reopened.read_page(p).unwrap();
    assert_eq!(recovered[12], 0x11);
}
