use super::*;
use common::file::OsFile;
use pager::Pager;
use tempfile::tempdir;
use types::PAGE_HEADER_SIZE;

fn open_cache(dir: &std::path::Path, capacity: usize) -> Cache<OsFile> {
    let pager = Pager::open(&dir.join("db"), false).unwrap();
    Cache::create(pager, capacity)
}

#[test]
fn get_page_pins_and_fills_buffer() {
    let dir = tempdir().unwrap();
    let mut cache = open_cache(dir.path(), 8);
    let page = cache.allocate_page().unwrap();

    let buf = cache.get_page(page).unwrap();
    buf[PAGE_HEADER_SIZE] = 0xAB;
    cache.mark_dirty(page).unwrap();

    assert_eq!(cache.find_entry(page).unwrap().pin_count, 1);
    assert_eq!(cache.find_entry(page).unwrap().state, EntryState::Dirty);
}

#[test]
fn mark_dirty_requires_residency() {
    let dir = tempdir().unwrap();
    let mut cache = open_cache(dir.path(), 8);
    assert!(cache.mark_dirty(99).is_err());
}

#[test]
fn unpin_then_evict_reclaims_slot() {
    let dir = tempdir().unwrap();
    let mut cache = open_cache(dir.path(), 1);

    let p1 = cache.allocate_page().unwrap();
    cache.get_page(p1).unwrap();
    cache.unpin(p1);

    let p2 = cache.allocate_page().unwrap();
    // Capacity is 1, p1 must be evicted to make room for p2.
    cache.get_page(p2).unwrap();
    assert!(cache.find_entry(p1).is_none());
}

#[test]
fn pinned_page_is_not_evicted() {
    let dir = tempdir().unwrap();
    let mut cache = open_cache(dir.path(), 1);

    let p1 = cache.allocate_page().unwrap();
    cache.get_page(p1).unwrap(); // stays pinned

    let p2 = cache.allocate_page().unwrap();
    let err = cache.get_page(p2).unwrap_err();
    assert_eq!(err.code(), types::ErrorCode::Busy);
}

#[test]
fn flush_writes_dirty_untagged_pages_and_marks_clean() {
    let dir = tempdir().unwrap();
    let mut cache = open_cache(dir.path(), 8);
    let page = cache.allocate_page().unwrap();

    cache.get_page(page).unwrap()[PAGE_HEADER_SIZE] = 0x42;
    cache.mark_dirty(page).unwrap();
    cache.unpin(page);

    cache.flush().unwrap();
    assert_eq!(cache.find_entry(page).unwrap().state, EntryState::Clean);

    let reread = cache.pager_mut().read_page(page).unwrap();
    assert_eq!(reread[PAGE_HEADER_SIZE], 0x42);
}

#[test]
fn flush_skips_txn_tagged_pages() {
    let dir = tempdir().unwrap();
    let mut cache = open_cache(dir.path(), 8);
    let page = cache.allocate_page().unwrap();

    cache.get_page(page).unwrap()[PAGE_HEADER_SIZE] = 0x7;
    cache.mark_dirty(page).unwrap();
    cache.set_txn_tag(page, 5).unwrap();
    cache.unpin(page);

    cache.flush().unwrap();
    // Still dirty: flush must not have written it through.
    assert_eq!(cache.find_entry(page).unwrap().state, EntryState::Dirty);
}

#[test]
fn reload_discards_in_memory_changes() {
    let dir = tempdir().unwrap();
    let mut cache = open_cache(dir.path(), 8);
    let page = cache.allocate_page().unwrap();

    cache.get_page(page).unwrap()[PAGE_HEADER_SIZE] = 0x11;
    cache.mark_dirty(page).unwrap();
    cache.unpin(page);
    cache.flush().unwrap();

    cache.pin(page).unwrap();
    cache.get_page(page).unwrap()[PAGE_HEADER_SIZE] = 0x99;
    cache.mark_dirty(page).unwrap();

    cache.reload(page);
    assert_eq!(cache.buffer(page).unwrap()[PAGE_HEADER_SIZE], 0x11);
    assert_eq!(cache.find_entry(page).unwrap().state, EntryState::Clean);
}

#[test]
fn unpin_all_clears_a_pin_list() {
    let dir = tempdir().unwrap();
    let mut cache = open_cache(dir.path(), 8);
    let p1 = cache.allocate_page().unwrap();
    let p2 = cache.allocate_page().unwrap();

    let mut pins = PinList::new();
    cache.get_page(p1).unwrap();
    pins.push(p1);
    cache.get_page(p2).unwrap();
    pins.push(p2);

    cache.unpin_all(&pins);
    assert_eq!(cache.find_entry(p1).unwrap().pin_count, 0);
    assert_eq!(cache.find_entry(p2).unwrap().pin_count, 0);
}

#[test]
fn lru_eviction_picks_least_recently_used() {
    let dir = tempdir().unwrap();
    let mut cache = open_cache(dir.path(), 2);

    let p1 = cache.allocate_page().unwrap();
    let p2 = cache.allocate_page().unwrap();
    cache.get_page(p1).unwrap();
    cache.unpin(p1);
    cache.get_page(p2).unwrap();
    cache.unpin(p2);

    // Touch p1 again so p2 becomes the LRU tail.
    cache.get_page(p1).unwrap();
    cache.unpin(p1);

    let p3 = cache.allocate_page().unwrap();
    cache.get_page(p3).unwrap();

    assert!(cache.find_entry(p1).is_some());
    assert!(cache.find_entry(p2).is_none());
}

#[test]
fn free_page_invalidates_resident_entry() {
    let dir = tempdir().unwrap();
    let mut cache = open_cache(dir.path(), 8);
    let page = cache.allocate_page().unwrap();
    cache.get_page(page).unwrap();
    cache.unpin(page);

    cache.free_page(page).unwrap();
    assert!(cache.find_entry(page).is_none());
}

#[test]
fn open_from_config_honors_path_and_capacity() {
    let dir = tempdir().unwrap();
    let config = common::Config::builder()
        .path(dir.path().join("db"))
        .cache_capacity(4)
        .build();

    let mut cache = Cache::open(&config).unwrap();
    let page = cache.allocate_page().unwrap();
    cache.get_page(page).unwrap();
    cache.unpin(page);
    assert!(cache.find_entry(page).is_some());
}

#[test]
fn open_from_config_read_only_rejects_mutation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db");
    {
        let config = common::Config::builder().path(path.clone()).build();
        Cache::open(&config).unwrap().destroy().unwrap();
    }

    let config = common::Config::builder().path(path).read_only(true).build();
    let mut cache = Cache::open(&config).unwrap();
    assert!(cache.allocate_page().is_err());
}
