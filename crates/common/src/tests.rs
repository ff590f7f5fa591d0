use super::*;
use std::io;
use types::ErrorCode;

#[test]
fn config_defaults_are_sane() {
    let cfg = Config::default();
    assert_eq!(cfg.cache_capacity, 128);
    assert!(!cfg.read_only);
}

#[test]
fn db_error_formats_cleanly() {
    let err = DbError::corrupt("checksum mismatch");
    assert!(format!("{err}").contains("CORRUPT"));
    assert!(format!("{err}").contains("checksum mismatch"));
}

#[test]
fn db_error_captures_call_site() {
    let err = DbError::busy("all pages pinned");
    assert!(err.location.is_some());
}

#[test]
fn io_error_converts_to_ioerr_code() {
    let e = io::Error::other("oops");
    let db_err: DbError = e.into();
    assert_eq!(db_err.code(), ErrorCode::IoErr);
}

#[test]
fn builder_overrides_defaults() {
    let cfg = Config::builder().cache_capacity(64).read_only(true).build();
    assert_eq!(cfg.cache_capacity, 64);
    assert!(cfg.read_only);
}
