//! sqlite-vec extension registration.
//!
//! The only `unsafe` in the crate lives here: `sqlite3_auto_extension`
//! registers sqlite-vec for every connection opened afterwards, including
//! the ones `tokio-rusqlite` opens for the vector chunk store.

use std::sync::Once;

use rusqlite::ffi::{sqlite3, sqlite3_api_routines, sqlite3_auto_extension};
use sqlite_vec::sqlite3_vec_init;

type SqliteExtensionFn =
    unsafe extern "C" fn(*mut sqlite3, *mut *mut i8, *const sqlite3_api_routines) -> i32;

static REGISTER: Once = Once::new();

/// Register sqlite-vec as an auto-loaded extension.
///
/// Must run before the vector chunk store opens its database. Repeated
/// calls are no-ops.
#[allow(unsafe_code)]
pub fn init_sqlite_vec_extension() {
    REGISTER.call_once(|| {
        // SAFETY: sqlite3_vec_init has the SQLite extension entry-point ABI;
        // sqlite3_auto_extension only stores the pointer for later connections.
        unsafe {
            sqlite3_auto_extension(Some(std::mem::transmute::<*const (), SqliteExtensionFn>(
                sqlite3_vec_init as *const (),
            )));
        }
        tracing::debug!("Registered sqlite-vec auto extension");
    });
}
