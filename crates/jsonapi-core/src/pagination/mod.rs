//! Pagination: offset mode and an opaque cursor mode.
//!
//! Offset mode is `page[number]`/`page[size]`, optionally accompanied by a
//! COUNT query when `enable_pagination_counts` is on. Cursor mode is
//! `page[after]`/`page[before]`, carrying the last row's sort-key values
//! base64-encoded so the next page's WHERE clause can resume from them
//! without an OFFSET scan.

mod cursor;
mod meta;

pub use cursor::{Cursor, CursorAxis};
pub use meta::PageMeta;
