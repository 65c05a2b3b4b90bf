//! Data models: the local backend's SQLite rows (`bucket`, `object`) and the
//! JSON bodies exchanged with API clients (`file`).

pub mod bucket;
pub mod file;
pub mod object;
