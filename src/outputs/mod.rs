//! Output generation for the static page.
//!
//! # Submodules
//!
//! - [`json`]: atomically writes the [`ContentBatch`](crate::models::ContentBatch)
//!   data file and reads it back in any supported schema version
//!
//! # Output Structure
//!
//! ```text
//! public/
//! ├── index.html   # static page (not generated here)
//! └── data.json    # replaced in full on every successful run
//! ```

pub mod json;
