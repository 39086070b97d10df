//! ISO9660 directory records and extraction.
//!
//! Reading is limited to what the extractor needs: the root record in the
//! primary volume descriptor and the directory record tree below it.

mod context;
mod structs;
mod walker;

pub use context::*;
pub use structs::*;
pub use walker::*;
