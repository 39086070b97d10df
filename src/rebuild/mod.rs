//! Reinsertion of replacement files into a copy of the original image.
//!
//! # Rebuild Pipeline
//!
//! 1. **Data region location** - Counts UDF marker sectors to find where file
//!    payloads begin; everything before that is kept verbatim
//! 2. **File insertion** - Appends each replacement on a sector boundary and
//!    patches its directory record in the copied header
//! 3. **Finishing** - Aligns the data region, optionally adds mastering padding,
//!    appends the original footer and fixes up the volume size

mod locator;
mod writer;

pub use locator::*;
pub use writer::*;
