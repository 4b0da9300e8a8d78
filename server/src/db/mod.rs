//! In-memory storage for the reference backend.

mod objects;
mod ops;
mod query;

pub use objects::*;
pub use ops::{apply_body, Applied, RelationEdit};
pub use query::{Filter, RelatedTo};
