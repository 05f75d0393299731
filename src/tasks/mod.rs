//! Work items and their building blocks.
//!
//! - [`Work`] / [`WorkContext`]: the periodic unit and its per-run context;
//! - [`Keyed`] / [`KeyedWork`] / [`KeyTuple`]: identity from a key tuple;
//! - [`Handle`]: shared, typed reference returned by registration;
//! - [`ThreadSpec`]: dedicated-thread registration parameters;
//! - [`Latest`]: cell for the most recent result of a unit.

mod handle;
mod keyed;
mod latest;
mod spec;
mod work;

pub use handle::Handle;
pub(crate) use handle::{ErasedWork, Shared};
pub use keyed::{KeyTuple, Keyed, KeyedWork, field_hash, fold_key_hash};
pub use latest::Latest;
pub use spec::ThreadSpec;
pub use work::{Work, WorkContext};
