mod collection;
mod pipeline;

pub use collection::{Collection, Column, ValueKind};
pub use pipeline::{Projection, QueryError, QuerySpec, SortDir};
