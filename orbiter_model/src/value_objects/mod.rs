pub mod generic_id;
pub mod query_id;
pub mod transform_id;

pub use generic_id::{GenericId, IdCategory};
pub use query_id::QueryId;
pub use transform_id::TransformId;
