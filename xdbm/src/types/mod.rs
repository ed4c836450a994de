mod ids;
mod tuple;

pub use ids::EntryId;
pub use tuple::Tuple;
