pub mod analysis;
pub mod documents;
pub mod search;
