pub mod endpoint;
pub mod error;
pub mod outcome;
pub mod query;
