pub mod error;
pub mod types;

pub mod binding;
pub mod ejson;
pub mod patch;
pub mod query;
pub mod reactive;
pub mod scope;
pub mod sequence;
pub mod store;
