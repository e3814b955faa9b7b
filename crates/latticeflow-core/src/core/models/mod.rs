pub mod bonds;
pub mod cell;
pub mod collection;
pub mod frame;
pub mod property;
pub mod reconcile;
pub mod types;
