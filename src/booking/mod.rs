pub mod flow;
pub mod settlement;
