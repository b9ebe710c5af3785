pub mod duration;
pub mod payload;
