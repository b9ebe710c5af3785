pub mod hardware;
pub mod outcome;
pub mod params;
pub mod report;
pub mod results;
