pub mod batch;
pub mod keywords;
pub mod nodes;
pub mod privacy;
pub mod speakers;
