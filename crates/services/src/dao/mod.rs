pub mod base;
pub mod keyword;
pub mod node;
pub mod privacy;
pub mod speaker;

pub use base::{BaseDao, DaoError, DaoResult, PaginatedResult, PaginationParams};
