//! SQL for the PostgreSQL store, organized by the rows each module touches.

pub mod apply;
pub mod directory;
pub mod providers;
