pub mod migration;
pub mod pool;
