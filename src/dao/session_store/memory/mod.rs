mod procedures;
mod store;
mod tables;

pub use store::MemoryStore;
