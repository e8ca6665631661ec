mod store;
mod tree;

pub use store::MemPropertyStore;
pub use tree::MemTree;
