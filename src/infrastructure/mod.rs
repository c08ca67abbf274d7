pub mod connectivity;
pub mod in_memory;
