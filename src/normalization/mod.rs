pub mod sentinel;
pub mod writers;
