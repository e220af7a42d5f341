pub mod core;
pub mod toolchain;
