pub mod keys;
pub mod markup;
pub mod tracing_init;
