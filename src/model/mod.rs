pub mod import;
pub mod ticket;
