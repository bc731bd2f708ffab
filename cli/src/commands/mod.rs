pub mod inspect;
pub mod spool;
