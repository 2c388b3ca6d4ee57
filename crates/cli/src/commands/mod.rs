pub mod build;
pub mod common;
pub mod confirm;
pub mod digest;
pub mod inspect;
pub mod propose;
pub mod send;
