pub mod comment;
pub mod cors;
