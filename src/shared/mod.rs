pub(crate) mod blocking;
pub mod error;
pub(crate) mod fs;
pub(crate) mod mutex_ext;
pub mod security;
pub mod time;
