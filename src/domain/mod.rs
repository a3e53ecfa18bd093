pub mod authorization;
pub mod credentials;
