pub mod email;
pub mod subscription;
pub mod user;
