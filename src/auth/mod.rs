pub mod extractor;
pub mod gateway;
pub mod identity;
pub mod jwt;
pub mod password;
pub mod permissions;
pub mod tokens;
