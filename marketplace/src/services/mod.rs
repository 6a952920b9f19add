// marketplace/src/services/mod.rs

pub mod auth_service;
pub mod payhere;
pub mod token_service;

pub use payhere::{Md5SignatureVerifier, NotificationVerifier, PayHereSigner};
pub use token_service::{Claims, TokenService};
