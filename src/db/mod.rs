pub mod auth;
pub mod product;
pub mod tx;
pub mod user;
pub mod wallet;
