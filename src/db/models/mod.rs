//! Database models split into domain-specific modules.

pub mod cart;
pub mod category;
pub mod common;
pub mod order;
pub mod product;
pub mod user;
pub mod wishlist;

#[cfg(test)]
pub(crate) mod test_support;

pub use cart::*;
pub use category::*;
pub use common::*;
pub use order::*;
pub use product::*;
pub use user::*;
pub use wishlist::*;
