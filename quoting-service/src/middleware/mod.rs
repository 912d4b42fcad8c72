//! Request extractors for quoting-service.

pub mod shop;

pub use shop::{ShopContext, SHOP_ID_HEADER};
