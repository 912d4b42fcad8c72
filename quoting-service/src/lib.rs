//! quoting-service: quote calculation and template price estimation for
//! multi-tenant print shops.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod pricing;
pub mod services;
pub mod startup;
