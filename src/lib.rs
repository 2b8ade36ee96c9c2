pub mod error;
pub mod models;
pub mod orm;
pub mod router;
pub mod settings;
pub mod template;
pub mod views;

inventory::collect!(crate::orm::Migration);
