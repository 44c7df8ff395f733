pub mod api;
pub mod config;
pub mod db;
pub mod detector;
pub mod i18n;
pub mod reconcile;
pub mod retry;
pub mod security;
pub mod status;
pub mod sync;
pub mod wordpress;
