pub mod auth;
pub mod db;
pub mod error;
pub mod orm;
pub mod post;
pub mod session;
pub mod social;
pub mod storage;
pub mod user;
pub mod web;
