pub mod config;
pub mod control;
pub mod db;
pub mod error;
pub mod execution;
pub mod jupiter;
pub mod models;
pub mod monitoring;
pub mod solana;
pub mod strategy;
pub mod utils;
