pub mod db;

pub use db::{seed_profile, TestDb};
