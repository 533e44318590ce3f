pub mod admin;
pub mod etf;
pub mod funds;
pub mod health;
pub mod holdings;
pub mod jobs;
pub mod portfolios;
pub mod upload;
