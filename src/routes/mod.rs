pub mod health;
pub mod telegram;
