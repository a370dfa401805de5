pub mod question;
pub mod reply;
pub mod session;
pub mod telegram;
