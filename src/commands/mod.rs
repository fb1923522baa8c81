pub mod availability;
pub mod book;
pub mod feedback;
pub mod init;
pub mod notes;
pub mod recommend;
pub mod session;
pub mod user;
