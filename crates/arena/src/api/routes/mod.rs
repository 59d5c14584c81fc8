pub mod auth;
pub mod game;
pub mod lnurl;
pub mod payments;
pub mod system;
pub mod tournaments;
pub mod wallet;
