pub mod acquisition;
pub mod browser;
pub mod captcha;
pub mod catalog;
pub mod classify;
pub mod d1;
pub mod extract;
pub mod sync;
