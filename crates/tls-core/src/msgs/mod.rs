pub mod alert;
pub mod base;
pub mod codec;
pub mod enums;
pub mod handshake;
