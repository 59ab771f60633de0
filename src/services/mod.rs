pub mod chat;
pub mod pairing;
pub mod persistence;
pub mod room;
pub mod signaling;
pub mod whiteboard;
