//! Item encodings accepted by queues.
//!
//! The store only knows bytes. A queue is consumed either as raw bytes or as UTF-8
//! text; one queue should stick to one of the two.

use std::string::FromUtf8Error;

pub trait QueueItem: Sized + Send + 'static {
    fn from_raw(raw: Vec<u8>) -> Result<Self, FromUtf8Error>;

    fn into_raw(self) -> Vec<u8>;
}

impl QueueItem for Vec<u8> {
    fn from_raw(raw: Vec<u8>) -> Result<Self, FromUtf8Error> {
        Ok(raw)
    }

    fn into_raw(self) -> Vec<u8> {
        self
    }
}

impl QueueItem for String {
    fn from_raw(raw: Vec<u8>) -> Result<Self, FromUtf8Error> {
        String::from_utf8(raw)
    }

    fn into_raw(self) -> Vec<u8> {
        self.into_bytes()
    }
}
