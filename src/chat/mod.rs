//! Client for the chat platform gateway: group lifecycle, membership, and
//! message delivery.

mod client;

pub use client::{ChatClient, MessageButton};
