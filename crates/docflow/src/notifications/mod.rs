//! Per-owner live notification fan-out

mod channel;
mod hub;

pub use channel::{MpscPushChannel, PushChannel};
pub use hub::{ChannelId, NotificationHub};
