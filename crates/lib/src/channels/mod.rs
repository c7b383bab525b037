//! Communication channels (Telegram).
//!
//! Channel and media-source traits plus the Telegram connector. Inbound messages are sent to the
//! inbound router for dispatch; replies go back through [`ChannelHandle::send_message`].

mod handle;
mod inbound;
mod telegram;

pub use handle::{ChannelHandle, MediaSource};
pub use inbound::{AttachmentRef, InboundMessage, Modality};
pub use telegram::{
    largest_photo, truncate_message, TelegramChannel, TelegramMessage, TelegramPhotoSize,
    TelegramUpdate, TELEGRAM_CHANNEL_ID, TELEGRAM_MAX_MESSAGE_LEN,
};
