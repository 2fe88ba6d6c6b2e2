// src/notify/log.rs
use async_trait::async_trait;
use tracing::info;

use super::{Notifier, OutboundMessage};
use crate::error::Result;

/// Dry-run channel: logs what would have been sent.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn destination(&self) -> &str {
        "log"
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<()> {
        let preview: String = msg.body.chars().take(120).collect();
        info!(target: "dispatch", title = %msg.title, link = %msg.link, preview = %preview, "WOULD SEND");
        Ok(())
    }
}
