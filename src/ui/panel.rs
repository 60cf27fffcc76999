use anyhow::Result;
use async_trait::async_trait;
use serenity::{
    all::{ChannelId, MessageId},
    builder::{CreateMessage, EditMessage},
    http::Http,
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    audio::controller::PlayerSnapshot,
    ui::{buttons::create_player_controls, embeds::create_now_playing_embed},
};

/// A rendered control panel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

/// Where control panels are drawn.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ControlSurface: Send + Sync {
    async fn render(&self, channel: ChannelId, snapshot: &PlayerSnapshot) -> Result<MessageRef>;

    async fn update(&self, message: &MessageRef, snapshot: &PlayerSnapshot) -> Result<()>;

    async fn remove(&self, message: &MessageRef) -> Result<()>;
}

/// Draws panels as Discord messages with an embed and a button row.
pub struct SerenityControlSurface {
    http: Arc<Http>,
}

impl SerenityControlSurface {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ControlSurface for SerenityControlSurface {
    async fn render(&self, channel: ChannelId, snapshot: &PlayerSnapshot) -> Result<MessageRef> {
        let message = channel
            .send_message(
                &*self.http,
                CreateMessage::new()
                    .embed(create_now_playing_embed(snapshot))
                    .components(create_player_controls(snapshot)),
            )
            .await?;

        Ok(MessageRef {
            channel_id: channel,
            message_id: message.id,
        })
    }

    async fn update(&self, message: &MessageRef, snapshot: &PlayerSnapshot) -> Result<()> {
        message
            .channel_id
            .edit_message(
                &*self.http,
                message.message_id,
                EditMessage::new()
                    .embed(create_now_playing_embed(snapshot))
                    .components(create_player_controls(snapshot)),
            )
            .await?;
        Ok(())
    }

    async fn remove(&self, message: &MessageRef) -> Result<()> {
        message
            .channel_id
            .delete_message(&*self.http, message.message_id)
            .await?;
        Ok(())
    }
}

/// The one control panel message of a guild.
///
/// Panel failures never reach the player: they are logged and the message is
/// forgotten, so the next refresh draws a new one.
pub struct ControlPanel {
    surface: Arc<dyn ControlSurface>,
    channel: Option<ChannelId>,
    message: Option<MessageRef>,
}

impl ControlPanel {
    pub fn new(surface: Arc<dyn ControlSurface>, channel: Option<ChannelId>) -> Self {
        Self {
            surface,
            channel,
            message: None,
        }
    }

    pub fn message(&self) -> Option<MessageRef> {
        self.message
    }

    pub fn channel(&self) -> Option<ChannelId> {
        self.channel
    }

    /// Sets the channel new panels are drawn in.
    pub fn bind(&mut self, channel: ChannelId) {
        self.channel = Some(channel);
    }

    /// Edits the current panel, or draws one if there is none.
    pub async fn refresh(&mut self, snapshot: &PlayerSnapshot) {
        if let Some(message) = self.message {
            match self.surface.update(&message, snapshot).await {
                Ok(()) => return,
                Err(e) => {
                    warn!("⚠️ Could not update control panel, drawing a new one: {:?}", e);
                    self.message = None;
                }
            }
        }

        self.render(snapshot).await;
    }

    /// Replaces the current panel with a fresh one in `channel`.
    pub async fn reset(&mut self, channel: ChannelId, snapshot: &PlayerSnapshot) {
        if let Some(old) = self.message.take() {
            if let Err(e) = self.surface.remove(&old).await {
                debug!("Old control panel already gone: {:?}", e);
            }
        }

        self.channel = Some(channel);
        self.render(snapshot).await;
    }

    async fn render(&mut self, snapshot: &PlayerSnapshot) {
        let Some(channel) = self.channel else {
            return;
        };

        match self.surface.render(channel, snapshot).await {
            Ok(message) => self.message = Some(message),
            Err(e) => warn!("⚠️ Could not draw control panel in {}: {:?}", channel, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::controller::ModeFlags;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;

    fn snapshot() -> PlayerSnapshot {
        PlayerSnapshot {
            current: None,
            position: None,
            len: 0,
            flags: ModeFlags::default(),
            paused: false,
            connected: false,
        }
    }

    fn message(id: u64) -> MessageRef {
        MessageRef {
            channel_id: ChannelId::new(5),
            message_id: MessageId::new(id),
        }
    }

    #[tokio::test]
    async fn refresh_without_channel_draws_nothing() {
        let surface = MockControlSurface::new();
        let mut panel = ControlPanel::new(Arc::new(surface), None);

        panel.refresh(&snapshot()).await;

        assert_eq!(panel.message(), None);
    }

    #[tokio::test]
    async fn refresh_draws_once_then_edits() {
        let mut surface = MockControlSurface::new();
        surface
            .expect_render()
            .with(eq(ChannelId::new(5)), mockall::predicate::always())
            .times(1)
            .returning(|_, _| Ok(message(1)));
        surface.expect_update().times(2).returning(|_, _| Ok(()));

        let mut panel = ControlPanel::new(Arc::new(surface), Some(ChannelId::new(5)));
        panel.refresh(&snapshot()).await;
        panel.refresh(&snapshot()).await;
        panel.refresh(&snapshot()).await;

        assert_eq!(panel.message(), Some(message(1)));
    }

    #[tokio::test]
    async fn failed_edit_forgets_the_message() {
        let mut surface = MockControlSurface::new();
        let mut ids = 0;
        surface.expect_render().times(2).returning(move |_, _| {
            ids += 1;
            Ok(message(ids))
        });
        surface
            .expect_update()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("Unknown Message")));

        let mut panel = ControlPanel::new(Arc::new(surface), Some(ChannelId::new(5)));
        panel.refresh(&snapshot()).await;
        panel.refresh(&snapshot()).await;

        assert_eq!(panel.message(), Some(message(2)));
    }

    #[tokio::test]
    async fn reset_removes_and_redraws_in_the_new_channel() {
        let mut surface = MockControlSurface::new();
        surface
            .expect_render()
            .with(eq(ChannelId::new(5)), mockall::predicate::always())
            .times(1)
            .returning(|_, _| Ok(message(1)));
        surface
            .expect_remove()
            .with(eq(message(1)))
            .times(1)
            .returning(|_| Ok(()));
        surface
            .expect_render()
            .with(eq(ChannelId::new(9)), mockall::predicate::always())
            .times(1)
            .returning(|channel, _| {
                Ok(MessageRef {
                    channel_id: channel,
                    message_id: MessageId::new(2),
                })
            });

        let mut panel = ControlPanel::new(Arc::new(surface), Some(ChannelId::new(5)));
        panel.refresh(&snapshot()).await;
        panel.reset(ChannelId::new(9), &snapshot()).await;

        assert_eq!(panel.message().map(|m| m.channel_id), Some(ChannelId::new(9)));
    }
}
