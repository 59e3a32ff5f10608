use async_trait::async_trait;
use serenity::{
    builder::CreateMessage,
    http::Http,
    model::id::{ChannelId, GuildId},
};
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, warn};

use crate::{
    audio::controller::{Notice, Notifier},
    ui::embeds,
};

/// Publica los avisos de sesión como embeds. El cliente HTTP llega con `ready`.
#[derive(Default)]
pub struct DiscordNotifier {
    http: OnceLock<Arc<Http>>,
}

impl DiscordNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, http: Arc<Http>) {
        if self.http.set(http).is_err() {
            debug!("Cliente HTTP del notificador ya estaba configurado");
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, guild: GuildId, channel: ChannelId, notice: Notice) {
        let Some(http) = self.http.get() else {
            warn!("📭 Aviso descartado en guild {}: bot aún no listo", guild);
            return;
        };

        let message = CreateMessage::new().embed(embeds::create_notice_embed(&notice));
        if let Err(e) = channel.send_message(http.as_ref(), message).await {
            error!(
                "❌ Error enviando aviso al canal {} en guild {}: {:?}",
                channel, guild, e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn notices_before_ready_are_dropped() {
        let notifier = DiscordNotifier::new();
        notifier
            .notify(
                GuildId::new(1),
                ChannelId::new(2),
                Notice::IdleDisconnect {
                    idle: Duration::from_secs(600),
                },
            )
            .await;
        assert!(notifier.http.get().is_none());
    }
}
