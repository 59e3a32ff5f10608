//! # Bot Module
//!
//! Discord adapter for Open Music Bot.
//!
//! This module contains the thin layer between the gateway and the session
//! core:
//! - Command registration and dispatch
//! - Event handling (ready, interactions, voice state updates)
//! - Session notices delivered as embeds
//! - Background maintenance of the resolution cache
//!
//! ## Architecture
//!
//! [`OpenMusicBot`] implements Serenity's [`EventHandler`] trait and forwards
//! every command to the [`SessionManager`], which owns one actor per guild.
//! Nothing here holds playback state.

use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;
pub mod notifier;

use crate::{
    audio::session::SessionManager,
    config::Config,
    error::SessionError,
};

pub use notifier::DiscordNotifier;

/// Main Discord bot handler for Open Music Bot.
pub struct OpenMusicBot {
    /// Bot configuration loaded from environment variables
    config: Arc<Config>,
    /// Registro de sesiones por guild
    manager: Arc<SessionManager>,
    /// Recibe el cliente HTTP cuando el gateway está listo
    notifier: Arc<DiscordNotifier>,
    maintenance_started: AtomicBool,
}

impl OpenMusicBot {
    pub fn new(
        config: Arc<Config>,
        manager: Arc<SessionManager>,
        notifier: Arc<DiscordNotifier>,
    ) -> Self {
        Self {
            config,
            manager,
            notifier,
            maintenance_started: AtomicBool::new(false),
        }
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// Registers slash commands with Discord.
    ///
    /// Commands are registered per guild when `GUILD_ID` is set (instant
    /// propagation, useful for development) and globally otherwise.
    async fn register_commands(&self, ctx: &Context) -> anyhow::Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                let guild_id = GuildId::from(guild_id);

                commands::register_guild_commands(ctx, guild_id).await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos globales: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                    })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for OpenMusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        self.notifier.attach(ctx.http.clone());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        // `ready` se repite en cada reconexión del gateway
        if !self.maintenance_started.swap(true, Ordering::SeqCst) {
            let manager = Arc::clone(&self.manager);
            let every = self.config.cache_sweep_interval;

            tokio::spawn(async move {
                maintenance_tasks(manager, every).await;
            });
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Desconexión externa del bot (kick, canal borrado): la sesión se destruye
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };

        info!("🔌 Bot desconectado en guild {}", guild_id);

        match self.manager.leave(guild_id).await {
            Ok(()) => info!("🧹 Sesión cerrada tras desconexión externa en guild {}", guild_id),
            Err(SessionError::NoSession) => {
                debug!("Sin sesión que cerrar en guild {}", guild_id)
            }
            Err(e) => warn!("Error cerrando sesión en guild {}: {}", guild_id, e),
        }
    }
}

/// Limpia el caché de resolución y las descargas huérfanas periódicamente.
async fn maintenance_tasks(manager: Arc<SessionManager>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    // El primer tick es inmediato
    interval.tick().await;

    loop {
        interval.tick().await;

        let resolver = manager.resolver();
        let (expired, purged) = resolver.sweep().await;

        info!(
            "🧹 Tareas de mantenimiento completadas: {} entradas vencidas, {} archivos, {} en caché, {} sesiones activas",
            expired,
            purged,
            resolver.cached_entries(),
            manager.active_sessions()
        );
    }
}
