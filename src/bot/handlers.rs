use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::{queue::TrackRequest, session::SkipOutcome},
    bot::OpenMusicBot,
    error::SessionError,
    ui::embeds,
};

/// Comandos slash que entiende el bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MusicCommand {
    Music,
    Play { query: String },
    Skip,
    Queue,
    Leave,
}

impl MusicCommand {
    pub fn parse(name: &str, query: Option<&str>) -> Option<Self> {
        match name {
            "music" => Some(Self::Music),
            "play" => query.map(|q| Self::Play {
                query: q.to_string(),
            }),
            "skip" => Some(Self::Skip),
            "queue" => Some(Self::Queue),
            "leave" => Some(Self::Leave),
            _ => None,
        }
    }
}

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &OpenMusicBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str());

    let Some(parsed) = MusicCommand::parse(&command.data.name, query) else {
        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content("❌ Comando no reconocido")
                        .ephemeral(true),
                ),
            )
            .await?;
        return Ok(());
    };

    // Defer la respuesta: conectar a voz puede tardar
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let embed = match execute(ctx, &command, guild_id, parsed, bot).await {
        Ok(embed) => embed,
        Err(e) => {
            warn!("⚠️ /{} falló en guild {}: {}", command.data.name, guild_id, e);
            embeds::create_error_embed("No se pudo completar", &e.to_string())
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn execute(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    parsed: MusicCommand,
    bot: &OpenMusicBot,
) -> Result<CreateEmbed, SessionError> {
    let manager = bot.manager();

    match parsed {
        MusicCommand::Music => {
            let voice = get_user_voice_channel(ctx, guild_id, command.user.id)
                .ok_or(SessionError::NotInVoiceChannel)?;
            manager.join(guild_id, voice, command.channel_id).await?;

            Ok(embeds::create_success_embed(
                "Conectado",
                &format!("🔊 Listo en <#{}>. Usa `/play` para agregar música", voice),
            ))
        }
        MusicCommand::Play { query } => {
            let Some(request) =
                TrackRequest::new(&query, command.user.id, command.user.display_name())
            else {
                return Ok(embeds::create_error_embed(
                    "Consulta vacía",
                    "Escribe una URL o algo para buscar",
                ));
            };

            if !manager.has_session(guild_id) {
                let voice = get_user_voice_channel(ctx, guild_id, command.user.id)
                    .ok_or(SessionError::NotInVoiceChannel)?;
                manager.join(guild_id, voice, command.channel_id).await?;
            }

            let outcome = manager.enqueue(guild_id, request).await?;
            Ok(embeds::create_track_added_embed(&query, &outcome))
        }
        MusicCommand::Skip => match manager.skip(guild_id).await? {
            SkipOutcome::Skipped { title } => Ok(embeds::create_success_embed(
                "Saltada",
                &format!("⏭️ **{}**", title),
            )),
            SkipOutcome::NothingPlaying => Ok(embeds::create_info_embed(
                "Nada que saltar",
                "No hay ninguna canción sonando",
            )),
        },
        MusicCommand::Queue => {
            let snapshot = manager.snapshot(guild_id).await?;
            Ok(embeds::create_queue_embed(&snapshot))
        }
        MusicCommand::Leave => {
            manager.leave(guild_id).await?;
            Ok(embeds::create_success_embed(
                "Desconectado",
                "👋 Salí del canal de voz y vacié la cola",
            ))
        }
    }
}

// Funciones auxiliares

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id);

    channel_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_known_commands() {
        assert_eq!(MusicCommand::parse("music", None), Some(MusicCommand::Music));
        assert_eq!(
            MusicCommand::parse("play", Some("lofi beats")),
            Some(MusicCommand::Play {
                query: "lofi beats".to_string()
            })
        );
        assert_eq!(MusicCommand::parse("skip", None), Some(MusicCommand::Skip));
        assert_eq!(MusicCommand::parse("queue", None), Some(MusicCommand::Queue));
        assert_eq!(MusicCommand::parse("leave", None), Some(MusicCommand::Leave));
    }

    #[test]
    fn rejects_unknown_or_incomplete_commands() {
        assert_eq!(MusicCommand::parse("play", None), None);
        assert_eq!(MusicCommand::parse("pause", None), None);
    }
}
