use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::{
    controller::{Notice, PlaybackState, SessionSnapshot},
    resolver::ResolutionMethod,
    session::EnqueueOutcome,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Open Music Bot";

/// Canciones pendientes listadas en `/queue`
const QUEUE_PREVIEW: usize = 10;

/// Embed para cada aviso que una sesión publica en su canal de texto
pub fn create_notice_embed(notice: &Notice) -> CreateEmbed {
    match notice {
        Notice::NowPlaying {
            title,
            url,
            duration,
            thumbnail,
            requester,
        } => {
            let mut embed = CreateEmbed::default()
                .title("🎵 Reproduciendo Ahora")
                .description(format!("**{}**", title))
                .color(colors::SUCCESS_GREEN)
                .field("⏱️ Duración", duration_label(*duration), true)
                .field("👤 Solicitado por", requester, true)
                .url(url);

            if let Some(thumbnail) = thumbnail {
                embed = embed.thumbnail(thumbnail);
            }

            finish(embed)
        }
        Notice::TrackFailed { title, reason } => finish(
            CreateEmbed::default()
                .title("⚠️ No se pudo reproducir")
                .description(format!("**{}**\n{}\n\n⏭️ Pasando a la siguiente canción", title, reason))
                .color(colors::WARNING_ORANGE),
        ),
        Notice::IdleDisconnect { idle } => finish(
            CreateEmbed::default()
                .title("💤 Desconectado por inactividad")
                .description(format!(
                    "Salí del canal de voz después de {} sin reproducir música.\nUsa `/music` para volver a llamarme.",
                    humantime::format_duration(*idle)
                ))
                .color(colors::NEUTRAL_GRAY),
        ),
        Notice::ConnectionLost { reason } => finish(
            CreateEmbed::default()
                .title("🔌 Conexión de voz perdida")
                .description(format!(
                    "{}\nLa cola se vació. Usa `/music` para reconectar.",
                    reason
                ))
                .color(colors::ERROR_RED),
        ),
    }
}

/// Confirmación de `/play`
pub fn create_track_added_embed(query: &str, outcome: &EnqueueOutcome) -> CreateEmbed {
    let footer = if outcome.starts_now {
        "🎵 Empieza a sonar en cuanto se resuelva"
    } else {
        "🎵 Se reproducirá automáticamente cuando le toque"
    };

    CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!("**{}**", query))
        .color(colors::SUCCESS_GREEN)
        .field("📍 Posición", (outcome.position + 1).to_string(), true)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(footer))
}

pub fn create_queue_embed(snapshot: &SessionSnapshot) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if snapshot.state == PlaybackState::Idle && snapshot.pending.is_empty() {
        return finish(
            embed
                .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
                .color(colors::NEUTRAL_GRAY),
        );
    }

    embed = embed.field(status_title(snapshot), current_line(snapshot), false);

    if !snapshot.pending.is_empty() {
        embed = embed.field("Próximas canciones", pending_lines(snapshot), false);
    }

    let mut info = format!(
        "**Total:** {}/{} en cola • **Volumen:** {}%",
        snapshot.pending.len(),
        snapshot.capacity,
        (snapshot.volume * 100.0).round() as u32
    );
    if let Some(channel) = snapshot.voice_channel {
        info.push_str(&format!(" • 🔊 <#{}>", channel));
    }

    finish(embed.field("Información", info, false).color(match snapshot.state {
        PlaybackState::Streaming => colors::MUSIC_PURPLE,
        _ => colors::INFO_BLUE,
    }))
}

pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    finish(
        CreateEmbed::default()
            .title(format!("❌ {}", title))
            .description(description)
            .color(colors::ERROR_RED),
    )
}

pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    finish(
        CreateEmbed::default()
            .title(format!("✅ {}", title))
            .description(description)
            .color(colors::SUCCESS_GREEN),
    )
}

pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    finish(
        CreateEmbed::default()
            .title(format!("ℹ️ {}", title))
            .description(description)
            .color(colors::INFO_BLUE),
    )
}

fn finish(embed: CreateEmbed) -> CreateEmbed {
    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn status_title(snapshot: &SessionSnapshot) -> &'static str {
    match snapshot.state {
        PlaybackState::Streaming => "▶️ Reproduciendo",
        PlaybackState::Resolving => "🔎 Preparando",
        PlaybackState::Idle => "⏹️ Detenido",
    }
}

fn current_line(snapshot: &SessionSnapshot) -> String {
    if let Some(current) = &snapshot.current {
        let via = match current.method {
            ResolutionMethod::Primary => "",
            ResolutionMethod::Fallback => " 💾",
        };
        return format!(
            "**[{}]({})**{}\n`{}` • {}",
            current.title,
            current.url,
            via,
            progress_label(current.elapsed, current.duration),
            current.requester_name
        );
    }

    match &snapshot.resolving {
        Some(request) => format!("**{}** • {}", request.raw(), request.requester_name()),
        None => "Nada sonando".to_string(),
    }
}

fn pending_lines(snapshot: &SessionSnapshot) -> String {
    let mut lines: Vec<String> = snapshot
        .pending
        .iter()
        .take(QUEUE_PREVIEW)
        .enumerate()
        .map(|(i, request)| format!("**{}**. {} • {}", i + 1, request.raw(), request.requester_name()))
        .collect();

    let hidden = snapshot.pending.len().saturating_sub(QUEUE_PREVIEW);
    if hidden > 0 {
        lines.push(format!("… y {} más", hidden));
    }

    lines.join("\n")
}

fn duration_label(duration: Option<Duration>) -> String {
    match duration {
        Some(duration) => format_duration(duration),
        None => "🔴 En vivo".to_string(),
    }
}

fn progress_label(elapsed: Duration, duration: Option<Duration>) -> String {
    match duration {
        Some(total) => format!("{} / {}", format_duration(elapsed.min(total)), format_duration(total)),
        None => format!("{} / 🔴", format_duration(elapsed)),
    }
}

/// Formatea una duración en formato legible
fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{connection::ConnectionState, controller::CurrentTrack, queue::TrackRequest};
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;

    fn snapshot(pending: usize) -> SessionSnapshot {
        SessionSnapshot {
            state: PlaybackState::Streaming,
            connection: ConnectionState::Streaming,
            voice_channel: None,
            current: Some(CurrentTrack {
                title: "Intro".to_string(),
                url: "https://www.youtube.com/watch?v=abc".to_string(),
                duration: Some(Duration::from_secs(200)),
                elapsed: Duration::from_secs(65),
                thumbnail: None,
                requester_name: "ana".to_string(),
                method: ResolutionMethod::Primary,
            }),
            resolving: None,
            pending: (0..pending)
                .map(|i| TrackRequest::new(&format!("tema {}", i), UserId::new(1), "ana").unwrap())
                .collect(),
            capacity: 100,
            volume: 0.5,
        }
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
        assert_eq!(duration_label(None), "🔴 En vivo");
    }

    #[test]
    fn progress_never_exceeds_total() {
        assert_eq!(
            progress_label(Duration::from_secs(250), Some(Duration::from_secs(200))),
            "3:20 / 3:20"
        );
        assert_eq!(progress_label(Duration::from_secs(61), None), "1:01 / 🔴");
    }

    #[test]
    fn current_line_shows_progress_and_requester() {
        assert_eq!(
            current_line(&snapshot(0)),
            "**[Intro](https://www.youtube.com/watch?v=abc)**\n`1:05 / 3:20` • ana"
        );
    }

    #[test]
    fn pending_lines_are_truncated() {
        let lines = pending_lines(&snapshot(12));
        assert!(lines.starts_with("**1**. tema 0 • ana"));
        assert!(lines.ends_with("… y 2 más"));
        assert_eq!(lines.lines().count(), QUEUE_PREVIEW + 1);
    }

    #[test]
    fn resolving_request_is_listed_when_nothing_plays() {
        let mut snap = snapshot(0);
        snap.state = PlaybackState::Resolving;
        snap.current = None;
        snap.resolving = TrackRequest::new("otra canción", UserId::new(2), "beto");
        assert_eq!(status_title(&snap), "🔎 Preparando");
        assert_eq!(current_line(&snap), "**otra canción** • beto");
    }
}
