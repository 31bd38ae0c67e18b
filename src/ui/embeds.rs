use num_format::{Locale, ToFormattedString};
use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::player::QueueSnapshot;
use crate::audio::queue::{LoopMode, Track};
use crate::cache::CacheStats;

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Resonance";

/// Pistas por página en la vista de cola
pub const TRACKS_PER_PAGE: usize = 10;

/// Crea un embed para mostrar la pista actual
pub fn create_now_playing_embed(track: &Track) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title))
        .color(colors::SUCCESS_GREEN);

    if track.is_live {
        embed = embed.field("⏱️ Duración", "🔴 En vivo", true);
    } else if track.duration_secs > 0 {
        embed = embed.field("⏱️ Duración", format_track_duration(track.duration_secs), true);
    }

    embed = embed.field(
        "👤 Solicitado por",
        format!("<@{}>", track.requested_by),
        true,
    );

    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    if !track.url.is_empty() {
        embed = embed.url(&track.url);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para confirmar que se agregó una pista
pub fn create_track_added_embed(track: &Track, position: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("✅ Agregado a la Cola")
        .description(format!("**{}**", track.title))
        .color(colors::SUCCESS_GREEN)
        .field("📍 Posición", position.to_string(), true)
        .field(
            "👤 Solicitado por",
            format!("<@{}>", track.requested_by),
            true,
        );

    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed.footer(CreateEmbedFooter::new(
        "🎵 Se reproducirá automáticamente si no hay música sonando",
    ))
}

/// Crea un embed con una página de la cola
pub fn create_queue_embed(snapshot: &QueueSnapshot, page: usize) -> CreateEmbed {
    let total = snapshot.pending.len();
    let total_pages = if total == 0 {
        1
    } else {
        (total + TRACKS_PER_PAGE - 1) / TRACKS_PER_PAGE
    };
    let page = page.clamp(1, total_pages);
    let start = (page - 1) * TRACKS_PER_PAGE;
    let end = (start + TRACKS_PER_PAGE).min(total);

    let mut description = String::new();

    if let Some(current) = &snapshot.current {
        description.push_str(&format!("**▶️ Ahora:** {}\n\n", current.title));
    }

    if total == 0 {
        description.push_str("📭 No hay pistas en espera");
    } else {
        for (offset, track) in snapshot.pending[start..end].iter().enumerate() {
            description.push_str(&format!(
                "`{}.` {} `[{}]`\n",
                start + offset + 1,
                track.title,
                format_track_duration(track.duration_secs)
            ));
        }
    }

    let loop_label = match snapshot.loop_mode {
        LoopMode::Off => "➡️ off",
        LoopMode::Track => "🔂 pista",
        LoopMode::Queue => "🔁 cola",
    };

    CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .description(description)
        .color(colors::MUSIC_PURPLE)
        .field("🎶 En espera", total.to_string(), true)
        .field(
            "⏱️ Duración total",
            humantime::format_duration(Duration::from_secs(snapshot.total_duration_secs))
                .to_string(),
            true,
        )
        .field("🔄 Repetición", loop_label, true)
        .footer(CreateEmbedFooter::new(format!(
            "Página {}/{} · {}",
            page, total_pages, STANDARD_FOOTER
        )))
}

/// Crea el reporte de estadísticas del caché para operadores
pub fn create_cache_stats_embed(stats: &CacheStats) -> CreateEmbed {
    CreateEmbed::default()
        .title("📊 Estadísticas del Caché de Audio")
        .color(colors::INFO_BLUE)
        .field("🗂️ Entradas", stats.count.to_string(), true)
        .field(
            "💾 Tamaño",
            format!("{:.1} / {} MB", stats.total_size_mb(), stats.max_size_mb()),
            true,
        )
        .field(
            "🎯 Hits / Misses",
            format!(
                "{} / {}",
                stats.hits.to_formatted_string(&Locale::en),
                stats.misses.to_formatted_string(&Locale::en)
            ),
            true,
        )
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de error genérico
pub fn create_error_embed(message: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("❌ Error")
        .description(message.to_string())
        .color(colors::ERROR_RED)
}

fn format_track_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
