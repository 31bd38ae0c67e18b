use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseFollowup,
        CreateInteractionResponseMessage,
    },
    model::{application::CommandInteraction, id::GuildId},
    prelude::Context,
};
use songbird::Call;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::{
    audio::queue::{LoopMode, SkipVerdict, Track},
    bot::ResonanceBot,
    ui::embeds,
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &ResonanceBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, command, bot, guild_id).await?,
        "skip" => handle_skip(ctx, command, bot, guild_id).await?,
        "stop" => handle_stop(ctx, command, bot, guild_id).await?,
        "pause" => handle_pause(ctx, command, bot, guild_id).await?,
        "resume" => handle_resume(ctx, command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, command, bot, guild_id).await?,
        "nowplaying" => handle_nowplaying(ctx, command, bot, guild_id).await?,
        "remove" => handle_remove(ctx, command, bot, guild_id).await?,
        "shuffle" => handle_shuffle(ctx, command, bot, guild_id).await?,
        "clear" => handle_clear(ctx, command, bot, guild_id).await?,
        "loop" => handle_loop(ctx, command, bot, guild_id).await?,
        "volume" => handle_volume(ctx, command, bot, guild_id).await?,
        "join" => handle_join(ctx, command, bot, guild_id).await?,
        "leave" => handle_leave(ctx, command, bot, guild_id).await?,
        "stay" => handle_stay(ctx, command, bot, guild_id).await?,
        "cachestats" => handle_cachestats(ctx, command, bot).await?,
        "cacheclear" => handle_cacheclear(ctx, command, bot).await?,
        "help" => handle_help(ctx, command).await?,
        _ => {
            respond_ephemeral(ctx, &command, "❌ Comando no reconocido").await?;
        }
    }

    Ok(())
}

// --- Respuestas ---

async fn respond_text(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().content(content),
            ),
        )
        .await?;
    Ok(())
}

async fn respond_ephemeral(
    ctx: &Context,
    command: &CommandInteraction,
    content: &str,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

async fn respond_embed(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embed),
            ),
        )
        .await?;
    Ok(())
}

// --- Utilidades de voz ---

/// Canal de voz donde está el usuario, si está en alguno
fn user_voice_channel(
    ctx: &Context,
    guild_id: GuildId,
    user_id: serenity::model::id::UserId,
) -> Option<serenity::model::id::ChannelId> {
    let guild = ctx.cache.guild(guild_id)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|vs| vs.channel_id)
}

/// Cuenta los miembros no-bot en el canal de voz del bot
fn count_listeners(ctx: &Context, guild_id: GuildId) -> usize {
    let Some(guild) = ctx.cache.guild(guild_id) else {
        return 0;
    };
    let bot_id = ctx.cache.current_user().id;
    let Some(bot_channel) = guild
        .voice_states
        .get(&bot_id)
        .and_then(|vs| vs.channel_id)
    else {
        return 0;
    };

    guild
        .voice_states
        .values()
        .filter(|vs| vs.channel_id == Some(bot_channel))
        .filter(|vs| vs.user_id != bot_id)
        .filter(|vs| vs.member.as_ref().map_or(true, |m| !m.user.bot))
        .count()
}

/// Devuelve la conexión de voz de la guild, uniéndose al canal del usuario
/// si todavía no hay una.
async fn ensure_connected(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &ResonanceBot,
    guild_id: GuildId,
) -> Result<Option<Arc<Mutex<Call>>>> {
    if let Some(call) = bot.get_voice_handler(guild_id) {
        // La conexión pudo morir sin que el handler se limpiara todavía
        let connected = { call.lock().await.current_connection().is_some() };
        if connected {
            return Ok(Some(call));
        }
    }

    match user_voice_channel(ctx, guild_id, command.user.id) {
        Some(channel_id) => {
            let call = bot.join_voice_channel(ctx, guild_id, channel_id).await?;

            // Aplicar el volumen persistido de la guild a la cola nueva
            if let Some(volume) = bot.settings.lock().await.volume(guild_id.get()) {
                bot.player.set_volume(guild_id, volume);
            }

            Ok(Some(call))
        }
        None => Ok(None),
    }
}

// --- Handlers ---

async fn handle_play(
    ctx: &Context,
    command: CommandInteraction,
    bot: &ResonanceBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(query) = command
        .data
        .options
        .iter()
        .find(|o| o.name == "query")
        .and_then(|o| o.value.as_str())
        .map(str::to_string)
    else {
        respond_ephemeral(ctx, &command, "❌ Falta el término de búsqueda").await?;
        return Ok(());
    };
    let play_top = command
        .data
        .options
        .iter()
        .find(|o| o.name == "next")
        .and_then(|o| o.value.as_bool())
        .unwrap_or(false);

    // Resolver metadatos y descargar puede tardar más que la ventana de
    // respuesta de Discord
    command.defer(&ctx.http).await?;

    let Some(call) = ensure_connected(ctx, &command, bot, guild_id).await? else {
        command
            .create_followup(
                &ctx.http,
                CreateInteractionResponseFollowup::new()
                    .content("🔇 Necesitas estar en un canal de voz"),
            )
            .await?;
        return Ok(());
    };

    let track = Track::from_request(&query, command.user.id);
    let was_playing = bot.player.is_playing(guild_id).await;

    match bot.player.play(guild_id, track.clone(), call, play_top).await {
        Ok(position) => {
            let embed = if was_playing {
                embeds::create_track_added_embed(&track, position)
            } else if let Some(now) = bot.player.now_playing(guild_id) {
                embeds::create_now_playing_embed(&now)
            } else {
                embeds::create_error_embed("No se pudo reproducir la pista")
            };
            command
                .create_followup(&ctx.http, CreateInteractionResponseFollowup::new().embed(embed))
                .await?;
        }
        Err(e) => {
            command
                .create_followup(
                    &ctx.http,
                    CreateInteractionResponseFollowup::new()
                        .embed(embeds::create_error_embed(&e.to_string())),
                )
                .await?;
        }
    }

    Ok(())
}

async fn handle_skip(
    ctx: &Context,
    command: CommandInteraction,
    bot: &ResonanceBot,
    guild_id: GuildId,
) -> Result<()> {
    if bot.player.now_playing(guild_id).is_none() {
        respond_ephemeral(ctx, &command, "📭 No hay nada sonando").await?;
        return Ok(());
    }

    let listeners = count_listeners(ctx, guild_id);
    match bot.player.vote_skip(guild_id, command.user.id, listeners) {
        SkipVerdict::Passed => {
            bot.player.skip(guild_id);
            respond_text(ctx, &command, "⏭️ Pista saltada").await?;
        }
        SkipVerdict::Pending { votes, needed } => {
            respond_text(
                ctx,
                &command,
                &format!("🗳️ Voto de salto: **{}/{}** votos", votes, needed),
            )
            .await?;
        }
    }

    Ok(())
}

async fn handle_stop(
    ctx: &Context,
    command: CommandInteraction,
    bot: &ResonanceBot,
    guild_id: GuildId,
) -> Result<()> {
    bot.player.stop(guild_id);
    respond_text(ctx, &command, "⏹️ Reproducción detenida y cola limpiada").await
}

async fn handle_pause(
    ctx: &Context,
    command: CommandInteraction,
    bot: &ResonanceBot,
    guild_id: GuildId,
) -> Result<()> {
    bot.player.pause(guild_id);
    respond_text(ctx, &command, "⏸️ Pausado").await
}

async fn handle_resume(
    ctx: &Context,
    command: CommandInteraction,
    bot: &ResonanceBot,
    guild_id: GuildId,
) -> Result<()> {
    bot.player.resume(guild_id);
    respond_text(ctx, &command, "▶️ Reanudado").await
}

async fn handle_queue(
    ctx: &Context,
    command: CommandInteraction,
    bot: &ResonanceBot,
    guild_id: GuildId,
) -> Result<()> {
    let page = command
        .data
        .options
        .iter()
        .find(|o| o.name == "page")
        .and_then(|o| o.value.as_i64())
        .map(|p| p.max(1) as usize)
        .unwrap_or(1);

    let snapshot = bot.player.queue_snapshot(guild_id);
    respond_embed(ctx, &command, embeds::create_queue_embed(&snapshot, page)).await
}

async fn handle_nowplaying(
    ctx: &Context,
    command: CommandInteraction,
    bot: &ResonanceBot,
    guild_id: GuildId,
) -> Result<()> {
    match bot.player.now_playing(guild_id) {
        Some(track) => respond_embed(ctx, &command, embeds::create_now_playing_embed(&track)).await,
        None => respond_ephemeral(ctx, &command, "📭 No hay nada sonando").await,
    }
}

async fn handle_remove(
    ctx: &Context,
    command: CommandInteraction,
    bot: &ResonanceBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(position) = command
        .data
        .options
        .iter()
        .find(|o| o.name == "position")
        .and_then(|o| o.value.as_i64())
        .filter(|p| *p >= 1)
    else {
        respond_ephemeral(ctx, &command, "❌ Posición inválida").await?;
        return Ok(());
    };

    // El comando es 1-indexado; la cola interna es 0-indexada
    match bot.player.remove(guild_id, (position - 1) as usize) {
        Some(track) => {
            respond_text(ctx, &command, &format!("🗑️ Eliminado: **{}**", track.title)).await
        }
        None => {
            respond_ephemeral(
                ctx,
                &command,
                &format!("❌ No hay pista en la posición {}", position),
            )
            .await
        }
    }
}

async fn handle_shuffle(
    ctx: &Context,
    command: CommandInteraction,
    bot: &ResonanceBot,
    guild_id: GuildId,
) -> Result<()> {
    bot.player.shuffle(guild_id);
    respond_text(ctx, &command, "🔀 Cola barajada").await
}

async fn handle_clear(
    ctx: &Context,
    command: CommandInteraction,
    bot: &ResonanceBot,
    guild_id: GuildId,
) -> Result<()> {
    bot.player.clear(guild_id);
    respond_text(ctx, &command, "🗑️ Cola vaciada").await
}

async fn handle_loop(
    ctx: &Context,
    command: CommandInteraction,
    bot: &ResonanceBot,
    guild_id: GuildId,
) -> Result<()> {
    let mode = bot.player.cycle_loop_mode(guild_id);
    let label = match mode {
        LoopMode::Off => "➡️ Repetición desactivada",
        LoopMode::Track => "🔂 Repitiendo la pista actual",
        LoopMode::Queue => "🔁 Repitiendo la cola",
    };
    respond_text(ctx, &command, label).await
}

async fn handle_volume(
    ctx: &Context,
    command: CommandInteraction,
    bot: &ResonanceBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(percent) = command
        .data
        .options
        .iter()
        .find(|o| o.name == "percent")
        .and_then(|o| o.value.as_i64())
    else {
        respond_ephemeral(ctx, &command, "❌ Falta el porcentaje").await?;
        return Ok(());
    };

    let volume = bot
        .player
        .set_volume(guild_id, percent.clamp(0, 100) as f32 / 100.0);

    // Persistir como volumen por defecto de la guild
    bot.settings
        .lock()
        .await
        .set_volume(guild_id.get(), volume)
        .await?;

    respond_text(
        ctx,
        &command,
        &format!("🔊 Volumen: **{}%**", (volume * 100.0) as u8),
    )
    .await
}

async fn handle_join(
    ctx: &Context,
    command: CommandInteraction,
    bot: &ResonanceBot,
    guild_id: GuildId,
) -> Result<()> {
    match ensure_connected(ctx, &command, bot, guild_id).await? {
        Some(_) => respond_text(ctx, &command, "🔊 Conectado a tu canal de voz").await,
        None => respond_ephemeral(ctx, &command, "🔇 Necesitas estar en un canal de voz").await,
    }
}

async fn handle_leave(
    ctx: &Context,
    command: CommandInteraction,
    bot: &ResonanceBot,
    guild_id: GuildId,
) -> Result<()> {
    bot.player.stop(guild_id);
    bot.leave_voice_channel(ctx, guild_id).await?;
    respond_text(ctx, &command, "👋 Desconectado del canal de voz").await
}

async fn handle_stay(
    ctx: &Context,
    command: CommandInteraction,
    bot: &ResonanceBot,
    guild_id: GuildId,
) -> Result<()> {
    let enabled = bot
        .settings
        .lock()
        .await
        .toggle_stay_connected(guild_id.get())
        .await?;

    let message = if enabled {
        "📌 Modo 24/7 **activado**: me quedaré en el canal de voz"
    } else {
        "💤 Modo 24/7 **desactivado**: me desconectaré tras la inactividad"
    };
    respond_text(ctx, &command, message).await
}

async fn handle_cachestats(
    ctx: &Context,
    command: CommandInteraction,
    bot: &ResonanceBot,
) -> Result<()> {
    let stats = bot.cache.stats().await;
    respond_embed(ctx, &command, embeds::create_cache_stats_embed(&stats)).await
}

async fn handle_cacheclear(
    ctx: &Context,
    command: CommandInteraction,
    bot: &ResonanceBot,
) -> Result<()> {
    let is_admin = command
        .member
        .as_ref()
        .and_then(|m| m.permissions)
        .map_or(false, |p| p.administrator());

    if !is_admin {
        respond_ephemeral(ctx, &command, "🔒 Solo administradores pueden vaciar el caché").await?;
        return Ok(());
    }

    bot.cache.clear_all().await?;
    respond_text(ctx, &command, "🧹 Caché de audio vaciado").await
}

async fn handle_help(ctx: &Context, command: CommandInteraction) -> Result<()> {
    let help = "**🎵 Resonance**\n\
        `/play <query>` — reproduce por URL o búsqueda (`next:true` para ponerla al frente)\n\
        `/skip` — salta la pista (por votación si hay público)\n\
        `/stop` `/pause` `/resume` — control de reproducción\n\
        `/queue [page]` `/nowplaying` — qué suena y qué sigue\n\
        `/remove <position>` `/shuffle` `/clear` — edición de la cola\n\
        `/loop` — off → pista → cola\n\
        `/volume <percent>` — volumen de la guild\n\
        `/join` `/leave` `/stay` — conexión de voz y modo 24/7\n\
        `/cachestats` `/cacheclear` — operación del caché de audio";
    respond_text(ctx, &command, help).await
}
