use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        skip_command(),
        stop_command(),
        pause_command(),
        resume_command(),
        queue_command(),
        nowplaying_command(),
        remove_command(),
        shuffle_command(),
        clear_command(),
        loop_command(),
        volume_command(),
        join_command(),
        leave_command(),
        stay_command(),
        cachestats_command(),
        cacheclear_command(),
        help_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción por URL o búsqueda")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::Boolean,
            "next",
            "Poner al frente de la cola",
        ))
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta la pista actual (por votación si hay público)")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción y limpia la cola")
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción pausada")
}

// Comandos de cola

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Muestra la cola de reproducción")
        .add_option(CreateCommandOption::new(
            CommandOptionType::Integer,
            "page",
            "Página a mostrar",
        ))
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Muestra la pista actual")
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Elimina una pista de la cola por posición")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "position",
                "Posición en la cola (1 = siguiente)",
            )
            .min_int_value(1)
            .required(true),
        )
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Baraja las pistas en espera")
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear").description("Vacía la cola de reproducción")
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop").description("Cicla el modo de repetición: off → pista → cola")
}

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Ajusta el volumen de la guild")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "percent",
                "Volumen de 0 a 100",
            )
            .min_int_value(0)
            .max_int_value(100)
            .required(true),
        )
}

// Comandos de conexión

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Conecta el bot a tu canal de voz")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Desconecta el bot del canal de voz")
}

fn stay_command() -> CreateCommand {
    CreateCommand::new("stay").description("Activa o desactiva el modo 24/7 (no desconectar por inactividad)")
}

// Comandos de operación

fn cachestats_command() -> CreateCommand {
    CreateCommand::new("cachestats").description("Muestra estadísticas del caché de audio")
}

fn cacheclear_command() -> CreateCommand {
    CreateCommand::new("cacheclear")
        .description("Vacía el caché de audio (solo administradores)")
}

fn help_command() -> CreateCommand {
    CreateCommand::new("help").description("Muestra la ayuda del bot")
}
