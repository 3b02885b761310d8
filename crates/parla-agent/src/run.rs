//! Run loops for the four modes.
//!
//! All modes end on SIGINT/SIGTERM; room modes also end when the session's
//! model stream closes or the room empties out. No restart logic lives here —
//! supervised restarts belong to the external process manager.

use crate::audio::AudioBridge;
use crate::health;
use crate::mode::RunMode;
use crate::AgentError;
use parla_config::Settings;
use parla_session::{teaching_instruction, AgentSession, RealtimeClient, SessionEvent};
use tracing::{debug, info, warn};

/// Dispatches to the selected mode's run loop.
pub async fn run(mode: RunMode, settings: Settings) -> Result<(), AgentError> {
    match mode {
        RunMode::Console => run_console(&settings).await,
        RunMode::Dev => run_room_session(&settings, true).await,
        RunMode::Background => run_room_session(&settings, false).await,
        RunMode::Render => run_render(&settings).await,
    }
}

/// Console mode: model conversation wired to the local microphone and
/// speakers. No room, no avatar.
async fn run_console(settings: &Settings) -> Result<(), AgentError> {
    info!("starting console mode with local microphone and speakers");

    let client = RealtimeClient::new(settings.gemini.clone(), teaching_instruction());
    let mut conversation = client.connect().await.map_err(AgentError::from)?;
    let mut audio = AudioBridge::start()?;

    info!("conversation ready; speak into the microphone, Ctrl+C to end");

    let mut shutdown = Box::pin(shutdown_signal());
    loop {
        tokio::select! {
            chunk = audio.next_mic_chunk() => match chunk {
                Some(pcm) => conversation.send_audio_chunk(&pcm).await?,
                None => {
                    warn!("microphone stream ended");
                    break;
                }
            },
            event = conversation.next_event() => match event {
                Some(SessionEvent::Audio(pcm)) => audio.queue_playback(&pcm),
                Some(SessionEvent::Transcript(text)) => info!(%text, "teacher"),
                Some(SessionEvent::TurnComplete) => debug!("model turn complete"),
                Some(SessionEvent::Closed) | None => {
                    info!("model stream closed");
                    break;
                }
            },
            _ = &mut shutdown => {
                info!("ending conversation");
                break;
            }
        }
    }

    audio.stop();
    conversation.close().await;
    Ok(())
}

/// Dev/background/render body: full session against the configured room,
/// joined as the agent with audio bridged both ways. Dev mode additionally
/// prepares the playground room and logs a visitor join token for browser
/// participants.
async fn run_room_session(settings: &Settings, playground: bool) -> Result<(), AgentError> {
    let mut session = AgentSession::bootstrap(settings).await?;

    if playground {
        session.ensure_room().await?;
    }
    session.connect_room_audio().await?;

    if playground {
        let token = session.mint_visitor_token("playground-user", "Playground Visitor")?;
        info!(
            room = session.room_name(),
            server = %settings.livekit.url,
            "room ready for browser participants"
        );
        info!(%token, "visitor join token");
        if let Some(url) = session.avatar_url() {
            info!(%url, "avatar conversation url");
        }
    } else {
        info!(room = session.room_name(), "joined assigned room");
    }

    let mut shutdown = Box::pin(shutdown_signal());
    tokio::select! {
        result = session.run() => result?,
        _ = &mut shutdown => info!("shutdown requested"),
    }

    session.shutdown().await;
    Ok(())
}

/// Render mode: background behavior plus the health endpoint. The listener
/// binds before the session bootstraps so liveness probes succeed
/// independently of session readiness.
async fn run_render(settings: &Settings) -> Result<(), AgentError> {
    let listener = health::bind(settings.health_port).await?;
    info!(port = settings.health_port, "health endpoint listening");

    tokio::spawn(async move {
        if let Err(e) = health::serve(listener).await {
            warn!(error = %e, "health endpoint stopped");
        }
    });

    run_room_session(settings, false).await
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
