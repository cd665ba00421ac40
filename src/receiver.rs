//! Receivers available to the CLI.
//!
//! Device discovery and cast protocols live outside reelcast; the binary
//! either hands each URL to a local player command or just logs it so an
//! external controller can pick it up.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rc_core::{Error, ItemId};
use rc_pipeline::{PlaybackSink, Receiver};
use tokio_util::sync::CancellationToken;

const URL_PLACEHOLDER: &str = "{url}";

/// Build the argument list for one URL. The URL is appended when no
/// argument carries the placeholder.
pub fn player_args(command: &[String], url: &str) -> Vec<String> {
    let mut args: Vec<String> = command
        .iter()
        .map(|a| a.replace(URL_PLACEHOLDER, url))
        .collect();
    if !command.iter().any(|a| a.contains(URL_PLACEHOLDER)) {
        args.push(url.to_string());
    }
    args
}

#[derive(Default)]
struct PlayerState {
    loaded: Option<(ItemId, String)>,
    running: Option<CancellationToken>,
}

/// Plays each item by running an external player, e.g. `mpv {url}`.
///
/// The player exiting on its own counts as playback complete.
pub struct CommandReceiver {
    command: Vec<String>,
    sink: PlaybackSink,
    state: Arc<Mutex<PlayerState>>,
}

impl CommandReceiver {
    pub fn new(command: Vec<String>, sink: PlaybackSink) -> rc_core::Result<Self> {
        if command.is_empty() {
            return Err(Error::Validation("player command is empty".into()));
        }
        Ok(Self {
            command,
            sink,
            state: Arc::new(Mutex::new(PlayerState::default())),
        })
    }

    fn spawn_player(&self, item_id: ItemId, url: &str) -> rc_core::Result<CancellationToken> {
        let args = player_args(&self.command, url);
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| Error::Validation("player command is empty".into()))?;

        let mut child = tokio::process::Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::tool(program.as_str(), format!("failed to start player: {e}")))?;
        tracing::info!(player = %program, %url, "player started");

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let sink = self.sink.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancelled.cancelled() => {
                    if let Err(e) = child.kill().await {
                        tracing::debug!("failed to kill player: {e}");
                    }
                }
                status = child.wait() => {
                    match status {
                        Ok(status) if status.success() => tracing::debug!("player exited"),
                        Ok(status) => tracing::warn!("player exited with {status}"),
                        Err(e) => tracing::warn!("failed to wait for player: {e}"),
                    }
                    if !cancelled.is_cancelled() {
                        sink.playback_complete(item_id);
                    }
                }
            }
        });
        Ok(token)
    }

    fn stop_player(&self) {
        if let Some(token) = self.state.lock().running.take() {
            token.cancel();
        }
    }
}

#[async_trait]
impl Receiver for CommandReceiver {
    fn name(&self) -> &str {
        "command"
    }

    async fn load(&self, item_id: ItemId, url: &str, _metadata_url: &str) -> rc_core::Result<()> {
        self.stop_player();
        self.state.lock().loaded = Some((item_id, url.to_string()));
        Ok(())
    }

    async fn play(&self) -> rc_core::Result<()> {
        let (item_id, url) = {
            let state = self.state.lock();
            if state.running.is_some() {
                return Ok(());
            }
            state
                .loaded
                .clone()
                .ok_or_else(|| Error::Validation("nothing loaded".into()))?
        };
        let token = self.spawn_player(item_id, &url)?;
        self.state.lock().running = Some(token);
        Ok(())
    }

    async fn pause(&self) -> rc_core::Result<()> {
        Err(Error::Validation("the external player cannot be paused remotely".into()))
    }

    async fn seek(&self, _position: Duration) -> rc_core::Result<()> {
        Err(Error::Validation("the external player cannot seek remotely".into()))
    }

    async fn stop(&self) -> rc_core::Result<()> {
        self.stop_player();
        Ok(())
    }
}

/// Logs every URL it is asked to play. Playback never completes on its own.
#[derive(Debug, Default)]
pub struct LoggingReceiver;

#[async_trait]
impl Receiver for LoggingReceiver {
    fn name(&self) -> &str {
        "log"
    }

    async fn load(&self, item_id: ItemId, url: &str, metadata_url: &str) -> rc_core::Result<()> {
        tracing::info!(%item_id, %url, %metadata_url, "ready to cast");
        Ok(())
    }

    async fn play(&self) -> rc_core::Result<()> {
        Ok(())
    }

    async fn pause(&self) -> rc_core::Result<()> {
        Ok(())
    }

    async fn seek(&self, position: Duration) -> rc_core::Result<()> {
        tracing::info!(position_secs = position.as_secs_f64(), "seek");
        Ok(())
    }

    async fn stop(&self) -> rc_core::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &[&str]) -> Vec<String> {
        cmd.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn placeholder_is_substituted() {
        assert_eq!(
            player_args(&args(&["mpv", "--title=x", "{url}"]), "http://h/media/1"),
            args(&["mpv", "--title=x", "http://h/media/1"])
        );
    }

    #[test]
    fn url_is_appended_without_placeholder() {
        assert_eq!(
            player_args(&args(&["vlc", "--play-and-exit"]), "http://h/media/1"),
            args(&["vlc", "--play-and-exit", "http://h/media/1"])
        );
    }
}
