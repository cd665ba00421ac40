//! Queue controller actor.
//!
//! The controller keeps a window of `1 + max_lookahead` items starting at the
//! selected item. Items in the window are probed as soon as they enter it;
//! the selected item is transcoded immediately and the lookahead items once
//! the selected one is done (or right away when `prefetch_after_current` is
//! off). Jobs outside the window are cancelled and their output removed.
//!
//! Playback of the current item starts when its bytes are servable:
//!
//! - after an automatic advance, once its job has finished;
//! - after an explicit selection, once `start_lead_secs` of output exist.
//!
//! Direct-play items start immediately in both cases.

use std::collections::HashSet;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rc_av::SubtitleSource;
use rc_core::config::{ProbeConfig, QueueConfig, TranscodeConfig};
use rc_core::events::{EventBus, EventPayload};
use rc_core::{Error, ItemId, ItemState, JobState, ProbeError, Result};
use rc_probe::{MediaInfo, Prober};
use tokio::sync::mpsc;

use super::commands::{ControllerEvent, QueueCommand};
use super::handle::QueueHandle;
use super::state::{PlaybackSnapshot, PlaybackStatus, QueueItem, QueueSnapshot};
use crate::device::DeviceProfile;
use crate::planner::{self, SubtitleSelection, TranscodePlan};
use crate::receiver::Receiver;
use crate::serve::{MediaMetadata, MediaSource, ServeEntry, ServeTable};
use crate::transcoder::{JobEvent, JobRequest, TranscodeManager};

const COMMAND_BUFFER: usize = 100;

/// Static inputs of the controller.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub queue: QueueConfig,
    pub transcode: TranscodeConfig,
    pub probe: ProbeConfig,
    pub ffmpeg: PathBuf,
    pub device: DeviceProfile,
    /// Streaming server base URL as reachable from the receiver.
    pub base_url: String,
}

/// Condition for starting playback of the current item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartGate {
    /// The job must have finished.
    Finished,
    /// `start_lead_secs` of output must exist.
    Lead,
}

/// Spawn the controller task and return a handle to it.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_queue_controller(
    settings: ControllerSettings,
    prober: Arc<dyn Prober>,
    events: Arc<EventBus>,
    serve: ServeTable,
) -> QueueHandle {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (job_tx, job_rx) = mpsc::unbounded_channel();

    let transcoder = TranscodeManager::new(settings.ffmpeg.clone(), settings.transcode.clone())
        .with_events(job_tx);
    let controller = QueueController {
        settings,
        prober,
        transcoder: Arc::new(transcoder),
        events,
        serve,
        receiver: None,
        event_tx: event_tx.clone(),
        items: Vec::new(),
        current: None,
        selected: None,
        start_gate: None,
        announced_preparing: None,
        playback: PlaybackSnapshot::default(),
    };
    tokio::spawn(controller.run(command_rx, job_rx, event_rx));
    QueueHandle::new(command_tx, event_tx)
}

struct QueueController {
    settings: ControllerSettings,
    prober: Arc<dyn Prober>,
    transcoder: Arc<TranscodeManager>,
    events: Arc<EventBus>,
    serve: ServeTable,
    receiver: Option<Arc<dyn Receiver>>,
    event_tx: mpsc::UnboundedSender<ControllerEvent>,
    items: Vec<QueueItem>,
    /// The selected item once it has been probed.
    current: Option<ItemId>,
    /// Anchor of the window.
    selected: Option<ItemId>,
    start_gate: Option<StartGate>,
    announced_preparing: Option<ItemId>,
    playback: PlaybackSnapshot,
}

impl QueueController {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<QueueCommand>,
        mut jobs: mpsc::UnboundedReceiver<JobEvent>,
        mut internal: mpsc::UnboundedReceiver<ControllerEvent>,
    ) {
        tracing::info!(device = %self.settings.device.name, "queue controller started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            break;
                        }
                    }
                    None => {
                        tracing::debug!("all queue handles dropped");
                        self.shutdown().await;
                        break;
                    }
                },
                Some(event) = jobs.recv() => self.handle_job_event(event).await,
                Some(event) = internal.recv() => self.handle_event(event).await,
            }
            self.publish();
        }
        tracing::info!("queue controller stopped");
    }

    /// Returns `false` when the controller should stop.
    async fn handle_command(&mut self, command: QueueCommand) -> bool {
        match command {
            QueueCommand::AddFiles { paths, responder } => {
                let ids = self.add_files(paths);
                self.refresh().await;
                let _ = responder.send(ids);
            }
            QueueCommand::SetCurrent { index, responder } => {
                let _ = responder.send(self.set_current(index).await);
            }
            QueueCommand::Remove { index, responder } => {
                let _ = responder.send(self.remove(index).await);
            }
            QueueCommand::Reorder {
                from,
                to,
                responder,
            } => {
                let _ = responder.send(self.reorder(from, to).await);
            }
            QueueCommand::Retry { index, responder } => {
                let _ = responder.send(self.retry(index).await);
            }
            QueueCommand::Skip { responder } => {
                let _ = responder.send(self.skip().await);
            }
            QueueCommand::SelectStreams {
                index,
                audio,
                subtitle,
                responder,
            } => {
                let _ = responder.send(self.select_streams(index, audio, subtitle).await);
            }
            QueueCommand::Pause { responder } => {
                let _ = responder.send(self.pause().await);
            }
            QueueCommand::Resume { responder } => {
                let _ = responder.send(self.resume().await);
            }
            QueueCommand::Seek {
                position,
                responder,
            } => {
                let _ = responder.send(self.seek(position).await);
            }
            QueueCommand::Stop { responder } => {
                self.start_gate = None;
                self.stop_playback().await;
                let _ = responder.send(Ok(()));
            }
            QueueCommand::Snapshot { responder } => {
                let _ = responder.send(self.snapshot());
            }
            QueueCommand::AttachReceiver {
                receiver,
                responder,
            } => {
                tracing::info!(receiver = receiver.name(), "receiver attached");
                self.receiver = Some(receiver);
                self.try_start_playback().await;
                let _ = responder.send(());
            }
            QueueCommand::Shutdown { responder } => {
                self.shutdown().await;
                let _ = responder.send(());
                return false;
            }
        }
        true
    }

    async fn handle_event(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::ProbeCompleted { item_id, result } => {
                self.on_probe_completed(item_id, result).await;
            }
            ControllerEvent::ThumbnailReady { item_id, path } => {
                if let Some(index) = self.index_of(item_id) {
                    self.items[index].thumbnail = path;
                }
            }
            ControllerEvent::SubtitleReady {
                item_id,
                selection,
                path,
            } => {
                if let Some(index) = self.index_of(item_id) {
                    // A newer selection supersedes this conversion.
                    if self.items[index].subtitle == selection {
                        self.items[index].subtitle_vtt = path;
                    }
                }
            }
            ControllerEvent::PlaybackComplete(item_id) => {
                self.on_playback_complete(item_id).await
            }
            ControllerEvent::Position(position) => {
                let position_secs = position.as_secs_f64();
                self.playback.position_secs = Some(position_secs);
                if let Some(item_id) = self.playback.item_id {
                    self.events.status(EventPayload::PlaybackPosition {
                        item_id,
                        position_secs,
                    });
                }
            }
        }
    }

    async fn handle_job_event(&mut self, event: JobEvent) {
        let Some(index) = self.index_of(event.item_id()) else {
            return;
        };
        if self.items[index].job.as_ref().map(|j| j.id()) != Some(event.job_id()) {
            tracing::debug!(job_id = %event.job_id(), "ignoring event from a replaced job");
            return;
        }

        match event {
            JobEvent::Progress {
                item_id,
                job_id,
                status,
            } => {
                self.events.status(EventPayload::JobProgress {
                    item_id,
                    job_id,
                    progress: status.progress,
                    written_bytes: status.written_bytes,
                });
                if self.start_gate == Some(StartGate::Lead) && self.current == Some(item_id) {
                    self.try_start_playback().await;
                }
            }
            JobEvent::Terminal {
                item_id,
                job_id,
                status,
            } => {
                self.events.status(EventPayload::JobFinished {
                    item_id,
                    job_id,
                    state: status.state,
                });
                match status.state {
                    JobState::Succeeded => {
                        if self.items[index].state == ItemState::Transcoding {
                            self.set_state(index, ItemState::Ready);
                        }
                    }
                    JobState::Failed => {
                        let message = status
                            .error
                            .map(|e| e.to_string())
                            .unwrap_or_else(|| "transcode failed".into());
                        if self.selected == Some(item_id) {
                            if self.playback.item_id == Some(item_id) {
                                self.stop_playback().await;
                            }
                            self.fail_item(index, message);
                        } else {
                            tracing::debug!(
                                item = %self.items[index].name,
                                "prefetch transcode failed: {message}"
                            );
                            self.items[index].failed_in_prefetch = true;
                            self.items[index].error = Some(message);
                            self.set_state(index, ItemState::Error);
                        }
                    }
                    JobState::Cancelled => {
                        self.items[index].job = None;
                        if self.items[index].state == ItemState::Transcoding {
                            self.set_state(index, ItemState::Probed);
                        }
                    }
                    JobState::Pending | JobState::Running => {}
                }
                self.refresh().await;
            }
        }
    }

    // -- Queue operations -----------------------------------------------------

    fn add_files(&mut self, paths: Vec<PathBuf>) -> Vec<ItemId> {
        paths
            .into_iter()
            .map(|path| {
                let item = QueueItem::new(path);
                let item_id = item.id;
                tracing::info!(item = %item.name, "queued");
                self.events.status(EventPayload::ItemAdded {
                    item_id,
                    name: item.name.clone(),
                });
                self.items.push(item);
                item_id
            })
            .collect()
    }

    async fn set_current(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        let item_id = self.items[index].id;
        if self.playback.item_id != Some(item_id) {
            self.stop_playback().await;
        }
        if self.selected != Some(item_id) {
            tracing::info!(item = %self.items[index].name, index, "selecting item");
            self.selected = Some(item_id);
            self.announced_preparing = None;
        }
        self.rewind(index);
        if self.settings.queue.autoplay && self.playback.item_id != Some(item_id) {
            self.start_gate = Some(StartGate::Lead);
        }
        self.refresh().await;
        Ok(())
    }

    async fn remove(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        let item_id = self.items[index].id;
        if self.selected == Some(item_id) {
            self.stop_playback().await;
            self.selected = self.items.get(index + 1).map(|i| i.id);
            self.start_gate = None;
            self.announced_preparing = None;
        }
        if let Some(job) = self.items[index].job.clone() {
            self.transcoder.discard_job(&job).await;
        }
        let item = self.items.remove(index);
        remove_artifacts(&item).await;
        tracing::info!(item = %item.name, "removed from queue");
        self.events.status(EventPayload::ItemRemoved { item_id });
        self.refresh().await;
        Ok(())
    }

    async fn reorder(&mut self, from: usize, to: usize) -> Result<()> {
        self.check_index(from)?;
        self.check_index(to)?;
        if from == to {
            return Ok(());
        }
        let item = self.items.remove(from);
        // The selected item keeps its job wherever it moves. Any other moved
        // item is transcoded again if it is still inside the window.
        if self.selected != Some(item.id) {
            if let Some(job) = item.job.clone().filter(|j| !j.state().is_terminal()) {
                tracing::debug!(item = %item.name, "cancelling job of moved item");
                // The item leaves `Transcoding` on the cancelled event.
                job.cancel();
                let transcoder = self.transcoder.clone();
                tokio::spawn(async move { transcoder.discard_job(&job).await });
            }
        }
        self.items.insert(to, item);
        self.events.status(EventPayload::QueueReordered);
        self.refresh().await;
        Ok(())
    }

    async fn retry(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        let item = &mut self.items[index];
        if item.state != ItemState::Error {
            return Err(Error::Validation(format!(
                "item {index} is {}, only failed items can be retried",
                item.state
            )));
        }
        item.error = None;
        item.failed_in_prefetch = false;
        item.job = None;
        let state = match item.info.clone() {
            None => ItemState::Queued,
            Some(info) => {
                match planner::plan(&info, item.audio, &item.subtitle, &self.settings.device) {
                    Ok(plan) => {
                        item.plan = Some(plan);
                        ItemState::Probed
                    }
                    Err(e) => {
                        item.error = Some(e.to_string());
                        return Err(e.into());
                    }
                }
            }
        };
        tracing::info!(item = %item.name, "retrying");
        let item_id = item.id;
        self.set_state(index, state);
        if self.selected == Some(item_id) && self.settings.queue.autoplay {
            self.start_gate = Some(StartGate::Lead);
            self.announced_preparing = None;
        }
        self.refresh().await;
        Ok(())
    }

    async fn skip(&mut self) -> Result<()> {
        let Some(index) = self.selected_index() else {
            return Err(Error::Validation("nothing is selected".into()));
        };
        let was_playing = self.playback.item_id == Some(self.items[index].id);
        self.stop_playback().await;
        if was_playing {
            self.set_state(index, ItemState::Played);
        }
        self.advance(index).await;
        Ok(())
    }

    async fn select_streams(
        &mut self,
        index: usize,
        audio: Option<u32>,
        subtitle: SubtitleSelection,
    ) -> Result<Option<TranscodePlan>> {
        self.check_index(index)?;
        let Some(info) = self.items[index].info.clone() else {
            // Applied when the probe completes.
            let item = &mut self.items[index];
            item.audio = audio;
            item.subtitle = subtitle;
            return Ok(None);
        };

        let plan = planner::plan(&info, audio, &subtitle, &self.settings.device)?;
        let item_id = self.items[index].id;
        let subtitle_changed = self.items[index].subtitle != subtitle;
        let plan_changed = self.items[index].plan.as_ref() != Some(&plan);
        {
            let item = &mut self.items[index];
            item.audio = audio;
            item.subtitle = subtitle;
            item.plan = Some(plan.clone());
        }

        if plan_changed {
            let was_playing = self.playback.item_id == Some(item_id);
            if was_playing {
                self.stop_playback().await;
            }
            if let Some(job) = self.items[index].job.take() {
                tracing::info!(
                    item = %self.items[index].name,
                    "stream selection changed, restarting transcode"
                );
                self.transcoder.discard_job(&job).await;
            }
            let item = &mut self.items[index];
            item.error = None;
            item.failed_in_prefetch = false;
            if item.state != ItemState::Played {
                self.set_state(index, ItemState::Probed);
            }
            if was_playing {
                self.start_gate = Some(StartGate::Lead);
                self.announced_preparing = None;
            }
        }
        if subtitle_changed {
            self.items[index].subtitle_vtt = None;
            self.spawn_subtitle(index);
        }
        self.refresh().await;
        Ok(Some(plan))
    }

    // -- Playback -------------------------------------------------------------

    fn require_receiver(&self) -> Result<Arc<dyn Receiver>> {
        self.receiver
            .clone()
            .ok_or_else(|| Error::Validation("no receiver attached".into()))
    }

    async fn pause(&mut self) -> Result<()> {
        let receiver = self.require_receiver()?;
        if self.playback.status != PlaybackStatus::Playing {
            return Err(Error::Validation("nothing is playing".into()));
        }
        receiver.pause().await?;
        self.playback.status = PlaybackStatus::Paused;
        Ok(())
    }

    async fn resume(&mut self) -> Result<()> {
        let receiver = self.require_receiver()?;
        match self.playback.status {
            PlaybackStatus::Paused => {
                receiver.play().await?;
                self.playback.status = PlaybackStatus::Playing;
            }
            PlaybackStatus::Playing => {}
            PlaybackStatus::Idle => {
                if self.selected.is_none() {
                    return Err(Error::Validation("nothing is selected".into()));
                }
                self.start_gate = Some(StartGate::Lead);
                self.announced_preparing = None;
                self.try_start_playback().await;
            }
        }
        Ok(())
    }

    async fn seek(&mut self, position: Duration) -> Result<()> {
        let receiver = self.require_receiver()?;
        if self.playback.item_id.is_none() {
            return Err(Error::Validation("nothing is playing".into()));
        }
        receiver.seek(position).await?;
        self.playback.position_secs = Some(position.as_secs_f64());
        Ok(())
    }

    async fn stop_playback(&mut self) {
        let Some(item_id) = self.playback.item_id else {
            return;
        };
        self.playback = PlaybackSnapshot::default();
        if let Some(receiver) = &self.receiver {
            if let Err(e) = receiver.stop().await {
                tracing::warn!(receiver = receiver.name(), "failed to stop playback: {e}");
            }
        }
        if let Some(index) = self.index_of(item_id) {
            if self.items[index].state == ItemState::Playing {
                self.set_state(index, ItemState::Ready);
            }
        }
    }

    async fn on_playback_complete(&mut self, finished: ItemId) {
        let Some(item_id) = self.playback.item_id else {
            tracing::debug!("playback complete with nothing loaded");
            return;
        };
        if item_id != finished {
            tracing::debug!(%finished, loaded = %item_id, "ignoring stale playback complete");
            return;
        }
        self.playback = PlaybackSnapshot::default();
        let Some(index) = self.index_of(item_id) else {
            return;
        };
        tracing::info!(item = %self.items[index].name, "playback complete");
        self.set_state(index, ItemState::Played);
        self.advance(index).await;
    }

    /// Select the item after `from`, or finish the queue.
    async fn advance(&mut self, from: usize) {
        let next = from + 1;
        self.announced_preparing = None;
        if next < self.items.len() {
            let next_id = self.items[next].id;
            self.selected = Some(next_id);
            self.start_gate = self
                .settings
                .queue
                .autoplay
                .then_some(StartGate::Finished);
            self.rewind(next);
            let item = &self.items[next];
            if item.state == ItemState::Error && !item.failed_in_prefetch {
                let message = item.error.clone().unwrap_or_default();
                self.events.error(EventPayload::ItemError {
                    item_id: next_id,
                    message,
                });
            }
        } else {
            tracing::info!("end of queue");
            self.selected = None;
            self.start_gate = None;
            self.events.status(EventPayload::QueueFinished);
        }
        self.refresh().await;
    }

    async fn try_start_playback(&mut self) {
        let Some(gate) = self.start_gate else {
            return;
        };
        let Some(receiver) = self.receiver.clone() else {
            return;
        };
        let Some(index) = self.current_index() else {
            return;
        };

        let lead = Duration::from_secs(self.settings.queue.start_lead_secs);
        let (item_id, ready) = {
            let item = &self.items[index];
            if !matches!(
                item.state,
                ItemState::Probed | ItemState::Transcoding | ItemState::Ready
            ) {
                return;
            }
            let ready = match (&item.plan, &item.job) {
                (Some(plan), _) if !plan.requires_job() => true,
                (_, Some(job)) => {
                    let status = job.status();
                    match status.state {
                        JobState::Succeeded => true,
                        JobState::Running => {
                            gate == StartGate::Lead && !lead.is_zero() && status.out_time >= lead
                        }
                        _ => false,
                    }
                }
                _ => false,
            };
            (item.id, ready)
        };

        if !ready {
            if self.announced_preparing != Some(item_id) {
                self.announced_preparing = Some(item_id);
                tracing::info!(item = %self.items[index].name, "preparing");
                self.events.status(EventPayload::Preparing { item_id });
            }
            return;
        }

        self.start_gate = None;
        // The receiver fetches the URL right away.
        self.publish();
        let base = self.base_url();
        let url = format!("{base}/media/{item_id}");
        let metadata_url = format!("{base}/metadata/{item_id}");
        let started = match receiver.load(item_id, &url, &metadata_url).await {
            Ok(()) => receiver.play().await,
            Err(e) => Err(e),
        };
        match started {
            Ok(()) => {
                tracing::info!(item = %self.items[index].name, %url, "playing");
                self.set_state(index, ItemState::Playing);
                self.playback = PlaybackSnapshot {
                    item_id: Some(item_id),
                    status: PlaybackStatus::Playing,
                    position_secs: None,
                };
                self.events
                    .status(EventPayload::PlaybackStarted { item_id, url });
            }
            Err(e) => {
                tracing::warn!(receiver = receiver.name(), "failed to start playback: {e}");
                self.events.error(EventPayload::ItemError {
                    item_id,
                    message: format!("receiver failed to load media: {e}"),
                });
            }
        }
    }

    // -- Scheduling -----------------------------------------------------------

    /// Bring probes, jobs and playback in line with the window.
    async fn refresh(&mut self) {
        self.promote();
        self.evict_outside_window();

        let window = self.window();
        if let Some(first) = window.clone().next() {
            let item = &mut self.items[first];
            if item.state == ItemState::Error && item.failed_in_prefetch {
                tracing::info!(item = %item.name, "retrying transcode that failed during prefetch");
                item.failed_in_prefetch = false;
                item.error = None;
                item.job = None;
                self.set_state(first, ItemState::Probed);
            }
        }
        for index in window.clone() {
            match self.items[index].state {
                ItemState::Queued => self.start_probe(index),
                ItemState::Probed => self.ensure_job(index, index - window.start),
                _ => {}
            }
        }
        self.try_start_playback().await;
    }

    /// The selected item becomes current once probed.
    fn promote(&mut self) {
        let next = self
            .selected_index()
            .filter(|&i| self.items[i].info.is_some())
            .map(|i| self.items[i].id);
        if next != self.current {
            self.current = next;
            let index = self.current_index();
            tracing::debug!(?index, "current item changed");
            self.events.status(EventPayload::CurrentChanged { index });
        }
    }

    fn evict_outside_window(&mut self) {
        let keep: HashSet<ItemId> = self.window().map(|i| self.items[i].id).collect();
        for index in 0..self.items.len() {
            if keep.contains(&self.items[index].id) {
                continue;
            }
            let Some(job) = self.items[index].job.clone() else {
                continue;
            };
            let terminal = job.state().is_terminal();
            if !terminal && job.is_cancelled() {
                continue;
            }
            tracing::debug!(item = %self.items[index].name, "releasing job outside the window");
            if terminal {
                self.items[index].job = None;
                if self.items[index].state == ItemState::Ready {
                    self.set_state(index, ItemState::Probed);
                }
            } else {
                // The item leaves `Transcoding` on the cancelled event.
                job.cancel();
            }
            let transcoder = self.transcoder.clone();
            tokio::spawn(async move { transcoder.discard_job(&job).await });
        }
    }

    fn start_probe(&mut self, index: usize) {
        let item_id = self.items[index].id;
        let path = self.items[index].path.clone();
        self.set_state(index, ItemState::Probing);

        let prober = self.prober.clone();
        let tx = self.event_tx.clone();
        tracing::debug!(path = %path.display(), prober = prober.name(), "probing");
        tokio::spawn(async move {
            let result = prober.probe(&path).await;
            let _ = tx.send(ControllerEvent::ProbeCompleted { item_id, result });
        });
    }

    fn ensure_job(&mut self, index: usize, offset: usize) {
        let Some(plan) = self.items[index].plan.clone() else {
            return;
        };
        if !plan.requires_job() {
            self.set_state(index, ItemState::Ready);
            return;
        }
        if offset > 0 && self.settings.queue.prefetch_after_current && !self.current_is_complete() {
            return;
        }

        let item = &self.items[index];
        let request = JobRequest {
            item_id: item.id,
            source: item.path.clone(),
            plan,
            duration: item.info.as_ref().and_then(|i| i.duration),
        };
        let handle = self.transcoder.start_job(request);
        self.events.status(EventPayload::JobStarted {
            item_id: handle.item_id(),
            job_id: handle.id(),
        });
        self.items[index].job = Some(handle);
        self.set_state(index, ItemState::Transcoding);
    }

    async fn on_probe_completed(
        &mut self,
        item_id: ItemId,
        result: std::result::Result<MediaInfo, ProbeError>,
    ) {
        let Some(index) = self.index_of(item_id) else {
            tracing::debug!(%item_id, "probe finished for a removed item");
            return;
        };
        if self.items[index].state != ItemState::Probing {
            return;
        }

        match result {
            Ok(info) => {
                let info = Arc::new(info);
                let item = &mut self.items[index];
                let planned = planner::plan(&info, item.audio, &item.subtitle, &self.settings.device);
                tracing::info!(
                    item = %item.name,
                    container = %info.container,
                    streams = info.streams.len(),
                    "probed"
                );
                item.info = Some(info);
                match planned {
                    Ok(plan) => {
                        tracing::info!(
                            item = %item.name,
                            video = %plan.video_action,
                            audio = %plan.audio_action,
                            container = %plan.container_action,
                            direct = plan.direct_play,
                            "planned"
                        );
                        item.plan = Some(plan);
                        self.set_state(index, ItemState::Probed);
                        self.spawn_thumbnail(index);
                        self.spawn_subtitle(index);
                    }
                    Err(e) => self.fail_item(index, e.to_string()),
                }
            }
            Err(e) => self.fail_item(index, e.to_string()),
        }
        self.refresh().await;
    }

    /// Put an item in the error state; surfaced when it is the selected one.
    fn fail_item(&mut self, index: usize, message: String) {
        let item_id = self.items[index].id;
        tracing::warn!(item = %self.items[index].name, "{message}");
        self.items[index].error = Some(message.clone());
        self.set_state(index, ItemState::Error);
        if self.selected == Some(item_id) {
            self.start_gate = None;
            self.events.error(EventPayload::ItemError { item_id, message });
        }
    }

    /// Make a played item playable again.
    fn rewind(&mut self, index: usize) {
        if self.items[index].state != ItemState::Played {
            return;
        }
        let item = &self.items[index];
        let ready = item.plan.as_ref().is_some_and(|p| !p.requires_job())
            || item
                .job
                .as_ref()
                .is_some_and(|j| j.state() == JobState::Succeeded);
        if !ready {
            self.items[index].job = None;
        }
        self.set_state(
            index,
            if ready {
                ItemState::Ready
            } else {
                ItemState::Probed
            },
        );
    }

    // -- Artifacts ------------------------------------------------------------

    fn artifact_path(&self, item_id: ItemId, kind: &str, ext: &str) -> PathBuf {
        self.transcoder.output_dir().join(format!(
            "reelcast_pid{}_{kind}_{item_id}.{ext}",
            std::process::id()
        ))
    }

    fn spawn_thumbnail(&self, index: usize) {
        let item = &self.items[index];
        if item.info.as_ref().and_then(|i| i.primary_video()).is_none() {
            return;
        }
        let item_id = item.id;
        let input = item.path.clone();
        let output = self.artifact_path(item_id, "thumbnail", "jpg");
        let ffmpeg = self.settings.ffmpeg.clone();
        let offset = Duration::from_secs(self.settings.probe.thumbnail_offset_secs);
        let width = self.settings.probe.thumbnail_width;
        let tx = self.event_tx.clone();

        tokio::spawn(async move {
            ensure_parent(&output).await;
            let path = match rc_av::extract_thumbnail(&ffmpeg, &input, &output, offset, width).await {
                Ok(()) => Some(output),
                Err(e) => {
                    tracing::debug!(input = %input.display(), "no thumbnail: {e}");
                    None
                }
            };
            let _ = tx.send(ControllerEvent::ThumbnailReady { item_id, path });
        });
    }

    fn spawn_subtitle(&self, index: usize) {
        let item = &self.items[index];
        let selection = item.subtitle.clone();
        let stream = match &selection {
            SubtitleSelection::None => return,
            SubtitleSelection::Embedded(i) => {
                match item.info.as_ref().and_then(|info| info.stream(*i)) {
                    Some(s) => Some(s.index),
                    None => return,
                }
            }
            SubtitleSelection::External(_) => None,
        };
        let item_id = item.id;
        let media = item.path.clone();
        let output = self.artifact_path(item_id, "subtitle", "vtt");
        let ffmpeg = self.settings.ffmpeg.clone();
        let tx = self.event_tx.clone();

        tokio::spawn(async move {
            let source = match (&selection, stream) {
                (SubtitleSelection::External(path), _) => SubtitleSource::External(path),
                (_, Some(stream)) => SubtitleSource::Embedded {
                    media: &media,
                    stream,
                },
                _ => return,
            };
            ensure_parent(&output).await;
            let path = match rc_av::extract_subtitle_vtt(&ffmpeg, source, &output).await {
                Ok(()) => Some(output),
                Err(e) => {
                    tracing::warn!(media = %media.display(), "subtitle conversion failed: {e}");
                    None
                }
            };
            let _ = tx.send(ControllerEvent::SubtitleReady {
                item_id,
                selection,
                path,
            });
        });
    }

    // -- Views ----------------------------------------------------------------

    fn publish(&self) {
        let current = self.current_index();
        let entries: Vec<ServeEntry> = self
            .window()
            .map(|index| self.serve_entry(index, Some(index) == current))
            .collect();
        self.serve.publish(entries);
    }

    fn serve_entry(&self, index: usize, is_current: bool) -> ServeEntry {
        let item = &self.items[index];
        let direct = item.plan.as_ref().is_some_and(|p| !p.requires_job());
        let media = match &item.job {
            _ if direct => MediaSource::Direct(item.path.clone()),
            Some(job) => MediaSource::Job(job.clone()),
            None => MediaSource::Pending,
        };
        ServeEntry {
            item_id: item.id,
            media,
            thumbnail: item.thumbnail.clone(),
            subtitle: item.subtitle_vtt.clone(),
            metadata: self.metadata(item, direct),
            is_current,
        }
    }

    fn metadata(&self, item: &QueueItem, direct: bool) -> MediaMetadata {
        let base = self.base_url();
        let parsed = rc_parser::parse_title(&item.name);
        let fallback = Path::new(&item.name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| item.name.clone());
        let audio_only = match (&item.plan, &item.info) {
            (Some(plan), _) => plan.video_stream.is_none() && plan.audio_stream.is_some(),
            (None, Some(info)) => info.is_audio_only(),
            (None, None) => false,
        };
        let container = item.info.as_ref().map(|i| i.container.as_str());

        MediaMetadata {
            title: parsed.display_title(&fallback),
            parsed,
            content_type: content_type(container, direct, audio_only).to_string(),
            duration_secs: item
                .info
                .as_ref()
                .and_then(|i| i.duration)
                .map(|d| d.as_secs_f64()),
            thumbnail_url: item
                .thumbnail
                .as_ref()
                .map(|_| format!("{base}/thumbnail/{}.jpg", item.id)),
            subtitle_url: item
                .subtitle_vtt
                .as_ref()
                .map(|_| format!("{base}/subtitle/{}.vtt", item.id)),
        }
    }

    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            items: self.items.iter().map(QueueItem::snapshot).collect(),
            current: self.current_index(),
            selected: self.selected_index(),
            playback: self.playback.clone(),
        }
    }

    async fn shutdown(&mut self) {
        tracing::info!("shutting down queue controller");
        self.start_gate = None;
        self.stop_playback().await;
        self.serve.clear();
        self.transcoder.shutdown().await;
        for item in &self.items {
            remove_artifacts(item).await;
        }
    }

    // -- Lookups --------------------------------------------------------------

    fn base_url(&self) -> &str {
        self.settings.base_url.trim_end_matches('/')
    }

    fn index_of(&self, item_id: ItemId) -> Option<usize> {
        self.items.iter().position(|i| i.id == item_id)
    }

    fn selected_index(&self) -> Option<usize> {
        self.selected.and_then(|id| self.index_of(id))
    }

    fn current_index(&self) -> Option<usize> {
        self.current.and_then(|id| self.index_of(id))
    }

    fn current_is_complete(&self) -> bool {
        self.current_index()
            .is_some_and(|i| self.items[i].is_complete())
    }

    fn window(&self) -> Range<usize> {
        match self.selected_index() {
            Some(start) => {
                let end = (start + 1 + self.settings.queue.max_lookahead).min(self.items.len());
                start..end
            }
            None => 0..0,
        }
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.items.len() {
            Ok(())
        } else {
            Err(Error::not_found("queue index", index))
        }
    }

    fn set_state(&mut self, index: usize, state: ItemState) {
        let item = &mut self.items[index];
        if item.state != state {
            tracing::debug!(item = %item.name, from = %item.state, to = %state, "item state");
            item.state = state;
            self.events.status(EventPayload::ItemStateChanged {
                item_id: item.id,
                state,
            });
        }
    }
}

fn content_type(container: Option<&str>, direct: bool, audio_only: bool) -> &'static str {
    match container {
        Some("mp3") if direct => "audio/mpeg",
        Some("aac") if direct => "audio/aac",
        Some("wav") if direct => "audio/wav",
        _ if audio_only => "audio/mp4",
        _ => "video/mp4",
    }
}

async fn ensure_parent(path: &Path) {
    if let Some(dir) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            tracing::debug!(dir = %dir.display(), "cannot create artifact directory: {e}");
        }
    }
}

async fn remove_artifacts(item: &QueueItem) {
    for path in [&item.thumbnail, &item.subtitle_vtt].into_iter().flatten() {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::debug!(path = %path.display(), "failed to remove artifact: {e}"),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::receiver::RecordingReceiver;
    use async_trait::async_trait;
    use rc_core::StreamKind;
    use rc_probe::{StreamIndex, StreamInfo};
    use std::os::unix::fs::PermissionsExt;

    /// `bad*` is unreadable, `*.mp4` is H.264/AAC in MP4, anything else is
    /// HEVC/AAC in Matroska. Every file has a subtitle stream at index 2.
    struct FakeProber;

    #[async_trait]
    impl Prober for FakeProber {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn supports(&self, _path: &Path) -> bool {
            true
        }

        async fn probe(&self, path: &Path) -> std::result::Result<MediaInfo, ProbeError> {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            if name.starts_with("bad") {
                return Err(ProbeError::Unreadable {
                    path: path.to_path_buf(),
                    reason: "moov atom not found".into(),
                });
            }
            let (container, video) = if name.ends_with(".mp4") {
                ("mp4", "h264")
            } else {
                ("mkv", "hevc")
            };
            Ok(MediaInfo {
                file_path: path.to_path_buf(),
                file_size: 1000,
                container: container.into(),
                duration: Some(Duration::from_secs(60)),
                streams: vec![
                    StreamInfo::new(StreamIndex::new(0), StreamKind::Video, video),
                    StreamInfo::new(StreamIndex::new(1), StreamKind::Audio, "aac"),
                    StreamInfo::new(StreamIndex::new(2), StreamKind::Subtitle, "subrip"),
                ],
            })
        }
    }

    /// Artifact runs write a stub file and exit. Transcode runs log the input
    /// name, write `data`, report one second of output and wait for a
    /// `go_<input name>` file. The first `flaky*` transcode fails.
    const FAKE_FFMPEG: &str = r#"#!/bin/sh
dir=$(dirname "$0")
prev=""
input=""
last=""
for a in "$@"; do
  if [ "$prev" = "-i" ]; then input="$a"; fi
  prev="$a"
  last="$a"
done
case "$*" in
  *-progress*) ;;
  *) printf 'artifact' > "$last"; exit 0 ;;
esac
name=$(basename "$input")
echo "$name" >> "$dir/runs.log"
case "$name" in
  flaky*)
    if [ ! -f "$dir/flaked" ]; then
      : > "$dir/flaked"
      echo "Conversion failed!" >&2
      exit 1
    fi
    ;;
esac
printf 'data' > "$last"
echo "out_time_us=1000000" >&2
echo "progress=continue" >&2
while [ ! -f "$dir/go_$name" ]; do sleep 0.05; done
echo "progress=end" >&2
exit 0
"#;

    const BASE_URL: &str = "http://10.0.0.2:8000";

    struct Harness {
        dir: tempfile::TempDir,
        queue: QueueHandle,
        receiver: RecordingReceiver,
        events: Arc<EventBus>,
        serve: ServeTable,
    }

    fn harness(configure: impl FnOnce(&mut QueueConfig)) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = dir.path().join("ffmpeg");
        std::fs::write(&ffmpeg, FAKE_FFMPEG).unwrap();
        std::fs::set_permissions(&ffmpeg, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut queue = QueueConfig {
            start_lead_secs: 0,
            ..QueueConfig::default()
        };
        configure(&mut queue);
        let settings = ControllerSettings {
            queue,
            transcode: TranscodeConfig {
                output_dir: Some(dir.path().join("out")),
                kill_grace_secs: 1,
                ..TranscodeConfig::default()
            },
            probe: ProbeConfig::default(),
            ffmpeg,
            device: DeviceProfile::baseline(),
            base_url: format!("{BASE_URL}/"),
        };
        let events = Arc::new(EventBus::default());
        let serve = ServeTable::new();
        let queue = spawn_queue_controller(settings, Arc::new(FakeProber), events.clone(), serve.clone());
        Harness {
            dir,
            queue,
            receiver: RecordingReceiver::new(),
            events,
            serve,
        }
    }

    impl Harness {
        async fn start(&self, files: &[&str]) -> Vec<ItemId> {
            let paths = files.iter().map(|f| self.dir.path().join(f)).collect();
            let ids = self.queue.add_files(paths).await.unwrap();
            self.queue
                .attach_receiver(Arc::new(self.receiver.clone()))
                .await
                .unwrap();
            ids
        }

        fn go(&self, name: &str) {
            std::fs::write(self.dir.path().join(format!("go_{name}")), "").unwrap();
        }

        fn runs(&self) -> Vec<String> {
            std::fs::read_to_string(self.dir.path().join("runs.log"))
                .map(|s| s.lines().map(String::from).collect())
                .unwrap_or_default()
        }

        fn url(&self, id: ItemId) -> String {
            format!("{BASE_URL}/media/{id}")
        }

        fn saw(&self, matches: impl Fn(&EventPayload) -> bool) -> bool {
            self.events
                .recent_events(100)
                .iter()
                .any(|e| matches(&e.payload))
        }

        async fn wait_for(
            &self,
            what: &str,
            mut check: impl FnMut(&QueueSnapshot) -> bool,
        ) -> QueueSnapshot {
            let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
            loop {
                let snapshot = self.queue.snapshot().await.unwrap();
                if check(&snapshot) {
                    return snapshot;
                }
                assert!(
                    tokio::time::Instant::now() < deadline,
                    "timed out waiting for {what}: {snapshot:#?}"
                );
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }
    }

    #[tokio::test]
    async fn advance_waits_for_next_transcode() {
        let h = harness(|_| {});
        h.go("a.mkv");
        let ids = h.start(&["a.mkv", "b.mkv", "c.mkv"]).await;
        h.queue.set_current(0).await.unwrap();

        h.wait_for("a playing", |s| s.items[0].state == ItemState::Playing)
            .await;
        assert_eq!(h.receiver.loaded_urls(), vec![h.url(ids[0])]);

        // b is prefetched once a is done; c is outside the window.
        let snap = h
            .wait_for("b transcoding", |s| s.items[1].state == ItemState::Transcoding)
            .await;
        assert_eq!(snap.items[2].state, ItemState::Queued);
        assert_eq!(snap.next_index(), Some(1));

        h.queue.playback_sink().playback_complete(ids[0]);
        let snap = h.wait_for("b current", |s| s.current == Some(1)).await;
        assert_eq!(snap.items[0].state, ItemState::Played);
        assert_eq!(snap.items[1].state, ItemState::Transcoding);
        assert!(h.saw(|p| matches!(p, EventPayload::Preparing { item_id } if *item_id == ids[1])));
        assert_eq!(h.receiver.loaded_urls().len(), 1);
        assert!(h.serve.get(ids[0]).is_none());
        assert!(h.serve.get(ids[1]).is_some());

        h.go("b.mkv");
        h.wait_for("b playing", |s| s.items[1].state == ItemState::Playing)
            .await;
        assert_eq!(h.receiver.loaded_urls(), vec![h.url(ids[0]), h.url(ids[1])]);
        h.wait_for("c transcoding", |s| s.items[2].state == ItemState::Transcoding)
            .await;
        assert_eq!(h.runs(), vec!["a.mkv", "b.mkv", "c.mkv"]);

        h.queue.shutdown().await.unwrap();
        assert!(h.serve.is_empty());
        assert!(matches!(h.queue.snapshot().await, Err(Error::Shutdown)));
    }

    #[tokio::test]
    async fn direct_play_needs_no_job() {
        let h = harness(|_| {});
        let ids = h.start(&["movie.mp4"]).await;
        h.queue.set_current(0).await.unwrap();

        let snap = h
            .wait_for("playing", |s| s.items[0].state == ItemState::Playing)
            .await;
        assert!(!snap.items[0].plan.as_ref().unwrap().requires_job());
        assert!(h.runs().is_empty());
        let entry = h.serve.get(ids[0]).unwrap();
        assert!(matches!(entry.media, MediaSource::Direct(_)));
        assert_eq!(entry.metadata.content_type, "video/mp4");
        assert_eq!(entry.metadata.title, "movie");
    }

    #[tokio::test]
    async fn explicit_selection_starts_after_lead() {
        let h = harness(|q| q.start_lead_secs = 1);
        let ids = h.start(&["a.mkv"]).await;
        h.queue.set_current(0).await.unwrap();

        let snap = h
            .wait_for("playing while transcoding", |s| {
                s.items[0].state == ItemState::Playing
            })
            .await;
        assert!(snap.items[0].progress.unwrap() < 1.0);
        assert!(matches!(
            h.serve.get(ids[0]).unwrap().media,
            MediaSource::Job(_)
        ));
        h.go("a.mkv");
    }

    #[tokio::test]
    async fn probe_error_waits_for_skip() {
        let h = harness(|_| {});
        h.go("a.mkv");
        let ids = h.start(&["bad.mkv", "a.mkv"]).await;
        h.queue.set_current(0).await.unwrap();

        let snap = h
            .wait_for("bad errored", |s| s.items[0].state == ItemState::Error)
            .await;
        assert_eq!(snap.current, None);
        assert_eq!(snap.selected, Some(0));
        assert!(snap.items[0].error.as_deref().unwrap().contains("moov atom"));
        assert!(h.saw(|p| matches!(p, EventPayload::ItemError { item_id, .. } if *item_id == ids[0])));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(h.receiver.loaded_urls().is_empty());

        h.queue.skip().await.unwrap();
        h.wait_for("a playing", |s| s.items[1].state == ItemState::Playing)
            .await;
        assert_eq!(h.receiver.loaded_urls(), vec![h.url(ids[1])]);
    }

    #[tokio::test]
    async fn failed_prefetch_is_retried_when_promoted() {
        let h = harness(|_| {});
        h.go("a.mkv");
        h.go("flaky.mkv");
        let ids = h.start(&["a.mkv", "flaky.mkv"]).await;
        h.queue.set_current(0).await.unwrap();

        let snap = h
            .wait_for("prefetch failed", |s| s.items[1].state == ItemState::Error)
            .await;
        assert_eq!(snap.items[0].state, ItemState::Playing);
        assert!(!h.saw(|p| matches!(p, EventPayload::ItemError { .. })));

        h.queue.playback_sink().playback_complete(ids[0]);
        h.wait_for("flaky playing", |s| s.items[1].state == ItemState::Playing)
            .await;
        assert_eq!(h.runs(), vec!["a.mkv", "flaky.mkv", "flaky.mkv"]);
        assert_eq!(h.receiver.loaded_urls().last(), Some(&h.url(ids[1])));
    }

    #[tokio::test]
    async fn remove_tears_down_running_job() {
        let h = harness(|_| {});
        h.start(&["a.mkv"]).await;
        h.queue.set_current(0).await.unwrap();
        h.wait_for("ffmpeg running", |s| {
            s.items[0].state == ItemState::Transcoding && !h.runs().is_empty()
        })
        .await;

        h.queue.remove(0).await.unwrap();
        let snap = h.queue.snapshot().await.unwrap();
        assert!(snap.items.is_empty());
        assert_eq!(snap.current, None);
        let leftovers = std::fs::read_dir(h.dir.path().join("out"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("_transcode_"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn reorder_keeps_current_job() {
        let h = harness(|_| {});
        let ids = h.start(&["a.mkv", "b.mkv", "c.mkv"]).await;
        h.queue.set_current(0).await.unwrap();
        h.wait_for("a transcoding", |s| s.items[0].state == ItemState::Transcoding)
            .await;

        h.queue.reorder(0, 2).await.unwrap();
        let snap = h.queue.snapshot().await.unwrap();
        assert_eq!(snap.items[2].id, ids[0]);
        assert_eq!(snap.current, Some(2));
        assert_eq!(snap.items[2].state, ItemState::Transcoding);

        h.go("a.mkv");
        h.wait_for("a playing", |s| s.items[2].state == ItemState::Playing)
            .await;
        assert_eq!(h.runs(), vec!["a.mkv"]);
    }

    #[tokio::test]
    async fn stale_playback_complete_is_ignored() {
        let h = harness(|_| {});
        let ids = h.start(&["a.mp4", "b.mp4"]).await;
        h.queue.set_current(0).await.unwrap();
        h.wait_for("a playing", |s| s.items[0].state == ItemState::Playing)
            .await;

        // A report for an item that is not loaded changes nothing.
        h.queue.playback_sink().playback_complete(ids[1]);
        tokio::time::sleep(Duration::from_millis(200)).await;
        let snap = h.queue.snapshot().await.unwrap();
        assert_eq!(snap.current, Some(0));
        assert_eq!(snap.items[0].state, ItemState::Playing);

        h.queue.playback_sink().playback_complete(ids[0]);
        h.wait_for("b playing", |s| s.items[1].state == ItemState::Playing)
            .await;

        // A late duplicate for `a` must not skip `b`.
        h.queue.playback_sink().playback_complete(ids[0]);
        tokio::time::sleep(Duration::from_millis(200)).await;
        let snap = h.queue.snapshot().await.unwrap();
        assert_eq!(snap.current, Some(1));
        assert_eq!(snap.items[0].state, ItemState::Played);
        assert_eq!(snap.items[1].state, ItemState::Playing);
        assert_eq!(h.receiver.loaded_urls(), vec![h.url(ids[0]), h.url(ids[1])]);
    }

    #[tokio::test]
    async fn reorder_restarts_a_moved_prefetch_job() {
        let h = harness(|q| {
            q.prefetch_after_current = false;
            q.max_lookahead = 2;
        });
        let ids = h.start(&["a.mkv", "b.mkv", "c.mkv"]).await;
        h.queue.set_current(0).await.unwrap();
        h.wait_for("all three transcoding", |s| {
            s.items.iter().all(|i| i.state == ItemState::Transcoding) && h.runs().len() == 3
        })
        .await;
        let b_started = || {
            h.events
                .recent_events(100)
                .iter()
                .filter(|e| {
                    matches!(&e.payload, EventPayload::JobStarted { item_id, .. } if *item_id == ids[1])
                })
                .count()
        };
        assert_eq!(b_started(), 1);

        h.queue.reorder(1, 2).await.unwrap();
        let b_runs = || h.runs().iter().filter(|r| *r == "b.mkv").count();
        let snap = h
            .wait_for("b transcoding again", |_| b_started() == 2 && b_runs() == 2)
            .await;
        assert_eq!(snap.items[2].id, ids[1]);
        assert_eq!(snap.items[1].id, ids[2]);
        assert_eq!(snap.current, Some(0));

        let runs = h.runs();
        assert_eq!(runs.iter().filter(|r| *r == "a.mkv").count(), 1);
        assert_eq!(runs.iter().filter(|r| *r == "c.mkv").count(), 1);

        for name in ["a.mkv", "b.mkv", "c.mkv"] {
            h.go(name);
        }
        h.wait_for("b ready", |s| s.items[2].state == ItemState::Ready)
            .await;
    }

    #[tokio::test]
    async fn stream_selection_is_validated_and_subtitles_converted() {
        let h = harness(|_| {});
        let ids = h.start(&["movie.mp4"]).await;
        assert!(matches!(
            h.queue.set_current(5).await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(h.queue.retry(0).await, Err(Error::Validation(_))));

        h.queue.set_current(0).await.unwrap();
        h.wait_for("probed", |s| s.items[0].state.is_probed()).await;
        assert!(matches!(
            h.queue
                .select_streams(0, Some(2), SubtitleSelection::None)
                .await,
            Err(Error::Plan(_))
        ));

        let plan = h
            .queue
            .select_streams(0, Some(1), SubtitleSelection::Embedded(2))
            .await
            .unwrap()
            .unwrap();
        assert!(!plan.requires_job());

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let entry = h.serve.get(ids[0]).unwrap();
            if let Some(url) = entry.metadata.subtitle_url {
                assert_eq!(url, format!("{BASE_URL}/subtitle/{}.vtt", ids[0]));
                assert!(entry.subtitle.unwrap().exists());
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "no subtitle");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}
