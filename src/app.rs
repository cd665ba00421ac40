//! Application wiring: tools, prober, queue controller and streaming server.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use rc_av::{BannerProber, FfprobeProber, Tool, ToolRegistry};
use rc_core::config::Config;
use rc_core::events::EventBus;
use rc_pipeline::{spawn_queue_controller, ControllerSettings, DeviceProfile, QueueHandle, ServeTable};
use rc_probe::{CompositeProber, Prober};
use rc_server::ServerContext;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A running reelcast instance.
pub struct App {
    pub queue: QueueHandle,
    pub events: Arc<EventBus>,
    pub serve: ServeTable,
    /// Address the server is bound to.
    pub local_addr: SocketAddr,
    /// Base of the URLs handed to the receiver.
    pub base_url: String,
    shutdown: CancellationToken,
    server: JoinHandle<rc_core::Result<()>>,
}

impl App {
    /// Discover ffmpeg/ffprobe and start everything.
    pub async fn start(config: &Config) -> Result<Self> {
        let (prober, ffmpeg) = discover_prober(config)?;
        Self::start_with(config, prober, ffmpeg).await
    }

    /// Start with an explicit prober and ffmpeg binary.
    pub async fn start_with(config: &Config, prober: Arc<dyn Prober>, ffmpeg: PathBuf) -> Result<Self> {
        let listener = rc_server::bind(&config.server.host, config.server.port)
            .await
            .context("Failed to start the streaming server")?;
        let local_addr = listener.local_addr()?;
        let host = advertised_host(config.server.advertise_host.as_deref(), local_addr.ip());
        let base_url = format!("http://{host}:{}", local_addr.port());

        let device = DeviceProfile::resolve(&config.device);
        tracing::info!(
            device = %device.name,
            video = ?device.video_codecs,
            audio = ?device.audio_codecs,
            "target device"
        );

        let events = Arc::new(EventBus::default());
        let serve = ServeTable::new();
        let settings = ControllerSettings {
            queue: config.queue.clone(),
            transcode: config.transcode.clone(),
            probe: config.probe.clone(),
            ffmpeg,
            device,
            base_url: base_url.clone(),
        };
        let queue = spawn_queue_controller(settings, prober, events.clone(), serve.clone());

        let shutdown = CancellationToken::new();
        let ctx = ServerContext::new(serve.clone(), config.streaming.clone());
        let server = tokio::spawn(rc_server::serve(listener, ctx, shutdown.clone()));
        tracing::info!("serving media at {base_url}");

        Ok(Self {
            queue,
            events,
            serve,
            local_addr,
            base_url,
            shutdown,
            server,
        })
    }

    /// Stop playback, cancel all jobs, remove temporary files and stop the
    /// server.
    pub async fn shutdown(self) -> Result<()> {
        if let Err(e) = self.queue.shutdown().await {
            tracing::debug!("queue controller already stopped: {e}");
        }
        self.shutdown.cancel();
        self.server
            .await
            .context("streaming server task panicked")?
            .context("streaming server failed")?;
        Ok(())
    }
}

/// Find the tools and build the prober chain: ffprobe when installed, then
/// the ffmpeg banner parser. Returns the prober and the ffmpeg path.
pub fn discover_prober(config: &Config) -> Result<(Arc<dyn Prober>, PathBuf)> {
    let tools = ToolRegistry::discover(&config.tools);
    let ffmpeg = tools.require(Tool::Ffmpeg)?.to_path_buf();
    let timeout = config.probe.timeout();

    let mut probers: Vec<Box<dyn Prober>> = Vec::new();
    match tools.get(Tool::Ffprobe) {
        Some(ffprobe) => probers.push(Box::new(FfprobeProber::new(ffprobe.to_path_buf(), timeout))),
        None => tracing::info!("ffprobe not found; probing with ffmpeg only"),
    }
    probers.push(Box::new(BannerProber::new(ffmpeg.clone(), timeout)));

    Ok((Arc::new(CompositeProber::new(probers)), ffmpeg))
}

/// Host for receiver-facing URLs: the configured one, the bound address if
/// it is specific, or the first non-loopback IPv4 address.
pub fn advertised_host(configured: Option<&str>, bound: IpAddr) -> String {
    if let Some(host) = configured.filter(|h| !h.is_empty()) {
        return host.to_string();
    }
    if !bound.is_unspecified() {
        return bound.to_string();
    }
    local_ipv4()
        .unwrap_or(Ipv4Addr::LOCALHOST)
        .to_string()
}

/// The address of the interface that routes to the outside. Connecting a
/// UDP socket sends nothing.
fn local_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9)).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}
