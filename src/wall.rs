//! Wall: the composition of modality pipelines and one fusion engine.
//!
//! Each modality runs its own reader → decoder → filter chain. Once per
//! tick the wall drains every mailbox, updates the filters, fuses the
//! results and publishes all readings for lock-free polling.

use std::sync::Arc;

use crate::config::{Config, FilterConfig, StreamConfig, WallConfig};
use crate::depth::filter::FACE_RECENTER_RATE;
use crate::depth::{DepthCell, DepthFilter, DepthFusion, DepthReading, FusionInputs};
use crate::error::{DecodeError, DepthwallError};
use crate::stream::{RawFrame, StreamClient};
use crate::tracking::{decode, DepthSample, Modality};

/// Reader + decoder + filter for one modality
pub struct ModalityPipeline {
    modality: Modality,
    client: StreamClient,
    filter: DepthFilter,
    output: Arc<DepthCell>,
    stale_after_ticks: u32,
    idle_ticks: u32,
}

impl ModalityPipeline {
    pub fn new(
        modality: Modality,
        host: &str,
        port: u16,
        stream: &StreamConfig,
        filter: &FilterConfig,
    ) -> Self {
        Self {
            modality,
            client: StreamClient::new(modality, host, port, stream),
            filter: DepthFilter::new(modality, filter),
            output: Arc::new(DepthCell::new()),
            stale_after_ticks: stream.stale_after_ticks,
            idle_ticks: 0,
        }
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    pub fn open(&mut self) -> Result<(), DepthwallError> {
        self.client.open()
    }

    pub fn close(&mut self) {
        self.client.close();
    }

    pub fn client(&self) -> &StreamClient {
        &self.client
    }

    pub fn filter(&self) -> &DepthFilter {
        &self.filter
    }

    /// Published `(user_depth, has_depth)` for this modality
    pub fn output(&self) -> Arc<DepthCell> {
        Arc::clone(&self.output)
    }

    /// Consume the newest frame from the connection, if any
    pub fn tick(&mut self) -> DepthReading {
        let frame = self.client.take_latest();
        self.process(frame.as_ref())
    }

    /// Run one tick against an optional newly framed message
    pub fn process(&mut self, frame: Option<&RawFrame>) -> DepthReading {
        match frame {
            Some(frame) => {
                self.idle_ticks = 0;
                self.apply_frame(frame);
            }
            None => {
                self.idle_ticks = self.idle_ticks.saturating_add(1);
                if self.idle_ticks > self.stale_after_ticks {
                    self.filter.mark_stale();
                }
            }
        }

        let reading = self.filter.reading();
        self.output.store(reading);
        reading
    }

    fn apply_frame(&mut self, frame: &RawFrame) {
        self.filter.begin_decode();

        let sample = decode(self.modality, frame.as_bytes()).and_then(|msg| msg.depth_sample());
        match sample {
            Ok(DepthSample::Depth(raw)) => {
                self.filter.update(raw);
            }
            Ok(DepthSample::Missing) => {}
            Ok(DepthSample::Lost) => self.filter.relax_toward_zero(FACE_RECENTER_RATE),
            Err(e @ DecodeError::NonFinite { .. }) => tracing::debug!("{}", e),
            Err(e) => tracing::warn!("{}", e),
        }
    }
}

pub struct Wall {
    name: String,
    auto_connect: bool,
    pipelines: Vec<ModalityPipeline>,
    fusion: DepthFusion,
    output: Arc<DepthCell>,
    ticks: u64,
}

impl Wall {
    pub fn new(wall: &WallConfig, config: &Config) -> Self {
        let pipelines = wall
            .modalities
            .iter()
            .map(|&modality| {
                ModalityPipeline::new(
                    modality,
                    &wall.host,
                    wall.ports.port_for(modality),
                    &config.stream,
                    config.filters.get(modality),
                )
            })
            .collect();

        Self {
            name: wall.name.clone(),
            auto_connect: wall.auto_connect,
            pipelines,
            fusion: DepthFusion::new(&wall.fusion),
            output: Arc::new(DepthCell::new()),
            ticks: 0,
        }
    }

    /// Build every configured wall
    pub fn from_config(config: &Config) -> Vec<Wall> {
        config.walls.iter().map(|w| Wall::new(w, config)).collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn auto_connect(&self) -> bool {
        self.auto_connect
    }

    /// Open every feed. Failures are logged and returned; the other feeds still connect.
    pub fn connect(&mut self) -> Vec<DepthwallError> {
        let mut errors = Vec::new();
        for pipeline in &mut self.pipelines {
            if let Err(e) = pipeline.open() {
                tracing::error!("[{}] {}", self.name, e);
                errors.push(e);
            }
        }
        errors
    }

    pub fn close(&mut self) {
        for pipeline in &mut self.pipelines {
            pipeline.close();
        }
        tracing::info!("[{}] closed after {} ticks", self.name, self.ticks);
    }

    /// One consumer tick: drain mailboxes, filter, fuse, publish
    pub fn tick(&mut self) -> DepthReading {
        for pipeline in &mut self.pipelines {
            pipeline.tick();
        }
        self.fuse()
    }

    /// Same as [`Wall::tick`] but with frames supplied by the caller instead of the sockets
    pub fn tick_with<F>(&mut self, mut next_frame: F) -> DepthReading
    where
        F: FnMut(Modality) -> Option<RawFrame>,
    {
        for pipeline in &mut self.pipelines {
            let frame = next_frame(pipeline.modality());
            pipeline.process(frame.as_ref());
        }
        self.fuse()
    }

    fn fuse(&mut self) -> DepthReading {
        let inputs = FusionInputs {
            face: self.reading(Modality::Face),
            pose: self.reading(Modality::Pose),
            hand: self.reading(Modality::Hand),
        };

        let fused = self.fusion.update(&inputs);
        self.output.store(fused);
        self.ticks += 1;
        fused
    }

    fn reading(&self, modality: Modality) -> Option<DepthReading> {
        self.pipeline(modality).map(|p| p.filter().reading())
    }

    pub fn pipeline(&self, modality: Modality) -> Option<&ModalityPipeline> {
        self.pipelines.iter().find(|p| p.modality() == modality)
    }

    pub fn pipelines(&self) -> &[ModalityPipeline] {
        &self.pipelines
    }

    /// Current fused reading
    pub fn fused(&self) -> DepthReading {
        self.fusion.reading()
    }

    /// Handle for polling the fused reading from another thread
    pub fn fused_output(&self) -> Arc<DepthCell> {
        Arc::clone(&self.output)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::net::TcpListener;
    use std::time::{Duration, Instant};

    fn face_frame(tz: f32) -> RawFrame {
        let json = serde_json::json!({
            "faces": [{"landmarks": [{"x": 0.5, "y": 0.5, "z": 0.0}], "face_pose": {"tx": 0.0, "ty": 0.0, "tz": tz}}],
            "blendshapes": []
        });
        RawFrame::from(json.to_string().as_str())
    }

    fn pose_frame(depth: f32) -> RawFrame {
        RawFrame::from(serde_json::json!({"landmarks": [], "world_landmarks": [], "depth_z": depth}).to_string().as_str())
    }

    fn plain_filter() -> FilterConfig {
        FilterConfig {
            scale: Some(1.0),
            invert_sign: false,
            smoothing_factor: 0.2,
            deadzone: 0.002,
            enabled: true,
        }
    }

    fn test_config(modalities: Vec<Modality>, stale_after_ticks: u32) -> Config {
        let mut config = Config::default();
        config.stream.stale_after_ticks = stale_after_ticks;
        config.filters.face = plain_filter();
        config.filters.pose = plain_filter();
        config.filters.hand = plain_filter();
        config.walls[0].modalities = modalities;
        config.walls[0].fusion.smoothing_enabled = false;
        config
    }

    fn face_pipeline(stale_after_ticks: u32) -> ModalityPipeline {
        let stream = StreamConfig {
            stale_after_ticks,
            ..StreamConfig::default()
        };
        ModalityPipeline::new(Modality::Face, "127.0.0.1", 5052, &stream, &plain_filter())
    }

    #[test]
    fn test_face_end_to_end_sequence() {
        let mut pipeline = face_pipeline(6);
        let expected = [0.0_f32, 0.004, 0.0832];

        for (tz, want) in [0.10_f32, 0.12, 0.50].into_iter().zip(expected) {
            let reading = pipeline.process(Some(&face_frame(tz)));
            assert!(reading.has_depth);
            assert!((reading.depth - want).abs() < 1e-5);
        }
        assert_eq!(pipeline.filter().last_raw(), Some(0.50));
        assert_eq!(pipeline.output().load(), pipeline.filter().reading());
    }

    #[test]
    fn test_decode_failure_keeps_state() {
        let mut pipeline = face_pipeline(6);
        pipeline.process(Some(&face_frame(0.1)));
        pipeline.process(Some(&face_frame(0.3)));
        let before = pipeline.filter().user_depth();

        let reading = pipeline.process(Some(&RawFrame::from("{\"faces\":[{")));
        assert!(!reading.has_depth);
        assert_eq!(reading.depth, before);
        assert_eq!(pipeline.filter().baseline(), Some(0.1));
    }

    #[test]
    fn test_face_loss_recentres_slowly() {
        let mut pipeline = face_pipeline(6);
        pipeline.process(Some(&face_frame(0.0)));
        for _ in 0..60 {
            pipeline.process(Some(&face_frame(1.0)));
        }
        let before = pipeline.filter().user_depth();
        assert!(before > 0.9);

        let reading = pipeline.process(Some(&RawFrame::from(r#"{"faces":[],"blendshapes":[]}"#)));
        assert!(!reading.has_depth);
        assert!((reading.depth - before * 0.95).abs() < 1e-6);
        assert_eq!(pipeline.filter().baseline(), Some(0.0));
    }

    #[test]
    fn test_pose_loss_freezes() {
        let mut config = test_config(vec![Modality::Pose], 6);
        config.filters.pose.smoothing_factor = 1.0;
        let mut wall = Wall::new(&config.walls[0], &config);

        wall.tick_with(|_| Some(pose_frame(0.0)));
        wall.tick_with(|_| Some(pose_frame(0.4)));
        let reading = wall
            .tick_with(|_| Some(RawFrame::from(r#"{"landmarks":[],"depth_z":null}"#)));

        assert!(!reading.has_depth);
        let pose = wall.pipeline(Modality::Pose).unwrap().filter();
        assert!((pose.user_depth() - 0.4).abs() < 1e-6);
        assert!(!pose.has_depth());
    }

    #[test]
    fn test_nan_sample_is_no_sample() {
        let mut pipeline =
            ModalityPipeline::new(Modality::Pose, "127.0.0.1", 5050, &StreamConfig::default(), &plain_filter());
        pipeline.process(Some(&pose_frame(0.2)));

        // Python's json.dumps emits a bare NaN token, which is not valid JSON
        let reading = pipeline.process(Some(&RawFrame::from(r#"{"depth_z": NaN}"#)));
        assert!(!reading.has_depth);
        assert_eq!(pipeline.filter().baseline(), Some(0.2));
    }

    #[test]
    fn test_stale_after_idle_ticks() {
        let mut pipeline = face_pipeline(2);
        assert!(pipeline.process(Some(&face_frame(0.1))).has_depth);

        // Held while the source is merely slower than the tick rate
        assert!(pipeline.process(None).has_depth);
        assert!(pipeline.process(None).has_depth);
        assert!(!pipeline.process(None).has_depth);

        assert!(pipeline.process(Some(&face_frame(0.1))).has_depth);
    }

    #[test]
    fn test_strict_availability_with_zero_stale_ticks() {
        let mut pipeline = face_pipeline(0);
        assert!(pipeline.process(Some(&face_frame(0.1))).has_depth);
        assert!(!pipeline.process(None).has_depth);
    }

    #[test]
    fn test_fusion_face_and_pose() {
        let mut config = test_config(vec![Modality::Face, Modality::Pose, Modality::Hand], 6);
        config.filters.face.deadzone = 0.0;
        let mut wall = Wall::new(&config.walls[0], &config);

        // Baselines
        let mut frames: HashMap<Modality, RawFrame> = HashMap::new();
        frames.insert(Modality::Face, face_frame(0.0));
        frames.insert(Modality::Pose, pose_frame(0.0));
        wall.tick_with(|m| frames.get(&m).cloned());

        // Face moves, pose holds still, hand never reports
        frames.insert(Modality::Face, face_frame(2.0));
        for _ in 0..200 {
            wall.tick_with(|m| frames.get(&m).cloned());
        }

        let fused = wall.fused();
        assert!(fused.has_depth);
        assert!((fused.depth - 1.0).abs() < 1e-4, "fused {}", fused.depth);
        assert_eq!(wall.fused_output().load(), fused);
        assert_eq!(wall.ticks(), 201);
    }

    #[test]
    fn test_fusion_falls_back_to_pose_then_nothing() {
        let config = test_config(vec![Modality::Face, Modality::Pose], 0);
        let mut wall = Wall::new(&config.walls[0], &config);

        wall.tick_with(|m| match m {
            Modality::Pose => Some(pose_frame(0.0)),
            _ => None,
        });
        let reading = wall.tick_with(|m| match m {
            Modality::Pose => Some(pose_frame(0.5)),
            _ => None,
        });
        assert!(reading.has_depth);
        assert!((reading.depth - wall.pipeline(Modality::Pose).unwrap().filter().user_depth()).abs() < 1e-6);

        let reading = wall.tick_with(|_| None);
        assert_eq!(reading, DepthReading::new(0.0, false));
    }

    #[test]
    fn test_wall_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut config = test_config(vec![Modality::Face], 1_000);
        config.walls[0].ports.face = port;
        config.stream.poll_interval_ms = 2;
        let mut wall = Wall::new(&config.walls[0], &config);

        assert!(wall.connect().is_empty());
        let (mut server, _) = listener.accept().unwrap();

        fn send_and_tick(wall: &mut Wall, server: &mut std::net::TcpStream, tz: f32) -> DepthReading {
            let before = wall_frames(wall);

            let mut line = face_frame(tz).into_bytes();
            line.push(b'\n');
            server.write_all(&line).unwrap();

            let deadline = Instant::now() + Duration::from_secs(2);
            while wall_frames(wall) == before {
                assert!(Instant::now() < deadline, "no frame arrived");
                std::thread::sleep(Duration::from_millis(2));
            }
            wall.tick()
        }

        fn wall_frames(wall: &Wall) -> u64 {
            wall.pipeline(Modality::Face)
                .unwrap()
                .client()
                .stats()
                .frames_received
        }

        let r = send_and_tick(&mut wall, &mut server, 0.10);
        assert_eq!(r, DepthReading::new(0.0, true));

        let r = send_and_tick(&mut wall, &mut server, 0.12);
        assert!((r.depth - 0.004).abs() < 1e-5);

        wall.close();
        assert!(!wall.pipeline(Modality::Face).unwrap().client().is_running());
    }

    #[test]
    fn test_connect_failure_reported() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut config = test_config(vec![Modality::Hand], 6);
        config.walls[0].ports.hand = port;
        let mut wall = Wall::new(&config.walls[0], &config);

        let errors = wall.connect();
        assert_eq!(errors.len(), 1);

        // Unconnected walls still tick and simply report no depth
        assert_eq!(wall.tick(), DepthReading::new(0.0, false));
    }
}
