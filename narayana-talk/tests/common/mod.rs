//! Shared bridge fixture for the integration tests

#![allow(dead_code)]

use narayana_talk::config::AvatarAssetConfig;
use narayana_talk::sim::{CallLog, RecordingHost, SimDecoder, SimEngine, SimScene};
use narayana_talk::{Bridge, BridgeConfig};
use std::sync::Arc;

pub const DT: f64 = 1.0 / 60.0;

/// Catalog of three avatars; `carol`'s asset is made to fail by [`Harness::new`]
pub fn catalog_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.avatars = ["alice", "bob", "carol"]
        .iter()
        .map(|id| AvatarAssetConfig {
            id: id.to_string(),
            asset: format!("assets/{}", id),
        })
        .collect();
    config
}

pub struct Harness {
    pub bridge: Bridge,
    pub host: Arc<RecordingHost>,
    pub scene: SimScene,
    pub decoder: SimDecoder,
    pub log: CallLog,
}

impl Harness {
    /// Started bridge with `alice` already in the scene
    pub fn new() -> Self {
        Self::with_config(catalog_config())
    }

    pub fn with_config(config: BridgeConfig) -> Self {
        let log = CallLog::new();
        let scene = SimScene::with_avatar(log.clone(), "alice");
        scene.fail_asset("assets/carol");
        let mut harness = Self::unstarted(config, scene, log);
        harness.bridge.start();
        harness
    }

    /// Bridge over `scene`, `start()` not called yet
    pub fn unstarted(config: BridgeConfig, scene: SimScene, log: CallLog) -> Self {
        let host = Arc::new(RecordingHost::new());
        let decoder = SimDecoder::new(log.clone());
        let bridge = Bridge::new(
            config,
            Box::new(scene.clone()),
            Arc::new(decoder.clone()),
            host.clone(),
        )
        .expect("valid config");
        Self {
            bridge,
            host,
            scene,
            decoder,
            log,
        }
    }

    /// Engine of the live instance of `avatar_id`
    pub fn engine(&self, avatar_id: &str) -> SimEngine {
        self.scene.engine(avatar_id).expect("avatar has an engine")
    }

    pub fn alice(&self) -> SimEngine {
        self.engine("alice")
    }

    pub fn tick(&mut self, ticks: u32) {
        for _ in 0..ticks {
            self.bridge.update(DT);
        }
    }

    pub fn handle(&mut self, method: &str, payload: &str) {
        self.bridge.handle(method, payload);
    }

    /// Callback names delivered after `OnBridgeReady`
    pub fn methods_after_ready(&self) -> Vec<&'static str> {
        self.host
            .methods()
            .into_iter()
            .skip_while(|m| *m == "OnBridgeReady")
            .collect()
    }

    pub fn errors(&self) -> Vec<Vec<String>> {
        self.host.args_of("OnError")
    }
}

pub fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
