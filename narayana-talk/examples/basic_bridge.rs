//! Basic bridge example: one live Speak request against the in-memory engine

use narayana_talk::config::AvatarAssetConfig;
use narayana_talk::sim::{CallLog, RecordingHost, SimDecoder, SimScene};
use narayana_talk::{Bridge, BridgeConfig, BridgeError};
use std::sync::Arc;

fn main() -> Result<(), BridgeError> {
    // Initialize tracing for better error messages
    tracing_subscriber::fmt::init();

    let mut config = BridgeConfig::default();
    config.avatars = vec![
        AvatarAssetConfig {
            id: "mika".to_string(),
            asset: "avatars/mika.glb".to_string(),
        },
        AvatarAssetConfig {
            id: "ren".to_string(),
            asset: "avatars/ren.glb".to_string(),
        },
    ];
    let dt = config.tick_seconds();

    let log = CallLog::new();
    let scene = SimScene::with_avatar(log.clone(), "mika");
    scene.set_auto_respond(true);
    let host = Arc::new(RecordingHost::new());

    let mut bridge = Bridge::new(config, Box::new(scene), Arc::new(SimDecoder::new(log)), host.clone())?;
    bridge.start();

    println!("Speaking...");
    bridge.handle("Speak", r#"{"text":"Hello from the bridge"}"#);
    for _ in 0..5 {
        bridge.update(dt);
    }

    println!("Switching avatar...");
    bridge.handle("ChangeAvatar", "ren");
    bridge.handle("GetAvatarList", "");

    for message in host.messages() {
        println!("  {}({})", message.method, message.args.join(", "));
    }
    Ok(())
}
