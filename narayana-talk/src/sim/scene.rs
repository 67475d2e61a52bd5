//! In-memory scene holding avatar instances

use super::{CallLog, SimEngine};
use crate::engine::AvatarEngine;
use crate::error::BridgeError;
use crate::scene::{ActiveAvatar, AvatarScene, Background, InstanceId, LookController, Transform};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Gaze controller that logs its calls
#[derive(Debug, Clone)]
pub struct SimLook {
    avatar_id: String,
    log: CallLog,
}

impl LookController for SimLook {
    fn look_at_camera(&mut self) {
        self.log.record(format!("look.look_at_camera {}", self.avatar_id));
    }
}

#[derive(Debug)]
struct SimInstance {
    avatar_id: String,
    transform: Transform,
    engine: Option<SimEngine>,
    has_look: bool,
}

#[derive(Debug)]
struct SceneState {
    instances: BTreeMap<InstanceId, SimInstance>,
    active: Option<InstanceId>,
    next_instance: u64,
    background: Option<Background>,
    has_camera: bool,
    auto_respond: bool,
    failing_assets: HashSet<String>,
    without_engine: HashSet<String>,
    without_look: HashSet<String>,
}

/// Scene with at most one live avatar instance.
///
/// Each instantiated avatar gets its own [`SimEngine`] named after the
/// avatar id, sharing the scene's [`CallLog`].
#[derive(Debug, Clone)]
pub struct SimScene {
    state: Arc<Mutex<SceneState>>,
    log: CallLog,
}

impl SimScene {
    pub fn new(log: CallLog) -> Self {
        Self {
            state: Arc::new(Mutex::new(SceneState {
                instances: BTreeMap::new(),
                active: None,
                next_instance: 1,
                background: None,
                has_camera: true,
                auto_respond: false,
                failing_assets: HashSet::new(),
                without_engine: HashSet::new(),
                without_look: HashSet::new(),
            })),
            log,
        }
    }

    /// Scene that already contains `avatar_id` at the default transform
    pub fn with_avatar(log: CallLog, avatar_id: &str) -> Self {
        let scene = Self::new(log);
        scene.spawn(avatar_id, Transform::default());
        scene
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }

    /// Engines created from now on raise events on their own
    pub fn set_auto_respond(&self, auto_respond: bool) {
        let mut state = self.state.lock();
        state.auto_respond = auto_respond;
        for engine in state.instances.values().filter_map(|i| i.engine.as_ref()) {
            engine.set_auto_respond(auto_respond);
        }
    }

    pub fn set_has_camera(&self, has_camera: bool) {
        self.state.lock().has_camera = has_camera;
    }

    /// Make instantiating `asset` fail
    pub fn fail_asset(&self, asset: &str) {
        self.state.lock().failing_assets.insert(asset.to_string());
    }

    /// Instances of `avatar_id` come without an engine component
    pub fn without_engine(&self, avatar_id: &str) {
        self.state.lock().without_engine.insert(avatar_id.to_string());
    }

    pub fn without_look(&self, avatar_id: &str) {
        self.state.lock().without_look.insert(avatar_id.to_string());
    }

    /// Engine of the live instance of `avatar_id`
    pub fn engine(&self, avatar_id: &str) -> Option<SimEngine> {
        self.state
            .lock()
            .instances
            .values()
            .find(|i| i.avatar_id == avatar_id)
            .and_then(|i| i.engine.clone())
    }

    pub fn background(&self) -> Option<Background> {
        self.state.lock().background
    }

    pub fn instance_count(&self) -> usize {
        self.state.lock().instances.len()
    }

    pub fn set_transform(&self, avatar_id: &str, transform: Transform) {
        let mut state = self.state.lock();
        if let Some(instance) = state.instances.values_mut().find(|i| i.avatar_id == avatar_id) {
            instance.transform = transform;
        }
    }

    pub fn transform(&self, avatar_id: &str) -> Option<Transform> {
        self.state
            .lock()
            .instances
            .values()
            .find(|i| i.avatar_id == avatar_id)
            .map(|i| i.transform)
    }

    fn spawn(&self, avatar_id: &str, at: Transform) -> InstanceId {
        let mut state = self.state.lock();
        let id = InstanceId(state.next_instance);
        state.next_instance += 1;

        let engine = if state.without_engine.contains(avatar_id) {
            None
        } else {
            let engine = SimEngine::new(avatar_id, self.log.clone());
            engine.set_auto_respond(state.auto_respond);
            Some(engine)
        };
        let has_look = !state.without_look.contains(avatar_id);
        state.instances.insert(
            id,
            SimInstance {
                avatar_id: avatar_id.to_string(),
                transform: at,
                engine,
                has_look,
            },
        );
        state.active = Some(id);
        id
    }
}

impl AvatarScene for SimScene {
    fn active_avatar(&self) -> Option<ActiveAvatar> {
        let state = self.state.lock();
        let instance = state.active?;
        state.instances.get(&instance).map(|i| ActiveAvatar {
            avatar_id: i.avatar_id.clone(),
            instance,
        })
    }

    fn transform_of(&self, instance: InstanceId) -> Option<Transform> {
        self.state.lock().instances.get(&instance).map(|i| i.transform)
    }

    fn destroy(&mut self, instance: InstanceId) {
        let mut state = self.state.lock();
        if let Some(removed) = state.instances.remove(&instance) {
            self.log.record(format!("scene.destroy {}", removed.avatar_id));
        }
        if state.active == Some(instance) {
            state.active = None;
        }
    }

    fn instantiate(&mut self, avatar_id: &str, asset: &str, at: Transform) -> Result<InstanceId, BridgeError> {
        if self.state.lock().failing_assets.contains(asset) {
            return Err(BridgeError::Lifecycle(format!("Failed to load avatar asset: {}", asset)));
        }
        let instance = self.spawn(avatar_id, at);
        self.log.record(format!("scene.instantiate {}", avatar_id));
        Ok(instance)
    }

    fn engine_for(&mut self, instance: InstanceId) -> Option<Box<dyn AvatarEngine>> {
        let state = self.state.lock();
        let engine = state.instances.get(&instance)?.engine.clone()?;
        Some(Box::new(engine))
    }

    fn look_controller_for(&mut self, instance: InstanceId) -> Option<Box<dyn LookController>> {
        let state = self.state.lock();
        let instance = state.instances.get(&instance).filter(|i| i.has_look)?;
        Some(Box::new(SimLook {
            avatar_id: instance.avatar_id.clone(),
            log: self.log.clone(),
        }))
    }

    fn set_background(&mut self, background: Background) -> Result<(), BridgeError> {
        let mut state = self.state.lock();
        if !state.has_camera {
            return Err(BridgeError::Lifecycle("Main camera not found".to_string()));
        }
        state.background = Some(background);
        self.log.record(format!("scene.set_background {:?}", background));
        Ok(())
    }
}
