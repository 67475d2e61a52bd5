//! Avatar lifecycle: the single active binding and hot-swap
//!
//! An [`AvatarBinding`] ties one avatar instance to its engine handle, event
//! subscription, gaze controller and timeline player. Each binding gets a
//! fresh generation number; events stamped with any other generation are
//! stale.

use crate::config::AvatarAssetConfig;
use crate::engine::{AvatarEngine, EngineEventSink, SubscriptionId, TaggedEvent};
use crate::error::BridgeError;
use crate::scene::{AvatarScene, Background, InstanceId, LookController, Transform};
use crate::timeline::TimelinePlayer;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Avatar ids the host may switch to, in configuration order
#[derive(Debug, Clone, Default)]
pub struct AvatarCatalog {
    entries: Vec<AvatarAssetConfig>,
}

impl AvatarCatalog {
    pub fn new(entries: Vec<AvatarAssetConfig>) -> Self {
        Self { entries }
    }

    /// Asset key for an avatar id
    pub fn resolve(&self, avatar_id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.id == avatar_id)
            .map(|e| e.asset.as_str())
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }
}

/// The active avatar and everything bound to it
pub struct AvatarBinding {
    avatar_id: String,
    instance: InstanceId,
    engine: Box<dyn AvatarEngine>,
    /// Kept alive for the binding's lifetime
    _look: Option<Box<dyn LookController>>,
    subscription: Option<SubscriptionId>,
    generation: u64,
    timeline: Option<TimelinePlayer>,
}

impl AvatarBinding {
    pub fn avatar_id(&self) -> &str {
        &self.avatar_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn engine(&self) -> &dyn AvatarEngine {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> &mut dyn AvatarEngine {
        self.engine.as_mut()
    }

    pub fn timeline_mut(&mut self) -> Option<&mut TimelinePlayer> {
        self.timeline.as_mut()
    }

    /// Revoke the event subscription; idempotent
    fn revoke(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.engine.unsubscribe(subscription);
            debug!(
                "Revoked event subscription {:?} of '{}' (generation {})",
                subscription, self.avatar_id, self.generation
            );
        }
    }
}

/// Result of a successful `change_avatar`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOutcome {
    /// Requested avatar was already active; nothing torn down
    AlreadyActive,
    Swapped,
}

/// Failed `change_avatar`
#[derive(Debug)]
pub struct SwapFailure {
    pub error: BridgeError,
    /// Whether the previous binding was already destroyed (no rollback)
    pub torn_down: bool,
}

/// Scene state a failed swap leaves behind
#[derive(Debug, Clone, Copy)]
struct SwapRemnant {
    /// Instantiated but never bound
    instance: Option<InstanceId>,
    /// Placement of the torn-down avatar
    transform: Transform,
}

/// Owns the active binding and performs avatar hot-swap
pub struct AvatarLifecycle {
    scene: Box<dyn AvatarScene>,
    catalog: AvatarCatalog,
    binding: Option<AvatarBinding>,
    remnant: Option<SwapRemnant>,
    last_generation: u64,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl AvatarLifecycle {
    pub fn new(
        scene: Box<dyn AvatarScene>,
        catalog: AvatarCatalog,
        events_tx: mpsc::UnboundedSender<TaggedEvent>,
    ) -> Self {
        Self {
            scene,
            catalog,
            binding: None,
            remnant: None,
            last_generation: 0,
            events_tx,
        }
    }

    pub fn binding(&self) -> Option<&AvatarBinding> {
        self.binding.as_ref()
    }

    pub fn binding_mut(&mut self) -> Option<&mut AvatarBinding> {
        self.binding.as_mut()
    }

    pub fn current_avatar_id(&self) -> Option<&str> {
        self.binding.as_ref().map(|b| b.avatar_id.as_str())
    }

    /// Generation of the active binding; `None` when no avatar is bound
    pub fn generation(&self) -> Option<u64> {
        self.binding.as_ref().map(|b| b.generation)
    }

    pub fn catalog(&self) -> &AvatarCatalog {
        &self.catalog
    }

    /// Bind the avatar already in the scene, or instantiate `initial` from the catalog
    pub fn bind_initial(&mut self, initial: Option<&str>) -> Result<(), BridgeError> {
        if self.binding.is_some() {
            return Ok(());
        }

        if let Some(active) = self.scene.active_avatar() {
            info!("Avatar found in scene: {}", active.avatar_id);
            return self.bind(active.avatar_id, active.instance);
        }

        let avatar_id = initial
            .ok_or_else(|| BridgeError::Lifecycle("Avatar engine not found in scene".to_string()))?;
        let asset = self
            .catalog
            .resolve(avatar_id)
            .ok_or_else(|| BridgeError::Lifecycle(format!("Avatar not found: {}", avatar_id)))?
            .to_string();
        let instance = self.scene.instantiate(avatar_id, &asset, Transform::default())?;
        info!("Instantiated initial avatar {} from {}", avatar_id, asset);
        self.bind(avatar_id.to_string(), instance)
    }

    /// Swap the active avatar.
    ///
    /// Subscriptions of the outgoing binding are revoked before anything else
    /// is touched. Once the outgoing instance is destroyed there is no
    /// rollback: a failure after that point leaves no avatar bound.
    pub fn change_avatar(&mut self, avatar_id: &str) -> Result<SwapOutcome, SwapFailure> {
        if self.current_avatar_id() == Some(avatar_id) {
            debug!("Avatar {} already active", avatar_id);
            return Ok(SwapOutcome::AlreadyActive);
        }

        let asset = match self.catalog.resolve(avatar_id) {
            Some(asset) => asset.to_string(),
            None => {
                return Err(SwapFailure {
                    error: BridgeError::Lifecycle(format!("Avatar not found: {}", avatar_id)),
                    torn_down: false,
                })
            }
        };

        let transform = match self.binding.take() {
            Some(mut outgoing) => {
                outgoing.revoke();
                if let Err(e) = outgoing.engine.stop() {
                    warn!("Failed to stop outgoing avatar {}: {}", outgoing.avatar_id, e);
                }
                if let Err(e) = outgoing.engine.clear_cache(None) {
                    warn!("Failed to clear cache of outgoing avatar {}: {}", outgoing.avatar_id, e);
                }
                if let Some(ref mut timeline) = outgoing.timeline {
                    timeline.reset();
                }

                let transform = self.scene.transform_of(outgoing.instance).unwrap_or_default();
                self.scene.destroy(outgoing.instance);
                info!(
                    "Tore down avatar {} (generation {})",
                    outgoing.avatar_id, outgoing.generation
                );
                transform
            }
            None => match self.remnant.take() {
                Some(remnant) => self.clear_remnant(remnant),
                None => Transform::default(),
            },
        };

        let instance = match self.scene.instantiate(avatar_id, &asset, transform) {
            Ok(instance) => instance,
            Err(error) => {
                self.remnant = Some(SwapRemnant {
                    instance: None,
                    transform,
                });
                return Err(SwapFailure { error, torn_down: true });
            }
        };

        if let Err(error) = self.bind(avatar_id.to_string(), instance) {
            self.remnant = Some(SwapRemnant {
                instance: Some(instance),
                transform,
            });
            return Err(SwapFailure { error, torn_down: true });
        }

        info!("Avatar changed to {}", avatar_id);
        Ok(SwapOutcome::Swapped)
    }

    /// Destroy an unbound instance left by a failed swap and return the placement to reuse
    fn clear_remnant(&mut self, remnant: SwapRemnant) -> Transform {
        match remnant.instance {
            Some(instance) => {
                let transform = self.scene.transform_of(instance).unwrap_or(remnant.transform);
                self.scene.destroy(instance);
                info!("Destroyed unbound avatar instance {:?}", instance);
                transform
            }
            None => remnant.transform,
        }
    }

    /// Resolve handles on `instance`, subscribe, and build its timeline player
    fn bind(&mut self, avatar_id: String, instance: InstanceId) -> Result<(), BridgeError> {
        let mut engine = self.scene.engine_for(instance).ok_or_else(|| {
            BridgeError::Lifecycle(format!("Avatar engine component missing on '{}'", avatar_id))
        })?;

        let mut look = self.scene.look_controller_for(instance);
        match look {
            Some(ref mut controller) => controller.look_at_camera(),
            None => warn!("No look-target controller on '{}'", avatar_id),
        }

        self.last_generation += 1;
        let generation = self.last_generation;
        let subscription = engine.subscribe(EngineEventSink::new(generation, self.events_tx.clone()));

        let timeline = match engine.audio_output() {
            Some(output) => Some(TimelinePlayer::new(output)),
            None => {
                warn!("Avatar '{}' has no audio output; timeline disabled", avatar_id);
                None
            }
        };

        info!(
            "Bound avatar {} ({}) as generation {}",
            avatar_id,
            engine.name(),
            generation
        );
        self.binding = Some(AvatarBinding {
            avatar_id,
            instance,
            engine,
            _look: look,
            subscription: Some(subscription),
            generation,
            timeline,
        });
        Ok(())
    }

    pub fn set_background(&mut self, background: Background) -> Result<(), BridgeError> {
        self.scene.set_background(background)
    }

    /// Revoke the active binding's subscriptions; the instance stays in the scene
    pub fn shutdown(&mut self) {
        if let Some(ref mut binding) = self.binding {
            binding.revoke();
            if let Some(ref mut timeline) = binding.timeline {
                timeline.stop();
            }
        }
    }
}
