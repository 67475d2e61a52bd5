//! Scene collaborator interface: avatar instances, camera background, gaze

use crate::engine::AvatarEngine;
use crate::error::BridgeError;
use serde::{Deserialize, Serialize};

/// Scene object id of an avatar instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub u64);

/// Spatial transform carried across an avatar swap
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: [f32; 3],
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0, 1.0, 1.0],
        }
    }
}

/// 8-bit RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// Camera clear background
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Background {
    Transparent,
    Solid(Rgba),
}

impl Background {
    /// Parse `transparent` or an HTML hex color (`#RGB`, `#RGBA`, `#RRGGBB`, `#RRGGBBAA`)
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("transparent") {
            return Some(Background::Transparent);
        }
        parse_hex_color(value).map(Background::Solid)
    }
}

fn parse_hex_color(value: &str) -> Option<Rgba> {
    let hex = value.strip_prefix('#').unwrap_or(value);
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17);
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();

    match hex.len() {
        3 => Some(Rgba { r: nibble(0)?, g: nibble(1)?, b: nibble(2)?, a: 255 }),
        4 => Some(Rgba { r: nibble(0)?, g: nibble(1)?, b: nibble(2)?, a: nibble(3)? }),
        6 => Some(Rgba { r: byte(0)?, g: byte(2)?, b: byte(4)?, a: 255 }),
        8 => Some(Rgba { r: byte(0)?, g: byte(2)?, b: byte(4)?, a: byte(6)? }),
        _ => None,
    }
}

/// Avatar currently present in the scene
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveAvatar {
    pub avatar_id: String,
    pub instance: InstanceId,
}

/// Gaze / look-target controller attached to an avatar instance
pub trait LookController: Send {
    /// Point the avatar's gaze at the main camera
    fn look_at_camera(&mut self);
}

/// Scene operations needed to host and swap avatars
pub trait AvatarScene: Send {
    /// Avatar already placed in the scene at startup, if any
    fn active_avatar(&self) -> Option<ActiveAvatar>;

    fn transform_of(&self, instance: InstanceId) -> Option<Transform>;

    fn destroy(&mut self, instance: InstanceId);

    fn instantiate(&mut self, avatar_id: &str, asset: &str, at: Transform) -> Result<InstanceId, BridgeError>;

    /// Resolve the engine component of an instance
    fn engine_for(&mut self, instance: InstanceId) -> Option<Box<dyn AvatarEngine>>;

    fn look_controller_for(&mut self, instance: InstanceId) -> Option<Box<dyn LookController>>;

    /// Set the main camera background; fails when there is no camera
    fn set_background(&mut self, background: Background) -> Result<(), BridgeError>;
}
