use crate::line_transport::{ByteSize, Parity, StopBits};
use crate::scan_path::TravelLimits;
use crate::stage::{ModePolicy, StageOptions};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Framing {
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub byte_size: ByteSize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageConfig {
    pub port: String,
    #[serde(default = "default_stage_baud_rate")]
    pub baud_rate: u32,
    #[serde(flatten)]
    pub framing: Framing,
    #[serde(default)]
    pub home_on_startup: bool,
    #[serde(default)]
    pub mode_policy: ModePolicy,
    pub ack_timeout_ms: Option<u64>, // None waits forever
    pub home_timeout_ms: Option<u64>,
}

impl StageConfig {
    pub fn options(&self) -> StageOptions {
        StageOptions {
            mode_policy: self.mode_policy,
            ack_timeout: self.ack_timeout_ms.map(Duration::from_millis),
            home_timeout: self.home_timeout_ms.map(Duration::from_millis),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightsConfig {
    pub port: String,
    #[serde(default = "default_lights_baud_rate")]
    pub baud_rate: u32,
    pub timeout_ms: Option<u64>,
}

/// Jog distances in mm
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JogConfig {
    pub xy_step: f64,
    pub z_step: f64,
}

impl Default for JogConfig {
    fn default() -> JogConfig {
        JogConfig {
            xy_step: 5.0,
            z_step: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeConfig {
    pub stage: StageConfig,
    pub lights: Option<LightsConfig>,
    #[serde(default)]
    pub travel: TravelLimits,
    #[serde(default)]
    pub jog: JogConfig,
}

fn default_stage_baud_rate() -> u32 {
    115200
}

fn default_lights_baud_rate() -> u32 {
    9600
}
