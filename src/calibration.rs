// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Per-model calibration tables.
//!
//! A [`Calibration`] is built once from a [`CalibrationConfig`] and is
//! read-only afterwards, so it can be shared between threads transforming
//! independent packets. Construction precomputes everything the transform
//! needs per point:
//!
//! - sine/cosine of every laser's rotational and vertical correction
//! - a full-circle rotation lookup at 0.01° resolution
//! - a `[block][slot]` table of firing time offsets from packet start
//! - for the VLS-128, the azimuth fraction of each firing group

use crate::{
    lidar::{Error, Model},
    packet::{BLOCKS_PER_PACKET, ROTATION_MAX_UNITS, SCANS_PER_BLOCK},
};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

/// VLS-128 duration of one channel firing in microseconds
pub const VLS128_CHANNEL_TDURATION: f64 = 2.665;
/// VLS-128 duration of one full firing sequence in microseconds
pub const VLS128_SEQ_TDURATION: f64 = 53.3;
/// VLS-128 offset between the packet timestamp and the first firing
pub const VLS128_TOH_ADJUSTMENT: f64 = 8.7;

/// Number of firing groups in a VLS-128 sequence
pub const VLS128_FIRING_GROUPS: usize = 16;

/// VLP-16 vertical angles in degrees, by laser id.
pub const VLP16_VERTICAL_DEGREES: [f64; 16] = [
    -15.0, 1.0, -13.0, 3.0, -11.0, 5.0, -9.0, 7.0, -7.0, 9.0, -5.0, 11.0, -3.0, 13.0, -1.0, 15.0,
];

/// HDL-32E vertical angles in degrees, by laser id.
pub const HDL32E_VERTICAL_DEGREES: [f64; 32] = [
    -30.67, -9.33, -29.33, -8.00, -28.00, -6.67, -26.67, -5.33, -25.33, -4.00, -24.00, -2.67,
    -22.67, -1.33, -21.33, 0.00, -20.00, 1.33, -18.67, 2.67, -17.33, 4.00, -16.00, 5.33, -14.67,
    6.67, -13.33, 8.00, -12.00, 9.33, -10.67, 10.67,
];

fn default_max_intensity() -> u8 {
    255
}

/// Correction values for one laser as read from a calibration description.
///
/// Angles are in radians and distances in meters, following the field
/// names of the Velodyne calibration files.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct LaserConfig {
    pub laser_id: usize,
    #[serde(default)]
    pub rot_correction: f64,
    #[serde(default)]
    pub vert_correction: f64,
    #[serde(default)]
    pub dist_correction: f64,
    /// X distance correction, with `dist_correction_y` enables the two-point
    /// correction
    #[serde(default)]
    pub dist_correction_x: Option<f64>,
    #[serde(default)]
    pub dist_correction_y: Option<f64>,
    #[serde(default)]
    pub vert_offset_correction: f64,
    #[serde(default)]
    pub horiz_offset_correction: f64,
    #[serde(default)]
    pub min_intensity: u8,
    #[serde(default = "default_max_intensity")]
    pub max_intensity: u8,
    #[serde(default)]
    pub focal_distance: f64,
    #[serde(default)]
    pub focal_slope: f64,
}

impl LaserConfig {
    /// Laser with only a vertical angle, all other corrections neutral.
    pub fn with_vertical(laser_id: usize, vert_correction: f64) -> Self {
        Self {
            laser_id,
            rot_correction: 0.0,
            vert_correction,
            dist_correction: 0.0,
            dist_correction_x: None,
            dist_correction_y: None,
            vert_offset_correction: 0.0,
            horiz_offset_correction: 0.0,
            min_intensity: 0,
            max_intensity: 255,
            focal_distance: 0.0,
            focal_slope: 0.0,
        }
    }
}

/// Calibration description consumed by [`Calibration::new`].
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct CalibrationConfig {
    pub model: Model,
    /// Meters per raw distance unit, defaults to the model's resolution
    #[serde(default)]
    pub distance_resolution: Option<f64>,
    pub lasers: Vec<LaserConfig>,
}

impl CalibrationConfig {
    /// Parse a JSON calibration description.
    ///
    /// Fails on malformed JSON, an empty laser list or a non-positive
    /// distance resolution.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.lasers.is_empty() {
            return Err(Error::Calibration(format!(
                "{} calibration has no lasers",
                self.model
            )));
        }
        if let Some(resolution) = self.distance_resolution {
            if !(resolution.is_finite() && resolution > 0.0) {
                return Err(Error::Calibration(format!(
                    "invalid distance resolution {}",
                    resolution
                )));
            }
        }
        Ok(())
    }

    /// Read and parse a JSON calibration description.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&json)
    }

    /// Factory nominal calibration using the published vertical angles.
    ///
    /// Only available for models whose angles are fixed by design; the
    /// 64- and 128-channel sensors ship an individual calibration file.
    pub fn nominal(model: Model) -> Result<Self, Error> {
        let degrees: &[f64] = match model {
            Model::Vlp16 | Model::Vlp16HiRes => &VLP16_VERTICAL_DEGREES,
            Model::Hdl32e => &HDL32E_VERTICAL_DEGREES,
            _ => {
                return Err(Error::UnsupportedModel(format!(
                    "no nominal calibration for {}",
                    model
                )));
            }
        };

        let lasers = degrees
            .iter()
            .enumerate()
            .map(|(id, deg)| LaserConfig::with_vertical(id, deg.to_radians()))
            .collect();

        Ok(Self {
            model,
            distance_resolution: None,
            lasers,
        })
    }
}

/// Two-point distance refinement for one laser.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TwoPointCorrection {
    pub dist_correction_x: f64,
    pub dist_correction_y: f64,
}

/// Corrections for one laser with precomputed trigonometry.
#[derive(Clone, Debug, PartialEq)]
pub struct LaserCorrection {
    pub laser_id: usize,
    pub rot_correction: f64,
    pub vert_correction: f64,
    pub cos_rot_correction: f64,
    pub sin_rot_correction: f64,
    pub cos_vert_correction: f64,
    pub sin_vert_correction: f64,
    pub dist_correction: f64,
    pub two_pt_correction: Option<TwoPointCorrection>,
    pub vert_offset_correction: f64,
    pub horiz_offset_correction: f64,
    pub min_intensity: f64,
    pub max_intensity: f64,
    pub focal_distance: f64,
    pub focal_slope: f64,
}

impl LaserCorrection {
    pub fn new(config: &LaserConfig) -> Self {
        let two_pt_correction = match (config.dist_correction_x, config.dist_correction_y) {
            (Some(x), Some(y)) => Some(TwoPointCorrection {
                dist_correction_x: x,
                dist_correction_y: y,
            }),
            _ => None,
        };

        Self {
            laser_id: config.laser_id,
            rot_correction: config.rot_correction,
            vert_correction: config.vert_correction,
            cos_rot_correction: config.rot_correction.cos(),
            sin_rot_correction: config.rot_correction.sin(),
            cos_vert_correction: config.vert_correction.cos(),
            sin_vert_correction: config.vert_correction.sin(),
            dist_correction: config.dist_correction,
            two_pt_correction,
            vert_offset_correction: config.vert_offset_correction,
            horiz_offset_correction: config.horiz_offset_correction,
            min_intensity: config.min_intensity as f64,
            max_intensity: config.max_intensity as f64,
            focal_distance: config.focal_distance,
            focal_slope: config.focal_slope,
        }
    }
}

/// Firing sequence of one model family.
///
/// A firing's offset from packet start is
/// `full_firing × block_index(block, slot) + single_firing ×
/// point_index(block, slot) + bias`, durations in microseconds.
#[derive(Clone, Copy, Debug)]
pub struct FiringSequence {
    pub name: &'static str,
    pub full_firing_us: f64,
    pub single_firing_us: f64,
    pub bias_us: f64,
    pub block_index: fn(usize, usize) -> usize,
    pub point_index: fn(usize, usize) -> usize,
}

// Each VLP-16 block holds two 16-laser firing sequences.
fn vlp16_block_index(block: usize, slot: usize) -> usize {
    block * 2 + slot / 16
}

fn vlp16_point_index(_block: usize, slot: usize) -> usize {
    slot % 16
}

fn block_per_sequence(block: usize, _slot: usize) -> usize {
    block
}

// Lasers fire in pairs.
fn paired_point_index(_block: usize, slot: usize) -> usize {
    slot / 2
}

// Four blocks (one per bank) per sequence, eight lasers per firing group.
fn vls128_block_index(block: usize, _slot: usize) -> usize {
    block / 4
}

// A maintenance slot precedes group 8.
fn vls128_point_index(block: usize, slot: usize) -> usize {
    let group = ((block % 4) * SCANS_PER_BLOCK + slot) / 8;
    group + group / 8
}

fn zero_index(_block: usize, _slot: usize) -> usize {
    0
}

pub const VLP16_FIRING: FiringSequence = FiringSequence {
    name: "vlp16",
    full_firing_us: 55.296,
    single_firing_us: 2.304,
    bias_us: 0.0,
    block_index: vlp16_block_index,
    point_index: vlp16_point_index,
};

pub const VLP32_FIRING: FiringSequence = FiringSequence {
    name: "vlp32",
    full_firing_us: 55.296,
    single_firing_us: 2.304,
    bias_us: 0.0,
    block_index: block_per_sequence,
    point_index: paired_point_index,
};

pub const HDL32_FIRING: FiringSequence = FiringSequence {
    name: "hdl32",
    full_firing_us: 46.080,
    single_firing_us: 1.152,
    bias_us: 0.0,
    block_index: block_per_sequence,
    point_index: paired_point_index,
};

pub const VLS128_FIRING: FiringSequence = FiringSequence {
    name: "vls128",
    full_firing_us: VLS128_SEQ_TDURATION,
    single_firing_us: VLS128_CHANNEL_TDURATION,
    bias_us: -VLS128_TOH_ADJUSTMENT,
    block_index: vls128_block_index,
    point_index: vls128_point_index,
};

// No published firing sequence, all offsets are zero.
pub const UNTIMED_FIRING: FiringSequence = FiringSequence {
    name: "untimed",
    full_firing_us: 0.0,
    single_firing_us: 0.0,
    bias_us: 0.0,
    block_index: zero_index,
    point_index: zero_index,
};

impl FiringSequence {
    pub fn for_model(model: Model) -> FiringSequence {
        match model {
            Model::Vlp16 | Model::Vlp16HiRes => VLP16_FIRING,
            Model::Vlp32c => VLP32_FIRING,
            Model::Hdl32e => HDL32_FIRING,
            Model::Vls128 => VLS128_FIRING,
            Model::Hdl64e | Model::Hdl64eS21 | Model::Hdl64eS3 => UNTIMED_FIRING,
        }
    }

    /// Offset in seconds of the firing in `slot` of `block` from packet
    /// start.
    pub fn offset(&self, block: usize, slot: usize) -> f64 {
        let us = self.full_firing_us * (self.block_index)(block, slot) as f64
            + self.single_firing_us * (self.point_index)(block, slot) as f64
            + self.bias_us;
        us * 1e-6
    }
}

/// Calibration tables for one sensor.
#[derive(Clone, Debug)]
pub struct Calibration {
    model: Model,
    distance_resolution: f64,
    lasers: Vec<Option<LaserCorrection>>,
    firing: FiringSequence,
    timing_offsets: [[f64; SCANS_PER_BLOCK]; BLOCKS_PER_PACKET],
    sin_rot_table: Vec<f64>,
    cos_rot_table: Vec<f64>,
    vls128_azimuth_cache: Option<[f64; VLS128_FIRING_GROUPS]>,
}

impl Calibration {
    /// Build the calibration tables for `config`.
    ///
    /// Never fails. Lasers whose id is outside the model's channel range are
    /// dropped; channels the description does not mention stay absent and
    /// their firings are skipped by the transform.
    pub fn new(config: &CalibrationConfig) -> Self {
        let model = config.model;
        let channels = model.channels();

        let len = config
            .lasers
            .iter()
            .map(|laser| laser.laser_id + 1)
            .filter(|&n| n <= channels)
            .max()
            .unwrap_or(0);
        let mut lasers: Vec<Option<LaserCorrection>> = vec![None; len];

        for laser in &config.lasers {
            if laser.laser_id >= channels {
                warn!(
                    "dropping laser {} outside {} channel range of {}",
                    laser.laser_id, channels, model
                );
                continue;
            }
            if lasers[laser.laser_id].is_some() {
                warn!("duplicate calibration for laser {}", laser.laser_id);
            }
            lasers[laser.laser_id] = Some(LaserCorrection::new(laser));
        }

        let configured = lasers.iter().filter(|l| l.is_some()).count();
        if configured < channels {
            warn!(
                "calibration for {} covers {} of {} channels",
                model, configured, channels
            );
        }

        let firing = FiringSequence::for_model(model);
        let mut timing_offsets = [[0.0; SCANS_PER_BLOCK]; BLOCKS_PER_PACKET];
        for (block, row) in timing_offsets.iter_mut().enumerate() {
            for (slot, offset) in row.iter_mut().enumerate() {
                *offset = firing.offset(block, slot);
            }
        }

        let (sin_rot_table, cos_rot_table) = (0..ROTATION_MAX_UNITS)
            .map(|unit| (unit as f64 * 0.01).to_radians().sin_cos())
            .unzip();

        let vls128_azimuth_cache = (model == Model::Vls128).then(|| {
            std::array::from_fn(|i| {
                (VLS128_CHANNEL_TDURATION / VLS128_SEQ_TDURATION) * (i + i / 8) as f64
            })
        });

        let distance_resolution = config
            .distance_resolution
            .unwrap_or_else(|| model.distance_resolution());

        debug!(
            "built {} calibration: {} lasers, {} m resolution, {} timing",
            model, configured, distance_resolution, firing.name
        );

        Self {
            model,
            distance_resolution,
            lasers,
            firing,
            timing_offsets,
            sin_rot_table,
            cos_rot_table,
            vls128_azimuth_cache,
        }
    }

    pub fn model(&self) -> Model {
        self.model
    }

    /// Meters per raw distance unit.
    pub fn distance_resolution(&self) -> f64 {
        self.distance_resolution
    }

    /// Corrections for `channel`, `None` when the description lacks it.
    #[inline]
    pub fn laser(&self, channel: usize) -> Option<&LaserCorrection> {
        self.lasers.get(channel).and_then(Option::as_ref)
    }

    /// Number of channel entries, at most the model's channel count.
    pub fn num_lasers(&self) -> usize {
        self.lasers.len()
    }

    pub fn firing_sequence(&self) -> &FiringSequence {
        &self.firing
    }

    /// Time offset in seconds of `slot` in `block` from packet start.
    #[inline]
    pub fn timing_offset(&self, block: usize, slot: usize) -> f64 {
        self.timing_offsets[block][slot]
    }

    pub fn timing_offsets(&self) -> &[[f64; SCANS_PER_BLOCK]; BLOCKS_PER_PACKET] {
        &self.timing_offsets
    }

    /// Sine of `unit` hundredths of a degree, `unit < 36000`.
    #[inline]
    pub fn sin_rot(&self, unit: u16) -> f64 {
        self.sin_rot_table[unit as usize]
    }

    /// Cosine of `unit` hundredths of a degree, `unit < 36000`.
    #[inline]
    pub fn cos_rot(&self, unit: u16) -> f64 {
        self.cos_rot_table[unit as usize]
    }

    /// Fraction of a block's azimuth step elapsed when each VLS-128 firing
    /// group fires. `None` for other models.
    pub fn vls128_azimuth_cache(&self) -> Option<&[f64; VLS128_FIRING_GROUPS]> {
        self.vls128_azimuth_cache.as_ref()
    }
}
