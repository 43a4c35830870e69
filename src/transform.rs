// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Calibrated point computation from decoded packets.
//!
//! [`Transformer::unpack`] walks every firing of a [`RawPacket`], applies the
//! laser corrections from a [`Calibration`] and appends the resulting points
//! to a caller-owned [`PointBuffer`].
//!
//! Points are emitted in the ROS sensor frame: x forward, y left, z up.
//!
//! # Firing layout per model
//!
//! - **VLP-16**: each block holds two 16-laser firing sequences; azimuth is
//!   interpolated across the block from the next block's azimuth.
//! - **VLP-32C / HDL-32E**: one 32-laser sequence per block at the reported
//!   azimuth.
//! - **HDL-64E**: blocks alternate between the upper (lasers 0-31) and lower
//!   (lasers 32-63) banks.
//! - **VLS-128**: four consecutive blocks (banks) form one sequence; each
//!   firing group's azimuth is advanced by its share of the sequence.
//!
//! Malformed firings (zero distance, unknown bank, channel missing from the
//! calibration) are skipped without failing the packet.

use crate::{
    buffer::PointBuffer,
    calibration::{Calibration, LaserCorrection},
    formats::Point,
    lidar::Model,
    packet::{
        BANK_3, BANK_4, BLOCKS_PER_PACKET, LOWER_BANK, RawBlock, RawPacket, ROTATION_MAX_UNITS,
        SCANS_PER_BLOCK, UPPER_BANK,
    },
};
use chrono::{DateTime, TimeDelta, Utc};
use tracing::trace;

const VLP16_SCANS_PER_FIRING: usize = 16;
const VLP16_FIRINGS_PER_BLOCK: usize = 2;

/// Blocks forming one VLS-128 firing sequence
const VLS128_BLOCKS_PER_SEQUENCE: usize = 4;

/// Reference distances of the two-point correction in meters
const TWO_PT_NEAR_X: f64 = 2.4;
const TWO_PT_NEAR_Y: f64 = 1.93;
const TWO_PT_FAR: f64 = 25.04;

/// Focal distance scale of the intensity correction
const FOCAL_SCALE: f64 = 13100.0;

/// Converts decoded packets into calibrated points.
///
/// Borrows the calibration immutably, so several transformers can share one
/// [`Calibration`] across threads as long as each writes to its own buffer.
#[derive(Clone, Copy, Debug)]
pub struct Transformer<'a> {
    calibration: &'a Calibration,
}

impl<'a> Transformer<'a> {
    pub fn new(calibration: &'a Calibration) -> Self {
        Self { calibration }
    }

    pub fn calibration(&self) -> &'a Calibration {
        self.calibration
    }

    /// Append the points of `packet` to `cloud`.
    ///
    /// `packet_stamp` is the packet's absolute time (see
    /// [`RawPacket::stamp`]); each point's `delta_ns` is its firing time
    /// relative to the cloud stamp, plus `time_offset` when given. Stops
    /// silently once the cloud is full.
    ///
    /// Returns the number of points appended.
    pub fn unpack(
        &self,
        packet: &RawPacket,
        packet_stamp: DateTime<Utc>,
        time_offset: Option<TimeDelta>,
        cloud: &mut PointBuffer,
    ) -> usize {
        let base_ns = (packet_stamp - cloud.stamp()).num_nanoseconds().unwrap_or(0)
            + time_offset
                .and_then(|offset| offset.num_nanoseconds())
                .unwrap_or(0);

        let start = cloud.len();
        match self.calibration.model() {
            Model::Vlp16 | Model::Vlp16HiRes => self.unpack_vlp16(packet, base_ns, cloud),
            Model::Vls128 => self.unpack_vls128(packet, base_ns, cloud),
            Model::Vlp32c | Model::Hdl32e | Model::Hdl64e | Model::Hdl64eS21 | Model::Hdl64eS3 => {
                self.unpack_banked(packet, base_ns, cloud)
            }
        }
        cloud.len() - start
    }

    fn unpack_vlp16(&self, packet: &RawPacket, base_ns: i64, cloud: &mut PointBuffer) {
        let blocks = packet.blocks();
        let timing = self.calibration.firing_sequence();
        let block_duration = VLP16_FIRINGS_PER_BLOCK as f64 * timing.full_firing_us;
        let mut last_azimuth_diff = 0.0;

        for (i, block) in blocks.iter().enumerate() {
            if block.block_id() != UPPER_BANK {
                trace!("skipping VLP-16 block {} with id {:#06x}", i, block.block_id());
                continue;
            }

            let azimuth = block.rotation() as f64;
            let azimuth_diff = if i < BLOCKS_PER_PACKET - 1 {
                let raw_diff = blocks[i + 1].rotation() as i32 - block.rotation() as i32;
                // Wrapping through zero reuses the previous step
                if raw_diff < 0 {
                    if last_azimuth_diff > 0.0 {
                        last_azimuth_diff
                    } else {
                        continue;
                    }
                } else {
                    let diff = raw_diff.rem_euclid(ROTATION_MAX_UNITS as i32) as f64;
                    last_azimuth_diff = diff;
                    diff
                }
            } else {
                last_azimuth_diff
            };

            for sequence in 0..VLP16_FIRINGS_PER_BLOCK {
                for dsr in 0..VLP16_SCANS_PER_FIRING {
                    let slot = sequence * VLP16_SCANS_PER_FIRING + dsr;
                    let elapsed = dsr as f64 * timing.single_firing_us
                        + sequence as f64 * timing.full_firing_us;
                    let azimuth_corrected =
                        wrap_azimuth(azimuth + azimuth_diff * elapsed / block_duration);

                    if !self.add_firing(block, i, slot, dsr, azimuth_corrected, base_ns, cloud) {
                        return;
                    }
                }
            }
        }
    }

    fn unpack_banked(&self, packet: &RawPacket, base_ns: i64, cloud: &mut PointBuffer) {
        for (i, block) in packet.blocks().iter().enumerate() {
            let bank_origin = match block.block_id() {
                UPPER_BANK => 0,
                LOWER_BANK => SCANS_PER_BLOCK,
                id => {
                    trace!("skipping block {} with id {:#06x}", i, id);
                    continue;
                }
            };
            let azimuth = block.rotation() % ROTATION_MAX_UNITS;

            for slot in 0..SCANS_PER_BLOCK {
                if !self.add_firing(block, i, slot, bank_origin + slot, azimuth, base_ns, cloud) {
                    return;
                }
            }
        }
    }

    fn unpack_vls128(&self, packet: &RawPacket, base_ns: i64, cloud: &mut PointBuffer) {
        let Some(azimuth_cache) = self.calibration.vls128_azimuth_cache() else {
            return;
        };
        let blocks = packet.blocks();
        let mut last_azimuth_diff = 0.0;

        for (i, block) in blocks.iter().enumerate() {
            let bank_origin = match block.block_id() {
                UPPER_BANK => 0,
                LOWER_BANK => SCANS_PER_BLOCK,
                BANK_3 => 2 * SCANS_PER_BLOCK,
                BANK_4 => 3 * SCANS_PER_BLOCK,
                id => {
                    trace!("skipping VLS-128 block {} with id {:#06x}", i, id);
                    continue;
                }
            };

            // Azimuth advance until the next firing sequence
            let azimuth = block.rotation() as i32;
            let next_sequence = (i / VLS128_BLOCKS_PER_SEQUENCE + 1) * VLS128_BLOCKS_PER_SEQUENCE;
            let azimuth_diff = if next_sequence < BLOCKS_PER_PACKET {
                let next = blocks[next_sequence].rotation() as i32;
                let diff = (next - azimuth).rem_euclid(ROTATION_MAX_UNITS as i32) as f64;
                last_azimuth_diff = diff;
                diff
            } else {
                last_azimuth_diff
            };

            for slot in 0..SCANS_PER_BLOCK {
                let channel = bank_origin + slot;
                let firing_group = channel / 8;
                let azimuth_corrected =
                    wrap_azimuth(azimuth as f64 + azimuth_diff * azimuth_cache[firing_group]);

                if !self.add_firing(block, i, slot, channel, azimuth_corrected, base_ns, cloud) {
                    return;
                }
            }
        }
    }

    /// Compute and append one firing. Returns `false` once the cloud is full.
    #[allow(clippy::too_many_arguments)]
    #[inline]
    fn add_firing(
        &self,
        block: &RawBlock,
        block_index: usize,
        slot: usize,
        channel: usize,
        azimuth: u16,
        base_ns: i64,
        cloud: &mut PointBuffer,
    ) -> bool {
        if cloud.remaining() == 0 {
            return false;
        }

        let raw_distance = block.distance(slot);
        if raw_distance == 0 {
            return true;
        }

        let Some(corrections) = self.calibration.laser(channel) else {
            return true;
        };

        let offset_ns = (self.calibration.timing_offset(block_index, slot) * 1e9).round() as i64;
        let delta_ns = (base_ns + offset_ns).clamp(0, u32::MAX as i64) as u32;

        let mut point = self.compute_point(corrections, raw_distance, block.intensity(slot), azimuth);
        point.ring = channel as u16;
        point.delta_ns = delta_ns;

        cloud.add_point(&point);
        true
    }

    /// Corrected position, distance and intensity of one return.
    fn compute_point(
        &self,
        corrections: &LaserCorrection,
        raw_distance: u16,
        raw_intensity: u8,
        azimuth: u16,
    ) -> Point {
        let calibration = self.calibration;
        let distance = raw_distance as f64 * calibration.distance_resolution()
            + corrections.dist_correction;

        let cos_vert = corrections.cos_vert_correction;
        let sin_vert = corrections.sin_vert_correction;
        let vert_offset = corrections.vert_offset_correction;
        let horiz_offset = corrections.horiz_offset_correction;

        // cos(a - b) = cos(a)cos(b) + sin(a)sin(b)
        // sin(a - b) = sin(a)cos(b) - cos(a)sin(b)
        let cos_table = calibration.cos_rot(azimuth);
        let sin_table = calibration.sin_rot(azimuth);
        let cos_rot = cos_table * corrections.cos_rot_correction
            + sin_table * corrections.sin_rot_correction;
        let sin_rot = sin_table * corrections.cos_rot_correction
            - cos_table * corrections.sin_rot_correction;

        let (distance_corr_x, distance_corr_y) = match corrections.two_pt_correction {
            Some(two_pt) => {
                let xy_distance = distance * cos_vert - vert_offset * sin_vert;
                let xx = (xy_distance * sin_rot - horiz_offset * cos_rot).abs();
                let yy = (xy_distance * cos_rot + horiz_offset * sin_rot).abs();

                let dist_correction = corrections.dist_correction;
                let corr_x = (dist_correction - two_pt.dist_correction_x) * (xx - TWO_PT_NEAR_X)
                    / (TWO_PT_FAR - TWO_PT_NEAR_X)
                    + two_pt.dist_correction_x
                    - dist_correction;
                let corr_y = (dist_correction - two_pt.dist_correction_y) * (yy - TWO_PT_NEAR_Y)
                    / (TWO_PT_FAR - TWO_PT_NEAR_Y)
                    + two_pt.dist_correction_y
                    - dist_correction;
                (corr_x, corr_y)
            }
            None => (0.0, 0.0),
        };

        let distance_x = distance + distance_corr_x;
        let xy_distance = distance_x * cos_vert - vert_offset * sin_vert;
        let x = xy_distance * sin_rot - horiz_offset * cos_rot;

        let distance_y = distance + distance_corr_y;
        let xy_distance = distance_y * cos_vert - vert_offset * sin_vert;
        let y = xy_distance * cos_rot + horiz_offset * sin_rot;

        let z = distance_y * sin_vert + vert_offset * cos_vert;

        Point {
            // Sensor x-right/y-forward to ROS x-forward/y-left
            x: y as f32,
            y: -x as f32,
            z: z as f32,
            distance: distance as f32,
            intensity: correct_intensity(corrections, raw_intensity, raw_distance) as f32,
            ring: 0,
            azimuth,
            delta_ns: 0,
        }
    }
}

/// Round a fractional azimuth to the nearest unit in [0, 36000).
#[inline]
fn wrap_azimuth(azimuth: f64) -> u16 {
    (azimuth.round() as i64).rem_euclid(ROTATION_MAX_UNITS as i64) as u16
}

/// Focal-slope intensity correction clamped to the laser's bounds.
fn correct_intensity(corrections: &LaserCorrection, raw_intensity: u8, raw_distance: u16) -> f64 {
    let mut intensity = raw_intensity as f64;
    if corrections.focal_slope != 0.0 {
        let focal_offset = 256.0 * (1.0 - corrections.focal_distance / FOCAL_SCALE).powi(2);
        let distance_term = 256.0 * (1.0 - raw_distance as f64 / u16::MAX as f64).powi(2);
        intensity += corrections.focal_slope * (focal_offset - distance_term).abs();
    }
    intensity
        .max(corrections.min_intensity)
        .min(corrections.max_intensity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        calibration::{CalibrationConfig, LaserConfig},
        packet::{BLOCK_HEADER_SIZE, BLOCK_SIZE, PACKET_SIZE, RAW_SCAN_SIZE},
    };
    use chrono::TimeZone as _;

    const EPS: f32 = 1e-4;

    fn stamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
    }

    fn flat_calibration(model: Model) -> Calibration {
        Calibration::new(&CalibrationConfig {
            model,
            distance_resolution: None,
            lasers: (0..model.channels())
                .map(|id| LaserConfig::with_vertical(id, 0.0))
                .collect(),
        })
    }

    struct PacketBuilder {
        data: Vec<u8>,
    }

    impl PacketBuilder {
        fn new(block_ids: impl Fn(usize) -> u16, rotation: impl Fn(usize) -> u16) -> Self {
            let mut data = vec![0u8; PACKET_SIZE];
            for i in 0..BLOCKS_PER_PACKET {
                let start = i * BLOCK_SIZE;
                data[start..start + 2].copy_from_slice(&block_ids(i).to_le_bytes());
                data[start + 2..start + 4].copy_from_slice(&rotation(i).to_le_bytes());
            }
            Self { data }
        }

        fn uniform(block_id: u16, rotation: u16) -> Self {
            Self::new(|_| block_id, |_| rotation)
        }

        fn set(&mut self, block: usize, slot: usize, distance: u16, intensity: u8) -> &mut Self {
            let k = block * BLOCK_SIZE + BLOCK_HEADER_SIZE + slot * RAW_SCAN_SIZE;
            self.data[k..k + 2].copy_from_slice(&distance.to_le_bytes());
            self.data[k + 2] = intensity;
            self
        }

        fn fill(&mut self, distance: u16) -> &mut Self {
            for block in 0..BLOCKS_PER_PACKET {
                for slot in 0..SCANS_PER_BLOCK {
                    self.set(block, slot, distance, 100);
                }
            }
            self
        }
    }

    #[test]
    fn test_zero_distance_skipped() {
        let cal = flat_calibration(Model::Hdl32e);
        let builder = PacketBuilder::uniform(UPPER_BANK, 0);
        let packet = RawPacket::new(&builder.data).unwrap();

        let mut cloud = PointBuffer::new(stamp(), 384);
        let n = Transformer::new(&cal).unpack(&packet, stamp(), None, &mut cloud);
        assert_eq!(n, 0);
        assert!(cloud.is_empty());
    }

    #[test]
    fn test_hdl32e_single_point() {
        let cal = flat_calibration(Model::Hdl32e);
        let mut builder = PacketBuilder::uniform(UPPER_BANK, 9000);
        // 5 m at 0.002 m resolution
        builder.set(0, 3, 2500, 42);
        let packet = RawPacket::new(&builder.data).unwrap();

        let mut cloud = PointBuffer::new(stamp(), 384);
        let n = Transformer::new(&cal).unpack(&packet, stamp(), None, &mut cloud);
        assert_eq!(n, 1);

        // Azimuth 90° points along sensor +x, which is ROS -y
        let point = cloud.point(0).unwrap();
        assert!(point.x.abs() < EPS);
        assert!((point.y + 5.0).abs() < EPS);
        assert!(point.z.abs() < EPS);
        assert!((point.distance - 5.0).abs() < EPS);
        assert_eq!(point.intensity, 42.0);
        assert_eq!(point.ring, 3);
        assert_eq!(point.azimuth, 9000);
        // Slot 3 fires with the second laser pair
        assert_eq!(point.delta_ns, 1152);
    }

    #[test]
    fn test_rotational_correction() {
        let mut laser = LaserConfig::with_vertical(0, 0.0);
        laser.rot_correction = 10f64.to_radians();
        let cal = Calibration::new(&CalibrationConfig {
            model: Model::Hdl32e,
            distance_resolution: None,
            lasers: vec![laser],
        });

        let mut builder = PacketBuilder::uniform(UPPER_BANK, 3000);
        builder.set(0, 0, 5000, 1);
        let packet = RawPacket::new(&builder.data).unwrap();

        let mut cloud = PointBuffer::new(stamp(), 384);
        Transformer::new(&cal).unpack(&packet, stamp(), None, &mut cloud);

        // Effective azimuth 30° - 10° = 20°
        let angle = 20f32.to_radians();
        let point = cloud.point(0).unwrap();
        assert!((point.x - 10.0 * angle.cos()).abs() < EPS);
        assert!((point.y + 10.0 * angle.sin()).abs() < EPS);
        // Reported azimuth is the uncorrected block azimuth
        assert_eq!(point.azimuth, 3000);
    }

    #[test]
    fn test_offsets_and_vertical() {
        let mut laser = LaserConfig::with_vertical(0, 30f64.to_radians());
        laser.vert_offset_correction = 0.1;
        laser.horiz_offset_correction = 0.05;
        laser.dist_correction = 0.5;
        let cal = Calibration::new(&CalibrationConfig {
            model: Model::Hdl32e,
            distance_resolution: None,
            lasers: vec![laser],
        });

        let mut builder = PacketBuilder::uniform(UPPER_BANK, 0);
        builder.set(0, 0, 4750, 1);
        let packet = RawPacket::new(&builder.data).unwrap();

        let mut cloud = PointBuffer::new(stamp(), 384);
        Transformer::new(&cal).unpack(&packet, stamp(), None, &mut cloud);

        let (sin_v, cos_v) = 30f32.to_radians().sin_cos();
        let distance = 9.5 + 0.5;
        let xy = distance * cos_v - 0.1 * sin_v;
        let point = cloud.point(0).unwrap();
        // Azimuth 0: sensor x = -horiz_offset, sensor y = xy
        assert!((point.x - xy).abs() < EPS);
        assert!((point.y - 0.05).abs() < EPS);
        assert!((point.z - (distance * sin_v + 0.1 * cos_v)).abs() < EPS);
        assert!((point.distance - distance).abs() < EPS);
    }

    #[test]
    fn test_two_point_correction() {
        let mut laser = LaserConfig::with_vertical(0, 0.0);
        laser.dist_correction = 1.0;
        laser.dist_correction_x = Some(0.8);
        laser.dist_correction_y = Some(0.9);
        let cal = Calibration::new(&CalibrationConfig {
            model: Model::Hdl32e,
            distance_resolution: None,
            lasers: vec![laser],
        });

        // Azimuth 0 lies along sensor +y, so only the y correction matters
        let mut builder = PacketBuilder::uniform(UPPER_BANK, 0);
        builder.set(0, 0, 5000, 1);
        let packet = RawPacket::new(&builder.data).unwrap();

        let mut cloud = PointBuffer::new(stamp(), 384);
        Transformer::new(&cal).unpack(&packet, stamp(), None, &mut cloud);

        let distance = 10.0 + 1.0;
        let corr_y = (1.0 - 0.9) * (distance - 1.93) / (25.04 - 1.93) + 0.9 - 1.0;
        let point = cloud.point(0).unwrap();
        assert!((point.x as f64 - (distance + corr_y)).abs() < 1e-4);
        assert!((point.distance as f64 - distance).abs() < 1e-4);
    }

    #[test]
    fn test_intensity_clamped() {
        let mut laser = LaserConfig::with_vertical(0, 0.0);
        laser.min_intensity = 20;
        laser.max_intensity = 200;
        let cal = Calibration::new(&CalibrationConfig {
            model: Model::Hdl32e,
            distance_resolution: None,
            lasers: vec![laser.clone(), LaserConfig { laser_id: 1, ..laser }],
        });

        let mut builder = PacketBuilder::uniform(UPPER_BANK, 0);
        builder.set(0, 0, 1000, 5).set(0, 1, 1000, 250);
        let packet = RawPacket::new(&builder.data).unwrap();

        let mut cloud = PointBuffer::new(stamp(), 384);
        Transformer::new(&cal).unpack(&packet, stamp(), None, &mut cloud);
        assert_eq!(cloud.point(0).unwrap().intensity, 20.0);
        assert_eq!(cloud.point(1).unwrap().intensity, 200.0);
    }

    #[test]
    fn test_missing_channel_skipped() {
        let cal = Calibration::new(&CalibrationConfig {
            model: Model::Hdl32e,
            distance_resolution: None,
            lasers: (0..8).map(|id| LaserConfig::with_vertical(id, 0.0)).collect(),
        });

        let mut builder = PacketBuilder::uniform(UPPER_BANK, 0);
        builder.fill(1000);
        let packet = RawPacket::new(&builder.data).unwrap();

        let mut cloud = PointBuffer::new(stamp(), 384);
        let n = Transformer::new(&cal).unpack(&packet, stamp(), None, &mut cloud);
        assert_eq!(n, 8 * BLOCKS_PER_PACKET);
        assert!(cloud.points().all(|p| p.ring < 8));
    }

    #[test]
    fn test_capacity_truncates() {
        let cal = flat_calibration(Model::Hdl32e);
        let mut builder = PacketBuilder::uniform(UPPER_BANK, 0);
        builder.fill(1000);
        let packet = RawPacket::new(&builder.data).unwrap();

        let mut cloud = PointBuffer::new(stamp(), 40);
        let n = Transformer::new(&cal).unpack(&packet, stamp(), None, &mut cloud);
        assert_eq!(n, 40);
        assert_eq!(cloud.len(), 40);
        // First block complete, then the first 8 lasers of the second
        assert_eq!(cloud.point(39).unwrap().ring, 7);

        // A full cloud accepts nothing more
        let n = Transformer::new(&cal).unpack(&packet, stamp(), None, &mut cloud);
        assert_eq!(n, 0);
    }

    #[test]
    fn test_hdl64_banks() {
        let cal = flat_calibration(Model::Hdl64e);
        let mut builder = PacketBuilder::new(
            |i| match i {
                0 => UPPER_BANK,
                1 => LOWER_BANK,
                _ => 0x1234,
            },
            |_| 0,
        );
        builder.set(0, 5, 1000, 1).set(1, 5, 1000, 1).set(2, 5, 1000, 1);
        let packet = RawPacket::new(&builder.data).unwrap();

        let mut cloud = PointBuffer::new(stamp(), 384);
        let n = Transformer::new(&cal).unpack(&packet, stamp(), None, &mut cloud);
        assert_eq!(n, 2);
        assert_eq!(cloud.point(0).unwrap().ring, 5);
        assert_eq!(cloud.point(1).unwrap().ring, 37);
        assert_eq!(cloud.point(1).unwrap().delta_ns, 0);
    }

    #[test]
    fn test_vlp16_azimuth_interpolation() {
        let cal = flat_calibration(Model::Vlp16);
        // 40 units per block
        let mut builder = PacketBuilder::new(|_| UPPER_BANK, |i| 1000 + 40 * i as u16);
        builder.set(0, 0, 1000, 1).set(0, 16, 1000, 1).set(0, 8, 1000, 1);
        builder.set(11, 16, 1000, 1);
        let packet = RawPacket::new(&builder.data).unwrap();

        let mut cloud = PointBuffer::new(stamp(), 384);
        Transformer::new(&cal).unpack(&packet, stamp(), None, &mut cloud);
        assert_eq!(cloud.len(), 4);

        let first = cloud.point(0).unwrap();
        assert_eq!(first.azimuth, 1000);
        assert_eq!(first.ring, 0);
        assert_eq!(first.delta_ns, 0);

        // dsr 8 of the first sequence: 40 × 18.432 / 110.592 = 6.67
        let mid = cloud.point(1).unwrap();
        assert_eq!(mid.azimuth, 1007);
        assert_eq!(mid.ring, 8);
        assert_eq!(mid.delta_ns, 18_432);

        // Second sequence starts half a block later
        let second = cloud.point(2).unwrap();
        assert_eq!(second.azimuth, 1020);
        assert_eq!(second.ring, 0);
        assert_eq!(second.delta_ns, 55_296);

        // Last block reuses the previous azimuth step
        let last = cloud.point(3).unwrap();
        assert_eq!(last.azimuth, 1440 + 20);
        assert_eq!(last.delta_ns, 23 * 55_296);
    }

    #[test]
    fn test_vlp16_azimuth_wraps() {
        let cal = flat_calibration(Model::Vlp16);
        // 35950, 35990, 30, 70, ...
        let mut builder =
            PacketBuilder::new(|_| UPPER_BANK, |i| ((35950 + 40 * i as u32) % 36000) as u16);
        builder.set(0, 16, 1000, 1).set(1, 16, 1000, 1);
        let packet = RawPacket::new(&builder.data).unwrap();

        let mut cloud = PointBuffer::new(stamp(), 384);
        Transformer::new(&cal).unpack(&packet, stamp(), None, &mut cloud);
        let azimuths: Vec<u16> = cloud.points().map(|p| p.azimuth).collect();
        assert_eq!(azimuths, vec![35970, 10]);
    }

    #[test]
    fn test_vlp16_invalid_block_skipped() {
        let cal = flat_calibration(Model::Vlp16);
        let mut builder = PacketBuilder::new(
            |i| if i == 1 { LOWER_BANK } else { UPPER_BANK },
            |i| 40 * i as u16,
        );
        builder.fill(1000);
        let packet = RawPacket::new(&builder.data).unwrap();

        let mut cloud = PointBuffer::new(stamp(), 384);
        let n = Transformer::new(&cal).unpack(&packet, stamp(), None, &mut cloud);
        assert_eq!(n, 11 * SCANS_PER_BLOCK);
    }

    #[test]
    fn test_vls128_firing_groups() {
        let cal = flat_calibration(Model::Vls128);
        let banks = [UPPER_BANK, LOWER_BANK, BANK_3, BANK_4];
        // Three sequences 20 units apart
        let mut builder = PacketBuilder::new(|i| banks[i % 4], |i| 100 + 20 * (i / 4) as u16);
        builder
            .set(0, 0, 1000, 1)
            .set(1, 31, 1000, 1)
            .set(2, 0, 1000, 1)
            .set(3, 31, 1000, 1)
            .set(9, 8, 1000, 1);
        let packet = RawPacket::new(&builder.data).unwrap();

        let mut cloud = PointBuffer::new(stamp(), 384);
        Transformer::new(&cal).unpack(&packet, stamp(), None, &mut cloud);
        assert_eq!(cloud.len(), 5);

        let first = cloud.point(0).unwrap();
        assert_eq!(first.ring, 0);
        assert_eq!(first.azimuth, 100);
        // Negative offset before the cloud stamp clamps to zero
        assert_eq!(first.delta_ns, 0);

        // Lasers 63 and 64 straddle the maintenance slot: two slots apart in
        // both azimuth (20 × 0.05 per slot) and time
        let before = cloud.point(1).unwrap();
        assert_eq!(before.ring, 63);
        assert_eq!(before.azimuth, 107);
        assert_eq!(before.delta_ns, 9_955);

        let after = cloud.point(2).unwrap();
        assert_eq!(after.ring, 64);
        assert_eq!(after.azimuth, 109);
        assert_eq!(after.delta_ns, 15_285);
        assert_eq!(after.delta_ns - before.delta_ns, 2 * 2_665);

        // Laser 127, group 15: 20 × 16 × 2.665 / 53.3 = 16
        let last_group = cloud.point(3).unwrap();
        assert_eq!(last_group.ring, 127);
        assert_eq!(last_group.azimuth, 116);
        assert_eq!(last_group.delta_ns, 33_940);

        // Laser 40 in the third sequence, group 5: 20 × 5 × 0.05 = 5
        let third = cloud.point(4).unwrap();
        assert_eq!(third.ring, 40);
        assert_eq!(third.azimuth, 145);
        assert_eq!(third.delta_ns, 111_225);
    }

    #[test]
    fn test_vlp32c_banks() {
        // Ids beyond the 32 channels are dropped from the calibration
        let cal = Calibration::new(&CalibrationConfig {
            model: Model::Vlp32c,
            distance_resolution: None,
            lasers: (0..64).map(|id| LaserConfig::with_vertical(id, 0.0)).collect(),
        });
        assert_eq!(cal.num_lasers(), 32);

        let mut builder = PacketBuilder::new(
            |i| if i % 2 == 0 { UPPER_BANK } else { LOWER_BANK },
            |i| 1000 + 20 * i as u16,
        );
        builder.fill(1000);
        let packet = RawPacket::new(&builder.data).unwrap();

        let mut cloud = PointBuffer::new(stamp(), 384);
        let n = Transformer::new(&cal).unpack(&packet, stamp(), None, &mut cloud);

        // Lower bank blocks map to channels 32-63 and yield nothing
        assert_eq!(n, 6 * SCANS_PER_BLOCK);
        assert!(cloud.points().all(|p| p.ring < 32));

        // Block 2, slot 5: second laser pair timing, block azimuth as is
        let point = cloud.point(SCANS_PER_BLOCK + 5).unwrap();
        assert_eq!(point.ring, 5);
        assert_eq!(point.azimuth, 1040);
        assert_eq!(point.delta_ns, 115_200);
    }

    #[test]
    fn test_time_offsets() {
        let cal = flat_calibration(Model::Hdl32e);
        let mut builder = PacketBuilder::uniform(UPPER_BANK, 0);
        builder.set(1, 0, 1000, 1);
        let packet = RawPacket::new(&builder.data).unwrap();

        let mut cloud = PointBuffer::new(stamp(), 384);
        let packet_stamp = stamp() + TimeDelta::microseconds(500);
        Transformer::new(&cal).unpack(
            &packet,
            packet_stamp,
            Some(TimeDelta::nanoseconds(250)),
            &mut cloud,
        );

        // 500 µs packet delay + 46.08 µs block offset + 250 ns fixed offset
        assert_eq!(cloud.point(0).unwrap().delta_ns, 500_000 + 46_080 + 250);
    }

    #[test]
    fn test_wrap_azimuth() {
        assert_eq!(wrap_azimuth(0.0), 0);
        assert_eq!(wrap_azimuth(35999.4), 35999);
        assert_eq!(wrap_azimuth(35999.6), 0);
        assert_eq!(wrap_azimuth(36010.0), 10);
    }

    #[test]
    fn test_focal_intensity() {
        let mut laser = LaserConfig::with_vertical(0, 0.0);
        laser.focal_distance = 13100.0;
        laser.focal_slope = 0.5;
        let correction = LaserCorrection::new(&laser);

        // focal offset 0, distance term 256 × (1 - 0)^2 at raw distance 0
        assert_eq!(correct_intensity(&correction, 10, 0), 138.0);
        assert_eq!(correct_intensity(&correction, 200, 0), 255.0);
        assert_eq!(correct_intensity(&correction, 10, u16::MAX), 10.0);
    }
}
