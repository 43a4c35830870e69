// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;

use args::Args;
use chrono::{TimeDelta, Utc};
use clap::Parser as _;
use edgefirst_velodyne::{
    buffer::PointBuffer,
    calibration::{Calibration, CalibrationConfig},
    lidar::{Error, Model},
    packet::{MAX_POINTS_PER_PACKET, RawPacket, top_of_hour},
    pcap_source::PcapSource,
    transform::Transformer,
};
use tracing::{debug, info, trace, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // --rust-log sets the default level, RUST_LOG directives refine it per target
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(args.rust_log.into())
                .from_env_lossy(),
        )
        .init();

    let mut source = PcapSource::from_file(&args.target, Some(args.port))?;
    info!(
        "loaded {} packets on port {} from {}",
        source.len(),
        args.port,
        args.target.display()
    );

    let model = resolve_model(&args, &source)?;
    let config = match &args.calibration {
        Some(path) => CalibrationConfig::from_json_file(path)?,
        None => CalibrationConfig::nominal(model)?,
    };
    if config.model != model {
        warn!(
            "calibration describes a {} but the sensor is a {}",
            config.model, model
        );
    }
    let calibration = Calibration::new(&config);
    let transformer = Transformer::new(&calibration);
    info!("decoding {} packets", calibration.model());

    let packets_per_cloud = args.packets_per_cloud.max(1);
    let max_points = args
        .max_points
        .unwrap_or(packets_per_cloud * MAX_POINTS_PER_PACKET);
    let time_offset = Some(TimeDelta::nanoseconds(args.time_offset_ns));

    let mut cloud: Option<PointBuffer> = None;
    let mut cloud_packets = 0;
    let mut stats = Stats::default();

    while let Some(captured) = source.next_packet() {
        let packet = match RawPacket::new(&captured.payload) {
            Ok(packet) => packet,
            Err(e) => {
                trace!("skipping payload: {}", e);
                stats.skipped += 1;
                continue;
            }
        };
        stats.packets += 1;

        // Resolve the GPS time against the hour the packet was captured in
        let reference = captured.timestamp.unwrap_or_else(Utc::now);
        let packet_stamp = packet.stamp(top_of_hour(reference));

        let buffer = cloud.get_or_insert_with(|| PointBuffer::new(packet_stamp, max_points));
        transformer.unpack(&packet, packet_stamp, time_offset, buffer);
        cloud_packets += 1;

        if cloud_packets == packets_per_cloud {
            if let Some(full) = cloud.take() {
                stats.finish(full, &args.frame_id);
            }
            cloud_packets = 0;
        }
    }

    if let Some(partial) = cloud.take() {
        stats.finish(partial, &args.frame_id);
    }

    info!(
        "decoded {} packets into {} clouds with {} points, skipped {} payloads",
        stats.packets, stats.clouds, stats.points, stats.skipped
    );

    Ok(())
}

fn resolve_model(args: &Args, source: &PcapSource) -> Result<Model, Error> {
    if let Some(model) = args.model {
        return Ok(model);
    }

    let first = source
        .packets()
        .iter()
        .find_map(|captured| RawPacket::new(&captured.payload).ok())
        .ok_or_else(|| Error::InvalidPacket(String::from("capture has no data packets")))?;

    first.infer_model().ok_or_else(|| {
        Error::UnsupportedModel(format!(
            "cannot infer model from factory id {:#04x}, use --model",
            first.factory_id_raw()
        ))
    })
}

#[derive(Default)]
struct Stats {
    packets: usize,
    skipped: usize,
    clouds: usize,
    points: usize,
}

impl Stats {
    fn finish(&mut self, cloud: PointBuffer, frame_id: &str) {
        let stamp = cloud.stamp();
        let msg = cloud.into_point_cloud2(frame_id.to_owned());
        debug!(
            "cloud {} at {}: {} points, {} bytes",
            self.clouds,
            stamp,
            msg.width,
            msg.data.len()
        );
        self.clouds += 1;
        self.points += msg.width as usize;
    }
}
