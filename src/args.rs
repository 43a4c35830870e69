// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use edgefirst_velodyne::{lidar::Model, pcap_source::VELODYNE_DATA_PORT};
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// PCAP or PCAPNG capture of Velodyne data packets
    #[arg(env)]
    pub target: PathBuf,

    /// UDP port of the data packets in the capture
    #[arg(long, env, default_value_t = VELODYNE_DATA_PORT)]
    pub port: u16,

    /// Sensor model.  When omitted it is inferred from the factory id of the
    /// first data packet.
    #[arg(long, env, value_enum)]
    pub model: Option<Model>,

    /// JSON calibration file.  Without one the factory nominal vertical
    /// angles are used, which only exist for the VLP-16 and HDL-32E.
    #[arg(long, env)]
    pub calibration: Option<PathBuf>,

    /// Number of packets grouped into one point cloud
    #[arg(long, env, default_value = "1")]
    pub packets_per_cloud: usize,

    /// Point capacity of each cloud, defaults to 384 per packet
    #[arg(long, env)]
    pub max_points: Option<usize>,

    /// Fixed offset added to every point time, in nanoseconds
    #[arg(long, env, default_value = "0", allow_hyphen_values = true)]
    pub time_offset_ns: i64,

    /// The name of the lidar frame
    #[arg(long, env, default_value = "velodyne")]
    pub frame_id: String,

    /// Default log level.  Per-target directives are read from RUST_LOG.
    #[arg(long, default_value = "info")]
    pub rust_log: LevelFilter,
}
