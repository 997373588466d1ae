//! Host telemetry capability
//!
//! `MetricsSource` is the only way the reporting loop learns about the host.
//! `SysinfoSource` reads the local machine; tests substitute scripted sources.

use crate::error::SensorError;
use async_trait::async_trait;
use log::debug;
use std::path::PathBuf;
use sysinfo::{Components, Disks, Networks, System, MINIMUM_CPU_UPDATE_INTERVAL};
use triad_common::HostSample;

/// Sensor labels that identify a CPU die or package temperature
const CPU_SENSOR_HINTS: [&str; 6] = ["cpu", "package", "core", "tctl", "tdie", "k10temp"];

#[async_trait]
pub trait MetricsSource: Send {
    /// Read CPU load, memory, disk, network and uptime
    async fn sample(&mut self) -> Result<HostSample, SensorError>;

    /// Hottest CPU sensor, in Celsius
    async fn cpu_temperature(&mut self) -> Result<f64, SensorError>;
}

/// Reads the local machine through `sysinfo`
pub struct SysinfoSource {
    system: System,
    disks: Disks,
    networks: Networks,
    components: Components,
    mount_point: PathBuf,
}

impl SysinfoSource {
    pub fn new() -> Self {
        Self::with_mount_point(PathBuf::from("/"))
    }

    /// Report storage for the disk mounted at `mount_point`
    pub fn with_mount_point(mount_point: PathBuf) -> Self {
        let mut system = System::new();
        system.refresh_cpu();

        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
            components: Components::new_with_refreshed_list(),
            mount_point,
        }
    }

    fn disk_usage(&self) -> (u64, u64) {
        let on_mount = self
            .disks
            .list()
            .iter()
            .find(|d| d.mount_point() == self.mount_point.as_path());

        match on_mount {
            Some(disk) => (
                disk.total_space().saturating_sub(disk.available_space()),
                disk.available_space(),
            ),
            None => {
                debug!(
                    "No disk mounted at {}, summing all disks",
                    self.mount_point.display()
                );
                self.disks.list().iter().fold((0, 0), |(used, free), d| {
                    (
                        used + d.total_space().saturating_sub(d.available_space()),
                        free + d.available_space(),
                    )
                })
            }
        }
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsSource for SysinfoSource {
    async fn sample(&mut self) -> Result<HostSample, SensorError> {
        // CPU usage is a delta between two refreshes
        self.system.refresh_cpu();
        tokio::time::sleep(MINIMUM_CPU_UPDATE_INTERVAL).await;
        self.system.refresh_cpu();
        self.system.refresh_memory();
        self.disks.refresh();
        self.networks.refresh();

        if self.system.cpus().is_empty() {
            return Err(SensorError("no CPUs reported".to_string()));
        }

        let (disk_used_bytes, disk_free_bytes) = self.disk_usage();
        let bytes_sent = self
            .networks
            .iter()
            .map(|(_, data)| data.total_transmitted())
            .sum();

        Ok(HostSample {
            cpu_percent: self.system.global_cpu_info().cpu_usage() as f64,
            memory_used_bytes: self.system.used_memory(),
            disk_used_bytes,
            disk_free_bytes,
            bytes_sent,
            uptime_secs: System::uptime(),
        })
    }

    async fn cpu_temperature(&mut self) -> Result<f64, SensorError> {
        self.components.refresh();
        hottest_cpu_sensor(
            self.components
                .iter()
                .map(|c| (c.label(), c.temperature() as f64)),
        )
        .ok_or_else(|| SensorError("no CPU temperature sensor available".to_string()))
    }
}

fn hottest_cpu_sensor<'a>(readings: impl Iterator<Item = (&'a str, f64)>) -> Option<f64> {
    readings
        .filter(|(label, temp)| {
            let label = label.to_lowercase();
            temp.is_finite() && CPU_SENSOR_HINTS.iter().any(|hint| label.contains(hint))
        })
        .map(|(_, temp)| temp)
        .fold(None, |hottest: Option<f64>, temp| {
            Some(hottest.map_or(temp, |h| h.max(temp)))
        })
}
