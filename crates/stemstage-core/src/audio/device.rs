//! Output device enumeration and lookup
//!
//! Devices are listed from every available cpal host, so on Linux both the
//! JACK server and the individual ALSA devices show up.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};

use super::config::DeviceId;
use super::error::{AudioError, AudioResult};

/// Display name for a host ID
fn host_name(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

fn host_by_name(name: &str) -> Option<Host> {
    cpal::available_hosts()
        .into_iter()
        .find(|id| host_name(*id).eq_ignore_ascii_case(name))
        .and_then(|id| cpal::host_from_id(id).ok())
}

/// An output device and what it supports
#[derive(Debug, Clone)]
pub struct AudioDevice {
    pub id: DeviceId,
    /// Whether this is the default device of its host
    pub is_default: bool,
    /// Common sample rates within the supported ranges
    pub sample_rates: Vec<u32>,
    pub max_channels: u16,
}

impl std::fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id.display_label())?;
        if self.is_default {
            write!(f, " (default)")?;
        }
        write!(f, " - {} ch, {:?} Hz", self.max_channels, self.sample_rates)
    }
}

/// List output devices from all hosts, defaults first
pub fn get_output_devices() -> AudioResult<Vec<AudioDevice>> {
    let mut devices: Vec<AudioDevice> = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };
        let host_label = host_name(host_id);
        let default_name = host.default_output_device().and_then(|d| d.name().ok());

        let outputs = match host.output_devices() {
            Ok(d) => d,
            Err(e) => {
                log::debug!("Could not enumerate devices for {:?}: {}", host_id, e);
                continue;
            }
        };

        for device in outputs {
            let Ok(name) = device.name() else { continue };
            let Ok(configs) = device.supported_output_configs() else {
                continue;
            };
            let configs: Vec<_> = configs.collect();
            if configs.is_empty() {
                continue;
            }

            let max_channels = configs.iter().map(|c| c.channels()).max().unwrap_or(0);
            let mut sample_rates: Vec<u32> = [44100, 48000, 88200, 96000]
                .into_iter()
                .filter(|rate| {
                    configs
                        .iter()
                        .any(|c| *rate >= c.min_sample_rate().0 && *rate <= c.max_sample_rate().0)
                })
                .collect();
            sample_rates.dedup();

            devices.push(AudioDevice {
                is_default: default_name.as_ref() == Some(&name),
                id: DeviceId::with_host(&name, &host_label),
                sample_rates,
                max_channels,
            });
        }
    }

    if devices.is_empty() {
        return Err(AudioError::NoDevices);
    }

    devices.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.id.host.cmp(&b.id.host))
            .then_with(|| a.id.name.cmp(&b.id.name))
    });
    log::info!("Enumerated {} audio output devices", devices.len());
    Ok(devices)
}

/// Find a device by its ID
///
/// Searches only the named host when the ID carries one, every host
/// otherwise.
pub fn find_device_by_id(id: &DeviceId) -> AudioResult<cpal::Device> {
    let hosts: Vec<Host> = match id.host.as_deref().and_then(host_by_name) {
        Some(host) => vec![host],
        None => cpal::available_hosts()
            .into_iter()
            .filter_map(|h| cpal::host_from_id(h).ok())
            .collect(),
    };

    hosts
        .iter()
        .filter_map(|host| host.output_devices().ok())
        .flatten()
        .find(|d| d.name().ok().as_deref() == Some(id.name.as_str()))
        .ok_or_else(|| AudioError::DeviceNotFound(id.display_label()))
}

/// Default output device of the default host
pub fn get_default_device() -> AudioResult<cpal::Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| AudioError::NoDefaultDevice("No default output device".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_enumeration() {
        // Machines without audio hardware (CI) report NoDevices
        match get_output_devices() {
            Ok(devices) => {
                for device in &devices {
                    println!("  - {}", device);
                }
                assert!(!devices.is_empty());
            }
            Err(AudioError::NoDevices) => println!("No audio devices available"),
            Err(e) => println!("Error enumerating devices: {}", e),
        }
    }

    #[test]
    fn test_missing_device_is_an_error() {
        let id = DeviceId::with_host("no such device 1234", "NoSuchHost");
        assert!(find_device_by_id(&id).is_err());
    }
}
