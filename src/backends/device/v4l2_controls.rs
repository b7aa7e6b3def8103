// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 sensor control interface
//!
//! Exposure and emitter options of UVC depth cameras, set through plain
//! `VIDIOC_S_CTRL` ioctls on a file descriptor separate from the capture stream.

use super::DeviceControls;
use crate::errors::{CameraError, CameraResult};
use std::fs::File;
use std::os::unix::io::AsRawFd;
use tracing::{debug, info, warn};

// ===== V4L2 Control Class Bases =====
const V4L2_CTRL_CLASS_CAMERA: u32 = 0x009a0000;
const V4L2_CID_CAMERA_CLASS_BASE: u32 = V4L2_CTRL_CLASS_CAMERA | 0x900;

// ===== V4L2 Control IDs (Camera Class) =====

/// Exposure mode: Auto, Manual, Shutter Priority, Aperture Priority
pub const V4L2_CID_EXPOSURE_AUTO: u32 = V4L2_CID_CAMERA_CLASS_BASE + 1;
/// Absolute exposure time in 100µs units
pub const V4L2_CID_EXPOSURE_ABSOLUTE: u32 = V4L2_CID_CAMERA_CLASS_BASE + 2;

// ===== V4L2 Exposure Auto Menu Values =====

/// Manual exposure time and iris
pub const V4L2_EXPOSURE_MANUAL: i32 = 1;
/// Auto exposure time, manual iris (the UVC "auto" mode)
pub const V4L2_EXPOSURE_APERTURE_PRIORITY: i32 = 3;

/// Iterate controls with QUERYCTRL
const V4L2_CTRL_FLAG_NEXT_CTRL: u32 = 0x8000_0000;
const V4L2_CTRL_FLAG_DISABLED: u32 = 0x0001;

// ===== V4L2 ioctl Numbers =====

/// Get control value (v4l2_control: 8 bytes)
const VIDIOC_G_CTRL: libc::c_ulong = 0xC008561B;
/// Set control value (v4l2_control: 8 bytes)
const VIDIOC_S_CTRL: libc::c_ulong = 0xC008561C;
/// Query control info (v4l2_queryctrl: 68 bytes)
const VIDIOC_QUERYCTRL: libc::c_ulong = 0xC0445624;

/// V4L2 control get/set structure
#[repr(C)]
struct V4l2Control {
    id: u32,
    value: i32,
}

/// V4L2 query control structure
#[repr(C)]
struct V4l2Queryctrl {
    id: u32,
    ctrl_type: u32,
    name: [u8; 32],
    minimum: i32,
    maximum: i32,
    step: i32,
    default_value: i32,
    flags: u32,
    reserved: [u32; 2],
}

/// Information about a V4L2 control
#[derive(Debug, Clone)]
pub struct ControlInfo {
    pub id: u32,
    pub name: String,
    pub minimum: i32,
    pub maximum: i32,
    pub flags: u32,
}

impl ControlInfo {
    pub fn is_disabled(&self) -> bool {
        self.flags & V4L2_CTRL_FLAG_DISABLED != 0
    }

    pub fn clamp(&self, value: i32) -> i32 {
        value.clamp(self.minimum, self.maximum)
    }
}

/// Extract a null-terminated string from a fixed-size byte array
fn extract_name(bytes: &[u8; 32]) -> String {
    let name_len = bytes.iter().position(|&c| c == 0).unwrap_or(32);
    String::from_utf8_lossy(&bytes[..name_len]).to_string()
}

fn query_raw(file: &File, id: u32) -> Option<V4l2Queryctrl> {
    let mut qctrl = V4l2Queryctrl {
        id,
        ctrl_type: 0,
        name: [0; 32],
        minimum: 0,
        maximum: 0,
        step: 0,
        default_value: 0,
        flags: 0,
        reserved: [0; 2],
    };

    let result = unsafe {
        libc::ioctl(
            file.as_raw_fd(),
            VIDIOC_QUERYCTRL,
            &mut qctrl as *mut V4l2Queryctrl,
        )
    };

    (result >= 0).then_some(qctrl)
}

fn to_info(qctrl: &V4l2Queryctrl) -> ControlInfo {
    ControlInfo {
        id: qctrl.id,
        name: extract_name(&qctrl.name),
        minimum: qctrl.minimum,
        maximum: qctrl.maximum,
        flags: qctrl.flags,
    }
}

/// Query if a control exists and get its information
pub fn query_control(device_path: &str, control_id: u32) -> Option<ControlInfo> {
    let file = File::open(device_path).ok()?;
    query_raw(&file, control_id).map(|q| to_info(&q))
}

/// Find the first control whose name contains one of `needles` (case-insensitive)
pub fn find_control_by_name(device_path: &str, needles: &[&str]) -> Option<ControlInfo> {
    let file = File::open(device_path).ok()?;
    let mut id = V4L2_CTRL_FLAG_NEXT_CTRL;

    while let Some(qctrl) = query_raw(&file, id) {
        let info = to_info(&qctrl);
        let lower = info.name.to_lowercase();
        if needles.iter().any(|n| lower.contains(n)) && !info.is_disabled() {
            return Some(info);
        }
        id = qctrl.id | V4L2_CTRL_FLAG_NEXT_CTRL;
    }

    None
}

/// Get current value of a control
pub fn get_control(device_path: &str, control_id: u32) -> Option<i32> {
    let file = File::open(device_path).ok()?;
    let mut ctrl = V4l2Control {
        id: control_id,
        value: 0,
    };

    let result =
        unsafe { libc::ioctl(file.as_raw_fd(), VIDIOC_G_CTRL, &mut ctrl as *mut V4l2Control) };

    if result < 0 {
        debug!(device_path, control_id, "Failed to get V4L2 control");
        return None;
    }

    Some(ctrl.value)
}

/// Set value of a control
pub fn set_control(device_path: &str, control_id: u32, value: i32) -> Result<(), String> {
    let file = File::open(device_path).map_err(|e| format!("Failed to open device: {}", e))?;
    let mut ctrl = V4l2Control {
        id: control_id,
        value,
    };

    let result =
        unsafe { libc::ioctl(file.as_raw_fd(), VIDIOC_S_CTRL, &mut ctrl as *mut V4l2Control) };

    if result < 0 {
        let errno = std::io::Error::last_os_error();
        warn!(
            device_path,
            control_id,
            value,
            ?errno,
            "Failed to set V4L2 control"
        );
        return Err(format!("Failed to set control: {}", errno));
    }

    if ctrl.value != value {
        debug!(
            device_path,
            control_id,
            requested = value,
            actual = ctrl.value,
            "V4L2 control value was clamped"
        );
    }

    Ok(())
}

/// Convert microseconds to the 100µs units of `V4L2_CID_EXPOSURE_ABSOLUTE`
pub fn exposure_units(micros: i64) -> i32 {
    ((micros + 50) / 100).clamp(1, i32::MAX as i64) as i32
}

/// Sensor controls of the node carrying the depth stream
pub struct V4l2DepthControls {
    /// Node exposing the depth/IR sensor controls
    device_path: String,
}

impl V4l2DepthControls {
    pub fn new(device_path: impl Into<String>) -> Self {
        Self {
            device_path: device_path.into(),
        }
    }

    fn set(&self, control_id: u32, value: i32) -> CameraResult<()> {
        set_control(&self.device_path, control_id, value).map_err(CameraError::BackendError)
    }
}

impl DeviceControls for V4l2DepthControls {
    fn set_auto_exposure(&self, enabled: bool) -> CameraResult<()> {
        let mode = if enabled {
            V4L2_EXPOSURE_APERTURE_PRIORITY
        } else {
            V4L2_EXPOSURE_MANUAL
        };
        info!(device = %self.device_path, enabled, "Setting auto exposure");
        self.set(V4L2_CID_EXPOSURE_AUTO, mode)
    }

    fn set_emitter_enabled(&self, enabled: bool) -> CameraResult<()> {
        let control = find_control_by_name(&self.device_path, &["emitter", "laser"])
            .ok_or_else(|| {
                CameraError::BackendError(format!(
                    "{} has no emitter control",
                    self.device_path
                ))
            })?;
        let value = if enabled {
            control.maximum.min(1)
        } else {
            control.minimum
        };
        info!(device = %self.device_path, control = %control.name, enabled, "Setting emitter");
        self.set(control.id, value)
    }

    fn set_ir_exposure(&self, micros: i64) -> CameraResult<()> {
        let mut units = exposure_units(micros);
        if let Some(info) = query_control(&self.device_path, V4L2_CID_EXPOSURE_ABSOLUTE) {
            units = info.clamp(units);
        }
        info!(device = %self.device_path, micros, units, "Setting IR exposure");
        self.set(V4L2_CID_EXPOSURE_ABSOLUTE, units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_id_values() {
        assert_eq!(V4L2_CID_EXPOSURE_AUTO, 0x009a0901);
        assert_eq!(V4L2_CID_EXPOSURE_ABSOLUTE, 0x009a0902);
    }

    #[test]
    fn test_exposure_units() {
        assert_eq!(exposure_units(8_500), 85);
        assert_eq!(exposure_units(1), 1);
        assert_eq!(exposure_units(165_000), 1650);
    }

    #[test]
    fn test_extract_name() {
        let mut raw = [0u8; 32];
        raw[..5].copy_from_slice(b"Laser");
        assert_eq!(extract_name(&raw), "Laser");
    }
}
