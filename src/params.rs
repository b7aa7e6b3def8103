// SPDX-License-Identifier: GPL-3.0-only

//! Inbound parameter-change events
//!
//! A GUI panel (or the CLI) reports named boolean, integer or float changes.
//! They are parsed into a [`SensorParameter`] before being applied.

use crate::constants::depth::{MAX_DISTANCE_M, MIN_DISTANCE_M};
use crate::constants::sensor::{IR_EXPOSURE_MAX_US, IR_EXPOSURE_MIN_US};
use crate::errors::CameraError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Untyped value carried by a parameter event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    Float(f32),
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Bool(v) => write!(f, "{}", v),
            ParameterValue::Int(v) => write!(f, "{}", v),
            ParameterValue::Float(v) => write!(f, "{}", v),
        }
    }
}

/// A named parameter change as reported by the GUI collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterChange {
    pub name: String,
    pub value: ParameterValue,
}

impl ParameterChange {
    pub fn new(name: impl Into<String>, value: ParameterValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Parses `name=value`; the value type is inferred (bool, then integer, then float)
impl FromStr for ParameterChange {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, raw) = s
            .split_once('=')
            .ok_or_else(|| CameraError::InvalidParameter(format!("expected name=value: {}", s)))?;
        let raw = raw.trim();
        let value = if let Ok(v) = raw.parse::<bool>() {
            ParameterValue::Bool(v)
        } else if let Ok(v) = raw.parse::<i64>() {
            ParameterValue::Int(v)
        } else if let Ok(v) = raw.parse::<f32>() {
            ParameterValue::Float(v)
        } else {
            return Err(CameraError::InvalidParameter(format!(
                "unparsable value for {}: {}",
                name, raw
            )));
        };
        Ok(Self::new(name.trim(), value))
    }
}

/// Validated, clamped sensor or colorizer parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorParameter {
    AutoExposure(bool),
    EnableEmitter(bool),
    /// Microseconds
    IrExposure(i64),
    /// Meters
    DepthMin(f32),
    /// Meters
    DepthMax(f32),
}

impl SensorParameter {
    /// Applied to the device controls rather than the colorizer
    pub fn is_device_bound(&self) -> bool {
        matches!(
            self,
            SensorParameter::AutoExposure(_)
                | SensorParameter::EnableEmitter(_)
                | SensorParameter::IrExposure(_)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            SensorParameter::AutoExposure(_) => "auto_exposure",
            SensorParameter::EnableEmitter(_) => "enable_emitter",
            SensorParameter::IrExposure(_) => "ir_exposure",
            SensorParameter::DepthMin(_) => "depth_min",
            SensorParameter::DepthMax(_) => "depth_max",
        }
    }
}

fn mistyped(change: &ParameterChange, expected: &str) -> CameraError {
    CameraError::InvalidParameter(format!(
        "{} expects {}, got {}",
        change.name, expected, change.value
    ))
}

impl TryFrom<&ParameterChange> for SensorParameter {
    type Error = CameraError;

    fn try_from(change: &ParameterChange) -> Result<Self, Self::Error> {
        use ParameterValue::*;
        let distance = |v: f32| {
            if v.is_finite() {
                Ok(v.clamp(MIN_DISTANCE_M, MAX_DISTANCE_M))
            } else {
                Err(mistyped(change, "a finite float"))
            }
        };
        match (change.name.as_str(), change.value) {
            ("auto_exposure", Bool(v)) => Ok(SensorParameter::AutoExposure(v)),
            ("enable_emitter", Bool(v)) => Ok(SensorParameter::EnableEmitter(v)),
            ("ir_exposure", Int(v)) => Ok(SensorParameter::IrExposure(
                v.clamp(IR_EXPOSURE_MIN_US, IR_EXPOSURE_MAX_US),
            )),
            ("depth_min", Float(v)) => distance(v).map(SensorParameter::DepthMin),
            ("depth_max", Float(v)) => distance(v).map(SensorParameter::DepthMax),
            ("auto_exposure" | "enable_emitter", _) => Err(mistyped(change, "a bool")),
            ("ir_exposure", _) => Err(mistyped(change, "an integer")),
            ("depth_min" | "depth_max", _) => Err(mistyped(change, "a float")),
            (name, _) => Err(CameraError::InvalidParameter(format!(
                "unknown parameter: {}",
                name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(name: &str, value: ParameterValue) -> Result<SensorParameter, CameraError> {
        SensorParameter::try_from(&ParameterChange::new(name, value))
    }

    #[test]
    fn test_typed_parameters() {
        assert_eq!(
            parse("auto_exposure", ParameterValue::Bool(false)),
            Ok(SensorParameter::AutoExposure(false))
        );
        assert_eq!(
            parse("depth_max", ParameterValue::Float(2.5)),
            Ok(SensorParameter::DepthMax(2.5))
        );
    }

    #[test]
    fn test_values_are_clamped() {
        assert_eq!(
            parse("ir_exposure", ParameterValue::Int(1_000_000)),
            Ok(SensorParameter::IrExposure(IR_EXPOSURE_MAX_US))
        );
        assert_eq!(
            parse("ir_exposure", ParameterValue::Int(0)),
            Ok(SensorParameter::IrExposure(IR_EXPOSURE_MIN_US))
        );
        assert_eq!(
            parse("depth_min", ParameterValue::Float(-3.0)),
            Ok(SensorParameter::DepthMin(MIN_DISTANCE_M))
        );
    }

    #[test]
    fn test_rejects_unknown_and_mistyped() {
        assert!(matches!(
            parse("gain", ParameterValue::Int(3)),
            Err(CameraError::InvalidParameter(_))
        ));
        assert!(matches!(
            parse("enable_emitter", ParameterValue::Int(1)),
            Err(CameraError::InvalidParameter(_))
        ));
        assert!(matches!(
            parse("depth_min", ParameterValue::Float(f32::NAN)),
            Err(CameraError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_from_str() {
        let change: ParameterChange = "enable_emitter=false".parse().unwrap();
        assert_eq!(change.value, ParameterValue::Bool(false));
        let change: ParameterChange = "ir_exposure=8500".parse().unwrap();
        assert_eq!(change.value, ParameterValue::Int(8500));
        let change: ParameterChange = "depth_max=3.5".parse().unwrap();
        assert_eq!(change.value, ParameterValue::Float(3.5));
        assert!("depth_max".parse::<ParameterChange>().is_err());
    }

    #[test]
    fn test_device_bound() {
        assert!(SensorParameter::IrExposure(10).is_device_bound());
        assert!(!SensorParameter::DepthMin(1.0).is_device_bound());
    }
}
