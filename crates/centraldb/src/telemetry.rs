// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fridge telemetry device kinds
//!
//! Static table of the device kinds a fridge source records, plus a seeded
//! generator producing realistic source records for them. The generator
//! feeds tests and local dry runs; the replication path never depends on a
//! device kind.
//!
//! Each kind writes one measurement named after the kind, identified by a
//! single tag (`sensor` for passive gauges, `device` for actuated ones).

use crate::record::{FieldValue, RawRecord};
use fastrand::Rng;

/// Value type of a device field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Float,
    Integer,
    Boolean,
    String,
}

/// A device kind: measurement, identifying tag and fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceKind {
    pub name: &'static str,
    pub tag: &'static str,
    pub fields: &'static [(&'static str, FieldKind)],
}

use FieldKind::{Boolean, Float, Integer};

const SENSOR: &str = "sensor";
const DEVICE: &str = "device";

impl DeviceKind {
    pub const BGA: DeviceKind = DeviceKind {
        name: "bga",
        tag: SENSOR,
        fields: &[("percent", Float)],
    };

    pub const COMPRESSOR: DeviceKind = DeviceKind {
        name: "compressor",
        tag: DEVICE,
        fields: &[
            ("state", Boolean),
            ("discharge_temperature", Float),
            ("outlet_temperature", Float),
            ("inlet_temperature", Float),
            ("return_pressure", Float),
        ],
    };

    pub const ECODRY: DeviceKind = DeviceKind {
        name: "ecodry",
        tag: DEVICE,
        fields: &[
            ("setpoint", Float),
            ("frequency", Float),
            ("current", Float),
            ("voltage", Float),
            ("bus_voltage", Float),
            ("power", Float),
            ("state", Boolean),
        ],
    };

    pub const FLOW: DeviceKind = DeviceKind {
        name: "flow",
        tag: SENSOR,
        fields: &[
            ("pressure", Float),
            ("temperature", Float),
            ("volumetric_flow", Float),
            ("mass_flow", Float),
        ],
    };

    pub const HEATER: DeviceKind = DeviceKind {
        name: "heater",
        tag: DEVICE,
        fields: &[
            ("power", Float),
            ("current", Float),
            ("voltage", Float),
            ("native", Float),
        ],
    };

    pub const INVERTER: DeviceKind = DeviceKind {
        name: "inverter",
        tag: DEVICE,
        fields: &[
            ("state", Boolean),
            ("frequency", Float),
            ("current", Float),
            ("voltage", Float),
            ("alarm", FieldKind::String),
        ],
    };

    pub const PRESSURE: DeviceKind = DeviceKind {
        name: "pressure",
        tag: SENSOR,
        fields: &[("pressure", Float)],
    };

    pub const PUMP: DeviceKind = DeviceKind {
        name: "pump",
        tag: DEVICE,
        fields: &[("active", Boolean)],
    };

    pub const THERMOMETER: DeviceKind = DeviceKind {
        name: "thermometer",
        tag: SENSOR,
        fields: &[
            ("temperature", Float),
            ("resistance", Float),
            ("quadrature", Float),
        ],
    };

    pub const TRAP: DeviceKind = DeviceKind {
        name: "trap",
        tag: DEVICE,
        fields: &[("output", Float)],
    };

    pub const TURBO: DeviceKind = DeviceKind {
        name: "turbo",
        tag: DEVICE,
        fields: &[
            ("state", Boolean),
            ("speed", Integer),
            ("converter", Integer),
            ("motor", Integer),
            ("bearing", Integer),
            ("setpoint", Integer),
            ("voltage", Integer),
            ("error", Boolean),
        ],
    };

    pub const VALVE: DeviceKind = DeviceKind {
        name: "valve",
        tag: DEVICE,
        fields: &[("open", Boolean)],
    };

    /// Every known kind, sorted by name.
    pub const ALL: [DeviceKind; 12] = [
        Self::BGA,
        Self::COMPRESSOR,
        Self::ECODRY,
        Self::FLOW,
        Self::HEATER,
        Self::INVERTER,
        Self::PRESSURE,
        Self::PUMP,
        Self::THERMOMETER,
        Self::TRAP,
        Self::TURBO,
        Self::VALVE,
    ];

    /// Look a kind up by name.
    pub fn from_name(name: &str) -> Option<DeviceKind> {
        Self::ALL.iter().copied().find(|k| k.name == name)
    }

    /// Measurement written by this kind.
    pub fn measurement(&self) -> &'static str {
        self.name
    }
}

/// A named device of a given kind.
#[derive(Debug, Clone)]
pub struct Device {
    pub kind: DeviceKind,
    pub name: String,
}

impl Device {
    pub fn new(kind: DeviceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

/// Seeded generator of device samples.
///
/// The same seed and device list always produce the same records.
pub struct TelemetryGenerator {
    devices: Vec<Device>,
    rng: Rng,
}

impl TelemetryGenerator {
    pub fn new(devices: Vec<Device>, seed: u64) -> Self {
        Self {
            devices,
            rng: Rng::with_seed(seed),
        }
    }

    /// One device of every kind, named `<kind>-1`.
    pub fn fridge(seed: u64) -> Self {
        let devices = DeviceKind::ALL
            .iter()
            .map(|kind| Device::new(*kind, format!("{}-1", kind.name)))
            .collect();
        Self::new(devices, seed)
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Records of one sample per device at `time_ns`, one record per field.
    pub fn sample(&mut self, time_ns: i64) -> Vec<RawRecord> {
        let mut records = Vec::new();
        for device in &self.devices {
            for (field, kind) in device.kind.fields {
                let value = random_value(&mut self.rng, *kind);
                records.push(
                    RawRecord::new(device.kind.measurement(), *field, value, time_ns)
                        .with_value(device.kind.tag, &device.name),
                );
            }
        }
        records
    }

    /// Samples every `step_ns` over `[start_ns, end_ns)`, in time order.
    pub fn span(&mut self, start_ns: i64, end_ns: i64, step_ns: i64) -> Vec<RawRecord> {
        let step = step_ns.max(1);
        let mut records = Vec::new();
        let mut t = start_ns;
        while t < end_ns {
            records.extend(self.sample(t));
            t += step;
        }
        records
    }

    /// Number of records produced per sample.
    pub fn records_per_sample(&self) -> usize {
        self.devices.iter().map(|d| d.kind.fields.len()).sum()
    }
}

fn random_value(rng: &mut Rng, kind: FieldKind) -> FieldValue {
    match kind {
        FieldKind::Float => FieldValue::Float(rng.f64() * 100.0),
        FieldKind::Integer => FieldValue::Integer(rng.i64(0..=100)),
        FieldKind::Boolean => FieldValue::Boolean(rng.bool()),
        FieldKind::String => {
            FieldValue::String((0..6).map(|_| rng.uppercase()).collect())
        }
    }
}
