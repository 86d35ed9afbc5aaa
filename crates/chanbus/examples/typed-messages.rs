//! Typed messages: fingerprint-prefixed payloads decoded through a registry.
//!
//! Run with:
//!   cargo run --example typed-messages

use std::sync::mpsc;
use std::time::Duration;

use chanbus::bus::{Bus, BusConfig, Message};
use chanbus::transport::LoopbackSerial;
use chanbus::types::{Fingerprint, MessageType, TypeRegistry};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Pose {
    x: f64,
    y: f64,
    heading_deg: f32,
}

impl MessageType for Pose {
    const FINGERPRINT: Fingerprint = Fingerprint(0x504F_5345_0000_0001);
    const TYPE_NAME: &'static str = "pose_t";
}

#[derive(Debug, Serialize, Deserialize)]
struct Battery {
    millivolts: u32,
    charging: bool,
}

impl MessageType for Battery {
    const FINGERPRINT: Fingerprint = Fingerprint(0x4241_5454_0000_0001);
    const TYPE_NAME: &'static str = "battery_t";
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut registry = TypeRegistry::new();
    registry.register_type::<Pose>()?;
    registry.register_type::<Battery>()?;
    let registry = registry.freeze();
    eprintln!("[registry] types: {:?}", registry.type_names());

    let bus = Bus::from_io(LoopbackSerial::default(), BusConfig::default())?;
    let (tx, rx) = mpsc::channel();
    bus.subscribe(".*", move |message: &Message| {
        let _ = tx.send(message.clone());
    })?;
    bus.start()?;

    bus.publish_typed(
        "ROBOT_POSE",
        &Pose {
            x: 1.25,
            y: -3.5,
            heading_deg: 90.0,
        },
    )?;
    bus.publish_typed(
        "ROBOT_BATTERY",
        &Battery {
            millivolts: 12_450,
            charging: false,
        },
    )?;
    bus.publish("ROBOT_LOG", b"plain text, no fingerprint")?;

    for _ in 0..3 {
        let message = rx.recv_timeout(Duration::from_secs(2))?;
        match message.decode_with(&registry) {
            Ok(record) => eprintln!("[{}] {record}", message.channel),
            Err(err) => eprintln!("[{}] untyped: {err}", message.channel),
        }
    }

    bus.close()?;
    Ok(())
}
