//! Loopback pub/sub example: two buses joined by an in-memory serial link.
//!
//! Run with:
//!   cargo run --example loopback-pubsub

use std::sync::mpsc;
use std::time::Duration;

use chanbus::bus::{Bus, BusConfig, Message};
use chanbus::transport::LoopbackSerial;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (left, right) = LoopbackSerial::pair(64 * 1024);
    let noisy = right.clone();
    let publisher = Bus::from_io(left, BusConfig::default())?;
    let subscriber = Bus::from_io(right, BusConfig::default())?;

    let (tx, rx) = mpsc::channel();
    let sensors = subscriber.subscribe("SENSOR_.*", move |message: &Message| {
        let _ = tx.send(message.clone());
    })?;
    subscriber.subscribe("SENSOR_IMU", |message: &Message| {
        eprintln!("[imu] {} bytes", message.payload.len());
    })?;
    subscriber.start()?;

    publisher.publish("SENSOR_IMU", &[1, 2, 3, 4])?;
    publisher.publish("SENSOR_GPS", b"$GPGGA,123519")?;
    publisher.publish("STATUS", b"not a sensor")?;

    // A burst of line noise; the receiver hunts for the next sync word.
    publisher.flush(Duration::from_secs(1))?;
    noisy.inject(&[0xCC, 0x00, 0xFF, 0x13, 0x37]);
    publisher.publish("SENSOR_BARO", b"1013.25")?;

    for _ in 0..3 {
        let message = rx.recv_timeout(Duration::from_secs(2))?;
        eprintln!(
            "[sensors] channel={} payload={}",
            message.channel,
            String::from_utf8_lossy(&message.payload)
        );
    }

    subscriber.unsubscribe(&sensors)?;
    let stats = subscriber.stats()?;
    eprintln!(
        "[stats] received={} discarded={} corrupt={}",
        stats.frames_received, stats.bytes_discarded, stats.corrupt_frames
    );

    publisher.close()?;
    subscriber.close()?;
    Ok(())
}
