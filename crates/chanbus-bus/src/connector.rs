use std::path::Path;
use std::sync::Arc;

use chanbus_transport::UnixStreamSerial;
use tracing::debug;

use crate::bus::{Bus, BusConfig};
use crate::error::Result;

/// Connect to a [`BusListener`](crate::BusListener) and build a bus over the
/// link. The receive loop is not started.
pub fn connect(path: impl AsRef<Path>) -> Result<Bus> {
    connect_with_config(path, BusConfig::default())
}

/// Connect with explicit configuration.
pub fn connect_with_config(path: impl AsRef<Path>, config: BusConfig) -> Result<Bus> {
    let path = path.as_ref();
    let link = UnixStreamSerial::connect(path)?;
    debug!(?path, "bus link connected");
    Bus::new(Arc::new(link), config)
}
