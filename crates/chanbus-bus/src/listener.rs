use std::path::Path;
use std::sync::Arc;

use chanbus_transport::SerialListener;

use crate::bus::{Bus, BusConfig};
use crate::error::Result;

/// Accepts serial links over a Unix domain socket and wraps each in a [`Bus`].
pub struct BusListener {
    listener: SerialListener,
    config: BusConfig,
}

impl BusListener {
    /// Bind to a Unix domain socket path.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            listener: SerialListener::bind(path)?,
            config: BusConfig::default(),
        })
    }

    /// Override the configuration applied to accepted buses.
    pub fn with_config(mut self, config: BusConfig) -> Self {
        self.config = config;
        self
    }

    /// Accept the next link (blocking). The receive loop is not started.
    pub fn accept(&self) -> Result<Bus> {
        let link = self.listener.accept()?;
        Bus::new(Arc::new(link), self.config.clone())
    }

    /// Bound socket path.
    pub fn path(&self) -> &Path {
        self.listener.path()
    }
}

impl std::fmt::Debug for BusListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusListener")
            .field("path", &self.path())
            .field("config", &self.config)
            .finish()
    }
}
