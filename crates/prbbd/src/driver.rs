use std::collections::VecDeque;
use std::sync::Arc;

use prbbd_memory::PhysicalMemory;

use crate::descriptor::{self, PARAM_LIMIT};
use crate::{BlockLayer, DispatchMode, ParseError, Registry, StartupError, DRIVER_NAME};

/// Longest string [`StartupQueue::push`] accepts. The queued copy keeps one byte of the parameter
/// buffer in reserve, so this is one less than what [`descriptor::parse`] takes.
pub const QUEUE_MAX_LEN: usize = PARAM_LIMIT - 2;

/// Device strings collected before the driver is initialised.
///
/// Entries are only length-checked here; they are parsed when [`Driver::init`] replays them.
#[derive(Debug, Default, Clone)]
pub struct StartupQueue {
    entries: VecDeque<String>,
}

impl StartupQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, raw: &str) -> Result<(), ParseError> {
        if raw.len() > QUEUE_MAX_LEN {
            tracing::error!(len = raw.len(), "parameter too long");
            return Err(ParseError::ParameterTooLong {
                len: raw.len(),
                max: QUEUE_MAX_LEN,
            });
        }
        self.entries.push_back(raw.to_string());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(String::as_str)
    }
}

/// The initialised driver: its block major plus every device created at startup.
///
/// Dropping the driver destroys all devices and releases the major.
pub struct Driver {
    registry: Registry,
    host: Arc<dyn BlockLayer>,
    major: u32,
}

impl Driver {
    /// Registers the block major, then replays `queue` in order.
    ///
    /// The first entry that fails to parse or to create aborts startup: devices created so far
    /// are destroyed, the major is released and the rest of the queue is discarded. The queue is
    /// empty when this returns either way.
    pub fn init(
        queue: &mut StartupQueue,
        memory: Arc<dyn PhysicalMemory>,
        host: Arc<dyn BlockLayer>,
        mode: DispatchMode,
    ) -> Result<Self, StartupError> {
        let entries = std::mem::take(&mut queue.entries);

        let major = host.register_major(DRIVER_NAME).map_err(|err| {
            tracing::error!(%err, "register_blkdev failed");
            StartupError::MajorRegistration(err)
        })?;
        tracing::debug!(major, "registered block major");

        let mut driver = Driver {
            registry: Registry::new(memory, Arc::clone(&host), major, mode),
            host,
            major,
        };

        for entry in entries {
            let desc = descriptor::parse(&entry).map_err(|source| {
                tracing::error!(%entry, err = %source, "setup failed");
                StartupError::Parse {
                    entry: entry.clone(),
                    source,
                }
            })?;
            driver.registry.create(&desc).map_err(|source| {
                tracing::error!(%entry, err = %source, "setup failed");
                StartupError::Create {
                    entry: entry.clone(),
                    source,
                }
            })?;
        }

        tracing::info!(devices = driver.registry.len(), major, "driver initialised");
        Ok(driver)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    /// Destroys every device and releases the major.
    pub fn shutdown(self) {
        tracing::info!(devices = self.registry.len(), "shutting down");
        drop(self);
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.registry.destroy_all();
        self.host.unregister_major(self.major, DRIVER_NAME);
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("major", &self.major)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
