#![forbid(unsafe_code)]

// Native-only runner. Keep a stub `main` so `--workspace` builds for wasm targets still link.
#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
mod config;

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::fs;
    use std::io::{self, Write};
    use std::path::Path;
    use std::sync::Arc;

    use anyhow::{bail, Context, Result};
    use prbbd::{
        Bio, Device, Driver, IoStatus, LocalBlockLayer, ReservedRam, StartupQueue, SECTOR_SIZE,
    };
    use tracing_subscriber::EnvFilter;

    use crate::config::Config;

    pub fn main() -> Result<()> {
        let config = Config::load()?;

        let filter = match &config.log_level {
            Some(level) => EnvFilter::try_new(level).context("invalid --log-level filter")?,
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        };
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();

        let ram = ReservedRam::new(config.ram_base, config.ram_size)
            .context("failed to reserve the RAM window")?;
        if let Some(path) = &config.ram_image {
            load_image(&ram, path)?;
        }

        let mut queue = StartupQueue::new();
        for entry in &config.devices {
            queue
                .push(entry)
                .with_context(|| format!("rejected device parameter {entry:?}"))?;
        }
        if queue.is_empty() {
            tracing::warn!("no devices configured");
        }

        let host = Arc::new(LocalBlockLayer::new());
        let driver = Driver::init(&mut queue, Arc::new(ram.clone()), host.clone(), config.mode)
            .context("driver initialisation failed")?;

        let mut out = io::stdout().lock();
        for disk in host.published() {
            let geo = disk.geometry;
            writeln!(
                out,
                "{}\t{}:{}\t{} sectors\tchs {}/{}/{}\t{}",
                disk.name,
                disk.major,
                disk.first_minor,
                disk.capacity,
                geo.cylinders,
                geo.heads,
                geo.sectors,
                config.mode,
            )?;
        }

        let verified = if config.verify {
            driver.registry().iter().try_for_each(|dev| {
                verify(dev).with_context(|| format!("self-check failed on {}", dev.name()))?;
                writeln!(out, "{}: ok", dev.name())?;
                Ok::<_, anyhow::Error>(())
            })
        } else {
            Ok(())
        };

        driver.shutdown();
        if let Some(path) = &config.ram_image {
            save_image(&ram, path)?;
        }
        verified
    }

    fn load_image(ram: &ReservedRam, path: &Path) -> Result<()> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no RAM image yet; starting zeroed");
                return Ok(());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read RAM image {}", path.display()))
            }
        };
        if bytes.len() as u64 > ram.size() {
            bail!(
                "RAM image {} is {} bytes, larger than the {:#x}-byte window",
                path.display(),
                bytes.len(),
                ram.size()
            );
        }
        ram.write_physical(ram.base(), &bytes)?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "loaded RAM image");
        Ok(())
    }

    fn save_image(ram: &ReservedRam, path: &Path) -> Result<()> {
        let len = usize::try_from(ram.size()).context("RAM window too large to save")?;
        let mut bytes = vec![0u8; len];
        ram.read_physical(ram.base(), &mut bytes)?;
        fs::write(path, &bytes)
            .with_context(|| format!("failed to write RAM image {}", path.display()))?;
        tracing::info!(path = %path.display(), bytes = len, "saved RAM image");
        Ok(())
    }

    /// Round-trips a pattern through the first and last sector, then puts the old data back.
    fn verify(dev: &Device) -> Result<()> {
        let capacity = dev.capacity();
        if capacity == 0 {
            bail!("device has no whole sectors");
        }

        for sector in [0, capacity - 1] {
            let saved = read_sector(dev, sector)?;
            let pattern: Vec<u8> = (0..SECTOR_SIZE)
                .map(|i| (i as u8) ^ (sector as u8) ^ 0xa5)
                .collect();
            write_sector(dev, sector, pattern.clone())?;
            let back = read_sector(dev, sector)?;
            write_sector(dev, sector, saved)?;
            if back != pattern {
                bail!("sector {sector} read back different data");
            }
        }

        let beyond = dev.submit_bio(Bio::read(capacity, [SECTOR_SIZE]));
        if beyond.status() != Some(IoStatus::IoError) {
            bail!("read past the end of the device was not rejected");
        }
        Ok(())
    }

    fn read_sector(dev: &Device, sector: u64) -> Result<Vec<u8>> {
        let bio = dev.submit_bio(Bio::read(sector, [SECTOR_SIZE]));
        match bio.status() {
            Some(IoStatus::Ok) => Ok(bio.data()),
            status => bail!("read of sector {sector} completed with {status:?}"),
        }
    }

    fn write_sector(dev: &Device, sector: u64, data: Vec<u8>) -> Result<()> {
        let bio = dev.submit_bio(Bio::write(sector, [data]));
        match bio.status() {
            Some(IoStatus::Ok) => Ok(()),
            status => bail!("write of sector {sector} completed with {status:?}"),
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> anyhow::Result<()> {
    native::main()
}
