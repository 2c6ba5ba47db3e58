use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use prbbd::DispatchMode;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "prbbd",
    version,
    about = "Publish block devices carved out of a reserved physical RAM window"
)]
pub struct Args {
    /// Device descriptor `name,start,length`. May be given more than once.
    ///
    /// Numbers accept decimal, `0x` hex, leading-`0` octal and a `K`/`M`/`G` suffix.
    ///
    /// Environment variable: `PRBBD_DEVICES` (entries separated by `;`).
    #[arg(long = "device", env = "PRBBD_DEVICES", value_delimiter = ';')]
    devices: Vec<String>,

    /// First physical address of the reserved window.
    ///
    /// Environment variable: `PRBBD_RAM_BASE`.
    #[arg(long, env = "PRBBD_RAM_BASE", default_value = "16M", value_parser = parse_mem_size)]
    ram_base: u64,

    /// Size of the reserved window.
    ///
    /// Environment variable: `PRBBD_RAM_SIZE`.
    #[arg(long, env = "PRBBD_RAM_SIZE", default_value = "16M", value_parser = parse_mem_size)]
    ram_size: u64,

    /// Dispatch strategy for every device: `request` or `bio`.
    ///
    /// Environment variable: `PRBBD_MODE`.
    #[arg(long, env = "PRBBD_MODE", default_value_t = DispatchMode::Bio)]
    mode: DispatchMode,

    /// File holding the window contents across runs.
    ///
    /// Loaded into the window before devices are created (if it exists) and written back after
    /// shutdown.
    ///
    /// Environment variable: `PRBBD_RAM_IMAGE`.
    #[arg(long, env = "PRBBD_RAM_IMAGE")]
    ram_image: Option<PathBuf>,

    /// Write/read back the first and last sector of each device, restoring the old contents.
    #[arg(long)]
    verify: bool,

    /// Log filter (tracing-subscriber EnvFilter syntax). Falls back to `RUST_LOG`, then `info`.
    ///
    /// Environment variable: `PRBBD_LOG_LEVEL`.
    #[arg(long, env = "PRBBD_LOG_LEVEL")]
    log_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub devices: Vec<String>,
    pub ram_base: u64,
    pub ram_size: u64,
    pub mode: DispatchMode,
    pub ram_image: Option<PathBuf>,
    pub verify: bool,
    pub log_level: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<Self> {
        if args.ram_size == 0 {
            bail!("--ram-size must be non-zero");
        }
        if args.ram_base.checked_add(args.ram_size).is_none() {
            bail!(
                "RAM window {:#x}+{:#x} overflows the address space",
                args.ram_base,
                args.ram_size
            );
        }

        let devices = args
            .devices
            .into_iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();
        let log_level = args.log_level.and_then(|v| {
            let v = v.trim().to_string();
            (!v.is_empty()).then_some(v)
        });

        Ok(Self {
            devices,
            ram_base: args.ram_base,
            ram_size: args.ram_size,
            mode: args.mode,
            ram_image: args.ram_image,
            verify: args.verify,
            log_level,
        })
    }
}

fn parse_mem_size(text: &str) -> Result<u64, String> {
    prbbd::descriptor::parse_size(text.trim()).ok_or_else(|| format!("invalid size {text:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Result<Config> {
        let args = Args::try_parse_from(std::iter::once("prbbd").chain(argv.iter().copied()))?;
        Config::from_args(args)
    }

    #[test]
    fn defaults() {
        let cfg = parse(&[]).unwrap();
        assert_eq!(cfg.ram_base, 16 << 20);
        assert_eq!(cfg.ram_size, 16 << 20);
        assert_eq!(cfg.mode, DispatchMode::Bio);
        assert!(!cfg.verify);
    }

    #[test]
    fn repeated_devices_keep_their_commas() {
        let cfg = parse(&[
            "--device",
            "a,0x1000000,1M",
            "--device",
            "b,0x1100000,1M",
            "--mode",
            "request",
            "--ram-size",
            "0x200000",
        ])
        .unwrap();
        assert_eq!(cfg.devices, ["a,0x1000000,1M", "b,0x1100000,1M"]);
        assert_eq!(cfg.mode, DispatchMode::Request);
        assert_eq!(cfg.ram_size, 0x20_0000);
    }

    #[test]
    fn rejects_bad_sizes_and_modes() {
        assert!(parse(&["--ram-size", "lots"]).is_err());
        assert!(parse(&["--ram-size", "0"]).is_err());
        assert!(parse(&["--mode", "sideways"]).is_err());
        assert!(parse(&["--ram-base", "0xffffffffffffffff", "--ram-size", "1"]).is_err());
    }
}
