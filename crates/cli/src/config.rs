//! Command-line configuration.

use anyhow::Context;
use clap::Parser;
use oob::{AllocatorRegistry, BootstrapConfig, MemoryKind, DEFAULT_PORT};
use tracing_subscriber::EnvFilter;

use crate::commands::Command;

/// Exchange a test string with a peer over the out-of-band channel.
#[derive(Debug, Clone, Parser)]
#[command(name = "oob-hello", version)]
pub struct CliConfig {
    /// Connect to this listener host; listen when omitted.
    #[arg(short = 'n', long = "server", value_name = "HOST")]
    pub server: Option<String>,

    /// Port to listen on or connect to.
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Memory type of the test buffer: host, cuda or cuda-managed.
    #[arg(short = 'm', long = "mem-type", default_value_t = MemoryKind::Host)]
    pub mem_type: MemoryKind,

    /// Test string length in bytes, including the terminating NUL.
    #[arg(short = 's', long = "size", default_value_t = 16, value_parser = parse_size)]
    pub size: usize,

    /// GPU ordinal for cuda memory types.
    #[arg(long, default_value_t = 0)]
    pub device: usize,

    /// Log bootstrap steps.
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_size(s: &str) -> Result<usize, String> {
    let size: usize = s.parse().map_err(|e| format!("{e}"))?;
    if size == 0 {
        return Err("size must be at least 1".to_string());
    }
    Ok(size)
}

impl CliConfig {
    pub fn bootstrap(&self) -> BootstrapConfig {
        BootstrapConfig {
            port: self.port,
            server: self.server.clone(),
        }
    }

    /// Capability sets for the requested memory type.
    pub fn registry(&self) -> anyhow::Result<AllocatorRegistry> {
        if self.mem_type == MemoryKind::Host {
            return Ok(AllocatorRegistry::host_only());
        }
        #[cfg(feature = "cuda")]
        return AllocatorRegistry::with_cuda(self.device)
            .with_context(|| format!("failed to open CUDA device {}", self.device));
        #[cfg(not(feature = "cuda"))]
        anyhow::bail!(
            "memory type {} needs a build with the `cuda` feature",
            self.mem_type
        )
    }

    pub fn command(&self) -> Command {
        Command::for_role(self.bootstrap().role())
    }

    pub fn run(&self) -> anyhow::Result<()> {
        init_logging(self.verbose);

        let registry = self.registry()?;
        registry
            .resolve(self.mem_type)
            .context("selected memory type is not available")?;

        let result = self.command().execute(self, &registry)?;
        println!("{}", result);
        Ok(())
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // a second init (tests) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use oob::Role;

    #[test]
    fn test_defaults() {
        let config = CliConfig::try_parse_from(["oob-hello"]).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.mem_type, MemoryKind::Host);
        assert_eq!(config.size, 16);
        assert!(config.server.is_none());
        assert_eq!(config.bootstrap().role(), Role::Listener);
    }

    #[test]
    fn test_connector_flags() {
        let config = CliConfig::try_parse_from([
            "oob-hello", "-n", "node-a", "-p", "4000", "-m", "cuda-managed", "-s", "64",
        ])
        .unwrap();
        assert_eq!(config.bootstrap(), BootstrapConfig::connector("node-a", 4000));
        assert_eq!(config.mem_type, MemoryKind::DeviceManaged);
        assert_eq!(config.size, 64);
        assert!(matches!(config.command(), Command::Connect));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(CliConfig::try_parse_from(["oob-hello", "-s", "0"]).is_err());
        assert!(CliConfig::try_parse_from(["oob-hello", "-m", "rocm"]).is_err());
        assert!(CliConfig::try_parse_from(["oob-hello", "-p", "70000"]).is_err());
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_device_memory_needs_cuda_build() {
        let config = CliConfig::try_parse_from(["oob-hello", "-m", "cuda"]).unwrap();
        assert!(config.registry().is_err());
    }
}
