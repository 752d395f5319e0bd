//! Engine configuration.
//!
//! This crate only defines the shape and defaults; parsing a config file
//! from disk is the job of the (out of scope) CLI entry point.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// In-memory layout knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Bit shift applied to a `PageId` to get a byte offset. Default 12
    /// (4096-byte pages).
    pub data_page_shift: u32,
    pub force_unmap_mapped_files: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            data_page_shift: 12,
            force_unmap_mapped_files: false,
        }
    }
}

/// Worker pool sizing for the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub core_threads: usize,
    pub max_threads: usize,
    pub keep_alive_time_ms: u64,
    pub queue_size: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        let cores = num_cpus::get().max(1);
        Self {
            core_threads: cores,
            max_threads: cores * 2,
            keep_alive_time_ms: 60_000,
            queue_size: 1024,
        }
    }
}

/// gRPC listener configuration. The listener itself lives outside this
/// crate; only the shape of its configuration is defined here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub message_size: usize,
    pub cert_file: Option<String>,
    pub private_key: Option<String>,
}

impl ServerConfig {
    /// TLS is enabled iff both a certificate and a private key are configured.
    pub fn tls_enabled(&self) -> bool {
        self.cert_file.is_some() && self.private_key.is_some()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 1865,
            message_size: 524_288,
            cert_file: None,
            private_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub root: String,
    pub lock_timeout_ms: u64,
    pub memory_config: MemoryConfig,
    pub execution_config: ExecutionConfig,
    pub server_config: ServerConfig,
}

impl Config {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn page_size(&self) -> usize {
        1usize << self.memory_config.data_page_shift
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: "./data".to_string(),
            lock_timeout_ms: 5_000,
            memory_config: MemoryConfig::default(),
            execution_config: ExecutionConfig::default(),
            server_config: ServerConfig::default(),
        }
    }
}
