use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Upload size ceiling in bytes. Uploads larger than this are rejected
    /// before a job record is created.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    /// Wall-clock bound on one separation tool invocation, in seconds.
    #[serde(default = "default_separation_timeout_secs")]
    pub separation_timeout_secs: u64,
    /// Interpreter used to invoke the separation tool (`<program> -m demucs ...`).
    #[serde(default = "default_separator_program")]
    pub separator_program: String,
    /// Model directory name the tool writes its output under.
    #[serde(default = "default_separator_model")]
    pub separator_model: String,
    /// Accounts registering with this email get the admin flag.
    #[serde(default)]
    pub admin_email: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8480
}

fn default_max_upload_bytes() -> u64 {
    20 * 1024 * 1024 // 20 MiB
}

fn default_allowed_extensions() -> Vec<String> {
    ["mp3", "wav", "flac", "m4a", "ogg"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_separation_timeout_secs() -> u64 {
    300
}

fn default_separator_program() -> String {
    "python".to_string()
}

fn default_separator_model() -> String {
    "htdemucs".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: None,
            max_upload_bytes: default_max_upload_bytes(),
            allowed_extensions: default_allowed_extensions(),
            separation_timeout_secs: default_separation_timeout_secs(),
            separator_program: default_separator_program(),
            separator_model: default_separator_model(),
            admin_email: None,
        }
    }
}

impl AppConfig {
    /// Whether `filename` carries one of the accepted audio extensions.
    pub fn is_allowed_file(&self, filename: &str) -> bool {
        match filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                let ext = ext.to_lowercase();
                self.allowed_extensions.iter().any(|e| *e == ext)
            }
            _ => false,
        }
    }
}
