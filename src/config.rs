//! Runtime settings: remote-shell options and the receiver command.

use std::fmt;
use std::io;
use std::path::Path;

use serde::Deserialize;

/// Result of settings loading.
pub type Result<T> = std::result::Result<T, Error>;

/// Sender settings, loadable from an optional TOML file. Every field has a
/// default, so an absent file or an empty table is valid.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub ssh: SshSettings,
    /// Command started on each peer over the remote shell.
    pub receiver_cmd: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self { ssh: SshSettings::default(), receiver_cmd: "treecast-recv".to_string() }
    }
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Settings> {
        match path {
            None => Ok(Settings::default()),
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(Error::Io)?;
                toml::from_str(&text).map_err(Error::Parse)
            }
        }
    }
}

/// Options passed to every ssh invocation, for both the bulk sync transport
/// and the receiver session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SshSettings {
    /// Seconds before giving up on a connection attempt.
    pub connect_timeout: u64,
    /// Seconds between keepalive probes.
    pub server_alive_interval: u64,
    /// Unanswered keepalive probes before the connection is dropped.
    pub server_alive_count_max: u32,
    pub compression: bool,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            connect_timeout: 10,
            server_alive_interval: 3,
            server_alive_count_max: 4,
            compression: false,
        }
    }
}

impl SshSettings {
    /// The `-o` option list. Batch mode keeps ssh from prompting; host keys
    /// are not checked, authentication policy stays with the operator's ssh
    /// setup.
    pub fn args(&self) -> Vec<String> {
        let mut options = vec![
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout),
            "-o".to_string(),
            "LogLevel=ERROR".to_string(),
            "-o".to_string(),
            format!("ServerAliveInterval={}", self.server_alive_interval),
            "-o".to_string(),
            format!("ServerAliveCountMax={}", self.server_alive_count_max),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
        ];
        if self.compression {
            options.push("-o".to_string());
            options.push("Compression=yes".to_string());
        }
        options
    }
}

/// Settings loading errors.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "cannot read settings file: {err}"),
            Error::Parse(err) => write!(f, "cannot parse settings file: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Parse(err) => Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.ssh.connect_timeout, 10);
        assert_eq!(settings.ssh.server_alive_interval, 3);
        assert_eq!(settings.ssh.server_alive_count_max, 4);
        assert!(!settings.ssh.compression);
        assert_eq!(settings.receiver_cmd, "treecast-recv");
    }

    #[test]
    fn test_default_args() {
        let args = SshSettings::default().args();
        assert!(args.contains(&"ConnectTimeout=10".to_string()));
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"StrictHostKeyChecking=no".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("Compression")));
    }

    #[test]
    fn test_load_missing_path_is_default() {
        assert_eq!(Settings::load(None).unwrap(), Settings::default());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "receiver_cmd = \"/opt/bin/treecast-recv\"").unwrap();
        writeln!(file, "[ssh]").unwrap();
        writeln!(file, "connect_timeout = 30").unwrap();
        writeln!(file, "compression = true").unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.receiver_cmd, "/opt/bin/treecast-recv");
        assert_eq!(settings.ssh.connect_timeout, 30);
        assert_eq!(settings.ssh.server_alive_interval, 3);
        assert!(settings.ssh.args().contains(&"Compression=yes".to_string()));
    }

    #[test]
    fn test_load_rejects_unknown_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "receiver = \"typo\"").unwrap();
        assert!(matches!(Settings::load(Some(file.path())), Err(Error::Parse(_))));
    }
}
