//! YAML configuration listing the containers to mount.
//!
//! ```yaml
//! root: /srv/discs
//! disks:
//!   game1: main.swf
//!   game2:
//!     kind: swfkit
//!     exe: setup.exe
//!     swf: main.swf
//!     player: small
//!     flashvars: { lang: en }
//! ```
//!
//! A disk given as a plain string is an `iso` mount whose string is the SWF
//! to present.

use serde::Deserialize;
use snafu::{ResultExt, Snafu, ensure};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum ConfigError {
    #[snafu(display("cannot read {}", path.display()))]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("invalid configuration"))]
    ParseFailed { source: serde_yaml::Error },

    #[snafu(display("disk {prefix:?} is a swfkit mount without an exe"))]
    MissingExe { prefix: String },

    #[snafu(display("disk prefix {prefix:?} must be a single path component"))]
    InvalidPrefix { prefix: String },
}

/// Container format of a mount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// Directory with a `cdimage` and an optional `mapfile`.
    #[default]
    Iso,
    /// Executable carrying a SAF trailer.
    Swfkit,
}

impl Kind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Iso => "iso",
            Self::Swfkit => "swfkit",
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Stage size of the embedded player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Player {
    Small,
    #[default]
    Medium,
}

impl Player {
    /// Returns `(width, height)` in pixels.
    #[must_use]
    pub const fn dimensions(self) -> (u32, u32) {
        match self {
            Self::Small => (800, 600),
            Self::Medium => (1024, 768),
        }
    }
}

/// One configured mount.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DiskConfig {
    pub kind: Kind,
    /// Executable inside the mount directory (`swfkit` only).
    pub exe: Option<String>,
    /// Movie presented by the serving layer.
    pub swf: Option<String>,
    pub player: Player,
    pub flashvars: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DiskEntry {
    Swf(String),
    Full(DiskConfig),
}

impl From<DiskEntry> for DiskConfig {
    fn from(entry: DiskEntry) -> Self {
        match entry {
            DiskEntry::Swf(swf) => Self {
                swf: Some(swf),
                ..Self::default()
            },
            DiskEntry::Full(disk) => disk,
        }
    }
}

#[derive(Deserialize)]
struct RawConfig {
    root: PathBuf,
    #[serde(default)]
    disks: BTreeMap<String, DiskEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub root: PathBuf,
    pub disks: BTreeMap<String, DiskConfig>,
}

impl Config {
    /// Reads and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).context(ReadFailedSnafu { path })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(text).context(ParseFailedSnafu)?;
        let disks: BTreeMap<String, DiskConfig> = raw
            .disks
            .into_iter()
            .map(|(prefix, entry)| (prefix, entry.into()))
            .collect();

        for (prefix, disk) in &disks {
            ensure!(
                !prefix.is_empty() && !prefix.contains(['/', '\\']) && prefix != "." && prefix != "..",
                InvalidPrefixSnafu { prefix }
            );
            ensure!(
                disk.kind != Kind::Swfkit || disk.exe.is_some(),
                MissingExeSnafu { prefix }
            );
        }

        Ok(Self {
            root: raw.root,
            disks,
        })
    }

    /// Returns the directory a mount's files live in.
    #[must_use]
    pub fn mount_dir(&self, prefix: &str) -> PathBuf {
        self.root.join(prefix)
    }

    /// Returns what to open for a mount: the mount directory for `iso`, the
    /// executable for `swfkit`.
    #[must_use]
    pub fn target(&self, prefix: &str, disk: &DiskConfig) -> PathBuf {
        let dir = self.mount_dir(prefix);

        match (disk.kind, &disk.exe) {
            (Kind::Swfkit, Some(exe)) => dir.join(exe),
            _ => dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CONFIG: &str = r#"
root: /srv/discs
disks:
  game1: main.swf
  game2:
    kind: swfkit
    exe: setup.exe
    swf: intro.swf
    player: small
    flashvars:
      lang: en
      level: 3
"#;

    #[test]
    fn shorthand_and_full_entries() {
        let config = Config::parse(CONFIG).unwrap();

        assert_eq!(config.root, PathBuf::from("/srv/discs"));

        let game1 = &config.disks["game1"];
        assert_eq!(game1.kind, Kind::Iso);
        assert_eq!(game1.swf.as_deref(), Some("main.swf"));
        assert_eq!(game1.player.dimensions(), (1024, 768));

        let game2 = &config.disks["game2"];
        assert_eq!(game2.kind, Kind::Swfkit);
        assert_eq!(game2.player, Player::Small);
        assert_eq!(game2.flashvars.len(), 2);
        assert_eq!(
            config.target("game2", game2),
            PathBuf::from("/srv/discs/game2/setup.exe")
        );
        assert_eq!(config.target("game1", game1), PathBuf::from("/srv/discs/game1"));
    }

    #[test]
    fn swfkit_needs_exe() {
        let err = Config::parse("root: /r\ndisks:\n  a:\n    kind: swfkit\n").unwrap_err();

        assert!(matches!(err, ConfigError::MissingExe { prefix } if prefix == "a"));
    }

    #[test]
    fn unknown_kind() {
        assert!(matches!(
            Config::parse("root: /r\ndisks:\n  a:\n    kind: zip\n"),
            Err(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn prefix_must_be_a_component() {
        assert!(matches!(
            Config::parse("root: /r\ndisks:\n  ../etc: a.swf\n"),
            Err(ConfigError::InvalidPrefix { .. })
        ));
    }

    #[test]
    fn no_disks() {
        let config = Config::parse("root: /r\n").unwrap();

        assert!(config.disks.is_empty());
    }
}
