// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that oxidrop needs
//! to read.

use std::path::PathBuf;

/// Determine default absolute path to fleet manifest.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/oxidrop/manifest.toml` as
/// the default absolute path for the manifest. Does not check if the path
/// returned actually exists.
///
/// # Errors
///
/// - Return [`NoConfigDir`] if configuration directory cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_manifest_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("oxidrop").join("manifest.toml"))
        .ok_or(NoConfigDir)
}

/// No way to determine user's configuration directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's configuration directory")]
pub struct NoConfigDir;

/// Friendly result alias :3
pub type Result<T, E = NoConfigDir> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[cfg(target_os = "linux")]
    #[sealed_test(env = [("XDG_CONFIG_HOME", "/home/blah/.config")])]
    fn manifest_path_follows_xdg() -> anyhow::Result<()> {
        assert_eq!(
            default_manifest_path()?,
            PathBuf::from("/home/blah/.config/oxidrop/manifest.toml")
        );

        Ok(())
    }
}
