// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! File permission handling.
//!
//! Permissions reach oxidrop from two places: the `perm` field of a manifest
//! entry, and the live mode bits of a local source file. Both end up as a
//! canonical octal string like `"0644"`, represented by [`Permission`].
//!
//! # Precedence
//!
//! The permission applied to a destination is chosen in the following order:
//!
//! 1. Permission declared in the manifest.
//! 2. Permission captured from the local source file.
//! 3. Nothing, i.e., leave whatever the host defaults to.
//!
//! See [`effective`].

use serde::{
    de::{self, Deserializer, Visitor},
    Deserialize, Serialize, Serializer,
};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Raw permission value as written in a manifest.
///
/// Manifest authors may write either `perm = "0644"` or `perm = 0o644`. Any
/// other TOML type is rejected during deserialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermMode {
    /// Integer form, interpreted as mode bits.
    Int(i64),

    /// String form, used verbatim as octal digits.
    Str(String),
}

impl Serialize for PermMode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Int(value) => serializer.serialize_i64(*value),
            Self::Str(value) => serializer.serialize_str(value),
        }
    }
}

impl<'de> Deserialize<'de> for PermMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PermModeVisitor;

        impl Visitor<'_> for PermModeVisitor {
            type Value = PermMode;

            fn expecting(&self, fmt: &mut Formatter<'_>) -> FmtResult {
                fmt.write_str("a string or a number")
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
                Ok(PermMode::Int(value))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
                i64::try_from(value)
                    .map(PermMode::Int)
                    .map_err(|_| E::custom(format!("permission {value} is out of range")))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                Ok(PermMode::Str(value.to_owned()))
            }

            fn visit_string<E: de::Error>(self, value: String) -> Result<Self::Value, E> {
                Ok(PermMode::Str(value))
            }
        }

        deserializer.deserialize_any(PermModeVisitor)
    }
}

/// Canonical octal permission.
///
/// # Invariants
///
/// - Every character is a digit in `0..=7`.
/// - Text and mode bits always agree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Permission {
    text: String,
    bits: u32,
}

impl Permission {
    /// Conventional mode for directories that oxidrop creates.
    pub const DIRECTORY_DEFAULT: &'static str = "0755";

    /// Parse permission declared in a manifest.
    ///
    /// Integers are formatted as zero-padded octal. Strings are taken as-is.
    /// An empty string means that no permission was declared.
    ///
    /// # Errors
    ///
    /// - Return [`PermissionError::Negative`] or [`PermissionError::Zero`] for
    ///   integers that cannot be a permission.
    /// - Return [`PermissionError::Parse`] if a character is not a digit.
    /// - Return [`PermissionError::NotOctal`] if a digit is above 7.
    /// - Return [`PermissionError::UnconventionalOwner`] if the owner digit is
    ///   below 4.
    /// - Return [`PermissionError::MissingOwner`] if there is no owner digit.
    pub fn parse(mode: &PermMode) -> Result<Option<Self>> {
        let text = match mode {
            PermMode::Int(value) if *value < 0 => return Err(PermissionError::Negative(*value)),
            PermMode::Int(0) => return Err(PermissionError::Zero),
            PermMode::Int(value) => format!("0{value:03o}"),
            PermMode::Str(value) if value.is_empty() => return Ok(None),
            PermMode::Str(value) => value.clone(),
        };

        validate(&text)?;
        let bits = to_bits(&text)?;

        Ok(Some(Self { text, bits }))
    }

    /// Capture live permission bits of a local file or directory.
    ///
    /// The owner heuristic of [`Permission::parse`] does not apply here, the
    /// file already has the mode it has.
    ///
    /// # Errors
    ///
    /// - Return [`PermissionError::Capture`] if the path cannot be stat'ed.
    pub fn capture(path: impl AsRef<Path>) -> Result<Self> {
        let metadata =
            std::fs::metadata(path.as_ref()).map_err(|err| PermissionError::Capture {
                source: err,
                path: path.as_ref().to_path_buf(),
            })?;

        Ok(Self::from_bits(mode_bits(&metadata)))
    }

    /// Construct permission from raw mode bits.
    pub fn from_bits(bits: u32) -> Self {
        let bits = bits & 0o7777;
        Self {
            text: format!("0{bits:03o}"),
            bits,
        }
    }

    /// Default permission applied to newly created directories.
    pub fn directory_default() -> Self {
        Self::from_bits(0o755)
    }

    /// Mode bits.
    pub fn mode(&self) -> u32 {
        self.bits
    }

    /// Canonical octal text.
    pub fn as_str(&self) -> &str {
        self.text.as_str()
    }
}

impl FromStr for Permission {
    type Err = PermissionError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        Self::parse(&PermMode::Str(data.to_owned()))?
            .ok_or(PermissionError::Empty)
    }
}

impl Display for Permission {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

/// Choose permission to apply to a destination.
///
/// Declared permission wins over captured permission. Returns [`None`] if
/// neither exists, meaning that permissioning should be skipped entirely.
pub fn effective<'a>(
    declared: Option<&'a Permission>,
    captured: Option<&'a Permission>,
) -> Option<&'a Permission> {
    declared.or(captured)
}

fn validate(text: &str) -> Result<()> {
    for (index, character) in text.chars().enumerate() {
        let digit = character.to_digit(10).ok_or_else(|| PermissionError::Parse {
            value: text.to_owned(),
            character,
        })?;

        // INVARIANT: Catch decimal written where octal was meant, e.g., 644 -> 01204.
        if index == 1 && digit < 4 {
            return Err(PermissionError::UnconventionalOwner(text.to_owned()));
        }

        if digit > 7 {
            return Err(PermissionError::NotOctal(text.to_owned()));
        }
    }

    if text.chars().count() < 2 {
        return Err(PermissionError::MissingOwner(text.to_owned()));
    }

    Ok(())
}

fn to_bits(text: &str) -> Result<u32> {
    u32::from_str_radix(text, 8).map_err(|_| PermissionError::OutOfRange(text.to_owned()))
}

#[cfg(unix)]
fn mode_bits(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn mode_bits(metadata: &std::fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

/// Permission error types.
#[derive(Debug, thiserror::Error)]
pub enum PermissionError {
    /// Integer permission is below zero.
    #[error("invalid permission {0}: must be a positive value")]
    Negative(i64),

    /// Integer permission is zero, which reads like an unset value.
    #[error("invalid nil permission")]
    Zero,

    /// Permission contains something other than digits.
    #[error("failed to parse permission {value:?}: unexpected character {character:?}")]
    Parse { value: String, character: char },

    /// Permission text is empty.
    #[error("permission is empty")]
    Empty,

    /// Permission contains digits above 7.
    #[error("invalid permission {0}: octal value can't have numbers over 7")]
    NotOctal(String),

    /// Owner digit grants less than read access.
    #[error("invalid permission {0}: owner would have unconventional access")]
    UnconventionalOwner(String),

    /// Permission is too short to carry an owner digit.
    #[error("invalid permission {0}: missing owner digit")]
    MissingOwner(String),

    /// Permission does not fit into mode bits.
    #[error("invalid permission {0}: value out of range")]
    OutOfRange(String),

    /// Local file mode cannot be read.
    #[error("failed to capture permission of {:?}", path.display())]
    Capture {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = PermissionError> = std::result::Result<T, E>;
