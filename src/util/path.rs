/* This file is part of DarkFi (https://dark.fi)
 *
 * Copyright (C) 2020-2025 Dyne.org foundation
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use std::{
    env,
    ffi::OsString,
    path::{Path, PathBuf},
};

use crate::{Error, Result};

/// Directory name under the config dir holding our files
const CONFIG_SUBDIR: &str = "wasmdeploy";

/// Returns `$HOME`, or `None` when unset or empty.
pub fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME").filter(|h| !h.is_empty()).map(PathBuf::from)
}

/// Returns `$XDG_CONFIG_HOME`, `$HOME/.config`, or `None`.
pub fn config_dir() -> Option<PathBuf> {
    env::var_os("XDG_CONFIG_HOME")
        .and_then(is_absolute_path)
        .or_else(|| home_dir().map(|h| h.join(".config")))
}

fn is_absolute_path(path: OsString) -> Option<PathBuf> {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        Some(path)
    } else {
        None
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_path(path: &str) -> Result<PathBuf> {
    let Some(rest) = path.strip_prefix('~') else { return Ok(PathBuf::from(path)) };

    // `~user` forms are not supported
    if !rest.is_empty() && !rest.starts_with('/') {
        return Ok(PathBuf::from(path))
    }

    let Some(homedir) = home_dir() else {
        return Err(Error::ConfigError("Could not fetch path for home directory".to_string()))
    };

    match rest.strip_prefix('/') {
        Some(remains) if !remains.is_empty() => Ok(homedir.join(remains)),
        _ => Ok(homedir),
    }
}

/// Join a path with `config_dir()/wasmdeploy`.
pub fn join_config_path(file: &Path) -> Result<PathBuf> {
    let mut path = PathBuf::new();

    if let Some(v) = config_dir() {
        path.push(v);
    }

    path.push(CONFIG_SUBDIR);
    path.push(file);

    Ok(path)
}

/// Use the given path if any, otherwise the fallback file name inside
/// the config dir.
pub fn get_config_path(arg: Option<String>, fallback: &str) -> Result<PathBuf> {
    match arg {
        Some(a) => expand_path(&a),
        None => join_config_path(&PathBuf::from(fallback)),
    }
}
