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

use std::{fs, path::Path};

use tinyjson::JsonValue;
use tracing::info;

use crate::Result;

pub fn load_file(path: &Path) -> Result<String> {
    Ok(fs::read_to_string(path)?)
}

/// Write `st` to `path`, creating parent directories as needed.
pub fn save_file(path: &Path, st: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(fs::write(path, st)?)
}

/// Parse a JSON document from `path`.
pub fn load_json_file(path: &Path) -> Result<JsonValue> {
    Ok(load_file(path)?.parse()?)
}

pub fn save_json_file(path: &Path, value: &JsonValue, pretty: bool) -> Result<()> {
    let st = if pretty { value.format()? } else { value.stringify()? };
    save_file(path, &st)
}

/// Write the default configuration to `path` unless a file is already
/// there.
pub fn spawn_config(path: &Path, contents: &str) -> Result<()> {
    if path.exists() {
        return Ok(())
    }

    save_file(path, contents)?;
    info!(target: "wasmdeploy::util", "Created default config file in {path:?}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn json_roundtrip_creates_dirs() {
        let dir = TempDir::new("wasmdeploy").unwrap();
        let path = dir.path().join("nested/state.json");

        let value: JsonValue = r#"{"a":[1,2,{"b":null}]}"#.parse().unwrap();
        save_json_file(&path, &value, true).unwrap();
        assert_eq!(load_json_file(&path).unwrap(), value);
    }

    #[test]
    fn spawn_config_keeps_existing() {
        let dir = TempDir::new("wasmdeploy").unwrap();
        let path = dir.path().join("cfg.toml");

        spawn_config(&path, "a = 1\n").unwrap();
        spawn_config(&path, "a = 2\n").unwrap();
        assert_eq!(load_file(&path).unwrap(), "a = 1\n");
    }
}
