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

//! Bookkeeping of deployed artifacts.
//!
//! An artifact is created the first time store or instantiate succeeds
//! for a logical name and is updated in place afterwards. The registry
//! can be persisted as JSON so a deployment script picks up where its
//! last successful step left off.

use std::{collections::HashMap, fmt, path::Path};

use tinyjson::JsonValue;
use tracing::{debug, warn};

use crate::{
    util::file::{load_json_file, save_json_file},
    Error, Result,
};

/// What is known about one logical contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeployedArtifact {
    pub logical_name: String,
    code_id: Option<u64>,
    address: Option<String>,
    /// Code the recorded instance was created from
    instance_code_id: Option<u64>,
}

/// Progress of an artifact through the deployment lifecycle
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArtifactStage {
    Unknown,
    CodeStored(u64),
    Instantiated(u64, String),
}

impl fmt::Display for ArtifactStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::CodeStored(id) => write!(f, "stored (code id {id})"),
            Self::Instantiated(id, addr) => write!(f, "instantiated (code id {id}) at {addr}"),
        }
    }
}

impl DeployedArtifact {
    pub fn new(logical_name: &str) -> Self {
        Self {
            logical_name: logical_name.to_string(),
            code_id: None,
            address: None,
            instance_code_id: None,
        }
    }

    pub fn code_id(&self) -> Option<u64> {
        self.code_id
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn instance_code_id(&self) -> Option<u64> {
        self.instance_code_id
    }

    /// An instance is reported with the code it runs, which may be older
    /// than the latest stored code.
    pub fn stage(&self) -> ArtifactStage {
        match (self.code_id, self.instance_code_id, &self.address) {
            (_, Some(id), Some(addr)) => ArtifactStage::Instantiated(id, addr.clone()),
            (Some(id), _, _) => ArtifactStage::CodeStored(id),
            _ => ArtifactStage::Unknown,
        }
    }

    /// Record newly stored code. An existing instance stays on record
    /// until it is replaced by a new instantiation.
    pub fn set_code_id(&mut self, code_id: u64) {
        if let (Some(old), Some(addr)) = (self.instance_code_id, &self.address) {
            if old != code_id {
                debug!(
                    target: "wasmdeploy::registry",
                    "Artifact \"{}\" re-stored as code {code_id}, instance {addr} runs code {old}",
                    self.logical_name,
                );
            }
        }
        self.code_id = Some(code_id);
    }

    /// Record a fresh instance created from `code_id`.
    pub fn set_instance(&mut self, code_id: u64, address: &str) {
        if let Some(old) = &self.address {
            warn!(
                target: "wasmdeploy::registry",
                "Artifact \"{}\" re-instantiated, replacing {old} with {address}",
                self.logical_name,
            );
        }
        self.code_id = Some(code_id);
        self.instance_code_id = Some(code_id);
        self.address = Some(address.to_string());
    }

    fn to_json(&self) -> JsonValue {
        let mut map = HashMap::new();
        if let Some(id) = self.code_id {
            map.insert("code_id".to_string(), JsonValue::Number(id as f64));
        }
        if let Some(addr) = &self.address {
            map.insert("address".to_string(), JsonValue::String(addr.clone()));
        }
        if let Some(id) = self.instance_code_id {
            map.insert("instance_code_id".to_string(), JsonValue::Number(id as f64));
        }
        JsonValue::Object(map)
    }

    fn from_json(name: &str, value: &JsonValue) -> Result<Self> {
        let Some(map) = value.get::<HashMap<String, JsonValue>>() else {
            return Err(Error::ParseFailed("Registry entry is not an object"))
        };

        let code_id = match map.get("code_id") {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::Number(n)) if *n >= 0.0 && n.fract() == 0.0 => Some(*n as u64),
            Some(_) => return Err(Error::ParseFailed("Invalid code_id in registry entry")),
        };

        let instance_code_id = match map.get("instance_code_id") {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::Number(n)) if *n >= 0.0 && n.fract() == 0.0 => Some(*n as u64),
            Some(_) => {
                return Err(Error::ParseFailed("Invalid instance_code_id in registry entry"))
            }
        };

        let address = match map.get("address") {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::String(s)) => Some(s.clone()),
            Some(_) => return Err(Error::ParseFailed("Invalid address in registry entry")),
        };

        if address.is_some() && code_id.is_none() {
            return Err(Error::ParseFailed("Registry entry has an address but no code_id"))
        }

        // Entries written before instance tracking ran the recorded code
        let instance_code_id = address.as_ref().and(instance_code_id.or(code_id));

        Ok(Self { logical_name: name.to_string(), code_id, address, instance_code_id })
    }
}

/// Map of logical contract names to their artifacts
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArtifactRegistry {
    artifacts: HashMap<String, DeployedArtifact>,
}

impl ArtifactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&DeployedArtifact> {
        self.artifacts.get(name)
    }

    /// Fetch an artifact for update, creating it if missing.
    pub fn entry(&mut self, name: &str) -> &mut DeployedArtifact {
        self.artifacts.entry(name.to_string()).or_insert_with(|| DeployedArtifact::new(name))
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// All artifacts, sorted by name
    pub fn artifacts(&self) -> Vec<DeployedArtifact> {
        let mut ret: Vec<DeployedArtifact> = self.artifacts.values().cloned().collect();
        ret.sort_by(|a, b| a.logical_name.cmp(&b.logical_name));
        ret
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(self.artifacts.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
    }

    pub fn from_json(value: &JsonValue) -> Result<Self> {
        let Some(map) = value.get::<HashMap<String, JsonValue>>() else {
            return Err(Error::ParseFailed("Registry is not a JSON object"))
        };

        let mut artifacts = HashMap::new();
        for (name, entry) in map {
            artifacts.insert(name.clone(), DeployedArtifact::from_json(name, entry)?);
        }

        Ok(Self { artifacts })
    }

    /// Load a registry from `path`. A missing file yields an empty
    /// registry.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(target: "wasmdeploy::registry", "No registry at {path:?}, starting empty");
            return Ok(Self::new())
        }

        Self::from_json(&load_json_file(path)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        debug!(target: "wasmdeploy::registry", "Saving {} artifacts to {path:?}", self.len());
        save_json_file(path, &self.to_json(), true)
    }
}
