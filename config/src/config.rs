// Copyright 2021 The Umbra Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration file management

use std::env;
use std::fs::File;
use std::io::prelude::*;
use std::path::PathBuf;

use crate::types::ConfigError;
use umbra_servers::ServerConfig;
use umbra_util::LoggingConfig;

/// The default file name to use when trying to derive the config file
/// location
pub const CONFIG_FILE_NAME: &str = "umbra-server.toml";
const UMBRA_HOME: &str = ".umbra";

/// Returns the defaults, as strewn throughout the code
impl Default for GlobalConfig {
	fn default() -> GlobalConfig {
		GlobalConfig {
			config_file_path: None,
			server: ServerConfig::default(),
			logging: Some(LoggingConfig::default()),
		}
	}
}

/// Going to hold all of the various configuration types separately for
/// now, then put them together as a single ServerConfig object
/// afterwards. This is to flatten out the configuration file into logical
/// sections, as they tend to be quite nested in the code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
	/// Keep track of the file we've read
	#[serde(skip)]
	pub config_file_path: Option<PathBuf>,
	/// Server config
	#[serde(default)]
	pub server: ServerConfig,
	/// Logging config
	pub logging: Option<LoggingConfig>,
}

fn get_umbra_path() -> Result<PathBuf, ConfigError> {
	let mut umbra_path = match dirs::home_dir() {
		Some(p) => p,
		None => PathBuf::new(),
	};
	umbra_path.push(UMBRA_HOME);
	Ok(umbra_path)
}

fn check_config_current_dir(path: &str) -> Option<PathBuf> {
	let p = env::current_dir();
	let mut c = match p {
		Ok(c) => c,
		Err(_) => return None,
	};
	c.push(path);
	if c.exists() {
		return Some(c);
	}
	None
}

/// Whether a configuration file exists in one of the default locations.
pub fn config_file_exists() -> bool {
	if check_config_current_dir(CONFIG_FILE_NAME).is_some() {
		return true;
	}
	match get_umbra_path() {
		Ok(mut p) => {
			p.push(CONFIG_FILE_NAME);
			p.exists()
		}
		Err(_) => false,
	}
}

/// Handles setup and detection of paths for the server config. Use a
/// config file in the current directory if there is one, then try the
/// home directory, and fall back to the defaults otherwise.
pub fn initial_setup_server(
	config_path: Option<&str>,
) -> Result<GlobalConfig, ConfigError> {
	if let Some(path) = config_path {
		return GlobalConfig::new(path);
	}

	if let Some(p) = check_config_current_dir(CONFIG_FILE_NAME) {
		return GlobalConfig::new(p.to_str().unwrap());
	}

	let mut path = get_umbra_path()?;
	path.push(CONFIG_FILE_NAME);
	if path.exists() {
		return GlobalConfig::new(path.to_str().unwrap());
	}

	Ok(GlobalConfig::default())
}

impl GlobalConfig {
	/// Requires the path to a config file
	pub fn new(file_path: &str) -> Result<GlobalConfig, ConfigError> {
		let mut return_value = GlobalConfig::default();
		return_value.config_file_path = Some(PathBuf::from(&file_path));

		// Config file path is given but not valid
		let config_file = return_value.config_file_path.clone().unwrap();
		if !config_file.exists() {
			return Err(ConfigError::FileNotFoundError(String::from(
				config_file.to_str().unwrap(),
			)));
		}

		// Try to parse the config file if it exists, explode if it does
		// exist but something's wrong with it
		return_value.read_config()
	}

	/// Read config
	fn read_config(self) -> Result<GlobalConfig, ConfigError> {
		let config_file_path = self.config_file_path.as_ref().unwrap();
		let mut file = File::open(config_file_path)?;
		let mut contents = String::new();
		file.read_to_string(&mut contents)?;
		let fixed_path = self.config_file_path.clone();
		let decoded: Result<GlobalConfig, toml::de::Error> = toml::from_str(&contents);
		match decoded {
			Ok(mut gc) => {
				gc.config_file_path = fixed_path;
				if gc.logging.is_none() {
					gc.logging = Some(LoggingConfig::default());
				}
				Ok(gc)
			}
			Err(e) => Err(ConfigError::ParseError(
				String::from(config_file_path.to_str().unwrap()),
				format!("{}", e),
			)),
		}
	}

	/// Serialize config
	pub fn ser_config(&self) -> Result<String, ConfigError> {
		toml::to_string(self).map_err(|e| ConfigError::SerializationError(format!("{}", e)))
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use umbra_servers::PolicyConfig;

	#[test]
	fn read_config_with_policy_overrides() {
		let toml_str = r#"
			[server]
			chain_type = "Regtest"

			[server.p2p_config]
			host = "127.0.0.1"
			port = 9119

			[server.policy_config]
			rpc_failure_banscore = 50
			orphan_ttl_secs = 120
		"#;

		let decoded: GlobalConfig = toml::from_str(toml_str).unwrap();
		assert_eq!(decoded.server.p2p_config.port, 9119);
		assert_eq!(decoded.server.policy_config.orphan_ttl_secs, 120);
		// unspecified policy values fall back to the defaults
		assert_eq!(
			decoded.server.policy_config.rule_violation_banscore,
			PolicyConfig::default().rule_violation_banscore
		);
	}

	#[test]
	fn default_config_serializes() {
		let config = GlobalConfig::default();
		let ser = config.ser_config().unwrap();
		assert!(ser.contains("p2p_config"));
	}
}
