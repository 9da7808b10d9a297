//! Config command implementation.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};

use beetroot_core::config::{Config, NotificationPermission};

use super::{ConfigAction, ConfigArgs};
use crate::ui::{format_duration, parse_duration};

/// Keys understood by `get` and `set`.
const KEYS: &[(&str, &str)] = &[
    ("device_name", "Name placed in offers and answers"),
    ("output_dir", "Directory for received files"),
    ("chunk_size", "Bytes per binary chunk"),
    ("buffered_high_water", "Buffered bytes above which sending pauses"),
    ("throttle_backoff", "Pause before re-checking a full buffer"),
    ("disconnect_grace", "How long a dropped connection may take to return"),
    ("bind_address", "Address the initiator listens on"),
    ("advertise", "Comma-separated addresses advertised in offers"),
    ("hello_timeout", "How long to wait for the peer's hello"),
    ("channel_label", "Label of the data channel"),
    ("strip_marker", "Lines containing this are removed from signals"),
    ("notifications", "granted, denied or prompt"),
];

/// Run the config command.
pub fn run(args: ConfigArgs, path: Option<&Path>) -> Result<()> {
    let file = super::config_file(path);

    match args.action {
        ConfigAction::Get { key } => {
            let config = super::load_config(path)?;
            match get_config_value(&config, &key) {
                Some(v) => println!("{}: {}", key, v),
                None => println!("Unknown configuration key: {}", key),
            }
        }

        ConfigAction::Set { key, value } => {
            let mut config = super::load_config(path)?;
            if set_config_value(&mut config, &key, &value)? {
                config.validate()?;
                config.save_to(&file)?;
                println!("Set {} = {}", key, value);
            } else {
                println!("Unknown configuration key: {}", key);
            }
        }

        ConfigAction::Show => {
            let config = super::load_config(path)?;
            println!();
            println!("Beetroot Configuration");
            println!("{}", "─".repeat(50));
            println!();
            for (key, _) in KEYS {
                if let Some(value) = get_config_value(&config, key) {
                    println!("  {key} = {value}");
                }
            }
            println!();
        }

        ConfigAction::List => {
            for (key, help) in KEYS {
                println!("  {key:<22} {help}");
            }
        }

        ConfigAction::Path => println!("{}", file.display()),

        ConfigAction::Reset => {
            Config::default().save_to(&file)?;
            println!("Configuration reset to defaults.");
        }
    }

    Ok(())
}

fn get_config_value(config: &Config, key: &str) -> Option<String> {
    match key {
        "device_name" => Some(config.general.device_name.clone()),
        "output_dir" => Some(
            config
                .general
                .output_dir
                .as_ref()
                .map_or_else(|| "(current directory)".to_string(), |p| p.display().to_string()),
        ),
        "chunk_size" => Some(config.transfer.chunk_size.to_string()),
        "buffered_high_water" => Some(config.transfer.buffered_high_water.to_string()),
        "throttle_backoff" => Some(format_duration(config.transfer.throttle_backoff)),
        "disconnect_grace" => Some(format_duration(config.connection.disconnect_grace)),
        "bind_address" => Some(config.connection.bind_address.clone()),
        "advertise" => Some(
            config
                .connection
                .advertise
                .as_ref()
                .map_or_else(|| "(auto)".to_string(), |hosts| hosts.join(",")),
        ),
        "hello_timeout" => Some(format_duration(config.connection.hello_timeout)),
        "channel_label" => Some(config.signaling.channel_label.clone()),
        "strip_marker" => Some(config.signaling.strip_marker.clone()),
        "notifications" => Some(permission_name(config.notifications.permission).to_string()),
        _ => None,
    }
}

fn set_config_value(config: &mut Config, key: &str, value: &str) -> Result<bool> {
    match key {
        "device_name" => config.general.device_name = value.to_string(),
        "output_dir" => {
            config.general.output_dir = (!value.is_empty()).then(|| PathBuf::from(value));
        }
        "chunk_size" => config.transfer.chunk_size = value.parse()?,
        "buffered_high_water" => config.transfer.buffered_high_water = value.parse()?,
        "throttle_backoff" => config.transfer.throttle_backoff = duration(value)?,
        "disconnect_grace" => config.connection.disconnect_grace = duration(value)?,
        "bind_address" => config.connection.bind_address = value.to_string(),
        "advertise" => {
            let hosts: Vec<String> = value
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(String::from)
                .collect();
            config.connection.advertise = (!hosts.is_empty()).then_some(hosts);
        }
        "hello_timeout" => config.connection.hello_timeout = duration(value)?,
        "channel_label" => config.signaling.channel_label = value.to_string(),
        "strip_marker" => config.signaling.strip_marker = value.to_string(),
        "notifications" => config.notifications.permission = permission(value)?,
        _ => return Ok(false),
    }
    Ok(true)
}

fn duration(value: &str) -> Result<std::time::Duration> {
    parse_duration(value).ok_or_else(|| anyhow!("invalid duration '{value}' (try 5s or 100ms)"))
}

const fn permission_name(permission: NotificationPermission) -> &'static str {
    match permission {
        NotificationPermission::Granted => "granted",
        NotificationPermission::Denied => "denied",
        NotificationPermission::Prompt => "prompt",
    }
}

fn permission(value: &str) -> Result<NotificationPermission> {
    match value.to_lowercase().as_str() {
        "granted" => Ok(NotificationPermission::Granted),
        "denied" => Ok(NotificationPermission::Denied),
        "prompt" => Ok(NotificationPermission::Prompt),
        other => bail!("invalid notification permission '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_every_key_round_trips_through_get() {
        let config = Config::default();
        for (key, _) in KEYS {
            assert!(get_config_value(&config, key).is_some(), "{key}");
        }
        assert!(get_config_value(&config, "nope").is_none());
    }

    #[test]
    fn test_set_config_value() {
        let mut config = Config::default();
        assert!(set_config_value(&mut config, "chunk_size", "1024").unwrap());
        assert_eq!(config.transfer.chunk_size, 1024);

        assert!(set_config_value(&mut config, "disconnect_grace", "10s").unwrap());
        assert_eq!(config.connection.disconnect_grace, Duration::from_secs(10));

        assert!(set_config_value(&mut config, "advertise", "10.0.0.2, 127.0.0.1").unwrap());
        assert_eq!(
            config.connection.advertise,
            Some(vec!["10.0.0.2".to_string(), "127.0.0.1".to_string()])
        );
        assert!(set_config_value(&mut config, "advertise", "").unwrap());
        assert!(config.connection.advertise.is_none());

        assert!(set_config_value(&mut config, "notifications", "Granted").unwrap());
        assert!(config.notifications.permission.is_granted());

        assert!(!set_config_value(&mut config, "unknown", "x").unwrap());
        assert!(set_config_value(&mut config, "chunk_size", "lots").is_err());
        assert!(set_config_value(&mut config, "hello_timeout", "soon").is_err());
    }

    #[test]
    fn test_set_persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        run(
            ConfigArgs {
                action: ConfigAction::Set {
                    key: "device_name".to_string(),
                    value: "desk".to_string(),
                },
            },
            Some(&path),
        )
        .unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.general.device_name, "desk");
    }
}
