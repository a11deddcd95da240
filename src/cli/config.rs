use crate::config::generate::generate_starter_config;
use crate::config::{user_config_path, SYSTEM_CONFIG_PATH};
use std::fs;
use std::path::PathBuf;

pub fn init(stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_content = generate_starter_config();

    if stdout {
        print!("{}", config_content);
        return Ok(());
    }

    // Prefer the per-user location, fall back to the system one.
    let config_path = match user_config_path() {
        Some(user_config) => match user_config.parent().map(fs::create_dir_all) {
            Some(Ok(())) => user_config,
            _ => {
                eprintln!("Warning: could not create {}", user_config.display());
                eprintln!("Falling back to {}", SYSTEM_CONFIG_PATH);
                PathBuf::from(SYSTEM_CONFIG_PATH)
            }
        },
        None => PathBuf::from(SYSTEM_CONFIG_PATH),
    };

    if config_path.exists() {
        return Err(format!(
            "config file already exists at {}. Remove it first or use --stdout.",
            config_path.display()
        )
        .into());
    }

    fs::write(&config_path, config_content)
        .map_err(|e| format!("failed to write {}: {}", config_path.display(), e))?;

    println!("Config written to {}", config_path.display());
    Ok(())
}
