//! `sidecar config` — Configuration management commands.

use std::path::Path;

pub async fn validate(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match super::load_config(config_path) {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let mut warnings = Vec::new();

            if !config.has_api_key() {
                warnings.push("No API key set (set SIDECAR_API_KEY, OPENROUTER_API_KEY or OPENAI_API_KEY)".to_string());
            }

            if config.addons.is_empty() {
                warnings.push("No add-ons declared".to_string());
            }

            for addon in &config.addons {
                if addon.prompt.trim().is_empty() {
                    warnings.push(format!("Add-on '{}' has an empty prompt", addon.id));
                }
                if let Some(provider) = &addon.provider
                    && !config.providers.contains_key(provider)
                    && provider != &config.default_provider
                {
                    warnings.push(format!(
                        "Add-on '{}' uses provider '{provider}' which has no [providers] entry",
                        addon.id
                    ));
                }
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Provider:  {}", config.default_provider);
            println!("   Model:     {}", config.default_model);
            println!("   Timeout:   {}s", config.request_timeout_secs);
            println!(
                "   Add-ons:   {} ({} enabled)",
                config.addons.len(),
                config.addons.iter().filter(|a| a.enabled).count()
            );
        }
        Err(e) => {
            println!("   ❌ {e}");
            return Err(e);
        }
    }

    Ok(())
}

pub async fn show(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;
    config.api_key = config.api_key.map(|_| "[REDACTED]".into());
    for provider in config.providers.values_mut() {
        provider.api_key = provider.api_key.take().map(|_| "[REDACTED]".into());
    }
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", super::config_file(config_path).display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::config_file;
    use std::path::Path;

    #[test]
    fn config_path_is_valid() {
        let path = config_file(None);
        assert!(path.to_str().unwrap().contains("config.toml"));
        assert_eq!(config_file(Some(Path::new("/tmp/x.toml"))), Path::new("/tmp/x.toml"));
    }
}
