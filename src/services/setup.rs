use crate::core::config::Config;
use anyhow::Result;
#[cfg(not(target_arch = "wasm32"))]
use inquire::{validator::Validation, CustomType, Text};

#[cfg(target_arch = "wasm32")]
pub async fn run_setup(_config: &mut Config) -> Result<()> {
    Ok(())
}

/// Fills in whatever `config.yml` is missing and saves it.
#[cfg(not(target_arch = "wasm32"))]
pub async fn run_setup(config: &mut Config) -> Result<()> {
    let mut needs_save = false;

    if config.backend_endpoint.trim().is_empty() {
        if config.unattended {
            anyhow::bail!("backend_endpoint is missing from config.yml");
        }
        println!("No story backend configured yet.");
        config.backend_endpoint = Text::new("Backend endpoint:")
            .with_placeholder("http://localhost:3000")
            .with_validator(|input: &str| {
                Ok(match url::Url::parse(input.trim()) {
                    Ok(_) => Validation::Valid,
                    Err(e) => Validation::Invalid(format!("Not a valid URL: {}", e).into()),
                })
            })
            .prompt()?
            .trim()
            .to_string();
        needs_save = true;
    }

    if config.quiz_size == 0 {
        config.quiz_size = CustomType::<usize>::new("Questions per quiz:")
            .with_default(crate::services::quiz::DEFAULT_QUIZ_SIZE)
            .prompt()?;
        needs_save = true;
    }

    if needs_save {
        config.save()?;
        println!("Configuration saved.");
    }

    Ok(())
}
