use anyhow::{Context, Result};
use pantry_chef::cli::{parse_args, read_pantry_file, Command};
use pantry_chef::config::PipelineConfig;
use pantry_chef::{PipelineError, Recipe, RecipePipeline};
use tokio::fs;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pantry_chef=info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn print_recipes(recipes: &[Recipe]) -> Result<()> {
    let json = serde_json::to_string_pretty(recipes).context("Failed to serialize recipes")?;
    println!("{}", json);
    Ok(())
}

/// Attach the user-facing message so the CLI reports the same text an app would show.
fn user_facing(err: PipelineError) -> anyhow::Error {
    let message = err.user_message();
    anyhow::Error::new(err).context(message)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = parse_args();
    let config = PipelineConfig::from_env().context("Invalid configuration")?;
    let pipeline =
        RecipePipeline::from_config(&config).context("Failed to set up the model provider")?;

    match cli.command {
        Command::Generate {
            mut ingredients,
            pantry_file,
        } => {
            if let Some(path) = pantry_file {
                ingredients.extend(read_pantry_file(&path).await?);
            }
            let recipes = pipeline.generate(&ingredients).await.map_err(user_facing)?;
            print_recipes(&recipes)?;
        }
        Command::Scan { image, generate } => {
            let bytes = fs::read(&image)
                .await
                .with_context(|| format!("Failed to read image '{}'", image.display()))?;
            let found = pipeline.extract_from_image(&bytes).await.map_err(user_facing)?;
            let names = found.display_names();
            eprintln!("Found ingredients: {}", names.join(", "));

            if generate {
                let recipes = pipeline.generate(&names).await.map_err(user_facing)?;
                print_recipes(&recipes)?;
            } else {
                println!("{}", serde_json::to_string_pretty(&names)?);
            }
        }
    }

    tracing::debug!(stats = ?pipeline.cache_stats(), "Done");
    Ok(())
}
