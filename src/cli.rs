use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate recipes from ingredients on hand
    Generate {
        /// Ingredient to cook with (repeatable)
        #[arg(short, long = "ingredient")]
        ingredients: Vec<String>,

        /// File with one ingredient per line; '#' starts a comment
        #[arg(short, long)]
        pantry_file: Option<PathBuf>,
    },
    /// Identify ingredients in a photo
    Scan {
        /// Path to the image
        #[arg(short, long)]
        image: PathBuf,

        /// Also generate recipes from what was found
        #[arg(short, long)]
        generate: bool,
    },
}

pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Parse pantry file contents: one item per line, blank lines and `#` comments
/// ignored.
pub fn parse_pantry(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub async fn read_pantry_file(path: &Path) -> Result<Vec<String>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read pantry file '{}'", path.display()))?;
    Ok(parse_pantry(&contents))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_generate_args() {
        let cli = Cli::parse_from(["pantry-chef", "generate", "-i", "egg", "--ingredient", "milk"]);
        match cli.command {
            Command::Generate {
                ingredients,
                pantry_file,
            } => {
                assert_eq!(ingredients, vec!["egg", "milk"]);
                assert!(pantry_file.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_scan_args() {
        let cli = Cli::parse_from(["pantry-chef", "scan", "--image", "fridge.jpg", "--generate"]);
        assert!(matches!(cli.command, Command::Scan { generate: true, .. }));
    }

    #[test]
    fn test_parse_pantry_skips_comments() {
        let items = parse_pantry("# staples\nflour\n\n  rice  # long grain\n#eggs\n");
        assert_eq!(items, vec!["flour", "rice"]);
    }

    #[tokio::test]
    async fn test_read_pantry_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Carrot\nonion").unwrap();
        let items = read_pantry_file(file.path()).await.unwrap();
        assert_eq!(items, vec!["Carrot", "onion"]);
    }

    #[tokio::test]
    async fn test_missing_pantry_file_has_context() {
        let err = read_pantry_file(Path::new("/definitely/not/here.txt"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read pantry file"));
    }
}
