use card_image_core::{
    CardImageCache, CardKey, CardView, CacheSettings, ImageRequest, StorageMode, pipeline,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Parser)]
#[command(name = "card-image-cli")]
#[command(about = "Inspect and warm the local card image cache")]
struct Cli {
    /// Settings file (defaults to the per-user config location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override the image root directory
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Read images from per-set zip containers
    #[arg(long, global = true)]
    archive: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a cache key and print its fields
    Decode {
        key: String,
    },
    /// Build the cache key for a card
    Encode {
        #[arg(long)]
        name: String,
        #[arg(long)]
        set: String,
        #[arg(long = "type", default_value = "0")]
        card_type: i32,
        /// Collector number; leave empty for tokens
        #[arg(long, default_value = "")]
        number: String,
        #[arg(long)]
        token_set: Option<String>,
        #[arg(long)]
        descriptor: Option<String>,
        #[arg(long)]
        various_art: bool,
        #[arg(long)]
        thumb: bool,
    },
    /// Load the full image of a card
    Load {
        #[arg(long)]
        name: String,
        #[arg(long)]
        set: String,
        /// Collector number, needed for cards printed with several arts
        #[arg(long)]
        number: Option<String>,
        /// Look the card up as a token
        #[arg(long)]
        token: bool,
        /// Write the decoded image to this file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Get the thumbnail of a card, creating it if needed
    Thumb {
        #[arg(long)]
        name: String,
        #[arg(long)]
        set: String,
        #[arg(long)]
        number: Option<String>,
        #[arg(long)]
        token: bool,
    },
    /// Load many cards of a set concurrently and print cache statistics
    Warm {
        #[arg(long)]
        set: String,
        /// Card names to load
        #[arg(long, num_args = 1..)]
        names: Vec<String>,
        /// Load thumbnails instead of full images
        #[arg(long)]
        thumb: bool,
    },
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            // Example: RUST_LOG=card_image_core::cache=debug
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "card_image_core=info,card_image_cli=info".into()),
        )
        .init();
}

fn load_settings(cli: &Cli) -> Result<CacheSettings, Box<dyn std::error::Error>> {
    let path = cli.config.clone().unwrap_or_else(CacheSettings::default_path);
    let mut settings = CacheSettings::load(&path)?;
    if let Some(root) = &cli.root {
        settings.image_root = root.clone();
    }
    if cli.archive {
        settings.storage_mode = StorageMode::Archive;
    }
    debug!(?settings, "Effective cache settings");
    Ok(settings)
}

/// Any non-zero collector number marks a regular card; it only shows up in image
/// paths for cards with several arts.
const DEFAULT_COLLECTOR_NUMBER: &str = "1";

fn card_from_args(name: &str, set: &str, number: Option<&str>, token: bool) -> CardView {
    if token {
        return CardView::token(name, set);
    }
    match number {
        Some(number) => CardView::new(name, set, number).with_various_art(),
        None => CardView::new(name, set, DEFAULT_COLLECTOR_NUMBER),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Decode { key } => match CardKey::parse(key) {
            Ok(parsed) => {
                println!("name:              {}", parsed.name);
                println!("set code:          {}", parsed.set_code);
                println!("card type:         {}", parsed.card_type);
                println!("collector id:      {}", parsed.collector_id);
                println!("token set code:    {}", parsed.token_set_code);
                println!("token descriptor:  {}", parsed.token_descriptor);
                println!("uses various art:  {}", parsed.uses_various_art);
                println!("thumbnail:         {}", parsed.thumbnail);
                println!("size:              {}", parsed.size_param.as_deref().unwrap_or("-"));
                println!("token:             {}", parsed.is_token());
            }
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        },
        Commands::Encode {
            name,
            set,
            card_type,
            number,
            token_set,
            descriptor,
            various_art,
            thumb,
        } => {
            let card = CardView {
                name: name.clone(),
                expansion_set_code: set.clone(),
                card_type: *card_type,
                card_number: number.clone(),
                token_set_code: token_set.clone(),
                token_descriptor: descriptor.clone(),
                uses_various_art: *various_art,
                ..Default::default()
            };
            let request = if *thumb {
                ImageRequest::Thumbnail
            } else {
                ImageRequest::Original
            };
            println!("{}", CardKey::for_card(&card, name, &request));
        }
        Commands::Load {
            name,
            set,
            number,
            token,
            out,
        } => {
            let cache = CardImageCache::new(&load_settings(&cli)?);
            let card = card_from_args(name, set, number.as_deref(), *token);

            let Some(image) = cache.get_original(&card) else {
                eprintln!("No image found for '{}' ({})", name, set);
                std::process::exit(1);
            };
            println!("Loaded '{}' ({}): {}x{}", name, set, image.width(), image.height());

            if let Some(out) = out {
                let bytes = pipeline::encode_for_storage(&image)?;
                std::fs::write(out, bytes)?;
                println!("Image saved to: {}", out.display());
            }
        }
        Commands::Thumb {
            name,
            set,
            number,
            token,
        } => {
            let cache = CardImageCache::new(&load_settings(&cli)?);
            let card = card_from_args(name, set, number.as_deref(), *token);

            match cache.get_thumbnail(&card) {
                Some(thumbnail) => {
                    println!(
                        "Thumbnail for '{}' ({}): {}x{}",
                        name,
                        set,
                        thumbnail.width(),
                        thumbnail.height()
                    );
                }
                None => {
                    eprintln!("No image found for '{}' ({})", name, set);
                    std::process::exit(1);
                }
            }
        }
        Commands::Warm { set, names, thumb } => {
            if names.is_empty() {
                eprintln!("No cards specified. Use --names to specify card names.");
                std::process::exit(1);
            }

            let cache = Arc::new(CardImageCache::new(&load_settings(&cli)?));
            println!("Loading {} cards from {}...", names.len(), set);

            let handles: Vec<_> = names
                .iter()
                .map(|name| {
                    let cache = Arc::clone(&cache);
                    let card = card_from_args(name, set, None, false);
                    let thumb = *thumb;
                    tokio::task::spawn_blocking(move || {
                        let image = if thumb {
                            cache.get_thumbnail(&card)
                        } else {
                            cache.get_original(&card)
                        };
                        (card.name, image.is_some())
                    })
                })
                .collect();

            let mut missing = 0;
            for handle in handles {
                match handle.await {
                    Ok((name, true)) => println!("  Loaded: {}", name),
                    Ok((name, false)) => {
                        missing += 1;
                        println!("  Missing: {}", name);
                    }
                    Err(e) => {
                        missing += 1;
                        warn!(error = %e, "Image loading task failed");
                    }
                }
            }

            let stats = cache.stats();
            println!(
                "Cache: {} entries ({} without image), {} KB, {} loads, {} hits",
                stats.entry_count,
                stats.absent_count,
                stats.size_bytes / 1024,
                stats.computations,
                stats.hits
            );
            if missing > 0 {
                println!("{} of {} cards had no image", missing, names.len());
            }
        }
    }

    Ok(())
}
