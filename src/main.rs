//! Deck Search CLI - Coordinate a distributed search from JSON configuration.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use deck_search::{
    coordinator::{DistributedSearch, FileMailbox},
    schema::{SearchCategory, SearchConfig},
};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <config.json>", args[0]);
        eprintln!();
        eprintln!("Run a distributed deck search from JSON configuration.");
        eprintln!("Workers join by announcing themselves in the mailbox directory.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  config.json  Path to search configuration file");
        eprintln!();
        eprintln!("Example configuration is generated with --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_config();
        return;
    }

    let config_path = PathBuf::from(&args[1]);

    let config_str = fs::read_to_string(&config_path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {}", e);
        std::process::exit(1);
    });

    let config: SearchConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = config.validate() {
        eprintln!("Invalid config: {}", e);
        std::process::exit(1);
    }

    if config.search.category == SearchCategory::Surrogated {
        eprintln!("Surrogated search needs a surrogate model and is only available");
        eprintln!("through the library API (SurrogatedSearch).");
        std::process::exit(1);
    }

    let mailbox = FileMailbox::create(&config.coordinator.mailbox_dir).unwrap_or_else(|e| {
        eprintln!("Error creating mailbox directories: {}", e);
        std::process::exit(1);
    });

    let mut search =
        DistributedSearch::from_config(&config, config_path.display().to_string(), mailbox)
            .unwrap_or_else(|e| {
                eprintln!("Error setting up search: {}", e);
                std::process::exit(1);
            });

    let algorithm = search.algorithm();
    println!("Deck Search");
    println!("===========");
    println!("Algorithm: {}", algorithm.name());
    println!("Hero class: {}", config.deckspace.hero_class);
    println!(
        "Deck size: {} from {} cards",
        config.deckspace.deck_size,
        config.deckspace.cards.len()
    );
    println!("Evaluations: {}", algorithm.num_to_evaluate());
    println!("Mailbox: {}", config.coordinator.mailbox_dir.display());
    println!("Logs: {}", config.logging.log_dir.display());
    println!();

    let start = Instant::now();
    if let Err(e) = search.run() {
        eprintln!("Search failed: {}", e);
        std::process::exit(1);
    }
    let elapsed = start.elapsed();

    let stats = search.algorithm().feature_map().stats();
    println!();
    println!("Final archive:");
    println!("  Occupied cells: {}/{}", stats.coverage, stats.capacity);
    println!("  Best fitness: {:.3}", stats.max_fitness);
    println!("  Mean elite fitness: {:.3}", stats.mean_fitness);
    println!("Time: {:.1}s", elapsed.as_secs_f32());
}

fn print_example_config() {
    let config = SearchConfig::default();
    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing example config: {}", e);
            std::process::exit(1);
        }
    }
}
