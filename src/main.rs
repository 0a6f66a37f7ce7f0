mod config;
mod display;
mod error;
mod form;
mod parser;
mod platform;
mod relay;
mod schedule;
mod web;

use std::fs::File;

use tracing_subscriber::EnvFilter;

use config::Config;
use display::{print_planning, write_planning_to_file};
use parser::{load_candidats, parse_date};

const USAGE: &str = "Usage:
  staffing-planner web [port]
  staffing-planner import <candidats.csv>
  staffing-planner planning <date> [output.txt]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("staffing_planner=info,actix_web=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::from_env()?;

    match args.get(1).map(String::as_str) {
        Some("web") => {
            if let Some(port) = args.get(2).and_then(|p| p.parse::<u16>().ok()) {
                config.port = port;
            }
            println!("Access the site at http://localhost:{}", config.port);
            web::start_server(config).await?;
        }
        Some("import") => {
            let path = args.get(2).ok_or(USAGE)?;
            println!("Loading candidates from {}...", path);
            let (candidats, report) = load_candidats(File::open(path)?, &[])?;

            println!("Loaded {} candidates ({} rows merged)", report.imported, report.merged);
            for candidat in &candidats {
                let secteurs: Vec<&str> = candidat.secteurs.iter().map(|s| s.label()).collect();
                println!(
                    "  - {} [{}]{}",
                    display::format_candidate_name(&candidat.first_name, &candidat.last_name),
                    secteurs.join(", "),
                    if candidat.vehicule { " 🚗" } else { "" }
                );
            }
            if !report.skipped.is_empty() {
                println!("⚠️  Skipped rows ({}):", report.skipped.len());
                for reason in &report.skipped {
                    println!("  - {}", reason);
                }
            }
        }
        Some("planning") => {
            let raw = args.get(2).ok_or(USAGE)?;
            let date = parse_date(raw).ok_or_else(|| format!("Invalid date: {}", raw))?;
            config.require_hosted_backend("planning")?;
            let state = web::AppState::from_config(&config).await?;
            let rows = web::api::load_planning(&state, date, None).await?;

            print_planning(date, &rows);
            let filename = args
                .get(3)
                .cloned()
                .unwrap_or_else(|| format!("planning_{}.txt", date.format("%Y-%m-%d")));
            write_planning_to_file(date, &rows, &filename)?;
            println!("Planning saved to {}", filename);
        }
        _ => {
            println!("{}", USAGE);
        }
    }

    Ok(())
}
