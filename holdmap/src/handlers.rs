use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use colored::Colorize;
use holdmap_core::data::Database;
use holdmap_core::report::{ReportFormat, export_graph};
use holdmap_scanner::source::DataSource;
use holdmap_scanner::{Identity, PartnerQuery, QualificationFilter};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const DB_FILE_NAME: &str = "holdmap.db";

// Helper functions for crawl handler

/// Expand `~` and point directories at the default database file.
pub fn resolve_db_path(value: &str) -> PathBuf {
    let expanded = shellexpand::tilde(value);
    let path = PathBuf::from(expanded.as_ref());
    if path.extension().is_some() {
        path
    } else {
        path.join(DB_FILE_NAME)
    }
}

/// Give `output` the format's extension when it has none.
pub fn resolve_output_path(output: &Path, format: ReportFormat) -> PathBuf {
    let mut path = output.to_path_buf();
    if path.extension().is_none() {
        path.set_extension(format.extension());
    }
    path
}

/// Parse `TAX_ID:NAME` into a natural person identity.
pub fn parse_person_arg(value: &str) -> Option<Identity> {
    let (tax_id, name) = value.split_once(':')?;
    let (tax_id, name) = (tax_id.trim(), name.trim());
    if tax_id.is_empty() || name.is_empty() {
        eprintln!("{} Skipping invalid person '{}', expected TAX_ID:NAME", "⚠".yellow(), value);
        return None;
    }
    Some(Identity::natural_person(tax_id, name.to_uppercase()))
}

/// Collect seeds from the command line and an optional seeds file
pub fn load_seeds_from_source(
    companies: &[String],
    persons: &[String],
    searches: &[String],
    seeds_file: Option<&PathBuf>,
) -> Result<Vec<Seed>, String> {
    let mut seeds = Vec::new();

    for company in companies {
        let tax_id: String = company.chars().filter(|c| c.is_ascii_digit()).collect();
        if tax_id.is_empty() {
            return Err(format!("Invalid company tax id '{}'", company));
        }
        seeds.push(Seed::Identity(Identity::legal_entity(tax_id)));
    }

    for person in persons {
        let identity = parse_person_arg(person)
            .ok_or_else(|| format!("Invalid person '{}', expected TAX_ID:NAME", person))?;
        seeds.push(Seed::Identity(identity));
    }

    seeds.extend(
        searches
            .iter()
            .filter(|query| !query.trim().is_empty())
            .map(|query| Seed::Search(PartnerQuery::parse(query))),
    );

    if let Some(path) = seeds_file {
        seeds.extend(load_seeds_from_file(path)?);
    }

    if seeds.is_empty() {
        return Err(
            "At least one of --company, --person, --search or --seeds-file must be provided"
                .to_string(),
        );
    }

    Ok(seeds)
}

/// Load and parse seeds from a file
pub fn load_seeds_from_file(path: &Path) -> Result<Vec<Seed>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read seeds file {}: {}", path.display(), e))?;

    let seeds: Vec<Seed> = content.lines().filter_map(parse_seed_line).collect();

    if seeds.is_empty() {
        return Err(format!("No valid seeds found in {}", path.display()));
    }

    Ok(seeds)
}

// Re-export crawl types and functions from holdmap-core
pub use holdmap_core::crawl::{
    CrawlOptions, CrawlProgressCallback, Seed, execute_crawl, generate_crawl_report,
    parse_seed_line,
};

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn print_prompt(msg: &str) -> Result<String> {
    print!("{} ", msg.bright_cyan().bold());
    io::stdout().flush()?;
    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    Ok(response.trim().to_lowercase())
}

pub fn handle_init(args: &ArgMatches) -> Result<()> {
    print_divider();
    println!("{}", "  HOLDMAP INITIALIZATION".bright_white().bold());
    print_divider();
    println!();

    let target = args
        .get_one::<String>("PATH")
        .context("missing database path")?;
    let force = args.get_flag("force");
    let db_path = resolve_db_path(target);
    let config_dir = db_path
        .parent()
        .context("Invalid database path")?
        .to_path_buf();

    println!(
        "{} Target: {}",
        "→".blue(),
        db_path.display().to_string().bright_white()
    );
    println!();

    if Database::exists(&db_path) {
        if !force {
            println!("{}", "⚠ WARNING".yellow().bold());
            println!("Database already exists at:");
            println!(
                "  {} {}",
                "•".yellow(),
                db_path.display().to_string().bright_white()
            );
            println!();

            let response = print_prompt("Would you like to overwrite it? [y/N]:")?;
            println!();

            if response != "y" && response != "yes" {
                println!("{} Initialization cancelled.", "✗".red().bold());
                return Ok(());
            }
        }

        Database::drop(&db_path)
            .with_context(|| format!("Failed to remove {}", db_path.display()))?;
        println!("{} Existing database removed", "✓".green().bold());
    }

    fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create {}", config_dir.display()))?;

    println!("{} Creating database...", "→".blue());
    Database::new(&db_path)
        .with_context(|| format!("Failed to create database {}", db_path.display()))?;

    println!();
    print_divider();
    println!("{}", "  INITIALIZATION COMPLETE".green().bold());
    print_divider();
    println!();
    println!(
        "{} Config directory: {}",
        "✓".green().bold(),
        config_dir.display().to_string().bright_white()
    );
    println!(
        "{} Database: {}",
        "✓".green().bold(),
        db_path.display().to_string().bright_white()
    );
    println!();
    Ok(())
}

fn open_existing(value: &str) -> Result<(PathBuf, Database)> {
    let db_path = resolve_db_path(value);
    if !Database::exists(&db_path) {
        bail!(
            "No database at {}. Run `holdmap init` first",
            db_path.display()
        );
    }
    let db = Database::new(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    Ok((db_path, db))
}

fn strings(args: &ArgMatches, id: &str) -> Vec<String> {
    args.get_many::<String>(id)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

pub async fn handle_crawl(sub_matches: &ArgMatches) -> Result<()> {
    let seeds = load_seeds_from_source(
        &strings(sub_matches, "company"),
        &strings(sub_matches, "person"),
        &strings(sub_matches, "search"),
        sub_matches.get_one::<PathBuf>("seeds-file"),
    )
    .map_err(anyhow::Error::msg)?;

    let db_arg = sub_matches
        .get_one::<String>("db")
        .context("missing database path")?;
    let (db_path, db) = open_existing(db_arg)?;
    let companies = db.company_count()?;
    let partners = db.partner_count()?;
    drop(db);

    let max_depth = *sub_matches.get_one::<u32>("max-depth").unwrap_or(&1) as usize;
    let qualifications = QualificationFilter::parse(
        sub_matches
            .get_one::<String>("qualifications")
            .map(String::as_str)
            .unwrap_or("ALL"),
    );
    let timeout = sub_matches
        .get_one::<u64>("timeout")
        .map(|secs| Duration::from_secs(*secs));
    let format = sub_matches
        .get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Json);
    let output = sub_matches
        .get_one::<PathBuf>("output")
        .map(|path| resolve_output_path(path, format));

    println!("\n{} Crawling {} seed(s)", "→".blue().bold(), seeds.len());
    println!(
        "Database: {} ({} companies, {} partner rows)",
        db_path.display(),
        companies,
        partners
    );
    println!("Max depth: {}", max_depth);
    match qualifications {
        QualificationFilter::All => println!("Qualifications: all"),
        QualificationFilter::Only(ref codes) => println!(
            "Qualifications: {}",
            codes.iter().cloned().collect::<Vec<_>>().join(", ")
        ),
    }
    if let Some(timeout) = timeout {
        println!("Timeout: {}s", timeout.as_secs());
    }
    println!();

    let options = CrawlOptions {
        seeds,
        max_depth,
        qualifications,
        timeout,
        show_progress_bars: !sub_matches.get_flag("no-progress"),
    };

    let progress_callback: CrawlProgressCallback = Arc::new(|msg: String| {
        println!("{}", msg);
    });

    let result = execute_crawl(db_path, options, Some(progress_callback))
        .await
        .map_err(|e| anyhow::anyhow!("Crawl failed: {}", e))?;

    if result.cancelled {
        println!("\n{} Crawl stopped early, graph is partial\n", "⚠".yellow().bold());
    } else {
        println!("\n{} Crawl complete!\n", "✓".green().bold());
    }

    print!("{}", generate_crawl_report(&result));

    if let Some(path) = output {
        let written = export_graph(&result.graph, format, &path)
            .with_context(|| format!("Failed to export graph to {}", path.display()))?;
        for file in written {
            println!(
                "{} Graph written to {}",
                "✓".green().bold(),
                file.display().to_string().bright_white()
            );
        }
    }

    Ok(())
}

pub fn handle_search(sub_matches: &ArgMatches) -> Result<()> {
    let query = sub_matches
        .get_one::<String>("QUERY")
        .context("missing search query")?;
    let db_arg = sub_matches
        .get_one::<String>("db")
        .context("missing database path")?;
    let (_, db) = open_existing(db_arg)?;

    let query = PartnerQuery::parse(query);
    let matches = db.search_partners(&query)?;

    if matches.is_empty() {
        println!("{} Nothing found for '{}'", "✗".red().bold(), query.value());
        return Ok(());
    }

    println!(
        "{} {} partner(s) match '{}'",
        "✓".green().bold(),
        matches.len(),
        query.value()
    );
    for partner in &matches {
        let tag = if partner.identity.is_legal_entity() {
            "PJ".blue()
        } else {
            "PF".green()
        };
        let label = match partner.identity {
            Identity::LegalEntity { ref tax_id } => tax_id.clone(),
            Identity::NaturalPerson {
                ref tax_id,
                ref name,
            } => format!("{} {}", tax_id, name),
        };
        println!("  {} {}", tag, label.bright_white());
    }
    Ok(())
}
