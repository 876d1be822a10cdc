// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    load_seeds_from_file, load_seeds_from_source, parse_person_arg, resolve_db_path,
    resolve_output_path,
};

// Re-export crawl functionality from holdmap-core
pub use holdmap_core::crawl::{
    CrawlOptions, CrawlProgressCallback, Seed, execute_crawl, generate_crawl_report,
    parse_seed_line,
};
