pub mod crawl;
pub mod data;
pub mod report;

const BANNER: &str = r#"
  _           _     _
 | |__   ___ | | __| |_ __ ___   __ _ _ __
 | '_ \ / _ \| |/ _` | '_ ` _ \ / _` | '_ \
 | | | | (_) | | (_| | | | | | | (_| | |_) |
 |_| |_|\___/|_|\__,_|_| |_| |_|\__,_| .__/
                                     |_|
"#;

pub fn print_banner() {
    eprintln!("{}", BANNER);
    eprintln!("  ownership network crawler v{}\n", env!("CARGO_PKG_VERSION"));
}
